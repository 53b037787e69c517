use super::{CheckConfigArgs, DecodeAsyncArgs, GasScheduleArgs, OutputFormat, Verbosity};
use crate::async_call::{decode_async_context, SerializableAsyncContext};
use crate::config::{GasSchedule, HostConfig};
use anyhow::{Context, Result};
use tracing::info;

pub fn check_config(args: CheckConfigArgs, verbosity: Verbosity) -> Result<()> {
    let config = HostConfig::load(&args.file)
        .with_context(|| format!("invalid host configuration {}", args.file.display()))?;
    info!(file = %args.file.display(), "configuration is valid");
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => {
            if verbosity != Verbosity::Quiet {
                println!("{} is valid", args.file.display());
            }
            println!("max_call_depth         = {}", config.max_call_depth);
            println!("max_instances          = {}", config.max_instances);
            println!("block_gas_limit        = {}", config.block_gas_limit);
            println!("execution_timeout_ms   = {}", config.execution_timeout_ms);
            println!("protected_key_prefix   = {}", config.protected_key_prefix);
            println!("reserved_functions     = {}", config.reserved_functions.join(", "));
            println!("instance_pool_capacity = {}", config.instance_pool_capacity);
            println!("esdt_transfer_function = {}", config.esdt_transfer_function);
            println!("enable_gas_trace       = {}", config.enable_gas_trace);
        }
    }
    Ok(())
}

pub fn gas_schedule(args: GasScheduleArgs, _verbosity: Verbosity) -> Result<()> {
    let schedule = match &args.file {
        Some(path) => GasSchedule::load(path)
            .with_context(|| format!("invalid gas schedule {}", path.display()))?,
        None => GasSchedule::default(),
    };
    println!("{}", serde_json::to_string_pretty(&schedule)?);
    Ok(())
}

pub fn decode_async(args: DecodeAsyncArgs, _verbosity: Verbosity) -> Result<()> {
    let bytes = hex::decode(args.hex.trim().trim_start_matches("0x")).context("value is not hex")?;
    let context = decode_async_context(&bytes).context("value is not an async context")?;
    info!(groups = context.group_ids().len(), "async context decoded");
    let view = SerializableAsyncContext::from(&context);
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
