use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vm_host::cli::{commands, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbosity = cli.verbosity();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| verbosity.to_log_level().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::CheckConfig(args) => commands::check_config(args, verbosity)?,
        Commands::GasSchedule(args) => commands::gas_schedule(args, verbosity)?,
        Commands::DecodeAsync(args) => commands::decode_async(args, verbosity)?,
    }

    Ok(())
}
