//! Execution host.
//!
//! [`VmHost`] is shared between threads and holds the collaborators: the
//! bytecode executor, the ledger hook, the builtin functions and the gas
//! schedule. Every transaction gets its own [`TransactionHost`], which owns
//! one instance of each execution context and is dropped when the
//! transaction ends.

mod async_exec;
mod execution;
mod hooks;

use crate::async_call::AsyncContext;
use crate::blockchain::{BlockchainContext, BlockchainHook};
use crate::builtin::{BuiltinFunctionContainer, NoBuiltins};
use crate::config::{GasSchedule, GasScheduleHandle, HostConfig};
use crate::managed::ManagedTypesContext;
use crate::metering::{GasTraceEntry, Metering};
use crate::output::OutputContext;
use crate::runtime::parser::{parse_call_data, parse_callback_data};
use crate::runtime::{ContractValidator, Executor, InstancePool, RuntimeContext, Watchdog};
use crate::storage::StorageContext;
use crate::types::{
    Address, CallType, ContractCallInput, ContractCreateInput, OutputTransfer, ReturnCode,
    VmInput, VmOutput,
};
use crate::{HostError, Result};
use std::sync::Arc;

/// Memory ceiling handed to every new instance, in 64 KiB pages.
pub const MAX_MEMORY_PAGES: u32 = 256;

pub const INIT_FUNCTION: &str = "init";

/// Callback invoked for calls made through the legacy single-call API.
pub const LEGACY_CALLBACK: &str = "callBack";

pub struct VmHost {
    executor: Arc<dyn Executor>,
    hook: Arc<dyn BlockchainHook>,
    builtins: Arc<dyn BuiltinFunctionContainer>,
    gas_schedule: GasScheduleHandle,
    config: HostConfig,
    pool: InstancePool,
    validator: ContractValidator,
}

impl std::fmt::Debug for VmHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmHost")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish()
    }
}

impl VmHost {
    pub fn builder() -> HostBuilder {
        HostBuilder::new()
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn gas_schedule(&self) -> &GasScheduleHandle {
        &self.gas_schedule
    }

    pub fn instance_pool(&self) -> &InstancePool {
        &self.pool
    }

    /// Executes a call transaction. Contract failures come back as a failed
    /// [`VmOutput`]; `Err` means the transaction was aborted.
    pub fn run_smart_contract_call(&self, input: &ContractCallInput) -> Result<VmOutput> {
        self.run_smart_contract_call_traced(input).map(|(output, _)| output)
    }

    /// Like [`run_smart_contract_call`](Self::run_smart_contract_call), also
    /// returning per-function gas consumption when tracing is enabled.
    pub fn run_smart_contract_call_traced(
        &self,
        input: &ContractCallInput,
    ) -> Result<(VmOutput, Vec<GasTraceEntry>)> {
        let mut tx = TransactionHost::new(self);
        let output = tx.run_call(input)?;
        Ok((output, tx.take_gas_trace()))
    }

    pub fn run_smart_contract_create(&self, input: &ContractCreateInput) -> Result<VmOutput> {
        let mut tx = TransactionHost::new(self);
        tx.run_create(input)
    }
}

/// Assembles a [`VmHost`] from explicit collaborators.
pub struct HostBuilder {
    executor: Option<Arc<dyn Executor>>,
    hook: Option<Arc<dyn BlockchainHook>>,
    builtins: Arc<dyn BuiltinFunctionContainer>,
    gas_schedule: Option<GasScheduleHandle>,
    config: HostConfig,
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBuilder {
    pub fn new() -> Self {
        Self {
            executor: None,
            hook: None,
            builtins: Arc::new(NoBuiltins),
            gas_schedule: None,
            config: HostConfig::default(),
        }
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn blockchain_hook(mut self, hook: Arc<dyn BlockchainHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn builtins(mut self, builtins: Arc<dyn BuiltinFunctionContainer>) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn gas_schedule(mut self, schedule: GasSchedule) -> Self {
        self.gas_schedule = Some(GasScheduleHandle::new(schedule));
        self
    }

    /// Shares a schedule handle with other hosts so one swap reaches all.
    pub fn gas_schedule_handle(mut self, handle: GasScheduleHandle) -> Self {
        self.gas_schedule = Some(handle);
        self
    }

    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<VmHost> {
        self.config
            .validate()
            .map_err(|e| HostError::InvalidArgument(e.to_string()))?;
        let executor = self
            .executor
            .ok_or_else(|| HostError::InvalidArgument("host needs an executor".into()))?;
        let hook = self
            .hook
            .ok_or_else(|| HostError::InvalidArgument("host needs a blockchain hook".into()))?;
        let validator = ContractValidator::new(self.builtins.names());
        Ok(VmHost {
            executor,
            hook,
            builtins: self.builtins,
            gas_schedule: self.gas_schedule.unwrap_or_default(),
            pool: InstancePool::new(self.config.instance_pool_capacity),
            config: self.config,
            validator,
        })
    }
}

/// How the gas for preparing code is charged when an invocation starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InitialCost {
    Execution,
    DirectDeployment,
    IndirectDeployment,
}

/// One contract function run.
#[derive(Debug, Clone)]
pub(crate) struct Invocation {
    pub input: ContractCallInput,
    /// Account whose code runs; differs from the recipient for same-context
    /// calls.
    pub code_address: Address,
    pub read_only: bool,
    pub callback_closure: Vec<u8>,
    pub initial_cost: InitialCost,
}

impl Invocation {
    pub fn call(input: ContractCallInput) -> Self {
        Self {
            code_address: input.recipient,
            input,
            read_only: false,
            callback_closure: Vec::new(),
            initial_cost: InitialCost::Execution,
        }
    }
}

/// Commit and rollback behaviour of a nested invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChildKind {
    /// Own account; effects kept on success only.
    DestContext,
    /// Caller's account; effects always kept.
    SameContext,
    /// Destination of a locally resolved async call; its return data goes to
    /// the callback instead of the caller.
    AsyncDestination,
    /// Async callback; a failure never reaches the caller.
    Callback,
}

/// What a nested invocation reported to its caller.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChildOutcome {
    pub return_code: ReturnCode,
    pub message: String,
    pub return_data: Vec<Vec<u8>>,
    /// Gas the child handed back to its caller.
    pub gas_remaining: u64,
    pub error: Option<HostError>,
}

impl ChildOutcome {
    pub fn failed(error: HostError) -> Self {
        Self {
            return_code: error.return_code(),
            message: error.to_string(),
            return_data: Vec::new(),
            gas_remaining: 0,
            error: Some(error),
        }
    }

    /// 0 for success and 1 for failure, as seen by the calling contract.
    pub fn status_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.return_code.is_ok()
    }
}

/// Execution contexts of one transaction.
pub(crate) struct TransactionHost<'h> {
    host: &'h VmHost,
    schedule: Arc<GasSchedule>,
    metering: Metering,
    output: OutputContext,
    storage: StorageContext,
    blockchain: BlockchainContext,
    managed: ManagedTypesContext,
    runtime: RuntimeContext,
    async_ctx: AsyncContext,
    watchdog: Watchdog,
}

impl<'h> TransactionHost<'h> {
    fn new(host: &'h VmHost) -> Self {
        let schedule = host.gas_schedule.snapshot();
        let config = &host.config;
        Self {
            metering: Metering::new(
                Arc::clone(&schedule),
                config.block_gas_limit,
                config.enable_gas_trace,
            ),
            schedule,
            output: OutputContext::new(),
            storage: StorageContext::new(config.protected_prefix()),
            blockchain: BlockchainContext::new(Arc::clone(&host.hook)),
            managed: ManagedTypesContext::new(),
            runtime: RuntimeContext::new(config.max_call_depth, config.max_instances),
            async_ctx: AsyncContext::default(),
            watchdog: Watchdog::start(config.execution_timeout_ms),
            host,
        }
    }

    fn take_gas_trace(&mut self) -> Vec<GasTraceEntry> {
        self.metering
            .take_tracer()
            .map(|tracer| tracer.entries())
            .unwrap_or_default()
    }

    /// Checks the wall-clock limit; expiry aborts the whole transaction.
    fn check_watchdog(&mut self) -> Result<()> {
        self.watchdog.check().map_err(|error| {
            self.runtime.set_fatal(error.clone());
            error
        })
    }
}

/// Turns an output transfer into the input of the transaction that delivers
/// it to `destination`.
///
/// Async calls become calls of the function named in their data; callbacks
/// carry the decoded `@code@data…` payload as arguments.
pub fn input_from_transfer(destination: Address, transfer: &OutputTransfer) -> Result<ContractCallInput> {
    let (function, arguments) = match transfer.call_type {
        CallType::AsynchronousCallBack => match parse_call_data(&transfer.data) {
            Ok(parsed) => (parsed.function, parsed.arguments),
            Err(_) => (
                LEGACY_CALLBACK.to_string(),
                parse_callback_data(&transfer.data)?,
            ),
        },
        _ => {
            let parsed = parse_call_data(&transfer.data)?;
            (parsed.function, parsed.arguments)
        }
    };
    Ok(ContractCallInput {
        vm_input: VmInput {
            caller: transfer.sender,
            arguments,
            call_value: transfer.value.clone(),
            call_type: transfer.call_type,
            gas_provided: transfer.gas_limit,
            gas_locked: transfer.gas_locked,
            async_arguments: transfer.async_data.clone(),
            ..VmInput::default()
        },
        recipient: destination,
        function,
        allow_init_function: false,
    })
}
