//! Bytecode executor collaborator and the host-call surface it drives.
//!
//! The host never interprets bytecode. An [`Executor`] turns code into
//! [`Instance`]s; an instance runs one exported function at a time and calls
//! back into the host through [`VmHooks`]. A hook that needs to stop the
//! contract returns `Err(breakpoint)`, which the engine must propagate out of
//! [`Instance::call_function`] as [`ExecutorError::Breakpoint`].

use super::BreakpointValue;
use crate::config::GasSchedule;
use crate::storage::StorageStatus;
use crate::types::Address;
use num_bigint::BigUint;
use std::sync::Arc;
use thiserror::Error;

pub type HookResult<T> = std::result::Result<T, BreakpointValue>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    #[error("stopped at breakpoint: {0}")]
    Breakpoint(BreakpointValue),

    #[error("trap: {0}")]
    Trap(String),

    #[error("memory limit reached")]
    MemoryLimit,

    #[error("invalid contract code: {0}")]
    InvalidCode(String),

    #[error("function not found: {0}")]
    FunctionNotFound(String),

    #[error("function {0} has a wrong signature")]
    WrongSignature(String),
}

impl From<BreakpointValue> for ExecutorError {
    fn from(breakpoint: BreakpointValue) -> Self {
        ExecutorError::Breakpoint(breakpoint)
    }
}

/// Settings for a freshly created instance.
#[derive(Debug, Clone, Default)]
pub struct InstanceOptions {
    /// Opcode costs the engine reports through [`VmHooks::consume_points`].
    pub schedule: Arc<GasSchedule>,
    pub max_memory_pages: u32,
}

pub trait Executor: Send + Sync {
    fn new_instance(&self, code: &[u8], options: &InstanceOptions) -> Result<Box<dyn Instance>, ExecutorError>;
}

pub trait Instance: Send {
    fn call_function(&mut self, name: &str, hooks: &mut dyn VmHooks) -> Result<(), ExecutorError>;

    fn has_function(&self, name: &str) -> bool;

    fn function_names(&self) -> Vec<String>;

    /// Fails unless `name` takes no parameters and returns nothing.
    fn validate_void_function(&self, name: &str) -> Result<(), ExecutorError>;

    fn has_memory(&self) -> bool;

    fn points_used(&self) -> u64;

    fn set_points_used(&mut self, points: u64);

    /// Clears per-call state so the instance can be reused. Returns false when
    /// the instance cannot be reused.
    fn reset(&mut self) -> bool;
}

/// Nested synchronous call requested by a contract.
#[derive(Debug, Clone, Default)]
pub struct CallRequest {
    pub gas: u64,
    pub destination: Address,
    pub value: BigUint,
    pub function: String,
    pub arguments: Vec<Vec<u8>>,
}

/// Async call scheduled by a contract.
#[derive(Debug, Clone, Default)]
pub struct AsyncCallRequest {
    pub group_id: String,
    pub destination: Address,
    pub value: BigUint,
    /// Call data in `function@hex@hex` form.
    pub data: Vec<u8>,
    pub success_callback: String,
    pub error_callback: String,
    pub gas_limit: u64,
    /// Gas added on top of the schedule's callback lock.
    pub extra_gas_for_callback: u64,
    pub callback_closure: Vec<u8>,
}

/// Contract deployment requested by a running contract.
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    pub gas: u64,
    pub value: BigUint,
    pub code: Vec<u8>,
    pub code_metadata: Vec<u8>,
    pub arguments: Vec<Vec<u8>>,
}

/// Host calls available to running contract code.
pub trait VmHooks {
    /// Charges executed bytecode against the gas ledger.
    fn consume_points(&mut self, points: u64) -> HookResult<()>;

    fn get_num_arguments(&mut self) -> HookResult<usize>;

    fn get_argument(&mut self, index: usize) -> HookResult<Vec<u8>>;

    fn get_function(&mut self) -> HookResult<String>;

    fn get_caller(&mut self) -> HookResult<Address>;

    fn get_sc_address(&mut self) -> HookResult<Address>;

    fn get_call_value(&mut self) -> HookResult<BigUint>;

    fn get_gas_left(&mut self) -> HookResult<u64>;

    fn finish(&mut self, data: &[u8]) -> HookResult<()>;

    /// Always stops the contract with a user error carrying `message`.
    fn signal_error(&mut self, message: &str) -> HookResult<()>;

    fn storage_store(&mut self, key: &[u8], value: &[u8]) -> HookResult<StorageStatus>;

    fn storage_load(&mut self, key: &[u8]) -> HookResult<Vec<u8>>;

    fn write_log(&mut self, topics: &[Vec<u8>], data: &[u8]) -> HookResult<()>;

    fn transfer_value(&mut self, destination: &Address, value: &BigUint, data: &[u8]) -> HookResult<()>;

    /// Runs a function of another contract in its own context. Returns 0 when
    /// the callee succeeded and 1 when it failed and was rolled back.
    fn execute_on_dest_context(&mut self, request: CallRequest) -> HookResult<i32>;

    /// Runs another contract's code against the caller's own storage.
    fn execute_on_same_context(&mut self, request: CallRequest) -> HookResult<i32>;

    /// Like [`execute_on_dest_context`](Self::execute_on_dest_context) but the
    /// callee cannot write storage or move value.
    fn execute_read_only(&mut self, request: CallRequest) -> HookResult<i32>;

    fn get_num_return_data(&mut self) -> HookResult<usize>;

    fn get_return_data(&mut self, index: usize) -> HookResult<Vec<u8>>;

    fn clean_return_data(&mut self) -> HookResult<()>;

    /// Schedules a single async call that consumes all remaining gas and
    /// stops the contract.
    fn async_call(&mut self, destination: &Address, value: &BigUint, data: &[u8]) -> HookResult<()>;

    fn create_async_call(&mut self, request: AsyncCallRequest) -> HookResult<()>;

    fn set_async_group_callback(
        &mut self,
        group_id: &str,
        callback: &str,
        data: &[u8],
        gas: u64,
    ) -> HookResult<()>;

    /// Closure of the async call whose callback is running.
    fn get_callback_closure(&mut self) -> HookResult<Vec<u8>>;

    fn mbuffer_new(&mut self, bytes: &[u8]) -> HookResult<i32>;

    fn mbuffer_get_bytes(&mut self, handle: i32) -> HookResult<Vec<u8>>;

    fn mbuffer_set_bytes(&mut self, handle: i32, bytes: &[u8]) -> HookResult<()>;

    fn mbuffer_append(&mut self, handle: i32, bytes: &[u8]) -> HookResult<()>;

    fn create_contract(&mut self, request: CreateRequest) -> HookResult<Address>;
}
