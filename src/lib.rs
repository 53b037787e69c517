//! Execution host for a deterministic, gas-metered WebAssembly contract VM.
//!
//! The host runs one transaction at a time against an opaque bytecode
//! executor, charges gas deterministically and produces a [`VmOutput`] with
//! every side effect of the call tree: storage deltas, transfers, logs and
//! return data. Contracts may call each other synchronously, asynchronously
//! inside the shard, or across shards; asynchronous calls that cannot be
//! resolved locally are packaged as outgoing transfers and resolved by a later
//! transaction.
//!
//! Sub-systems:
//! - [`state`]: push/pop/commit/discard discipline shared by every context.
//! - [`metering`]: gas ledger with locked gas and child reconciliation.
//! - [`output`]: per-nesting-level accumulation of effects.
//! - [`storage`]: storage view over pending updates and the ledger hook.
//! - [`blockchain`]: ledger hook trait and account view.
//! - [`managed`]: handle-addressed buffer heap for contracts.
//! - [`runtime`]: executor traits, breakpoint dispatch, validation, pooling.
//! - [`async_call`]: async calls, call groups and the async context.
//! - [`builtin`]: builtin-function collaborator.
//! - [`host`]: transaction orchestration and the contract hook surface.

pub mod async_call;
pub mod blockchain;
pub mod builtin;
pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod managed;
pub mod metering;
pub mod output;
pub mod runtime;
pub mod state;
pub mod storage;
pub mod types;

pub use error::{ErrorClass, HostError, WrappableError};
pub use host::{HostBuilder, VmHost};
pub use types::{
    Address, AsyncArguments, CallType, ContractCallInput, ContractCreateInput, ReturnCode,
    VmInput, VmOutput,
};

/// Result alias used across the host.
pub type Result<T> = std::result::Result<T, HostError>;
