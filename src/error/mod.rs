//! Host error taxonomy.
//!
//! Every error the host produces is a [`HostError`]. Errors are grouped into
//! four classes that decide how far they travel:
//!
//! - [`ErrorClass::User`]: contract-triggered failures, surfaced as a failed
//!   result with a message.
//! - [`ErrorClass::Resource`]: out of gas, memory limit, too many instances;
//!   recoverable, tagged distinctly for fee accounting.
//! - [`ErrorClass::Invalid`]: malformed or rejected contract code.
//! - [`ErrorClass::Internal`]: accounting or bookkeeping bugs. These abort the
//!   whole transaction and are never turned into a return code.

mod wrappable;

pub use wrappable::{ErrorEntry, WrappableError};

use crate::types::ReturnCode;
use thiserror::Error;

/// Errors raised while executing a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    // ── user / contract errors ───────────────────────────────────────────────
    #[error("{0}")]
    SignalError(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("invalid function (not found): {0}")]
    FunctionNotFound(String),

    #[error("function {0} has a wrong signature")]
    FunctionWrongSignature(String),

    #[error("contract not found: {0}")]
    ContractNotFound(String),

    #[error("calling init is not allowed outside deployment")]
    InitFuncCalledInRun,

    #[error("calling the callback function directly is not allowed")]
    CallbackCalledDirectly,

    #[error("insufficient funds: have {have}, need {need}")]
    OutOfFunds { have: String, need: String },

    #[error("account collision at {0}")]
    AccountCollision(String),

    #[error("call stack overflow: depth {depth} exceeds maximum {max}")]
    CallStackOverflow { depth: usize, max: usize },

    #[error("cannot write to protected storage key")]
    StorageKeyProtected,

    #[error("operation not permitted in read-only mode: {0}")]
    ReadOnlyViolation(&'static str),

    #[error("async call error: {0}")]
    AsyncCall(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("gas provided {provided} exceeds block gas limit {limit}")]
    BlockGasLimitExceeded { provided: u64, limit: u64 },

    // ── resource exhaustion ──────────────────────────────────────────────────
    #[error("not enough gas")]
    NotEnoughGas,

    #[error("memory limit reached")]
    MemoryLimit,

    #[error("maximum number of instances reached ({0})")]
    MaxInstancesReached(usize),

    // ── contract invalidity ──────────────────────────────────────────────────
    #[error("invalid contract code: {0}")]
    ContractInvalid(String),

    // ── internal invariant violations ────────────────────────────────────────
    #[error(
        "gas accounting mismatch in {context}: provided {provided}, used {used}, locked {locked}, remaining {remaining}"
    )]
    GasMismatch {
        context: &'static str,
        provided: u64,
        used: u64,
        locked: u64,
        remaining: u64,
    },

    #[error("unbalanced state stack in {context}")]
    StateStackUnderflow { context: &'static str },

    #[error("execution time limit of {0} ms exceeded")]
    ExecutionTimeout(u64),

    #[error("async context codec error: {0}")]
    AsyncContextCodec(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// Free-form provenance entry used by [`WrappableError::wrap_with_message`].
    #[error("{0}")]
    Message(String),
}

/// Coarse classification of a [`HostError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    User,
    Resource,
    Invalid,
    Internal,
}

impl HostError {
    pub fn class(&self) -> ErrorClass {
        match self {
            HostError::NotEnoughGas
            | HostError::MemoryLimit
            | HostError::MaxInstancesReached(_) => ErrorClass::Resource,
            HostError::ContractInvalid(_) => ErrorClass::Invalid,
            HostError::GasMismatch { .. }
            | HostError::StateStackUnderflow { .. }
            | HostError::ExecutionTimeout(_)
            | HostError::AsyncContextCodec(_)
            | HostError::Internal(_) => ErrorClass::Internal,
            _ => ErrorClass::User,
        }
    }

    /// Internal errors abort the transaction instead of producing a result.
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Internal
    }

    /// Return code reported at the transaction boundary for this error.
    pub fn return_code(&self) -> ReturnCode {
        match self {
            HostError::SignalError(_)
            | HostError::InitFuncCalledInRun
            | HostError::CallbackCalledDirectly
            | HostError::StorageKeyProtected
            | HostError::ReadOnlyViolation(_)
            | HostError::InvalidArgument(_)
            | HostError::Message(_) => ReturnCode::UserError,
            HostError::FunctionNotFound(_) => ReturnCode::FunctionNotFound,
            HostError::FunctionWrongSignature(_) => ReturnCode::FunctionWrongSignature,
            HostError::ContractNotFound(_) => ReturnCode::ContractNotFound,
            HostError::OutOfFunds { .. } => ReturnCode::OutOfFunds,
            HostError::AccountCollision(_) => ReturnCode::AccountCollision,
            HostError::CallStackOverflow { .. } | HostError::MaxInstancesReached(_) => {
                ReturnCode::CallStackOverFlow
            }
            HostError::NotEnoughGas | HostError::BlockGasLimitExceeded { .. } => {
                ReturnCode::OutOfGas
            }
            HostError::MemoryLimit => ReturnCode::MemoryLimit,
            HostError::ContractInvalid(_) => ReturnCode::ContractInvalid,
            HostError::ExecutionFailed(_)
            | HostError::AsyncCall(_)
            | HostError::GasMismatch { .. }
            | HostError::StateStackUnderflow { .. }
            | HostError::ExecutionTimeout(_)
            | HostError::AsyncContextCodec(_)
            | HostError::Internal(_) => ReturnCode::ExecutionFailed,
        }
    }
}
