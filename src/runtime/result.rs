//! Classification of how a contract function stopped.

use super::executor::ExecutorError;
use super::BreakpointValue;
use crate::{HostError, WrappableError};

/// Why the instance returned control to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Returned,
    Breakpoint(BreakpointValue),
    Trap(String),
}

/// What the host does next with the invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The function finished normally.
    Finished,
    /// The function stopped at an async call site; resolve its async calls.
    CompleteAsync,
    /// The invocation failed.
    Failed(HostError),
}

impl From<ExecutorError> for HostError {
    fn from(error: ExecutorError) -> Self {
        match error {
            ExecutorError::Breakpoint(breakpoint) => {
                HostError::ExecutionFailed(format!("unhandled breakpoint: {}", breakpoint))
            }
            ExecutorError::Trap(message) => HostError::ExecutionFailed(message),
            ExecutorError::MemoryLimit => HostError::MemoryLimit,
            ExecutorError::InvalidCode(message) => HostError::ContractInvalid(message),
            ExecutorError::FunctionNotFound(name) => HostError::FunctionNotFound(name),
            ExecutorError::WrongSignature(name) => HostError::FunctionWrongSignature(name),
        }
    }
}

/// Breakpoint that stops a contract when a host call fails with `error`.
pub fn breakpoint_for_error(error: &HostError) -> BreakpointValue {
    match error {
        HostError::NotEnoughGas => BreakpointValue::OutOfGas,
        HostError::MemoryLimit => BreakpointValue::MemoryLimit,
        HostError::SignalError(_) => BreakpointValue::SignalError,
        _ => BreakpointValue::ExecutionFailed,
    }
}

/// Combines what the engine reported with the breakpoint the host recorded.
/// The recorded value wins: it is the one the hook actually raised.
pub fn reconcile_exit(reported: ExitReason, recorded: BreakpointValue) -> ExitReason {
    if recorded.is_set() {
        return ExitReason::Breakpoint(recorded);
    }
    match reported {
        ExitReason::Breakpoint(BreakpointValue::None) => ExitReason::Returned,
        other => other,
    }
}

/// Maps an exit to the next step. `error` is the chain recorded for this
/// invocation; its last meaningful entry becomes the failure.
pub fn dispatch(exit: ExitReason, error: Option<&WrappableError>) -> Dispatch {
    let recorded = || error.map(|chain| chain.last_meaningful_error().clone());
    match exit {
        ExitReason::Returned | ExitReason::Breakpoint(BreakpointValue::None) => Dispatch::Finished,
        ExitReason::Breakpoint(BreakpointValue::AsyncCall) => Dispatch::CompleteAsync,
        ExitReason::Breakpoint(BreakpointValue::OutOfGas) => Dispatch::Failed(HostError::NotEnoughGas),
        ExitReason::Breakpoint(BreakpointValue::MemoryLimit) => Dispatch::Failed(HostError::MemoryLimit),
        ExitReason::Breakpoint(BreakpointValue::SignalError) => Dispatch::Failed(
            recorded().unwrap_or_else(|| HostError::SignalError(String::new())),
        ),
        ExitReason::Breakpoint(BreakpointValue::ExecutionFailed) => Dispatch::Failed(
            recorded().unwrap_or_else(|| HostError::ExecutionFailed("execution failed".into())),
        ),
        ExitReason::Trap(message) => Dispatch::Failed(HostError::ExecutionFailed(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_breakpoint_takes_precedence() {
        let exit = reconcile_exit(ExitReason::Trap("unreachable".into()), BreakpointValue::OutOfGas);
        assert_eq!(exit, ExitReason::Breakpoint(BreakpointValue::OutOfGas));
        let exit = reconcile_exit(
            ExitReason::Breakpoint(BreakpointValue::None),
            BreakpointValue::None,
        );
        assert_eq!(exit, ExitReason::Returned);
    }

    #[test]
    fn failures_use_the_last_meaningful_error() {
        let chain = WrappableError::wrap(HostError::SignalError("not owner".into()))
            .wrap_with_message("while checking caller");
        let next = dispatch(
            ExitReason::Breakpoint(BreakpointValue::SignalError),
            Some(&chain),
        );
        assert_eq!(next, Dispatch::Failed(HostError::SignalError("not owner".into())));
    }

    #[test]
    fn resource_breakpoints_are_tagged() {
        assert_eq!(
            dispatch(ExitReason::Breakpoint(BreakpointValue::OutOfGas), None),
            Dispatch::Failed(HostError::NotEnoughGas)
        );
        assert_eq!(
            dispatch(ExitReason::Breakpoint(BreakpointValue::MemoryLimit), None),
            Dispatch::Failed(HostError::MemoryLimit)
        );
        assert_eq!(
            dispatch(ExitReason::Breakpoint(BreakpointValue::AsyncCall), None),
            Dispatch::CompleteAsync
        );
        assert_eq!(dispatch(ExitReason::Returned, None), Dispatch::Finished);
    }

    #[test]
    fn errors_map_to_breakpoints() {
        assert_eq!(breakpoint_for_error(&HostError::NotEnoughGas), BreakpointValue::OutOfGas);
        assert_eq!(
            breakpoint_for_error(&HostError::SignalError("x".into())),
            BreakpointValue::SignalError
        );
        assert_eq!(
            breakpoint_for_error(&HostError::StorageKeyProtected),
            BreakpointValue::ExecutionFailed
        );
    }
}
