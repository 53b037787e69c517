use super::result::breakpoint_for_error;
use super::BreakpointValue;
use crate::state::{Snapshots, StateStack};
use crate::types::{Address, ContractCallInput};
use crate::{HostError, Result, WrappableError};
use num_bigint::BigUint;
use tracing::warn;

#[derive(Debug, Clone, Default)]
struct RuntimeFrame {
    input: ContractCallInput,
    code_size: usize,
    read_only: bool,
    callback_closure: Vec<u8>,
    breakpoint: BreakpointValue,
    error: Option<WrappableError>,
}

/// Per-invocation runtime state: call input, breakpoint and error chain.
#[derive(Debug)]
pub struct RuntimeContext {
    frame: RuntimeFrame,
    stack: Snapshots<RuntimeFrame>,
    fatal: Option<HostError>,
    live_instances: usize,
    max_instances: usize,
    max_call_depth: usize,
}

impl RuntimeContext {
    pub fn new(max_call_depth: usize, max_instances: usize) -> Self {
        Self {
            frame: RuntimeFrame::default(),
            stack: Snapshots::new("runtime"),
            fatal: None,
            live_instances: 0,
            max_instances,
            max_call_depth,
        }
    }

    pub fn init_from_input(&mut self, input: ContractCallInput, code_size: usize, read_only: bool) {
        self.frame = RuntimeFrame {
            input,
            code_size,
            read_only,
            ..RuntimeFrame::default()
        };
    }

    pub fn input(&self) -> &ContractCallInput {
        &self.frame.input
    }

    pub fn function(&self) -> &str {
        &self.frame.input.function
    }

    pub fn set_function(&mut self, function: &str) {
        self.frame.input.function = function.to_string();
    }

    pub fn address(&self) -> Address {
        self.frame.input.recipient
    }

    pub fn caller(&self) -> Address {
        self.frame.input.vm_input.caller
    }

    pub fn arguments(&self) -> &[Vec<u8>] {
        &self.frame.input.vm_input.arguments
    }

    pub fn call_value(&self) -> &BigUint {
        &self.frame.input.vm_input.call_value
    }

    pub fn code_size(&self) -> usize {
        self.frame.code_size
    }

    pub fn is_read_only(&self) -> bool {
        self.frame.read_only
    }

    pub fn set_callback_closure(&mut self, closure: Vec<u8>) {
        self.frame.callback_closure = closure;
    }

    pub fn callback_closure(&self) -> &[u8] {
        &self.frame.callback_closure
    }

    pub fn breakpoint(&self) -> BreakpointValue {
        self.frame.breakpoint
    }

    pub fn set_breakpoint(&mut self, breakpoint: BreakpointValue) {
        self.frame.breakpoint = breakpoint;
    }

    /// Consumes the breakpoint of the current call.
    pub fn take_breakpoint(&mut self) -> BreakpointValue {
        std::mem::take(&mut self.frame.breakpoint)
    }

    /// Records a failed host call and returns the breakpoint that stops the
    /// contract. Internal errors are also kept as the transaction's fatal
    /// error.
    #[track_caller]
    pub fn fail_execution(&mut self, error: HostError) -> BreakpointValue {
        if error.is_fatal() && self.fatal.is_none() {
            warn!(%error, "fatal error inside contract call");
            self.fatal = Some(error.clone());
        }
        let breakpoint = breakpoint_for_error(&error);
        self.frame.error = Some(match self.frame.error.take() {
            Some(chain) => chain.wrap_with_error(error),
            None => WrappableError::wrap(error),
        });
        if !self.frame.breakpoint.is_failure() {
            self.frame.breakpoint = breakpoint;
        }
        self.frame.breakpoint
    }

    /// Adds a free-form provenance note to the current error chain.
    #[track_caller]
    pub fn add_error_context(&mut self, message: impl Into<String>) {
        if let Some(chain) = self.frame.error.take() {
            self.frame.error = Some(chain.wrap_with_message(message));
        }
    }

    pub fn error(&self) -> Option<&WrappableError> {
        self.frame.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<WrappableError> {
        self.frame.error.take()
    }

    pub fn has_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    pub fn set_fatal(&mut self, error: HostError) {
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
    }

    pub fn take_fatal(&mut self) -> Option<HostError> {
        self.fatal.take()
    }

    /// Current nesting depth; the top-level call is depth 1.
    pub fn call_depth(&self) -> usize {
        self.stack.depth() + 1
    }

    /// Fails when entering one more nested call would exceed the limit.
    pub fn check_nested_call_depth(&self) -> Result<()> {
        let depth = self.call_depth() + 1;
        if depth > self.max_call_depth {
            return Err(HostError::CallStackOverflow {
                depth,
                max: self.max_call_depth,
            });
        }
        Ok(())
    }

    pub fn start_instance(&mut self) -> Result<()> {
        if self.live_instances >= self.max_instances {
            return Err(HostError::MaxInstancesReached(self.max_instances));
        }
        self.live_instances += 1;
        Ok(())
    }

    pub fn end_instance(&mut self) {
        self.live_instances = self.live_instances.saturating_sub(1);
    }

    pub fn live_instances(&self) -> usize {
        self.live_instances
    }
}

impl StateStack for RuntimeContext {
    fn init_state(&mut self) {
        self.frame = RuntimeFrame::default();
    }

    fn push_state(&mut self) {
        self.stack.push(self.frame.clone());
    }

    fn pop_set_active_state(&mut self) -> Result<()> {
        self.frame = self.stack.pop()?;
        Ok(())
    }

    fn pop_discard(&mut self) -> Result<()> {
        self.stack.pop().map(|_| ())
    }

    fn clear_state_stack(&mut self) {
        self.stack.clear();
    }

    fn state_stack_depth(&self) -> usize {
        self.stack.depth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakpoint_is_consumed_once() {
        let mut runtime = RuntimeContext::new(4, 4);
        runtime.set_breakpoint(BreakpointValue::AsyncCall);
        assert_eq!(runtime.take_breakpoint(), BreakpointValue::AsyncCall);
        assert_eq!(runtime.take_breakpoint(), BreakpointValue::None);
    }

    #[test]
    fn first_failure_breakpoint_sticks_and_errors_chain() {
        let mut runtime = RuntimeContext::new(4, 4);
        assert_eq!(runtime.fail_execution(HostError::NotEnoughGas), BreakpointValue::OutOfGas);
        assert_eq!(
            runtime.fail_execution(HostError::SignalError("later".into())),
            BreakpointValue::OutOfGas
        );
        let chain = runtime.take_error().unwrap();
        assert_eq!(chain.base_error(), &HostError::NotEnoughGas);
        assert_eq!(chain.last_error(), &HostError::SignalError("later".into()));
        assert!(!runtime.has_fatal());
    }

    #[test]
    fn internal_errors_become_fatal() {
        let mut runtime = RuntimeContext::new(4, 4);
        runtime.fail_execution(HostError::StateStackUnderflow { context: "output" });
        assert!(runtime.has_fatal());
        assert_eq!(runtime.breakpoint(), BreakpointValue::ExecutionFailed);
    }

    #[test]
    fn depth_and_instance_limits() {
        let mut runtime = RuntimeContext::new(2, 1);
        runtime.check_nested_call_depth().unwrap();
        runtime.push_state();
        assert_eq!(
            runtime.check_nested_call_depth(),
            Err(HostError::CallStackOverflow { depth: 3, max: 2 })
        );
        runtime.pop_set_active_state().unwrap();

        runtime.start_instance().unwrap();
        assert_eq!(runtime.start_instance(), Err(HostError::MaxInstancesReached(1)));
        runtime.end_instance();
        runtime.start_instance().unwrap();
    }

    #[test]
    fn parent_frame_is_restored() {
        let mut runtime = RuntimeContext::new(4, 4);
        let parent = ContractCallInput::new(Address([1; 32]), Address([2; 32]), "parent");
        runtime.init_from_input(parent, 10, false);
        runtime.push_state();
        let child = ContractCallInput::new(Address([2; 32]), Address([3; 32]), "child");
        runtime.init_from_input(child, 20, true);
        assert_eq!(runtime.function(), "child");
        assert!(runtime.is_read_only());
        runtime.pop_set_active_state().unwrap();
        assert_eq!(runtime.function(), "parent");
        assert_eq!(runtime.address(), Address([2; 32]));
    }
}
