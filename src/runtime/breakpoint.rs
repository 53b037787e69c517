use serde::{Deserialize, Serialize};
use std::fmt;

/// Control-flow signal raised from inside a host call to stop the instance.
///
/// A breakpoint is terminal for the function that raised it: the instance is
/// never resumed afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BreakpointValue {
    #[default]
    None = 0,
    ExecutionFailed = 1,
    AsyncCall = 2,
    SignalError = 3,
    OutOfGas = 4,
    MemoryLimit = 5,
}

impl BreakpointValue {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(BreakpointValue::None),
            1 => Some(BreakpointValue::ExecutionFailed),
            2 => Some(BreakpointValue::AsyncCall),
            3 => Some(BreakpointValue::SignalError),
            4 => Some(BreakpointValue::OutOfGas),
            5 => Some(BreakpointValue::MemoryLimit),
            _ => None,
        }
    }

    pub fn is_set(self) -> bool {
        self != BreakpointValue::None
    }

    /// True for every breakpoint that ends the call as a failure.
    pub fn is_failure(self) -> bool {
        !matches!(self, BreakpointValue::None | BreakpointValue::AsyncCall)
    }
}

impl fmt::Display for BreakpointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BreakpointValue::None => "none",
            BreakpointValue::ExecutionFailed => "execution failed",
            BreakpointValue::AsyncCall => "async call",
            BreakpointValue::SignalError => "signal error",
            BreakpointValue::OutOfGas => "out of gas",
            BreakpointValue::MemoryLimit => "memory limit",
        };
        write!(f, "{}", s)
    }
}
