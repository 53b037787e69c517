use super::call::AsyncCallExecutionMode;
use crate::types::{Address, ReturnCode};
use num_bigint::BigUint;

/// Value movement produced by one side of an async call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTransfer {
    pub destination: Address,
    pub value: BigUint,
    pub data: Vec<u8>,
}

/// What one invocation reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsyncCallResults {
    pub return_code: ReturnCode,
    pub return_message: String,
    pub return_data: Vec<Vec<u8>>,
    pub transfers: Vec<ResultTransfer>,
}

impl AsyncCallResults {
    pub fn success(return_data: Vec<Vec<u8>>) -> Self {
        Self {
            return_data,
            ..Self::default()
        }
    }

    pub fn failure(return_code: ReturnCode, message: impl Into<String>) -> Self {
        Self {
            return_code,
            return_message: message.into(),
            ..Self::default()
        }
    }

    /// Arguments handed to the callback: the return code first, then either
    /// the return data or the failure message.
    pub fn callback_arguments(&self) -> Vec<Vec<u8>> {
        let mut arguments = vec![self.return_code.to_bytes()];
        if self.return_code.is_ok() {
            arguments.extend(self.return_data.iter().cloned());
        } else {
            arguments.push(self.return_message.as_bytes().to_vec());
        }
        arguments
    }
}

/// Outcome of an async call and, separately, of its callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinishedAsyncCall {
    pub call_id: Vec<u8>,
    pub destination: Address,
    /// Mode the call settled in; a callback carrying tokens switches it to
    /// [`AsyncCallExecutionMode::ESDTTransferOnCallBack`].
    pub execution_mode: AsyncCallExecutionMode,
    pub initial: AsyncCallResults,
    pub callback: Option<AsyncCallResults>,
}
