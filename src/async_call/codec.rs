//! Persisted form of an [`AsyncContext`].
//!
//! Enums travel as their `u8` discriminant, values as big-endian magnitude
//! bytes and return codes as `u16`, so the stored layout does not depend on
//! the in-memory representation.

use super::call::{AsyncCall, AsyncCallExecutionMode, AsyncCallStatus};
use super::context::AsyncContext;
use super::group::AsyncCallGroup;
use super::results::{AsyncCallResults, FinishedAsyncCall, ResultTransfer};
use crate::types::{Address, ReturnCode};
use crate::{HostError, Result};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableAsyncCall {
    pub call_id: Vec<u8>,
    pub status: u8,
    pub execution_mode: u8,
    pub destination: Address,
    pub data: Vec<u8>,
    pub value: Vec<u8>,
    pub gas_limit: u64,
    pub gas_locked: u64,
    pub success_callback: String,
    pub error_callback: String,
    pub callback_closure: Vec<u8>,
    pub is_builtin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableAsyncCallGroup {
    pub identifier: String,
    pub callback: String,
    pub gas_locked: u64,
    pub callback_data: Vec<u8>,
    pub calls: Vec<SerializableAsyncCall>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableResultTransfer {
    pub destination: Address,
    pub value: Vec<u8>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableCallResults {
    pub return_code: u16,
    pub return_message: String,
    pub return_data: Vec<Vec<u8>>,
    pub transfers: Vec<SerializableResultTransfer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableFinishedAsyncCall {
    pub call_id: Vec<u8>,
    pub destination: Address,
    pub execution_mode: u8,
    pub initial: SerializableCallResults,
    pub callback: Option<SerializableCallResults>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableAsyncContext {
    pub address: Address,
    pub call_id: Vec<u8>,
    pub caller_call_id: Vec<u8>,
    pub calls_counter: u64,
    pub groups: Vec<SerializableAsyncCallGroup>,
    pub results: Vec<SerializableFinishedAsyncCall>,
}

fn value_bytes(value: &BigUint) -> Vec<u8> {
    if value == &BigUint::default() {
        Vec::new()
    } else {
        value.to_bytes_be()
    }
}

impl From<&AsyncCall> for SerializableAsyncCall {
    fn from(call: &AsyncCall) -> Self {
        Self {
            call_id: call.call_id.clone(),
            status: call.status.as_u8(),
            execution_mode: call.execution_mode.as_u8(),
            destination: call.destination,
            data: call.data.clone(),
            value: value_bytes(&call.value),
            gas_limit: call.gas_limit,
            gas_locked: call.gas_locked,
            success_callback: call.success_callback.clone(),
            error_callback: call.error_callback.clone(),
            callback_closure: call.callback_closure.clone(),
            is_builtin: call.is_builtin,
        }
    }
}

impl TryFrom<SerializableAsyncCall> for AsyncCall {
    type Error = HostError;

    fn try_from(call: SerializableAsyncCall) -> Result<Self> {
        let status = AsyncCallStatus::from_u8(call.status).ok_or_else(|| {
            HostError::AsyncContextCodec(format!("unknown call status {}", call.status))
        })?;
        let execution_mode = AsyncCallExecutionMode::from_u8(call.execution_mode).ok_or_else(|| {
            HostError::AsyncContextCodec(format!("unknown execution mode {}", call.execution_mode))
        })?;
        Ok(AsyncCall {
            call_id: call.call_id,
            status,
            execution_mode,
            destination: call.destination,
            data: call.data,
            value: BigUint::from_bytes_be(&call.value),
            gas_limit: call.gas_limit,
            gas_locked: call.gas_locked,
            success_callback: call.success_callback,
            error_callback: call.error_callback,
            callback_closure: call.callback_closure,
            is_builtin: call.is_builtin,
        })
    }
}

impl From<&AsyncCallGroup> for SerializableAsyncCallGroup {
    fn from(group: &AsyncCallGroup) -> Self {
        Self {
            identifier: group.identifier.clone(),
            callback: group.callback.clone(),
            gas_locked: group.gas_locked,
            callback_data: group.callback_data.clone(),
            calls: group.calls.iter().map(SerializableAsyncCall::from).collect(),
        }
    }
}

impl TryFrom<SerializableAsyncCallGroup> for AsyncCallGroup {
    type Error = HostError;

    fn try_from(group: SerializableAsyncCallGroup) -> Result<Self> {
        let calls = group
            .calls
            .into_iter()
            .map(AsyncCall::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(AsyncCallGroup {
            identifier: group.identifier,
            callback: group.callback,
            gas_locked: group.gas_locked,
            callback_data: group.callback_data,
            calls,
        })
    }
}

impl From<&AsyncCallResults> for SerializableCallResults {
    fn from(results: &AsyncCallResults) -> Self {
        Self {
            return_code: results.return_code.as_u16(),
            return_message: results.return_message.clone(),
            return_data: results.return_data.clone(),
            transfers: results
                .transfers
                .iter()
                .map(|t| SerializableResultTransfer {
                    destination: t.destination,
                    value: value_bytes(&t.value),
                    data: t.data.clone(),
                })
                .collect(),
        }
    }
}

impl TryFrom<SerializableCallResults> for AsyncCallResults {
    type Error = HostError;

    fn try_from(results: SerializableCallResults) -> Result<Self> {
        let return_code = ReturnCode::from_u16(results.return_code).ok_or_else(|| {
            HostError::AsyncContextCodec(format!("unknown return code {}", results.return_code))
        })?;
        Ok(AsyncCallResults {
            return_code,
            return_message: results.return_message,
            return_data: results.return_data,
            transfers: results
                .transfers
                .into_iter()
                .map(|t| ResultTransfer {
                    destination: t.destination,
                    value: BigUint::from_bytes_be(&t.value),
                    data: t.data,
                })
                .collect(),
        })
    }
}

impl From<&FinishedAsyncCall> for SerializableFinishedAsyncCall {
    fn from(finished: &FinishedAsyncCall) -> Self {
        Self {
            call_id: finished.call_id.clone(),
            destination: finished.destination,
            execution_mode: finished.execution_mode.as_u8(),
            initial: SerializableCallResults::from(&finished.initial),
            callback: finished.callback.as_ref().map(SerializableCallResults::from),
        }
    }
}

impl TryFrom<SerializableFinishedAsyncCall> for FinishedAsyncCall {
    type Error = HostError;

    fn try_from(finished: SerializableFinishedAsyncCall) -> Result<Self> {
        let execution_mode = AsyncCallExecutionMode::from_u8(finished.execution_mode).ok_or_else(|| {
            HostError::AsyncContextCodec(format!("unknown execution mode {}", finished.execution_mode))
        })?;
        Ok(FinishedAsyncCall {
            call_id: finished.call_id,
            destination: finished.destination,
            execution_mode,
            initial: finished.initial.try_into()?,
            callback: finished.callback.map(AsyncCallResults::try_from).transpose()?,
        })
    }
}

impl From<&AsyncContext> for SerializableAsyncContext {
    fn from(context: &AsyncContext) -> Self {
        Self {
            address: context.address(),
            call_id: context.call_id().to_vec(),
            caller_call_id: context.caller_call_id().to_vec(),
            calls_counter: context.calls_counter(),
            groups: context.groups().map(SerializableAsyncCallGroup::from).collect(),
            results: context
                .results()
                .iter()
                .map(SerializableFinishedAsyncCall::from)
                .collect(),
        }
    }
}

impl TryFrom<SerializableAsyncContext> for AsyncContext {
    type Error = HostError;

    fn try_from(context: SerializableAsyncContext) -> Result<Self> {
        let groups = context
            .groups
            .into_iter()
            .map(AsyncCallGroup::try_from)
            .collect::<Result<Vec<_>>>()?;
        let results = context
            .results
            .into_iter()
            .map(FinishedAsyncCall::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(AsyncContext::from_parts(
            context.address,
            context.call_id,
            context.caller_call_id,
            context.calls_counter,
            groups,
            results,
        ))
    }
}

pub fn encode_async_context(context: &AsyncContext) -> Result<Vec<u8>> {
    bincode::serialize(&SerializableAsyncContext::from(context))
        .map_err(|e| HostError::AsyncContextCodec(e.to_string()))
}

pub fn decode_async_context(bytes: &[u8]) -> Result<AsyncContext> {
    let wire: SerializableAsyncContext =
        bincode::deserialize(bytes).map_err(|e| HostError::AsyncContextCodec(e.to_string()))?;
    AsyncContext::try_from(wire)
}
