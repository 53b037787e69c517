use crate::types::{Address, ReturnCode};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AsyncCallStatus {
    #[default]
    Pending = 0,
    Resolved = 1,
    Rejected = 2,
}

impl AsyncCallStatus {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AsyncCallStatus::Pending),
            1 => Some(AsyncCallStatus::Resolved),
            2 => Some(AsyncCallStatus::Rejected),
            _ => None,
        }
    }
}

/// Where and how an async call gets resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AsyncCallExecutionMode {
    /// Ordinary contract in this shard: resolved in-process.
    #[default]
    SyncExecution = 0,
    /// Builtin function in this shard.
    AsyncBuiltinFuncIntraShard = 1,
    /// Builtin function whose remainder runs in another shard.
    AsyncBuiltinFuncCrossShard = 2,
    /// Callback that arrives together with a token transfer.
    ESDTTransferOnCallBack = 3,
    /// Contract in another shard: resolved by a later transaction.
    AsyncUnknown = 4,
}

impl AsyncCallExecutionMode {
    pub const ALL: [AsyncCallExecutionMode; 5] = [
        AsyncCallExecutionMode::SyncExecution,
        AsyncCallExecutionMode::AsyncBuiltinFuncIntraShard,
        AsyncCallExecutionMode::AsyncBuiltinFuncCrossShard,
        AsyncCallExecutionMode::ESDTTransferOnCallBack,
        AsyncCallExecutionMode::AsyncUnknown,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    pub fn is_remote(self) -> bool {
        matches!(
            self,
            AsyncCallExecutionMode::AsyncUnknown | AsyncCallExecutionMode::AsyncBuiltinFuncCrossShard
        )
    }
}

/// Execution mode of a call towards a destination in `same_shard`, calling
/// a builtin function or not.
pub fn determine_execution_mode(same_shard: bool, is_builtin: bool) -> AsyncCallExecutionMode {
    match (same_shard, is_builtin) {
        (true, false) => AsyncCallExecutionMode::SyncExecution,
        (true, true) => AsyncCallExecutionMode::AsyncBuiltinFuncIntraShard,
        (false, true) => AsyncCallExecutionMode::AsyncBuiltinFuncCrossShard,
        (false, false) => AsyncCallExecutionMode::AsyncUnknown,
    }
}

/// One scheduled outgoing call. Every field is owned, so clones never share
/// buffers with the original.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsyncCall {
    pub call_id: Vec<u8>,
    pub status: AsyncCallStatus,
    pub execution_mode: AsyncCallExecutionMode,
    pub destination: Address,
    pub data: Vec<u8>,
    pub value: BigUint,
    pub gas_limit: u64,
    /// Gas reserved for the callback.
    pub gas_locked: u64,
    pub success_callback: String,
    pub error_callback: String,
    pub callback_closure: Vec<u8>,
    pub is_builtin: bool,
}

impl AsyncCall {
    /// Settles a pending call from the destination's return code. A call
    /// that already resolved or rejected keeps its status.
    pub fn update_status(&mut self, code: ReturnCode) {
        if self.status != AsyncCallStatus::Pending {
            return;
        }
        self.status = if code.is_ok() {
            AsyncCallStatus::Resolved
        } else {
            AsyncCallStatus::Rejected
        };
    }

    /// Success callback when resolved; the error callback otherwise,
    /// including while the call is still pending.
    pub fn get_callback_name(&self) -> &str {
        match self.status {
            AsyncCallStatus::Resolved => &self.success_callback,
            AsyncCallStatus::Pending | AsyncCallStatus::Rejected => &self.error_callback,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.execution_mode.is_remote()
    }

    pub fn is_local(&self) -> bool {
        !self.is_remote()
    }

    pub fn is_pending(&self) -> bool {
        self.status == AsyncCallStatus::Pending
    }

    pub fn has_callback(&self) -> bool {
        !self.get_callback_name().is_empty()
    }

    pub fn total_gas(&self) -> u64 {
        self.gas_limit.saturating_add(self.gas_locked)
    }
}
