use super::{Address, AsyncArguments, CallType};
use num_bigint::{BigInt, BigUint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome reported at the transaction boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ReturnCode {
    #[default]
    Ok = 0,
    FunctionNotFound = 1,
    FunctionWrongSignature = 2,
    ContractNotFound = 3,
    UserError = 4,
    OutOfGas = 5,
    AccountCollision = 6,
    OutOfFunds = 7,
    CallStackOverFlow = 8,
    ContractInvalid = 9,
    ExecutionFailed = 10,
    UpgradeFailed = 11,
    SimulateFailed = 12,
    MemoryLimit = 13,
}

impl ReturnCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        let code = match value {
            0 => ReturnCode::Ok,
            1 => ReturnCode::FunctionNotFound,
            2 => ReturnCode::FunctionWrongSignature,
            3 => ReturnCode::ContractNotFound,
            4 => ReturnCode::UserError,
            5 => ReturnCode::OutOfGas,
            6 => ReturnCode::AccountCollision,
            7 => ReturnCode::OutOfFunds,
            8 => ReturnCode::CallStackOverFlow,
            9 => ReturnCode::ContractInvalid,
            10 => ReturnCode::ExecutionFailed,
            11 => ReturnCode::UpgradeFailed,
            12 => ReturnCode::SimulateFailed,
            13 => ReturnCode::MemoryLimit,
            _ => return None,
        };
        Some(code)
    }

    /// Minimal big-endian encoding used as the first callback argument.
    pub fn to_bytes(self) -> Vec<u8> {
        let value = self.as_u16();
        if value == 0 {
            return Vec::new();
        }
        value
            .to_be_bytes()
            .iter()
            .copied()
            .skip_while(|b| *b == 0)
            .collect()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > 2 {
            return None;
        }
        let value = bytes.iter().fold(0u16, |acc, b| (acc << 8) | u16::from(*b));
        Self::from_u16(value)
    }

    pub fn is_ok(self) -> bool {
        self == ReturnCode::Ok
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReturnCode::Ok => "ok",
            ReturnCode::FunctionNotFound => "function not found",
            ReturnCode::FunctionWrongSignature => "wrong signature for function",
            ReturnCode::ContractNotFound => "contract not found",
            ReturnCode::UserError => "user error",
            ReturnCode::OutOfGas => "out of gas",
            ReturnCode::AccountCollision => "account collision",
            ReturnCode::OutOfFunds => "out of funds",
            ReturnCode::CallStackOverFlow => "call stack overflow",
            ReturnCode::ContractInvalid => "contract invalid",
            ReturnCode::ExecutionFailed => "execution failed",
            ReturnCode::UpgradeFailed => "upgrade failed",
            ReturnCode::SimulateFailed => "simulate failed",
            ReturnCode::MemoryLimit => "memory limit",
        };
        write!(f, "{}", s)
    }
}

/// Pending value of one storage cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUpdate {
    pub offset: Vec<u8>,
    pub data: Vec<u8>,
    pub written: bool,
}

/// Value or message sent from one account to another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTransfer {
    pub sender: Address,
    pub value: BigUint,
    pub gas_limit: u64,
    pub gas_locked: u64,
    pub data: Vec<u8>,
    pub call_type: CallType,
    /// Set when the transfer carries an async call or its callback.
    pub async_data: Option<AsyncArguments>,
}

/// Every change the transaction makes to one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputAccount {
    pub address: Address,
    pub nonce: u64,
    pub balance_delta: BigInt,
    pub storage_updates: BTreeMap<Vec<u8>, StorageUpdate>,
    pub code: Option<Vec<u8>>,
    pub code_metadata: Vec<u8>,
    pub output_transfers: Vec<OutputTransfer>,
}

impl OutputAccount {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    /// Folds `other` into `self`; later writes win.
    pub fn merge(&mut self, other: &OutputAccount) {
        self.nonce = self.nonce.max(other.nonce);
        self.balance_delta += &other.balance_delta;
        for (key, update) in &other.storage_updates {
            self.storage_updates.insert(key.clone(), update.clone());
        }
        if other.code.is_some() {
            self.code = other.code.clone();
            self.code_metadata = other.code_metadata.clone();
        }
        self.output_transfers
            .extend(other.output_transfers.iter().cloned());
    }
}

/// Event emitted by a contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub identifier: Vec<u8>,
    pub address: Address,
    pub topics: Vec<Vec<u8>>,
    pub data: Vec<Vec<u8>>,
}

/// Complete, serializable outcome of one contract invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmOutput {
    pub return_data: Vec<Vec<u8>>,
    pub return_code: ReturnCode,
    pub return_message: String,
    pub gas_remaining: u64,
    pub output_accounts: BTreeMap<Address, OutputAccount>,
    pub deleted_accounts: Vec<Address>,
    pub logs: Vec<LogEntry>,
}

impl VmOutput {
    pub fn failed(code: ReturnCode, message: impl Into<String>) -> Self {
        Self {
            return_code: code,
            return_message: message.into(),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.return_code.is_ok()
    }

    pub fn account(&self, address: &Address) -> Option<&OutputAccount> {
        self.output_accounts.get(address)
    }

    /// Every outgoing transfer, in account order.
    pub fn transfers(&self) -> impl Iterator<Item = (&Address, &OutputTransfer)> {
        self.output_accounts
            .iter()
            .flat_map(|(address, account)| account.output_transfers.iter().map(move |t| (address, t)))
    }

    /// Folds another output into this one. Return data and logs are appended.
    pub fn merge(&mut self, other: &VmOutput) {
        for (address, account) in &other.output_accounts {
            self.output_accounts
                .entry(*address)
                .or_insert_with(|| OutputAccount::new(*address))
                .merge(account);
        }
        for address in &other.deleted_accounts {
            if !self.deleted_accounts.contains(address) {
                self.deleted_accounts.push(*address);
            }
        }
        self.logs.extend(other.logs.iter().cloned());
        self.return_data.extend(other.return_data.iter().cloned());
    }
}
