use super::Address;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// How a contract invocation was reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CallType {
    #[default]
    DirectCall = 0,
    AsynchronousCall = 1,
    AsynchronousCallBack = 2,
    ESDTTransferAndExecute = 3,
}

impl CallType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CallType::DirectCall),
            1 => Some(CallType::AsynchronousCall),
            2 => Some(CallType::AsynchronousCallBack),
            3 => Some(CallType::ESDTTransferAndExecute),
            _ => None,
        }
    }
}

/// Correlation data carried by asynchronous calls and their callbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncArguments {
    /// Identifier of the async call itself.
    pub call_id: Vec<u8>,
    /// Identifier of the invocation that scheduled the call.
    pub caller_call_id: Vec<u8>,
}

/// Fungible token payment attached to a call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EsdtTransfer {
    pub token_identifier: Vec<u8>,
    pub nonce: u64,
    pub value: BigUint,
}

/// Fields shared by every kind of contract invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInput {
    pub caller: Address,
    pub arguments: Vec<Vec<u8>>,
    pub call_value: BigUint,
    pub call_type: CallType,
    pub gas_price: u64,
    pub gas_provided: u64,
    /// Gas travelling with the call that the callee may not spend; it is
    /// reserved for the caller's callback.
    pub gas_locked: u64,
    pub original_tx_hash: Vec<u8>,
    pub current_tx_hash: Vec<u8>,
    pub esdt_transfers: Vec<EsdtTransfer>,
    pub async_arguments: Option<AsyncArguments>,
}

/// Invocation of a function on an existing contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCallInput {
    pub vm_input: VmInput,
    pub recipient: Address,
    pub function: String,
    pub allow_init_function: bool,
}

impl ContractCallInput {
    pub fn new(caller: Address, recipient: Address, function: impl Into<String>) -> Self {
        Self {
            vm_input: VmInput {
                caller,
                ..VmInput::default()
            },
            recipient,
            function: function.into(),
            allow_init_function: false,
        }
    }

    pub fn with_gas(mut self, gas_provided: u64) -> Self {
        self.vm_input.gas_provided = gas_provided;
        self
    }

    pub fn with_arguments(mut self, arguments: Vec<Vec<u8>>) -> Self {
        self.vm_input.arguments = arguments;
        self
    }

    pub fn with_value(mut self, value: BigUint) -> Self {
        self.vm_input.call_value = value;
        self
    }

    pub fn with_call_type(mut self, call_type: CallType) -> Self {
        self.vm_input.call_type = call_type;
        self
    }

    pub fn with_tx_hash(mut self, hash: Vec<u8>) -> Self {
        self.vm_input.original_tx_hash = hash.clone();
        self.vm_input.current_tx_hash = hash;
        self
    }
}

/// Deployment of new contract code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCreateInput {
    pub vm_input: VmInput,
    pub contract_code: Vec<u8>,
    pub contract_code_metadata: Vec<u8>,
}
