//! Values exchanged between the host and its callers: addresses, call inputs
//! and the result record.

mod address;
mod input;
mod output;

pub use address::{Address, SC_ADDRESS_ZERO_PREFIX};
pub use input::{AsyncArguments, CallType, ContractCallInput, ContractCreateInput, EsdtTransfer, VmInput};
pub use output::{LogEntry, OutputAccount, OutputTransfer, ReturnCode, StorageUpdate, VmOutput};
