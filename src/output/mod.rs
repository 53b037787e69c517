//! Output accumulator.
//!
//! One [`VmOutput`] grows for the whole transaction. Entering a nested call
//! snapshots it; a failed child is undone by restoring the snapshot and a
//! successful one is kept by dropping it. Each level also remembers where its
//! own return data starts so callers can read or detach what a child
//! returned.

use crate::state::{Snapshots, StateStack};
use crate::types::{
    Address, AsyncArguments, CallType, LogEntry, OutputAccount, OutputTransfer, ReturnCode,
    StorageUpdate, VmOutput,
};
use crate::{HostError, Result};
use num_bigint::{BigInt, BigUint};
use tracing::debug;

#[derive(Debug, Clone)]
struct OutputFrame {
    output: VmOutput,
    return_data_mark: usize,
}

/// Value transfer requested by a contract or by the host.
#[derive(Debug, Clone, Default)]
pub struct TransferRequest {
    pub sender: Address,
    pub destination: Address,
    pub value: BigUint,
    pub gas_limit: u64,
    pub gas_locked: u64,
    pub data: Vec<u8>,
    pub call_type: CallType,
}

#[derive(Debug)]
pub struct OutputContext {
    output: VmOutput,
    return_data_mark: usize,
    stack: Snapshots<OutputFrame>,
}

impl Default for OutputContext {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputContext {
    pub fn new() -> Self {
        Self {
            output: VmOutput::default(),
            return_data_mark: 0,
            stack: Snapshots::new("output"),
        }
    }

    pub fn account(&self, address: &Address) -> Option<&OutputAccount> {
        self.output.output_accounts.get(address)
    }

    pub fn account_mut(&mut self, address: &Address) -> &mut OutputAccount {
        self.output
            .output_accounts
            .entry(*address)
            .or_insert_with(|| OutputAccount::new(*address))
    }

    /// Pending balance change of `address` within this transaction.
    pub fn balance_delta(&self, address: &Address) -> BigInt {
        self.account(address)
            .map(|account| account.balance_delta.clone())
            .unwrap_or_default()
    }

    pub fn finish(&mut self, data: Vec<u8>) {
        self.output.return_data.push(data);
    }

    pub fn return_data(&self) -> &[Vec<u8>] {
        &self.output.return_data
    }

    /// Return data produced since the current level was entered.
    pub fn current_return_data(&self) -> &[Vec<u8>] {
        let mark = self.return_data_mark.min(self.output.return_data.len());
        &self.output.return_data[mark..]
    }

    pub fn return_data_len(&self) -> usize {
        self.output.return_data.len()
    }

    /// Marks the start of a new level's return data.
    pub fn set_return_data_mark(&mut self, mark: usize) {
        self.return_data_mark = mark;
    }

    pub fn truncate_return_data(&mut self, len: usize) {
        self.output.return_data.truncate(len);
    }

    /// Removes and returns the return data written after `mark`.
    pub fn take_return_data_from(&mut self, mark: usize) -> Vec<Vec<u8>> {
        let mark = mark.min(self.output.return_data.len());
        self.output.return_data.split_off(mark)
    }

    pub fn clear_return_data(&mut self) {
        self.output.return_data.clear();
        self.return_data_mark = 0;
    }

    pub fn write_log(&mut self, address: Address, identifier: Vec<u8>, topics: Vec<Vec<u8>>, data: Vec<Vec<u8>>) {
        self.output.logs.push(LogEntry {
            identifier,
            address,
            topics,
            data,
        });
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.output.logs
    }

    /// Moves value from `sender` to `destination` and records the outgoing
    /// message. `sender_balance` is the sender's effective balance; paying
    /// more than that fails with [`HostError::OutOfFunds`].
    pub fn transfer(&mut self, sender_balance: &BigUint, request: TransferRequest) -> Result<()> {
        self.push_transfer(sender_balance, request, None)
    }

    /// Like [`transfer`](Self::transfer) but correlates the message with an
    /// async call.
    pub fn transfer_with_async_data(
        &mut self,
        sender_balance: &BigUint,
        request: TransferRequest,
        async_data: AsyncArguments,
    ) -> Result<()> {
        self.push_transfer(sender_balance, request, Some(async_data))
    }

    fn push_transfer(
        &mut self,
        sender_balance: &BigUint,
        request: TransferRequest,
        async_data: Option<AsyncArguments>,
    ) -> Result<()> {
        if &request.value > sender_balance {
            return Err(HostError::OutOfFunds {
                have: sender_balance.to_string(),
                need: request.value.to_string(),
            });
        }
        debug!(
            sender = %request.sender,
            destination = %request.destination,
            value = %request.value,
            gas_limit = request.gas_limit,
            call_type = ?request.call_type,
            "output transfer"
        );
        let value = BigInt::from(request.value.clone());
        self.account_mut(&request.sender).balance_delta -= &value;
        let destination = self.account_mut(&request.destination);
        destination.balance_delta += &value;
        destination.output_transfers.push(OutputTransfer {
            sender: request.sender,
            value: request.value,
            gas_limit: request.gas_limit,
            gas_locked: request.gas_locked,
            data: request.data,
            call_type: request.call_type,
            async_data,
        });
        Ok(())
    }

    /// Credits value that arrived from outside this transaction.
    pub fn credit(&mut self, address: &Address, value: &BigUint) {
        self.account_mut(address).balance_delta += BigInt::from(value.clone());
    }

    /// Records a storage write and returns the update it replaced.
    pub fn set_storage_update(&mut self, address: &Address, key: &[u8], value: &[u8]) -> Option<StorageUpdate> {
        self.account_mut(address).storage_updates.insert(
            key.to_vec(),
            StorageUpdate {
                offset: key.to_vec(),
                data: value.to_vec(),
                written: true,
            },
        )
    }

    pub fn storage_update(&self, address: &Address, key: &[u8]) -> Option<&StorageUpdate> {
        self.account(address)
            .and_then(|account| account.storage_updates.get(key))
    }

    pub fn deploy_code(&mut self, address: &Address, code: Vec<u8>, metadata: Vec<u8>) {
        let account = self.account_mut(address);
        account.code = Some(code);
        account.code_metadata = metadata;
    }

    pub fn set_nonce(&mut self, address: &Address, nonce: u64) {
        self.account_mut(address).nonce = nonce;
    }

    pub fn delete_account(&mut self, address: &Address) {
        if !self.output.deleted_accounts.contains(address) {
            self.output.deleted_accounts.push(*address);
        }
    }

    /// Folds the result of a builtin function into the accumulated output.
    pub fn merge_vm_output(&mut self, other: &VmOutput) {
        self.output.merge(other);
    }

    /// Successful result of the transaction so far.
    pub fn create_vm_output(&self, gas_remaining: u64) -> VmOutput {
        let mut output = self.output.clone();
        output.return_code = ReturnCode::Ok;
        output.gas_remaining = gas_remaining;
        output
            .output_accounts
            .retain(|_, account| !is_untouched(account));
        output
    }

    /// Failed result: no effects survive, only the code and message.
    pub fn create_failed_vm_output(&self, error: &HostError) -> VmOutput {
        VmOutput::failed(error.return_code(), error.to_string())
    }

    /// Replaces the accumulated output wholesale.
    pub fn reset(&mut self) {
        self.output = VmOutput::default();
        self.return_data_mark = 0;
    }
}

fn is_untouched(account: &OutputAccount) -> bool {
    account.nonce == 0
        && account.balance_delta == BigInt::default()
        && account.storage_updates.is_empty()
        && account.code.is_none()
        && account.output_transfers.is_empty()
}

impl StateStack for OutputContext {
    fn init_state(&mut self) {
        self.reset();
    }

    fn push_state(&mut self) {
        self.stack.push(OutputFrame {
            output: self.output.clone(),
            return_data_mark: self.return_data_mark,
        });
        self.return_data_mark = self.output.return_data.len();
    }

    fn pop_set_active_state(&mut self) -> Result<()> {
        let frame = self.stack.pop()?;
        self.output = frame.output;
        self.return_data_mark = frame.return_data_mark;
        Ok(())
    }

    fn pop_discard(&mut self) -> Result<()> {
        let frame = self.stack.pop()?;
        self.return_data_mark = frame.return_data_mark;
        Ok(())
    }

    fn clear_state_stack(&mut self) {
        self.stack.clear();
    }

    fn state_stack_depth(&self) -> usize {
        self.stack.depth()
    }
}
