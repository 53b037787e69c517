//! Host calls available to running contracts.
//!
//! Each hook charges its cost first, then does its work against the
//! transaction's contexts. A failing hook records the error on the runtime
//! and hands the engine a breakpoint, which stops the contract.

use super::TransactionHost;
use crate::config::{HostApiCost, ManagedBufferApiCost};
use crate::output::TransferRequest;
use crate::runtime::{
    AsyncCallRequest, BreakpointValue, CallRequest, CreateRequest, HookResult, VmHooks,
};
use crate::storage::StorageStatus;
use crate::types::{Address, CallType};
use crate::{HostError, Result};
use num_bigint::BigUint;
use tracing::trace;

pub(crate) struct HostHooks<'a, 'h> {
    tx: &'a mut TransactionHost<'h>,
}

impl<'a, 'h> HostHooks<'a, 'h> {
    pub(crate) fn new(tx: &'a mut TransactionHost<'h>) -> Self {
        Self { tx }
    }

    fn fail(&mut self, error: HostError) -> BreakpointValue {
        trace!(%error, "host call failed");
        self.tx.runtime.fail_execution(error)
    }

    fn lift<T>(&mut self, result: Result<T>) -> HookResult<T> {
        result.map_err(|error| self.fail(error))
    }

    fn charge(&mut self, amount: u64) -> HookResult<()> {
        let result = self
            .tx
            .check_watchdog()
            .and_then(|()| self.tx.metering.use_gas(amount));
        self.lift(result)
    }

    fn charge_api(&mut self, cost: fn(&HostApiCost) -> u64) -> HookResult<()> {
        let amount = cost(&self.tx.schedule.host_api_cost);
        self.charge(amount)
    }

    fn charge_managed(&mut self, cost: fn(&ManagedBufferApiCost) -> u64) -> HookResult<()> {
        let amount = cost(&self.tx.schedule.managed_buffer_api_cost);
        self.charge(amount)
    }

    fn charge_copy(&mut self, len: usize) -> HookResult<()> {
        let amount = self
            .tx
            .schedule
            .base_operation_cost
            .data_copy_per_byte
            .saturating_mul(len as u64);
        self.charge(amount)
    }

    fn ensure_writable(&mut self, operation: &'static str) -> HookResult<()> {
        if self.tx.runtime.is_read_only() {
            return Err(self.fail(HostError::ReadOnlyViolation(operation)));
        }
        Ok(())
    }
}

impl VmHooks for HostHooks<'_, '_> {
    fn consume_points(&mut self, points: u64) -> HookResult<()> {
        self.charge(points)
    }

    fn get_num_arguments(&mut self) -> HookResult<usize> {
        self.charge_api(|c| c.get_num_arguments)?;
        Ok(self.tx.runtime.arguments().len())
    }

    fn get_argument(&mut self, index: usize) -> HookResult<Vec<u8>> {
        self.charge_api(|c| c.get_argument)?;
        let argument = match self.tx.runtime.arguments().get(index) {
            Some(argument) => argument.clone(),
            None => {
                return Err(self.fail(HostError::InvalidArgument(format!(
                    "argument index {} out of range",
                    index
                ))))
            }
        };
        self.charge_copy(argument.len())?;
        Ok(argument)
    }

    fn get_function(&mut self) -> HookResult<String> {
        self.charge_api(|c| c.get_function)?;
        Ok(self.tx.runtime.function().to_string())
    }

    fn get_caller(&mut self) -> HookResult<Address> {
        self.charge_api(|c| c.get_caller)?;
        Ok(self.tx.runtime.caller())
    }

    fn get_sc_address(&mut self) -> HookResult<Address> {
        self.charge_api(|c| c.get_sc_address)?;
        Ok(self.tx.runtime.address())
    }

    fn get_call_value(&mut self) -> HookResult<BigUint> {
        self.charge_api(|c| c.get_call_value)?;
        Ok(self.tx.runtime.call_value().clone())
    }

    fn get_gas_left(&mut self) -> HookResult<u64> {
        self.charge_api(|c| c.get_gas_left)?;
        Ok(self.tx.metering.gas_left())
    }

    fn finish(&mut self, data: &[u8]) -> HookResult<()> {
        self.charge_api(|c| c.finish)?;
        self.charge_copy(data.len())?;
        self.tx.output.finish(data.to_vec());
        Ok(())
    }

    fn signal_error(&mut self, message: &str) -> HookResult<()> {
        self.charge_api(|c| c.signal_error)?;
        Err(self.fail(HostError::SignalError(message.to_string())))
    }

    fn storage_store(&mut self, key: &[u8], value: &[u8]) -> HookResult<StorageStatus> {
        self.charge_api(|c| c.storage_store)?;
        let tx = &mut *self.tx;
        let write = tx
            .storage
            .set_storage(&mut tx.output, tx.blockchain.hook(), key, value);
        let write = self.lift(write)?;
        let cost = write.gas_cost(&self.tx.schedule.base_operation_cost);
        self.charge(cost)?;
        Ok(write.status)
    }

    fn storage_load(&mut self, key: &[u8]) -> HookResult<Vec<u8>> {
        self.charge_api(|c| c.storage_load)?;
        let tx = &*self.tx;
        let value = tx.storage.get_storage(&tx.output, tx.blockchain.hook(), key);
        self.charge_copy(value.len())?;
        Ok(value)
    }

    fn write_log(&mut self, topics: &[Vec<u8>], data: &[u8]) -> HookResult<()> {
        self.ensure_writable("log")?;
        self.charge_api(|c| c.log)?;
        let len = data.len() + topics.iter().map(Vec::len).sum::<usize>();
        self.charge_copy(len)?;
        let (identifier, rest) = match topics.split_first() {
            Some((first, rest)) => (first.clone(), rest.to_vec()),
            None => (Vec::new(), Vec::new()),
        };
        let address = self.tx.runtime.address();
        self.tx
            .output
            .write_log(address, identifier, rest, vec![data.to_vec()]);
        Ok(())
    }

    fn transfer_value(&mut self, destination: &Address, value: &BigUint, data: &[u8]) -> HookResult<()> {
        self.ensure_writable("value transfer")?;
        self.charge_api(|c| c.transfer_value)?;
        self.charge_copy(data.len())?;
        let sender = self.tx.runtime.address();
        let balance = self.tx.blockchain.get_balance(&sender, &self.tx.output);
        let result = self.tx.output.transfer(
            &balance,
            TransferRequest {
                sender,
                destination: *destination,
                value: value.clone(),
                data: data.to_vec(),
                call_type: CallType::DirectCall,
                ..TransferRequest::default()
            },
        );
        self.lift(result)
    }

    fn execute_on_dest_context(&mut self, request: CallRequest) -> HookResult<i32> {
        self.charge_api(|c| c.execute_on_dest_context)?;
        let result = self.tx.execute_on_dest_context(request, false);
        self.lift(result)
    }

    fn execute_on_same_context(&mut self, request: CallRequest) -> HookResult<i32> {
        self.charge_api(|c| c.execute_on_same_context)?;
        let result = self.tx.execute_on_same_context(request);
        self.lift(result)
    }

    fn execute_read_only(&mut self, request: CallRequest) -> HookResult<i32> {
        self.charge_api(|c| c.execute_read_only)?;
        let result = self.tx.execute_on_dest_context(request, true);
        self.lift(result)
    }

    fn get_num_return_data(&mut self) -> HookResult<usize> {
        self.charge_api(|c| c.get_return_data)?;
        Ok(self.tx.output.current_return_data().len())
    }

    fn get_return_data(&mut self, index: usize) -> HookResult<Vec<u8>> {
        self.charge_api(|c| c.get_return_data)?;
        let data = match self.tx.output.current_return_data().get(index) {
            Some(data) => data.clone(),
            None => {
                return Err(self.fail(HostError::InvalidArgument(format!(
                    "return data index {} out of range",
                    index
                ))))
            }
        };
        self.charge_copy(data.len())?;
        Ok(data)
    }

    fn clean_return_data(&mut self) -> HookResult<()> {
        self.charge_api(|c| c.get_return_data)?;
        let output = &mut self.tx.output;
        let keep = output.return_data_len() - output.current_return_data().len();
        output.truncate_return_data(keep);
        Ok(())
    }

    fn async_call(&mut self, destination: &Address, value: &BigUint, data: &[u8]) -> HookResult<()> {
        self.ensure_writable("async call")?;
        self.charge_api(|c| c.async_call_step)?;
        self.charge_copy(data.len())?;
        let result = self
            .tx
            .register_legacy_async_call(*destination, value.clone(), data.to_vec());
        self.lift(result)?;
        self.tx.runtime.set_breakpoint(BreakpointValue::AsyncCall);
        Err(BreakpointValue::AsyncCall)
    }

    fn create_async_call(&mut self, request: AsyncCallRequest) -> HookResult<()> {
        self.ensure_writable("async call")?;
        self.charge_api(|c| c.create_async_call)?;
        self.charge_copy(request.data.len())?;
        let gas_locked = self
            .tx
            .metering
            .compute_gas_locked_for_async(self.tx.runtime.code_size())
            .saturating_add(request.extra_gas_for_callback);
        let result = self.tx.register_async_call(request, gas_locked, false);
        self.lift(result)
    }

    fn set_async_group_callback(
        &mut self,
        group_id: &str,
        callback: &str,
        data: &[u8],
        gas: u64,
    ) -> HookResult<()> {
        self.ensure_writable("async call")?;
        self.charge_api(|c| c.set_async_group_callback)?;
        self.charge_copy(data.len())?;
        let result = self
            .tx
            .set_async_group_callback(group_id, callback, data.to_vec(), gas);
        self.lift(result)
    }

    fn get_callback_closure(&mut self) -> HookResult<Vec<u8>> {
        self.charge_api(|c| c.get_callback_closure)?;
        if self.tx.runtime.input().vm_input.call_type != CallType::AsynchronousCallBack {
            return Err(self.fail(HostError::AsyncCall(
                "callback closure is only available inside a callback".into(),
            )));
        }
        let closure = self.tx.runtime.callback_closure().to_vec();
        self.charge_copy(closure.len())?;
        Ok(closure)
    }

    fn mbuffer_new(&mut self, bytes: &[u8]) -> HookResult<i32> {
        self.charge_managed(|c| c.m_buffer_new)?;
        self.charge_copy(bytes.len())?;
        let result = self.tx.managed.new_buffer(bytes.to_vec());
        self.lift(result)
    }

    fn mbuffer_get_bytes(&mut self, handle: i32) -> HookResult<Vec<u8>> {
        self.charge_managed(|c| c.m_buffer_get_bytes)?;
        let result = self.tx.managed.get_bytes(handle).map(<[u8]>::to_vec);
        let bytes = self.lift(result)?;
        self.charge_copy(bytes.len())?;
        Ok(bytes)
    }

    fn mbuffer_set_bytes(&mut self, handle: i32, bytes: &[u8]) -> HookResult<()> {
        self.charge_managed(|c| c.m_buffer_set_bytes)?;
        self.charge_copy(bytes.len())?;
        let result = self.tx.managed.set_bytes(handle, bytes.to_vec());
        self.lift(result)
    }

    fn mbuffer_append(&mut self, handle: i32, bytes: &[u8]) -> HookResult<()> {
        self.charge_managed(|c| c.m_buffer_append)?;
        self.charge_copy(bytes.len())?;
        let result = self.tx.managed.append(handle, bytes);
        self.lift(result)
    }

    fn create_contract(&mut self, request: CreateRequest) -> HookResult<Address> {
        self.ensure_writable("contract deployment")?;
        self.charge_api(|c| c.create_contract)?;
        self.charge_copy(request.code.len())?;
        let result = self.tx.create_contract(request);
        self.lift(result)
    }
}
