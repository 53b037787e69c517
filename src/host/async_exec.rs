//! Completion of async calls: local resolution, cross-shard packaging,
//! group callbacks and persistence of what is still pending.

use super::{ChildKind, ChildOutcome, Invocation, TransactionHost, LEGACY_CALLBACK};
use crate::async_call::{
    decode_async_context, determine_execution_mode, encode_async_context, AsyncCall, AsyncCallExecutionMode,
    AsyncCallResults, AsyncContext, FinishedAsyncCall, ResultTransfer, LEGACY_GROUP_ID,
};
use crate::builtin::parse_esdt_callback_arguments;
use crate::output::TransferRequest;
use crate::runtime::parser::parse_call_data;
use crate::runtime::AsyncCallRequest;
use crate::types::{Address, AsyncArguments, CallType, ContractCallInput, ReturnCode, VmInput};
use crate::{HostError, Result};
use num_bigint::BigUint;
use num_traits::Zero;
use tracing::{debug, info, warn};

/// Where the gas of a group callback comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupCallbackGas {
    /// The gas the contract locked when it set the callback.
    Locked,
    /// Whatever the current frame has left.
    Remaining,
}

fn results_from_outcome(outcome: &ChildOutcome) -> AsyncCallResults {
    AsyncCallResults {
        return_code: outcome.return_code,
        return_message: outcome.message.clone(),
        return_data: outcome.return_data.clone(),
        transfers: Vec::new(),
    }
}

/// Results of a remote call as carried by its callback arguments:
/// `[code, data…]` on success and `[code, message]` on failure.
fn results_from_callback_arguments(code: ReturnCode, arguments: &[Vec<u8>]) -> AsyncCallResults {
    let rest = arguments.get(1..).unwrap_or_default();
    if code.is_ok() {
        AsyncCallResults::success(rest.to_vec())
    } else {
        let message = rest
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default();
        AsyncCallResults::failure(code, message)
    }
}

impl<'h> TransactionHost<'h> {
    /// Registers an async call of the running contract, reserving its gas.
    pub(super) fn register_async_call(
        &mut self,
        request: AsyncCallRequest,
        gas_locked: u64,
        legacy: bool,
    ) -> Result<()> {
        let parsed = parse_call_data(&request.data)?;
        let same_shard = self.blockchain.is_same_shard(&request.destination);
        let is_builtin = self.host.builtins.is_builtin(&parsed.function);
        let execution_mode = determine_execution_mode(same_shard, is_builtin);

        self.metering
            .reserve_async_gas(request.gas_limit, gas_locked)?;
        let call = AsyncCall {
            call_id: self.async_ctx.generate_call_id(),
            execution_mode,
            destination: request.destination,
            data: request.data,
            value: request.value,
            gas_limit: request.gas_limit,
            gas_locked,
            success_callback: request.success_callback,
            error_callback: request.error_callback,
            callback_closure: request.callback_closure,
            is_builtin,
            ..AsyncCall::default()
        };
        debug!(
            group = %request.group_id,
            destination = %call.destination,
            mode = ?execution_mode,
            gas_limit = call.gas_limit,
            gas_locked,
            "async call registered"
        );
        if legacy {
            self.async_ctx.register_legacy_call(call)
        } else {
            self.async_ctx.register_call(&request.group_id, call)
        }
    }

    /// Registers a call made through the single-call API: it gets all
    /// remaining gas except what its callback needs.
    pub(super) fn register_legacy_async_call(
        &mut self,
        destination: Address,
        value: BigUint,
        data: Vec<u8>,
    ) -> Result<()> {
        let gas_locked = self
            .metering
            .compute_gas_locked_for_async(self.runtime.code_size());
        let gas_left = self.metering.gas_left();
        if gas_left < gas_locked {
            return Err(HostError::NotEnoughGas);
        }
        let request = AsyncCallRequest {
            group_id: LEGACY_GROUP_ID.to_string(),
            destination,
            value,
            data,
            success_callback: LEGACY_CALLBACK.to_string(),
            error_callback: LEGACY_CALLBACK.to_string(),
            gas_limit: gas_left - gas_locked,
            ..AsyncCallRequest::default()
        };
        self.register_async_call(request, gas_locked, true)
    }

    pub(super) fn set_async_group_callback(
        &mut self,
        group_id: &str,
        callback: &str,
        data: Vec<u8>,
        gas: u64,
    ) -> Result<()> {
        self.metering.lock_gas(gas)?;
        self.async_ctx
            .set_group_callback(group_id, callback, data, gas)
    }

    /// Resolves the async calls of the invocation that just finished.
    #[tracing::instrument(skip_all)]
    pub(super) fn complete_async_calls(&mut self) -> Result<()> {
        if self.async_ctx.is_complete() {
            return Ok(());
        }
        info!(
            contract = %self.async_ctx.address(),
            groups = self.async_ctx.group_ids().len(),
            "completing async calls"
        );

        for group_id in self.async_ctx.group_ids() {
            let calls = self
                .async_ctx
                .group(&group_id)
                .map(|group| group.calls.clone())
                .unwrap_or_default();
            for call in calls.iter().filter(|call| call.is_pending()) {
                if call.is_local() {
                    self.execute_local_async_call(call)?;
                } else if call.execution_mode == AsyncCallExecutionMode::AsyncBuiltinFuncCrossShard {
                    self.execute_builtin_local_half(call)?;
                }
            }
            self.async_ctx.delete_completed_calls(&group_id);
            self.run_group_callback_if_complete(&group_id, GroupCallbackGas::Locked)?;
        }
        self.async_ctx.delete_completed_groups();

        self.send_remote_async_calls()?;
        if self.async_ctx.is_complete() {
            return Ok(());
        }
        self.burn_pending_group_gas()?;
        self.persist_async_context()
    }

    fn async_call_input(&self, call: &AsyncCall, function: String, arguments: Vec<Vec<u8>>) -> ContractCallInput {
        let parent = &self.runtime.input().vm_input;
        ContractCallInput {
            vm_input: VmInput {
                caller: self.async_ctx.address(),
                arguments,
                call_value: call.value.clone(),
                call_type: CallType::AsynchronousCall,
                gas_price: parent.gas_price,
                gas_provided: call.gas_limit,
                original_tx_hash: parent.original_tx_hash.clone(),
                current_tx_hash: parent.current_tx_hash.clone(),
                async_arguments: Some(AsyncArguments {
                    call_id: call.call_id.clone(),
                    caller_call_id: self.async_ctx.call_id().to_vec(),
                }),
                ..VmInput::default()
            },
            recipient: call.destination,
            function,
            allow_init_function: false,
        }
    }

    /// Runs a same-shard async call and then its callback. The callback
    /// gets what the destination left plus the gas locked for it.
    fn execute_local_async_call(&mut self, call: &AsyncCall) -> Result<()> {
        debug!(
            call_id = %hex::encode(&call.call_id),
            destination = %call.destination,
            mode = ?call.execution_mode,
            "resolving async call in shard"
        );
        let outcome = match parse_call_data(&call.data) {
            Err(error) => ChildOutcome::failed(error),
            Ok(parsed) => {
                let input = self.async_call_input(call, parsed.function, parsed.arguments);
                if call.is_builtin {
                    self.execute_builtin(&input, call.gas_limit)?
                } else {
                    self.run_child(Invocation::call(input), ChildKind::AsyncDestination)?
                }
            }
        };
        self.resolve_async_call(call, outcome)
    }

    /// Runs the in-shard half of a builtin call towards another shard. On
    /// success the call keeps what the builtin left as the gas it forwards;
    /// on failure it is settled here and never leaves the shard.
    fn execute_builtin_local_half(&mut self, call: &AsyncCall) -> Result<()> {
        debug!(
            call_id = %hex::encode(&call.call_id),
            destination = %call.destination,
            "running local half of cross-shard builtin"
        );
        let outcome = match parse_call_data(&call.data) {
            Err(error) => ChildOutcome::failed(error),
            Ok(parsed) => {
                let input = self.async_call_input(call, parsed.function, parsed.arguments);
                self.execute_builtin(&input, call.gas_limit)?
            }
        };
        if !outcome.is_success() {
            return self.resolve_async_call(call, outcome);
        }

        self.metering.use_gas(outcome.gas_remaining)?;
        let (group_id, index) = self
            .async_ctx
            .find_call_by_id(&call.call_id)
            .ok_or_else(|| HostError::AsyncCall(format!("unknown async call {}", hex::encode(&call.call_id))))?;
        if let Some(stored) = self.async_ctx.call_mut(&group_id, index) {
            stored.gas_limit = outcome.gas_remaining;
        }
        Ok(())
    }

    /// Settles `call` from the outcome of its destination and runs its
    /// callback with what the destination left plus the locked gas.
    fn resolve_async_call(&mut self, call: &AsyncCall, outcome: ChildOutcome) -> Result<()> {
        let call = self
            .async_ctx
            .update_call_status(&call.call_id, outcome.return_code)?;
        let mut initial = results_from_outcome(&outcome);
        if outcome.is_success() && !call.value.is_zero() {
            initial.transfers.push(ResultTransfer {
                destination: call.destination,
                value: call.value.clone(),
                data: call.data.clone(),
            });
        }

        self.metering.unlock_gas(call.gas_locked)?;
        let callback = if call.has_callback() {
            let gas = outcome.gas_remaining.saturating_add(call.gas_locked);
            self.metering.use_gas(gas)?;
            Some(self.run_async_callback(&call, call.destination, initial.callback_arguments(), gas)?)
        } else {
            None
        };
        self.async_ctx.record_finished_call(FinishedAsyncCall {
            call_id: call.call_id.clone(),
            destination: call.destination,
            execution_mode: call.execution_mode,
            initial,
            callback,
        });
        Ok(())
    }

    /// Runs the callback of `call` in the contract that scheduled it. A
    /// failing callback is rolled back and recorded, never propagated.
    fn run_async_callback(
        &mut self,
        call: &AsyncCall,
        sender: Address,
        arguments: Vec<Vec<u8>>,
        gas: u64,
    ) -> Result<AsyncCallResults> {
        let address = self.async_ctx.address();
        let parent = self.runtime.input().vm_input.clone();
        let input = ContractCallInput {
            vm_input: VmInput {
                caller: sender,
                arguments,
                call_type: CallType::AsynchronousCallBack,
                gas_price: parent.gas_price,
                gas_provided: gas,
                original_tx_hash: parent.original_tx_hash,
                current_tx_hash: parent.current_tx_hash,
                async_arguments: Some(AsyncArguments {
                    call_id: call.call_id.clone(),
                    caller_call_id: self.async_ctx.call_id().to_vec(),
                }),
                ..VmInput::default()
            },
            recipient: address,
            function: call.get_callback_name().to_string(),
            allow_init_function: false,
        };
        let invocation = Invocation {
            callback_closure: call.callback_closure.clone(),
            ..Invocation::call(input)
        };
        let outcome = self.run_child(invocation, ChildKind::Callback)?;
        if !outcome.is_success() {
            warn!(
                callback = call.get_callback_name(),
                error = %outcome.message,
                "async callback failed"
            );
        }
        Ok(results_from_outcome(&outcome))
    }

    fn run_group_callback_if_complete(&mut self, group_id: &str, source: GroupCallbackGas) -> Result<()> {
        let group = match self.async_ctx.group(group_id) {
            Some(group) if group.is_complete() && group.has_callback() => group.clone(),
            _ => return Ok(()),
        };
        let gas = match source {
            GroupCallbackGas::Locked => {
                self.metering.unlock_gas(group.gas_locked)?;
                group.gas_locked
            }
            GroupCallbackGas::Remaining => self.metering.gas_left(),
        };
        self.metering.use_gas(gas)?;
        debug!(group = group_id, callback = %group.callback, gas, "running group callback");

        let address = self.async_ctx.address();
        let parent = self.runtime.input().vm_input.clone();
        let input = ContractCallInput {
            vm_input: VmInput {
                caller: address,
                arguments: vec![group.callback_data.clone()],
                call_type: CallType::AsynchronousCallBack,
                gas_price: parent.gas_price,
                gas_provided: gas,
                original_tx_hash: parent.original_tx_hash,
                current_tx_hash: parent.current_tx_hash,
                ..VmInput::default()
            },
            recipient: address,
            function: group.callback.clone(),
            allow_init_function: false,
        };
        let outcome = self.run_child(Invocation::call(input), ChildKind::Callback)?;
        if !outcome.is_success() {
            warn!(group = group_id, error = %outcome.message, "group callback failed");
        }
        self.async_ctx.delete_group(group_id);
        Ok(())
    }

    /// Packages every pending cross-shard call as an outgoing transfer. The
    /// locked callback gas travels with it.
    fn send_remote_async_calls(&mut self) -> Result<()> {
        let address = self.async_ctx.address();
        let caller_call_id = self.async_ctx.call_id().to_vec();
        let remote: Vec<AsyncCall> = self
            .async_ctx
            .groups()
            .flat_map(|group| group.calls.iter())
            .filter(|call| call.is_remote() && call.is_pending())
            .cloned()
            .collect();

        for call in remote {
            self.metering.unlock_gas(call.gas_locked)?;
            self.metering.use_gas(call.gas_locked)?;
            let balance = self.blockchain.get_balance(&address, &self.output);
            let request = TransferRequest {
                sender: address,
                destination: call.destination,
                value: call.value.clone(),
                gas_limit: call.gas_limit,
                gas_locked: call.gas_locked,
                data: call.data.clone(),
                call_type: CallType::AsynchronousCall,
            };
            self.output.transfer_with_async_data(
                &balance,
                request,
                AsyncArguments {
                    call_id: call.call_id.clone(),
                    caller_call_id: caller_call_id.clone(),
                },
            )?;
            info!(
                destination = %call.destination,
                shard = self.blockchain.shard_of(&call.destination),
                call_id = %hex::encode(&call.call_id),
                "async call sent cross-shard"
            );
        }
        Ok(())
    }

    /// Gas locked for callbacks of groups that stay pending is spent by this
    /// transaction; the later callback transaction pays with its own gas.
    fn burn_pending_group_gas(&mut self) -> Result<()> {
        for group_id in self.async_ctx.group_ids() {
            let gas = match self.async_ctx.group_mut(&group_id) {
                Some(group) => std::mem::take(&mut group.gas_locked),
                None => continue,
            };
            if gas > 0 {
                self.metering.unlock_gas(gas)?;
                self.metering.use_gas(gas)?;
            }
        }
        Ok(())
    }

    fn persist_async_context(&mut self) -> Result<()> {
        let bytes = encode_async_context(&self.async_ctx)?;
        let cost = self
            .schedule
            .base_operation_cost
            .persist_per_byte
            .saturating_mul(bytes.len() as u64);
        self.metering.use_gas(cost)?;
        let address = self.async_ctx.address();
        let suffix = AsyncContext::storage_suffix(self.async_ctx.call_id());
        self.storage.set_protected_storage(
            &mut self.output,
            self.blockchain.hook(),
            &address,
            &suffix,
            &bytes,
        );
        info!(
            contract = %address,
            call_id = %hex::encode(self.async_ctx.call_id()),
            len = bytes.len(),
            "async context persisted"
        );
        Ok(())
    }

    fn clear_async_context(&mut self) {
        let address = self.async_ctx.address();
        let suffix = AsyncContext::storage_suffix(self.async_ctx.call_id());
        self.storage
            .set_protected_storage(&mut self.output, self.blockchain.hook(), &address, &suffix, &[]);
        debug!(contract = %address, "async context completed");
    }

    /// Delivers the result of a cross-shard call to the contract that
    /// scheduled it, resuming its persisted async context.
    #[tracing::instrument(skip_all, fields(recipient = %input.recipient))]
    pub(super) fn execute_callback_transaction(&mut self, input: &ContractCallInput) -> Result<()> {
        let async_data = input
            .vm_input
            .async_arguments
            .clone()
            .ok_or_else(|| HostError::Internal("callback without correlation data".into()))?;
        let recipient = input.recipient;
        let code = self.blockchain.get_code(&recipient, &self.output)?;

        let suffix = AsyncContext::storage_suffix(&async_data.caller_call_id);
        let stored = self.storage.get_protected_storage(
            &self.output,
            self.blockchain.hook(),
            &recipient,
            &suffix,
        );
        if stored.is_empty() {
            return Err(HostError::AsyncCall(format!(
                "no pending async context {}",
                hex::encode(&async_data.caller_call_id)
            )));
        }
        self.async_ctx = decode_async_context(&stored)?;
        self.runtime.init_from_input(input.clone(), code.len(), false);
        self.storage.set_address(recipient, false);
        if !input.vm_input.call_value.is_zero() {
            self.output.credit(&recipient, &input.vm_input.call_value);
        }

        let mut arguments = input.vm_input.arguments.clone();
        let mut esdt_callback = false;
        if input.function == self.host.config.esdt_transfer_function {
            let gas = self.metering.gas_left();
            self.metering.use_gas(gas)?;
            if let Some(error) = self.execute_builtin(input, gas)?.error {
                return Err(error);
            }
            arguments = parse_esdt_callback_arguments(&arguments)?.callback_arguments;
            esdt_callback = true;
        }

        let (group_id, index) = self
            .async_ctx
            .find_call_by_id(&async_data.call_id)
            .ok_or_else(|| {
                HostError::AsyncCall(format!("unknown async call {}", hex::encode(&async_data.call_id)))
            })?;
        if esdt_callback {
            if let Some(call) = self.async_ctx.call_mut(&group_id, index) {
                call.execution_mode = AsyncCallExecutionMode::ESDTTransferOnCallBack;
            }
        }
        let code = arguments
            .first()
            .and_then(|bytes| ReturnCode::from_bytes(bytes))
            .unwrap_or(ReturnCode::ExecutionFailed);
        let call = self.async_ctx.update_call_status(&async_data.call_id, code)?;
        let initial = results_from_callback_arguments(code, &arguments);
        info!(
            call_id = %hex::encode(&call.call_id),
            status = ?call.status,
            callback = call.get_callback_name(),
            "async call result received"
        );

        let callback = if call.has_callback() {
            self.metering.set_trace_function(call.get_callback_name());
            let gas = self.metering.gas_left();
            self.metering.use_gas(gas)?;
            Some(self.run_async_callback(&call, input.vm_input.caller, arguments, gas)?)
        } else {
            None
        };
        self.async_ctx.record_finished_call(FinishedAsyncCall {
            call_id: call.call_id.clone(),
            destination: call.destination,
            execution_mode: call.execution_mode,
            initial,
            callback,
        });

        self.async_ctx.delete_completed_calls(&group_id);
        self.run_group_callback_if_complete(&group_id, GroupCallbackGas::Remaining)?;
        self.async_ctx.delete_completed_groups();

        if self.async_ctx.is_complete() {
            self.clear_async_context();
            Ok(())
        } else {
            self.persist_async_context()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_arguments_carry_data_or_message() {
        let ok = results_from_callback_arguments(ReturnCode::Ok, &[vec![], b"a".to_vec()]);
        assert_eq!(ok.return_data, vec![b"a".to_vec()]);

        let failed = results_from_callback_arguments(
            ReturnCode::UserError,
            &[vec![4], b"bad input".to_vec()],
        );
        assert_eq!(failed.return_code, ReturnCode::UserError);
        assert_eq!(failed.return_message, "bad input");
        assert!(failed.return_data.is_empty());

        let empty = results_from_callback_arguments(ReturnCode::Ok, &[]);
        assert!(empty.return_data.is_empty());
    }
}
