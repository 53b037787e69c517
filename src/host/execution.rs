//! Transaction entry points and nested invocations.

use super::hooks::HostHooks;
use super::{
    ChildKind, ChildOutcome, InitialCost, Invocation, TransactionHost, INIT_FUNCTION,
    MAX_MEMORY_PAGES,
};
use crate::output::TransferRequest;
use crate::runtime::invoker::invoke_function;
use crate::runtime::loader::{load_instance, release_instance};
use crate::runtime::parser::build_callback_data;
use crate::runtime::result::{dispatch, reconcile_exit};
use crate::runtime::{CallRequest, CreateRequest, Dispatch, InstanceOptions};
use crate::state::StateStack;
use crate::types::{
    Address, AsyncArguments, CallType, ContractCallInput, ContractCreateInput, ReturnCode,
    VmInput, VmOutput,
};
use crate::{HostError, Result};
use num_bigint::BigUint;
use num_traits::Zero;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identifier of the top-level invocation of a transaction.
fn transaction_call_id(tx_hash: &[u8], recipient: &Address) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(tx_hash);
    hasher.update(recipient.as_bytes());
    hasher.finalize().to_vec()
}

impl<'h> TransactionHost<'h> {
    #[tracing::instrument(skip_all, fields(recipient = %input.recipient, function = %input.function))]
    pub(super) fn run_call(&mut self, input: &ContractCallInput) -> Result<VmOutput> {
        info!(
            gas = input.vm_input.gas_provided,
            call_type = ?input.vm_input.call_type,
            "contract call started"
        );
        self.metering.init_frame(
            input.recipient,
            &input.function,
            input.vm_input.gas_provided,
            input.vm_input.gas_locked,
        );
        let result = self
            .metering
            .check_block_gas_limit(input.vm_input.gas_provided)
            .and_then(|()| self.execute_call_transaction(input));
        let incoming_async = self.is_incoming_cross_shard_async(input).then_some(input);
        self.finish_transaction(result, incoming_async)
    }

    #[tracing::instrument(skip_all, fields(creator = %input.vm_input.caller))]
    pub(super) fn run_create(&mut self, input: &ContractCreateInput) -> Result<VmOutput> {
        info!(
            gas = input.vm_input.gas_provided,
            code_len = input.contract_code.len(),
            "contract deployment started"
        );
        self.metering.init_frame(
            input.vm_input.caller,
            INIT_FUNCTION,
            input.vm_input.gas_provided,
            0,
        );
        let result = self
            .metering
            .check_block_gas_limit(input.vm_input.gas_provided)
            .and_then(|()| self.execute_create_transaction(input));
        self.finish_transaction(result, None)
    }

    fn execute_call_transaction(&mut self, input: &ContractCallInput) -> Result<()> {
        let (call_id, caller_call_id) = match (&input.vm_input.call_type, &input.vm_input.async_arguments) {
            (CallType::AsynchronousCallBack, Some(_)) => return self.execute_callback_transaction(input),
            (CallType::AsynchronousCall, Some(args)) => (args.call_id.clone(), args.caller_call_id.clone()),
            _ => (
                transaction_call_id(&input.vm_input.original_tx_hash, &input.recipient),
                Vec::new(),
            ),
        };
        self.async_ctx.reset_for(input.recipient, call_id, caller_call_id);

        if self.host.builtins.is_builtin(&input.function) {
            let gas = self.metering.gas_left();
            self.metering.use_gas(gas)?;
            let outcome = self.execute_builtin(input, gas)?;
            return outcome.error.map_or(Ok(()), Err);
        }

        if !input.vm_input.call_value.is_zero() {
            self.output.credit(&input.recipient, &input.vm_input.call_value);
        }
        self.run_contract(&Invocation::call(input.clone()))
    }

    fn execute_create_transaction(&mut self, input: &ContractCreateInput) -> Result<()> {
        self.host.validator.validate_code(&input.contract_code)?;
        let creator = input.vm_input.caller;
        let address = self.blockchain.new_contract_address(&creator, &self.output)?;
        self.blockchain.increment_nonce(&creator, &mut self.output);
        self.output.deploy_code(
            &address,
            input.contract_code.clone(),
            input.contract_code_metadata.clone(),
        );
        if !input.vm_input.call_value.is_zero() {
            self.output.credit(&address, &input.vm_input.call_value);
        }
        info!(%address, "deploying contract");

        self.async_ctx.reset_for(
            address,
            transaction_call_id(&input.vm_input.original_tx_hash, &address),
            Vec::new(),
        );
        let call_input = ContractCallInput {
            vm_input: input.vm_input.clone(),
            recipient: address,
            function: INIT_FUNCTION.to_string(),
            allow_init_function: true,
        };
        self.run_contract(&Invocation {
            initial_cost: InitialCost::DirectDeployment,
            ..Invocation::call(call_input)
        })
    }

    /// Builds the transaction output, or aborts on a fatal error.
    fn finish_transaction(
        &mut self,
        result: Result<()>,
        incoming_async: Option<&ContractCallInput>,
    ) -> Result<VmOutput> {
        if let Some(fatal) = self.runtime.take_fatal() {
            warn!(error = %fatal, "transaction aborted");
            return Err(fatal);
        }
        if let Err(error) = &result {
            if error.is_fatal() {
                warn!(%error, "transaction aborted");
                return Err(error.clone());
            }
        }

        let output = match (result, incoming_async) {
            (Ok(()), Some(input)) => {
                self.send_callback_to_caller(input)?;
                self.metering.check_conservation("transaction")?;
                self.output.create_vm_output(0)
            }
            (Ok(()), None) => {
                let locked = self.metering.gas_locked();
                self.metering.unlock_gas(locked)?;
                self.metering.check_conservation("transaction")?;
                self.output.create_vm_output(self.metering.gas_left())
            }
            (Err(error), Some(input)) => {
                info!(%error, "async call failed, refunding caller");
                self.refund_failed_async_call(input, &error)?
            }
            (Err(error), None) => {
                info!(%error, "contract call failed");
                self.output.create_failed_vm_output(&error)
            }
        };
        info!(
            return_code = %output.return_code,
            gas_remaining = output.gas_remaining,
            "transaction finished"
        );
        Ok(output)
    }

    fn is_incoming_cross_shard_async(&self, input: &ContractCallInput) -> bool {
        input.vm_input.call_type == CallType::AsynchronousCall
            && input.vm_input.async_arguments.is_some()
            && !self.blockchain.is_same_shard(&input.vm_input.caller)
    }

    fn incoming_async_arguments(input: &ContractCallInput) -> Result<AsyncArguments> {
        input
            .vm_input
            .async_arguments
            .clone()
            .ok_or_else(|| HostError::Internal("async call without correlation data".into()))
    }

    /// Sends the result of an incoming async call back to the caller's shard,
    /// together with all gas left and the gas locked for the callback.
    fn send_callback_to_caller(&mut self, input: &ContractCallInput) -> Result<()> {
        let async_data = Self::incoming_async_arguments(input)?;
        let locked = self.metering.gas_locked();
        self.metering.unlock_gas(locked)?;
        let gas = self.metering.gas_left();
        self.metering.use_gas(gas)?;

        let mut arguments = vec![ReturnCode::Ok.to_bytes()];
        arguments.extend(self.output.return_data().iter().cloned());
        let request = TransferRequest {
            sender: input.recipient,
            destination: input.vm_input.caller,
            gas_limit: gas,
            data: build_callback_data(&arguments),
            call_type: CallType::AsynchronousCallBack,
            ..TransferRequest::default()
        };
        debug!(destination = %input.vm_input.caller, gas, "callback sent to caller shard");
        self.output
            .transfer_with_async_data(&BigUint::zero(), request, async_data)
    }

    /// Output of a failed incoming async call: every effect is dropped, the
    /// value goes back to the caller and the callback only gets the locked
    /// gas.
    fn refund_failed_async_call(&mut self, input: &ContractCallInput, error: &HostError) -> Result<VmOutput> {
        let async_data = Self::incoming_async_arguments(input)?;
        self.output.reset();
        let value = input.vm_input.call_value.clone();
        self.output.credit(&input.recipient, &value);
        let balance = self.blockchain.get_balance(&input.recipient, &self.output);
        let arguments = vec![error.return_code().to_bytes(), error.to_string().into_bytes()];
        let request = TransferRequest {
            sender: input.recipient,
            destination: input.vm_input.caller,
            value,
            gas_limit: input.vm_input.gas_locked,
            data: build_callback_data(&arguments),
            call_type: CallType::AsynchronousCallBack,
            ..TransferRequest::default()
        };
        self.output.transfer_with_async_data(&balance, request, async_data)?;
        let mut output = self.output.create_vm_output(0);
        output.return_code = error.return_code();
        output.return_message = error.to_string();
        Ok(output)
    }

    fn check_reserved_function(&self, input: &ContractCallInput) -> Result<()> {
        if !self.host.config.is_reserved(&input.function) {
            return Ok(());
        }
        if input.function == INIT_FUNCTION {
            if input.allow_init_function {
                return Ok(());
            }
            return Err(HostError::InitFuncCalledInRun);
        }
        if input.vm_input.call_type == CallType::AsynchronousCallBack {
            return Ok(());
        }
        Err(HostError::CallbackCalledDirectly)
    }

    /// Runs one contract function in the current frames, then resolves the
    /// async calls it scheduled.
    pub(super) fn run_contract(&mut self, invocation: &Invocation) -> Result<()> {
        self.check_watchdog()?;
        let input = &invocation.input;
        self.check_reserved_function(input)?;

        let code = self.blockchain.get_code(&invocation.code_address, &self.output)?;
        match invocation.initial_cost {
            InitialCost::Execution => self.metering.deduct_initial_gas_for_execution(&code)?,
            InitialCost::DirectDeployment => {
                let input_len = input.vm_input.arguments.iter().map(Vec::len).sum();
                self.metering
                    .deduct_initial_gas_for_direct_deployment(&code, input_len)?
            }
            InitialCost::IndirectDeployment => self
                .metering
                .deduct_initial_gas_for_indirect_deployment(&code)?,
        }
        self.runtime
            .init_from_input(input.clone(), code.len(), invocation.read_only);
        self.runtime
            .set_callback_closure(invocation.callback_closure.clone());
        self.storage.set_address(input.recipient, invocation.read_only);

        self.runtime.start_instance()?;
        let options = InstanceOptions {
            schedule: Arc::clone(&self.schedule),
            max_memory_pages: MAX_MEMORY_PAGES,
        };
        let mut loaded = match load_instance(self.host.executor.as_ref(), &self.host.pool, &code, &options) {
            Ok(loaded) => loaded,
            Err(error) => {
                self.runtime.end_instance();
                return Err(error);
            }
        };
        if invocation.initial_cost != InitialCost::Execution {
            if let Err(error) = self.host.validator.validate_instance(&*loaded.instance) {
                self.runtime.end_instance();
                return Err(error);
            }
        }

        let exit = {
            let mut hooks = HostHooks::new(self);
            invoke_function(&mut *loaded.instance, &input.function, &mut hooks)
        };
        release_instance(&self.host.pool, loaded);
        self.runtime.end_instance();

        if let Some(fatal) = self.runtime.take_fatal() {
            return Err(fatal);
        }
        self.check_watchdog()?;

        let exit = reconcile_exit(exit?, self.runtime.take_breakpoint());
        match dispatch(exit, self.runtime.error()) {
            Dispatch::Finished | Dispatch::CompleteAsync => {}
            Dispatch::Failed(error) => {
                debug!(%error, function = %input.function, "contract function failed");
                return Err(error);
            }
        }
        self.metering.check_conservation("contract call")?;
        self.complete_async_calls()
    }

    fn push_contexts(&mut self) {
        self.metering.push_state();
        self.output.push_state();
        self.storage.push_state();
        self.blockchain.push_state();
        self.managed.push_state();
        self.runtime.push_state();
        self.async_ctx.push_state();
    }

    /// Restores the caller's frames. Output and created accounts are kept
    /// when `keep_effects` is set and rolled back otherwise.
    fn pop_contexts(&mut self, keep_effects: bool) -> Result<()> {
        self.metering.pop_set_active_state()?;
        self.storage.pop_set_active_state()?;
        self.managed.pop_set_active_state()?;
        self.runtime.pop_set_active_state()?;
        self.async_ctx.pop_set_active_state()?;
        if keep_effects {
            self.output.pop_discard()?;
            self.blockchain.pop_discard()
        } else {
            self.output.pop_set_active_state()?;
            self.blockchain.pop_set_active_state()
        }
    }

    /// Runs `invocation` in fresh frames. The caller has already debited the
    /// child's gas; what the child leaves is restored on success.
    #[tracing::instrument(
        skip_all,
        fields(destination = %invocation.input.recipient, function = %invocation.input.function, kind = ?kind)
    )]
    pub(super) fn run_child(&mut self, invocation: Invocation, kind: ChildKind) -> Result<ChildOutcome> {
        self.check_watchdog()?;
        if let Err(error) = self.runtime.check_nested_call_depth() {
            debug!(%error, "nested call rejected");
            return Ok(ChildOutcome::failed(error));
        }

        let input = &invocation.input;
        let child_call_id = self.async_ctx.generate_call_id();
        let parent_call_id = self.async_ctx.call_id().to_vec();
        let return_data_mark = self.output.return_data_len();

        self.push_contexts();
        self.metering.init_frame(
            input.recipient,
            &input.function,
            input.vm_input.gas_provided,
            input.vm_input.gas_locked,
        );
        self.async_ctx
            .reset_for(input.recipient, child_call_id, parent_call_id);

        let result = self
            .transfer_call_value(&invocation, kind)
            .and_then(|()| self.run_contract(&invocation));
        let child_frame = self.metering.frame();
        let return_data = self.output.current_return_data().to_vec();

        match result {
            Ok(()) => {
                self.pop_contexts(true)?;
                self.metering
                    .update_gas_state_on_success(&child_frame, child_frame.remaining)?;
                if kind == ChildKind::AsyncDestination {
                    self.output.take_return_data_from(return_data_mark);
                }
                debug!(gas_used = child_frame.used, "nested call finished");
                Ok(ChildOutcome {
                    return_data,
                    gas_remaining: child_frame.remaining,
                    ..ChildOutcome::default()
                })
            }
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                self.pop_contexts(kind == ChildKind::SameContext)?;
                self.metering.update_gas_state_on_failure(&child_frame)?;
                debug!(%error, "nested call failed");
                Ok(ChildOutcome::failed(error))
            }
        }
    }

    fn transfer_call_value(&mut self, invocation: &Invocation, kind: ChildKind) -> Result<()> {
        let input = &invocation.input;
        if input.vm_input.call_value.is_zero() || kind == ChildKind::SameContext {
            return Ok(());
        }
        if invocation.read_only {
            return Err(HostError::ReadOnlyViolation("value transfer"));
        }
        let sender = input.vm_input.caller;
        let balance = self.blockchain.get_balance(&sender, &self.output);
        self.output.transfer(
            &balance,
            TransferRequest {
                sender,
                destination: input.recipient,
                value: input.vm_input.call_value.clone(),
                call_type: input.vm_input.call_type,
                ..TransferRequest::default()
            },
        )
    }

    /// Input of a call made by the running contract.
    pub(super) fn nested_input(
        &self,
        recipient: Address,
        function: &str,
        arguments: Vec<Vec<u8>>,
        value: BigUint,
        gas: u64,
    ) -> ContractCallInput {
        let parent = &self.runtime.input().vm_input;
        ContractCallInput {
            vm_input: VmInput {
                caller: self.runtime.address(),
                arguments,
                call_value: value,
                gas_price: parent.gas_price,
                gas_provided: gas,
                original_tx_hash: parent.original_tx_hash.clone(),
                current_tx_hash: parent.current_tx_hash.clone(),
                ..VmInput::default()
            },
            recipient,
            function: function.to_string(),
            allow_init_function: false,
        }
    }

    pub(super) fn execute_on_dest_context(&mut self, request: CallRequest, read_only: bool) -> Result<i32> {
        let gas = self.metering.bound_gas_limit(request.gas);
        self.metering.use_gas(gas)?;
        let read_only = read_only || self.runtime.is_read_only();
        let input = self.nested_input(
            request.destination,
            &request.function,
            request.arguments,
            request.value,
            gas,
        );

        let outcome = if self.host.builtins.is_builtin(&input.function) {
            if read_only {
                return Err(HostError::ReadOnlyViolation("builtin call"));
            }
            self.execute_builtin(&input, gas)?
        } else {
            let invocation = Invocation {
                read_only,
                ..Invocation::call(input)
            };
            self.run_child(invocation, ChildKind::DestContext)?
        };
        Ok(outcome.status_code())
    }

    /// Runs another contract's code on the caller's account. A failure is
    /// the caller's failure.
    pub(super) fn execute_on_same_context(&mut self, request: CallRequest) -> Result<i32> {
        if self.host.builtins.is_builtin(&request.function) {
            return Err(HostError::InvalidArgument(format!(
                "builtin function {} cannot run on the same context",
                request.function
            )));
        }
        let gas = self.metering.bound_gas_limit(request.gas);
        self.metering.use_gas(gas)?;
        let address = self.runtime.address();
        let input = self.nested_input(address, &request.function, request.arguments, request.value, gas);
        let invocation = Invocation {
            code_address: request.destination,
            read_only: self.runtime.is_read_only(),
            ..Invocation::call(input)
        };
        let outcome = self.run_child(invocation, ChildKind::SameContext)?;
        match outcome.error {
            Some(error) => Err(error),
            None => Ok(0),
        }
    }

    /// Hands a call over to the builtin container. `gas` has already been
    /// debited; what the builtin reports as remaining is restored.
    pub(super) fn execute_builtin(&mut self, input: &ContractCallInput, gas: u64) -> Result<ChildOutcome> {
        let vm_output = match self.host.builtins.process_builtin_function(input) {
            Ok(vm_output) => vm_output,
            Err(error) if error.is_fatal() => return Err(error),
            Err(error) => return Ok(ChildOutcome::failed(error)),
        };
        if !vm_output.is_success() {
            debug!(function = %input.function, code = %vm_output.return_code, "builtin function failed");
            return Ok(ChildOutcome {
                return_code: vm_output.return_code,
                message: vm_output.return_message.clone(),
                error: Some(HostError::ExecutionFailed(format!(
                    "{}: {}",
                    input.function, vm_output.return_message
                ))),
                ..ChildOutcome::default()
            });
        }
        let gas_remaining = vm_output.gas_remaining.min(gas);
        self.metering.restore_gas(gas_remaining)?;
        self.output.merge_vm_output(&vm_output);
        debug!(function = %input.function, gas_used = gas - gas_remaining, "builtin function executed");
        Ok(ChildOutcome {
            return_data: vm_output.return_data,
            gas_remaining,
            ..ChildOutcome::default()
        })
    }

    /// Deploys contract code on behalf of the running contract and runs its
    /// `init`.
    pub(super) fn create_contract(&mut self, request: CreateRequest) -> Result<Address> {
        let gas = self.metering.bound_gas_limit(request.gas);
        self.metering.use_gas(gas)?;
        self.host.validator.validate_code(&request.code)?;

        self.output.push_state();
        self.blockchain.push_state();
        match self.deploy_from_contract(request, gas) {
            Ok(address) => {
                self.output.pop_discard()?;
                self.blockchain.pop_discard()?;
                Ok(address)
            }
            Err(error) => {
                self.output.pop_set_active_state()?;
                self.blockchain.pop_set_active_state()?;
                Err(error)
            }
        }
    }

    fn deploy_from_contract(&mut self, request: CreateRequest, gas: u64) -> Result<Address> {
        let creator = self.runtime.address();
        let address = self.blockchain.new_contract_address(&creator, &self.output)?;
        self.blockchain.increment_nonce(&creator, &mut self.output);
        self.output
            .deploy_code(&address, request.code, request.code_metadata);
        debug!(%creator, %address, "contract deployed by contract");

        let mut input = self.nested_input(address, INIT_FUNCTION, request.arguments, request.value, gas);
        input.allow_init_function = true;
        let invocation = Invocation {
            initial_cost: InitialCost::IndirectDeployment,
            ..Invocation::call(input)
        };
        let outcome = self.run_child(invocation, ChildKind::DestContext)?;
        match outcome.error {
            Some(error) => Err(error),
            None => Ok(address),
        }
    }
}
