//! Gas ledger.
//!
//! Every invocation owns a [`GasFrame`] in which
//! `provided == used + locked + remaining` holds at every observation point.
//! Gas handed to a child call is debited as `used` from the parent before the
//! child starts and whatever the child reports as remaining is restored
//! afterwards. Gas reserved for an async callback sits in `locked` until the
//! call resolves.

mod trace;

pub use trace::{GasTraceEntry, GasTracer};

use crate::config::GasSchedule;
use crate::state::{Snapshots, StateStack};
use crate::types::Address;
use crate::{HostError, Result};
use std::sync::Arc;
use tracing::trace;

/// Gas bookkeeping of one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasFrame {
    pub provided: u64,
    pub used: u64,
    pub locked: u64,
    pub remaining: u64,
}

impl GasFrame {
    /// Frame for an invocation that may spend `gas_provided` and carries
    /// `gas_locked` on behalf of its caller.
    pub fn new(gas_provided: u64, gas_locked: u64) -> Self {
        Self {
            provided: gas_provided.saturating_add(gas_locked),
            used: 0,
            locked: gas_locked,
            remaining: gas_provided,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.used
            .checked_add(self.locked)
            .and_then(|sum| sum.checked_add(self.remaining))
            == Some(self.provided)
    }

    fn mismatch(&self, context: &'static str) -> HostError {
        HostError::GasMismatch {
            context,
            provided: self.provided,
            used: self.used,
            locked: self.locked,
            remaining: self.remaining,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MeteringState {
    gas: GasFrame,
    contract: Address,
    function: String,
}

/// Gas ledger of one transaction, stacked per nested call.
#[derive(Debug)]
pub struct Metering {
    schedule: Arc<GasSchedule>,
    block_gas_limit: u64,
    state: MeteringState,
    stack: Snapshots<MeteringState>,
    tracer: Option<GasTracer>,
}

impl Metering {
    pub fn new(schedule: Arc<GasSchedule>, block_gas_limit: u64, enable_trace: bool) -> Self {
        Self {
            schedule,
            block_gas_limit,
            state: MeteringState::default(),
            stack: Snapshots::new("metering"),
            tracer: enable_trace.then(GasTracer::new),
        }
    }

    pub fn schedule(&self) -> &GasSchedule {
        &self.schedule
    }

    /// Starts the frame of a new invocation.
    pub fn init_frame(&mut self, contract: Address, function: &str, gas_provided: u64, gas_locked: u64) {
        self.state = MeteringState {
            gas: GasFrame::new(gas_provided, gas_locked),
            contract,
            function: function.to_string(),
        };
    }

    /// Renames the traced function without touching the gas frame.
    pub fn set_trace_function(&mut self, function: &str) {
        self.state.function = function.to_string();
    }

    pub fn frame(&self) -> GasFrame {
        self.state.gas
    }

    pub fn gas_left(&self) -> u64 {
        self.state.gas.remaining
    }

    pub fn gas_used(&self) -> u64 {
        self.state.gas.used
    }

    pub fn gas_locked(&self) -> u64 {
        self.state.gas.locked
    }

    /// Debits `amount`. When the frame cannot pay, everything left is consumed
    /// and the call fails with [`HostError::NotEnoughGas`].
    pub fn use_gas(&mut self, amount: u64) -> Result<()> {
        let gas = &mut self.state.gas;
        if amount > gas.remaining {
            let rest = gas.remaining;
            gas.used += rest;
            gas.remaining = 0;
            self.trace_consumption(rest);
            return Err(HostError::NotEnoughGas);
        }
        gas.used += amount;
        gas.remaining -= amount;
        self.trace_consumption(amount);
        Ok(())
    }

    /// Debits the gas limit of an async call and locks its callback gas.
    /// Both must fit in the remaining gas together or nothing is taken.
    pub fn reserve_async_gas(&mut self, gas_limit: u64, gas_locked: u64) -> Result<()> {
        let gas = &mut self.state.gas;
        let total = gas_limit
            .checked_add(gas_locked)
            .ok_or(HostError::NotEnoughGas)?;
        if total > gas.remaining {
            return Err(HostError::NotEnoughGas);
        }
        gas.used += gas_limit;
        gas.locked += gas_locked;
        gas.remaining -= total;
        trace!(gas_limit, gas_locked, remaining = gas.remaining, "async gas reserved");
        Ok(())
    }

    pub fn lock_gas(&mut self, amount: u64) -> Result<()> {
        let gas = &mut self.state.gas;
        if amount > gas.remaining {
            return Err(HostError::NotEnoughGas);
        }
        gas.remaining -= amount;
        gas.locked += amount;
        Ok(())
    }

    pub fn unlock_gas(&mut self, amount: u64) -> Result<()> {
        let gas = &mut self.state.gas;
        if amount > gas.locked {
            return Err(gas.mismatch("unlock_gas"));
        }
        gas.locked -= amount;
        gas.remaining += amount;
        Ok(())
    }

    /// Gives back gas previously debited as used, e.g. what a child left over.
    pub fn restore_gas(&mut self, amount: u64) -> Result<()> {
        let gas = &mut self.state.gas;
        if amount > gas.used {
            return Err(gas.mismatch("restore_gas"));
        }
        gas.used -= amount;
        gas.remaining += amount;
        Ok(())
    }

    /// Clamps gas forwarded to a callee so the caller keeps
    /// `ForwardedGasEpsilon` for its own bookkeeping.
    pub fn bound_gas_limit(&self, requested: u64) -> u64 {
        let available = self
            .state
            .gas
            .remaining
            .saturating_sub(self.schedule.base_operation_cost.forwarded_gas_epsilon);
        requested.min(available)
    }

    /// Gas reserved for the callback of an async call issued by code of
    /// `code_len` bytes.
    pub fn compute_gas_locked_for_async(&self, code_len: usize) -> u64 {
        let prepare = self
            .schedule
            .base_operation_cost
            .aot_prepare_per_byte
            .saturating_mul(code_len as u64);
        self.schedule
            .host_api_cost
            .async_callback_gas_lock
            .saturating_add(prepare)
    }

    pub fn deduct_initial_gas_for_execution(&mut self, code: &[u8]) -> Result<()> {
        let base = &self.schedule.base_operation_cost;
        let cost = base
            .aot_prepare_per_byte
            .saturating_mul(code.len() as u64)
            .saturating_add(base.get_code);
        self.use_gas(cost)
    }

    pub fn deduct_initial_gas_for_direct_deployment(&mut self, code: &[u8], input_len: usize) -> Result<()> {
        let base = &self.schedule.base_operation_cost;
        let cost = base
            .compile_per_byte
            .saturating_mul(code.len() as u64)
            .saturating_add(base.data_copy_per_byte.saturating_mul(input_len as u64));
        self.use_gas(cost)
    }

    pub fn deduct_initial_gas_for_indirect_deployment(&mut self, code: &[u8]) -> Result<()> {
        let cost = self
            .schedule
            .base_operation_cost
            .compile_per_byte
            .saturating_mul(code.len() as u64);
        self.use_gas(cost)
    }

    /// Reconciles a successful child: its frame must balance against the
    /// remaining gas it reported, which is then restored to this frame.
    pub fn update_gas_state_on_success(&mut self, child: &GasFrame, reported_remaining: u64) -> Result<()> {
        let accounted = child
            .used
            .checked_add(child.locked)
            .and_then(|sum| sum.checked_add(reported_remaining));
        if !child.is_consistent() || accounted != Some(child.provided) {
            return Err(HostError::GasMismatch {
                context: "child success",
                provided: child.provided,
                used: child.used,
                locked: child.locked,
                remaining: reported_remaining,
            });
        }
        self.restore_gas(reported_remaining)
    }

    /// Reconciles a failed child, which keeps none of its gas.
    pub fn update_gas_state_on_failure(&mut self, child: &GasFrame) -> Result<()> {
        if !child.is_consistent() {
            return Err(child.mismatch("child failure"));
        }
        Ok(())
    }

    pub fn check_conservation(&self, context: &'static str) -> Result<()> {
        if self.state.gas.is_consistent() {
            Ok(())
        } else {
            Err(self.state.gas.mismatch(context))
        }
    }

    pub fn check_block_gas_limit(&self, gas_provided: u64) -> Result<()> {
        if gas_provided > self.block_gas_limit {
            return Err(HostError::BlockGasLimitExceeded {
                provided: gas_provided,
                limit: self.block_gas_limit,
            });
        }
        Ok(())
    }

    pub fn tracer(&self) -> Option<&GasTracer> {
        self.tracer.as_ref()
    }

    pub fn take_tracer(&mut self) -> Option<GasTracer> {
        self.tracer.take()
    }

    fn trace_consumption(&mut self, amount: u64) {
        if let Some(tracer) = self.tracer.as_mut() {
            tracer.record(self.state.contract, &self.state.function, amount);
        }
    }
}

impl StateStack for Metering {
    fn init_state(&mut self) {
        self.state = MeteringState::default();
    }

    fn push_state(&mut self) {
        self.stack.push(self.state.clone());
    }

    fn pop_set_active_state(&mut self) -> Result<()> {
        self.state = self.stack.pop()?;
        Ok(())
    }

    fn pop_discard(&mut self) -> Result<()> {
        self.stack.pop().map(|_| ())
    }

    fn clear_state_stack(&mut self) {
        self.stack.clear();
    }

    fn state_stack_depth(&self) -> usize {
        self.stack.depth()
    }
}
