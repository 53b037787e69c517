//! Ledger collaborator and the account view layered over it.

use crate::output::OutputContext;
use crate::state::{Snapshots, StateStack};
use crate::types::Address;
use crate::{HostError, Result};
use num_bigint::{BigInt, BigUint};
use num_traits::Signed;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Header fields of the block being processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub nonce: u64,
    pub round: u64,
    pub epoch: u32,
    pub timestamp: u64,
}

/// Read access to committed ledger state.
///
/// The host never writes through this trait: all changes are reported in the
/// [`VmOutput`](crate::types::VmOutput) and applied by the caller.
pub trait BlockchainHook: Send + Sync {
    fn account_exists(&self, address: &Address) -> bool;

    fn get_balance(&self, address: &Address) -> BigUint;

    fn get_nonce(&self, address: &Address) -> u64;

    fn get_code(&self, address: &Address) -> Option<Vec<u8>>;

    /// Committed value of a storage cell; empty when unset.
    fn get_storage_data(&self, address: &Address, key: &[u8]) -> Vec<u8>;

    fn get_shard_of_address(&self, address: &Address) -> u32;

    fn self_shard_id(&self) -> u32;

    fn block_info(&self) -> BlockInfo {
        BlockInfo::default()
    }

    fn new_address(&self, creator: &Address, creator_nonce: u64) -> Address {
        Address::derive_contract(creator, creator_nonce)
    }
}

/// Account view: committed state plus what this transaction changed so far.
pub struct BlockchainContext {
    hook: Arc<dyn BlockchainHook>,
    created: Vec<Address>,
    stack: Snapshots<Vec<Address>>,
}

impl BlockchainContext {
    pub fn new(hook: Arc<dyn BlockchainHook>) -> Self {
        Self {
            hook,
            created: Vec::new(),
            stack: Snapshots::new("blockchain"),
        }
    }

    pub fn hook(&self) -> &dyn BlockchainHook {
        self.hook.as_ref()
    }

    pub fn get_balance(&self, address: &Address, output: &OutputContext) -> BigUint {
        let total = BigInt::from(self.hook.get_balance(address)) + output.balance_delta(address);
        if total.is_negative() {
            BigUint::default()
        } else {
            total.magnitude().clone()
        }
    }

    pub fn get_nonce(&self, address: &Address, output: &OutputContext) -> u64 {
        let committed = self.hook.get_nonce(address);
        output
            .account(address)
            .map(|account| account.nonce.max(committed))
            .unwrap_or(committed)
    }

    pub fn increment_nonce(&self, address: &Address, output: &mut OutputContext) -> u64 {
        let next = self.get_nonce(address, output).saturating_add(1);
        output.set_nonce(address, next);
        next
    }

    /// Code of `address`, including code deployed earlier in this transaction.
    pub fn get_code(&self, address: &Address, output: &OutputContext) -> Result<Vec<u8>> {
        if let Some(code) = output.account(address).and_then(|account| account.code.clone()) {
            return Ok(code);
        }
        self.hook
            .get_code(address)
            .filter(|code| !code.is_empty())
            .ok_or_else(|| HostError::ContractNotFound(address.to_hex()))
    }

    pub fn account_exists(&self, address: &Address, output: &OutputContext) -> bool {
        self.hook.account_exists(address)
            || self.created.contains(address)
            || output
                .account(address)
                .map_or(false, |account| account.code.is_some())
    }

    /// Address for a contract deployed by `creator`, reserving it for this
    /// transaction. Fails when the address is already taken.
    pub fn new_contract_address(&mut self, creator: &Address, output: &OutputContext) -> Result<Address> {
        let nonce = self.get_nonce(creator, output);
        let address = self.hook.new_address(creator, nonce);
        if self.account_exists(&address, output) {
            return Err(HostError::AccountCollision(address.to_hex()));
        }
        self.created.push(address);
        Ok(address)
    }

    pub fn shard_of(&self, address: &Address) -> u32 {
        self.hook.get_shard_of_address(address)
    }

    pub fn self_shard(&self) -> u32 {
        self.hook.self_shard_id()
    }

    pub fn is_same_shard(&self, address: &Address) -> bool {
        self.shard_of(address) == self.self_shard()
    }

    pub fn block_info(&self) -> BlockInfo {
        self.hook.block_info()
    }
}

impl StateStack for BlockchainContext {
    fn init_state(&mut self) {
        self.created.clear();
    }

    fn push_state(&mut self) {
        self.stack.push(self.created.clone());
    }

    fn pop_set_active_state(&mut self) -> Result<()> {
        self.created = self.stack.pop()?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FixedLedger {
        balances: HashMap<Address, u64>,
        code: HashMap<Address, Vec<u8>>,
    }

    impl BlockchainHook for FixedLedger {
        fn account_exists(&self, address: &Address) -> bool {
            self.balances.contains_key(address) || self.code.contains_key(address)
        }

        fn get_balance(&self, address: &Address) -> BigUint {
            BigUint::from(self.balances.get(address).copied().unwrap_or(0))
        }

        fn get_nonce(&self, _address: &Address) -> u64 {
            0
        }

        fn get_code(&self, address: &Address) -> Option<Vec<u8>> {
            self.code.get(address).cloned()
        }

        fn get_storage_data(&self, _address: &Address, _key: &[u8]) -> Vec<u8> {
            Vec::new()
        }

        fn get_shard_of_address(&self, address: &Address) -> u32 {
            u32::from(address.0[31] % 2)
        }

        fn self_shard_id(&self) -> u32 {
            0
        }
    }

    fn context() -> BlockchainContext {
        let mut ledger = FixedLedger::default();
        ledger.balances.insert(Address([1; 32]), 100);
        BlockchainContext::new(Arc::new(ledger))
    }

    #[test]
    fn balance_includes_pending_delta() {
        let blockchain = context();
        let mut output = OutputContext::new();
        output.account_mut(&Address([1; 32])).balance_delta = BigInt::from(-30);
        assert_eq!(blockchain.get_balance(&Address([1; 32]), &output), BigUint::from(70u32));
    }

    #[test]
    fn nonce_increments_are_pending() {
        let blockchain = context();
        let mut output = OutputContext::new();
        let creator = Address([1; 32]);
        assert_eq!(blockchain.increment_nonce(&creator, &mut output), 1);
        assert_eq!(blockchain.increment_nonce(&creator, &mut output), 2);
        assert_eq!(blockchain.get_nonce(&creator, &output), 2);
    }

    #[test]
    fn deployed_code_is_visible_and_reserved() {
        let mut blockchain = context();
        let mut output = OutputContext::new();
        let creator = Address([1; 32]);

        let address = blockchain.new_contract_address(&creator, &output).unwrap();
        assert!(blockchain.get_code(&address, &output).is_err());
        output.deploy_code(&address, vec![0, 97, 115, 109], Vec::new());
        assert_eq!(blockchain.get_code(&address, &output).unwrap(), vec![0, 97, 115, 109]);

        let err = blockchain.new_contract_address(&creator, &output).unwrap_err();
        assert!(matches!(err, HostError::AccountCollision(_)));
    }

    #[test]
    fn shard_comparison_uses_hook() {
        let blockchain = context();
        assert!(blockchain.is_same_shard(&Address([2; 32])));
        assert!(!blockchain.is_same_shard(&Address([3; 32])));
    }
}
