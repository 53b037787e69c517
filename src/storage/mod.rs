//! Contract storage view.
//!
//! Reads see the pending updates of this transaction before falling back to
//! the ledger hook. Keys under the protected prefix belong to the host and
//! are rejected for contracts.

use crate::blockchain::BlockchainHook;
use crate::config::BaseOperationCost;
use crate::output::OutputContext;
use crate::state::{Snapshots, StateStack};
use crate::types::Address;
use crate::{HostError, Result};
use serde::{Deserialize, Serialize};

/// Effect of one storage write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageStatus {
    Unchanged,
    Added,
    Modified,
    Deleted,
}

/// Outcome of a storage write, used for charging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageWrite {
    pub status: StorageStatus,
    pub old_len: usize,
    pub new_len: usize,
}

impl StorageWrite {
    /// Per-byte cost of the write.
    pub fn gas_cost(&self, costs: &BaseOperationCost) -> u64 {
        let old_len = self.old_len as u64;
        let new_len = self.new_len as u64;
        match self.status {
            StorageStatus::Unchanged | StorageStatus::Deleted => {
                costs.data_copy_per_byte.saturating_mul(new_len)
            }
            StorageStatus::Added => costs.store_per_byte.saturating_mul(new_len),
            StorageStatus::Modified if new_len > old_len => costs
                .store_per_byte
                .saturating_mul(new_len - old_len)
                .saturating_add(costs.data_copy_per_byte.saturating_mul(old_len)),
            StorageStatus::Modified => costs.data_copy_per_byte.saturating_mul(new_len),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct StorageFrame {
    address: Address,
    read_only: bool,
}

#[derive(Debug)]
pub struct StorageContext {
    protected_prefix: Vec<u8>,
    frame: StorageFrame,
    stack: Snapshots<StorageFrame>,
}

impl StorageContext {
    pub fn new(protected_prefix: &[u8]) -> Self {
        Self {
            protected_prefix: protected_prefix.to_vec(),
            frame: StorageFrame::default(),
            stack: Snapshots::new("storage"),
        }
    }

    /// Points the view at the storage of `address`.
    pub fn set_address(&mut self, address: Address, read_only: bool) {
        self.frame = StorageFrame { address, read_only };
    }

    pub fn address(&self) -> Address {
        self.frame.address
    }

    pub fn is_read_only(&self) -> bool {
        self.frame.read_only
    }

    pub fn is_protected(&self, key: &[u8]) -> bool {
        key.starts_with(&self.protected_prefix)
    }

    pub fn get_storage(&self, output: &OutputContext, hook: &dyn BlockchainHook, key: &[u8]) -> Vec<u8> {
        self.get_storage_from_address(output, hook, &self.frame.address, key)
    }

    pub fn get_storage_from_address(
        &self,
        output: &OutputContext,
        hook: &dyn BlockchainHook,
        address: &Address,
        key: &[u8],
    ) -> Vec<u8> {
        match output.storage_update(address, key) {
            Some(update) => update.data.clone(),
            None => hook.get_storage_data(address, key),
        }
    }

    /// Contract-initiated write into the current account.
    pub fn set_storage(
        &self,
        output: &mut OutputContext,
        hook: &dyn BlockchainHook,
        key: &[u8],
        value: &[u8],
    ) -> Result<StorageWrite> {
        if self.is_protected(key) {
            return Err(HostError::StorageKeyProtected);
        }
        if self.frame.read_only {
            return Err(HostError::ReadOnlyViolation("storage write"));
        }
        Ok(self.write(output, hook, &self.frame.address, key, value))
    }

    /// Host-initiated write under the protected prefix.
    pub fn set_protected_storage(
        &self,
        output: &mut OutputContext,
        hook: &dyn BlockchainHook,
        address: &Address,
        suffix: &[u8],
        value: &[u8],
    ) -> StorageWrite {
        let key = self.protected_key(suffix);
        self.write(output, hook, address, &key, value)
    }

    pub fn get_protected_storage(
        &self,
        output: &OutputContext,
        hook: &dyn BlockchainHook,
        address: &Address,
        suffix: &[u8],
    ) -> Vec<u8> {
        let key = self.protected_key(suffix);
        self.get_storage_from_address(output, hook, address, &key)
    }

    pub fn protected_key(&self, suffix: &[u8]) -> Vec<u8> {
        let mut key = self.protected_prefix.clone();
        key.extend_from_slice(suffix);
        key
    }

    fn write(
        &self,
        output: &mut OutputContext,
        hook: &dyn BlockchainHook,
        address: &Address,
        key: &[u8],
        value: &[u8],
    ) -> StorageWrite {
        let old = self.get_storage_from_address(output, hook, address, key);
        let status = if old == value {
            StorageStatus::Unchanged
        } else if value.is_empty() {
            StorageStatus::Deleted
        } else if old.is_empty() {
            StorageStatus::Added
        } else {
            StorageStatus::Modified
        };
        if status != StorageStatus::Unchanged {
            output.set_storage_update(address, key, value);
        }
        StorageWrite {
            status,
            old_len: old.len(),
            new_len: value.len(),
        }
    }
}

impl StateStack for StorageContext {
    fn init_state(&mut self) {
        self.frame = StorageFrame::default();
    }

    fn push_state(&mut self) {
        self.stack.push(self.frame);
    }

    fn pop_set_active_state(&mut self) -> Result<()> {
        self.frame = self.stack.pop()?;
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
    use num_bigint::BigUint;
    use std::collections::HashMap;

    struct StoredCells(HashMap<Vec<u8>, Vec<u8>>);

    impl BlockchainHook for StoredCells {
        fn account_exists(&self, _address: &Address) -> bool {
            true
        }
        fn get_balance(&self, _address: &Address) -> BigUint {
            BigUint::default()
        }
        fn get_nonce(&self, _address: &Address) -> u64 {
            0
        }
        fn get_code(&self, _address: &Address) -> Option<Vec<u8>> {
            None
        }
        fn get_storage_data(&self, _address: &Address, key: &[u8]) -> Vec<u8> {
            self.0.get(key).cloned().unwrap_or_default()
        }
        fn get_shard_of_address(&self, _address: &Address) -> u32 {
            0
        }
        fn self_shard_id(&self) -> u32 {
            0
        }
    }

    fn setup() -> (StorageContext, OutputContext, StoredCells) {
        let mut storage = StorageContext::new(b"VMHOST");
        storage.set_address(Address([4; 32]), false);
        let mut cells = HashMap::new();
        cells.insert(b"existing".to_vec(), b"abc".to_vec());
        (storage, OutputContext::new(), StoredCells(cells))
    }

    #[test]
    fn write_statuses() {
        let (storage, mut output, hook) = setup();
        let added = storage.set_storage(&mut output, &hook, b"fresh", b"1").unwrap();
        assert_eq!(added.status, StorageStatus::Added);
        let same = storage.set_storage(&mut output, &hook, b"fresh", b"1").unwrap();
        assert_eq!(same.status, StorageStatus::Unchanged);
        let modified = storage.set_storage(&mut output, &hook, b"existing", b"abcd").unwrap();
        assert_eq!(modified.status, StorageStatus::Modified);
        assert_eq!((modified.old_len, modified.new_len), (3, 4));
        let deleted = storage.set_storage(&mut output, &hook, b"existing", b"").unwrap();
        assert_eq!(deleted.status, StorageStatus::Deleted);
    }

    #[test]
    fn reads_see_pending_updates() {
        let (storage, mut output, hook) = setup();
        assert_eq!(storage.get_storage(&output, &hook, b"existing"), b"abc".to_vec());
        storage.set_storage(&mut output, &hook, b"existing", b"xyz").unwrap();
        assert_eq!(storage.get_storage(&output, &hook, b"existing"), b"xyz".to_vec());
    }

    #[test]
    fn protected_keys_and_read_only_frames_are_rejected() {
        let (mut storage, mut output, hook) = setup();
        assert_eq!(
            storage.set_storage(&mut output, &hook, b"VMHOSTASYNC", b"x"),
            Err(HostError::StorageKeyProtected)
        );

        let address = storage.address();
        storage.set_protected_storage(&mut output, &hook, &address, b"ASYNC", b"blob");
        assert_eq!(
            storage.get_protected_storage(&output, &hook, &address, b"ASYNC"),
            b"blob".to_vec()
        );

        storage.push_state();
        storage.set_address(address, true);
        assert!(matches!(
            storage.set_storage(&mut output, &hook, b"k", b"v"),
            Err(HostError::ReadOnlyViolation(_))
        ));
        storage.pop_set_active_state().unwrap();
        assert!(!storage.is_read_only());
    }

    #[test]
    fn charges_follow_status() {
        let costs = BaseOperationCost {
            store_per_byte: 10,
            data_copy_per_byte: 1,
            ..BaseOperationCost::default()
        };
        let write = |status, old_len, new_len| StorageWrite { status, old_len, new_len };
        assert_eq!(write(StorageStatus::Added, 0, 4).gas_cost(&costs), 40);
        assert_eq!(write(StorageStatus::Modified, 2, 5).gas_cost(&costs), 32);
        assert_eq!(write(StorageStatus::Modified, 5, 2).gas_cost(&costs), 2);
        assert_eq!(write(StorageStatus::Unchanged, 3, 3).gas_cost(&costs), 3);
    }
}
