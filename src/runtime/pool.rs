use super::executor::Instance;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::trace;

pub type CodeHash = [u8; 32];

pub fn code_hash(code: &[u8]) -> CodeHash {
    Sha256::digest(code).into()
}

/// Warm instances keyed by code hash.
///
/// Instances are handed out by value: a checked-out instance belongs to one
/// transaction until it is checked back in, so two transactions can never
/// drive the same instance.
pub struct InstancePool {
    capacity: usize,
    idle: Mutex<HashMap<CodeHash, Vec<Box<dyn Instance>>>>,
}

impl InstancePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            idle: Mutex::new(HashMap::new()),
        }
    }

    pub fn checkout(&self, hash: &CodeHash) -> Option<Box<dyn Instance>> {
        let instance = self.idle.lock().get_mut(hash).and_then(Vec::pop);
        if instance.is_some() {
            trace!(code_hash = %hex::encode(hash), "warm instance reused");
        }
        instance
    }

    /// Returns an instance for reuse; it is dropped when it cannot be reset
    /// or the pool already holds `capacity` instances for this code.
    pub fn checkin(&self, hash: CodeHash, mut instance: Box<dyn Instance>) {
        if self.capacity == 0 || !instance.reset() {
            trace!(code_hash = %hex::encode(hash), "instance not reusable, dropped");
            return;
        }
        let mut idle = self.idle.lock();
        let slot = idle.entry(hash).or_default();
        if slot.len() < self.capacity {
            slot.push(instance);
        } else {
            trace!(code_hash = %hex::encode(hash), capacity = self.capacity, "pool full, instance dropped");
        }
    }

    pub fn idle_count(&self, hash: &CodeHash) -> usize {
        self.idle.lock().get(hash).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for InstancePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let idle: usize = self.idle.lock().values().map(Vec::len).sum();
        f.debug_struct("InstancePool")
            .field("capacity", &self.capacity)
            .field("idle", &idle)
            .finish()
    }
}
