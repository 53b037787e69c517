use super::call::{AsyncCall, AsyncCallStatus};
use super::group::AsyncCallGroup;
use super::results::FinishedAsyncCall;
use crate::state::{Snapshots, StateStack};
use crate::types::{Address, ReturnCode};
use crate::{HostError, Result};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};

/// Group holding calls scheduled through the single-call legacy API.
pub const LEGACY_GROUP_ID: &str = "LegacyAsync";

/// Storage-key suffix under which a deferred context is persisted.
pub const ASYNC_STORAGE_TAG: &[u8] = b"ASYNC";

/// Async calls scheduled by one invocation, grouped by identifier.
#[derive(Debug, Clone)]
pub struct AsyncContext {
    address: Address,
    call_id: Vec<u8>,
    caller_call_id: Vec<u8>,
    calls_counter: u64,
    groups: IndexMap<String, AsyncCallGroup>,
    results: Vec<FinishedAsyncCall>,
    stack: Snapshots<AsyncContext>,
}

impl Default for AsyncContext {
    fn default() -> Self {
        Self::new(Address::ZERO, Vec::new(), Vec::new())
    }
}

impl PartialEq for AsyncContext {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
            && self.call_id == other.call_id
            && self.caller_call_id == other.caller_call_id
            && self.calls_counter == other.calls_counter
            && self.groups == other.groups
            && self.results == other.results
    }
}

impl Eq for AsyncContext {}

impl AsyncContext {
    pub fn new(address: Address, call_id: Vec<u8>, caller_call_id: Vec<u8>) -> Self {
        Self {
            address,
            call_id,
            caller_call_id,
            calls_counter: 0,
            groups: IndexMap::new(),
            results: Vec::new(),
            stack: Snapshots::new("async context"),
        }
    }

    /// Rebuilds a context from its persisted parts.
    pub fn from_parts(
        address: Address,
        call_id: Vec<u8>,
        caller_call_id: Vec<u8>,
        calls_counter: u64,
        groups: Vec<AsyncCallGroup>,
        results: Vec<FinishedAsyncCall>,
    ) -> Self {
        let mut context = Self::new(address, call_id, caller_call_id);
        context.calls_counter = calls_counter;
        context.groups = groups
            .into_iter()
            .map(|group| (group.identifier.clone(), group))
            .collect();
        context.results = results;
        context
    }

    /// Starts the context of a new invocation, keeping the state stack.
    pub fn reset_for(&mut self, address: Address, call_id: Vec<u8>, caller_call_id: Vec<u8>) {
        let stack = std::mem::replace(&mut self.stack, Snapshots::new("async context"));
        *self = Self::new(address, call_id, caller_call_id);
        self.stack = stack;
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn call_id(&self) -> &[u8] {
        &self.call_id
    }

    pub fn caller_call_id(&self) -> &[u8] {
        &self.caller_call_id
    }

    pub fn calls_counter(&self) -> u64 {
        self.calls_counter
    }

    /// Derives a fresh, deterministic identifier from this context's own id.
    pub fn generate_call_id(&mut self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(&self.call_id);
        hasher.update(self.calls_counter.to_be_bytes());
        self.calls_counter += 1;
        hasher.finalize().to_vec()
    }

    pub fn register_call(&mut self, group_id: &str, call: AsyncCall) -> Result<()> {
        if group_id.is_empty() {
            return Err(HostError::AsyncCall("group identifier must not be empty".into()));
        }
        if self.find_call_by_id(&call.call_id).is_some() {
            return Err(HostError::AsyncCall(format!(
                "duplicate call id {}",
                hex::encode(&call.call_id)
            )));
        }
        self.groups
            .entry(group_id.to_string())
            .or_insert_with(|| AsyncCallGroup::new(group_id))
            .add_call(call);
        Ok(())
    }

    /// Registers a call made through the legacy API; only one is allowed.
    pub fn register_legacy_call(&mut self, call: AsyncCall) -> Result<()> {
        if self
            .groups
            .get(LEGACY_GROUP_ID)
            .map_or(false, |group| !group.is_complete())
        {
            return Err(HostError::AsyncCall("only one legacy async call is allowed".into()));
        }
        self.register_call(LEGACY_GROUP_ID, call)
    }

    pub fn set_group_callback(&mut self, group_id: &str, callback: &str, data: Vec<u8>, gas: u64) -> Result<()> {
        if group_id == LEGACY_GROUP_ID {
            return Err(HostError::AsyncCall("cannot set a callback on the legacy group".into()));
        }
        let group = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| HostError::AsyncCall(format!("unknown async group '{}'", group_id)))?;
        if group.has_callback() {
            return Err(HostError::AsyncCall(format!(
                "async group '{}' already has a callback",
                group_id
            )));
        }
        group.callback = callback.to_string();
        group.callback_data = data;
        group.gas_locked = gas;
        Ok(())
    }

    pub fn group(&self, group_id: &str) -> Option<&AsyncCallGroup> {
        self.groups.get(group_id)
    }

    pub fn group_mut(&mut self, group_id: &str) -> Option<&mut AsyncCallGroup> {
        self.groups.get_mut(group_id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &AsyncCallGroup> {
        self.groups.values()
    }

    /// Group identifiers in insertion order.
    pub fn group_ids(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    /// Group identifier and index of the call with `call_id`.
    pub fn find_call_by_id(&self, call_id: &[u8]) -> Option<(String, usize)> {
        self.groups.iter().find_map(|(id, group)| {
            group
                .find_by_call_id(call_id)
                .map(|index| (id.clone(), index))
        })
    }

    pub fn call(&self, group_id: &str, index: usize) -> Option<&AsyncCall> {
        self.groups.get(group_id).and_then(|group| group.calls.get(index))
    }

    pub fn call_mut(&mut self, group_id: &str, index: usize) -> Option<&mut AsyncCall> {
        self.groups
            .get_mut(group_id)
            .and_then(|group| group.calls.get_mut(index))
    }

    /// Settles the call with `call_id` and returns a copy of it.
    pub fn update_call_status(&mut self, call_id: &[u8], code: ReturnCode) -> Result<AsyncCall> {
        let (group_id, index) = self.find_call_by_id(call_id).ok_or_else(|| {
            HostError::AsyncCall(format!("unknown async call {}", hex::encode(call_id)))
        })?;
        let call = self
            .call_mut(&group_id, index)
            .ok_or_else(|| HostError::Internal("async call vanished".into()))?;
        call.update_status(code);
        Ok(call.clone())
    }

    pub fn delete_completed_calls(&mut self, group_id: &str) {
        if let Some(group) = self.groups.get_mut(group_id) {
            group.delete_completed_calls();
        }
    }

    /// Removes every group whose call list is empty.
    pub fn delete_completed_groups(&mut self) {
        self.groups.retain(|_, group| !group.is_complete());
    }

    pub fn delete_group(&mut self, group_id: &str) -> Option<AsyncCallGroup> {
        self.groups.shift_remove(group_id)
    }

    pub fn is_complete(&self) -> bool {
        self.groups.values().all(AsyncCallGroup::is_complete)
    }

    pub fn has_pending_groups(&self) -> bool {
        !self.is_complete()
    }

    pub fn has_pending_calls(&self) -> bool {
        self.groups
            .values()
            .flat_map(|group| group.calls.iter())
            .any(|call| call.status == AsyncCallStatus::Pending)
    }

    pub fn record_finished_call(&mut self, finished: FinishedAsyncCall) {
        self.results.push(finished);
    }

    pub fn results(&self) -> &[FinishedAsyncCall] {
        &self.results
    }

    /// Storage-key suffix of the context with `call_id`.
    pub fn storage_suffix(call_id: &[u8]) -> Vec<u8> {
        let mut key = ASYNC_STORAGE_TAG.to_vec();
        key.extend_from_slice(call_id);
        key
    }

    fn snapshot(&self) -> AsyncContext {
        AsyncContext {
            address: self.address,
            call_id: self.call_id.clone(),
            caller_call_id: self.caller_call_id.clone(),
            calls_counter: self.calls_counter,
            groups: self.groups.clone(),
            results: self.results.clone(),
            stack: Snapshots::new("async context"),
        }
    }
}

impl StateStack for AsyncContext {
    fn init_state(&mut self) {
        self.reset_for(Address::ZERO, Vec::new(), Vec::new());
    }

    fn push_state(&mut self) {
        let snapshot = self.snapshot();
        self.stack.push(snapshot);
    }

    fn pop_set_active_state(&mut self) -> Result<()> {
        let mut restored = self.stack.pop()?;
        restored.stack = std::mem::replace(&mut self.stack, Snapshots::new("async context"));
        *self = restored;
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

    fn call(id: u8) -> AsyncCall {
        AsyncCall {
            call_id: vec![id],
            destination: Address([id; 32]),
            success_callback: "ok".into(),
            error_callback: "err".into(),
            ..AsyncCall::default()
        }
    }

    #[test]
    fn call_ids_are_deterministic_and_unique() {
        let mut a = AsyncContext::new(Address::ZERO, b"root".to_vec(), Vec::new());
        let mut b = AsyncContext::new(Address::ZERO, b"root".to_vec(), Vec::new());
        let first = a.generate_call_id();
        let second = a.generate_call_id();
        assert_ne!(first, second);
        assert_eq!(first, b.generate_call_id());
        assert_eq!(a.calls_counter(), 2);
    }

    #[test]
    fn groups_keep_insertion_order() {
        let mut context = AsyncContext::default();
        context.register_call("zeta", call(1)).unwrap();
        context.register_call("alpha", call(2)).unwrap();
        context.register_call("zeta", call(3)).unwrap();
        assert_eq!(context.group_ids(), vec!["zeta", "alpha"]);
        assert_eq!(context.find_call_by_id(&[3]), Some(("zeta".to_string(), 1)));
        assert!(context.register_call("alpha", call(3)).is_err());
        assert!(context.register_call("", call(4)).is_err());
    }

    #[test]
    fn legacy_group_takes_one_call() {
        let mut context = AsyncContext::default();
        context.register_legacy_call(call(1)).unwrap();
        assert!(context.register_legacy_call(call(2)).is_err());
        assert!(context.set_group_callback(LEGACY_GROUP_ID, "cb", vec![], 0).is_err());
    }

    #[test]
    fn group_callback_requires_existing_group() {
        let mut context = AsyncContext::default();
        assert!(context.set_group_callback("g", "done", vec![], 5).is_err());
        context.register_call("g", call(1)).unwrap();
        context.set_group_callback("g", "done", b"d".to_vec(), 5).unwrap();
        let group = context.group("g").unwrap();
        assert_eq!((group.callback.as_str(), group.gas_locked), ("done", 5));
        assert!(context.set_group_callback("g", "again", vec![], 0).is_err());
    }

    #[test]
    fn completion_tracks_groups() {
        let mut context = AsyncContext::default();
        assert!(context.is_complete());
        context.register_call("g", call(1)).unwrap();
        context.register_call("h", call(2)).unwrap();
        assert!(context.has_pending_groups());

        let updated = context.update_call_status(&[1], ReturnCode::Ok).unwrap();
        assert_eq!(updated.status, AsyncCallStatus::Resolved);
        context.delete_completed_calls("g");
        context.delete_completed_groups();
        assert_eq!(context.group_ids(), vec!["h"]);
        assert!(context.has_pending_calls());
        assert!(context.update_call_status(&[9], ReturnCode::Ok).is_err());
    }

    #[test]
    fn state_stack_isolates_child_contexts() {
        let mut context = AsyncContext::new(Address([1; 32]), b"parent".to_vec(), Vec::new());
        context.register_call("g", call(1)).unwrap();

        context.push_state();
        context.reset_for(Address([2; 32]), b"child".to_vec(), b"parent".to_vec());
        context.register_call("c", call(2)).unwrap();
        assert_eq!(context.state_stack_depth(), 1);
        context.pop_set_active_state().unwrap();

        assert_eq!(context.call_id(), b"parent");
        assert_eq!(context.group_ids(), vec!["g"]);
        assert_eq!(context.state_stack_depth(), 0);
        assert!(context.pop_set_active_state().is_err());
    }
}
