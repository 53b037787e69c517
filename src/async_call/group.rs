use super::call::{AsyncCall, AsyncCallStatus};
use crate::types::Address;

/// Async calls that share one completion callback.
///
/// Settled calls are removed rather than flagged, so the group is complete
/// exactly when its call list is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsyncCallGroup {
    pub identifier: String,
    pub callback: String,
    pub gas_locked: u64,
    pub callback_data: Vec<u8>,
    pub calls: Vec<AsyncCall>,
}

impl AsyncCallGroup {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Self::default()
        }
    }

    pub fn add_call(&mut self, call: AsyncCall) {
        self.calls.push(call);
    }

    pub fn is_complete(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn has_pending_calls(&self) -> bool {
        self.calls.iter().any(AsyncCall::is_pending)
    }

    pub fn has_callback(&self) -> bool {
        !self.callback.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn find_by_destination(&self, destination: &Address) -> Option<usize> {
        self.calls
            .iter()
            .position(|call| &call.destination == destination)
    }

    pub fn find_by_call_id(&self, call_id: &[u8]) -> Option<usize> {
        self.calls.iter().position(|call| call.call_id == call_id)
    }

    /// Swap-removes the call at `index`; out-of-range indices are ignored.
    pub fn delete_call_at(&mut self, index: usize) {
        if index < self.calls.len() {
            self.calls.swap_remove(index);
        }
    }

    /// Drops every resolved or rejected call, keeping pending ones in order.
    pub fn delete_completed_calls(&mut self) {
        self.calls
            .retain(|call| call.status == AsyncCallStatus::Pending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReturnCode;

    fn group_of(size: usize) -> AsyncCallGroup {
        let mut group = AsyncCallGroup::new("g");
        for i in 0..size {
            group.add_call(AsyncCall {
                call_id: vec![i as u8],
                destination: Address([i as u8; 32]),
                ..AsyncCall::default()
            });
        }
        group
    }

    #[test]
    fn out_of_bounds_removal_is_a_no_op() {
        for size in 0..=5 {
            for index in [usize::MAX, size, size + 1] {
                let mut group = group_of(size);
                group.delete_call_at(index);
                assert_eq!(group, group_of(size), "size {} index {}", size, index);
            }
        }
    }

    #[test]
    fn swap_remove_moves_last_call() {
        let mut group = group_of(4);
        group.delete_call_at(1);
        let ids: Vec<u8> = group.calls.iter().map(|c| c.call_id[0]).collect();
        assert_eq!(ids, vec![0, 3, 2]);
    }

    #[test]
    fn completion_after_resolving_everything() {
        for size in 0..=5 {
            let mut group = group_of(size);
            assert_eq!(group.is_complete(), size == 0);
            for call in group.calls.iter_mut() {
                call.update_status(ReturnCode::Ok);
            }
            group.delete_completed_calls();
            assert!(group.is_complete());
            assert!(!group.has_pending_calls());
        }
    }

    #[test]
    fn pending_calls_keep_their_relative_order() {
        let mut group = group_of(5);
        group.calls[1].update_status(ReturnCode::Ok);
        group.calls[3].update_status(ReturnCode::UserError);
        group.delete_completed_calls();
        let ids: Vec<u8> = group.calls.iter().map(|c| c.call_id[0]).collect();
        assert_eq!(ids, vec![0, 2, 4]);
        assert!(group.has_pending_calls());
        assert_eq!(group.find_by_destination(&Address([4; 32])), Some(2));
        assert_eq!(group.find_by_call_id(&[2]), Some(1));
    }

    #[test]
    fn clone_is_independent() {
        let original = group_of(2);
        let mut clone = original.clone();
        clone.calls[0].data.push(1);
        clone.callback_data.push(2);
        clone.identifier.push('x');
        assert_eq!(original, group_of(2));
    }
}
