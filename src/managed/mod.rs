//! Handle-addressed byte buffers owned by the host on behalf of contracts.
//!
//! Every dest-context invocation gets an empty heap; the caller's heap comes
//! back when the child returns.

use crate::state::{Snapshots, StateStack};
use crate::{HostError, Result};

pub type Handle = i32;

#[derive(Debug)]
pub struct ManagedTypesContext {
    buffers: Vec<Vec<u8>>,
    stack: Snapshots<Vec<Vec<u8>>>,
}

impl Default for ManagedTypesContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagedTypesContext {
    pub fn new() -> Self {
        Self {
            buffers: Vec::new(),
            stack: Snapshots::new("managed types"),
        }
    }

    pub fn new_buffer(&mut self, bytes: Vec<u8>) -> Result<Handle> {
        let handle = Handle::try_from(self.buffers.len())
            .map_err(|_| HostError::InvalidArgument("too many managed buffers".into()))?;
        self.buffers.push(bytes);
        Ok(handle)
    }

    pub fn get_bytes(&self, handle: Handle) -> Result<&[u8]> {
        self.slot(handle).map(|index| self.buffers[index].as_slice())
    }

    pub fn set_bytes(&mut self, handle: Handle, bytes: Vec<u8>) -> Result<()> {
        let index = self.slot(handle)?;
        self.buffers[index] = bytes;
        Ok(())
    }

    pub fn append(&mut self, handle: Handle, bytes: &[u8]) -> Result<()> {
        let index = self.slot(handle)?;
        self.buffers[index].extend_from_slice(bytes);
        Ok(())
    }

    pub fn len(&self, handle: Handle) -> Result<usize> {
        self.get_bytes(handle).map(<[u8]>::len)
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn slot(&self, handle: Handle) -> Result<usize> {
        usize::try_from(handle)
            .ok()
            .filter(|index| *index < self.buffers.len())
            .ok_or_else(|| HostError::InvalidArgument(format!("no managed buffer for handle {}", handle)))
    }
}

impl StateStack for ManagedTypesContext {
    fn init_state(&mut self) {
        self.buffers.clear();
    }

    fn push_state(&mut self) {
        self.stack.push(std::mem::take(&mut self.buffers));
    }

    fn pop_set_active_state(&mut self) -> Result<()> {
        self.buffers = self.stack.pop()?;
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

    #[test]
    fn buffer_operations() {
        let mut managed = ManagedTypesContext::new();
        let handle = managed.new_buffer(b"ab".to_vec()).unwrap();
        managed.append(handle, b"cd").unwrap();
        assert_eq!(managed.get_bytes(handle).unwrap(), b"abcd");
        managed.set_bytes(handle, b"z".to_vec()).unwrap();
        assert_eq!(managed.len(handle).unwrap(), 1);
        assert!(managed.get_bytes(-1).is_err());
        assert!(managed.get_bytes(7).is_err());
    }

    #[test]
    fn child_heap_is_isolated() {
        let mut managed = ManagedTypesContext::new();
        let parent = managed.new_buffer(b"parent".to_vec()).unwrap();

        managed.push_state();
        assert!(managed.get_bytes(parent).is_err());
        let child = managed.new_buffer(b"child".to_vec()).unwrap();
        assert_eq!(child, 0);
        managed.pop_set_active_state().unwrap();

        assert_eq!(managed.get_bytes(parent).unwrap(), b"parent");
        assert_eq!(managed.buffer_count(), 1);
    }
}
