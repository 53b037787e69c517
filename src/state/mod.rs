//! Push/pop/commit/discard discipline shared by every execution context.
//!
//! Entering a nested call pushes a snapshot of each context; leaving it either
//! restores the snapshot ([`StateStack::pop_set_active_state`], rollback) or
//! drops it and keeps the current state ([`StateStack::pop_discard`], commit).
//! The stack is strictly LIFO and its depth equals the nesting depth.

use crate::{HostError, Result};

pub trait StateStack {
    /// Resets the active state to the empty state of a fresh invocation.
    fn init_state(&mut self);

    /// Saves a snapshot of the active state.
    fn push_state(&mut self);

    /// Pops the last snapshot and makes it the active state.
    fn pop_set_active_state(&mut self) -> Result<()>;

    /// Pops the last snapshot and drops it, keeping the active state.
    fn pop_discard(&mut self) -> Result<()>;

    fn clear_state_stack(&mut self);

    fn state_stack_depth(&self) -> usize;
}

/// LIFO snapshot storage backing a [`StateStack`] implementation.
#[derive(Debug, Clone)]
pub struct Snapshots<T> {
    context: &'static str,
    frames: Vec<T>,
}

impl<T> Snapshots<T> {
    pub fn new(context: &'static str) -> Self {
        Self {
            context,
            frames: Vec::new(),
        }
    }

    pub fn push(&mut self, frame: T) {
        self.frames.push(frame);
    }

    /// Pops the last snapshot; popping an empty stack is a fatal error.
    pub fn pop(&mut self) -> Result<T> {
        self.frames
            .pop()
            .ok_or(HostError::StateStackUnderflow {
                context: self.context,
            })
    }

    pub fn peek(&self) -> Option<&T> {
        self.frames.last()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
