// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Return address stack for inferring function returns


use crate::types::Isa;

/// Maximum depth of a [`ReturnStack`]
pub const MAX_DEPTH: usize = 16;

/// Return address stack
///
/// Trace sources may omit the target address of a function return if it
/// matches the address pushed by the corresponding call. This stack tracks
/// these `(address, ISA)` pairs. Once the maximum depth is reached, pushing
/// evicts the oldest entry.
///
/// Popping from an empty stack marks the stack as
/// [overflown][Self::overflow] until it is [flushed][Self::flush].
/// Pushes and pops only take effect while the stack is
/// [active][Self::set_active].
#[derive(Clone, Debug, Default)]
pub struct ReturnStack {
    data: [(u64, Isa); MAX_DEPTH],
    depth: usize,
    base: usize,
    overflow: bool,
    active: bool,
    pop_pending: bool,
    t_info_wait_addr: bool,
}

impl ReturnStack {
    /// Create a new, inactive return stack
    pub fn new() -> Self {
        Default::default()
    }

    /// Activate or deactivate the stack
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Check whether the stack is active
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Push a return address
    ///
    /// Pushes are ignored while waiting for an address after trace info.
    pub fn push(&mut self, address: u64, isa: Isa) {
        if !self.active || self.t_info_wait_addr {
            return;
        }

        let depth = self.depth;
        self.data[(self.base + depth) % MAX_DEPTH] = (address, isa);
        if depth < MAX_DEPTH {
            self.depth = depth + 1;
        } else {
            self.base = (self.base + 1) % MAX_DEPTH;
        }
    }

    /// Retrieve and remove the topmost return address
    pub fn pop(&mut self) -> Option<(u64, Isa)> {
        if !self.active {
            return None;
        }

        let Some(depth) = self.depth.checked_sub(1) else {
            self.overflow = true;
            return None;
        };
        self.depth = depth;
        Some(self.data[(self.base + depth) % MAX_DEPTH])
    }

    /// Remove all entries and clear the overflow and pending pop states
    pub fn flush(&mut self) {
        self.depth = 0;
        self.base = 0;
        self.overflow = false;
        self.pop_pending = false;
    }

    /// Current number of entries
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Check whether more entries were popped than pushed
    pub fn overflow(&self) -> bool {
        self.overflow
    }

    /// Mark a pop as pending
    ///
    /// This has no effect while the stack is inactive.
    pub fn set_pop_pending(&mut self) {
        if self.active {
            self.pop_pending = true;
        }
    }

    pub fn clear_pop_pending(&mut self) {
        self.pop_pending = false;
    }

    pub fn pop_pending(&self) -> bool {
        self.pop_pending
    }

    /// Mark the stack as waiting for an address following trace info
    pub fn set_t_info_wait_addr(&mut self) {
        self.t_info_wait_addr = true;
    }

    pub fn clear_t_info_wait_addr(&mut self) {
        self.t_info_wait_addr = false;
    }

    pub fn is_t_info_wait_addr(&self) -> bool {
        self.t_info_wait_addr
    }
}
