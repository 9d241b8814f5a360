// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Queue of trace elements with support for speculative output

use alloc::vec;
use alloc::vec::Vec;

use crate::datapath::{ElementSink, Resp};

use super::{ElemType, TraceElement};

/// Initial number of element slots
const INITIAL_SIZE: usize = 16;

/// Queue of [`TraceElement`]s
///
/// Elements are sent oldest first. The newest elements may be marked as
/// pending, which holds them back until they are either committed or
/// cancelled.
#[derive(Clone, Debug)]
pub struct List {
    elems: Vec<(u64, TraceElement)>,
    first: usize,
    used: usize,
    pending: usize,
    chan_id: u8,
}

impl List {
    /// Create a new, empty list
    pub fn new() -> Self {
        Self {
            elems: vec![Default::default(); INITIAL_SIZE],
            first: 0,
            used: 0,
            pending: 0,
            chan_id: 0,
        }
    }

    /// Set the CoreSight trace ID reported alongside sent elements
    pub fn set_chan_id(&mut self, chan_id: u8) {
        self.chan_id = chan_id;
    }

    /// Discard all elements
    pub fn reset(&mut self) {
        self.first = 0;
        self.used = 0;
        self.pending = 0;
    }

    /// Append a fresh element for the packet at `index` and return it
    ///
    /// The element is of kind [`Unknown`][super::Kind::Unknown]. The list
    /// grows if all slots are in use.
    pub fn next_elem(&mut self, index: u64) -> &mut TraceElement {
        if self.used >= self.elems.len() {
            self.grow();
        }
        let slot = self.slot(self.used);
        self.used += 1;

        let entry = &mut self.elems[slot];
        *entry = (index, Default::default());
        &mut entry.1
    }

    /// Retrieve the number of elements in the list, including pending ones
    pub fn num_elem(&self) -> usize {
        self.used
    }

    /// Retrieve the number of pending elements
    pub fn num_pend(&self) -> usize {
        self.pending
    }

    /// Retrieve the [`ElemType`] of the `n`th oldest element
    pub fn elem_type(&self, n: usize) -> Option<ElemType> {
        (n < self.used).then(|| self.elems[self.slot(n)].1.elem_type())
    }

    /// Retrieve the newest element
    pub fn last_mut(&mut self) -> Option<&mut TraceElement> {
        let n = self.used.checked_sub(1)?;
        let slot = self.slot(n);
        Some(&mut self.elems[slot].1)
    }

    /// Mark the `n` newest elements as pending
    ///
    /// Nothing is marked if there are fewer than `n` elements.
    pub fn pend_last_n(&mut self, n: usize) {
        if n <= self.used {
            self.pending = n;
        }
    }

    /// Commit all pending elements, making them available for sending
    pub fn commit_all_pend(&mut self) {
        self.pending = 0;
    }

    /// Remove all pending elements from the list
    pub fn cancel_pend(&mut self) {
        self.used -= self.pending;
        self.pending = 0;
    }

    /// Check whether there are any elements ready to be sent
    pub fn elem_to_send(&self) -> bool {
        self.used > self.pending
    }

    /// Send ready elements to the given sink, oldest first
    ///
    /// Sending stops as soon as the sink responds with anything other than
    /// a continue. The element for which that response was received is
    /// considered sent.
    pub fn send_elements(&mut self, sink: &mut impl ElementSink) -> Resp {
        let mut resp = Resp::Cont;
        while self.elem_to_send() && resp.is_cont() {
            let (index, elem) = &self.elems[self.first];
            resp = sink.element_in(*index, self.chan_id, elem);

            self.first = self.slot(1);
            self.used -= 1;
        }
        resp
    }

    fn slot(&self, n: usize) -> usize {
        (self.first + n) % self.elems.len()
    }

    fn grow(&mut self) {
        let len = self.elems.len();
        self.elems.rotate_left(self.first);
        self.first = 0;
        self.elems.resize(len * 2, Default::default());
        tracing::trace!(size = len * 2, "Grew element list");
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}
