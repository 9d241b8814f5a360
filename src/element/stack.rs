// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Stack of trace elements built up while processing a single packet

use alloc::vec;
use alloc::vec::Vec;

use crate::datapath::{ElementSink, Resp};

use super::{Kind, TraceElement};

/// Stack of [`TraceElement`]s
///
/// There is always a current element. Adding a new element copies the data
/// persisting between elements, i.e. the ISA and PE context, from the
/// current one. Elements are sent in the order they were added.
#[derive(Clone, Debug)]
pub struct Stack {
    elems: Vec<(u64, TraceElement)>,
    to_send: usize,
    current: usize,
    send_idx: usize,
    chan_id: u8,
}

impl Stack {
    /// Create a new stack holding a single current element
    pub fn new() -> Self {
        Self {
            elems: vec![Default::default(); 4],
            to_send: 1,
            current: 0,
            send_idx: 0,
            chan_id: 0,
        }
    }

    /// Set the CoreSight trace ID reported alongside sent elements
    pub fn set_chan_id(&mut self, chan_id: u8) {
        self.chan_id = chan_id;
    }

    /// Retrieve the current element
    pub fn current(&self) -> &TraceElement {
        &self.elems[self.current].1
    }

    /// Retrieve the current element mutably
    pub fn current_mut(&mut self) -> &mut TraceElement {
        &mut self.elems[self.current].1
    }

    /// Reset to a single current element
    ///
    /// The current element keeps its data.
    pub fn reset(&mut self) {
        if self.current != 0 {
            self.elems.swap(0, self.current);
        }
        self.to_send = 1;
        self.current = 0;
        self.send_idx = 0;
    }

    /// Add a new current element for the packet at `index`
    pub fn add_elem(&mut self, index: u64) -> &mut TraceElement {
        if self.current + 1 >= self.elems.len() {
            let len = self.elems.len();
            self.elems.resize(len * 2, Default::default());
        }
        let persistent = self.elems[self.current].1;
        self.current += 1;
        self.to_send += 1;

        let mut elem = TraceElement::default();
        elem.copy_persistent(&persistent);
        self.elems[self.current] = (index, elem);
        &mut self.elems[self.current].1
    }

    /// Add a new current element of the given [`Kind`]
    pub fn add_elem_kind(&mut self, index: u64, kind: Kind) -> &mut TraceElement {
        let elem = self.add_elem(index);
        elem.kind = kind;
        elem
    }

    /// Set the index of the packet the current element stems from
    pub fn set_curr_index(&mut self, index: u64) {
        self.elems[self.current].0 = index;
    }

    /// Retrieve the number of elements left to send
    pub fn num_to_send(&self) -> usize {
        self.to_send
    }

    /// Send elements to the given sink, oldest first
    ///
    /// Sending stops as soon as the sink responds with anything other than
    /// a continue. Once all elements are sent, the stack is
    /// [reset][Self::reset].
    pub fn send_elements(&mut self, sink: &mut impl ElementSink) -> Resp {
        let mut resp = Resp::Cont;
        while self.to_send > 0 && resp.is_cont() {
            let (index, elem) = &self.elems[self.send_idx];
            resp = sink.element_in(*index, self.chan_id, elem);
            self.to_send -= 1;
            self.send_idx += 1;
        }
        if self.to_send == 0 {
            self.reset();
        }
        resp
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}
