// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
use super::*;

use alloc::vec::Vec;

use crate::datapath::{self, Resp};
use crate::types::{Isa, SecLevel};

fn timestamp(value: u64) -> Kind {
    Kind::Timestamp {
        value,
        freq_change: false,
    }
}

fn fill(list: &mut List, count: u64) {
    (0..count).for_each(|i| list.next_elem(i).kind = timestamp(i));
}

#[test]
fn elem_type_ids() {
    assert_eq!(Kind::InstrRange(Default::default()).elem_type() as u8, 5);
    assert_eq!(Kind::AddrNacc { address: 0, space: MemSpace::N }.elem_type() as u8, 7);
    assert_eq!(Kind::MemTrans(MemTrans::Start).elem_type() as u8, 16);
    assert_eq!(Kind::Custom.elem_type() as u8, 19);
}

#[test]
fn list_send_order() {
    let mut list = List::new();
    list.set_chan_id(0x22);
    fill(&mut list, 3);
    assert_eq!(list.num_elem(), 3);
    assert!(list.elem_to_send());

    let mut seen = Vec::new();
    let resp = list.send_elements(&mut datapath::from_fn(|idx, id, e: &TraceElement| {
        seen.push((idx, id, e.kind));
        Resp::Cont
    }));
    assert_eq!(resp, Resp::Cont);
    assert_eq!(
        seen,
        [
            (0, 0x22, timestamp(0)),
            (1, 0x22, timestamp(1)),
            (2, 0x22, timestamp(2)),
        ]
    );
    assert_eq!(list.num_elem(), 0);
    assert!(!list.elem_to_send());
}

#[test]
fn list_growth_keeps_order() {
    let mut list = List::new();
    fill(&mut list, 10);
    let mut sink: Vec<TraceElement> = Vec::new();
    // Drain a few so that the ring wraps before growing
    let mut count = 0;
    list.send_elements(&mut datapath::from_fn(|_, _, _| {
        count += 1;
        if count == 6 { Resp::Wait } else { Resp::Cont }
    }));
    assert_eq!(list.num_elem(), 4);

    (10..40).for_each(|i| list.next_elem(i).kind = timestamp(i));
    assert_eq!(list.num_elem(), 34);
    assert_eq!(list.send_elements(&mut sink), Resp::Cont);
    let expected: Vec<_> = (6..40).map(|i| TraceElement::new(timestamp(i))).collect();
    assert_eq!(sink, expected);
}

#[test]
fn list_wait_consumes_elem() {
    let mut list = List::new();
    fill(&mut list, 3);
    let mut seen = 0;
    let resp = list.send_elements(&mut datapath::from_fn(|_, _, _| {
        seen += 1;
        Resp::Wait
    }));
    assert_eq!(resp, Resp::Wait);
    assert_eq!(seen, 1);
    assert_eq!(list.num_elem(), 2);
}

#[test]
fn list_pend_commit() {
    let mut list = List::new();
    fill(&mut list, 3);
    list.pend_last_n(4);
    assert_eq!(list.num_pend(), 0);
    list.pend_last_n(2);
    assert_eq!(list.num_pend(), 2);
    assert!(list.num_pend() <= list.num_elem());

    let mut sink: Vec<TraceElement> = Vec::new();
    list.send_elements(&mut sink);
    assert_eq!(sink, [TraceElement::new(timestamp(0))]);
    assert_eq!(list.num_elem(), 2);
    assert!(!list.elem_to_send());

    list.commit_all_pend();
    assert_eq!(list.num_pend(), 0);
    assert_eq!(list.num_elem(), 2);
    assert!(list.elem_to_send());
}

#[test]
fn list_pend_cancel() {
    let mut list = List::new();
    fill(&mut list, 5);
    list.pend_last_n(2);
    list.cancel_pend();
    assert_eq!(list.num_elem(), 3);
    assert_eq!(list.num_pend(), 0);
    assert_eq!(list.elem_type(2), Some(ElemType::Timestamp));
    assert_eq!(list.elem_type(3), None);

    // Cancelled slots are reused
    list.next_elem(9).kind = Kind::AddrUnknown;
    assert_eq!(list.elem_type(3), Some(ElemType::AddrUnknown));
}

#[test]
fn list_reset() {
    let mut list = List::new();
    fill(&mut list, 5);
    list.pend_last_n(1);
    list.reset();
    assert_eq!(list.num_elem(), 0);
    assert_eq!(list.num_pend(), 0);
    assert!(list.last_mut().is_none());
}

#[test]
fn stack_persistent_data() {
    let mut stack = Stack::new();
    stack.set_chan_id(3);
    stack.current_mut().isa = Isa::Thumb2;
    stack.current_mut().context.security = SecLevel::NonSecure;
    stack.current_mut().kind = Kind::PeContext;

    for i in 1..6 {
        stack.add_elem_kind(i, timestamp(i));
    }
    assert_eq!(stack.num_to_send(), 6);
    assert_eq!(stack.current().isa, Isa::Thumb2);
    assert_eq!(stack.current().context.security, SecLevel::NonSecure);

    let mut sink: Vec<TraceElement> = Vec::new();
    assert_eq!(stack.send_elements(&mut sink), Resp::Cont);
    assert_eq!(sink.len(), 6);
    assert_eq!(sink[0].kind, Kind::PeContext);
    assert_eq!(sink[5].kind, timestamp(5));
    assert_eq!(stack.num_to_send(), 1);
    assert_eq!(stack.current().isa, Isa::Thumb2);
}

#[test]
fn stack_resume_after_wait() {
    let mut stack = Stack::new();
    stack.add_elem_kind(1, Kind::AddrUnknown);
    stack.set_curr_index(7);

    let mut indices = Vec::new();
    let resp = stack.send_elements(&mut datapath::from_fn(|idx, _, _| {
        indices.push(idx);
        Resp::Wait
    }));
    assert_eq!(resp, Resp::Wait);
    assert_eq!(stack.num_to_send(), 1);

    let mut rest: Vec<TraceElement> = Vec::new();
    assert_eq!(stack.send_elements(&mut rest), Resp::Cont);
    assert_eq!(indices, [0]);
    assert_eq!(rest, [TraceElement::new(Kind::AddrUnknown)]);
}

#[test]
fn display() {
    let mut elem = TraceElement::new(Kind::InstrRange(InstrRange {
        start: 0x1000,
        end: 0x1004,
        num_instr: 1,
        last_exec: true,
        last_size: 4,
        ..Default::default()
    }));
    elem.isa = Isa::Arm;
    elem.cycle_count = Some(3);
    assert_eq!(
        alloc::format!("{elem}"),
        "INSTR_RANGE 0x1000:[0x1004] num_i(1) last_sz(4) (A32) E [CC=3]",
    );
}
