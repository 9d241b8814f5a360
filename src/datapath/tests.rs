// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
use super::*;

use crate::element::{self, TraceElement};

macro_rules! resp_test {
    ($n:ident, $r:expr, cont: $c:literal, wait: $w:literal, fatal: $f:literal) => {
        #[test]
        fn $n() {
            let resp: Resp = $r;
            assert_eq!(resp.is_cont(), $c);
            assert_eq!(resp.is_wait(), $w);
            assert_eq!(resp.is_fatal(), $f);
        }
    };
}

resp_test!(cont, Resp::Cont, cont: true, wait: false, fatal: false);
resp_test!(warn_cont, Resp::WarnCont, cont: true, wait: false, fatal: false);
resp_test!(err_cont, Resp::ErrCont, cont: true, wait: false, fatal: false);
resp_test!(wait, Resp::Wait, cont: false, wait: true, fatal: false);
resp_test!(warn_wait, Resp::WarnWait, cont: false, wait: true, fatal: false);
resp_test!(err_wait, Resp::ErrWait, cont: false, wait: true, fatal: false);
resp_test!(not_init, Resp::FatalNotInit, cont: false, wait: false, fatal: true);
resp_test!(invalid_op, Resp::FatalInvalidOp, cont: false, wait: false, fatal: true);
resp_test!(invalid_param, Resp::FatalInvalidParam, cont: false, wait: false, fatal: true);
resp_test!(invalid_data, Resp::FatalInvalidData, cont: false, wait: false, fatal: true);
resp_test!(sys_err, Resp::FatalSysErr, cont: false, wait: false, fatal: true);

#[test]
fn ordering() {
    assert!(Resp::Cont < Resp::WarnCont);
    assert!(Resp::ErrCont < Resp::Wait);
    assert!(Resp::ErrWait < Resp::FatalNotInit);
    assert!(Resp::FatalInvalidData < Resp::FatalSysErr);
    assert_eq!(Resp::FatalSysErr as u8, 10);
}

#[test]
fn collate() {
    assert_eq!(Resp::Cont.collate(Resp::Wait), Resp::Wait);
    assert_eq!(Resp::FatalSysErr.collate(Resp::Wait), Resp::FatalSysErr);
    assert_eq!(Resp::WarnCont.collate(Resp::Cont), Resp::WarnCont);
}

#[test]
fn warn_err() {
    assert!(Resp::WarnWait.is_warn());
    assert!(!Resp::Wait.is_warn());
    assert!(Resp::ErrCont.is_err());
    assert!(!Resp::FatalInvalidData.is_err());
}

#[test]
fn display() {
    assert_eq!(alloc::format!("{}", Resp::WarnWait), "RESP_WARN_WAIT");
    assert_eq!(alloc::format!("{}", Op::Eot), "OP_EOT");
}

#[test]
fn func_sink() {
    let mut count = 0;
    let mut sink = from_fn(|_, id, _| {
        count += usize::from(id);
        Resp::Wait
    });
    let elem = TraceElement::new(element::Kind::CycleCount);
    assert_eq!(sink.element_in(0, 3, &elem), Resp::Wait);
    assert_eq!(sink.element_in(1, 4, &elem), Resp::Wait);
    drop(sink);
    assert_eq!(count, 7);
}

#[test]
fn vec_sinks() {
    let mut elements: Vec<TraceElement> = Vec::new();
    let elem = TraceElement::new(element::Kind::AddrUnknown);
    assert_eq!(elements.element_in(5, 0x10, &elem), Resp::Cont);
    assert_eq!(elements, [elem]);

    let mut packets: Vec<(u64, u8)> = Vec::new();
    assert_eq!(packets.packet_in(Op::Data, 4, Some(&2)), Resp::Cont);
    assert_eq!(packets.packet_in(Op::Eot, 0, None), Resp::Cont);
    assert_eq!(packets, [(4, 2)]);
}
