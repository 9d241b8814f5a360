// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
use super::*;

use alloc::format;

macro_rules! code_test {
    ($n:ident, $c:expr, $v:literal, $name:literal) => {
        #[test]
        fn $n() {
            let code: ErrorCode = $c;
            assert_eq!(u32::from(code), $v);
            assert_eq!(ErrorCode::try_from($v), Ok(code));
            assert_eq!(code.name(), $name);
        }
    };
}

code_test!(code_ok, ErrorCode::Ok, 0, "OK");
code_test!(code_attach, ErrorCode::AttachTooMany, 10, "ERR_ATTACH_TOO_MANY");
code_test!(code_not_cont, ErrorCode::DfrmtrNotContTrace, 17, "ERR_DFMTR_NOTCONTTRACE");
code_test!(code_fhsync, ErrorCode::DfrmtrBadFhsync, 18, "ERR_DFMTR_BAD_FHSYNC");
code_test!(code_nacc, ErrorCode::MemNacc, 27, "ERR_MEM_NACC");
code_test!(code_overlap, ErrorCode::MemAccOverlap, 30, "ERR_MEM_ACC_OVERLAP");
code_test!(code_limit, ErrorCode::IRangeLimitOverrun, 45, "ERR_I_RANGE_LIMIT_OVERRUN");
code_test!(code_last, ErrorCode::Last, 47, "ERR_LAST");

#[test]
fn code_table() {
    assert_eq!(ErrorCode::ALL.len(), 48);
    ErrorCode::ALL
        .iter()
        .enumerate()
        .for_each(|(i, c)| assert_eq!(*c as usize, i));
    assert_eq!(ErrorCode::try_from(48), Err(48));
}

#[test]
fn descriptions() {
    assert_eq!(ErrorCode::Ok.description(), "No Error.");
    assert_eq!(
        format!("{}", ErrorCode::DfrmtrNotContTrace),
        "Trace input to deformatter none-continuous.",
    );
}

#[test]
fn severity_order() {
    assert!(Severity::None < Severity::Error);
    assert!(Severity::Error < Severity::Warn);
    assert!(Severity::Warn < Severity::Info);
}

#[test]
fn display_plain() {
    let err = Error::from(ErrorCode::Fail);
    assert_eq!(format!("{err}"), "ERROR:0x0001 (ERR_FAIL) [General failure.]");
}

#[test]
fn display_full() {
    let err = Error::new(Severity::Warn, ErrorCode::BadPacketSeq)
        .with_index(12)
        .with_chan_id(0x10)
        .with_message("lost sync");
    assert_eq!(
        format!("{err}"),
        "WARN:0x0013 (ERR_BAD_PACKET_SEQ) [Bad packet sequence.]; TrcIdx=12; CS ID=10; lost sync",
    );
    assert_eq!(err.index(), Some(12));
    assert_eq!(err.chan_id(), Some(0x10));
    assert_eq!(err.message(), Some("lost sync"));
}

#[test]
fn tracing_log() {
    let mut log = TracingLog::new();
    assert_eq!(log.last_error(), None);
    let err = Error::from(ErrorCode::MemNacc).with_index(3);
    log.log_error("TEST", &err);
    log.log_message("TEST", Severity::Info, "hello");
    assert_eq!(log.last_error(), Some(&err));
}
