// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
use super::*;

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

#[derive(Clone, Default)]
struct Recorder(Rc<RefCell<Vec<(String, Severity, Option<ErrorCode>)>>>);

impl ErrorLog for Recorder {
    fn log_error(&mut self, component: &str, error: &Error) {
        self.0
            .borrow_mut()
            .push((component.into(), error.severity(), Some(error.code())));
    }

    fn log_message(&mut self, component: &str, severity: Severity, _: &str) {
        self.0.borrow_mut().push((component.into(), severity, None));
    }
}

#[test]
fn names() {
    assert_eq!(Component::new("PKTP_ETMV3", Some(2), 0).name(), "PKTP_ETMV3_2");
    assert_eq!(Component::new("DFMT_CSFRAMES", None, 0).name(), "DFMT_CSFRAMES");
}

#[test]
fn op_modes() {
    let mut comp = Component::new("TEST", None, 0x30);
    assert_eq!(comp.set_op_mode(0x40), Err(ErrorCode::InvalidParamVal));
    assert_eq!(comp.op_mode(), 0);
    assert_eq!(comp.set_op_mode(0x10), Ok(()));
    assert!(comp.has_op_flags(0x10));
    assert!(!comp.has_op_flags(0x30));
    assert_eq!(comp.supported_op_modes(), 0x30);
}

#[test]
fn logging() {
    let recorder = Recorder::default();
    let mut comp = Component::new("TEST", Some(0), 0);
    comp.error_logger()
        .attach(Box::new(recorder.clone()))
        .unwrap();

    comp.log_error(&Error::from(ErrorCode::Fail));
    comp.log_message(Severity::Info, "filtered");
    comp.set_verbosity(Severity::Info);
    comp.log_message(Severity::Info, "passed");
    comp.log_error(&Error::new(Severity::Warn, ErrorCode::MemNacc));

    let seen = recorder.0.borrow();
    assert_eq!(
        *seen,
        [
            ("TEST_0".into(), Severity::Error, Some(ErrorCode::Fail)),
            ("TEST_0".into(), Severity::Info, None),
            ("TEST_0".into(), Severity::Warn, Some(ErrorCode::MemNacc)),
        ]
    );
}

#[test]
fn disabled_logger() {
    let recorder = Recorder::default();
    let mut comp = Component::new("TEST", None, 0);
    comp.error_logger()
        .attach(Box::new(recorder.clone()))
        .unwrap();
    comp.error_logger().set_enabled(false);
    comp.log_error(&Error::from(ErrorCode::Fail));
    assert!(recorder.0.borrow().is_empty());
}
