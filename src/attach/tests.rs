// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
use super::*;

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

#[test]
fn attach_detach() {
    let mut point = AttachPoint::new();
    assert!(!point.has_attached());
    assert_eq!(point.detach(), Err(ErrorCode::AttachCompNotFound));

    assert_eq!(point.attach(3u8), Ok(()));
    assert_eq!(point.attach(4u8), Err(ErrorCode::AttachTooMany));
    assert_eq!(point.first(), Some(&3));
    assert_eq!(point.num_attached(), 1);

    assert_eq!(point.detach(), Ok(3));
    assert_eq!(point.num_attached(), 0);
    assert_eq!(point.first(), None);
}

#[test]
fn enable() {
    let mut point = AttachPoint::from(7u32);
    point.set_enabled(false);
    assert_eq!(point.first(), None);
    assert_eq!(point.first_mut(), None);
    assert!(point.has_attached());
    assert!(!point.has_attached_and_enabled());

    point.set_enabled(true);
    if let Some(v) = point.first_mut() {
        *v += 1;
    }
    assert_eq!(point.first(), Some(&8));
    assert!(point.has_attached_and_enabled());
}

#[test]
fn replace() {
    let mut point = AttachPoint::new();
    assert_eq!(point.replace_first('a'), None);
    assert_eq!(point.replace_first('b'), Some('a'));
    assert_eq!(point.first(), Some(&'b'));
    point.detach_all();
    assert!(!point.has_attached());
    point.detach_all();
}

#[test]
fn notifications() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut point = AttachPoint::new();
    let notified = seen.clone();
    point.set_notifier(Some(Box::new(move |n| notified.borrow_mut().push(n))));

    point.attach(1i32).unwrap();
    let _ = point.attach(2i32);
    point.replace_first(3);
    point.detach().unwrap();
    point.detach_all();
    assert_eq!(*seen.borrow(), [1, 1, 0]);
}

#[test]
fn replace_notifies_once() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut point = AttachPoint::from('a');
    let notified = seen.clone();
    point.set_notifier(Some(Box::new(move |n| notified.borrow_mut().push(n))));

    assert_eq!(point.replace_first('b'), Some('a'));
    assert_eq!(*seen.borrow(), [1]);
    point.detach_all();
    assert_eq!(point.replace_first('c'), None);
    assert_eq!(*seen.borrow(), [1, 0, 1]);
}
