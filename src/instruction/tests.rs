// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0

use super::*;

macro_rules! waypoint_test {
    ($n:ident, $t:expr, $w:literal) => {
        #[test]
        fn $n() {
            assert_eq!(InstrType::is_waypoint($t), $w);
        }
    };
}

waypoint_test!(waypoint_other, InstrType::Other, false);
waypoint_test!(waypoint_branch, InstrType::Branch, true);
waypoint_test!(waypoint_indirect, InstrType::IndirectBranch, true);
waypoint_test!(waypoint_isb, InstrType::Isb, true);
waypoint_test!(waypoint_barrier, InstrType::DsbDmb, true);
waypoint_test!(waypoint_wait, InstrType::WfiWfe, true);

#[test]
fn info_constructors() {
    let info = Info::other(2);
    assert_eq!(info.kind, InstrType::Other);
    assert_eq!(info.size, 2);

    let info = Info::branch(4, 0x2000, Isa::Thumb2)
        .with_conditional(true)
        .with_link(true);
    assert_eq!(info.kind, InstrType::Branch);
    assert_eq!(info.subtype, InstrSubtype::BrLink);
    assert_eq!(info.branch_address, 0x2000);
    assert_eq!(info.next_isa, Isa::Thumb2);
    assert!(info.conditional);
    assert!(info.link);

    let info = Info::indirect_branch(4).with_link(false);
    assert_eq!(info.kind, InstrType::IndirectBranch);
    assert_eq!(info.subtype, InstrSubtype::None);
}

#[test]
fn decode_from_fn() {
    let mut decoder = from_fn(|r: &Request| match r.opcode {
        0xe12fff1e => Ok(Info::indirect_branch(4)),
        0xe1a00000 => Ok(Info::other(4)),
        o => Err(UnknownOpcode(o)),
    });
    let mut request = Request {
        isa: Isa::Arm,
        address: 0x1000,
        opcode: 0xe1a00000,
        opcode_size: 4,
        ..Default::default()
    };
    assert_eq!(decoder.decode(&request), Ok(Info::other(4)));
    request.opcode = 0xe12fff1e;
    assert_eq!(decoder.decode(&request), Ok(Info::indirect_branch(4)));
    request.opcode = 0xffffffff;
    assert_eq!(decoder.decode(&request), Err(UnknownOpcode(0xffffffff)));
}

#[test]
fn unknown_opcode_display() {
    assert_eq!(
        alloc::format!("{}", UnknownOpcode(0x4770)),
        "Unknown opcode 0x00004770"
    );
}
