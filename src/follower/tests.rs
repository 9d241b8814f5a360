// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0

use super::*;

use crate::instruction::{self, UnknownOpcode};
use crate::memory::{self, error::SegmentError};

/// Program used throughout the tests, located at `0x1000`
///
/// * `0x1000`: `mov r0, r0`
/// * `0x1004`: `bl 0x2000`
/// * `0x1008`: `bx lr`
/// * `0x100c`: `mov r0, r0`
/// * `0x1010`: (Thumb) `bx lr`
const PROGRAM: &[u8] = b"\x00\x00\xa0\xe1\xfd\x03\x00\xeb\x1e\xff\x2f\xe1\x00\x00\xa0\xe1\x70\x47";

fn decode(request: &Request) -> Result<Info, UnknownOpcode> {
    match (request.opcode, request.opcode_size) {
        (0xe1a00000, 4) => Ok(Info::other(4)),
        (0xeb0003fd, 4) => Ok(Info::branch(4, 0x2000, request.isa).with_link(true)),
        (0xe12fff1e, 4) => Ok(Info::indirect_branch(4)),
        (0x4770, 2) => Ok(Info::indirect_branch(2)),
        (o, _) => Err(UnknownOpcode(o)),
    }
}

type Follower = CodeFollower<
    memory::Offset<memory::basic::Segment<&'static [u8]>>,
    instruction::Func<fn(&Request) -> Result<Info, UnknownOpcode>, UnknownOpcode>,
>;

fn follower() -> Follower {
    let mut follower = Follower::new();
    follower
        .memory_access()
        .attach(memory::from_segment(PROGRAM).with_offset(0x1000))
        .expect("Could not attach memory");
    follower
        .instruction_decode()
        .attach(instruction::from_fn(decode as fn(&Request) -> _))
        .expect("Could not attach decoder");
    follower.set_isa(Isa::Arm);
    follower
}

macro_rules! atom_test {
    ($n:ident, $a:literal, $t:expr, $e:literal, $next:expr) => {
        #[test]
        fn $n() {
            let mut follower = follower();
            assert_eq!(follower.follow_single_atom($a, $t), Ok(()));
            assert_eq!(follower.range_start(), $a);
            assert_eq!(follower.range_end(), $e);
            assert_eq!(follower.num_instr(), 1);
            assert_eq!(follower.next_addr(), $next);
            assert!(!follower.is_nacc());
        }
    };
}

atom_test!(atom_other_e, 0x1000, Atom::E, 0x1004, Some(0x1004));
atom_test!(atom_other_n, 0x1000, Atom::N, 0x1004, Some(0x1004));
atom_test!(atom_branch_e, 0x1004, Atom::E, 0x1008, Some(0x2000));
atom_test!(atom_branch_n, 0x1004, Atom::N, 0x1008, Some(0x1008));
atom_test!(atom_indirect_e, 0x1008, Atom::E, 0x100c, None);
atom_test!(atom_indirect_n, 0x1008, Atom::N, 0x100c, Some(0x100c));

#[test]
fn not_init() {
    let mut follower = Follower::new();
    assert!(!follower.is_ready());
    assert_eq!(follower.follow_single_atom(0x1000, Atom::E), Err(Error::NotInit));

    let mut follower = self::follower();
    assert!(follower.is_ready());
    follower.instruction_decode().set_enabled(false);
    assert!(!follower.is_ready());
    assert_eq!(follower.follow_single_instr(0x1000), Err(Error::NotInit));
}

#[test]
fn single_instr_ignores_branch() {
    let mut follower = follower();
    assert_eq!(follower.follow_single_instr(0x1004), Ok(()));
    assert_eq!(follower.next_addr(), Some(0x1008));
    assert_eq!(follower.instr_info().kind, InstrType::Branch);
    assert_eq!(follower.instr_info().subtype, instruction::InstrSubtype::BrLink);
}

#[test]
fn nacc_unmapped() {
    let mut follower = follower();
    let res = follower.follow_single_atom(0x0800, Atom::E);
    assert_eq!(
        res,
        Err(Error::Nacc {
            address: 0x0800,
            source: SegmentError::OutOfBounds(0x0800)
        })
    );
    assert_eq!(res.map_err(|e| e.code()), Err(ErrorCode::MemNacc));
    assert!(follower.is_nacc());
    assert_eq!(follower.next_addr(), Some(0x0800));
    assert_eq!(follower.num_instr(), 0);

    follower.clear_error();
    assert!(!follower.is_nacc());
}

#[test]
fn nacc_short_read() {
    let mut follower = follower();
    let res = follower.follow_single_atom(0x1010, Atom::E);
    assert_eq!(
        res,
        Err(Error::ShortRead {
            address: 0x1010,
            len: 2
        })
    );
    assert!(follower.is_nacc());
}

#[test]
fn thumb_narrow() {
    let mut follower = follower();
    follower.set_isa(Isa::Thumb2);
    assert_eq!(follower.follow_single_atom(0x1010, Atom::N), Ok(()));
    assert_eq!(follower.range_end(), 0x1012);
    assert_eq!(follower.instr_info().kind, InstrType::IndirectBranch);
    assert_eq!(follower.next_addr(), Some(0x1012));
}

#[test]
fn decode_error() {
    let mut follower = follower();
    let res = follower.follow_single_atom(0x1002, Atom::E);
    assert_eq!(res, Err(Error::Decode(UnknownOpcode(0x03fde1a0))));
    assert_eq!(res.map_err(|e| e.code()), Err(ErrorCode::InvalidOpcode));
    assert!(!follower.is_nacc());
}

#[test]
fn branch_changes_isa() {
    let mut follower = Follower::new();
    follower
        .memory_access()
        .attach(memory::from_segment(PROGRAM).with_offset(0x1000))
        .expect("Could not attach memory");
    let decode: fn(&Request) -> _ =
        |_| Ok::<_, UnknownOpcode>(Info::branch(4, 0x1011, Isa::Thumb2));
    follower
        .instruction_decode()
        .attach(instruction::from_fn(decode))
        .expect("Could not attach decoder");
    follower.set_isa(Isa::Arm);
    assert_eq!(follower.follow_single_atom(0x1000, Atom::E), Ok(()));
    assert_eq!(follower.isa(), Isa::Thumb2);
    assert_eq!(follower.next_addr(), Some(0x1011));
}

#[test]
fn to_waypoint() {
    let mut follower = follower();
    assert_eq!(follower.follow_to_waypoint(0x1000, Atom::E), Ok(()));
    assert_eq!(follower.range_start(), 0x1000);
    assert_eq!(follower.range_end(), 0x1008);
    assert_eq!(follower.num_instr(), 2);
    assert_eq!(follower.instr_info().kind, InstrType::Branch);
    assert_eq!(follower.next_addr(), Some(0x2000));
}

#[test]
fn to_waypoint_nacc() {
    let mut follower = follower();
    let res = follower.follow_to_waypoint(0x100c, Atom::E);
    assert_eq!(res, Err(Error::ShortRead { address: 0x1010, len: 2 }));
    assert_eq!(follower.num_instr(), 1);
    assert_eq!(follower.range_end(), 0x1010);
    assert_eq!(follower.next_addr(), Some(0x1010));
}

#[test]
fn to_waypoint_limit() {
    let mut follower = follower();
    follower.set_range_limit(Some(1));
    let res = follower.follow_to_waypoint(0x1000, Atom::E);
    assert_eq!(res, Err(Error::RangeLimit(1)));
    assert_eq!(res.map_err(|e| e.code()), Err(ErrorCode::IRangeLimitOverrun));

    follower.set_range_limit(Some(2));
    assert_eq!(follower.follow_to_waypoint(0x1000, Atom::N), Ok(()));
    assert_eq!(follower.next_addr(), Some(0x1008));
}
