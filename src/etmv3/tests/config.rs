// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0

use crate::etmv3::config::{Config, TraceMode};
use crate::types::{ArchVersion, CoreProfile};

macro_rules! trace_mode_test {
    ($n:ident, $c:literal, $m:expr) => {
        #[test]
        fn $n() {
            let config = Config {
                reg_ctrl: $c,
                ..Default::default()
            };
            assert_eq!(config.trace_mode(), $m);
        }
    };
}

trace_mode_test!(mode_instr_only, 0x0, TraceMode::InstrOnly);
trace_mode_test!(mode_data_val, 0x4, TraceMode::IDataVal);
trace_mode_test!(mode_data_addr, 0x8, TraceMode::IDataAddr);
trace_mode_test!(mode_data_val_addr, 0xc, TraceMode::IDataValAddr);
trace_mode_test!(mode_data_only_val, 0x10_0004, TraceMode::DataOnlyVal);
trace_mode_test!(mode_data_only_addr, 0x10_0008, TraceMode::DataOnlyAddr);
trace_mode_test!(mode_data_only_none, 0x10_0000, TraceMode::DataOnlyValAddr);

macro_rules! ctxt_id_test {
    ($n:ident, $c:literal, $b:literal) => {
        #[test]
        fn $n() {
            let config = Config {
                reg_ctrl: $c << 14,
                ..Default::default()
            };
            assert_eq!(config.ctxt_id_bytes(), $b);
        }
    };
}

ctxt_id_test!(ctxt_id_none, 0, 0);
ctxt_id_test!(ctxt_id_one, 1, 1);
ctxt_id_test!(ctxt_id_two, 2, 2);
ctxt_id_test!(ctxt_id_four, 3, 4);

#[test]
fn trace_id() {
    let config = Config {
        reg_trc_id: 0xf2,
        ..Default::default()
    };
    assert_eq!(config.trace_id(), 0x72);
}

#[test]
fn alt_branch_needs_rev4() {
    let mut config = Config {
        reg_idr: 0x10_0030,
        ..Default::default()
    };
    assert_eq!(config.minor_rev(), 3);
    assert!(!config.is_alt_branch());
    config.reg_idr = 0x10_0040;
    assert!(config.is_alt_branch());
    config.reg_idr = 0x40;
    assert!(!config.is_alt_branch());
}

#[test]
fn flags() {
    let config = Config {
        reg_ctrl: 0x1000 | (1 << 28) | (1 << 30),
        reg_ccer: (1 << 22) | (1 << 26) | (1 << 29),
        ..Default::default()
    };
    assert!(config.is_cycle_acc());
    assert!(config.is_ts_enabled());
    assert!(config.is_vmid_trace());
    assert!(config.has_ts());
    assert!(config.has_virt_ext());
    assert!(config.is_ts_64());
    assert!(config.is_instr_trace());
    assert!(!config.is_data_trace());

    let config = Config::default();
    assert!(!config.is_cycle_acc());
    assert!(!config.has_ts());
}

#[test]
fn v7m() {
    let config = Config {
        arch: ArchVersion::V7,
        profile: CoreProfile::CortexM,
        ..Default::default()
    };
    assert!(config.is_v7m());
    let config = Config {
        arch: ArchVersion::V7,
        profile: CoreProfile::CortexA,
        ..Default::default()
    };
    assert!(!config.is_v7m());
}
