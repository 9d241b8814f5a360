// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Trace source configuration

use core::fmt;

use crate::types::{ArchProfile, ArchVersion, CoreProfile};

/// Trace mode selected by the control register
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TraceMode {
    /// Instruction trace only
    InstrOnly,
    /// Instruction trace with data values
    IDataVal,
    /// Instruction trace with data addresses
    IDataAddr,
    /// Instruction trace with data values and addresses
    IDataValAddr,
    /// Data values only
    DataOnlyVal,
    /// Data addresses only
    DataOnlyAddr,
    /// Data values and addresses only
    DataOnlyValAddr,
}

impl fmt::Display for TraceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InstrOnly => "instruction only",
            Self::IDataVal => "instruction + data value",
            Self::IDataAddr => "instruction + data address",
            Self::IDataValAddr => "instruction + data value + data address",
            Self::DataOnlyVal => "data value only",
            Self::DataOnlyAddr => "data address only",
            Self::DataOnlyValAddr => "data value + data address only",
        };
        f.write_str(s)
    }
}

const CTRL_DATA_VAL: u32 = 0x4;
const CTRL_DATA_ADDR: u32 = 0x8;
const CTRL_CYCLE_ACC: u32 = 0x1000;
const CTRL_DATA_ONLY: u32 = 0x10_0000;
const CTRL_TS_ENA: u32 = 0x1 << 28;
const CTRL_VMID_ENA: u32 = 0x1 << 30;

const CCER_HAS_TS: u32 = 0x1 << 22;
const CCER_VIRT_EXT: u32 = 0x1 << 26;
const CCER_TS64: u32 = 0x1 << 29;

const IDR_ALT_BRANCH: u32 = 0x10_0000;

/// Configuration of a single trace source
///
/// The configuration consists of the images of the trace source's ID, control,
/// configuration code extension and trace ID registers as well as the
/// architecture and profile of the traced core.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct Config {
    /// ETMIDR image
    pub reg_idr: u32,
    /// ETMCR image
    pub reg_ctrl: u32,
    /// ETMCCER image
    pub reg_ccer: u32,
    /// ETMTRACEIDR image
    pub reg_trc_id: u32,
    pub arch: ArchVersion,
    pub profile: CoreProfile,
}

impl Config {
    /// CoreSight trace ID of the source
    pub fn trace_id(&self) -> u8 {
        (self.reg_trc_id & 0x7F) as u8
    }

    pub fn arch_profile(&self) -> ArchProfile {
        ArchProfile::new(self.arch, self.profile)
    }

    /// Determine the [`TraceMode`]
    pub fn trace_mode(&self) -> TraceMode {
        let val = self.reg_ctrl & CTRL_DATA_VAL != 0;
        let addr = self.reg_ctrl & CTRL_DATA_ADDR != 0;
        match (self.reg_ctrl & CTRL_DATA_ONLY != 0, val, addr) {
            (false, false, false) => TraceMode::InstrOnly,
            (false, true, false) => TraceMode::IDataVal,
            (false, false, true) => TraceMode::IDataAddr,
            (false, true, true) => TraceMode::IDataValAddr,
            (true, true, false) => TraceMode::DataOnlyVal,
            (true, false, true) => TraceMode::DataOnlyAddr,
            // Data only tracing without any data selected is not a thing
            (true, _, _) => TraceMode::DataOnlyValAddr,
        }
    }

    pub fn is_instr_trace(&self) -> bool {
        self.reg_ctrl & CTRL_DATA_ONLY == 0
    }

    pub fn is_data_val_trace(&self) -> bool {
        self.reg_ctrl & CTRL_DATA_VAL != 0
    }

    pub fn is_data_addr_trace(&self) -> bool {
        self.reg_ctrl & CTRL_DATA_ADDR != 0
    }

    /// Determine whether any kind of data trace is enabled
    pub fn is_data_trace(&self) -> bool {
        self.reg_ctrl & (CTRL_DATA_VAL | CTRL_DATA_ADDR) != 0
    }

    pub fn is_cycle_acc(&self) -> bool {
        self.reg_ctrl & CTRL_CYCLE_ACC != 0
    }

    /// Number of context ID bytes traced
    pub fn ctxt_id_bytes(&self) -> usize {
        match (self.reg_ctrl >> 14) & 0x3 {
            0 => 0,
            1 => 1,
            2 => 2,
            _ => 4,
        }
    }

    /// Minor revision of the trace source
    pub fn minor_rev(&self) -> u8 {
        ((self.reg_idr & 0xF0) >> 4) as u8
    }

    /// Determine whether the alternative branch address encoding is in use
    ///
    /// The alternative encoding is only available from minor revision 4 on.
    pub fn is_alt_branch(&self) -> bool {
        self.reg_idr & IDR_ALT_BRANCH != 0 && self.minor_rev() >= 4
    }

    pub fn has_virt_ext(&self) -> bool {
        self.reg_ccer & CCER_VIRT_EXT != 0
    }

    pub fn is_vmid_trace(&self) -> bool {
        self.reg_ctrl & CTRL_VMID_ENA != 0
    }

    pub fn has_ts(&self) -> bool {
        self.reg_ccer & CCER_HAS_TS != 0
    }

    pub fn is_ts_enabled(&self) -> bool {
        self.reg_ctrl & CTRL_TS_ENA != 0
    }

    /// Determine whether timestamps are 64 bits wide
    pub fn is_ts_64(&self) -> bool {
        self.reg_ccer & CCER_TS64 != 0
    }

    /// Determine whether the traced core is an ARMv7-M
    pub fn is_v7m(&self) -> bool {
        self.arch == ArchVersion::V7 && self.profile == CoreProfile::CortexM
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trace ID {:#04x}, {}, context ID bytes: {}",
            self.trace_id(),
            self.trace_mode(),
            self.ctxt_id_bytes()
        )?;
        if self.is_cycle_acc() {
            f.write_str(", cycle accurate")?;
        }
        if self.is_ts_enabled() {
            f.write_str(", timestamps")?;
        }
        if self.is_vmid_trace() {
            f.write_str(", VMID")?;
        }
        Ok(())
    }
}
