// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Protocol packets
//!
//! A single [`Packet`] is kept and updated by the
//! [`Processor`][super::processor::Processor] for every packet in the trace.
//! Fields which are only partially updated by a packet, such as the address,
//! the timestamp or the context, keep their value between packets.

use core::fmt;

use crate::types::{Atom, Isa};

/// Kind of a [`Packet`]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Kind {
    #[default]
    NoError,
    /// Data encountered before the trace was synchronised
    NotSync,
    /// Incomplete packet at the end of the trace
    IncompleteEot,
    BranchAddress,
    ASync,
    CycleCount,
    ISync,
    ISyncCycle,
    Trigger,
    PHdr,
    StoreFail,
    OooData,
    OooAddrPlc,
    NormData,
    DataSuppressed,
    ValNotTraced,
    Ignore,
    ContextId,
    Vmid,
    ExceptionEntry,
    ExceptionExit,
    Timestamp,
    /// Malformed packet
    BadSequence,
    /// Packet not allowed in the configured trace mode
    BadTraceMode,
    /// Reserved header
    Reserved,
}

impl Kind {
    /// Determine whether this kind marks a packet as bad
    pub fn is_bad(self) -> bool {
        matches!(self, Self::BadSequence | Self::BadTraceMode | Self::Reserved)
    }

    /// Determine whether this is a data trace packet
    pub fn is_data(self) -> bool {
        matches!(
            self,
            Self::StoreFail
                | Self::OooData
                | Self::OooAddrPlc
                | Self::NormData
                | Self::DataSuppressed
                | Self::ValNotTraced
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoError => "NO_ERROR",
            Self::NotSync => "NOTSYNC",
            Self::IncompleteEot => "INCOMPLETE_EOT",
            Self::BranchAddress => "BRANCH_ADDRESS",
            Self::ASync => "A_SYNC",
            Self::CycleCount => "CYCLE_COUNT",
            Self::ISync => "I_SYNC",
            Self::ISyncCycle => "I_SYNC_CYCLE",
            Self::Trigger => "TRIGGER",
            Self::PHdr => "P_HDR",
            Self::StoreFail => "STORE_FAIL",
            Self::OooData => "OOO_DATA",
            Self::OooAddrPlc => "OOO_ADDR_PLC",
            Self::NormData => "NORM_DATA",
            Self::DataSuppressed => "DATA_SUPPRESSED",
            Self::ValNotTraced => "VAL_NOT_TRACED",
            Self::Ignore => "IGNORE",
            Self::ContextId => "CONTEXT_ID",
            Self::Vmid => "VMID",
            Self::ExceptionEntry => "EXCEPTION_ENTRY",
            Self::ExceptionExit => "EXCEPTION_EXIT",
            Self::Timestamp => "TIMESTAMP",
            Self::BadSequence => "BAD_SEQUENCE",
            Self::BadTraceMode => "BAD_TRACEMODE",
            Self::Reserved => "RESERVED",
        };
        f.write_str(s)
    }
}

/// Reason for an instruction synchronisation
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ISyncReason {
    #[default]
    Periodic,
    TraceEnable,
    TraceRestartOverflow,
    DebugExit,
}

impl From<u8> for ISyncReason {
    fn from(value: u8) -> Self {
        match value & 0x3 {
            0 => Self::Periodic,
            1 => Self::TraceEnable,
            2 => Self::TraceRestartOverflow,
            _ => Self::DebugExit,
        }
    }
}

/// Information carried by instruction synchronisation packets
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ISyncInfo {
    pub reason: ISyncReason,
    pub has_cycle_count: bool,
    /// Address of the load/store instruction in progress, if any
    pub lsip_address: Option<u64>,
    /// Whether the packet carries no instruction address at all
    pub no_address: bool,
}

/// Execution context as traced
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Context {
    pub alt_isa: bool,
    pub non_secure: bool,
    pub hyp: bool,
    /// Whether the packet updated any of the flags above
    pub updated: bool,
    /// Context ID, if updated by the packet
    pub context_id: Option<u32>,
    /// VMID, if updated by the packet
    pub vmid: Option<u8>,
}

/// Exception information of a branch address packet
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Exception {
    pub number: u16,
    /// Whether the exception cancelled the last traced instruction
    pub cancel: bool,
    /// ARMv7-M resume information
    pub resume: u8,
}

/// Atoms of a P-header
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Atoms {
    /// Enable bits, oldest atom in the LSB
    pub bits: u32,
    /// Number of atoms
    pub num: u8,
}

impl Atoms {
    /// Iterate over the atoms, oldest first
    pub fn iter(&self) -> impl Iterator<Item = Atom> + '_ {
        (0..self.num).map(|i| Atom::from_bit(self.bits & (1 << i) != 0))
    }
}

/// Data trace information
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Data {
    pub value: u32,
    pub address: u32,
    pub ooo_tag: u8,
    /// Big endian data access
    pub be: bool,
    pub value_updated: bool,
    pub address_updated: bool,
}

/// Protocol packet
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Packet {
    pub kind: Kind,
    /// Original kind of a bad or incomplete packet
    pub err_kind: Kind,
    /// ISA at the address of the packet
    pub isa: Isa,
    /// ISA before the packet
    pub prev_isa: Isa,
    pub context: Context,
    pub address: u64,
    pub isync: ISyncInfo,
    pub exception: Option<Exception>,
    pub atoms: Atoms,
    /// P-header format
    pub phdr_fmt: u8,
    pub cycle_count: u32,
    pub timestamp: u64,
    /// Number of timestamp bits updated by the packet
    pub ts_update_bits: u8,
    pub data: Data,
}

impl Packet {
    /// Clear all per-packet information
    ///
    /// Persistent information such as the address, ISA and context are kept.
    pub fn clear(&mut self) {
        *self = Self {
            isa: self.isa,
            prev_isa: self.isa,
            context: Context {
                updated: false,
                context_id: None,
                vmid: None,
                ..self.context
            },
            address: self.address,
            timestamp: self.timestamp,
            ..Default::default()
        };
    }

    /// Reset all information
    pub fn reset_state(&mut self) {
        *self = Default::default();
    }

    /// Determine whether this packet is a bad one
    pub fn is_bad(&self) -> bool {
        self.kind.is_bad()
    }

    /// Mark this packet as being of the given error kind
    ///
    /// The current kind is retained as [`err_kind`][Self::err_kind].
    pub fn set_err(&mut self, kind: Kind) {
        self.err_kind = self.kind;
        self.kind = kind;
    }

    /// Update the lower `bits` bits of the address
    pub fn update_address(&mut self, value: u64, bits: u32) {
        let mask = low_mask(bits);
        self.address = (self.address & !mask) | (value & mask);
    }

    /// Update the lower `bits` bits of the timestamp
    pub fn update_timestamp(&mut self, value: u64, bits: u8) {
        let mask = low_mask(bits.into());
        self.timestamp = (self.timestamp & !mask) | (value & mask);
        self.ts_update_bits = bits;
    }

    /// Update the ISA, remembering the previous one
    pub fn update_isa(&mut self, isa: Isa) {
        self.prev_isa = self.isa;
        self.isa = isa;
    }

    /// Decode the atoms of a P-header
    ///
    /// Returns `false` if the header is not a valid P-header for the given
    /// mode.
    pub fn update_atoms(&mut self, header: u8, cycle_acc: bool) -> bool {
        let (fmt, atoms, cycle_count) = match (cycle_acc, header) {
            // 1NEEEE00
            (false, h) if h & 0x03 == 0x00 => {
                let e = (h >> 2) & 0xF;
                let n = (h >> 6) & 0x1;
                (1, atoms_e_then_n(e, n), 0)
            }
            // 1000FF10
            (false, h) if h & 0xF3 == 0x82 => (2, atoms_f(h), 0),
            // 1N0EEE00, 10000000 being a single cycle without any atom
            (true, h) if h & 0xA3 == 0x80 => {
                let e = (h >> 2) & 0x7;
                let n = (h >> 6) & 0x1;
                (1, atoms_e_then_n(e, n), u32::from(e + n))
            }
            // 1001xF10
            (true, h) if h & 0xF3 == 0x92 => {
                let bits = u32::from(h & 0x04 == 0);
                (4, Atoms { bits, num: 1 }, 0)
            }
            // 1000FF10
            (true, h) if h & 0xF3 == 0x82 => (2, atoms_f(h), 1),
            // 1E1WWW00
            (true, h) if h & 0xA3 == 0xA0 => {
                let e = (h >> 6) & 0x1;
                let atoms = Atoms {
                    bits: e.into(),
                    num: e,
                };
                (3, atoms, u32::from((h >> 2) & 0x7) + 1)
            }
            _ => return false,
        };
        self.phdr_fmt = fmt;
        self.atoms = atoms;
        self.cycle_count = cycle_count;
        true
    }

    /// Cycle count for the atom processed while `remaining` atoms are left
    pub fn atom_cc(&self, remaining: u8) -> u32 {
        match self.phdr_fmt {
            1 => 1,
            2 => (remaining > 1).into(),
            3 => self.cycle_count,
            _ => 0,
        }
    }

    /// Cycle count to report for `remaining` atoms which are not followed
    pub fn remain_cc(&self, remaining: u8) -> u32 {
        match self.phdr_fmt {
            1 => remaining.into(),
            2 => (remaining > 1).into(),
            3 => self.cycle_count,
            _ => 0,
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if self.kind.is_bad() || self.kind == Kind::IncompleteEot {
            return write!(f, " ({})", self.err_kind);
        }
        match self.kind {
            Kind::BranchAddress => {
                write!(f, "; Addr={:#010x}; {}", self.address, self.isa)?;
                if let Some(ex) = self.exception {
                    write!(f, "; Excep={}", ex.number)?;
                    if ex.cancel {
                        f.write_str("; Cancel")?;
                    }
                }
            }
            Kind::ISync | Kind::ISyncCycle => {
                write!(f, "; {:?}", self.isync.reason)?;
                if !self.isync.no_address {
                    write!(f, "; Addr={:#010x}", self.address)?;
                }
                write!(f, "; {}", self.isa)?;
                f.write_str(if self.context.non_secure { "; NS" } else { "; S" })?;
                if self.context.hyp {
                    f.write_str("; Hyp")?;
                }
                if let Some(id) = self.context.context_id {
                    write!(f, "; CtxtID={id:#x}")?;
                }
                if self.isync.has_cycle_count {
                    write!(f, "; Cycles={}", self.cycle_count)?;
                }
            }
            Kind::PHdr => {
                f.write_str("; ")?;
                self.atoms.iter().try_for_each(|a| write!(f, "{a}"))?;
                if self.phdr_fmt == 3 || self.cycle_count != 0 {
                    write!(f, "; Cycles={}", self.cycle_count)?;
                }
            }
            Kind::CycleCount => write!(f, "; Cycles={}", self.cycle_count)?,
            Kind::ContextId => {
                if let Some(id) = self.context.context_id {
                    write!(f, "; CtxtID={id:#x}")?;
                }
            }
            Kind::Vmid => {
                if let Some(vmid) = self.context.vmid {
                    write!(f, "; VMID={vmid:#x}")?;
                }
            }
            Kind::Timestamp => write!(f, "; TS={:#x}", self.timestamp)?,
            Kind::NormData | Kind::OooData => {
                if self.data.address_updated {
                    write!(f, "; Addr={:#010x}", self.data.address)?;
                }
                if self.data.value_updated {
                    write!(f, "; Val={:#x}", self.data.value)?;
                }
            }
            _ => (),
        }
        Ok(())
    }
}

fn low_mask(bits: u32) -> u64 {
    1u64.checked_shl(bits).map_or(u64::MAX, |v| v - 1)
}

fn atoms_e_then_n(e: u8, n: u8) -> Atoms {
    Atoms {
        bits: (1 << e) - 1,
        num: e + n,
    }
}

fn atoms_f(header: u8) -> Atoms {
    let first = u32::from(header & 0x08 == 0);
    let second = u32::from(header & 0x04 == 0);
    Atoms {
        bits: first | (second << 1),
        num: 2,
    }
}
