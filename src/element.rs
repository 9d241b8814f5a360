// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Generic trace elements
//!
//! Decoders translate protocol specific packets into protocol independent
//! [`TraceElement`]s. Elements are queued in a [`List`] or [`Stack`] before
//! being sent to an [`ElementSink`][crate::datapath::ElementSink].

pub mod list;
pub mod stack;

#[cfg(test)]
mod tests;

use core::fmt;

use crate::instruction::{InstrSubtype, InstrType};
use crate::types::{Isa, MemSpace, PeContext};

pub use list::List;
pub use stack::Stack;

/// Numeric element type identifier
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ElemType {
    Unknown = 0,
    NoSync = 1,
    TraceOn = 2,
    EoTrace = 3,
    PeContext = 4,
    InstrRange = 5,
    IRangeNoPath = 6,
    AddrNacc = 7,
    AddrUnknown = 8,
    Exception = 9,
    ExceptionRet = 10,
    Timestamp = 11,
    CycleCount = 12,
    Event = 13,
    SwTrace = 14,
    SyncMarker = 15,
    MemTrans = 16,
    Custom = 19,
}

/// Reason for a loss of synchronisation or end of trace
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum UnsyncInfo {
    #[default]
    Unknown,
    InitDecoder,
    ResetDecoder,
    Overflow,
    Discard,
    BadPacket,
    BadImage,
    Eot,
}

impl fmt::Display for UnsyncInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "undefined",
            Self::InitDecoder => "init-decoder",
            Self::ResetDecoder => "reset-decoder",
            Self::Overflow => "overflow",
            Self::Discard => "discard",
            Self::BadPacket => "bad-packet",
            Self::BadImage => "bad-program-image",
            Self::Eot => "end-of-trace",
        };
        f.write_str(s)
    }
}

/// Reason for trace being switched on
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum TraceOnReason {
    /// Trace started or entered a filter region
    #[default]
    Normal,
    /// Trace restarted after an overflow
    Overflow,
    /// Trace restarted after leaving debug state
    DebugExit,
}

impl fmt::Display for TraceOnReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "begin or filter"),
            Self::Overflow => write!(f, "overflow"),
            Self::DebugExit => write!(f, "debug restart"),
        }
    }
}

/// Trace event
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    Unknown,
    /// Trigger event
    Trigger,
    /// Numbered event
    Numbered(u16),
}

/// Memory transaction state
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemTrans {
    TraceInit,
    Start,
    Commit,
    Fail,
}

/// Range of executed instructions
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct InstrRange {
    /// Address of the first instruction
    pub start: u64,
    /// Address following the last instruction
    pub end: u64,
    /// Number of instructions in the range
    pub num_instr: u32,
    /// Whether the last instruction was executed
    pub last_exec: bool,
    /// Type of the last instruction
    pub last_type: InstrType,
    /// Subtype of the last instruction
    pub last_subtype: InstrSubtype,
    /// Size of the last instruction in bytes
    pub last_size: u8,
    /// Whether the last instruction is conditional
    pub last_cond: bool,
}

/// Kind of a [`TraceElement`] and its kind specific payload
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Kind {
    #[default]
    Unknown,
    /// Decoder is not synchronised
    NoSync(UnsyncInfo),
    /// Trace switched on
    TraceOn(TraceOnReason),
    /// End of the trace
    EoTrace(UnsyncInfo),
    /// The PE context changed
    PeContext,
    /// Range of instructions traced
    InstrRange(InstrRange),
    /// Range of instructions executed but with unknown path
    IRangeNoPath {
        start: u64,
        end: u64,
        num_instr: u32,
    },
    /// Instruction memory at the given address could not be accessed
    AddrNacc { address: u64, space: MemSpace },
    /// The address of the next instruction is not known
    AddrUnknown,
    /// An exception occurred
    Exception { number: u32, data_marker: bool },
    /// Return from an exception
    ExceptionRet,
    /// Timestamp
    Timestamp { value: u64, freq_change: bool },
    /// Cycle count, carried in [`TraceElement::cycle_count`]
    CycleCount,
    /// Trace event
    Event(Event),
    /// Software trace
    SwTrace { master_id: u16, channel_id: u16 },
    /// Synchronisation marker
    SyncMarker { value: u32 },
    /// Memory transaction
    MemTrans(MemTrans),
    /// Implementation defined element
    Custom,
}

impl Kind {
    /// Retrieve the numeric [`ElemType`]
    pub fn elem_type(&self) -> ElemType {
        match self {
            Self::Unknown => ElemType::Unknown,
            Self::NoSync(_) => ElemType::NoSync,
            Self::TraceOn(_) => ElemType::TraceOn,
            Self::EoTrace(_) => ElemType::EoTrace,
            Self::PeContext => ElemType::PeContext,
            Self::InstrRange(_) => ElemType::InstrRange,
            Self::IRangeNoPath { .. } => ElemType::IRangeNoPath,
            Self::AddrNacc { .. } => ElemType::AddrNacc,
            Self::AddrUnknown => ElemType::AddrUnknown,
            Self::Exception { .. } => ElemType::Exception,
            Self::ExceptionRet => ElemType::ExceptionRet,
            Self::Timestamp { .. } => ElemType::Timestamp,
            Self::CycleCount => ElemType::CycleCount,
            Self::Event(_) => ElemType::Event,
            Self::SwTrace { .. } => ElemType::SwTrace,
            Self::SyncMarker { .. } => ElemType::SyncMarker,
            Self::MemTrans(_) => ElemType::MemTrans,
            Self::Custom => ElemType::Custom,
        }
    }
}

/// Generic trace element
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceElement {
    /// Kind of element
    pub kind: Kind,
    /// ISA of the instructions this element refers to
    pub isa: Isa,
    /// PE context at the time of this element
    pub context: PeContext,
    /// Cycle count associated with this element, if any
    pub cycle_count: Option<u32>,
}

impl TraceElement {
    /// Create a new element of the given [`Kind`]
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Retrieve the [`ElemType`]
    pub fn elem_type(&self) -> ElemType {
        self.kind.elem_type()
    }

    /// Copy the data persisting between elements from another element
    ///
    /// This includes the ISA and the PE context.
    pub fn copy_persistent(&mut self, src: &Self) {
        self.isa = src.isa;
        self.context = src.context;
    }
}

impl From<Kind> for TraceElement {
    fn from(kind: Kind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for TraceElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Unknown => write!(f, "UNKNOWN")?,
            Kind::NoSync(info) => write!(f, "NO_SYNC ({info})")?,
            Kind::TraceOn(reason) => write!(f, "TRACE_ON ({reason})")?,
            Kind::EoTrace(info) => write!(f, "EO_TRACE ({info})")?,
            Kind::PeContext => write!(f, "PE_CONTEXT ({}; {})", self.context, self.isa)?,
            Kind::InstrRange(range) => {
                write!(
                    f,
                    "INSTR_RANGE {:#x}:[{:#x}] num_i({}) last_sz({}) ({}) {}",
                    range.start,
                    range.end,
                    range.num_instr,
                    range.last_size,
                    self.isa,
                    if range.last_exec { "E" } else { "N" },
                )?;
                if range.last_type != InstrType::Other {
                    write!(f, " {:?}", range.last_type)?;
                }
            }
            Kind::IRangeNoPath {
                start,
                end,
                num_instr,
            } => write!(f, "I_RANGE_NOPATH {start:#x}:[{end:#x}] num_i({num_instr})")?,
            Kind::AddrNacc { address, space } => {
                write!(f, "ADDR_NACC {address:#x} (space {:#04x})", space.bits())?
            }
            Kind::AddrUnknown => write!(f, "ADDR_UNKNOWN")?,
            Kind::Exception {
                number,
                data_marker,
            } => {
                write!(f, "EXCEPTION {number:#x}")?;
                if *data_marker {
                    write!(f, " (data marker)")?;
                }
            }
            Kind::ExceptionRet => write!(f, "EXCEPTION_RET")?,
            Kind::Timestamp { value, .. } => write!(f, "TIMESTAMP {value:#x}")?,
            Kind::CycleCount => write!(f, "CYCLE_COUNT")?,
            Kind::Event(Event::Trigger) => write!(f, "EVENT trigger")?,
            Kind::Event(Event::Numbered(n)) => write!(f, "EVENT {n}")?,
            Kind::Event(Event::Unknown) => write!(f, "EVENT")?,
            Kind::SwTrace {
                master_id,
                channel_id,
            } => write!(f, "SWTRACE {master_id:#x}:{channel_id:#x}")?,
            Kind::SyncMarker { value } => write!(f, "SYNC_MARKER {value:#x}")?,
            Kind::MemTrans(t) => write!(f, "MEMTRANS {t:?}")?,
            Kind::Custom => write!(f, "CUSTOM")?,
        }
        if let Some(cc) = self.cycle_count {
            write!(f, " [CC={cc}]")?;
        }
        Ok(())
    }
}
