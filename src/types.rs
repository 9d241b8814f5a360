// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Types shared between [deformatting][crate::deformatter], packet processing
//! and decoding


use core::fmt;

/// Invalid CoreSight trace source ID
pub const BAD_TRACE_ID: u8 = 0xFF;

/// Check whether a CoreSight trace source ID is valid
///
/// Valid IDs are in the range `0x01..0x70`.
pub fn is_valid_trace_id(id: u8) -> bool {
    (0x01..0x70).contains(&id)
}

/// Check whether a CoreSight trace source ID is reserved
///
/// The ID `0` and the IDs in the range `0x70..=0x7F` are reserved.
pub fn is_reserved_trace_id(id: u8) -> bool {
    id == 0 || (0x70..=0x7F).contains(&id)
}

/// Instruction set architecture the PE executes in
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Isa {
    /// A32
    Arm,
    /// T32
    Thumb2,
    /// A64
    AArch64,
    /// ThumbEE
    Tee,
    /// Jazelle
    Jazelle,
    /// Implementation defined
    Custom,
    #[default]
    Unknown,
}

impl Isa {
    /// Number of low address bits always zero for instructions of this ISA
    pub fn addr_shift(self) -> u32 {
        match self {
            Self::Arm | Self::AArch64 => 2,
            Self::Thumb2 | Self::Tee => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for Isa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Arm => "A32",
            Self::Thumb2 => "T32",
            Self::AArch64 => "A64",
            Self::Tee => "TEE",
            Self::Jazelle => "Jaz",
            Self::Custom => "Cst",
            Self::Unknown => "Unk",
        };
        f.write_str(s)
    }
}

/// Security state of the PE
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SecLevel {
    #[default]
    Secure,
    NonSecure,
    Root,
    Realm,
}

impl fmt::Display for SecLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secure => write!(f, "S"),
            Self::NonSecure => write!(f, "N"),
            Self::Root => write!(f, "Root"),
            Self::Realm => write!(f, "Realm"),
        }
    }
}

/// Exception level of the PE
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExLevel {
    El0,
    El1,
    El2,
    El3,
}

impl TryFrom<u8> for ExLevel {
    type Error = u8;

    fn try_from(num: u8) -> Result<Self, Self::Error> {
        match num {
            0 => Ok(Self::El0),
            1 => Ok(Self::El1),
            2 => Ok(Self::El2),
            3 => Ok(Self::El3),
            err => Err(err),
        }
    }
}

impl From<ExLevel> for u8 {
    fn from(el: ExLevel) -> Self {
        match el {
            ExLevel::El0 => 0,
            ExLevel::El1 => 1,
            ExLevel::El2 => 2,
            ExLevel::El3 => 3,
        }
    }
}

impl fmt::Display for ExLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EL{}", u8::from(*self))
    }
}

bitflags::bitflags! {
    /// Memory spaces an access may target
    ///
    /// Memory accessors are registered for a set of spaces and answer reads
    /// for any intersecting space.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct MemSpace: u8 {
        const EL1S = 0x01;
        const EL1N = 0x02;
        const EL2 = 0x04;
        const EL3 = 0x08;
        const EL2S = 0x10;
        const EL1R = 0x20;
        const EL2R = 0x40;
        const ROOT = 0x80;
        /// Any secure space
        const S = Self::EL1S.bits() | Self::EL2S.bits() | Self::EL3.bits();
        /// Any non-secure space
        const N = Self::EL1N.bits() | Self::EL2.bits();
        /// Any realm space
        const R = Self::EL1R.bits() | Self::EL2R.bits();
        const ANY = 0xFF;
    }
}

impl MemSpace {
    /// Memory spaces accessible in the given security state
    pub fn for_security(level: SecLevel) -> Self {
        match level {
            SecLevel::Secure => Self::S,
            SecLevel::NonSecure => Self::N,
            SecLevel::Root => Self::ROOT,
            SecLevel::Realm => Self::R,
        }
    }
}

impl Default for MemSpace {
    fn default() -> Self {
        Self::ANY
    }
}

/// PE context
///
/// Every field carries its own validity. An absent field is not the same as
/// a field with value zero.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PeContext {
    /// Security state
    pub security: SecLevel,
    /// Exception level, if known
    pub exception_level: Option<ExLevel>,
    /// Context ID, if traced
    pub context_id: Option<u32>,
    /// Virtual machine ID, if traced
    pub vmid: Option<u32>,
    /// Whether the PE executes in 64-bit state
    pub bits64: bool,
}

impl fmt::Display for PeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(el) = self.exception_level {
            write!(f, "{el}; ")?;
        }
        write!(f, "{}; ", self.security)?;
        f.write_str(if self.bits64 { "64-bit" } else { "32-bit" })?;
        if let Some(vmid) = self.vmid {
            write!(f, "; VMID={vmid:#x}")?;
        }
        if let Some(ctxt) = self.context_id {
            write!(f, "; CTXTID={ctxt:#x}")?;
        }
        Ok(())
    }
}

/// Architecture version of a traced core
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum ArchVersion {
    #[default]
    Unknown = 0x0000,
    Custom = 0x0001,
    V7 = 0x0700,
    V8 = 0x0800,
    V8r3 = 0x0803,
    AArch64 = 0x0864,
}

impl ArchVersion {
    /// Check whether this is some version of ARMv8
    pub fn is_v8(self) -> bool {
        (Self::V8..=Self::AArch64).contains(&self)
    }
}

/// Profile of a traced core
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CoreProfile {
    #[default]
    Unknown,
    /// Microcontroller profile
    CortexM,
    /// Real-time profile
    CortexR,
    /// Application profile
    CortexA,
    Custom,
}

/// Architecture version and profile of a traced core
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArchProfile {
    pub arch: ArchVersion,
    pub profile: CoreProfile,
}

impl ArchProfile {
    /// Create a new architecture profile
    pub const fn new(arch: ArchVersion, profile: CoreProfile) -> Self {
        Self { arch, profile }
    }

    /// Look up the architecture profile of a core by its name
    ///
    /// Known names are those of a number of Cortex cores, e.g. `Cortex-A53`,
    /// and generic architecture names such as `ARMv7-M`.
    pub fn from_core_name(name: &str) -> Option<Self> {
        CORE_PROFILES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, p)| *p)
    }
}

use ArchVersion::{V7, V8};
use CoreProfile::{CortexA, CortexM, CortexR};

static CORE_PROFILES: &[(&str, ArchProfile)] = &[
    ("Cortex-A53", ArchProfile::new(V8, CortexA)),
    ("Cortex-A57", ArchProfile::new(V8, CortexA)),
    ("Cortex-A72", ArchProfile::new(V8, CortexA)),
    ("Cortex-A35", ArchProfile::new(V8, CortexA)),
    ("Cortex-A32", ArchProfile::new(V8, CortexA)),
    ("Cortex-A15", ArchProfile::new(V7, CortexA)),
    ("Cortex-A7", ArchProfile::new(V7, CortexA)),
    ("Cortex-A9", ArchProfile::new(V7, CortexA)),
    ("Cortex-R4", ArchProfile::new(V7, CortexR)),
    ("Cortex-R5", ArchProfile::new(V7, CortexR)),
    ("Cortex-R7", ArchProfile::new(V7, CortexR)),
    ("Cortex-M3", ArchProfile::new(V7, CortexM)),
    ("Cortex-M4", ArchProfile::new(V7, CortexM)),
    ("ARMv7-A", ArchProfile::new(V7, CortexA)),
    ("ARMv7-R", ArchProfile::new(V7, CortexR)),
    ("ARMv7-M", ArchProfile::new(V7, CortexM)),
    ("ARMv8-A", ArchProfile::new(V8, CortexA)),
    ("ARMv8-R", ArchProfile::new(V8, CortexR)),
    ("ARMv8-M", ArchProfile::new(V8, CortexM)),
    // v9 decodes like v8
    ("ARMv9-A", ArchProfile::new(V8, CortexA)),
];

/// Outcome of a single traced instruction
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Atom {
    /// Executed, or branch taken
    E,
    /// Not executed, or branch not taken
    N,
}

impl Atom {
    /// Create an atom from its enable bit
    pub fn from_bit(executed: bool) -> Self {
        if executed { Self::E } else { Self::N }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::E => write!(f, "E"),
            Self::N => write!(f, "N"),
        }
    }
}
