// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Instruction decode interface
//!
//! Reconstructing the program flow requires knowledge about individual
//! instructions: whether they are branches or other waypoints, how long they
//! are and where they jump to. This crate does not ship instruction set
//! tables. Instead, the [code follower][crate::follower::CodeFollower]
//! consults an [`InstructionDecode`] for each opcode it reads. Implementations
//! may be created from an [`FnMut`] via [`from_fn`].

#[cfg(test)]
mod tests;

use core::fmt;

use crate::types::{ArchProfile, Isa};

/// Waypoint classification of an instruction
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum InstrType {
    /// Any instruction not affecting the program flow
    #[default]
    Other,
    /// Direct branch
    Branch,
    /// Indirect branch
    IndirectBranch,
    /// Instruction synchronization barrier
    Isb,
    /// Data synchronization or memory barrier
    DsbDmb,
    /// Wait for interrupt or event
    WfiWfe,
    /// Transaction start
    Tstart,
}

impl InstrType {
    /// Determine whether this type of instruction is a waypoint
    ///
    /// Waypoints end instruction ranges and consume atoms.
    pub fn is_waypoint(self) -> bool {
        self != Self::Other
    }
}

/// Further classification of branch instructions
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum InstrSubtype {
    /// No particular subtype
    #[default]
    None,
    /// Branch with link
    BrLink,
    /// v8 return
    V8Ret,
    /// v8 exception return
    V8Eret,
    /// v7 instruction implying a return, e.g. `POP {pc}`
    V7ImpliedRet,
}

/// Decode request for a single opcode
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Request {
    /// Architecture and profile of the traced PE
    pub arch: ArchProfile,
    /// Instruction set the opcode is executed in
    pub isa: Isa,
    /// Address of the instruction
    pub address: u64,
    /// Opcode read from memory, little endian
    pub opcode: u32,
    /// Number of valid bytes in [`opcode`][Self::opcode]
    pub opcode_size: u8,
    /// Treat DSB and DMB instructions as waypoints
    pub dsb_dmb_waypoints: bool,
    /// Treat WFI and WFE instructions as branches
    pub wfi_wfe_branch: bool,
    /// Track Thumb IT blocks
    pub track_it_block: bool,
}

/// Decoded information for a single instruction
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Info {
    /// Waypoint classification
    pub kind: InstrType,
    /// Branch subtype
    pub subtype: InstrSubtype,
    /// Target of a direct branch
    pub branch_address: u64,
    /// Instruction set following an executed branch
    pub next_isa: Isa,
    /// Size of the instruction in bytes
    pub size: u8,
    /// Whether the instruction is conditional
    pub conditional: bool,
    /// Whether the instruction is a branch with link
    pub link: bool,
    /// Number of conditional instructions following an IT instruction
    pub it_conditions: u8,
}

impl Info {
    /// Create info for a non-waypoint instruction of the given size
    pub fn other(size: u8) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    /// Create info for a direct branch
    pub fn branch(size: u8, target: u64, next_isa: Isa) -> Self {
        Self {
            kind: InstrType::Branch,
            branch_address: target,
            next_isa,
            size,
            ..Default::default()
        }
    }

    /// Create info for an indirect branch
    pub fn indirect_branch(size: u8) -> Self {
        Self {
            kind: InstrType::IndirectBranch,
            size,
            ..Default::default()
        }
    }

    /// Mark this instruction as conditional
    pub fn with_conditional(self, conditional: bool) -> Self {
        Self {
            conditional,
            ..self
        }
    }

    /// Mark this instruction as branch with link
    pub fn with_link(self, link: bool) -> Self {
        let subtype = if link {
            InstrSubtype::BrLink
        } else {
            self.subtype
        };
        Self {
            link,
            subtype,
            ..self
        }
    }
}

/// Decoder for individual instructions
pub trait InstructionDecode {
    /// Error type returned by [`decode`][Self::decode]
    type Error: core::error::Error;

    /// Decode the opcode described by the given request
    fn decode(&mut self, request: &Request) -> Result<Info, Self::Error>;
}

impl<D: InstructionDecode + ?Sized> InstructionDecode for &mut D {
    type Error = D::Error;

    fn decode(&mut self, request: &Request) -> Result<Info, Self::Error> {
        D::decode(self, request)
    }
}

impl<D: InstructionDecode + ?Sized> InstructionDecode for alloc::boxed::Box<D> {
    type Error = D::Error;

    fn decode(&mut self, request: &Request) -> Result<Info, Self::Error> {
        D::decode(self.as_mut(), request)
    }
}

/// [`InstructionDecode`] adapter for an [`FnMut`]
#[derive(Copy, Clone, Debug)]
pub struct Func<F, E>
where
    F: FnMut(&Request) -> Result<Info, E>,
{
    func: F,
    phantom: core::marker::PhantomData<E>,
}

impl<F, E> InstructionDecode for Func<F, E>
where
    F: FnMut(&Request) -> Result<Info, E>,
    E: core::error::Error,
{
    type Error = E;

    fn decode(&mut self, request: &Request) -> Result<Info, Self::Error> {
        (self.func)(request)
    }
}

/// Create a [`Func`] [`InstructionDecode`] from an [`FnMut`]
pub fn from_fn<F, E>(func: F) -> Func<F, E>
where
    F: FnMut(&Request) -> Result<Info, E>,
{
    Func {
        func,
        phantom: Default::default(),
    }
}

/// Error for undecodable opcodes
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UnknownOpcode(pub u32);

impl core::error::Error for UnknownOpcode {}

impl fmt::Display for UnknownOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown opcode {:#010x}", self.0)
    }
}
