// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Code following
//!
//! The [`CodeFollower`] reconstructs which instructions were executed between
//! two points in the trace. It reads opcodes through an attached
//! [`MemoryAccess`] and classifies them through an attached
//! [`InstructionDecode`].

#[cfg(test)]
mod tests;

use core::fmt;

use crate::attach::AttachPoint;
use crate::error::ErrorCode;
use crate::instruction::{Info, InstrType, InstructionDecode, Request};
use crate::memory::MemoryAccess;
use crate::types::{ArchProfile, Atom, Isa, MemSpace};

/// Instruction follower
///
/// A follower tracks a single instruction range at a time. After following,
/// the range covers the addresses from [`range_start`][Self::range_start]
/// (inclusive) to [`range_end`][Self::range_end] (exclusive), and the address
/// of the next instruction executed is available through
/// [`next_addr`][Self::next_addr] if it is known.
pub struct CodeFollower<M, D> {
    memory: AttachPoint<M>,
    decoder: AttachPoint<D>,
    request: Request,
    info: Info,
    space: MemSpace,
    trace_id: u8,
    start: u64,
    end: u64,
    next: Option<u64>,
    num_instr: u32,
    nacc: bool,
    range_limit: Option<u32>,
}

impl<M, D> Default for CodeFollower<M, D> {
    fn default() -> Self {
        Self {
            memory: Default::default(),
            decoder: Default::default(),
            request: Default::default(),
            info: Default::default(),
            space: MemSpace::ANY,
            trace_id: 0,
            start: 0,
            end: 0,
            next: None,
            num_instr: 0,
            nacc: false,
            range_limit: None,
        }
    }
}

impl<M, D> CodeFollower<M, D> {
    /// Create a new follower without any collaborators attached
    pub fn new() -> Self {
        Default::default()
    }

    /// Access the attachment point for the [`MemoryAccess`]
    pub fn memory_access(&mut self) -> &mut AttachPoint<M> {
        &mut self.memory
    }

    /// Access the attachment point for the [`InstructionDecode`]
    pub fn instruction_decode(&mut self) -> &mut AttachPoint<D> {
        &mut self.decoder
    }

    /// Determine whether both collaborators are attached and enabled
    pub fn is_ready(&self) -> bool {
        self.memory.has_attached_and_enabled() && self.decoder.has_attached_and_enabled()
    }

    /// Set the architecture and profile of the traced PE
    pub fn set_arch_profile(&mut self, arch: ArchProfile) {
        self.request.arch = arch;
    }

    /// Set the instruction set for the next instruction followed
    pub fn set_isa(&mut self, isa: Isa) {
        self.request.isa = isa;
    }

    /// Instruction set for the next instruction followed
    pub fn isa(&self) -> Isa {
        self.request.isa
    }

    /// Set the memory space opcodes are read from
    pub fn set_mem_space(&mut self, space: MemSpace) {
        self.space = space;
    }

    /// Set the trace source ID passed to the [`MemoryAccess`]
    pub fn set_trace_id(&mut self, trace_id: u8) {
        self.trace_id = trace_id;
    }

    /// Treat DSB and DMB instructions as waypoints
    pub fn set_dsb_dmb_waypoints(&mut self, waypoints: bool) {
        self.request.dsb_dmb_waypoints = waypoints;
    }

    /// Limit the number of instructions in a range followed to a waypoint
    pub fn set_range_limit(&mut self, limit: Option<u32>) {
        self.range_limit = limit;
    }

    /// Start address of the last range followed
    pub fn range_start(&self) -> u64 {
        self.start
    }

    /// End address (exclusive) of the last range followed
    pub fn range_end(&self) -> u64 {
        self.end
    }

    /// Number of instructions in the last range followed
    pub fn num_instr(&self) -> u32 {
        self.num_instr
    }

    /// Address of the next instruction, if known
    ///
    /// After a memory access failure, this is the address that could not be
    /// read.
    pub fn next_addr(&self) -> Option<u64> {
        self.next
    }

    /// Determine whether the address of the next instruction is known
    pub fn has_next_addr(&self) -> bool {
        self.next.is_some()
    }

    /// Information about the last instruction decoded
    pub fn instr_info(&self) -> &Info {
        &self.info
    }

    /// Determine whether the last follow ended with a memory access failure
    pub fn is_nacc(&self) -> bool {
        self.nacc
    }

    /// Clear the memory access failure state
    pub fn clear_error(&mut self) {
        self.nacc = false;
    }
}

impl<M: MemoryAccess, D: InstructionDecode> CodeFollower<M, D> {
    /// Follow a single instruction
    ///
    /// The next address will be the address following the instruction, even
    /// for branches.
    pub fn follow_single_instr(&mut self, address: u64) -> Result<(), Error<M::Error, D::Error>> {
        self.begin(address);
        self.decode_next()?;
        self.next = Some(self.end);
        Ok(())
    }

    /// Follow a single instruction with the given outcome
    ///
    /// An executed direct branch continues at its target, an executed
    /// indirect branch leaves the next address unknown.
    pub fn follow_single_atom(
        &mut self,
        address: u64,
        atom: Atom,
    ) -> Result<(), Error<M::Error, D::Error>> {
        self.begin(address);
        self.decode_next()?;
        self.apply_atom(atom);
        Ok(())
    }

    /// Follow instructions up to and including the next waypoint
    ///
    /// The given atom is applied to the waypoint. If a range limit is set and
    /// reached before a waypoint is found, following stops with
    /// [`Error::RangeLimit`].
    pub fn follow_to_waypoint(
        &mut self,
        address: u64,
        atom: Atom,
    ) -> Result<(), Error<M::Error, D::Error>> {
        self.begin(address);
        loop {
            self.decode_next()?;
            if self.info.kind.is_waypoint() {
                break;
            }
            self.next = Some(self.end);
            if let Some(limit) = self.range_limit.filter(|l| self.num_instr >= *l) {
                return Err(Error::RangeLimit(limit));
            }
        }
        self.apply_atom(atom);
        Ok(())
    }

    fn begin(&mut self, address: u64) {
        self.start = address;
        self.end = address;
        self.next = None;
        self.num_instr = 0;
        self.nacc = false;
    }

    /// Read and decode the instruction at the end of the current range
    fn decode_next(&mut self) -> Result<(), Error<M::Error, D::Error>> {
        let (Some(memory), Some(decoder)) = (self.memory.first_mut(), self.decoder.first_mut())
        else {
            return Err(Error::NotInit);
        };

        let address = self.end;
        let mut buf = [0u8; 4];
        let len = match memory.read(address, self.trace_id, self.space, &mut buf) {
            Ok(len) => len,
            Err(e) => {
                self.nacc = true;
                self.next = Some(address);
                return Err(Error::Nacc { address, source: e });
            }
        };

        let size = if len >= 4 {
            4
        } else if len >= 2 && is_narrow(self.request.isa, buf[1]) {
            2
        } else {
            self.nacc = true;
            self.next = Some(address);
            return Err(Error::ShortRead { address, len });
        };

        let opcode = if size == 4 {
            u32::from_le_bytes(buf)
        } else {
            u16::from_le_bytes([buf[0], buf[1]]).into()
        };
        self.request.address = address;
        self.request.opcode = opcode;
        self.request.opcode_size = size;

        let info = decoder.decode(&self.request).map_err(Error::Decode)?;
        self.info = info;
        self.num_instr += 1;
        self.end = address.wrapping_add(info.size.into());
        Ok(())
    }

    fn apply_atom(&mut self, atom: Atom) {
        self.next = match (self.info.kind, atom) {
            (InstrType::Branch, Atom::E) => {
                self.request.isa = self.info.next_isa;
                Some(self.info.branch_address)
            }
            (InstrType::IndirectBranch, Atom::E) => None,
            _ => Some(self.end),
        };
    }
}

impl<M, D> fmt::Debug for CodeFollower<M, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeFollower")
            .field("memory", &self.memory.has_attached())
            .field("decoder", &self.decoder.has_attached())
            .field("isa", &self.request.isa)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("next", &self.next)
            .field("num_instr", &self.num_instr)
            .field("nacc", &self.nacc)
            .finish_non_exhaustive()
    }
}

/// Check whether a half-word with the given upper byte starts a 16-bit Thumb
/// instruction
fn is_narrow(isa: Isa, upper: u8) -> bool {
    isa == Isa::Thumb2 && (upper & 0xF8) < 0xE8
}

/// Code following error
#[derive(Debug, PartialEq)]
pub enum Error<M, D> {
    /// Memory access or instruction decode not attached
    NotInit,
    /// The opcode at the given address could not be read
    Nacc { address: u64, source: M },
    /// Only `len` bytes were available at the given address, too few for an
    /// opcode
    ShortRead { address: u64, len: usize },
    /// The instruction could not be decoded
    Decode(D),
    /// No waypoint was found within the given number of instructions
    RangeLimit(u32),
}

impl<M, D> Error<M, D> {
    /// Retrieve the [`ErrorCode`] corresponding to this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotInit => ErrorCode::NotInit,
            Self::Nacc { .. } | Self::ShortRead { .. } => ErrorCode::MemNacc,
            Self::Decode(_) => ErrorCode::InvalidOpcode,
            Self::RangeLimit(_) => ErrorCode::IRangeLimitOverrun,
        }
    }
}

impl<M, D> core::error::Error for Error<M, D>
where
    M: core::error::Error + 'static,
    D: core::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Nacc { source, .. } => Some(source),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl<M, D> fmt::Display for Error<M, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInit => write!(f, "Memory access or instruction decode not attached"),
            Self::Nacc { address, .. } => write!(f, "Memory not accessible at {address:#x}"),
            Self::ShortRead { address, len } => {
                write!(f, "Only {len} bytes of opcode readable at {address:#x}")
            }
            Self::Decode(_) => write!(f, "Could not decode instruction"),
            Self::RangeLimit(l) => write!(f, "No waypoint found within {l} instructions"),
        }
    }
}
