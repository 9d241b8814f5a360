// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! ELF images as memory

use alloc::vec::Vec;
use core::fmt;

use elf::ElfBytes;
use elf::endian::EndianParse;

use crate::types::MemSpace;

use super::{MemoryAccess, error};

/// [`MemoryAccess`] serving the executable segments of an ELF image
///
/// All executable `LOAD` segments are collected on construction and served
/// at their virtual addresses, for all trace sources and memory spaces.
/// Neither decompression nor dynamic linking are supported.
#[derive(Clone, Debug)]
pub struct Elf<'d> {
    segments: Vec<(u64, &'d [u8])>,
    machine: u16,
}

impl<'d> Elf<'d> {
    /// Create a new ELF [`MemoryAccess`]
    ///
    /// Only little endian ARM and AArch64 images are accepted.
    pub fn new<P: EndianParse>(elf: &ElfBytes<'d, P>) -> Result<Self, Error> {
        use elf::abi;

        let machine = elf.ehdr.e_machine;
        if machine != abi::EM_ARM && machine != abi::EM_AARCH64 {
            return Err(Error::UnsupportedArchitecture(machine));
        }
        if !elf.ehdr.endianness.is_little() {
            return Err(Error::UnsupportedEndianess);
        }

        let mut segments = elf
            .segments()
            .into_iter()
            .flat_map(|s| s.iter())
            .filter(|s| s.p_type == abi::PT_LOAD && s.p_flags & abi::PF_X != 0)
            .map(|s| elf.segment_data(&s).map(|d| (s.p_vaddr, d)))
            .filter(|s| !matches!(s, Ok((_, d)) if d.is_empty()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(Error::CouldNotRetrieveData)?;
        segments.sort_unstable_by_key(|(base, _)| *base);
        Ok(Self { segments, machine })
    }

    /// Check whether this is an AArch64 image
    pub fn is_aarch64(&self) -> bool {
        self.machine == elf::abi::EM_AARCH64
    }

    /// Retrieve the base addresses and sizes of all segments served
    pub fn segments(&self) -> impl Iterator<Item = (u64, usize)> + '_ {
        self.segments.iter().map(|(b, d)| (*b, d.len()))
    }
}

impl MemoryAccess for Elf<'_> {
    type Error = Error;

    fn read(
        &mut self,
        address: u64,
        _trace_id: u8,
        _space: MemSpace,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        // Segments are sorted by base, the candidate is the last one below
        let pos = self.segments.partition_point(|(b, _)| *b <= address);
        let (base, data) = pos
            .checked_sub(1)
            .and_then(|p| self.segments.get(p))
            .ok_or(Error::NotMapped(address))?;
        let offset = usize::try_from(address - base).map_err(Error::ExceededHostUSize)?;
        let data = data
            .get(offset..)
            .filter(|d| !d.is_empty())
            .ok_or(Error::NotMapped(address))?;

        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }
}

/// ELF specific error type
#[derive(Debug)]
pub enum Error {
    /// The address is not part of any executable segment
    NotMapped(u64),
    /// The data for a segment could not be retrieved
    CouldNotRetrieveData(elf::parse::ParseError),
    /// Could not use an offset because it is too big for the host
    ExceededHostUSize(core::num::TryFromIntError),
    /// The image targets neither ARM nor AArch64
    UnsupportedArchitecture(u16),
    /// The image is not little endian
    UnsupportedEndianess,
}

impl error::Miss for Error {
    fn miss(address: u64) -> Self {
        Self::NotMapped(address)
    }
}

impl error::MaybeMiss for Error {
    fn missed_address(&self) -> Option<u64> {
        match self {
            Self::NotMapped(a) => Some(*a),
            _ => None,
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::CouldNotRetrieveData(e) => Some(e),
            Self::ExceededHostUSize(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotMapped(a) => write!(f, "Address {a:#x} not mapped by any segment"),
            Self::CouldNotRetrieveData(_) => write!(f, "Could not retrieve data for segment"),
            Self::ExceededHostUSize(_) => write!(
                f,
                "An offset exceeds what can be represented with host native addresses"
            ),
            Self::UnsupportedArchitecture(m) => write!(f, "Unsupported machine {m:#x}"),
            Self::UnsupportedEndianess => write!(f, "The image is not little endian"),
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NotMapped(l), Self::NotMapped(r)) => l == r,
            (Self::CouldNotRetrieveData(_), Self::CouldNotRetrieveData(_)) => true,
            (Self::ExceededHostUSize(l), Self::ExceededHostUSize(r)) => l == r,
            (Self::UnsupportedArchitecture(l), Self::UnsupportedArchitecture(r)) => l == r,
            (Self::UnsupportedEndianess, Self::UnsupportedEndianess) => true,
            _ => false,
        }
    }
}
