// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Access to the memory image of traced programs
//!
//! Following the instructions executed requires knowledge about the program
//! being traced. This module defines the [`MemoryAccess`] trait used by the
//! [code follower][crate::follower::CodeFollower] for reading opcodes from
//! the memory image as well as a number of types implementing it. These
//! include:
//!
//! * some [basic] accessors and adapters that may be created through free fns
//!   such as [`from_fn`] and [`from_segment`],
//! * [combinators] that allow combining multiple images such as a bootloader
//!   and an application,
//! * modifiers such as [`Offset`] and [`Spaced`] that are usually created
//!   through provided fns of the [`MemoryAccess`] trait and
//! * feature-dependent accessors, e.g. for using [ELF][elf] files.
//!
//! # Combining accessors
//!
//! Accessors used in [combinators] all need to agree on the
//! [`MemoryAccess::Error`] type. Combinators such as [`Multi`] in particular
//! also require the accessors themselves to be of the same type. The error
//! type may be erased through the provided method [`MemoryAccess::boxed`].
//!
//! # Example
//!
//! The following constructs an accessor from a bootrom and a firmware image,
//! with the firmware only being visible for non-secure accesses.
//!
//! ```
//! use coresight_etm::memory::{self, MemoryAccess};
//! use coresight_etm::types::MemSpace;
//!
//! # let bootrom = b"\x00\x00\xa0\xe1\xfe\xff\xff\xea";
//! # let firmware = b"\x1e\xff\x2f\xe1";
//! let mut mem = (
//!     memory::from_segment(bootrom).with_offset(0x0),
//!     memory::from_segment(firmware).with_offset(0x8000).with_space(MemSpace::N),
//! );
//! let mut buf = [0u8; 4];
//! assert_eq!(mem.read(0x8000, 0x10, MemSpace::EL1N, &mut buf), Ok(4));
//! assert_eq!(buf, *firmware);
//! ```

pub mod basic;
pub mod boxed;
pub mod combinators;
#[cfg(feature = "elf")]
pub mod elf;
pub mod error;


use alloc::boxed::Box;

pub use basic::{Empty, from_fn, from_segment};
pub use combinators::Multi;

use crate::types::MemSpace;

use error::{MaybeMiss, Miss};

/// Read access to the memory image of a traced program
///
/// See the [module level][self] documentation for more details.
pub trait MemoryAccess {
    /// Error type returned by [`read`][Self::read]
    type Error;

    /// Read memory starting at the given address into `buf`
    ///
    /// The read targets the memory of the trace source with the given
    /// CoreSight `trace_id` in the given memory `space`. Returns the number of
    /// bytes read, which may be less than the length of `buf` if the memory
    /// covered ends before.
    fn read(
        &mut self,
        address: u64,
        trace_id: u8,
        space: MemSpace,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error>;

    /// Invalidate any data cached for the given trace source
    fn invalidate_cache(&mut self, _trace_id: u8) {}

    /// "Move" this accessor by the given offset
    ///
    /// See [`Offset`] for more details.
    fn with_offset(self, offset: u64) -> Offset<Self>
    where
        Self: Sized,
        Self::Error: Miss,
    {
        Offset {
            inner: self,
            offset,
        }
    }

    /// Restrict this accessor to the given memory spaces
    ///
    /// See [`Spaced`] for more details.
    fn with_space(self, space: MemSpace) -> Spaced<Self>
    where
        Self: Sized,
        Self::Error: Miss,
    {
        Spaced { inner: self, space }
    }

    /// Box this accessor for dynamic dispatching
    ///
    /// This allows combining accessors of different types with (originally)
    /// different [`Error`][Self::Error] types in [combinators].
    fn boxed<'a>(self) -> boxed::Boxed<'a>
    where
        Self: Sized + 'a,
        Self::Error: error::MaybeMissError + 'static,
    {
        Box::new(boxed::BoxedError::new(self))
    }
}

/// [`MemoryAccess`] implementation for a tuple of two accessors
///
/// This impl allows combining accessors as long as they agree on their error
/// type. If the first one returns a "miss", the second one is consulted.
impl<A, B, E> MemoryAccess for (A, B)
where
    A: MemoryAccess<Error = E>,
    B: MemoryAccess<Error = E>,
    E: MaybeMiss,
{
    type Error = E;

    fn read(
        &mut self,
        address: u64,
        trace_id: u8,
        space: MemSpace,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        let res = self.0.read(address, trace_id, space, buf);
        if res.is_miss() {
            self.1.read(address, trace_id, space, buf)
        } else {
            res
        }
    }

    fn invalidate_cache(&mut self, trace_id: u8) {
        self.0.invalidate_cache(trace_id);
        self.1.invalidate_cache(trace_id);
    }
}

impl<M> MemoryAccess for Option<M>
where
    M: MemoryAccess,
    M::Error: Miss,
{
    type Error = M::Error;

    fn read(
        &mut self,
        address: u64,
        trace_id: u8,
        space: MemSpace,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        self.as_mut()
            .map(|m| m.read(address, trace_id, space, buf))
            .unwrap_or_else(|| Miss::miss(address))
    }

    fn invalidate_cache(&mut self, trace_id: u8) {
        if let Some(m) = self.as_mut() {
            m.invalidate_cache(trace_id)
        }
    }
}

impl<M: MemoryAccess + ?Sized> MemoryAccess for Box<M> {
    type Error = M::Error;

    fn read(
        &mut self,
        address: u64,
        trace_id: u8,
        space: MemSpace,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        M::read(self.as_mut(), address, trace_id, space, buf)
    }

    fn invalidate_cache(&mut self, trace_id: u8) {
        M::invalidate_cache(self.as_mut(), trace_id)
    }
}

#[cfg(feature = "either")]
impl<L, R, E> MemoryAccess for either::Either<L, R>
where
    L: MemoryAccess<Error = E>,
    R: MemoryAccess<Error = E>,
{
    type Error = E;

    fn read(
        &mut self,
        address: u64,
        trace_id: u8,
        space: MemSpace,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        either::for_both!(self, m => m.read(address, trace_id, space, buf))
    }

    fn invalidate_cache(&mut self, trace_id: u8) {
        either::for_both!(self, m => m.invalidate_cache(trace_id))
    }
}

/// [`MemoryAccess`] moved by a fixed offset
///
/// Accesses will be mapped by subtracting the fixed offset from the address.
/// Accesses to addresses lower than the offset will result in a [miss][Miss].
#[derive(Copy, Clone, Debug)]
pub struct Offset<M> {
    inner: M,
    offset: u64,
}

impl<M> Offset<M> {
    /// Retrieve the inner [`MemoryAccess`]
    pub fn inner(&self) -> &M {
        &self.inner
    }

    /// Retrieve the offset
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl<M> MemoryAccess for Offset<M>
where
    M: MemoryAccess,
    M::Error: Miss,
{
    type Error = M::Error;

    fn read(
        &mut self,
        address: u64,
        trace_id: u8,
        space: MemSpace,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        let Some(offset) = address.checked_sub(self.offset) else {
            return Miss::miss(address);
        };
        // Misses report the address as requested, not the inner one
        self.inner
            .read(offset, trace_id, space, buf)
            .map_err(|e| if e.is_miss() { M::Error::miss(address) } else { e })
    }

    fn invalidate_cache(&mut self, trace_id: u8) {
        self.inner.invalidate_cache(trace_id)
    }
}

/// [`MemoryAccess`] restricted to a set of memory spaces
///
/// Accesses for memory spaces not intersecting with the accessor's spaces
/// will result in a [miss][Miss].
#[derive(Copy, Clone, Debug)]
pub struct Spaced<M> {
    inner: M,
    space: MemSpace,
}

impl<M> Spaced<M> {
    /// Retrieve the inner [`MemoryAccess`]
    pub fn inner(&self) -> &M {
        &self.inner
    }

    /// Retrieve the memory spaces served
    pub fn space(&self) -> MemSpace {
        self.space
    }
}

impl<M> MemoryAccess for Spaced<M>
where
    M: MemoryAccess,
    M::Error: Miss,
{
    type Error = M::Error;

    fn read(
        &mut self,
        address: u64,
        trace_id: u8,
        space: MemSpace,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        if self.space.intersects(space) {
            self.inner.read(address, trace_id, space, buf)
        } else {
            Miss::miss(address)
        }
    }

    fn invalidate_cache(&mut self, trace_id: u8) {
        self.inner.invalidate_cache(trace_id)
    }
}
