// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Basic [`MemoryAccess`]s and adapters

use crate::types::MemSpace;

use super::MemoryAccess;
use super::error;

/// [`MemoryAccess`] adapter for an [`FnMut`]
///
/// This forwards calls to [`MemoryAccess::read`] to the wrapped [`FnMut`].
#[derive(Copy, Clone, Default, Debug)]
pub struct Func<F, E>
where
    F: FnMut(u64, u8, MemSpace, &mut [u8]) -> Result<usize, E>,
{
    func: F,
    phantom: core::marker::PhantomData<E>,
}

impl<F, E> Func<F, E>
where
    F: FnMut(u64, u8, MemSpace, &mut [u8]) -> Result<usize, E>,
{
    /// Create a new [`MemoryAccess`] from an [`FnMut`]
    fn new(func: F) -> Self {
        Self {
            func,
            phantom: Default::default(),
        }
    }
}

impl<F, E> MemoryAccess for Func<F, E>
where
    F: FnMut(u64, u8, MemSpace, &mut [u8]) -> Result<usize, E>,
{
    type Error = E;

    fn read(
        &mut self,
        address: u64,
        trace_id: u8,
        space: MemSpace,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        (self.func)(address, trace_id, space, buf)
    }
}

/// Create a [`Func`] [`MemoryAccess`] from an [`FnMut`]
///
/// The fn receives the address, CoreSight trace ID, memory space and the
/// buffer to fill and returns the number of bytes read.
pub fn from_fn<F, E>(func: F) -> Func<F, E>
where
    F: FnMut(u64, u8, MemSpace, &mut [u8]) -> Result<usize, E>,
{
    Func::new(func)
}

/// [`MemoryAccess`] consisting of a single segment of memory
///
/// This accessor serves a single buffer as memory starting from address `0`,
/// for any trace source and memory space. Reads extending past the end of the
/// buffer are cut short.
///
/// # Example
///
/// ```
/// use coresight_etm::memory::{self, MemoryAccess};
/// use coresight_etm::types::MemSpace;
///
/// let image = b"\x00\x00\xa0\xe1\xfe\xff\xff\xea";
/// let mut image = memory::from_segment(image).with_offset(0x1000);
/// let mut buf = [0u8; 4];
/// assert_eq!(image.read(0x1006, 0x10, MemSpace::ANY, &mut buf), Ok(2));
/// assert_eq!(buf[..2], [0xff, 0xea]);
/// ```
#[derive(Copy, Clone, Debug)]
pub struct Segment<T: AsRef<[u8]>> {
    data: T,
}

impl<T: AsRef<[u8]>> Segment<T> {
    /// Create a new [`MemoryAccess`] for the given data
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

impl<T: AsRef<[u8]>> MemoryAccess for Segment<T> {
    type Error = error::SegmentError;

    fn read(
        &mut self,
        address: u64,
        _: u8,
        _: MemSpace,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        let offset = address.try_into().map_err(Self::Error::ExceededHostUSize)?;
        let data = self
            .data
            .as_ref()
            .split_at_checked(offset)
            .map(|(_, d)| d)
            .filter(|d| !d.is_empty())
            .ok_or(Self::Error::OutOfBounds(address))?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }
}

/// Create a [`Segment`] [`MemoryAccess`]
pub fn from_segment<T: AsRef<[u8]>>(data: T) -> Segment<T> {
    Segment::new(data)
}

/// A [`MemoryAccess`] that does not contain any memory
#[derive(Copy, Clone, Default, Debug)]
pub struct Empty;

impl MemoryAccess for Empty {
    type Error = error::NoMemory;

    fn read(
        &mut self,
        address: u64,
        _: u8,
        _: MemSpace,
        _: &mut [u8],
    ) -> Result<usize, Self::Error> {
        Err(error::NoMemory { address })
    }
}
