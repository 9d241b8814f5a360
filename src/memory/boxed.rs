// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Type-erased [`MemoryAccess`]

use alloc::boxed::Box;

use crate::types::MemSpace;

use super::MemoryAccess;
use super::error::MaybeMissError;

/// Boxed, dynamically dispatched [`MemoryAccess`] with type-erased errors
pub type Boxed<'a> = Box<dyn MemoryAccess<Error = Box<dyn MaybeMissError>> + 'a>;

/// [`MemoryAccess`] returning a boxed, dynamically dispatched `Error`
///
/// This adapter boxes and type-erases errors returned by the wrapped
/// [`MemoryAccess`]. This allows dynamically dispatching accessors with
/// differrent [`MemoryAccess::Error`] types.
#[derive(Copy, Clone, Debug)]
pub struct BoxedError<M> {
    inner: M,
}

impl<M> BoxedError<M> {
    /// Create a new [`MemoryAccess`] wrapping another one
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<M> From<M> for BoxedError<M> {
    fn from(inner: M) -> Self {
        Self { inner }
    }
}

impl<M> MemoryAccess for BoxedError<M>
where
    M: MemoryAccess,
    M::Error: MaybeMissError + 'static,
{
    type Error = Box<dyn MaybeMissError>;

    fn read(
        &mut self,
        address: u64,
        trace_id: u8,
        space: MemSpace,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        self.inner
            .read(address, trace_id, space, buf)
            .map_err(|e| -> Box<dyn MaybeMissError> { Box::new(e) })
    }

    fn invalidate_cache(&mut self, trace_id: u8) {
        self.inner.invalidate_cache(trace_id)
    }
}
