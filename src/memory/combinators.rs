// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Combination of multiple [`MemoryAccess`]

use core::borrow::BorrowMut;

use crate::types::MemSpace;

use super::MemoryAccess;
use super::error::{MaybeMiss, Miss};

/// Set of [`MemoryAccess`] acting as a single [`MemoryAccess`]
///
/// Reads are served by the first accessor not reporting a miss. The accessor
/// that served the last read is consulted first.
#[derive(Copy, Clone, Default, Debug)]
pub struct Multi<C: BorrowMut<[M]>, M> {
    accessors: C,
    last: usize,
    phantom: core::marker::PhantomData<M>,
}

impl<C: BorrowMut<[M]>, M> Multi<C, M> {
    /// Create a new [`MemoryAccess`] combining all `accessors`
    pub fn new(accessors: C) -> Self {
        Self {
            accessors,
            last: 0,
            phantom: Default::default(),
        }
    }
}

impl<C: BorrowMut<[M]>, M> From<C> for Multi<C, M> {
    fn from(accessors: C) -> Self {
        Self::new(accessors)
    }
}

impl<C: BorrowMut<[M]> + FromIterator<M>, M> FromIterator<M> for Multi<C, M> {
    fn from_iter<T: IntoIterator<Item = M>>(iter: T) -> Self {
        C::from_iter(iter).into()
    }
}

impl<C: BorrowMut<[M]> + Extend<M>, M> Extend<M> for Multi<C, M> {
    fn extend<T: IntoIterator<Item = M>>(&mut self, iter: T) {
        self.accessors.extend(iter)
    }
}

impl<C, M> MemoryAccess for Multi<C, M>
where
    C: BorrowMut<[M]>,
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
        let accessors = self.accessors.borrow_mut();
        let res = accessors
            .get_mut(self.last)
            .map(|m| m.read(address, trace_id, space, buf))
            .filter(|r| !r.is_miss());
        if let Some(res) = res {
            return res;
        }

        let res = accessors
            .iter_mut()
            .enumerate()
            .filter(|(n, _)| *n != self.last)
            .map(|(n, m)| (n, m.read(address, trace_id, space, buf)))
            .find(|(_, r)| !r.is_miss());
        if let Some((current, res)) = res {
            self.last = current;
            res
        } else {
            Miss::miss(address)
        }
    }

    fn invalidate_cache(&mut self, trace_id: u8) {
        self.accessors
            .borrow_mut()
            .iter_mut()
            .for_each(|m| m.invalidate_cache(trace_id))
    }
}
