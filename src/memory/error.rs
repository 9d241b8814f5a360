// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Errors of memory accessors
//!
//! Trace memory images are sparse: an accessor typically maps a few code
//! regions of the target. A read outside of them is a *miss*. Misses are not
//! fatal while decoding. The code follower reports them as inaccessible memory
//! and combinators such as [`Multi`][super::Multi] fall through to the next
//! accessor. Every miss remembers the address that was requested.

use alloc::boxed::Box;
use core::fmt;

/// Error types which are able to express a miss
pub trait Miss: MaybeMiss {
    /// Create a miss for a read at the given `address`
    fn miss(address: u64) -> Self;
}

impl<T, E: Miss> Miss for Result<T, E> {
    fn miss(address: u64) -> Self {
        Err(E::miss(address))
    }
}

impl Miss for Box<dyn MaybeMiss> {
    fn miss(address: u64) -> Self {
        Box::new(NoMemory { address })
    }
}

impl Miss for Box<dyn MaybeMissError> {
    fn miss(address: u64) -> Self {
        Box::new(NoMemory { address })
    }
}

/// Values which may report a miss
pub trait MaybeMiss {
    /// Address of the read that missed, if this value is a miss
    fn missed_address(&self) -> Option<u64>;

    /// Check whether this value is a miss
    fn is_miss(&self) -> bool {
        self.missed_address().is_some()
    }
}

impl<T, E: MaybeMiss> MaybeMiss for Result<T, E> {
    fn missed_address(&self) -> Option<u64> {
        self.as_ref().err().and_then(E::missed_address)
    }
}

impl<E: MaybeMiss + ?Sized> MaybeMiss for Box<E> {
    fn missed_address(&self) -> Option<u64> {
        self.as_ref().missed_address()
    }
}

#[cfg(feature = "either")]
impl<L: MaybeMiss, R: MaybeMiss> MaybeMiss for either::Either<L, R> {
    fn missed_address(&self) -> Option<u64> {
        either::for_both!(self, e => e.missed_address())
    }
}

/// Error usable behind a [`Boxed`][super::boxed::Boxed] accessor
pub trait MaybeMissError: MaybeMiss + core::error::Error + Sync + Send {}

impl<T: MaybeMiss + core::error::Error + Sync + Send + ?Sized> MaybeMissError for T {}

/// Error of a [`Segment`][super::basic::Segment]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SegmentError {
    /// The offset lies at or beyond the end of the segment
    OutOfBounds(u64),
    /// The offset does not fit into a host `usize`
    ExceededHostUSize(core::num::TryFromIntError),
}

impl Miss for SegmentError {
    fn miss(address: u64) -> Self {
        Self::OutOfBounds(address)
    }
}

impl MaybeMiss for SegmentError {
    fn missed_address(&self) -> Option<u64> {
        match self {
            Self::OutOfBounds(a) => Some(*a),
            Self::ExceededHostUSize(_) => None,
        }
    }
}

impl core::error::Error for SegmentError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::ExceededHostUSize(e) => Some(e),
            Self::OutOfBounds(_) => None,
        }
    }
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds(a) => write!(f, "Offset {a:#x} is outside of the segment"),
            Self::ExceededHostUSize(_) => write!(f, "Offset too large for the host"),
        }
    }
}

/// No memory is mapped at the given address
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NoMemory {
    pub address: u64,
}

impl Miss for NoMemory {
    fn miss(address: u64) -> Self {
        Self { address }
    }
}

impl MaybeMiss for NoMemory {
    fn missed_address(&self) -> Option<u64> {
        Some(self.address)
    }
}

impl core::error::Error for NoMemory {}

impl fmt::Display for NoMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No memory mapped at {:#x}", self.address)
    }
}
