// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Capture configuration
//!
//! A [`Capture`] describes how a trace was captured: whether the raw data is
//! wrapped in CoreSight frames and which trace sources contributed to it. It is
//! usually deserialized from some configuration file, e.g. a TOML file such as
//!
//! ```toml
//! formatted = 1
//! frame_flags = "FRAME_MEM_ALIGN"
//!
//! [[sources]]
//! reg_idr = 0x4114f250
//! reg_ctrl = 0xc000
//! reg_trc_id = 0x10
//! arch = "V7"
//! profile = "CortexA"
//! ```

#[cfg(feature = "serde")]
pub mod serde_utils;


use alloc::vec::Vec;

use crate::deformatter;
use crate::etmv3;

/// Description of a captured trace
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct Capture {
    /// Whether the trace is wrapped in CoreSight frames
    #[cfg_attr(feature = "serde", serde(with = "serde_utils::Flag"))]
    pub formatted: bool,
    /// Flags for the [`Deformatter`][deformatter::Deformatter]
    pub frame_flags: deformatter::Flags,
    /// ETMv3 trace sources
    pub sources: Vec<etmv3::Config>,
}

impl Capture {
    /// Retrieve the configuration of the source with the given trace ID
    pub fn source(&self, trace_id: u8) -> Option<&etmv3::Config> {
        self.sources.iter().find(|s| s.trace_id() == trace_id)
    }

    /// Retrieve the trace ID of unformatted trace
    ///
    /// Unformatted trace can only originate from a single source. This fn
    /// returns `None` if the capture is formatted or does not describe
    /// exactly one source.
    pub fn single_source(&self) -> Option<&etmv3::Config> {
        match self.sources.as_slice() {
            [source] if !self.formatted => Some(source),
            _ => None,
        }
    }
}

/// Frames are assumed to be memory aligned by default
impl Default for Capture {
    fn default() -> Self {
        Self {
            formatted: true,
            frame_flags: deformatter::Flags::FRAME_MEM_ALIGN,
            sources: Default::default(),
        }
    }
}
