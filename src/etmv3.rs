// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! ETMv3 trace decoding
//!
//! Decoding the trace of a single ETMv3 source happens in two stages:
//!
//! 1. A [`Processor`] splits the raw byte stream into [`Packet`]s.
//! 2. A [`Decoder`] consumes these packets and produces generic
//!    [`TraceElement`][crate::element::TraceElement]s, following the traced
//!    program through a [`CodeFollower`][crate::follower::CodeFollower].
//!
//! Both stages are usually combined into a [`Pipeline`] through a
//! [`Builder`].
//!
//! # Example
//!
//! The following decodes a short trace of a single `NOP` executed at
//! `0x1000`.
//!
//! ```
//! use coresight_etm::datapath::{Op, TraceDataIn};
//! use coresight_etm::element::{Kind, TraceElement};
//! use coresight_etm::etmv3;
//! use coresight_etm::instruction::{self, Info, Request, UnknownOpcode};
//! use coresight_etm::memory::{self, MemoryAccess};
//!
//! let code = 0xe320f000u32.to_le_bytes();
//! let mut pipeline = etmv3::builder()
//!     .with_memory(memory::from_segment(code).with_offset(0x1000))
//!     .with_instruction_decode(instruction::from_fn(|_: &Request| {
//!         Ok::<_, UnknownOpcode>(Info::other(4))
//!     }))
//!     .with_sink(Vec::<TraceElement>::new())
//!     .build()
//!     .unwrap();
//!
//! let trace = [
//!     0x00, 0x00, 0x00, 0x00, 0x00, 0x80, // A-Sync
//!     0x08, 0x20, 0x00, 0x10, 0x00, 0x00, // I-Sync
//!     0x84, // P-header, single E atom
//! ];
//! let (processed, resp) = pipeline.trace_data_in(Op::Data, 0, &trace);
//! assert_eq!(processed, trace.len());
//! assert!(resp.is_cont());
//! pipeline.trace_data_in(Op::Eot, 0, &[]);
//!
//! let elems = pipeline
//!     .packet_sink()
//!     .first_mut()
//!     .unwrap()
//!     .element_sink()
//!     .first()
//!     .unwrap();
//! let Kind::InstrRange(range) = elems[3].kind else {
//!     panic!("Expected instruction range");
//! };
//! assert_eq!((range.start, range.end), (0x1000, 0x1004));
//! ```

pub mod config;
pub mod decoder;
pub mod packet;
pub mod processor;


pub use config::{Config, TraceMode};
pub use decoder::Decoder;
pub use packet::Packet;
pub use processor::Processor;

use crate::error::ErrorCode;
use crate::memory;

/// Packet processor feeding a decoder
pub type Pipeline<M, D, S> = Processor<Decoder<M, D, S>>;

/// Create a new [`Builder`] for a [`Pipeline`]
pub fn builder() -> Builder {
    Default::default()
}

/// Builder for a [`Pipeline`]
///
/// The memory access, instruction decode and element sink are mandatory.
/// Building only succeeds for types implementing the respective traits.
#[derive(Copy, Clone, Debug, Default)]
pub struct Builder<M = memory::Empty, D = (), S = ()> {
    config: Config,
    instance: usize,
    memory: M,
    decode: D,
    sink: S,
}

impl<M, D, S> Builder<M, D, S> {
    /// Build for a trace source with the given [`Config`]
    pub fn with_config(self, config: Config) -> Self {
        Self { config, ..self }
    }

    /// Set the instance number used in component names
    pub fn with_instance(self, instance: usize) -> Self {
        Self { instance, ..self }
    }

    /// Build with the given [`MemoryAccess`][crate::memory::MemoryAccess]
    pub fn with_memory<N>(self, memory: N) -> Builder<N, D, S> {
        Builder {
            config: self.config,
            instance: self.instance,
            memory,
            decode: self.decode,
            sink: self.sink,
        }
    }

    /// Build with the given
    /// [`InstructionDecode`][crate::instruction::InstructionDecode]
    pub fn with_instruction_decode<E>(self, decode: E) -> Builder<M, E, S> {
        Builder {
            config: self.config,
            instance: self.instance,
            memory: self.memory,
            decode,
            sink: self.sink,
        }
    }

    /// Build with the given [`ElementSink`][crate::datapath::ElementSink]
    pub fn with_sink<T>(self, sink: T) -> Builder<M, D, T> {
        Builder {
            config: self.config,
            instance: self.instance,
            memory: self.memory,
            decode: self.decode,
            sink,
        }
    }

    /// Build the [`Pipeline`]
    ///
    /// Fails with [`ErrorCode::HwCfgUnsupp`] if the configuration enables
    /// data trace.
    pub fn build(self) -> Result<Pipeline<M, D, S>, ErrorCode>
    where
        M: memory::MemoryAccess,
        D: crate::instruction::InstructionDecode,
        S: crate::datapath::ElementSink,
    {
        let mut decoder = Decoder::new(self.instance);
        decoder.set_config(self.config)?;
        let follower = decoder.code_follower();
        follower.memory_access().attach(self.memory)?;
        follower.instruction_decode().attach(self.decode)?;
        decoder.element_sink().attach(self.sink)?;

        let mut processor = Processor::new(self.instance);
        processor.set_config(self.config);
        processor.packet_sink().attach(decoder)?;
        Ok(processor)
    }
}
