// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0

//! # Decoder for ARM CoreSight ETMv3 program flow trace
//!
//! This crate turns raw trace captured from ARM CoreSight trace sinks into a
//! stream of generic [trace elements][element::TraceElement] describing the
//! program flow of the traced core: executed instruction ranges, exceptions,
//! context changes, timestamps and the like.
//!
//! Decoding is organized as a datapath of components, each pushing its output
//! into the next one through an [attach point][attach::AttachPoint]:
//!
//! 1. A [`Deformatter`][deformatter::Deformatter] extracts CoreSight frames
//!    and demultiplexes their content by trace source ID. Unformatted trace of
//!    a single source skips this stage.
//! 2. An ETMv3 [`Processor`][etmv3::Processor] splits the byte stream of one
//!    source into [packets][etmv3::Packet].
//! 3. An ETMv3 [`Decoder`][etmv3::Decoder] interprets the packets and follows
//!    the traced program through a [`CodeFollower`][follower::CodeFollower].
//!    The latter reads the program's code via a user supplied
//!    [`MemoryAccess`][memory::MemoryAccess] and interprets it via a user
//!    supplied [`InstructionDecode`][instruction::InstructionDecode].
//!
//! Data flows through the [`datapath`] as operations such as [`Data`] or
//! [`Eot`]. Each component answers with a [`Resp`][datapath::Resp] telling
//! the caller whether to continue, wait or stop.
//!
//! See [`etmv3`] for an example of a complete decoding pipeline.
//!
//! # no_std
//!
//! This crate does not depend on the standard library. It does, however,
//! require an allocator.
//!
//! # Features
//!
//! * `serde`: (de)serialization of configurations, e.g. [`config::Capture`]
//! * `either`: [`MemoryAccess`][memory::MemoryAccess] for [`either::Either`]
//! * `elf`: [`MemoryAccess`][memory::MemoryAccess] for ELF files
//!
//! [`Data`]: datapath::Op::Data
//! [`Eot`]: datapath::Op::Eot
#![no_std]

extern crate alloc;

pub mod attach;
pub mod component;
pub mod config;
pub mod datapath;
pub mod deformatter;
pub mod element;
pub mod error;
pub mod etmv3;
pub mod follower;
pub mod instruction;
pub mod memory;
pub mod stack;
pub mod types;
