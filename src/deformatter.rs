// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! CoreSight frame deformatter
//!
//! Trace sinks such as the ETB or ETR interleave the trace of multiple sources
//! in 16 byte frames. The [`Deformatter`] extracts these frames from a raw
//! byte stream and demultiplexes their content into one byte stream per trace
//! source ID, each of which is pushed to the consumer attached for that ID.
//!
//! # Frame format
//!
//! Each frame consists of seven pairs of bytes, one additional byte and a
//! final flags byte. The first byte of each pair and the additional byte are
//! either data or, if their LSB is set, an ID change. Since the LSB of data in
//! these positions is occupied, the actual LSB is stored in the corresponding
//! bit of the flags byte. For ID changes, that bit determines whether the
//! following byte still belongs to the previous ID.
//!
//! # Example
//!
//! ```
//! use coresight_etm::datapath::{Op, Resp, TraceDataIn};
//! use coresight_etm::deformatter::{Deformatter, Flags};
//!
//! struct Bytes(Vec<u8>);
//!
//! impl TraceDataIn for Bytes {
//!     fn trace_data_in(&mut self, op: Op, _: u64, data: &[u8]) -> (usize, Resp) {
//!         self.0.extend_from_slice(data);
//!         (data.len(), Resp::Cont)
//!     }
//! }
//!
//! let mut deformatter = Deformatter::new();
//! deformatter.configure(Flags::FRAME_MEM_ALIGN).unwrap();
//! deformatter.id_stream(0x13).unwrap().attach(Bytes(Vec::new())).unwrap();
//!
//! let mut frame = [0u8; 16];
//! frame[0] = 0x27;
//! frame[1] = 0x01;
//! assert_eq!(deformatter.trace_data_in(Op::Data, 0, &frame), (16, Resp::Cont));
//!
//! let bytes = &deformatter.id_stream(0x13).unwrap().first().unwrap().0;
//! assert_eq!(bytes.len(), 14);
//! assert_eq!(bytes[0], 0x01);
//! ```


use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;

use crate::attach::AttachPoint;
use crate::component::Component;
use crate::datapath::{Op, RawFrameElem, RawFrameSink, Resp, TraceDataIn};
use crate::error::{Error, ErrorCode};
use crate::types::{BAD_TRACE_ID, is_valid_trace_id};

/// Size of a single frame in bytes
pub const FRAME_SIZE: usize = 16;

/// Frame sync pattern, read as little endian
pub const FSYNC_PATTERN: u32 = 0x7FFF_FFFF;

/// Half frame sync pattern, read as little endian
pub const HSYNC_PATTERN: u16 = 0x7FFF;

/// Start of a frame sync, read as little endian
const FSYNC_START: u16 = 0xFFFF;

/// Number of trace IDs which may be encoded in a frame
const NUM_IDS: usize = 128;

bitflags::bitflags! {
    /// Configuration flags of a [`Deformatter`]
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Flags: u32 {
        /// The input may contain frame syncs between frames
        const HAS_FSYNCS = 0x01;
        /// The input may contain half frame syncs
        const HAS_HSYNCS = 0x02;
        /// Frames are aligned to their size, e.g. for trace from memory
        const FRAME_MEM_ALIGN = 0x04;
        /// Report packed frames to the raw monitor
        const PACKED_RAW_OUT = 0x08;
        /// Report unpacked per-ID data to the raw monitor
        const UNPACKED_RAW_OUT = 0x10;
        /// Four consecutive frame syncs reset all consumers (memory aligned only)
        const RESET_ON_4X_FSYNC = 0x20;
    }
}

impl Flags {
    /// Required alignment of input blocks for these flags
    pub fn alignment(self) -> usize {
        if self.contains(Self::FRAME_MEM_ALIGN) {
            FRAME_SIZE
        } else if self.contains(Self::HAS_HSYNCS) {
            2
        } else if self.contains(Self::HAS_FSYNCS) {
            4
        } else {
            FRAME_SIZE
        }
    }
}

/// Demux statistics
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Bytes forwarded to an attached consumer
    pub valid_id_bytes: u64,
    /// Bytes received before any ID was seen
    pub no_id_bytes: u64,
    /// Bytes belonging to a reserved ID
    pub reserved_id_bytes: u64,
    /// Bytes belonging to a valid ID without consumer
    pub unknown_id_bytes: u64,
    /// Bytes of frames and syncs processed
    pub frame_bytes: u64,
}

/// Unpacked data of a single ID within a frame
#[derive(Copy, Clone, Debug)]
struct Chunk {
    id: u8,
    index: u64,
    data: [u8; FRAME_SIZE],
    valid: usize,
    used: usize,
}

impl Chunk {
    fn new(id: u8, index: u64) -> Self {
        Self {
            id,
            index,
            data: [0; FRAME_SIZE],
            valid: 0,
            used: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        self.data[self.valid] = byte;
        self.valid += 1;
    }
}

/// Frame deformatter
///
/// Consumers for individual trace IDs of type `C` are attached through
/// [`id_stream`][Self::id_stream]. The deformatter needs to be
/// [configured][Self::configure] before any data may be pushed.
pub struct Deformatter<C> {
    component: Component,
    flags: Flags,
    alignment: usize,
    streams: [AttachPoint<C>; NUM_IDS],
    raw_monitor: AttachPoint<Box<dyn RawFrameSink>>,
    raw_chan_enable: [bool; NUM_IDS],
    force_sync: Option<u64>,
    stats: Stats,

    highest: Resp,
    index: u64,
    first_data: bool,
    synced: bool,
    block_processed: usize,
    curr_id: u8,
    frame: [u8; FRAME_SIZE],
    frame_len: usize,
    frame_index: u64,
    fsync_start_eob: bool,
    chunks: Vec<Chunk>,
    chunks_done: usize,
    packed_raw: bool,
    unpacked_raw: bool,
}

impl<C> Default for Deformatter<C> {
    fn default() -> Self {
        Self {
            component: Component::new("DFMT_CSFRAMES", None, 0),
            flags: Flags::empty(),
            alignment: FRAME_SIZE,
            streams: core::array::from_fn(|_| Default::default()),
            raw_monitor: Default::default(),
            raw_chan_enable: [true; NUM_IDS],
            force_sync: None,
            stats: Default::default(),
            highest: Resp::Cont,
            index: 0,
            first_data: false,
            synced: false,
            block_processed: 0,
            curr_id: BAD_TRACE_ID,
            frame: [0; FRAME_SIZE],
            frame_len: 0,
            frame_index: 0,
            fsync_start_eob: false,
            chunks: Vec::new(),
            chunks_done: 0,
            packed_raw: false,
            unpacked_raw: false,
        }
    }
}

impl<C> Deformatter<C> {
    /// Create a new, unconfigured deformatter
    pub fn new() -> Self {
        Default::default()
    }

    /// Configure the deformatter
    ///
    /// Fails with [`ErrorCode::InvalidParamVal`] if no or unknown flags are
    /// given, or if frame or half frame syncs are combined with memory aligned
    /// frames.
    pub fn configure(&mut self, flags: Flags) -> Result<(), ErrorCode> {
        let syncs = Flags::HAS_FSYNCS | Flags::HAS_HSYNCS;
        if flags.is_empty()
            || !Flags::all().contains(flags)
            || (flags.intersects(syncs) && flags.contains(Flags::FRAME_MEM_ALIGN))
        {
            let err = Error::from(ErrorCode::InvalidParamVal).with_message("Invalid Config Flags");
            self.component.log_error(&err);
            return Err(ErrorCode::InvalidParamVal);
        }
        self.flags = flags;
        self.alignment = flags.alignment();
        Ok(())
    }

    /// Retrieve the current configuration
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Retrieve the required input block alignment
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Access the [`Component`] of this deformatter
    pub fn component(&mut self) -> &mut Component {
        &mut self.component
    }

    /// Access the attachment point for the consumer of the given trace ID
    ///
    /// Returns `None` for reserved and invalid IDs.
    pub fn id_stream(&mut self, id: u8) -> Option<&mut AttachPoint<C>> {
        if !is_valid_trace_id(id) {
            return None;
        }
        self.streams.get_mut(usize::from(id))
    }

    /// Access the attachment point for the raw frame monitor
    pub fn raw_monitor(&mut self) -> &mut AttachPoint<Box<dyn RawFrameSink>> {
        &mut self.raw_monitor
    }

    /// Enable or disable raw output for the given IDs
    ///
    /// Fails with [`ErrorCode::InvalidId`] if any ID does not fit in 7 bits,
    /// in which case no filter is changed.
    pub fn output_filter_ids(&mut self, ids: &[u8], enable: bool) -> Result<(), ErrorCode> {
        if ids.iter().any(|i| usize::from(*i) >= NUM_IDS) {
            return Err(ErrorCode::InvalidId);
        }
        ids.iter()
            .for_each(|i| self.raw_chan_enable[usize::from(*i)] = enable);
        Ok(())
    }

    /// Enable or disable raw output for all IDs
    pub fn output_filter_all_ids(&mut self, enable: bool) {
        self.raw_chan_enable = [enable; NUM_IDS];
    }

    /// Consider the input synchronized from the given trace index onwards
    ///
    /// Bytes preceding the index are dropped. Frame syncs are not searched
    /// for while a forced sync index is set.
    pub fn set_force_sync_index(&mut self, index: Option<u64>) {
        self.force_sync = index;
        if index.is_some() {
            self.synced = false;
        }
    }

    /// Retrieve the demux statistics
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Reset the demux statistics
    pub fn reset_stats(&mut self) {
        self.stats = Default::default();
    }

    fn reset_state(&mut self) {
        self.index = 0;
        self.first_data = false;
        self.synced = false;
        self.block_processed = 0;
        self.curr_id = BAD_TRACE_ID;
        self.frame_len = 0;
        self.fsync_start_eob = false;
        self.chunks.clear();
        self.chunks_done = 0;
        self.highest = Resp::Cont;
    }

    fn raw_out(&mut self, index: u64, kind: RawFrameElem, data: &[u8], id: u8) {
        let enabled = match kind {
            RawFrameElem::IdData => self.raw_chan_enable.get(usize::from(id)) == Some(&true),
            _ => true,
        };
        if let Some(monitor) = self.raw_monitor.first_mut().filter(|_| enabled) {
            monitor.raw_frame(Op::Data, index, kind, data, id);
        }
    }
}

impl<C: TraceDataIn> Deformatter<C> {
    /// Push a non-data operation to all consumers and the raw monitor
    fn op_all(&mut self, op: Op, index: u64) {
        let highest = self
            .streams
            .iter_mut()
            .filter_map(AttachPoint::first_mut)
            .map(|s| s.trace_data_in(op, index, &[]).1)
            .fold(self.highest, Resp::collate);
        self.highest = highest;
        if let Some(monitor) = self.raw_monitor.first_mut() {
            monitor.raw_frame(op, index, RawFrameElem::None, &[], 0);
        }
    }

    fn reset(&mut self) -> Resp {
        self.reset_state();
        self.op_all(Op::Reset, 0);
        self.highest
    }

    fn flush(&mut self) -> Resp {
        self.op_all(Op::Flush, self.index);
        if self.highest.is_cont() {
            self.output_frame();
        }
        self.highest
    }

    fn process_data(&mut self, index: u64, data: &[u8]) -> (usize, Resp) {
        if self.flags.is_empty() {
            let err = Error::from(ErrorCode::NotInit).with_index(index);
            self.component.log_error(&err);
            return (0, Resp::FatalNotInit);
        }

        self.block_processed = 0;
        if let Err(err) = self.process_block(index, data) {
            self.component.log_error(&err);
            self.highest = self.highest.collate(Resp::FatalInvalidData);
        }
        (self.block_processed, self.highest)
    }

    fn process_block(&mut self, index: u64, data: &[u8]) -> Result<(), Error> {
        if !self.first_data {
            self.index = index;
        } else if self.index != index {
            return Err(Error::from(ErrorCode::DfrmtrNotContTrace)
                .with_index(index)
                .with_message("Trace data index is not continuous"));
        }

        if data.len() % self.alignment != 0 {
            return Err(Error::from(ErrorCode::InvalidParamVal)
                .with_index(index)
                .with_message(format!(
                    "Input block size must be a multiple of {} bytes",
                    self.alignment
                )));
        }
        self.first_data = true;

        let raw = self.raw_monitor.has_attached_and_enabled();
        self.packed_raw = raw && self.flags.contains(Flags::PACKED_RAW_OUT);
        self.unpacked_raw = raw && self.flags.contains(Flags::UNPACKED_RAW_OUT);

        // Data still pending from a previous call goes first
        if !self.output_frame() || !self.check_for_sync(data) {
            return Ok(());
        }
        while self.highest.is_cont() && self.extract_frame(data)? {
            self.unpack_frame();
            if !self.output_frame() {
                break;
            }
        }
        Ok(())
    }

    /// Search for the first frame sync, dropping any bytes preceding it
    fn check_for_sync(&mut self, data: &[u8]) -> bool {
        if self.synced {
            return true;
        }

        let unsynced = if let Some(sync) = self.force_sync {
            let offset = sync.wrapping_sub(self.index);
            if offset < data.len() as u64 {
                self.synced = true;
                offset as usize
            } else {
                data.len()
            }
        } else if self.flags.contains(Flags::HAS_FSYNCS) {
            match data.windows(4).position(is_fsync) {
                Some(pos) => {
                    self.synced = true;
                    pos
                }
                None => data.len(),
            }
        } else {
            self.synced = true;
            0
        };

        if unsynced > 0 {
            tracing::debug!(index = self.index, unsynced, "Dropping unsynced bytes");
            self.block_processed += unsynced;
            self.index += unsynced as u64;
        }
        self.synced
    }

    /// Extract the next frame from the input
    ///
    /// Returns `true` if a complete frame was extracted.
    fn extract_frame(&mut self, data: &[u8]) -> Result<bool, Error> {
        let start = self.block_processed;
        let rest = &data[start..];
        if rest.is_empty() {
            return Ok(false);
        }

        let mut consumed = 0;
        if self.flags.contains(Flags::FRAME_MEM_ALIGN) {
            if self.flags.contains(Flags::RESET_ON_4X_FSYNC) {
                let fsyncs = rest.chunks_exact(4).take_while(|w| is_fsync(w)).count();
                if fsyncs > 0 {
                    if fsyncs % 4 != 0 {
                        return Err(Error::from(ErrorCode::DfrmtrBadFhsync)
                            .with_index(self.index)
                            .with_message("Frame syncs not in multiples of 4"));
                    }
                    self.op_all(Op::Reset, self.index);
                    self.curr_id = BAD_TRACE_ID;
                    consumed = fsyncs * 4;
                    if self.packed_raw {
                        self.raw_out(self.index, RawFrameElem::Fsync, &rest[..consumed], 0);
                    }
                }
            }

            let frame = &rest[consumed..];
            if frame.len() >= FRAME_SIZE {
                self.frame.copy_from_slice(&frame[..FRAME_SIZE]);
                self.frame_len = FRAME_SIZE;
                self.frame_index = self.index + consumed as u64;
                consumed += FRAME_SIZE;
                if self.packed_raw {
                    let raw = &frame[..FRAME_SIZE];
                    self.raw_out(self.frame_index, RawFrameElem::Packed, raw, 0);
                }
            }
        } else {
            consumed = self.extract_unaligned(rest)?;
        }

        self.stats.frame_bytes += consumed as u64;
        self.block_processed += consumed;
        self.index += consumed as u64;
        Ok(self.frame_len == FRAME_SIZE)
    }

    /// Collect frame bytes from input which may contain syncs
    ///
    /// Returns the number of bytes consumed.
    fn extract_unaligned(&mut self, rest: &[u8]) -> Result<usize, Error> {
        let mut pos = 0;

        if self.flags.contains(Flags::HAS_FSYNCS) && self.frame_len == 0 {
            if self.fsync_start_eob {
                // The previous block ended with the start of a frame sync
                match half_word(rest, 0) {
                    Some(HSYNC_PATTERN) => pos += 2,
                    Some(_) => {
                        return Err(Error::from(ErrorCode::DfrmtrBadFhsync)
                            .with_index(self.index)
                            .with_message("Incomplete frame sync at end of previous block"));
                    }
                    None => (),
                }
                self.fsync_start_eob = false;
            }

            while rest.get(pos..pos + 4).is_some_and(is_fsync) {
                pos += 4;
            }

            if rest.len() - pos == 2 && half_word(rest, pos) == Some(FSYNC_START) {
                self.fsync_start_eob = true;
                pos += 2;
            }

            if pos > 0 && self.packed_raw {
                self.raw_out(self.index, RawFrameElem::Fsync, &rest[..pos], 0);
            }
        }

        let frame_start = pos;
        if self.frame_len == 0 {
            self.frame_index = self.index + pos as u64;
        }
        while self.frame_len < FRAME_SIZE {
            let Some(pair) = half_word(rest, pos) else {
                break;
            };
            match pair {
                HSYNC_PATTERN if self.flags.contains(Flags::HAS_HSYNCS) => {
                    if self.packed_raw {
                        let hsync = &rest[pos..pos + 2];
                        self.raw_out(self.index + pos as u64, RawFrameElem::Hsync, hsync, 0);
                    }
                }
                HSYNC_PATTERN => {
                    return Err(Error::from(ErrorCode::DfrmtrBadFhsync)
                        .with_index(self.index + pos as u64)
                        .with_message("Half frame sync in frame"));
                }
                FSYNC_START => {
                    return Err(Error::from(ErrorCode::DfrmtrBadFhsync)
                        .with_index(self.index + pos as u64)
                        .with_message("Frame sync start in frame"));
                }
                _ => {
                    self.frame[self.frame_len..self.frame_len + 2]
                        .copy_from_slice(&rest[pos..pos + 2]);
                    self.frame_len += 2;
                }
            }
            pos += 2;
        }

        if self.packed_raw && self.frame_len == FRAME_SIZE {
            let frame = self.frame;
            self.raw_out(self.frame_index, RawFrameElem::Packed, &frame, 0);
        }
        tracing::trace!(
            index = self.index,
            bytes = pos - frame_start,
            frame_len = self.frame_len,
            "Collected frame bytes"
        );
        Ok(pos)
    }

    /// Unpack the current frame into per-ID chunks
    fn unpack_frame(&mut self) {
        let frame = self.frame;
        let flags = frame[FRAME_SIZE - 1];
        self.frame_len = 0;
        self.chunks.clear();
        self.chunks_done = 0;

        let mut chunk = Chunk::new(self.curr_id, self.frame_index);
        for i in (0..FRAME_SIZE - 2).step_by(2) {
            let byte = frame[i];
            let flag = flags & (1 << (i / 2)) != 0;
            let mut prev_id_data = false;
            if byte & 1 != 0 {
                let id = byte >> 1;
                if id != self.curr_id {
                    if flag {
                        // The following byte still belongs to the previous ID
                        chunk.push(frame[i + 1]);
                        prev_id_data = true;
                    }
                    self.curr_id = id;
                    if chunk.valid > 0 {
                        self.chunks.push(chunk);
                    }
                    chunk = Chunk::new(id, self.frame_index + i as u64);
                }
            } else {
                chunk.push(byte | u8::from(flag));
            }
            if !prev_id_data {
                chunk.push(frame[i + 1]);
            }
        }

        let byte = frame[FRAME_SIZE - 2];
        if byte & 1 != 0 {
            self.curr_id = byte >> 1;
        } else {
            chunk.push(byte | u8::from(flags & 0x80 != 0));
        }
        if chunk.valid > 0 {
            self.chunks.push(chunk);
        }
    }

    /// Push unpacked chunks to the consumers
    ///
    /// Returns `false` if a consumer did not accept all data.
    fn output_frame(&mut self) -> bool {
        while let Some(mut chunk) = self.chunks.get(self.chunks_done).copied() {
            let id = chunk.id;
            let data = &chunk.data[chunk.used..chunk.valid];

            if self.unpacked_raw && chunk.used == 0 {
                self.raw_out(chunk.index, RawFrameElem::IdData, data, id);
            }

            let stream = if is_valid_trace_id(id) {
                self.streams[usize::from(id)].first_mut()
            } else {
                None
            };
            let Some(stream) = stream else {
                let len = data.len() as u64;
                if id == BAD_TRACE_ID {
                    self.stats.no_id_bytes += len;
                } else if is_valid_trace_id(id) {
                    self.stats.unknown_id_bytes += len;
                } else {
                    self.stats.reserved_id_bytes += len;
                }
                self.chunks_done += 1;
                continue;
            };

            let index = chunk.index + chunk.used as u64;
            let (used, resp) = stream.trace_data_in(Op::Data, index, data);
            let used = used.min(data.len());
            self.stats.valid_id_bytes += used as u64;
            self.highest = self.highest.collate(resp);

            if !resp.is_cont() {
                chunk.used += used;
                self.chunks[self.chunks_done] = chunk;
                if chunk.used == chunk.valid {
                    self.chunks_done += 1;
                }
                return false;
            }
            self.chunks_done += 1;
        }
        true
    }
}

impl<C: TraceDataIn> TraceDataIn for Deformatter<C> {
    fn trace_data_in(&mut self, op: Op, index: u64, data: &[u8]) -> (usize, Resp) {
        self.highest = Resp::Cont;
        match op {
            Op::Reset => (0, self.reset()),
            Op::Flush => (0, self.flush()),
            Op::Eot => {
                self.op_all(Op::Eot, index);
                (0, self.highest)
            }
            Op::Data if data.is_empty() => {
                let err = Error::from(ErrorCode::InvalidParamVal)
                    .with_index(index)
                    .with_message("Empty data block");
                self.component.log_error(&err);
                (0, Resp::FatalInvalidParam)
            }
            Op::Data => self.process_data(index, data),
        }
    }
}

impl<C> core::fmt::Debug for Deformatter<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Deformatter")
            .field("component", &self.component)
            .field("flags", &self.flags)
            .field("index", &self.index)
            .field("synced", &self.synced)
            .field("curr_id", &self.curr_id)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn is_fsync(data: &[u8]) -> bool {
    data.first_chunk().map(|b| u32::from_le_bytes(*b)) == Some(FSYNC_PATTERN)
}

fn half_word(data: &[u8], pos: usize) -> Option<u16> {
    data.get(pos..)
        .and_then(<[u8]>::first_chunk)
        .map(|b| u16::from_le_bytes(*b))
}
