// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Packet processor
//!
//! The [`Processor`] splits the byte stream of a single trace source into
//! [`Packet`]s. Input may be fragmented arbitrarily: partial packets are
//! buffered between calls.
//!
//! Before any packet can be decoded, the processor needs to find an A-Sync
//! sequence, i.e. five `0x00` followed by `0x80`. Any data preceding it is
//! reported as [`Kind::NotSync`] packets.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use crate::attach::AttachPoint;
use crate::component::Component;
use crate::datapath::{Op, PacketMonitor, PacketSink, Resp, TraceDataIn};
use crate::error::{Error, ErrorCode, Severity};
use crate::types::Isa;

use super::config::Config;
use super::packet::{Exception, ISyncReason, Kind, Packet};

/// Don't forward bad packets to the attached sink
pub const NOFWD_BAD_PKTS: u32 = 0x10;
/// Don't pass bad packets to the attached monitor
pub const NOMON_BAD_PKTS: u32 = 0x20;
/// Respond with an error instead of forwarding bad packets
pub const ERR_BAD_PKTS: u32 = 0x40;
/// Drop stream synchronisation after a bad packet
pub const UNSYNC_ON_BAD_PKTS: u32 = 0x80;

const SUPPORTED_OP_FLAGS: u32 = NOFWD_BAD_PKTS | NOMON_BAD_PKTS | ERR_BAD_PKTS | UNSYNC_ON_BAD_PKTS;

const ASYNC_SIZE: usize = 6;
const MAX_PACKET_SIZE: usize = 32;
const MAX_NOT_SYNC: usize = 16;
const MAX_SYNC_ZEROS: usize = 13;

/// Processing statistics
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Total number of bytes processed
    pub channel_total: u64,
    /// Number of bytes reported as not synchronised
    pub channel_unsynced: u64,
    pub bad_header_errs: u32,
    pub bad_sequence_errs: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    WaitSync,
    ProcHdr,
    ProcData,
    SendPkt,
    /// Unrecoverable error, cleared only by a reset
    ProcErr(Resp),
}

/// Leading part of the buffer to be sent as a packet of its own
#[derive(Copy, Clone, Debug)]
struct PartPacket {
    len: usize,
    next_state: State,
    next_kind: Kind,
}

/// Packet processor for a single trace source
///
/// Packets are forwarded to the [`PacketSink`] attached to
/// [`packet_sink`][Self::packet_sink] together with the index of their first
/// byte. Raw packet bytes may be observed through a [`PacketMonitor`]
/// attached to [`raw_monitor`][Self::raw_monitor].
pub struct Processor<S> {
    component: Component,
    config: Option<Config>,
    sink: AttachPoint<S>,
    monitor: AttachPoint<Box<dyn PacketMonitor<Packet>>>,
    stats: Stats,
    state: State,
    packet: Packet,
    buf: Vec<u8>,
    index: u64,
    part: Option<PartPacket>,
    stream_sync: bool,
    start_of_sync: bool,
    bytes_expected: usize,
    branch_needs_ex: bool,
    isync_got_cc: bool,
    isync_lsip: bool,
    isync_info_idx: usize,
    expect_data_addr: bool,
    found_data_addr: bool,
}

impl<S> Processor<S> {
    /// Create a new, unconfigured processor
    pub fn new(instance: usize) -> Self {
        Self {
            component: Component::new("PKTP_ETMV3", Some(instance), SUPPORTED_OP_FLAGS),
            config: None,
            sink: Default::default(),
            monitor: Default::default(),
            stats: Default::default(),
            state: State::WaitSync,
            packet: Default::default(),
            buf: Vec::with_capacity(MAX_PACKET_SIZE),
            index: 0,
            part: None,
            stream_sync: false,
            start_of_sync: false,
            bytes_expected: 0,
            branch_needs_ex: false,
            isync_got_cc: false,
            isync_lsip: false,
            isync_info_idx: 0,
            expect_data_addr: false,
            found_data_addr: false,
        }
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn component_mut(&mut self) -> &mut Component {
        &mut self.component
    }

    /// Set the configuration of the trace source
    ///
    /// This resets the processor.
    pub fn set_config(&mut self, config: Config) {
        self.config = Some(config);
        self.init_processor_state();
    }

    pub fn config(&self) -> Option<&Config> {
        self.config.as_ref()
    }

    /// Access the attachment point for the downstream [`PacketSink`]
    pub fn packet_sink(&mut self) -> &mut AttachPoint<S> {
        &mut self.sink
    }

    /// Access the attachment point for the raw packet monitor
    pub fn raw_monitor(&mut self) -> &mut AttachPoint<Box<dyn PacketMonitor<Packet>>> {
        &mut self.monitor
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = Default::default();
    }

    /// Determine whether the processor found an A-Sync in the stream
    pub fn is_synced(&self) -> bool {
        self.stream_sync
    }

    fn init_processor_state(&mut self) {
        self.stream_sync = false;
        self.start_of_sync = false;
        self.state = State::WaitSync;
        self.part = None;
        self.packet.reset_state();
        self.init_packet_state();
    }

    fn init_packet_state(&mut self) {
        self.bytes_expected = 0;
        self.branch_needs_ex = false;
        self.isync_got_cc = false;
        self.isync_lsip = false;
        self.isync_info_idx = 0;
        self.expect_data_addr = false;
        self.found_data_addr = false;
        self.buf.clear();
        self.packet.clear();
    }

    fn log(&mut self, code: ErrorCode, message: impl Into<String>) {
        let mut error = Error::new(Severity::Error, code)
            .with_index(self.index)
            .with_message(message);
        if let Some(config) = self.config {
            error = error.with_chan_id(config.trace_id());
        }
        self.component.log_error(&error);
    }

    fn monitor_op(&mut self, op: Op, index: u64) {
        if let Some(monitor) = self.monitor.first_mut() {
            monitor.raw_packet(op, index, None, &[]);
        }
    }

    fn set_part_packet(&mut self, len: usize, next_state: State, next_kind: Kind) {
        self.part = Some(PartPacket {
            len,
            next_state,
            next_kind,
        });
    }

    fn header_error(&mut self, kind: Kind, message: &str) {
        self.stats.bad_header_errs += 1;
        self.log(ErrorCode::InvalidPcktHdr, message);
        self.packet.set_err(kind);
        self.bad_packet();
    }

    fn sequence_error(&mut self, message: &str) {
        self.stats.bad_sequence_errs += 1;
        self.log(ErrorCode::BadPacketSeq, message);
        self.packet.set_err(Kind::BadSequence);
        self.bad_packet();
    }

    fn bad_packet(&mut self) {
        self.state = if self.component.has_op_flags(ERR_BAD_PKTS) {
            State::ProcErr(Resp::FatalInvalidData)
        } else {
            State::SendPkt
        };
    }

    fn interp_error(&mut self, message: &str) {
        self.log(ErrorCode::PktInterpFail, message);
        self.state = State::ProcErr(Resp::FatalSysErr);
    }
}

impl<S: PacketSink<Packet>> Processor<S> {
    fn process_data(&mut self, config: &Config, index: u64, data: &[u8]) -> (usize, Resp) {
        let mut processed = 0;
        let mut resp = Resp::Cont;
        while resp.is_cont()
            && (processed < data.len() || matches!(self.state, State::SendPkt | State::ProcErr(_)))
        {
            match self.state {
                State::WaitSync => {
                    if self.buf.is_empty() {
                        self.index = index + processed as u64;
                    }
                    processed += self.wait_for_sync(&data[processed..]);
                }
                State::ProcHdr => {
                    self.index = index + processed as u64;
                    self.process_header(config, data[processed]);
                    processed += 1;
                }
                State::ProcData if self.buf.len() >= MAX_PACKET_SIZE => {
                    self.interp_error("Packet exceeds maximum size");
                }
                State::ProcData => {
                    if self.process_payload(config, data[processed]) {
                        processed += 1;
                    }
                }
                State::SendPkt => resp = resp.collate(self.output_packet()),
                State::ProcErr(r) => resp = resp.collate(r),
            }
        }
        (processed, resp)
    }

    /// Hunt for an A-Sync sequence, returning the number of bytes consumed
    fn wait_for_sync(&mut self, data: &[u8]) -> usize {
        let mut consumed = 0;
        for &byte in data {
            if self.start_of_sync {
                if byte == 0x80 && self.buf.len() >= ASYNC_SIZE - 1 {
                    let excess = self.buf.len() + 1 - ASYNC_SIZE;
                    self.packet.clear();
                    if excess > 0 {
                        // Leading zeros are not part of the sync, the `0x80`
                        // is read again after they were sent.
                        self.packet.kind = Kind::NotSync;
                        self.set_part_packet(excess, State::WaitSync, Kind::NotSync);
                    } else {
                        consumed += 1;
                        self.buf.push(byte);
                        self.packet.kind = Kind::ASync;
                        self.stream_sync = true;
                        self.start_of_sync = false;
                        tracing::debug!(index = self.index, "Found A-Sync");
                    }
                    self.state = State::SendPkt;
                    return consumed;
                }

                consumed += 1;
                self.buf.push(byte);
                if byte != 0x00 {
                    self.start_of_sync = false;
                } else if self.buf.len() >= MAX_SYNC_ZEROS {
                    self.packet.clear();
                    self.packet.kind = Kind::NotSync;
                    self.set_part_packet(8, State::WaitSync, Kind::NotSync);
                    self.state = State::SendPkt;
                    return consumed;
                }
            } else if byte == 0x00 {
                if !self.buf.is_empty() {
                    // The zero may start a sync and is read again
                    self.packet.clear();
                    self.packet.kind = Kind::NotSync;
                    self.state = State::SendPkt;
                    return consumed;
                }
                consumed += 1;
                self.buf.push(byte);
                self.start_of_sync = true;
            } else {
                consumed += 1;
                self.buf.push(byte);
                if consumed == data.len() || self.buf.len() >= MAX_NOT_SYNC {
                    self.packet.clear();
                    self.packet.kind = Kind::NotSync;
                    self.state = State::SendPkt;
                    return consumed;
                }
            }
        }
        consumed
    }

    fn process_header(&mut self, config: &Config, byte: u8) {
        self.init_packet_state();
        self.buf.push(byte);
        self.state = State::ProcData;

        if byte & 0x01 != 0 {
            self.packet.kind = Kind::BranchAddress;
            if byte & 0x80 == 0 {
                self.on_branch_address(config);
                self.state = State::SendPkt;
            }
        } else if byte & 0x81 == 0x80 {
            self.packet.kind = Kind::PHdr;
            if self.packet.update_atoms(byte, config.is_cycle_acc()) {
                self.state = State::SendPkt;
            } else {
                self.header_error(Kind::Reserved, "Invalid P-Header");
            }
        } else if byte & 0xF3 == 0x00 {
            match byte {
                0x00 => self.packet.kind = Kind::ASync,
                0x04 => self.packet.kind = Kind::CycleCount,
                0x08 => self.packet.kind = Kind::ISync,
                _ => {
                    self.packet.kind = Kind::Trigger;
                    self.state = State::SendPkt;
                }
            }
        } else if byte & 0x03 == 0x00 {
            if byte & 0x93 == 0x00 {
                self.packet.kind = Kind::OooData;
                if !config.is_data_val_trace() {
                    return self.header_error(Kind::BadTraceMode, "Out of order data without data value trace");
                }
                self.packet.data.ooo_tag = (byte >> 5) & 0x3;
                let size = data_size((byte >> 2) & 0x3);
                if size == 0 {
                    self.packet.data.value = 0;
                    self.packet.data.value_updated = true;
                    self.state = State::SendPkt;
                } else {
                    self.bytes_expected = 1 + size;
                }
            } else if byte == 0x70 {
                self.packet.kind = Kind::ISyncCycle;
            } else if byte == 0x50 {
                self.packet.kind = Kind::StoreFail;
                if !config.is_data_val_trace() {
                    return self.header_error(Kind::BadTraceMode, "Store failed without data value trace");
                }
                self.state = State::SendPkt;
            } else if byte & 0xD3 == 0x50 {
                self.packet.kind = Kind::OooAddrPlc;
                if !config.is_data_trace() {
                    return self.header_error(Kind::BadTraceMode, "Out of order placeholder without data trace");
                }
                self.packet.data.ooo_tag = (byte >> 2) & 0x3;
                self.expect_data_addr = byte & 0x20 != 0 && config.is_data_addr_trace();
                if !self.expect_data_addr {
                    self.state = State::SendPkt;
                }
            } else if byte == 0x3C {
                self.packet.kind = Kind::Vmid;
            } else {
                self.header_error(Kind::Reserved, "Packet header reserved encoding");
            }
        } else if byte & 0xD3 == 0x02 {
            self.packet.kind = Kind::NormData;
            if !config.is_data_trace() {
                return self.header_error(Kind::BadTraceMode, "Data packet without data trace");
            }
            self.expect_data_addr = byte & 0x20 != 0 && config.is_data_addr_trace();
            self.bytes_expected = 1 + data_size((byte >> 2) & 0x3);
            if !self.expect_data_addr && self.bytes_expected == 1 {
                self.packet.data.value = 0;
                self.packet.data.value_updated = true;
                self.state = State::SendPkt;
            }
        } else if byte == 0x62 {
            self.packet.kind = Kind::DataSuppressed;
            if !config.is_data_trace() {
                return self.header_error(Kind::BadTraceMode, "Data suppressed without data trace");
            }
            self.state = State::SendPkt;
        } else if byte & 0xEF == 0x6A {
            self.packet.kind = Kind::ValNotTraced;
            if !config.is_data_trace() {
                return self.header_error(Kind::BadTraceMode, "Value not traced without data trace");
            }
            self.expect_data_addr = byte & 0x10 != 0 && config.is_data_addr_trace();
            if !self.expect_data_addr {
                self.state = State::SendPkt;
            }
        } else if byte == 0x66 {
            self.packet.kind = Kind::Ignore;
            self.state = State::SendPkt;
        } else if byte == 0x6E {
            self.packet.kind = Kind::ContextId;
            self.bytes_expected = 1 + config.ctxt_id_bytes();
            if self.bytes_expected == 1 {
                self.state = State::SendPkt;
            }
        } else if byte == 0x76 {
            self.packet.kind = Kind::ExceptionExit;
            self.state = State::SendPkt;
        } else if byte == 0x7E {
            self.packet.kind = Kind::ExceptionEntry;
            self.state = State::SendPkt;
        } else if byte & 0xFB == 0x42 {
            self.packet.kind = Kind::Timestamp;
        } else {
            self.header_error(Kind::Reserved, "Packet header reserved encoding");
        }
    }

    /// Process a payload byte, returning whether it was consumed
    fn process_payload(&mut self, config: &Config, byte: u8) -> bool {
        match self.packet.kind {
            Kind::ASync => match byte {
                0x00 => {
                    self.buf.push(byte);
                    if self.buf.len() >= ASYNC_SIZE {
                        self.set_part_packet(1, State::ProcData, Kind::ASync);
                        self.sequence_error("A-Sync with excess zeros");
                    }
                }
                0x80 if self.buf.len() == ASYNC_SIZE - 1 => {
                    self.buf.push(byte);
                    self.state = State::SendPkt;
                }
                _ => {
                    self.sequence_error("Unexpected byte in A-Sync");
                    return false;
                }
            },
            Kind::BranchAddress => {
                self.buf.push(byte);
                let done = if self.branch_needs_ex {
                    byte & 0x80 == 0
                } else if byte & 0x80 == 0 || self.buf.len() == 5 {
                    let ex_follows = byte & 0x40 != 0 && (config.is_alt_branch() || self.buf.len() == 5);
                    self.branch_needs_ex = ex_follows;
                    !ex_follows
                } else {
                    false
                };
                if done {
                    self.on_branch_address(config);
                    self.state = State::SendPkt;
                }
            }
            Kind::CycleCount => {
                self.buf.push(byte);
                if byte & 0x80 == 0 || self.buf.len() >= 6 {
                    self.packet.cycle_count = extract_cycle_count(&self.buf[1..]).0;
                    self.state = State::SendPkt;
                }
            }
            Kind::ISyncCycle if !self.isync_got_cc => {
                self.buf.push(byte);
                self.isync_got_cc = byte & 0x80 == 0 || self.buf.len() >= 6;
            }
            Kind::ISync | Kind::ISyncCycle => {
                self.buf.push(byte);
                if self.bytes_expected == 0 {
                    let cc_bytes = self.buf.len() - 2;
                    let ctxt_bytes = config.ctxt_id_bytes();
                    let addr_bytes = if config.is_instr_trace() { 4 } else { 0 };
                    self.bytes_expected = 2 + cc_bytes + ctxt_bytes + addr_bytes;
                    self.isync_info_idx = 1 + cc_bytes + ctxt_bytes;
                }
                if self.buf.len() - 1 == self.isync_info_idx {
                    self.isync_lsip = byte & 0x80 != 0 && config.is_instr_trace();
                }
                let len = self.buf.len();
                let done = len >= self.bytes_expected
                    && (!self.isync_lsip || (len > self.bytes_expected && byte & 0x80 == 0));
                if done {
                    self.on_isync(config);
                    self.state = State::SendPkt;
                }
            }
            Kind::Timestamp => {
                self.buf.push(byte);
                if byte & 0x80 == 0 || self.buf.len() >= 10 {
                    let (value, bits) = extract_timestamp(&self.buf[1..]);
                    self.packet.update_timestamp(value, bits);
                    self.state = State::SendPkt;
                }
            }
            Kind::ContextId => {
                self.buf.push(byte);
                if self.buf.len() == self.bytes_expected {
                    self.packet.context.context_id = Some(read_le(&self.buf[1..]));
                    self.state = State::SendPkt;
                }
            }
            Kind::Vmid => {
                self.buf.push(byte);
                self.packet.context.vmid = Some(byte);
                self.state = State::SendPkt;
            }
            Kind::OooData => {
                self.buf.push(byte);
                if self.buf.len() == self.bytes_expected {
                    self.packet.data.value = read_le(&self.buf[1..]);
                    self.packet.data.value_updated = true;
                    self.state = State::SendPkt;
                }
            }
            Kind::NormData => {
                self.buf.push(byte);
                if self.expect_data_addr && !self.found_data_addr {
                    if byte & 0x80 != 0 && self.buf.len() < 6 {
                        return true;
                    }
                    self.found_data_addr = true;
                    self.bytes_expected += self.buf.len() - 1;
                }
                if self.buf.len() >= self.bytes_expected {
                    let mut idx = 1;
                    if self.expect_data_addr {
                        idx += self.on_data_address(1);
                    }
                    if idx < self.buf.len() {
                        self.packet.data.value = read_le(&self.buf[idx..]);
                        self.packet.data.value_updated = true;
                    }
                    self.state = State::SendPkt;
                }
            }
            Kind::ValNotTraced | Kind::OooAddrPlc => {
                self.buf.push(byte);
                if byte & 0x80 == 0 || self.buf.len() >= 6 {
                    self.on_data_address(1);
                    self.state = State::SendPkt;
                }
            }
            _ => self.interp_error("Unexpected payload for packet"),
        }
        true
    }

    fn on_branch_address(&mut self, config: &Config) {
        let addr = decode_address(&self.buf, config.is_alt_branch());
        let isa = match addr.isa {
            Some(isa) => {
                self.packet.update_isa(isa);
                isa
            }
            None => self.packet.isa,
        };
        let shift = isa.addr_shift();
        self.packet.update_address(addr.value << shift, addr.bits + shift);

        if self.branch_needs_ex {
            self.on_exception(addr.len);
        }
    }

    fn on_exception(&mut self, idx: usize) {
        let Some(&info) = self.buf.get(idx) else {
            return;
        };
        let mut exception = Exception {
            number: ((info >> 1) & 0xF).into(),
            cancel: info & 0x20 != 0,
            resume: 0,
        };
        let context = &mut self.packet.context;
        context.non_secure = info & 0x01 != 0;
        context.alt_isa = info & 0x40 != 0;
        context.updated = true;

        if info & 0x80 != 0 {
            if let Some(&info) = self.buf.get(idx + 1) {
                exception.number |= u16::from(info & 0x1F) << 4;
                context.hyp = info & 0x20 != 0;
                if info & 0x80 != 0 {
                    if let Some(&resume) = self.buf.get(idx + 2) {
                        exception.resume = resume & 0xF;
                    }
                }
            }
        }
        self.packet.exception = Some(exception);
    }

    fn on_isync(&mut self, config: &Config) {
        let mut idx = 1;
        if self.packet.kind == Kind::ISyncCycle {
            let (cycle_count, len) = extract_cycle_count(&self.buf[1..]);
            self.packet.cycle_count = cycle_count;
            self.packet.isync.has_cycle_count = true;
            idx += len;
        }

        let ctxt_bytes = config.ctxt_id_bytes();
        if ctxt_bytes > 0 {
            self.packet.context.context_id = Some(read_le(&self.buf[idx..idx + ctxt_bytes]));
            idx += ctxt_bytes;
        }

        let info = self.buf[idx];
        idx += 1;
        self.packet.isync.reason = ISyncReason::from(info >> 5);
        let context = &mut self.packet.context;
        context.non_secure = info & 0x08 != 0;
        context.alt_isa = info & 0x04 != 0;
        context.hyp = info & 0x02 != 0;
        context.updated = true;

        if !config.is_instr_trace() {
            self.packet.isync.no_address = true;
            return;
        }

        let raw = read_le(&self.buf[idx..idx + 4]);
        idx += 4;
        let isa = if info & 0x10 != 0 {
            Isa::Jazelle
        } else if raw & 0x1 != 0 || config.is_v7m() {
            Isa::Thumb2
        } else {
            Isa::Arm
        };
        self.packet.update_isa(isa);
        self.packet.address = if isa == Isa::Jazelle {
            raw.into()
        } else {
            (raw & !0x1).into()
        };

        if self.isync_lsip {
            let addr = decode_address(&self.buf[idx..], false);
            let isa = addr.isa.unwrap_or(isa);
            let shift = isa.addr_shift();
            let mask = (1u64 << (addr.bits + shift)) - 1;
            let lsip = (self.packet.address & !mask) | ((addr.value << shift) & mask);
            self.packet.isync.lsip_address = Some(lsip);
        }
    }

    /// Extract a data address starting at `idx`, returning its length
    fn on_data_address(&mut self, idx: usize) -> usize {
        let mut value = 0;
        let mut len = 0;
        for (i, byte) in self.buf[idx..].iter().take(5).enumerate() {
            len += 1;
            if i < 4 {
                value |= u32::from(byte & 0x7F) << (7 * i);
            } else {
                value |= u32::from(byte & 0x0F) << 28;
                self.packet.data.be = byte & 0x40 != 0;
            }
            if byte & 0x80 == 0 {
                break;
            }
        }
        self.packet.data.address = value;
        self.packet.data.address_updated = true;
        len
    }

    fn output_packet(&mut self) -> Resp {
        let len = self.part.map_or(self.buf.len(), |p| p.len);
        let resp = self.send(len);
        match self.part.take() {
            Some(part) => {
                self.buf.drain(..part.len);
                self.index += part.len as u64;
                self.state = part.next_state;
                self.packet.kind = part.next_kind;
            }
            None => {
                if self.packet.is_bad() && self.component.has_op_flags(UNSYNC_ON_BAD_PKTS) {
                    self.stream_sync = false;
                    self.start_of_sync = false;
                }
                self.buf.clear();
                self.state = if self.stream_sync {
                    State::ProcHdr
                } else {
                    State::WaitSync
                };
            }
        }
        resp
    }

    /// Send the current packet made up of the first `len` buffered bytes
    fn send(&mut self, len: usize) -> Resp {
        let bad = self.packet.is_bad();
        if self.packet.kind == Kind::NotSync {
            self.stats.channel_unsynced += len as u64;
        }

        if !(bad && self.component.has_op_flags(NOMON_BAD_PKTS)) {
            if let Some(monitor) = self.monitor.first_mut() {
                monitor.raw_packet(Op::Data, self.index, Some(&self.packet), &self.buf[..len]);
            }
        }
        if bad && self.component.has_op_flags(NOFWD_BAD_PKTS) {
            return Resp::Cont;
        }
        self.sink
            .first_mut()
            .map_or(Resp::Cont, |s| s.packet_in(Op::Data, self.index, Some(&self.packet)))
    }

    fn on_eot(&mut self) -> Resp {
        let mut resp = Resp::Cont;
        while self.state == State::SendPkt && resp.is_cont() {
            resp = self.output_packet();
        }
        if !resp.is_cont() || matches!(self.state, State::ProcErr(_)) {
            return resp;
        }
        if !self.buf.is_empty() {
            self.packet.set_err(Kind::IncompleteEot);
            resp = self.output_packet();
            self.init_packet_state();
        }
        resp
    }

    fn check_init(&mut self) -> Result<Config, Resp> {
        let Some(config) = self.config else {
            self.log(ErrorCode::NotInit, "No configuration set");
            return Err(Resp::FatalNotInit);
        };
        if !self.sink.has_attached() && !self.monitor.has_attached() {
            self.log(ErrorCode::NotInit, "No packet sink or monitor attached");
            return Err(Resp::FatalNotInit);
        }
        Ok(config)
    }
}

impl<S: PacketSink<Packet>> TraceDataIn for Processor<S> {
    fn trace_data_in(&mut self, op: Op, index: u64, data: &[u8]) -> (usize, Resp) {
        let config = match self.check_init() {
            Ok(config) => config,
            Err(resp) => return (0, resp),
        };

        match op {
            Op::Data => {
                if data.is_empty() {
                    self.log(ErrorCode::InvalidParamVal, "Data operation with empty block");
                    return (0, Resp::FatalInvalidParam);
                }
                let (processed, resp) = self.process_data(&config, index, data);
                self.stats.channel_total += processed as u64;
                (processed, resp)
            }
            Op::Eot => {
                let mut resp = self.on_eot();
                if !resp.is_fatal() {
                    if let Some(sink) = self.sink.first_mut() {
                        resp = resp.collate(sink.packet_in(Op::Eot, index, None));
                    }
                }
                self.monitor_op(op, index);
                (0, resp)
            }
            Op::Flush => {
                let mut resp = self
                    .sink
                    .first_mut()
                    .map_or(Resp::Cont, |s| s.packet_in(Op::Flush, index, None));
                while resp.is_cont() && self.state == State::SendPkt {
                    resp = resp.collate(self.output_packet());
                }
                self.monitor_op(op, index);
                (0, resp)
            }
            Op::Reset => {
                let resp = self
                    .sink
                    .first_mut()
                    .map_or(Resp::Cont, |s| s.packet_in(Op::Reset, index, None));
                if !resp.is_fatal() {
                    self.init_processor_state();
                }
                self.monitor_op(op, index);
                (0, resp)
            }
        }
    }
}

impl<S> core::fmt::Debug for Processor<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Processor")
            .field("component", &self.component)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("stream_sync", &self.stream_sync)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Address in the compressed branch address format
#[derive(Copy, Clone, Debug)]
struct CompressedAddress {
    /// Address bits without the ISA dependent shift applied
    value: u64,
    bits: u32,
    /// ISA selected by a full address
    isa: Option<Isa>,
    /// Number of bytes occupied
    len: usize,
}

fn decode_address(bytes: &[u8], alt_branch: bool) -> CompressedAddress {
    let mut addr = CompressedAddress {
        value: 0,
        bits: 0,
        isa: None,
        len: 0,
    };
    for &byte in bytes.iter().take(5) {
        addr.len += 1;
        match addr.len {
            1 => {
                addr.value = u64::from((byte >> 1) & 0x3F);
                addr.bits = 6;
            }
            2..=4 => {
                let (mask, bits) = if alt_branch && byte & 0xC0 == 0x40 {
                    (0x3F, 6)
                } else {
                    (0x7F, 7)
                };
                addr.value |= u64::from(byte & mask) << addr.bits;
                addr.bits += bits;
            }
            _ => {
                let (isa, mask, bits) = if byte & 0x20 != 0 {
                    (Isa::Jazelle, 0x1F, 5)
                } else if byte & 0x10 != 0 {
                    (Isa::Thumb2, 0x0F, 4)
                } else {
                    (Isa::Arm, 0x07, 3)
                };
                addr.value |= u64::from(byte & mask) << addr.bits;
                addr.bits += bits;
                addr.isa = Some(isa);
            }
        }
        if byte & 0x80 == 0 {
            break;
        }
    }
    addr
}

/// Extract a cycle count, returning it together with its length in bytes
fn extract_cycle_count(bytes: &[u8]) -> (u32, usize) {
    let mut value = 0u64;
    let mut len = 0;
    for &byte in bytes.iter().take(5) {
        value |= u64::from(byte & 0x7F) << (7 * len);
        len += 1;
        if byte & 0x80 == 0 {
            break;
        }
    }
    (value as u32, len)
}

/// Extract a timestamp value together with the number of bits it updates
fn extract_timestamp(bytes: &[u8]) -> (u64, u8) {
    let mut value = 0;
    let mut bits = 0;
    for (i, &byte) in bytes.iter().take(9).enumerate() {
        if i == 8 {
            value |= u64::from(byte) << bits;
            bits += 8;
        } else {
            value |= u64::from(byte & 0x7F) << bits;
            bits += 7;
        }
        if byte & 0x80 == 0 {
            break;
        }
    }
    (value, bits)
}

fn read_le(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(4)
        .rev()
        .fold(0, |acc, b| (acc << 8) | u32::from(*b))
}

/// Number of bytes of a data value with the given size code
fn data_size(code: u8) -> usize {
    match code {
        0 => 0,
        1 => 1,
        2 => 2,
        _ => 4,
    }
}
