// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Packet decoder
//!
//! The [`Decoder`] turns [`Packet`]s into [`TraceElement`]s. Instruction
//! ranges are reconstructed from P-header atoms by following the traced
//! program with a [`CodeFollower`].

use alloc::format;
use alloc::string::String;

use crate::attach::AttachPoint;
use crate::component::Component;
use crate::datapath::{ElementSink, Op, PacketSink, Resp};
use crate::element::{
    self, ElemType, Event, InstrRange, List, TraceElement, TraceOnReason, UnsyncInfo,
};
use crate::error::{Error, ErrorCode, Severity};
use crate::follower::{self, CodeFollower};
use crate::instruction::InstructionDecode;
use crate::memory::MemoryAccess;
use crate::types::{Atom, CoreProfile, ExLevel, MemSpace, PeContext, SecLevel};

use super::config::{Config, TraceMode};
use super::packet::{ISyncReason, Kind, Packet};

/// Respond with an error to bad packets instead of resynchronising
pub const ERR_BAD_PKTS: u32 = 0x100;
/// Halt on bad packets without resetting the decoder
pub const HALT_BAD_PKTS: u32 = 0x200;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    NoSync,
    WaitASync,
    WaitISync,
    DecodePkts,
    SendPkts,
}

/// Packet decoder for a single trace source
///
/// Elements are sent to the [`ElementSink`] attached to
/// [`element_sink`][Self::element_sink]. Following instructions requires both
/// a [`MemoryAccess`] and an [`InstructionDecode`] to be attached to the
/// [`code_follower`][Self::code_follower].
///
/// Instruction ranges are held back until the next packet confirms them, as
/// an exception may cancel the last instruction traced.
pub struct Decoder<M, D, S> {
    component: Component,
    config: Option<Config>,
    sink: AttachPoint<S>,
    follower: CodeFollower<M, D>,
    elems: List,
    state: State,
    unsync: UnsyncInfo,
    index: u64,
    address: u64,
    need_addr: bool,
    sent_unknown: bool,
    wait_isync: bool,
    eot: bool,
    context: PeContext,
}

impl<M, D, S> Decoder<M, D, S> {
    /// Create a new, unconfigured decoder
    pub fn new(instance: usize) -> Self {
        Self {
            component: Component::new(
                "DCD_ETMV3",
                Some(instance),
                ERR_BAD_PKTS | HALT_BAD_PKTS,
            ),
            config: None,
            sink: Default::default(),
            follower: CodeFollower::new(),
            elems: List::new(),
            state: State::NoSync,
            unsync: UnsyncInfo::InitDecoder,
            index: 0,
            address: 0,
            need_addr: true,
            sent_unknown: false,
            wait_isync: false,
            eot: false,
            context: Default::default(),
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
    /// Only instruction trace is supported. Configurations enabling any data
    /// trace are rejected with [`ErrorCode::HwCfgUnsupp`].
    pub fn set_config(&mut self, config: Config) -> Result<(), ErrorCode> {
        if config.trace_mode() != TraceMode::InstrOnly {
            let error = Error::new(Severity::Error, ErrorCode::HwCfgUnsupp)
                .with_chan_id(config.trace_id())
                .with_message(format!("Unsupported trace mode: {}", config.trace_mode()));
            self.component.log_error(&error);
            return Err(ErrorCode::HwCfgUnsupp);
        }

        self.follower.set_arch_profile(config.arch_profile());
        self.follower.set_trace_id(config.trace_id());
        self.elems.set_chan_id(config.trace_id());
        self.config = Some(config);
        Ok(())
    }

    pub fn config(&self) -> Option<&Config> {
        self.config.as_ref()
    }

    /// Access the attachment point for the downstream [`ElementSink`]
    pub fn element_sink(&mut self) -> &mut AttachPoint<S> {
        &mut self.sink
    }

    /// Access the [`CodeFollower`] for attaching memory access and decode
    pub fn code_follower(&mut self) -> &mut CodeFollower<M, D> {
        &mut self.follower
    }

    /// Determine whether the decoder is synchronised to the trace
    pub fn is_synced(&self) -> bool {
        matches!(self.state, State::DecodePkts | State::SendPkts)
    }

    /// Reason for the last loss of synchronisation
    pub fn unsync_info(&self) -> UnsyncInfo {
        self.unsync
    }

    fn reset_decoder(&mut self) {
        self.state = State::NoSync;
        self.need_addr = true;
        self.sent_unknown = false;
        self.wait_isync = false;
        self.eot = false;
        self.elems.reset();
        self.follower.clear_error();
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

    /// Append a new element carrying the current context and ISA
    fn push(&mut self, kind: element::Kind) -> &mut TraceElement {
        let context = self.context;
        let isa = self.follower.isa();
        let elem = self.elems.next_elem(self.index);
        elem.kind = kind;
        elem.context = context;
        elem.isa = isa;
        elem
    }

    fn next_state(&self) -> State {
        if self.elems.elem_to_send() {
            State::SendPkts
        } else if self.wait_isync {
            State::WaitISync
        } else {
            State::DecodePkts
        }
    }
}

impl<M, D, S: ElementSink> Decoder<M, D, S> {
    fn send(&mut self) -> Resp {
        match self.sink.first_mut() {
            Some(sink) => self.elems.send_elements(sink),
            None => Resp::Cont,
        }
    }

    /// Send ready elements and leave the send state if the sink allows
    fn send_pending(&mut self) -> Resp {
        let resp = self.send();
        if resp.is_cont() {
            if self.eot {
                self.reset_decoder();
                self.unsync = UnsyncInfo::Eot;
            } else {
                self.state = self.next_state();
            }
        }
        resp
    }

    fn on_eot(&mut self) -> Resp {
        self.push(element::Kind::EoTrace(UnsyncInfo::Eot));
        self.elems.commit_all_pend();
        self.eot = true;
        self.state = State::SendPkts;
        self.send_pending()
    }

    fn on_flush(&mut self) -> Resp {
        if self.state == State::SendPkts {
            self.send_pending()
        } else {
            self.send()
        }
    }

    fn on_reset(&mut self) {
        self.unsync = UnsyncInfo::ResetDecoder;
        self.reset_decoder();
    }
}

impl<M: MemoryAccess, D: InstructionDecode, S: ElementSink> Decoder<M, D, S> {
    fn process_packet(&mut self, config: &Config, packet: &Packet) -> Resp {
        let mut resp = Resp::Cont;
        let mut decoded = false;
        while resp.is_cont() {
            match self.state {
                State::NoSync => {
                    let unsync = self.unsync;
                    self.push(element::Kind::NoSync(unsync));
                    self.state = State::WaitASync;
                }
                State::WaitASync => {
                    // The packet is consumed regardless of the sink's response
                    if packet.kind == Kind::ASync {
                        tracing::debug!(index = self.index, "Waiting for I-Sync");
                        self.state = State::WaitISync;
                    }
                    resp = resp.collate(self.send());
                    break;
                }
                State::WaitISync => {
                    self.wait_isync = true;
                    if decoded {
                        break;
                    }
                    decoded = true;
                    match packet.kind {
                        Kind::ISync | Kind::ISyncCycle => {
                            let address = packet.address;
                            tracing::debug!(index = self.index, address, "Synced");
                            self.process_isync(packet, true);
                            self.wait_isync = false;
                            self.state = self.next_state();
                        }
                        k if pre_isync_valid(k, config) => {
                            resp = resp.collate(self.decode_packet(config, packet));
                        }
                        _ => break,
                    }
                }
                State::DecodePkts => {
                    if decoded {
                        break;
                    }
                    decoded = true;
                    resp = resp.collate(self.decode_packet(config, packet));
                }
                State::SendPkts => {
                    let sent = self.send_pending();
                    resp = resp.collate(sent);
                    if decoded || !sent.is_cont() {
                        break;
                    }
                }
            }
        }
        resp
    }

    fn decode_packet(&mut self, config: &Config, packet: &Packet) -> Resp {
        if packet.kind != Kind::BranchAddress {
            self.elems.commit_all_pend();
        }

        match packet.kind {
            Kind::NotSync | Kind::BadSequence | Kind::Reserved => return self.bad_packet(packet),
            Kind::BadTraceMode
            | Kind::StoreFail
            | Kind::OooData
            | Kind::OooAddrPlc
            | Kind::NormData
            | Kind::DataSuppressed
            | Kind::ValNotTraced => {
                self.log(
                    ErrorCode::HwCfgUnsupp,
                    format!("Data trace not supported: {packet}"),
                );
                self.unsync = UnsyncInfo::BadPacket;
                self.reset_decoder();
                return Resp::FatalInvalidData;
            }
            Kind::NoError | Kind::IncompleteEot | Kind::ASync | Kind::Ignore => (),
            Kind::CycleCount => {
                self.push(element::Kind::CycleCount).cycle_count = Some(packet.cycle_count);
            }
            Kind::Trigger => {
                self.push(element::Kind::Event(Event::Trigger));
            }
            Kind::BranchAddress => self.process_branch_address(packet),
            Kind::ISync | Kind::ISyncCycle => self.process_isync(packet, false),
            Kind::PHdr => {
                if let Err(resp) = self.process_phdr(config, packet) {
                    return resp;
                }
            }
            Kind::ContextId | Kind::Vmid => {
                self.context = updated_context(self.context, packet);
                self.push(element::Kind::PeContext);
            }
            Kind::ExceptionEntry => {
                self.push(element::Kind::Exception {
                    number: 0,
                    data_marker: true,
                });
            }
            Kind::ExceptionExit => {
                self.push(element::Kind::ExceptionRet);
                self.pend_exception_return(config);
            }
            Kind::Timestamp => {
                self.push(element::Kind::Timestamp {
                    value: packet.timestamp,
                    freq_change: false,
                });
            }
        }

        self.state = self.next_state();
        Resp::Cont
    }

    fn bad_packet(&mut self, packet: &Packet) -> Resp {
        self.log(ErrorCode::BadPacketSeq, format!("Bad packet: {packet}"));
        if self.component.has_op_flags(HALT_BAD_PKTS) {
            return Resp::FatalInvalidData;
        }

        self.unsync = UnsyncInfo::BadPacket;
        self.reset_decoder();
        if self.component.has_op_flags(ERR_BAD_PKTS) {
            Resp::FatalInvalidData
        } else {
            Resp::ErrCont
        }
    }

    fn process_isync(&mut self, packet: &Packet, first: bool) {
        let reason = packet.isync.reason;
        if first || reason != ISyncReason::Periodic {
            let reason = match reason {
                ISyncReason::TraceRestartOverflow => TraceOnReason::Overflow,
                ISyncReason::DebugExit => TraceOnReason::DebugExit,
                _ => TraceOnReason::Normal,
            };
            self.push(element::Kind::TraceOn(reason));
        }

        let context = if first {
            updated_context(Default::default(), packet)
        } else {
            updated_context(self.context, packet)
        };
        let isa_changed = packet.isa != self.follower.isa();
        self.follower.set_isa(packet.isa);
        if first || isa_changed || context != self.context {
            self.context = context;
            let elem = self.push(element::Kind::PeContext);
            if packet.isync.has_cycle_count {
                elem.cycle_count = Some(packet.cycle_count);
            }
        } else if packet.isync.has_cycle_count {
            self.push(element::Kind::CycleCount).cycle_count = Some(packet.cycle_count);
        }

        if !packet.isync.no_address {
            self.address = packet.isync.lsip_address.unwrap_or(packet.address);
            self.need_addr = false;
            self.sent_unknown = false;
        }
    }

    fn process_branch_address(&mut self, packet: &Packet) {
        match packet.exception {
            Some(ex) if ex.cancel => self.elems.cancel_pend(),
            _ => self.elems.commit_all_pend(),
        }

        self.address = packet.address;
        self.need_addr = false;
        self.sent_unknown = false;
        self.follower.set_isa(packet.isa);

        if let Some(ex) = packet.exception {
            let context = updated_context(self.context, packet);
            if context != self.context {
                self.context = context;
                self.push(element::Kind::PeContext);
            }
            if ex.number != 0 {
                self.push(element::Kind::Exception {
                    number: ex.number.into(),
                    data_marker: false,
                });
            }
        }
    }

    fn process_phdr(&mut self, config: &Config, packet: &Packet) -> Result<(), Resp> {
        let cycle_acc = config.is_cycle_acc();
        let space = MemSpace::for_security(self.context.security);
        self.follower.set_mem_space(space);

        let mut remaining = packet.atoms.num;
        let mut bits = packet.atoms.bits;
        loop {
            if self.need_addr {
                // Atoms cannot be followed without an address
                if !self.sent_unknown || cycle_acc {
                    let kind = if self.sent_unknown || remaining == 0 {
                        element::Kind::CycleCount
                    } else {
                        element::Kind::AddrUnknown
                    };
                    self.push(kind).cycle_count = cycle_acc.then(|| packet.remain_cc(remaining));
                    self.sent_unknown = true;
                }
                break;
            }

            if remaining == 0 {
                if cycle_acc {
                    let cycle_count = packet.remain_cc(0);
                    self.push(element::Kind::CycleCount).cycle_count = Some(cycle_count);
                }
                break;
            }

            let atom = Atom::from_bit(bits & 1 != 0);
            let isa = self.follower.isa();
            match self.follower.follow_single_atom(self.address, atom) {
                Ok(()) => {
                    let info = *self.follower.instr_info();
                    let range = InstrRange {
                        start: self.follower.range_start(),
                        end: self.follower.range_end(),
                        num_instr: self.follower.num_instr(),
                        last_exec: atom == Atom::E,
                        last_type: info.kind,
                        last_subtype: info.subtype,
                        last_size: info.size,
                        last_cond: info.conditional,
                    };
                    let next = self.follower.next_addr();
                    let cycle_count = cycle_acc.then(|| packet.atom_cc(remaining));
                    let elem = self.push(element::Kind::InstrRange(range));
                    elem.isa = isa;
                    elem.cycle_count = cycle_count;
                    match next {
                        Some(address) => self.address = address,
                        None => self.need_addr = true,
                    }
                }
                Err(
                    follower::Error::Nacc { address, .. }
                    | follower::Error::ShortRead { address, .. },
                ) => {
                    self.push(element::Kind::AddrNacc { address, space });
                    self.need_addr = true;
                    self.follower.clear_error();
                }
                Err(e) => {
                    let code = e.code();
                    self.log(code, format!("{e} at {:#x}", self.address));
                    return Err(Resp::FatalSysErr);
                }
            }

            bits >>= 1;
            remaining -= 1;
            if remaining == 0 {
                break;
            }
        }

        let last = self.elems.num_elem().checked_sub(1);
        if last.and_then(|n| self.elems.elem_type(n)) == Some(ElemType::InstrRange) {
            self.elems.pend_last_n(1);
        }
        Ok(())
    }

    /// Hold back the exception return together with the range it returns from
    fn pend_exception_return(&mut self, config: &Config) {
        let mut num = 1;
        if config.profile != CoreProfile::CortexM {
            let prev = self.elems.num_elem().checked_sub(2);
            if prev.and_then(|n| self.elems.elem_type(n)) == Some(ElemType::InstrRange) {
                num = 2;
            }
        }
        self.elems.pend_last_n(num);
    }

    fn check_init(&mut self) -> Result<Config, Resp> {
        let Some(config) = self.config else {
            self.log(ErrorCode::NotInit, "No configuration set");
            return Err(Resp::FatalNotInit);
        };
        if !self.sink.has_attached_and_enabled() {
            self.log(ErrorCode::NotInit, "No element sink attached");
            return Err(Resp::FatalNotInit);
        }
        if !self.follower.is_ready() {
            self.log(ErrorCode::NotInit, "Memory access or instruction decode not attached");
            return Err(Resp::FatalNotInit);
        }
        Ok(config)
    }
}

impl<M, D, S> PacketSink<Packet> for Decoder<M, D, S>
where
    M: MemoryAccess,
    D: InstructionDecode,
    S: ElementSink,
{
    fn packet_in(&mut self, op: Op, index: u64, packet: Option<&Packet>) -> Resp {
        let config = match self.check_init() {
            Ok(config) => config,
            Err(resp) => return resp,
        };

        self.index = index;
        match (op, packet) {
            (Op::Data, Some(packet)) => self.process_packet(&config, packet),
            (Op::Data, None) => {
                self.log(ErrorCode::InvalidParamVal, "Data operation without packet");
                Resp::FatalInvalidParam
            }
            (Op::Eot, _) => self.on_eot(),
            (Op::Flush, _) => self.on_flush(),
            (Op::Reset, _) => {
                self.on_reset();
                Resp::Cont
            }
        }
    }
}

impl<M, D, S> core::fmt::Debug for Decoder<M, D, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Decoder")
            .field("component", &self.component)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("unsync", &self.unsync)
            .field("address", &self.address)
            .field("need_addr", &self.need_addr)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Determine whether a packet may be decoded before the first I-Sync
fn pre_isync_valid(kind: Kind, config: &Config) -> bool {
    match kind {
        Kind::Timestamp => true,
        Kind::CycleCount | Kind::PHdr => config.is_cycle_acc(),
        _ => false,
    }
}

/// Apply the context information carried by a packet
fn updated_context(mut context: PeContext, packet: &Packet) -> PeContext {
    let traced = &packet.context;
    if traced.updated {
        context.security = if traced.non_secure {
            SecLevel::NonSecure
        } else {
            SecLevel::Secure
        };
        context.exception_level = traced.hyp.then_some(ExLevel::El2);
    }
    if let Some(id) = traced.context_id {
        context.context_id = Some(id);
    }
    if let Some(vmid) = traced.vmid {
        context.vmid = Some(vmid.into());
    }
    context
}
