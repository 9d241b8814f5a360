// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0

use super::*;

use crate::datapath::{Op, PacketMonitor, Resp, TraceDataIn};
use crate::etmv3::config::Config;
use crate::etmv3::packet::{Exception, ISyncReason, Kind, Packet};
use crate::etmv3::processor::*;
use crate::types::Isa;

type Sink = Vec<(u64, Packet)>;

fn processor(config: Config) -> (Processor<Sink>, Codes) {
    let mut processor = Processor::new(0);
    processor.set_config(config);
    processor
        .packet_sink()
        .attach(Vec::new())
        .expect("Could not attach sink");
    let codes = Codes::default();
    codes.attach_to(processor.component_mut());
    (processor, codes)
}

fn packets(processor: &mut Processor<Sink>) -> Vec<(u64, Kind)> {
    processor
        .packet_sink()
        .first()
        .expect("No sink")
        .iter()
        .map(|(i, p)| (*i, p.kind))
        .collect()
}

fn last(processor: &mut Processor<Sink>) -> Packet {
    processor
        .packet_sink()
        .first()
        .and_then(|s| s.last())
        .map(|(_, p)| *p)
        .expect("No packet")
}

fn feed(processor: &mut Processor<Sink>, data: &[u8]) -> Resp {
    let (processed, resp) = processor.trace_data_in(Op::Data, 0, data);
    assert_eq!(processed, data.len());
    resp
}

#[derive(Clone, Default)]
struct Monitor(Rc<RefCell<Vec<(Kind, usize)>>>);

impl PacketMonitor<Packet> for Monitor {
    fn raw_packet(&mut self, op: Op, _: u64, packet: Option<&Packet>, bytes: &[u8]) {
        if let (Op::Data, Some(packet)) = (op, packet) {
            self.0.borrow_mut().push((packet.kind, bytes.len()));
        }
    }
}

#[test]
fn async_isync() {
    let (mut processor, codes) = processor(Default::default());
    assert!(!processor.is_synced());
    let data = trace(&[&ASYNC, &isync(1, 0x1000)]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    assert!(processor.is_synced());
    assert_eq!(packets(&mut processor), [(0, Kind::ASync), (6, Kind::ISync)]);

    let packet = last(&mut processor);
    assert_eq!(packet.address, 0x1000);
    assert_eq!(packet.isa, Isa::Arm);
    assert_eq!(packet.isync.reason, ISyncReason::TraceEnable);
    assert!(!packet.isync.no_address);
    assert!(!packet.context.non_secure);
    assert!(packet.context.updated);
    assert!(codes.get().is_empty());
    assert_eq!(processor.stats().channel_total, 12);
}

#[test]
fn isync_thumb_context() {
    let config = Config {
        reg_ctrl: 1 << 14,
        ..Default::default()
    };
    let (mut processor, _) = processor(config);
    let data = trace(&[&ASYNC, &[0x08, 0x42, 0x08, 0x01, 0x20, 0x00, 0x00]]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);

    let packet = last(&mut processor);
    assert_eq!(packet.kind, Kind::ISync);
    assert_eq!(packet.context.context_id, Some(0x42));
    assert!(packet.context.non_secure);
    assert_eq!(packet.isa, Isa::Thumb2);
    assert_eq!(packet.address, 0x2000);
    assert_eq!(packet.isync.reason, ISyncReason::Periodic);
}

#[test]
fn fragmented_input() {
    let (mut processor, _) = processor(Default::default());
    let data = trace(&[&ASYNC, &isync(0, 0x1000)]);
    data.chunks(1).enumerate().for_each(|(i, c)| {
        let (processed, resp) = processor.trace_data_in(Op::Data, i as u64, c);
        assert_eq!((processed, resp), (1, Resp::Cont));
    });
    assert_eq!(packets(&mut processor), [(0, Kind::ASync), (6, Kind::ISync)]);
    assert_eq!(last(&mut processor).address, 0x1000);
}

#[test]
fn not_sync_before_async() {
    let (mut processor, _) = processor(Default::default());
    let data = trace(&[&[0x12, 0x34], &ASYNC]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    assert_eq!(packets(&mut processor), [(0, Kind::NotSync), (2, Kind::ASync)]);
    assert_eq!(processor.stats().channel_unsynced, 2);
}

#[test]
fn not_sync_excess_zeros() {
    let (mut processor, _) = processor(Default::default());
    let data = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80];
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    assert_eq!(packets(&mut processor), [(0, Kind::NotSync), (2, Kind::ASync)]);
}

#[test]
fn not_sync_without_async() {
    let (mut processor, _) = processor(Default::default());
    assert_eq!(feed(&mut processor, &[0x12; 20]), Resp::Cont);
    assert_eq!(packets(&mut processor), [(0, Kind::NotSync), (16, Kind::NotSync)]);
    assert!(!processor.is_synced());
}

#[test]
fn async_excess_zeros_in_sync() {
    let (mut processor, codes) = processor(Default::default());
    let data = trace(&[&ASYNC, &[0x00], &ASYNC]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    assert_eq!(
        packets(&mut processor),
        [(0, Kind::ASync), (6, Kind::BadSequence), (7, Kind::ASync)]
    );
    assert_eq!(codes.get(), [ErrorCode::BadPacketSeq]);
    assert_eq!(processor.stats().bad_sequence_errs, 1);
}

macro_rules! phdr_test {
    ($n:ident, $ctrl:literal, $h:literal, $k:expr, $num:literal) => {
        #[test]
        fn $n() {
            let config = Config {
                reg_ctrl: $ctrl,
                ..Default::default()
            };
            let (mut processor, _) = processor(config);
            let data = trace(&[&ASYNC, &[$h]]);
            feed(&mut processor, &data);
            let packet = last(&mut processor);
            assert_eq!(packet.kind, $k);
            assert_eq!(packet.atoms.num, $num);
        }
    };
}

phdr_test!(phdr_e, 0x0, 0x84, Kind::PHdr, 1);
phdr_test!(phdr_eeen, 0x0, 0xcc, Kind::PHdr, 4);
phdr_test!(phdr_reserved, 0x0, 0x92, Kind::Reserved, 0);
phdr_test!(phdr_ca_fmt3, 0x1000, 0xe4, Kind::PHdr, 1);

macro_rules! branch_test {
    ($n:ident, [$($b:literal),*], $a:literal, $isa:expr) => {
        #[test]
        fn $n() {
            let (mut processor, _) = processor(Default::default());
            let data = trace(&[&ASYNC, &isync(1, 0x1000), &[$($b),*]]);
            assert_eq!(feed(&mut processor, &data), Resp::Cont);
            let packet = last(&mut processor);
            assert_eq!(packet.kind, Kind::BranchAddress);
            assert_eq!(packet.address, $a);
            assert_eq!(packet.isa, $isa);
            assert_eq!(packet.exception, None);
        }
    };
}

branch_test!(branch_single_byte, [0x07], 0x100c, Isa::Arm);
branch_test!(branch_two_bytes, [0x81, 0x01], 0x0100, Isa::Arm);
branch_test!(branch_full_arm, [0x81, 0xa0, 0x80, 0x80, 0x08], 0x2000, Isa::Arm);
branch_test!(branch_full_thumb, [0x81, 0xc0, 0x80, 0x80, 0x10], 0x2000, Isa::Thumb2);

#[test]
fn branch_exception() {
    let (mut processor, _) = processor(Default::default());
    let data = trace(&[
        &ASYNC,
        &isync(1, 0x1000),
        &[0x81, 0xa0, 0x80, 0x80, 0x48, 0xa7, 0x21],
    ]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    let packet = last(&mut processor);
    assert_eq!(packet.kind, Kind::BranchAddress);
    assert_eq!(packet.address, 0x2000);
    let exception = packet.exception.expect("No exception");
    assert_eq!(exception.number, 0x13);
    assert!(exception.cancel);
    assert!(packet.context.non_secure);
    assert!(packet.context.hyp);
}

branch_test!(branch_exception_bit_ignored, [0x81, 0x41], 0x4100, Isa::Arm);

#[test]
fn branch_alt_encoding() {
    let config = Config {
        reg_idr: 0x10_0040,
        ..Default::default()
    };
    let (mut processor, _) = processor(config);
    let data = trace(&[&ASYNC, &isync(1, 0x1000), &[0x81, 0x41, 0x00]]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    assert_eq!(
        packets(&mut processor),
        [(0, Kind::ASync), (6, Kind::ISync), (12, Kind::BranchAddress)]
    );
    let packet = last(&mut processor);
    assert_eq!(packet.address, 0x0100);
    assert_eq!(packet.isa, Isa::Arm);
    assert_eq!(
        packet.exception,
        Some(Exception {
            number: 0,
            cancel: false,
            resume: 0,
        })
    );
}

#[test]
fn isync_cycle() {
    let (mut processor, codes) = processor(Default::default());
    let data = trace(&[
        &ASYNC,
        &[0x70, 0x85, 0x01, 0x20, 0x00, 0x10, 0x00, 0x00],
        &[0x84],
    ]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    assert_eq!(
        packets(&mut processor),
        [(0, Kind::ASync), (6, Kind::ISyncCycle), (14, Kind::PHdr)]
    );
    assert!(codes.get().is_empty());

    let packet = processor
        .packet_sink()
        .first()
        .map(|s| s[1].1)
        .expect("No packet");
    assert!(packet.isync.has_cycle_count);
    assert_eq!(packet.cycle_count, 0x85);
    assert_eq!(packet.isync.reason, ISyncReason::TraceEnable);
    assert_eq!(packet.address, 0x1000);
    assert_eq!(packet.isa, Isa::Arm);
}

#[test]
fn isync_lsip() {
    let (mut processor, _) = processor(Default::default());
    let data = trace(&[
        &ASYNC,
        &[0x08, 0xa0, 0x00, 0x10, 0x00, 0x00, 0x09],
        &[0x84],
    ]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    assert_eq!(
        packets(&mut processor),
        [(0, Kind::ASync), (6, Kind::ISync), (13, Kind::PHdr)]
    );

    let packet = processor
        .packet_sink()
        .first()
        .map(|s| s[1].1)
        .expect("No packet");
    assert_eq!(packet.isync.reason, ISyncReason::TraceEnable);
    assert_eq!(packet.address, 0x1000);
    assert_eq!(packet.isync.lsip_address, Some(0x1010));
}

#[test]
fn timestamp() {
    let (mut processor, _) = processor(Default::default());
    let data = trace(&[&ASYNC, &[0x42, 0x85, 0x01]]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    let packet = last(&mut processor);
    assert_eq!(packet.kind, Kind::Timestamp);
    assert_eq!(packet.timestamp, 0x85);
    assert_eq!(packet.ts_update_bits, 14);
}

#[test]
fn cycle_count() {
    let (mut processor, _) = processor(Default::default());
    let data = trace(&[&ASYNC, &[0x04, 0x81, 0x02]]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    let packet = last(&mut processor);
    assert_eq!(packet.kind, Kind::CycleCount);
    assert_eq!(packet.cycle_count, 0x101);
}

#[test]
fn single_byte_packets() {
    let (mut processor, _) = processor(Default::default());
    let data = trace(&[&ASYNC, &[0x0c, 0x66, 0x76, 0x7e]]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    assert_eq!(
        packets(&mut processor),
        [
            (0, Kind::ASync),
            (6, Kind::Trigger),
            (7, Kind::Ignore),
            (8, Kind::ExceptionExit),
            (9, Kind::ExceptionEntry),
        ]
    );
}

#[test]
fn context_id() {
    let config = Config {
        reg_ctrl: 2 << 14,
        ..Default::default()
    };
    let (mut processor, _) = processor(config);
    let data = trace(&[&ASYNC, &[0x6e, 0x34, 0x12]]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    let packet = last(&mut processor);
    assert_eq!(packet.kind, Kind::ContextId);
    assert_eq!(packet.context.context_id, Some(0x1234));
}

#[test]
fn vmid() {
    let (mut processor, _) = processor(Default::default());
    let data = trace(&[&ASYNC, &[0x3c, 0x05]]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    assert_eq!(last(&mut processor).context.vmid, Some(5));
}

#[test]
fn reserved_header() {
    let (mut processor, codes) = processor(Default::default());
    let data = trace(&[&ASYNC, &[0x72, 0x84]]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    assert_eq!(
        packets(&mut processor),
        [(0, Kind::ASync), (6, Kind::Reserved), (7, Kind::PHdr)]
    );
    assert_eq!(codes.get(), [ErrorCode::InvalidPcktHdr]);
    assert_eq!(processor.stats().bad_header_errs, 1);
}

#[test]
fn data_in_instruction_trace() {
    let (mut processor, _) = processor(Default::default());
    let data = trace(&[&ASYNC, &[0x02]]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    let packet = last(&mut processor);
    assert_eq!(packet.kind, Kind::BadTraceMode);
    assert_eq!(packet.err_kind, Kind::NormData);
}

#[test]
fn err_on_bad_packets() {
    let (mut processor, _) = processor(Default::default());
    processor
        .component_mut()
        .set_op_mode(ERR_BAD_PKTS)
        .expect("Could not set op mode");
    let data = trace(&[&ASYNC, &[0x72]]);
    let (_, resp) = processor.trace_data_in(Op::Data, 0, &data);
    assert_eq!(resp, Resp::FatalInvalidData);
    assert_eq!(packets(&mut processor), [(0, Kind::ASync)]);

    let (processed, resp) = processor.trace_data_in(Op::Data, 7, &[0x84]);
    assert_eq!((processed, resp), (0, Resp::FatalInvalidData));

    let (_, resp) = processor.trace_data_in(Op::Reset, 8, &[]);
    assert_eq!(resp, Resp::Cont);
    assert!(!processor.is_synced());
    assert_eq!(feed(&mut processor, &ASYNC), Resp::Cont);
}

#[test]
fn nofwd_bad_packets() {
    let (mut processor, _) = processor(Default::default());
    processor
        .component_mut()
        .set_op_mode(NOFWD_BAD_PKTS | UNSYNC_ON_BAD_PKTS)
        .expect("Could not set op mode");
    let data = trace(&[&ASYNC, &[0x72, 0x84]]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    assert_eq!(packets(&mut processor), [(0, Kind::ASync), (7, Kind::NotSync)]);
    assert!(!processor.is_synced());
}

#[test]
fn incomplete_eot() {
    let (mut processor, _) = processor(Default::default());
    let data = trace(&[&ASYNC, &[0x08, 0x20]]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    assert_eq!(packets(&mut processor), [(0, Kind::ASync)]);

    let (_, resp) = processor.trace_data_in(Op::Eot, 8, &[]);
    assert_eq!(resp, Resp::Cont);
    let packet = last(&mut processor);
    assert_eq!(packet.kind, Kind::IncompleteEot);
    assert_eq!(packet.err_kind, Kind::ISync);
}

#[test]
fn monitor() {
    let (mut processor, _) = processor(Default::default());
    let monitor = Monitor::default();
    processor
        .raw_monitor()
        .attach(Box::new(monitor.clone()))
        .expect("Could not attach monitor");
    let data = trace(&[&ASYNC, &isync(1, 0x1000), &[0x84]]);
    assert_eq!(feed(&mut processor, &data), Resp::Cont);
    assert_eq!(
        *monitor.0.borrow(),
        [(Kind::ASync, 6), (Kind::ISync, 6), (Kind::PHdr, 1)]
    );
}

#[test]
fn not_initialised() {
    let mut processor = Processor::<Sink>::new(0);
    let (_, resp) = processor.trace_data_in(Op::Data, 0, &ASYNC);
    assert_eq!(resp, Resp::FatalNotInit);

    processor.set_config(Default::default());
    let (_, resp) = processor.trace_data_in(Op::Data, 0, &ASYNC);
    assert_eq!(resp, Resp::FatalNotInit);
}

#[test]
fn empty_block() {
    let (mut processor, _) = processor(Default::default());
    let (_, resp) = processor.trace_data_in(Op::Data, 0, &[]);
    assert_eq!(resp, Resp::FatalInvalidParam);
}
