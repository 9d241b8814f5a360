// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Simple ETMv3 trace decoder
//!
//!     Usage: decode [OPTIONS] <elf> <trace>
//!
//! This program decodes the ETMv3 trace of a program provided in the form of
//! an ELF file. The trace is read from a file holding raw trace data as
//! captured by a trace sink, either CoreSight formatted or unformatted.
//! The capture, i.e. whether the trace is formatted and the configuration of
//! every traced source, is supplied as a TOML file (such as the one shown in
//! the documentation of `coresight_etm::config`).
//!
//! The program prints a single line for every trace element to stdout. Log
//! output is written to stderr and may be controlled via `RUST_LOG`. If run
//! with `--debug`, every packet decoded is printed to stderr as well.
//!
//! Only a small subset of the A32 and T32 instruction sets is recognized,
//! just enough to find the branches in typical code.

use std::path::PathBuf;

use coresight_etm::datapath::{self, Op, Resp, TraceDataIn};
use coresight_etm::etmv3::{self, Packet};
use coresight_etm::instruction::{Info, Request, UnknownOpcode};
use coresight_etm::types::Isa;
use coresight_etm::{config, deformatter, memory};

fn main() {
    let matches = clap::Command::new("ETMv3 decoder")
        .arg(clap::arg!(<elf> "Path to the traced program").value_parser(clap::value_parser!(PathBuf)))
        .arg(clap::arg!(<trace> "Path to the raw trace").value_parser(clap::value_parser!(PathBuf)))
        .arg(
            clap::arg!(-c --capture <FILE> "Capture configuration")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            clap::arg!(-d --debug "Print decoded packets")
                .env("DEBUG")
                .action(clap::ArgAction::SetTrue)
                .value_parser(clap::builder::FalseyValueParser::new()),
        )
        .get_matches();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let debug = matches.get_flag("debug");

    // For decoding, we need the program to follow ...
    let elf_path = matches.get_one::<PathBuf>("elf").expect("No ELF file specified");
    let elf_data = std::fs::read(elf_path).expect("Could not load ELF file");
    let elf = elf::ElfBytes::<elf::endian::LittleEndian>::minimal_parse(elf_data.as_ref())
        .expect("Could not parse ELF file");
    let elf = memory::elf::Elf::new(&elf).expect("Could not use ELF file as memory");

    // ... the trace ...
    let trace_path = matches.get_one::<PathBuf>("trace").expect("No trace file specified");
    let trace = std::fs::read(trace_path).expect("Could not load trace file");

    // ... and a description of how it was captured.
    let capture: config::Capture = matches
        .get_one::<PathBuf>("capture")
        .map(|p| {
            let capture = std::fs::read_to_string(p).expect("Could not load capture config");
            toml::from_str(capture.as_ref()).expect("Could not parse capture config")
        })
        .unwrap_or_default();
    tracing::debug!(?capture, "Loaded capture config");

    let mut pipelines = capture.sources.iter().enumerate().map(|(instance, source)| {
        let trace_id = source.trace_id();
        let mut pipeline = etmv3::builder()
            .with_config(*source)
            .with_instance(instance)
            .with_memory(elf.clone())
            .with_instruction_decode(coresight_etm::instruction::from_fn(decode))
            .with_sink(datapath::from_fn(move |index, _, elem| {
                println!("{trace_id:#04x} @{index}: {elem}");
                Resp::Cont
            }))
            .build()
            .expect("Could not set up decoder");
        if debug {
            pipeline
                .raw_monitor()
                .attach(Box::new(PrintPackets(trace_id)))
                .expect("Could not attach packet printer");
        }
        (trace_id, pipeline)
    });

    // Finally, assemble the datapath ...
    let mut root: Box<dyn TraceDataIn + '_> = if capture.formatted {
        let mut deformatter = deformatter::Deformatter::<Box<dyn TraceDataIn + '_>>::new();
        deformatter
            .configure(capture.frame_flags)
            .expect("Could not configure deformatter");
        for (trace_id, pipeline) in pipelines {
            deformatter
                .id_stream(trace_id)
                .expect("Invalid trace ID")
                .attach(Box::new(pipeline))
                .expect("Could not attach decoder");
        }
        Box::new(deformatter)
    } else {
        let (_, pipeline) = pipelines.next().expect("No trace source configured");
        assert!(
            pipelines.next().is_none(),
            "Unformatted trace must originate from a single source"
        );
        Box::new(pipeline)
    };

    // ... and get going.
    let mut index = 0;
    while index < trace.len() {
        let (processed, resp) = root.trace_data_in(Op::Data, index as u64, &trace[index..]);
        index += processed;
        if resp.is_fatal() {
            tracing::error!(index, %resp, "Decoding failed");
            break;
        }
        if resp.is_wait() {
            root.trace_data_in(Op::Flush, index as u64, &[]);
        }
    }
    let (_, resp) = root.trace_data_in(Op::Eot, index as u64, &[]);
    tracing::info!(bytes = index, %resp, "Finished decoding");
}

/// Raw packet monitor printing every packet to stderr
struct PrintPackets(u8);

impl datapath::PacketMonitor<Packet> for PrintPackets {
    fn raw_packet(&mut self, op: Op, index: u64, packet: Option<&Packet>, _: &[u8]) {
        match packet {
            Some(packet) => eprintln!("{:#04x} @{index}: {packet}", self.0),
            None => eprintln!("{:#04x} @{index}: {op}", self.0),
        }
    }
}

/// Decode the few instructions we need to know about
fn decode(request: &Request) -> Result<Info, UnknownOpcode> {
    match request.isa {
        Isa::Arm => Ok(decode_a32(request.address, request.opcode)),
        Isa::Thumb2 => Ok(decode_t32(request.address, request.opcode)),
        _ => Err(UnknownOpcode(request.opcode)),
    }
}

fn decode_a32(address: u64, opcode: u32) -> Info {
    let cond = opcode >> 28;
    let conditional = cond < 0xe;
    let rd = (opcode >> 12) & 0xf;
    if opcode & 0x0e00_0000 == 0x0a00_0000 {
        // B, BL and BLX (immediate)
        let offset = (((opcode << 8) as i32) >> 6) as i64;
        let target = address.wrapping_add(8).wrapping_add_signed(offset);
        if cond == 0xf {
            let target = target | u64::from((opcode >> 23) & 0x2);
            Info::branch(4, target, Isa::Thumb2).with_link(true)
        } else {
            Info::branch(4, target, Isa::Arm)
                .with_link(opcode & 0x0100_0000 != 0)
                .with_conditional(conditional)
        }
    } else if opcode & 0x0fff_ffd0 == 0x012f_ff10 {
        // BX and BLX (register)
        Info::indirect_branch(4)
            .with_link(opcode & 0x20 != 0)
            .with_conditional(conditional)
    } else if (opcode & 0x0c00_0000 == 0 && opcode & 0x0190_0000 != 0x0100_0000 && rd == 0xf)
        || (opcode & 0x0c10_0000 == 0x0410_0000 && rd == 0xf)
        || (opcode & 0x0e10_8000 == 0x0810_8000)
    {
        // Data processing, LDR or LDM writing the PC
        Info::indirect_branch(4).with_conditional(conditional)
    } else {
        Info::other(4).with_conditional(conditional)
    }
}

fn decode_t32(address: u64, opcode: u32) -> Info {
    let hw1 = opcode & 0xffff;
    let hw2 = opcode >> 16;
    if hw1 >> 11 >= 0x1d {
        if hw1 & 0xf800 == 0xf000 && hw2 & 0xc000 == 0xc000 {
            // BL and BLX (immediate)
            let s = (hw1 >> 10) & 1;
            let i1 = !((hw2 >> 13) ^ s) & 1;
            let i2 = !((hw2 >> 11) ^ s) & 1;
            let imm = (s << 24) | (i1 << 23) | (i2 << 22) | ((hw1 & 0x3ff) << 12) | ((hw2 & 0x7ff) << 1);
            let offset = (((imm << 7) as i32) >> 7) as i64;
            let target = address.wrapping_add(4).wrapping_add_signed(offset);
            return if hw2 & 0x1000 != 0 {
                Info::branch(4, target, Isa::Thumb2).with_link(true)
            } else {
                Info::branch(4, target & !3, Isa::Arm).with_link(true)
            };
        }
        return Info::other(4);
    }

    if hw1 & 0xf800 == 0xe000 {
        // B (unconditional)
        let offset = ((((hw1 & 0x7ff) << 21) as i32) >> 20) as i64;
        Info::branch(2, address.wrapping_add(4).wrapping_add_signed(offset), Isa::Thumb2)
    } else if hw1 & 0xf000 == 0xd000 && hw1 & 0x0e00 != 0x0e00 {
        // B (conditional)
        let offset = ((((hw1 & 0xff) << 24) as i32) >> 23) as i64;
        Info::branch(2, address.wrapping_add(4).wrapping_add_signed(offset), Isa::Thumb2)
            .with_conditional(true)
    } else if hw1 & 0xff00 == 0x4700 {
        // BX and BLX (register)
        Info::indirect_branch(2).with_link(hw1 & 0x80 != 0)
    } else if hw1 & 0xff00 == 0xbd00 {
        // POP including the PC
        Info::indirect_branch(2)
    } else {
        Info::other(2)
    }
}
