// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Datapath operations, responses and the interfaces between stages
//!
//! Every stage of the decode pipeline is driven by its upstream neighbour
//! pushing an [`Op`] together with an optional block of data. The stage
//! answers with a [`Resp`] which tells the caller whether it may carry on
//! pushing data ([`Resp::is_cont`]), has to retry later ([`Resp::is_wait`]) or
//! has to reset the pipeline ([`Resp::is_fatal`]).
//!
//! The ordering of [`Resp`] values is part of the contract: collating the
//! responses of multiple consumers amounts to taking their maximum.

use core::fmt;

use alloc::vec::Vec;

use crate::element::TraceElement;

#[cfg(test)]
mod tests;

/// Operation pushed along the datapath
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    /// Process the accompanying data block
    Data,
    /// End of trace, flush out everything and finish
    Eot,
    /// Push out any buffered data, e.g. after a [`Resp::Wait`]
    Flush,
    /// Discard all in-flight state
    Reset,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => write!(f, "OP_DATA"),
            Self::Eot => write!(f, "OP_EOT"),
            Self::Flush => write!(f, "OP_FLUSH"),
            Self::Reset => write!(f, "OP_RESET"),
        }
    }
}

/// Response of a datapath stage
///
/// Responses are ordered by severity. The helper fns are simple threshold
/// comparisons on that ordering.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Resp {
    /// Continue processing
    #[default]
    Cont = 0,
    /// Continue, a warning was logged
    WarnCont,
    /// Continue, an error was logged
    ErrCont,
    /// Stop and wait for a [`Op::Flush`] or further data
    Wait,
    /// Wait, a warning was logged
    WarnWait,
    /// Wait, an error was logged
    ErrWait,
    /// The stage is not initialised
    FatalNotInit,
    /// The operation is not valid for this stage
    FatalInvalidOp,
    /// A parameter of the operation is invalid
    FatalInvalidParam,
    /// The data cannot be processed
    FatalInvalidData,
    /// Internal failure
    FatalSysErr,
}

impl Resp {
    /// Check whether processing may continue
    pub fn is_cont(self) -> bool {
        self < Self::Wait
    }

    /// Check whether the caller needs to wait before pushing more data
    pub fn is_wait(self) -> bool {
        (Self::Wait..Self::FatalNotInit).contains(&self)
    }

    /// Check whether the pipeline needs a [`Op::Reset`]
    pub fn is_fatal(self) -> bool {
        self >= Self::FatalNotInit
    }

    /// Check whether the response carries a warning
    pub fn is_warn(self) -> bool {
        matches!(self, Self::WarnCont | Self::WarnWait)
    }

    /// Check whether the response carries a non-fatal error
    pub fn is_err(self) -> bool {
        matches!(self, Self::ErrCont | Self::ErrWait)
    }

    /// Collate with another response, keeping the more severe one
    pub fn collate(self, other: Self) -> Self {
        self.max(other)
    }
}

impl fmt::Display for Resp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cont => "RESP_CONT",
            Self::WarnCont => "RESP_WARN_CONT",
            Self::ErrCont => "RESP_ERR_CONT",
            Self::Wait => "RESP_WAIT",
            Self::WarnWait => "RESP_WARN_WAIT",
            Self::ErrWait => "RESP_ERR_WAIT",
            Self::FatalNotInit => "RESP_FATAL_NOT_INIT",
            Self::FatalInvalidOp => "RESP_FATAL_INVALID_OP",
            Self::FatalInvalidParam => "RESP_FATAL_INVALID_PARAM",
            Self::FatalInvalidData => "RESP_FATAL_INVALID_DATA",
            Self::FatalSysErr => "RESP_FATAL_SYS_ERR",
        };
        f.write_str(s)
    }
}

/// Consumer of a raw byte stream
///
/// For [`Op::Data`], the consumer returns the number of bytes it processed.
/// All other operations carry no data and the byte count is ignored.
pub trait TraceDataIn {
    /// Push an operation and, for [`Op::Data`], a block of bytes
    fn trace_data_in(&mut self, op: Op, index: u64, data: &[u8]) -> (usize, Resp);
}

impl<T: TraceDataIn + ?Sized> TraceDataIn for &mut T {
    fn trace_data_in(&mut self, op: Op, index: u64, data: &[u8]) -> (usize, Resp) {
        T::trace_data_in(self, op, index, data)
    }
}

impl<T: TraceDataIn + ?Sized> TraceDataIn for alloc::boxed::Box<T> {
    fn trace_data_in(&mut self, op: Op, index: u64, data: &[u8]) -> (usize, Resp) {
        T::trace_data_in(self.as_mut(), op, index, data)
    }
}

/// Consumer of decoded protocol packets
///
/// Only [`Op::Data`] carries a packet.
pub trait PacketSink<P> {
    /// Push an operation and, for [`Op::Data`], the packet found at `index`
    fn packet_in(&mut self, op: Op, index: u64, packet: Option<&P>) -> Resp;
}

impl<P, T: PacketSink<P> + ?Sized> PacketSink<P> for &mut T {
    fn packet_in(&mut self, op: Op, index: u64, packet: Option<&P>) -> Resp {
        T::packet_in(self, op, index, packet)
    }
}

impl<P, T: PacketSink<P> + ?Sized> PacketSink<P> for alloc::boxed::Box<T> {
    fn packet_in(&mut self, op: Op, index: u64, packet: Option<&P>) -> Resp {
        T::packet_in(self.as_mut(), op, index, packet)
    }
}

/// Collects the packets of all [`Op::Data`] operations
impl<P: Clone> PacketSink<P> for Vec<(u64, P)> {
    fn packet_in(&mut self, _: Op, index: u64, packet: Option<&P>) -> Resp {
        if let Some(packet) = packet {
            self.push((index, packet.clone()));
        }
        Resp::Cont
    }
}

/// Consumer of generic trace elements
pub trait ElementSink {
    /// Accept an element produced from the packet at `index` on channel `chan_id`
    fn element_in(&mut self, index: u64, chan_id: u8, element: &TraceElement) -> Resp;
}

impl<T: ElementSink + ?Sized> ElementSink for &mut T {
    fn element_in(&mut self, index: u64, chan_id: u8, element: &TraceElement) -> Resp {
        T::element_in(self, index, chan_id, element)
    }
}

impl<T: ElementSink + ?Sized> ElementSink for alloc::boxed::Box<T> {
    fn element_in(&mut self, index: u64, chan_id: u8, element: &TraceElement) -> Resp {
        T::element_in(self.as_mut(), index, chan_id, element)
    }
}

impl ElementSink for Vec<TraceElement> {
    fn element_in(&mut self, _: u64, _: u8, element: &TraceElement) -> Resp {
        self.push(element.clone());
        Resp::Cont
    }
}

/// [`ElementSink`] adapter for an [`FnMut`]
#[derive(Copy, Clone, Default, Debug)]
pub struct Func<F> {
    func: F,
}

impl<F: FnMut(u64, u8, &TraceElement) -> Resp> ElementSink for Func<F> {
    fn element_in(&mut self, index: u64, chan_id: u8, element: &TraceElement) -> Resp {
        (self.func)(index, chan_id, element)
    }
}

/// Create an [`ElementSink`] from an [`FnMut`]
pub fn from_fn<F: FnMut(u64, u8, &TraceElement) -> Resp>(func: F) -> Func<F> {
    Func { func }
}

/// Kind of data reported to a [`RawFrameSink`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RawFrameElem {
    /// No data, used for non-data operations
    None,
    /// Packed frame data as found in the input
    Packed,
    /// Half frame sync
    Hsync,
    /// Frame sync
    Fsync,
    /// Unpacked data for a single trace ID
    IdData,
}

/// Monitor for raw frame data passing through a deformatter
pub trait RawFrameSink {
    /// Observe a chunk of raw data
    fn raw_frame(&mut self, op: Op, index: u64, kind: RawFrameElem, data: &[u8], trace_id: u8);
}

impl<T: RawFrameSink + ?Sized> RawFrameSink for alloc::boxed::Box<T> {
    fn raw_frame(&mut self, op: Op, index: u64, kind: RawFrameElem, data: &[u8], trace_id: u8) {
        T::raw_frame(self.as_mut(), op, index, kind, data, trace_id)
    }
}

/// Monitor for packets leaving a packet processor, including their raw bytes
pub trait PacketMonitor<P> {
    /// Observe a packet and the bytes it was decoded from
    fn raw_packet(&mut self, op: Op, index: u64, packet: Option<&P>, bytes: &[u8]);
}

impl<P, T: PacketMonitor<P> + ?Sized> PacketMonitor<P> for alloc::boxed::Box<T> {
    fn raw_packet(&mut self, op: Op, index: u64, packet: Option<&P>, bytes: &[u8]) {
        T::raw_packet(self.as_mut(), op, index, packet, bytes)
    }
}
