// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Error codes, error objects and error logging
//!
//! Errors are identified by a stable numeric [`ErrorCode`]. Components report
//! errors in the form of an [`Error`], which adds a [`Severity`], the trace
//! index and CoreSight trace ID the error relates to, and an optional message.
//! Reported errors are emitted as [`tracing`] events and forwarded to an
//! [`ErrorLog`] attached to the reporting component.

use core::fmt;

use alloc::string::String;

#[cfg(test)]
mod tests;

macro_rules! error_codes {
    ($($v:ident = $n:literal, $name:literal, $desc:literal;)*) => {
        /// Library error codes
        ///
        /// The numeric values are stable and may be exchanged with external
        /// tooling.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u32)]
        pub enum ErrorCode {
            $(
                #[doc = $desc]
                $v = $n,
            )*
        }

        impl ErrorCode {
            /// All codes, ordered by their numeric value
            pub const ALL: &[Self] = &[$(Self::$v,)*];

            /// Retrieve the short name of this code
            pub fn name(self) -> &'static str {
                DESCRIPTIONS[self as usize].0
            }

            /// Retrieve the human readable description of this code
            pub fn description(self) -> &'static str {
                DESCRIPTIONS[self as usize].1
            }
        }

        /// Name and description of every [`ErrorCode`], indexed by value
        static DESCRIPTIONS: &[(&str, &str)] = &[$(($name, $desc),)*];
    };
}

error_codes! {
    Ok = 0, "OK", "No Error.";
    Fail = 1, "ERR_FAIL", "General failure.";
    Mem = 2, "ERR_MEM", "Internal memory allocation error.";
    NotInit = 3, "ERR_NOT_INIT", "Component not initialised.";
    InvalidId = 4, "ERR_INVALID_ID", "Invalid CoreSight Trace Source ID.";
    BadHandle = 5, "ERR_BAD_HANDLE", "Invalid handle passed to component.";
    InvalidParamVal = 6, "ERR_INVALID_PARAM_VAL", "Invalid value parameter passed to component.";
    InvalidParamType = 7, "ERR_INVALID_PARAM_TYPE", "Type mismatch on abstract interface.";
    FileError = 8, "ERR_FILE_ERROR", "File access error.";
    NoProtocol = 9, "ERR_NO_PROTOCOL", "Trace protocol unsupported.";
    AttachTooMany = 10, "ERR_ATTACH_TOO_MANY", "Cannot attach - attach device limit reached.";
    AttachInvalidParam = 11, "ERR_ATTACH_INVALID_PARAM", "Cannot attach - invalid parameter.";
    AttachCompNotFound = 12, "ERR_ATTACH_COMP_NOT_FOUND", "Cannot detach - component not found.";
    RdrFileNotFound = 13, "ERR_RDR_FILE_NOT_FOUND", "Source reader - file not found.";
    RdrInvalidInit = 14, "ERR_RDR_INVALID_INIT", "Source reader - invalid initialisation parameter.";
    RdrNoDecoder = 15, "ERR_RDR_NO_DECODER", "Source reader - no trace decoder set.";
    DataDecodeFatal = 16, "ERR_DATA_DECODE_FATAL", "A decoder in the data path has returned a fatal error.";
    DfrmtrNotContTrace = 17, "ERR_DFMTR_NOTCONTTRACE", "Trace input to deformatter none-continuous.";
    DfrmtrBadFhsync = 18, "ERR_DFMTR_BAD_FHSYNC", "Bad frame or half frame sync in trace deformatter.";
    BadPacketSeq = 19, "ERR_BAD_PACKET_SEQ", "Bad packet sequence.";
    InvalidPcktHdr = 20, "ERR_INVALID_PCKT_HDR", "Invalid packet header.";
    PktInterpFail = 21, "ERR_PKT_INTERP_FAIL", "Interpreter failed - cannot recover - bad data or sequence.";
    UnsupportedIsa = 22, "ERR_UNSUPPORTED_ISA", "ISA not supported in decoder.";
    HwCfgUnsupp = 23, "ERR_HW_CFG_UNSUPP", "Programmed trace configuration not supported by decoder.";
    UnsuppDecodePkt = 24, "ERR_UNSUPP_DECODE_PKT", "Packet not supported in decoder.";
    BadDecodePkt = 25, "ERR_BAD_DECODE_PKT", "Reserved or unknown packet in decoder.";
    CommitPktOverrun = 26, "ERR_COMMIT_PKT_OVERRUN", "Overrun in commit packet stack - tried to commit more than available.";
    MemNacc = 27, "ERR_MEM_NACC", "Unable to access required memory address.";
    RetStackOverflow = 28, "ERR_RET_STACK_OVERFLOW", "Internal return stack overflow checks failed - popped more than we pushed.";
    DcdtNoFormatter = 29, "ERR_DCDT_NO_FORMATTER", "No formatter in use - operation not valid.";
    MemAccOverlap = 30, "ERR_MEM_ACC_OVERLAP", "Attempted to set an overlapping range in memory access map.";
    MemAccFileNotFound = 31, "ERR_MEM_ACC_FILE_NOT_FOUND", "Memory access file could not be opened.";
    MemAccFileDiffRange = 32, "ERR_MEM_ACC_FILE_DIFF_RANGE", "Attempt to re-use the same memory access file for a different address range.";
    MemAccRangeInvalid = 33, "ERR_MEM_ACC_RANGE_INVALID", "Address range in accessor set to invalid values.";
    MemAccBadLen = 34, "ERR_MEM_ACC_BAD_LEN", "Memory accessor returned a bad read length value (larger than requested).";
    TestSnapshotParse = 35, "ERR_TEST_SNAPSHOT_PARSE", "Test snapshot file parse error.";
    TestSnapshotParseInfo = 36, "ERR_TEST_SNAPSHOT_PARSE_INFO", "Test snapshot file parse information.";
    TestSnapshotRead = 37, "ERR_TEST_SNAPSHOT_READ", "Test snapshot reader error.";
    TestSsToDecoder = 38, "ERR_TEST_SS_TO_DECODER", "Test snapshot to decode tree conversion error.";
    DcdregNameRepeat = 39, "ERR_DCDREG_NAME_REPEAT", "Attempted to register a decoder with the same name as another one.";
    DcdregNameUnknown = 40, "ERR_DCDREG_NAME_UNKNOWN", "Attempted to find a decoder with a name that is not known in the library.";
    DcdregTypeUnknown = 41, "ERR_DCDREG_TYPE_UNKNOWN", "Attempted to find a decoder with a type that is not known in the library.";
    DcdregTooMany = 42, "ERR_DCDREG_TOOMANY", "Attempted to register too many custom decoders.";
    DcdInterfaceUnused = 43, "ERR_DCD_INTERFACE_UNUSED", "Attempt to connect or use an interface not supported by this decoder.";
    InvalidOpcode = 44, "ERR_INVALID_OPCODE", "Illegal opcode found while decoding program memory.";
    IRangeLimitOverrun = 45, "ERR_I_RANGE_LIMIT_OVERRUN", "An optional limit on consecutive instructions in range during decode has been exceeded.";
    BadDecodeImage = 46, "ERR_BAD_DECODE_IMAGE", "Mismatch between trace packets and decode image.";
    Last = 47, "ERR_LAST", "No error - error code end marker.";
}

impl TryFrom<u32> for ErrorCode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|v| Self::ALL.get(v))
            .copied()
            .ok_or(value)
    }
}

impl From<ErrorCode> for u32 {
    fn from(code: ErrorCode) -> Self {
        code as u32
    }
}

impl core::error::Error for ErrorCode {}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Severity of an error and verbosity of an error logger
///
/// A logger with a given verbosity accepts all messages of equal or lower
/// (more severe) [`Severity`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// No severity, never logged
    None,
    /// An error
    #[default]
    Error,
    /// A warning
    Warn,
    /// Some information
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Error => write!(f, "ERROR"),
            Self::Warn => write!(f, "WARN"),
            Self::Info => write!(f, "INFO"),
        }
    }
}

/// An error reported by a component
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    code: ErrorCode,
    severity: Severity,
    index: Option<u64>,
    chan_id: Option<u8>,
    message: Option<String>,
}

impl Error {
    /// Create a new error of the given [`Severity`]
    pub fn new(severity: Severity, code: ErrorCode) -> Self {
        Self {
            code,
            severity,
            index: None,
            chan_id: None,
            message: None,
        }
    }

    /// Attach the trace index the error relates to
    pub fn with_index(self, index: u64) -> Self {
        Self {
            index: Some(index),
            ..self
        }
    }

    /// Attach the CoreSight trace ID of the channel the error relates to
    pub fn with_chan_id(self, chan_id: u8) -> Self {
        Self {
            chan_id: Some(chan_id),
            ..self
        }
    }

    /// Attach a message
    pub fn with_message(self, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..self
        }
    }

    /// Retrieve the [`ErrorCode`]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Retrieve the [`Severity`]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Retrieve the trace index, if known
    pub fn index(&self) -> Option<u64> {
        self.index
    }

    /// Retrieve the trace ID, if known
    pub fn chan_id(&self) -> Option<u8> {
        self.chan_id
    }

    /// Retrieve the message, if any
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Self::new(Severity::Error, code)
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        Some(&self.code)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:#06x} ({}) [{}]",
            self.severity,
            self.code as u32,
            self.code.name(),
            self.code.description(),
        )?;
        if let Some(index) = self.index {
            write!(f, "; TrcIdx={index}")?;
        }
        if let Some(id) = self.chan_id {
            write!(f, "; CS ID={id:02x}")?;
        }
        if let Some(msg) = &self.message {
            write!(f, "; {msg}")?;
        }
        Ok(())
    }
}

/// Sink for errors and messages reported by components
pub trait ErrorLog {
    /// Log an [`Error`] reported by the component named `component`
    fn log_error(&mut self, component: &str, error: &Error);

    /// Log a plain message
    fn log_message(&mut self, component: &str, severity: Severity, message: &str);
}

impl<T: ErrorLog + ?Sized> ErrorLog for alloc::boxed::Box<T> {
    fn log_error(&mut self, component: &str, error: &Error) {
        T::log_error(self.as_mut(), component, error)
    }

    fn log_message(&mut self, component: &str, severity: Severity, message: &str) {
        T::log_message(self.as_mut(), component, severity, message)
    }
}

/// [`ErrorLog`] emitting [`tracing`] events
///
/// The logger remembers the last [`Error`] it received.
#[derive(Clone, Debug, Default)]
pub struct TracingLog {
    last: Option<Error>,
}

impl TracingLog {
    /// Create a new logger
    pub fn new() -> Self {
        Default::default()
    }

    /// Retrieve the last [`Error`] logged
    pub fn last_error(&self) -> Option<&Error> {
        self.last.as_ref()
    }
}

impl ErrorLog for TracingLog {
    fn log_error(&mut self, component: &str, error: &Error) {
        emit_error(component, error);
        self.last = Some(error.clone());
    }

    fn log_message(&mut self, component: &str, severity: Severity, message: &str) {
        emit_message(component, severity, message);
    }
}

/// Emit a [`tracing`] event for an [`Error`]
pub(crate) fn emit_error(component: &str, error: &Error) {
    let code = error.code() as u32;
    match error.severity() {
        Severity::None => (),
        Severity::Error => tracing::error!(component, code, index = ?error.index(), chan_id = ?error.chan_id(), "{error}"),
        Severity::Warn => tracing::warn!(component, code, index = ?error.index(), chan_id = ?error.chan_id(), "{error}"),
        Severity::Info => tracing::info!(component, code, index = ?error.index(), chan_id = ?error.chan_id(), "{error}"),
    }
}

/// Emit a [`tracing`] event for a plain message
pub(crate) fn emit_message(component: &str, severity: Severity, message: &str) {
    match severity {
        Severity::None => (),
        Severity::Error => tracing::error!(component, "{message}"),
        Severity::Warn => tracing::warn!(component, "{message}"),
        Severity::Info => tracing::info!(component, "{message}"),
    }
}
