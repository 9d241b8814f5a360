// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Common base of all decode components

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;

use crate::attach::AttachPoint;
use crate::error::{self, Error, ErrorCode, ErrorLog, Severity};

#[cfg(test)]
mod tests;

/// Name, operation mode and error logging shared by all components
pub struct Component {
    name: String,
    op_flags: u32,
    supported_op_flags: u32,
    logger: AttachPoint<Box<dyn ErrorLog>>,
    verbosity: Severity,
}

impl Component {
    /// Create a new component
    ///
    /// The component's name will be `prefix` followed by the instance number,
    /// if any. Only the `supported_op_flags` may be set via
    /// [`set_op_mode`][Self::set_op_mode].
    pub fn new(prefix: &str, instance: Option<usize>, supported_op_flags: u32) -> Self {
        let name = match instance {
            Some(n) => format!("{prefix}_{n}"),
            None => prefix.into(),
        };
        Self {
            name,
            op_flags: 0,
            supported_op_flags,
            logger: Default::default(),
            verbosity: Severity::Error,
        }
    }

    /// Retrieve the component's name
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Set the operation mode flags
    ///
    /// Fails with [`ErrorCode::InvalidParamVal`] if any flag is not supported.
    pub fn set_op_mode(&mut self, flags: u32) -> Result<(), ErrorCode> {
        if flags & !self.supported_op_flags != 0 {
            return Err(ErrorCode::InvalidParamVal);
        }
        self.op_flags = flags;
        Ok(())
    }

    /// Retrieve the current operation mode flags
    pub fn op_mode(&self) -> u32 {
        self.op_flags
    }

    /// Check whether all of the given operation mode flags are set
    pub fn has_op_flags(&self, flags: u32) -> bool {
        self.op_flags & flags == flags
    }

    /// Retrieve the supported operation mode flags
    pub fn supported_op_modes(&self) -> u32 {
        self.supported_op_flags
    }

    /// Retrieve the attachment point for an [`ErrorLog`]
    pub fn error_logger(&mut self) -> &mut AttachPoint<Box<dyn ErrorLog>> {
        &mut self.logger
    }

    /// Retrieve the logging verbosity
    pub fn verbosity(&self) -> Severity {
        self.verbosity
    }

    /// Set the logging verbosity
    pub fn set_verbosity(&mut self, level: Severity) {
        self.verbosity = level;
    }

    /// Check whether messages of the given [`Severity`] would be forwarded
    pub fn is_logging(&self, level: Severity) -> bool {
        level != Severity::None && level <= self.verbosity
    }

    /// Report an [`Error`]
    pub fn log_error(&mut self, error: &Error) {
        error::emit_error(&self.name, error);
        if self.is_logging(error.severity()) {
            if let Some(logger) = self.logger.first_mut() {
                logger.log_error(&self.name, error);
            }
        }
    }

    /// Report a plain message
    pub fn log_message(&mut self, severity: Severity, message: &str) {
        error::emit_message(&self.name, severity, message);
        if self.is_logging(severity) {
            if let Some(logger) = self.logger.first_mut() {
                logger.log_message(&self.name, severity, message);
            }
        }
    }
}

impl core::fmt::Debug for Component {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("op_flags", &self.op_flags)
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}
