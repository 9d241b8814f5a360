// Copyright (C) 2025 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Single slot attachment points for pluggable collaborators

use core::fmt;

use alloc::boxed::Box;

use crate::error::ErrorCode;

#[cfg(test)]
mod tests;

/// Notifier called with the number of attached collaborators after a change
pub type Notifier = Box<dyn FnMut(usize)>;

/// Attachment point holding at most one collaborator of type `T`
///
/// An attachment point may be disabled, which hides the collaborator from
/// [`first`][Self::first] and [`first_mut`][Self::first_mut] without
/// detaching it.
pub struct AttachPoint<T> {
    comp: Option<T>,
    enabled: bool,
    notifier: Option<Notifier>,
}

impl<T> AttachPoint<T> {
    /// Create a new, empty and enabled attachment point
    pub fn new() -> Self {
        Self {
            comp: None,
            enabled: true,
            notifier: None,
        }
    }

    /// Attach a collaborator
    ///
    /// Fails with [`ErrorCode::AttachTooMany`] if the point is occupied, in
    /// which case the collaborator is dropped.
    pub fn attach(&mut self, comp: T) -> Result<(), ErrorCode> {
        if self.comp.is_some() {
            return Err(ErrorCode::AttachTooMany);
        }
        self.comp = Some(comp);
        self.notify();
        Ok(())
    }

    /// Detach and return the current collaborator
    ///
    /// Fails with [`ErrorCode::AttachCompNotFound`] if the point is empty.
    pub fn detach(&mut self) -> Result<T, ErrorCode> {
        let comp = self.comp.take().ok_or(ErrorCode::AttachCompNotFound)?;
        self.notify();
        Ok(comp)
    }

    /// Replace the current collaborator, if any, returning the old one
    pub fn replace_first(&mut self, comp: T) -> Option<T> {
        let old = self.comp.replace(comp);
        self.notify();
        old
    }

    /// Detach the collaborator if there is one
    pub fn detach_all(&mut self) {
        if self.comp.take().is_some() {
            self.notify();
        }
    }

    /// Retrieve the collaborator if attached and enabled
    pub fn first(&self) -> Option<&T> {
        self.comp.as_ref().filter(|_| self.enabled)
    }

    /// Retrieve the collaborator mutably if attached and enabled
    pub fn first_mut(&mut self) -> Option<&mut T> {
        if self.enabled { self.comp.as_mut() } else { None }
    }

    /// Check whether the point is enabled
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the point
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Check whether a collaborator is attached
    pub fn has_attached(&self) -> bool {
        self.comp.is_some()
    }

    /// Check whether a collaborator is attached and the point is enabled
    pub fn has_attached_and_enabled(&self) -> bool {
        self.enabled && self.has_attached()
    }

    /// Number of attached collaborators, either `0` or `1`
    pub fn num_attached(&self) -> usize {
        self.comp.is_some().into()
    }

    /// Set a [`Notifier`] to call on every attach and detach
    pub fn set_notifier(&mut self, notifier: Option<Notifier>) {
        self.notifier = notifier;
    }

    fn notify(&mut self) {
        let num = self.num_attached();
        if let Some(notifier) = self.notifier.as_mut() {
            notifier(num)
        }
    }
}

impl<T> Default for AttachPoint<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<T> for AttachPoint<T> {
    fn from(comp: T) -> Self {
        Self {
            comp: Some(comp),
            ..Self::new()
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for AttachPoint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachPoint")
            .field("comp", &self.comp)
            .field("enabled", &self.enabled)
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}
