// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;
use std::io;
use std::sync::Arc;

use crate::keys::KeyEvent;

mod classifier;
#[cfg(target_os = "linux")]
pub mod evdev;
pub mod mock;

pub use classifier::{
    DropReason, InputClassifier, Verdict, DEFAULT_RELEASE_GUARD, DEFAULT_REPEAT_INTERVAL,
};

/// Receives raw key events from a keystroke source. Called on the source's thread, which sits
/// on the critical path of input delivery, so implementations must return quickly.
pub trait KeyHandler: Send + Sync + 'static {
    fn on_key_event(&self, event: KeyEvent);
}

/// A system-wide source of key events.
pub trait KeySource: fmt::Display + Send + Sync + 'static {
    /// Starts delivering events to the given handler.
    fn install(&self, handler: Arc<dyn KeyHandler>) -> Result<(), InstallError>;

    /// Stops delivering events. Uninstalling a source that isn't installed does nothing.
    fn uninstall(&self);
}

/// Failures to hook into the keystroke source. Without the hook there is nothing to do, so
/// these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("no readable keyboard devices found (check permissions on /dev/input)")]
    NoDevices,

    #[error("keystroke source is already installed")]
    AlreadyInstalled,

    #[error("keystroke capture is not supported on this platform")]
    Unsupported,

    #[error("unable to start keystroke reader: {0}")]
    Io(#[from] io::Error),

    #[error("keystroke source rejected the handler: {0}")]
    Rejected(String),
}

/// Gets the keystroke source with the given name. Names starting with "mock" produce a source
/// that only delivers events sent to it directly.
pub fn get_source(name: &str) -> Result<Arc<dyn KeySource>, InstallError> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Source::get(name)));
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(evdev::Source::new()))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(InstallError::Unsupported)
    }
}
