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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use super::{InstallError, KeyHandler, KeySource};
use crate::keys::KeyEvent;

/// A mock keystroke source. Delivers events sent to it directly on the caller's thread.
pub struct Source {
    name: String,
    handler: RwLock<Option<Arc<dyn KeyHandler>>>,
    fail_install: AtomicBool,
}

impl Source {
    /// Gets the given mock source.
    pub fn get(name: &str) -> Source {
        Source {
            name: name.to_string(),
            handler: RwLock::new(None),
            fail_install: AtomicBool::new(false),
        }
    }

    /// Makes subsequent installs fail.
    pub fn fail_install(&self) {
        self.fail_install.store(true, Ordering::Relaxed);
    }

    /// Returns true if a handler is installed.
    pub fn is_installed(&self) -> bool {
        self.handler.read().is_some()
    }

    /// Delivers an event to the installed handler. Returns false if nothing is installed.
    pub fn send(&self, event: KeyEvent) -> bool {
        match self.handler.read().as_ref() {
            Some(handler) => {
                handler.on_key_event(event);
                true
            }
            None => {
                debug!(key = %event.key, "No handler installed, dropping event");
                false
            }
        }
    }
}

impl KeySource for Source {
    fn install(&self, handler: Arc<dyn KeyHandler>) -> Result<(), InstallError> {
        if self.fail_install.load(Ordering::Relaxed) {
            return Err(InstallError::Rejected(format!(
                "{} is set to fail",
                self.name
            )));
        }

        let mut installed = self.handler.write();
        if installed.is_some() {
            return Err(InstallError::AlreadyInstalled);
        }
        *installed = Some(handler);
        info!(source = %self.name, "Keystroke source installed (mock)");
        Ok(())
    }

    fn uninstall(&self) {
        if self.handler.write().take().is_some() {
            info!(source = %self.name, "Keystroke source uninstalled (mock)");
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use parking_lot::Mutex;

    use super::*;
    use crate::keys::KeyId;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<KeyId>>,
    }

    impl KeyHandler for Recorder {
        fn on_key_event(&self, event: KeyEvent) {
            self.events.lock().push(event.key);
        }
    }

    #[test]
    fn test_delivers_only_while_installed() {
        let source = Source::get("mock");
        let recorder = Arc::new(Recorder::default());

        assert!(!source.send(KeyEvent::down(KeyId::A, Instant::now())));
        source.install(recorder.clone()).unwrap();
        assert!(matches!(
            source.install(recorder.clone()),
            Err(InstallError::AlreadyInstalled)
        ));
        assert!(source.send(KeyEvent::down(KeyId::B, Instant::now())));
        source.uninstall();
        assert!(!source.send(KeyEvent::down(KeyId::C, Instant::now())));

        assert_eq!(*recorder.events.lock(), vec![KeyId::B]);
    }

    #[test]
    fn test_fail_install() {
        let source = Source::get("mock");
        source.fail_install();
        assert!(source.install(Arc::new(Recorder::default())).is_err());
        assert!(!source.is_installed());
    }
}
