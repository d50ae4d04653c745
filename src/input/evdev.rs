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

//! Keystroke source reading the kernel's input devices directly, so key events are seen
//! regardless of which window has focus.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use evdev::{BusType, InputEventKind, Key};
use parking_lot::Mutex;
use tracing::{debug, error, info, span, warn, Level};

use super::{InstallError, KeyHandler, KeySource};
use crate::keys::{KeyAction, KeyEvent, KeyId};

/// evdev key values.
const KEY_RELEASED: i32 = 0;
const KEY_PRESSED: i32 = 1;
const KEY_REPEATED: i32 = 2;

/// What one reader thread delivers to. Each install hands its readers a fresh `active` flag,
/// so readers left over from an earlier install stay silent after a reinstall.
struct Delivery {
    handler: Arc<dyn KeyHandler>,
    active: Arc<AtomicBool>,
    injected: bool,
}

impl Delivery {
    /// Forwards a raw key event. Returns false once this delivery has been retired.
    fn deliver(&self, code: u16, value: i32) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        let action = match value {
            KEY_PRESSED | KEY_REPEATED => KeyAction::Down,
            KEY_RELEASED => KeyAction::Up,
            _ => return true,
        };
        self.handler.on_key_event(KeyEvent {
            key: KeyId(code),
            action,
            injected: self.injected,
            timestamp: Instant::now(),
        });
        true
    }
}

/// Reads every keyboard under /dev/input on its own thread.
pub struct Source {
    /// The flag shared by the current install's readers, if installed.
    active: Mutex<Option<Arc<AtomicBool>>>,
}

impl Source {
    pub fn new() -> Source {
        Source {
            active: Mutex::new(None),
        }
    }

    fn read_device(path: PathBuf, mut device: evdev::Device, delivery: Delivery) {
        let name = device.name().unwrap_or("unnamed").to_string();
        let span = span!(Level::INFO, "evdev reader", device = %name);
        let _enter = span.enter();

        info!(path = ?path, injected = delivery.injected, "Reading keyboard");

        'read: while delivery.active.load(Ordering::Acquire) {
            let events = match device.fetch_events() {
                Ok(events) => events,
                Err(e) => {
                    error!(path = ?path, err = %e, "Keyboard read failed, dropping device");
                    return;
                }
            };

            for event in events {
                let InputEventKind::Key(key) = event.kind() else {
                    continue;
                };
                if !delivery.deliver(key.code(), event.value()) {
                    break 'read;
                }
            }
        }
        debug!("Keyboard reader stopped");
    }
}

impl Default for Source {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySource for Source {
    fn install(&self, handler: Arc<dyn KeyHandler>) -> Result<(), InstallError> {
        let mut current = self.active.lock();
        if current.is_some() {
            return Err(InstallError::AlreadyInstalled);
        }

        let keyboards: Vec<(PathBuf, evdev::Device)> = evdev::enumerate()
            .filter(|(_, device)| {
                device
                    .supported_keys()
                    .is_some_and(|keys| keys.contains(Key::KEY_A) && keys.contains(Key::KEY_SPACE))
            })
            .collect();

        if keyboards.is_empty() {
            return Err(InstallError::NoDevices);
        }

        let active = Arc::new(AtomicBool::new(true));
        let mut started = 0;
        for (path, device) in keyboards {
            let delivery = Delivery {
                handler: handler.clone(),
                active: active.clone(),
                // Events from uinput devices were written by software, not typed.
                injected: device.input_id().bus_type() == BusType::BUS_VIRTUAL,
            };
            let reader = thread::Builder::new()
                .name("keyclack-evdev".to_string())
                .spawn(move || Source::read_device(path, device, delivery));
            match reader {
                Ok(_) => started += 1,
                Err(e) => {
                    warn!(err = %e, "Unable to start keyboard reader");
                    if started == 0 {
                        active.store(false, Ordering::Release);
                        return Err(e.into());
                    }
                }
            }
        }

        *current = Some(active);
        info!(keyboards = started, "Keystroke source installed");
        Ok(())
    }

    fn uninstall(&self) {
        let Some(active) = self.active.lock().take() else {
            return;
        };
        // Readers are blocked in read(2) and can't be joined. Once retired they deliver
        // nothing and exit after their next event.
        active.store(false, Ordering::Release);
        info!("Keystroke source uninstalled");
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evdev")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<KeyEvent>>,
    }

    impl KeyHandler for Recorder {
        fn on_key_event(&self, event: KeyEvent) {
            self.events.lock().push(event);
        }
    }

    fn delivery(handler: &Arc<Recorder>, active: &Arc<AtomicBool>) -> Delivery {
        Delivery {
            handler: handler.clone(),
            active: active.clone(),
            injected: false,
        }
    }

    #[test]
    fn test_key_values() {
        let recorder = Arc::new(Recorder::default());
        let active = Arc::new(AtomicBool::new(true));
        let delivery = delivery(&recorder, &active);

        assert!(delivery.deliver(30, KEY_PRESSED));
        assert!(delivery.deliver(30, KEY_REPEATED));
        assert!(delivery.deliver(30, KEY_RELEASED));
        assert!(delivery.deliver(30, 7));

        let actions: Vec<KeyAction> = recorder.events.lock().iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![KeyAction::Down, KeyAction::Down, KeyAction::Up]);
    }

    #[test]
    fn test_retired_reader_delivers_nothing_after_reinstall() {
        let recorder = Arc::new(Recorder::default());
        let first = Arc::new(AtomicBool::new(true));
        let old_reader = delivery(&recorder, &first);

        // Uninstall, then install again with a new flag.
        first.store(false, Ordering::Release);
        let second = Arc::new(AtomicBool::new(true));
        let new_reader = delivery(&recorder, &second);

        // Both readers see the same physical release.
        assert!(!old_reader.deliver(30, KEY_RELEASED));
        assert!(new_reader.deliver(30, KEY_RELEASED));
        assert_eq!(recorder.events.lock().len(), 1);
    }
}
