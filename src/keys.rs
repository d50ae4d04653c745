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

//! Key identities and the raw events delivered by keystroke sources.

use std::fmt;
use std::time::Instant;

/// A stable identifier for a physical key. Values follow the Linux input event
/// codes so that the evdev source can pass them through untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(pub u16);

impl KeyId {
    pub const ESC: KeyId = KeyId(1);
    pub const BACKSPACE: KeyId = KeyId(14);
    pub const TAB: KeyId = KeyId(15);
    pub const ENTER: KeyId = KeyId(28);
    pub const LEFT_CTRL: KeyId = KeyId(29);
    pub const LEFT_SHIFT: KeyId = KeyId(42);
    pub const RIGHT_SHIFT: KeyId = KeyId(54);
    pub const LEFT_ALT: KeyId = KeyId(56);
    pub const SPACE: KeyId = KeyId(57);
    pub const CAPS_LOCK: KeyId = KeyId(58);
    pub const RIGHT_CTRL: KeyId = KeyId(97);
    pub const RIGHT_ALT: KeyId = KeyId(100);

    pub const A: KeyId = KeyId(30);
    pub const B: KeyId = KeyId(48);
    pub const C: KeyId = KeyId(46);

    /// Returns the code of this key.
    pub fn code(&self) -> u16 {
        self.0
    }

    /// Returns true if this is either Alt key.
    pub fn is_alt(&self) -> bool {
        *self == KeyId::LEFT_ALT || *self == KeyId::RIGHT_ALT
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key#{}", self.0)
    }
}

/// Codes for the letter and digit rows.
const ALPHANUMERIC_CODES: [u16; 36] = [
    // 1-9, 0
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, //
    // Q-P
    16, 17, 18, 19, 20, 21, 22, 23, 24, 25, //
    // A-L
    30, 31, 32, 33, 34, 35, 36, 37, 38, //
    // Z-M
    44, 45, 46, 47, 48, 49, 50,
];

/// The keys that are eagerly warmed at the most aggressive optimization level:
/// all alphanumerics plus the common modifier and whitespace keys.
pub fn high_priority_keys() -> Vec<KeyId> {
    let mut keys: Vec<KeyId> = ALPHANUMERIC_CODES.iter().map(|code| KeyId(*code)).collect();
    keys.extend([
        KeyId::SPACE,
        KeyId::ENTER,
        KeyId::BACKSPACE,
        KeyId::TAB,
        KeyId::LEFT_SHIFT,
        KeyId::RIGHT_SHIFT,
        KeyId::LEFT_CTRL,
        KeyId::RIGHT_CTRL,
        KeyId::ESC,
        KeyId::CAPS_LOCK,
    ]);
    keys
}

/// Whether a key went down or came back up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

/// A raw key transition as reported by a keystroke source.
#[derive(Clone, Copy, Debug)]
pub struct KeyEvent {
    pub key: KeyId,
    pub action: KeyAction,
    /// True if the event was synthesized by software rather than hardware.
    pub injected: bool,
    pub timestamp: Instant,
}

impl KeyEvent {
    /// Creates a hardware key-down event.
    pub fn down(key: KeyId, timestamp: Instant) -> KeyEvent {
        KeyEvent {
            key,
            action: KeyAction::Down,
            injected: false,
            timestamp,
        }
    }

    /// Creates a hardware key-up event.
    pub fn up(key: KeyId, timestamp: Instant) -> KeyEvent {
        KeyEvent {
            key,
            action: KeyAction::Up,
            injected: false,
            timestamp,
        }
    }

    /// Marks this event as injected.
    pub fn injected(mut self) -> KeyEvent {
        self.injected = true;
        self
    }
}

/// Scheduling class for playback requests and live instances.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Priority {
    High,
    Low,
}

impl Priority {
    pub fn is_high(&self) -> bool {
        *self == Priority::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_priority_keys() {
        let keys = high_priority_keys();
        assert_eq!(keys.len(), 46);
        assert!(keys.contains(&KeyId::A));
        assert!(keys.contains(&KeyId::SPACE));
        assert!(keys.contains(&KeyId::CAPS_LOCK));
        assert!(!keys.contains(&KeyId::LEFT_ALT));
    }

    #[test]
    fn test_injected_builder() {
        let now = Instant::now();
        let event = KeyEvent::down(KeyId::B, now).injected();
        assert!(event.injected);
        assert_eq!(event.action, KeyAction::Down);
        assert!(!KeyEvent::up(KeyId::B, now).injected);
    }
}
