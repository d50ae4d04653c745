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

//! Filters raw key events down to one logical press and release per physical transition.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::keys::{KeyAction, KeyEvent, KeyId};

/// Minimum spacing between two played presses of the same key.
pub const DEFAULT_REPEAT_INTERVAL: Duration = Duration::from_millis(25);

/// Releases closer than this to their press don't get a sound.
pub const DEFAULT_RELEASE_GUARD: Duration = Duration::from_millis(20);

/// Why an event was discarded outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Synthesized by software.
    Injected,
    /// A press for a key that is already down, i.e. auto-repeat.
    Repeat,
}

/// The outcome of classifying a raw event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Dropped(DropReason),
    /// A real transition. `play` is false when the sound should be skipped to avoid clipping,
    /// though the transition still counts for prediction.
    Accepted {
        key: KeyId,
        action: KeyAction,
        play: bool,
    },
}

/// Per-key pressed state plus the time of each key's last accepted press.
#[derive(Debug)]
pub struct InputClassifier {
    pressed: HashSet<KeyId>,
    last_down: HashMap<KeyId, std::time::Instant>,
    repeat_interval: Duration,
    release_guard: Duration,
}

impl InputClassifier {
    pub fn new(repeat_interval: Duration, release_guard: Duration) -> InputClassifier {
        InputClassifier {
            pressed: HashSet::new(),
            last_down: HashMap::new(),
            repeat_interval,
            release_guard,
        }
    }

    /// Classifies a raw event, updating the pressed state.
    pub fn classify(&mut self, event: &KeyEvent) -> Verdict {
        if event.injected {
            return Verdict::Dropped(DropReason::Injected);
        }

        match event.action {
            KeyAction::Down => {
                if !self.pressed.insert(event.key) {
                    return Verdict::Dropped(DropReason::Repeat);
                }

                let play = match self.last_down.get(&event.key) {
                    Some(last) => {
                        event.timestamp.saturating_duration_since(*last) >= self.repeat_interval
                    }
                    None => true,
                };
                self.last_down.insert(event.key, event.timestamp);

                Verdict::Accepted {
                    key: event.key,
                    action: KeyAction::Down,
                    play,
                }
            }
            KeyAction::Up => {
                self.pressed.remove(&event.key);

                let play = match self.last_down.get(&event.key) {
                    Some(down) => {
                        event.timestamp.saturating_duration_since(*down) >= self.release_guard
                    }
                    None => true,
                };

                Verdict::Accepted {
                    key: event.key,
                    action: KeyAction::Up,
                    play,
                }
            }
        }
    }

    /// Returns true if the key is currently held.
    pub fn is_pressed(&self, key: KeyId) -> bool {
        self.pressed.contains(&key)
    }

    /// Forgets all pressed keys and timestamps.
    pub fn reset(&mut self) {
        self.pressed.clear();
        self.last_down.clear();
    }
}

impl Default for InputClassifier {
    fn default() -> Self {
        InputClassifier::new(DEFAULT_REPEAT_INTERVAL, DEFAULT_RELEASE_GUARD)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn ms(start: Instant, millis: u64) -> Instant {
        start + Duration::from_millis(millis)
    }

    fn accepted(key: KeyId, action: KeyAction, play: bool) -> Verdict {
        Verdict::Accepted { key, action, play }
    }

    #[test]
    fn test_repeat_suppressed_until_release() {
        let mut classifier = InputClassifier::default();
        let t0 = Instant::now();

        assert_eq!(
            classifier.classify(&KeyEvent::down(KeyId::A, t0)),
            accepted(KeyId::A, KeyAction::Down, true)
        );
        assert_eq!(
            classifier.classify(&KeyEvent::down(KeyId::A, ms(t0, 300))),
            Verdict::Dropped(DropReason::Repeat)
        );
        assert_eq!(
            classifier.classify(&KeyEvent::down(KeyId::A, ms(t0, 330))),
            Verdict::Dropped(DropReason::Repeat)
        );
        assert!(classifier.is_pressed(KeyId::A));

        assert_eq!(
            classifier.classify(&KeyEvent::up(KeyId::A, ms(t0, 400))),
            accepted(KeyId::A, KeyAction::Up, true)
        );
        assert!(!classifier.is_pressed(KeyId::A));
        assert_eq!(
            classifier.classify(&KeyEvent::down(KeyId::A, ms(t0, 500))),
            accepted(KeyId::A, KeyAction::Down, true)
        );
    }

    #[test]
    fn test_injected_events_leave_state_alone() {
        let mut classifier = InputClassifier::default();
        let t0 = Instant::now();

        assert_eq!(
            classifier.classify(&KeyEvent::down(KeyId::B, t0).injected()),
            Verdict::Dropped(DropReason::Injected)
        );
        assert!(!classifier.is_pressed(KeyId::B));
        assert_eq!(
            classifier.classify(&KeyEvent::down(KeyId::B, ms(t0, 1))),
            accepted(KeyId::B, KeyAction::Down, true)
        );

        // An injected release doesn't clear the real press.
        assert_eq!(
            classifier.classify(&KeyEvent::up(KeyId::B, ms(t0, 50)).injected()),
            Verdict::Dropped(DropReason::Injected)
        );
        assert!(classifier.is_pressed(KeyId::B));
    }

    #[test]
    fn test_fast_retap_not_played() {
        let mut classifier = InputClassifier::default();
        let t0 = Instant::now();

        classifier.classify(&KeyEvent::down(KeyId::A, t0));
        classifier.classify(&KeyEvent::up(KeyId::A, ms(t0, 21)));
        assert_eq!(
            classifier.classify(&KeyEvent::down(KeyId::A, ms(t0, 24))),
            accepted(KeyId::A, KeyAction::Down, false)
        );

        // The rate limit timestamp was refreshed by the silent press.
        classifier.classify(&KeyEvent::up(KeyId::A, ms(t0, 46)));
        assert_eq!(
            classifier.classify(&KeyEvent::down(KeyId::A, ms(t0, 48))),
            accepted(KeyId::A, KeyAction::Down, false)
        );
        classifier.classify(&KeyEvent::up(KeyId::A, ms(t0, 60)));
        assert_eq!(
            classifier.classify(&KeyEvent::down(KeyId::A, ms(t0, 100))),
            accepted(KeyId::A, KeyAction::Down, true)
        );
    }

    #[test]
    fn test_quick_release_not_played() {
        let mut classifier = InputClassifier::default();
        let t0 = Instant::now();

        classifier.classify(&KeyEvent::down(KeyId::C, t0));
        assert_eq!(
            classifier.classify(&KeyEvent::up(KeyId::C, ms(t0, 10))),
            accepted(KeyId::C, KeyAction::Up, false)
        );
        assert!(!classifier.is_pressed(KeyId::C));
    }

    #[test]
    fn test_release_without_press_is_played() {
        let mut classifier = InputClassifier::default();
        assert_eq!(
            classifier.classify(&KeyEvent::up(KeyId::C, Instant::now())),
            accepted(KeyId::C, KeyAction::Up, true)
        );
    }
}
