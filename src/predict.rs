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

//! Learning which keys tend to follow which, so their sounds can be decoded before they
//! are pressed.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::keys::KeyId;

/// Default number of recently accepted keys to remember.
pub const DEFAULT_HISTORY_LENGTH: usize = 5;

/// History length used at the lightest prediction level.
const REDUCED_HISTORY_LENGTH: usize = 3;

/// How aggressively to predict and pre-decode, 0 (off) to 3 (eager).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct OptimizationLevel(u8);

impl OptimizationLevel {
    pub const OFF: OptimizationLevel = OptimizationLevel(0);
    pub const LIGHT: OptimizationLevel = OptimizationLevel(1);
    pub const DEFAULT: OptimizationLevel = OptimizationLevel(2);
    pub const EAGER: OptimizationLevel = OptimizationLevel(3);

    /// Creates a level, clamping to the supported range.
    pub fn new(level: u8) -> OptimizationLevel {
        OptimizationLevel(level.min(Self::EAGER.0))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// The maximum number of followers warmed per accepted key.
    pub fn max_candidates(&self) -> usize {
        self.0 as usize
    }

    /// Whether warms should decode synchronously.
    pub fn high_priority_warms(&self) -> bool {
        *self >= Self::EAGER
    }
}

impl Default for OptimizationLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The keys worth warming after an accepted key.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Prediction {
    pub candidates: Vec<KeyId>,
    pub high_priority: bool,
}

/// Tracks a short history of accepted keys and which keys have been seen following which.
pub struct SequencePredictor {
    /// The most recent accepted keys, oldest first.
    history: VecDeque<KeyId>,
    /// The configured history length at the default level.
    history_length: usize,
    /// Keys observed immediately after each key, in the order they were first observed.
    followers: HashMap<KeyId, Vec<KeyId>>,
    level: OptimizationLevel,
}

impl SequencePredictor {
    /// Creates a new predictor.
    pub fn new(history_length: usize, level: OptimizationLevel) -> SequencePredictor {
        SequencePredictor {
            history: VecDeque::with_capacity(history_length),
            history_length: history_length.max(1),
            followers: HashMap::new(),
            level,
        }
    }

    /// Records an accepted key and returns the keys likely to come next.
    pub fn observe(&mut self, key: KeyId) -> Prediction {
        if self.level == OptimizationLevel::OFF {
            return Prediction::default();
        }

        if let Some(previous) = self.history.back().copied() {
            let followers = self.followers.entry(previous).or_default();
            if !followers.contains(&key) {
                followers.push(key);
            }
        }

        self.history.push_back(key);
        self.truncate_history();

        let candidates: Vec<KeyId> = self
            .followers
            .get(&key)
            .map(|followers| {
                followers
                    .iter()
                    .take(self.level.max_candidates())
                    .copied()
                    .collect()
            })
            .unwrap_or_default();

        Prediction {
            candidates,
            high_priority: self.level.high_priority_warms(),
        }
    }

    /// Changes the optimization level. Turning prediction off forgets everything learned.
    pub fn set_level(&mut self, level: OptimizationLevel) {
        self.level = level;
        if level == OptimizationLevel::OFF {
            self.history.clear();
            self.followers.clear();
        }
        self.truncate_history();
        debug!(level = level.value(), "Prediction level changed");
    }

    pub fn level(&self) -> OptimizationLevel {
        self.level
    }

    /// Returns the remembered keys, oldest first.
    pub fn history(&self) -> Vec<KeyId> {
        self.history.iter().copied().collect()
    }

    /// Returns the keys observed directly after the given key.
    pub fn followers(&self, key: KeyId) -> &[KeyId] {
        self.followers
            .get(&key)
            .map(|followers| followers.as_slice())
            .unwrap_or(&[])
    }

    fn history_limit(&self) -> usize {
        if self.level == OptimizationLevel::LIGHT {
            self.history_length.min(REDUCED_HISTORY_LENGTH)
        } else {
            self.history_length
        }
    }

    fn truncate_history(&mut self) {
        let limit = self.history_limit();
        while self.history.len() > limit {
            self.history.pop_front();
        }
    }
}

impl std::fmt::Debug for SequencePredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequencePredictor")
            .field("history", &self.history)
            .field("known_keys", &self.followers.len())
            .field("level", &self.level.value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: KeyId = KeyId::A;
    const B: KeyId = KeyId::B;
    const C: KeyId = KeyId::C;

    fn predictor(level: u8) -> SequencePredictor {
        SequencePredictor::new(DEFAULT_HISTORY_LENGTH, OptimizationLevel::new(level))
    }

    #[test]
    fn test_learns_alternating_followers() {
        let mut predictor = predictor(2);
        for key in [A, B, A, B, A, B, A, B] {
            predictor.observe(key);
        }

        assert_eq!(predictor.followers(A), &[B]);
        assert_eq!(predictor.followers(B), &[A]);

        let prediction = predictor.observe(A);
        assert_eq!(prediction.candidates, vec![B]);
        assert!(!prediction.high_priority);
    }

    #[test]
    fn test_candidates_limited_by_level() {
        let mut predictor = predictor(1);
        for key in [A, B, A, C, A] {
            predictor.observe(key);
        }
        assert_eq!(predictor.followers(A), &[B, C]);
        assert_eq!(predictor.observe(A).candidates, vec![B]);

        predictor.set_level(OptimizationLevel::EAGER);
        let prediction = predictor.observe(A);
        // A followed A, so it's now a follower as well.
        assert_eq!(prediction.candidates, vec![B, C, A]);
        assert!(prediction.high_priority);
    }

    #[test]
    fn test_history_bounded() {
        let mut predictor = predictor(2);
        for code in 1..=8 {
            predictor.observe(KeyId(code));
        }
        assert_eq!(
            predictor.history(),
            vec![KeyId(4), KeyId(5), KeyId(6), KeyId(7), KeyId(8)]
        );

        predictor.set_level(OptimizationLevel::LIGHT);
        assert_eq!(predictor.history(), vec![KeyId(6), KeyId(7), KeyId(8)]);
    }

    #[test]
    fn test_level_zero_forgets_and_disables() {
        let mut predictor = predictor(2);
        for key in [A, B, A] {
            predictor.observe(key);
        }
        predictor.set_level(OptimizationLevel::OFF);
        assert!(predictor.history().is_empty());
        assert!(predictor.followers(A).is_empty());

        assert_eq!(predictor.observe(B), Prediction::default());
        assert!(predictor.history().is_empty());
    }

    #[test]
    fn test_level_clamped() {
        assert_eq!(OptimizationLevel::new(9), OptimizationLevel::EAGER);
        assert_eq!(OptimizationLevel::new(0).max_candidates(), 0);
    }
}
