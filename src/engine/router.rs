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

//! Glue between the keystroke source and the playback side: classifies each raw event,
//! feeds accepted presses to the predictor and queues the sounds to play.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::cache::BufferCache;
use super::queue::{DispatchQueue, PlaybackRequest};
use crate::input::{InputClassifier, KeyHandler, Verdict};
use crate::keys::{KeyAction, KeyEvent, KeyId, Priority};
use crate::predict::{OptimizationLevel, SequencePredictor};
use crate::sounds::SoundResolver;

/// Runs on the keystroke source's thread. Only the classifier and predictor locks are taken
/// here, and neither is held while warming.
pub struct EventRouter {
    classifier: Mutex<InputClassifier>,
    predictor: Mutex<SequencePredictor>,
    resolver: Arc<dyn SoundResolver>,
    queue: Arc<DispatchQueue>,
    cache: Arc<BufferCache>,
}

impl EventRouter {
    pub fn new(
        classifier: InputClassifier,
        predictor: SequencePredictor,
        resolver: Arc<dyn SoundResolver>,
        queue: Arc<DispatchQueue>,
        cache: Arc<BufferCache>,
    ) -> EventRouter {
        EventRouter {
            classifier: Mutex::new(classifier),
            predictor: Mutex::new(predictor),
            resolver,
            queue,
            cache,
        }
    }

    pub fn set_optimization_level(&self, level: OptimizationLevel) {
        self.predictor.lock().set_level(level);
    }

    pub fn optimization_level(&self) -> OptimizationLevel {
        self.predictor.lock().level()
    }

    /// Forgets pressed keys, so a restart doesn't treat held keys as repeats.
    pub fn reset(&self) {
        self.classifier.lock().reset();
    }

    /// Warms both sounds of each key. Returns the number of warms accepted.
    pub fn warm_keys(&self, keys: &[KeyId], high_priority: bool) -> usize {
        keys.iter()
            .flat_map(|key| [(*key, true), (*key, false)])
            .filter_map(|(key, is_down)| self.resolver.preview(key, is_down))
            .filter(|path| self.cache.warm(path, high_priority))
            .count()
    }

    fn queue_sound(&self, key: KeyId, is_down: bool, priority: Priority) {
        let Some(path) = self.resolver.resolve(key, is_down) else {
            return;
        };
        self.queue.enqueue(PlaybackRequest::new(path, priority));
    }

    #[cfg(test)]
    pub(crate) fn predictor(&self) -> parking_lot::MutexGuard<'_, SequencePredictor> {
        self.predictor.lock()
    }
}

impl KeyHandler for EventRouter {
    fn on_key_event(&self, event: KeyEvent) {
        let verdict = self.classifier.lock().classify(&event);

        match verdict {
            Verdict::Dropped(reason) => {
                debug!(key = %event.key, reason = ?reason, "Dropped key event");
            }
            Verdict::Accepted {
                key,
                action: KeyAction::Down,
                play,
            } => {
                // The pressed key is queued before any speculative decode starts.
                if play {
                    self.queue_sound(key, true, Priority::High);
                }
                let prediction = self.predictor.lock().observe(key);
                if !prediction.candidates.is_empty() {
                    self.warm_keys(&prediction.candidates, prediction.high_priority);
                }
            }
            Verdict::Accepted {
                key,
                action: KeyAction::Up,
                play,
            } => {
                if play {
                    self.queue_sound(key, false, Priority::Low);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::audio::mock;
    use crate::sounds::test_resolver::FixedResolver;
    use crate::test::eventually;

    struct Harness {
        backend: mock::Backend,
        queue: Arc<DispatchQueue>,
        cache: Arc<BufferCache>,
        router: EventRouter,
    }

    fn harness(level: u8, keys: &[KeyId]) -> Harness {
        let backend = mock::Backend::get("mock");
        let queue = Arc::new(DispatchQueue::default());
        let cache = Arc::new(BufferCache::new(Arc::new(backend.clone()), 100));
        let router = EventRouter::new(
            InputClassifier::default(),
            SequencePredictor::new(5, OptimizationLevel::new(level)),
            Arc::new(FixedResolver::with_keys(keys)),
            queue.clone(),
            cache.clone(),
        );
        Harness {
            backend,
            queue,
            cache,
            router,
        }
    }

    fn drain(queue: &DispatchQueue) -> Vec<PlaybackRequest> {
        std::iter::from_fn(|| queue.dequeue()).collect()
    }

    fn ms(start: Instant, millis: u64) -> Instant {
        start + Duration::from_millis(millis)
    }

    #[test]
    fn test_repeated_down_queues_once() {
        let h = harness(2, &[KeyId::A]);
        let t0 = Instant::now();
        for i in 0..3 {
            h.router.on_key_event(KeyEvent::down(KeyId::A, ms(t0, i * 100)));
        }

        let requests = drain(&h.queue);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].priority, Priority::High);
        assert_eq!(requests[0].path, FixedResolver::path(KeyId::A, true));
    }

    #[test]
    fn test_injected_down_ignored() {
        let h = harness(2, &[KeyId::B]);
        let t0 = Instant::now();
        h.router.on_key_event(KeyEvent::down(KeyId::B, t0).injected());
        h.router.on_key_event(KeyEvent::down(KeyId::B, ms(t0, 5)));

        assert_eq!(drain(&h.queue).len(), 1);
    }

    #[test]
    fn test_fast_second_press_not_queued() {
        let h = harness(2, &[KeyId::A]);
        let t0 = Instant::now();
        h.router.on_key_event(KeyEvent::down(KeyId::A, t0));
        h.router.on_key_event(KeyEvent::up(KeyId::A, ms(t0, 5)));
        h.router.on_key_event(KeyEvent::down(KeyId::A, ms(t0, 10)));

        let downs: Vec<PlaybackRequest> = drain(&h.queue)
            .into_iter()
            .filter(|request| request.priority == Priority::High)
            .collect();
        assert_eq!(downs.len(), 1);

        // The suppressed press still counts as history.
        assert_eq!(h.router.predictor().history(), vec![KeyId::A, KeyId::A]);
    }

    #[test]
    fn test_release_queued_low() {
        let h = harness(2, &[KeyId::C]);
        let t0 = Instant::now();
        h.router.on_key_event(KeyEvent::down(KeyId::C, t0));
        h.router.on_key_event(KeyEvent::up(KeyId::C, ms(t0, 80)));

        let requests = drain(&h.queue);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].priority, Priority::Low);
        assert_eq!(requests[1].path, FixedResolver::path(KeyId::C, false));
    }

    #[test]
    fn test_unmapped_key_skipped() {
        let h = harness(2, &[]);
        let t0 = Instant::now();
        h.router.on_key_event(KeyEvent::down(KeyId::A, t0));
        h.router.on_key_event(KeyEvent::up(KeyId::A, ms(t0, 80)));
        assert!(h.queue.is_empty());
    }

    fn type_abab(h: &Harness, t0: Instant) -> u64 {
        let mut t = 0;
        for _ in 0..2 {
            for key in [KeyId::A, KeyId::B, KeyId::A, KeyId::B] {
                h.router.on_key_event(KeyEvent::down(key, ms(t0, t)));
                h.router.on_key_event(KeyEvent::up(key, ms(t0, t + 40)));
                t += 100;
            }
        }
        t
    }

    #[test]
    fn test_predicted_follower_warmed() {
        let h = harness(1, &[KeyId::A, KeyId::B]);
        let t0 = Instant::now();
        let t = type_abab(&h, t0);

        {
            let predictor = h.router.predictor();
            assert_eq!(predictor.followers(KeyId::A), &[KeyId::B]);
            assert_eq!(predictor.followers(KeyId::B), &[KeyId::A]);
        }

        h.cache.clear();
        h.router.on_key_event(KeyEvent::down(KeyId::A, ms(t0, t)));

        let b_down = FixedResolver::path(KeyId::B, true);
        let b_up = FixedResolver::path(KeyId::B, false);
        eventually(
            || h.cache.get(&b_down).is_some() && h.cache.get(&b_up).is_some(),
            "B was never warmed",
        );
        assert!(h.backend.decode_count(&b_down) >= 1);
    }

    #[test]
    fn test_eager_warms_synchronously() {
        let h = harness(3, &[KeyId::A, KeyId::B]);
        let t = type_abab(&h, Instant::now());

        h.cache.clear();
        let at = Instant::now() + Duration::from_millis(t);
        h.router.on_key_event(KeyEvent::down(KeyId::A, at));
        assert!(h.cache.contains(&FixedResolver::path(KeyId::B, true)));
        assert!(h.cache.contains(&FixedResolver::path(KeyId::B, false)));
    }

    #[test]
    fn test_press_queued_before_eager_warms() {
        let h = Arc::new(harness(3, &[KeyId::A, KeyId::B]));
        let t = type_abab(&h, Instant::now());
        drain(&h.queue);
        h.cache.clear();
        h.backend.set_decode_delay(Duration::from_millis(200));

        let at = Instant::now() + Duration::from_millis(t);
        let pressing = h.clone();
        let press = std::thread::spawn(move || {
            pressing.router.on_key_event(KeyEvent::down(KeyId::A, at));
        });

        eventually(|| !h.queue.is_empty(), "Press was never queued");
        // B's release sound is the second of two 200ms decodes.
        assert!(!h.cache.contains(&FixedResolver::path(KeyId::B, false)));

        press.join().unwrap();
        assert!(h.cache.contains(&FixedResolver::path(KeyId::B, false)));
        let requests = drain(&h.queue);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, FixedResolver::path(KeyId::A, true));
    }

    #[test]
    fn test_level_zero_warms_nothing() {
        let h = harness(0, &[KeyId::A, KeyId::B]);
        type_abab(&h, Instant::now());
        assert!(h.router.predictor().followers(KeyId::A).is_empty());
        assert_eq!(h.backend.decode_count(&PathBuf::from("48-down.wav")), 0);
    }
}
