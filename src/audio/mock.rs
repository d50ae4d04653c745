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
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use super::{Buffer, DecodeError, Instance, InstanceStatus};

/// Sample rate used for the silent buffers the mock hands out.
const MOCK_SAMPLE_RATE: u32 = 1000;

/// Default clip length for paths without an explicit duration.
const DEFAULT_MOCK_DURATION: Duration = Duration::from_millis(100);

#[derive(Default)]
struct MockState {
    durations: HashMap<PathBuf, Duration>,
    failures: HashSet<PathBuf>,
    decode_delay: Duration,
    decodes: HashMap<PathBuf, usize>,
    instances: Vec<Arc<MockVoice>>,
}

/// A mock backend. Doesn't actually play anything, but tracks what would have been played.
#[derive(Clone)]
pub struct Backend {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl Backend {
    /// Gets the given mock backend.
    pub fn get(name: &str) -> Backend {
        Backend {
            name: name.to_string(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Sets the clip length decoded for the given path.
    pub fn set_duration(&self, path: impl Into<PathBuf>, duration: Duration) {
        self.state.lock().durations.insert(path.into(), duration);
    }

    /// Makes decoding the given path fail.
    pub fn fail_decode(&self, path: impl Into<PathBuf>) {
        self.state.lock().failures.insert(path.into());
    }

    /// Makes every decode take at least the given time.
    pub fn set_decode_delay(&self, delay: Duration) {
        self.state.lock().decode_delay = delay;
    }

    /// Returns the number of decode attempts for the given path.
    pub fn decode_count(&self, path: &Path) -> usize {
        self.state.lock().decodes.get(path).copied().unwrap_or(0)
    }

    /// Returns the number of instances that have been started.
    pub fn played_count(&self) -> usize {
        self.state
            .lock()
            .instances
            .iter()
            .filter(|voice| voice.started_at.get().is_some())
            .count()
    }

    /// Returns the number of instances that have been explicitly stopped.
    pub fn stopped_count(&self) -> usize {
        self.state
            .lock()
            .instances
            .iter()
            .filter(|voice| voice.stopped.load(Ordering::Relaxed))
            .count()
    }

    /// Returns the volumes of all instances that are still playing.
    pub fn playing_volumes(&self) -> Vec<u8> {
        self.state
            .lock()
            .instances
            .iter()
            .filter(|voice| voice.status() == InstanceStatus::Playing)
            .map(|voice| voice.volume.load(Ordering::Relaxed))
            .collect()
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

impl super::Backend for Backend {
    fn decode(&self, path: &Path) -> Result<Buffer, DecodeError> {
        let (delay, duration, fail) = {
            let mut state = self.state.lock();
            *state.decodes.entry(path.to_path_buf()).or_insert(0) += 1;
            (
                state.decode_delay,
                state
                    .durations
                    .get(path)
                    .copied()
                    .unwrap_or(DEFAULT_MOCK_DURATION),
                state.failures.contains(path),
            )
        };

        if !delay.is_zero() {
            thread::sleep(delay);
        }
        if fail {
            return Err(DecodeError::Io {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "mock decode failure"),
            });
        }

        debug!(path = ?path, duration_ms = duration.as_millis(), "Decoded (mock)");
        Ok(Buffer::silence(duration, 1, MOCK_SAMPLE_RATE))
    }

    fn instantiate(&self, buffer: &Buffer) -> Box<dyn Instance> {
        let voice = Arc::new(MockVoice {
            duration: buffer.duration(),
            started_at: OnceLock::new(),
            stopped: AtomicBool::new(false),
            volume: AtomicU8::new(100),
        });
        self.state.lock().instances.push(voice.clone());
        Box::new(MockInstance { voice })
    }
}

/// Playback state of a mock instance. Plays for the buffer's duration in wall-clock time.
struct MockVoice {
    duration: Duration,
    started_at: OnceLock<Instant>,
    stopped: AtomicBool,
    volume: AtomicU8,
}

impl MockVoice {
    fn status(&self) -> InstanceStatus {
        if self.stopped.load(Ordering::Relaxed) {
            return InstanceStatus::Stopped;
        }
        match self.started_at.get() {
            Some(started_at) if started_at.elapsed() < self.duration => InstanceStatus::Playing,
            _ => InstanceStatus::Stopped,
        }
    }
}

struct MockInstance {
    voice: Arc<MockVoice>,
}

impl Instance for MockInstance {
    fn play(&mut self) {
        let _ = self.voice.started_at.set(Instant::now());
    }

    fn stop(&mut self) {
        self.voice.stopped.store(true, Ordering::Relaxed);
    }

    fn set_volume(&mut self, volume: u8) {
        self.voice.volume.store(volume, Ordering::Relaxed);
    }

    fn status(&self) -> InstanceStatus {
        self.voice.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Backend as _;

    #[test]
    fn test_mock_decode_and_play() {
        let backend = Backend::get("mock");
        let path = Path::new("a.wav");
        backend.set_duration(path, Duration::from_millis(300));

        let buffer = backend.decode(path).unwrap();
        assert_eq!(buffer.duration(), Duration::from_millis(300));
        assert_eq!(backend.decode_count(path), 1);

        let mut instance = backend.instantiate(&buffer);
        assert_eq!(instance.status(), InstanceStatus::Stopped);
        instance.play();
        instance.set_volume(42);
        assert_eq!(instance.status(), InstanceStatus::Playing);
        assert_eq!(backend.playing_volumes(), vec![42]);

        instance.stop();
        assert_eq!(instance.status(), InstanceStatus::Stopped);
        assert_eq!(backend.stopped_count(), 1);
        assert_eq!(backend.played_count(), 1);
    }

    #[test]
    fn test_mock_decode_failure() {
        let backend = Backend::get("mock");
        backend.fail_decode("broken.wav");
        assert!(backend.decode(Path::new("broken.wav")).is_err());
        assert_eq!(backend.decode_count(Path::new("broken.wav")), 1);
    }
}
