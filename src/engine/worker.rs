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

//! The single consumer of the dispatch queue.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, span, warn, Level};

use super::cache::BufferCache;
use super::queue::{DispatchQueue, PlaybackRequest};
use super::tracker::{Admission, InstanceTracker, PlaybackInstance};
use crate::audio::thread_priority::raise_current_thread_priority;
use crate::audio::Backend;
use crate::shutdown::Shutdown;

/// Default wait between ticks when there's nothing to play.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Default time between sweeps of finished instances.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Default allowance past a clip's duration before its instance is considered finished.
pub const DEFAULT_EXPIRY_SLACK: Duration = Duration::from_millis(200);

/// What happened to a dequeued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Started,
    /// No room, and the request wasn't important enough to make some.
    Rejected,
    /// The sound couldn't be decoded.
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerTiming {
    pub tick_interval: Duration,
    pub sweep_interval: Duration,
    pub expiry_slack: Duration,
}

impl Default for WorkerTiming {
    fn default() -> Self {
        WorkerTiming {
            tick_interval: DEFAULT_TICK_INTERVAL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            expiry_slack: DEFAULT_EXPIRY_SLACK,
        }
    }
}

/// Turns queued requests into playing instances.
pub struct PlaybackWorker {
    queue: Arc<DispatchQueue>,
    cache: Arc<BufferCache>,
    tracker: Arc<InstanceTracker>,
    backend: Arc<dyn Backend>,
    timing: WorkerTiming,
    last_sweep: Instant,
}

impl PlaybackWorker {
    pub fn new(
        queue: Arc<DispatchQueue>,
        cache: Arc<BufferCache>,
        tracker: Arc<InstanceTracker>,
        backend: Arc<dyn Backend>,
        timing: WorkerTiming,
    ) -> PlaybackWorker {
        PlaybackWorker {
            queue,
            cache,
            tracker,
            backend,
            timing,
            last_sweep: Instant::now(),
        }
    }

    /// Runs one iteration: plays at most one request, then sweeps if a sweep is due.
    /// Returns the outcome of the request handled, if there was one.
    pub fn tick(&mut self, now: Instant) -> Option<Outcome> {
        let outcome = self
            .queue
            .dequeue()
            .map(|request| self.play(request, now));

        if now.saturating_duration_since(self.last_sweep) >= self.timing.sweep_interval {
            self.tracker.sweep(now);
            self.cache.collect_warmed();
            self.last_sweep = now;
        }

        outcome
    }

    fn play(&self, request: PlaybackRequest, now: Instant) -> Outcome {
        if self.tracker.admit(request.priority) == Admission::Rejected {
            debug!(path = ?request.path, "Instance limit reached, dropping low priority sound");
            return Outcome::Rejected;
        }

        let buffer = match self.cache.get(&request.path) {
            Some(buffer) => buffer,
            None => match self.backend.decode(&request.path) {
                Ok(buffer) => {
                    self.cache.put(request.path.clone(), buffer.clone());
                    buffer
                }
                Err(e) => {
                    warn!(path = ?request.path, err = %e, "Unable to decode sound");
                    return Outcome::Failed;
                }
            },
        };

        let mut handle = self.backend.instantiate(&buffer);
        handle.set_volume(self.tracker.volume());
        handle.play();

        debug!(
            path = ?request.path,
            priority = ?request.priority,
            queued_us = now.saturating_duration_since(request.enqueued_at).as_micros() as u64,
            "Playing"
        );

        self.tracker.register(PlaybackInstance {
            handle,
            expires_at: now + buffer.duration() + self.timing.expiry_slack,
            source_path: request.path,
            priority: request.priority,
            started_at: now,
        });
        Outcome::Started
    }

    /// Runs the worker on its own thread until shutdown is requested.
    pub fn spawn(
        mut self,
        shutdown: Shutdown,
        priority: Option<u8>,
    ) -> io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("keyclack-worker".to_string())
            .spawn(move || {
                let span = span!(Level::INFO, "playback worker");
                let _enter = span.enter();

                if let Some(priority) = priority {
                    raise_current_thread_priority(priority);
                }
                info!("Playback worker started");

                while !shutdown.is_requested() {
                    if self.tick(Instant::now()).is_none()
                        && shutdown.wait_timeout(self.timing.tick_interval)
                    {
                        break;
                    }
                }
                info!("Playback worker stopped");
            })
    }
}
