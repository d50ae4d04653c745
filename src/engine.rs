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

//! The key sound engine.
//!
//! Key events arrive on the keystroke source's thread and go through the [router::EventRouter],
//! which filters them, learns from them and queues playback requests. A single
//! [worker::PlaybackWorker] thread turns requests into playing instances. The queue, the
//! buffer cache and the instance tracker each have their own lock and none is held across a
//! decode or a call into the backend.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::audio::Backend;
use crate::input::{InputClassifier, InstallError, KeySource};
use crate::keys::high_priority_keys;
use crate::predict::{OptimizationLevel, SequencePredictor};
use crate::shutdown::Shutdown;
use crate::sounds::SoundResolver;

use self::cache::BufferCache;
use self::queue::DispatchQueue;
use self::router::EventRouter;
use self::tracker::InstanceTracker;
use self::worker::{PlaybackWorker, WorkerTiming};

pub mod cache;
pub mod queue;
pub mod router;
pub mod tracker;
pub mod warm;
pub mod worker;

/// Everything the engine needs to know up front.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub volume: u8,
    pub optimization_level: OptimizationLevel,
    pub queue_capacity: usize,
    pub cache_capacity: usize,
    pub max_instances: usize,
    pub history_length: usize,
    pub warm_threads: usize,
    pub warm_backlog: usize,
    pub repeat_interval: Duration,
    pub release_guard: Duration,
    pub timing: WorkerTiming,
    pub worker_priority: Option<u8>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            volume: tracker::DEFAULT_VOLUME,
            optimization_level: OptimizationLevel::default(),
            queue_capacity: queue::DEFAULT_QUEUE_CAPACITY,
            cache_capacity: cache::DEFAULT_CACHE_CAPACITY,
            max_instances: tracker::DEFAULT_MAX_INSTANCES,
            history_length: crate::predict::DEFAULT_HISTORY_LENGTH,
            warm_threads: warm::DEFAULT_WARM_THREADS,
            warm_backlog: warm::DEFAULT_WARM_BACKLOG,
            repeat_interval: crate::input::DEFAULT_REPEAT_INTERVAL,
            release_guard: crate::input::DEFAULT_RELEASE_GUARD,
            timing: WorkerTiming::default(),
            worker_priority: None,
        }
    }
}

struct Running {
    shutdown: Shutdown,
    worker: thread::JoinHandle<()>,
}

/// Plays a sound for every key press and release.
pub struct Engine {
    settings: EngineSettings,
    backend: Arc<dyn Backend>,
    source: Arc<dyn KeySource>,
    queue: Arc<DispatchQueue>,
    cache: Arc<BufferCache>,
    tracker: Arc<InstanceTracker>,
    router: Arc<EventRouter>,
    running: Mutex<Option<Running>>,
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        backend: Arc<dyn Backend>,
        resolver: Arc<dyn SoundResolver>,
        source: Arc<dyn KeySource>,
    ) -> Engine {
        let queue = Arc::new(DispatchQueue::new(settings.queue_capacity));
        let cache = Arc::new(BufferCache::with_warm_pool(
            backend.clone(),
            settings.cache_capacity,
            settings.warm_threads,
            settings.warm_backlog,
        ));
        let tracker = Arc::new(InstanceTracker::new(
            settings.max_instances,
            settings.volume,
        ));
        let router = Arc::new(EventRouter::new(
            InputClassifier::new(settings.repeat_interval, settings.release_guard),
            SequencePredictor::new(settings.history_length, settings.optimization_level),
            resolver,
            queue.clone(),
            cache.clone(),
        ));

        Engine {
            settings,
            backend,
            source,
            queue,
            cache,
            tracker,
            router,
            running: Mutex::new(None),
        }
    }

    /// Hooks into the keystroke source and starts the playback worker. Failing to hook in
    /// is fatal: without key events there's nothing to do.
    pub fn start(&self) -> Result<(), InstallError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(InstallError::AlreadyInstalled);
        }

        self.source.install(self.router.clone())?;

        let shutdown = Shutdown::new();
        let worker = PlaybackWorker::new(
            self.queue.clone(),
            self.cache.clone(),
            self.tracker.clone(),
            self.backend.clone(),
            self.settings.timing,
        )
        .spawn(shutdown.clone(), self.settings.worker_priority);
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                self.source.uninstall();
                return Err(e.into());
            }
        };
        *running = Some(Running { shutdown, worker });
        drop(running);

        let level = self.optimization_level();
        if level.high_priority_warms() {
            self.warm_high_priority_keys();
        }

        info!(
            source = %self.source,
            backend = %self.backend,
            volume = self.volume(),
            level = level.value(),
            "Engine started"
        );
        Ok(())
    }

    /// Unhooks from the keystroke source, waits for the worker to finish its current tick,
    /// then stops every sound and empties the cache and queue.
    pub fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };

        self.source.uninstall();
        running.shutdown.request();
        if running.worker.join().is_err() {
            warn!("Playback worker panicked");
        }

        self.tracker.clear();
        self.cache.clear();
        self.queue.clear();
        self.router.reset();
        info!("Engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Sets the volume (clamped to 100) of every playing and future sound.
    pub fn set_volume(&self, volume: u8) {
        let volume = volume.min(100);
        self.tracker.set_volume(volume);
        info!(volume, "Volume changed");
    }

    pub fn volume(&self) -> u8 {
        self.tracker.volume()
    }

    /// Sets the prediction level (clamped to 3). Level 0 forgets everything learned; level 3
    /// decodes the sounds of the common keys right away.
    pub fn set_optimization_level(&self, level: u8) {
        let level = OptimizationLevel::new(level);
        self.router.set_optimization_level(level);
        if level.high_priority_warms() {
            self.warm_high_priority_keys();
        }
        info!(level = level.value(), "Optimization level changed");
    }

    pub fn optimization_level(&self) -> OptimizationLevel {
        self.router.optimization_level()
    }

    /// Drops pending requests and stops everything that's playing.
    pub fn stop_all(&self) {
        let dropped = self.queue.clear();
        let stopped = self.tracker.clear();
        info!(dropped, stopped, "All sounds stopped");
    }

    /// Number of sounds currently playing.
    pub fn live_instances(&self) -> usize {
        self.tracker.len()
    }

    /// Number of requests waiting for the worker.
    pub fn pending_requests(&self) -> usize {
        self.queue.len()
    }

    /// Number of decoded sounds held in memory.
    pub fn cached_buffers(&self) -> usize {
        self.cache.len()
    }

    fn warm_high_priority_keys(&self) {
        let warmed = self.router.warm_keys(&high_priority_keys(), true);
        info!(warmed, "Warmed common keys");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
        self.cache.shutdown();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("source", &self.source.to_string())
            .field("backend", &self.backend.to_string())
            .field("queue", &self.queue)
            .field("cache", &self.cache)
            .field("tracker", &self.tracker)
            .finish()
    }
}
