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
use std::path::PathBuf;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::audio::{Instance, InstanceStatus};
use crate::keys::Priority;

/// Default cap on concurrently playing instances.
pub const DEFAULT_MAX_INSTANCES: usize = 32;

/// Default playback volume.
pub const DEFAULT_VOLUME: u8 = 50;

/// A live, playing instance.
pub struct PlaybackInstance {
    pub handle: Box<dyn Instance>,
    pub expires_at: Instant,
    pub source_path: PathBuf,
    pub priority: Priority,
    pub started_at: Instant,
}

impl PlaybackInstance {
    fn stop(mut self) {
        self.handle.stop();
    }
}

impl std::fmt::Debug for PlaybackInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackInstance")
            .field("source_path", &self.source_path)
            .field("priority", &self.priority)
            .finish()
    }
}

/// The result of asking for room to start a new instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// There was room.
    Admitted,
    /// A live instance was stopped to make room.
    Evicted,
    /// No room for a low priority request.
    Rejected,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        *self != Admission::Rejected
    }
}

struct TrackerState {
    /// Live instances in start order.
    instances: Vec<PlaybackInstance>,
    volume: u8,
}

/// Owns every live instance and enforces the cap on how many play at once.
pub struct InstanceTracker {
    state: Mutex<TrackerState>,
    max_instances: usize,
}

impl InstanceTracker {
    pub fn new(max_instances: usize, volume: u8) -> InstanceTracker {
        InstanceTracker {
            state: Mutex::new(TrackerState {
                instances: Vec::new(),
                volume: volume.min(100),
            }),
            max_instances: max_instances.max(1),
        }
    }

    /// Makes room for a new instance of the given priority.
    ///
    /// At the cap, a high priority request evicts the first low priority instance, or the
    /// oldest instance if every live one is high priority. A low priority request is rejected.
    pub fn admit(&self, priority: Priority) -> Admission {
        let evicted = {
            let mut state = self.state.lock();
            if state.instances.len() < self.max_instances {
                return Admission::Admitted;
            }
            if !priority.is_high() {
                return Admission::Rejected;
            }

            let index = state
                .instances
                .iter()
                .position(|instance| !instance.priority.is_high())
                .unwrap_or(0);
            state.instances.remove(index)
        };

        debug!(
            path = ?evicted.source_path,
            priority = ?evicted.priority,
            "Instance limit reached, evicting"
        );
        evicted.stop();
        Admission::Evicted
    }

    /// Takes ownership of a started instance. The instance takes the tracker's current
    /// volume, so a volume change made while it was being started still reaches it.
    pub fn register(&self, mut instance: PlaybackInstance) {
        let mut state = self.state.lock();
        instance.handle.set_volume(state.volume);
        state.instances.push(instance);
    }

    /// Removes instances that have stopped or passed their expiry. Returns the number removed.
    ///
    /// Status is read under the tracker's lock, which [Instance::status] allows by never
    /// blocking.
    pub fn sweep(&self, now: Instant) -> usize {
        let expired: Vec<PlaybackInstance> = {
            let mut state = self.state.lock();
            let (expired, live) = std::mem::take(&mut state.instances)
                .into_iter()
                .partition(|instance| {
                    instance.expires_at <= now
                        || instance.handle.status() == InstanceStatus::Stopped
                });
            state.instances = live;
            expired
        };

        let count = expired.len();
        for instance in expired {
            instance.stop();
        }
        if count > 0 {
            debug!(removed = count, "Swept finished instances");
        }
        count
    }

    /// Sets the volume of every live instance and of instances started later.
    pub fn set_volume(&self, volume: u8) {
        let volume = volume.min(100);
        let mut state = self.state.lock();
        state.volume = volume;
        for instance in state.instances.iter_mut() {
            instance.handle.set_volume(volume);
        }
    }

    pub fn volume(&self) -> u8 {
        self.state.lock().volume
    }

    /// Stops and removes every live instance. Returns the number stopped.
    pub fn clear(&self) -> usize {
        let instances = std::mem::take(&mut self.state.lock().instances);
        let count = instances.len();
        for instance in instances {
            instance.stop();
        }
        if count > 0 {
            info!(stopped = count, "All instances stopped");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.state.lock().instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().instances.is_empty()
    }

    pub fn max_instances(&self) -> usize {
        self.max_instances
    }

    /// Returns true if an instance of the path is live.
    pub fn contains(&self, path: &std::path::Path) -> bool {
        self.state
            .lock()
            .instances
            .iter()
            .any(|instance| instance.source_path == path)
    }
}

impl std::fmt::Debug for InstanceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("InstanceTracker")
            .field("live", &state.instances.len())
            .field("max_instances", &self.max_instances)
            .field("volume", &state.volume)
            .finish()
    }
}
