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
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

use crate::keys::Priority;

/// Default number of pending requests.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// A request to play the sound at a path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackRequest {
    pub path: PathBuf,
    pub priority: Priority,
    pub enqueued_at: Instant,
}

impl PlaybackRequest {
    pub fn new(path: PathBuf, priority: Priority) -> PlaybackRequest {
        PlaybackRequest {
            path,
            priority,
            enqueued_at: Instant::now(),
        }
    }
}

struct QueueState {
    /// High requests first, then low, each in arrival order.
    entries: VecDeque<PlaybackRequest>,
    /// Number of high requests at the front of `entries`.
    high_count: usize,
}

/// A bounded queue that hands out every high priority request before any low priority one.
/// Enqueueing never blocks and never fails; when full, something is evicted instead.
pub struct DispatchQueue {
    state: Mutex<QueueState>,
    capacity: usize,
}

impl DispatchQueue {
    pub fn new(capacity: usize) -> DispatchQueue {
        let capacity = capacity.max(1);
        DispatchQueue {
            state: Mutex::new(QueueState {
                entries: VecDeque::with_capacity(capacity + 1),
                high_count: 0,
            }),
            capacity,
        }
    }

    /// Adds a request. Returns the request that was evicted to make room, if any: the first
    /// low priority request from the front, or the oldest request if there are none.
    pub fn enqueue(&self, request: PlaybackRequest) -> Option<PlaybackRequest> {
        let mut state = self.state.lock();

        if request.priority.is_high() {
            let index = state.high_count;
            state.entries.insert(index, request);
            state.high_count += 1;
        } else {
            state.entries.push_back(request);
        }

        if state.entries.len() <= self.capacity {
            return None;
        }

        let evicted = if state.high_count < state.entries.len() {
            let index = state.high_count;
            state.entries.remove(index)
        } else {
            state.high_count -= 1;
            state.entries.pop_front()
        };

        if let Some(evicted) = evicted.as_ref() {
            debug!(
                path = ?evicted.path,
                priority = ?evicted.priority,
                "Dispatch queue full, evicted request"
            );
        }
        evicted
    }

    /// Takes the next request, if any.
    pub fn dequeue(&self) -> Option<PlaybackRequest> {
        let mut state = self.state.lock();
        let request = state.entries.pop_front()?;
        if request.priority.is_high() {
            state.high_count -= 1;
        }
        Some(request)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drops every pending request, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let count = state.entries.len();
        state.entries.clear();
        state.high_count = 0;
        count
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        DispatchQueue::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DispatchQueue")
            .field("pending", &state.entries.len())
            .field("high", &state.high_count)
            .field("capacity", &self.capacity)
            .finish()
    }
}
