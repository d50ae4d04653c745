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
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A shutdown handle is shared between a long running loop and its owner. It's the loop's
/// responsibility to check it between ticks.
#[derive(Clone)]
pub struct Shutdown {
    /// Set to true once shutdown has been requested.
    requested: Arc<Mutex<bool>>,
    /// Wakes sleepers when shutdown is requested.
    condvar: Arc<Condvar>,
}

impl Shutdown {
    /// Creates a new shutdown handle.
    pub fn new() -> Shutdown {
        Shutdown {
            requested: Arc::new(Mutex::new(false)),
            condvar: Arc::new(Condvar::new()),
        }
    }

    /// Returns true if shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        *self.requested.lock().expect("Error getting lock")
    }

    /// Sleeps for up to the given duration, returning early if shutdown is requested.
    /// Returns true if shutdown has been requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (requested, _) = self
            .condvar
            .wait_timeout_while(
                self.requested.lock().expect("Error getting lock"),
                timeout,
                |requested| !*requested,
            )
            .expect("Error getting lock");
        *requested
    }

    /// Requests shutdown and wakes anyone waiting.
    pub fn request(&self) {
        let mut requested = self.requested.lock().expect("Error getting lock");
        if !*requested {
            *requested = true;
            self.condvar.notify_all();
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
