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

//! A small fixed set of threads decoding speculative cache warms in the background.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, span, warn, Level};

use crate::audio::{Backend, Buffer};

/// Default number of decode threads.
pub const DEFAULT_WARM_THREADS: usize = 2;

/// Default number of warms that may wait for a decode thread.
pub const DEFAULT_WARM_BACKLOG: usize = 64;

/// The outcome of a background decode. `buffer` is None if decoding failed.
pub struct Warmed {
    pub path: PathBuf,
    pub buffer: Option<Buffer>,
}

pub struct WarmPool {
    /// Dropped on shutdown, which ends the decode threads once the backlog drains.
    jobs: Mutex<Option<Sender<PathBuf>>>,
    results: Receiver<Warmed>,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl WarmPool {
    /// Starts the decode threads.
    pub fn new(backend: Arc<dyn Backend>, threads: usize, backlog: usize) -> WarmPool {
        let (jobs_tx, jobs_rx) = bounded::<PathBuf>(backlog.max(1));
        let (results_tx, results_rx) = unbounded();

        let handles = (0..threads.max(1))
            .filter_map(|index| {
                let backend = backend.clone();
                let jobs_rx = jobs_rx.clone();
                let results_tx = results_tx.clone();
                thread::Builder::new()
                    .name(format!("keyclack-warm-{}", index))
                    .spawn(move || WarmPool::decode_loop(index, backend, jobs_rx, results_tx))
                    .map_err(|e| warn!(err = %e, "Unable to start warm thread"))
                    .ok()
            })
            .collect();

        WarmPool {
            jobs: Mutex::new(Some(jobs_tx)),
            results: results_rx,
            threads: Mutex::new(handles),
        }
    }

    fn decode_loop(
        index: usize,
        backend: Arc<dyn Backend>,
        jobs: Receiver<PathBuf>,
        results: Sender<Warmed>,
    ) {
        let span = span!(Level::DEBUG, "warm", index);
        let _enter = span.enter();

        for path in jobs.iter() {
            let buffer = match backend.decode(&path) {
                Ok(buffer) => {
                    debug!(path = ?path, "Warmed");
                    Some(buffer)
                }
                Err(e) => {
                    warn!(path = ?path, err = %e, "Background decode failed");
                    None
                }
            };
            if results.send(Warmed { path, buffer }).is_err() {
                return;
            }
        }
    }

    /// Schedules a decode. Returns false if the backlog is full or the pool is shut down.
    pub fn submit(&self, path: PathBuf) -> bool {
        let jobs = self.jobs.lock();
        let Some(jobs) = jobs.as_ref() else {
            return false;
        };
        match jobs.try_send(path) {
            Ok(()) => true,
            Err(TrySendError::Full(path)) => {
                debug!(path = ?path, "Warm backlog full, dropping");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Takes every decode that has finished since the last call.
    pub fn finished(&self) -> Vec<Warmed> {
        self.results.try_iter().collect()
    }

    /// Stops accepting work and waits for the decode threads. In-flight decodes complete and
    /// their results are discarded.
    pub fn shutdown(&self) {
        if self.jobs.lock().take().is_none() {
            return;
        }
        for handle in self.threads.lock().drain(..) {
            if handle.join().is_err() {
                warn!("Warm thread panicked");
            }
        }
        let discarded = self.results.try_iter().count();
        debug!(discarded, "Warm pool stopped");
    }
}

impl Drop for WarmPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
