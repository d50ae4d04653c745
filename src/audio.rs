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

//! The audio backend: decoding files into shared buffers and playing instances of them.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub mod cpal;
pub mod decode;
pub mod error;
pub mod mixer;
pub mod mock;
pub mod thread_priority;

pub use error::{DecodeError, OutputError};

/// Decoded audio kept in memory. Cloning is cheap; the sample data is shared between the
/// cache and every instance created from it.
#[derive(Clone)]
pub struct Buffer {
    /// Interleaved f32 samples.
    data: Arc<Vec<f32>>,
    /// Number of channels in the buffer.
    channel_count: u16,
    /// Sample rate of the audio data.
    sample_rate: u32,
    /// Nominal playback duration.
    duration: Duration,
}

impl Buffer {
    /// Creates a buffer from interleaved samples.
    pub fn new(data: Vec<f32>, channel_count: u16, sample_rate: u32) -> Buffer {
        let channel_count = channel_count.max(1);
        let frames = data.len() / channel_count as usize;
        let duration = if sample_rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((frames as u64).saturating_mul(1_000_000_000) / sample_rate as u64)
        };
        Buffer {
            data: Arc::new(data),
            channel_count,
            sample_rate,
            duration,
        }
    }

    /// Creates a silent buffer of the given duration.
    pub fn silence(duration: Duration, channel_count: u16, sample_rate: u32) -> Buffer {
        let frames = (duration.as_secs_f64() * sample_rate as f64).round() as usize;
        Buffer::new(
            vec![0.0; frames * channel_count.max(1) as usize],
            channel_count,
            sample_rate,
        )
    }

    /// Returns the shared sample data.
    pub fn data(&self) -> &Arc<Vec<f32>> {
        &self.data
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("channels", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("duration_ms", &self.duration.as_millis())
            .finish()
    }
}

/// Whether an instance is still audible.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceStatus {
    Playing,
    Stopped,
}

/// A single playable copy of a buffer.
pub trait Instance: Send {
    /// Starts playback. Calling play on an instance that has already started does nothing.
    fn play(&mut self);

    /// Stops playback immediately.
    fn stop(&mut self);

    /// Sets the volume, 0-100.
    fn set_volume(&mut self, volume: u8);

    /// Reports the current status. Called with the instance tracker's lock held, so it must
    /// not block or take locks.
    fn status(&self) -> InstanceStatus;
}

/// Decodes files and creates playable instances.
pub trait Backend: fmt::Display + Send + Sync + 'static {
    /// Decodes the file at the given path into a buffer ready for playback.
    fn decode(&self, path: &Path) -> Result<Buffer, DecodeError>;

    /// Creates a new, not yet playing, instance of the buffer.
    fn instantiate(&self, buffer: &Buffer) -> Box<dyn Instance>;
}

/// Lists the output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, OutputError> {
    cpal::Device::list()
}

/// Gets the backend for the given device name. Names starting with "mock" produce a backend
/// that plays nothing.
pub fn get_backend(device: &str) -> Result<Arc<dyn Backend>, OutputError> {
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Backend::get(device)));
    }

    Ok(Arc::new(cpal::Device::get(device)?))
}
