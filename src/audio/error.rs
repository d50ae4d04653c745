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

/// Error types for decoding sound files.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unable to open {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("audio file error: {0}")]
    Audio(#[from] symphonia::core::errors::Error),

    #[error("no audio track found in {}", .0.display())]
    NoTrack(PathBuf),

    #[error("unsupported audio in {}: {reason}", .path.display())]
    Unsupported { path: PathBuf, reason: String },
}

/// Error types for setting up audio output.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("no output device found with name {0}")]
    NotFound(String),

    #[error("unable to list devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("unable to read device name: {0}")]
    Name(#[from] cpal::DeviceNameError),

    #[error("unable to get default stream config: {0}")]
    StreamConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("unable to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("unable to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("unsupported output sample format {0}")]
    UnsupportedFormat(String),

    #[error("output thread exited before the stream started")]
    ThreadExited,
}
