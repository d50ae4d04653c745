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

//! Mapping keys to sound files.

use std::path::PathBuf;

use crate::keys::KeyId;

mod pack;

pub use pack::{list_packs, PackError, SoundPack};

/// Resolves the sound to play for a key transition. Implementations may change their mapping
/// at any time, so callers must tolerate a key that resolved before resolving to nothing.
pub trait SoundResolver: Send + Sync + 'static {
    /// Returns the sound for the key going down (`is_down`) or up, if any.
    fn resolve(&self, key: KeyId, is_down: bool) -> Option<PathBuf>;

    /// Returns the sound the next [SoundResolver::resolve] of the same key and direction is
    /// expected to give, for decoding ahead of time.
    fn preview(&self, key: KeyId, is_down: bool) -> Option<PathBuf> {
        self.resolve(key, is_down)
    }
}
