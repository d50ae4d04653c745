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

//! Sound packs on disk.
//!
//! A pack is a directory of categories, each with `down/` and `up/` folders of clips:
//!
//! ```text
//! pack/
//!   alpha/down/*.wav  alpha/up/*.wav
//!   alt/...  enter/...  space/...
//! ```

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use tracing::{debug, info};

use super::SoundResolver;
use crate::keys::KeyId;

/// File extensions recognized as sounds.
const SOUND_EXTENSIONS: [&str; 4] = ["mp3", "wav", "ogg", "flac"];

#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("unable to read sound pack {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("sound pack {} contains no sounds", .0.display())]
    Empty(PathBuf),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Category {
    Alpha,
    Alt,
    Enter,
    Space,
}

impl Category {
    const ALL: [Category; 4] = [
        Category::Alpha,
        Category::Alt,
        Category::Enter,
        Category::Space,
    ];

    fn for_key(key: KeyId) -> Category {
        if key == KeyId::SPACE {
            Category::Space
        } else if key == KeyId::ENTER {
            Category::Enter
        } else if key.is_alt() {
            Category::Alt
        } else {
            Category::Alpha
        }
    }

    fn dir_name(&self) -> &'static str {
        match self {
            Category::Alpha => "alpha",
            Category::Alt => "alt",
            Category::Enter => "enter",
            Category::Space => "space",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

#[derive(Default, Clone)]
struct CategorySounds {
    down: Vec<PathBuf>,
    up: Vec<PathBuf>,
}

#[derive(Default)]
struct LoadedPack {
    path: PathBuf,
    categories: [CategorySounds; 4],
}

/// A sound resolver backed by a pack directory. The pack can be swapped while keys are being
/// resolved.
///
/// Each resolve picks a clip at random. A previewed pick is held until the next resolve of
/// that key and direction, so the clip warmed ahead of a press is the one it plays.
#[derive(Default)]
pub struct SoundPack {
    loaded: RwLock<LoadedPack>,
    picks: Mutex<HashMap<(KeyId, bool), PathBuf>>,
}

impl SoundPack {
    /// Creates a sound pack resolver from the given directory.
    pub fn open(path: &Path) -> Result<SoundPack, PackError> {
        let pack = SoundPack::default();
        pack.load(path)?;
        Ok(pack)
    }

    /// Replaces the current pack with the one at the given directory. On failure the
    /// current pack is kept.
    pub fn load(&self, path: &Path) -> Result<(), PackError> {
        let mut categories: [CategorySounds; 4] = Default::default();
        let mut total = 0;
        for category in Category::ALL {
            let dir = path.join(category.dir_name());
            let sounds = CategorySounds {
                down: list_sounds(&dir.join("down")),
                up: list_sounds(&dir.join("up")),
            };
            total += sounds.down.len() + sounds.up.len();
            categories[category.index()] = sounds;
        }

        if total == 0 {
            return Err(PackError::Empty(path.to_path_buf()));
        }

        info!(pack = ?path, sounds = total, "Sound pack loaded");
        *self.loaded.write() = LoadedPack {
            path: path.to_path_buf(),
            categories,
        };
        self.picks.lock().clear();
        Ok(())
    }

    /// Returns the directory of the current pack.
    pub fn path(&self) -> PathBuf {
        self.loaded.read().path.clone()
    }
}

impl SoundPack {
    fn pick(&self, key: KeyId, is_down: bool) -> Option<PathBuf> {
        let loaded = self.loaded.read();
        let sounds = &loaded.categories[Category::for_key(key).index()];
        let candidates = if is_down { &sounds.down } else { &sounds.up };
        candidates.choose(&mut rand::thread_rng()).cloned()
    }
}

impl SoundResolver for SoundPack {
    fn resolve(&self, key: KeyId, is_down: bool) -> Option<PathBuf> {
        if let Some(path) = self.picks.lock().remove(&(key, is_down)) {
            return Some(path);
        }
        self.pick(key, is_down)
    }

    fn preview(&self, key: KeyId, is_down: bool) -> Option<PathBuf> {
        let mut picks = self.picks.lock();
        if let Some(path) = picks.get(&(key, is_down)) {
            return Some(path.clone());
        }
        let path = self.pick(key, is_down)?;
        picks.insert((key, is_down), path.clone());
        Some(path)
    }
}

/// Lists the sound files in a directory, sorted. A missing directory has no sounds.
fn list_sounds(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = ?dir, err = %e, "Unable to read sound directory");
            return Vec::new();
        }
    };

    let mut sounds: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| SOUND_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        })
        .collect();
    sounds.sort();
    sounds
}

/// Lists the pack directories found directly under the given directory.
pub fn list_packs(dir: &Path) -> Result<Vec<PathBuf>, PackError> {
    let entries = fs::read_dir(dir).map_err(|source| PackError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut packs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_dir())
        .collect();
    packs.sort();
    Ok(packs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    fn make_pack(root: &Path) {
        touch(&root.join("alpha/down/a1.wav"));
        touch(&root.join("alpha/down/a2.mp3"));
        touch(&root.join("alpha/down/readme.txt"));
        touch(&root.join("alpha/up/a-up.wav"));
        touch(&root.join("space/down/space.wav"));
        touch(&root.join("enter/up/enter-up.ogg"));
    }

    #[test]
    fn test_resolve_by_category() {
        let dir = tempfile::tempdir().unwrap();
        make_pack(dir.path());
        let pack = SoundPack::open(dir.path()).unwrap();

        let down = pack.resolve(KeyId::A, true).unwrap();
        assert!(down.ends_with("a1.wav") || down.ends_with("a2.mp3"));
        assert!(pack.resolve(KeyId::A, false).unwrap().ends_with("a-up.wav"));
        assert!(pack
            .resolve(KeyId::SPACE, true)
            .unwrap()
            .ends_with("space.wav"));
        assert!(pack
            .resolve(KeyId::ENTER, false)
            .unwrap()
            .ends_with("enter-up.ogg"));

        // No space release sounds and no alt category at all.
        assert_eq!(pack.resolve(KeyId::SPACE, false), None);
        assert_eq!(pack.resolve(KeyId::LEFT_ALT, true), None);
    }

    #[test]
    fn test_previewed_clip_is_played() {
        let dir = tempfile::tempdir().unwrap();
        make_pack(dir.path());
        let pack = SoundPack::open(dir.path()).unwrap();

        for _ in 0..20 {
            let warmed = pack.preview(KeyId::A, true).unwrap();
            assert_eq!(pack.preview(KeyId::A, true).unwrap(), warmed);
            assert_eq!(pack.resolve(KeyId::A, true).unwrap(), warmed);
        }
        assert_eq!(pack.preview(KeyId::SPACE, false), None);
    }

    #[test]
    fn test_load_forgets_previews() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        make_pack(&first);
        touch(&second.join("alpha/down/other.wav"));

        let pack = SoundPack::open(&first).unwrap();
        pack.preview(KeyId::A, true).unwrap();
        pack.load(&second).unwrap();
        assert!(pack.resolve(KeyId::A, true).unwrap().ends_with("other.wav"));
    }

    #[test]
    fn test_empty_pack_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good");
        let empty = dir.path().join("empty");
        make_pack(&good);
        fs::create_dir_all(&empty).unwrap();

        let pack = SoundPack::open(&good).unwrap();
        assert!(matches!(pack.load(&empty), Err(PackError::Empty(_))));
        assert_eq!(pack.path(), good);
        assert!(pack.resolve(KeyId::A, true).is_some());
    }

    #[test]
    fn test_list_packs() {
        let dir = tempfile::tempdir().unwrap();
        make_pack(&dir.path().join("cherry"));
        make_pack(&dir.path().join("alps"));
        touch(&dir.path().join("notes.txt"));

        let packs = list_packs(dir.path()).unwrap();
        assert_eq!(
            packs,
            vec![dir.path().join("alps"), dir.path().join("cherry")]
        );
    }
}
