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

//! Settings loaded from an optional YAML file, overridden by `KEYCLACK_*` environment
//! variables. Nested keys use `__`, e.g. `KEYCLACK_LIMITS__CACHE_CAPACITY=200`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use duration_string::DurationString;
use serde::Deserialize;

use crate::engine::cache::DEFAULT_CACHE_CAPACITY;
use crate::engine::queue::DEFAULT_QUEUE_CAPACITY;
use crate::engine::tracker::{DEFAULT_MAX_INSTANCES, DEFAULT_VOLUME};
use crate::engine::warm::{DEFAULT_WARM_BACKLOG, DEFAULT_WARM_THREADS};
use crate::engine::worker::{
    WorkerTiming, DEFAULT_EXPIRY_SLACK, DEFAULT_SWEEP_INTERVAL, DEFAULT_TICK_INTERVAL,
};
use crate::engine::EngineSettings;
use crate::input::{DEFAULT_RELEASE_GUARD, DEFAULT_REPEAT_INTERVAL};
use crate::predict::{OptimizationLevel, DEFAULT_HISTORY_LENGTH};

mod error;

pub use error::ConfigError;

const ENV_PREFIX: &str = "KEYCLACK";
const DEFAULT_AUDIO_DEVICE: &str = "default";

/// Sizes of the bounded structures.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Limits {
    queue_capacity: Option<usize>,
    cache_capacity: Option<usize>,
    max_instances: Option<usize>,
    history_length: Option<usize>,
    warm_threads: Option<usize>,
    warm_backlog: Option<usize>,
}

/// Intervals, as duration strings like "25ms".
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Timing {
    repeat_interval: Option<String>,
    release_guard: Option<String>,
    expiry_slack: Option<String>,
    sweep_interval: Option<String>,
    tick_interval: Option<String>,
}

/// A YAML representation of the application settings.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Settings {
    /// The sound pack directory.
    sound_pack: Option<PathBuf>,

    /// The output device: "default", a cpal device name, or "mock*".
    audio_device: Option<String>,

    /// Playback volume, 0-100.
    volume: Option<u8>,

    /// Prediction level, 0-3.
    optimization_level: Option<u8>,

    #[serde(default)]
    limits: Limits,

    #[serde(default)]
    timing: Timing,

    /// Priority (0-99) to give the playback worker thread. Left alone if unset.
    worker_priority: Option<u8>,
}

impl Settings {
    /// Loads settings from the given file, if any, and the environment.
    pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }
        Settings::build(builder.add_source(Settings::environment()))
    }

    /// Parses settings from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Settings, ConfigError> {
        Settings::build(Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml)))
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Settings, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.engine_settings()?;
        Ok(settings)
    }

    pub fn sound_pack(&self) -> Option<&Path> {
        self.sound_pack.as_deref()
    }

    /// Overrides the sound pack, e.g. from the command line.
    pub fn set_sound_pack(&mut self, path: PathBuf) {
        self.sound_pack = Some(path);
    }

    pub fn audio_device(&self) -> &str {
        self.audio_device.as_deref().unwrap_or(DEFAULT_AUDIO_DEVICE)
    }

    /// Returns the volume, clamped to 100.
    pub fn volume(&self) -> u8 {
        self.volume.unwrap_or(DEFAULT_VOLUME).min(100)
    }

    /// Returns the optimization level, clamped to 3.
    pub fn optimization_level(&self) -> OptimizationLevel {
        self.optimization_level
            .map(OptimizationLevel::new)
            .unwrap_or_default()
    }

    /// Resolves every setting to the values the engine runs with.
    pub fn engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        let limits = &self.limits;
        let timing = &self.timing;

        let tick_interval = duration("timing.tick_interval", &timing.tick_interval)?
            .unwrap_or(DEFAULT_TICK_INTERVAL);
        if tick_interval.is_zero() {
            return Err(ConfigError::invalid(
                "timing.tick_interval",
                "must be greater than zero",
            ));
        }

        if let Some(priority) = self.worker_priority {
            if priority > 99 {
                return Err(ConfigError::invalid(
                    "worker_priority",
                    format!("{} is not between 0 and 99", priority),
                ));
            }
        }

        Ok(EngineSettings {
            volume: self.volume(),
            optimization_level: self.optimization_level(),
            queue_capacity: capacity(
                "limits.queue_capacity",
                limits.queue_capacity,
                DEFAULT_QUEUE_CAPACITY,
            )?,
            cache_capacity: capacity(
                "limits.cache_capacity",
                limits.cache_capacity,
                DEFAULT_CACHE_CAPACITY,
            )?,
            max_instances: capacity(
                "limits.max_instances",
                limits.max_instances,
                DEFAULT_MAX_INSTANCES,
            )?,
            history_length: capacity(
                "limits.history_length",
                limits.history_length,
                DEFAULT_HISTORY_LENGTH,
            )?,
            warm_threads: capacity(
                "limits.warm_threads",
                limits.warm_threads,
                DEFAULT_WARM_THREADS,
            )?,
            warm_backlog: capacity(
                "limits.warm_backlog",
                limits.warm_backlog,
                DEFAULT_WARM_BACKLOG,
            )?,
            repeat_interval: duration("timing.repeat_interval", &timing.repeat_interval)?
                .unwrap_or(DEFAULT_REPEAT_INTERVAL),
            release_guard: duration("timing.release_guard", &timing.release_guard)?
                .unwrap_or(DEFAULT_RELEASE_GUARD),
            timing: WorkerTiming {
                tick_interval,
                sweep_interval: duration("timing.sweep_interval", &timing.sweep_interval)?
                    .unwrap_or(DEFAULT_SWEEP_INTERVAL),
                expiry_slack: duration("timing.expiry_slack", &timing.expiry_slack)?
                    .unwrap_or(DEFAULT_EXPIRY_SLACK),
            },
            worker_priority: self.worker_priority,
        })
    }
}

fn capacity(
    field: &'static str,
    value: Option<usize>,
    default: usize,
) -> Result<usize, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::invalid(field, "must be greater than zero")),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

fn duration(field: &'static str, value: &Option<String>) -> Result<Option<Duration>, ConfigError> {
    value
        .as_ref()
        .map(|value| {
            DurationString::from_string(value.clone())
                .map(Duration::from)
                .map_err(|e| ConfigError::invalid(field, format!("{}: {}", value, e)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_yaml("{}").unwrap();
        assert_eq!(settings.audio_device(), "default");
        assert!(settings.sound_pack().is_none());

        let engine = settings.engine_settings().unwrap();
        assert_eq!(engine.volume, 50);
        assert_eq!(engine.optimization_level, OptimizationLevel::DEFAULT);
        assert_eq!(engine.queue_capacity, 64);
        assert_eq!(engine.cache_capacity, 100);
        assert_eq!(engine.max_instances, 32);
        assert_eq!(engine.history_length, 5);
        assert_eq!(engine.repeat_interval, Duration::from_millis(25));
        assert_eq!(engine.release_guard, Duration::from_millis(20));
        assert_eq!(engine.timing.expiry_slack, Duration::from_millis(200));
        assert_eq!(engine.timing.sweep_interval, Duration::from_secs(1));
        assert_eq!(engine.timing.tick_interval, Duration::from_millis(1));
        assert_eq!(engine.worker_priority, None);
    }

    #[test]
    fn test_parse() {
        let yaml = r#"
            sound_pack: /usr/share/keyclack/cream
            audio_device: mock-device
            volume: 80
            optimization_level: 3
            limits:
              cache_capacity: 200
              max_instances: 16
            timing:
              repeat_interval: 40ms
              sweep_interval: 500ms
            worker_priority: 60
        "#;

        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(
            settings.sound_pack(),
            Some(Path::new("/usr/share/keyclack/cream"))
        );
        assert_eq!(settings.audio_device(), "mock-device");

        let engine = settings.engine_settings().unwrap();
        assert_eq!(engine.volume, 80);
        assert_eq!(engine.optimization_level, OptimizationLevel::EAGER);
        assert_eq!(engine.cache_capacity, 200);
        assert_eq!(engine.max_instances, 16);
        assert_eq!(engine.queue_capacity, 64);
        assert_eq!(engine.repeat_interval, Duration::from_millis(40));
        assert_eq!(engine.timing.sweep_interval, Duration::from_millis(500));
        assert_eq!(engine.worker_priority, Some(60));
    }

    #[test]
    fn test_clamped() {
        let settings = Settings::from_yaml("volume: 250\noptimization_level: 9").unwrap();
        assert_eq!(settings.volume(), 100);
        assert_eq!(settings.optimization_level(), OptimizationLevel::EAGER);
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            Settings::from_yaml("limits:\n  queue_capacity: 0"),
            Err(ConfigError::Invalid {
                field: "limits.queue_capacity",
                ..
            })
        ));
        assert!(matches!(
            Settings::from_yaml("timing:\n  release_guard: soon"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            Settings::from_yaml("worker_priority: 120"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            Settings::from_yaml("volume: loud"),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "volume: 30\nlimits:\n  max_instances: 8").unwrap();

        let env = config::Map::from([
            ("KEYCLACK_VOLUME".to_string(), "70".to_string()),
            (
                "KEYCLACK_LIMITS__CACHE_CAPACITY".to_string(),
                "12".to_string(),
            ),
        ]);
        let settings = Settings::build(
            Config::builder()
                .add_source(File::from(file.path()).format(FileFormat::Yaml))
                .add_source(Settings::environment().source(Some(env))),
        )
        .unwrap();

        let engine = settings.engine_settings().unwrap();
        assert_eq!(engine.volume, 70);
        assert_eq!(engine.cache_capacity, 12);
        assert_eq!(engine.max_instances, 8);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Settings::load(Some(Path::new("/nonexistent/keyclack.yaml"))),
            Err(ConfigError::Load(_))
        ));
    }
}
