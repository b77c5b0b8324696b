use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::channel::DEFAULT_ENCODER_DIVISOR;
use crate::meter::{DEFAULT_CLIP_THRESHOLD_DB, DEFAULT_METER_SCALE};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    mixer: MixerFile,
    #[serde(default)]
    surface: SurfaceFile,
    #[serde(default)]
    tuning: TuningFile,
    #[serde(default)]
    metering: MeteringFile,
}

#[derive(Deserialize, Default)]
struct MixerFile {
    port: Option<u16>,
    handshake_timeout_ms: Option<u64>,
    refresh_interval_secs: Option<u64>,
    initial_read_spacing_ms: Option<u64>,
}

#[derive(Deserialize, Default)]
struct SurfaceFile {
    port_match: Option<String>,
    midi_channel: Option<u8>,
}

#[derive(Deserialize, Default)]
struct TuningFile {
    encoder_divisor: Option<f32>,
    fader_quit_threshold: Option<f32>,
}

#[derive(Deserialize, Default)]
struct MeteringFile {
    clip_threshold_db: Option<f32>,
    meter_scale: Option<f32>,
    excluded_channels: Option<Vec<usize>>,
    headamp_step: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixerConfig {
    pub port: u16,
    pub handshake_timeout_ms: u64,
    pub refresh_interval_secs: u64,
    pub initial_read_spacing_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceConfig {
    /// Case-insensitive substring of the MIDI port name
    pub port_match: String,
    pub midi_channel: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TuningConfig {
    pub encoder_divisor: f32,
    pub fader_quit_threshold: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeteringConfig {
    pub clip_threshold_db: f32,
    pub meter_scale: f32,
    pub excluded_channels: Vec<usize>,
    pub headamp_step: i32,
}

/// Runtime settings: the embedded defaults overridden field by field by the
/// user's `config.toml`.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub mixer: MixerConfig,
    pub surface: SurfaceConfig,
    pub tuning: TuningConfig,
    pub metering: MeteringConfig,
}

impl Default for Config {
    /// The embedded defaults only.
    fn default() -> Self {
        Self::resolve(embedded())
    }
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(user_config_path().as_deref())
    }

    /// Embedded defaults plus the overrides in `path`, if it exists. A file
    /// that cannot be read or parsed is logged and ignored.
    pub fn load_from(path: Option<&Path>) -> Self {
        let mut base = embedded();

        if let Some(path) = path {
            if path.exists() {
                match std::fs::read_to_string(path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => {
                            log::info!(target: "config", "using {}", path.display());
                            merge_mixer(&mut base.mixer, user.mixer);
                            merge_surface(&mut base.surface, user.surface);
                            merge_tuning(&mut base.tuning, user.tuning);
                            merge_metering(&mut base.metering, user.metering);
                        }
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        Self::resolve(base)
    }

    fn resolve(file: ConfigFile) -> Self {
        Self {
            mixer: MixerConfig {
                port: file.mixer.port.unwrap_or(10024),
                handshake_timeout_ms: file.mixer.handshake_timeout_ms.unwrap_or(500),
                refresh_interval_secs: file.mixer.refresh_interval_secs.unwrap_or(5).max(1),
                initial_read_spacing_ms: file.mixer.initial_read_spacing_ms.unwrap_or(10),
            },
            surface: SurfaceConfig {
                port_match: file
                    .surface
                    .port_match
                    .unwrap_or_else(|| "x-touch mini".to_string()),
                midi_channel: file.surface.midi_channel.unwrap_or(0).min(15),
            },
            tuning: TuningConfig {
                encoder_divisor: file
                    .tuning
                    .encoder_divisor
                    .filter(|d| *d > 0.0)
                    .unwrap_or(DEFAULT_ENCODER_DIVISOR),
                fader_quit_threshold: file
                    .tuning
                    .fader_quit_threshold
                    .unwrap_or(0.98)
                    .clamp(0.0, 1.0),
            },
            metering: MeteringConfig {
                clip_threshold_db: file
                    .metering
                    .clip_threshold_db
                    .unwrap_or(DEFAULT_CLIP_THRESHOLD_DB),
                meter_scale: file
                    .metering
                    .meter_scale
                    .filter(|s| *s > 0.0)
                    .unwrap_or(DEFAULT_METER_SCALE),
                excluded_channels: file.metering.excluded_channels.unwrap_or_default(),
                headamp_step: file.metering.headamp_step.unwrap_or(-1),
            },
        }
    }
}

fn embedded() -> ConfigFile {
    toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
        log::error!(target: "config", "embedded config.toml is malformed: {}", e);
        ConfigFile::default()
    })
}

/// `<config_dir>/xair-remote`, where the user config, layout and log live.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("xair-remote"))
}

fn user_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

fn merge_mixer(base: &mut MixerFile, user: MixerFile) {
    if user.port.is_some() {
        base.port = user.port;
    }
    if user.handshake_timeout_ms.is_some() {
        base.handshake_timeout_ms = user.handshake_timeout_ms;
    }
    if user.refresh_interval_secs.is_some() {
        base.refresh_interval_secs = user.refresh_interval_secs;
    }
    if user.initial_read_spacing_ms.is_some() {
        base.initial_read_spacing_ms = user.initial_read_spacing_ms;
    }
}

fn merge_surface(base: &mut SurfaceFile, user: SurfaceFile) {
    if user.port_match.is_some() {
        base.port_match = user.port_match;
    }
    if user.midi_channel.is_some() {
        base.midi_channel = user.midi_channel;
    }
}

fn merge_tuning(base: &mut TuningFile, user: TuningFile) {
    if user.encoder_divisor.is_some() {
        base.encoder_divisor = user.encoder_divisor;
    }
    if user.fader_quit_threshold.is_some() {
        base.fader_quit_threshold = user.fader_quit_threshold;
    }
}

fn merge_metering(base: &mut MeteringFile, user: MeteringFile) {
    if user.clip_threshold_db.is_some() {
        base.clip_threshold_db = user.clip_threshold_db;
    }
    if user.meter_scale.is_some() {
        base.meter_scale = user.meter_scale;
    }
    if user.excluded_channels.is_some() {
        base.excluded_channels = user.excluded_channels;
    }
    if user.headamp_step.is_some() {
        base.headamp_step = user.headamp_step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_config_parses() {
        let _: ConfigFile = toml::from_str(DEFAULT_CONFIG).unwrap();
        let config = Config::default();
        assert_eq!(config.mixer.port, 10024);
        assert_eq!(config.mixer.handshake_timeout_ms, 500);
        assert_eq!(config.tuning.encoder_divisor, 200.0);
        assert_eq!(config.metering.clip_threshold_db, -3.0);
        assert_eq!(config.metering.excluded_channels, vec![8, 9, 10, 11]);
        assert_eq!(config.surface.port_match, "x-touch mini");
    }

    #[test]
    fn user_file_overrides_single_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[tuning]\nencoder_divisor = 100.0\n\n[metering]\nexcluded_channels = []\n",
        )
        .unwrap();
        let config = Config::load_from(Some(&path));
        assert_eq!(config.tuning.encoder_divisor, 100.0);
        assert_eq!(config.tuning.fader_quit_threshold, 0.98);
        assert!(config.metering.excluded_channels.is_empty());
        assert_eq!(config.mixer.refresh_interval_secs, 5);
    }

    #[test]
    fn malformed_or_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tuning\nencoder_divisor = ").unwrap();
        assert_eq!(Config::load_from(Some(&path)), Config::default());
        assert_eq!(
            Config::load_from(Some(&dir.path().join("absent.toml"))),
            Config::default()
        );
    }

    #[test]
    fn nonsense_values_are_sanitized() {
        let file: ConfigFile =
            toml::from_str("[tuning]\nencoder_divisor = 0.0\nfader_quit_threshold = 4.0\n").unwrap();
        let config = Config::resolve(file);
        assert_eq!(config.tuning.encoder_divisor, DEFAULT_ENCODER_DIVISOR);
        assert_eq!(config.tuning.fader_quit_threshold, 1.0);
    }
}
