use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::sequencer::bank::{ClockSource, SequencerBank};
use crate::sequencer::editor::{MAX_ROOT, MIN_ROOT};
use crate::sequencer::scale::Scale;
use crate::sequencer::TrackRole;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    transport: TransportConfig,
    #[serde(default)]
    midi: MidiConfig,
    #[serde(default)]
    voice: Vec<VoiceConfig>,
}

#[derive(Deserialize, Default)]
struct TransportConfig {
    bpm: Option<u16>,
    clock: Option<String>,
}

#[derive(Deserialize, Default)]
struct MidiConfig {
    output_port: Option<String>,
    clock_input_port: Option<String>,
}

#[derive(Deserialize, Default, Clone)]
struct VoiceConfig {
    /// 1-16, as printed on hardware
    channel: Option<u8>,
    scale: Option<String>,
    root: Option<i16>,
    enabled: Option<bool>,
}

pub struct Config {
    transport: TransportConfig,
    midi: MidiConfig,
    voices: Vec<VoiceConfig>,
}

impl Config {
    /// Embedded defaults overlaid with the user's config file, if there is one.
    /// A user file that can't be read or parsed is logged and skipped.
    pub fn load() -> Self {
        let mut config = Self::embedded();

        if let Some(path) = user_config_path() {
            if path.exists() {
                match read_file(&path) {
                    Ok(user) => config.merge(user),
                    Err(e) => log::warn!(target: "config", "ignoring {}", e),
                }
            }
        }
        config
    }

    /// Embedded defaults overlaid with the file at `path`
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let user = read_file(path)?;
        let mut config = Self::embedded();
        config.merge(user);
        Ok(config)
    }

    fn embedded() -> Self {
        let base: ConfigFile = toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
            log::error!(target: "config", "embedded config.toml is malformed: {}", e);
            ConfigFile::default()
        });
        Self {
            transport: base.transport,
            midi: base.midi,
            voices: base.voice,
        }
    }

    fn merge(&mut self, user: ConfigFile) {
        if user.transport.bpm.is_some() {
            self.transport.bpm = user.transport.bpm;
        }
        if user.transport.clock.is_some() {
            self.transport.clock = user.transport.clock;
        }
        if user.midi.output_port.is_some() {
            self.midi.output_port = user.midi.output_port;
        }
        if user.midi.clock_input_port.is_some() {
            self.midi.clock_input_port = user.midi.clock_input_port;
        }

        for (index, voice) in user.voice.into_iter().enumerate() {
            match self.voices.get_mut(index) {
                Some(base) => merge_voice(base, voice),
                None => self.voices.push(voice),
            }
        }
    }

    pub fn bpm(&self) -> Option<u16> {
        self.transport.bpm
    }

    pub fn clock_source(&self) -> ClockSource {
        match self.transport.clock.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("internal") => ClockSource::Internal,
            Some("midi") => ClockSource::MidiClock,
            Some(other) => {
                log::warn!(target: "config", "unknown clock {:?}, using internal", other);
                ClockSource::Internal
            }
        }
    }

    pub fn output_port(&self) -> Option<&str> {
        self.midi.output_port.as_deref()
    }

    pub fn clock_input_port(&self) -> Option<&str> {
        self.midi.clock_input_port.as_deref()
    }

    /// Seed the bank's transport and voice settings. Values are clamped;
    /// anything unset keeps the bank's current value.
    pub fn apply(&self, bank: &mut SequencerBank) {
        if let Some(bpm) = self.transport.bpm {
            bank.set_bpm(bpm);
        }
        bank.clock_source = self.clock_source();

        if self.voices.len() > bank.voices().len() {
            log::warn!(
                target: "config",
                "{} voices configured, only the first {} are used",
                self.voices.len(),
                bank.voices().len()
            );
        }

        for (voice, cfg) in bank.voices_mut().iter_mut().zip(&self.voices) {
            if let Some(channel) = cfg.channel {
                voice.settings.channel = channel.clamp(1, 16) - 1;
            }
            if let Some(name) = cfg.scale.as_deref() {
                match Scale::from_name(name) {
                    Some(scale) => voice.settings.scale = scale,
                    None => log::warn!(target: "config", "unknown scale {:?}", name),
                }
            }
            if let Some(root) = cfg.root {
                voice.track_mut(TrackRole::Pitch).root = root.clamp(MIN_ROOT, MAX_ROOT);
            }
            if let Some(enabled) = cfg.enabled {
                voice.settings.enabled = enabled;
            }
        }
    }
}

fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("polyseq").join("config.toml"))
}

fn merge_voice(base: &mut VoiceConfig, user: VoiceConfig) {
    if user.channel.is_some() {
        base.channel = user.channel;
    }
    if user.scale.is_some() {
        base.scale = user.scale;
    }
    if user.root.is_some() {
        base.root = user.root;
    }
    if user.enabled.is_some() {
        base.enabled = user.enabled;
    }
}
