use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ParleyError, Result};

/// Environment variable consulted for the OpenAI credential.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

fn default_stt_backend() -> String {
    "openai".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_whisper_model_size() -> String {
    "base".to_string()
}

fn default_openai_model() -> String {
    "whisper-1".to_string()
}

const fn default_min_silence_gap_ms() -> u64 {
    1000
}

const fn default_silence_threshold_dbfs() -> f32 {
    -40.0
}

const fn default_retained_silence_ms() -> u64 {
    500
}

const fn default_chunk_frames() -> usize {
    4000
}

const fn default_pause_threshold_secs() -> f64 {
    1.0
}

fn default_extension() -> String {
    "txt".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stt: SttConfig,

    #[serde(default)]
    pub segmenter: SegmenterConfig,

    #[serde(default)]
    pub speaker: SpeakerConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SttConfig {
    #[serde(default = "default_stt_backend")]
    pub backend: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_whisper_model_size")]
    pub whisper_model_size: String,

    pub model_path: Option<String>,

    pub openai_api_key: Option<String>,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Argument vector for the `command` backend. `{audio}` is replaced by
    /// the path of the unit's scratch WAV file.
    #[serde(default)]
    pub command: Vec<String>,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            backend: default_stt_backend(),
            language: default_language(),
            whisper_model_size: default_whisper_model_size(),
            model_path: None,
            openai_api_key: None,
            openai_model: default_openai_model(),
            command: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmenterConfig {
    #[serde(default = "default_min_silence_gap_ms")]
    pub min_silence_gap_ms: u64,

    #[serde(default = "default_silence_threshold_dbfs")]
    pub silence_threshold_dbfs: f32,

    #[serde(default = "default_retained_silence_ms")]
    pub retained_silence_ms: u64,

    /// Samples per block fed to a streaming recognizer.
    #[serde(default = "default_chunk_frames")]
    pub chunk_frames: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_silence_gap_ms: default_min_silence_gap_ms(),
            silence_threshold_dbfs: default_silence_threshold_dbfs(),
            retained_silence_ms: default_retained_silence_ms(),
            chunk_frames: default_chunk_frames(),
        }
    }
}

/// How speaker changes are inferred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerMode {
    /// Pause-based for backends that return their own timestamps, index-based otherwise.
    #[default]
    Auto,
    /// Flip speakers when the gap between utterances exceeds the pause threshold.
    Pause,
    /// Flip speakers on every utterance.
    Index,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeakerConfig {
    #[serde(default)]
    pub mode: SpeakerMode,

    #[serde(default = "default_pause_threshold_secs")]
    pub pause_threshold_secs: f64,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            mode: SpeakerMode::Auto,
            pause_threshold_secs: default_pause_threshold_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Extension enforced on transcript files.
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ParleyError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            ParleyError::Config(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: Self = serde_yaml_ng::from_str(&contents).map_err(|e| {
            ParleyError::Config(format!(
                "failed to parse config file {}: {e}",
                path.display()
            ))
        })?;

        Ok(config)
    }

    /// Load an explicitly requested config file, or fall back to the default
    /// location and finally to built-in defaults when no file exists there.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            tracing::debug!("no config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    #[must_use]
    pub fn default_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
        config_dir.join("parley/config.yaml")
    }

    /// Expand `~` in a path string to the user's home directory.
    #[must_use]
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(path)
    }

    /// Pre-flight checks run before any audio is touched.
    pub fn validate(&self) -> Result<()> {
        match self.stt.backend.as_str() {
            "openai" => {
                if self
                    .stt
                    .openai_api_key
                    .as_deref()
                    .is_none_or(|k| k.trim().is_empty())
                {
                    return Err(ParleyError::Config(format!(
                        "openai backend requires an API key (--api-key, {OPENAI_API_KEY_ENV}, or stt.openai_api_key)"
                    )));
                }
            }
            "command" => {
                if self.stt.command.is_empty() {
                    return Err(ParleyError::Config(
                        "command backend requires stt.command to be set".to_string(),
                    ));
                }
            }
            "vosk" | "whisper" => {}
            other => {
                return Err(ParleyError::Config(format!(
                    "unknown STT backend: {other} (available: openai, command, whisper, vosk)"
                )));
            }
        }

        if self.segmenter.chunk_frames == 0 {
            return Err(ParleyError::Config(
                "segmenter.chunk_frames must be greater than zero".to_string(),
            ));
        }

        if self.speaker.pause_threshold_secs < 0.0 {
            return Err(ParleyError::Config(
                "speaker.pause_threshold_secs must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}
