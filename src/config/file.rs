//! TOML configuration file loading
//!
//! Supports `~/.config/talkback/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct TalkbackConfigFile {
    /// Data directory override (chat history)
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Voice conversation configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Chat backend configuration
    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Speech provider configuration
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Voice conversation configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable voice mode
    pub enabled: Option<bool>,

    /// Silence after the last fragment before an utterance is finalized
    pub pause_ms: Option<u64>,

    /// Upper bound on a single listening round
    pub session_limit_ms: Option<u64>,

    /// Delay between the end of playback and listening again
    pub resume_delay_ms: Option<u64>,

    /// Recognition language tag (e.g. "en-US")
    pub language: Option<String>,

    /// Synthesis voice name
    pub voice: Option<String>,

    /// Speech rate multiplier
    pub rate: Option<f32>,

    /// Speech pitch multiplier
    pub pitch: Option<f32>,

    /// Automatic recognizer restarts allowed without a fragment in between
    pub max_restarts: Option<u32>,

    /// How often the microphone recognizer emits a partial transcript
    pub partial_interval_ms: Option<u64>,
}

/// Chat backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    /// AI backend base URL (e.g. `http://localhost:3002`)
    pub backend_url: Option<String>,

    /// Request timeout for a single round trip
    pub request_timeout_secs: Option<u64>,

    /// Remote chat sync base URL; local JSON file when unset
    pub sync_url: Option<String>,

    /// Bearer token for the sync endpoint
    pub sync_token: Option<String>,
}

/// Speech provider configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// STT provider ("whisper" or "deepgram")
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS provider ("openai" or "elevenlabs")
    pub tts_provider: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `TalkbackConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> TalkbackConfigFile {
    config_file_path().map_or_else(TalkbackConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or malformed files fall back to defaults with a warning.
pub fn load_from(path: &Path) -> TalkbackConfigFile {
    if !path.exists() {
        return TalkbackConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                TalkbackConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            TalkbackConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/talkback/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("talkback").join("config.toml"))
}
