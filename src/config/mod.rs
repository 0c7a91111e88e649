//! Configuration management for talkback

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Default silence before an utterance is finalized
pub const DEFAULT_PAUSE_MS: u64 = 1000;

/// Default upper bound on one listening round
pub const DEFAULT_SESSION_LIMIT_MS: u64 = 30_000;

/// Default delay between playback end and listening again
pub const DEFAULT_RESUME_DELAY_MS: u64 = 500;

/// Default interval between partial transcripts of the microphone recognizer
pub const DEFAULT_PARTIAL_INTERVAL_MS: u64 = 300;

/// Default chat backend
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3002";

/// talkback configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to data directory (chat history)
    pub data_dir: PathBuf,

    /// Voice conversation configuration
    pub voice: VoiceConfig,

    /// Chat backend configuration
    pub chat: ChatConfig,

    /// Speech provider configuration
    pub speech: SpeechConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Voice conversation configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable voice mode
    pub enabled: bool,

    /// Silence after the last fragment before finalizing
    pub pause: Duration,

    /// Upper bound on a single listening round, armed on its first fragment
    pub session_limit: Duration,

    /// Delay between the natural end of playback and listening again
    pub resume_delay: Duration,

    /// Recognition language tag
    pub language: String,

    /// Preferred synthesis voice; engine default when unset
    pub voice: Option<String>,

    /// Speech rate multiplier (0.25 to 4.0)
    pub rate: f32,

    /// Speech pitch multiplier (0.0 to 2.0)
    pub pitch: f32,

    /// Automatic recognizer restarts allowed without a fragment in between
    pub max_restarts: u32,

    /// How often the microphone recognizer emits a partial transcript;
    /// must stay below `pause` so continuous speech keeps the pause timer fed
    pub partial_interval: Duration,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pause: Duration::from_millis(DEFAULT_PAUSE_MS),
            session_limit: Duration::from_millis(DEFAULT_SESSION_LIMIT_MS),
            resume_delay: Duration::from_millis(DEFAULT_RESUME_DELAY_MS),
            language: "en-US".to_string(),
            voice: None,
            rate: 1.0,
            pitch: 1.0,
            max_restarts: 3,
            partial_interval: Duration::from_millis(DEFAULT_PARTIAL_INTERVAL_MS),
        }
    }
}

impl VoiceConfig {
    /// Check timer and playback settings
    ///
    /// # Errors
    ///
    /// Returns error if any setting is out of range
    pub fn validate(&self) -> Result<()> {
        if self.pause.is_zero() {
            return Err(Error::Config("voice.pause_ms must be positive".to_string()));
        }
        if self.session_limit <= self.pause {
            return Err(Error::Config(
                "voice.session_limit_ms must be larger than voice.pause_ms".to_string(),
            ));
        }
        if !(0.25..=4.0).contains(&self.rate) {
            return Err(Error::Config(format!(
                "voice.rate must be between 0.25 and 4.0, got {}",
                self.rate
            )));
        }
        if !(0.0..=2.0).contains(&self.pitch) {
            return Err(Error::Config(format!(
                "voice.pitch must be between 0.0 and 2.0, got {}",
                self.pitch
            )));
        }
        if self.partial_interval.is_zero() {
            return Err(Error::Config(
                "voice.partial_interval_ms must be positive".to_string(),
            ));
        }
        if self.partial_interval >= self.pause {
            return Err(Error::Config(
                "voice.partial_interval_ms must be smaller than voice.pause_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Chat backend configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// AI backend base URL
    pub backend_url: String,

    /// Timeout for one send/reply round trip
    pub request_timeout: Duration,

    /// Remote chat sync base URL; local JSON file when unset
    pub sync_url: Option<String>,

    /// Bearer token for the sync endpoint
    pub sync_token: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            sync_url: None,
            sync_token: None,
        }
    }
}

/// Speech-to-text provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SttProvider {
    /// `OpenAI` Whisper
    #[default]
    Whisper,
    /// Deepgram
    Deepgram,
}

/// Text-to-speech provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsProvider {
    /// `OpenAI` speech
    #[default]
    OpenAi,
    /// `ElevenLabs`
    ElevenLabs,
}

/// Speech provider configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// STT backend
    pub stt_provider: SttProvider,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// TTS backend
    pub tts_provider: TtsProvider,

    /// TTS model (e.g. "tts-1", "eleven_monolingual_v1")
    pub tts_model: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt_provider: SttProvider::Whisper,
            stt_model: "whisper-1".to_string(),
            tts_provider: TtsProvider::OpenAi,
            tts_model: "tts-1".to_string(),
        }
    }
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper and TTS)
    pub openai: Option<String>,

    /// Deepgram API key (optional STT)
    pub deepgram: Option<String>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<String>,
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load() -> Result<Self> {
        Self::load_with_options(false)
    }

    /// Load configuration with explicit voice disable option
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load_with_options(disable_voice: bool) -> Result<Self> {
        let config = Self::from_file(file::load_config_file(), disable_voice)?;
        config.voice.validate()?;
        Ok(config)
    }

    /// Build a configuration from a parsed config file, applying env overrides
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is not recognized
    pub fn from_file(fc: file::TalkbackConfigFile, disable_voice: bool) -> Result<Self> {
        let defaults = VoiceConfig::default();
        let env_disabled = std::env::var("TALKBACK_DISABLE_VOICE")
            .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

        let voice = VoiceConfig {
            enabled: !disable_voice && !env_disabled && fc.voice.enabled.unwrap_or(true),
            pause: fc
                .voice
                .pause_ms
                .map_or(defaults.pause, Duration::from_millis),
            session_limit: fc
                .voice
                .session_limit_ms
                .map_or(defaults.session_limit, Duration::from_millis),
            resume_delay: fc
                .voice
                .resume_delay_ms
                .map_or(defaults.resume_delay, Duration::from_millis),
            language: fc.voice.language.unwrap_or(defaults.language),
            voice: fc.voice.voice,
            rate: fc.voice.rate.unwrap_or(defaults.rate),
            pitch: fc.voice.pitch.unwrap_or(defaults.pitch),
            max_restarts: fc.voice.max_restarts.unwrap_or(defaults.max_restarts),
            partial_interval: fc
                .voice
                .partial_interval_ms
                .map_or(defaults.partial_interval, Duration::from_millis),
        };

        let chat_defaults = ChatConfig::default();
        let chat = ChatConfig {
            backend_url: std::env::var("TALKBACK_BACKEND_URL")
                .ok()
                .or(fc.chat.backend_url)
                .unwrap_or(chat_defaults.backend_url),
            request_timeout: fc
                .chat
                .request_timeout_secs
                .map_or(chat_defaults.request_timeout, Duration::from_secs),
            sync_url: std::env::var("TALKBACK_SYNC_URL").ok().or(fc.chat.sync_url),
            sync_token: std::env::var("TALKBACK_SYNC_TOKEN")
                .ok()
                .or(fc.chat.sync_token),
        };

        let speech_defaults = SpeechConfig::default();
        let stt_provider = match fc.speech.stt_provider.as_deref() {
            None | Some("whisper") => SttProvider::Whisper,
            Some("deepgram") => SttProvider::Deepgram,
            Some(other) => {
                return Err(Error::Config(format!("unknown STT provider: {other}")));
            }
        };
        let tts_provider = match fc.speech.tts_provider.as_deref() {
            None | Some("openai") => TtsProvider::OpenAi,
            Some("elevenlabs") => TtsProvider::ElevenLabs,
            Some(other) => {
                return Err(Error::Config(format!("unknown TTS provider: {other}")));
            }
        };
        let speech = SpeechConfig {
            stt_provider,
            stt_model: fc.speech.stt_model.unwrap_or_else(|| match stt_provider {
                SttProvider::Whisper => speech_defaults.stt_model.clone(),
                SttProvider::Deepgram => "nova-2".to_string(),
            }),
            tts_provider,
            tts_model: fc.speech.tts_model.unwrap_or_else(|| match tts_provider {
                TtsProvider::OpenAi => speech_defaults.tts_model.clone(),
                TtsProvider::ElevenLabs => "eleven_monolingual_v1".to_string(),
            }),
        };

        let api_keys = ApiKeys {
            openai: std::env::var("OPENAI_API_KEY").ok().or(fc.api_keys.openai),
            deepgram: std::env::var("DEEPGRAM_API_KEY")
                .ok()
                .or(fc.api_keys.deepgram),
            elevenlabs: std::env::var("ELEVENLABS_API_KEY")
                .ok()
                .or(fc.api_keys.elevenlabs),
        };

        let data_dir = std::env::var("TALKBACK_DATA_DIR")
            .ok()
            .or(fc.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);

        Ok(Self {
            data_dir,
            voice,
            chat,
            speech,
            api_keys,
        })
    }

    /// Path of the local chat history file
    #[must_use]
    pub fn chats_path(&self) -> PathBuf {
        self.data_dir.join("chats.json")
    }
}

/// Default data directory: platform data dir, or `./.talkback` as a fallback
fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "omni", "talkback").map_or_else(
        || PathBuf::from(".talkback"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let voice = VoiceConfig::default();
        assert!(voice.validate().is_ok());
        assert_eq!(voice.pause, Duration::from_millis(1000));
        assert_eq!(voice.session_limit, Duration::from_secs(30));
        assert_eq!(voice.resume_delay, Duration::from_millis(500));
        assert!(voice.partial_interval < voice.pause);
    }

    #[test]
    fn test_partial_interval_must_be_below_pause() {
        let voice = VoiceConfig {
            partial_interval: Duration::from_millis(1000),
            ..VoiceConfig::default()
        };
        assert!(matches!(voice.validate(), Err(Error::Config(_))));

        let voice = VoiceConfig {
            pause: Duration::from_millis(1500),
            partial_interval: Duration::from_millis(1000),
            ..VoiceConfig::default()
        };
        assert!(voice.validate().is_ok());
    }

    #[test]
    fn test_session_limit_must_exceed_pause() {
        let voice = VoiceConfig {
            session_limit: Duration::from_millis(500),
            ..VoiceConfig::default()
        };
        assert!(matches!(voice.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_pause_rejected() {
        let voice = VoiceConfig {
            pause: Duration::ZERO,
            ..VoiceConfig::default()
        };
        assert!(voice.validate().is_err());
    }

    #[test]
    fn test_rate_out_of_range_rejected() {
        let voice = VoiceConfig {
            rate: 5.0,
            ..VoiceConfig::default()
        };
        assert!(voice.validate().is_err());
    }

    #[test]
    fn test_file_overlay() {
        let fc: file::TalkbackConfigFile = toml::from_str(
            r#"
            [voice]
            pause_ms = 1500
            resume_delay_ms = 0

            [speech]
            tts_provider = "elevenlabs"
            "#,
        )
        .unwrap();

        let config = Config::from_file(fc, false).unwrap();
        assert_eq!(config.voice.pause, Duration::from_millis(1500));
        assert!(config.voice.resume_delay.is_zero());
        assert_eq!(config.speech.tts_provider, TtsProvider::ElevenLabs);
        assert_eq!(config.speech.tts_model, "eleven_monolingual_v1");
        assert_eq!(config.speech.stt_provider, SttProvider::Whisper);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let fc: file::TalkbackConfigFile = toml::from_str(
            r#"
            [speech]
            stt_provider = "carrier-pigeon"
            "#,
        )
        .unwrap();

        assert!(Config::from_file(fc, false).is_err());
    }

    #[test]
    fn test_disable_voice_flag() {
        let config = Config::from_file(file::TalkbackConfigFile::default(), true).unwrap();
        assert!(!config.voice.enabled);
    }
}
