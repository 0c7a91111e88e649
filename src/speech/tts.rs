//! Text-to-speech over hosted APIs

use reqwest::RequestBuilder;
use serde::Serialize;

use crate::config::{ApiKeys, SpeechConfig, TtsProvider};
use crate::voice::{PlaybackRequest, VoiceInfo};
use crate::{Error, Result};

const OPENAI_SPEECH_URL: &str = "https://api.openai.com/v1/audio/speech";
const ELEVENLABS_SPEECH_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

/// Voices offered by the `OpenAI` speech API; the first is the default
const OPENAI_VOICES: &[&str] = &["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

/// `ElevenLabs` voice used when none is configured ("Rachel")
const ELEVENLABS_DEFAULT_VOICE: &str = "21m00Tcm4TlvDq8ikWAM";

#[derive(Serialize)]
struct OpenAiSpeech<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
}

#[derive(Serialize)]
struct ElevenLabsSpeech<'a> {
    text: &'a str,
    model_id: &'a str,
}

/// Synthesizes MP3 speech with `OpenAI` or `ElevenLabs`
#[derive(Clone)]
pub struct TextToSpeech {
    client: reqwest::Client,
    provider: TtsProvider,
    api_key: String,
    model: String,
}

impl TextToSpeech {
    /// Create a client for the configured provider
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is missing or empty
    pub fn from_config(speech: &SpeechConfig, keys: &ApiKeys) -> Result<Self> {
        let (key, name) = match speech.tts_provider {
            TtsProvider::OpenAi => (keys.openai.as_deref(), "OpenAI"),
            TtsProvider::ElevenLabs => (keys.elevenlabs.as_deref(), "ElevenLabs"),
        };
        let api_key = key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config(format!("{name} API key required for text-to-speech")))?;

        Ok(Self {
            client: reqwest::Client::new(),
            provider: speech.tts_provider,
            api_key: api_key.to_string(),
            model: speech.tts_model.clone(),
        })
    }

    /// Voices this provider can speak with
    #[must_use]
    pub fn voices(&self) -> Vec<VoiceInfo> {
        let names: &[&str] = match self.provider {
            TtsProvider::OpenAi => OPENAI_VOICES,
            TtsProvider::ElevenLabs => &[ELEVENLABS_DEFAULT_VOICE],
        };
        names
            .iter()
            .enumerate()
            .map(|(i, name)| VoiceInfo {
                name: (*name).to_string(),
                language: None,
                default: i == 0,
            })
            .collect()
    }

    /// Synthesize a playback request to MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the provider rejects it
    pub async fn synthesize(&self, request: &PlaybackRequest) -> Result<Vec<u8>> {
        let response = match self.provider {
            TtsProvider::OpenAi => self.openai_request(request),
            TtsProvider::ElevenLabs => self.elevenlabs_request(request),
        }
        .send()
        .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("{:?} returned {status}: {body}", self.provider)));
        }

        Ok(response.bytes().await?.to_vec())
    }

    // OpenAI has no pitch control; ElevenLabs has neither rate nor pitch
    fn openai_request(&self, request: &PlaybackRequest) -> RequestBuilder {
        self.client
            .post(OPENAI_SPEECH_URL)
            .bearer_auth(&self.api_key)
            .json(&OpenAiSpeech {
                model: &self.model,
                input: &request.text,
                voice: request.voice.as_deref().unwrap_or(OPENAI_VOICES[0]),
                speed: request.rate,
            })
    }

    fn elevenlabs_request(&self, request: &PlaybackRequest) -> RequestBuilder {
        let voice = request.voice.as_deref().unwrap_or(ELEVENLABS_DEFAULT_VOICE);
        self.client
            .post(format!("{ELEVENLABS_SPEECH_URL}/{voice}"))
            .header("xi-api-key", &self.api_key)
            .json(&ElevenLabsSpeech {
                text: &request.text,
                model_id: &self.model,
            })
    }
}
