//! Speech-to-text over hosted APIs

use reqwest::RequestBuilder;
use reqwest::multipart::{Form, Part};

use crate::config::{ApiKeys, SpeechConfig, SttProvider};
use crate::{Error, Result};

const WHISPER_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEEPGRAM_URL: &str = "https://api.deepgram.com/v1/listen";

#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

impl DeepgramResponse {
    /// Best alternative of the first channel; empty when nothing was heard
    fn into_transcript(self) -> String {
        self.results
            .channels
            .into_iter()
            .next()
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default()
    }
}

/// Transcribes WAV audio with Whisper or Deepgram
#[derive(Clone)]
pub struct SpeechToText {
    client: reqwest::Client,
    provider: SttProvider,
    api_key: String,
    model: String,
    language: String,
}

impl SpeechToText {
    /// Create a client for the configured provider and recognition language
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is missing or empty
    pub fn from_config(speech: &SpeechConfig, keys: &ApiKeys, language: &str) -> Result<Self> {
        let (key, name) = match speech.stt_provider {
            SttProvider::Whisper => (keys.openai.as_deref(), "OpenAI"),
            SttProvider::Deepgram => (keys.deepgram.as_deref(), "Deepgram"),
        };
        let api_key = key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config(format!("{name} API key required for speech-to-text")))?;

        Ok(Self {
            client: reqwest::Client::new(),
            provider: speech.stt_provider,
            api_key: api_key.to_string(),
            model: speech.stt_model.clone(),
            language: language.to_string(),
        })
    }

    /// Transcribe WAV bytes; the result is trimmed and may be empty
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the provider rejects it
    pub async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        tracing::trace!(provider = ?self.provider, bytes = wav.len(), "transcribing");

        let request = match self.provider {
            SttProvider::Whisper => self.whisper_request(wav)?,
            SttProvider::Deepgram => self.deepgram_request(wav),
        };
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                provider = ?self.provider,
                status = %status,
                body = %body,
                "STT request rejected"
            );
            return Err(Error::Stt(format!("{:?} returned {status}: {body}", self.provider)));
        }

        let text = match self.provider {
            SttProvider::Whisper => response.json::<WhisperResponse>().await?.text,
            SttProvider::Deepgram => response.json::<DeepgramResponse>().await?.into_transcript(),
        };
        Ok(text.trim().to_string())
    }

    fn whisper_request(&self, wav: &[u8]) -> Result<RequestBuilder> {
        let file = Part::bytes(wav.to_vec())
            .file_name("speech.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::Stt(e.to_string()))?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("language", whisper_language(&self.language));

        Ok(self
            .client
            .post(WHISPER_URL)
            .bearer_auth(&self.api_key)
            .multipart(form))
    }

    fn deepgram_request(&self, wav: &[u8]) -> RequestBuilder {
        self.client
            .post(DEEPGRAM_URL)
            .query(&[
                ("model", self.model.as_str()),
                ("language", self.language.as_str()),
                ("punctuate", "true"),
            ])
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(wav.to_vec())
    }
}

/// Whisper takes an ISO-639-1 code ("en"), not a full tag ("en-US")
fn whisper_language(tag: &str) -> String {
    tag.split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}
