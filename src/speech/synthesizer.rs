//! Cloud TTS played through the default output device

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::audio::{AudioOutput, decode_mp3};
use crate::voice::{PlaybackRequest, PlaybackSink, SynthesisEngine, VoiceInfo};
use crate::{Error, Result};

use super::TextToSpeech;

/// Synthesizes with a hosted TTS API and plays the result
pub struct CloudSynthesizer {
    tts: TextToSpeech,
    cancel: Option<Arc<AtomicBool>>,
}

impl CloudSynthesizer {
    #[must_use]
    pub const fn new(tts: TextToSpeech) -> Self {
        Self { tts, cancel: None }
    }
}

impl SynthesisEngine for CloudSynthesizer {
    fn speak(&mut self, request: PlaybackRequest, sink: PlaybackSink) -> Result<()> {
        self.cancel();

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel = Some(Arc::clone(&cancel));
        let tts = self.tts.clone();

        tokio::spawn(async move {
            match synthesize_and_play(&tts, &request, cancel).await {
                Ok(()) => sink.ended(),
                Err(e) => sink.failed(e.to_string()),
            }
        });
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.store(true, Ordering::Relaxed);
        }
    }

    fn voices(&self) -> Vec<VoiceInfo> {
        self.tts.voices()
    }
}

async fn synthesize_and_play(
    tts: &TextToSpeech,
    request: &PlaybackRequest,
    cancel: Arc<AtomicBool>,
) -> Result<()> {
    let mp3 = tts.synthesize(request).await?;
    if cancel.load(Ordering::Relaxed) {
        return Ok(());
    }

    let audio = decode_mp3(&mp3)?;
    tracing::debug!(
        bytes = mp3.len(),
        duration_ms = audio.duration().as_millis(),
        "speech synthesized"
    );

    // cpal streams must stay on one thread; play on a blocking worker
    tokio::task::spawn_blocking(move || {
        let output = AudioOutput::new(audio.sample_rate)?;
        output.play_blocking(audio, &cancel)
    })
    .await
    .map_err(|e| Error::Synthesis(e.to_string()))??;

    Ok(())
}
