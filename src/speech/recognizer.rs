//! Microphone recognizer with periodic cloud transcription
//!
//! Audio is captured on a dedicated thread (cpal streams are not `Send`).
//! A tokio task re-transcribes the whole capture every partial interval
//! while new speech keeps arriving, so each fragment is the full transcript
//! of the run so far.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::audio::{AudioCapture, SAMPLE_RATE, SampleBuffer, rms_energy, samples_to_wav};
use crate::voice::{RecognitionEngine, RecognitionSink};
use crate::{Error, Result};

use super::SpeechToText;

/// Minimum energy for a captured chunk to count as speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// How often the capture thread checks its stop flag
const CAPTURE_POLL: Duration = Duration::from_millis(20);

/// Streaming recognizer over the default input device
pub struct MicRecognizer {
    stt: Option<SpeechToText>,
    partial_interval: Duration,
    input_available: bool,
    stop: Option<Arc<AtomicBool>>,
}

impl MicRecognizer {
    /// Create a recognizer; unsupported when `stt` is `None` or there is no microphone
    #[must_use]
    pub fn new(stt: Option<SpeechToText>, partial_interval: Duration) -> Self {
        Self {
            stt,
            partial_interval,
            input_available: AudioCapture::input_available(),
            stop: None,
        }
    }

    /// Open the microphone on its own thread; the sample buffer arrives on
    /// the returned channel once the device is recording
    fn open_capture(stop: Arc<AtomicBool>) -> Result<oneshot::Receiver<Result<SampleBuffer>>> {
        let (ready_tx, ready_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let mut capture = match AudioCapture::new().and_then(|mut c| {
                    c.start()?;
                    Ok(c)
                }) {
                    Ok(capture) => capture,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(capture.buffer()));

                while !stop.load(Ordering::Relaxed) {
                    std::thread::sleep(CAPTURE_POLL);
                }
                capture.stop();
            })?;

        Ok(ready_rx)
    }
}

impl RecognitionEngine for MicRecognizer {
    fn is_supported(&self) -> bool {
        self.stt.is_some() && self.input_available
    }

    fn start(&mut self, sink: RecognitionSink) -> Result<()> {
        self.stop();

        let stt = self
            .stt
            .clone()
            .ok_or_else(|| Error::Unsupported("no speech-to-text provider".to_string()))?;

        let stop = Arc::new(AtomicBool::new(false));
        let ready = Self::open_capture(Arc::clone(&stop))?;
        self.stop = Some(Arc::clone(&stop));

        let interval = self.partial_interval;
        tokio::spawn(async move {
            match ready.await {
                Ok(Ok(buffer)) => {
                    tracing::debug!("microphone recognition started");
                    transcribe_loop(stt, buffer, interval, &stop, &sink).await;
                }
                Ok(Err(e)) => sink.failed(e.to_string()),
                Err(_) => sink.failed("capture thread exited"),
            }
            stop.store(true, Ordering::Relaxed);
            sink.ended();
        });

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop.store(true, Ordering::Relaxed);
            tracing::debug!("microphone recognition stopping");
        }
    }
}

async fn transcribe_loop(
    stt: SpeechToText,
    buffer: SampleBuffer,
    interval: Duration,
    stop: &AtomicBool,
    sink: &RecognitionSink,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    let mut seen = 0usize;
    let mut last_transcript = String::new();

    loop {
        ticker.tick().await;
        if stop.load(Ordering::Relaxed) {
            return;
        }

        let samples = buffer.lock().map(|b| b.clone()).unwrap_or_default();
        let recent = &samples[seen.min(samples.len())..];
        let is_speech = rms_energy(recent) > ENERGY_THRESHOLD;
        seen = samples.len();

        // Silence changes nothing; it is what lets the pause timer run out
        if !is_speech {
            continue;
        }

        let wav = match samples_to_wav(&samples, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                sink.failed(e.to_string());
                return;
            }
        };

        match stt.transcribe(&wav).await {
            Ok(text) => {
                let text = text.trim();
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                if !text.is_empty() && text != last_transcript {
                    last_transcript = text.to_string();
                    sink.fragment(text);
                }
            }
            Err(e) => {
                sink.failed(e.to_string());
                return;
            }
        }
    }
}
