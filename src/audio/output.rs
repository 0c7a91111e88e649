//! Speaker output for synthesized speech

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::{Error, Result};

/// How often blocking playback checks for completion or cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Time given to the device to drain its last period
const DRAIN: Duration = Duration::from_millis(100);

/// Mono PCM decoded from a synthesized clip
#[derive(Debug, Clone, Default)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Default output device opened at a given sample rate
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
}

impl AudioOutput {
    /// Open the default output device at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if there is no output device or it cannot play at that rate
    pub fn new(sample_rate: u32) -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let rate = SampleRate(sample_rate);
        let config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .filter(|c| c.min_sample_rate() <= rate && rate <= c.max_sample_rate())
            .min_by_key(cpal::SupportedStreamConfigRange::channels)
            .map(|c| c.with_sample_rate(rate).config())
            .ok_or_else(|| Error::Audio(format!("output device cannot play at {sample_rate} Hz")))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "speaker opened"
        );

        Ok(Self { device, config })
    }

    /// Play mono samples on the calling thread until they finish or `cancel` is set
    ///
    /// Returns false when playback was cut short by `cancel`.
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built or started
    pub fn play_blocking(&self, audio: DecodedAudio, cancel: &AtomicBool) -> Result<bool> {
        if audio.samples.is_empty() {
            return Ok(true);
        }

        let deadline = Instant::now() + audio.duration() + Duration::from_millis(500);
        let total = audio.samples.len();
        let channels = usize::from(self.config.channels).max(1);
        let samples = Arc::new(audio.samples);
        let played = Arc::new(AtomicUsize::new(0));

        let stream = {
            let samples = Arc::clone(&samples);
            let played = Arc::clone(&played);
            self.device
                .build_output_stream(
                    &self.config,
                    move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut next = played.load(Ordering::Relaxed);
                        for frame in out.chunks_mut(channels) {
                            frame.fill(samples.get(next).copied().unwrap_or(0.0));
                            next = (next + 1).min(samples.len());
                        }
                        played.store(next, Ordering::Relaxed);
                    },
                    |err| tracing::error!(error = %err, "speaker stream error"),
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };
        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let completed = loop {
            if played.load(Ordering::Relaxed) >= total {
                std::thread::sleep(DRAIN);
                break true;
            }
            if cancel.load(Ordering::Relaxed) {
                break false;
            }
            if Instant::now() > deadline {
                tracing::warn!("playback overran its clip length, stopping");
                break true;
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        drop(stream);
        tracing::debug!(samples = total, completed, "playback finished");
        Ok(completed)
    }
}

/// Decode an MP3 clip to mono samples at its native rate
///
/// # Errors
///
/// Returns error if the data is not valid MP3
#[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
pub fn decode_mp3(mp3: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3));
    let mut audio = DecodedAudio::default();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                let channels = frame.channels.max(1);
                audio.sample_rate = frame.sample_rate as u32;
                audio.samples.extend(frame.data.chunks(channels).map(|pcm| {
                    pcm.iter().map(|&s| f32::from(s)).sum::<f32>() / (32768.0 * pcm.len() as f32)
                }));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(audio)
}
