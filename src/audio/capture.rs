//! Microphone capture for speech recognition
//!
//! Samples are captured at 16 kHz and folded to mono in the stream
//! callback, so the buffer can be handed to an STT API as-is.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Capture sample rate expected by the STT providers
pub const SAMPLE_RATE: u32 = 16000;

/// Longest capture kept in memory; later samples are dropped
const MAX_CAPTURE_SECS: usize = 120;

/// Mono samples shared between the stream callback and readers
pub type SampleBuffer = Arc<Mutex<Vec<f32>>>;

/// Default input device opened at [`SAMPLE_RATE`]
///
/// Holds a cpal stream, which is not `Send`; keep it on the thread that
/// created it and share samples through [`AudioCapture::buffer`].
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    buffer: SampleBuffer,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device
    ///
    /// # Errors
    ///
    /// Returns error if there is no input device or it cannot record at 16 kHz
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;
        let config = speech_input_config(&device)?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            channels = config.channels,
            "microphone opened"
        );

        Ok(Self {
            device,
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Whether the host exposes any input device
    #[must_use]
    pub fn input_available() -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    /// Start recording into the buffer; a no-op while already recording
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be built or started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let channels = usize::from(self.config.channels).max(1);
        let limit = MAX_CAPTURE_SECS * SAMPLE_RATE as usize;
        let buffer = Arc::clone(&self.buffer);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let Ok(mut buf) = buffer.lock() else {
                        return;
                    };
                    let room = limit.saturating_sub(buf.len());
                    buf.extend(data.chunks(channels).map(downmix).take(room));
                },
                |err| tracing::error!(error = %err, "microphone stream error"),
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Stop recording; buffered samples are kept
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!(samples = self.peek_buffer().len(), "microphone closed");
        }
    }

    /// Shared handle to the captured samples
    #[must_use]
    pub fn buffer(&self) -> SampleBuffer {
        Arc::clone(&self.buffer)
    }

    /// Copy of everything captured so far
    #[must_use]
    pub fn peek_buffer(&self) -> Vec<f32> {
        self.buffer.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn clear_buffer(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }

    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

/// Pick a 16 kHz input config, preferring the fewest channels
fn speech_input_config(device: &Device) -> Result<StreamConfig> {
    let rate = SampleRate(SAMPLE_RATE);
    device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| c.min_sample_rate() <= rate && rate <= c.max_sample_rate())
        .min_by_key(cpal::SupportedStreamConfigRange::channels)
        .map(|c| c.with_sample_rate(rate).config())
        .ok_or_else(|| Error::Audio("input device cannot record at 16 kHz".to_string()))
}

/// Average one interleaved frame down to a single sample
#[allow(clippy::cast_precision_loss)]
fn downmix(frame: &[f32]) -> f32 {
    match frame {
        [mono] => *mono,
        _ => frame.iter().sum::<f32>() / frame.len() as f32,
    }
}

/// Root-mean-square level of `samples`; 0 for an empty slice
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_square = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    mean_square.sqrt()
}

/// Encode mono samples as 16-bit PCM WAV
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let count = u32::try_from(samples.len())
        .map_err(|_| Error::Audio("capture too long to encode".to_string()))?;

    let mut bytes = Vec::with_capacity(44 + samples.len() * 2);
    let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec)
        .map_err(|e| Error::Audio(e.to_string()))?;

    let mut pcm = writer.get_i16_writer(count);
    for &sample in samples {
        pcm.write_sample(to_pcm16(sample));
    }
    pcm.flush().map_err(|e| Error::Audio(e.to_string()))?;
    writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;

    Ok(bytes)
}

#[allow(clippy::cast_possible_truncation)]
fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}
