use hound::{SampleFormat, WavReader};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::{AudioBackendConfig, AudioFrame, CaptureBackend};
use super::codec::{downmix_to_mono, int16_to_float, resample_linear};
use crate::error::{LiveError, LiveResult};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved normalized samples
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> LiveResult<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .map_err(|e| LiveError::Device(format!("failed to open {}: {}", path.display(), e)))?;

        let spec = reader.spec();
        let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, _) => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| LiveError::Device(format!("failed to read samples: {}", e)))?,
            (SampleFormat::Int, 16) => {
                let pcm = reader
                    .into_samples::<i16>()
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| LiveError::Device(format!("failed to read samples: {}", e)))?;
                int16_to_float(&pcm)
            }
            (SampleFormat::Int, bits) => {
                return Err(LiveError::Device(format!(
                    "unsupported WAV bit depth: {}",
                    bits
                )))
            }
        };

        let duration_seconds = samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Mono samples at `target_rate`
    pub fn to_mono(&self, target_rate: u32) -> Vec<f32> {
        let mono = downmix_to_mono(&self.samples, self.channels as usize);
        resample_linear(&mono, self.sample_rate, target_rate)
    }
}

/// Capture backend that replays a WAV file as if it were a microphone
///
/// Frames are emitted at the capture rate's wall-clock cadence unless
/// `realtime` is disabled. The trailing partial frame is zero-padded.
pub struct FileCapture {
    name: String,
    samples: Vec<f32>,
    config: AudioBackendConfig,
    realtime: bool,
    task: Option<JoinHandle<()>>,
}

impl FileCapture {
    pub fn open(path: impl AsRef<Path>, config: AudioBackendConfig) -> LiveResult<Self> {
        let file = AudioFile::open(path)?;
        let samples = file.to_mono(config.input_sample_rate);

        Ok(Self {
            name: format!("file:{}", file.path),
            samples,
            config,
            realtime: true,
            task: None,
        })
    }

    /// Emit frames as fast as the receiver accepts them
    pub fn without_pacing(mut self) -> Self {
        self.realtime = false;
        self
    }

    /// Split samples into fixed-size frames, padding the last one with silence
    pub fn frames(samples: &[f32], frame_size: usize, sample_rate: u32) -> Vec<AudioFrame> {
        if frame_size == 0 {
            return Vec::new();
        }

        samples
            .chunks(frame_size)
            .enumerate()
            .map(|(i, chunk)| {
                let mut frame = chunk.to_vec();
                frame.resize(frame_size, 0.0);
                AudioFrame {
                    samples: frame,
                    sample_rate,
                    timestamp_ms: (i * frame_size) as u64 * 1000 / sample_rate as u64,
                }
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FileCapture {
    async fn start(&mut self) -> LiveResult<mpsc::Receiver<AudioFrame>> {
        if self.task.is_some() {
            return Err(LiveError::Device("Already capturing".to_string()));
        }

        let frames = Self::frames(
            &self.samples,
            self.config.capture_frame_size,
            self.config.input_sample_rate,
        );
        let frame_period = Duration::from_secs_f64(
            self.config.capture_frame_size as f64 / self.config.input_sample_rate as f64,
        );
        let realtime = self.realtime;
        let name = self.name.clone();

        info!("Starting file capture: {} ({} frames)", name, frames.len());

        let (tx, rx) = mpsc::channel(16);
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frame_period);
            for frame in frames {
                if realtime {
                    ticker.tick().await;
                }
                if tx.send(frame).await.is_err() {
                    warn!("File capture receiver dropped: {}", name);
                    return;
                }
            }
            info!("File capture finished: {}", name);
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> LiveResult<()> {
        if let Some(task) = self.task.take() {
            info!("Stopping file capture: {}", self.name);
            task.abort();
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
