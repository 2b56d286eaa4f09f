use std::path::PathBuf;
use tokio::sync::mpsc;

use super::mixer::PlaybackMixer;
use crate::error::LiveResult;

/// Block of captured microphone audio (mono, normalized f32)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Mono samples in [-1, 1]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Configuration shared by the capture and playback backends
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Capture rate; the upstream transport format is fixed at 16kHz
    pub input_sample_rate: u32,
    /// Playback rate; the model emits 24kHz
    pub output_sample_rate: u32,
    /// Samples per captured frame. Larger frames add latency but keep
    /// network pacing steady under scheduling jitter.
    pub capture_frame_size: usize,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            capture_frame_size: 8192,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - cpal default microphone (feature `microphone`)
/// - WAV file played back at real-time cadence
#[async_trait::async_trait]
pub trait CaptureBackend: Send {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive fixed-size frames
    async fn start(&mut self) -> LiveResult<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio
    async fn stop(&mut self) -> LiveResult<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Output device that drives the playback mixer
///
/// The sink pulls rendered blocks from the mixer, which is what moves the
/// output clock forward.
pub trait PlaybackSink: Send {
    /// Begin pulling audio from the mixer
    fn start(&mut self, mixer: PlaybackMixer) -> LiveResult<()>;

    /// Stop the output device
    fn stop(&mut self) -> LiveResult<()>;

    /// Get sink name for logging
    fn name(&self) -> &str;
}

/// Opens the input and output devices for one session
pub trait AudioDevices: Send + Sync {
    fn open_capture(&self, config: &AudioBackendConfig) -> LiveResult<Box<dyn CaptureBackend>>;

    fn open_sink(&self, config: &AudioBackendConfig) -> LiveResult<Box<dyn PlaybackSink>>;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default microphone (requires the `microphone` feature)
    Microphone,
    /// WAV file input (for testing/batch processing)
    File(PathBuf),
}

/// Audio output type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioOutput {
    /// Default speaker (requires the `microphone` feature)
    Speaker,
    /// Headless real-time clock, optionally recording replies to a WAV file
    Clocked { record_to: Option<PathBuf> },
}

/// Audio backend factory
///
/// Creates the platform backends selected by `source` and `output`
#[derive(Debug, Clone)]
pub struct AudioBackendFactory {
    pub source: AudioSource,
    pub output: AudioOutput,
}

impl AudioBackendFactory {
    pub fn new(source: AudioSource, output: AudioOutput) -> Self {
        Self { source, output }
    }
}

impl AudioDevices for AudioBackendFactory {
    fn open_capture(&self, config: &AudioBackendConfig) -> LiveResult<Box<dyn CaptureBackend>> {
        match &self.source {
            AudioSource::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    let backend = super::device::CpalMicrophone::new(config.clone())?;
                    Ok(Box::new(backend))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    Err(crate::error::LiveError::Device(
                        "microphone capture requires the `microphone` feature".to_string(),
                    ))
                }
            }

            AudioSource::File(path) => {
                let backend = super::file::FileCapture::open(path, config.clone())?;
                Ok(Box::new(backend))
            }
        }
    }

    fn open_sink(&self, config: &AudioBackendConfig) -> LiveResult<Box<dyn PlaybackSink>> {
        match &self.output {
            AudioOutput::Speaker => {
                #[cfg(feature = "microphone")]
                {
                    let sink = super::device::CpalSpeaker::new(config.clone())?;
                    Ok(Box::new(sink))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    Err(crate::error::LiveError::Device(
                        "speaker playback requires the `microphone` feature".to_string(),
                    ))
                }
            }

            AudioOutput::Clocked { record_to } => {
                let sink = super::clocked::ClockedSink::new(config.output_sample_rate, record_to.clone());
                Ok(Box::new(sink))
            }
        }
    }
}
