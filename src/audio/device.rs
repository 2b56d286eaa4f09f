// cpal-backed microphone and speaker
//
// Platform: any host cpal supports. Built only with the `microphone` feature.
//
// The microphone is down-mixed and resampled to the capture rate, then
// accumulated into fixed-size frames. The speaker pulls mono blocks from the
// playback mixer, resampling to the device rate when it differs.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::backend::{AudioBackendConfig, AudioFrame, CaptureBackend, PlaybackSink};
use super::codec::{downmix_to_mono, StreamResampler};
use super::mixer::PlaybackMixer;
use crate::error::{LiveError, LiveResult};

/// Wrapper to make `cpal::Stream` Send.
///
/// `cpal::Stream` is `!Send` on some platforms due to internal raw pointers.
/// The stream is only created, played and dropped from the owning backend,
/// never used concurrently.
struct SendStream(cpal::Stream);

// SAFETY: the stream is never accessed from more than one thread at a time.
unsafe impl Send for SendStream {}

fn stream_error(context: &str, message: String) -> LiveError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        LiveError::Permission(format!("{}: {}", context, message))
    } else {
        LiveError::Device(format!("{}: {}", context, message))
    }
}

/// Default system microphone
pub struct CpalMicrophone {
    config: AudioBackendConfig,
    stream: Option<SendStream>,
    device_name: String,
}

impl CpalMicrophone {
    pub fn new(config: AudioBackendConfig) -> LiveResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| LiveError::Device("No default input device available".to_string()))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".into());

        info!("Selected input device: {}", device_name);

        Ok(Self {
            config,
            stream: None,
            device_name,
        })
    }
}

#[async_trait::async_trait]
impl CaptureBackend for CpalMicrophone {
    async fn start(&mut self) -> LiveResult<mpsc::Receiver<AudioFrame>> {
        if self.stream.is_some() {
            return Err(LiveError::Device("Already capturing".to_string()));
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| LiveError::Device("No default input device available".to_string()))?;

        let default_config = device
            .default_input_config()
            .map_err(|e| stream_error("Failed to get default input config", e.to_string()))?;

        let native_rate = default_config.sample_rate().0;
        let channels = default_config.channels() as usize;
        let target_rate = self.config.input_sample_rate;
        let frame_size = self.config.capture_frame_size;

        info!(
            "Audio input config: {}Hz, {} channels -> {}Hz mono, {}-sample frames",
            native_rate, channels, target_rate, frame_size
        );

        let stream_config = cpal::StreamConfig {
            channels: default_config.channels(),
            sample_rate: cpal::SampleRate(native_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = mpsc::channel(32);
        let pipeline = CapturePipeline {
            channels,
            resampler: (native_rate != target_rate).then(|| StreamResampler::new(native_rate, target_rate)),
            pending: Vec::with_capacity(frame_size * 2),
            frame_size,
            target_rate,
            emitted: 0,
            tx,
        };

        let stream = match default_config.sample_format() {
            SampleFormat::F32 => build_input::<f32>(&device, &stream_config, pipeline),
            SampleFormat::I16 => build_input::<i16>(&device, &stream_config, pipeline),
            SampleFormat::U16 => build_input::<u16>(&device, &stream_config, pipeline),
            other => {
                return Err(LiveError::Device(format!("Unsupported input sample format: {:?}", other)));
            }
        }
        .map_err(|e| stream_error("Failed to build input stream", e.to_string()))?;

        stream
            .play()
            .map_err(|e| stream_error("Failed to start input stream", e.to_string()))?;

        self.stream = Some(SendStream(stream));
        info!("Microphone capture started: {}", self.device_name);

        Ok(rx)
    }

    async fn stop(&mut self) -> LiveResult<()> {
        if let Some(stream) = self.stream.take() {
            info!("Stopping microphone capture");
            if let Err(e) = stream.0.pause() {
                warn!("Failed to pause input stream: {}", e);
            }
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    fn name(&self) -> &str {
        &self.device_name
    }
}

/// Default system speaker
pub struct CpalSpeaker {
    config: AudioBackendConfig,
    stream: Option<SendStream>,
    device_name: String,
}

impl CpalSpeaker {
    pub fn new(config: AudioBackendConfig) -> LiveResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| LiveError::Device("No default output device available".to_string()))?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".into());

        info!("Selected output device: {}", device_name);

        Ok(Self {
            config,
            stream: None,
            device_name,
        })
    }
}

impl PlaybackSink for CpalSpeaker {
    fn start(&mut self, mixer: PlaybackMixer) -> LiveResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| LiveError::Device("No default output device available".to_string()))?;

        let default_config = device
            .default_output_config()
            .map_err(|e| stream_error("Failed to get default output config", e.to_string()))?;

        let device_rate = default_config.sample_rate().0;
        let channels = default_config.channels() as usize;
        let mixer_rate = self.config.output_sample_rate;

        info!(
            "Audio output config: {}Hz mono -> {}Hz, {} channels",
            mixer_rate, device_rate, channels
        );

        let stream_config = cpal::StreamConfig {
            channels: default_config.channels(),
            sample_rate: cpal::SampleRate(device_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let pipeline = RenderPipeline {
            mixer,
            resampler: (device_rate != mixer_rate).then(|| StreamResampler::new(mixer_rate, device_rate)),
            scratch: Vec::new(),
            channels: channels.max(1),
        };

        let stream = match default_config.sample_format() {
            SampleFormat::F32 => build_output::<f32>(&device, &stream_config, pipeline),
            SampleFormat::I16 => build_output::<i16>(&device, &stream_config, pipeline),
            SampleFormat::U16 => build_output::<u16>(&device, &stream_config, pipeline),
            other => {
                return Err(LiveError::Device(format!("Unsupported output sample format: {:?}", other)));
            }
        }
        .map_err(|e| stream_error("Failed to build output stream", e.to_string()))?;

        stream
            .play()
            .map_err(|e| stream_error("Failed to start output stream", e.to_string()))?;

        self.stream = Some(SendStream(stream));
        info!("Speaker playback started: {}", self.device_name);

        Ok(())
    }

    fn stop(&mut self) -> LiveResult<()> {
        if let Some(stream) = self.stream.take() {
            info!("Stopping speaker playback");
            if let Err(e) = stream.0.pause() {
                warn!("Failed to pause output stream: {}", e);
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.device_name
    }
}

/// Device-rate input to fixed-size capture frames
struct CapturePipeline {
    channels: usize,
    resampler: Option<StreamResampler>,
    pending: Vec<f32>,
    frame_size: usize,
    target_rate: u32,
    emitted: u64,
    tx: mpsc::Sender<AudioFrame>,
}

impl CapturePipeline {
    fn process(&mut self, data: &[f32]) {
        let mono = downmix_to_mono(data, self.channels);
        match self.resampler.as_mut() {
            Some(r) => self.pending.extend(r.push(&mono)),
            None => self.pending.extend(mono),
        }

        while self.pending.len() >= self.frame_size {
            let samples: Vec<f32> = self.pending.drain(..self.frame_size).collect();
            let frame = AudioFrame {
                samples,
                sample_rate: self.target_rate,
                timestamp_ms: self.emitted * self.frame_size as u64 * 1000 / self.target_rate as u64,
            };
            self.emitted += 1;

            if let Err(e) = self.tx.try_send(frame) {
                warn!("Dropping captured frame: {}", e);
            }
        }
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut pipeline: CapturePipeline,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut block: Vec<f32> = Vec::new();

    device.build_input_stream(
        config,
        move |data: &[T], _info: &cpal::InputCallbackInfo| {
            block.clear();
            block.extend(data.iter().map(|s| f32::from_sample(*s)));
            pipeline.process(&block);
        },
        move |err| {
            error!("Audio input stream error: {}", err);
        },
        None,
    )
}

/// Mixer output, resampled and fanned out to the device channels
struct RenderPipeline {
    mixer: PlaybackMixer,
    resampler: Option<StreamResampler>,
    scratch: Vec<f32>,
    channels: usize,
}

impl RenderPipeline {
    fn render(&mut self, frames: usize) -> &[f32] {
        self.scratch.resize(frames, 0.0);
        let mixer = &self.mixer;
        match self.resampler.as_mut() {
            Some(r) => r.fill(&mut self.scratch, |block| mixer.render(block)),
            None => mixer.render(&mut self.scratch),
        }
        &self.scratch
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut pipeline: RenderPipeline,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    device.build_output_stream(
        config,
        move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
            let channels = pipeline.channels;
            let mono = pipeline.render(data.len() / channels);
            for (frame, sample) in data.chunks_mut(channels).zip(mono) {
                frame.fill(T::from_sample(*sample));
            }
        },
        move |err| {
            error!("Audio output stream error: {}", err);
        },
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_pipeline_keeps_device_time() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut pipeline = CapturePipeline {
            channels: 2,
            resampler: Some(StreamResampler::new(44100, 16000)),
            pending: Vec::new(),
            frame_size: 1010,
            target_rate: 16000,
            emitted: 0,
            tx,
        };

        // One second of stereo input in 512-frame callbacks
        let block = vec![0.25f32; 512 * 2];
        let mut fed = 0;
        while fed < 44100 {
            pipeline.process(&block);
            fed += 512;
        }

        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }

        // 44544 input samples resample to 16161, so sixteen full frames;
        // restarting at every callback would leave only fifteen
        assert_eq!(frames.len(), 16);
        assert_eq!(frames[15].timestamp_ms, 946);
        assert!(frames.iter().all(|f| f.samples.iter().all(|s| (s - 0.25).abs() < 1e-6)));
    }
}
