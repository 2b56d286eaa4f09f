use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::analyser::AudioLevels;
use super::backend::{AudioBackendConfig, AudioDevices, AudioFrame, CaptureBackend, PlaybackSink};
use super::codec::AudioBuffer;
use super::mixer::{EndedCallback, MixerConfig, PlaybackMixer, SourceId};
use super::playback::{PlaybackScheduler, PlaybackSource};
use crate::error::LiveResult;

/// Owns the input and output audio contexts for one session
///
/// Input runs at the capture rate (16kHz) and output at the playback rate
/// (24kHz); the two are never mixed up. Dropping or closing the bridge
/// releases both devices.
pub struct AudioBridge {
    capture: Option<Box<dyn CaptureBackend>>,
    sink: Option<Box<dyn PlaybackSink>>,
    mixer: PlaybackMixer,
    scheduler: PlaybackScheduler,
    levels: AudioLevels,
    capture_task: Option<JoinHandle<()>>,
    closed: bool,
}

impl AudioBridge {
    /// Acquire both devices and start the output clock
    ///
    /// `on_source_ended` fires (from the render thread) for every source
    /// that plays to completion.
    pub async fn open(
        devices: &dyn AudioDevices,
        config: &AudioBackendConfig,
        levels: AudioLevels,
        on_source_ended: EndedCallback,
    ) -> LiveResult<Self> {
        let capture = devices.open_capture(config)?;
        let mut sink = devices.open_sink(config)?;

        let mixer = PlaybackMixer::new(
            MixerConfig {
                sample_rate: config.output_sample_rate,
            },
            levels.output.clone(),
        )
        .with_ended_callback(on_source_ended);

        // Resume output so the clock is running before any reply arrives
        sink.start(mixer.clone())?;

        info!(
            "Audio bridge open: input={} ({}Hz), output={} ({}Hz)",
            capture.name(),
            config.input_sample_rate,
            sink.name(),
            config.output_sample_rate
        );

        Ok(Self {
            capture: Some(capture),
            sink: Some(sink),
            mixer,
            scheduler: PlaybackScheduler::new(),
            levels,
            capture_task: None,
            closed: false,
        })
    }

    /// Deliver captured frames to `on_chunk` in capture order until closed
    pub async fn start_capture<F>(&mut self, mut on_chunk: F) -> LiveResult<()>
    where
        F: FnMut(AudioFrame) + Send + 'static,
    {
        let Some(capture) = self.capture.as_mut() else {
            warn!("Capture requested on a closed audio bridge");
            return Ok(());
        };

        let mut frames = capture.start().await?;
        let input_level = self.levels.input.clone();

        self.capture_task = Some(tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                input_level.observe(&frame.samples);
                on_chunk(frame);
            }
            debug!("Capture stream ended");
        }));

        Ok(())
    }

    /// Queue decoded audio right after whatever is already scheduled
    pub fn schedule_playback(&mut self, buffer: &AudioBuffer) -> PlaybackSource {
        self.scheduler.schedule(&self.mixer, buffer)
    }

    /// Deregister a source the mixer reported as finished
    pub fn source_ended(&mut self, id: SourceId) {
        if self.scheduler.finish(id) {
            debug!("Playback source {} finished", id);
        }
    }

    /// Silence everything immediately and rewind the playback cursor
    pub fn stop_all_playback(&mut self) {
        let stopped = self.scheduler.stop_all(&self.mixer);
        self.mixer.stop_all();
        if stopped > 0 {
            debug!("Stopped {} playback sources", stopped);
        }
    }

    /// Release capture and output. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(task) = self.capture_task.take() {
            task.abort();
        }

        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.stop().await {
                warn!("Failed to stop capture backend {}: {}", capture.name(), e);
            }
        }

        self.stop_all_playback();

        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.stop() {
                warn!("Failed to stop playback sink {}: {}", sink.name(), e);
            }
        }

        self.levels.reset();
        info!("Audio bridge closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn mixer(&self) -> &PlaybackMixer {
        &self.mixer
    }

    pub fn active_sources(&self) -> usize {
        self.scheduler.active_count()
    }

    pub fn next_start_time(&self) -> f64 {
        self.scheduler.next_start_time()
    }
}

impl Drop for AudioBridge {
    fn drop(&mut self) {
        if let Some(task) = self.capture_task.take() {
            task.abort();
        }
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.stop() {
                warn!("Failed to stop playback sink on drop: {}", e);
            }
        }
    }
}
