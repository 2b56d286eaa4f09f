// Headless playback sink
//
// Drives the mixer from a tokio interval so the output clock advances in real
// time without an audio device. Rendered audio can be recorded to a 16-bit WAV
// file, which is how replies are kept when running without speakers.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::PlaybackSink;
use super::codec::float_to_int16;
use super::mixer::PlaybackMixer;
use crate::error::{LiveError, LiveResult};

/// Render cadence of the headless clock
const TICK: Duration = Duration::from_millis(20);

pub struct ClockedSink {
    sample_rate: u32,
    record_to: Option<PathBuf>,
    task: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

impl ClockedSink {
    pub fn new(sample_rate: u32, record_to: Option<PathBuf>) -> Self {
        Self {
            sample_rate,
            record_to,
            task: None,
        }
    }

    /// Stop the clock and wait until the recording is finalized on disk
    pub async fn finish(&mut self) {
        if let Some((shutdown, task)) = self.task.take() {
            let _ = shutdown.send(());
            if let Err(e) = task.await {
                warn!("Clocked playback task failed: {}", e);
            }
            info!("Clocked playback sink stopped");
        }
    }

    fn create_writer(&self) -> LiveResult<Option<WavWriter<BufWriter<File>>>> {
        let Some(path) = &self.record_to else {
            return Ok(None);
        };

        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let writer = WavWriter::create(path, spec)
            .map_err(|e| LiveError::Device(format!("failed to create {:?}: {}", path, e)))?;
        info!("Recording reply audio to {:?}", path);
        Ok(Some(writer))
    }
}

impl PlaybackSink for ClockedSink {
    fn start(&mut self, mixer: PlaybackMixer) -> LiveResult<()> {
        if self.task.is_some() {
            return Ok(());
        }

        let mut writer = self.create_writer()?;
        let block = (self.sample_rate as u64 * TICK.as_millis() as u64 / 1000) as usize;

        let (shutdown_tx, mut shutdown) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK);
            let mut out = vec![0.0f32; block];

            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = ticker.tick() => {}
                }

                mixer.render(&mut out);

                // Only keep blocks that carry reply audio
                let silent = out.iter().all(|s| *s == 0.0);
                let failed = match writer.as_mut() {
                    Some(w) if !silent => float_to_int16(&out)
                        .into_iter()
                        .try_for_each(|sample| w.write_sample(sample))
                        .err(),
                    _ => None,
                };
                if let Some(e) = failed {
                    warn!("Failed to write reply audio, recording stopped: {}", e);
                    writer = None;
                }
            }

            if let Some(writer) = writer {
                match writer.finalize() {
                    Ok(()) => info!("Reply recording finalized"),
                    Err(e) => warn!("Failed to finalize reply recording: {}", e),
                }
            }
        });
        self.task = Some((shutdown_tx, task));

        info!("Clocked playback sink started ({}Hz)", self.sample_rate);
        Ok(())
    }

    fn stop(&mut self) -> LiveResult<()> {
        if let Some((shutdown, _task)) = self.task.take() {
            // The task finishes its recording before exiting
            let _ = shutdown.send(());
            info!("Clocked playback sink stopped");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "clocked"
    }
}

impl Drop for ClockedSink {
    fn drop(&mut self) {
        if let Some((shutdown, _task)) = self.task.take() {
            let _ = shutdown.send(());
        }
    }
}
