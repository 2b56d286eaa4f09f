// Playback mixer for scheduled reply audio
//
// Every scheduled source becomes a voice pinned to an absolute frame on the
// output timeline. Rendering sums the voices that overlap the requested block
// and clips the result. The mixer doubles as the output clock: time only moves
// forward as frames are rendered by whichever sink drives it.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use super::analyser::LevelMeter;

/// Identifier of a scheduled playback source
pub type SourceId = u64;

/// Invoked with the id of every source that finished playing on its own
pub type EndedCallback = Arc<dyn Fn(SourceId) + Send + Sync>;

/// Configuration for the playback mixer
#[derive(Debug, Clone)]
pub struct MixerConfig {
    /// Output timeline sample rate (the model emits 24kHz)
    pub sample_rate: u32,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self { sample_rate: 24000 }
    }
}

struct Voice {
    id: SourceId,
    samples: Vec<f32>,
    start_frame: u64,
    position: usize,
}

#[derive(Default)]
struct MixerState {
    frames_rendered: u64,
    voices: Vec<Voice>,
}

/// Shared handle to the output timeline
///
/// Cloning is cheap; the render side (device callback or clocked task) and
/// the scheduling side share the same state.
#[derive(Clone)]
pub struct PlaybackMixer {
    config: MixerConfig,
    state: Arc<Mutex<MixerState>>,
    level: LevelMeter,
    on_ended: Option<EndedCallback>,
}

impl PlaybackMixer {
    pub fn new(config: MixerConfig, level: LevelMeter) -> Self {
        debug!("Playback mixer initialized: {}Hz", config.sample_rate);

        Self {
            config,
            state: Arc::new(Mutex::new(MixerState::default())),
            level,
            on_ended: None,
        }
    }

    /// Register the natural-end notification
    pub fn with_ended_callback(mut self, callback: EndedCallback) -> Self {
        self.on_ended = Some(callback);
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Current position of the output timeline in seconds
    pub fn current_time(&self) -> f64 {
        let frames = self.state.lock().frames_rendered;
        frames as f64 / self.config.sample_rate as f64
    }

    fn frame_at(&self, when: f64) -> u64 {
        (when.max(0.0) * self.config.sample_rate as f64).round() as u64
    }

    /// Queue mono samples to start at `when` seconds on the timeline
    ///
    /// A start time already in the past plays from the next rendered frame.
    pub fn start(&self, id: SourceId, samples: Vec<f32>, when: f64) {
        let start_frame = self.frame_at(when);
        self.state.lock().voices.push(Voice {
            id,
            samples,
            start_frame,
            position: 0,
        });
    }

    /// Queue mono samples at `not_before` or the current clock, whichever is
    /// later, and return the start actually used in seconds
    ///
    /// The clock is read and the voice queued under one lock, so a render in
    /// between cannot shift the voice past the returned start.
    pub fn schedule(&self, id: SourceId, samples: Vec<f32>, not_before: f64) -> f64 {
        let requested = self.frame_at(not_before);

        let mut state = self.state.lock();
        let start_frame = requested.max(state.frames_rendered);
        state.voices.push(Voice {
            id,
            samples,
            start_frame,
            position: 0,
        });

        start_frame as f64 / self.config.sample_rate as f64
    }

    /// Force-stop a single source. No ended notification is sent.
    pub fn stop(&self, id: SourceId) -> bool {
        let mut state = self.state.lock();
        let before = state.voices.len();
        state.voices.retain(|v| v.id != id);
        state.voices.len() != before
    }

    /// Force-stop every source
    pub fn stop_all(&self) {
        self.state.lock().voices.clear();
    }

    pub fn active_voices(&self) -> usize {
        self.state.lock().voices.len()
    }

    /// Render the next block of the timeline into `out`
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);

        let ended = {
            let mut state = self.state.lock();
            let base = state.frames_rendered;
            let block_end = base + out.len() as u64;

            for voice in state.voices.iter_mut() {
                if voice.start_frame >= block_end {
                    continue;
                }

                let offset = voice.start_frame.saturating_sub(base) as usize;
                let remaining = voice.samples.len() - voice.position;
                let count = remaining.min(out.len() - offset);

                for (dst, src) in out[offset..offset + count]
                    .iter_mut()
                    .zip(&voice.samples[voice.position..voice.position + count])
                {
                    *dst += *src;
                }
                voice.position += count;
            }

            // Clip to prevent overflow
            for sample in out.iter_mut() {
                *sample = sample.clamp(-1.0, 1.0);
            }

            state.frames_rendered = block_end;

            let mut ended = Vec::new();
            state.voices.retain(|v| {
                let done = v.start_frame < block_end && v.position >= v.samples.len();
                if done {
                    ended.push(v.id);
                }
                !done
            });
            ended
        };

        self.level.observe(out);

        if let Some(callback) = &self.on_ended {
            for id in ended {
                callback(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn mixer(rate: u32) -> PlaybackMixer {
        PlaybackMixer::new(MixerConfig { sample_rate: rate }, LevelMeter::new())
    }

    #[test]
    fn test_mixer_clock_advances_with_rendering() {
        let mixer = mixer(100);
        assert_eq!(mixer.current_time(), 0.0);

        let mut out = vec![0.0; 50];
        mixer.render(&mut out);
        assert!((mixer.current_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_voices_play_at_their_start_frame() {
        let mixer = mixer(10);
        mixer.start(1, vec![0.5; 3], 0.2);

        let mut out = vec![0.0; 6];
        mixer.render(&mut out);

        assert_eq!(out, vec![0.0, 0.0, 0.5, 0.5, 0.5, 0.0]);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_voice_spanning_blocks() {
        let mixer = mixer(10);
        mixer.start(1, vec![0.1, 0.2, 0.3, 0.4], 0.2);

        let mut first = vec![0.0; 3];
        mixer.render(&mut first);
        assert_eq!(first, vec![0.0, 0.0, 0.1]);
        assert_eq!(mixer.active_voices(), 1);

        let mut second = vec![0.0; 3];
        mixer.render(&mut second);
        assert_eq!(second, vec![0.2, 0.3, 0.4]);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_overlapping_voices_are_clipped() {
        let mixer = mixer(10);
        mixer.start(1, vec![0.8, 0.8], 0.0);
        mixer.start(2, vec![0.5, -0.5], 0.0);

        let mut out = vec![0.0; 2];
        mixer.render(&mut out);

        assert_eq!(out[0], 1.0); // Clipped to max
        assert!((out[1] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_ended_callback_only_for_natural_end() {
        let ended = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&ended);
        let mixer = mixer(10).with_ended_callback(Arc::new(move |id| {
            sink.lock().unwrap().push(id);
        }));

        mixer.start(1, vec![0.1; 2], 0.0);
        mixer.start(2, vec![0.1; 2], 0.0);
        assert!(mixer.stop(2));
        assert!(!mixer.stop(99));

        let mut out = vec![0.0; 4];
        mixer.render(&mut out);

        assert_eq!(*ended.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_late_start_plays_immediately() {
        let mixer = mixer(10);
        let mut out = vec![0.0; 5];
        mixer.render(&mut out);

        mixer.start(1, vec![0.25; 2], 0.1);
        mixer.render(&mut out);
        assert_eq!(&out[..3], &[0.25, 0.25, 0.0]);
    }

    #[test]
    fn test_schedule_clamps_stale_start_to_clock() {
        let mixer = mixer(10);

        // Cursor read before the output callback got to run
        let stale = mixer.current_time();
        let mut out = vec![0.0; 5];
        mixer.render(&mut out);

        let first = mixer.schedule(1, vec![0.5; 10], stale);
        assert!((first - 0.5).abs() < 1e-9);

        let second = mixer.schedule(2, vec![0.5; 5], first + 1.0);
        assert!((second - 1.5).abs() < 1e-9);

        let mut out = vec![0.0; 20];
        mixer.render(&mut out);
        assert_eq!(&out[..15], &[0.5; 15]);
        assert_eq!(&out[15..], &[0.0; 5]);
    }

    #[test]
    fn test_output_level_tracks_render() {
        let level = LevelMeter::new();
        let mixer = PlaybackMixer::new(MixerConfig { sample_rate: 10 }, level.clone());
        mixer.start(1, vec![0.5; 4], 0.0);

        let mut out = vec![0.0; 4];
        mixer.render(&mut out);
        assert!((level.level() - 0.5).abs() < 1e-6);
    }
}
