use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use super::codec::{resample_linear, AudioBuffer};
use super::mixer::{PlaybackMixer, SourceId};

/// A unit of reply audio placed on the output timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackSource {
    pub id: SourceId,
    /// Scheduled start in output-clock seconds
    pub start_time: f64,
    /// Length in seconds
    pub duration: f64,
}

impl PlaybackSource {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Gapless sequential scheduler over the mixer timeline
///
/// `next_start_time` is the playback cursor: each source starts at
/// `max(cursor, now)` and pushes the cursor forward by its duration, so
/// sources never overlap.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start_time: f64,
    next_id: SourceId,
    active: HashMap<SourceId, PlaybackSource>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, mixer: &PlaybackMixer, buffer: &AudioBuffer) -> PlaybackSource {
        let mut samples = buffer.to_mono();
        if buffer.sample_rate != mixer.sample_rate() {
            samples = resample_linear(&samples, buffer.sample_rate, mixer.sample_rate());
        }

        let duration = samples.len() as f64 / mixer.sample_rate() as f64;

        self.next_id += 1;
        let id = self.next_id;
        let start_time = mixer.schedule(id, samples, self.next_start_time);

        let source = PlaybackSource {
            id,
            start_time,
            duration,
        };
        self.next_start_time = start_time + duration;
        self.active.insert(source.id, source);

        debug!(
            "Scheduled source {} at {:.3}s ({:.3}s long, {} active)",
            source.id,
            source.start_time,
            source.duration,
            self.active.len()
        );

        source
    }

    /// Drop a source that finished on its own
    pub fn finish(&mut self, id: SourceId) -> bool {
        self.active.remove(&id).is_some()
    }

    /// Force-stop every active source and rewind the cursor
    pub fn stop_all(&mut self, mixer: &PlaybackMixer) -> usize {
        let stopped = self.active.len();
        for id in self.active.keys() {
            mixer.stop(*id);
        }
        self.active.clear();
        self.next_start_time = 0.0;
        stopped
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, id: SourceId) -> bool {
        self.active.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::analyser::LevelMeter;
    use crate::audio::mixer::MixerConfig;

    fn mixer() -> PlaybackMixer {
        PlaybackMixer::new(MixerConfig { sample_rate: 100 }, LevelMeter::new())
    }

    fn buffer(frames: usize) -> AudioBuffer {
        AudioBuffer::mono(vec![0.1; frames], 100)
    }

    #[test]
    fn test_sources_are_back_to_back() {
        let mixer = mixer();
        let mut scheduler = PlaybackScheduler::new();

        let a = scheduler.schedule(&mixer, &buffer(50));
        let b = scheduler.schedule(&mixer, &buffer(30));
        let c = scheduler.schedule(&mixer, &buffer(20));

        assert_eq!(a.start_time, 0.0);
        assert!((b.start_time - a.end_time()).abs() < 1e-9);
        assert!((c.start_time - b.end_time()).abs() < 1e-9);
        assert!((scheduler.next_start_time() - 1.0).abs() < 1e-9);
        assert_eq!(scheduler.active_count(), 3);
    }

    #[test]
    fn test_start_never_precedes_clock_or_cursor() {
        let mixer = mixer();
        let mut scheduler = PlaybackScheduler::new();
        let mut previous_end = 0.0;
        let mut previous_start = 0.0;

        for (i, frames) in [10usize, 40, 5, 60, 25, 1, 33].iter().enumerate() {
            // Let the clock run ahead of the cursor every other chunk
            if i % 2 == 1 {
                let mut out = vec![0.0; 70];
                mixer.render(&mut out);
            }

            let cursor = scheduler.next_start_time();
            let now = mixer.current_time();
            let source = scheduler.schedule(&mixer, &buffer(*frames));

            assert!(source.start_time >= cursor);
            assert!(source.start_time >= now);
            assert!(source.start_time >= previous_end - 1e-9);
            assert!(source.start_time >= previous_start);
            previous_end = source.end_time();
            previous_start = source.start_time;
        }
    }

    #[test]
    fn test_clock_ahead_of_cursor_never_overlaps() {
        let mixer = mixer();
        let mut scheduler = PlaybackScheduler::new();

        // The output side renders while the cursor still reads 0
        let mut out = vec![0.0; 5];
        mixer.render(&mut out);

        let a = scheduler.schedule(&mixer, &buffer(10));
        let b = scheduler.schedule(&mixer, &buffer(10));
        assert!((a.start_time - 0.05).abs() < 1e-9);
        assert!((b.start_time - a.end_time()).abs() < 1e-9);

        let mut out = vec![0.0; 25];
        mixer.render(&mut out);
        assert!(out[..20].iter().all(|s| (s - 0.1).abs() < 1e-6), "{:?}", out);
        assert!(out[20..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_stop_all_clears_and_rewinds() {
        let mixer = mixer();
        let mut scheduler = PlaybackScheduler::new();
        scheduler.schedule(&mixer, &buffer(50));
        scheduler.schedule(&mixer, &buffer(50));

        assert_eq!(scheduler.stop_all(&mixer), 2);
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(scheduler.next_start_time(), 0.0);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_finish_deregisters() {
        let mixer = mixer();
        let mut scheduler = PlaybackScheduler::new();
        let source = scheduler.schedule(&mixer, &buffer(10));

        assert!(scheduler.is_active(source.id));
        assert!(scheduler.finish(source.id));
        assert!(!scheduler.finish(source.id));
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn test_buffer_is_resampled_to_timeline_rate() {
        let mixer = mixer();
        let mut scheduler = PlaybackScheduler::new();
        let source = scheduler.schedule(&mixer, &AudioBuffer::mono(vec![0.0; 200], 200));

        assert!((source.duration - 1.0).abs() < 1e-9);
    }
}
