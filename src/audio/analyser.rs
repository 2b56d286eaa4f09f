use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::codec::rms;

/// Amplitude meter fed by the capture pump or the mixer
///
/// Holds the RMS of the most recent block as raw `f32` bits so it can be
/// written from the audio thread without locking.
#[derive(Debug, Clone, Default)]
pub struct LevelMeter {
    level: Arc<AtomicU32>,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, samples: &[f32]) {
        self.set(rms(samples));
    }

    pub fn set(&self, level: f32) {
        self.level.store(level.to_bits(), Ordering::Relaxed);
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.set(0.0);
    }
}

/// Input and output analysers, shared between the bridge and observers
#[derive(Debug, Clone, Default)]
pub struct AudioLevels {
    pub input: LevelMeter,
    pub output: LevelMeter,
}

impl AudioLevels {
    pub fn snapshot(&self) -> LevelSnapshot {
        LevelSnapshot {
            input: self.input.level(),
            output: self.output.level(),
        }
    }

    pub fn reset(&self) {
        self.input.reset();
        self.output.reset();
    }
}

/// Point-in-time analyser readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelSnapshot {
    pub input: f32,
    pub output: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_is_shared_between_clones() {
        let levels = AudioLevels::default();
        let writer = levels.clone();

        writer.input.observe(&[0.5, -0.5]);
        writer.output.set(0.25);

        let snapshot = levels.snapshot();
        assert!((snapshot.input - 0.5).abs() < 1e-6);
        assert_eq!(snapshot.output, 0.25);

        levels.reset();
        assert_eq!(levels.snapshot(), LevelSnapshot { input: 0.0, output: 0.0 });
    }
}
