use crate::audio::codec::rms;

/// Default RMS below which a frame counts as silence
pub const DEFAULT_NOISE_GATE_THRESHOLD: f32 = 0.005;

/// Drops near-silent microphone frames before they are encoded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseGate {
    threshold: f32,
}

impl NoiseGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// A frame passes when its RMS reaches the threshold
    pub fn admits(&self, samples: &[f32]) -> bool {
        rms(samples) >= self.threshold
    }
}

impl Default for NoiseGate {
    fn default() -> Self {
        Self::new(DEFAULT_NOISE_GATE_THRESHOLD)
    }
}
