//! PCM codec helpers
//!
//! Conversions between float samples, 16-bit little-endian PCM and the base64
//! text encoding used on the realtime session.

use base64::Engine;

use crate::error::{LiveError, LiveResult};

/// Full-scale factor for 16-bit PCM
const PCM16_SCALE: f32 = 32767.0;

/// Bytes per 16-bit sample
const BYTES_PER_SAMPLE: usize = 2;

/// Encode binary audio for transport
pub fn encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode a transport string back into bytes
pub fn decode(data: &str) -> LiveResult<Vec<u8>> {
    Ok(base64::engine::general_purpose::STANDARD.decode(data)?)
}

/// Convert float samples to 16-bit PCM, clamping anything outside [-1, 1]
pub fn float_to_int16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * PCM16_SCALE) as i16)
        .collect()
}

/// Convert 16-bit PCM back to normalized float samples
pub fn int16_to_float(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&s| (s as f32 / PCM16_SCALE).max(-1.0))
        .collect()
}

/// Serialize samples as little-endian bytes
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Root-mean-square amplitude of a frame (linear, not dB)
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Decoded, playback-ready audio
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// One vector of normalized samples per channel
    pub channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: vec![samples],
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// Playback duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Average all channels into one
    pub fn to_mono(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => (0..self.frames())
                .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }
}

/// Interpret raw little-endian 16-bit PCM as a playable buffer
pub fn decode_audio_data(bytes: &[u8], sample_rate: u32, channel_count: usize) -> LiveResult<AudioBuffer> {
    let frame_size = BYTES_PER_SAMPLE * channel_count;
    if frame_size == 0 || bytes.len() % frame_size != 0 {
        return Err(LiveError::Format {
            len: bytes.len(),
            frame_size,
        });
    }

    let frames = bytes.len() / frame_size;
    let mut channels = vec![Vec::with_capacity(frames); channel_count];

    for (i, chunk) in bytes.chunks_exact(BYTES_PER_SAMPLE).enumerate() {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        channels[i % channel_count].push((sample as f32 / PCM16_SCALE).max(-1.0));
    }

    Ok(AudioBuffer {
        sample_rate,
        channels,
    })
}

/// Average interleaved channels into mono
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resampler for mono samples
pub fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return input.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }

    output
}

/// Linear resampler for a continuous stream
///
/// Keeps the fractional read position and unread source samples between
/// calls so block boundaries stay seamless. The output side pulls with
/// [`fill`](Self::fill); a producer such as a microphone callback pushes with
/// [`push`](Self::push). Use one or the other on a given instance.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    step: f64,
    pos: f64,
    history: Vec<f32>,
}

impl StreamResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        Self {
            step: source_rate as f64 / target_rate as f64,
            pos: 0.0,
            history: Vec::new(),
        }
    }

    /// Fill `out` at the target rate, pulling source blocks from `pull` as needed
    pub fn fill(&mut self, out: &mut [f32], mut pull: impl FnMut(&mut [f32])) {
        if out.is_empty() {
            return;
        }

        let last_needed = (self.pos + (out.len() - 1) as f64 * self.step).floor() as usize + 1;
        if self.history.len() <= last_needed {
            let mut block = vec![0.0; last_needed + 1 - self.history.len()];
            pull(&mut block);
            self.history.extend_from_slice(&block);
        }

        for (i, sample) in out.iter_mut().enumerate() {
            let p = self.pos + i as f64 * self.step;
            let i0 = p.floor() as usize;
            let frac = (p - i0 as f64) as f32;
            let s0 = self.history[i0];
            let s1 = self.history[i0 + 1];
            *sample = s0 + frac * (s1 - s0);
        }

        let next = self.pos + out.len() as f64 * self.step;
        let consumed = (next.floor() as usize).min(self.history.len());
        self.history.drain(..consumed);
        self.pos = next - consumed as f64;
    }

    /// Resample one pushed source block, carrying the unread tail over
    pub fn push(&mut self, input: &[f32]) -> Vec<f32> {
        self.history.extend_from_slice(input);

        let mut out = Vec::with_capacity((input.len() as f64 / self.step) as usize + 1);
        let mut p = self.pos;
        while (p.floor() as usize) + 1 < self.history.len() {
            let i0 = p.floor() as usize;
            let frac = (p - i0 as f64) as f32;
            let s0 = self.history[i0];
            let s1 = self.history[i0 + 1];
            out.push(s0 + frac * (s1 - s0));
            p = self.pos + out.len() as f64 * self.step;
        }

        let consumed = (p.floor() as usize).min(self.history.len());
        self.history.drain(..consumed);
        self.pos = p - consumed as f64;
        out
    }
}
