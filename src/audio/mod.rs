pub mod analyser;
pub mod backend;
pub mod bridge;
pub mod clocked;
pub mod codec;
pub mod file;
pub mod mixer;
pub mod playback;

#[cfg(feature = "microphone")]
pub mod device;

pub use analyser::{AudioLevels, LevelMeter, LevelSnapshot};
pub use backend::{
    AudioBackendConfig, AudioBackendFactory, AudioDevices, AudioFrame, AudioOutput, AudioSource,
    CaptureBackend, PlaybackSink,
};
pub use bridge::AudioBridge;
pub use clocked::ClockedSink;
pub use codec::AudioBuffer;
pub use file::{AudioFile, FileCapture};
pub use mixer::{MixerConfig, PlaybackMixer, SourceId};
pub use playback::{PlaybackScheduler, PlaybackSource};
