// Unit tests for audio backend abstractions
//
// These tests verify the core audio types and the backend factory.

use loqa_live::audio::{
    AudioBackendConfig, AudioBackendFactory, AudioDevices, AudioFrame, AudioOutput, AudioSource,
};
use std::path::PathBuf;

#[test]
fn test_audio_frame_duration() {
    let frame = AudioFrame {
        samples: vec![0.0; 8192],
        sample_rate: 16000,
        timestamp_ms: 1000,
    };

    assert_eq!(frame.samples.len(), 8192);
    assert!((frame.duration_secs() - 0.512).abs() < 1e-9);
}

#[test]
fn test_audio_backend_config_default() {
    let config = AudioBackendConfig::default();

    assert_eq!(config.input_sample_rate, 16000, "Upstream audio is 16kHz");
    assert_eq!(config.output_sample_rate, 24000, "Replies are 24kHz");
    assert_eq!(config.capture_frame_size, 8192);
}

#[test]
fn test_factory_missing_file_fails() {
    let factory = AudioBackendFactory::new(
        AudioSource::File(PathBuf::from("/nonexistent/input.wav")),
        AudioOutput::Clocked { record_to: None },
    );

    let result = factory.open_capture(&AudioBackendConfig::default());
    assert!(result.is_err());
    assert!(result.err().map(|e| e.is_device_failure()).unwrap_or(false));
}

#[test]
fn test_factory_clocked_sink() {
    let factory = AudioBackendFactory::new(AudioSource::Microphone, AudioOutput::Clocked { record_to: None });

    let sink = factory.open_sink(&AudioBackendConfig::default()).unwrap();
    assert_eq!(sink.name(), "clocked");
}

#[cfg(not(feature = "microphone"))]
#[test]
fn test_factory_without_microphone_feature() {
    let factory = AudioBackendFactory::new(AudioSource::Microphone, AudioOutput::Speaker);
    let config = AudioBackendConfig::default();

    assert!(factory.open_capture(&config).is_err());
    assert!(factory.open_sink(&config).is_err());
}
