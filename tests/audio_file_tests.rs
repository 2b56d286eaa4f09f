// Integration tests for the file and headless audio backends
//
// WAV fixtures are generated into a temp dir so the tests are self-contained.

mod common;

use anyhow::Result;
use common::*;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use loqa_live::audio::{
    AudioBackendConfig, AudioBackendFactory, AudioFile, AudioLevels, AudioOutput, AudioSource,
    CaptureBackend, ClockedSink, FileCapture, MixerConfig, PlaybackMixer, PlaybackSink,
};
use loqa_live::session::{SessionController, StartOutcome};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) -> Result<()> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("stereo.wav");
    write_wav(&path, 48000, 2, &vec![16384; 48000 * 2])?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 48000);
    assert_eq!(audio.channels, 2);
    assert!((audio.duration_seconds - 1.0).abs() < 1e-9);
    assert!(audio.path.contains("stereo.wav"));
    assert!((audio.samples[0] - 0.5).abs() < 1e-3);

    // Down-mixed and resampled for the 16kHz capture path
    let mono = audio.to_mono(16000);
    assert!((mono.len() as i64 - 16000).abs() <= 1);

    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let result = AudioFile::open("/nonexistent/path/to/audio.wav");
    assert!(result.is_err(), "Opening nonexistent file should fail");
}

#[tokio::test]
async fn test_file_capture_emits_fixed_frames() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("speech.wav");
    write_wav(&path, 16000, 1, &vec![3000; 2500])?;

    let config = AudioBackendConfig {
        capture_frame_size: 1024,
        ..Default::default()
    };
    let mut capture = FileCapture::open(&path, config)?.without_pacing();
    let mut frames = capture.start().await?;

    let mut received = Vec::new();
    while let Some(frame) = frames.recv().await {
        received.push(frame);
    }

    assert_eq!(received.len(), 3);
    assert!(received.iter().all(|f| f.samples.len() == 1024 && f.sample_rate == 16000));
    assert_eq!(received[1].timestamp_ms, 64);
    assert_eq!(received[2].samples[1023], 0.0);

    capture.stop().await?;
    assert!(!capture.is_capturing());
    Ok(())
}

#[tokio::test]
async fn test_clocked_sink_records_reply_audio() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("reply.wav");

    let levels = AudioLevels::default();
    let mixer = PlaybackMixer::new(MixerConfig { sample_rate: 24000 }, levels.output.clone());
    let mut sink = ClockedSink::new(24000, Some(path.clone()));
    sink.start(mixer.clone())?;

    mixer.start(1, vec![0.5; 2400], 0.0);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(mixer.current_time() > 0.1, "clock should advance in real time");
    assert_eq!(mixer.active_voices(), 0);

    sink.finish().await;

    let reader = WavReader::open(&path)?;
    assert_eq!(reader.spec().sample_rate, 24000);
    assert_eq!(reader.duration(), 2400, "header should carry the final length");
    let samples: Vec<i16> = reader.into_samples::<i16>().collect::<Result<_, _>>()?;
    assert_eq!(samples.len(), 2400, "the whole reply should be recorded");
    assert!(samples.iter().all(|&s| s > 16000));

    Ok(())
}

#[tokio::test]
async fn test_clocked_sink_stop_finalizes_recording() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("reply.wav");

    let levels = AudioLevels::default();
    let mixer = PlaybackMixer::new(MixerConfig { sample_rate: 24000 }, levels.output.clone());
    let mut sink = ClockedSink::new(24000, Some(path.clone()));
    sink.start(mixer.clone())?;

    mixer.start(1, vec![0.25; 960], 0.0);
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Stopping through the sink interface signals the task, which finalizes
    sink.stop()?;
    eventually(|| {
        let path = path.clone();
        async move { WavReader::open(&path).map(|r| r.duration() == 960).unwrap_or(false) }
    })
    .await;

    // Still safe once stopped
    sink.stop()?;
    sink.finish().await;
    Ok(())
}

#[tokio::test]
async fn test_session_streams_wav_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("question.wav");

    // One loud frame, then one silent frame
    let mut pcm = vec![8000i16; FRAME_SIZE];
    pcm.extend(vec![0i16; FRAME_SIZE]);
    write_wav(&path, 16000, 1, &pcm)?;

    let devices = AudioBackendFactory::new(AudioSource::File(path), AudioOutput::Clocked { record_to: None });
    let transport = FakeTransport::new();
    let session = SessionController::spawn(test_config(), Arc::new(devices), Arc::new(transport.clone()));

    assert_eq!(session.start().await?, StartOutcome::Started);

    eventually(|| async { session.stats().await.unwrap().frames_captured == 2 }).await;

    let stats = session.stats().await?;
    assert_eq!(stats.frames_sent, 1);
    assert_eq!(stats.frames_gated, 1);
    assert_eq!(transport.sent().len(), 1);

    session.shutdown().await?;
    Ok(())
}
