// Test doubles for the audio devices and the realtime transport
//
// The controller runs for real; these fakes let a test inject microphone
// frames and server events, render the output clock by hand, and inspect what
// was sent upstream.

#![allow(dead_code)]

use loqa_live::audio::codec::{encode, float_to_int16, pcm16_to_bytes};
use loqa_live::audio::{
    AudioBackendConfig, AudioDevices, AudioFrame, CaptureBackend, PlaybackMixer, PlaybackSink,
};
use loqa_live::live::{
    LiveConnection, LiveSender, LiveTransport, RealtimeAudio, SessionSetup, TransportEvent,
};
use loqa_live::session::SessionConfig;
use loqa_live::{LiveError, LiveResult};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const FRAME_SIZE: usize = 1024;

pub fn test_config() -> SessionConfig {
    SessionConfig {
        connect_timeout: Duration::from_millis(200),
        audio: AudioBackendConfig {
            capture_frame_size: FRAME_SIZE,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Base64 PCM reply chunk of `samples` 24kHz samples at a constant level
pub fn reply_chunk(samples: usize) -> String {
    encode(&pcm16_to_bytes(&float_to_int16(&vec![0.2; samples])))
}

pub fn frame(level: f32) -> AudioFrame {
    AudioFrame {
        samples: vec![level; FRAME_SIZE],
        sample_rate: 16000,
        timestamp_ms: 0,
    }
}

/// Poll `check` until it holds, failing the test after about a second
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

// ============================================================================
// Devices
// ============================================================================

#[derive(Default)]
pub struct DeviceProbe {
    pub frames: Mutex<Option<mpsc::Sender<AudioFrame>>>,
    pub mixer: Mutex<Option<PlaybackMixer>>,
    pub opened: AtomicUsize,
    pub capture_stopped: AtomicUsize,
    pub sink_stopped: AtomicUsize,
}

/// Device provider whose capture is fed by the test and whose sink renders
/// only when the test asks
#[derive(Clone, Default)]
pub struct FakeDevices {
    pub probe: Arc<DeviceProbe>,
    pub deny_microphone: bool,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denied() -> Self {
        Self {
            deny_microphone: true,
            ..Default::default()
        }
    }

    pub async fn send_frame(&self, frame: AudioFrame) {
        let tx = self.probe.frames.lock().clone().expect("capture not started");
        tx.send(frame).await.expect("capture pump gone");
    }

    /// Advance the output clock by `frames` samples
    pub fn render(&self, frames: usize) {
        let mixer = self.probe.mixer.lock().clone().expect("sink not started");
        let mut out = vec![0.0; frames];
        mixer.render(&mut out);
    }

    /// The output timeline of the current session
    pub fn mixer(&self) -> PlaybackMixer {
        self.probe.mixer.lock().clone().expect("sink not started")
    }

    pub fn capture_stopped(&self) -> usize {
        self.probe.capture_stopped.load(Ordering::SeqCst)
    }

    pub fn sink_stopped(&self) -> usize {
        self.probe.sink_stopped.load(Ordering::SeqCst)
    }
}

impl AudioDevices for FakeDevices {
    fn open_capture(&self, _config: &AudioBackendConfig) -> LiveResult<Box<dyn CaptureBackend>> {
        if self.deny_microphone {
            return Err(LiveError::Permission("denied by test".to_string()));
        }
        self.probe.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCapture {
            probe: Arc::clone(&self.probe),
            capturing: false,
        }))
    }

    fn open_sink(&self, _config: &AudioBackendConfig) -> LiveResult<Box<dyn PlaybackSink>> {
        Ok(Box::new(ManualSink {
            probe: Arc::clone(&self.probe),
        }))
    }
}

struct FakeCapture {
    probe: Arc<DeviceProbe>,
    capturing: bool,
}

#[async_trait::async_trait]
impl CaptureBackend for FakeCapture {
    async fn start(&mut self) -> LiveResult<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(64);
        *self.probe.frames.lock() = Some(tx);
        self.capturing = true;
        Ok(rx)
    }

    async fn stop(&mut self) -> LiveResult<()> {
        self.probe.frames.lock().take();
        self.probe.capture_stopped.fetch_add(1, Ordering::SeqCst);
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "fake-capture"
    }
}

struct ManualSink {
    probe: Arc<DeviceProbe>,
}

impl PlaybackSink for ManualSink {
    fn start(&mut self, mixer: PlaybackMixer) -> LiveResult<()> {
        *self.probe.mixer.lock() = Some(mixer);
        Ok(())
    }

    fn stop(&mut self) -> LiveResult<()> {
        if self.probe.mixer.lock().take().is_some() {
            self.probe.sink_stopped.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "manual"
    }
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectBehavior {
    #[default]
    Open,
    Fail,
    Hang,
}

#[derive(Default)]
pub struct TransportProbe {
    pub events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    pub sent: Mutex<Vec<RealtimeAudio>>,
    pub setups: Mutex<Vec<SessionSetup>>,
    pub closed: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct FakeTransport {
    pub probe: Arc<TransportProbe>,
    pub behavior: ConnectBehavior,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: ConnectBehavior) -> Self {
        Self {
            behavior,
            ..Default::default()
        }
    }

    /// Deliver an event as if the server had sent it
    pub fn emit(&self, event: TransportEvent) {
        let tx = self.probe.events.lock().clone().expect("not connected");
        tx.send(event).expect("controller dropped the session");
    }

    pub fn sent(&self) -> Vec<RealtimeAudio> {
        self.probe.sent.lock().clone()
    }

    pub fn connects(&self) -> usize {
        self.probe.setups.lock().len()
    }

    pub fn closed(&self) -> usize {
        self.probe.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LiveTransport for FakeTransport {
    async fn connect(&self, setup: &SessionSetup) -> LiveResult<LiveConnection> {
        self.probe.setups.lock().push(setup.clone());

        match self.behavior {
            ConnectBehavior::Open => {}
            ConnectBehavior::Fail => return Err(LiveError::Transport("Network unreachable".to_string())),
            ConnectBehavior::Hang => std::future::pending::<()>().await,
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.probe.events.lock() = Some(tx);

        Ok(LiveConnection {
            sender: Box::new(FakeSender {
                probe: Arc::clone(&self.probe),
            }),
            events: rx,
        })
    }
}

struct FakeSender {
    probe: Arc<TransportProbe>,
}

#[async_trait::async_trait]
impl LiveSender for FakeSender {
    fn send_audio(&self, audio: RealtimeAudio) -> LiveResult<()> {
        self.probe.sent.lock().push(audio);
        Ok(())
    }

    async fn close(&self) -> LiveResult<()> {
        self.probe.closed.fetch_add(1, Ordering::SeqCst);
        // Closing twice must not matter to the controller
        Err(LiveError::Transport("already closed".to_string()))
    }
}
