use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::conversation::{ConnectionStatus, Conversation, ConversationSnapshot, Effect, Message};
use super::gate::NoiseGate;
use super::stats::SessionStats;
use crate::audio::codec::{self, float_to_int16, pcm16_to_bytes};
use crate::audio::mixer::EndedCallback;
use crate::audio::{AudioBridge, AudioDevices, AudioFrame, AudioLevels, LevelSnapshot, SourceId};
use crate::error::{LiveError, LiveResult};
use crate::live::{LiveSender, LiveTransport, RealtimeAudio, ServerEvent, TransportEvent};

/// Result of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    /// A session was already connecting or connected; nothing changed
    AlreadyActive,
}

/// Playback timeline as seen by the controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PlaybackState {
    pub active_sources: usize,
    /// Playback cursor in output-clock seconds
    pub next_start_time: f64,
    pub mixer_voices: usize,
}

enum Command {
    Start(oneshot::Sender<LiveResult<StartOutcome>>),
    Stop(oneshot::Sender<SessionStats>),
    Snapshot(oneshot::Sender<ConversationSnapshot>),
    Stats(oneshot::Sender<SessionStats>),
    Playback(oneshot::Sender<PlaybackState>),
    Shutdown(oneshot::Sender<()>),
}

/// Audio-thread notifications, tagged with the epoch of the session that
/// produced them
enum DeviceEvent {
    Frame { epoch: u64, frame: AudioFrame },
    PlaybackEnded { epoch: u64, id: SourceId },
}

/// Owns the live session, the audio bridge and the conversation
///
/// Runs as a single task: commands, device callbacks and transport events
/// are handled one at a time, so nothing here needs a lock. Every session
/// gets a new epoch; device events from an older epoch are ignored.
pub struct SessionController {
    config: SessionConfig,
    devices: Arc<dyn AudioDevices>,
    transport: Arc<dyn LiveTransport>,
    gate: NoiseGate,

    epoch: u64,
    active: bool,
    status: ConnectionStatus,

    bridge: Option<AudioBridge>,
    sender: Option<Box<dyn LiveSender>>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,

    conversation: Conversation,
    error: Option<String>,
    stats: SessionStats,
    ended_at: Option<DateTime<Utc>>,
    levels: AudioLevels,

    device_tx: mpsc::UnboundedSender<DeviceEvent>,
    snapshots: watch::Sender<ConversationSnapshot>,
}

impl SessionController {
    /// Start the controller task and return a handle to it
    pub fn spawn(
        config: SessionConfig,
        devices: Arc<dyn AudioDevices>,
        transport: Arc<dyn LiveTransport>,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (device_tx, device_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(ConversationSnapshot::default());
        let levels = AudioLevels::default();

        let controller = Self {
            gate: NoiseGate::new(config.noise_gate_threshold),
            config,
            devices,
            transport,
            epoch: 0,
            active: false,
            status: ConnectionStatus::Disconnected,
            bridge: None,
            sender: None,
            events: None,
            conversation: Conversation::new(),
            error: None,
            stats: SessionStats::default(),
            ended_at: None,
            levels: levels.clone(),
            device_tx,
            snapshots: snapshot_tx,
        };

        tokio::spawn(controller.run(command_rx, device_rx));

        SessionHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            levels,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut device_events: mpsc::UnboundedReceiver<DeviceEvent>,
    ) {
        info!("Session controller started");

        loop {
            tokio::select! {
                biased;

                event = next_transport_event(&mut self.events) => match event {
                    Some(event) => self.on_transport_event(event).await,
                    None => self.on_transport_close(None).await,
                },

                Some(event) = device_events.recv() => self.on_device_event(event),

                command = commands.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        self.cleanup().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.on_command(command).await,
                    None => {
                        debug!("All session handles dropped");
                        self.cleanup().await;
                        break;
                    }
                },
            }
        }

        info!("Session controller stopped");
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                let result = self.start().await;
                let _ = reply.send(result);
            }
            Command::Stop(reply) => {
                self.cleanup().await;
                let _ = reply.send(self.stats());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            Command::Playback(reply) => {
                let _ = reply.send(self.playback());
            }
            Command::Shutdown(_) => {}
        }
    }

    /// Open devices, connect, then start streaming the microphone
    async fn start(&mut self) -> LiveResult<StartOutcome> {
        if self.active {
            warn!("Session already {:?}, ignoring start", self.status);
            return Ok(StartOutcome::AlreadyActive);
        }

        self.error = None;
        self.epoch += 1;
        self.active = true;
        self.status = ConnectionStatus::Connecting;
        self.stats = SessionStats::starting();
        self.ended_at = None;
        self.publish();

        info!("Starting session (epoch {})", self.epoch);

        match self.connect(self.epoch).await {
            Ok(()) => {
                info!("Session connected");
                self.publish();
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                error!("Failed to start session: {}", e);
                self.cleanup().await;
                self.error = Some(self.config.errors.device_message().to_string());
                self.publish();
                Err(e)
            }
        }
    }

    async fn connect(&mut self, epoch: u64) -> LiveResult<()> {
        let ended_tx = self.device_tx.clone();
        let on_ended: EndedCallback = Arc::new(move |id| {
            let _ = ended_tx.send(DeviceEvent::PlaybackEnded { epoch, id });
        });

        let bridge = AudioBridge::open(self.devices.as_ref(), &self.config.audio, self.levels.clone(), on_ended).await?;
        self.bridge = Some(bridge);

        let setup = self.config.setup();
        let connection = tokio::time::timeout(self.config.connect_timeout, self.transport.connect(&setup))
            .await
            .map_err(|_| LiveError::Timeout("waiting for session to open".to_string()))??;

        self.sender = Some(connection.sender);
        self.events = Some(connection.events);
        self.status = ConnectionStatus::Connected;

        let frame_tx = self.device_tx.clone();
        if let Some(bridge) = self.bridge.as_mut() {
            bridge
                .start_capture(move |frame| {
                    let _ = frame_tx.send(DeviceEvent::Frame { epoch, frame });
                })
                .await?;
        }

        Ok(())
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.active && epoch == self.epoch
    }

    fn on_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Frame { epoch, frame } if self.is_current(epoch) => self.on_frame(frame),
            DeviceEvent::PlaybackEnded { epoch, id } if self.is_current(epoch) => {
                if let Some(bridge) = self.bridge.as_mut() {
                    bridge.source_ended(id);
                }
            }
            _ => debug!("Dropping device event from a stale session"),
        }
    }

    /// Gate, encode and send one microphone frame
    fn on_frame(&mut self, frame: AudioFrame) {
        self.stats.frames_captured += 1;

        if !self.gate.admits(&frame.samples) {
            self.stats.frames_gated += 1;
            return;
        }

        let Some(sender) = self.sender.as_ref() else {
            return;
        };

        let data = codec::encode(&pcm16_to_bytes(&float_to_int16(&frame.samples)));
        match sender.send_audio(RealtimeAudio::pcm16(data)) {
            Ok(()) => self.stats.frames_sent += 1,
            Err(e) => warn!("Failed to send audio frame at {}ms: {}", frame.timestamp_ms, e),
        }
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        if !self.active {
            return;
        }

        match event {
            TransportEvent::Server(event) => self.on_server_event(event),
            TransportEvent::GoAway { time_left } => {
                warn!("Server will disconnect soon (time left: {})", time_left.as_deref().unwrap_or("unknown"));
            }
            TransportEvent::Error(message) => self.on_transport_error(&message).await,
            TransportEvent::Closed { reason } => self.on_transport_close(reason).await,
        }
    }

    fn on_server_event(&mut self, event: ServerEvent) {
        for effect in self.conversation.handle(&event, Instant::now()) {
            match effect {
                Effect::Play(data) => self.play_chunk(&data),
                Effect::StopPlayback => {
                    info!("Interrupted, stopping playback");
                    self.stats.interruptions += 1;
                    if let Some(bridge) = self.bridge.as_mut() {
                        bridge.stop_all_playback();
                    }
                }
                Effect::Commit(messages) => {
                    self.stats.turns_completed += 1;
                    for message in &messages {
                        log_message(message);
                    }
                }
            }
        }

        self.publish();
    }

    /// Decode one reply chunk and queue it; a bad chunk is skipped
    fn play_chunk(&mut self, data: &str) {
        let Some(bridge) = self.bridge.as_mut() else {
            return;
        };

        let buffer = codec::decode(data)
            .and_then(|bytes| codec::decode_audio_data(&bytes, self.config.audio.output_sample_rate, 1));

        match buffer {
            Ok(buffer) => {
                bridge.schedule_playback(&buffer);
                self.stats.chunks_played += 1;
            }
            Err(e) => {
                warn!("Skipping malformed audio chunk: {}", e);
                self.stats.chunks_dropped += 1;
            }
        }
    }

    async fn on_transport_error(&mut self, message: &str) {
        let class = self.config.errors.classify(message);
        error!("Session error ({:?}): {}", class, message);

        self.error = Some(self.config.errors.message_for(message).to_string());
        self.cleanup().await;
    }

    async fn on_transport_close(&mut self, reason: Option<String>) {
        info!("Session closed: {}", reason.as_deref().unwrap_or("no reason given"));
        self.conversation.turn_mut().stop_speaking();
        self.cleanup().await;
    }

    /// Release everything; safe to call from any state, any number of times
    async fn cleanup(&mut self) {
        let was_running = self.status != ConnectionStatus::Disconnected;

        // Inactive first, so anything still in flight is ignored
        self.active = false;
        self.epoch += 1;

        if let Some(bridge) = self.bridge.as_mut() {
            bridge.stop_all_playback();
        }

        self.events = None;
        if let Some(sender) = self.sender.take() {
            if let Err(e) = sender.close().await {
                debug!("Ignoring error while closing session: {}", e);
            }
        }

        if let Some(mut bridge) = self.bridge.take() {
            bridge.close().await;
        }

        if was_running {
            self.ended_at = Some(Utc::now());
            info!("Session torn down");
        }
        self.status = ConnectionStatus::Disconnected;
        self.conversation.turn_mut().clear();
        self.publish();
    }

    fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot::capture(&self.conversation, self.status, self.error.clone())
    }

    fn stats(&self) -> SessionStats {
        self.stats.as_of(self.status, self.ended_at)
    }

    fn playback(&self) -> PlaybackState {
        self.bridge
            .as_ref()
            .map(|bridge| PlaybackState {
                active_sources: bridge.active_sources(),
                next_start_time: bridge.next_start_time(),
                mixer_voices: bridge.mixer().active_voices(),
            })
            .unwrap_or_default()
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}

async fn next_transport_event(events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn log_message(message: &Message) {
    info!("{:?}: {}", message.sender, message.text);
}

/// Cloneable handle to a running [`SessionController`]
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<ConversationSnapshot>,
    levels: AudioLevels,
}

impl SessionHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> LiveResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(command(tx)).map_err(|_| LiveError::ControllerGone)?;
        rx.await.map_err(|_| LiveError::ControllerGone)
    }

    /// Start a session unless one is already connecting or connected
    pub async fn start(&self) -> LiveResult<StartOutcome> {
        self.request(Command::Start).await?
    }

    /// Tear the session down and return its final stats
    pub async fn stop(&self) -> LiveResult<SessionStats> {
        self.request(Command::Stop).await
    }

    pub async fn snapshot(&self) -> LiveResult<ConversationSnapshot> {
        self.request(Command::Snapshot).await
    }

    pub async fn stats(&self) -> LiveResult<SessionStats> {
        self.request(Command::Stats).await
    }

    pub async fn playback(&self) -> LiveResult<PlaybackState> {
        self.request(Command::Playback).await
    }

    /// Tear down and stop the controller task
    pub async fn shutdown(&self) -> LiveResult<()> {
        self.request(Command::Shutdown).await
    }

    /// Snapshot updates, published after every state change
    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.snapshots.clone()
    }

    /// Current analyser readings
    pub fn levels(&self) -> LevelSnapshot {
        self.levels.snapshot()
    }
}
