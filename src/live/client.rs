//! Gemini Live API client
//!
//! Implements [`LiveTransport`] over the `BidiGenerateContent` WebSocket
//! endpoint.
//!
//! - Endpoint: `wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent?key=<key>`
//! - Protocol: WebSocket with JSON frames (the server may send them as binary)
//! - Audio in: PCM 16-bit, 16kHz, mono, little-endian, base64 encoded
//! - Audio out: PCM 16-bit, 24kHz, mono

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::messages::{ClientMessage, ServerMessage};
use super::transport::{
    LiveConnection, LiveSender, LiveTransport, RealtimeAudio, ServerEvent, SessionSetup,
    TransportEvent,
};
use crate::config::LiveConfig;
use crate::error::{LiveError, LiveResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `close` waits for the connection task to say goodbye
const CLOSE_GRACE: Duration = Duration::from_secs(2);

enum Outbound {
    Message(ClientMessage),
    Close,
}

pub struct GeminiLiveClient {
    url: String,
    api_key: String,
    connect_timeout: Duration,
}

impl GeminiLiveClient {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            connect_timeout,
        }
    }

    /// Build a client from config, reading the API key from the configured
    /// environment variable
    pub fn from_config(config: &LiveConfig) -> LiveResult<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            LiveError::Config(format!("environment variable {} is not set", config.api_key_env))
        })?;

        Ok(Self::new(
            config.url.clone(),
            api_key,
            Duration::from_secs(config.connect_timeout_secs),
        ))
    }

    fn endpoint(&self) -> String {
        format!("{}?key={}", self.url, self.api_key)
    }

    /// Send `setup` and wait for `setupComplete`
    async fn handshake(sink: &mut SplitSink<WsStream, Message>, stream: &mut SplitStream<WsStream>, setup: &SessionSetup) -> LiveResult<()> {
        let json = serde_json::to_string(&setup.to_message())
            .map_err(|e| LiveError::Transport(format!("failed to serialize setup: {}", e)))?;

        sink.send(Message::Text(json))
            .await
            .map_err(|e| LiveError::Transport(format!("failed to send setup: {}", e)))?;

        while let Some(msg) = stream.next().await {
            let payload = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                Ok(Message::Close(frame)) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "connection closed".to_string());
                    return Err(LiveError::Transport(reason));
                }
                Ok(_) => continue,
                Err(e) => return Err(LiveError::Transport(e.to_string())),
            };

            match serde_json::from_str::<ServerMessage>(&payload) {
                Ok(msg) if msg.setup_complete.is_some() => return Ok(()),
                Ok(_) => debug!("Ignoring message received before setup completed"),
                Err(e) => warn!("Failed to parse server message during setup: {}", e),
            }
        }

        Err(LiveError::Transport("connection closed before setup completed".to_string()))
    }
}

#[async_trait::async_trait]
impl LiveTransport for GeminiLiveClient {
    async fn connect(&self, setup: &SessionSetup) -> LiveResult<LiveConnection> {
        info!("Connecting to Live API at {} (model={})", self.url, setup.model);

        let (ws, _response) = tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(self.endpoint()))
            .await
            .map_err(|_| LiveError::Timeout("connecting to Live API".to_string()))?
            .map_err(|e| LiveError::Transport(e.to_string()))?;

        let (mut sink, mut stream) = ws.split();

        tokio::time::timeout(self.connect_timeout, Self::handshake(&mut sink, &mut stream, setup))
            .await
            .map_err(|_| LiveError::Timeout("waiting for setupComplete".to_string()))??;

        info!("Live session open (voice={})", setup.voice);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_connection(sink, stream, outbound_rx, events_tx));

        Ok(LiveConnection {
            sender: Box::new(GeminiLiveSender {
                outbound: outbound_tx,
                task: Mutex::new(Some(task)),
            }),
            events: events_rx,
        })
    }
}

struct GeminiLiveSender {
    outbound: mpsc::UnboundedSender<Outbound>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait::async_trait]
impl LiveSender for GeminiLiveSender {
    fn send_audio(&self, audio: RealtimeAudio) -> LiveResult<()> {
        self.outbound
            .send(Outbound::Message(audio.to_message()))
            .map_err(|_| LiveError::Transport("session is closed".to_string()))
    }

    async fn close(&self) -> LiveResult<()> {
        let _ = self.outbound.send(Outbound::Close);

        let task = self.task.lock().take();
        if let Some(mut task) = task {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                warn!("Live connection did not close in time, aborting");
                task.abort();
            }
        }

        Ok(())
    }
}

/// Pump outbound messages and inbound frames until either side ends
async fn run_connection(
    mut sink: SplitSink<WsStream, Message>,
    mut stream: SplitStream<WsStream>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    loop {
        tokio::select! {
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Message(message)) => {
                    let json = match serde_json::to_string(&message) {
                        Ok(j) => j,
                        Err(e) => {
                            error!("Failed to serialize client message: {}", e);
                            continue;
                        }
                    };

                    if let Err(e) = sink.send(Message::Text(json)).await {
                        error!("Failed to send WebSocket message: {}", e);
                        let _ = events.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    debug!("Closing Live connection");
                    let _ = sink.send(Message::Close(None)).await;
                    let _ = sink.close().await;
                    break;
                }
            },

            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => forward_payload(&text, &events),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => forward_payload(text, &events),
                    Err(e) => warn!("Dropping non-UTF-8 binary frame: {}", e),
                },
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = sink.send(Message::Pong(data)).await {
                        error!("Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let event = close_event(frame);
                    info!("WebSocket closed by server: {:?}", event);
                    let _ = events.send(event);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    let _ = events.send(TransportEvent::Error(e.to_string()));
                    break;
                }
                None => {
                    let _ = events.send(TransportEvent::Closed { reason: None });
                    break;
                }
            },
        }
    }

    debug!("Live connection task finished");
}

fn forward_payload(text: &str, events: &mpsc::UnboundedSender<TransportEvent>) {
    match parse_payload(text) {
        Ok(parsed) => {
            for event in parsed {
                let _ = events.send(event);
            }
        }
        Err(e) => warn!("Failed to parse server message: {}", e),
    }
}

/// Turn one server frame into the events the session cares about
pub fn parse_payload(text: &str) -> Result<Vec<TransportEvent>, serde_json::Error> {
    let message: ServerMessage = serde_json::from_str(text)?;
    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        debug!("Duplicate setupComplete ignored");
    }

    if let Some(content) = message.server_content {
        events.push(TransportEvent::Server(ServerEvent::from(content)));
    }

    if let Some(go_away) = message.go_away {
        events.push(TransportEvent::GoAway {
            time_left: go_away.time_left,
        });
    }

    Ok(events)
}

/// Normal and going-away closes are clean; any other code is an error
pub fn close_event(frame: Option<CloseFrame<'static>>) -> TransportEvent {
    match frame {
        None => TransportEvent::Closed { reason: None },
        Some(frame) => {
            let reason = frame.reason.to_string();
            match frame.code {
                CloseCode::Normal | CloseCode::Away => TransportEvent::Closed {
                    reason: (!reason.is_empty()).then_some(reason),
                },
                code if reason.is_empty() => TransportEvent::Error(format!("connection closed with code {}", code)),
                _ => TransportEvent::Error(reason),
            }
        }
    }
}
