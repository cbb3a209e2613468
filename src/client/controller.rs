//! Session controller.
//!
//! Single point of truth for one client-side conversation session: owns the
//! WebSocket connection to the relay, gates capture frames onto the outbound
//! path, sequences inbound audio into the playback sink, and derives turn
//! state and the transcript from the inbound event stream.
//!
//! Inbound events are processed by one reader task strictly in arrival order
//! (transcript accumulation and turn derivation are order-dependent);
//! outbound events are serialized by one writer task fed from one channel, so
//! wire order matches call order. Turn state is derived exclusively from
//! server-reported events: voice activity is detected upstream, so locally
//! starting the microphone must not claim the user is speaking.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::audio::codec;
use crate::audio::playback::AudioSink;
use crate::core::realtime::{ClientEvent, ServerEvent};

use super::transcript::{Message, Transcript, TranscriptAccumulator};

type RelayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Buffered outbound events; capture frames beyond this are dropped rather
/// than blocking the producer.
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Connection lifecycle. Forward-only within a session: a session never
/// returns to `Connecting` after reaching `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Turn state, derived purely from the inbound event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    UserSpeaking,
    AssistantSpeaking,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a session is already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),
}

pub type MessageCallback = Arc<dyn Fn(Message) + Send + Sync>;
pub type TurnCallback = Arc<dyn Fn(TurnState) + Send + Sync>;

struct ControllerShared {
    connection: Mutex<ConnectionState>,
    turn: Mutex<TurnState>,
    transcript: Mutex<Transcript>,
    accumulator: Mutex<TranscriptAccumulator>,
    recording: AtomicBool,
    /// Set by `disconnect` (and by the reader on transport loss) before any
    /// teardown work; gates every callback dispatch.
    closed: AtomicBool,
    outbound: Mutex<Option<mpsc::Sender<ClientEvent>>>,
    sink: Arc<dyn AudioSink>,
    message_callback: Mutex<Option<MessageCallback>>,
    turn_callback: Mutex<Option<TurnCallback>>,
}

/// One client-side conversation session. At most one active connection per
/// controller instance.
pub struct SessionController {
    shared: Arc<ControllerShared>,
    reader: Mutex<Option<JoinHandle<()>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            shared: Arc::new(ControllerShared {
                connection: Mutex::new(ConnectionState::Disconnected),
                turn: Mutex::new(TurnState::Idle),
                transcript: Mutex::new(Transcript::default()),
                accumulator: Mutex::new(TranscriptAccumulator::default()),
                recording: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                outbound: Mutex::new(None),
                sink,
                message_callback: Mutex::new(None),
                turn_callback: Mutex::new(None),
            }),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Register a callback fired for every transcript append.
    pub fn on_message(&self, callback: impl Fn(Message) + Send + Sync + 'static) {
        *self.shared.message_callback.lock() = Some(Arc::new(callback));
    }

    /// Register a callback fired on every turn-state change.
    pub fn on_turn(&self, callback: impl Fn(TurnState) + Send + Sync + 'static) {
        *self.shared.turn_callback.lock() = Some(Arc::new(callback));
    }

    /// Establish the duplex connection to the relay.
    ///
    /// Fails with [`SessionError::AlreadyConnected`] while a session is
    /// active; a fresh connect starts a fresh transcript.
    pub async fn connect(&self, relay_url: &str) -> Result<(), SessionError> {
        {
            let mut connection = self.shared.connection.lock();
            match *connection {
                ConnectionState::Connected | ConnectionState::Connecting => {
                    return Err(SessionError::AlreadyConnected);
                }
                _ => *connection = ConnectionState::Connecting,
            }
        }
        self.shared.closed.store(false, Ordering::SeqCst);
        self.shared.transcript.lock().clear();
        self.shared.accumulator.lock().reset();

        let (stream, _response) = match connect_async(relay_url).await {
            Ok(ok) => ok,
            Err(e) => {
                *self.shared.connection.lock() = ConnectionState::Error;
                return Err(SessionError::ConnectionFailed(e.to_string()));
            }
        };

        if self.shared.closed.load(Ordering::SeqCst) {
            // disconnect() ran mid-handshake; honor it.
            *self.shared.connection.lock() = ConnectionState::Disconnected;
            return Err(SessionError::ConnectionFailed(
                "session closed during handshake".to_string(),
            ));
        }

        let (ws_sink, ws_stream) = stream.split();
        let (tx, rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        *self.shared.outbound.lock() = Some(tx);

        *self.writer.lock() = Some(tokio::spawn(writer_loop(ws_sink, rx)));
        *self.reader.lock() = Some(tokio::spawn(reader_loop(
            ws_stream,
            Arc::clone(&self.shared),
        )));

        *self.shared.connection.lock() = ConnectionState::Connected;
        info!(relay_url, "session connected");
        Ok(())
    }

    /// Enable encoding and transmission of captured frames. No-op while
    /// already recording. Does not touch turn state: only the upstream's
    /// voice-activity events do.
    pub fn start_recording(&self) {
        self.shared.recording.store(true, Ordering::SeqCst);
    }

    /// Stop transmitting captured frames. No frame observed after this
    /// returns is encoded or sent; no-op while not recording.
    pub fn stop_recording(&self) {
        self.shared.recording.store(false, Ordering::SeqCst);
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recording.load(Ordering::SeqCst)
    }

    /// Entry point for the capture producer. Never blocks: frames are dropped
    /// while not recording, while disconnected, or when the outbound queue is
    /// full.
    pub fn ingest_frame(&self, samples: &[i16]) {
        if !self.shared.recording.load(Ordering::SeqCst) {
            return;
        }
        let Some(tx) = self.shared.outbound.lock().clone() else {
            return;
        };
        let event = ClientEvent::audio_append(codec::encode(samples));
        if tx.try_send(event).is_err() {
            debug!("outbound queue full, dropping capture frame");
        }
    }

    /// Send a typed user message and request a response.
    ///
    /// The message is appended to the transcript immediately (text input
    /// bypasses transcription) and the create-message / request-response pair
    /// goes through the one outbound channel back-to-back, so the pair order
    /// holds on the wire.
    pub async fn send_text_message(&self, text: &str) -> Result<(), SessionError> {
        let tx = self
            .shared
            .outbound
            .lock()
            .clone()
            .ok_or(SessionError::NotConnected)?;

        let message = self.shared.transcript.lock().push_user(text);
        self.shared.emit_message(message);

        tx.send(ClientEvent::user_text_message(text))
            .await
            .map_err(|_| SessionError::SendFailed("connection closed".to_string()))?;
        tx.send(ClientEvent::ResponseCreate)
            .await
            .map_err(|_| SessionError::SendFailed("connection closed".to_string()))?;
        Ok(())
    }

    /// Tear the session down: stop capture gating, close the connection,
    /// clear pending playback, reset turn state. Idempotent, safe at any
    /// time including mid-handshake; no callback fires after this returns.
    pub fn disconnect(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.recording.store(false, Ordering::SeqCst);

        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        // Dropping the sender lets the writer flush a close frame and finish
        // on its own.
        *self.shared.outbound.lock() = None;
        self.writer.lock().take();

        self.shared.sink.clear();
        self.shared.accumulator.lock().reset();
        *self.shared.turn.lock() = TurnState::Idle;
        *self.shared.connection.lock() = ConnectionState::Disconnected;
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.connection.lock()
    }

    pub fn turn_state(&self) -> TurnState {
        *self.shared.turn.lock()
    }

    /// Snapshot of the transcript so far.
    pub fn transcript(&self) -> Vec<Message> {
        self.shared.transcript.lock().entries().to_vec()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl ControllerShared {
    /// Apply one inbound event. Called only from the reader task, in arrival
    /// order.
    fn handle_event(&self, event: ServerEvent) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        match event {
            ServerEvent::SessionCreated => debug!("session established upstream"),

            ServerEvent::SpeechStarted => self.set_turn(TurnState::UserSpeaking),
            ServerEvent::SpeechStopped => self.set_turn(TurnState::Idle),

            ServerEvent::ResponseCreated { response } => {
                debug!(response_id = %response.id, "response started");
                self.set_turn(TurnState::AssistantSpeaking);
            }
            ServerEvent::ResponseDone { response } => {
                debug!(response_id = %response.id, "response finished");
                self.set_turn(TurnState::Idle);
            }

            // Enqueued even while the user speaks over it; abandoning
            // playback on barge-in is UI policy, not the controller's call.
            ServerEvent::AudioDelta { delta } => match codec::decode(&delta) {
                Ok(samples) => self.sink.enqueue(&samples),
                Err(e) => debug!(error = %e, "dropping undecodable audio chunk"),
            },

            ServerEvent::AudioTranscriptDelta { delta } => {
                self.accumulator.lock().push_chunk(&delta);
            }
            ServerEvent::AudioTranscriptDone { transcript } => {
                // The accumulator is authoritative; the event's own transcript
                // only covers utterances whose deltas we never saw.
                let text = self.accumulator.lock().finish().unwrap_or(transcript);
                if !text.is_empty() {
                    let message = self.transcript.lock().push_assistant(text);
                    self.emit_message(message);
                }
            }

            ServerEvent::TranscriptionCompleted { transcript } => {
                if !transcript.trim().is_empty() {
                    let message = self.transcript.lock().push_user(transcript);
                    self.emit_message(message);
                }
            }

            ServerEvent::Error { error } => {
                warn!(kind = %error.error_type, message = %error.message, "upstream error event");
            }

            ServerEvent::Unknown => {}
        }
    }

    fn set_turn(&self, next: TurnState) {
        let changed = {
            let mut turn = self.turn.lock();
            if *turn == next {
                false
            } else {
                *turn = next;
                true
            }
        };
        if changed
            && !self.closed.load(Ordering::SeqCst)
            && let Some(callback) = self.turn_callback.lock().clone()
        {
            callback(next);
        }
    }

    fn emit_message(&self, message: Message) {
        if !self.closed.load(Ordering::SeqCst)
            && let Some(callback) = self.message_callback.lock().clone()
        {
            callback(message);
        }
    }

    /// Full teardown after the transport ended on its own. A dropped session
    /// terminates (no reconnection) leaving no stale playback or turn state.
    fn finish_session(&self, next: ConnectionState) {
        *self.outbound.lock() = None;
        self.recording.store(false, Ordering::SeqCst);
        self.sink.clear();
        self.accumulator.lock().reset();
        *self.turn.lock() = TurnState::Idle;
        *self.connection.lock() = next;
    }
}

/// Serializes outbound events onto the socket in channel order.
async fn writer_loop(
    mut sink: SplitSink<RelayStream, WsMessage>,
    mut rx: mpsc::Receiver<ClientEvent>,
) {
    while let Some(event) = rx.recv().await {
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "outbound event did not serialize");
                continue;
            }
        };
        if let Err(e) = sink.send(WsMessage::Text(frame.into())).await {
            debug!(error = %e, "send failed, stopping writer");
            return;
        }
    }
    // Channel closed by disconnect: part cleanly if the socket still stands.
    let _ = sink.send(WsMessage::Close(None)).await;
}

/// Processes inbound frames strictly in arrival order.
async fn reader_loop(mut stream: SplitStream<RelayStream>, shared: Arc<ControllerShared>) {
    let mut clean = false;
    while let Some(frame) = stream.next().await {
        if shared.closed.load(Ordering::SeqCst) {
            return;
        }
        match frame {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerEvent>(text.as_str()) {
                Ok(event) => shared.handle_event(event),
                Err(e) => debug!(error = %e, "ignoring unparseable frame"),
            },
            Ok(WsMessage::Close(_)) => {
                clean = true;
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "relay transport error");
                break;
            }
        }
    }

    if !shared.closed.swap(true, Ordering::SeqCst) {
        shared.finish_session(if clean {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Error
        });
    }
}
