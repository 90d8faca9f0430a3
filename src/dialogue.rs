//! Client side of the duplex session: connection lifecycle, the background
//! dispatcher, and the per-turn capture/reply logic.

use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::audio::{FrameSource, ReplySink};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol::{ControlMessage, TurnState};
use crate::vad::{SpeechClassifier, SpeechDetector};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Poll granularity while waiting on the inbound queue, so timeout and
/// cancellation are observed promptly.
const REPLY_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Disconnected,
    Connecting,
    Connected,
}

/// One multi-turn dialogue over a persistent connection.
///
/// A background dispatcher task is the sole reader of the socket, draining
/// every inbound message into an unbounded queue so a slow consumer never
/// stalls transport reads. Closing the session cancels the dispatcher and
/// awaits it before the socket itself goes away.
pub struct DialogueSession {
    config: ClientConfig,
    connectivity: Connectivity,
    sink: Option<WsSink>,
    inbound: Option<mpsc::UnboundedReceiver<WsMessage>>,
    dispatcher: Option<JoinHandle<()>>,
    detector: Box<dyn SpeechClassifier>,
}

impl DialogueSession {
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let detector = SpeechDetector::new(config.audio.rate, config.vad.aggressiveness)?;
        Ok(Self::with_classifier(config, Box::new(detector)))
    }

    pub fn with_classifier(config: ClientConfig, detector: Box<dyn SpeechClassifier>) -> Self {
        Self {
            config,
            connectivity: Connectivity::Disconnected,
            sink: None,
            inbound: None,
            dispatcher: None,
            detector,
        }
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    pub fn is_connected(&self) -> bool {
        self.connectivity == Connectivity::Connected
    }

    /// Open the connection and start the dispatcher. A no-op when already
    /// connected; on failure the session stays Disconnected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.connectivity = Connectivity::Connecting;

        let (socket, _) = connect_async(self.config.server.url.as_str())
            .await
            .map_err(|e| {
                self.connectivity = Connectivity::Disconnected;
                Error::Transport(e.to_string())
            })?;
        let (sink, stream) = socket.split();
        let (queue, inbound) = mpsc::unbounded_channel();

        self.sink = Some(sink);
        self.inbound = Some(inbound);
        self.dispatcher = Some(tokio::spawn(dispatch(stream, queue)));
        self.connectivity = Connectivity::Connected;

        info!(url = %self.config.server.url, "connected to the assistant server");
        Ok(())
    }

    /// Cancel the dispatcher, await its termination, then drop the socket.
    pub async fn close(&mut self) {
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.abort();
            let _ = dispatcher.await;
        }
        if let Some(mut sink) = self.sink.take() {
            let _ = sink.close().await;
        }
        self.inbound = None;
        if self.connectivity != Connectivity::Disconnected {
            self.connectivity = Connectivity::Disconnected;
            debug!("session closed");
        }
    }

    /// Play the server greeting if one arrives within `wait`. Best-effort;
    /// a server that sends no welcome is fine.
    pub async fn await_welcome(&mut self, speaker: &mut dyn ReplySink, wait: Duration) -> Result<()> {
        let deadline = Instant::now() + wait;
        loop {
            let now = Instant::now();
            if now >= deadline {
                debug!("no greeting from the server");
                return Ok(());
            }
            match self.recv(REPLY_POLL_INTERVAL.min(deadline - now)).await? {
                None => continue,
                Some(WsMessage::Binary(audio)) => {
                    if let Err(e) = speaker.play(&audio) {
                        warn!(error = %e, "greeting playback failed");
                    }
                    return Ok(());
                }
                Some(WsMessage::Text(text)) => match ControlMessage::parse(&text) {
                    Ok(ControlMessage::Welcome(message)) => {
                        info!(message = %message, "assistant greeting")
                    }
                    Ok(other) => debug!(frame = ?other, "ignoring control frame"),
                    Err(e) => warn!(error = %e, "malformed frame from server"),
                },
                Some(_) => {}
            }
        }
    }

    /// Run one dialogue turn: capture an utterance, stream it, wait for the
    /// spoken reply and play it back.
    pub async fn run_turn(
        &mut self,
        mic: &mut dyn FrameSource,
        speaker: &mut dyn ReplySink,
    ) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        self.send_text(ControlMessage::State(TurnState::Start).to_text())
            .await?;
        info!("speak now; silence ends the turn");

        let max_silence = self.config.dialogue_silence_frames();
        let mut silence_run: u32 = 0;
        let mut speech_started = false;
        mic.flush();

        loop {
            let frame = mic.next_frame().await?;
            if self.detector.is_speech(&frame) {
                silence_run = 0;
                speech_started = true;
                self.send_binary(frame.into_payload()).await?;
            } else {
                silence_run += 1;
                if speech_started {
                    self.send_binary(frame.into_payload()).await?;
                }
            }
            if speech_started && silence_run > max_silence {
                self.send_text(ControlMessage::State(TurnState::End).to_text())
                    .await?;
                break;
            }
        }

        info!("utterance sent, waiting for the assistant reply");
        self.await_reply(speaker).await
    }

    /// Local-only follow-up check: true on the first speech frame inside
    /// the window, false once it elapses. Never touches the network.
    pub async fn wait_for_continuation(
        &mut self,
        mic: &mut dyn FrameSource,
        window: Duration,
    ) -> Result<bool> {
        debug!(window_ms = window.as_millis() as u64, "listening for a follow-up");
        mic.flush();

        let deadline = Instant::now() + window;
        while Instant::now() < deadline {
            let frame = mic.next_frame().await?;
            if self.detector.is_speech(&frame) {
                info!("follow-up speech detected");
                return Ok(true);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        info!("no follow-up detected");
        Ok(false)
    }

    async fn await_reply(&mut self, speaker: &mut dyn ReplySink) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(self.config.dialogue.timeout);
        loop {
            let now = Instant::now();
            if now >= deadline {
                warn!("no reply before the deadline, closing the session");
                self.close().await;
                return Err(Error::ReplyTimeout);
            }

            match self.recv(REPLY_POLL_INTERVAL.min(deadline - now)).await? {
                None => continue,
                Some(WsMessage::Binary(audio)) => {
                    debug!(bytes = audio.len(), "reply audio received");
                    // Playback failures are surfaced but leave the session
                    // connected; only transport failures tear it down.
                    speaker.play(&audio)?;
                    return Ok(());
                }
                Some(WsMessage::Text(text)) => match ControlMessage::parse(&text) {
                    Ok(ControlMessage::Status(stage)) => {
                        info!(status = stage.wire_name(), "assistant is working")
                    }
                    Ok(ControlMessage::Reply(reply)) => info!(reply = %reply, "assistant"),
                    Ok(ControlMessage::Error(message)) => return Err(Error::Assistant(message)),
                    Ok(other) => debug!(frame = ?other, "ignoring control frame"),
                    Err(e) => warn!(error = %e, "malformed frame from server"),
                },
                Some(_) => {}
            }
        }
    }

    /// Pop one inbound message, waiting at most `poll`. `None` means the
    /// poll elapsed; a closed queue means the dispatcher saw the connection
    /// die.
    async fn recv(&mut self, poll: Duration) -> Result<Option<WsMessage>> {
        let inbound = self.inbound.as_mut().ok_or(Error::NotConnected)?;
        match timeout(poll, inbound.recv()).await {
            Err(_) => Ok(None),
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => {
                self.close().await;
                Err(Error::Transport("connection closed by the server".to_string()))
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.send(WsMessage::Text(text)).await
    }

    async fn send_binary(&mut self, payload: Vec<u8>) -> Result<()> {
        self.send(WsMessage::Binary(payload)).await
    }

    async fn send(&mut self, message: WsMessage) -> Result<()> {
        let sink = self.sink.as_mut().ok_or(Error::NotConnected)?;
        match sink.send(message).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.close().await;
                Err(Error::Transport(e.to_string()))
            }
        }
    }
}

/// Sole producer for the inbound queue: drains the socket until it closes,
/// fails, or the session is cancelled.
async fn dispatch(mut stream: WsSource, queue: mpsc::UnboundedSender<WsMessage>) {
    while let Some(received) = stream.next().await {
        match received {
            Ok(message @ (WsMessage::Text(_) | WsMessage::Binary(_))) => {
                if queue.send(message).is_err() {
                    break;
                }
            }
            Ok(WsMessage::Close(_)) => {
                debug!("server closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "connection read failed");
                break;
            }
        }
    }
}
