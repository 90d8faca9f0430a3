//! End-to-end session protocol scenarios: a real router on an ephemeral
//! port, driven over a real WebSocket, with the three external services
//! replaced by in-process fakes behind the production traits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use sotto::asr::Recognizer;
use sotto::audio::{wav, AudioFrame, FrameSource, ReplySink};
use sotto::chat::ReplyEngine;
use sotto::config::{ClientConfig, ServerConfig};
use sotto::dialogue::DialogueSession;
use sotto::protocol::{ControlMessage, PipelineStage};
use sotto::state::AppState;
use sotto::tts::Synthesizer;
use sotto::vad::SpeechClassifier;
use sotto::{routes, Error};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const REPLY_AUDIO: [u8; 2048] = [7u8; 2048];

struct FakeRecognizer {
    transcript: String,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_wav: Mutex<Option<Vec<u8>>>,
}

impl FakeRecognizer {
    fn new(transcript: &str) -> Self {
        Self {
            transcript: transcript.to_string(),
            delay: None,
            calls: AtomicUsize::new(0),
            last_wav: Mutex::new(None),
        }
    }

    fn slow(transcript: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(transcript)
        }
    }
}

#[async_trait]
impl Recognizer for FakeRecognizer {
    async fn transcribe(&self, wav: Vec<u8>) -> sotto::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_wav.lock().unwrap() = Some(wav);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.transcript.clone())
    }
}

struct FakeReplyEngine {
    calls: AtomicUsize,
}

impl FakeReplyEngine {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReplyEngine for FakeReplyEngine {
    fn initialize(&self, _session_id: &str) {}

    async fn reply(&self, _session_id: &str, message: &str) -> sotto::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("you said: {message}"))
    }

    fn clear(&self, _session_id: &str) {}
}

struct FakeSynthesizer {
    calls: AtomicUsize,
}

impl FakeSynthesizer {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, _text: &str, _voice: &str) -> sotto::Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(REPLY_AUDIO.to_vec())
    }
}

struct Fixture {
    recognizer: Arc<FakeRecognizer>,
    responder: Arc<FakeReplyEngine>,
    synthesizer: Arc<FakeSynthesizer>,
    url: String,
}

fn server_config() -> ServerConfig {
    let mut config: ServerConfig = serde_yaml::from_str(
        r#"
asr:
  remote_url: http://127.0.0.1:1/asr
gpt:
  api_key: test-key
  base_url: http://127.0.0.1:1/v1
  model: test-model
tts:
  remote_url: http://127.0.0.1:1/tts
  voice: test-voice
"#,
    )
    .unwrap();
    config.temp_dir = std::env::temp_dir()
        .join(format!("sotto-test-{}", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned();
    config
}

async fn start_server(recognizer: FakeRecognizer) -> Fixture {
    let recognizer = Arc::new(recognizer);
    let responder = Arc::new(FakeReplyEngine::new());
    let synthesizer = Arc::new(FakeSynthesizer::new());

    let state = AppState::with_services(
        server_config(),
        recognizer.clone(),
        responder.clone(),
        synthesizer.clone(),
    );
    let app = Router::new()
        .merge(routes::create_routes())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Fixture {
        recognizer,
        responder,
        synthesizer,
        url: format!("ws://{addr}/ws"),
    }
}

async fn recv(ws: &mut WsStream) -> Message {
    tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for a server message")
        .expect("connection ended unexpectedly")
        .expect("connection error")
}

async fn recv_control(ws: &mut WsStream) -> ControlMessage {
    match recv(ws).await {
        Message::Text(text) => ControlMessage::parse(&text).expect("unparseable control frame"),
        other => panic!("expected a control frame, got {other:?}"),
    }
}

/// Consume the welcome control frame and the greeting audio payload.
async fn drain_welcome(ws: &mut WsStream) {
    match recv_control(ws).await {
        ControlMessage::Welcome(_) => {}
        other => panic!("expected a welcome frame, got {other:?}"),
    }
    match recv(ws).await {
        Message::Binary(audio) => assert_eq!(audio, REPLY_AUDIO.to_vec()),
        other => panic!("expected greeting audio, got {other:?}"),
    }
}

fn frame_payload() -> Vec<u8> {
    vec![0u8; 960]
}

#[tokio::test]
async fn full_turn_runs_each_stage_once() {
    let fixture = start_server(FakeRecognizer::new("turn on the lights")).await;
    let (mut ws, _) = connect_async(&fixture.url).await.unwrap();
    drain_welcome(&mut ws).await;

    ws.send(Message::Text(r#"{"state":"start"}"#.to_string()))
        .await
        .unwrap();
    for _ in 0..25 {
        ws.send(Message::Binary(frame_payload())).await.unwrap();
    }
    ws.send(Message::Text(r#"{"state":"end"}"#.to_string()))
        .await
        .unwrap();

    assert_eq!(
        recv_control(&mut ws).await,
        ControlMessage::Status(PipelineStage::Recognition)
    );
    assert_eq!(
        recv_control(&mut ws).await,
        ControlMessage::Status(PipelineStage::Reply)
    );
    assert_eq!(
        recv_control(&mut ws).await,
        ControlMessage::Status(PipelineStage::Synthesis)
    );
    assert_eq!(
        recv_control(&mut ws).await,
        ControlMessage::Reply("you said: turn on the lights".to_string())
    );
    match recv(&mut ws).await {
        Message::Binary(audio) => assert_eq!(audio, REPLY_AUDIO.to_vec()),
        other => panic!("expected reply audio, got {other:?}"),
    }

    assert_eq!(fixture.recognizer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.responder.calls.load(Ordering::SeqCst), 1);
    // One synthesis for the greeting, one for the reply.
    assert_eq!(fixture.synthesizer.calls.load(Ordering::SeqCst), 2);

    // All 25 frames ended up in one canonical container.
    let wav_bytes = fixture.recognizer.last_wav.lock().unwrap().clone().unwrap();
    let info = wav::probe(&wav_bytes).unwrap();
    assert_eq!(info.sample_rate, 16000);
    assert_eq!(info.channels, 1);
    assert_eq!(info.sample_count, 25 * 480);
}

#[tokio::test]
async fn empty_transcript_aborts_before_reply_generation() {
    let fixture = start_server(FakeRecognizer::new("   ")).await;
    let (mut ws, _) = connect_async(&fixture.url).await.unwrap();
    drain_welcome(&mut ws).await;

    ws.send(Message::Text(r#"{"state":"start"}"#.to_string()))
        .await
        .unwrap();
    for _ in 0..5 {
        ws.send(Message::Binary(frame_payload())).await.unwrap();
    }
    ws.send(Message::Text(r#"{"state":"end"}"#.to_string()))
        .await
        .unwrap();

    assert_eq!(
        recv_control(&mut ws).await,
        ControlMessage::Status(PipelineStage::Recognition)
    );
    match recv_control(&mut ws).await {
        ControlMessage::Error(_) => {}
        other => panic!("expected an error frame, got {other:?}"),
    }

    assert_eq!(fixture.recognizer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.responder.calls.load(Ordering::SeqCst), 0);
    // Only the greeting was synthesized.
    assert_eq!(fixture.synthesizer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn end_with_an_empty_buffer_never_reaches_recognition() {
    let fixture = start_server(FakeRecognizer::new("anything")).await;
    let (mut ws, _) = connect_async(&fixture.url).await.unwrap();
    drain_welcome(&mut ws).await;

    ws.send(Message::Text(r#"{"state":"start"}"#.to_string()))
        .await
        .unwrap();
    ws.send(Message::Text(r#"{"state":"end"}"#.to_string()))
        .await
        .unwrap();

    match recv_control(&mut ws).await {
        ControlMessage::Error(_) => {}
        other => panic!("expected an error frame, got {other:?}"),
    }
    assert_eq!(fixture.recognizer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_control_frames_are_rejected_explicitly() {
    let fixture = start_server(FakeRecognizer::new("anything")).await;
    let (mut ws, _) = connect_async(&fixture.url).await.unwrap();
    drain_welcome(&mut ws).await;

    ws.send(Message::Text(r#"{"state":"paused"}"#.to_string()))
        .await
        .unwrap();
    match recv_control(&mut ws).await {
        ControlMessage::Error(_) => {}
        other => panic!("expected an error frame, got {other:?}"),
    }

    ws.send(Message::Text("not json at all".to_string()))
        .await
        .unwrap();
    match recv_control(&mut ws).await {
        ControlMessage::Error(_) => {}
        other => panic!("expected an error frame, got {other:?}"),
    }
}

#[tokio::test]
async fn overlapping_utterances_are_rejected() {
    let fixture = start_server(FakeRecognizer::slow(
        "slow transcript",
        Duration::from_millis(500),
    ))
    .await;
    let (mut ws, _) = connect_async(&fixture.url).await.unwrap();
    drain_welcome(&mut ws).await;

    ws.send(Message::Text(r#"{"state":"start"}"#.to_string()))
        .await
        .unwrap();
    for _ in 0..3 {
        ws.send(Message::Binary(frame_payload())).await.unwrap();
    }
    ws.send(Message::Text(r#"{"state":"end"}"#.to_string()))
        .await
        .unwrap();
    // A second utterance while the first pipeline run is still in flight.
    ws.send(Message::Text(r#"{"state":"start"}"#.to_string()))
        .await
        .unwrap();

    let mut saw_overlap_error = false;
    loop {
        match recv(&mut ws).await {
            Message::Binary(_) => break,
            Message::Text(text) => {
                if let Ok(ControlMessage::Error(message)) = ControlMessage::parse(&text) {
                    assert!(message.contains("already"), "unexpected error: {message}");
                    saw_overlap_error = true;
                }
            }
            _ => {}
        }
    }
    assert!(saw_overlap_error);
    assert_eq!(fixture.recognizer.calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Client-side scenarios driving DialogueSession against the same server.

struct ScriptedMic {
    script: Vec<bool>,
    cursor: usize,
}

impl ScriptedMic {
    fn new(script: &[bool]) -> Self {
        Self {
            script: script.to_vec(),
            cursor: 0,
        }
    }
}

#[async_trait(?Send)]
impl FrameSource for ScriptedMic {
    async fn next_frame(&mut self) -> sotto::Result<AudioFrame> {
        let speech = self.script.get(self.cursor).copied().unwrap_or(false);
        self.cursor += 1;
        let sample = if speech { 2000 } else { 0 };
        tokio::task::yield_now().await;
        Ok(AudioFrame::from_samples(16000, 1, &[sample; 480]))
    }
}

struct AmplitudeClassifier;

impl SpeechClassifier for AmplitudeClassifier {
    fn is_speech(&mut self, frame: &AudioFrame) -> bool {
        frame.samples().iter().any(|&s| s != 0)
    }
}

#[derive(Default)]
struct RecordingSink {
    played: Vec<Vec<u8>>,
}

impl ReplySink for RecordingSink {
    fn play(&mut self, audio: &[u8]) -> sotto::Result<()> {
        self.played.push(audio.to_vec());
        Ok(())
    }
}

fn client_config(url: &str, reply_timeout_secs: u64) -> ClientConfig {
    let mut config: ClientConfig = serde_yaml::from_str(&format!(
        r#"
wakeup:
  word: assistant
  keywords: ["assistant"]
dialogue:
  max_silence_ms: 60
server:
  url: {url}
asr:
  remote_url: http://127.0.0.1:1/asr
"#
    ))
    .unwrap();
    config.dialogue.timeout = reply_timeout_secs;
    config
}

#[tokio::test]
async fn client_turn_plays_the_reply() {
    let fixture = start_server(FakeRecognizer::new("what time is it")).await;
    let mut session = DialogueSession::with_classifier(
        client_config(&fixture.url, 5),
        Box::new(AmplitudeClassifier),
    );
    let mut mic = ScriptedMic::new(&[true, true, true]);
    let mut sink = RecordingSink::default();

    session.connect().await.unwrap();
    session
        .await_welcome(&mut sink, Duration::from_secs(2))
        .await
        .unwrap();
    session.run_turn(&mut mic, &mut sink).await.unwrap();

    // The greeting and then the reply were played.
    assert_eq!(sink.played.len(), 2);
    assert_eq!(sink.played[1], REPLY_AUDIO.to_vec());
    assert!(session.is_connected());

    // Three speech frames plus three trailing silence frames (threshold 2)
    // were streamed and buffered into one container.
    let wav_bytes = fixture.recognizer.last_wav.lock().unwrap().clone().unwrap();
    let info = wav::probe(&wav_bytes).unwrap();
    assert_eq!(info.sample_count, 6 * 480);

    session.close().await;
}

#[tokio::test]
async fn reply_timeout_forces_a_reconnect() {
    let fixture = start_server(FakeRecognizer::slow("late", Duration::from_secs(30))).await;
    let mut session = DialogueSession::with_classifier(
        client_config(&fixture.url, 1),
        Box::new(AmplitudeClassifier),
    );
    let mut mic = ScriptedMic::new(&[true, true, true]);
    let mut sink = RecordingSink::default();

    session.connect().await.unwrap();
    session
        .await_welcome(&mut sink, Duration::from_secs(2))
        .await
        .unwrap();

    let result = session.run_turn(&mut mic, &mut sink).await;
    assert!(matches!(result, Err(Error::ReplyTimeout)));
    assert!(!session.is_connected());

    // The next turn demands an explicit reconnect.
    let mut mic = ScriptedMic::new(&[true]);
    let result = session.run_turn(&mut mic, &mut sink).await;
    assert!(matches!(result, Err(Error::NotConnected)));

    session.connect().await.unwrap();
    assert!(session.is_connected());
    session.close().await;
}

#[tokio::test]
async fn run_turn_requires_a_connection() {
    let mut session = DialogueSession::with_classifier(
        client_config("ws://127.0.0.1:1/ws", 1),
        Box::new(AmplitudeClassifier),
    );
    let mut mic = ScriptedMic::new(&[true]);
    let mut sink = RecordingSink::default();

    let result = session.run_turn(&mut mic, &mut sink).await;
    assert!(matches!(result, Err(Error::NotConnected)));
}

#[tokio::test]
async fn connect_failure_leaves_the_session_disconnected() {
    let mut session = DialogueSession::with_classifier(
        client_config("ws://127.0.0.1:1/ws", 1),
        Box::new(AmplitudeClassifier),
    );
    let result = session.connect().await;
    assert!(matches!(result, Err(Error::Transport(_))));
    assert!(!session.is_connected());
}

#[tokio::test]
async fn continuation_check_stays_local() {
    // No server at all; the continuation window must still work.
    let mut session = DialogueSession::with_classifier(
        client_config("ws://127.0.0.1:1/ws", 1),
        Box::new(AmplitudeClassifier),
    );

    let mut silent_mic = ScriptedMic::new(&[]);
    let heard = session
        .wait_for_continuation(&mut silent_mic, Duration::from_millis(120))
        .await
        .unwrap();
    assert!(!heard);

    let mut chatty_mic = ScriptedMic::new(&[false, false, true]);
    let heard = session
        .wait_for_continuation(&mut chatty_mic, Duration::from_millis(500))
        .await
        .unwrap();
    assert!(heard);
}
