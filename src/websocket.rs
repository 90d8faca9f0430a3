use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::handlers;
use crate::protocol::ControlMessage;
use crate::state::{AppState, SessionHandle};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = state.generate_session_id();
    info!(session_id, "new session connected");

    state
        .sessions
        .insert(session_id.clone(), SessionHandle::new());
    state.responder.initialize(&session_id);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Single writer task; the receive loop and pipeline tasks all send
    // through the channel.
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if ws_sender.send(message).await.is_err() {
                break;
            }
        }
    });

    send_welcome(&state, &session_id, &outbound).await;

    while let Some(received) = ws_receiver.next().await {
        match received {
            Ok(Message::Binary(payload)) => {
                handlers::handle_binary_frame(&state, &session_id, payload);
            }
            Ok(Message::Text(text)) => {
                handlers::handle_text_frame(&state, &session_id, &text, &outbound);
            }
            Ok(Message::Close(_)) => {
                info!(session_id, "session disconnected");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(session_id, error = %e, "connection error");
                break;
            }
        }
    }

    // No pipeline work may outlive its session.
    if let Some((_, session)) = state.sessions.remove(&session_id) {
        if let Some(pipeline) = session.pipeline {
            pipeline.abort();
        }
    }
    state.responder.clear(&session_id);
    state.sweep_temp_files(&session_id);
    drop(outbound);
    let _ = writer.await;
    info!(session_id, "session cleaned up");
}

/// Greet a fresh session: one welcome control frame, then the synthesized
/// greeting audio. A synthesis failure downgrades to the text frame alone.
async fn send_welcome(state: &AppState, session_id: &str, outbound: &handlers::Outbound) {
    let welcome = state.config.gpt.welcome_message.clone();
    handlers::send_control(outbound, &ControlMessage::Welcome(welcome.clone()));

    match state
        .synthesizer
        .synthesize(&welcome, &state.config.tts.voice)
        .await
    {
        Ok(audio) => {
            if outbound.send(Message::Binary(audio)).is_err() {
                debug!(session_id, "connection went away before the greeting was sent");
            }
        }
        Err(e) => warn!(session_id, error = %e, "greeting synthesis failed"),
    }
}
