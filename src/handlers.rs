//! Server-side frame handling and the per-utterance pipeline:
//! buffer -> recognition -> reply generation -> synthesis -> one audio frame.

use std::path::Path;

use axum::extract::ws::Message;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::audio::wav;
use crate::protocol::{ControlMessage, PipelineStage, TurnState};
use crate::state::AppState;

/// Everything addressed to the client goes through the connection's writer
/// task via this sender.
pub type Outbound = UnboundedSender<Message>;

/// The canonical utterance container is mono 16-bit PCM at 16 kHz.
const UTTERANCE_SAMPLE_RATE: u32 = 16000;
const UTTERANCE_CHANNELS: u16 = 1;

pub fn handle_binary_frame(state: &AppState, session_id: &str, payload: Vec<u8>) {
    if let Some(mut session) = state.sessions.get_mut(session_id) {
        if session.processing {
            // The utterance these frames belong to was already rejected.
            debug!(session_id, "dropping audio frame received mid-pipeline");
            return;
        }
        session.frames.push(payload);
    }
}

pub fn handle_text_frame(state: &AppState, session_id: &str, text: &str, outbound: &Outbound) {
    match ControlMessage::parse(text) {
        Ok(ControlMessage::State(TurnState::Start)) => handle_start(state, session_id, outbound),
        Ok(ControlMessage::State(TurnState::End)) => handle_end(state, session_id, outbound),
        Ok(other) => {
            warn!(session_id, frame = ?other, "unexpected control frame from client");
            send_control(
                outbound,
                &ControlMessage::Error("unexpected control frame".to_string()),
            );
        }
        Err(e) => {
            warn!(session_id, error = %e, "rejecting malformed control frame");
            send_control(
                outbound,
                &ControlMessage::Error(format!("invalid control frame: {e}")),
            );
        }
    }
}

fn handle_start(state: &AppState, session_id: &str, outbound: &Outbound) {
    let Some(mut session) = state.sessions.get_mut(session_id) else {
        return;
    };
    if session.processing {
        send_control(
            outbound,
            &ControlMessage::Error("an utterance is already being processed".to_string()),
        );
        return;
    }
    session.frames.clear();
    debug!(session_id, "utterance started");
}

fn handle_end(state: &AppState, session_id: &str, outbound: &Outbound) {
    let frames = {
        let Some(mut session) = state.sessions.get_mut(session_id) else {
            return;
        };
        if session.processing {
            send_control(
                outbound,
                &ControlMessage::Error("an utterance is already being processed".to_string()),
            );
            return;
        }
        std::mem::take(&mut session.frames)
    };

    if frames.is_empty() {
        warn!(session_id, "utterance ended with an empty buffer");
        send_control(
            outbound,
            &ControlMessage::Error("no speech data received".to_string()),
        );
        return;
    }

    {
        let Some(mut session) = state.sessions.get_mut(session_id) else {
            return;
        };
        session.processing = true;
    }

    let task_state = state.clone();
    let task_outbound = outbound.clone();
    let task_session = session_id.to_string();
    let handle = tokio::spawn(async move {
        run_pipeline(&task_state, &task_session, frames, &task_outbound).await;
        if let Some(mut session) = task_state.sessions.get_mut(&task_session) {
            session.processing = false;
            session.pipeline = None;
        }
    });

    if let Some(mut session) = state.sessions.get_mut(session_id) {
        session.pipeline = Some(handle.abort_handle());
    } else {
        handle.abort();
    }
}

/// One strictly sequential pipeline run for one utterance. Every stage
/// failure becomes exactly one `error` control frame; the session itself
/// stays usable.
async fn run_pipeline(state: &AppState, session_id: &str, frames: Vec<Vec<u8>>, outbound: &Outbound) {
    info!(session_id, frames = frames.len(), "processing utterance");

    let pcm: Vec<u8> = frames.concat();
    let wav_bytes = match wav::pcm_to_wav(&pcm, UTTERANCE_SAMPLE_RATE, UTTERANCE_CHANNELS) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(session_id, error = %e, "utterance encoding failed");
            send_control(
                outbound,
                &ControlMessage::Error("could not assemble the utterance audio".to_string()),
            );
            return;
        }
    };
    let [wav_path, reply_path] = state.session_temp_paths(session_id);
    stash_temp(&wav_path, &wav_bytes);

    send_control(outbound, &ControlMessage::Status(PipelineStage::Recognition));
    let transcript = match state.recognizer.transcribe(wav_bytes).await {
        Ok(text) => text,
        Err(e) => {
            // On the dialogue path a failed recognition reads as silence.
            warn!(session_id, error = %e, "recognition failed");
            String::new()
        }
    };
    if transcript.trim().is_empty() {
        send_control(
            outbound,
            &ControlMessage::Error("no speech recognized".to_string()),
        );
        state.sweep_temp_files(session_id);
        return;
    }
    info!(session_id, transcript = %transcript, "utterance transcribed");

    send_control(outbound, &ControlMessage::Status(PipelineStage::Reply));
    let reply = match state.responder.reply(session_id, &transcript).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(session_id, error = %e, "reply generation failed");
            send_control(
                outbound,
                &ControlMessage::Error("reply generation failed".to_string()),
            );
            state.sweep_temp_files(session_id);
            return;
        }
    };

    send_control(outbound, &ControlMessage::Status(PipelineStage::Synthesis));
    let audio = match state
        .synthesizer
        .synthesize(&reply, &state.config.tts.voice)
        .await
    {
        Ok(audio) => audio,
        Err(e) => {
            warn!(session_id, error = %e, "speech synthesis failed");
            send_control(
                outbound,
                &ControlMessage::Error("speech synthesis failed".to_string()),
            );
            state.sweep_temp_files(session_id);
            return;
        }
    };
    stash_temp(&reply_path, &audio);

    send_control(outbound, &ControlMessage::Reply(reply));
    if outbound.send(Message::Binary(audio)).is_err() {
        debug!(session_id, "connection went away before the reply audio was sent");
    }
    state.sweep_temp_files(session_id);
    info!(session_id, "utterance pipeline complete");
}

pub fn send_control(outbound: &Outbound, message: &ControlMessage) {
    if outbound.send(Message::Text(message.to_text())).is_err() {
        debug!("connection closed, dropping control frame");
    }
}

/// Keep an on-disk copy of in-flight audio while the pipeline runs. Purely
/// best-effort; the pipeline works from memory.
fn stash_temp(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(path, bytes) {
        warn!(path = %path.display(), error = %e, "temp file write failed");
    }
}
