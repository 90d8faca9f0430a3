use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::asr::{RemoteRecognizer, Recognizer};
use crate::chat::{ChatClient, ReplyEngine};
use crate::config::ServerConfig;
use crate::tts::{RemoteSynthesizer, Synthesizer};

/// Shared server state: the session registry plus handles to the three
/// external service boundaries. Cloned into every connection handler;
/// nothing here is global.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub sessions: Arc<DashMap<String, SessionHandle>>,
    pub recognizer: Arc<dyn Recognizer>,
    pub responder: Arc<dyn ReplyEngine>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

/// Per-connection session state. At most one utterance accumulates at a
/// time; `processing` guards against overlapping pipeline runs.
pub struct SessionHandle {
    pub frames: Vec<Vec<u8>>,
    pub processing: bool,
    pub pipeline: Option<AbortHandle>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            processing: false,
            pipeline: None,
        }
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let recognizer = Arc::new(RemoteRecognizer::new(config.asr.remote_url.clone()));
        let responder = Arc::new(ChatClient::new(&config.gpt));
        let synthesizer = Arc::new(RemoteSynthesizer::new(config.tts.remote_url.clone()));
        Self::with_services(config, recognizer, responder, synthesizer)
    }

    pub fn with_services(
        config: ServerConfig,
        recognizer: Arc<dyn Recognizer>,
        responder: Arc<dyn ReplyEngine>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            config,
            sessions: Arc::new(DashMap::new()),
            recognizer,
            responder,
            synthesizer,
        }
    }

    pub fn generate_session_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Temp files a session may leave behind: the utterance WAV and the
    /// synthesized reply.
    pub fn session_temp_paths(&self, session_id: &str) -> [PathBuf; 2] {
        let dir = PathBuf::from(&self.config.temp_dir);
        [
            dir.join(format!("{session_id}.wav")),
            dir.join(format!("{session_id}_reply.mp3")),
        ]
    }

    /// Best-effort temp file removal; failures are logged, never fatal.
    pub fn sweep_temp_files(&self, session_id: &str) {
        for path in self.session_temp_paths(session_id) {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "temp file cleanup failed");
                }
            }
        }
    }
}
