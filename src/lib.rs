//! Sotto is a wake-word voice assistant split into a streaming client and a
//! pipeline server that share one duplex session protocol: JSON control
//! frames and raw audio payloads multiplexed over a single WebSocket.
//!
//! The client gates capture behind a wake word, segments utterances with a
//! voice activity detector, and streams frames to the server; the server
//! buffers each utterance and runs it through recognition, reply generation
//! and synthesis, answering with exactly one audio payload per turn.

pub mod asr;
pub mod audio;
pub mod chat;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod routes;
pub mod segment;
pub mod state;
pub mod tts;
pub mod vad;
pub mod wake;
pub mod websocket;

pub use error::{Error, Result};
