mod client;
mod interface;

pub use client::RemoteRecognizer;
pub use interface::{RecognitionResponse, Recognizer};
