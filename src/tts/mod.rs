mod client;
mod interface;

pub use client::RemoteSynthesizer;
pub use interface::Synthesizer;
