use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("session is not connected")]
    NotConnected,

    #[error("timed out waiting for the assistant reply")]
    ReplyTimeout,

    #[error("wake-word listening window elapsed")]
    ListenTimeout,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("assistant error: {0}")]
    Assistant(String),

    #[error("recognition failed: {0}")]
    Recognition(String),

    #[error("reply generation failed: {0}")]
    Reply(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("audio error: {0}")]
    Audio(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Transport-level failures invalidate the connection and require a
    /// fresh `connect()`; every other failure leaves the session usable.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::NotConnected | Error::ReplyTimeout
        )
    }
}
