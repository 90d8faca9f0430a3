use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;

use tracing::debug;

use crate::audio::ReplySink;
use crate::error::{Error, Result};

/// Plays one encoded reply payload through the default output device.
pub struct ReplyPlayer {
    temp_dir: PathBuf,
}

impl ReplyPlayer {
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
        }
    }
}

impl ReplySink for ReplyPlayer {
    fn play(&mut self, audio: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.temp_dir)?;

        // NamedTempFile unlinks on drop, so the reply file is gone on every
        // exit path, playback failure included.
        let mut file = tempfile::Builder::new()
            .prefix("reply_")
            .suffix(".mp3")
            .tempfile_in(&self.temp_dir)?;
        file.write_all(audio)?;
        file.flush()?;

        let reader = BufReader::new(File::open(file.path())?);
        let stream = rodio::OutputStreamBuilder::open_default_stream()
            .map_err(|e| Error::Audio(e.to_string()))?;
        let sink = rodio::Sink::connect_new(stream.mixer());
        let source = rodio::Decoder::new(reader).map_err(|e| Error::Audio(e.to_string()))?;
        sink.append(source);
        sink.sleep_until_end();

        debug!(bytes = audio.len(), "reply playback finished");
        Ok(())
    }
}
