use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_rate")]
    pub rate: u32,
    #[serde(default = "default_chunk_ms")]
    pub chunk_ms: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
}

fn default_rate() -> u32 {
    16000
}

fn default_chunk_ms() -> u32 {
    30
}

fn default_channels() -> u16 {
    1
}

impl AudioConfig {
    /// Samples per capture frame at the configured rate.
    pub fn chunk_samples(&self) -> usize {
        (self.rate as usize * self.chunk_ms as usize) / 1000
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            chunk_ms: default_chunk_ms(),
            channels: default_channels(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    #[serde(default = "default_aggressiveness")]
    pub aggressiveness: u8,
}

fn default_aggressiveness() -> u8 {
    2
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            aggressiveness: default_aggressiveness(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeupConfig {
    /// Display name of the wake word, e.g. "assistant".
    pub word: String,
    /// Accepted spellings; waking requires any of these as a substring of
    /// the recognized transcript.
    pub keywords: Vec<String>,
    #[serde(default = "default_wake_silence_ms")]
    pub max_silence_ms: u32,
    /// Overall listening ceiling. Absent means listen indefinitely.
    #[serde(default)]
    pub listen_timeout_ms: Option<u64>,
}

fn default_wake_silence_ms() -> u32 {
    900
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    #[serde(default = "default_dialogue_silence_ms")]
    pub max_silence_ms: u32,
    /// Seconds to wait for the assistant reply before giving up on the turn.
    #[serde(default = "default_reply_timeout_secs")]
    pub timeout: u64,
    /// Seconds of local listening after a turn before dropping back to the
    /// wake-word loop.
    #[serde(default = "default_continuation_window_secs")]
    pub continuation_window: u64,
}

fn default_dialogue_silence_ms() -> u32 {
    1200
}

fn default_reply_timeout_secs() -> u64 {
    30
}

fn default_continuation_window_secs() -> u64 {
    3
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            max_silence_ms: default_dialogue_silence_ms(),
            timeout: default_reply_timeout_secs(),
            continuation_window: default_continuation_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEndpoint {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrConfig {
    pub remote_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempDirs {
    #[serde(default = "default_wakeup_dir")]
    pub wakeup: String,
    #[serde(default = "default_temp_dir")]
    pub temp: String,
}

fn default_wakeup_dir() -> String {
    "tmp/wakeup".to_string()
}

fn default_temp_dir() -> String {
    "tmp".to_string()
}

impl Default for TempDirs {
    fn default() -> Self {
        Self {
            wakeup: default_wakeup_dir(),
            temp: default_temp_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub vad: VadConfig,
    pub wakeup: WakeupConfig,
    #[serde(default)]
    pub dialogue: DialogueConfig,
    pub server: ServerEndpoint,
    pub asr: AsrConfig,
    #[serde(default)]
    pub temp_dirs: TempDirs,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ClientConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Consecutive silent frames that close a wake-word utterance.
    pub fn wake_silence_frames(&self) -> u32 {
        self.wakeup.max_silence_ms / self.audio.chunk_ms
    }

    /// Consecutive silent frames that end dialogue capture.
    pub fn dialogue_silence_frames(&self) -> u32 {
        self.dialogue.max_silence_ms / self.audio.chunk_ms
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8765
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GptConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_trim_history_to")]
    pub trim_history_to: usize,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_welcome_message")]
    pub welcome_message: String,
}

fn default_max_history() -> usize {
    20
}

fn default_trim_history_to() -> usize {
    10
}

fn default_system_prompt() -> String {
    "You are Sotto, a concise and friendly voice assistant.".to_string()
}

fn default_welcome_message() -> String {
    "Hi, I'm listening. What can I do for you?".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    pub remote_url: String,
    pub voice: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: BindConfig,
    pub asr: AsrConfig,
    pub gpt: GptConfig,
    pub tts: TtsConfig,
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}
