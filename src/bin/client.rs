use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sotto::asr::RemoteRecognizer;
use sotto::audio::{MicCapture, ReplyPlayer};
use sotto::config::ClientConfig;
use sotto::dialogue::DialogueSession;
use sotto::wake::WakeWordListener;

const WELCOME_WAIT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    let candidates: Vec<String> = [
        std::env::var("CONFIG_PATH").ok(),
        Some("config/client.yaml".to_string()),
        Some("client.yaml".to_string()),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut config = None;
    let mut loaded_path = String::new();
    for path in &candidates {
        if let Ok(cfg) = ClientConfig::load(path) {
            config = Some(cfg);
            loaded_path = path.clone();
            break;
        }
    }
    let config = config.ok_or_else(|| {
        anyhow::anyhow!("could not find a client config, tried: {candidates:?}")
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("sotto={}", config.log_level))),
        )
        .init();
    info!("loaded configuration from {loaded_path}");

    std::fs::create_dir_all(&config.temp_dirs.wakeup)?;
    std::fs::create_dir_all(&config.temp_dirs.temp)?;

    let recognizer = RemoteRecognizer::new(config.asr.remote_url.clone());
    let mut mic = MicCapture::new(&config.audio)?;
    let mut speaker = ReplyPlayer::new(&config.temp_dirs.temp);
    let mut wake = WakeWordListener::from_config(&config)?;
    let mut session = DialogueSession::from_config(config.clone())?;
    let continuation = Duration::from_secs(config.dialogue.continuation_window);

    loop {
        info!("waiting for the wake word");
        if let Err(e) = wake.listen(&mut mic, &recognizer).await {
            error!(error = %e, "wake-word listening failed");
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        }

        info!("wake word heard, entering dialogue");
        loop {
            if !session.is_connected() {
                if let Err(e) = session.connect().await {
                    error!(error = %e, "could not reach the assistant server");
                    break;
                }
                if let Err(e) = session.await_welcome(&mut speaker, WELCOME_WAIT).await {
                    warn!(error = %e, "greeting wait failed");
                }
            }

            match session.run_turn(&mut mic, &mut speaker).await {
                Ok(()) => {}
                Err(e) if e.is_transport() => {
                    warn!(error = %e, "turn abandoned, reconnecting on the next one");
                }
                Err(e) => warn!(error = %e, "turn failed"),
            }

            match session.wait_for_continuation(&mut mic, continuation).await {
                Ok(true) => info!("continuing the conversation"),
                Ok(false) => {
                    info!("conversation over, back to wake-word listening");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "follow-up check failed");
                    break;
                }
            }
        }
        session.close().await;
    }
}
