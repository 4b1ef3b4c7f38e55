//! Process wiring: Discord connector, Ollama client, and one relay task per inbound message.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::channels::{ChannelHandle, DiscordChannel, InboundMessage};
use crate::config::{self, Config};
use crate::llm::OllamaClient;
use crate::relay::{Dispatcher, RelaySettings};

/// Fail fast when no bot token is configured.
pub fn require_bot_token(config: &Config, config_path: &Path) -> Result<String> {
    match config::resolve_bot_token(config) {
        Some(token) => Ok(token),
        None => anyhow::bail!(
            "discord bot token not found: set DISCORD_BOT_TOKEN (environment or .env file) or discord.botToken in {}",
            config_path.display()
        ),
    }
}

/// Run the relay until SIGINT or SIGTERM.
pub async fn run_bot(config: Config, config_path: &Path) -> Result<()> {
    let token = require_bot_token(&config, config_path)?;
    let settings = RelaySettings::from_config(&config);
    let ollama = OllamaClient::new(Some(config::resolve_base_url(&config)));
    log::info!(
        "using ollama model {} at {}",
        settings.model,
        ollama.base_url()
    );
    log::info!("command prefix: \"{}\"", settings.prefix);

    spawn_model_check(ollama.clone(), settings.model.clone());

    let discord = Arc::new(DiscordChannel::new(token));
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<InboundMessage>(64);
    let gateway_task = discord.clone().start_inbound(inbound_tx);

    let channel: Arc<dyn ChannelHandle> = discord.clone();
    let dispatcher = Arc::new(Dispatcher::new(channel, ollama, settings));
    let processor = tokio::spawn(async move {
        while let Some(msg) = inbound_rx.recv().await {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher.handle(msg).await;
            });
        }
    });

    shutdown_signal().await;
    log::info!("shutdown signal received, stopping discord channel");
    discord.stop();
    gateway_task.abort();
    let _ = gateway_task.await;
    let _ = processor.await;
    log::info!("relay stopped");
    Ok(())
}

/// Warn early when the configured model is not installed; the relay still starts.
fn spawn_model_check(ollama: OllamaClient, model: String) {
    tokio::spawn(async move {
        match ollama.list_models().await {
            Ok(models) if models.iter().any(|m| m.matches(&model)) => {
                log::info!("ollama model discovery completed, {} is available", model);
            }
            Ok(models) => {
                let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
                log::warn!(
                    "model {} not found in ollama (installed: {}); requests will fail until it is pulled",
                    model,
                    names.join(", ")
                );
            }
            Err(e) => {
                log::warn!("ollama model discovery failed: {}", e);
            }
        }
    });
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
