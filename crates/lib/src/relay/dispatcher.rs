//! Request dispatcher: one inbound message to one finished answer message.

use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::aggregator::{AggregatorSettings, ChunkStep, StreamAggregator};
use super::display::{DisplayHandle, DisplayUpdater};
use super::filter;
use crate::channels::{ChannelHandle, InboundMessage};
use crate::config::{self, Config};
use crate::llm::{GenerationBackend, LlmError};

/// Placeholder shown while the first tokens are on their way.
pub const PLACEHOLDER_MESSAGE: &str = "Pensando...";

/// Reply when the generation service could not be reached.
pub const CONNECT_ERROR_MESSAGE: &str = "Ocorreu um erro ao tentar conectar com o Ollama. Verifique se ele está rodando e o modelo está disponível.";

/// Everything a cycle needs from configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub prefix: String,
    pub model: String,
    pub aggregator: AggregatorSettings,
    /// Give up on a stream that yields nothing for this long. `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            prefix: config::resolve_prefix(config),
            model: config::resolve_model(config),
            aggregator: AggregatorSettings {
                update_interval: Duration::from_millis(config.relay.update_interval_ms),
                // zero would truncate every answer to an empty edit
                max_display_len: config.relay.max_display_length.max(1),
            },
            idle_timeout: config::resolve_idle_timeout(config),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            prefix: config::DEFAULT_PREFIX.to_string(),
            model: config::DEFAULT_MODEL.to_string(),
            aggregator: AggregatorSettings::default(),
            idle_timeout: None,
        }
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Not a command for us (bot author or no prefix).
    Ignored,
    /// Prefix without a question; usage hint sent.
    UsageHint,
    /// Generation service unreachable; error reply sent.
    ConnectFailed,
    /// Stream ended; the answer message shows this content.
    Completed(String),
    /// Stream broke or went idle; the answer message shows the error text.
    StreamFailed,
}

/// Runs cycles against an injected channel and generation backend.
pub struct Dispatcher<B> {
    channel: Arc<dyn ChannelHandle>,
    backend: B,
    settings: RelaySettings,
}

impl<B: GenerationBackend> Dispatcher<B> {
    pub fn new(channel: Arc<dyn ChannelHandle>, backend: B, settings: RelaySettings) -> Self {
        Self {
            channel,
            backend,
            settings,
        }
    }

    /// Process one inbound message: filter, placeholder, generate, stream edits.
    pub async fn handle(&self, msg: InboundMessage) -> CycleOutcome {
        if msg.author_is_bot {
            return CycleOutcome::Ignored;
        }
        let Some(prompt) = filter::strip_prefix(&msg.text, &self.settings.prefix) else {
            return CycleOutcome::Ignored;
        };
        if prompt.is_empty() {
            let hint = filter::usage_hint(&self.settings.prefix);
            if let Err(e) = self
                .channel
                .reply(&msg.conversation_id, &msg.message_id, &hint)
                .await
            {
                log::warn!("usage hint reply failed: {}", e);
            }
            return CycleOutcome::UsageHint;
        }

        log::info!(
            "{} prompt from {}: \"{}\"",
            msg.channel_id,
            msg.author_tag,
            prompt
        );

        if let Err(e) = self.channel.send_typing(&msg.conversation_id).await {
            log::debug!("typing indicator failed: {}", e);
        }

        let placeholder = match self
            .channel
            .reply(&msg.conversation_id, &msg.message_id, PLACEHOLDER_MESSAGE)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                log::error!("creating placeholder message failed: {}", e);
                self.reply_connect_error(&msg).await;
                return CycleOutcome::ConnectFailed;
            }
        };

        let stream = match self
            .backend
            .generate_stream(&self.settings.model, prompt)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                log::error!("generation request failed: {}", e);
                self.reply_connect_error(&msg).await;
                return CycleOutcome::ConnectFailed;
            }
        };

        let display = DisplayUpdater::spawn(self.channel.clone(), DisplayHandle(placeholder));
        let outcome = relay_stream(
            stream,
            display,
            self.settings.aggregator,
            self.settings.idle_timeout,
        )
        .await;
        if let CycleOutcome::Completed(ref shown) = outcome {
            log::info!(
                "stream finished for {}, {} characters shown",
                msg.author_tag,
                shown.chars().count()
            );
        }
        outcome
    }

    async fn reply_connect_error(&self, msg: &InboundMessage) {
        if let Err(e) = self
            .channel
            .reply(&msg.conversation_id, &msg.message_id, CONNECT_ERROR_MESSAGE)
            .await
        {
            log::warn!("error reply failed: {}", e);
        }
    }
}

/// Fold a generation byte stream through the aggregator, pushing flushes to `display`.
pub async fn relay_stream<S>(
    mut stream: S,
    display: DisplayUpdater,
    settings: AggregatorSettings,
    idle_timeout: Option<Duration>,
) -> CycleOutcome
where
    S: Stream<Item = Result<bytes::Bytes, LlmError>> + Unpin,
{
    let mut aggregator = StreamAggregator::new(settings, Instant::now());
    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    log::warn!("generation stream idle for {:?}, giving up", limit);
                    display.finish(aggregator.fail()).await;
                    return CycleOutcome::StreamFailed;
                }
            },
            None => stream.next().await,
        };
        match next {
            Some(Ok(chunk)) => match aggregator.on_chunk(&chunk, Instant::now()) {
                ChunkStep::Pending => {}
                ChunkStep::Flush(content) => display.push(content),
                ChunkStep::Done => break,
            },
            Some(Err(e)) => {
                log::error!("generation stream failed: {}", e);
                display.finish(aggregator.fail()).await;
                return CycleOutcome::StreamFailed;
            }
            None => break,
        }
    }
    let shown = aggregator.finish();
    display.finish(shown.clone()).await;
    CycleOutcome::Completed(shown)
}
