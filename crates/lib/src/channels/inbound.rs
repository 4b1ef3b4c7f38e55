//! Inbound message from a channel: delivered to the relay dispatcher.

/// A message from a channel, possibly a prompt for the relay.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub channel_id: String,
    /// Where replies go (Discord channel id).
    pub conversation_id: String,
    pub message_id: String,
    /// Display tag of the author, for logs.
    pub author_tag: String,
    pub author_is_bot: bool,
    pub text: String,
}
