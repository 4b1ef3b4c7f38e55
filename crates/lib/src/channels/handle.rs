//! Outbound side of a channel: the operations the relay performs on a conversation.

use async_trait::async_trait;

/// Reference to a message the bot created, used to edit it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub conversation_id: String,
    pub message_id: String,
}

/// Handle to a running channel (stop, typing, reply, edit).
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "discord").
    fn id(&self) -> &str;
    /// Stop the channel connector.
    fn stop(&self);
    /// Show a typing indicator in the conversation. Default is a no-op.
    async fn send_typing(&self, _conversation_id: &str) -> Result<(), String> {
        Ok(())
    }
    /// Reply to `reply_to` in the conversation; returns a reference to the new message.
    async fn reply(
        &self,
        conversation_id: &str,
        reply_to: &str,
        text: &str,
    ) -> Result<MessageRef, String>;
    /// Replace the content of a message previously created by the bot.
    async fn edit_message(&self, message: &MessageRef, text: &str) -> Result<(), String>;
}
