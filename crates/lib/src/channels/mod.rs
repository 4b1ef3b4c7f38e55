//! Communication channels (Discord).
//!
//! A channel connector delivers inbound messages to the relay over an mpsc channel and
//! exposes the outbound capabilities the relay needs (typing, reply, edit) through
//! [`ChannelHandle`].

mod discord;
mod handle;
mod inbound;

pub use discord::DiscordChannel;
pub use handle::{ChannelHandle, MessageRef};
pub use inbound::InboundMessage;
