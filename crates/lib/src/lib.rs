//! estagiario core library: Discord channel, Ollama client, and the streaming relay
//! used by the CLI.

pub mod bot;
pub mod channels;
pub mod config;
pub mod llm;
pub mod relay;
