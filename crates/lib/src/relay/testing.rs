//! Test doubles for the channel and generation backend.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::channels::{ChannelHandle, MessageRef};
use crate::llm::{ByteStream, GenerationBackend, LlmError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Typing(String),
    Reply { reply_to: String, text: String },
    Edit { message_id: String, text: String },
}

/// Channel that records every call. Replies get ids `r1`, `r2`, ...
#[derive(Default)]
pub struct RecordingChannel {
    edit_delay: Option<Duration>,
    failing_edits: AtomicUsize,
    fail_replies: AtomicBool,
    replies: AtomicUsize,
    sent: Mutex<Vec<Sent>>,
    edits: Mutex<Vec<(MessageRef, String)>>,
}

impl RecordingChannel {
    pub fn with_edit_delay(delay: Duration) -> Self {
        Self {
            edit_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Make the next `n` edits fail.
    pub fn fail_edits(&self, n: usize) {
        self.failing_edits.store(n, Ordering::SeqCst);
    }

    pub fn fail_replies(&self) {
        self.fail_replies.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn edits(&self) -> Vec<(MessageRef, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn reply_texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Reply { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn edit_texts(&self) -> Vec<String> {
        self.edits().into_iter().map(|(_, t)| t).collect()
    }
}

#[async_trait]
impl ChannelHandle for RecordingChannel {
    fn id(&self) -> &str {
        "recording"
    }

    fn stop(&self) {}

    async fn send_typing(&self, conversation_id: &str) -> Result<(), String> {
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Typing(conversation_id.to_string()));
        Ok(())
    }

    async fn reply(
        &self,
        conversation_id: &str,
        reply_to: &str,
        text: &str,
    ) -> Result<MessageRef, String> {
        if self.fail_replies.load(Ordering::SeqCst) {
            return Err("reply rejected".to_string());
        }
        self.sent.lock().unwrap().push(Sent::Reply {
            reply_to: reply_to.to_string(),
            text: text.to_string(),
        });
        let n = self.replies.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MessageRef {
            conversation_id: conversation_id.to_string(),
            message_id: format!("r{}", n),
        })
    }

    async fn edit_message(&self, message: &MessageRef, text: &str) -> Result<(), String> {
        if let Some(delay) = self.edit_delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self.failing_edits.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_edits.store(failing - 1, Ordering::SeqCst);
            return Err("edit rejected".to_string());
        }
        self.sent.lock().unwrap().push(Sent::Edit {
            message_id: message.message_id.clone(),
            text: text.to_string(),
        });
        self.edits
            .lock()
            .unwrap()
            .push((message.clone(), text.to_string()));
        Ok(())
    }
}

/// One scripted item of a fake generation stream.
#[derive(Debug, Clone)]
pub enum Script {
    Chunk(&'static str),
    Pause(Duration),
    Fail,
    /// Never yields again.
    Hang,
}

/// Backend that replays a script, or refuses the request when `refuse` is set.
#[derive(Default)]
pub struct ScriptedBackend {
    pub script: Vec<Script>,
    pub refuse: bool,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Script>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate_stream(&self, model: &str, prompt: &str) -> Result<ByteStream, LlmError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), prompt.to_string()));
        if self.refuse {
            return Err(LlmError::Api("503 Service Unavailable".to_string()));
        }
        let script = self.script.clone();
        let stream = futures_util::stream::unfold(script.into_iter(), |mut items| async move {
            loop {
                match items.next()? {
                    Script::Chunk(s) => return Some((Ok(Bytes::from_static(s.as_bytes())), items)),
                    Script::Pause(d) => tokio::time::sleep(d).await,
                    Script::Fail => {
                        return Some((Err(LlmError::Api("connection reset".to_string())), items))
                    }
                    Script::Hang => std::future::pending::<()>().await,
                }
            }
        });
        Ok(Box::pin(stream))
    }
}
