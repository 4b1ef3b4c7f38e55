//! Serialized edits of the answer message.
//!
//! One task per cycle owns the edit calls for a [`DisplayHandle`]. The aggregator publishes
//! the latest content without waiting; at most one edit is in flight and a newer pending
//! content replaces an older one that was not sent yet, so the chat never shows content
//! older than what it already displayed.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::channels::{ChannelHandle, MessageRef};

/// The placeholder message a cycle keeps editing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayHandle(pub MessageRef);

pub struct DisplayUpdater {
    tx: watch::Sender<Option<String>>,
    task: JoinHandle<()>,
}

impl DisplayUpdater {
    pub fn spawn(channel: Arc<dyn ChannelHandle>, handle: DisplayHandle) -> Self {
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(run_edits(channel, handle, rx));
        Self { tx, task }
    }

    /// Publish new content; returns immediately.
    pub fn push(&self, content: String) {
        self.tx.send_replace(Some(content));
    }

    /// Publish the final content and wait until it was delivered (or failed).
    pub async fn finish(self, content: String) {
        let DisplayUpdater { tx, task } = self;
        tx.send_replace(Some(content));
        drop(tx);
        if let Err(e) = task.await {
            log::warn!("display updater task failed: {}", e);
        }
    }
}

async fn run_edits(
    channel: Arc<dyn ChannelHandle>,
    handle: DisplayHandle,
    mut rx: watch::Receiver<Option<String>>,
) {
    let mut shown: Option<String> = None;
    // changed() still reports a value published right before the sender was dropped
    while rx.changed().await.is_ok() {
        let latest = rx.borrow_and_update().clone();
        edit_if_new(channel.as_ref(), &handle, latest, &mut shown).await;
    }
    let latest = rx.borrow().clone();
    edit_if_new(channel.as_ref(), &handle, latest, &mut shown).await;
}

async fn edit_if_new(
    channel: &dyn ChannelHandle,
    handle: &DisplayHandle,
    latest: Option<String>,
    shown: &mut Option<String>,
) {
    let Some(content) = latest else { return };
    if shown.as_deref() == Some(content.as_str()) {
        return;
    }
    match channel.edit_message(&handle.0, &content).await {
        Ok(()) => *shown = Some(content),
        Err(e) => log::warn!("edit of message {} failed: {}", handle.0.message_id, e),
    }
}
