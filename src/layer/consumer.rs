//! Consumer end of group delivery.

use crate::error::Result;
use crate::layer::memory::{ChannelHandle, ChannelName, InMemoryChannelLayer};
use crate::types::{LayerMessage, GROUP_SEND_ENCODED};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// A channel joined to a set of groups that forwards pre-encoded frames.
///
/// Frames produced by [`Delivery`](super::Delivery) arrive as
/// `group.send_encoded` messages; their `content` is passed on verbatim, ready
/// to be written to a client transport.
pub struct GroupConsumer {
    layer: Arc<InMemoryChannelLayer>,
    channel: ChannelHandle,
    groups: Vec<String>,
}

impl GroupConsumer {
    /// Open a channel and add it to `groups`.
    pub fn connect(layer: Arc<InMemoryChannelLayer>, groups: &[&str]) -> Self {
        let channel = layer.new_channel();
        for group in groups {
            layer.group_add(group, &channel.name);
        }
        debug!(channel = %channel.name, ?groups, "consumer connected");

        Self {
            layer,
            channel,
            groups: groups.iter().map(|g| g.to_string()).collect(),
        }
    }

    pub fn channel_name(&self) -> &ChannelName {
        &self.channel.name
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Dispatch one layer message. Returns the text to forward, if any.
    pub fn handle(&self, message: LayerMessage) -> Option<String> {
        if message.message_type == GROUP_SEND_ENCODED {
            Some(message.content)
        } else {
            debug!(
                channel = %self.channel.name,
                message_type = %message.message_type,
                "ignoring message without handler"
            );
            None
        }
    }

    /// Wait up to `timeout` for the next forwardable frame.
    pub fn recv_text(&self, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = self.channel.recv_timeout(remaining).ok()?;
            if let Some(text) = self.handle(message) {
                return Some(text);
            }
        }
    }

    /// Like [`recv_text`](Self::recv_text), decoding the frame as JSON.
    pub fn recv_json(&self, timeout: Duration) -> Result<Option<serde_json::Value>> {
        match self.recv_text(timeout) {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    /// Drain every frame that is already buffered.
    pub fn drain_json(&self) -> Result<Vec<serde_json::Value>> {
        let mut frames = Vec::new();
        while let Ok(message) = self.channel.try_recv() {
            if let Some(text) = self.handle(message) {
                frames.push(serde_json::from_str(&text)?);
            }
        }
        Ok(frames)
    }

    /// Leave every group and close the channel.
    pub fn disconnect(self) {
        for group in &self.groups {
            self.layer.group_discard(group, &self.channel.name);
        }
        self.layer.close_channel(&self.channel.name);
        debug!(channel = %self.channel.name, "consumer disconnected");
    }
}
