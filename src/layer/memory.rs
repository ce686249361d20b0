//! In-process channel layer backed by bounded crossbeam channels.

use crate::error::{BindingError, Result};
use crate::layer::delivery::ChannelLayer;
use crate::types::LayerMessage;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, warn};

/// Configuration for an in-memory layer.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    /// Max buffered messages per channel before new messages are dropped.
    /// Default: 100
    pub capacity: usize,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// Name of one consumer channel.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelName(pub String);

impl fmt::Debug for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel({})", self.0)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receiving end of a channel.
pub struct ChannelHandle {
    pub name: ChannelName,
    pub receiver: Receiver<LayerMessage>,
}

impl ChannelHandle {
    /// Receive the next message (blocking).
    pub fn recv(&self) -> std::result::Result<LayerMessage, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message (non-blocking).
    pub fn try_recv(&self) -> std::result::Result<LayerMessage, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> std::result::Result<LayerMessage, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Group fan-out between channels in one process.
pub struct InMemoryChannelLayer {
    config: LayerConfig,
    /// Open channels by name.
    channels: RwLock<HashMap<ChannelName, Sender<LayerMessage>>>,
    /// Group name to member channels.
    groups: RwLock<HashMap<String, BTreeSet<ChannelName>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl InMemoryChannelLayer {
    pub fn new() -> Self {
        Self::with_config(LayerConfig::default())
    }

    pub fn with_config(config: LayerConfig) -> Self {
        Self {
            config,
            channels: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &LayerConfig {
        &self.config
    }

    /// Open a new channel.
    pub fn new_channel(&self) -> ChannelHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let name = ChannelName(format!("inmemory.{}", id));
        let (sender, receiver) = bounded(self.config.capacity);

        self.channels.write().insert(name.clone(), sender);

        ChannelHandle { name, receiver }
    }

    /// Add a channel to a group.
    pub fn group_add(&self, group: &str, channel: &ChannelName) {
        self.groups
            .write()
            .entry(group.to_string())
            .or_default()
            .insert(channel.clone());
    }

    /// Remove a channel from a group.
    pub fn group_discard(&self, group: &str, channel: &ChannelName) {
        let mut groups = self.groups.write();
        if let Some(members) = groups.get_mut(group) {
            members.remove(channel);
            if members.is_empty() {
                groups.remove(group);
            }
        }
    }

    /// Close a channel and remove it from every group.
    pub fn close_channel(&self, channel: &ChannelName) {
        self.channels.write().remove(channel);

        let mut groups = self.groups.write();
        groups.retain(|_, members| {
            members.remove(channel);
            !members.is_empty()
        });
    }

    /// Number of channels in a group.
    pub fn group_size(&self, group: &str) -> usize {
        self.groups.read().get(group).map_or(0, |m| m.len())
    }

    /// Number of open channels.
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Refuse further sends.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ChannelLayer for InMemoryChannelLayer {
    /// Sends to every member. Full channels miss the message; disconnected
    /// channels are closed.
    fn group_send(&self, group: &str, message: LayerMessage) -> Result<()> {
        if self.is_closed() {
            return Err(BindingError::Delivery("channel layer is closed".into()));
        }

        let members: Vec<ChannelName> = match self.groups.read().get(group) {
            Some(members) => members.iter().cloned().collect(),
            None => {
                debug!(group, "group has no members");
                return Ok(());
            }
        };

        let mut disconnected = Vec::new();

        {
            let channels = self.channels.read();
            for name in members {
                let Some(sender) = channels.get(&name) else {
                    disconnected.push(name);
                    continue;
                };
                match sender.try_send(message.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(group, channel = %name, "channel full, message dropped");
                    }
                    Err(TrySendError::Disconnected(_)) => disconnected.push(name),
                }
            }
        }

        for name in disconnected {
            warn!(group, channel = %name, "channel disconnected, removing");
            self.close_channel(&name);
        }

        Ok(())
    }
}

impl Default for InMemoryChannelLayer {
    fn default() -> Self {
        Self::new()
    }
}
