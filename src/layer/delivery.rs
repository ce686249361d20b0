//! Delivery primitive: encode a stream frame and hand it to the channel layer.

use crate::error::{BindingError, Result};
use crate::types::{LayerMessage, StreamFrame};
use serde::Serialize;
use std::sync::Arc;

/// A fabric that delivers a message to every current member of a group.
///
/// Implementations must not wait for subscribers to process the message.
pub trait ChannelLayer: Send + Sync + 'static {
    fn group_send(&self, group: &str, message: LayerMessage) -> Result<()>;
}

/// Encodes `{"stream": .., "payload": ..}` frames and sends them to groups.
#[derive(Clone)]
pub struct Delivery {
    layer: Arc<dyn ChannelLayer>,
}

impl Delivery {
    pub fn new(layer: Arc<dyn ChannelLayer>) -> Self {
        Self { layer }
    }

    pub fn layer(&self) -> &Arc<dyn ChannelLayer> {
        &self.layer
    }

    /// Build the layer envelope for a payload on `stream`.
    pub fn encode<P: Serialize + ?Sized>(stream: &str, payload: &P) -> Result<LayerMessage> {
        let content = serde_json::to_string(&StreamFrame { stream, payload })?;
        Ok(LayerMessage::encoded(content))
    }

    /// Blocking form. Safe to call from synchronous code, including store hooks.
    pub fn deliver<P: Serialize + ?Sized>(
        &self,
        group: &str,
        stream: &str,
        payload: &P,
    ) -> Result<()> {
        let message = Self::encode(stream, payload)?;
        self.layer.group_send(group, message)
    }

    /// Async form. Encodes identically to [`deliver`](Self::deliver); inside a
    /// tokio runtime the layer call runs on the blocking pool.
    pub async fn deliver_async<P: Serialize + ?Sized>(
        &self,
        group: &str,
        stream: &str,
        payload: &P,
    ) -> Result<()> {
        let message = Self::encode(stream, payload)?;

        if tokio::runtime::Handle::try_current().is_err() {
            return self.layer.group_send(group, message);
        }

        let layer = Arc::clone(&self.layer);
        let group = group.to_string();
        tokio::task::spawn_blocking(move || layer.group_send(&group, message))
            .await
            .map_err(|e| BindingError::Delivery(format!("delivery task failed: {}", e)))?
    }
}

/// Send `payload` on `stream` to `group`, blocking form.
pub fn group_send_sync<P: Serialize + ?Sized>(
    layer: &Arc<dyn ChannelLayer>,
    group: &str,
    stream: &str,
    payload: &P,
) -> Result<()> {
    Delivery::new(Arc::clone(layer)).deliver(group, stream, payload)
}

/// Send `payload` on `stream` to `group` from async code.
pub async fn group_send<P: Serialize + ?Sized>(
    layer: &Arc<dyn ChannelLayer>,
    group: &str,
    stream: &str,
    payload: &P,
) -> Result<()> {
    Delivery::new(Arc::clone(layer))
        .deliver_async(group, stream, payload)
        .await
}
