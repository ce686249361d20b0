//! Group delivery.
//!
//! - [`Delivery`] encodes `{"stream", "payload"}` frames and hands them to a
//!   [`ChannelLayer`], in a blocking or an async form.
//! - [`InMemoryChannelLayer`] fans messages out to bounded per-consumer
//!   channels, dropping messages for full channels and evicting
//!   disconnected ones.
//! - [`GroupConsumer`] joins groups and forwards `group.send_encoded` frames.
//!
//! # Example
//!
//! ```ignore
//! let layer = Arc::new(InMemoryChannelLayer::new());
//! let consumer = GroupConsumer::connect(Arc::clone(&layer), &["test"]);
//!
//! let delivery = Delivery::new(layer);
//! delivery.deliver("test", "users", &json!({"hello": "world"}))?;
//!
//! let frame = consumer.recv_json(Duration::from_secs(1))?;
//! ```

mod consumer;
mod delivery;
mod memory;

pub use consumer::GroupConsumer;
pub use delivery::{group_send, group_send_sync, ChannelLayer, Delivery};
pub use memory::{ChannelHandle, ChannelName, InMemoryChannelLayer, LayerConfig};
