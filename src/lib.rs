//! # oneway
//!
//! One-way data bindings: when a record is created, updated or deleted, the
//! groups it belongs to receive a serialized notification describing the
//! change.
//!
//! ## Core Concepts
//!
//! - **Bindings**: per record kind, the groups a record belongs to and how it
//!   is serialized
//! - **Records**: in-memory tables with lifecycle signals and transactions
//! - **Layer**: group fan-out of `{"stream", "payload"}` frames to consumers
//!
//! ## Example
//!
//! ```ignore
//! use oneway::{Binding, BindingEngine, Delivery, GroupConsumer, InMemoryChannelLayer, Table};
//!
//! let layer = Arc::new(InMemoryChannelLayer::new());
//! let engine = BindingEngine::new(Delivery::new(layer.clone()));
//! let users: Table<User> = Table::new();
//! engine.register(&users, UserBinding)?;
//!
//! let consumer = GroupConsumer::connect(layer, &["test"]);
//!
//! let mut user = User::new("root");
//! users.save(&mut user)?;
//! // {"stream":"users","payload":{"action":"create","pk":1,...,"model":"auth.user"}}
//! let frame = consumer.recv_json(Duration::from_secs(1))?;
//! ```

pub mod bindings;
pub mod error;
pub mod layer;
pub mod records;
pub mod types;

// Re-exports
pub use bindings::{
    membership_diff, Binding, BindingEngine, BindingHandle, DataSerializer, GroupSet,
    SerdeSerializer,
};
pub use error::{BindingError, Result};
pub use layer::{
    group_send, group_send_sync, ChannelHandle, ChannelLayer, ChannelName, Delivery,
    GroupConsumer, InMemoryChannelLayer, LayerConfig,
};
pub use records::{
    CommitScope, Model, Receiver, ReceiverId, Signal, SignalKind, Signals, Table, TableId,
    Transaction, TransactionStatus,
};
pub use types::*;
