//! One-way bindings from record changes to subscriber groups.
//!
//! A [`Binding`] names the groups a record belongs to. The [`BindingEngine`]
//! hooks the record's table and, for every mutation:
//!
//! 1. Captures the record's groups before the write (empty for a create).
//! 2. After the write commits (or right after a delete), resolves the groups
//!    again and diffs the two sets.
//! 3. Sends `delete` to groups the record left, then `update` to groups it
//!    stayed in, then `create` to groups it joined.
//!
//! Each action is serialized once and fanned out to all of its groups. A
//! serializer returning `None` suppresses that action.
//!
//! # Example
//!
//! ```ignore
//! let layer = Arc::new(InMemoryChannelLayer::new());
//! let engine = BindingEngine::new(Delivery::new(layer.clone()));
//!
//! let users: Table<User> = Table::new();
//! let handle = engine.register(&users, UserBinding)?;
//!
//! let consumer = GroupConsumer::connect(layer, &["test"]);
//! users.save(&mut User::new("root"))?;
//! let frame = consumer.recv_json(Duration::from_secs(1))?;
//! ```

mod binding;
mod engine;

pub use binding::{Binding, DataSerializer, SerdeSerializer};
pub use engine::{membership_diff, BindingEngine, BindingHandle, GroupSet};
