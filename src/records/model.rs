//! The record abstraction stored in tables and watched by bindings.

use crate::types::{PrimaryKey, RecordKind};

/// A record type that can be stored in a [`Table`](super::Table).
///
/// Instances are plain values. The table keeps its own copy of each saved
/// row, so a caller may keep mutating an instance after saving it.
pub trait Model: Clone + Send + Sync + 'static {
    /// The kind every instance of this type belongs to.
    fn kind() -> RecordKind;

    /// Primary key, or `None` if the record has never been saved.
    fn pk(&self) -> Option<PrimaryKey>;

    /// Assign a primary key. Called by the table on first save.
    fn set_pk(&mut self, pk: PrimaryKey);
}
