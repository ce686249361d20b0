//! Core types shared by the record store, the binding engine and the channel layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque keyword data passed from a mutating call through to serializers.
pub type Kwargs = serde_json::Map<String, serde_json::Value>;

/// Kind of change applied to a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a kind of record, e.g. `auth.User`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RecordKind {
    /// Namespace the record kind lives in (e.g. "auth").
    pub app_label: String,
    /// Type name within the namespace (e.g. "User").
    pub object_name: String,
}

impl RecordKind {
    pub fn new(app_label: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self {
            app_label: app_label.into(),
            object_name: object_name.into(),
        }
    }

    /// Stable label used in outgoing messages: `"<app_label>.<object_name>"`, lowercased.
    pub fn label(&self) -> String {
        format!(
            "{}.{}",
            self.app_label.to_lowercase(),
            self.object_name.to_lowercase()
        )
    }

    pub fn is_empty(&self) -> bool {
        self.app_label.is_empty() || self.object_name.is_empty()
    }
}

impl fmt::Debug for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordKind({}.{})", self.app_label, self.object_name)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app_label, self.object_name)
    }
}

/// Primary key of a record. Serializes as a bare JSON number or string.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Int(i64),
    Str(String),
}

impl From<i64> for PrimaryKey {
    fn from(v: i64) -> Self {
        PrimaryKey::Int(v)
    }
}

impl From<&str> for PrimaryKey {
    fn from(v: &str) -> Self {
        PrimaryKey::Str(v.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(v: String) -> Self {
        PrimaryKey::Str(v)
    }
}

impl fmt::Debug for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKey::Int(v) => write!(f, "Pk({})", v),
            PrimaryKey::Str(v) => write!(f, "Pk({:?})", v),
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKey::Int(v) => write!(f, "{}", v),
            PrimaryKey::Str(v) => f.write_str(v),
        }
    }
}

/// Identifies one mutating operation (a single save or delete) on a table.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(pub u64);

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Op({})", self.0)
    }
}

/// Identifies a registered binding.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(pub u64);

impl fmt::Debug for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BindingId({})", self.0)
    }
}

/// One mutation as seen by a binding's serializer.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    pub kind: RecordKind,
    pub pk: Option<PrimaryKey>,
    pub action: Action,
    /// Keyword data the mutating call was issued with.
    pub kwargs: Kwargs,
}

/// Message emitted to a group for one action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub action: Action,
    pub pk: Option<PrimaryKey>,
    pub data: serde_json::Value,
    /// Record kind label, e.g. `"auth.user"`.
    pub model: String,
}

/// A payload tagged with the stream it is published under.
#[derive(Clone, Debug, Serialize)]
pub struct StreamFrame<'a, P: Serialize + ?Sized> {
    pub stream: &'a str,
    pub payload: &'a P,
}

/// Message type consumers dispatch on for pre-encoded frames.
pub const GROUP_SEND_ENCODED: &str = "group.send_encoded";

/// Envelope handed to the channel layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    /// Encoded text, re-emitted verbatim by the consumer.
    pub content: String,
}

impl LayerMessage {
    pub fn encoded(content: String) -> Self {
        Self {
            message_type: GROUP_SEND_ENCODED.to_string(),
            content,
        }
    }
}
