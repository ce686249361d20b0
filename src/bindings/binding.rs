//! The `Binding` trait integrators implement, and the data serializer seam.

use crate::error::{BindingError, Result};
use crate::records::Model;
use crate::types::{ChangeEvent, Message};
use serde::Serialize;

/// Maps a record to JSON-compatible field data.
pub trait DataSerializer<M>: Send + Sync {
    fn to_data(&self, instance: &M) -> Result<serde_json::Value>;
}

/// Serializes any `serde::Serialize` record with `serde_json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerdeSerializer;

impl<M: Serialize> DataSerializer<M> for SerdeSerializer {
    fn to_data(&self, instance: &M) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(instance)?)
    }
}

/// A one-way binding from changes of one record kind to subscriber groups.
///
/// Register an implementation with
/// [`BindingEngine::register`](super::BindingEngine::register). After every
/// committed save and every delete, each group the record left receives a
/// `delete`, each group it stayed in receives an `update`, and each group it
/// joined receives a `create`.
///
/// ```ignore
/// struct UserBinding;
///
/// impl Binding for UserBinding {
///     type Model = User;
///
///     fn stream(&self) -> &str {
///         "users"
///     }
///
///     fn group_names(&self, user: &User) -> Vec<String> {
///         vec![format!("team-{}", user.team)]
///     }
///
///     fn serializer(&self) -> Option<&dyn DataSerializer<User>> {
///         Some(&SerdeSerializer)
///     }
/// }
/// ```
pub trait Binding: Send + Sync + 'static {
    /// The record type this binding watches.
    type Model: Model;

    /// Stream name messages are published under.
    fn stream(&self) -> &str;

    /// Groups `instance` currently belongs to.
    fn group_names(&self, instance: &Self::Model) -> Vec<String>;

    /// Mapper used by the default [`serialize_data`](Self::serialize_data).
    fn serializer(&self) -> Option<&dyn DataSerializer<Self::Model>> {
        None
    }

    /// Field data for the `data` key of outgoing messages.
    ///
    /// Override this to skip the configured serializer entirely.
    fn serialize_data(&self, instance: &Self::Model) -> Result<serde_json::Value> {
        let serializer = self
            .serializer()
            .ok_or_else(|| BindingError::MissingSerializer(Self::Model::kind().to_string()))?;
        serializer.to_data(instance)
    }

    /// Build the message for one action. `Ok(None)` suppresses delivery.
    fn serialize(
        &self,
        instance: &Self::Model,
        event: &ChangeEvent,
        model_label: &str,
    ) -> Result<Option<Message>> {
        Ok(Some(Message {
            action: event.action,
            pk: event.pk.clone(),
            data: self.serialize_data(instance)?,
            model: model_label.to_string(),
        }))
    }
}
