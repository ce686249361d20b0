//! Binding engine: membership snapshots, group diffs and ordered dispatch.

use crate::bindings::binding::Binding;
use crate::error::{BindingError, Result};
use crate::layer::Delivery;
use crate::records::{Model, ReceiverId, Signal, SignalKind, Signals, Table, TableId};
use crate::types::{Action, BindingId, ChangeEvent, Kwargs, OperationId};
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

/// Group names a record belongs to, in deterministic order.
pub type GroupSet = BTreeSet<String>;

/// Splits an old and new membership into `(delete, update, create)` sets.
///
/// Groups the record left get a delete, groups it stayed in an update and
/// groups it joined a create.
pub fn membership_diff(old: &GroupSet, new: &GroupSet) -> [(Action, GroupSet); 3] {
    [
        (Action::Delete, old.difference(new).cloned().collect()),
        (Action::Update, old.intersection(new).cloned().collect()),
        (Action::Create, new.difference(old).cloned().collect()),
    ]
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct RegistrationKey {
    binding_type: TypeId,
    table: TableId,
    stream: String,
}

/// One binding attached to one table.
struct Registration<B: Binding> {
    id: BindingId,
    key: RegistrationKey,
    binding: B,
    model_label: String,
    delivery: Delivery,
    /// Pre-change membership per in-flight operation.
    snapshots: Mutex<HashMap<OperationId, GroupSet>>,
    signals: Weak<Signals<B::Model>>,
    receivers: Mutex<Vec<ReceiverId>>,
}

impl<B: Binding> Registration<B> {
    fn resolve_groups(&self, instance: &B::Model) -> GroupSet {
        self.binding.group_names(instance).into_iter().collect()
    }

    fn receive(self: &Arc<Self>, signal: &Signal<'_, B::Model>) -> Result<()> {
        match signal {
            Signal::PreSave { op, previous, .. } => {
                // Membership before the write comes from the stored row, not
                // from the caller's already edited instance.
                match previous {
                    Some(stored) => self.pre_change(*op, stored, Action::Update),
                    None => self.pre_change(*op, signal.instance(), Action::Create),
                }
                Ok(())
            }
            Signal::PostSave {
                op,
                instance,
                created,
                kwargs,
                commit,
            } => {
                let action = if *created { Action::Create } else { Action::Update };
                // Taken now so a rolled back transaction leaves nothing behind.
                let old = self.take_snapshot(*op)?;
                let registration = Arc::clone(self);
                let instance = (*instance).clone();
                let kwargs = (*kwargs).clone();
                commit.on_commit(move || {
                    registration.post_change(&instance, action, old, kwargs)
                })
            }
            Signal::PreDelete { op, stored, .. } => {
                self.pre_change(*op, stored, Action::Delete);
                Ok(())
            }
            Signal::PostDelete { op, stored, kwargs, .. } => {
                // The stored row is the last known state of the record.
                let old = self.take_snapshot(*op)?;
                self.post_change(stored, Action::Delete, old, (*kwargs).clone())
            }
            Signal::Aborted { op, .. } => {
                if self.snapshots.lock().remove(op).is_some() {
                    debug!(binding = ?self.id, ?op, "dropped snapshot of aborted operation");
                }
                Ok(())
            }
        }
    }

    /// Capture membership before the write is applied.
    fn pre_change(&self, op: OperationId, instance: &B::Model, action: Action) {
        let groups = match action {
            Action::Create => GroupSet::new(),
            Action::Update | Action::Delete => self.resolve_groups(instance),
        };
        self.snapshots.lock().insert(op, groups);
    }

    fn take_snapshot(&self, op: OperationId) -> Result<GroupSet> {
        self.snapshots.lock().remove(&op).ok_or_else(|| {
            error!(
                binding = ?self.id,
                ?op,
                model = %self.model_label,
                "post-change hook fired without a membership snapshot"
            );
            BindingError::SnapshotMissing {
                binding: self.id,
                op,
            }
        })
    }

    /// Diff memberships and dispatch delete, update, create in that order.
    fn post_change(
        &self,
        instance: &B::Model,
        action: Action,
        old: GroupSet,
        kwargs: Kwargs,
    ) -> Result<()> {
        let new = match action {
            Action::Delete => GroupSet::new(),
            Action::Create | Action::Update => self.resolve_groups(instance),
        };

        for (message_action, groups) in membership_diff(&old, &new) {
            self.send_messages(instance, &groups, message_action, &kwargs)?;
        }
        Ok(())
    }

    fn send_messages(
        &self,
        instance: &B::Model,
        groups: &GroupSet,
        action: Action,
        kwargs: &Kwargs,
    ) -> Result<()> {
        if groups.is_empty() {
            return Ok(());
        }

        let event = ChangeEvent {
            kind: <B::Model as Model>::kind(),
            pk: instance.pk(),
            action,
            kwargs: kwargs.clone(),
        };
        let Some(message) = self.binding.serialize(instance, &event, &self.model_label)? else {
            debug!(model = %self.model_label, %action, "serializer suppressed message");
            return Ok(());
        };

        let stream = self.binding.stream();
        for group in groups {
            self.delivery.deliver(group, stream, &message)?;
        }
        debug!(
            model = %self.model_label,
            pk = ?event.pk,
            %action,
            groups = groups.len(),
            "dispatched binding message"
        );
        Ok(())
    }
}

/// Handle to a registered binding. Cloning shares the registration.
pub struct BindingHandle<B: Binding> {
    inner: Arc<Registration<B>>,
}

impl<B: Binding> Clone for BindingHandle<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Binding> BindingHandle<B> {
    pub fn id(&self) -> BindingId {
        self.inner.id
    }

    pub fn binding(&self) -> &B {
        &self.inner.binding
    }

    /// Label sent in the `model` field, e.g. `"auth.user"`.
    pub fn model_label(&self) -> &str {
        &self.inner.model_label
    }

    pub fn stream(&self) -> &str {
        self.inner.binding.stream()
    }

    /// Operations whose pre-change hook ran but whose post-change hook has not.
    pub fn pending_snapshots(&self) -> usize {
        self.inner.snapshots.lock().len()
    }
}

/// Registers bindings on tables and routes their lifecycle signals.
pub struct BindingEngine {
    delivery: Delivery,
    registrations: Mutex<HashMap<RegistrationKey, Arc<dyn Any + Send + Sync>>>,
    next_id: AtomicU64,
}

impl BindingEngine {
    pub fn new(delivery: Delivery) -> Self {
        Self {
            delivery,
            registrations: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// Number of live registrations.
    pub fn registration_count(&self) -> usize {
        self.registrations.lock().len()
    }

    /// Attach `binding` to `table`.
    ///
    /// Connects pre/post save, pre/post delete and abort receivers. Registering the
    /// same binding type with the same stream on the same table again returns
    /// the existing registration.
    pub fn register<B: Binding>(
        &self,
        table: &Table<B::Model>,
        binding: B,
    ) -> Result<BindingHandle<B>> {
        let kind = table.kind();
        if kind.is_empty() {
            return Err(BindingError::Registration(format!(
                "record kind {:?} needs both a namespace and a name",
                kind
            )));
        }
        if binding.stream().is_empty() {
            return Err(BindingError::MissingStream(kind.to_string()));
        }

        let key = RegistrationKey {
            binding_type: TypeId::of::<B>(),
            table: table.id(),
            stream: binding.stream().to_string(),
        };

        let mut registrations = self.registrations.lock();
        if let Some(existing) = registrations.get(&key) {
            let inner = Arc::clone(existing)
                .downcast::<Registration<B>>()
                .map_err(|_| BindingError::Registration("registration type mismatch".into()))?;
            debug!(binding = ?inner.id, model = %inner.model_label, "binding already registered");
            return Ok(BindingHandle { inner });
        }

        let registration = Arc::new(Registration {
            id: BindingId(self.next_id.fetch_add(1, Ordering::SeqCst)),
            key: key.clone(),
            binding,
            model_label: kind.label(),
            delivery: self.delivery.clone(),
            snapshots: Mutex::new(HashMap::new()),
            signals: Arc::downgrade(table.signals()),
            receivers: Mutex::new(Vec::new()),
        });

        let receivers: Vec<ReceiverId> = [
            SignalKind::PreSave,
            SignalKind::PostSave,
            SignalKind::PreDelete,
            SignalKind::PostDelete,
            SignalKind::Aborted,
        ]
        .into_iter()
        .map(|signal_kind| {
            let registration = Arc::clone(&registration);
            table.signals().connect(
                signal_kind,
                Arc::new(move |signal: &Signal<'_, B::Model>| registration.receive(signal)),
            )
        })
        .collect();
        *registration.receivers.lock() = receivers;

        debug!(
            binding = ?registration.id,
            model = %registration.model_label,
            stream = registration.binding.stream(),
            "binding registered"
        );

        registrations.insert(key, Arc::clone(&registration) as Arc<dyn Any + Send + Sync>);
        Ok(BindingHandle {
            inner: registration,
        })
    }

    /// Disconnect a binding from its table.
    ///
    /// Saves already waiting for commit still dispatch when it happens.
    pub fn unregister<B: Binding>(&self, handle: BindingHandle<B>) {
        let inner = handle.inner;
        self.registrations.lock().remove(&inner.key);

        let receivers = std::mem::take(&mut *inner.receivers.lock());
        if let Some(signals) = inner.signals.upgrade() {
            for id in receivers {
                signals.disconnect(id);
            }
        }
        debug!(binding = ?inner.id, model = %inner.model_label, "binding unregistered");
    }
}
