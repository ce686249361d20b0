//! In-memory table that emits lifecycle signals around every write.

use crate::error::{BindingError, Result};
use crate::records::model::Model;
use crate::records::signals::{Signal, Signals};
use crate::records::transaction::{CommitScope, Transaction};
use crate::types::{Kwargs, OperationId, PrimaryKey, RecordKind};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a table instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TableId(pub u64);

type Rows<M> = Arc<RwLock<BTreeMap<PrimaryKey, M>>>;

/// Keyed storage for one record kind.
///
/// Every save fires `PreSave` and `PostSave`, and every delete fires
/// `PreDelete` and `PostDelete`. Each call gets its own [`OperationId`].
pub struct Table<M: Model> {
    id: TableId,
    kind: RecordKind,
    rows: Rows<M>,
    /// Next auto-assigned integer key.
    next_pk: AtomicI64,
    next_op: AtomicU64,
    signals: Arc<Signals<M>>,
}

impl<M: Model> Table<M> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            id: TableId(NEXT_TABLE_ID.fetch_add(1, Ordering::SeqCst)),
            kind: M::kind(),
            rows: Arc::new(RwLock::new(BTreeMap::new())),
            next_pk: AtomicI64::new(1),
            next_op: AtomicU64::new(1),
            signals: Arc::new(Signals::new()),
        }
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn kind(&self) -> &RecordKind {
        &self.kind
    }

    pub fn signals(&self) -> &Arc<Signals<M>> {
        &self.signals
    }

    /// Get the stored copy of a row.
    pub fn get(&self, pk: &PrimaryKey) -> Option<M> {
        self.rows.read().get(pk).cloned()
    }

    /// All rows, ordered by primary key.
    pub fn all(&self) -> Vec<M> {
        self.rows.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    // --- Saves ---

    /// Insert or update a row outside any transaction.
    ///
    /// Assigns an integer primary key if the instance has none. Reading the
    /// stored row and writing the new one are separate steps, so two racing
    /// first saves of the same key may both see no previous row.
    pub fn save(&self, instance: &mut M) -> Result<()> {
        self.save_scoped(instance, Kwargs::new(), CommitScope::Autocommit)
    }

    /// Like [`save`](Self::save), passing `kwargs` through to receivers.
    pub fn save_with(&self, instance: &mut M, kwargs: Kwargs) -> Result<()> {
        self.save_scoped(instance, kwargs, CommitScope::Autocommit)
    }

    /// Insert or update a row inside `tx`.
    pub fn save_in(&self, tx: &Transaction, instance: &mut M) -> Result<()> {
        self.save_scoped(instance, Kwargs::new(), CommitScope::Atomic(tx))
    }

    pub fn save_in_with(
        &self,
        tx: &Transaction,
        instance: &mut M,
        kwargs: Kwargs,
    ) -> Result<()> {
        self.save_scoped(instance, kwargs, CommitScope::Atomic(tx))
    }

    fn save_scoped(
        &self,
        instance: &mut M,
        kwargs: Kwargs,
        commit: CommitScope<'_>,
    ) -> Result<()> {
        if let CommitScope::Atomic(tx) = &commit {
            tx.ensure_active()?;
        }

        let op = self.next_op();
        let result = self.save_op(op, instance, &kwargs, &commit);
        if result.is_err() {
            self.abort(op, instance);
        }
        result
    }

    fn save_op(
        &self,
        op: OperationId,
        instance: &mut M,
        kwargs: &Kwargs,
        commit: &CommitScope<'_>,
    ) -> Result<()> {
        let previous = instance.pk().and_then(|pk| self.get(&pk));

        self.signals.send(&Signal::PreSave {
            op,
            instance: &*instance,
            previous: previous.as_ref(),
            kwargs,
        })?;

        let pk = match instance.pk() {
            Some(pk) => {
                if let PrimaryKey::Int(v) = pk {
                    self.next_pk.fetch_max(v.saturating_add(1), Ordering::SeqCst);
                }
                pk
            }
            None => {
                instance.set_pk(PrimaryKey::Int(self.next_pk.fetch_add(1, Ordering::SeqCst)));
                // Read back: the model may store the key in its own representation.
                instance
                    .pk()
                    .ok_or_else(|| BindingError::MissingPrimaryKey(self.kind.to_string()))?
            }
        };

        let previous = self.rows.write().insert(pk.clone(), instance.clone());
        let created = previous.is_none();

        if let CommitScope::Atomic(tx) = commit {
            let rows = Arc::clone(&self.rows);
            tx.record_undo(Box::new(move || {
                let mut rows = rows.write();
                match previous {
                    Some(row) => rows.insert(pk, row),
                    None => rows.remove(&pk),
                };
            }))?;
        }

        self.signals.send(&Signal::PostSave {
            op,
            instance: &*instance,
            created,
            kwargs,
            commit,
        })
    }

    // --- Deletes ---

    /// Remove a row outside any transaction.
    ///
    /// Receivers see the stored row as well as `instance`.
    pub fn delete(&self, instance: &M) -> Result<()> {
        self.delete_scoped(instance, Kwargs::new(), None)
    }

    pub fn delete_with(&self, instance: &M, kwargs: Kwargs) -> Result<()> {
        self.delete_scoped(instance, kwargs, None)
    }

    /// Remove a row inside `tx`. Rolling back restores it.
    pub fn delete_in(&self, tx: &Transaction, instance: &M) -> Result<()> {
        self.delete_scoped(instance, Kwargs::new(), Some(tx))
    }

    fn delete_scoped(
        &self,
        instance: &M,
        kwargs: Kwargs,
        tx: Option<&Transaction>,
    ) -> Result<()> {
        if let Some(tx) = tx {
            tx.ensure_active()?;
        }

        let pk = instance
            .pk()
            .ok_or_else(|| BindingError::MissingPrimaryKey(self.kind.to_string()))?;
        let stored = self
            .get(&pk)
            .ok_or_else(|| BindingError::RecordNotFound(format!("{} {}", self.kind, pk)))?;

        let op = self.next_op();
        let result = self.delete_op(op, pk, instance, &stored, &kwargs, tx);
        if result.is_err() {
            self.abort(op, instance);
        }
        result
    }

    fn delete_op(
        &self,
        op: OperationId,
        pk: PrimaryKey,
        instance: &M,
        stored: &M,
        kwargs: &Kwargs,
        tx: Option<&Transaction>,
    ) -> Result<()> {
        self.signals.send(&Signal::PreDelete {
            op,
            instance,
            stored,
            kwargs,
        })?;

        let removed = self.rows.write().remove(&pk);

        if let (Some(tx), Some(row)) = (tx, removed) {
            let rows = Arc::clone(&self.rows);
            tx.record_undo(Box::new(move || {
                rows.write().insert(pk, row);
            }))?;
        }

        self.signals.send(&Signal::PostDelete {
            op,
            instance,
            stored,
            kwargs,
        })
    }

    /// Tell receivers that `op` will not complete.
    fn abort(&self, op: OperationId, instance: &M) {
        if let Err(e) = self.signals.send(&Signal::Aborted { op, instance }) {
            warn!(table = ?self.id, ?op, error = %e, "abort receiver failed");
        }
        debug!(table = ?self.id, ?op, "operation aborted");
    }

    fn next_op(&self) -> OperationId {
        OperationId(self.next_op.fetch_add(1, Ordering::SeqCst))
    }
}

impl<M: Model> Default for Table<M> {
    fn default() -> Self {
        Self::new()
    }
}
