//! Lifecycle signals emitted by a table around each save and delete.

use crate::error::Result;
use crate::records::transaction::CommitScope;
use crate::types::{Kwargs, OperationId};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Which lifecycle point a receiver listens on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalKind {
    PreSave,
    PostSave,
    PreDelete,
    PostDelete,
    Aborted,
}

/// A lifecycle signal for one mutating operation.
pub enum Signal<'a, M> {
    /// Before a row is written.
    PreSave {
        op: OperationId,
        instance: &'a M,
        /// The currently stored row; `None` when the save will insert.
        previous: Option<&'a M>,
        kwargs: &'a Kwargs,
    },
    /// After a row is written. Work that must observe committed state
    /// should be registered on `commit`.
    PostSave {
        op: OperationId,
        instance: &'a M,
        created: bool,
        kwargs: &'a Kwargs,
        commit: &'a CommitScope<'a>,
    },
    /// Before a row is removed.
    PreDelete {
        op: OperationId,
        instance: &'a M,
        /// The row as stored, which may differ from the caller's copy.
        stored: &'a M,
        kwargs: &'a Kwargs,
    },
    /// After a row is removed.
    PostDelete {
        op: OperationId,
        instance: &'a M,
        stored: &'a M,
        kwargs: &'a Kwargs,
    },
    /// An operation failed after its pre-signal was sent. Receivers drop any
    /// state they keep for `op`; errors they return are ignored.
    Aborted { op: OperationId, instance: &'a M },
}

impl<'a, M> Signal<'a, M> {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::PreSave { .. } => SignalKind::PreSave,
            Signal::PostSave { .. } => SignalKind::PostSave,
            Signal::PreDelete { .. } => SignalKind::PreDelete,
            Signal::PostDelete { .. } => SignalKind::PostDelete,
            Signal::Aborted { .. } => SignalKind::Aborted,
        }
    }

    pub fn op(&self) -> OperationId {
        match self {
            Signal::PreSave { op, .. }
            | Signal::PostSave { op, .. }
            | Signal::PreDelete { op, .. }
            | Signal::PostDelete { op, .. }
            | Signal::Aborted { op, .. } => *op,
        }
    }

    pub fn instance(&self) -> &'a M {
        match self {
            Signal::PreSave { instance, .. }
            | Signal::PostSave { instance, .. }
            | Signal::PreDelete { instance, .. }
            | Signal::PostDelete { instance, .. }
            | Signal::Aborted { instance, .. } => *instance,
        }
    }
}

/// Callback connected to a signal. An error aborts the triggering operation.
pub type Receiver<M> = Arc<dyn Fn(&Signal<'_, M>) -> Result<()> + Send + Sync>;

/// Identifies a connected receiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReceiverId(pub u64);

struct Connected<M> {
    id: ReceiverId,
    kind: SignalKind,
    receiver: Receiver<M>,
}

/// Receiver registry for one table.
pub struct Signals<M> {
    receivers: RwLock<Vec<Connected<M>>>,
    next_id: AtomicU64,
}

impl<M> Signals<M> {
    pub fn new() -> Self {
        Self {
            receivers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Connect a receiver. Receivers run in connection order.
    pub fn connect(&self, kind: SignalKind, receiver: Receiver<M>) -> ReceiverId {
        let id = ReceiverId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.receivers.write().push(Connected { id, kind, receiver });
        id
    }

    /// Disconnect a receiver. Returns false if it was not connected.
    pub fn disconnect(&self, id: ReceiverId) -> bool {
        let mut receivers = self.receivers.write();
        let before = receivers.len();
        receivers.retain(|c| c.id != id);
        receivers.len() != before
    }

    /// Number of receivers connected for `kind`.
    pub fn receiver_count(&self, kind: SignalKind) -> usize {
        self.receivers
            .read()
            .iter()
            .filter(|c| c.kind == kind)
            .count()
    }

    /// Deliver a signal to every matching receiver, stopping at the first error.
    pub fn send(&self, signal: &Signal<'_, M>) -> Result<()> {
        // Receivers may connect or disconnect while running; don't hold the lock.
        let matching: Vec<Receiver<M>> = {
            let receivers = self.receivers.read();
            receivers
                .iter()
                .filter(|c| c.kind == signal.kind())
                .map(|c| Arc::clone(&c.receiver))
                .collect()
        };

        for receiver in matching {
            receiver(signal)?;
        }
        Ok(())
    }
}

impl<M> Default for Signals<M> {
    fn default() -> Self {
        Self::new()
    }
}
