//! Transactions with an undo journal and commit callbacks.
//!
//! Writes made inside a transaction are applied to the table immediately and
//! journaled. Rolling back replays the journal in reverse; committing discards
//! it and runs the callbacks registered with [`CommitScope::on_commit`].

use crate::error::{BindingError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

type Undo = Box<dyn FnOnce() + Send>;
type Callback = Box<dyn FnOnce() -> Result<()> + Send>;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Transaction status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting writes.
    Active,
    /// Committed; callbacks have run.
    Committed,
    /// Rolled back; writes undone and callbacks discarded.
    RolledBack,
}

struct TransactionState {
    status: TransactionStatus,
    undo: Vec<Undo>,
    on_commit: Vec<Callback>,
}

/// An explicit transaction boundary.
pub struct Transaction {
    id: u64,
    state: Mutex<TransactionState>,
}

impl Transaction {
    /// Start a new transaction.
    pub fn begin() -> Self {
        let id = NEXT_TRANSACTION_ID.fetch_add(1, Ordering::SeqCst);
        debug!(transaction = id, "transaction started");
        Self {
            id,
            state: Mutex::new(TransactionState {
                status: TransactionStatus::Active,
                undo: Vec::new(),
                on_commit: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.state.lock().status
    }

    /// Number of callbacks waiting for commit.
    pub fn pending_callbacks(&self) -> usize {
        self.state.lock().on_commit.len()
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        match self.status() {
            TransactionStatus::Active => Ok(()),
            status => Err(BindingError::Transaction(format!(
                "transaction {} is {:?}",
                self.id, status
            ))),
        }
    }

    /// Journal an undo step for a write made inside this transaction.
    pub(crate) fn record_undo(&self, undo: Undo) -> Result<()> {
        let mut state = self.state.lock();
        if state.status != TransactionStatus::Active {
            return Err(BindingError::Transaction(format!(
                "transaction {} is {:?}",
                self.id, state.status
            )));
        }
        state.undo.push(undo);
        Ok(())
    }

    /// Queue a callback to run once this transaction commits.
    pub fn on_commit<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.status != TransactionStatus::Active {
            return Err(BindingError::Transaction(format!(
                "transaction {} is {:?}",
                self.id, state.status
            )));
        }
        state.on_commit.push(Box::new(callback));
        Ok(())
    }

    /// Commit and run the queued callbacks in registration order.
    ///
    /// The writes stay committed even if a callback fails; the first callback
    /// error is returned and the remaining callbacks are skipped.
    pub fn commit(self) -> Result<()> {
        let callbacks = {
            let mut state = self.state.lock();
            state.status = TransactionStatus::Committed;
            state.undo.clear();
            std::mem::take(&mut state.on_commit)
        };

        debug!(
            transaction = self.id,
            callbacks = callbacks.len(),
            "transaction committed"
        );

        let total = callbacks.len();
        for (index, callback) in callbacks.into_iter().enumerate() {
            if let Err(e) = callback() {
                warn!(
                    transaction = self.id,
                    error = %e,
                    skipped_callbacks = total - index - 1,
                    "commit callback failed"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Undo every write and discard the queued callbacks.
    pub fn rollback(self) {
        self.rollback_in_place();
    }

    fn rollback_in_place(&self) {
        let (undo, discarded) = {
            let mut state = self.state.lock();
            state.status = TransactionStatus::RolledBack;
            let discarded = state.on_commit.len();
            state.on_commit.clear();
            (std::mem::take(&mut state.undo), discarded)
        };

        for step in undo.into_iter().rev() {
            step();
        }

        debug!(
            transaction = self.id,
            discarded_callbacks = discarded,
            "transaction rolled back"
        );
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.status() == TransactionStatus::Active {
            warn!(transaction = self.id, "transaction dropped without commit, rolling back");
            self.rollback_in_place();
        }
    }
}

/// Where post-save work is deferred to.
pub enum CommitScope<'a> {
    /// No enclosing transaction: the write is already durable.
    Autocommit,
    /// Inside an explicit transaction.
    Atomic(&'a Transaction),
}

impl CommitScope<'_> {
    /// Run `callback` once the enclosing write is committed.
    ///
    /// Under autocommit the callback runs immediately and its result is
    /// returned. Inside a transaction it is queued and never runs if the
    /// transaction rolls back.
    pub fn on_commit<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        match self {
            CommitScope::Autocommit => callback(),
            CommitScope::Atomic(tx) => tx.on_commit(callback),
        }
    }
}
