//! In-memory record store.
//!
//! Tables hold rows of one [`Model`] type and emit lifecycle [`Signal`]s
//! around every save and delete. Writes may be grouped in a [`Transaction`];
//! post-save work registered through [`CommitScope::on_commit`] only runs once
//! the transaction commits.

mod model;
mod signals;
mod table;
mod transaction;

pub use model::Model;
pub use signals::{Receiver, ReceiverId, Signal, SignalKind, Signals};
pub use table::{Table, TableId};
pub use transaction::{CommitScope, Transaction, TransactionStatus};
