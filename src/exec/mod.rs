//! Execution and transaction coordination
//!
//! The [`Engine`] owns the connection pools and a [`Connector`] that dials
//! backends on a pool miss. Drivers are supplied from outside through the
//! traits in this module.
//!
//! # Timeouts
//!
//! Reads use the destination's read timeout and writes its write timeout.
//! A timeout of zero or less disables the deadline. An expired call yields
//! a backend error of kind `Timeout` and no partial result.
//!
//! # Transactions
//!
//! A [`TransactionContext`] passed to [`Engine::query`] pins every SQL call
//! for the same DSN to one transaction, opened lazily.
//! [`TransactionContext::finish`] commits or rolls back all of them.

mod backend;
mod batch;
mod deadline;
mod engine;
mod pool;
mod transaction;

pub use backend::{
    Connector, ExecResult, KvConnection, PreparedStatement, SearchTransport, SqlDatabase,
    SqlRows, SqlTransaction,
};
pub use batch::batch_insert;
pub use deadline::with_deadline;
pub use engine::Engine;
pub use pool::{PoolRegistry, Pools, Retire};
pub use transaction::{TransactionContext, TxSlot};
