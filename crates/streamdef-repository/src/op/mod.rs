//! Atomic operation engine.
//!
//! Repository methods return an [`AtomicOp`] instead of executing directly,
//! so callers decide whether to run it on its own, merge it with other
//! operations or apply it inside a transaction they already own.

mod atomic;
mod txn;

pub use atomic::{AtomicOp, RetryPolicy};
pub use txn::{CommitOutcome, TxnBuilder};
