//! Retried, all-or-nothing operations.
//!
//! An [`AtomicOp`] wraps a body that reads through and writes into a
//! [`TxnBuilder`]. Running the operation executes the body against a fresh
//! builder and commits it; when a concurrent writer invalidated one of the
//! reads, the whole body runs again after an exponential backoff.
//!
//! ```text
//! attempt 1: body(txn) ─► commit ─► Conflict ─► sleep 5ms
//! attempt 2: body(txn) ─► commit ─► Conflict ─► sleep 10ms
//! attempt 3: body(txn) ─► commit ─► Committed ─► Ok(result)
//! ```
//!
//! An error returned by the body aborts the operation without writing
//! anything and is returned as is; only conflicts are retried.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use streamdef_config::RetryConfig;
use streamdef_store::KvStore;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::txn::{CommitOutcome, TxnBuilder};
use crate::error::{RepositoryError, RepositoryResult};

/// Bounds of the conflict retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: config.initial_backoff(),
            max_backoff: config.max_backoff(),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based), doubling up to `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

type Body<R> = Arc<dyn Fn(TxnBuilder) -> BoxFuture<'static, RepositoryResult<R>> + Send + Sync>;

/// A composable unit of work executed in one store transaction.
pub struct AtomicOp<R> {
    name: &'static str,
    store: Arc<dyn KvStore>,
    retry: RetryPolicy,
    body: Body<R>,
}

impl<R> Clone for AtomicOp<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            store: Arc::clone(&self.store),
            retry: self.retry,
            body: Arc::clone(&self.body),
        }
    }
}

impl<R: Send + 'static> AtomicOp<R> {
    /// Builds an operation from a body. The body runs once per attempt.
    pub fn new<F, Fut>(name: &'static str, store: Arc<dyn KvStore>, retry: RetryPolicy, body: F) -> Self
    where
        F: Fn(TxnBuilder) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RepositoryResult<R>> + Send + 'static,
    {
        Self { name, store, retry, body: Arc::new(move |txn| body(txn).boxed()) }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Transforms the result without touching the transaction.
    pub fn map<U, F>(self, f: F) -> AtomicOp<U>
    where
        U: Send + 'static,
        F: Fn(R) -> U + Send + Sync + 'static,
    {
        let body = self.body;
        let f = Arc::new(f);
        AtomicOp {
            name: self.name,
            store: self.store,
            retry: self.retry,
            body: Arc::new(move |txn| {
                let body = Arc::clone(&body);
                let f = Arc::clone(&f);
                async move { body(txn).await.map(|r| f(r)) }.boxed()
            }),
        }
    }

    /// Runs `self` and then `other` in the same transaction.
    ///
    /// Either both commit or neither does. `other` does not see the writes
    /// buffered by `self`.
    pub fn merge<U: Send + 'static>(self, other: AtomicOp<U>) -> AtomicOp<(R, U)> {
        let first = self.body;
        let second = other.body;
        AtomicOp {
            name: self.name,
            store: self.store,
            retry: self.retry,
            body: Arc::new(move |txn| {
                let first = Arc::clone(&first);
                let second = Arc::clone(&second);
                async move {
                    let a = first(txn.clone()).await?;
                    let b = second(txn).await?;
                    Ok((a, b))
                }
                .boxed()
            }),
        }
    }

    /// Executes the body inside a transaction owned by a parent operation.
    ///
    /// Nothing is committed; the parent commits or retries as a whole.
    pub async fn apply(&self, txn: &TxnBuilder) -> RepositoryResult<R> {
        (self.body)(txn.clone()).await
    }

    /// Executes and commits, retrying on conflicts.
    pub async fn run(&self) -> RepositoryResult<R> {
        self.execute(None).await
    }

    /// Like [`run`](Self::run), but gives up with [`RepositoryError::Cancelled`]
    /// once `shutdown` changes or its sender is dropped.
    ///
    /// Cancellation is observed before each attempt, while the body runs and
    /// during backoff. A commit that was already submitted is not interrupted.
    pub async fn run_with_shutdown(
        &self,
        shutdown: &mut watch::Receiver<()>,
    ) -> RepositoryResult<R> {
        self.execute(Some(shutdown)).await
    }

    /// Runs the operation and also stores the result into `target`.
    pub async fn run_into(&self, target: &mut R) -> RepositoryResult<R>
    where
        R: Clone,
    {
        let result = self.run().await?;
        *target = result.clone();
        Ok(result)
    }

    async fn execute(
        &self,
        mut shutdown: Option<&mut watch::Receiver<()>>,
    ) -> RepositoryResult<R> {
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if shutdown.as_deref().is_some_and(is_cancelled) {
                return Err(RepositoryError::Cancelled);
            }

            let txn = TxnBuilder::new(Arc::clone(&self.store));
            let body = (self.body)(txn.clone());
            let result = match shutdown.as_deref_mut() {
                Some(rx) => tokio::select! {
                    result = body => result?,
                    _ = rx.changed() => return Err(RepositoryError::Cancelled),
                },
                None => body.await?,
            };

            match txn.commit().await? {
                CommitOutcome::Committed(revision) => {
                    debug!(op = self.name, attempt, revision = %revision, "Atomic operation committed");
                    return Ok(result);
                },
                CommitOutcome::ReadOnly => return Ok(result),
                CommitOutcome::Conflict => {
                    debug!(op = self.name, attempt, "Atomic operation conflicted");
                    if attempt == max_attempts {
                        break;
                    }
                    let delay = self.retry.backoff(attempt);
                    match shutdown.as_deref_mut() {
                        Some(rx) => tokio::select! {
                            _ = tokio::time::sleep(delay) => {},
                            _ = rx.changed() => return Err(RepositoryError::Cancelled),
                        },
                        None => tokio::time::sleep(delay).await,
                    }
                },
            }
        }

        warn!(op = self.name, attempts = max_attempts, "Atomic operation gave up after repeated conflicts");
        Err(RepositoryError::Conflict { attempts: max_attempts })
    }
}

fn is_cancelled(rx: &watch::Receiver<()>) -> bool {
    rx.has_changed().unwrap_or(true)
}
