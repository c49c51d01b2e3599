//! Closure-scoped interactive transactions.
//!
//! A transaction is opened with `BEGIN`, handed to the caller's closure
//! as a [`Transaction`] handle, and resolved by the closure's outcome:
//! `Ok` commits, `Err` (or an explicit [`Transaction::rollback`]) rolls
//! back. The whole block runs under the transaction concurrency domain,
//! so blocks from different tasks never interleave their statements.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pglet_error::{PgletError, Result};
use tracing::debug;

use crate::results::{ExecSummary, QueryResult};
use crate::session::SessionInner;

/// Handle for issuing statements inside an open transaction block.
///
/// Cheap to clone; all clones refer to the same block. After the block
/// resolves (commit, rollback, or closure error) the handle is inert
/// and every statement fails with a lifecycle error.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<SessionInner>,
    finished: Arc<AtomicBool>,
}

impl Transaction {
    pub(crate) fn new(inner: Arc<SessionInner>) -> Self {
        Self {
            inner,
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.finished.load(Ordering::Acquire) {
            return Err(PgletError::lifecycle("run statement", "transaction closed"));
        }
        Ok(())
    }

    /// Run a statement inside the block and collect its rows.
    pub async fn query(&self, sql: &str) -> Result<QueryResult> {
        self.check_open()?;
        let outcome = self.inner.run_sql(sql, true).await?;
        Ok(QueryResult::from_outcome(&outcome))
    }

    /// Run a statement inside the block, keeping only the summary.
    pub async fn exec(&self, sql: &str) -> Result<ExecSummary> {
        self.check_open()?;
        let outcome = self.inner.run_sql(sql, true).await?;
        Ok(ExecSummary::from_outcome(&outcome))
    }

    /// Abort the block early. Statements after this fail; the enclosing
    /// closure should return promptly.
    pub async fn rollback(&self) -> Result<()> {
        self.check_open()?;
        self.finished.store(true, Ordering::Release);
        self.inner.run_sql("ROLLBACK", true).await?;
        debug!("transaction rolled back by caller");
        Ok(())
    }

    /// Resolve the block after the caller's closure returned.
    pub(crate) async fn resolve(&self, closure_failed: bool) -> Result<()> {
        if self.finished.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if closure_failed {
            // Rollback on the error path must not mask the closure's
            // own error; log and continue.
            if let Err(error) = self.inner.run_sql("ROLLBACK", false).await {
                debug!(%error, "rollback after failed transaction closure");
            }
            return Ok(());
        }
        self.inner.run_sql("COMMIT", true).await?;
        Ok(())
    }
}
