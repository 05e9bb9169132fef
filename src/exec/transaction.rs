//! Transaction context
//!
//! A context owns at most one SQL transaction per DSN. The transaction is
//! opened on first use and every later call against the same DSN reuses it.
//! [`TransactionContext::finish`] ends all of them together: commit when the
//! unit of work succeeded, rollback when it failed.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use super::backend::SqlTransaction;
use crate::error::{QueryError, QueryResult};

/// Shared slot holding one open transaction; `None` once finished
pub type TxSlot = Arc<Mutex<Option<Box<dyn SqlTransaction>>>>;

pub struct TransactionContext {
    id: Uuid,
    sql: Mutex<BTreeMap<String, TxSlot>>,
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            sql: Mutex::new(BTreeMap::new()),
        }
    }

    /// Correlation id for logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of open transactions
    pub async fn open_count(&self) -> usize {
        self.sql.lock().await.len()
    }

    /// The transaction for `dsn`, opened with `begin` on first use.
    pub async fn sql_tx<F, Fut>(&self, dsn: &str, begin: F) -> QueryResult<TxSlot>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QueryResult<Box<dyn SqlTransaction>>>,
    {
        let mut open = self.sql.lock().await;
        if let Some(slot) = open.get(dsn) {
            return Ok(slot.clone());
        }
        let tx = begin().await?;
        tracing::debug!(tx_id = %self.id, dsn, "transaction opened");
        let slot: TxSlot = Arc::new(Mutex::new(Some(tx)));
        open.insert(dsn.to_string(), slot.clone());
        Ok(slot)
    }

    /// End every open transaction according to `outcome` and return it.
    ///
    /// On success each transaction is committed; a failed commit is rolled
    /// back and reported as [`QueryError::Commit`] with the rollback error
    /// attached if that failed too. On failure each transaction is rolled
    /// back; a failed rollback is reported as [`QueryError::Rollback`]
    /// carrying the original error as its cause.
    pub async fn finish<T>(&self, outcome: QueryResult<T>) -> QueryResult<T> {
        let slots: Vec<(String, TxSlot)> = {
            let mut open = self.sql.lock().await;
            std::mem::take(&mut *open).into_iter().collect()
        };

        match outcome {
            Ok(value) => {
                let mut first_failure = None;
                for (dsn, slot) in slots {
                    let Some(mut tx) = slot.lock().await.take() else {
                        continue;
                    };
                    if first_failure.is_some() {
                        // Something already failed; do not commit the rest
                        if let Err(e) = tx.rollback().await {
                            tracing::error!(tx_id = %self.id, dsn = %dsn, error = %e, "rollback failed");
                        }
                        continue;
                    }
                    if let Err(error) = tx.commit().await {
                        let rollback = tx.rollback().await.err().map(Box::new);
                        tracing::error!(tx_id = %self.id, dsn = %dsn, error = %error, "commit failed");
                        first_failure = Some(QueryError::Commit {
                            error: Box::new(error),
                            rollback,
                        });
                    }
                }
                match first_failure {
                    Some(err) => Err(err),
                    None => Ok(value),
                }
            }
            Err(cause) => {
                let mut rollback_failure = None;
                for (dsn, slot) in slots {
                    let Some(mut tx) = slot.lock().await.take() else {
                        continue;
                    };
                    if let Err(error) = tx.rollback().await {
                        tracing::error!(tx_id = %self.id, dsn = %dsn, error = %error, "rollback failed");
                        rollback_failure.get_or_insert(error);
                    }
                }
                match rollback_failure {
                    Some(error) => Err(QueryError::Rollback {
                        error: Box::new(error),
                        cause: Box::new(cause),
                    }),
                    None => Err(cause),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::backend::{ExecResult, PreparedStatement, SqlRows};
    use crate::sql::CompiledSql;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Journal {
        events: StdMutex<Vec<&'static str>>,
    }

    impl Journal {
        fn push(&self, event: &'static str) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    struct FakeTx {
        journal: Arc<Journal>,
        fail_commit: bool,
        fail_rollback: bool,
    }

    #[async_trait]
    impl SqlTransaction for FakeTx {
        async fn query(&mut self, _: &CompiledSql) -> QueryResult<SqlRows> {
            Ok(SqlRows::default())
        }

        async fn execute(&mut self, _: &CompiledSql) -> QueryResult<ExecResult> {
            Ok(ExecResult::default())
        }

        async fn prepare(&mut self, _: &str) -> QueryResult<Box<dyn PreparedStatement>> {
            Err(QueryError::internal("not prepared"))
        }

        async fn commit(&mut self) -> QueryResult<()> {
            self.journal.push("commit");
            if self.fail_commit {
                Err(QueryError::internal("commit refused"))
            } else {
                Ok(())
            }
        }

        async fn rollback(&mut self) -> QueryResult<()> {
            self.journal.push("rollback");
            if self.fail_rollback {
                Err(QueryError::internal("rollback refused"))
            } else {
                Ok(())
            }
        }
    }

    fn opener(
        journal: &Arc<Journal>,
        fail_commit: bool,
        fail_rollback: bool,
    ) -> impl FnOnce() -> std::future::Ready<QueryResult<Box<dyn SqlTransaction>>> {
        let journal = journal.clone();
        move || {
            journal.push("begin");
            std::future::ready(Ok(Box::new(FakeTx {
                journal,
                fail_commit,
                fail_rollback,
            }) as Box<dyn SqlTransaction>))
        }
    }

    #[tokio::test]
    async fn test_reuses_transaction_per_dsn() {
        let journal = Arc::new(Journal::default());
        let ctx = TransactionContext::new();

        let a = ctx.sql_tx("dsn", opener(&journal, false, false)).await.unwrap();
        let b = ctx.sql_tx("dsn", opener(&journal, false, false)).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(ctx.open_count().await, 1);

        ctx.finish(Ok(())).await.unwrap();
        assert_eq!(journal.events(), vec!["begin", "commit"]);
        assert_eq!(ctx.open_count().await, 0);
    }

    #[tokio::test]
    async fn test_failure_rolls_back() {
        let journal = Arc::new(Journal::default());
        let ctx = TransactionContext::new();
        ctx.sql_tx("dsn", opener(&journal, false, false)).await.unwrap();

        let err = ctx
            .finish::<()>(Err(QueryError::invalid_value("bad")))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidValue(_)));
        assert_eq!(journal.events(), vec!["begin", "rollback"]);
    }

    #[tokio::test]
    async fn test_rollback_failure_keeps_both_causes() {
        let journal = Arc::new(Journal::default());
        let ctx = TransactionContext::new();
        ctx.sql_tx("dsn", opener(&journal, false, true)).await.unwrap();

        let err = ctx
            .finish::<()>(Err(QueryError::invalid_value("bad")))
            .await
            .unwrap_err();
        match err {
            QueryError::Rollback { error, cause } => {
                assert!(error.to_string().contains("rollback refused"));
                assert!(matches!(*cause, QueryError::InvalidValue(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_commit_failure_rolls_back() {
        let journal = Arc::new(Journal::default());
        let ctx = TransactionContext::new();
        ctx.sql_tx("dsn", opener(&journal, true, false)).await.unwrap();

        let err = ctx.finish(Ok(1)).await.unwrap_err();
        match err {
            QueryError::Commit { error, rollback } => {
                assert!(error.to_string().contains("commit refused"));
                assert!(rollback.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(journal.events(), vec!["begin", "commit", "rollback"]);
    }

    #[tokio::test]
    async fn test_commit_and_rollback_both_fail() {
        let journal = Arc::new(Journal::default());
        let ctx = TransactionContext::new();
        ctx.sql_tx("dsn", opener(&journal, true, true)).await.unwrap();

        match ctx.finish(Ok(())).await.unwrap_err() {
            QueryError::Commit { rollback, .. } => assert!(rollback.is_some()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
