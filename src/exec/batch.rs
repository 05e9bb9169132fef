//! Prepared bulk insert for ClickHouse
//!
//! ClickHouse accepts inserts through a prepared statement executed once per
//! row inside a transaction. In batch mode a failing row does not abort the
//! insert: failures are recorded per row index and the surviving rows are
//! inserted again in a fresh transaction.

use std::collections::BTreeMap;

use super::backend::{SqlDatabase, SqlTransaction};
use crate::error::{QueryError, QueryResult};
use crate::response::BatchInsertOutcome;
use crate::sql::BatchInsertPlan;
use crate::value::Value;

/// Per-row failures of one pass
type RowFailures = BTreeMap<usize, QueryError>;

/// Run `rows` through one prepared statement in one transaction.
///
/// With `stop_on_error` the first failing row aborts the pass. Otherwise all
/// rows are attempted and the pass commits only if none failed.
async fn insert_pass(
    db: &dyn SqlDatabase,
    sql: &str,
    rows: &[(usize, &[Value])],
    stop_on_error: bool,
) -> QueryResult<RowFailures> {
    let mut tx = db.begin().await?;
    let result = execute_rows(tx.as_mut(), sql, rows, stop_on_error).await;

    match result {
        Ok(failures) if failures.is_empty() => {
            if let Err(error) = tx.commit().await {
                let rollback = tx.rollback().await.err().map(Box::new);
                return Err(QueryError::Commit {
                    error: Box::new(error),
                    rollback,
                });
            }
            Ok(failures)
        }
        Ok(failures) => {
            rollback_quietly(tx.as_mut()).await;
            Ok(failures)
        }
        Err(error) => match tx.rollback().await {
            Ok(()) => Err(error),
            Err(rollback) => Err(QueryError::Rollback {
                error: Box::new(rollback),
                cause: Box::new(error),
            }),
        },
    }
}

async fn execute_rows(
    tx: &mut dyn SqlTransaction,
    sql: &str,
    rows: &[(usize, &[Value])],
    stop_on_error: bool,
) -> QueryResult<RowFailures> {
    let mut stmt = tx.prepare(sql).await?;
    let mut failures = RowFailures::new();
    for (index, row) in rows {
        if let Err(error) = stmt.execute(row).await {
            if stop_on_error {
                return Err(error);
            }
            tracing::debug!(row = *index, error = %error, "batch insert row failed");
            failures.insert(*index, error);
        }
    }
    Ok(failures)
}

async fn rollback_quietly(tx: &mut dyn SqlTransaction) {
    if let Err(error) = tx.rollback().await {
        tracing::warn!(error = %error, "rollback after failed batch pass failed");
    }
}

/// Insert `plan.rows`, recording per-row failures in batch mode.
///
/// Outcomes in batch mode:
/// - no row failed: committed in the first pass
/// - some rows failed: survivors retried in a second transaction; if the
///   retry fails every row is reported failed
/// - every row failed: no retry
///
/// Outside batch mode the first failure is returned as the error.
pub async fn batch_insert(db: &dyn SqlDatabase, plan: &BatchInsertPlan) -> QueryResult<BatchInsertOutcome> {
    let indexed: Vec<(usize, &[Value])> = plan
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| (i, row.as_slice()))
        .collect();
    let total = indexed.len() as u64;

    if !plan.batch {
        insert_pass(db, &plan.sql, &indexed, true).await?;
        return Ok(BatchInsertOutcome {
            rows_affected: total,
            ..Default::default()
        });
    }

    let mut failed = insert_pass(db, &plan.sql, &indexed, false).await?;
    if failed.is_empty() {
        return Ok(BatchInsertOutcome {
            rows_affected: total,
            ..Default::default()
        });
    }
    if failed.len() == indexed.len() {
        return Ok(BatchInsertOutcome {
            failed,
            ..Default::default()
        });
    }

    let survivors: Vec<(usize, &[Value])> = indexed
        .iter()
        .filter(|(i, _)| !failed.contains_key(i))
        .copied()
        .collect();
    tracing::info!(
        failed = failed.len(),
        retry = survivors.len(),
        "retrying batch insert without failed rows"
    );

    let retry_error = match insert_pass(db, &plan.sql, &survivors, true).await {
        Ok(_) => {
            return Ok(BatchInsertOutcome {
                rows_affected: survivors.len() as u64,
                retried_ok: true,
                failed,
            });
        }
        Err(error) => error,
    };

    for (index, _) in &survivors {
        failed.insert(*index, retry_error.clone());
    }
    Ok(BatchInsertOutcome {
        failed,
        ..Default::default()
    })
}
