//! Backend seams
//!
//! Drivers live outside this crate. They plug in by implementing these
//! traits; a [`Connector`] dials them on a pool miss.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{DbAddress, PoolOptions};
use crate::decode::{ColumnMeta, RawCell};
use crate::error::{QueryError, QueryResult};
use crate::kv::KvReply;
use crate::search::SearchRequest;
use crate::sql::CompiledSql;
use crate::value::Value;

/// Rows as reported by a SQL driver, before type mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlRows {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<RawCell>>,
}

/// Outcome of a SQL write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// A pooled SQL database handle
#[async_trait]
pub trait SqlDatabase: Send + Sync {
    async fn query(&self, statement: &CompiledSql) -> QueryResult<SqlRows>;

    async fn execute(&self, statement: &CompiledSql) -> QueryResult<ExecResult>;

    async fn begin(&self) -> QueryResult<Box<dyn SqlTransaction>>;

    async fn close(&self) -> QueryResult<()> {
        Ok(())
    }
}

/// An open SQL transaction. Exclusively owned by one context.
#[async_trait]
pub trait SqlTransaction: Send {
    async fn query(&mut self, statement: &CompiledSql) -> QueryResult<SqlRows>;

    async fn execute(&mut self, statement: &CompiledSql) -> QueryResult<ExecResult>;

    /// Prepare a statement bound to this transaction
    async fn prepare(&mut self, sql: &str) -> QueryResult<Box<dyn PreparedStatement>>;

    async fn commit(&mut self) -> QueryResult<()>;

    async fn rollback(&mut self) -> QueryResult<()>;
}

#[async_trait]
pub trait PreparedStatement: Send {
    async fn execute(&mut self, params: &[Value]) -> QueryResult<ExecResult>;
}

/// HTTP transport to a search engine. Returns the decoded JSON body for any
/// status the engine answered with; the body carries its own error object.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn send(&self, request: &SearchRequest) -> QueryResult<serde_json::Value>;

    async fn close(&self) -> QueryResult<()> {
        Ok(())
    }
}

/// A pooled key-value client
#[async_trait]
pub trait KvConnection: Send + Sync {
    /// Run `command` with `args` (command name excluded)
    async fn call(&self, command: &str, args: &[String]) -> QueryResult<KvReply>;

    async fn close(&self) -> QueryResult<()> {
        Ok(())
    }
}

fn unsupported(addr: &DbAddress) -> QueryError {
    QueryError::invalid_request(format!(
        "connector cannot dial {} destination `{}`",
        addr.kind, addr.name
    ))
}

/// Dials backends on a pool miss. Defaults refuse, so a connector only
/// implements the families it serves.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn sql(&self, addr: &DbAddress, _pool: &PoolOptions) -> QueryResult<Arc<dyn SqlDatabase>> {
        Err(unsupported(addr))
    }

    async fn search(
        &self,
        addr: &DbAddress,
        _pool: &PoolOptions,
    ) -> QueryResult<Arc<dyn SearchTransport>> {
        Err(unsupported(addr))
    }

    async fn kv(&self, addr: &DbAddress, _pool: &PoolOptions) -> QueryResult<Arc<dyn KvConnection>> {
        Err(unsupported(addr))
    }
}
