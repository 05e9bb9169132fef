//! In-memory backends shared by the integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use omniquery::config::{DbAddress, PoolOptions};
use omniquery::decode::{ColumnMeta, RawCell};
use omniquery::error::{QueryError, QueryResult};
use omniquery::exec::{
    Connector, ExecResult, KvConnection, PreparedStatement, SearchTransport, SqlDatabase, SqlRows,
    SqlTransaction,
};
use omniquery::kv::KvReply;
use omniquery::search::SearchRequest;
use omniquery::sql::CompiledSql;
use omniquery::value::Value;

// =============================================================================
// Journal
// =============================================================================

/// Ordered log of everything a fake backend was asked to do
#[derive(Default)]
pub struct Journal {
    entries: Mutex<Vec<String>>,
}

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

// =============================================================================
// SQL
// =============================================================================

/// SQL backend. Rows whose first parameter is in `bad_ids` are rejected;
/// statements containing `fail_on` fail; `delay` slows every call down.
pub struct FakeSql {
    pub journal: Arc<Journal>,
    pub bad_ids: Vec<i64>,
    pub fail_on: Option<String>,
    pub fail_commit: bool,
    pub delay: Option<Duration>,
    pub rows: SqlRows,
}

impl FakeSql {
    pub fn new() -> Self {
        Self {
            journal: Arc::new(Journal::default()),
            bad_ids: Vec::new(),
            fail_on: None,
            fail_commit: false,
            delay: None,
            rows: SqlRows::default(),
        }
    }

    pub fn with_rows(mut self, columns: Vec<ColumnMeta>, rows: Vec<Vec<RawCell>>) -> Self {
        self.rows = SqlRows { columns, rows };
        self
    }

    async fn run(&self, scope: &str, statement: &CompiledSql) -> QueryResult<()> {
        self.journal.push(format!("{}: {}", scope, statement.sql));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.fail_on {
            Some(needle) if statement.sql.contains(needle.as_str()) => {
                Err(QueryError::internal(format!("rejected: {}", statement.sql)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl SqlDatabase for FakeSql {
    async fn query(&self, statement: &CompiledSql) -> QueryResult<SqlRows> {
        self.run("pool", statement).await?;
        Ok(self.rows.clone())
    }

    async fn execute(&self, statement: &CompiledSql) -> QueryResult<ExecResult> {
        self.run("pool", statement).await?;
        Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: None,
        })
    }

    async fn begin(&self) -> QueryResult<Box<dyn SqlTransaction>> {
        self.journal.push("begin");
        Ok(Box::new(FakeTx {
            journal: self.journal.clone(),
            bad_ids: self.bad_ids.clone(),
            fail_on: self.fail_on.clone(),
            fail_commit: self.fail_commit,
            rows: self.rows.clone(),
        }))
    }

    async fn close(&self) -> QueryResult<()> {
        self.journal.push("close");
        Ok(())
    }
}

pub struct FakeTx {
    journal: Arc<Journal>,
    bad_ids: Vec<i64>,
    fail_on: Option<String>,
    fail_commit: bool,
    rows: SqlRows,
}

impl FakeTx {
    fn check(&self, statement: &CompiledSql) -> QueryResult<()> {
        self.journal.push(format!("tx: {}", statement.sql));
        match &self.fail_on {
            Some(needle) if statement.sql.contains(needle.as_str()) => {
                Err(QueryError::internal(format!("rejected: {}", statement.sql)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl SqlTransaction for FakeTx {
    async fn query(&mut self, statement: &CompiledSql) -> QueryResult<SqlRows> {
        self.check(statement)?;
        Ok(self.rows.clone())
    }

    async fn execute(&mut self, statement: &CompiledSql) -> QueryResult<ExecResult> {
        self.check(statement)?;
        Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: None,
        })
    }

    async fn prepare(&mut self, sql: &str) -> QueryResult<Box<dyn PreparedStatement>> {
        self.journal.push(format!("prepare: {}", sql));
        Ok(Box::new(FakeStmt {
            journal: self.journal.clone(),
            bad_ids: self.bad_ids.clone(),
        }))
    }

    async fn commit(&mut self) -> QueryResult<()> {
        self.journal.push("commit");
        if self.fail_commit {
            return Err(QueryError::internal("commit refused"));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> QueryResult<()> {
        self.journal.push("rollback");
        Ok(())
    }
}

pub struct FakeStmt {
    journal: Arc<Journal>,
    bad_ids: Vec<i64>,
}

#[async_trait]
impl PreparedStatement for FakeStmt {
    async fn execute(&mut self, params: &[Value]) -> QueryResult<ExecResult> {
        let id = params.first().and_then(Value::as_i64).unwrap_or(-1);
        if self.bad_ids.contains(&id) {
            self.journal.push(format!("row {} rejected", id));
            return Err(QueryError::internal(format!("row {} rejected", id)));
        }
        self.journal.push(format!("row {}", id));
        Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: None,
        })
    }
}

// =============================================================================
// Search
// =============================================================================

/// Search transport answering every call with `body`
pub struct FakeSearch {
    pub requests: Mutex<Vec<SearchRequest>>,
    pub body: serde_json::Value,
}

impl FakeSearch {
    pub fn answering(body: serde_json::Value) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            body,
        }
    }
}

#[async_trait]
impl SearchTransport for FakeSearch {
    async fn send(&self, request: &SearchRequest) -> QueryResult<serde_json::Value> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.body.clone())
    }
}

// =============================================================================
// Key-value
// =============================================================================

/// Key-value client answering every call with `reply`
pub struct FakeKv {
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
    pub reply: KvReply,
}

impl FakeKv {
    pub fn answering(reply: KvReply) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reply,
        }
    }
}

#[async_trait]
impl KvConnection for FakeKv {
    async fn call(&self, command: &str, args: &[String]) -> QueryResult<KvReply> {
        self.calls
            .lock()
            .unwrap()
            .push((command.to_string(), args.to_vec()));
        Ok(self.reply.clone())
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Connector handing out the fakes. `sql_at` pins a backend to one DSN;
/// every other SQL address gets `sql`.
#[derive(Default)]
pub struct FakeConnector {
    pub sql: Option<Arc<FakeSql>>,
    pub sql_at: Vec<(String, Arc<FakeSql>)>,
    pub search: Option<Arc<FakeSearch>>,
    pub kv: Option<Arc<FakeKv>>,
    pub dials: Mutex<usize>,
}

impl FakeConnector {
    fn dialed(&self) {
        *self.dials.lock().unwrap() += 1;
    }
}

fn refused(addr: &DbAddress) -> QueryError {
    QueryError::internal(format!("nothing listening at {}", addr.dsn))
}

#[async_trait]
impl Connector for FakeConnector {
    async fn sql(&self, addr: &DbAddress, _: &PoolOptions) -> QueryResult<Arc<dyn SqlDatabase>> {
        self.dialed();
        if let Some((_, db)) = self.sql_at.iter().find(|(dsn, _)| *dsn == addr.dsn) {
            return Ok(db.clone());
        }
        match &self.sql {
            Some(db) => Ok(db.clone()),
            None => Err(refused(addr)),
        }
    }

    async fn search(
        &self,
        addr: &DbAddress,
        _: &PoolOptions,
    ) -> QueryResult<Arc<dyn SearchTransport>> {
        self.dialed();
        match &self.search {
            Some(t) => Ok(t.clone()),
            None => Err(refused(addr)),
        }
    }

    async fn kv(&self, addr: &DbAddress, _: &PoolOptions) -> QueryResult<Arc<dyn KvConnection>> {
        self.dialed();
        match &self.kv {
            Some(c) => Ok(c.clone()),
            None => Err(refused(addr)),
        }
    }
}
