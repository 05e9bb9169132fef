//! Request dispatch
//!
//! [`Engine::query`] compiles a request for the destination's backend family,
//! fetches (or dials) the pooled handle, runs the call under the
//! destination's deadline and decodes the reply into a [`Response`].

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures_util::future::join_all;

use super::backend::{Connector, KvConnection, SearchTransport, SqlDatabase, SqlRows};
use super::batch::batch_insert;
use super::deadline::with_deadline;
use super::pool::Pools;
use super::transaction::{TransactionContext, TxSlot};
use crate::compile::{compile, Plan};
use crate::config::{BackendKind, DbAddress, PoolOptions};
use crate::decode::{RawCell, RowDecoder};
use crate::error::{QueryError, QueryResult};
use crate::kv::{decode_reply, KvCommand};
use crate::observability::QueryLog;
use crate::request::Request;
use crate::response::{Detail, ModResult, QueryOutput, Response};
use crate::search::{
    decode_bulk, decode_by_query, decode_doc_write, decode_search, SearchOp, SearchPlan,
};
use crate::sql::{CompiledSql, SqlOp, SqlPlan};
use crate::value::{Record, Value};

static GLOBAL: OnceLock<Engine> = OnceLock::new();

/// Compiles, executes and decodes requests against pooled backends
pub struct Engine {
    connector: Arc<dyn Connector>,
    pools: Pools,
    pool_options: Option<PoolOptions>,
}

impl Engine {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            pools: Pools::default(),
            pool_options: None,
        }
    }

    /// Pool sizing for every destination, instead of the per-backend defaults
    pub fn with_pool_options(mut self, options: PoolOptions) -> Self {
        self.pool_options = Some(options);
        self
    }

    /// Process-wide engine, created with `connector` on first use. Later
    /// calls return the existing engine and ignore their argument.
    pub fn global<F>(connector: F) -> &'static Engine
    where
        F: FnOnce() -> Arc<dyn Connector>,
    {
        GLOBAL.get_or_init(|| Engine::new(connector()))
    }

    /// The process-wide engine, if one was created
    pub fn try_global() -> Option<&'static Engine> {
        GLOBAL.get()
    }

    pub fn pools(&self) -> &Pools {
        &self.pools
    }

    fn options_for(&self, kind: BackendKind) -> PoolOptions {
        self.pool_options
            .clone()
            .unwrap_or_else(|| PoolOptions::for_backend(kind))
    }

    /// Drain every pool and close its handles. Close failures are logged and
    /// the first one is returned.
    pub async fn shutdown(&self) -> QueryResult<()> {
        let sql = self.pools.sql.drain()?;
        let search = self.pools.search.drain()?;
        let kv = self.pools.kv.drain()?;
        tracing::info!(
            sql = sql.len(),
            search = search.len(),
            kv = kv.len(),
            "closing pools"
        );

        let mut results = join_all(sql.iter().map(|db| db.close())).await;
        results.extend(join_all(search.iter().map(|t| t.close())).await);
        results.extend(join_all(kv.iter().map(|c| c.close())).await);

        let mut first = None;
        for error in results.into_iter().filter_map(Result::err) {
            tracing::warn!(error = %error, "pool close failed");
            first.get_or_insert(error);
        }
        match first {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Run one request against `addr`.
    ///
    /// Grammar errors are returned before any connection is made. `tx` only
    /// applies to SQL destinations; ClickHouse bulk inserts always run in
    /// their own transactions.
    pub async fn query(
        &self,
        request: &Request,
        addr: &DbAddress,
        tx: Option<&TransactionContext>,
    ) -> QueryResult<Response> {
        let plan = compile(request, addr)?;
        let deadline = addr.timeout_for(plan.is_write());
        let target = request.table().unwrap_or(request.key.as_str());
        let log = QueryLog::start(addr, target, plan.describe(), tx.map(|t| t.id()));

        let result = self.dispatch(plan, deadline, request, addr, tx).await;
        log.finish(result)
    }

    async fn dispatch(
        &self,
        plan: Plan,
        deadline: Option<Duration>,
        request: &Request,
        addr: &DbAddress,
        tx: Option<&TransactionContext>,
    ) -> QueryResult<Response> {
        let backend = addr.kind.as_str();
        match plan {
            Plan::Sql(plan) => {
                let db = self.sql_pool(addr).await?;
                with_deadline(backend, deadline, run_sql(db, plan, request, addr, tx)).await
            }
            Plan::Search(plan) => {
                let transport = self.search_pool(addr).await?;
                with_deadline(backend, deadline, run_search(transport, plan)).await
            }
            Plan::Kv(cmd) => {
                let conn = self.kv_pool(addr).await?;
                with_deadline(backend, deadline, run_kv(conn, cmd)).await
            }
        }
    }

    async fn sql_pool(&self, addr: &DbAddress) -> QueryResult<Arc<dyn SqlDatabase>> {
        let options = self.options_for(addr.kind);
        self.pools
            .sql
            .get_or_connect(&addr.dsn, || self.connector.sql(addr, &options))
            .await
    }

    async fn search_pool(&self, addr: &DbAddress) -> QueryResult<Arc<dyn SearchTransport>> {
        let options = self.options_for(addr.kind);
        self.pools
            .search
            .get_or_connect(&addr.dsn, || self.connector.search(addr, &options))
            .await
    }

    async fn kv_pool(&self, addr: &DbAddress) -> QueryResult<Arc<dyn KvConnection>> {
        let options = self.options_for(addr.kind);
        self.pools
            .kv
            .get_or_connect(&addr.dsn, || self.connector.kv(addr, &options))
            .await
    }
}

/// Where SQL statements run: straight on the pool, or in the context's
/// transaction for this DSN
enum SqlRunner {
    Pool(Arc<dyn SqlDatabase>),
    Tx(TxSlot),
}

fn finished_tx() -> QueryError {
    QueryError::internal("transaction already finished")
}

impl SqlRunner {
    async fn open(
        db: Arc<dyn SqlDatabase>,
        addr: &DbAddress,
        tx: Option<&TransactionContext>,
    ) -> QueryResult<Self> {
        match tx {
            Some(ctx) => {
                let slot = ctx
                    .sql_tx(&addr.dsn, move || async move { db.begin().await })
                    .await?;
                Ok(SqlRunner::Tx(slot))
            }
            None => Ok(SqlRunner::Pool(db)),
        }
    }

    async fn query(&self, statement: &CompiledSql) -> QueryResult<SqlRows> {
        match self {
            SqlRunner::Pool(db) => db.query(statement).await,
            SqlRunner::Tx(slot) => {
                let mut guard = slot.lock().await;
                let tx = guard.as_mut().ok_or_else(finished_tx)?;
                tx.query(statement).await
            }
        }
    }

    async fn execute(&self, statement: &CompiledSql) -> QueryResult<ModResult> {
        let result = match self {
            SqlRunner::Pool(db) => db.execute(statement).await?,
            SqlRunner::Tx(slot) => {
                let mut guard = slot.lock().await;
                let tx = guard.as_mut().ok_or_else(finished_tx)?;
                tx.execute(statement).await?
            }
        };
        Ok(ModResult {
            id: result.last_insert_id.map(Value::Int),
            rows_affected: result.rows_affected,
            ..Default::default()
        })
    }
}

async fn run_sql(
    db: Arc<dyn SqlDatabase>,
    plan: SqlPlan,
    request: &Request,
    addr: &DbAddress,
    tx: Option<&TransactionContext>,
) -> QueryResult<Response> {
    if let SqlPlan::BatchInsert(batch) = &plan {
        let outcome = batch_insert(db.as_ref(), batch).await?;
        return Ok(Response::new(QueryOutput::BatchInsert(outcome)));
    }

    let runner = SqlRunner::open(db, addr, tx).await?;
    match plan {
        SqlPlan::Exec { statement, .. } => {
            let result = runner.execute(&statement).await?;
            Ok(Response::new(QueryOutput::Modified(result)))
        }
        SqlPlan::Count { statement } => {
            let rows = runner.query(&statement).await?;
            Ok(Response::new(QueryOutput::Count(count_of(&rows)?)))
        }
        SqlPlan::Query { op, statement, count } => {
            // COUNT first so an empty page still reports the total
            let total = match &count {
                Some(count) => Some(count_of(&runner.query(count).await?)?),
                None => None,
            };
            let records = decode_rows(addr.kind, runner.query(&statement).await?)?;

            if op == SqlOp::Find {
                return Ok(match records.into_iter().next() {
                    Some(record) => Response::new(QueryOutput::Record(record)),
                    None => Response::nil(),
                });
            }
            let response = Response::new(QueryOutput::Records(records));
            Ok(match total {
                Some(total) => response.with_detail(Detail::paged(request.page, request.size, total)),
                None => response,
            })
        }
        SqlPlan::BatchInsert(_) => Err(QueryError::internal("batch insert reached row runner")),
    }
}

fn decode_rows(kind: BackendKind, rows: SqlRows) -> QueryResult<Vec<Record>> {
    let decoder = RowDecoder::new(kind, &rows.columns);
    rows.rows.into_iter().map(|cells| decoder.decode(cells)).collect()
}

/// First cell of a COUNT result
fn count_of(rows: &SqlRows) -> QueryResult<u64> {
    let Some(cell) = rows.rows.first().and_then(|row| row.first()) else {
        return Ok(0);
    };
    let column = rows.columns.first().map(|c| c.name.as_str()).unwrap_or("count");
    match cell {
        RawCell::Null => Ok(0),
        RawCell::UInt(n) => Ok(*n),
        RawCell::Int(n) if *n >= 0 => Ok(*n as u64),
        RawCell::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| QueryError::decode(column, format!("`{}` is not a count", text))),
        RawCell::Bytes(bytes) => String::from_utf8_lossy(bytes)
            .trim()
            .parse()
            .map_err(|_| QueryError::decode(column, "count is not numeric")),
        other => Err(QueryError::decode(column, format!("unexpected count cell {:?}", other))),
    }
}

async fn run_search(transport: Arc<dyn SearchTransport>, plan: SearchPlan) -> QueryResult<Response> {
    let body = transport.send(&plan.request).await?;
    decode_search_body(&plan, &body)
}

fn decode_search_body(plan: &SearchPlan, body: &serde_json::Value) -> QueryResult<Response> {
    let output = match plan.op {
        SearchOp::Insert | SearchOp::Replace | SearchOp::UpdateById | SearchOp::DeleteById => {
            QueryOutput::Modified(decode_doc_write(body)?)
        }
        SearchOp::BulkInsert | SearchOp::BulkReplace => QueryOutput::BulkModified(decode_bulk(body)?),
        SearchOp::UpdateByQuery => QueryOutput::Modified(decode_by_query(body, "updated")?),
        SearchOp::DeleteByQuery => QueryOutput::Modified(decode_by_query(body, "deleted")?),
        SearchOp::Find => {
            let hits = decode_search(body, &plan.decode)?;
            return Ok(match hits.records.into_iter().next() {
                Some(record) => Response::new(QueryOutput::Record(record)),
                None => Response::nil(),
            });
        }
        SearchOp::FindAll | SearchOp::ScrollStart | SearchOp::ScrollNext => {
            let hits = decode_search(body, &plan.decode)?;
            let response = Response::new(QueryOutput::Records(hits.records));
            return Ok(match hits.detail {
                Some(detail) => response.with_detail(detail),
                None => response,
            });
        }
    };
    Ok(Response::new(output))
}

async fn run_kv(conn: Arc<dyn KvConnection>, cmd: KvCommand) -> QueryResult<Response> {
    let reply = conn.call(cmd.command.as_str(), &cmd.args).await?;
    decode_reply(&cmd, reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::ColumnMeta;
    use crate::error::BackendErrorKind;
    use crate::exec::backend::{ExecResult, SqlTransaction};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Answers COUNT statements with `total` and everything else with `rows`
    struct FakeDb {
        total: i64,
        rows: Vec<Vec<RawCell>>,
        delay: Option<Duration>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SqlDatabase for FakeDb {
        async fn query(&self, statement: &CompiledSql) -> QueryResult<SqlRows> {
            self.seen.lock().unwrap().push(statement.sql.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if statement.sql.contains("count(*)") {
                return Ok(SqlRows {
                    columns: vec![ColumnMeta::new("total", "BIGINT", false)],
                    rows: vec![vec![RawCell::Int(self.total)]],
                });
            }
            Ok(SqlRows {
                columns: vec![
                    ColumnMeta::new("id", "INT", false),
                    ColumnMeta::new("name", "VARCHAR(64)", true),
                ],
                rows: self.rows.clone(),
            })
        }

        async fn execute(&self, statement: &CompiledSql) -> QueryResult<ExecResult> {
            self.seen.lock().unwrap().push(statement.sql.clone());
            Ok(ExecResult {
                rows_affected: 1,
                last_insert_id: Some(42),
            })
        }

        async fn begin(&self) -> QueryResult<Box<dyn SqlTransaction>> {
            Err(QueryError::internal("no transactions"))
        }
    }

    struct FakeConnector {
        db: Arc<FakeDb>,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn sql(&self, _: &DbAddress, _: &PoolOptions) -> QueryResult<Arc<dyn SqlDatabase>> {
            Ok(self.db.clone())
        }
    }

    fn engine(rows: Vec<Vec<RawCell>>, delay: Option<Duration>) -> (Engine, Arc<FakeDb>) {
        let db = Arc::new(FakeDb {
            total: 21,
            rows,
            delay,
            seen: Mutex::new(Vec::new()),
        });
        let engine = Engine::new(Arc::new(FakeConnector { db: db.clone() }));
        (engine, db)
    }

    fn request(v: serde_json::Value) -> Request {
        Request::from_json(v).unwrap()
    }

    #[tokio::test]
    async fn test_find_empty_is_nil() {
        let (engine, _) = engine(vec![], None);
        let addr = DbAddress::new(BackendKind::Mysql, "mysql://a");
        let resp = engine
            .query(&request(json!({"op": "find", "tables": ["users"], "where": {"id": 9}})), &addr, None)
            .await
            .unwrap();
        assert!(resp.is_nil);
    }

    #[tokio::test]
    async fn test_find_all_counts_first() {
        let rows = vec![
            vec![RawCell::Int(1), RawCell::Text("ann".into())],
            vec![RawCell::Int(2), RawCell::Null],
        ];
        let (engine, db) = engine(rows, None);
        let addr = DbAddress::new(BackendKind::Mysql, "mysql://a");
        let resp = engine
            .query(
                &request(json!({"op": "find_all", "tables": ["users"], "page": 3, "size": 10})),
                &addr,
                None,
            )
            .await
            .unwrap();

        let seen = db.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].contains("count(*)"));

        let detail = resp.detail.clone().unwrap();
        assert_eq!(detail.total, 21);
        assert_eq!(detail.total_page, 3);
        assert_eq!(resp.records().len(), 2);
        assert_eq!(resp.records()[1]["name"], Value::Null);
    }

    #[tokio::test]
    async fn test_exec_reports_insert_id() {
        let (engine, _) = engine(vec![], None);
        let addr = DbAddress::new(BackendKind::Postgres, "pg://a");
        let resp = engine
            .query(
                &request(json!({"op": "insert", "tables": ["users"], "data": {"name": "bob"}})),
                &addr,
                None,
            )
            .await
            .unwrap();
        match resp.output {
            QueryOutput::Modified(m) => {
                assert_eq!(m.rows_affected, 1);
                assert_eq!(m.id, Some(Value::Int(42)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_deadline() {
        let (engine, _) = engine(vec![], Some(Duration::from_secs(5)));
        let addr = DbAddress::new(BackendKind::Mysql, "mysql://slow").with_timeouts(20, 0);
        let err = engine
            .query(&request(json!({"op": "count", "tables": ["users"]})), &addr, None)
            .await
            .unwrap_err();
        assert_eq!(err.backend_kind(), Some(BackendErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_grammar_error_skips_connect() {
        let (engine, db) = engine(vec![], None);
        let addr = DbAddress::new(BackendKind::Mysql, "mysql://a");
        let err = engine
            .query(&request(json!({"op": "find", "tables": ["t"], "where": {"a<>": [1]}})), &addr, None)
            .await;
        assert!(err.is_err());
        assert!(db.seen.lock().unwrap().is_empty());
        assert!(engine.pools().sql.is_empty());
    }

    #[tokio::test]
    async fn test_unserved_family_is_refused() {
        let (engine, _) = engine(vec![], None);
        let addr = DbAddress::new(BackendKind::Redis, "redis://a");
        let err = engine
            .query(&request(json!({"op": "GET", "key": "k"})), &addr, None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_shutdown_drains() {
        let (engine, _) = engine(vec![], None);
        let addr = DbAddress::new(BackendKind::Mysql, "mysql://a");
        engine
            .query(&request(json!({"op": "count", "tables": ["t"]})), &addr, None)
            .await
            .unwrap();
        assert_eq!(engine.pools().sql.len(), 1);
        engine.shutdown().await.unwrap();
        assert!(engine.pools().sql.is_empty());
    }

    #[test]
    fn test_count_cells() {
        let rows = |cell| SqlRows {
            columns: vec![ColumnMeta::new("c", "BIGINT", false)],
            rows: vec![vec![cell]],
        };
        assert_eq!(count_of(&rows(RawCell::UInt(5))).unwrap(), 5);
        assert_eq!(count_of(&rows(RawCell::Text("12".into()))).unwrap(), 12);
        assert!(count_of(&rows(RawCell::Int(-1))).is_err());
        assert_eq!(count_of(&SqlRows::default()).unwrap(), 0);
    }
}
