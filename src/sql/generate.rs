//! Request to SQL plan

use std::str::FromStr;

use crate::config::BackendKind;
use crate::error::{QueryError, QueryResult};
use crate::request::Request;
use crate::value::Value;

use super::quote::{quote_column, quote_table};
use super::statement::{insert_values, CompiledSql, Statement};

/// SQL operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlOp {
    Insert,
    Replace,
    Update,
    Delete,
    Find,
    FindAll,
    Count,
}

impl SqlOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlOp::Insert => "insert",
            SqlOp::Replace => "replace",
            SqlOp::Update => "update",
            SqlOp::Delete => "delete",
            SqlOp::Find => "find",
            SqlOp::FindAll => "find_all",
            SqlOp::Count => "count",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, SqlOp::Insert | SqlOp::Replace | SqlOp::Update | SqlOp::Delete)
    }
}

impl FromStr for SqlOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insert" | "create" => Ok(SqlOp::Insert),
            "replace" => Ok(SqlOp::Replace),
            "update" => Ok(SqlOp::Update),
            "delete" => Ok(SqlOp::Delete),
            "find" => Ok(SqlOp::Find),
            "find_all" | "findall" => Ok(SqlOp::FindAll),
            "count" => Ok(SqlOp::Count),
            other => Err(QueryError::invalid_request(format!(
                "unsupported sql op `{}`",
                other
            ))),
        }
    }
}

/// One prepared INSERT executed row by row
#[derive(Debug, Clone, PartialEq)]
pub struct BatchInsertPlan {
    /// Single-row `INSERT ... VALUES (?, ..)`
    pub sql: String,
    pub rows: Vec<Vec<Value>>,
    pub batch: bool,
}

/// What the executor should run
#[derive(Debug, Clone, PartialEq)]
pub enum SqlPlan {
    /// insert / replace / update / delete
    Exec { op: SqlOp, statement: CompiledSql },
    /// find / find_all, with an optional COUNT for paging
    Query {
        op: SqlOp,
        statement: CompiledSql,
        count: Option<CompiledSql>,
    },
    Count { statement: CompiledSql },
    BatchInsert(BatchInsertPlan),
}

impl SqlPlan {
    pub fn op(&self) -> SqlOp {
        match self {
            SqlPlan::Exec { op, .. } | SqlPlan::Query { op, .. } => *op,
            SqlPlan::Count { .. } => SqlOp::Count,
            SqlPlan::BatchInsert(_) => SqlOp::Insert,
        }
    }

    /// Main statement text, for logging
    pub fn statement_text(&self) -> String {
        match self {
            SqlPlan::Exec { statement, .. }
            | SqlPlan::Query { statement, .. }
            | SqlPlan::Count { statement } => statement.interpolate(),
            SqlPlan::BatchInsert(plan) => plan.sql.clone(),
        }
    }
}

/// Compile a request for a SQL backend.
pub fn compile_sql(kind: BackendKind, request: &Request) -> QueryResult<SqlPlan> {
    let op: SqlOp = request.op.parse()?;

    if let Some(raw) = &request.raw {
        let statement = CompiledSql::new(raw.query.clone(), raw.args.clone()).verify()?;
        return Ok(match op {
            SqlOp::Find | SqlOp::FindAll => SqlPlan::Query {
                op,
                statement,
                count: None,
            },
            SqlOp::Count => SqlPlan::Count { statement },
            _ => SqlPlan::Exec { op, statement },
        });
    }

    let table = request.table()?;
    let mut stmt = Statement::new(kind, table)?;

    match op {
        SqlOp::Insert if kind == BackendKind::Clickhouse => {
            Ok(SqlPlan::BatchInsert(batch_insert_plan(kind, table, request)?))
        }
        SqlOp::Insert | SqlOp::Replace => {
            stmt.set_rows(&request.rows())?;
            Ok(SqlPlan::Exec {
                op,
                statement: stmt.build_insert(op == SqlOp::Replace)?,
            })
        }
        SqlOp::Update => {
            let data = request
                .data
                .as_ref()
                .ok_or_else(|| QueryError::invalid_request("update requires data"))?;
            stmt.update_map(data)?;
            stmt.where_condition(&request.condition)?;
            Ok(SqlPlan::Exec {
                op,
                statement: stmt.build_update()?,
            })
        }
        SqlOp::Delete => {
            stmt.where_condition(&request.condition)?;
            Ok(SqlPlan::Exec {
                op,
                statement: stmt.build_delete()?,
            })
        }
        SqlOp::Count => {
            select_shape(&mut stmt, request)?;
            Ok(SqlPlan::Count {
                statement: stmt.build_count()?,
            })
        }
        SqlOp::Find => {
            select_shape(&mut stmt, request)?;
            stmt.order_by(&request.order_by())
                .limit(Some(1))
                .for_update(request.for_update);
            Ok(SqlPlan::Query {
                op,
                statement: stmt.build_select()?,
                count: None,
            })
        }
        SqlOp::FindAll => {
            select_shape(&mut stmt, request)?;
            let count = if request.page > 0 && request.size > 0 {
                Some(stmt.build_count()?)
            } else {
                None
            };
            stmt.order_by(&request.order_by())
                .limit(Some(request.size))
                .offset(Some(request.offset()))
                .for_update(request.for_update);
            Ok(SqlPlan::Query {
                op,
                statement: stmt.build_select()?,
                count,
            })
        }
    }
}

fn select_shape(stmt: &mut Statement, request: &Request) -> QueryResult<()> {
    stmt.alias(request.alias.as_deref())
        .columns(&request.columns)
        .distinct(request.distinct)
        .group_by(&request.group);
    for join in &request.joins {
        stmt.join(join)?;
    }
    stmt.where_condition(&request.condition)?;
    stmt.having_condition(&request.having)?;
    Ok(())
}

fn batch_insert_plan(
    kind: BackendKind,
    table: &str,
    request: &Request,
) -> QueryResult<BatchInsertPlan> {
    let (columns, rows) = insert_values(&request.rows())?;
    let quote = kind.quote_char();
    let quoted: Vec<String> = columns.iter().map(|c| quote_column(c, quote)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_table(table, quote),
        quoted.join(", "),
        vec!["?"; columns.len()].join(", ")
    );
    Ok(BatchInsertPlan {
        sql,
        rows,
        batch: request.is_batch(),
    })
}
