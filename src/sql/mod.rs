//! SQL statement compiler
//!
//! Compiles a [`Request`](crate::request::Request) into parameterized SQL for
//! MySQL, PostgreSQL, SQLite and ClickHouse. All statements use `?`
//! placeholders; the placeholder count of every emitted statement is checked
//! against its parameter list before it leaves this module.

mod clause;
mod generate;
mod quote;
mod statement;

pub use clause::{compile_clause, Clause};
pub use generate::{compile_sql, BatchInsertPlan, SqlOp, SqlPlan};
pub use quote::{has_special, quote_column, quote_table, split_alias};
pub use statement::{insert_values, CompiledSql, Statement};
