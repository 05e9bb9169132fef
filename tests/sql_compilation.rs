//! SQL compilation tests
//!
//! Placeholder/parameter agreement, operator semantics and the SQL side of
//! request dispatch.

use omniquery::condition::Condition;
use omniquery::config::BackendKind;
use omniquery::error::QueryError;
use omniquery::request::Request;
use omniquery::sql::{compile_clause, compile_sql, SqlPlan};
use omniquery::value::Value;
use serde_json::json;

fn clause(v: serde_json::Value) -> omniquery::error::QueryResult<omniquery::sql::Clause> {
    compile_clause(&Condition::from_json(v).unwrap(), '`')
}

fn plan(kind: BackendKind, v: serde_json::Value) -> SqlPlan {
    compile_sql(kind, &Request::from_json(v).unwrap()).unwrap()
}

// =============================================================================
// Conditions
// =============================================================================

#[test]
fn test_comparison_and_equality() {
    let c = clause(json!({"age>": 18, "name": "bob"})).unwrap();
    assert_eq!(c.sql, "`age` > ? AND `name` = ?");
    assert_eq!(c.params, vec![Value::Int(18), Value::from("bob")]);
}

#[test]
fn test_array_equality_binds_every_element() {
    let c = clause(json!({"id": [5, 6, 7]})).unwrap();
    assert_eq!(c.sql, "`id` IN (?, ?, ?)");
    assert_eq!(c.params, vec![Value::Int(5), Value::Int(6), Value::Int(7)]);
}

#[test]
fn test_between_arity() {
    assert!(clause(json!({"age<>": [1, 2]})).is_ok());
    for bad in [json!([1]), json!([1, 2, 3]), json!(4)] {
        let err = clause(json!({ "age<>": bad })).unwrap_err();
        assert!(matches!(err, QueryError::InvalidValue(_)));
    }
}

#[test]
fn test_not_is_negation() {
    let c = clause(json!({"NOT": {"status": 1, "age>": 3}})).unwrap();
    assert!(c.sql.starts_with("NOT ("));
    assert_eq!(c.params.len(), 2);
}

#[test]
fn test_placeholders_match_params() {
    let conditions = [
        json!({"a": 1, "b!": [1, 2], "c~": "x%"}),
        json!({"OR": [{"a": 1}, {"b<>": [1, 2]}]}),
        json!({"OR": {"x>=": 1, "y<=": 2}, "z": null}),
    ];
    for condition in conditions {
        let c = clause(condition).unwrap();
        assert_eq!(c.sql.matches('?').count(), c.params.len(), "{}", c.sql);
    }
}

// =============================================================================
// Statements
// =============================================================================

#[test]
fn test_postgres_quoting() {
    match plan(BackendKind::Postgres, json!({"op": "count", "tables": ["users"], "where": {"id": 1}})) {
        SqlPlan::Count { statement } => {
            assert!(statement.sql.contains("\"id\" = ?"));
            assert_eq!(statement.params, vec![Value::Int(1)]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_compilation_is_idempotent() {
    let req = json!({
        "op": "find_all",
        "tables": ["orders"],
        "where": {"OR": [{"state": "open"}, {"total>": 100}]},
        "order": ["-created"],
        "page": 2,
        "size": 25
    });
    assert_eq!(plan(BackendKind::Mysql, req.clone()), plan(BackendKind::Mysql, req));
}

#[test]
fn test_clickhouse_insert_always_batches() {
    let p = plan(
        BackendKind::Clickhouse,
        json!({"op": "insert", "tables": ["events"], "data": {"id": 1}}),
    );
    assert!(matches!(p, SqlPlan::BatchInsert(_)));
}
