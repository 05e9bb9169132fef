//! Write-then-read tests
//!
//! Values bound by the statement builder, stored the way a MySQL driver
//! hands them back, must decode to the values that were written.

use chrono::{TimeZone, Utc};
use omniquery::condition::Condition;
use omniquery::config::BackendKind;
use omniquery::decode::{ColumnMeta, RawCell, RowDecoder};
use omniquery::sql::Statement;
use omniquery::value::{Record, Value};
use serde_json::json;

/// Column types of the `users` table, in key order
const USERS: &[(&str, &str, bool)] = &[
    ("created", "DATETIME", false),
    ("id", "BIGINT", false),
    ("meta", "JSON", true),
    ("name", "VARCHAR(64)", false),
    ("nickname", "VARCHAR(64)", true),
    ("score", "DOUBLE", true),
];

fn columns(names: &[String]) -> Vec<ColumnMeta> {
    names
        .iter()
        .map(|name| {
            let (_, ty, nullable) = USERS
                .iter()
                .find(|(column, _, _)| column == name)
                .unwrap();
            ColumnMeta::new(name.clone(), *ty, *nullable)
        })
        .collect()
}

/// What the driver returns for a stored parameter
fn stored(value: &Value) -> RawCell {
    match value {
        Value::Null => RawCell::Null,
        Value::Int(v) => RawCell::Int(*v),
        Value::Float(v) => RawCell::Float(*v),
        Value::String(s) => RawCell::Text(s.clone()),
        Value::Time(t) => RawCell::Text(t.format("%Y-%m-%d %H:%M:%S").to_string()),
        Value::Json(v) => RawCell::Text(v.to_string()),
        other => panic!("unexpected parameter {:?}", other),
    }
}

fn user(id: i64, nickname: Value, score: Value) -> Record {
    Record::from([
        (
            "created".to_string(),
            Value::Time(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()),
        ),
        ("id".to_string(), Value::Int(id)),
        ("meta".to_string(), Value::Json(json!({"plan": "pro", "seats": 3}))),
        ("name".to_string(), Value::from("ann")),
        ("nickname".to_string(), nickname),
        ("score".to_string(), score),
    ])
}

// =============================================================================
// Insert
// =============================================================================

#[test]
fn test_inserted_rows_decode_to_written_values() {
    let first = user(7, Value::Null, Value::Float(9.5));
    let second = user(8, Value::from("a"), Value::Null);

    let mut stmt = Statement::new(BackendKind::Mysql, "users").unwrap();
    stmt.set_rows(&[&first, &second]).unwrap();
    let insert = stmt.build_insert(false).unwrap();
    assert_eq!(insert.params.len(), 12);

    let names: Vec<String> = first.keys().cloned().collect();
    let decoder = RowDecoder::new(BackendKind::Mysql, &columns(&names));

    let decoded: Vec<Record> = insert
        .params
        .chunks(names.len())
        .map(|row| decoder.decode(row.iter().map(stored).collect()).unwrap())
        .collect();

    assert_eq!(decoded, vec![first, second]);
    assert_eq!(decoded[0]["nickname"], Value::Null);
    assert_eq!(decoded[1]["score"], Value::Null);
}

// =============================================================================
// Update
// =============================================================================

#[test]
fn test_updated_values_decode_including_nil() {
    let changes = Record::from([
        ("nickname".to_string(), Value::Null),
        ("score".to_string(), Value::Float(1.25)),
    ]);

    let mut stmt = Statement::new(BackendKind::Mysql, "users").unwrap();
    stmt.update_map(&changes).unwrap();
    stmt.where_condition(&Condition::from_json(json!({"id": 7})).unwrap())
        .unwrap();
    let update = stmt.build_update().unwrap();
    assert_eq!(
        update.sql,
        "UPDATE `users` SET `nickname` = ?, `score` = ? WHERE `id` = ?"
    );

    let names: Vec<String> = changes.keys().cloned().collect();
    let cells = update.params[..names.len()].iter().map(stored).collect();
    let decoded = RowDecoder::new(BackendKind::Mysql, &columns(&names))
        .decode(cells)
        .unwrap();

    assert_eq!(decoded, changes);
}

#[test]
fn test_nil_into_non_nullable_column_fails_decode() {
    let changes = Record::from([("name".to_string(), Value::Null)]);

    let mut stmt = Statement::new(BackendKind::Mysql, "users").unwrap();
    stmt.update_map(&changes).unwrap();
    let update = stmt.build_update().unwrap();

    let names = vec!["name".to_string()];
    let err = RowDecoder::new(BackendKind::Mysql, &columns(&names))
        .decode(update.params.iter().map(stored).collect())
        .unwrap_err();
    assert_eq!(err.code().as_str(), "ORM_DECODE_FAILED");
}
