//! WHERE / HAVING compilation
//!
//! Walks a [`Condition`] and emits a parenthesized boolean expression with
//! `?` placeholders. Parameters are appended in exactly the order their
//! placeholders appear in the text.

use crate::condition::{
    relation_connectors, resolve_key, Condition, ConditionValue, FieldKey, Operator, Relation,
    ResolvedKey,
};
use crate::error::{QueryError, QueryResult};
use crate::value::Value;

use super::quote::quote_column;

/// A compiled boolean clause
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clause {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Clause {
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Compile `condition` with top-level keys joined by AND.
pub fn compile_clause(condition: &Condition, quote: char) -> QueryResult<Clause> {
    let mut builder = ClauseBuilder {
        quote,
        params: Vec::new(),
    };
    let sql = builder.implode(condition, Relation::And)?;
    Ok(Clause {
        sql,
        params: builder.params,
    })
}

struct ClauseBuilder {
    quote: char,
    params: Vec<Value>,
}

fn joiner(connector: Relation) -> &'static str {
    match connector {
        Relation::Or => " OR ",
        _ => " AND ",
    }
}

impl ClauseBuilder {
    fn implode(&mut self, condition: &Condition, connector: Relation) -> QueryResult<String> {
        let mut parts = Vec::with_capacity(condition.len());
        for (key, value) in condition.iter() {
            let fragment = self.entry(key, value)?;
            if !fragment.is_empty() {
                parts.push(fragment);
            }
        }
        Ok(parts.join(joiner(connector)))
    }

    fn entry(&mut self, key: &str, value: &ConditionValue) -> QueryResult<String> {
        match resolve_key(key) {
            ResolvedKey::Relation(relation) if relation.is_search_only() => {
                Err(QueryError::invalid_request(format!(
                    "`{}` relation is only supported by search backends",
                    key
                )))
            }
            ResolvedKey::Relation(relation) => self.relation(key, relation, value),
            ResolvedKey::Field(field) => self.leaf(key, &field, value),
            ResolvedKey::Invalid => Err(QueryError::unsupported_field(key)),
        }
    }

    fn relation(
        &mut self,
        key: &str,
        relation: Relation,
        value: &ConditionValue,
    ) -> QueryResult<String> {
        let (map_connector, between, inner) = relation_connectors(relation);
        let body = match value {
            ConditionValue::Map(children) => self.implode(children, map_connector)?,
            ConditionValue::Array(items) => {
                let mut groups = Vec::with_capacity(items.len());
                for item in items {
                    let children = item.as_map().ok_or_else(|| {
                        QueryError::malformed(format!("`{}` array elements must be objects", key))
                    })?;
                    let group = self.implode(children, inner)?;
                    if !group.is_empty() {
                        groups.push(format!("({})", group));
                    }
                }
                groups.join(joiner(between))
            }
            ConditionValue::Scalar(_) => {
                return Err(QueryError::malformed(format!(
                    "`{}` expects an object or an array of objects",
                    key
                )))
            }
        };

        if body.is_empty() {
            return Ok(body);
        }
        Ok(match relation {
            Relation::Not => format!("NOT ({})", body),
            _ => format!("({})", body),
        })
    }

    fn leaf(&mut self, key: &str, field: &FieldKey, value: &ConditionValue) -> QueryResult<String> {
        if field.op.is_match_family() {
            return Err(QueryError::invalid_request(format!(
                "operator `{}` in `{}` is only supported by search backends",
                field.op.as_str(),
                key
            )));
        }
        field.op.validate(key, value)?;

        let col = quote_column(&field.column, self.quote);
        let items = value.scalar_items().unwrap_or_default();

        let sql = match (field.op, value) {
            (Operator::Eq, ConditionValue::Scalar(Value::Null)) => format!("{} IS NULL", col),
            (Operator::Not, ConditionValue::Scalar(Value::Null)) => {
                format!("{} IS NOT NULL", col)
            }
            (Operator::Eq, ConditionValue::Array(_)) => {
                format!("{} IN ({})", col, self.bind_all(&items))
            }
            (Operator::Not, ConditionValue::Array(_)) => {
                format!("{} NOT IN ({})", col, self.bind_all(&items))
            }
            (Operator::Eq, ConditionValue::Scalar(v)) => format!("{} = {}", col, self.bind(v)),
            (Operator::Not, ConditionValue::Scalar(v)) => format!("{} != {}", col, self.bind(v)),
            (Operator::Gt, ConditionValue::Scalar(v)) => format!("{} > {}", col, self.bind(v)),
            (Operator::Gte, ConditionValue::Scalar(v)) => format!("{} >= {}", col, self.bind(v)),
            (Operator::Lt, ConditionValue::Scalar(v)) => format!("{} < {}", col, self.bind(v)),
            (Operator::Lte, ConditionValue::Scalar(v)) => format!("{} <= {}", col, self.bind(v)),
            (Operator::Between, _) => {
                format!("{} BETWEEN {} AND {}", col, self.bind(items[0]), self.bind(items[1]))
            }
            (Operator::NotBetween, _) => format!(
                "NOT ({} BETWEEN {} AND {})",
                col,
                self.bind(items[0]),
                self.bind(items[1])
            ),
            (Operator::Like, ConditionValue::Scalar(v)) => format!("{} LIKE {}", col, self.bind(v)),
            (Operator::NotLike, ConditionValue::Scalar(v)) => {
                format!("{} NOT LIKE {}", col, self.bind(v))
            }
            (Operator::Like, ConditionValue::Array(_)) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|v| format!("{} LIKE {}", col, self.bind(v)))
                    .collect();
                format!("({})", parts.join(" OR "))
            }
            (Operator::NotLike, ConditionValue::Array(_)) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|v| format!("{} NOT LIKE {}", col, self.bind(v)))
                    .collect();
                format!("({})", parts.join(" AND "))
            }
            _ => return Err(QueryError::malformed(format!("cannot compile `{}`", key))),
        };
        Ok(sql)
    }

    fn bind(&mut self, value: &Value) -> &'static str {
        self.params.push(value.clone());
        "?"
    }

    fn bind_all(&mut self, values: &[&Value]) -> String {
        values
            .iter()
            .map(|v| self.bind(v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(value: serde_json::Value) -> QueryResult<Clause> {
        compile_clause(&Condition::from_json(value).unwrap(), '`')
    }

    #[test]
    fn test_simple_and() {
        let clause = compile(json!({"age>": 18, "name": "bob"})).unwrap();
        assert_eq!(clause.sql, "`age` > ? AND `name` = ?");
        assert_eq!(clause.params, vec![Value::Int(18), Value::from("bob")]);
    }

    #[test]
    fn test_null_handling() {
        let clause = compile(json!({"a": null, "b!": null})).unwrap();
        assert_eq!(clause.sql, "`a` IS NULL AND `b` IS NOT NULL");
        assert!(clause.params.is_empty());
    }

    #[test]
    fn test_in_lists_bind_each_element_in_order() {
        let clause = compile(json!({"id": [3, 1, 2], "tag!": ["x"]})).unwrap();
        assert_eq!(clause.sql, "`id` IN (?, ?, ?) AND `tag` NOT IN (?)");
        assert_eq!(
            clause.params,
            vec![Value::Int(3), Value::Int(1), Value::Int(2), Value::from("x")]
        );
    }

    #[test]
    fn test_between_and_not_between() {
        let clause = compile(json!({"age<>": [1, 9], "score><": [0, 5]})).unwrap();
        assert_eq!(
            clause.sql,
            "`age` BETWEEN ? AND ? AND NOT (`score` BETWEEN ? AND ?)"
        );
        assert_eq!(clause.params.len(), 4);
    }

    #[test]
    fn test_between_wrong_arity_is_error() {
        assert!(matches!(
            compile(json!({"age<>": [1]})),
            Err(QueryError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_like_arrays() {
        let clause = compile(json!({"a~": ["x%", "y%"], "b!~": ["z%", "w%"]})).unwrap();
        assert_eq!(
            clause.sql,
            "(`a` LIKE ? OR `a` LIKE ?) AND (`b` NOT LIKE ? AND `b` NOT LIKE ?)"
        );
    }

    #[test]
    fn test_or_array_groups() {
        let clause = compile(json!({"OR": [{"status": 1}, {"status": 2}]})).unwrap();
        assert_eq!(clause.sql, "((`status` = ?) OR (`status` = ?))");
        assert_eq!(clause.params, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_and_array_groups_are_or_inside() {
        let clause = compile(json!({"AND": [{"a": 1, "b": 2}, {"c": 3}]})).unwrap();
        assert_eq!(clause.sql, "((`a` = ? OR `b` = ?) AND (`c` = ?))");
    }

    #[test]
    fn test_or_map() {
        let clause = compile(json!({"x": 0, "OR": {"a": 1, "b": 2}})).unwrap();
        assert_eq!(clause.sql, "(`a` = ? OR `b` = ?) AND `x` = ?");
        assert_eq!(clause.params, vec![Value::Int(1), Value::Int(2), Value::Int(0)]);
    }

    #[test]
    fn test_not_negates_group() {
        let inner = compile(json!({"a": 1, "b>": 2})).unwrap();
        let negated = compile(json!({"NOT": {"a": 1, "b>": 2}})).unwrap();
        assert_eq!(negated.sql, format!("NOT ({})", inner.sql));
        assert_eq!(negated.params, inner.params);
    }

    #[test]
    fn test_commented_connectors_coexist() {
        let clause = compile(json!({
            "OR #1": {"a": 1, "b": 2},
            "OR #2": {"c": 3, "d": 4}
        }))
        .unwrap();
        assert_eq!(clause.sql, "(`a` = ? OR `b` = ?) AND (`c` = ? OR `d` = ?)");
    }

    #[test]
    fn test_unsupported_field() {
        assert!(matches!(
            compile(json!({">": 1})),
            Err(QueryError::UnsupportedField(k)) if k == ">"
        ));
    }

    #[test]
    fn test_search_only_features_rejected() {
        assert!(compile(json!({"title?": "rust"})).is_err());
        assert!(compile(json!({"NESTED": {"path": "x"}})).is_err());
    }

    #[test]
    fn test_scalar_relation_value_rejected() {
        assert!(matches!(
            compile(json!({"OR": 1})),
            Err(QueryError::MalformedCondition(_))
        ));
        assert!(compile(json!({"OR": [1, 2]})).is_err());
    }

    #[test]
    fn test_empty_groups_vanish() {
        let clause = compile(json!({"OR": {}, "a": 1})).unwrap();
        assert_eq!(clause.sql, "`a` = ?");
    }

    #[test]
    fn test_compilation_is_idempotent() {
        let cond = json!({"b": [1, 2], "a~": "x%", "OR": [{"c": 1}, {"d!": null}]});
        let first = compile(cond.clone()).unwrap();
        let second = compile(cond).unwrap();
        assert_eq!(first, second);
    }
}
