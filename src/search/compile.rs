//! Condition to bool query
//!
//! Each condition entry lands in exactly one slot of its enclosing bool
//! query. The slot depends on the connector of the enclosing group:
//!
//! | leaf                         | under AND  | under OR                       |
//! |------------------------------|------------|--------------------------------|
//! | term / terms / range / exists| filter     | should                         |
//! | match / phrase / like        | must       | should                         |
//! | negated leaf                 | must_not   | should: bool { must_not: [..] }|
//! | AND / OR group               | filter     | should                         |
//! | NOT group                    | must_not   | should: bool { must_not: [..] }|

use crate::condition::{
    relation_connectors, resolve_key, Condition, ConditionValue, FieldKey, MatchType, Operator,
    Relation, ResolvedKey,
};
use crate::error::{QueryError, QueryResult};
use crate::value::Value;

use super::params::{check_fields, parse_inner_hits};
use super::query::{BoolQuery, InnerHits, SearchQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Filter,
    Must,
    Should,
    MustNot,
}

/// Compile a condition into a bool query; top-level keys are AND-connected.
pub fn compile_condition(condition: &Condition) -> QueryResult<BoolQuery> {
    implode(condition, Relation::And)
}

fn implode(condition: &Condition, connector: Relation) -> QueryResult<BoolQuery> {
    let mut bool_query = BoolQuery::new();
    for (key, value) in condition.iter() {
        if let Some((slot, query)) = entry(key, value, connector)? {
            place(&mut bool_query, slot, query);
        }
    }
    Ok(bool_query)
}

fn place(bool_query: &mut BoolQuery, slot: Slot, query: SearchQuery) {
    match slot {
        Slot::Filter => bool_query.filter.push(query),
        Slot::Must => bool_query.must.push(query),
        Slot::Should => bool_query.should.push(query),
        Slot::MustNot => bool_query.must_not.push(query),
    }
}

/// Slot for a positive clause
fn positive(connector: Relation, scoring: bool) -> Slot {
    match (connector, scoring) {
        (Relation::Or, _) => Slot::Should,
        (_, true) => Slot::Must,
        (_, false) => Slot::Filter,
    }
}

/// Slot and query for a negated clause
fn negative(connector: Relation, query: SearchQuery) -> (Slot, SearchQuery) {
    match connector {
        Relation::Or => (Slot::Should, BoolQuery::negate(query)),
        _ => (Slot::MustNot, query),
    }
}

fn entry(
    key: &str,
    value: &ConditionValue,
    connector: Relation,
) -> QueryResult<Option<(Slot, SearchQuery)>> {
    match resolve_key(key) {
        ResolvedKey::Relation(relation) if relation.is_connector() => {
            group(key, relation, value, connector)
        }
        ResolvedKey::Relation(relation) => {
            let query = relation_leaf(key, relation, value)?;
            Ok(Some((positive(connector, false), query)))
        }
        ResolvedKey::Field(field) => leaf(key, &field, value, connector).map(Some),
        ResolvedKey::Invalid => Err(QueryError::unsupported_field(key)),
    }
}

fn group(
    key: &str,
    relation: Relation,
    value: &ConditionValue,
    connector: Relation,
) -> QueryResult<Option<(Slot, SearchQuery)>> {
    let (map_connector, between, inner) = relation_connectors(relation);
    let sub = match value {
        ConditionValue::Map(children) => implode(children, map_connector)?,
        ConditionValue::Array(items) => {
            let mut sub = BoolQuery::new();
            for item in items {
                let children = item.as_map().ok_or_else(|| {
                    QueryError::malformed(format!("`{}` array elements must be objects", key))
                })?;
                if let Some(element) = implode(children, inner)?.into_query() {
                    place(&mut sub, positive(between, false), element);
                }
            }
            sub
        }
        ConditionValue::Scalar(_) => {
            return Err(QueryError::malformed(format!(
                "`{}` expects an object or an array of objects",
                key
            )))
        }
    };

    if sub.is_empty() {
        return Ok(None);
    }
    let sub = SearchQuery::Bool(sub);
    Ok(Some(match relation {
        Relation::Not => negative(connector, sub),
        _ => (positive(connector, false), sub),
    }))
}

fn leaf(
    key: &str,
    field: &FieldKey,
    value: &ConditionValue,
    connector: Relation,
) -> QueryResult<(Slot, SearchQuery)> {
    field.op.validate(key, value)?;
    let column = field.column.clone();
    let items: Vec<Value> = value
        .scalar_items()
        .map(|items| items.into_iter().cloned().collect())
        .unwrap_or_default();
    let scalar = value.as_scalar().cloned();

    let equality = |scalar: Option<Value>| match scalar {
        Some(v) => SearchQuery::Term {
            field: column.clone(),
            value: v,
        },
        None => SearchQuery::Terms {
            field: column.clone(),
            values: items.clone(),
        },
    };

    Ok(match field.op {
        Operator::Eq if value.is_null() => {
            negative(connector, SearchQuery::Exists { field: column.clone() })
        }
        Operator::Eq => (positive(connector, false), equality(scalar)),
        Operator::Not if value.is_null() => (
            positive(connector, false),
            SearchQuery::Exists { field: column.clone() },
        ),
        Operator::Not => negative(connector, equality(scalar)),
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
            let bound = scalar;
            let (gt, gte, lt, lte) = match field.op {
                Operator::Gt => (bound, None, None, None),
                Operator::Gte => (None, bound, None, None),
                Operator::Lt => (None, None, bound, None),
                _ => (None, None, None, bound),
            };
            (
                positive(connector, false),
                SearchQuery::Range { field: column.clone(), gt, gte, lt, lte },
            )
        }
        Operator::Between | Operator::NotBetween => {
            let range = SearchQuery::Range {
                field: column.clone(),
                gt: None,
                gte: Some(items[0].clone()),
                lt: None,
                lte: Some(items[1].clone()),
            };
            if field.op == Operator::Between {
                (positive(connector, false), range)
            } else {
                negative(connector, range)
            }
        }
        Operator::Like
        | Operator::NotLike
        | Operator::Match
        | Operator::NotMatch
        | Operator::MatchPhrase
        | Operator::NotMatchPhrase => {
            let query = match scalar {
                Some(v) => text_query(field, v)?,
                None => BoolQuery::any_of(
                    items
                        .iter()
                        .map(|v| text_query(field, v.clone()))
                        .collect::<QueryResult<_>>()?,
                ),
            };
            if field.op.is_negated() {
                negative(connector, query)
            } else {
                (positive(connector, true), query)
            }
        }
    })
}

fn text_query(field: &FieldKey, value: Value) -> QueryResult<SearchQuery> {
    let column = field.column.clone();
    Ok(match field.op {
        Operator::Match | Operator::NotMatch => SearchQuery::Match {
            field: column,
            query: value,
            operator: field.sub_operator.clone(),
            minimum_should_match: field.minimum_should_match.clone(),
            boost: field.boost,
        },
        Operator::MatchPhrase | Operator::NotMatchPhrase => SearchQuery::MatchPhrase {
            field: column,
            query: value,
            slop: field.slop,
            boost: field.boost,
        },
        _ => {
            let pattern = value.as_str().map(str::to_string).ok_or_else(|| {
                QueryError::invalid_value(format!("`{}` patterns must be strings", field.column))
            })?;
            match field.match_type {
                MatchType::Prefix => SearchQuery::Prefix { field: column, value: pattern },
                MatchType::Wildcard => SearchQuery::Wildcard { field: column, value: pattern },
                MatchType::Regexp => SearchQuery::Regexp { field: column, value: pattern },
            }
        }
    })
}

/// NESTED / PARENT_ID / HAS_CHILD / HAS_PARENT
fn relation_leaf(key: &str, relation: Relation, value: &ConditionValue) -> QueryResult<SearchQuery> {
    let name = relation.as_str().to_ascii_lowercase();
    let params = value.as_map().ok_or_else(|| {
        QueryError::malformed(format!("`{}` expects an object of parameters", key))
    })?;

    match relation {
        Relation::Nested => {
            check_fields(&name, params.iter().map(|(k, _)| k), &["path", "query", "inner_hits"])?;
            Ok(SearchQuery::Nested {
                path: required_string(&name, params, "path")?,
                query: Box::new(sub_query(&name, params)?),
                inner_hits: inner_hits(params)?,
            })
        }
        Relation::ParentId => {
            check_fields(&name, params.iter().map(|(k, _)| k), &["type", "id"])?;
            Ok(SearchQuery::ParentId {
                child_type: required_string(&name, params, "type")?,
                id: required_string(&name, params, "id")?,
            })
        }
        Relation::HasChild => {
            check_fields(
                &name,
                params.iter().map(|(k, _)| k),
                &["type", "query", "min_children", "max_children", "inner_hits"],
            )?;
            Ok(SearchQuery::HasChild {
                child_type: required_string(&name, params, "type")?,
                query: Box::new(sub_query(&name, params)?),
                min_children: optional_int(&name, params, "min_children")?,
                max_children: optional_int(&name, params, "max_children")?,
                inner_hits: inner_hits(params)?,
            })
        }
        Relation::HasParent => {
            check_fields(&name, params.iter().map(|(k, _)| k), &["parent_type", "query", "inner_hits"])?;
            Ok(SearchQuery::HasParent {
                parent_type: required_string(&name, params, "parent_type")?,
                query: Box::new(sub_query(&name, params)?),
                inner_hits: inner_hits(params)?,
            })
        }
        _ => Err(QueryError::unsupported_field(key)),
    }
}

fn required_string(query: &str, params: &Condition, name: &str) -> QueryResult<String> {
    match params.get(name).and_then(ConditionValue::as_scalar) {
        Some(Value::Null) | None => Err(QueryError::missing_param(name, query)),
        Some(v) => {
            let text = v.to_wire_string();
            if text.is_empty() {
                Err(QueryError::missing_param(name, query))
            } else {
                Ok(text)
            }
        }
    }
}

fn optional_int(query: &str, params: &Condition, name: &str) -> QueryResult<Option<i64>> {
    match params.get(name) {
        None | Some(ConditionValue::Scalar(Value::Null)) => Ok(None),
        Some(v) => v.as_scalar().and_then(Value::as_i64).map(Some).ok_or_else(|| {
            QueryError::invalid_value(format!("{}`s param [{}] is not an integer", query, name))
        }),
    }
}

fn sub_query(query: &str, params: &Condition) -> QueryResult<SearchQuery> {
    match params.get("query") {
        Some(ConditionValue::Map(inner)) => Ok(SearchQuery::Bool(compile_condition(inner)?)),
        Some(_) => Err(QueryError::invalid_value(format!(
            "{}`s param [query] is not a map",
            query
        ))),
        None => Err(QueryError::missing_param("query", query)),
    }
}

fn inner_hits(params: &Condition) -> QueryResult<Option<InnerHits>> {
    match params.get("inner_hits") {
        None => Ok(None),
        Some(v) => parse_inner_hits(&v.to_json()).map(Some),
    }
}
