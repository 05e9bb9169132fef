//! # Operator and Relation Resolution
//!
//! Splits a condition key into its column and comparison operator, or
//! recognizes it as a connector/relation key. Resolution is total: every key
//! maps to exactly one [`ResolvedKey`].
//!
//! Key grammar: `<column>[ws]<operator>[(<options>)]`, for example
//! `"age >="`, `"name !~"`, `"title ?(operator:and, boost:1.5)"`.

use serde::{Deserialize, Serialize};

use super::model::ConditionValue;
use crate::error::{QueryError, QueryResult};
use crate::value::Value;

/// Connector and relation keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relation {
    And,
    Or,
    Not,
    /// Search-only: query over a nested object path
    Nested,
    /// Search-only: children of a given parent id
    ParentId,
    /// Search-only: parents with matching children
    HasChild,
    /// Search-only: children with a matching parent
    HasParent,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::And => "AND",
            Relation::Or => "OR",
            Relation::Not => "NOT",
            Relation::Nested => "NESTED",
            Relation::ParentId => "PARENT_ID",
            Relation::HasChild => "HAS_CHILD",
            Relation::HasParent => "HAS_PARENT",
        }
    }

    fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "AND" => Some(Relation::And),
            "OR" => Some(Relation::Or),
            "NOT" => Some(Relation::Not),
            "NESTED" => Some(Relation::Nested),
            "PARENT_ID" => Some(Relation::ParentId),
            "HAS_CHILD" => Some(Relation::HasChild),
            "HAS_PARENT" => Some(Relation::HasParent),
            _ => None,
        }
    }

    /// AND / OR / NOT
    pub fn is_connector(&self) -> bool {
        matches!(self, Relation::And | Relation::Or | Relation::Not)
    }

    pub fn is_search_only(&self) -> bool {
        !self.is_connector()
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// No suffix or `=`. An array value means membership, nil means IS NULL.
    Eq,
    /// `!` or `!=`. An array value means NOT IN, nil means IS NOT NULL.
    Not,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `<>` with exactly two bounds, inclusive
    Between,
    /// `><` with exactly two bounds
    NotBetween,
    /// `~` pattern match; `%` and `_` wildcards are passed through
    Like,
    /// `!~`
    NotLike,
    /// `?` full-text match on search backends
    Match,
    /// `!?`
    NotMatch,
    /// `*` phrase match on search backends
    MatchPhrase,
    /// `!*`
    NotMatchPhrase,
}

/// Suffixes in match order. Two-character suffixes come first.
const SUFFIXES: &[(&str, Operator)] = &[
    (">=", Operator::Gte),
    ("<=", Operator::Lte),
    ("<>", Operator::Between),
    ("><", Operator::NotBetween),
    ("!=", Operator::Not),
    ("!~", Operator::NotLike),
    ("!?", Operator::NotMatch),
    ("!*", Operator::NotMatchPhrase),
    (">", Operator::Gt),
    ("<", Operator::Lt),
    ("!", Operator::Not),
    ("~", Operator::Like),
    ("?", Operator::Match),
    ("*", Operator::MatchPhrase),
    ("=", Operator::Eq),
];

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Not => "not",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Between => "between",
            Operator::NotBetween => "not_between",
            Operator::Like => "like",
            Operator::NotLike => "not_like",
            Operator::Match => "match",
            Operator::NotMatch => "not_match",
            Operator::MatchPhrase => "match_phrase",
            Operator::NotMatchPhrase => "not_match_phrase",
        }
    }

    pub fn is_negated(&self) -> bool {
        matches!(
            self,
            Operator::Not
                | Operator::NotBetween
                | Operator::NotLike
                | Operator::NotMatch
                | Operator::NotMatchPhrase
        )
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte)
    }

    pub fn is_like(&self) -> bool {
        matches!(self, Operator::Like | Operator::NotLike)
    }

    /// Full-text operators, only meaningful against the search engine
    pub fn is_match_family(&self) -> bool {
        matches!(
            self,
            Operator::Match | Operator::NotMatch | Operator::MatchPhrase | Operator::NotMatchPhrase
        )
    }

    fn accepts_options(&self) -> bool {
        self.is_like() || self.is_match_family()
    }

    /// Check that `value` has the arity and kind this operator requires.
    pub fn validate(&self, key: &str, value: &ConditionValue) -> QueryResult<()> {
        match self {
            Operator::Eq | Operator::Not => match value {
                ConditionValue::Scalar(_) => Ok(()),
                ConditionValue::Array(_) => non_empty_scalars(key, value).map(|_| ()),
                ConditionValue::Map(_) => Err(QueryError::malformed(format!(
                    "`{}` cannot compare against an object",
                    key
                ))),
            },
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => match value {
                ConditionValue::Scalar(v) if !v.is_null() => Ok(()),
                _ => Err(QueryError::invalid_value(format!(
                    "`{}` expects a single non-null value",
                    key
                ))),
            },
            Operator::Between | Operator::NotBetween => match value.scalar_items() {
                Some(items) if items.len() == 2 && items.iter().all(|v| !v.is_null()) => Ok(()),
                Some(items) => Err(QueryError::invalid_value(format!(
                    "`{}` expects exactly two bounds, got {}",
                    key,
                    items.len()
                ))),
                None => Err(QueryError::invalid_value(format!(
                    "`{}` expects an array of two bounds",
                    key
                ))),
            },
            Operator::Like | Operator::NotLike => match value {
                ConditionValue::Scalar(Value::String(_)) => Ok(()),
                ConditionValue::Array(_) => {
                    let items = non_empty_scalars(key, value)?;
                    if items.iter().all(|v| v.as_str().is_some()) {
                        Ok(())
                    } else {
                        Err(QueryError::invalid_value(format!(
                            "`{}` patterns must be strings",
                            key
                        )))
                    }
                }
                _ => Err(QueryError::invalid_value(format!(
                    "`{}` patterns must be strings",
                    key
                ))),
            },
            Operator::Match | Operator::NotMatch | Operator::MatchPhrase | Operator::NotMatchPhrase => {
                match value {
                    ConditionValue::Scalar(v) if !v.is_null() => Ok(()),
                    ConditionValue::Array(_) => non_empty_scalars(key, value).map(|_| ()),
                    _ => Err(QueryError::invalid_value(format!(
                        "`{}` expects text to match",
                        key
                    ))),
                }
            }
        }
    }
}

fn non_empty_scalars<'a>(key: &str, value: &'a ConditionValue) -> QueryResult<Vec<&'a Value>> {
    match value.scalar_items() {
        Some(items) if !items.is_empty() => Ok(items),
        Some(_) => Err(QueryError::invalid_value(format!(
            "`{}` has an empty value list",
            key
        ))),
        None => Err(QueryError::malformed(format!(
            "`{}` value list may only hold scalars",
            key
        ))),
    }
}

/// How a like-family operator is expressed in the search engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    Prefix,
    Wildcard,
    Regexp,
}

impl MatchType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "prefix" => Some(MatchType::Prefix),
            "wildcard" => Some(MatchType::Wildcard),
            "regexp" => Some(MatchType::Regexp),
            _ => None,
        }
    }
}

/// A resolved column key
#[derive(Debug, Clone, PartialEq)]
pub struct FieldKey {
    pub column: String,
    pub op: Operator,
    /// `and` / `or` for match queries
    pub sub_operator: Option<String>,
    pub match_type: MatchType,
    pub minimum_should_match: Option<String>,
    pub boost: Option<f64>,
    pub slop: Option<u32>,
}

impl FieldKey {
    pub fn new(column: impl Into<String>, op: Operator) -> Self {
        Self {
            column: column.into(),
            op,
            sub_operator: None,
            match_type: MatchType::default(),
            minimum_should_match: None,
            boost: None,
            slop: None,
        }
    }

    fn apply_options(&mut self, options: &str) -> Option<()> {
        for part in options.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, value) = part.split_once(':')?;
            let value = value.trim();
            match name.trim() {
                "operator" => {
                    let op = value.to_ascii_lowercase();
                    if op != "and" && op != "or" {
                        return None;
                    }
                    self.sub_operator = Some(op);
                }
                "minimum_should_match" => self.minimum_should_match = Some(value.to_string()),
                "boost" => self.boost = Some(value.parse().ok()?),
                "slop" => self.slop = Some(value.parse().ok()?),
                "type" => self.match_type = MatchType::parse(value)?,
                _ => return None,
            }
        }
        Some(())
    }
}

/// Outcome of resolving a condition key
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedKey {
    Relation(Relation),
    Field(FieldKey),
    /// No usable column or operator
    Invalid,
}

/// Resolve a condition key.
pub fn resolve_key(key: &str) -> ResolvedKey {
    let key = key.trim();
    if let Some(relation) = resolve_relation(key) {
        return ResolvedKey::Relation(relation);
    }

    let (head, options) = split_options(key);
    let (column, op) = split_operator(head);
    let column = column.trim();
    if column.is_empty() {
        return ResolvedKey::Invalid;
    }

    let mut field = FieldKey::new(column, op);
    if let Some(options) = options {
        if field.apply_options(options).is_none() {
            return ResolvedKey::Invalid;
        }
    }
    ResolvedKey::Field(field)
}

/// `AND`, `OR #2`, `NOT#x` ...
fn resolve_relation(key: &str) -> Option<Relation> {
    let split = key
        .find(|c: char| c.is_whitespace() || c == '#')
        .unwrap_or(key.len());
    let (word, rest) = key.split_at(split);
    let rest = rest.trim_start();
    if !rest.is_empty() && !rest.starts_with('#') {
        return None;
    }
    Relation::from_keyword(word)
}

/// Peel a trailing `(options)` block off keys whose operator takes options.
fn split_options(key: &str) -> (&str, Option<&str>) {
    if !key.ends_with(')') {
        return (key, None);
    }
    let Some(open) = key.rfind('(') else {
        return (key, None);
    };
    let head = key[..open].trim_end();
    let takes_options = SUFFIXES
        .iter()
        .any(|(suffix, op)| op.accepts_options() && head.ends_with(suffix));
    if takes_options {
        (head, Some(&key[open + 1..key.len() - 1]))
    } else {
        (key, None)
    }
}

fn split_operator(head: &str) -> (&str, Operator) {
    for (suffix, op) in SUFFIXES {
        if let Some(column) = head.strip_suffix(suffix) {
            return (column, *op);
        }
    }
    (head, Operator::Eq)
}
