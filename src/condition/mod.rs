//! Condition model and key resolution
//!
//! A [`Condition`] is the backend-agnostic filter tree shared by every
//! compiler. Keys are resolved with [`resolve_key`] into either a column with
//! a comparison [`Operator`] or a connector/relation ([`Relation`]).
//!
//! # Connector semantics
//!
//! - Top-level keys are joined with AND.
//! - `AND {..}` / `OR {..}` group their children with that connector.
//! - `NOT {..}` negates the AND of its children.
//! - `AND [m1, m2]` joins the groups with AND and each group's keys with OR;
//!   `OR [..]` and `NOT [..]` do the opposite.

mod model;
mod operator;

pub use model::{Condition, ConditionValue};
pub use operator::{resolve_key, FieldKey, MatchType, Operator, Relation, ResolvedKey};

use crate::error::{QueryError, QueryResult};

/// How children of a relation group are connected, and how array elements
/// of that relation are split into sub-groups.
///
/// Returns `(connector for map children, connector between array elements,
/// connector inside each array element)`.
pub fn relation_connectors(relation: Relation) -> (Relation, Relation, Relation) {
    match relation {
        Relation::Or => (Relation::Or, Relation::Or, Relation::And),
        Relation::And => (Relation::And, Relation::And, Relation::Or),
        _ => (Relation::And, Relation::Or, Relation::And),
    }
}

/// Resolve `key` into a field, rejecting keys with no usable operator.
pub fn resolve_field(key: &str) -> QueryResult<FieldKey> {
    match resolve_key(key) {
        ResolvedKey::Field(field) => Ok(field),
        ResolvedKey::Relation(_) | ResolvedKey::Invalid => {
            Err(QueryError::unsupported_field(key))
        }
    }
}
