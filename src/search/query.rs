//! Boolean query tree and its JSON form

use serde_json::{json, Map, Value as Json};

use crate::request::OrderBy;
use crate::value::Value;

/// Query DSL node
#[derive(Debug, Clone, PartialEq)]
pub enum SearchQuery {
    Bool(BoolQuery),
    Term {
        field: String,
        value: Value,
    },
    Terms {
        field: String,
        values: Vec<Value>,
    },
    Range {
        field: String,
        gt: Option<Value>,
        gte: Option<Value>,
        lt: Option<Value>,
        lte: Option<Value>,
    },
    Exists {
        field: String,
    },
    Match {
        field: String,
        query: Value,
        operator: Option<String>,
        minimum_should_match: Option<String>,
        boost: Option<f64>,
    },
    MatchPhrase {
        field: String,
        query: Value,
        slop: Option<u32>,
        boost: Option<f64>,
    },
    Prefix {
        field: String,
        value: String,
    },
    Wildcard {
        field: String,
        value: String,
    },
    Regexp {
        field: String,
        value: String,
    },
    Nested {
        path: String,
        query: Box<SearchQuery>,
        inner_hits: Option<InnerHits>,
    },
    HasChild {
        child_type: String,
        query: Box<SearchQuery>,
        min_children: Option<i64>,
        max_children: Option<i64>,
        inner_hits: Option<InnerHits>,
    },
    HasParent {
        parent_type: String,
        query: Box<SearchQuery>,
        inner_hits: Option<InnerHits>,
    },
    ParentId {
        child_type: String,
        id: String,
    },
}

/// A bool query. Empty slots are omitted from the JSON form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    pub filter: Vec<SearchQuery>,
    pub must: Vec<SearchQuery>,
    pub should: Vec<SearchQuery>,
    pub must_not: Vec<SearchQuery>,
}

impl BoolQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.filter.is_empty()
            && self.must.is_empty()
            && self.should.is_empty()
            && self.must_not.is_empty()
    }

    /// Collapse to a single query. A lone positive clause is returned bare.
    pub fn into_query(mut self) -> Option<SearchQuery> {
        if self.is_empty() {
            return None;
        }
        let lone_positive = self.should.is_empty()
            && self.must_not.is_empty()
            && self.filter.len() + self.must.len() == 1;
        if lone_positive {
            return self.filter.pop().or_else(|| self.must.pop());
        }
        Some(SearchQuery::Bool(self))
    }

    /// `bool { must_not: [query] }`
    pub fn negate(query: SearchQuery) -> SearchQuery {
        SearchQuery::Bool(BoolQuery {
            must_not: vec![query],
            ..Default::default()
        })
    }

    /// `bool { should: queries }`
    pub fn any_of(queries: Vec<SearchQuery>) -> SearchQuery {
        SearchQuery::Bool(BoolQuery {
            should: queries,
            ..Default::default()
        })
    }

    pub fn to_json(&self) -> Json {
        let mut body = Map::new();
        for (slot, queries) in [
            ("filter", &self.filter),
            ("must", &self.must),
            ("should", &self.should),
            ("must_not", &self.must_not),
        ] {
            if !queries.is_empty() {
                body.insert(
                    slot.to_string(),
                    Json::Array(queries.iter().map(SearchQuery::to_json).collect()),
                );
            }
        }
        json!({ "bool": body })
    }
}

/// Inner hits requested on a nested or parent/child query, or on collapse
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InnerHits {
    pub name: Option<String>,
    /// Nested path the hits are scoped to
    pub path: Option<String>,
    /// Child type the hits are scoped to
    pub doc_type: Option<String>,
    pub size: Option<i64>,
    pub from: Option<i64>,
    pub sort: Vec<OrderBy>,
    pub source: Vec<String>,
}

impl InnerHits {
    pub fn to_json(&self) -> Json {
        let mut body = Map::new();
        if let Some(name) = &self.name {
            body.insert("name".into(), json!(name));
        }
        if let Some(size) = self.size {
            body.insert("size".into(), json!(size));
        }
        if let Some(from) = self.from {
            body.insert("from".into(), json!(from));
        }
        if !self.sort.is_empty() {
            body.insert("sort".into(), sort_json(&self.sort));
        }
        if !self.source.is_empty() {
            body.insert("_source".into(), json!({ "includes": self.source }));
        }
        // A scoped block is keyed by its path, or else its type
        if let Some(path) = self.path.as_deref().filter(|p| !p.is_empty()) {
            return json!({ "path": { path: body } });
        }
        if let Some(doc_type) = self.doc_type.as_deref().filter(|t| !t.is_empty()) {
            return json!({ "type": { doc_type: body } });
        }
        Json::Object(body)
    }
}

/// `[{"field": {"order": "desc"}}, ..]`
pub fn sort_json(order: &[OrderBy]) -> Json {
    Json::Array(
        order
            .iter()
            .map(|o| {
                json!({ o.field.clone(): { "order": if o.ascending { "asc" } else { "desc" } } })
            })
            .collect(),
    )
}

fn with_optional(mut body: Map<String, Json>, entries: &[(&str, Option<Json>)]) -> Json {
    for (key, value) in entries {
        if let Some(value) = value {
            body.insert(key.to_string(), value.clone());
        }
    }
    Json::Object(body)
}

impl SearchQuery {
    pub fn to_json(&self) -> Json {
        match self {
            SearchQuery::Bool(b) => b.to_json(),
            SearchQuery::Term { field, value } => json!({ "term": { field.clone(): value.to_json() } }),
            SearchQuery::Terms { field, values } => json!({
                "terms": { field.clone(): values.iter().map(Value::to_json).collect::<Vec<_>>() }
            }),
            SearchQuery::Range { field, gt, gte, lt, lte } => {
                let bounds = with_optional(
                    Map::new(),
                    &[
                        ("gt", gt.as_ref().map(Value::to_json)),
                        ("gte", gte.as_ref().map(Value::to_json)),
                        ("lt", lt.as_ref().map(Value::to_json)),
                        ("lte", lte.as_ref().map(Value::to_json)),
                    ],
                );
                json!({ "range": { field.clone(): bounds } })
            }
            SearchQuery::Exists { field } => json!({ "exists": { "field": field } }),
            SearchQuery::Match {
                field,
                query,
                operator,
                minimum_should_match,
                boost,
            } => {
                let mut body = Map::new();
                body.insert("query".into(), query.to_json());
                let body = with_optional(
                    body,
                    &[
                        ("operator", operator.as_ref().map(|o| json!(o))),
                        ("minimum_should_match", minimum_should_match.as_ref().map(|m| json!(m))),
                        ("boost", boost.map(|b| json!(b))),
                    ],
                );
                json!({ "match": { field.clone(): body } })
            }
            SearchQuery::MatchPhrase { field, query, slop, boost } => {
                let mut body = Map::new();
                body.insert("query".into(), query.to_json());
                let body = with_optional(
                    body,
                    &[("slop", slop.map(|s| json!(s))), ("boost", boost.map(|b| json!(b)))],
                );
                json!({ "match_phrase": { field.clone(): body } })
            }
            SearchQuery::Prefix { field, value } => {
                json!({ "prefix": { field.clone(): { "value": value } } })
            }
            SearchQuery::Wildcard { field, value } => {
                json!({ "wildcard": { field.clone(): { "value": value } } })
            }
            SearchQuery::Regexp { field, value } => {
                json!({ "regexp": { field.clone(): { "value": value } } })
            }
            SearchQuery::Nested { path, query, inner_hits } => {
                let mut body = Map::new();
                body.insert("path".into(), json!(path));
                body.insert("query".into(), query.to_json());
                let body = with_optional(body, &[("inner_hits", inner_hits.as_ref().map(InnerHits::to_json))]);
                json!({ "nested": body })
            }
            SearchQuery::HasChild {
                child_type,
                query,
                min_children,
                max_children,
                inner_hits,
            } => {
                let mut body = Map::new();
                body.insert("type".into(), json!(child_type));
                body.insert("query".into(), query.to_json());
                let body = with_optional(
                    body,
                    &[
                        ("min_children", min_children.map(|m| json!(m))),
                        ("max_children", max_children.map(|m| json!(m))),
                        ("inner_hits", inner_hits.as_ref().map(InnerHits::to_json)),
                    ],
                );
                json!({ "has_child": body })
            }
            SearchQuery::HasParent {
                parent_type,
                query,
                inner_hits,
            } => {
                let mut body = Map::new();
                body.insert("parent_type".into(), json!(parent_type));
                body.insert("query".into(), query.to_json());
                let body = with_optional(body, &[("inner_hits", inner_hits.as_ref().map(InnerHits::to_json))]);
                json!({ "has_parent": body })
            }
            SearchQuery::ParentId { child_type, id } => {
                json!({ "parent_id": { "type": child_type, "id": id } })
            }
        }
    }
}
