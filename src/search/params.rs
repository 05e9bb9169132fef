//! Closed parameter sets for search augmentations
//!
//! Inner hits, collapse and highlight each accept a fixed set of parameters.
//! Anything else is rejected with `[<query>] query does not support field [<name>]`.

use serde_json::{json, Map, Value as Json};

use crate::error::{QueryError, QueryResult};
use crate::request::OrderBy;

use super::query::InnerHits;

/// Reject keys outside `allowed`.
pub fn check_fields<'a>(
    query: &str,
    keys: impl IntoIterator<Item = &'a String>,
    allowed: &[&str],
) -> QueryResult<()> {
    for key in keys {
        if !allowed.contains(&key.as_str()) {
            return Err(QueryError::unsupported_param(query, key.clone()));
        }
    }
    Ok(())
}

fn as_object<'a>(query: &str, name: &str, value: &'a Json) -> QueryResult<&'a Map<String, Json>> {
    value
        .as_object()
        .ok_or_else(|| QueryError::invalid_value(format!("{}`s param [{}] is not a map", query, name)))
}

fn opt_i64(query: &str, map: &Map<String, Json>, name: &str) -> QueryResult<Option<i64>> {
    match map.get(name) {
        None | Some(Json::Null) => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| {
            QueryError::invalid_value(format!("{}`s param [{}] is not an integer", query, name))
        }),
    }
}

fn opt_string(query: &str, map: &Map<String, Json>, name: &str) -> QueryResult<Option<String>> {
    match map.get(name) {
        None | Some(Json::Null) => Ok(None),
        Some(Json::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(QueryError::invalid_value(format!(
            "{}`s param [{}] is not a string",
            query, name
        ))),
    }
}

fn string_list(query: &str, map: &Map<String, Json>, name: &str) -> QueryResult<Vec<String>> {
    match map.get(name) {
        None | Some(Json::Null) => Ok(Vec::new()),
        Some(Json::Array(items)) => items
            .iter()
            .map(|i| {
                i.as_str().map(str::to_string).ok_or_else(|| {
                    QueryError::invalid_value(format!(
                        "{}`s param [{}] is not a string array",
                        query, name
                    ))
                })
            })
            .collect(),
        Some(_) => Err(QueryError::invalid_value(format!(
            "{}`s param [{}] is not a string array",
            query, name
        ))),
    }
}

/// Parse one inner hits block. An empty map requests default inner hits.
pub fn parse_inner_hits(value: &Json) -> QueryResult<InnerHits> {
    const QUERY: &str = "inner_hits";
    let map = as_object(QUERY, QUERY, value)?;
    check_fields(
        QUERY,
        map.keys(),
        &["name", "path", "type", "size", "from", "order", "column"],
    )?;
    Ok(InnerHits {
        name: opt_string(QUERY, map, "name")?,
        path: opt_string(QUERY, map, "path")?,
        doc_type: opt_string(QUERY, map, "type")?,
        size: opt_i64(QUERY, map, "size")?,
        from: opt_i64(QUERY, map, "from")?,
        sort: string_list(QUERY, map, "order")?
            .iter()
            .filter_map(|o| OrderBy::parse(o))
            .collect(),
        source: string_list(QUERY, map, "column")?,
    })
}

/// Field collapsing
#[derive(Debug, Clone, PartialEq)]
pub struct CollapseSpec {
    pub field: String,
    pub inner_hits: Vec<InnerHits>,
    pub max_concurrent_group_searches: Option<i64>,
}

impl CollapseSpec {
    pub fn parse(value: &Json) -> QueryResult<Self> {
        const QUERY: &str = "collapse";
        let map = as_object(QUERY, QUERY, value)?;
        check_fields(
            QUERY,
            map.keys(),
            &["field", "inner_hits", "max_concurrent_group_searches"],
        )?;
        let field = opt_string(QUERY, map, "field")?
            .filter(|f| !f.is_empty())
            .ok_or_else(|| QueryError::missing_param("field", QUERY))?;

        // `inner_hits` is either one block or a name -> block map
        let inner_hits = match map.get("inner_hits") {
            None | Some(Json::Null) => Vec::new(),
            Some(Json::Array(items)) => items.iter().map(parse_inner_hits).collect::<QueryResult<_>>()?,
            Some(Json::Object(blocks)) if blocks.values().all(Json::is_object) && !blocks.is_empty() => {
                let mut hits = Vec::with_capacity(blocks.len());
                for (name, block) in blocks {
                    let mut parsed = parse_inner_hits(block)?;
                    parsed.name.get_or_insert_with(|| name.clone());
                    hits.push(parsed);
                }
                hits
            }
            Some(other) => vec![parse_inner_hits(other)?],
        };

        Ok(Self {
            field,
            inner_hits,
            max_concurrent_group_searches: opt_i64(QUERY, map, "max_concurrent_group_searches")?,
        })
    }

    pub fn to_json(&self) -> Json {
        let mut body = Map::new();
        body.insert("field".into(), json!(self.field));
        match self.inner_hits.as_slice() {
            [] => {}
            [single] => {
                body.insert("inner_hits".into(), single.to_json());
            }
            many => {
                body.insert(
                    "inner_hits".into(),
                    Json::Array(many.iter().map(InnerHits::to_json).collect()),
                );
            }
        }
        if let Some(n) = self.max_concurrent_group_searches {
            body.insert("max_concurrent_group_searches".into(), json!(n));
        }
        Json::Object(body)
    }
}

/// One highlighted field
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightSpec {
    pub field: String,
    pub pre_tag: Option<String>,
    pub post_tag: Option<String>,
    /// Drop the original field from results, keeping only `highlight_<field>`
    pub replace: bool,
}

impl HighlightSpec {
    /// Parse the `highlights` array
    pub fn parse_list(value: &Json) -> QueryResult<Vec<Self>> {
        const QUERY: &str = "highlights";
        let items = value
            .as_array()
            .ok_or_else(|| QueryError::invalid_value("[highlights] is not an array"))?;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let map = as_object(QUERY, QUERY, item)?;
            check_fields(QUERY, map.keys(), &["field", "pre_tag", "post_tag", "replace"])?;
            let field = opt_string(QUERY, map, "field")?
                .filter(|f| !f.is_empty())
                .ok_or_else(|| QueryError::missing_param("field", QUERY))?;
            out.push(Self {
                field,
                pre_tag: opt_string(QUERY, map, "pre_tag")?,
                post_tag: opt_string(QUERY, map, "post_tag")?,
                replace: map.get("replace").and_then(Json::as_bool).unwrap_or(false),
            });
        }
        Ok(out)
    }

    /// The `highlight` section of a search body
    pub fn section(specs: &[Self]) -> Json {
        let mut fields = Map::new();
        for spec in specs {
            let mut body = Map::new();
            if let Some(pre) = &spec.pre_tag {
                body.insert("pre_tags".into(), json!([pre]));
            }
            if let Some(post) = &spec.post_tag {
                body.insert("post_tags".into(), json!([post]));
            }
            fields.insert(spec.field.clone(), Json::Object(body));
        }
        json!({ "fields": fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_hits_closed_set() {
        let err = parse_inner_hits(&json!({"size": 1, "colour": "red"})).unwrap_err();
        assert_eq!(err.to_string(), "[inner_hits] query does not support field [colour]");
    }

    #[test]
    fn test_inner_hits_fields() {
        let hits = parse_inner_hits(&json!({
            "name": "latest",
            "size": 2,
            "order": ["-at"],
            "column": ["text"]
        }))
        .unwrap();
        assert_eq!(hits.name.as_deref(), Some("latest"));
        assert_eq!(hits.size, Some(2));
        assert!(!hits.sort[0].ascending);
        assert_eq!(hits.source, vec!["text".to_string()]);
    }

    #[test]
    fn test_inner_hits_path_and_type() {
        let hits = parse_inner_hits(&json!({"path": "comments", "size": 1})).unwrap();
        assert_eq!(hits.path.as_deref(), Some("comments"));
        assert_eq!(hits.to_json(), json!({"path": {"comments": {"size": 1}}}));

        let hits = parse_inner_hits(&json!({"type": "answer"})).unwrap();
        assert_eq!(hits.doc_type.as_deref(), Some("answer"));
        assert_eq!(hits.to_json(), json!({"type": {"answer": {}}}));
    }

    #[test]
    fn test_empty_inner_hits_is_default() {
        assert_eq!(parse_inner_hits(&json!({})).unwrap(), InnerHits::default());
    }

    #[test]
    fn test_collapse_requires_field() {
        assert!(matches!(
            CollapseSpec::parse(&json!({})),
            Err(QueryError::MissingParam { .. })
        ));
        assert!(CollapseSpec::parse(&json!({"field": "uid", "bogus": 1})).is_err());
    }

    #[test]
    fn test_collapse_named_inner_hits() {
        let spec = CollapseSpec::parse(&json!({
            "field": "uid",
            "inner_hits": {"recent": {"size": 1}}
        }))
        .unwrap();
        assert_eq!(spec.inner_hits[0].name.as_deref(), Some("recent"));
        assert_eq!(
            spec.to_json(),
            json!({"field": "uid", "inner_hits": {"name": "recent", "size": 1}})
        );
    }

    #[test]
    fn test_highlights() {
        let specs = HighlightSpec::parse_list(&json!([
            {"field": "title", "pre_tag": "<b>", "post_tag": "</b>", "replace": true}
        ]))
        .unwrap();
        assert!(specs[0].replace);
        assert_eq!(
            HighlightSpec::section(&specs),
            json!({"fields": {"title": {"pre_tags": ["<b>"], "post_tags": ["</b>"]}}})
        );
        assert!(HighlightSpec::parse_list(&json!([{"field": "t", "x": 1}])).is_err());
    }
}
