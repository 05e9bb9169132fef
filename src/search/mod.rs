//! Search-engine query compiler
//!
//! Compiles the condition model into a boolean query tree, plans the HTTP
//! call for each operation and decodes hits back into records.
//!
//! Slot placement follows the connecting relation:
//!
//! - AND-connected exact leaves go to `filter`, match and like leaves to `must`
//! - OR-connected leaves go to `should`
//! - negated leaves go to `must_not`, or to `should: [bool { must_not }]` under OR
//! - a NOT group is wrapped in `must_not`

mod compile;
mod hits;
mod params;
mod plan;
mod query;

pub use compile::compile_condition;
pub use hits::{check_error, decode_bulk, decode_by_query, decode_doc_write, decode_search, SearchHits};
pub use params::{check_fields, parse_inner_hits, CollapseSpec, HighlightSpec};
pub use plan::{
    compile_search, DecodeOptions, HttpMethod, SearchOp, SearchPayload, SearchPlan, SearchRequest,
};
pub use query::{sort_json, BoolQuery, InnerHits, SearchQuery};
