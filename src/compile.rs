//! Compile targets
//!
//! Each backend family turns a [`Request`] into its own plan type. The
//! engine picks the target from the destination's [`BackendKind`].

use crate::config::{BackendFamily, BackendKind, DbAddress};
use crate::error::QueryResult;
use crate::kv::{assemble_kv, KvCommand};
use crate::request::Request;
use crate::search::{compile_search, SearchPlan};
use crate::sql::{compile_sql, SqlPlan};

/// A backend family that can compile requests
pub trait CompileTarget {
    type Plan;

    fn compile(&self, request: &Request) -> QueryResult<Self::Plan>;
}

/// Relational backends; the kind selects quoting and insert strategy
#[derive(Debug, Clone, Copy)]
pub struct SqlTarget {
    pub kind: BackendKind,
}

impl CompileTarget for SqlTarget {
    type Plan = SqlPlan;

    fn compile(&self, request: &Request) -> QueryResult<SqlPlan> {
        compile_sql(self.kind, request)
    }
}

/// Search engines; path layout depends on the major version
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchTarget {
    pub major_version: Option<u32>,
}

impl CompileTarget for SearchTarget {
    type Plan = SearchPlan;

    fn compile(&self, request: &Request) -> QueryResult<SearchPlan> {
        compile_search(request, self.major_version)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KvTarget;

impl CompileTarget for KvTarget {
    type Plan = KvCommand;

    fn compile(&self, request: &Request) -> QueryResult<KvCommand> {
        assemble_kv(request)
    }
}

/// A compiled request for any family
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Sql(SqlPlan),
    Search(SearchPlan),
    Kv(KvCommand),
}

impl Plan {
    pub fn is_write(&self) -> bool {
        match self {
            Plan::Sql(plan) => plan.op().is_write(),
            Plan::Search(plan) => plan.op.is_write(),
            Plan::Kv(cmd) => cmd.is_write(),
        }
    }

    /// Statement text for logs
    pub fn describe(&self) -> String {
        match self {
            Plan::Sql(plan) => plan.statement_text(),
            Plan::Search(plan) => plan.request.describe(),
            Plan::Kv(cmd) => cmd.describe(),
        }
    }
}

/// Compile `request` for the backend at `addr`.
pub fn compile(request: &Request, addr: &DbAddress) -> QueryResult<Plan> {
    match addr.kind.family() {
        BackendFamily::Sql => SqlTarget { kind: addr.kind }.compile(request).map(Plan::Sql),
        BackendFamily::Search => SearchTarget {
            major_version: addr.major_version(),
        }
        .compile(request)
        .map(Plan::Search),
        BackendFamily::KeyValue => KvTarget.compile(request).map(Plan::Kv),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(v: serde_json::Value) -> Request {
        Request::from_json(v).unwrap()
    }

    #[test]
    fn test_dispatch_by_family() {
        let find = request(json!({"op": "find_all", "tables": ["users"], "where": {"id": 1}}));

        let sql = compile(&find, &DbAddress::new(BackendKind::Mysql, "m")).unwrap();
        assert!(matches!(sql, Plan::Sql(_)));
        assert!(!sql.is_write());

        let search = compile(&find, &DbAddress::new(BackendKind::Elastic, "e")).unwrap();
        assert!(matches!(search, Plan::Search(_)));
        assert!(search.describe().starts_with("POST /users/_search"));

        let kv = request(json!({"op": "SET", "key": "k", "value": "v"}));
        let plan = compile(&kv, &DbAddress::new(BackendKind::Redis, "r")).unwrap();
        assert!(plan.is_write());
        assert_eq!(plan.describe(), "SET k v");
    }

    #[test]
    fn test_grammar_error_before_backend() {
        let bad = request(json!({"op": "find", "tables": ["t"], "where": {"age<>": [1]}}));
        assert!(compile(&bad, &DbAddress::new(BackendKind::Postgres, "p")).is_err());
    }

    #[test]
    fn test_targets_are_idempotent() {
        let req = request(json!({"op": "find_all", "tables": ["t"], "where": {"a>": 1, "b": "x"}}));
        let target = SqlTarget { kind: BackendKind::Sqlite };
        assert_eq!(target.compile(&req).unwrap(), target.compile(&req).unwrap());
    }
}
