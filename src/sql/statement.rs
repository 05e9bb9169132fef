//! SQL statement builder
//!
//! A [`Statement`] accumulates clause fragments and their parameters, then
//! renders one of INSERT / REPLACE / UPDATE / DELETE / SELECT / COUNT. Every
//! rendered statement is checked so that the placeholder count equals the
//! number of bound parameters.

use crate::condition::Condition;
use crate::config::BackendKind;
use crate::error::{QueryError, QueryResult};
use crate::request::{JoinKind, JoinSpec, OrderBy};
use crate::value::{Record, Value};

use super::clause::compile_clause;
use super::quote::{quote_column, quote_table};

/// Final statement text with its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSql {
    pub sql: String,
    pub params: Vec<Value>,
}

impl CompiledSql {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Count `?` placeholders outside quoted identifiers and string literals.
    pub fn placeholder_count(&self) -> usize {
        let mut count = 0;
        let mut open: Option<char> = None;
        for c in self.sql.chars() {
            match open {
                Some(q) if c == q => open = None,
                Some(_) => {}
                None => match c {
                    '`' | '"' | '\'' => open = Some(c),
                    '?' => count += 1,
                    _ => {}
                },
            }
        }
        count
    }

    pub fn verify(self) -> QueryResult<Self> {
        let placeholders = self.placeholder_count();
        if placeholders != self.params.len() {
            return Err(QueryError::ParamMismatch {
                placeholders,
                params: self.params.len(),
            });
        }
        Ok(self)
    }

    /// Render with parameters inlined. For logs and error messages only.
    pub fn interpolate(&self) -> String {
        let mut out = String::with_capacity(self.sql.len() + self.params.len() * 8);
        let mut params = self.params.iter();
        let mut open: Option<char> = None;
        for c in self.sql.chars() {
            match open {
                Some(q) if c == q => open = None,
                Some(_) => {}
                None => match c {
                    '`' | '"' | '\'' => open = Some(c),
                    '?' => {
                        if let Some(p) = params.next() {
                            out.push_str(&render_literal(p));
                            continue;
                        }
                    }
                    _ => {}
                },
            }
            out.push(c);
        }
        out
    }
}

fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) | Value::Int(_) | Value::UInt(_) | Value::Float(_) => {
            value.to_wire_string()
        }
        other => format!("'{}'", other.to_wire_string().replace('\'', "''")),
    }
}

/// Statement under construction
#[derive(Debug, Clone)]
pub struct Statement {
    kind: BackendKind,
    quote: char,
    table: String,
    alias: Option<String>,
    selects: Vec<String>,
    distinct: bool,
    joins: Vec<String>,
    where_sql: String,
    where_params: Vec<Value>,
    having_sql: String,
    having_params: Vec<Value>,
    group: Vec<String>,
    order: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    for_update: bool,
    set_sql: String,
    set_params: Vec<Value>,
}

impl Statement {
    pub fn new(kind: BackendKind, table: &str) -> QueryResult<Self> {
        if table.trim().is_empty() {
            return Err(QueryError::invalid_request("no table specified"));
        }
        Ok(Self {
            kind,
            quote: kind.quote_char(),
            table: table.trim().to_string(),
            alias: None,
            selects: Vec::new(),
            distinct: false,
            joins: Vec::new(),
            where_sql: String::new(),
            where_params: Vec::new(),
            having_sql: String::new(),
            having_params: Vec::new(),
            group: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            for_update: false,
            set_sql: String::new(),
            set_params: Vec::new(),
        })
    }

    pub fn alias(&mut self, alias: Option<&str>) -> &mut Self {
        self.alias = alias.filter(|a| !a.trim().is_empty()).map(|a| a.trim().to_string());
        self
    }

    pub fn columns(&mut self, columns: &[String]) -> &mut Self {
        self.selects = columns
            .iter()
            .filter(|c| !c.trim().is_empty())
            .map(|c| quote_column(c, self.quote))
            .collect();
        self
    }

    pub fn distinct(&mut self, distinct: bool) -> &mut Self {
        self.distinct = distinct;
        self
    }

    pub fn join(&mut self, spec: &JoinSpec) -> QueryResult<&mut Self> {
        let mut sql = format!("{} {}", spec.kind.keyword(), quote_table(&spec.table, self.quote));
        if !spec.using.is_empty() {
            let cols: Vec<String> = spec.using.iter().map(|c| quote_column(c, self.quote)).collect();
            sql.push_str(&format!(" USING ({})", cols.join(", ")));
        } else if !spec.on.is_empty() {
            let pairs: Vec<String> = spec
                .on
                .iter()
                .map(|(l, r)| {
                    format!("{} = {}", quote_column(l, self.quote), quote_column(r, self.quote))
                })
                .collect();
            sql.push_str(&format!(" ON {}", pairs.join(" AND ")));
        } else if spec.kind != JoinKind::Cross {
            return Err(QueryError::malformed(format!(
                "join on `{}` needs `using` or `on`",
                spec.table
            )));
        }
        self.joins.push(sql);
        Ok(self)
    }

    pub fn where_condition(&mut self, condition: &Condition) -> QueryResult<&mut Self> {
        let clause = compile_clause(condition, self.quote)?;
        self.where_sql = clause.sql;
        self.where_params = clause.params;
        Ok(self)
    }

    pub fn having_condition(&mut self, condition: &Condition) -> QueryResult<&mut Self> {
        let clause = compile_clause(condition, self.quote)?;
        self.having_sql = clause.sql;
        self.having_params = clause.params;
        Ok(self)
    }

    pub fn group_by(&mut self, columns: &[String]) -> &mut Self {
        self.group = columns
            .iter()
            .filter(|c| !c.trim().is_empty())
            .map(|c| quote_column(c, self.quote))
            .collect();
        self
    }

    pub fn order_by(&mut self, order: &[OrderBy]) -> &mut Self {
        self.order = order
            .iter()
            .map(|o| {
                let col = quote_column(&o.field, self.quote);
                if o.ascending {
                    col
                } else {
                    format!("{} DESC", col)
                }
            })
            .collect();
        self
    }

    pub fn limit(&mut self, limit: Option<u64>) -> &mut Self {
        self.limit = limit.filter(|l| *l > 0);
        self
    }

    pub fn offset(&mut self, offset: Option<u64>) -> &mut Self {
        self.offset = offset.filter(|o| *o > 0);
        self
    }

    pub fn for_update(&mut self, lock: bool) -> &mut Self {
        self.for_update = lock;
        self
    }

    /// Multi-row VALUES clause. Every row must carry the first row's key set.
    pub fn set_rows(&mut self, rows: &[&Record]) -> QueryResult<&mut Self> {
        let (columns, values) = insert_values(rows)?;
        let quoted: Vec<String> = columns.iter().map(|c| quote_column(c, self.quote)).collect();
        let row_sql = format!("({})", vec!["?"; columns.len()].join(", "));
        self.set_sql = format!(
            "({}) VALUES {}",
            quoted.join(", "),
            vec![row_sql.as_str(); values.len()].join(", ")
        );
        self.set_params = values.into_iter().flatten().collect();
        Ok(self)
    }

    /// `a = ?, b = ?` assignments
    pub fn update_map(&mut self, data: &Record) -> QueryResult<&mut Self> {
        if data.is_empty() {
            return Err(QueryError::invalid_request("update requires data"));
        }
        let mut parts = Vec::with_capacity(data.len());
        let mut params = Vec::with_capacity(data.len());
        for (column, value) in data {
            parts.push(format!("{} = ?", quote_column(column, self.quote)));
            params.push(value.clone());
        }
        self.set_sql = parts.join(", ");
        self.set_params = params;
        Ok(self)
    }

    fn from_clause(&self) -> String {
        let mut sql = quote_table(&self.table, self.quote);
        if let Some(alias) = &self.alias {
            sql.push_str(&format!(" AS {}", quote_column(alias, self.quote)));
        }
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        sql
    }

    fn push_filters(&self, sql: &mut String, params: &mut Vec<Value>) {
        if !self.where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_sql);
            params.extend(self.where_params.iter().cloned());
        }
        if !self.group.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group.join(", "));
        }
        if !self.having_sql.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&self.having_sql);
            params.extend(self.having_params.iter().cloned());
        }
    }

    pub fn build_select(&self) -> QueryResult<CompiledSql> {
        let columns = if self.selects.is_empty() {
            "*".to_string()
        } else {
            self.selects.join(", ")
        };
        let mut sql = format!(
            "SELECT {}{} FROM {}",
            if self.distinct { "DISTINCT " } else { "" },
            columns,
            self.from_clause()
        );
        let mut params = Vec::new();
        self.push_filters(&mut sql, &mut params);
        if !self.order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        if self.for_update {
            sql.push_str(" FOR UPDATE");
        }
        CompiledSql::new(sql, params).verify()
    }

    /// `count(*)`, `count(col)` or `count(DISTINCT col)`
    pub fn build_count(&self) -> QueryResult<CompiledSql> {
        let target = if self.selects.is_empty() {
            "*".to_string()
        } else if self.distinct {
            format!("DISTINCT {}", self.selects.join(", "))
        } else {
            self.selects.join(", ")
        };

        let mut params = Vec::new();
        let sql = if self.group.is_empty() {
            let mut sql = format!("SELECT count({}) FROM {}", target, self.from_clause());
            self.push_filters(&mut sql, &mut params);
            sql
        } else {
            let mut inner = format!("SELECT 1 FROM {}", self.from_clause());
            self.push_filters(&mut inner, &mut params);
            format!("SELECT count(*) FROM ({}) AS grouped", inner)
        };
        CompiledSql::new(sql, params).verify()
    }

    pub fn build_insert(&self, replace: bool) -> QueryResult<CompiledSql> {
        if self.set_sql.is_empty() {
            return Err(QueryError::invalid_request("insert requires data"));
        }
        if replace && matches!(self.kind, BackendKind::Postgres | BackendKind::Clickhouse) {
            return Err(QueryError::invalid_request(format!(
                "replace is not supported by {}",
                self.kind
            )));
        }
        let verb = if replace { "REPLACE" } else { "INSERT" };
        let sql = format!(
            "{} INTO {} {}",
            verb,
            quote_table(&self.table, self.quote),
            self.set_sql
        );
        CompiledSql::new(sql, self.set_params.clone()).verify()
    }

    pub fn build_update(&self) -> QueryResult<CompiledSql> {
        if self.set_sql.is_empty() {
            return Err(QueryError::invalid_request("update requires data"));
        }
        let table = quote_table(&self.table, self.quote);
        let mut sql = match self.kind {
            BackendKind::Clickhouse => format!("ALTER TABLE {} UPDATE {}", table, self.set_sql),
            _ => format!("UPDATE {} SET {}", table, self.set_sql),
        };
        let mut params = self.set_params.clone();
        self.push_mutation_filter(&mut sql, &mut params);
        CompiledSql::new(sql, params).verify()
    }

    pub fn build_delete(&self) -> QueryResult<CompiledSql> {
        let table = quote_table(&self.table, self.quote);
        let mut sql = match self.kind {
            BackendKind::Clickhouse => format!("ALTER TABLE {} DELETE", table),
            _ => format!("DELETE FROM {}", table),
        };
        let mut params = Vec::new();
        self.push_mutation_filter(&mut sql, &mut params);
        CompiledSql::new(sql, params).verify()
    }

    // ClickHouse mutations require a WHERE clause
    fn push_mutation_filter(&self, sql: &mut String, params: &mut Vec<Value>) {
        if !self.where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_sql);
            params.extend(self.where_params.iter().cloned());
        } else if self.kind == BackendKind::Clickhouse {
            sql.push_str(" WHERE 1");
        }
    }
}

/// Column list from the first row plus each row's values in that order.
pub fn insert_values(rows: &[&Record]) -> QueryResult<(Vec<String>, Vec<Vec<Value>>)> {
    let first = rows
        .first()
        .filter(|r| !r.is_empty())
        .ok_or_else(|| QueryError::invalid_request("insert requires data"))?;
    let columns: Vec<String> = first.keys().cloned().collect();

    let mut values = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        if row.len() != columns.len() || !columns.iter().all(|c| row.contains_key(c)) {
            return Err(QueryError::invalid_value(format!(
                "row {} has a different column set than row 0",
                index
            )));
        }
        values.push(columns.iter().map(|c| row[c].clone()).collect());
    }
    Ok((columns, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::record_from_json;
    use serde_json::json;

    fn record(v: serde_json::Value) -> Record {
        record_from_json(v).unwrap()
    }

    fn cond(v: serde_json::Value) -> Condition {
        Condition::from_json(v).unwrap()
    }

    #[test]
    fn test_select_full() {
        let mut stmt = Statement::new(BackendKind::Mysql, "users").unwrap();
        stmt.columns(&["id".to_string(), "name".to_string()])
            .order_by(&[OrderBy { field: "id".into(), ascending: false }])
            .limit(Some(10))
            .offset(Some(20));
        stmt.where_condition(&cond(json!({"age>": 18}))).unwrap();
        let compiled = stmt.build_select().unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT `id`, `name` FROM `users` WHERE `age` > ? ORDER BY `id` DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(compiled.params, vec![Value::Int(18)]);
    }

    #[test]
    fn test_select_with_join_group_having() {
        let mut stmt = Statement::new(BackendKind::Mysql, "orders AS o").unwrap();
        stmt.join(&JoinSpec {
            kind: JoinKind::Left,
            table: "users u".into(),
            using: vec![],
            on: [("o.user_id".to_string(), "u.id".to_string())].into_iter().collect(),
        })
        .unwrap();
        stmt.columns(&["u.name".to_string(), "COUNT(*) AS n".to_string()])
            .group_by(&["u.name".to_string()]);
        stmt.where_condition(&cond(json!({"o.status": 1}))).unwrap();
        stmt.having_condition(&cond(json!({"COUNT(*) >": 2}))).unwrap();

        let compiled = stmt.build_select().unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT `u`.`name`, COUNT(*) AS n FROM `orders` AS `o` \
             LEFT JOIN `users` AS `u` ON `o`.`user_id` = `u`.`id` \
             WHERE `o`.`status` = ? GROUP BY `u`.`name` HAVING COUNT(*) > ?"
        );
        assert_eq!(compiled.params, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_join_without_keys_is_error() {
        let mut stmt = Statement::new(BackendKind::Mysql, "a").unwrap();
        let spec = JoinSpec { table: "b".into(), ..Default::default() };
        assert!(stmt.join(&spec).is_err());
        let cross = JoinSpec { kind: JoinKind::Cross, table: "b".into(), ..Default::default() };
        assert!(stmt.join(&cross).is_ok());
    }

    #[test]
    fn test_multi_row_insert() {
        let rows = [record(json!({"a": 1, "b": "x"})), record(json!({"a": 2, "b": "y"}))];
        let refs: Vec<&Record> = rows.iter().collect();
        let mut stmt = Statement::new(BackendKind::Mysql, "t").unwrap();
        stmt.set_rows(&refs).unwrap();
        let compiled = stmt.build_insert(false).unwrap();
        assert_eq!(compiled.sql, "INSERT INTO `t` (`a`, `b`) VALUES (?, ?), (?, ?)");
        assert_eq!(
            compiled.params,
            vec![Value::Int(1), Value::from("x"), Value::Int(2), Value::from("y")]
        );
    }

    #[test]
    fn test_heterogeneous_rows_rejected() {
        let rows = [record(json!({"a": 1})), record(json!({"b": 2}))];
        let refs: Vec<&Record> = rows.iter().collect();
        let mut stmt = Statement::new(BackendKind::Mysql, "t").unwrap();
        assert!(matches!(stmt.set_rows(&refs), Err(QueryError::InvalidValue(_))));
    }

    #[test]
    fn test_update_params_precede_where_params() {
        let mut stmt = Statement::new(BackendKind::Mysql, "t").unwrap();
        stmt.update_map(&record(json!({"name": "z"}))).unwrap();
        stmt.where_condition(&cond(json!({"id": 7}))).unwrap();
        let compiled = stmt.build_update().unwrap();
        assert_eq!(compiled.sql, "UPDATE `t` SET `name` = ? WHERE `id` = ?");
        assert_eq!(compiled.params, vec![Value::from("z"), Value::Int(7)]);
    }

    #[test]
    fn test_clickhouse_mutations() {
        let mut stmt = Statement::new(BackendKind::Clickhouse, "events").unwrap();
        stmt.update_map(&record(json!({"flag": 1}))).unwrap();
        assert_eq!(
            stmt.build_update().unwrap().sql,
            "ALTER TABLE `events` UPDATE `flag` = ? WHERE 1"
        );

        stmt.where_condition(&cond(json!({"id": 1}))).unwrap();
        assert_eq!(
            stmt.build_delete().unwrap().sql,
            "ALTER TABLE `events` DELETE WHERE `id` = ?"
        );
    }

    #[test]
    fn test_replace_rejected_on_postgres() {
        let row = record(json!({"a": 1}));
        let mut stmt = Statement::new(BackendKind::Postgres, "t").unwrap();
        stmt.set_rows(&[&row]).unwrap();
        assert!(stmt.build_insert(true).is_err());
        assert_eq!(stmt.build_insert(false).unwrap().sql, "INSERT INTO \"t\" (\"a\") VALUES (?)");
    }

    #[test]
    fn test_count_variants() {
        let mut stmt = Statement::new(BackendKind::Mysql, "t").unwrap();
        assert_eq!(stmt.build_count().unwrap().sql, "SELECT count(*) FROM `t`");

        stmt.columns(&["uid".to_string()]).distinct(true);
        assert_eq!(stmt.build_count().unwrap().sql, "SELECT count(DISTINCT `uid`) FROM `t`");

        stmt.columns(&[]).distinct(false).group_by(&["g".to_string()]);
        assert_eq!(
            stmt.build_count().unwrap().sql,
            "SELECT count(*) FROM (SELECT 1 FROM `t` GROUP BY `g`) AS grouped"
        );
    }

    #[test]
    fn test_placeholder_count_skips_quoted_text() {
        let sql = CompiledSql::new("SELECT '?' FROM `a?` WHERE x = ?", vec![Value::Int(1)]);
        assert_eq!(sql.placeholder_count(), 1);
        assert!(sql.verify().is_ok());
    }

    #[test]
    fn test_mismatch_is_rejected() {
        let sql = CompiledSql::new("SELECT * FROM t WHERE a = ? AND b = ?", vec![Value::Int(1)]);
        assert!(matches!(
            sql.verify(),
            Err(QueryError::ParamMismatch { placeholders: 2, params: 1 })
        ));
    }

    #[test]
    fn test_interpolate() {
        let sql = CompiledSql::new(
            "SELECT * FROM `t` WHERE a = ? AND b = ? AND c = ?",
            vec![Value::Int(1), Value::from("it's"), Value::Null],
        );
        assert_eq!(
            sql.interpolate(),
            "SELECT * FROM `t` WHERE a = 1 AND b = 'it''s' AND c = null"
        );
    }
}
