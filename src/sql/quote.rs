//! Identifier quoting
//!
//! Plain identifiers are quoted segment by segment (`a.b` becomes `` `a`.`b` ``).
//! Anything containing characters that cannot appear in a bare identifier is
//! treated as an expression and passed through untouched.

const SPECIAL_CHARS: &str = " `\"'~!@$%^&*()+=|[]{}:;?,<>/\\\t\n";

/// True when `name` looks like an expression rather than an identifier.
pub fn has_special(name: &str) -> bool {
    name.chars().any(|c| SPECIAL_CHARS.contains(c))
}

/// Quote a column reference.
pub fn quote_column(name: &str, quote: char) -> String {
    let name = name.trim();
    if name.is_empty() || has_special(name) {
        return name.to_string();
    }
    name.split('.')
        .map(|segment| format!("{q}{s}{q}", q = quote, s = segment))
        .collect::<Vec<_>>()
        .join(".")
}

/// Split `"t AS a"` or `"t a"` into table and alias.
pub fn split_alias(name: &str) -> (&str, Option<&str>) {
    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.as_slice() {
        [table, kw, alias] if kw.eq_ignore_ascii_case("as") => (*table, Some(*alias)),
        [table, alias] => (*table, Some(*alias)),
        _ => (name.trim(), None),
    }
}

/// Quote a table reference, keeping an optional alias.
pub fn quote_table(name: &str, quote: char) -> String {
    let (table, alias) = split_alias(name);
    match alias {
        Some(alias) => format!(
            "{} AS {}",
            quote_column(table, quote),
            quote_column(alias, quote)
        ),
        None => quote_column(table, quote),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_plain_column() {
        assert_eq!(quote_column("name", '`'), "`name`");
        assert_eq!(quote_column("u.name", '`'), "`u`.`name`");
        assert_eq!(quote_column("name", '"'), "\"name\"");
    }

    #[test]
    fn test_expressions_pass_through() {
        assert_eq!(quote_column("COUNT(*)", '`'), "COUNT(*)");
        assert_eq!(quote_column("a + b", '`'), "a + b");
        assert_eq!(quote_column("`already`", '`'), "`already`");
        assert_eq!(quote_column("*", '`'), "*");
    }

    #[test]
    fn test_split_alias() {
        assert_eq!(split_alias("users AS u"), ("users", Some("u")));
        assert_eq!(split_alias("users u"), ("users", Some("u")));
        assert_eq!(split_alias("users"), ("users", None));
    }

    #[test]
    fn test_quote_table_with_alias() {
        assert_eq!(quote_table("users as u", '`'), "`users` AS `u`");
    }
}
