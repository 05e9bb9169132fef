//! Named-parameter schedules
//!
//! A schedule lists, in wire order, the named parameters a command accepts
//! after its key and how each one contributes to the argument list.

use std::collections::BTreeMap;

use serde_json::Value as Json;

use super::command::Command;
use crate::error::{QueryError, QueryResult};

/// How a parameter contributes arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// The value alone, for example `min` in `ZRANGEBYSCORE key min max`
    Value,
    /// The token alone when the parameter is truthy, for example `WITHSCORES`
    Flag,
    /// The token followed by the value, for example `EX 10`
    FlagValue,
    /// The token followed by exactly `n` values from an array, for example `LIMIT 0 10`
    FlagValues(usize),
}

/// One named parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub token: &'static str,
    pub arity: Arity,
    pub required: bool,
}

const fn value(name: &'static str, required: bool) -> ParamSpec {
    ParamSpec { name, token: "", arity: Arity::Value, required }
}

const fn flag(name: &'static str, token: &'static str) -> ParamSpec {
    ParamSpec { name, token, arity: Arity::Flag, required: false }
}

const fn flag_value(name: &'static str, token: &'static str) -> ParamSpec {
    ParamSpec { name, token, arity: Arity::FlagValue, required: false }
}

const fn flag_values(name: &'static str, token: &'static str, n: usize) -> ParamSpec {
    ParamSpec { name, token, arity: Arity::FlagValues(n), required: false }
}

const SET: &[ParamSpec] = &[
    flag_value("ex", "EX"),
    flag_value("px", "PX"),
    flag("nx", "NX"),
    flag("xx", "XX"),
    flag("keepttl", "KEEPTTL"),
    flag("get", "GET"),
];

const BITCOUNT: &[ParamSpec] = &[value("start", false), value("end", false)];

const ZRANGE: &[ParamSpec] = &[
    value("start", true),
    value("stop", true),
    flag("with_scores", "WITHSCORES"),
];

const ZRANGEBYSCORE: &[ParamSpec] = &[
    value("min", true),
    value("max", true),
    flag("with_scores", "WITHSCORES"),
    flag_values("limit", "LIMIT", 2),
];

const ZREVRANGEBYSCORE: &[ParamSpec] = &[
    value("max", true),
    value("min", true),
    flag("with_scores", "WITHSCORES"),
    flag_values("limit", "LIMIT", 2),
];

/// Parameter schedule for `cmd`; empty when it takes none
pub fn schedule(cmd: Command) -> &'static [ParamSpec] {
    match cmd {
        Command::Set => SET,
        Command::BitCount => BITCOUNT,
        Command::ZRange | Command::ZRevRange => ZRANGE,
        Command::ZRangeByScore => ZRANGEBYSCORE,
        Command::ZRevRangeByScore => ZREVRANGEBYSCORE,
        _ => &[],
    }
}

/// Named parameter bag
pub struct Params<'a> {
    cmd: Command,
    bag: &'a BTreeMap<String, Json>,
}

impl<'a> Params<'a> {
    pub fn new(cmd: Command, bag: &'a BTreeMap<String, Json>) -> Self {
        Self { cmd, bag }
    }

    fn get(&self, name: &str) -> Option<&'a Json> {
        self.bag.get(name).filter(|v| !v.is_null())
    }

    fn lookup(&self, spec: &ParamSpec) -> Option<&'a Json> {
        self.get(spec.name).or_else(|| {
            if spec.token.is_empty() {
                None
            } else {
                self.get(spec.token)
            }
        })
    }

    fn missing(&self, name: &str) -> QueryError {
        QueryError::missing_param(name, self.cmd.as_str())
    }

    fn invalid(&self, name: &str, expected: &str) -> QueryError {
        QueryError::invalid_value(format!(
            "{} param `{}` must be {}",
            self.cmd.as_str(),
            name,
            expected
        ))
    }

    /// Whether a non-null value was supplied under `name`
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Flag parameter, by name or by its token
    pub fn flag(&self, spec: &ParamSpec) -> bool {
        self.lookup(spec).map(truthy).unwrap_or(false)
    }

    /// Required scalar rendered as a wire string
    pub fn required(&self, name: &str) -> QueryResult<String> {
        let value = self.get(name).ok_or_else(|| self.missing(name))?;
        scalar(value).ok_or_else(|| self.invalid(name, "a string or number"))
    }

    /// Required integer
    pub fn required_int(&self, name: &str) -> QueryResult<i64> {
        let value = self.get(name).ok_or_else(|| self.missing(name))?;
        integer(value).ok_or_else(|| self.invalid(name, "an integer"))
    }

    /// Optional integer that must be positive when supplied
    pub fn positive_int(&self, name: &str) -> QueryResult<Option<i64>> {
        match self.get(name) {
            None => Ok(None),
            Some(value) => match integer(value) {
                Some(n) if n > 0 => Ok(Some(n)),
                _ => Err(self.invalid(name, "an integer bigger than 0")),
            },
        }
    }

    /// Append the schedule's arguments in order.
    pub fn apply(&self, specs: &[ParamSpec], args: &mut Vec<String>) -> QueryResult<()> {
        for spec in specs {
            let Some(value) = self.lookup(spec) else {
                if spec.required {
                    return Err(self.missing(spec.name));
                }
                continue;
            };
            match spec.arity {
                Arity::Value => {
                    args.push(scalar(value).ok_or_else(|| self.invalid(spec.name, "a string or number"))?);
                }
                Arity::Flag => {
                    if truthy(value) {
                        args.push(spec.token.to_string());
                    }
                }
                Arity::FlagValue => {
                    let rendered =
                        scalar(value).ok_or_else(|| self.invalid(spec.name, "a string or number"))?;
                    args.push(spec.token.to_string());
                    args.push(rendered);
                }
                Arity::FlagValues(n) => {
                    let items = value
                        .as_array()
                        .filter(|items| items.len() == n)
                        .ok_or_else(|| self.invalid(spec.name, &format!("an array of {} values", n)))?;
                    args.push(spec.token.to_string());
                    for item in items {
                        args.push(
                            scalar(item)
                                .ok_or_else(|| self.invalid(spec.name, "an array of scalars"))?,
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

fn truthy(value: &Json) -> bool {
    match value {
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Json::String(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        Json::Null => false,
        _ => true,
    }
}

fn scalar(value: &Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn integer(value: &Json) -> Option<i64> {
    match value {
        Json::Number(n) => n.as_i64(),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(v: Json) -> BTreeMap<String, Json> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_zrangebyscore_schedule() {
        let params = bag(json!({"min": 0, "max": "+inf", "with_scores": true, "limit": [0, 10]}));
        let mut args = vec!["k".to_string()];
        Params::new(Command::ZRangeByScore, &params)
            .apply(schedule(Command::ZRangeByScore), &mut args)
            .unwrap();
        assert_eq!(args, vec!["k", "0", "+inf", "WITHSCORES", "LIMIT", "0", "10"]);
    }

    #[test]
    fn test_required_value_missing() {
        let params = bag(json!({"min": 0}));
        let err = Params::new(Command::ZRangeByScore, &params)
            .apply(schedule(Command::ZRangeByScore), &mut Vec::new())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required parameter `max` for `ZRANGEBYSCORE`"
        );
    }

    #[test]
    fn test_set_flags() {
        let params = bag(json!({"ex": 60, "nx": true, "xx": false}));
        let mut args = Vec::new();
        Params::new(Command::Set, &params)
            .apply(schedule(Command::Set), &mut args)
            .unwrap();
        assert_eq!(args, vec!["EX", "60", "NX"]);
    }

    #[test]
    fn test_token_alias_for_flag() {
        let params = bag(json!({"start": 0, "stop": -1, "WITHSCORES": true}));
        let p = Params::new(Command::ZRange, &params);
        assert!(p.flag(&ZRANGE[2]));
    }

    #[test]
    fn test_limit_arity_checked() {
        let params = bag(json!({"min": 0, "max": 1, "limit": [5]}));
        assert!(Params::new(Command::ZRangeByScore, &params)
            .apply(schedule(Command::ZRangeByScore), &mut Vec::new())
            .is_err());
    }

    #[test]
    fn test_has_ignores_null() {
        let params = bag(json!({"start": 0, "end": null}));
        let p = Params::new(Command::BitCount, &params);
        assert!(p.has("start"));
        assert!(!p.has("end"));
    }

    #[test]
    fn test_positive_int() {
        let params = bag(json!({"count": 0, "n": 3}));
        let p = Params::new(Command::LPop, &params);
        assert!(p.positive_int("count").is_err());
        assert_eq!(p.positive_int("n").unwrap(), Some(3));
        assert_eq!(p.positive_int("absent").unwrap(), None);
    }
}
