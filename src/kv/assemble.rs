//! Argument assembly
//!
//! Builds the exact argument list for one command from either positional
//! `args` or named parameters. The key is always namespaced as
//! `prefix + key`.

use super::command::{Command, ReplyShape};
use super::params::{schedule, Arity, ParamSpec, Params};
use crate::error::{QueryError, QueryResult};
use crate::request::Request;
use crate::value::{record_to_json, Value};

/// A fully assembled command
#[derive(Debug, Clone, PartialEq)]
pub struct KvCommand {
    pub command: Command,
    /// Arguments after the command name
    pub args: Vec<String>,
    pub reply: ReplyShape,
    /// Requested fields, used to zip HMGET replies
    pub fields: Vec<String>,
}

impl KvCommand {
    pub fn is_write(&self) -> bool {
        self.command.is_write()
    }

    /// `CMD arg1 arg2 ..` for logs
    pub fn describe(&self) -> String {
        let mut out = self.command.as_str().to_string();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

const WITH_SCORES: ParamSpec = ParamSpec {
    name: "with_scores",
    token: "WITHSCORES",
    arity: Arity::Flag,
    required: false,
};

const SET_GET: ParamSpec = ParamSpec {
    name: "get",
    token: "GET",
    arity: Arity::Flag,
    required: false,
};

fn has_token(args: &[String], token: &str) -> bool {
    args.iter().any(|a| a.eq_ignore_ascii_case(token))
}

/// Assemble a key-value command from a request.
pub fn assemble_kv(request: &Request) -> QueryResult<KvCommand> {
    let command: Command = request.op.parse()?;
    let params = Params::new(command, &request.params);
    let key = format!("{}{}", request.prefix, request.key);

    let mut fields = Vec::new();
    let (args, with_count) = if request.args.is_empty() {
        named_args(command, request, &params, &key, &mut fields)?
    } else {
        positional_args(command, request, &params, &key, &mut fields)?
    };

    // Reply modifiers are read back from the emitted arguments so the
    // decoder always sees what the server was actually asked for.
    let with_scores =
        command.takes_scores() && has_token(args.get(1..).unwrap_or(&[]), WITH_SCORES.token);
    let with_get =
        command == Command::Set && has_token(args.get(2..).unwrap_or(&[]), SET_GET.token);

    Ok(KvCommand {
        command,
        reply: command.reply_shape(with_scores, with_count, with_get),
        args,
        fields,
    })
}

fn require_key(command: Command, key: &str) -> QueryResult<()> {
    if key.is_empty() {
        return Err(QueryError::missing_param("key", command.as_str()));
    }
    Ok(())
}

fn positional_args(
    command: Command,
    request: &Request,
    params: &Params<'_>,
    key: &str,
    fields: &mut Vec<String>,
) -> QueryResult<(Vec<String>, bool)> {
    let mut args = Vec::with_capacity(request.args.len() + 1);
    match command {
        Command::MGet => {
            for item in &request.args {
                args.push(format!("{}{}", request.prefix, item.to_wire_string()));
            }
            return Ok((args, false));
        }
        Command::ZAdd => {
            require_key(command, key)?;
            let scores = string_list(request, "scores");
            if scores.len() != request.args.len() {
                return Err(QueryError::invalid_value(
                    "ZADD param `scores` length must equal the number of members",
                ));
            }
            args.push(key.to_string());
            for (score, member) in scores.into_iter().zip(&request.args) {
                args.push(score);
                args.push(member.to_wire_string());
            }
            return Ok((args, false));
        }
        _ => {}
    }

    require_key(command, key)?;
    args.push(key.to_string());
    for item in &request.args {
        args.push(item.to_wire_string());
    }
    if command == Command::HMGet {
        fields.extend(args[1..].iter().cloned());
    }
    if command.takes_scores()
        && params.flag(&WITH_SCORES)
        && !has_token(&args[1..], WITH_SCORES.token)
    {
        args.push(WITH_SCORES.token.to_string());
    }
    let with_count = command.takes_count() && request.args.len() == 1;
    Ok((args, with_count))
}

fn named_args(
    command: Command,
    request: &Request,
    params: &Params<'_>,
    key: &str,
    fields: &mut Vec<String>,
) -> QueryResult<(Vec<String>, bool)> {
    let mut args = Vec::new();
    if command == Command::MSet {
        let data = request
            .data
            .as_ref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| QueryError::missing_param("data", command.as_str()))?;
        for (k, v) in data {
            args.push(format!("{}{}", request.prefix, k));
            args.push(v.to_wire_string());
        }
        return Ok((args, false));
    }

    require_key(command, key)?;
    args.push(key.to_string());
    let mut with_count = false;

    match command {
        Command::Expire => {
            let seconds = params.required_int("seconds")?;
            if seconds == 0 {
                return Err(QueryError::invalid_value("EXPIRE param `seconds` is zero"));
            }
            args.push(seconds.to_string());
        }
        Command::IncrBy => args.push(params.required("increment")?),
        Command::Set => {
            args.push(encode_value(command, request)?);
            params.apply(schedule(command), &mut args)?;
        }
        Command::SetEx => {
            let seconds = params.required_int("seconds")?;
            if seconds == 0 {
                return Err(QueryError::invalid_value("SETEX param `seconds` is zero"));
            }
            args.push(seconds.to_string());
            args.push(encode_value(command, request)?);
        }
        Command::SetNx
        | Command::GetSet
        | Command::LPush
        | Command::RPush
        | Command::SAdd
        | Command::SIsMember
        | Command::SRem
        | Command::ZRem
        | Command::ZScore
        | Command::ZRank
        | Command::ZRevRank => args.push(encode_value(command, request)?),
        Command::SetBit => {
            args.push(params.required_int("offset")?.to_string());
            args.push(params.required_int("value")?.to_string());
        }
        Command::GetBit => args.push(params.required_int("offset")?.to_string()),
        Command::HSet => {
            let before = args.len();
            if !request.field.is_empty() {
                args.push(request.field.clone());
                args.push(field_value(command, request)?);
            }
            if let Some(data) = &request.data {
                for (k, v) in data {
                    args.push(k.clone());
                    args.push(v.to_wire_string());
                }
            }
            if args.len() == before {
                return Err(QueryError::missing_param("field", command.as_str()));
            }
        }
        Command::HSetNx => {
            args.push(required_field(command, request)?);
            args.push(field_value(command, request)?);
        }
        Command::HMSet => {
            let data = request
                .data
                .as_ref()
                .filter(|d| !d.is_empty())
                .ok_or_else(|| QueryError::missing_param("data", command.as_str()))?;
            for (k, v) in data {
                args.push(k.clone());
                args.push(v.to_wire_string());
            }
        }
        Command::HGet | Command::HExists | Command::HStrLen => {
            args.push(required_field(command, request)?)
        }
        Command::HMGet | Command::HDel => {
            let field = required_field(command, request)?;
            if command == Command::HMGet {
                fields.push(field.clone());
            }
            args.push(field);
        }
        Command::HIncrBy | Command::HIncrByFloat => {
            args.push(required_field(command, request)?);
            args.push(params.required("increment")?);
        }
        Command::LPop
        | Command::RPop
        | Command::SRandMember
        | Command::SPop
        | Command::ZPopMin
        | Command::ZPopMax => {
            if let Some(count) = params.positive_int("count")? {
                args.push(count.to_string());
                with_count = true;
            }
        }
        Command::SMove => {
            let destination = params.required("destination")?;
            args.push(format!("{}{}", request.prefix, destination));
            args.push(encode_value(command, request)?);
        }
        Command::ZAdd => {
            args.push(params.required("score")?);
            args.push(encode_value(command, request)?);
        }
        Command::ZRemRangeByScore | Command::ZCount => {
            args.push(params.required("min")?);
            args.push(params.required("max")?);
        }
        Command::ZRemRangeByRank => {
            args.push(params.required_int("start")?.to_string());
            args.push(params.required_int("stop")?.to_string());
        }
        Command::ZIncrBy => {
            args.push(params.required("increment")?);
            args.push(encode_value(command, request)?);
        }
        Command::BitCount => {
            if params.has("start") != params.has("end") {
                return Err(QueryError::invalid_value(
                    "BITCOUNT params `start` and `end` must be given together",
                ));
            }
            params.apply(schedule(command), &mut args)?
        }
        Command::ZRange
        | Command::ZRangeByScore
        | Command::ZRevRange
        | Command::ZRevRangeByScore => params.apply(schedule(command), &mut args)?,
        Command::Ttl
        | Command::Exists
        | Command::Del
        | Command::Get
        | Command::Incr
        | Command::Decr
        | Command::MGet
        | Command::HGetAll
        | Command::HKeys
        | Command::HLen
        | Command::HVals
        | Command::LLen
        | Command::SMembers
        | Command::SCard
        | Command::ZCard
        | Command::MSet => {}
    }

    Ok((args, with_count))
}

fn required_field(command: Command, request: &Request) -> QueryResult<String> {
    if request.field.is_empty() {
        return Err(QueryError::missing_param("field", command.as_str()));
    }
    Ok(request.field.clone())
}

fn field_value(command: Command, request: &Request) -> QueryResult<String> {
    request
        .value
        .as_ref()
        .map(Value::to_wire_string)
        .ok_or_else(|| QueryError::missing_param("value", command.as_str()))
}

/// Payload for value-bearing commands: `datas` or `data` as JSON, else `value`.
fn encode_value(command: Command, request: &Request) -> QueryResult<String> {
    if !request.datas.is_empty() {
        let rows: Vec<_> = request.datas.iter().map(record_to_json).collect();
        return Ok(serde_json::Value::Array(rows).to_string());
    }
    if let Some(data) = &request.data {
        return Ok(record_to_json(data).to_string());
    }
    field_value(command, request)
}

fn string_list(request: &Request, name: &str) -> Vec<String> {
    match request.param(name) {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|i| Value::from(i.clone()).to_wire_string())
            .collect(),
        _ => Vec::new(),
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
    fn test_zrangebyscore_with_scores() {
        let cmd = assemble_kv(&request(json!({
            "op": "ZRANGEBYSCORE",
            "key": "rank",
            "params": {"min": 0, "max": 100, "with_scores": true}
        })))
        .unwrap();
        assert_eq!(cmd.args, vec!["rank", "0", "100", "WITHSCORES"]);
        assert_eq!(cmd.reply, ReplyShape::MemberScores);
        assert!(!cmd.is_write());
    }

    #[test]
    fn test_positional_range_appends_with_scores() {
        let cmd = assemble_kv(&request(json!({
            "op": "zrangebyscore",
            "key": "rank",
            "args": [0, 100],
            "params": {"with_scores": true}
        })))
        .unwrap();
        assert_eq!(cmd.describe(), "ZRANGEBYSCORE rank 0 100 WITHSCORES");
        assert_eq!(cmd.reply, ReplyShape::MemberScores);

        let plain = assemble_kv(&request(json!({
            "op": "ZRANGE",
            "key": "rank",
            "args": [0, -1]
        })))
        .unwrap();
        assert_eq!(plain.args, vec!["rank", "0", "-1"]);
        assert_eq!(plain.reply, ReplyShape::Strings);
    }

    #[test]
    fn test_with_scores_ignored_outside_range_family() {
        let cmd = assemble_kv(&request(json!({
            "op": "ZCARD",
            "key": "rank",
            "params": {"with_scores": true}
        })))
        .unwrap();
        assert_eq!(cmd.args, vec!["rank"]);
        assert_eq!(cmd.reply, ReplyShape::Int);
    }

    #[test]
    fn test_bitcount_range_needs_both_ends() {
        let whole = assemble_kv(&request(json!({"op": "BITCOUNT", "key": "b"}))).unwrap();
        assert_eq!(whole.args, vec!["b"]);

        let ranged = assemble_kv(&request(json!({
            "op": "BITCOUNT",
            "key": "b",
            "params": {"start": 0, "end": -1}
        })))
        .unwrap();
        assert_eq!(ranged.args, vec!["b", "0", "-1"]);

        let err = assemble_kv(&request(json!({
            "op": "BITCOUNT",
            "key": "b",
            "params": {"start": 0}
        })))
        .unwrap_err();
        assert!(matches!(err, QueryError::InvalidValue(_)));
        assert!(assemble_kv(&request(json!({
            "op": "BITCOUNT",
            "key": "b",
            "params": {"end": 4}
        })))
        .is_err());
    }

    #[test]
    fn test_prefix_and_set_nx() {
        let cmd = assemble_kv(&request(json!({
            "op": "set",
            "prefix": "app:",
            "key": "lock",
            "value": "owner-1",
            "params": {"nx": true, "px": 3000}
        })))
        .unwrap();
        assert_eq!(cmd.args, vec!["app:lock", "owner-1", "PX", "3000", "NX"]);
        assert_eq!(cmd.reply, ReplyShape::Bool);
        assert_eq!(cmd.describe(), "SET app:lock owner-1 PX 3000 NX");
    }

    #[test]
    fn test_mget_prefixes_every_key() {
        let cmd = assemble_kv(&request(json!({
            "op": "MGET",
            "prefix": "u:",
            "args": ["1", 2]
        })))
        .unwrap();
        assert_eq!(cmd.args, vec!["u:1", "u:2"]);
    }

    #[test]
    fn test_hmget_tracks_fields() {
        let cmd = assemble_kv(&request(json!({
            "op": "HMGET",
            "key": "h",
            "args": ["a", 1]
        })))
        .unwrap();
        assert_eq!(cmd.args, vec!["h", "a", "1"]);
        assert_eq!(cmd.fields, vec!["a", "1"]);
        assert_eq!(cmd.reply, ReplyShape::StringMap);
    }

    #[test]
    fn test_sadd_json_encodes_members() {
        let cmd = assemble_kv(&request(json!({
            "op": "SADD",
            "key": "s",
            "args": ["plain", {"id": 1}, [1, 2]]
        })))
        .unwrap();
        assert_eq!(cmd.args, vec!["s", "plain", "{\"id\":1}", "[1,2]"]);
    }

    #[test]
    fn test_zadd_pairs_scores() {
        let cmd = assemble_kv(&request(json!({
            "op": "ZADD",
            "key": "z",
            "args": ["a", "b"],
            "params": {"scores": [1, 2.5]}
        })))
        .unwrap();
        assert_eq!(cmd.args, vec!["z", "1", "a", "2.5", "b"]);

        let err = assemble_kv(&request(json!({
            "op": "ZADD",
            "key": "z",
            "args": ["a", "b"],
            "params": {"scores": [1]}
        })))
        .unwrap_err();
        assert!(matches!(err, QueryError::InvalidValue(_)));
    }

    #[test]
    fn test_count_only_when_positive() {
        let plain = assemble_kv(&request(json!({"op": "LPOP", "key": "l"}))).unwrap();
        assert_eq!(plain.args, vec!["l"]);
        assert_eq!(plain.reply, ReplyShape::String);

        let counted =
            assemble_kv(&request(json!({"op": "LPOP", "key": "l", "params": {"count": 3}})))
                .unwrap();
        assert_eq!(counted.args, vec!["l", "3"]);
        assert_eq!(counted.reply, ReplyShape::Strings);

        assert!(assemble_kv(&request(json!({"op": "SPOP", "key": "s", "params": {"count": 0}})))
            .is_err());
    }

    #[test]
    fn test_missing_required_param() {
        let err = assemble_kv(&request(json!({"op": "HINCRBY", "key": "h", "field": "n"})))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required parameter `increment` for `HINCRBY`"
        );
        assert!(assemble_kv(&request(json!({"op": "GET"}))).is_err());
    }

    #[test]
    fn test_mset_namespaces_keys() {
        let cmd = assemble_kv(&request(json!({
            "op": "MSET",
            "prefix": "p:",
            "data": {"a": 1, "b": "x"}
        })))
        .unwrap();
        assert_eq!(cmd.args, vec!["p:a", "1", "p:b", "x"]);
        assert_eq!(cmd.reply, ReplyShape::Nil);
    }

    #[test]
    fn test_set_value_from_data_is_json() {
        let cmd = assemble_kv(&request(json!({
            "op": "SET",
            "key": "k",
            "data": {"a": 1}
        })))
        .unwrap();
        assert_eq!(cmd.args, vec!["k", "{\"a\":1}"]);
    }
}
