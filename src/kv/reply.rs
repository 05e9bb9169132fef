//! Reply decoding by shape

use std::collections::BTreeMap;

use super::assemble::KvCommand;
use super::command::{Command, ReplyShape};
use crate::error::{BackendErrorKind, QueryError, QueryResult};
use crate::response::{MemberScores, QueryOutput, Response};
use crate::value::Value;

pub const BACKEND: &str = "redis";

/// Raw protocol reply
#[derive(Debug, Clone, PartialEq)]
pub enum KvReply {
    Nil,
    Status(String),
    Int(i64),
    Bulk(Vec<u8>),
    Array(Vec<KvReply>),
    Error(String),
}

impl KvReply {
    pub fn bulk(s: impl Into<String>) -> Self {
        KvReply::Bulk(s.into().into_bytes())
    }

    fn text(&self) -> Option<String> {
        match self {
            KvReply::Status(s) => Some(s.clone()),
            KvReply::Bulk(b) => Some(String::from_utf8_lossy(b).into_owned()),
            KvReply::Int(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

fn decode_error(cmd: &KvCommand, message: impl std::fmt::Display) -> QueryError {
    QueryError::backend(
        BACKEND,
        BackendErrorKind::DecodeFailed,
        0,
        format!("decode error: [{}], cmd=[{}]", message, cmd.describe()),
    )
}

/// Decode `reply` according to the command's reply shape.
///
/// A nil reply yields a nil response, except for `SET` where nil means the
/// NX/XX condition was not met and decodes as `false`.
pub fn decode_reply(cmd: &KvCommand, reply: KvReply) -> QueryResult<Response> {
    if let KvReply::Error(message) = &reply {
        return Err(QueryError::backend(
            BACKEND,
            BackendErrorKind::QueryRejected,
            0,
            format!("{}, cmd=[{}]", message, cmd.describe()),
        ));
    }
    let set_condition = cmd.command == Command::Set && cmd.reply == ReplyShape::Bool;
    if reply == KvReply::Nil && !set_condition {
        return Ok(Response::nil());
    }

    let output = match cmd.reply {
        ReplyShape::Nil => QueryOutput::None,
        ReplyShape::String => {
            let text = reply.text().ok_or_else(|| decode_error(cmd, "expected a string"))?;
            QueryOutput::Value(Value::String(text))
        }
        ReplyShape::Bool => QueryOutput::Value(Value::Bool(to_bool(cmd, &reply)?)),
        ReplyShape::Int => QueryOutput::Value(Value::Int(to_int(cmd, &reply)?)),
        ReplyShape::Float => QueryOutput::Value(Value::Float(to_float(cmd, &reply)?)),
        ReplyShape::Strings => QueryOutput::Values(
            items(cmd, reply)?
                .into_iter()
                .map(|item| item.text().map(Value::String).unwrap_or(Value::Null))
                .collect(),
        ),
        ReplyShape::StringMap => QueryOutput::StringMap(string_map(cmd, reply)?),
        ReplyShape::MemberScores => QueryOutput::MemberScores(member_scores(cmd, reply)?),
    };
    Ok(Response::new(output))
}

fn items(cmd: &KvCommand, reply: KvReply) -> QueryResult<Vec<KvReply>> {
    match reply {
        KvReply::Array(items) => Ok(items),
        other => Err(decode_error(cmd, format!("expected an array, got {:?}", other))),
    }
}

fn to_bool(cmd: &KvCommand, reply: &KvReply) -> QueryResult<bool> {
    match reply {
        KvReply::Nil => Ok(false),
        KvReply::Int(n) => Ok(*n != 0),
        KvReply::Status(s) if s == "OK" => Ok(true),
        other => match other.text().as_deref() {
            Some("OK") | Some("1") | Some("true") => Ok(true),
            Some("0") | Some("false") => Ok(false),
            _ => Err(decode_error(cmd, format!("expected a bool, got {:?}", other))),
        },
    }
}

fn to_int(cmd: &KvCommand, reply: &KvReply) -> QueryResult<i64> {
    match reply {
        KvReply::Int(n) => Ok(*n),
        other => other
            .text()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| decode_error(cmd, format!("expected an integer, got {:?}", other))),
    }
}

fn to_float(cmd: &KvCommand, reply: &KvReply) -> QueryResult<f64> {
    reply
        .text()
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| decode_error(cmd, format!("expected a float, got {:?}", reply)))
}

fn string_map(cmd: &KvCommand, reply: KvReply) -> QueryResult<BTreeMap<String, Value>> {
    let values = items(cmd, reply)?;
    let mut out = BTreeMap::new();

    if cmd.command == Command::HMGet {
        if values.len() != cmd.fields.len() {
            return Err(decode_error(cmd, "reply length differs from requested fields"));
        }
        for (field, value) in cmd.fields.iter().zip(values) {
            out.insert(field.clone(), value.text().map(Value::String).unwrap_or(Value::Null));
        }
        return Ok(out);
    }

    if values.len() % 2 != 0 {
        return Err(decode_error(cmd, "odd number of field/value entries"));
    }
    let mut iter = values.into_iter();
    while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
        let field = field
            .text()
            .ok_or_else(|| decode_error(cmd, "field is not a string"))?;
        out.insert(field, value.text().map(Value::String).unwrap_or(Value::Null));
    }
    Ok(out)
}

/// Member/score pairs, flat (`[m1, s1, m2, s2]`) or nested (`[[m1, s1], ..]`).
fn member_scores(cmd: &KvCommand, reply: KvReply) -> QueryResult<MemberScores> {
    let mut flat = Vec::new();
    for item in items(cmd, reply)? {
        match item {
            KvReply::Array(pair) => flat.extend(pair),
            other => flat.push(other),
        }
    }
    if flat.len() % 2 != 0 {
        return Err(decode_error(cmd, "member/score reply has odd length"));
    }

    let mut result = MemberScores::default();
    let mut iter = flat.into_iter();
    while let (Some(member), Some(score)) = (iter.next(), iter.next()) {
        result.members.push(
            member
                .text()
                .ok_or_else(|| decode_error(cmd, "member is not a string"))?,
        );
        result.scores.push(to_float(cmd, &score)?);
    }
    Ok(result)
}
