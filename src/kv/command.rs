//! Supported key-value commands and their reply shapes

use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;

/// Key-value commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Set a key's time to live in seconds
    Expire,
    /// Remaining time to live in seconds
    Ttl,
    /// Whether the key exists
    Exists,
    /// Remove the key
    Del,
    /// Store a string, with optional `EX`/`PX`/`NX`/`XX`/`KEEPTTL`/`GET`
    Set,
    /// Store a string with a time to live
    SetEx,
    /// Store a string only if the key is absent
    SetNx,
    /// Fetch a string
    Get,
    /// Store a string and return the old one
    GetSet,
    /// Add one to an integer
    Incr,
    /// Subtract one from an integer
    Decr,
    /// Add `increment` to an integer
    IncrBy,
    /// Store several keys at once
    MSet,
    /// Fetch several keys at once
    MGet,
    /// Set the bit at `offset`
    SetBit,
    /// Read the bit at `offset`
    GetBit,
    /// Count set bits, optionally within `start..=end`
    BitCount,
    /// Set one or more hash fields
    HSet,
    /// Set a hash field only if it is absent
    HSetNx,
    /// Set several hash fields
    HMSet,
    /// Fetch several hash fields
    HMGet,
    /// Fetch one hash field
    HGet,
    /// Fetch every field and value of a hash
    HGetAll,
    /// Hash field names
    HKeys,
    /// Add an integer to a hash field
    HIncrBy,
    /// Add a float to a hash field
    HIncrByFloat,
    /// Remove hash fields
    HDel,
    /// Whether a hash field exists
    HExists,
    /// Number of hash fields
    HLen,
    /// Length of a hash field's value
    HStrLen,
    /// Hash values
    HVals,
    /// Prepend to a list
    LPush,
    /// Append to a list
    RPush,
    /// Pop from the head of a list
    LPop,
    /// Pop from the tail of a list
    RPop,
    /// List length
    LLen,
    /// Add set members
    SAdd,
    /// Every set member
    SMembers,
    /// Remove set members
    SRem,
    /// Set size
    SCard,
    /// Whether a value is a set member
    SIsMember,
    /// Random members without removal
    SRandMember,
    /// Remove and return random members
    SPop,
    /// Move a member to the `destination` set
    SMove,
    /// Add scored members to a sorted set
    ZAdd,
    /// Remove sorted-set members
    ZRem,
    /// Remove members scored within `min..=max`
    ZRemRangeByScore,
    /// Remove members ranked within `start..=stop`
    ZRemRangeByRank,
    /// Sorted-set size
    ZCard,
    /// A member's score
    ZScore,
    /// A member's rank, lowest score first
    ZRank,
    /// A member's rank, highest score first
    ZRevRank,
    /// Number of members scored within `min..=max`
    ZCount,
    /// Remove and return the lowest scored members
    ZPopMin,
    /// Remove and return the highest scored members
    ZPopMax,
    /// Add to a member's score
    ZIncrBy,
    /// Members by rank, lowest score first
    ZRange,
    /// Members by score, ascending
    ZRangeByScore,
    /// Members by rank, highest score first
    ZRevRange,
    /// Members by score, descending
    ZRevRangeByScore,
}

/// Shape of the decoded reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// Status reply that carries no data (`OK`)
    Nil,
    String,
    Bool,
    Int,
    Float,
    Strings,
    StringMap,
    MemberScores,
}

impl Command {
    pub const ALL: &'static [Command] = &[
        Command::Expire,
        Command::Ttl,
        Command::Exists,
        Command::Del,
        Command::Set,
        Command::SetEx,
        Command::SetNx,
        Command::Get,
        Command::GetSet,
        Command::Incr,
        Command::Decr,
        Command::IncrBy,
        Command::MSet,
        Command::MGet,
        Command::SetBit,
        Command::GetBit,
        Command::BitCount,
        Command::HSet,
        Command::HSetNx,
        Command::HMSet,
        Command::HMGet,
        Command::HGet,
        Command::HGetAll,
        Command::HKeys,
        Command::HIncrBy,
        Command::HIncrByFloat,
        Command::HDel,
        Command::HExists,
        Command::HLen,
        Command::HStrLen,
        Command::HVals,
        Command::LPush,
        Command::RPush,
        Command::LPop,
        Command::RPop,
        Command::LLen,
        Command::SAdd,
        Command::SMembers,
        Command::SRem,
        Command::SCard,
        Command::SIsMember,
        Command::SRandMember,
        Command::SPop,
        Command::SMove,
        Command::ZAdd,
        Command::ZRem,
        Command::ZRemRangeByScore,
        Command::ZRemRangeByRank,
        Command::ZCard,
        Command::ZScore,
        Command::ZRank,
        Command::ZRevRank,
        Command::ZCount,
        Command::ZPopMin,
        Command::ZPopMax,
        Command::ZIncrBy,
        Command::ZRange,
        Command::ZRangeByScore,
        Command::ZRevRange,
        Command::ZRevRangeByScore,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Expire => "EXPIRE",
            Command::Ttl => "TTL",
            Command::Exists => "EXISTS",
            Command::Del => "DEL",
            Command::Set => "SET",
            Command::SetEx => "SETEX",
            Command::SetNx => "SETNX",
            Command::Get => "GET",
            Command::GetSet => "GETSET",
            Command::Incr => "INCR",
            Command::Decr => "DECR",
            Command::IncrBy => "INCRBY",
            Command::MSet => "MSET",
            Command::MGet => "MGET",
            Command::SetBit => "SETBIT",
            Command::GetBit => "GETBIT",
            Command::BitCount => "BITCOUNT",
            Command::HSet => "HSET",
            Command::HSetNx => "HSETNX",
            Command::HMSet => "HMSET",
            Command::HMGet => "HMGET",
            Command::HGet => "HGET",
            Command::HGetAll => "HGETALL",
            Command::HKeys => "HKEYS",
            Command::HIncrBy => "HINCRBY",
            Command::HIncrByFloat => "HINCRBYFLOAT",
            Command::HDel => "HDEL",
            Command::HExists => "HEXISTS",
            Command::HLen => "HLEN",
            Command::HStrLen => "HSTRLEN",
            Command::HVals => "HVALS",
            Command::LPush => "LPUSH",
            Command::RPush => "RPUSH",
            Command::LPop => "LPOP",
            Command::RPop => "RPOP",
            Command::LLen => "LLEN",
            Command::SAdd => "SADD",
            Command::SMembers => "SMEMBERS",
            Command::SRem => "SREM",
            Command::SCard => "SCARD",
            Command::SIsMember => "SISMEMBER",
            Command::SRandMember => "SRANDMEMBER",
            Command::SPop => "SPOP",
            Command::SMove => "SMOVE",
            Command::ZAdd => "ZADD",
            Command::ZRem => "ZREM",
            Command::ZRemRangeByScore => "ZREMRANGEBYSCORE",
            Command::ZRemRangeByRank => "ZREMRANGEBYRANK",
            Command::ZCard => "ZCARD",
            Command::ZScore => "ZSCORE",
            Command::ZRank => "ZRANK",
            Command::ZRevRank => "ZREVRANK",
            Command::ZCount => "ZCOUNT",
            Command::ZPopMin => "ZPOPMIN",
            Command::ZPopMax => "ZPOPMAX",
            Command::ZIncrBy => "ZINCRBY",
            Command::ZRange => "ZRANGE",
            Command::ZRangeByScore => "ZRANGEBYSCORE",
            Command::ZRevRange => "ZREVRANGE",
            Command::ZRevRangeByScore => "ZREVRANGEBYSCORE",
        }
    }

    /// Commands that mutate state. Selects the write timeout.
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            Command::Ttl
                | Command::Exists
                | Command::Get
                | Command::MGet
                | Command::GetBit
                | Command::BitCount
                | Command::HMGet
                | Command::HGet
                | Command::HGetAll
                | Command::HKeys
                | Command::HExists
                | Command::HLen
                | Command::HStrLen
                | Command::HVals
                | Command::LLen
                | Command::SMembers
                | Command::SCard
                | Command::SIsMember
                | Command::SRandMember
                | Command::ZCard
                | Command::ZScore
                | Command::ZRank
                | Command::ZRevRank
                | Command::ZCount
                | Command::ZRange
                | Command::ZRangeByScore
                | Command::ZRevRange
                | Command::ZRevRangeByScore
        )
    }

    /// Commands that take a trailing optional `count`
    pub fn takes_count(&self) -> bool {
        matches!(
            self,
            Command::LPop
                | Command::RPop
                | Command::SPop
                | Command::SRandMember
                | Command::ZPopMin
                | Command::ZPopMax
        )
    }

    /// The range family, which accepts `WITHSCORES`
    pub fn takes_scores(&self) -> bool {
        matches!(
            self,
            Command::ZRange
                | Command::ZRangeByScore
                | Command::ZRevRange
                | Command::ZRevRangeByScore
        )
    }

    /// Reply shape given the modifiers that change it.
    ///
    /// `with_scores` applies to the range family, `with_count` to the
    /// count-bearing pops, `with_get` to `SET .. GET`.
    pub fn reply_shape(&self, with_scores: bool, with_count: bool, with_get: bool) -> ReplyShape {
        match self {
            Command::SetEx | Command::MSet | Command::HMSet => ReplyShape::Nil,

            Command::Set if with_get => ReplyShape::String,
            Command::Set
            | Command::Expire
            | Command::Exists
            | Command::SetNx
            | Command::HSetNx
            | Command::HExists
            | Command::SIsMember
            | Command::SMove => ReplyShape::Bool,

            Command::Get | Command::GetSet | Command::HGet => ReplyShape::String,

            Command::LPop | Command::RPop | Command::SPop | Command::SRandMember => {
                if with_count {
                    ReplyShape::Strings
                } else {
                    ReplyShape::String
                }
            }

            Command::HIncrByFloat | Command::ZScore | Command::ZIncrBy => ReplyShape::Float,

            Command::MGet
            | Command::HKeys
            | Command::HVals
            | Command::SMembers => ReplyShape::Strings,

            Command::HMGet | Command::HGetAll => ReplyShape::StringMap,

            Command::ZPopMin | Command::ZPopMax => ReplyShape::MemberScores,

            Command::ZRange
            | Command::ZRangeByScore
            | Command::ZRevRange
            | Command::ZRevRangeByScore => {
                if with_scores {
                    ReplyShape::MemberScores
                } else {
                    ReplyShape::Strings
                }
            }

            Command::Ttl
            | Command::Del
            | Command::Incr
            | Command::Decr
            | Command::IncrBy
            | Command::SetBit
            | Command::GetBit
            | Command::BitCount
            | Command::HSet
            | Command::HIncrBy
            | Command::HDel
            | Command::HLen
            | Command::HStrLen
            | Command::LPush
            | Command::RPush
            | Command::LLen
            | Command::SAdd
            | Command::SRem
            | Command::SCard
            | Command::ZAdd
            | Command::ZRem
            | Command::ZRemRangeByScore
            | Command::ZRemRangeByRank
            | Command::ZCard
            | Command::ZRank
            | Command::ZRevRank
            | Command::ZCount => ReplyShape::Int,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Command::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| QueryError::invalid_request(format!("unsupported command `{}`", name)))
    }
}
