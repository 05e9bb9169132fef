//! Key-value command assembler
//!
//! Produces the ordered argument list for one command and decodes the reply
//! by the shape the command (and its modifiers) implies. `WITHSCORES` and a
//! trailing `count` change the reply shape, so both are recorded on the
//! assembled [`KvCommand`].

mod assemble;
mod command;
mod params;
mod reply;

pub use assemble::{assemble_kv, KvCommand};
pub use command::{Command, ReplyShape};
pub use params::{schedule, Arity, ParamSpec, Params};
pub use reply::{decode_reply, KvReply};
