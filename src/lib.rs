//! omniquery - one request model compiled for SQL, search and key-value stores
//!
//! A [`Request`](request::Request) is compiled for the destination's backend
//! family and executed through pooled, driver-supplied connections.

pub mod compile;
pub mod condition;
pub mod config;
pub mod decode;
pub mod error;
pub mod exec;
pub mod kv;
pub mod observability;
pub mod request;
pub mod response;
pub mod search;
pub mod sql;
pub mod value;

pub use config::{BackendKind, DbAddress, PoolOptions};
pub use error::{QueryError, QueryResult};
pub use exec::{Engine, TransactionContext};
pub use request::Request;
pub use response::{QueryOutput, Response};
