//! Structured query logging
//!
//! Events go through `tracing`; installing a subscriber is the host's job.

mod query_log;

pub use query_log::{QueryEvent, QueryLog};
