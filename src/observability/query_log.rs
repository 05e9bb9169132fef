//! Per-call query log
//!
//! A [`QueryLog`] is started right before a backend call and finished with the
//! call's outcome. Finishing emits at most one event per condition:
//!
//! - `QUERY_SLOW` (warn) when the call took longer than the destination's
//!   warn threshold
//! - `QUERY_DEBUG` (info) when the destination has `debug` set
//! - `QUERY_FAILED` (error) when the call failed, unless `omit_error` is set

use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::config::DbAddress;
use crate::error::QueryError;

/// Events a finished call produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryEvent {
    Slow,
    Debug,
    Failed,
}

impl QueryEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryEvent::Slow => "QUERY_SLOW",
            QueryEvent::Debug => "QUERY_DEBUG",
            QueryEvent::Failed => "QUERY_FAILED",
        }
    }
}

/// Log scope for one backend call
pub struct QueryLog<'a> {
    addr: &'a DbAddress,
    target: String,
    statement: String,
    tx_id: Option<Uuid>,
    started: Instant,
}

impl<'a> QueryLog<'a> {
    pub fn start(
        addr: &'a DbAddress,
        target: impl Into<String>,
        statement: impl Into<String>,
        tx_id: Option<Uuid>,
    ) -> Self {
        Self {
            addr,
            target: target.into(),
            statement: statement.into(),
            tx_id,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Which events a call with this outcome produces
    pub fn events(&self, elapsed: Duration, failed: bool) -> Vec<QueryEvent> {
        let mut events = Vec::new();
        if elapsed > self.addr.warn_threshold() {
            events.push(QueryEvent::Slow);
        }
        if self.addr.debug {
            events.push(QueryEvent::Debug);
        }
        if failed && !self.addr.omit_error {
            events.push(QueryEvent::Failed);
        }
        events
    }

    /// Emit events for `result` and hand it back unchanged.
    pub fn finish<T>(self, result: Result<T, QueryError>) -> Result<T, QueryError> {
        let elapsed = self.elapsed();
        let error = result.as_ref().err();
        for event in self.events(elapsed, error.is_some()) {
            self.emit(event, elapsed, error);
        }
        result
    }

    fn emit(&self, event: QueryEvent, elapsed: Duration, error: Option<&QueryError>) {
        let elapsed_ms = elapsed.as_millis() as u64;
        let tx_id = self.tx_id.map(|id| id.to_string()).unwrap_or_default();
        let backend = self.addr.kind.as_str();

        match event {
            QueryEvent::Slow => tracing::warn!(
                event = event.as_str(),
                backend,
                destination = %self.addr.name,
                table = %self.target,
                statement = %self.statement,
                elapsed_ms,
                tx_id = %tx_id,
                "slow query"
            ),
            QueryEvent::Debug => tracing::info!(
                event = event.as_str(),
                backend,
                destination = %self.addr.name,
                table = %self.target,
                statement = %self.statement,
                elapsed_ms,
                tx_id = %tx_id,
                "query"
            ),
            QueryEvent::Failed => tracing::error!(
                event = event.as_str(),
                backend,
                destination = %self.addr.name,
                table = %self.target,
                statement = %self.statement,
                elapsed_ms,
                tx_id = %tx_id,
                code = error.map(|e| e.code().as_str()).unwrap_or_default(),
                error = %error.map(|e| e.to_string()).unwrap_or_default(),
                "query failed"
            ),
        }
    }
}
