//! Connection pool registry
//!
//! One entry per DSN. Lookups take the read lock; a miss dials outside any
//! lock and inserts under the write lock. When two callers race on the same
//! DSN the first inserted entry wins and the loser's handle is closed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::backend::{KvConnection, SearchTransport, SqlDatabase};
use crate::error::{QueryError, QueryResult};

/// A pooled handle that can be shut down
#[async_trait]
pub trait Retire: Send + Sync {
    async fn retire(&self) -> QueryResult<()>;
}

#[async_trait]
impl Retire for dyn SqlDatabase {
    async fn retire(&self) -> QueryResult<()> {
        self.close().await
    }
}

#[async_trait]
impl Retire for dyn SearchTransport {
    async fn retire(&self) -> QueryResult<()> {
        self.close().await
    }
}

#[async_trait]
impl Retire for dyn KvConnection {
    async fn retire(&self) -> QueryResult<()> {
        self.close().await
    }
}

fn poisoned() -> QueryError {
    QueryError::internal("pool registry lock poisoned")
}

/// DSN-keyed registry of shared handles
pub struct PoolRegistry<T: ?Sized> {
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized> Default for PoolRegistry<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: ?Sized> PoolRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dsn: &str) -> QueryResult<Option<Arc<T>>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(dsn).cloned())
    }

    /// Return the handle for `dsn`, dialing with `connect` on a miss.
    pub async fn get_or_connect<F, Fut>(&self, dsn: &str, connect: F) -> QueryResult<Arc<T>>
    where
        T: Retire,
        F: FnOnce() -> Fut,
        Fut: Future<Output = QueryResult<Arc<T>>>,
    {
        if let Some(hit) = self.get(dsn)? {
            return Ok(hit);
        }

        let fresh = connect().await?;

        let (kept, surplus) = {
            let mut entries = self.entries.write().map_err(|_| poisoned())?;
            match entries.get(dsn) {
                Some(existing) => (existing.clone(), Some(fresh)),
                None => {
                    entries.insert(dsn.to_string(), fresh.clone());
                    (fresh, None)
                }
            }
        };

        if let Some(surplus) = surplus {
            if let Err(e) = surplus.retire().await {
                tracing::warn!(dsn, error = %e, "closing surplus connection failed");
            }
        }
        Ok(kept)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return every handle
    pub fn drain(&self) -> QueryResult<Vec<Arc<T>>> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(entries.drain().map(|(_, handle)| handle).collect())
    }
}

/// The three registries an engine owns
#[derive(Default)]
pub struct Pools {
    pub sql: PoolRegistry<dyn SqlDatabase>,
    pub search: PoolRegistry<dyn SearchTransport>,
    pub kv: PoolRegistry<dyn KvConnection>,
}
