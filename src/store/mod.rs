use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

/// Errors from the external key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connecting to the store: {0}")]
    Connect(#[source] redis::RedisError),

    #[error("store command failed: {0}")]
    Command(#[from] redis::RedisError),
}

/// Client for the recent-values (sorted set) and name-registry (set) stores.
///
/// Enum dispatch: Redis in production, an in-memory double for tests.
#[derive(Clone)]
pub enum Store {
    Redis(RedisStore),
    Memory(MemoryStore),
}

impl Store {
    /// Connects to Redis and verifies the connection.
    pub async fn connect_redis(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(StoreError::Connect)?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(StoreError::Connect)?;

        Ok(Self::Redis(RedisStore { conn }))
    }

    /// Creates an in-memory store. The returned handle shares state with the
    /// `Store`, so tests can inspect what was written.
    pub fn memory() -> (Self, MemoryStore) {
        let mem = MemoryStore::default();
        (Self::Memory(mem.clone()), mem)
    }

    /// `ZADD key score member`: add a scored member to a sorted set.
    pub async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError> {
        match self {
            Self::Redis(store) => {
                let mut conn = store.conn.clone();
                let _: i64 = conn.zadd(key, member, score).await?;
                Ok(())
            }
            Self::Memory(store) => {
                store.zadd(key, member, score);
                Ok(())
            }
        }
    }

    /// `SADD key member`: add a member to a set.
    pub async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        match self {
            Self::Redis(store) => {
                let mut conn = store.conn.clone();
                let _: i64 = conn.sadd(key, member).await?;
                Ok(())
            }
            Self::Memory(store) => {
                store.sadd(key, member);
                Ok(())
            }
        }
    }
}

/// Redis-backed store using a shared connection manager.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

#[derive(Default)]
struct MemoryInner {
    zsets: HashMap<String, Vec<(i64, String)>>,
    sets: HashMap<String, BTreeSet<String>>,
}

/// In-memory store double used by tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<parking_lot::Mutex<MemoryInner>>,
}

impl MemoryStore {
    fn zadd(&self, key: &str, member: &str, score: i64) {
        self.inner
            .lock()
            .zsets
            .entry(key.to_string())
            .or_default()
            .push((score, member.to_string()));
    }

    fn sadd(&self, key: &str, member: &str) {
        self.inner
            .lock()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
    }

    /// All `(score, member)` pairs added under `key`, in insertion order.
    pub fn zset(&self, key: &str) -> Vec<(i64, String)> {
        self.inner.lock().zsets.get(key).cloned().unwrap_or_default()
    }

    /// All members of the set under `key`.
    pub fn set_members(&self, key: &str) -> Vec<String> {
        self.inner
            .lock()
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All sorted-set keys that have received at least one add.
    pub fn zset_keys(&self) -> Vec<String> {
        self.inner.lock().zsets.keys().cloned().collect()
    }
}
