use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

pub mod error;
pub mod failover;
pub mod memory;
pub mod redis_store;

// Re-export the core types to provide a clean public API.
pub use error::StoreError;
pub use failover::FailoverStore;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// The unified keyed-storage contract the rest of the system runs against.
///
/// One contract, three implementations: `RedisStore` (the external service),
/// `MemoryStore` (in-process), and `FailoverStore` (Redis with the in-memory
/// backend as a permissive fallback). Writes for a given key are serialized
/// by the backend; cross-key transactions are not part of the contract.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Sets a value that is deleted after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
    async fn del(&self, key: &str) -> Result<(), StoreError>;
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Atomically increments a counter, returning the new value.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Adds a member to a set, returning whether it was newly inserted.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError>;
    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;
    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError>;
    async fn scard(&self, key: &str) -> Result<u64, StoreError>;

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError>;
    /// Members of a sorted set by descending score, with scores, sliced by
    /// rank (`0, -1` returns everything).
    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StoreError>;

    /// All keys matching a glob-style pattern (`*` wildcard).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Connectivity probe.
    async fn ping(&self) -> Result<(), StoreError>;
}
