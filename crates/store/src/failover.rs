use crate::error::StoreError;
use crate::{KvStore, MemoryStore, RedisStore};
use async_trait::async_trait;
use configuration::StoreMode;
use std::collections::HashMap;
use std::time::Duration;

/// Routes one operation through the primary backend, falling back to memory
/// in permissive mode and surfacing `Unavailable` in strict mode.
macro_rules! with_failover {
    ($self:expr, $method:ident ( $($arg:expr),* )) => {{
        match &$self.primary {
            Some(primary) => match primary.$method($($arg),*).await {
                Ok(value) => Ok(value),
                Err(err) => {
                    if $self.mode == StoreMode::Permissive {
                        tracing::warn!(
                            op = stringify!($method),
                            error = %err,
                            "store unavailable, serving from memory"
                        );
                        $self.fallback.$method($($arg),*).await
                    } else {
                        Err(StoreError::Unavailable(err.to_string()))
                    }
                }
            },
            None => $self.fallback.$method($($arg),*).await,
        }
    }};
}

/// The store the application actually runs against: Redis when configured and
/// reachable, the in-memory backend otherwise.
///
/// In permissive mode a Redis failure downgrades to the in-memory backend
/// with a warning; once Redis recovers, new operations go there again while
/// keys written to the fallback in the meantime stay in memory (no automatic
/// migration — documented limitation). In strict mode Redis failures surface
/// as `StoreError::Unavailable`.
pub struct FailoverStore {
    primary: Option<RedisStore>,
    fallback: MemoryStore,
    mode: StoreMode,
}

impl FailoverStore {
    pub fn new(primary: Option<RedisStore>, mode: StoreMode) -> Self {
        Self {
            primary,
            fallback: MemoryStore::new(),
            mode,
        }
    }

    /// A store with no external backend at all.
    pub fn in_memory() -> Self {
        Self::new(None, StoreMode::Permissive)
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }
}

#[async_trait]
impl KvStore for FailoverStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        with_failover!(self, get(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        with_failover!(self, set(key, value))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        with_failover!(self, set_ex(key, value, ttl))
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        with_failover!(self, del(key))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        with_failover!(self, exists(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        with_failover!(self, expire(key, ttl))
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        with_failover!(self, incr(key))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        with_failover!(self, hset(key, field, value))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        with_failover!(self, hget(key, field))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        with_failover!(self, hgetall(key))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        with_failover!(self, sadd(key, member))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        with_failover!(self, srem(key, member))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        with_failover!(self, smembers(key))
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        with_failover!(self, sismember(key, member))
    }

    async fn scard(&self, key: &str) -> Result<u64, StoreError> {
        with_failover!(self, scard(key))
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        with_failover!(self, zadd(key, member, score))
    }

    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        with_failover!(self, zrevrange_withscores(key, start, stop))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        with_failover!(self, keys(pattern))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        with_failover!(self, ping())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_primary_runs_entirely_in_memory() {
        let store = FailoverStore::in_memory();
        assert!(!store.has_primary());

        store.set("round:1", "{}").await.unwrap();
        assert_eq!(store.get("round:1").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(store.incr("round:counter").await.unwrap(), 1);
        store.ping().await.unwrap();
    }
}
