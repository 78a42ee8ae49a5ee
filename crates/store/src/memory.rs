use crate::error::StoreError;
use crate::KvStore;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-process implementation of the store contract.
///
/// Keeps separate maps per value kind (string, hash, set, sorted set) plus a
/// counter map, all guarded by a single mutex. A TTL write schedules its own
/// deletion on the runtime; overwriting a key bumps a generation counter so a
/// stale timer cannot delete the replacement value early.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, HashSet<String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
    counters: HashMap<String, i64>,
    expiry_gen: HashMap<String, u64>,
}

impl Inner {
    fn remove_key(&mut self, key: &str) {
        self.strings.remove(key);
        self.hashes.remove(key);
        self.sets.remove(key);
        self.zsets.remove(key);
        self.counters.remove(key);
    }

    fn key_exists(&self, key: &str) -> bool {
        self.strings.contains_key(key)
            || self.hashes.contains_key(key)
            || self.sets.contains_key(key)
            || self.zsets.contains_key(key)
            || self.counters.contains_key(key)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a deletion timer for `key`, valid only while the key's generation
    /// is unchanged.
    fn schedule_expiry(&self, key: &str, ttl: Duration) {
        let generation = {
            let mut inner = self.inner.lock().expect("memory store poisoned");
            let generation = inner.expiry_gen.entry(key.to_string()).or_insert(0);
            *generation += 1;
            *generation
        };

        let key = key.to_string();
        let store = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut inner = store.lock().expect("memory store poisoned");
            if inner.expiry_gen.get(&key) == Some(&generation) {
                inner.remove_key(&key);
                inner.expiry_gen.remove(&key);
            }
        });
    }

    fn bump_generation(&self, key: &str) {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        if let Some(generation) = inner.expiry_gen.get_mut(key) {
            *generation += 1;
        }
    }
}

/// Glob match supporting only the `*` wildcard, which is all the key layout
/// uses.
fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let mut remainder = key;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match remainder.strip_prefix(part) {
                Some(rest) => remainder = rest,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return remainder.ends_with(part);
        } else {
            match remainder.find(part) {
                Some(pos) => remainder = &remainder[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.bump_generation(key);
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.lock().expect("memory store poisoned");
            inner.strings.insert(key.to_string(), value.to_string());
        }
        self.schedule_expiry(key, ttl);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.remove_key(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.key_exists(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.schedule_expiry(key, ttl);
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let counter = inner.counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner
            .sets
            .get_mut(key)
            .map(|s| s.remove(member))
            .unwrap_or(false))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.sets.get(key).is_some_and(|s| s.contains(member)))
    }

    async fn scard(&self, key: &str) -> Result<u64, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.sets.get(key).map(|s| s.len() as u64).unwrap_or(0))
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let Some(zset) = inner.zsets.get(key) else {
            return Ok(Vec::new());
        };

        // Materialize, sort by score descending (ties by member for a stable
        // order), then slice by rank the way ZREVRANGE does.
        let mut entries: Vec<(String, f64)> =
            zset.iter().map(|(m, s)| (m.clone(), *s)).collect();
        entries.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let len = entries.len() as isize;
        let resolve = |rank: isize| -> isize {
            if rank < 0 { (len + rank).max(0) } else { rank.min(len) }
        };
        let from = resolve(start);
        let to = (resolve(stop) + 1).min(len);
        if from >= to {
            return Ok(Vec::new());
        }
        Ok(entries[from as usize..to as usize].to_vec())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut all: Vec<String> = inner
            .strings
            .keys()
            .chain(inner.hashes.keys())
            .chain(inner.sets.keys())
            .chain(inner.zsets.keys())
            .chain(inner.counters.keys())
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        all.sort();
        all.dedup();
        Ok(all)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn string_roundtrip_and_delete() {
        let store = MemoryStore::new();
        store.set("round:1", "{}").await.unwrap();
        assert_eq!(store.get("round:1").await.unwrap().as_deref(), Some("{}"));
        assert!(store.exists("round:1").await.unwrap());

        store.del("round:1").await.unwrap();
        assert_eq!(store.get("round:1").await.unwrap(), None);
        assert!(!store.exists("round:1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn set_ex_deletes_after_ttl() {
        let store = MemoryStore::new();
        store
            .set_ex("round:2", "{}", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.exists("round:2").await.unwrap());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!store.exists("round:2").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_cancels_stale_expiry() {
        let store = MemoryStore::new();
        store
            .set_ex("round:3", "old", Duration::from_secs(10))
            .await
            .unwrap();
        store.set("round:3", "new").await.unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(store.get("round:3").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn counter_is_monotonic() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("round:counter").await.unwrap(), 1);
        assert_eq!(store.incr("round:counter").await.unwrap(), 2);
        assert_eq!(store.incr("round:counter").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn set_membership() {
        let store = MemoryStore::new();
        assert!(store.sadd("participants", "0xabc").await.unwrap());
        assert!(!store.sadd("participants", "0xabc").await.unwrap());
        assert!(store.sismember("participants", "0xabc").await.unwrap());
        assert_eq!(store.scard("participants").await.unwrap(), 1);
        assert!(store.srem("participants", "0xabc").await.unwrap());
        assert_eq!(store.scard("participants").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn zrevrange_orders_by_score_descending() {
        let store = MemoryStore::new();
        store.zadd("lb", "w1", 1.5).await.unwrap();
        store.zadd("lb", "w2", -0.3).await.unwrap();
        store.zadd("lb", "w3", 4.2).await.unwrap();

        let all = store.zrevrange_withscores("lb", 0, -1).await.unwrap();
        let members: Vec<&str> = all.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(members, vec!["w3", "w1", "w2"]);

        let top2 = store.zrevrange_withscores("lb", 0, 1).await.unwrap();
        assert_eq!(top2.len(), 2);
        assert_eq!(top2[0].0, "w3");
    }

    #[tokio::test]
    async fn hash_fields() {
        let store = MemoryStore::new();
        store.hset("logs", "1000", "a").await.unwrap();
        store.hset("logs", "2000", "b").await.unwrap();
        assert_eq!(store.hget("logs", "1000").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.hgetall("logs").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn keys_glob_patterns() {
        let store = MemoryStore::new();
        store.set("strategy:1", "a").await.unwrap();
        store.set("strategy:2", "b").await.unwrap();
        store.set("round:1", "c").await.unwrap();
        store.sadd("strategy:1:licenses", "w").await.unwrap();

        let keys = store.keys("strategy:*").await.unwrap();
        assert_eq!(keys.len(), 3);
        let exact = store.keys("round:1").await.unwrap();
        assert_eq!(exact, vec!["round:1"]);
    }
}
