//! In-memory implementation of the key-value backend.
//!
//! # Purpose
//! Implements [`KvBackend`] with a `HashMap` guarded by `tokio::sync::RwLock`.
//! It exists for local development and tests (no external dependencies) and
//! is what the server falls back to when no key-value address is configured,
//! which is only permitted in the dev stage.
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - **Single-process consistency**: mutations take the write lock, so
//!   `put_if_absent` and `incr` are linearizable within the process.
//! - Expiry is lazy: an entry past its deadline is treated as absent and
//!   removed on the next touch.
use super::{KvBackend, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvBackend for MemoryKv {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired entry, evict it under the write lock.
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(key) {
            if !existing.is_expired() {
                return Ok(false);
            }
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, String)>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired())
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let mut entries = self.entries.write().await;
        let count = match entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                entry.value.parse::<i64>().unwrap_or(0) + 1
            }
            _ => 1,
        };
        let expires_at = match entries.get(key) {
            // Keep the original window deadline on subsequent increments.
            Some(entry) if !entry.is_expired() => entry.expires_at,
            _ => Some(Instant::now() + ttl),
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: count.to_string(),
                expires_at,
            },
        );
        Ok(count)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let kv = MemoryKv::new();
        kv.put("a", "1", None).await.expect("put");
        assert_eq!(kv.get("a").await.expect("get"), Some("1".to_string()));
        assert_eq!(kv.get("b").await.expect("get"), None);
    }

    #[tokio::test]
    async fn ttl_entries_expire() {
        let kv = MemoryKv::new();
        kv.put("a", "1", Some(Duration::from_millis(5)))
            .await
            .expect("put");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(kv.get("a").await.expect("get"), None);
        assert!(!kv.exists("a").await.expect("exists"));
    }

    #[tokio::test]
    async fn put_if_absent_only_wins_once() {
        let kv = MemoryKv::new();
        assert!(kv.put_if_absent("k", "first").await.expect("first"));
        assert!(!kv.put_if_absent("k", "second").await.expect("second"));
        assert_eq!(kv.get("k").await.expect("get"), Some("first".to_string()));
    }

    #[tokio::test]
    async fn put_if_absent_reclaims_expired_entry() {
        let kv = MemoryKv::new();
        kv.put("k", "old", Some(Duration::from_millis(1)))
            .await
            .expect("put");
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(kv.put_if_absent("k", "new").await.expect("reclaim"));
    }

    #[tokio::test]
    async fn scan_prefix_skips_other_keys() {
        let kv = MemoryKv::new();
        kv.put("tokens/alice/1", "a", None).await.expect("put");
        kv.put("tokens/alice/2", "b", None).await.expect("put");
        kv.put("tokens/bob/1", "c", None).await.expect("put");

        let mut alice = kv.scan_prefix("tokens/alice/").await.expect("scan");
        alice.sort();
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].0, "tokens/alice/1");
    }

    #[tokio::test]
    async fn incr_counts_within_window() {
        let kv = MemoryKv::new();
        assert_eq!(kv.incr("c", Duration::from_secs(60)).await.expect("incr"), 1);
        assert_eq!(kv.incr("c", Duration::from_secs(60)).await.expect("incr"), 2);
        assert_eq!(kv.incr("c", Duration::from_secs(60)).await.expect("incr"), 3);
    }

    #[tokio::test]
    async fn incr_restarts_after_window() {
        let kv = MemoryKv::new();
        assert_eq!(kv.incr("c", Duration::from_millis(5)).await.expect("incr"), 1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(kv.incr("c", Duration::from_millis(5)).await.expect("incr"), 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let kv = MemoryKv::new();
        kv.put("k", "v", None).await.expect("put");
        kv.delete("k").await.expect("delete");
        kv.delete("k").await.expect("delete again");
        assert_eq!(kv.get("k").await.expect("get"), None);
    }
}
