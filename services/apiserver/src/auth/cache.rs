//! Single-flight TTL cache.
//!
//! # Purpose
//! Memoizes an async loader per key for a fixed TTL. Concurrent misses on the
//! same key collapse to one backing load: the per-key mutex is held across
//! the load, so waiters observe either the previous value or the freshly
//! loaded one, never a torn entry.
use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

type Loader<K, V> =
    Arc<dyn Fn(K) -> Pin<Box<dyn Future<Output = anyhow::Result<V>> + Send>> + Send + Sync>;

struct Entry<V> {
    value: V,
    loaded_at: Instant,
}

pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: DashMap<K, Arc<Mutex<Option<Entry<V>>>>>,
    loader: Loader<K, V>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(ttl: Duration, loader: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        Self {
            ttl,
            entries: DashMap::new(),
            loader: Arc::new(move |key| Box::pin(loader(key))),
        }
    }

    fn slot(&self, key: &K) -> Arc<Mutex<Option<Entry<V>>>> {
        self.entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// The cached value for `key`, loading it when absent or expired.
    pub async fn get(&self, key: K) -> anyhow::Result<V> {
        let slot = self.slot(&key);
        let mut guard = slot.lock().await;
        if let Some(entry) = guard.as_ref() {
            if entry.loaded_at.elapsed() < self.ttl {
                return Ok(entry.value.clone());
            }
        }
        let value = (self.loader)(key).await?;
        *guard = Some(Entry {
            value: value.clone(),
            loaded_at: Instant::now(),
        });
        Ok(value)
    }

    /// Force a reload regardless of freshness.
    pub async fn refresh(&self, key: K) -> anyhow::Result<V> {
        let slot = self.slot(&key);
        let mut guard = slot.lock().await;
        let value = (self.loader)(key).await?;
        *guard = Some(Entry {
            value: value.clone(),
            loaded_at: Instant::now(),
        });
        Ok(value)
    }
}
