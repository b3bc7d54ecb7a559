use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod postgres;
pub mod tokens;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Key-value backend shared by the token store, the signing-key store, and
/// the rate limiter.
///
/// Every operation is an atomic single-key command. Entries with a TTL
/// self-evict; an expired entry is indistinguishable from an absent one.
/// `put_if_absent` must be linearizable, it is what makes concurrent
/// first-use signing-key creation produce exactly one key.
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;
    /// Returns true when the write won, false when a live entry already held
    /// the key.
    async fn put_if_absent(&self, key: &str, value: &str) -> StoreResult<bool>;
    async fn delete(&self, key: &str) -> StoreResult<()>;
    async fn exists(&self, key: &str) -> StoreResult<bool>;
    /// All live `(key, value)` pairs whose key starts with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, String)>>;
    /// Fixed-window counter: increments the integer at `key`, creating it
    /// with the given TTL. The TTL is only applied on creation so the window
    /// ends `ttl` after its first hit.
    async fn incr(&self, key: &str, ttl: Duration) -> StoreResult<i64>;
    async fn health_check(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}
