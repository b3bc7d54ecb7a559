//! Postgres-backed implementation of the key-value backend.
//!
//! # What this module is
//! Implements [`KvBackend`] on a single `kv` table via `sqlx`. The api-server
//! treats the backend as a TTL-capable key-value database; Postgres supplies
//! the durability and the single-key atomicity the contract requires.
//!
//! # Expiry model
//! TTLs are stored as an `expires_at` column. A row past its deadline is
//! invisible to every read and may be overwritten by `put_if_absent`; a
//! best-effort background task reaps expired rows so the table stays bounded.
//!
//! # Consistency / atomicity
//! Every operation is a single statement. `put_if_absent` and `incr` ride on
//! `INSERT ... ON CONFLICT`, which is linearizable per key, so concurrent
//! signing-key bootstrap and rate-limit windows behave the same as on a
//! dedicated key-value store.
use super::{KvBackend, StoreError, StoreResult};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;

pub struct PostgresKv {
    pool: PgPool,
}

impl PostgresKv {
    /// Connect, run migrations, and start expiry maintenance.
    ///
    /// Pool acquisition and statements are bounded so an unhealthy database
    /// fails requests fast instead of hanging them.
    pub async fn connect(url: &str, password: &str, op_timeout: Duration) -> StoreResult<Self> {
        let mut options = PgConnectOptions::from_str(url)
            .context("parse key-value address")
            .map_err(StoreError::Unexpected)?;
        if !password.is_empty() {
            options = options.password(password);
        }
        let options = options.options([(
            "statement_timeout",
            format!("{}", op_timeout.as_millis()),
        )]);

        let pool = PgPoolOptions::new()
            .max_connections(16)
            .acquire_timeout(op_timeout)
            .connect_with(options)
            .await
            .context("connect key-value store")
            .map_err(StoreError::Unexpected)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run key-value migrations")
            .map_err(StoreError::Unexpected)?;

        spawn_expiry_task(pool.clone());

        Ok(Self { pool })
    }
}

/// Reap expired rows once a minute. Reads already treat them as absent, this
/// only bounds table growth; failures are retried on the next tick.
fn spawn_expiry_task(pool: PgPool) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let result = sqlx::query("DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= now()")
                .execute(&pool)
                .await;
            if let Err(err) = result {
                tracing::warn!(error = %err, "kv expiry maintenance failed");
            }
        }
    });
}

#[async_trait]
impl KvBackend for PostgresKv {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM kv WHERE key = $1 AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("kv get")
        .map_err(StoreError::Unexpected)?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let expires_at = ttl.map(|ttl| Utc::now() + ttl);
        sqlx::query(
            "INSERT INTO kv (key, value, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .context("kv put")
        .map_err(StoreError::Unexpected)?;
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> StoreResult<bool> {
        // An expired row does not count as present; the conditional update
        // lets the insert reclaim it atomically.
        let result = sqlx::query(
            "INSERT INTO kv (key, value, expires_at) VALUES ($1, $2, NULL) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, expires_at = NULL \
             WHERE kv.expires_at IS NOT NULL AND kv.expires_at <= now()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .context("kv put_if_absent")
        .map_err(StoreError::Unexpected)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM kv WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .context("kv delete")
            .map_err(StoreError::Unexpected)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<(String, String)>> {
        // `_` and `%` are LIKE wildcards; keys contain user-supplied ids, so
        // the prefix must be escaped or one user's scan could match another.
        let escaped = prefix
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT key, value FROM kv WHERE key LIKE $1 || '%' ESCAPE '\\' \
             AND (expires_at IS NULL OR expires_at > now())",
        )
        .bind(escaped)
        .fetch_all(&self.pool)
        .await
        .context("kv scan")
        .map_err(StoreError::Unexpected)?;
        Ok(rows)
    }

    async fn incr(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        // The TTL applies only when the window is created; increments inside
        // a live window keep its original deadline.
        let expires_at = Utc::now() + ttl;
        let value: String = sqlx::query_scalar(
            "INSERT INTO kv (key, value, expires_at) VALUES ($1, '1', $2) \
             ON CONFLICT (key) DO UPDATE SET \
               value = CASE WHEN kv.expires_at IS NOT NULL AND kv.expires_at <= now() \
                            THEN '1' ELSE (kv.value::bigint + 1)::text END, \
               expires_at = CASE WHEN kv.expires_at IS NOT NULL AND kv.expires_at <= now() \
                            THEN EXCLUDED.expires_at ELSE kv.expires_at END \
             RETURNING value",
        )
        .bind(key)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .context("kv incr")
        .map_err(StoreError::Unexpected)?;
        value
            .parse::<i64>()
            .context("kv counter value")
            .map_err(StoreError::Unexpected)
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("kv health check")
            .map_err(StoreError::Unexpected)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
