// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Time-to-live cache for wallet authentication nonces.
//!
//! Keys are normalized wallet addresses. A nonce can be taken at most once and
//! is never handed out after its deadline, whether or not the janitor has
//! swept it yet.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use redis::AsyncCommands;
use tokio::sync::RwLock;

use crate::error::AppError;

#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous entry.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError>;

    /// Remove and return the entry if it has not expired.
    async fn take_if_valid(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Drop expired entries. Backends with native expiry return 0.
    async fn purge_expired(&self) -> Result<usize, AppError>;
}

#[derive(Clone)]
struct NonceEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl NonceEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Clone, Default)]
pub struct MemoryNonceStore {
    inner: Arc<RwLock<HashMap<String, NonceEntry>>>,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError> {
        let entry = NonceEntry {
            value,
            expires_at: Utc::now() + to_chrono(ttl),
        };

        let mut guard = self.inner.write().await;
        guard.insert(key.to_string(), entry);
        Ok(())
    }

    async fn take_if_valid(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut guard = self.inner.write().await;
        let now = Utc::now();

        match guard.remove(key) {
            Some(entry) if !entry.is_expired(now) => Ok(Some(entry.value)),
            _ => Ok(None),
        }
    }

    async fn purge_expired(&self) -> Result<usize, AppError> {
        let mut guard = self.inner.write().await;
        let now = Utc::now();
        let before = guard.len();
        guard.retain(|_, entry| !entry.is_expired(now));
        Ok(before - guard.len())
    }
}

/// Redis-backed nonce cache, shared by every API instance.
#[derive(Clone)]
pub struct RedisNonceStore {
    client: redis::Client,
}

impl RedisNonceStore {
    pub fn new(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::internal("failed to create Redis client", e))?;

        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, AppError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::internal("Redis connection failed", e))
    }

    fn build_redis_key(&self, key: &str) -> String {
        format!("sentrix:nonce:{key}")
    }
}

#[async_trait]
impl NonceStore for RedisNonceStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), AppError> {
        let mut conn = self.connection().await?;
        // SETEX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);

        conn.set_ex::<_, _, ()>(self.build_redis_key(key), value, seconds)
            .await
            .map_err(|e| AppError::internal("Redis SETEX failed", e))
    }

    async fn take_if_valid(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.connection().await?;

        redis::cmd("GETDEL")
            .arg(self.build_redis_key(key))
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(|e| AppError::internal("Redis GETDEL failed", e))
    }

    async fn purge_expired(&self) -> Result<usize, AppError> {
        Ok(0)
    }
}

fn to_chrono(ttl: Duration) -> ChronoDuration {
    ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::days(36_500))
}
