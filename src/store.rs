// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Durable record store.
//!
//! Records are JSON documents grouped by kind. The Redis backend keeps one
//! hash per kind (`sentrix:<kind>`, field = record id); the memory backend is
//! used for development and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::AppError;

/// A persistable record type.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const KIND: &'static str;

    fn id(&self) -> &str;
}

/// Trait for record backends
#[async_trait]
pub trait RecordBackend: Send + Sync {
    async fn put(&self, kind: &str, id: &str, json: String) -> Result<(), AppError>;
    async fn get(&self, kind: &str, id: &str) -> Result<Option<String>, AppError>;
    async fn values(&self, kind: &str) -> Result<Vec<String>, AppError>;
    /// Set `id` under `kind` only if absent. Returns whether it was set.
    async fn claim(&self, kind: &str, id: &str) -> Result<bool, AppError>;
    async fn release(&self, kind: &str, id: &str) -> Result<(), AppError>;
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<RwLock<HashMap<String, HashMap<String, String>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordBackend for MemoryBackend {
    async fn put(&self, kind: &str, id: &str, json: String) -> Result<(), AppError> {
        let mut guard = self.inner.write().await;
        guard
            .entry(kind.to_string())
            .or_default()
            .insert(id.to_string(), json);
        Ok(())
    }

    async fn get(&self, kind: &str, id: &str) -> Result<Option<String>, AppError> {
        let guard = self.inner.read().await;
        Ok(guard.get(kind).and_then(|records| records.get(id)).cloned())
    }

    async fn values(&self, kind: &str) -> Result<Vec<String>, AppError> {
        let guard = self.inner.read().await;
        Ok(guard
            .get(kind)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn claim(&self, kind: &str, id: &str) -> Result<bool, AppError> {
        let mut guard = self.inner.write().await;
        let records = guard.entry(kind.to_string()).or_default();
        if records.contains_key(id) {
            return Ok(false);
        }
        records.insert(id.to_string(), "1".to_string());
        Ok(true)
    }

    async fn release(&self, kind: &str, id: &str) -> Result<(), AppError> {
        let mut guard = self.inner.write().await;
        if let Some(records) = guard.get_mut(kind) {
            records.remove(id);
        }
        Ok(())
    }
}

/// Redis-based record backend
#[derive(Clone)]
pub struct RedisBackend {
    client: redis::Client,
}

impl RedisBackend {
    pub fn new(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::internal("failed to create Redis client", e))?;

        Ok(Self { client })
    }

    /// Test the Redis connection
    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.connection().await?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::internal("Redis PING failed", e))?;

        Ok(())
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, AppError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::internal("Redis connection failed", e))
    }

    fn build_redis_key(&self, kind: &str) -> String {
        format!("sentrix:{kind}")
    }
}

#[async_trait]
impl RecordBackend for RedisBackend {
    async fn put(&self, kind: &str, id: &str, json: String) -> Result<(), AppError> {
        let mut conn = self.connection().await?;
        conn.hset::<_, _, _, ()>(self.build_redis_key(kind), id, json)
            .await
            .map_err(|e| AppError::internal("Redis HSET failed", e))
    }

    async fn get(&self, kind: &str, id: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.connection().await?;
        conn.hget(self.build_redis_key(kind), id)
            .await
            .map_err(|e| AppError::internal("Redis HGET failed", e))
    }

    async fn values(&self, kind: &str) -> Result<Vec<String>, AppError> {
        let mut conn = self.connection().await?;
        conn.hvals(self.build_redis_key(kind))
            .await
            .map_err(|e| AppError::internal("Redis HVALS failed", e))
    }

    async fn claim(&self, kind: &str, id: &str) -> Result<bool, AppError> {
        let mut conn = self.connection().await?;
        conn.hset_nx(self.build_redis_key(kind), id, "1")
            .await
            .map_err(|e| AppError::internal("Redis HSETNX failed", e))
    }

    async fn release(&self, kind: &str, id: &str) -> Result<(), AppError> {
        let mut conn = self.connection().await?;
        conn.hdel::<_, _, ()>(self.build_redis_key(kind), id)
            .await
            .map_err(|e| AppError::internal("Redis HDEL failed", e))
    }
}

/// Typed access over whichever backend was configured.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn RecordBackend>,
}

impl Store {
    pub fn new(backend: impl RecordBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Insert or replace a record under its id.
    pub async fn insert<T: Record>(&self, record: &T) -> Result<(), AppError> {
        let json = serde_json::to_string(record)
            .map_err(|e| AppError::internal("failed to serialize record", e))?;
        self.backend.put(T::KIND, record.id(), json).await
    }

    pub async fn find<T: Record>(&self, id: &str) -> Result<Option<T>, AppError> {
        match self.backend.get(T::KIND, id).await? {
            Some(json) => decode(&json).map(Some),
            None => Ok(None),
        }
    }

    pub async fn find_many<T, F>(&self, filter: F) -> Result<Vec<T>, AppError>
    where
        T: Record,
        F: Fn(&T) -> bool + Send,
    {
        let mut records = Vec::new();
        for json in self.backend.values(T::KIND).await? {
            let record: T = decode(&json)?;
            if filter(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub async fn all<T: Record>(&self) -> Result<Vec<T>, AppError> {
        self.find_many(|_: &T| true).await
    }

    /// Take an exclusive claim on a record id. Only one caller gets `true`
    /// until the claim is released.
    pub async fn claim<T: Record>(&self, id: &str) -> Result<bool, AppError> {
        self.backend.claim(&claim_kind::<T>(), id).await
    }

    pub async fn release<T: Record>(&self, id: &str) -> Result<(), AppError> {
        self.backend.release(&claim_kind::<T>(), id).await
    }
}

fn claim_kind<T: Record>() -> String {
    format!("{}:claim", T::KIND)
}

fn decode<T: Record>(json: &str) -> Result<T, AppError> {
    serde_json::from_str(json).map_err(|e| {
        AppError::internal(&format!("failed to deserialize {} record", T::KIND), e)
    })
}
