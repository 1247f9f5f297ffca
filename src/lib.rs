// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Sentrix guard API: wallet sign-in, IP asset registration, programmable
//! licensing and scored infringement reports.

pub mod analytics;
pub mod api;
pub mod assets;
pub mod auth;
pub mod authenticity;
pub mod chain;
pub mod config;
pub mod content;
pub mod error;
pub mod guard;
pub mod licensing;
pub mod metrics;
pub mod model;
pub mod nonce;
pub mod store;
pub mod wallet;

use std::sync::Arc;

use anyhow::Context;

use crate::api::AppState;
use crate::chain::{ChainClient, GatewayChain, MockChain};
use crate::config::{AppConfig, ChainBackend};
use crate::content::{ContentStore, MemoryContentStore, PinataStore};
use crate::nonce::{MemoryNonceStore, NonceStore, RedisNonceStore};
use crate::store::{RedisBackend, Store};

/// Build the application state from configuration, connecting to Redis when
/// a URL is configured.
pub async fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let (store, nonces): (Store, Arc<dyn NonceStore>) = match &config.redis_url {
        Some(url) => {
            let backend = RedisBackend::new(url)?;
            backend.ping().await.context("Redis is not reachable")?;
            tracing::info!("using redis record store");
            (Store::new(backend), Arc::new(RedisNonceStore::new(url)?))
        }
        None => {
            tracing::warn!("REDIS_URL not set; records and nonces are kept in memory");
            (Store::in_memory(), Arc::new(MemoryNonceStore::new()))
        }
    };

    let content: Arc<dyn ContentStore> = match &config.pinata {
        Some(pinata) => Arc::new(PinataStore::try_new(pinata.clone())?),
        None => {
            tracing::warn!("Pinata credentials not set; content is kept in memory");
            Arc::new(MemoryContentStore::new())
        }
    };

    let chain: Arc<dyn ChainClient> = match config.chain.backend {
        ChainBackend::Mock => Arc::new(MockChain::new()),
        ChainBackend::Gateway => Arc::new(GatewayChain::try_new(&config.chain)?),
    };
    tracing::info!(backend = chain.backend_name(), "chain client ready");

    Ok(AppState::new(
        store,
        nonces,
        content,
        chain,
        &config.jwt_secret,
        config.jwt_ttl,
        config.nonce_ttl,
    )?)
}
