// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Content-addressed storage for registered works, report evidence and
//! pinned documents (asset metadata, license terms, certificates).
//!
//! A deployment uses exactly one store, so fingerprints produced for assets
//! and for report evidence are always comparable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::config::PinataConfig;
use crate::error::AppError;

const PIN_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store raw bytes and return their content fingerprint.
    async fn upload_and_fingerprint(&self, bytes: Vec<u8>, name: &str) -> Result<String, AppError>;

    /// Store a JSON document and return its fingerprint.
    async fn pin_json(&self, value: &serde_json::Value, name: &str) -> Result<String, AppError>;

    fn gateway_url(&self, fingerprint: &str) -> String;
}

/// Pins content to IPFS through the Pinata API (CID v0 fingerprints).
#[derive(Clone)]
pub struct PinataStore {
    config: PinataConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

impl PinataStore {
    pub fn try_new(config: PinataConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(PIN_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(anyhow!("Failed to build Pinata client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/pinning/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, AppError> {
        let response = request
            .header("pinata_api_key", &self.config.api_key)
            .header("pinata_secret_api_key", &self.config.secret_key)
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow!("Pinata request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Internal(anyhow!(
                "Pinata returned unexpected status {}",
                status
            )));
        }

        let payload = response
            .json::<PinResponse>()
            .await
            .map_err(|e| AppError::Internal(anyhow!("Failed to parse Pinata response: {}", e)))?;

        Ok(payload.ipfs_hash)
    }
}

#[async_trait]
impl ContentStore for PinataStore {
    async fn upload_and_fingerprint(&self, bytes: Vec<u8>, name: &str) -> Result<String, AppError> {
        let size = bytes.len();
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(name.to_string()))
            .text("pinataMetadata", serde_json::json!({ "name": name }).to_string())
            .text("pinataOptions", serde_json::json!({ "cidVersion": 0 }).to_string());

        let hash = self
            .send(self.client.post(self.endpoint("pinFileToIPFS")).multipart(form))
            .await?;
        tracing::debug!(name, size, ipfs_hash = %hash, "pinned file");
        Ok(hash)
    }

    async fn pin_json(&self, value: &serde_json::Value, name: &str) -> Result<String, AppError> {
        let body = serde_json::json!({
            "pinataContent": value,
            "pinataMetadata": { "name": name },
            "pinataOptions": { "cidVersion": 0 },
        });

        let hash = self
            .send(self.client.post(self.endpoint("pinJSONToIPFS")).json(&body))
            .await?;
        tracing::debug!(name, ipfs_hash = %hash, "pinned json document");
        Ok(hash)
    }

    fn gateway_url(&self, fingerprint: &str) -> String {
        format!("{}{}", self.config.gateway_url, fingerprint)
    }
}

/// In-process store keyed by the hex sha256 of the content.
#[derive(Clone, Default)]
pub struct MemoryContentStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fingerprint(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    pub async fn get(&self, fingerprint: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(fingerprint).cloned()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn upload_and_fingerprint(&self, bytes: Vec<u8>, _name: &str) -> Result<String, AppError> {
        let fingerprint = Self::fingerprint(&bytes);
        self.blobs.write().await.insert(fingerprint.clone(), bytes);
        Ok(fingerprint)
    }

    async fn pin_json(&self, value: &serde_json::Value, name: &str) -> Result<String, AppError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| AppError::internal("failed to serialize document", e))?;
        self.upload_and_fingerprint(bytes, name).await
    }

    fn gateway_url(&self, fingerprint: &str) -> String {
        format!("memory://{fingerprint}")
    }
}
