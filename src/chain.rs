// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! On-chain registry and licensing calls.
//!
//! The backend is picked at startup: [`MockChain`] for development and tests,
//! [`GatewayChain`] for a deployment where a signing relayer owns the
//! contract keys and submits transactions on our behalf.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ChainConfig;
use crate::error::AppError;
use crate::model::LicenseTerms;

/// Identifier assigned on chain plus the transaction that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReceipt {
    pub id: String,
    pub tx_hash: String,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn register_ip_asset(
        &self,
        content_hash: &str,
        metadata_hash: &str,
        creator: &str,
    ) -> Result<ChainReceipt, AppError>;

    async fn create_license(
        &self,
        chain_ip_id: &str,
        terms_hash: &str,
        terms: &LicenseTerms,
        creator: &str,
    ) -> Result<ChainReceipt, AppError>;

    async fn purchase_license(
        &self,
        chain_license_id: &str,
        buyer: &str,
        certificate_hash: &str,
    ) -> Result<ChainReceipt, AppError>;

    fn backend_name(&self) -> &'static str;
}

/// Deterministic stand-in for the contracts: sequential ids, sha256 tx hashes.
#[derive(Clone, Default)]
pub struct MockChain {
    next_ip: Arc<AtomicU64>,
    next_license: Arc<AtomicU64>,
    nonce: Arc<AtomicU64>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn tx_hash(&self, parts: &[&str]) -> String {
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(nonce.to_be_bytes());
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn register_ip_asset(
        &self,
        content_hash: &str,
        metadata_hash: &str,
        creator: &str,
    ) -> Result<ChainReceipt, AppError> {
        let id = self.next_ip.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ChainReceipt {
            id: id.to_string(),
            tx_hash: self.tx_hash(&["registerIPAsset", content_hash, metadata_hash, creator]),
        })
    }

    async fn create_license(
        &self,
        chain_ip_id: &str,
        terms_hash: &str,
        _terms: &LicenseTerms,
        creator: &str,
    ) -> Result<ChainReceipt, AppError> {
        let id = self.next_license.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ChainReceipt {
            id: id.to_string(),
            tx_hash: self.tx_hash(&["createLicense", chain_ip_id, terms_hash, creator]),
        })
    }

    async fn purchase_license(
        &self,
        chain_license_id: &str,
        buyer: &str,
        certificate_hash: &str,
    ) -> Result<ChainReceipt, AppError> {
        Ok(ChainReceipt {
            id: chain_license_id.to_string(),
            tx_hash: self.tx_hash(&["purchaseLicense", chain_license_id, buyer, certificate_hash]),
        })
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}

#[derive(Serialize)]
struct RegisterCall<'a> {
    content_hash: &'a str,
    metadata_hash: &'a str,
    creator: &'a str,
}

#[derive(Serialize)]
struct CreateLicenseCall<'a> {
    ip_id: &'a str,
    terms_hash: &'a str,
    price_wei: &'a str,
    commercial_rights: bool,
    distribution_rights: bool,
    exclusivity: bool,
    duration_days: Option<u32>,
    creator: &'a str,
}

#[derive(Serialize)]
struct PurchaseCall<'a> {
    license_id: &'a str,
    buyer: &'a str,
    certificate_hash: &'a str,
}

/// JSON/HTTP client for the signing relayer in front of the contracts.
#[derive(Clone)]
pub struct GatewayChain {
    base_url: String,
    client: Client,
}

impl GatewayChain {
    pub fn try_new(config: &ChainConfig) -> Result<Self, AppError> {
        let base_url = config
            .gateway_url
            .clone()
            .ok_or_else(|| AppError::Internal(anyhow!("chain gateway URL is not configured")))?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow!("Failed to build chain client: {}", e)))?;

        Ok(Self { base_url, client })
    }

    async fn call<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<ChainReceipt, AppError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Internal(anyhow!("Chain gateway request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Internal(anyhow!(
                "Chain gateway returned unexpected status {} for {}",
                status,
                path
            )));
        }

        let receipt = response
            .json::<ChainReceipt>()
            .await
            .map_err(|e| AppError::Internal(anyhow!("Failed to parse chain receipt: {}", e)))?;

        tracing::debug!(path, id = %receipt.id, tx_hash = %receipt.tx_hash, "chain call confirmed");
        Ok(receipt)
    }
}

#[async_trait]
impl ChainClient for GatewayChain {
    async fn register_ip_asset(
        &self,
        content_hash: &str,
        metadata_hash: &str,
        creator: &str,
    ) -> Result<ChainReceipt, AppError> {
        self.call(
            "ip-assets",
            &RegisterCall {
                content_hash,
                metadata_hash,
                creator,
            },
        )
        .await
    }

    async fn create_license(
        &self,
        chain_ip_id: &str,
        terms_hash: &str,
        terms: &LicenseTerms,
        creator: &str,
    ) -> Result<ChainReceipt, AppError> {
        self.call(
            "licenses",
            &CreateLicenseCall {
                ip_id: chain_ip_id,
                terms_hash,
                price_wei: terms.price.as_deref().unwrap_or("0"),
                commercial_rights: terms.commercial_rights,
                distribution_rights: terms.distribution_rights,
                exclusivity: terms.exclusivity,
                duration_days: terms.duration_days,
                creator,
            },
        )
        .await
    }

    async fn purchase_license(
        &self,
        chain_license_id: &str,
        buyer: &str,
        certificate_hash: &str,
    ) -> Result<ChainReceipt, AppError> {
        self.call(
            "licenses/purchase",
            &PurchaseCall {
                license_id: chain_license_id,
                buyer,
                certificate_hash,
            },
        )
        .await
    }

    fn backend_name(&self) -> &'static str {
        "gateway"
    }
}
