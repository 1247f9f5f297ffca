// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! License creation, purchase and lookup.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};

use crate::assets::AssetService;
use crate::chain::ChainClient;
use crate::content::ContentStore;
use crate::error::AppError;
use crate::guard::LicenseLookup;
use crate::model::{
    License, LicenseCertificate, LicenseRole, LicenseState, LicenseTerms, PurchaseResponse,
};
use crate::store::Store;

#[derive(Clone)]
pub struct LicenseService {
    store: Store,
    assets: AssetService,
    content: Arc<dyn ContentStore>,
    chain: Arc<dyn ChainClient>,
}

impl LicenseService {
    pub fn new(
        store: Store,
        assets: AssetService,
        content: Arc<dyn ContentStore>,
        chain: Arc<dyn ChainClient>,
    ) -> Self {
        Self {
            store,
            assets,
            content,
            chain,
        }
    }

    /// Offer a license on an asset owned by `creator_wallet`.
    pub async fn create(
        &self,
        creator_wallet: &str,
        ip_id: &str,
        terms: LicenseTerms,
    ) -> Result<License, AppError> {
        let creator_wallet = creator_wallet.to_ascii_lowercase();
        if let Some(price) = &terms.price {
            parse_wei(price)?;
        }

        let asset = self.assets.require(ip_id).await?;
        if asset.creator_wallet != creator_wallet {
            return Err(AppError::forbidden("Only the creator can create licenses"));
        }

        let now = Utc::now();
        let terms_doc = serde_json::to_value(&terms)
            .map_err(|e| AppError::internal("failed to serialize license terms", e))?;
        let terms_hash = self
            .content
            .pin_json(&terms_doc, &format!("sentrix-terms-{}", now.timestamp_millis()))
            .await?;

        let receipt = self
            .chain
            .create_license(&asset.chain_ip_id, &terms_hash, &terms, &creator_wallet)
            .await?;

        let license = License {
            id: uuid::Uuid::new_v4().to_string(),
            ip_id: asset.id,
            creator_wallet,
            buyer_wallet: None,
            expires_at: terms
                .duration_days
                .map(|days| now + Duration::days(i64::from(days))),
            terms,
            terms_hash,
            chain_license_id: receipt.id,
            chain_tx_hash: receipt.tx_hash,
            certificate_hash: None,
            status: LicenseState::Pending,
            created_at: now,
            purchased_at: None,
        };
        self.store.insert(&license).await?;

        tracing::info!(license_id = %license.id, ip_id = %license.ip_id, "created license");
        Ok(license)
    }

    /// Buy a pending license. The certificate is pinned and its hash recorded
    /// on chain.
    ///
    /// A license is claimed before any side effect, so concurrent buyers of
    /// the same license get one sale and one conflict. The claim is released
    /// if the purchase fails.
    pub async fn purchase(
        &self,
        buyer_wallet: &str,
        license_id: &str,
    ) -> Result<PurchaseResponse, AppError> {
        let buyer_wallet = buyer_wallet.to_ascii_lowercase();
        let license = self.require(license_id).await?;
        if license.status != LicenseState::Pending
            || !self.store.claim::<License>(&license.id).await?
        {
            return Err(AppError::conflict("License is not available for purchase"));
        }

        let license_id = license.id.clone();
        let result = self.complete_purchase(license, buyer_wallet).await;
        if result.is_err() {
            if let Err(error) = self.store.release::<License>(&license_id).await {
                tracing::warn!(
                    license_id = %license_id,
                    error = %error,
                    "failed to release purchase claim"
                );
            }
        }
        result
    }

    async fn complete_purchase(
        &self,
        mut license: License,
        buyer_wallet: String,
    ) -> Result<PurchaseResponse, AppError> {
        let asset = self.assets.require(&license.ip_id).await?;
        let purchased_at = Utc::now();
        let certificate = LicenseCertificate {
            license_id: license.id.clone(),
            ip_id: asset.id.clone(),
            ip_title: asset.title.clone(),
            creator_wallet: license.creator_wallet.clone(),
            buyer_wallet: buyer_wallet.clone(),
            terms: license.terms.clone(),
            purchased_at,
            expires_at: license.expires_at,
        };

        let certificate_json = serde_json::to_value(&certificate)
            .map_err(|e| AppError::internal("failed to serialize certificate", e))?;
        self.content
            .pin_json(&certificate_json, &format!("sentrix-certificate-{}", license.id))
            .await?;
        let certificate_hash = certificate_hash(&certificate_json);

        let receipt = self
            .chain
            .purchase_license(&license.chain_license_id, &buyer_wallet, &certificate_hash)
            .await?;

        license.buyer_wallet = Some(buyer_wallet);
        license.certificate_hash = Some(certificate_hash.clone());
        license.chain_tx_hash = receipt.tx_hash;
        license.status = LicenseState::Active;
        license.purchased_at = Some(purchased_at);
        self.store.insert(&license).await?;

        tracing::info!(license_id = %license.id, "license purchased");
        Ok(PurchaseResponse {
            license,
            certificate,
            certificate_hash,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<License>, AppError> {
        self.store.find(id).await
    }

    pub async fn require(&self, id: &str) -> Result<License, AppError> {
        self.get(id)
            .await?
            .ok_or_else(|| AppError::not_found("License not found"))
    }

    pub async fn active_for_asset(&self, ip_id: &str) -> Result<Vec<License>, AppError> {
        let mut licenses = self
            .store
            .find_many(|l: &License| l.ip_id == ip_id && l.status == LicenseState::Active)
            .await?;
        licenses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(licenses)
    }

    /// Licenses created or bought by `wallet`, newest first.
    pub async fn by_user(&self, wallet: &str, role: LicenseRole) -> Result<Vec<License>, AppError> {
        let wallet = wallet.to_ascii_lowercase();
        let mut licenses = self
            .store
            .find_many(|l: &License| match role {
                LicenseRole::Created => l.creator_wallet == wallet,
                LicenseRole::Purchased => l.buyer_wallet.as_deref() == Some(wallet.as_str()),
            })
            .await?;
        licenses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(licenses)
    }
}

#[async_trait]
impl LicenseLookup for LicenseService {
    async fn has_active_license(&self, asset_id: &str) -> Result<bool, AppError> {
        let active = self
            .store
            .find_many(|l: &License| l.ip_id == asset_id && l.status == LicenseState::Active)
            .await?;
        Ok(!active.is_empty())
    }
}

/// `0x` + hex sha256 of the certificate's JSON encoding.
pub fn certificate_hash(certificate: &serde_json::Value) -> String {
    format!("0x{}", hex::encode(Sha256::digest(certificate.to_string().as_bytes())))
}

/// Parse a decimal wei amount.
pub fn parse_wei(raw: &str) -> Result<u128, AppError> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::bad_request("price must be a decimal amount in wei"));
    }
    raw.parse::<u128>()
        .map_err(|_| AppError::bad_request("price is out of range"))
}
