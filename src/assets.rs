// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! IP asset registration and lookup.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::authenticity::IpAssetSnapshot;
use crate::chain::ChainClient;
use crate::content::ContentStore;
use crate::error::AppError;
use crate::guard::AssetRegistry;
use crate::model::{AssetPage, ContentType, IpAsset, Pagination};
use crate::store::Store;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 2000;
pub const MAX_PAGE_LIMIT: usize = 100;

/// Validated registration input.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub content_type: ContentType,
    pub content: Vec<u8>,
}

impl NewAsset {
    pub fn validate(&self) -> Result<(), AppError> {
        let title_len = self.title.trim().chars().count();
        if title_len == 0 || title_len > MAX_TITLE_CHARS {
            return Err(AppError::bad_request(format!(
                "title must be between 1 and {MAX_TITLE_CHARS} characters"
            )));
        }

        if let Some(description) = &self.description {
            if description.chars().count() > MAX_DESCRIPTION_CHARS {
                return Err(AppError::bad_request(format!(
                    "description must be at most {MAX_DESCRIPTION_CHARS} characters"
                )));
            }
        }

        if self.content.is_empty() {
            return Err(AppError::bad_request("No file or content provided"));
        }

        Ok(())
    }
}

#[derive(Clone)]
pub struct AssetService {
    store: Store,
    content: Arc<dyn ContentStore>,
    chain: Arc<dyn ChainClient>,
}

impl AssetService {
    pub fn new(store: Store, content: Arc<dyn ContentStore>, chain: Arc<dyn ChainClient>) -> Self {
        Self {
            store,
            content,
            chain,
        }
    }

    /// Upload the work, pin its metadata, register it on chain and record it.
    pub async fn register(&self, creator_wallet: &str, input: NewAsset) -> Result<IpAsset, AppError> {
        input.validate()?;

        let creator_wallet = creator_wallet.to_ascii_lowercase();
        let now = Utc::now();
        let file_name = format!(
            "sentrix-{}.{}",
            now.timestamp_millis(),
            input.content_type.extension()
        );

        let tags: Vec<String> = input
            .tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let content_fingerprint = self
            .content
            .upload_and_fingerprint(input.content, &file_name)
            .await?;

        let metadata = serde_json::json!({
            "title": input.title.trim(),
            "description": input.description,
            "creator_wallet": creator_wallet,
            "content_fingerprint": content_fingerprint,
            "category": input.category,
            "tags": tags,
            "content_type": input.content_type,
            "created_at": now,
        });
        let metadata_hash = self
            .content
            .pin_json(&metadata, &format!("sentrix-metadata-{}", now.timestamp_millis()))
            .await?;

        let receipt = self
            .chain
            .register_ip_asset(&content_fingerprint, &metadata_hash, &creator_wallet)
            .await?;

        let asset = IpAsset {
            id: uuid::Uuid::new_v4().to_string(),
            title: input.title.trim().to_string(),
            description: input.description,
            creator_wallet,
            content_fingerprint,
            metadata_hash,
            chain_ip_id: receipt.id,
            chain_tx_hash: receipt.tx_hash,
            category: input.category,
            tags,
            content_type: input.content_type,
            created_at: now,
        };
        self.store.insert(&asset).await?;

        tracing::info!(
            asset_id = %asset.id,
            chain_ip_id = %asset.chain_ip_id,
            backend = self.chain.backend_name(),
            "registered ip asset"
        );
        Ok(asset)
    }

    /// Public URL for an asset's registered content.
    pub fn content_url(&self, asset: &IpAsset) -> String {
        self.content.gateway_url(&asset.content_fingerprint)
    }

    pub async fn get(&self, id: &str) -> Result<Option<IpAsset>, AppError> {
        self.store.find(id).await
    }

    pub async fn require(&self, id: &str) -> Result<IpAsset, AppError> {
        self.get(id)
            .await?
            .ok_or_else(|| AppError::not_found("IP Asset not found"))
    }

    /// Assets created by `wallet`, newest first.
    pub async fn by_creator(&self, wallet: &str) -> Result<Vec<IpAsset>, AppError> {
        let wallet = wallet.to_ascii_lowercase();
        let mut assets = self
            .store
            .find_many(|a: &IpAsset| a.creator_wallet == wallet)
            .await?;
        newest_first(&mut assets);
        Ok(assets)
    }

    pub async fn page(&self, page: usize, limit: usize) -> Result<AssetPage, AppError> {
        if page == 0 {
            return Err(AppError::bad_request("page must be at least 1"));
        }
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(AppError::bad_request(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }

        let mut assets = self.store.all::<IpAsset>().await?;
        newest_first(&mut assets);

        let total = assets.len();
        // Pages past the end, including ones whose offset overflows, are empty.
        let offset = (page - 1).checked_mul(limit).unwrap_or(usize::MAX);
        let assets = assets.into_iter().skip(offset).take(limit).collect();

        Ok(AssetPage {
            assets,
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages: total.div_ceil(limit),
            },
        })
    }
}

#[async_trait]
impl AssetRegistry for AssetService {
    async fn get_asset_by_id(&self, id: &str) -> Result<Option<IpAssetSnapshot>, AppError> {
        Ok(self.get(id).await?.map(|asset| asset.snapshot()))
    }

    async fn creator_of(&self, id: &str) -> Result<Option<String>, AppError> {
        Ok(self.get(id).await?.map(|asset| asset.creator_wallet))
    }
}

fn newest_first(assets: &mut [IpAsset]) {
    assets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
}
