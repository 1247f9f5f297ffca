// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Infringement report intake.
//!
//! Untrusted form input passes through [`ReportSubmission::validate`] exactly
//! once; past that point the flow works on a typed [`EvidenceBundle`]. The
//! asset is resolved before any evidence is pinned, the license flag is read
//! right before scoring, and the resulting verdict is stored verbatim with
//! the report.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::authenticity::{self, AuthenticityVerdict, EvidenceBundle, InvalidInputError, IpAssetSnapshot};
use crate::content::ContentStore;
use crate::error::AppError;
use crate::model::{Report, ReportStatus};
use crate::store::Store;

/// Read access to registered assets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetRegistry: Send + Sync {
    async fn get_asset_by_id(&self, id: &str) -> Result<Option<IpAssetSnapshot>, AppError>;

    /// Lowercase wallet of the asset's creator.
    async fn creator_of(&self, id: &str) -> Result<Option<String>, AppError>;
}

/// Answers whether an asset currently has at least one active license.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LicenseLookup: Send + Sync {
    async fn has_active_license(&self, asset_id: &str) -> Result<bool, AppError>;
}

/// Raw report fields as they arrive from the form.
#[derive(Debug, Clone, Default)]
pub struct ReportSubmission {
    pub ip_id: Option<String>,
    pub url: Option<String>,
    pub screenshot_url: Option<String>,
    pub file_url: Option<String>,
    pub declared_title: Option<String>,
    pub declared_category: Option<String>,
    pub declared_tags: Option<String>,
    pub file: Option<Vec<u8>>,
}

/// A submission that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedReport {
    pub ip_id: String,
    pub url: Option<String>,
    pub screenshot_url: Option<String>,
    pub file_url: Option<String>,
    /// Declared metadata only; the fingerprint is filled in after upload.
    pub evidence: EvidenceBundle,
    pub file: Option<Vec<u8>>,
}

impl ReportSubmission {
    pub fn validate(self) -> Result<ValidatedReport, InvalidInputError> {
        let ip_id = self
            .ip_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| InvalidInputError::MalformedEvidence("ip_id is required".into()))?;

        let url = checked_url("url", self.url)?;
        let screenshot_url = checked_url("screenshot_url", self.screenshot_url)?;
        let file_url = checked_url("file_url", self.file_url)?;
        let declared_tags = self
            .declared_tags
            .as_deref()
            .map(parse_declared_tags)
            .transpose()?;

        Ok(ValidatedReport {
            ip_id,
            url,
            screenshot_url,
            file_url,
            evidence: EvidenceBundle::from_declared(
                None,
                self.declared_title,
                self.declared_category,
                declared_tags,
            ),
            file: self.file.filter(|bytes| !bytes.is_empty()),
        })
    }
}

fn checked_url(field: &str, raw: Option<String>) -> Result<Option<String>, InvalidInputError> {
    let Some(raw) = raw.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    url::Url::parse(&raw)
        .map_err(|e| InvalidInputError::MalformedEvidence(format!("{field} is not a valid URL: {e}")))?;
    Ok(Some(raw))
}

/// Accepts a JSON array of strings or a comma-separated list.
pub fn parse_declared_tags(raw: &str) -> Result<Vec<String>, InvalidInputError> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        return serde_json::from_str::<Vec<String>>(raw).map_err(|e| {
            InvalidInputError::MalformedEvidence(format!("declared_tags is not a string array: {e}"))
        });
    }

    Ok(raw
        .split(',')
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect())
}

/// Look up an asset that reports can be scored against.
pub async fn resolve_asset(
    registry: &dyn AssetRegistry,
    ip_id: &str,
) -> Result<IpAssetSnapshot, AppError> {
    let asset = registry
        .get_asset_by_id(ip_id)
        .await?
        .ok_or_else(|| AppError::not_found("IP Asset not found"))?;
    ensure_scoreable(asset)
}

fn ensure_scoreable(asset: IpAssetSnapshot) -> Result<IpAssetSnapshot, AppError> {
    if asset.title.trim().is_empty() {
        return Err(InvalidInputError::EmptyTitle(asset.id).into());
    }
    Ok(asset)
}

/// Fetch the asset snapshot and license flag concurrently, then score.
pub async fn score_with_lookup(
    registry: &dyn AssetRegistry,
    licenses: &dyn LicenseLookup,
    ip_id: &str,
    evidence: &EvidenceBundle,
) -> Result<AuthenticityVerdict, AppError> {
    let (asset, has_active_license) = tokio::try_join!(
        registry.get_asset_by_id(ip_id),
        licenses.has_active_license(ip_id)
    )?;

    let asset = asset.ok_or_else(|| AppError::not_found("IP Asset not found"))?;
    let asset = ensure_scoreable(asset)?;

    Ok(authenticity::score_checked(
        Some(&asset),
        Some(evidence),
        has_active_license,
    )?)
}

#[derive(Clone)]
pub struct ReportService {
    store: Store,
    registry: Arc<dyn AssetRegistry>,
    licenses: Arc<dyn LicenseLookup>,
    content: Arc<dyn ContentStore>,
}

impl ReportService {
    pub fn new(
        store: Store,
        registry: Arc<dyn AssetRegistry>,
        licenses: Arc<dyn LicenseLookup>,
        content: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            store,
            registry,
            licenses,
            content,
        }
    }

    pub async fn submit(
        &self,
        reporter_wallet: &str,
        submission: ValidatedReport,
    ) -> Result<Report, AppError> {
        let ValidatedReport {
            ip_id,
            url,
            screenshot_url,
            mut file_url,
            mut evidence,
            file,
        } = submission;

        // Unknown assets are rejected before any evidence is pinned.
        let asset = resolve_asset(self.registry.as_ref(), &ip_id).await?;

        if let Some(bytes) = file {
            let name = format!("sentrix-evidence-{}", Utc::now().timestamp_millis());
            let fingerprint = self.content.upload_and_fingerprint(bytes, &name).await?;
            file_url = Some(format!("ipfs://{fingerprint}"));
            evidence.content_fingerprint = Some(fingerprint);
        }

        let has_active_license = self.licenses.has_active_license(&ip_id).await?;
        let verdict =
            authenticity::score_checked(Some(&asset), Some(&evidence), has_active_license)?;

        let report = Report {
            id: uuid::Uuid::new_v4().to_string(),
            ip_id,
            reporter_wallet: reporter_wallet.to_ascii_lowercase(),
            url,
            screenshot_url,
            file_url,
            confidence_score: verdict.confidence_score,
            status: ReportStatus::Pending,
            evidence,
            verdict,
            rescan_of: None,
            created_at: Utc::now(),
        };
        self.store.insert(&report).await?;

        tracing::info!(
            report_id = %report.id,
            ip_id = %report.ip_id,
            confidence = report.confidence_score,
            hash_match = report.verdict.hash_match,
            "infringement report submitted"
        );
        Ok(report)
    }

    pub async fn get(&self, id: &str) -> Result<Report, AppError> {
        self.store
            .find(id)
            .await?
            .ok_or_else(|| AppError::not_found("Report not found"))
    }

    /// Reports against an asset, newest first.
    pub async fn list_by_ip(&self, ip_id: &str) -> Result<Vec<Report>, AppError> {
        let mut reports = self
            .store
            .find_many(|r: &Report| r.ip_id == ip_id)
            .await?;
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    /// Triage a report. Only the creator of the reported asset may do this.
    pub async fn update_status(
        &self,
        caller_wallet: &str,
        id: &str,
        status: ReportStatus,
    ) -> Result<Report, AppError> {
        let mut report = self.get(id).await?;
        let creator = self
            .registry
            .creator_of(&report.ip_id)
            .await?
            .ok_or_else(|| AppError::not_found("IP Asset not found"))?;

        if !creator.eq_ignore_ascii_case(caller_wallet) {
            return Err(AppError::forbidden(
                "Only the asset creator can update report status",
            ));
        }

        report.status = status;
        self.store.insert(&report).await?;
        tracing::info!(report_id = %report.id, ?status, "report status updated");
        Ok(report)
    }

    /// Score the stored evidence again and record the result as a new report.
    pub async fn rescan(&self, id: &str) -> Result<Report, AppError> {
        let original = self.get(id).await?;
        let verdict = score_with_lookup(
            self.registry.as_ref(),
            self.licenses.as_ref(),
            &original.ip_id,
            &original.evidence,
        )
        .await?;

        let report = Report {
            id: uuid::Uuid::new_v4().to_string(),
            confidence_score: verdict.confidence_score,
            status: ReportStatus::Pending,
            verdict,
            rescan_of: Some(original.id.clone()),
            created_at: Utc::now(),
            ..original
        };
        self.store.insert(&report).await?;

        tracing::info!(report_id = %report.id, rescan_of = ?report.rescan_of, "report rescanned");
        Ok(report)
    }
}
