// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Records and request/response schemas.
//!
//! Records are what the [`crate::store`] persists; the remaining types are
//! the typed shapes of each endpoint's input and output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::authenticity::{AuthenticityVerdict, EvidenceBundle, IpAssetSnapshot};
use crate::store::Record;

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    20
}

fn default_days() -> i64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub wallet_address: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Image,
    Audio,
    File,
}

impl ContentType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            "file" => Some(Self::File),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::File => "file",
        }
    }
}

/// A registered creative work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpAsset {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub creator_wallet: String,
    /// Content-store fingerprint of the registered file.
    pub content_fingerprint: String,
    pub metadata_hash: String,
    pub chain_ip_id: String,
    pub chain_tx_hash: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub content_type: ContentType,
    pub created_at: DateTime<Utc>,
}

impl IpAsset {
    pub fn snapshot(&self) -> IpAssetSnapshot {
        IpAssetSnapshot {
            id: self.id.clone(),
            title: self.title.clone(),
            category: self.category.clone(),
            tags: self.tags.clone(),
            content_fingerprint: self.content_fingerprint.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseTerms {
    pub commercial_rights: bool,
    pub distribution_rights: bool,
    pub exclusivity: bool,
    #[serde(default)]
    pub duration_days: Option<u32>,
    /// Price in wei, as a decimal integer string.
    #[serde(default)]
    pub price: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseState {
    Pending,
    Active,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub id: String,
    pub ip_id: String,
    pub creator_wallet: String,
    #[serde(default)]
    pub buyer_wallet: Option<String>,
    pub terms: LicenseTerms,
    pub terms_hash: String,
    pub chain_license_id: String,
    pub chain_tx_hash: String,
    #[serde(default)]
    pub certificate_hash: Option<String>,
    pub status: LicenseState,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub purchased_at: Option<DateTime<Utc>>,
}

/// Document pinned to the content store when a license is bought.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseCertificate {
    pub license_id: String,
    pub ip_id: String,
    pub ip_title: String,
    pub creator_wallet: String,
    pub buyer_wallet: String,
    pub terms: LicenseTerms,
    pub purchased_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Verified,
    FalsePositive,
    Resolved,
}

/// An infringement report. The verdict and evidence are written once; only
/// the triage `status` changes afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub ip_id: String,
    pub reporter_wallet: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub screenshot_url: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    pub confidence_score: u8,
    pub status: ReportStatus,
    pub evidence: EvidenceBundle,
    pub verdict: AuthenticityVerdict,
    /// Set when this report was produced by re-scanning an earlier one.
    #[serde(default)]
    pub rescan_of: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Record for User {
    const KIND: &'static str = "user";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for IpAsset {
    const KIND: &'static str = "ip_asset";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for License {
    const KIND: &'static str = "license";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Report {
    const KIND: &'static str = "report";

    fn id(&self) -> &str {
        &self.id
    }
}

// ---- auth ----

#[derive(Debug, Deserialize)]
pub struct NonceQuery {
    pub wallet: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NonceResponse {
    pub nonce: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub wallet: String,
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub token: String,
    pub user: User,
}

// ---- ip ----

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Serialize)]
pub struct AssetPage {
    pub assets: Vec<IpAsset>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct AssetDetail {
    #[serde(flatten)]
    pub asset: IpAsset,
    /// Public URL of the registered content.
    pub gateway_url: String,
    pub active_licenses: Vec<License>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: String,
    pub title: String,
    pub content_fingerprint: String,
    pub gateway_url: String,
    pub chain_ip_id: String,
    pub created_at: DateTime<Utc>,
}

// ---- license ----

#[derive(Debug, Deserialize)]
pub struct CreateLicenseRequest {
    pub ip_id: String,
    pub terms: LicenseTerms,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseLicenseRequest {
    pub license_id: String,
}

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub license: License,
    pub certificate: LicenseCertificate,
    pub certificate_hash: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LicenseRole {
    #[default]
    Created,
    Purchased,
}

#[derive(Debug, Deserialize)]
pub struct LicenseRoleQuery {
    #[serde(default, rename = "type")]
    pub role: LicenseRole,
}

// ---- reports ----

#[derive(Debug, Serialize)]
pub struct SubmitReportResponse {
    pub id: String,
    pub ip_id: String,
    pub confidence_score: u8,
    pub status: ReportStatus,
    pub verdict: AuthenticityVerdict,
    pub created_at: DateTime<Utc>,
}

impl From<&Report> for SubmitReportResponse {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id.clone(),
            ip_id: report.ip_id.clone(),
            confidence_score: report.confidence_score,
            status: report.status,
            verdict: report.verdict.clone(),
            created_at: report.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportList {
    pub reports: Vec<Report>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReportStatusRequest {
    pub status: ReportStatus,
}

// ---- analytics ----

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatusCount {
    pub status: LicenseState,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct AssetAnalytics {
    pub total: usize,
    pub recent: usize,
    pub period: String,
    pub by_category: Vec<CategoryCount>,
}

#[derive(Debug, Serialize)]
pub struct LicenseAnalytics {
    pub total: usize,
    pub active: usize,
    pub recent: usize,
    pub period: String,
    pub by_status: Vec<StatusCount>,
}

#[derive(Debug, Serialize)]
pub struct RevenueAnalytics {
    pub period: String,
    pub active_licenses: usize,
    pub total_revenue: String,
    pub currency: &'static str,
}
