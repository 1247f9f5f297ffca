// Copyright 2025 Memophor Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP API handlers for Sentrix.
//!
//! - `GET /health`, `GET /metrics`
//! - `/auth/*` - wallet sign-in
//! - `/ip/*` - asset registration and lookup
//! - `/license/*` - license offers and purchases
//! - `/report/*` - infringement reports
//! - `/analytics/*` - aggregate counts
//!
//! Mutating endpoints take an [`AuthUser`] and therefore require a bearer
//! token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, FromRef, Multipart, Path, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::analytics::AnalyticsService;
use crate::assets::{AssetService, NewAsset};
use crate::auth::{AuthService, AuthUser};
use crate::chain::ChainClient;
use crate::content::ContentStore;
use crate::error::AppError;
use crate::guard::{parse_declared_tags, ReportService, ReportSubmission};
use crate::licensing::LicenseService;
use crate::metrics::Metrics;
use crate::model::{
    AssetAnalytics, AssetDetail, AssetPage, ContentType, CreateLicenseRequest, IpAsset, License,
    LicenseAnalytics, LicenseRoleQuery, NonceQuery, NonceResponse, PageQuery, PurchaseLicenseRequest,
    PurchaseResponse, RegisterResponse, Report, ReportList, RevenueAnalytics, SubmitReportResponse,
    UpdateReportStatusRequest, VerifyRequest, VerifyResponse, WindowQuery,
};
use crate::nonce::NonceStore;
use crate::store::Store;
use crate::wallet;

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub assets: AssetService,
    pub licenses: LicenseService,
    pub reports: ReportService,
    pub analytics: AnalyticsService,
    pub metrics: Metrics,
}

impl AppState {
    /// Wire the services over the chosen backends.
    pub fn new(
        store: Store,
        nonces: Arc<dyn NonceStore>,
        content: Arc<dyn ContentStore>,
        chain: Arc<dyn ChainClient>,
        jwt_secret: &str,
        jwt_ttl: Duration,
        nonce_ttl: Duration,
    ) -> Result<Self, AppError> {
        let auth = AuthService::new(nonces, store.clone(), jwt_secret, jwt_ttl, nonce_ttl);
        let assets = AssetService::new(store.clone(), content.clone(), chain.clone());
        let licenses = LicenseService::new(store.clone(), assets.clone(), content.clone(), chain);
        let reports = ReportService::new(
            store.clone(),
            Arc::new(assets.clone()),
            Arc::new(licenses.clone()),
            content,
        );

        Ok(Self {
            auth,
            assets,
            licenses,
            reports,
            analytics: AnalyticsService::new(store),
            metrics: Metrics::new()?,
        })
    }
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

pub fn router(state: AppState, cors_origin: HeaderValue, upload_limit_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/auth/nonce", get(auth_nonce))
        .route("/auth/verify", post(auth_verify))
        .route("/ip", get(list_assets))
        .route("/ip/register", post(register_asset))
        .route("/ip/user/:wallet", get(assets_by_user))
        .route("/ip/:id", get(get_asset))
        .route("/license/create", post(create_license))
        .route("/license/purchase", post(purchase_license))
        .route("/license/user/:wallet", get(licenses_by_user))
        .route("/license/:id", get(get_license))
        .route("/report/submit", post(submit_report))
        .route("/report/ip/:id", get(reports_by_asset))
        .route("/report/:id", get(get_report))
        .route("/report/:id/status", patch(update_report_status))
        .route("/report/:id/rescan", post(rescan_report))
        .route("/analytics/ip/created", get(assets_created))
        .route("/analytics/licenses/sold", get(licenses_sold))
        .route("/analytics/revenue", get(revenue))
        .layer(DefaultBodyLimit::max(upload_limit_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "sentrix",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
    }))
}

/// Metrics endpoint
pub async fn metrics(State(state): State<AppState>) -> Result<String, AppError> {
    state.metrics.export()
}

// ---- auth ----

pub async fn auth_nonce(
    State(state): State<AppState>,
    Query(query): Query<NonceQuery>,
) -> Result<Json<NonceResponse>, AppError> {
    let nonce = state.auth.issue_nonce(&query.wallet).await?;
    state.metrics.record_nonce_issued();
    Ok(Json(nonce))
}

pub async fn auth_verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    match state.auth.verify(&request.wallet, &request.signature).await {
        Ok(session) => Ok(Json(session)),
        Err(error) => {
            state.metrics.record_auth_failure(&error);
            Err(error)
        }
    }
}

// ---- ip ----

/// Text fields and the optional file part of a multipart form.
#[derive(Debug, Default)]
struct FormFields {
    text: HashMap<String, String>,
    file: Option<Vec<u8>>,
}

impl FormFields {
    fn take(&mut self, name: &str) -> Option<String> {
        self.text.remove(name).filter(|value| !value.trim().is_empty())
    }
}

async fn read_form(mut multipart: Multipart) -> Result<FormFields, AppError> {
    let mut form = FormFields::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::bad_request(format!("failed to read file: {e}")))?;
            form.file = Some(bytes.to_vec());
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::bad_request(format!("failed to read field {name}: {e}")))?;
            form.text.insert(name, value);
        }
    }

    Ok(form)
}

pub async fn register_asset(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let mut form = read_form(multipart).await?;

    let content_type = match form.take("content_type") {
        Some(raw) => ContentType::parse(raw.trim()).ok_or_else(|| {
            AppError::bad_request("content_type must be one of text, image, audio, file")
        })?,
        None => ContentType::File,
    };
    let tags = match form.take("tags") {
        Some(raw) => parse_declared_tags(&raw)?,
        None => Vec::new(),
    };
    // Text works may be sent inline instead of as a file part.
    let content = form
        .file
        .take()
        .or_else(|| form.take("content").map(String::into_bytes))
        .unwrap_or_default();

    let input = NewAsset {
        title: form.take("title").unwrap_or_default(),
        description: form.take("description"),
        category: form.take("category"),
        tags,
        content_type,
        content,
    };

    let asset = state.assets.register(&user.wallet, input).await?;
    state.metrics.record_asset_registered();

    let gateway_url = state.assets.content_url(&asset);
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: asset.id,
            title: asset.title,
            content_fingerprint: asset.content_fingerprint,
            gateway_url,
            chain_ip_id: asset.chain_ip_id,
            created_at: asset.created_at,
        }),
    ))
}

pub async fn get_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AssetDetail>, AppError> {
    let asset = state.assets.require(&id).await?;
    let active_licenses = state.licenses.active_for_asset(&asset.id).await?;
    Ok(Json(AssetDetail {
        gateway_url: state.assets.content_url(&asset),
        asset,
        active_licenses,
    }))
}

pub async fn assets_by_user(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Json<Vec<IpAsset>>, AppError> {
    let wallet = wallet::normalize_address(&wallet)?;
    Ok(Json(state.assets.by_creator(&wallet).await?))
}

pub async fn list_assets(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<AssetPage>, AppError> {
    Ok(Json(state.assets.page(query.page, query.limit).await?))
}

// ---- license ----

pub async fn create_license(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateLicenseRequest>,
) -> Result<(StatusCode, Json<License>), AppError> {
    let license = state
        .licenses
        .create(&user.wallet, &request.ip_id, request.terms)
        .await?;
    state.metrics.record_license_created();
    Ok((StatusCode::CREATED, Json(license)))
}

pub async fn purchase_license(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<PurchaseLicenseRequest>,
) -> Result<Json<PurchaseResponse>, AppError> {
    let purchase = state
        .licenses
        .purchase(&user.wallet, &request.license_id)
        .await?;
    state.metrics.record_license_purchased();
    Ok(Json(purchase))
}

pub async fn get_license(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<License>, AppError> {
    Ok(Json(state.licenses.require(&id).await?))
}

pub async fn licenses_by_user(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
    Query(query): Query<LicenseRoleQuery>,
) -> Result<Json<Vec<License>>, AppError> {
    let wallet = wallet::normalize_address(&wallet)?;
    Ok(Json(state.licenses.by_user(&wallet, query.role).await?))
}

// ---- reports ----

pub async fn submit_report(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitReportResponse>), AppError> {
    let mut form = read_form(multipart).await?;
    let submission = ReportSubmission {
        ip_id: form.take("ip_id"),
        url: form.take("url"),
        screenshot_url: form.take("screenshot_url"),
        file_url: form.take("file_url"),
        declared_title: form.take("declared_title"),
        declared_category: form.take("declared_category"),
        declared_tags: form.take("declared_tags"),
        file: form.file.take(),
    }
    .validate()?;

    let report = state.reports.submit(&user.wallet, submission).await?;
    state.metrics.record_verdict(&report.verdict);

    Ok((StatusCode::CREATED, Json(SubmitReportResponse::from(&report))))
}

pub async fn reports_by_asset(
    State(state): State<AppState>,
    Path(ip_id): Path<String>,
) -> Result<Json<ReportList>, AppError> {
    let reports = state.reports.list_by_ip(&ip_id).await?;
    Ok(Json(ReportList { reports }))
}

pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Report>, AppError> {
    Ok(Json(state.reports.get(&id).await?))
}

pub async fn update_report_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateReportStatusRequest>,
) -> Result<Json<Report>, AppError> {
    let report = state
        .reports
        .update_status(&user.wallet, &id, request.status)
        .await?;
    Ok(Json(report))
}

pub async fn rescan_report(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SubmitReportResponse>), AppError> {
    let report = state.reports.rescan(&id).await?;
    state.metrics.record_verdict(&report.verdict);
    Ok((StatusCode::CREATED, Json(SubmitReportResponse::from(&report))))
}

// ---- analytics ----

pub async fn assets_created(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<AssetAnalytics>, AppError> {
    Ok(Json(state.analytics.assets_created(query.days).await?))
}

pub async fn licenses_sold(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<LicenseAnalytics>, AppError> {
    Ok(Json(state.analytics.licenses_sold(query.days).await?))
}

pub async fn revenue(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<RevenueAnalytics>, AppError> {
    Ok(Json(state.analytics.revenue(query.days).await?))
}
