// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics for the Sentrix API.
//!
//! Tracks sign-ins, registrations, license sales and report verdicts.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

use crate::authenticity::AuthenticityVerdict;
use crate::error::AppError;

/// Metrics collector for Sentrix
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,

    // Auth metrics
    pub nonces_issued: IntCounter,
    pub auth_failures: IntCounterVec,

    // Registry and licensing metrics
    pub assets_registered: IntCounter,
    pub licenses_created: IntCounter,
    pub licenses_purchased: IntCounter,

    // Report metrics
    pub reports_submitted: IntCounter,
    pub hash_matches: IntCounter,
    pub confidence_scores: Histogram,
}

fn metric_error(e: prometheus::Error) -> AppError {
    AppError::internal("failed to create metric", e)
}

impl Metrics {
    pub fn new() -> Result<Self, AppError> {
        let registry = Registry::new();

        let nonces_issued = IntCounter::with_opts(Opts::new(
            "sentrix_auth_nonces_issued_total",
            "Total number of sign-in nonces issued",
        ))
        .map_err(metric_error)?;

        let auth_failures = IntCounterVec::new(
            Opts::new(
                "sentrix_auth_failures_total",
                "Total number of rejected sign-in attempts",
            ),
            &["reason"],
        )
        .map_err(metric_error)?;

        let assets_registered = IntCounter::with_opts(Opts::new(
            "sentrix_assets_registered_total",
            "Total number of IP assets registered",
        ))
        .map_err(metric_error)?;

        let licenses_created = IntCounter::with_opts(Opts::new(
            "sentrix_licenses_created_total",
            "Total number of licenses offered",
        ))
        .map_err(metric_error)?;

        let licenses_purchased = IntCounter::with_opts(Opts::new(
            "sentrix_licenses_purchased_total",
            "Total number of licenses purchased",
        ))
        .map_err(metric_error)?;

        let reports_submitted = IntCounter::with_opts(Opts::new(
            "sentrix_reports_submitted_total",
            "Total number of infringement reports scored, rescans included",
        ))
        .map_err(metric_error)?;

        let hash_matches = IntCounter::with_opts(Opts::new(
            "sentrix_report_hash_matches_total",
            "Total number of reports whose evidence matched the registered content",
        ))
        .map_err(metric_error)?;

        let confidence_scores = Histogram::with_opts(
            HistogramOpts::new(
                "sentrix_report_confidence_score",
                "Confidence score assigned to infringement reports",
            )
            .buckets(vec![0.0, 10.0, 25.0, 50.0, 70.0, 85.0, 95.0, 100.0]),
        )
        .map_err(metric_error)?;

        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(nonces_issued.clone()),
            Box::new(auth_failures.clone()),
            Box::new(assets_registered.clone()),
            Box::new(licenses_created.clone()),
            Box::new(licenses_purchased.clone()),
            Box::new(reports_submitted.clone()),
            Box::new(hash_matches.clone()),
            Box::new(confidence_scores.clone()),
        ];
        for collector in collectors {
            registry
                .register(collector)
                .map_err(|e| AppError::internal("failed to register metric", e))?;
        }

        Ok(Self {
            registry: Arc::new(registry),
            nonces_issued,
            auth_failures,
            assets_registered,
            licenses_created,
            licenses_purchased,
            reports_submitted,
            hash_matches,
            confidence_scores,
        })
    }

    pub fn record_nonce_issued(&self) {
        self.nonces_issued.inc();
    }

    /// Record a rejected sign-in, labelled by the HTTP status class.
    pub fn record_auth_failure(&self, error: &AppError) {
        let reason = match error {
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized(_) => "unauthorized",
            _ => "error",
        };
        self.auth_failures.with_label_values(&[reason]).inc();
    }

    pub fn record_asset_registered(&self) {
        self.assets_registered.inc();
    }

    pub fn record_license_created(&self) {
        self.licenses_created.inc();
    }

    pub fn record_license_purchased(&self) {
        self.licenses_purchased.inc();
    }

    /// Record a scored report
    pub fn record_verdict(&self, verdict: &AuthenticityVerdict) {
        self.reports_submitted.inc();
        if verdict.hash_match {
            self.hash_matches.inc();
        }
        self.confidence_scores
            .observe(f64::from(verdict.confidence_score));
    }

    /// Export metrics in Prometheus format
    pub fn export(&self) -> Result<String, AppError> {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| AppError::internal("failed to encode metrics", e))?;

        String::from_utf8(buffer)
            .map_err(|e| AppError::internal("failed to convert metrics to string", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticity::{score, EvidenceBundle, IpAssetSnapshot};

    #[test]
    fn export_includes_recorded_verdicts() {
        let metrics = Metrics::new().unwrap();
        let asset = IpAssetSnapshot {
            id: "ip-1".into(),
            title: "Summer Vibes".into(),
            category: None,
            tags: vec![],
            content_fingerprint: "H1".into(),
        };
        let evidence = EvidenceBundle {
            content_fingerprint: Some("H1".into()),
            ..Default::default()
        };

        metrics.record_verdict(&score(&asset, &evidence, false));
        metrics.record_auth_failure(&AppError::unauthorized("invalid signature"));

        let text = metrics.export().unwrap();
        assert!(text.contains("sentrix_reports_submitted_total 1"));
        assert!(text.contains("sentrix_report_hash_matches_total 1"));
        assert!(text.contains("sentrix_auth_failures_total{reason=\"unauthorized\"} 1"));
    }
}
