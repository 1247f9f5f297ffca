// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Aggregate counts over assets and licenses.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::error::AppError;
use crate::licensing::parse_wei;
use crate::model::{
    AssetAnalytics, CategoryCount, IpAsset, License, LicenseAnalytics, LicenseState,
    RevenueAnalytics, StatusCount,
};
use crate::store::Store;

const MAX_WINDOW_DAYS: i64 = 3650;
const WEI_PER_UNIT: u128 = 100_000_000_000_000; // 1e14, four decimals of ETH

#[derive(Clone)]
pub struct AnalyticsService {
    store: Store,
}

impl AnalyticsService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn assets_created(&self, days: i64) -> Result<AssetAnalytics, AppError> {
        let since = window_start(days)?;
        let assets = self.store.all::<IpAsset>().await?;

        let mut by_category: HashMap<&str, usize> = HashMap::new();
        for category in assets.iter().filter_map(|a| a.category.as_deref()) {
            *by_category.entry(category).or_default() += 1;
        }
        let mut by_category: Vec<CategoryCount> = by_category
            .into_iter()
            .map(|(category, count)| CategoryCount {
                category: category.to_string(),
                count,
            })
            .collect();
        by_category.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));

        Ok(AssetAnalytics {
            total: assets.len(),
            recent: assets.iter().filter(|a| a.created_at >= since).count(),
            period: period(days),
            by_category,
        })
    }

    pub async fn licenses_sold(&self, days: i64) -> Result<LicenseAnalytics, AppError> {
        let since = window_start(days)?;
        let licenses = self.store.all::<License>().await?;

        let sold = || licenses.iter().filter(|l| l.buyer_wallet.is_some());

        let mut by_status: HashMap<LicenseState, usize> = HashMap::new();
        for license in &licenses {
            *by_status.entry(license.status).or_default() += 1;
        }
        let by_status = [LicenseState::Pending, LicenseState::Active, LicenseState::Revoked]
            .into_iter()
            .filter_map(|status| {
                by_status
                    .get(&status)
                    .map(|&count| StatusCount { status, count })
            })
            .collect();

        Ok(LicenseAnalytics {
            total: sold().count(),
            active: licenses
                .iter()
                .filter(|l| l.status == LicenseState::Active)
                .count(),
            recent: sold().filter(|l| l.created_at >= since).count(),
            period: period(days),
            by_status,
        })
    }

    /// Sum of active license prices created in the window, in ETH.
    pub async fn revenue(&self, days: i64) -> Result<RevenueAnalytics, AppError> {
        let since = window_start(days)?;
        let active = self
            .store
            .find_many(|l: &License| l.status == LicenseState::Active && l.created_at >= since)
            .await?;

        let mut total_wei: u128 = 0;
        for license in &active {
            let Some(price) = license.terms.price.as_deref() else {
                continue;
            };
            match parse_wei(price) {
                Ok(wei) => total_wei = total_wei.saturating_add(wei),
                Err(_) => {
                    tracing::warn!(license_id = %license.id, price, "skipping unparseable license price")
                }
            }
        }

        Ok(RevenueAnalytics {
            period: period(days),
            active_licenses: active.len(),
            total_revenue: format_eth(total_wei),
            currency: "ETH",
        })
    }
}

fn window_start(days: i64) -> Result<DateTime<Utc>, AppError> {
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(AppError::bad_request(format!(
            "days must be between 1 and {MAX_WINDOW_DAYS}"
        )));
    }
    Ok(Utc::now() - Duration::days(days))
}

fn period(days: i64) -> String {
    format!("{days} days")
}

/// Wei to ETH with four decimals, rounded half-up.
pub fn format_eth(wei: u128) -> String {
    let units = wei.saturating_add(WEI_PER_UNIT / 2) / WEI_PER_UNIT;
    format!("{}.{:04}", units / 10_000, units % 10_000)
}
