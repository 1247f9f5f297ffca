// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Authenticity scoring for infringement reports.
//!
//! Turns an asset snapshot, the reporter's evidence and a pre-computed
//! active-license flag into an [`AuthenticityVerdict`]. Everything in here is
//! pure: no I/O, no clock, no shared state. Collaborator lookups happen in
//! [`crate::guard`] before the engine is called.
//!
//! Similarity is computed in whole percentage points so that the single
//! rounding step (half-up, two decimals) is exact and every derived figure
//! (`metadata_similarity`, the summary percentage and the confidence score)
//! agrees with the others.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Confidence assigned whenever the fingerprints match.
pub const HASH_MATCH_CONFIDENCE: u8 = 95;

/// Upper bound for verdicts backed by metadata alone.
pub const METADATA_CONFIDENCE_CAP: u8 = 85;

const TITLE_WEIGHT_PCT: u32 = 50;
const CATEGORY_WEIGHT_PCT: u32 = 30;
const TAG_WEIGHT_PCT: u32 = 20;

/// Read-only view of a registered asset, as handed out by the asset registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAssetSnapshot {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub content_fingerprint: String,
}

/// Reporter-supplied description of the allegedly infringing content.
///
/// Every field is optional. The fingerprint must come from the same content
/// store that fingerprinted the registered asset, otherwise comparing the two
/// is meaningless.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    #[serde(default)]
    pub content_fingerprint: Option<String>,
    #[serde(default)]
    pub declared_title: Option<String>,
    #[serde(default)]
    pub declared_category: Option<String>,
    #[serde(default)]
    pub declared_tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashComparison {
    ExactMatch,
    NoMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    Licensed,
    Unlicensed,
}

/// Audit attachment stored alongside the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub hash_comparison: HashComparison,
    /// Metadata similarity as a whole percentage.
    pub metadata_similarity: u8,
    pub license_status: LicenseStatus,
}

/// Outcome of a single scoring run. Never mutated after it is returned; a
/// re-scan produces a new verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticityVerdict {
    pub hash_match: bool,
    pub metadata_similarity: f64,
    pub has_active_license: bool,
    pub confidence_score: u8,
    pub analysis_summary: AnalysisSummary,
}

/// Contract violations at the engine boundary. These are caller bugs or
/// rejected untrusted input, never a low-confidence outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidInputError {
    #[error("asset snapshot is missing")]
    MissingAsset,
    #[error("evidence bundle is missing")]
    MissingEvidence,
    #[error("asset {0} has an empty title")]
    EmptyTitle(String),
    #[error("malformed evidence: {0}")]
    MalformedEvidence(String),
}

impl EvidenceBundle {
    /// Build a bundle from untrusted declared values. Blank strings are
    /// treated as absent and tags are trimmed, lowercased and de-duplicated.
    pub fn from_declared(
        content_fingerprint: Option<String>,
        declared_title: Option<String>,
        declared_category: Option<String>,
        declared_tags: Option<Vec<String>>,
    ) -> Self {
        let declared_tags = declared_tags
            .map(|tags| {
                let mut seen = HashSet::new();
                tags.into_iter()
                    .map(|tag| tag.trim().to_lowercase())
                    .filter(|tag| !tag.is_empty() && seen.insert(tag.clone()))
                    .collect::<Vec<_>>()
            })
            .filter(|tags| !tags.is_empty());

        Self {
            content_fingerprint: non_blank(content_fingerprint),
            declared_title: non_blank(declared_title),
            declared_category: non_blank(declared_category),
            declared_tags,
        }
    }

    /// True when at least one of title, category or tags was declared.
    pub fn has_metadata(&self) -> bool {
        declared(&self.declared_title).is_some()
            || declared(&self.declared_category).is_some()
            || self
                .declared_tags
                .as_ref()
                .map(|tags| tags.iter().any(|t| !t.trim().is_empty()))
                .unwrap_or(false)
    }
}

/// Individual signals feeding the metadata similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataSignals {
    pub title_overlap: bool,
    pub category_match: bool,
    pub shared_tags: usize,
    /// `max(|asset tags|, |declared tags|)`, the tag-overlap denominator.
    pub tag_pool: usize,
}

impl MetadataSignals {
    pub fn collect(asset: &IpAssetSnapshot, evidence: &EvidenceBundle) -> Self {
        if !evidence.has_metadata() {
            return Self {
                title_overlap: false,
                category_match: false,
                shared_tags: 0,
                tag_pool: 0,
            };
        }

        let title_overlap = declared(&evidence.declared_title)
            .map(|declared| {
                let ours = asset.title.to_lowercase();
                let theirs = declared.to_lowercase();
                ours.contains(&theirs) || theirs.contains(&ours)
            })
            .unwrap_or(false);

        let category_match = match (declared(&evidence.declared_category), &asset.category) {
            (Some(declared), Some(category)) => declared == category.as_str(),
            _ => false,
        };

        let asset_tags = tag_set(&asset.tags);
        let declared_tags = evidence
            .declared_tags
            .as_deref()
            .map(tag_set)
            .unwrap_or_default();
        let shared_tags = asset_tags.intersection(&declared_tags).count();

        Self {
            title_overlap,
            category_match,
            shared_tags,
            tag_pool: asset_tags.len().max(declared_tags.len()),
        }
    }

    /// Weighted sum in whole percentage points, rounded half-up once.
    pub fn similarity_percent(&self) -> u8 {
        let mut pct = 0;
        if self.title_overlap {
            pct += TITLE_WEIGHT_PCT;
        }
        if self.category_match {
            pct += CATEGORY_WEIGHT_PCT;
        }
        if self.shared_tags > 0 && self.tag_pool > 0 {
            let shared = self.shared_tags.min(self.tag_pool) as u32;
            pct += div_round_half_up(TAG_WEIGHT_PCT * shared, self.tag_pool as u32);
        }
        pct.min(100) as u8
    }
}

/// Score a report. Total and deterministic for any inputs.
pub fn score(
    asset: &IpAssetSnapshot,
    evidence: &EvidenceBundle,
    has_active_license: bool,
) -> AuthenticityVerdict {
    let hash_match = evidence
        .content_fingerprint
        .as_deref()
        .map(|fingerprint| fingerprint == asset.content_fingerprint)
        .unwrap_or(false);

    let similarity_pct = MetadataSignals::collect(asset, evidence).similarity_percent();

    let confidence_score = if hash_match {
        HASH_MATCH_CONFIDENCE
    } else {
        similarity_pct.min(METADATA_CONFIDENCE_CAP)
    };

    AuthenticityVerdict {
        hash_match,
        metadata_similarity: f64::from(similarity_pct) / 100.0,
        has_active_license,
        confidence_score,
        analysis_summary: AnalysisSummary {
            hash_comparison: if hash_match {
                HashComparison::ExactMatch
            } else {
                HashComparison::NoMatch
            },
            metadata_similarity: similarity_pct,
            license_status: if has_active_license {
                LicenseStatus::Licensed
            } else {
                LicenseStatus::Unlicensed
            },
        },
    }
}

/// [`score`] behind the nullable contract boundary used by the intake flow.
pub fn score_checked(
    asset: Option<&IpAssetSnapshot>,
    evidence: Option<&EvidenceBundle>,
    has_active_license: bool,
) -> Result<AuthenticityVerdict, InvalidInputError> {
    let asset = asset.ok_or(InvalidInputError::MissingAsset)?;
    let evidence = evidence.ok_or(InvalidInputError::MissingEvidence)?;
    Ok(score(asset, evidence, has_active_license))
}

fn declared(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn tag_set(tags: &[String]) -> HashSet<String> {
    tags.iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect()
}

fn div_round_half_up(numerator: u32, denominator: u32) -> u32 {
    (2 * numerator + denominator) / (2 * denominator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn summer_vibes() -> IpAssetSnapshot {
        IpAssetSnapshot {
            id: "ip-1".into(),
            title: "Summer Vibes".into(),
            category: Some("Music".into()),
            tags: vec!["song".into(), "demo".into()],
            content_fingerprint: "H1".into(),
        }
    }

    fn tags(values: &[&str]) -> Option<Vec<String>> {
        Some(values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn hash_match_scores_95_and_reports_license() {
        let evidence = EvidenceBundle {
            content_fingerprint: Some("H1".into()),
            ..Default::default()
        };

        let verdict = score(&summer_vibes(), &evidence, true);

        assert!(verdict.hash_match);
        assert_eq!(verdict.confidence_score, 95);
        assert_eq!(verdict.metadata_similarity, 0.0);
        assert_eq!(verdict.analysis_summary.hash_comparison, HashComparison::ExactMatch);
        assert_eq!(verdict.analysis_summary.license_status, LicenseStatus::Licensed);
    }

    #[test]
    fn metadata_only_evidence_is_capped_at_85() {
        let evidence = EvidenceBundle {
            declared_title: Some("summer vibes remix".into()),
            declared_category: Some("Music".into()),
            declared_tags: tags(&["song"]),
            ..Default::default()
        };

        let verdict = score(&summer_vibes(), &evidence, false);

        assert!(!verdict.hash_match);
        assert_eq!(verdict.metadata_similarity, 0.90);
        assert_eq!(verdict.confidence_score, 85);
        assert_eq!(verdict.analysis_summary.metadata_similarity, 90);
        assert_eq!(verdict.analysis_summary.license_status, LicenseStatus::Unlicensed);
    }

    #[test]
    fn tags_without_intersection_contribute_nothing() {
        let asset = IpAssetSnapshot {
            tags: vec![],
            ..summer_vibes()
        };
        let evidence = EvidenceBundle {
            declared_title: Some("winter".into()),
            declared_category: Some("Film".into()),
            declared_tags: tags(&["x"]),
            ..Default::default()
        };

        let verdict = score(&asset, &evidence, false);

        assert_eq!(verdict.metadata_similarity, 0.0);
        assert_eq!(verdict.confidence_score, 0);
    }

    #[test]
    fn empty_evidence_yields_the_floor() {
        let verdict = score(&summer_vibes(), &EvidenceBundle::default(), true);

        assert!(!verdict.hash_match);
        assert_eq!(verdict.metadata_similarity, 0.0);
        assert_eq!(verdict.confidence_score, 0);
        assert_eq!(verdict.analysis_summary.hash_comparison, HashComparison::NoMatch);
    }

    #[test]
    fn blank_declared_title_is_not_a_substring_match() {
        let evidence = EvidenceBundle {
            declared_title: Some("   ".into()),
            ..Default::default()
        };

        assert_eq!(score(&summer_vibes(), &evidence, false).confidence_score, 0);
    }

    #[test]
    fn padded_declared_title_is_compared_literally() {
        let evidence = EvidenceBundle::from_declared(None, Some(" Summer".into()), None, None);
        assert_eq!(evidence.declared_title.as_deref(), Some(" Summer"));

        let verdict = score(&summer_vibes(), &evidence, false);
        assert_eq!(verdict.analysis_summary.metadata_similarity, 0);
        assert_eq!(verdict.metadata_similarity, 0.0);
        assert_eq!(verdict.confidence_score, 0);
    }

    #[test]
    fn asset_title_inside_declared_title_matches_either_way() {
        let shorter = EvidenceBundle {
            declared_title: Some("VIBES".into()),
            ..Default::default()
        };
        let verdict = score(&summer_vibes(), &shorter, false);
        assert_eq!(verdict.metadata_similarity, 0.5);
        assert_eq!(verdict.confidence_score, 50);
    }

    #[test]
    fn category_comparison_is_case_sensitive() {
        let evidence = EvidenceBundle {
            declared_category: Some("music".into()),
            ..Default::default()
        };
        assert_eq!(score(&summer_vibes(), &evidence, false).confidence_score, 0);
    }

    #[test]
    fn fingerprint_comparison_is_exact() {
        let evidence = EvidenceBundle {
            content_fingerprint: Some("h1".into()),
            ..Default::default()
        };
        assert!(!score(&summer_vibes(), &evidence, false).hash_match);
    }

    #[test]
    fn tag_overlap_rounds_half_up_once() {
        let asset = IpAssetSnapshot {
            tags: (0..8).map(|i| format!("t{i}")).collect(),
            ..summer_vibes()
        };
        let evidence = EvidenceBundle {
            declared_title: Some("summer".into()),
            declared_category: Some("Music".into()),
            declared_tags: tags(&["T0"]),
            ..Default::default()
        };

        // 50 + 30 + 20 * 1/8 = 82.5 -> 83
        let verdict = score(&asset, &evidence, false);
        assert_eq!(verdict.analysis_summary.metadata_similarity, 83);
        assert_eq!(verdict.metadata_similarity, 0.83);
        assert_eq!(verdict.confidence_score, 83);
    }

    #[test]
    fn duplicate_tags_count_once() {
        let evidence = EvidenceBundle {
            declared_tags: tags(&["Song", "song", "SONG"]),
            ..Default::default()
        };
        let signals = MetadataSignals::collect(&summer_vibes(), &evidence);
        assert_eq!(signals.shared_tags, 1);
        assert_eq!(signals.tag_pool, 2);
    }

    #[test]
    fn from_declared_normalizes_untrusted_values() {
        let bundle = EvidenceBundle::from_declared(
            Some("".into()),
            Some("  Summer  ".into()),
            Some(" ".into()),
            Some(vec![" Song ".into(), "song".into(), "".into()]),
        );

        assert_eq!(bundle.content_fingerprint, None);
        assert_eq!(bundle.declared_title.as_deref(), Some("  Summer  "));
        assert_eq!(bundle.declared_category, None);
        assert_eq!(bundle.declared_tags, Some(vec!["song".to_string()]));
        assert!(bundle.has_metadata());
    }

    #[test]
    fn checked_scoring_rejects_missing_inputs() {
        let asset = summer_vibes();
        let evidence = EvidenceBundle::default();

        assert_eq!(
            score_checked(None, Some(&evidence), false),
            Err(InvalidInputError::MissingAsset)
        );
        assert_eq!(
            score_checked(Some(&asset), None, false),
            Err(InvalidInputError::MissingEvidence)
        );
        assert!(score_checked(Some(&asset), Some(&evidence), false).is_ok());
    }

    #[test]
    fn summary_serializes_with_audit_labels() {
        let verdict = score(&summer_vibes(), &EvidenceBundle::default(), false);
        let json = serde_json::to_value(&verdict.analysis_summary).unwrap();

        assert_eq!(json["hash_comparison"], "no_match");
        assert_eq!(json["license_status"], "unlicensed");
        assert_eq!(json["metadata_similarity"], 0);
    }

    fn tag_strategy() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-dA-D]{1,2}", 0..6)
    }

    proptest! {
        #[test]
        fn verdicts_stay_in_range_and_are_deterministic(
            title in "[a-zA-Z ]{1,12}",
            declared_title in proptest::option::of("[a-zA-Z ]{0,12}"),
            category in proptest::option::of("[AB]"),
            declared_category in proptest::option::of("[AB]"),
            asset_tags in tag_strategy(),
            declared_tags in proptest::option::of(tag_strategy()),
            fingerprint in proptest::option::of("[HX]1"),
            licensed in any::<bool>(),
        ) {
            let asset = IpAssetSnapshot {
                id: "ip".into(),
                title,
                category,
                tags: asset_tags,
                content_fingerprint: "H1".into(),
            };
            let evidence = EvidenceBundle {
                content_fingerprint: fingerprint,
                declared_title,
                declared_category,
                declared_tags,
            };

            let first = score(&asset, &evidence, licensed);
            let second = score(&asset, &evidence, licensed);
            prop_assert_eq!(&first, &second);

            prop_assert!((0.0..=1.0).contains(&first.metadata_similarity));
            prop_assert!(first.confidence_score <= 100);
            if first.hash_match {
                prop_assert_eq!(first.confidence_score, HASH_MATCH_CONFIDENCE);
            } else {
                prop_assert!(first.confidence_score <= METADATA_CONFIDENCE_CAP);
            }
            prop_assert_eq!(first.has_active_license, licensed);
            prop_assert_eq!(
                (first.metadata_similarity * 100.0).round() as u8,
                first.analysis_summary.metadata_similarity
            );
        }

        #[test]
        fn more_shared_tags_never_lowers_similarity(
            pool in 1usize..10,
            shared in 0usize..10,
            title_overlap in any::<bool>(),
            category_match in any::<bool>(),
        ) {
            let shared = shared.min(pool - 1);
            let fewer = MetadataSignals { title_overlap, category_match, shared_tags: shared, tag_pool: pool };
            let more = MetadataSignals { shared_tags: shared + 1, ..fewer };
            prop_assert!(more.similarity_percent() >= fewer.similarity_percent());
        }
    }
}
