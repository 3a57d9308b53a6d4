//! Risk Scoring Module
//! Turns a feature vector into a 0-100 score with a per-feature explanation
//!
//! Scores in the middle band are "gray area" results that need a human.

use serde::{Deserialize, Serialize};

use crate::core::features::TaxFeatures;
use crate::core::model::{Contribution, LogisticModel};
use crate::models::types::{Label, RiskLevel, ScanKind};

/// Granular risk score (0-100)
/// - 0-20: Low (label `safe`)
/// - 21-60: Medium (label `suspicious`)
/// - 61-100: High (label `tax_abuse_candidate`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    /// Overall score (0-100)
    pub score: u8,
    /// Model probability before rounding
    pub probability: f64,
    pub level: RiskLevel,
    pub label: Label,
    /// Confidence level (0-100) - how much of the contract could we see?
    pub confidence: u8,
    /// Human-readable recommendation
    pub recommendation: String,
    /// Log-odds breakdown, largest first
    pub contributions: Vec<Contribution>,
}

impl RiskScore {
    pub fn from_probability(probability: f64) -> u8 {
        if probability.is_nan() {
            return 0;
        }
        (probability * 100.0).round().clamp(0.0, 100.0) as u8
    }

    /// Generate human-readable recommendation
    fn generate_recommendation(level: RiskLevel, confidence: u8) -> String {
        let confidence_note = match confidence {
            0..=40 => "(Low confidence - limited visibility)",
            41..=70 => "(Medium confidence)",
            _ => "(High confidence - source analysed)",
        };

        let action = match level {
            RiskLevel::Low => "No tax-abuse pattern found. Standard caution applies.",
            RiskLevel::Medium => {
                "Tax controls present. Review fee setters and exemption lists before buying."
            }
            RiskLevel::High => {
                "Owner can likely raise or weaponise the tax. Avoid unless audited."
            }
        };

        format!(
            "{} {} RISK {} - {}",
            level.emoji(),
            level.as_str(),
            confidence_note,
            action
        )
    }

    /// Top `n` positive drivers, for one-line summaries
    pub fn top_drivers(&self, n: usize) -> Vec<&str> {
        self.contributions
            .iter()
            .filter(|c| c.contribution > 0.0)
            .take(n)
            .map(|c| c.feature.as_str())
            .collect()
    }
}

/// Builder for creating risk scores from extraction results
pub struct RiskScoreBuilder<'a> {
    model: &'a LogisticModel,
    features: TaxFeatures,
    kind: ScanKind,
    has_transfer_path: bool,
    has_diagnostics: bool,
}

impl<'a> RiskScoreBuilder<'a> {
    pub fn new(model: &'a LogisticModel) -> Self {
        Self {
            model,
            features: TaxFeatures::default(),
            kind: ScanKind::Source,
            has_transfer_path: false,
            has_diagnostics: false,
        }
    }

    pub fn with_features(mut self, features: TaxFeatures) -> Self {
        self.features = features;
        self
    }

    /// What was scanned and whether a transfer function was found in it
    pub fn with_scan(mut self, kind: ScanKind, has_transfer_path: bool) -> Self {
        self.kind = kind;
        self.has_transfer_path = has_transfer_path;
        self
    }

    /// Lexer recovered from malformed input
    pub fn with_diagnostics(mut self, has_diagnostics: bool) -> Self {
        self.has_diagnostics = has_diagnostics;
        self
    }

    fn confidence(&self) -> u8 {
        let base: i16 = match (self.kind, self.has_transfer_path) {
            (ScanKind::Source, true) => 85,
            (ScanKind::Source, false) => 60,
            (ScanKind::Bytecode, _) => 45,
        };
        let penalty = if self.has_diagnostics { 20 } else { 0 };
        (base - penalty).max(10) as u8
    }

    /// Build final risk score
    pub fn build(self) -> RiskScore {
        let probability = self.model.predict(&self.features);
        let score = RiskScore::from_probability(probability);
        let level = RiskLevel::from_score(score);
        let confidence = self.confidence();

        RiskScore {
            score,
            probability,
            level,
            label: Label::from_level(level),
            confidence,
            recommendation: RiskScore::generate_recommendation(level, confidence),
            contributions: self.model.contributions(&self.features),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::Feature;

    fn features(active: &[Feature]) -> TaxFeatures {
        let mut f = TaxFeatures::default();
        for feature in active {
            f.flag(*feature, true);
        }
        f
    }

    #[test]
    fn test_safe_token_score() {
        let model = LogisticModel::default();
        let score = RiskScoreBuilder::new(&model)
            .with_features(TaxFeatures::default())
            .with_scan(ScanKind::Source, true)
            .build();

        assert!(score.score <= 20);
        assert_eq!(score.label, Label::Safe);
        assert!(score.recommendation.contains("LOW RISK"));
        assert!(score.contributions.is_empty());
        assert_eq!(score.confidence, 85);
    }

    #[test]
    fn test_abusive_token_score() {
        let model = LogisticModel::default();
        let score = RiskScoreBuilder::new(&model)
            .with_features(features(&[
                Feature::HasFeeLogic,
                Feature::HasSetFee,
                Feature::FeeSetterUnbounded,
                Feature::HasBlacklist,
                Feature::HasOwnershipLock,
            ]))
            .with_scan(ScanKind::Source, true)
            .build();

        assert!(score.score >= 61, "Score was {}", score.score);
        assert_eq!(score.level, RiskLevel::High);
        assert_eq!(score.label, Label::TaxAbuseCandidate);
        assert_eq!(score.top_drivers(1), vec!["fee_setter_unbounded"]);
    }

    #[test]
    fn test_level_thresholds() {
        for (score, level) in [
            (0, RiskLevel::Low),
            (20, RiskLevel::Low),
            (21, RiskLevel::Medium),
            (60, RiskLevel::Medium),
            (61, RiskLevel::High),
            (100, RiskLevel::High),
        ] {
            assert_eq!(RiskLevel::from_score(score), level, "score {}", score);
        }
    }

    #[test]
    fn test_probability_rounding() {
        assert_eq!(RiskScore::from_probability(0.0), 0);
        assert_eq!(RiskScore::from_probability(0.204), 20);
        assert_eq!(RiskScore::from_probability(0.21), 21);
        assert_eq!(RiskScore::from_probability(1.0), 100);
        assert_eq!(RiskScore::from_probability(f64::NAN), 0);
    }

    #[test]
    fn test_confidence() {
        let model = LogisticModel::default();
        let build = |kind, path, diag| {
            RiskScoreBuilder::new(&model)
                .with_scan(kind, path)
                .with_diagnostics(diag)
                .build()
                .confidence
        };
        assert_eq!(build(ScanKind::Source, true, false), 85);
        assert_eq!(build(ScanKind::Source, false, false), 60);
        assert_eq!(build(ScanKind::Source, true, true), 65);
        assert_eq!(build(ScanKind::Bytecode, false, false), 45);
        assert_eq!(build(ScanKind::Bytecode, false, true), 25);
    }

    #[test]
    fn test_bounded_fee_token_is_medium() {
        let model = LogisticModel::default();
        let score = RiskScoreBuilder::new(&model)
            .with_features(features(&[
                Feature::HasFeeLogic,
                Feature::HasSetFee,
                Feature::HasWhitelist,
                Feature::HasSwapBack,
                Feature::IsReflection,
            ]))
            .with_scan(ScanKind::Source, true)
            .build();

        assert_eq!(score.level, RiskLevel::Medium, "score {}", score.score);
        assert_eq!(score.label, Label::Suspicious);
    }
}
