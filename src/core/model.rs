//! Logistic risk model
//!
//! Scores a [`TaxFeatures`] vector as `sigmoid(bias + Σ w·x)`.
//!
//! Ships with hand-calibrated priors (every risk weight positive, negative
//! bias) and can be retrained from labelled examples with full-batch
//! gradient descent. With `non_negative` set, weights are projected back to
//! >= 0 after every step so turning a risk indicator on can never lower a
//! score.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::core::features::{Feature, TaxFeatures};
use crate::models::errors::{AppError, AppResult};
use crate::models::types::Label;

// ============================================
// PRIOR WEIGHTS (log-odds)
// ============================================

pub mod prior_weights {
    pub const BIAS: f64 = -3.2;

    pub const HAS_FEE_LOGIC: f64 = 0.6;
    pub const HAS_SET_FEE: f64 = 1.0;
    pub const FEE_SETTER_UNBOUNDED: f64 = 2.4; // Owner can raise tax to 100%
    pub const MAX_FEE_OVER_CAP: f64 = 1.8;
    pub const HAS_SELL_FEE: f64 = 0.3;
    pub const SELL_FEE_EXCEEDS_BUY_FEE: f64 = 0.8;
    pub const HAS_WHITELIST: f64 = 0.4;
    pub const HAS_BLACKLIST: f64 = 1.4; // Can trap sellers
    pub const FEE_RECIPIENT_MUTABLE: f64 = 0.5;
    pub const DYNAMIC_FEE: f64 = 1.1;
    pub const HAS_MAX_TX_LIMIT: f64 = 0.3;
    pub const HAS_TRADING_TOGGLE: f64 = 0.6;
    pub const HAS_COOLDOWN: f64 = 0.3;
    pub const IS_REFLECTION: f64 = 0.2;
    pub const HAS_SWAP_BACK: f64 = 0.2;
    pub const HAS_OWNERSHIP_LOCK: f64 = 1.6; // Fake renounce
    pub const USES_TX_ORIGIN: f64 = 0.7;
    pub const HAS_OWNER_MINT: f64 = 1.2;
    pub const OWNER_PRIVILEGE_RATIO: f64 = 1.0;
}

fn prior_weight(feature: Feature) -> f64 {
    use prior_weights::*;
    match feature {
        Feature::HasFeeLogic => HAS_FEE_LOGIC,
        Feature::HasSetFee => HAS_SET_FEE,
        Feature::FeeSetterUnbounded => FEE_SETTER_UNBOUNDED,
        Feature::MaxFeeOverCap => MAX_FEE_OVER_CAP,
        Feature::HasSellFee => HAS_SELL_FEE,
        Feature::SellFeeExceedsBuyFee => SELL_FEE_EXCEEDS_BUY_FEE,
        Feature::HasWhitelist => HAS_WHITELIST,
        Feature::HasBlacklist => HAS_BLACKLIST,
        Feature::FeeRecipientMutable => FEE_RECIPIENT_MUTABLE,
        Feature::DynamicFee => DYNAMIC_FEE,
        Feature::HasMaxTxLimit => HAS_MAX_TX_LIMIT,
        Feature::HasTradingToggle => HAS_TRADING_TOGGLE,
        Feature::HasCooldown => HAS_COOLDOWN,
        Feature::IsReflection => IS_REFLECTION,
        Feature::HasSwapBack => HAS_SWAP_BACK,
        Feature::HasOwnershipLock => HAS_OWNERSHIP_LOCK,
        Feature::UsesTxOrigin => USES_TX_ORIGIN,
        Feature::HasOwnerMint => HAS_OWNER_MINT,
        Feature::OwnerPrivilegeRatio => OWNER_PRIVILEGE_RATIO,
    }
}

#[inline]
pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// One feature's share of the log-odds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub feature: String,
    pub value: f64,
    pub weight: f64,
    pub contribution: f64,
}

/// Labelled training example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub label: Label,
    pub features: TaxFeatures,
}

/// One JSONL dataset line before feature resolution
#[derive(Debug, Clone, Deserialize)]
pub struct RawExample {
    pub label: Label,
    #[serde(default)]
    pub features: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub source_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingOptions {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            epochs: 2000,
            learning_rate: 0.5,
            l2: 0.001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub examples: usize,
    pub threshold: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub log_loss: f64,
}

/// Linear-logistic scoring model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub version: String,
    pub bias: f64,
    pub weights: BTreeMap<String, f64>,
    #[serde(default = "default_non_negative")]
    pub non_negative: bool,
}

fn default_non_negative() -> bool {
    true
}

impl Default for LogisticModel {
    fn default() -> Self {
        let weights = Feature::ALL
            .iter()
            .map(|f| (f.as_str().to_string(), prior_weight(*f)))
            .collect();
        Self {
            version: "priors-1".to_string(),
            bias: prior_weights::BIAS,
            weights,
            non_negative: true,
        }
    }
}

impl LogisticModel {
    /// Load a model from pretty JSON, rejecting unknown feature names
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::model_load(format!("Cannot read model {}: {}", path.display(), e))
        })?;
        let model: Self = serde_json::from_str(&raw)?;
        model.validate()?;
        info!(
            "🤖 Loaded model {} from {} ({} weights)",
            model.version,
            path.display(),
            model.weights.len()
        );
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("💾 Saved model {} to {}", self.version, path.display());
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        for (name, weight) in &self.weights {
            if Feature::from_name(name).is_none() {
                return Err(AppError::unknown_feature(name));
            }
            if !weight.is_finite() {
                return Err(AppError::model_load(format!("Weight for {} is not finite", name)));
            }
        }
        if !self.bias.is_finite() {
            return Err(AppError::model_load("Bias is not finite"));
        }
        Ok(())
    }

    fn weight(&self, feature: Feature) -> f64 {
        self.weights.get(feature.as_str()).copied().unwrap_or(0.0)
    }

    /// Log-odds before the sigmoid
    pub fn logit(&self, features: &TaxFeatures) -> f64 {
        self.bias + features.iter().map(|(f, x)| self.weight(f) * x).sum::<f64>()
    }

    pub fn predict(&self, features: &TaxFeatures) -> f64 {
        sigmoid(self.logit(features))
    }

    /// Per-feature `w·x`, largest magnitude first. With an all-zero baseline
    /// these are exact Shapley values of the logit.
    pub fn contributions(&self, features: &TaxFeatures) -> Vec<Contribution> {
        let mut out: Vec<Contribution> = features
            .iter()
            .filter(|(_, x)| *x != 0.0)
            .map(|(f, x)| {
                let weight = self.weight(f);
                Contribution {
                    feature: f.as_str().to_string(),
                    value: x,
                    weight,
                    contribution: weight * x,
                }
            })
            .collect();
        out.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.feature.cmp(&b.feature))
        });
        out
    }

    /// Full-batch gradient descent on log-loss with L2
    pub fn train(&mut self, examples: &[TrainingExample], options: TrainingOptions) -> AppResult<()> {
        if examples.is_empty() {
            return Err(AppError::empty_dataset());
        }
        let n = examples.len() as f64;
        let mut weights: Vec<f64> = Feature::ALL.iter().map(|f| self.weight(*f)).collect();
        let mut bias = self.bias;

        for epoch in 0..options.epochs {
            let mut grad_w = vec![0.0; weights.len()];
            let mut grad_b = 0.0;
            for example in examples {
                let z = bias
                    + example
                        .features
                        .iter()
                        .map(|(f, x)| weights[f.index()] * x)
                        .sum::<f64>();
                let err = sigmoid(z) - example.label.target();
                grad_b += err;
                for (f, x) in example.features.iter() {
                    grad_w[f.index()] += err * x;
                }
            }

            bias -= options.learning_rate * grad_b / n;
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= options.learning_rate * (g / n + options.l2 * *w);
                if self.non_negative && *w < 0.0 {
                    *w = 0.0;
                }
            }

            if epoch % 500 == 0 {
                debug!("📈 epoch {} bias {:.4}", epoch, bias);
            }
        }

        self.bias = bias;
        self.weights = Feature::ALL
            .iter()
            .map(|f| (f.as_str().to_string(), weights[f.index()]))
            .collect();
        self.version = format!("trained-{}", chrono::Utc::now().format("%Y%m%d%H%M%S"));
        info!(
            "🤖 Trained on {} examples ({} epochs), bias {:.3}",
            examples.len(),
            options.epochs,
            self.bias
        );
        Ok(())
    }

    /// Binary metrics treating `tax_abuse_candidate` as the positive class
    pub fn evaluate(&self, examples: &[TrainingExample], threshold: f64) -> AppResult<EvaluationReport> {
        if examples.is_empty() {
            return Err(AppError::empty_dataset());
        }
        const EPS: f64 = 1e-12;
        let (mut tp, mut fp, mut tn, mut fn_) = (0usize, 0usize, 0usize, 0usize);
        let mut loss = 0.0;

        for example in examples {
            let p = self.predict(&example.features);
            let y = example.label.target();
            let pc = p.clamp(EPS, 1.0 - EPS);
            loss -= y * pc.ln() + (1.0 - y) * (1.0 - pc).ln();

            let actual = example.label == Label::TaxAbuseCandidate;
            let predicted = p >= threshold;
            match (predicted, actual) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, false) => tn += 1,
                (false, true) => fn_ += 1,
            }
        }

        let ratio = |a: usize, b: usize| if b == 0 { 0.0 } else { a as f64 / b as f64 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        Ok(EvaluationReport {
            examples: examples.len(),
            threshold,
            accuracy: ratio(tp + tn, examples.len()),
            precision,
            recall,
            f1,
            log_loss: loss / examples.len() as f64,
        })
    }

    /// Online adjustment of a single weight
    pub fn update_weight(&mut self, feature: &str, adjustment: f64) -> AppResult<()> {
        if Feature::from_name(feature).is_none() {
            return Err(AppError::unknown_feature(feature));
        }
        let weight = self.weights.entry(feature.to_string()).or_insert(0.0);
        *weight += adjustment;
        if self.non_negative && *weight < 0.0 {
            *weight = 0.0;
        }
        info!("📊 Updated weight for {}: {:.3}", feature, *weight);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(active: &[Feature]) -> TaxFeatures {
        let mut f = TaxFeatures::default();
        for feature in active {
            f.flag(*feature, true);
        }
        f
    }

    #[test]
    fn test_priors_cover_every_feature() {
        let model = LogisticModel::default();
        assert_eq!(model.weights.len(), Feature::ALL.len());
        assert!(model.weights.values().all(|w| *w > 0.0));
        assert!(model.bias < 0.0);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_plain_token_is_low() {
        let model = LogisticModel::default();
        let p = model.predict(&TaxFeatures::default());
        assert!(p < 0.05, "p = {}", p);
    }

    #[test]
    fn test_monotonic_in_every_feature() {
        let model = LogisticModel::default();
        let base = features(&[Feature::HasFeeLogic, Feature::HasWhitelist]);
        let p0 = model.predict(&base);
        for feature in Feature::ALL {
            let mut raised = base;
            raised.set(feature, 1.0);
            assert!(model.predict(&raised) >= p0, "{} lowered the score", feature.as_str());
        }
    }

    #[test]
    fn test_contributions_sum_to_logit() {
        let model = LogisticModel::default();
        let f = features(&[Feature::FeeSetterUnbounded, Feature::HasBlacklist, Feature::HasSwapBack]);
        let contribs = model.contributions(&f);
        assert_eq!(contribs.len(), 3);
        assert_eq!(contribs[0].feature, "fee_setter_unbounded");
        let sum: f64 = contribs.iter().map(|c| c.contribution).sum();
        assert!((model.bias + sum - model.logit(&f)).abs() < 1e-12);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let model = LogisticModel::default();
        model.save(&path).unwrap();
        let loaded = LogisticModel::load(&path).unwrap();
        assert_eq!(loaded, model);
    }

    #[test]
    fn test_load_rejects_unknown_feature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(
            &path,
            r#"{"version":"x","bias":0.0,"weights":{"is_honeypot":1.0}}"#,
        )
        .unwrap();
        let err = LogisticModel::load(&path).unwrap_err();
        assert_eq!(err.code_str(), "MODEL_UNKNOWN_FEATURE");
    }

    #[test]
    fn test_load_missing_file() {
        let err = LogisticModel::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert_eq!(err.code_str(), "MODEL_LOAD_FAILED");
    }

    #[test]
    fn test_training_separates_classes() {
        let mut examples = Vec::new();
        for _ in 0..10 {
            examples.push(TrainingExample {
                label: Label::Safe,
                features: features(&[Feature::HasFeeLogic]),
            });
            examples.push(TrainingExample {
                label: Label::TaxAbuseCandidate,
                features: features(&[Feature::HasFeeLogic, Feature::HasBlacklist]),
            });
        }
        let mut model = LogisticModel {
            version: "zero".to_string(),
            bias: 0.0,
            weights: BTreeMap::new(),
            non_negative: true,
        };
        model.train(&examples, TrainingOptions::default()).unwrap();

        let report = model.evaluate(&examples, 0.5).unwrap();
        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.recall, 1.0);
        assert!(model.weights["has_blacklist"] > 0.0);
        assert!(model.weights.values().all(|w| *w >= 0.0));
        assert!(model.version.starts_with("trained-"));
    }

    #[test]
    fn test_empty_dataset() {
        let mut model = LogisticModel::default();
        let err = model.train(&[], TrainingOptions::default()).unwrap_err();
        assert_eq!(err.code_str(), "MODEL_EMPTY_DATASET");
        assert!(model.evaluate(&[], 0.5).is_err());
    }

    #[test]
    fn test_update_weight() {
        let mut model = LogisticModel::default();
        model.update_weight("has_blacklist", 0.5).unwrap();
        assert!((model.weights["has_blacklist"] - 1.9).abs() < 1e-12);
        model.update_weight("has_blacklist", -10.0).unwrap();
        assert_eq!(model.weights["has_blacklist"], 0.0);
        assert!(model.update_weight("nope", 1.0).is_err());
    }
}
