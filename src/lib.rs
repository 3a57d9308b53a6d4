//! taxscan
//!
//! Static detector and risk scorer for abusive ERC-20 transfer-tax logic:
//! - Solidity lexing and outline parsing
//! - Fee, exemption, blacklist and owner-control feature extraction
//! - Runtime bytecode selector scan
//! - Logistic risk scoring with per-feature explanations
//! - Explorer and JSON-RPC lookups for deployed contracts

pub mod api;
pub mod core;
pub mod models;
pub mod providers;
pub mod utils;

pub use crate::core::{
    run_checklist, ChecklistHit, Feature, LogisticModel, RiskScore, RiskScoreBuilder, ScanReport,
    TaxFeatures, TaxScanner, TrainingExample, TrainingOptions,
};
pub use models::{AppError, AppResult, ErrorCode, Label, RiskLevel, ScanKind, ScannerConfig};
pub use utils::{CacheStats, ReportCache, TelemetryCollector, TelemetryStats};
