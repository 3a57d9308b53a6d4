//! Core Module - Static analysis and scoring
//!
//! Lexer and outline parser, feature extraction, the audit checklist,
//! bytecode selector scan, the logistic model and the scanner that drives
//! them.

pub mod bytecode;
pub mod checklist;
pub mod features;
pub mod lexer;
pub mod model;
pub mod parser;
pub mod risk_score;
pub mod scanner;

pub use checklist::{run_checklist, ChecklistHit, ChecklistItem, CHECKLIST};
pub use features::{Feature, FeatureExtractor, FeeMetrics, TaxFeatures};
pub use model::{EvaluationReport, LogisticModel, TrainingExample, TrainingOptions};
pub use risk_score::{RiskScore, RiskScoreBuilder};
pub use scanner::{ScanReport, TaxScanner};
