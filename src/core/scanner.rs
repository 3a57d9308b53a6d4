//! Scan orchestration
//!
//! `TaxScanner` ties the pipeline together: lex, parse, extract features,
//! run the checklist, score, then cache and record the report.

use alloy_primitives::keccak256;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::bytecode::{self, SelectorMatch};
use crate::core::checklist::{run_checklist, ChecklistHit};
use crate::core::features::{FeatureExtractor, FeeMetrics, TaxFeatures};
use crate::core::lexer::{tokenize, Diagnostic};
use crate::core::model::{LogisticModel, RawExample, TrainingExample};
use crate::core::parser::{parse, ContractKind};
use crate::core::risk_score::{RiskScore, RiskScoreBuilder};
use crate::models::config::ScannerConfig;
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{Finding, RiskLevel, ScanKind, SourceFile};
use crate::providers::explorer::ExplorerClient;
use crate::providers::rpc::{parse_address, RpcProvider};
use crate::utils::cache::ReportCache;
use crate::utils::telemetry::TelemetryCollector;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractSummary {
    pub name: String,
    pub kind: ContractKind,
    pub bases: Vec<String>,
    pub functions: usize,
    pub state_vars: usize,
    pub line: u32,
}

/// Selector-level view of a bytecode scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BytecodeSummary {
    pub code_size: usize,
    pub selectors_found: usize,
    pub matched: Vec<SelectorMatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub id: Uuid,
    pub target: String,
    pub kind: ScanKind,
    pub source_hash: String,
    pub contracts: Vec<ContractSummary>,
    pub features: TaxFeatures,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<FeeMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytecode: Option<BytecodeSummary>,
    pub findings: Vec<Finding>,
    pub checklist: Vec<ChecklistHit>,
    pub diagnostics: Vec<Diagnostic>,
    pub risk: RiskScore,
    pub latency_ms: u64,
    pub cached: bool,
    pub scanned_at: DateTime<Utc>,
}

impl ScanReport {
    pub fn level(&self) -> RiskLevel {
        self.risk.level
    }

    /// Human-readable report for the terminal
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let risk = &self.risk;
        let _ = writeln!(out, "🔍 {} ({})", self.target, self.kind.as_str());
        let _ = writeln!(
            out,
            "   {} Score: {}/100  Label: {}  Confidence: {}%",
            risk.level.emoji(),
            risk.score,
            risk.label.as_str(),
            risk.confidence
        );
        let _ = writeln!(out, "   {}", risk.recommendation);

        if !self.contracts.is_empty() {
            let names: Vec<_> = self.contracts.iter().map(|c| c.name.as_str()).collect();
            let _ = writeln!(out, "   Contracts: {}", names.join(", "));
        }
        if let Some(metrics) = &self.metrics {
            let pct = |v: Option<f64>| v.map_or("-".to_string(), |v| format!("{:.1}%", v));
            let _ = writeln!(
                out,
                "   Fees: buy {}  sell {}  max {}  (denominator {})",
                pct(metrics.buy_fee_pct),
                pct(metrics.sell_fee_pct),
                pct(metrics.max_fee_pct),
                metrics.fee_denominator
            );
        }
        if let Some(code) = &self.bytecode {
            let _ = writeln!(
                out,
                "   Bytecode: {} bytes, {} selectors, {} tax-related",
                code.code_size,
                code.selectors_found,
                code.matched.len()
            );
        }

        if !risk.contributions.is_empty() {
            let _ = writeln!(out, "\n   📊 Drivers (log-odds):");
            for c in risk.contributions.iter().take(6) {
                let _ = writeln!(out, "      {:+.2}  {}", c.contribution, c.feature);
            }
        }
        if !self.findings.is_empty() {
            let _ = writeln!(out, "\n   🚨 Findings:");
            for finding in &self.findings {
                let _ = writeln!(out, "      {}", finding.describe());
            }
        }
        for diag in &self.diagnostics {
            let _ = writeln!(out, "   ⚠️ [{}] line {}: {}", diag.code, diag.line, diag.message);
        }
        let _ = writeln!(
            out,
            "\n   ⏱️ {}ms{}",
            self.latency_ms,
            if self.cached { " (cached)" } else { "" }
        );
        out
    }
}

/// `0x`-prefixed keccak256 of the scan kind followed by the scanned text
pub fn source_hash(kind: ScanKind, text: &str) -> String {
    let mut bytes = Vec::with_capacity(kind.as_str().len() + text.len());
    bytes.extend_from_slice(kind.as_str().as_bytes());
    bytes.extend_from_slice(text.as_bytes());
    keccak256(&bytes).to_string()
}

pub struct TaxScanner {
    config: ScannerConfig,
    model: LogisticModel,
    extractor: FeatureExtractor,
    cache: ReportCache,
    telemetry: Arc<TelemetryCollector>,
}

impl TaxScanner {
    pub fn new(config: ScannerConfig, model: LogisticModel) -> Self {
        let telemetry = Arc::new(TelemetryCollector::with_config(
            config.telemetry_dir.clone(),
            1000,
        ));
        Self {
            extractor: FeatureExtractor::new(config.fee_cap_pct),
            cache: ReportCache::with_ttl(config.cache_ttl),
            model,
            config,
            telemetry,
        }
    }

    /// Build a scanner, loading the model named in the config if any
    pub fn from_config(config: ScannerConfig) -> AppResult<Self> {
        let model = match &config.model_path {
            Some(path) => LogisticModel::load(path)?,
            None => LogisticModel::default(),
        };
        Ok(Self::new(config, model))
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn model(&self) -> &LogisticModel {
        &self.model
    }

    pub fn cache(&self) -> &ReportCache {
        &self.cache
    }

    pub fn telemetry(&self) -> Arc<TelemetryCollector> {
        self.telemetry.clone()
    }

    fn check_input(&self, text: &str) -> AppResult<()> {
        if text.trim().is_empty() {
            return Err(AppError::empty_input("Nothing to scan"));
        }
        if text.len() > self.config.max_source_bytes {
            return Err(AppError::too_large(text.len(), self.config.max_source_bytes));
        }
        Ok(())
    }

    /// Cached analysis of identical input, reported under this caller's target
    fn cached(&self, hash: &str, target: &str, started: Instant) -> Option<ScanReport> {
        let mut report = self.cache.get(hash)?;
        report.target = target.to_string();
        report.cached = true;
        report.latency_ms = started.elapsed().as_millis() as u64;
        debug!("♻️ Serving {} from cache", report.target);
        self.telemetry.record_scan(&report);
        Some(report)
    }

    fn finish(&self, report: ScanReport) -> ScanReport {
        info!(
            "{} {} scored {}/100 ({}) in {}ms",
            report.risk.level.emoji(),
            report.target,
            report.risk.score,
            report.risk.label.as_str(),
            report.latency_ms
        );
        self.cache.set(&report.source_hash, report.clone());
        self.telemetry.record_scan(&report);
        report
    }

    /// Scan one Solidity source text
    pub fn scan_source(&self, name: &str, text: &str) -> AppResult<ScanReport> {
        let started = Instant::now();
        self.check_input(text)?;

        let hash = source_hash(ScanKind::Source, text);
        if let Some(report) = self.cached(&hash, name, started) {
            return Ok(report);
        }

        let lexed = tokenize(text);
        for diag in &lexed.diagnostics {
            warn!("⚠️ {}: [{}] line {}: {}", name, diag.code, diag.line, diag.message);
        }
        let unit = parse(&lexed.tokens);
        if unit.contracts.is_empty() {
            return Err(AppError::no_contract(name));
        }

        let extraction = self.extractor.extract(&unit);
        let checklist = run_checklist(&lexed.tokens);
        let risk = RiskScoreBuilder::new(&self.model)
            .with_features(extraction.features)
            .with_scan(ScanKind::Source, extraction.metrics.has_transfer_path())
            .with_diagnostics(!lexed.diagnostics.is_empty())
            .build();

        let contracts = unit
            .contracts
            .iter()
            .map(|c| ContractSummary {
                name: c.name.clone(),
                kind: c.kind,
                bases: c.bases.clone(),
                functions: c.functions.len(),
                state_vars: c.state_vars.len(),
                line: c.line,
            })
            .collect();

        Ok(self.finish(ScanReport {
            id: Uuid::new_v4(),
            target: name.to_string(),
            kind: ScanKind::Source,
            source_hash: hash,
            contracts,
            features: extraction.features,
            metrics: Some(extraction.metrics),
            bytecode: None,
            findings: extraction.findings,
            checklist,
            diagnostics: lexed.diagnostics,
            risk,
            latency_ms: started.elapsed().as_millis() as u64,
            cached: false,
            scanned_at: Utc::now(),
        }))
    }

    /// Scan a multi-file source, concatenated in path order
    pub fn scan_sources(&self, name: &str, files: &[SourceFile]) -> AppResult<ScanReport> {
        let mut sorted: Vec<&SourceFile> = files.iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));
        let joined = sorted
            .iter()
            .map(|f| f.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        debug!("📂 {}: joined {} files ({} bytes)", name, files.len(), joined.len());
        self.scan_source(name, &joined)
    }

    /// Scan deployed runtime bytecode given as hex
    pub fn scan_bytecode(&self, name: &str, hex_code: &str) -> AppResult<ScanReport> {
        let started = Instant::now();
        let normalized = hex_code.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(AppError::empty_input("Nothing to scan"));
        }
        if normalized.len() / 2 > self.config.max_source_bytes {
            return Err(AppError::too_large(normalized.len() / 2, self.config.max_source_bytes));
        }

        let hash = source_hash(ScanKind::Bytecode, &normalized);
        if let Some(report) = self.cached(&hash, name, started) {
            return Ok(report);
        }

        let scan = bytecode::scan_bytecode(&normalized, name)?;
        let risk = RiskScoreBuilder::new(&self.model)
            .with_features(scan.features)
            .with_scan(ScanKind::Bytecode, false)
            .build();

        Ok(self.finish(ScanReport {
            id: Uuid::new_v4(),
            target: name.to_string(),
            kind: ScanKind::Bytecode,
            source_hash: hash,
            contracts: Vec::new(),
            features: scan.features,
            metrics: None,
            bytecode: Some(BytecodeSummary {
                code_size: scan.code_size,
                selectors_found: scan.selectors_found,
                matched: scan.matched,
            }),
            findings: scan.findings,
            checklist: Vec::new(),
            diagnostics: Vec::new(),
            risk,
            latency_ms: started.elapsed().as_millis() as u64,
            cached: false,
            scanned_at: Utc::now(),
        }))
    }

    /// Fetch a deployed contract and scan it: verified source from the
    /// explorer, or runtime code over JSON-RPC
    pub async fn scan_address(
        &self,
        address: &str,
        chain_id: u64,
        mode: ScanKind,
    ) -> AppResult<ScanReport> {
        let parsed = parse_address(address)?;
        let target = format!("{}@{}", parsed, chain_id);
        match mode {
            ScanKind::Source => {
                let source = ExplorerClient::new(&self.config)?
                    .get_source(chain_id, address)
                    .await?;
                info!(
                    "📄 {} is verified as {} ({})",
                    parsed, source.contract_name, source.compiler_version
                );
                self.scan_sources(&target, &source.files)
            }
            ScanKind::Bytecode => {
                let provider = RpcProvider::new(&self.config, chain_id)?;
                debug!("🔗 eth_getCode via {}", provider.masked_url());
                let code = provider.get_code(address).await?;
                self.scan_bytecode(&target, &code)
            }
        }
    }

    /// Features of a source text without scoring, caching or telemetry
    pub fn extract_features(&self, name: &str, text: &str) -> AppResult<TaxFeatures> {
        self.check_input(text)?;
        let unit = parse(&tokenize(text).tokens);
        if unit.contracts.is_empty() {
            return Err(AppError::no_contract(name));
        }
        Ok(self.extractor.extract(&unit).features)
    }

    /// Load a JSON Lines training set. `source_path` entries are resolved
    /// relative to the dataset file and scanned for their features.
    pub fn load_dataset(&self, path: &Path) -> AppResult<Vec<TrainingExample>> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::model_load(format!("Cannot read dataset {}: {}", path.display(), e))
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let mut examples = Vec::new();
        for (i, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry: RawExample = serde_json::from_str(line).map_err(|e| {
                AppError::model_load(format!("{}:{}: {}", path.display(), i + 1, e))
            })?;

            let features = match (&entry.features, &entry.source_path) {
                (Some(map), _) => TaxFeatures::from_map(map)?,
                (None, Some(source)) => {
                    let full = base.join(source);
                    let text = std::fs::read_to_string(&full).map_err(|e| {
                        AppError::model_load(format!("Cannot read {}: {}", full.display(), e))
                    })?;
                    self.extract_features(&full.display().to_string(), &text)?
                }
                (None, None) => {
                    return Err(AppError::model_load(format!(
                        "{}:{}: example needs `features` or `source_path`",
                        path.display(),
                        i + 1
                    )))
                }
            };
            examples.push(TrainingExample {
                label: entry.label,
                features,
            });
        }

        if examples.is_empty() {
            return Err(AppError::empty_dataset());
        }
        info!("📚 Loaded {} examples from {}", examples.len(), path.display());
        Ok(examples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::Feature;
    use crate::models::types::Label;
    use std::time::Duration;

    const ABUSIVE: &str = r#"
        pragma solidity ^0.8.0;
        contract Scam {
            address private _owner;
            address private _previousOwner;
            uint256 private _lockTime;
            uint256 public sellFee = 5;
            uint256 public buyFee = 5;
            mapping(address => bool) public bots;
            modifier onlyOwner() { require(msg.sender == _owner); _; }
            function transfer(address to, uint256 amount) public returns (bool) {
                require(!bots[msg.sender]);
                uint256 fee = amount * sellFee / 100;
                return true;
            }
            function setSellFee(uint256 f) external onlyOwner { sellFee = f; }
            function setBots(address[] memory list, bool v) external onlyOwner {
                for (uint i = 0; i < list.length; i++) { bots[list[i]] = v; }
            }
            function lock(uint256 time) public onlyOwner {
                _previousOwner = _owner;
                _owner = address(0);
                _lockTime = block.timestamp + time;
            }
            function unlock() public {
                require(msg.sender == _previousOwner);
                _owner = _previousOwner;
            }
        }
    "#;

    const CLEAN: &str = r#"
        contract Plain {
            mapping(address => uint256) balanceOf;
            function transfer(address to, uint256 amount) public returns (bool) {
                balanceOf[msg.sender] -= amount;
                balanceOf[to] += amount;
                return true;
            }
        }
    "#;

    fn scanner() -> TaxScanner {
        TaxScanner::from_config(ScannerConfig {
            cache_ttl: Duration::ZERO,
            ..ScannerConfig::builtin()
        })
        .unwrap()
    }

    #[test]
    fn test_abusive_source() {
        let report = scanner().scan_source("scam.sol", ABUSIVE).unwrap();
        assert_eq!(report.kind, ScanKind::Source);
        assert!(report.features.is_set(Feature::FeeSetterUnbounded));
        assert!(report.features.is_set(Feature::HasBlacklist));
        assert!(report.features.is_set(Feature::HasOwnershipLock));
        assert_eq!(report.risk.label, Label::TaxAbuseCandidate);
        assert_eq!(report.contracts[0].name, "Scam");
        assert!(report.checklist.iter().any(|h| h.id == "TX-09"));
        assert!(report.source_hash.starts_with("0x"));
        assert_eq!(report.source_hash.len(), 66);
        assert!(report.summary().contains("tax_abuse_candidate"));
    }

    #[test]
    fn test_clean_source() {
        let report = scanner().scan_source("plain.sol", CLEAN).unwrap();
        assert_eq!(report.risk.label, Label::Safe);
        assert!(report.findings.is_empty());
        assert_eq!(report.risk.confidence, 85);
    }

    #[test]
    fn test_deterministic() {
        let scanner = scanner();
        let a = scanner.scan_source("a.sol", ABUSIVE).unwrap();
        let b = scanner.scan_source("b.sol", ABUSIVE).unwrap();
        assert_eq!(a.features, b.features);
        assert_eq!(a.risk.score, b.risk.score);
        assert_eq!(a.source_hash, b.source_hash);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_cache_hit() {
        let scanner = TaxScanner::from_config(ScannerConfig::builtin()).unwrap();
        let first = scanner.scan_source("a.sol", CLEAN).unwrap();
        let second = scanner.scan_source("a.sol", CLEAN).unwrap();
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(first.id, second.id);
        assert_eq!(scanner.telemetry().get_stats().cache_hits, 1);
    }

    #[test]
    fn test_cache_hit_keeps_caller_target() {
        let scanner = TaxScanner::from_config(ScannerConfig::builtin()).unwrap();
        let first = scanner.scan_source("0xAAAA@1", CLEAN).unwrap();
        let second = scanner.scan_source("0xBBBB@1", CLEAN).unwrap();
        assert!(second.cached);
        assert_eq!(first.target, "0xAAAA@1");
        assert_eq!(second.target, "0xBBBB@1");
        assert_eq!(first.source_hash, second.source_hash);

        let third = scanner.scan_source("0xAAAA@1", CLEAN).unwrap();
        assert_eq!(third.target, "0xAAAA@1");

        scanner.scan_bytecode("runtime-a", "0x6080604052").unwrap();
        let code = scanner.scan_bytecode("runtime-b", "0x6080604052").unwrap();
        assert!(code.cached);
        assert_eq!(code.target, "runtime-b");
    }

    #[test]
    fn test_deeply_nested_initializer_completes() {
        let depth = 200_000;
        let source = format!(
            "contract Deep {{ uint256 x = {}1{}; uint256 y = 2{}; }}",
            "(".repeat(depth),
            ")".repeat(depth),
            " ** 2".repeat(depth / 10)
        );
        let report = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || scanner().scan_source("deep.sol", &source))
            .unwrap()
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(report.contracts.len(), 1);
        assert_eq!(report.contracts[0].name, "Deep");
    }

    #[test]
    fn test_input_errors() {
        let scanner = scanner();
        assert_eq!(scanner.scan_source("x", "  \n").unwrap_err().code_str(), "INPUT_EMPTY");
        assert_eq!(
            scanner.scan_source("x", "uint256 x = 1;").unwrap_err().code_str(),
            "PARSE_NO_CONTRACT"
        );

        let small = TaxScanner::from_config(ScannerConfig {
            max_source_bytes: 10,
            ..ScannerConfig::builtin()
        })
        .unwrap();
        assert_eq!(small.scan_source("x", CLEAN).unwrap_err().code_str(), "INPUT_TOO_LARGE");
    }

    #[test]
    fn test_unterminated_comment_lowers_confidence() {
        let text = format!("{}\n/* never closed", CLEAN);
        let report = scanner().scan_source("x.sol", &text).unwrap();
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.risk.confidence, 65);
    }

    #[test]
    fn test_scan_sources_sorted() {
        let scanner = scanner();
        let files = vec![
            SourceFile {
                path: "b/Token.sol".to_string(),
                content: "contract Token {}".to_string(),
            },
            SourceFile {
                path: "a/Base.sol".to_string(),
                content: "contract Base {}".to_string(),
            },
        ];
        let report = scanner.scan_sources("multi", &files).unwrap();
        let names: Vec<_> = report.contracts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Base", "Token"]);
    }

    #[test]
    fn test_bytecode_scan() {
        // PUSH4 setBots(address[],bool) ; EQ ; STOP
        let selector = hex::encode(crate::core::bytecode::SELECTOR_RULES
            .iter()
            .find(|r| r.signature == "setBots(address[],bool)")
            .unwrap()
            .selector);
        let code = format!("0x63{}1400", selector);
        let report = scanner().scan_bytecode("0xabc", &code).unwrap();
        assert_eq!(report.kind, ScanKind::Bytecode);
        assert!(report.features.is_set(Feature::HasBlacklist));
        assert_eq!(report.risk.confidence, 45);
        assert_eq!(report.bytecode.as_ref().unwrap().matched.len(), 1);
        assert!(report.metrics.is_none());
    }

    #[test]
    fn test_bytecode_errors() {
        let scanner = scanner();
        assert_eq!(scanner.scan_bytecode("x", "0x").unwrap_err().code_str(), "TARGET_NOT_CONTRACT");
        assert_eq!(scanner.scan_bytecode("x", "").unwrap_err().code_str(), "INPUT_EMPTY");
        assert_eq!(scanner.scan_bytecode("x", "0xzz").unwrap_err().code_str(), "INPUT_INVALID_HEX");
    }

    #[test]
    fn test_load_dataset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scam.sol"), ABUSIVE).unwrap();
        let data = dir.path().join("train.jsonl");
        std::fs::write(
            &data,
            "{\"label\":\"safe\",\"features\":{\"has_fee_logic\":1.0}}\n\
             \n\
             {\"label\":\"tax_abuse_candidate\",\"source_path\":\"scam.sol\"}\n",
        )
        .unwrap();

        let examples = scanner().load_dataset(&data).unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[0].label, Label::Safe);
        assert!(examples[1].features.is_set(Feature::HasBlacklist));
    }

    #[test]
    fn test_load_dataset_errors() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("bad.jsonl");
        std::fs::write(&data, "{\"label\":\"safe\",\"features\":{\"bogus\":1.0}}\n").unwrap();
        assert_eq!(
            scanner().load_dataset(&data).unwrap_err().code_str(),
            "MODEL_UNKNOWN_FEATURE"
        );

        std::fs::write(&data, "\n\n").unwrap();
        assert_eq!(
            scanner().load_dataset(&data).unwrap_err().code_str(),
            "MODEL_EMPTY_DATASET"
        );
    }
}
