//! taxscan - transfer-tax abuse detector for ERC-20 contracts
//!
//! Usage:
//!   taxscan scan contracts/ Token.sol --format json --fail-on high
//!   taxscan bytecode @runtime.hex
//!   taxscan address 0xdAC17F958D2ee523a2206206994597C13D831ec7 --chain 1
//!   taxscan train --data labeled.jsonl --out model.json

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use taxscan::core::checklist::CHECKLIST;
use taxscan::core::model::EvaluationReport;
use taxscan::{AppError, AppResult, RiskLevel, ScanKind, ScanReport, ScannerConfig, TaxScanner, TrainingOptions};

#[derive(Parser)]
#[command(name = "taxscan", version, about = "Detect abusive transfer-tax logic in ERC-20 contracts")]
struct Cli {
    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Model JSON (defaults to the built-in priors)
    #[arg(long, global = true, env = "TAXSCAN_MODEL")]
    model: Option<PathBuf>,

    /// Exit with status 2 when any report reaches this level
    #[arg(long, global = true, value_enum)]
    fail_on: Option<FailOn>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FailOn {
    Medium,
    High,
}

impl FailOn {
    fn level(self) -> RiskLevel {
        match self {
            Self::Medium => RiskLevel::Medium,
            Self::High => RiskLevel::High,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Scan Solidity files; directories are walked for *.sol
    Scan {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Scan runtime bytecode given as hex or @FILE
    Bytecode { input: String },
    /// Fetch and scan a deployed contract
    Address {
        address: String,
        #[arg(long, default_value_t = 1)]
        chain: u64,
        /// Scan on-chain bytecode instead of verified source
        #[arg(long)]
        bytecode: bool,
    },
    /// Print the audit checklist
    Checklist,
    /// Fit the model on a JSONL dataset
    Train {
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 2000)]
        epochs: usize,
        #[arg(long, default_value_t = 0.5)]
        learning_rate: f64,
        #[arg(long, default_value_t = 0.001)]
        l2: f64,
        /// Let weights go below zero (breaks score monotonicity)
        #[arg(long)]
        allow_negative: bool,
    },
    /// Measure the model on a labeled JSONL dataset
    Evaluate {
        #[arg(long)]
        data: PathBuf,
        #[arg(long, default_value_t = 0.61)]
        threshold: f64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> AppResult<ExitCode> {
    let mut config = ScannerConfig::default();
    if cli.model.is_some() {
        config.model_path = cli.model.clone();
    }
    let scanner = TaxScanner::from_config(config)?;
    debug!("🤖 Model {}", scanner.model().version);

    let reports = match cli.command {
        Command::Scan { paths } => {
            let files = collect_sources(&paths)?;
            if files.is_empty() {
                return Err(AppError::empty_input("No .sol files found"));
            }
            let mut reports = Vec::with_capacity(files.len());
            for file in &files {
                let text = std::fs::read_to_string(file)?;
                reports.push(scanner.scan_source(&file.display().to_string(), &text)?);
            }
            reports
        }
        Command::Bytecode { input } => {
            let (name, hex_code) = match input.strip_prefix('@') {
                Some(path) => (path.to_string(), std::fs::read_to_string(path)?),
                None => ("bytecode".to_string(), input),
            };
            vec![scanner.scan_bytecode(&name, &hex_code)?]
        }
        Command::Address { address, chain, bytecode } => {
            let mode = if bytecode { ScanKind::Bytecode } else { ScanKind::Source };
            vec![scanner.scan_address(&address, chain, mode).await?]
        }
        Command::Checklist => {
            print_checklist(cli.format)?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::Train { data, out, epochs, learning_rate, l2, allow_negative } => {
            let examples = scanner.load_dataset(&data)?;
            let mut model = scanner.model().clone();
            model.non_negative = !allow_negative;
            model.train(&examples, TrainingOptions { epochs, learning_rate, l2 })?;
            model.save(&out)?;
            info!("💾 Model {} written to {}", model.version, out.display());
            print_evaluation(&model.evaluate(&examples, 0.61)?, cli.format)?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::Evaluate { data, threshold } => {
            let examples = scanner.load_dataset(&data)?;
            print_evaluation(&scanner.model().evaluate(&examples, threshold)?, cli.format)?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    print_reports(&reports, cli.format)?;

    Ok(if gate_tripped(cli.fail_on, &reports) {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    })
}

/// True when any report reaches the `--fail-on` level
fn gate_tripped(fail_on: Option<FailOn>, reports: &[ScanReport]) -> bool {
    fail_on
        .map(|gate| reports.iter().any(|r| r.level() >= gate.level()))
        .unwrap_or(false)
}

/// Expand directories into their `*.sol` files, sorted by path
fn collect_sources(paths: &[PathBuf]) -> AppResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            walk_dir(path, &mut files)?;
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn walk_dir(dir: &Path, out: &mut Vec<PathBuf>) -> AppResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk_dir(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "sol") {
            out.push(path);
        }
    }
    Ok(())
}

fn print_reports(reports: &[ScanReport], format: OutputFormat) -> AppResult<()> {
    match format {
        OutputFormat::Json if reports.len() == 1 => {
            println!("{}", serde_json::to_string_pretty(&reports[0])?)
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(reports)?),
        OutputFormat::Text => {
            for report in reports {
                println!("{}", report.summary());
            }
        }
    }
    Ok(())
}

fn print_checklist(format: OutputFormat) -> AppResult<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&CHECKLIST[..])?),
        OutputFormat::Text => {
            for item in CHECKLIST.iter() {
                println!("{:<26} {:<16} {}", item.id, item.category.as_str(), item.question);
            }
        }
    }
    Ok(())
}

fn print_evaluation(report: &EvaluationReport, format: OutputFormat) -> AppResult<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            println!("📊 {} examples at threshold {:.2}", report.examples, report.threshold);
            println!("   accuracy  {:.3}", report.accuracy);
            println!("   precision {:.3}", report.precision);
            println!("   recall    {:.3}", report.recall);
            println!("   f1        {:.3}", report.f1);
            println!("   log loss  {:.4}", report.log_loss);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TAXED: &str = r#"
        contract Taxed {
            address private _owner;
            uint256 public sellFee = 5;
            mapping(address => bool) public bots;
            modifier onlyOwner() { require(msg.sender == _owner); _; }
            function _transfer(address from, address to, uint256 amount) internal {
                require(!bots[from]);
                uint256 fee = amount * sellFee / 100;
            }
            function setSellFee(uint256 f) external onlyOwner { sellFee = f; }
            function setBots(address a, bool v) external onlyOwner { bots[a] = v; }
        }
    "#;

    const PLAIN: &str = r#"
        contract Plain {
            mapping(address => uint256) balanceOf;
            function _transfer(address from, address to, uint256 amount) internal {
                balanceOf[from] -= amount;
                balanceOf[to] += amount;
            }
        }
    "#;

    fn scanner() -> TaxScanner {
        TaxScanner::from_config(ScannerConfig {
            cache_ttl: std::time::Duration::ZERO,
            ..ScannerConfig::builtin()
        })
        .unwrap()
    }

    #[test]
    fn test_collect_sources_walks_sorted_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("b/nested")).unwrap();
        fs::create_dir_all(root.join("a")).unwrap();
        fs::write(root.join("b/nested/Z.sol"), PLAIN).unwrap();
        fs::write(root.join("b/Y.sol"), PLAIN).unwrap();
        fs::write(root.join("a/X.sol"), PLAIN).unwrap();
        fs::write(root.join("a/notes.txt"), "not solidity").unwrap();
        fs::write(root.join("a/Lib.sol.bak"), PLAIN).unwrap();

        let files = collect_sources(&[root.to_path_buf(), root.join("a/X.sol")]).unwrap();
        assert_eq!(
            files,
            vec![
                root.join("a/X.sol"),
                root.join("b/Y.sol"),
                root.join("b/nested/Z.sol"),
            ]
        );
    }

    #[test]
    fn test_collect_sources_keeps_explicit_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Token.txt");
        fs::write(&file, PLAIN).unwrap();
        assert_eq!(collect_sources(&[file.clone()]).unwrap(), vec![file]);

        let empty = tempfile::tempdir().unwrap();
        assert!(collect_sources(&[empty.path().to_path_buf()]).unwrap().is_empty());
    }

    #[test]
    fn test_fail_gate() {
        let scanner = scanner();
        let plain = scanner.scan_source("plain.sol", PLAIN).unwrap();
        let taxed = scanner.scan_source("taxed.sol", TAXED).unwrap();
        assert_eq!(plain.level(), RiskLevel::Low);
        assert!(taxed.level() >= RiskLevel::Medium, "score {}", taxed.risk.score);

        let both = vec![plain.clone(), taxed.clone()];
        assert!(!gate_tripped(None, &both));
        assert!(gate_tripped(Some(FailOn::Medium), &both));
        assert!(!gate_tripped(Some(FailOn::Medium), &[plain.clone()]));
        assert_eq!(
            gate_tripped(Some(FailOn::High), &both),
            taxed.level() == RiskLevel::High
        );
        assert!(!gate_tripped(Some(FailOn::High), &[plain]));
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "taxscan", "scan", "contracts/", "--format", "json", "--fail-on", "high",
        ])
        .unwrap();
        assert!(cli.format == OutputFormat::Json);
        assert!(cli.fail_on == Some(FailOn::High));
        match cli.command {
            Command::Scan { paths } => assert_eq!(paths, vec![PathBuf::from("contracts/")]),
            _ => panic!("expected scan"),
        }

        assert!(Cli::try_parse_from(["taxscan", "scan"]).is_err());
        let cli = Cli::try_parse_from(["taxscan", "evaluate", "--data", "d.jsonl"]).unwrap();
        match cli.command {
            Command::Evaluate { threshold, .. } => assert_eq!(threshold, 0.61),
            _ => panic!("expected evaluate"),
        }
    }
}
