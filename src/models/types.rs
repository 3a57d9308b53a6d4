//! Type definitions shared by the scanner, the API and the CLI

use serde::{Deserialize, Serialize};

/// Risk level bucket for a 0-100 score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// 0-20
    Low,
    /// 21-60
    Medium,
    /// 61-100
    High,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=20 => Self::Low,
            21..=60 => Self::Medium,
            _ => Self::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Low => "✅",
            Self::Medium => "🟠",
            Self::High => "🔴",
        }
    }
}

/// Classification label attached to a scanned contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Safe,
    Suspicious,
    TaxAbuseCandidate,
}

impl Label {
    pub fn from_level(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Low => Self::Safe,
            RiskLevel::Medium => Self::Suspicious,
            RiskLevel::High => Self::TaxAbuseCandidate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Suspicious => "suspicious",
            Self::TaxAbuseCandidate => "tax_abuse_candidate",
        }
    }

    /// Regression target used when training the scoring model
    pub fn target(&self) -> f64 {
        match self {
            Self::Safe => 0.0,
            Self::Suspicious => 0.5,
            Self::TaxAbuseCandidate => 1.0,
        }
    }
}

/// What kind of artifact was scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    Source,
    Bytecode,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Bytecode => "bytecode",
        }
    }
}

/// Finding severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Where a finding was observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    pub line: u32,
}

/// Tax-abuse pattern detected in a contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FindingKind {
    /// Transfer path deducts a fee
    FeeOnTransfer { function: String },
    /// Privileged function rewrites fee rates
    MutableFee { function: String, variables: Vec<String> },
    /// Fee setter assigns a caller-supplied value without an upper bound
    UnboundedFeeSetter { function: String, variables: Vec<String> },
    /// Reachable fee exceeds the configured cap
    ExcessiveFeeCap { max_fee_pct: f64, cap_pct: f64 },
    /// Selling is taxed more heavily than buying
    AsymmetricSellFee { buy_pct: f64, sell_pct: f64 },
    /// Addresses can be exempted from fees
    FeeExemptionList { name: String },
    /// Addresses can be blocked from transferring
    Blacklist { name: String },
    /// Fee wallet can be re-pointed by the owner
    MutableFeeRecipient { function: String, variable: String },
    /// Fee depends on block time or block number
    TimeDependentFee { function: String },
    /// Owner can open or close trading
    TradingToggle { name: String },
    /// Max transaction or max wallet limits
    TransactionLimit { name: String },
    /// Per-address transfer cooldown
    Cooldown { name: String },
    /// Reflection-style indirect balance accounting
    ReflectionAccounting { name: String },
    /// Collected tax is swapped for ETH by the contract
    SwapBack { function: String },
    /// Ownership can be temporarily renounced and reclaimed
    OwnershipLock { name: String },
    /// tx.origin is consulted in contract logic
    TxOriginCheck { function: String },
    /// Owner can mint new supply after deployment
    OwnerMint { function: String },
}

impl FindingKind {
    /// Stable identifier for aggregation
    pub fn id(&self) -> &'static str {
        match self {
            Self::FeeOnTransfer { .. } => "fee_on_transfer",
            Self::MutableFee { .. } => "mutable_fee",
            Self::UnboundedFeeSetter { .. } => "unbounded_fee_setter",
            Self::ExcessiveFeeCap { .. } => "excessive_fee_cap",
            Self::AsymmetricSellFee { .. } => "asymmetric_sell_fee",
            Self::FeeExemptionList { .. } => "fee_exemption_list",
            Self::Blacklist { .. } => "blacklist",
            Self::MutableFeeRecipient { .. } => "mutable_fee_recipient",
            Self::TimeDependentFee { .. } => "time_dependent_fee",
            Self::TradingToggle { .. } => "trading_toggle",
            Self::TransactionLimit { .. } => "transaction_limit",
            Self::Cooldown { .. } => "cooldown",
            Self::ReflectionAccounting { .. } => "reflection_accounting",
            Self::SwapBack { .. } => "swap_back",
            Self::OwnershipLock { .. } => "ownership_lock",
            Self::TxOriginCheck { .. } => "tx_origin_check",
            Self::OwnerMint { .. } => "owner_mint",
        }
    }

    /// Default severity for this kind of finding
    pub fn severity(&self) -> Severity {
        match self {
            Self::FeeOnTransfer { .. } => Severity::Info,
            Self::MutableFee { .. } => Severity::Medium,
            Self::UnboundedFeeSetter { .. } => Severity::Critical,
            Self::ExcessiveFeeCap { .. } => Severity::High,
            Self::AsymmetricSellFee { buy_pct, sell_pct } => {
                if sell_pct - buy_pct >= 20.0 {
                    Severity::High
                } else {
                    Severity::Medium
                }
            }
            Self::FeeExemptionList { .. } => Severity::Low,
            Self::Blacklist { .. } => Severity::High,
            Self::MutableFeeRecipient { .. } => Severity::Medium,
            Self::TimeDependentFee { .. } => Severity::High,
            Self::TradingToggle { .. } => Severity::Medium,
            Self::TransactionLimit { .. } => Severity::Low,
            Self::Cooldown { .. } => Severity::Low,
            Self::ReflectionAccounting { .. } => Severity::Info,
            Self::SwapBack { .. } => Severity::Info,
            Self::OwnershipLock { .. } => Severity::Critical,
            Self::TxOriginCheck { .. } => Severity::Medium,
            Self::OwnerMint { .. } => Severity::High,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::FeeOnTransfer { function } => {
                format!("Transfer path deducts a fee in {}()", function)
            }
            Self::MutableFee { function, variables } => {
                format!("{}() lets a privileged caller change {}", function, variables.join(", "))
            }
            Self::UnboundedFeeSetter { function, variables } => format!(
                "{}() sets {} with no upper bound - fee can be raised to 100%",
                function,
                variables.join(", ")
            ),
            Self::ExcessiveFeeCap { max_fee_pct, cap_pct } => format!(
                "Fee can reach {:.1}% (cap {:.1}%)",
                max_fee_pct, cap_pct
            ),
            Self::AsymmetricSellFee { buy_pct, sell_pct } => format!(
                "Sell fee {:.1}% exceeds buy fee {:.1}%",
                sell_pct, buy_pct
            ),
            Self::FeeExemptionList { name } => {
                format!("Fee exemption list '{}' lets chosen wallets trade tax-free", name)
            }
            Self::Blacklist { name } => {
                format!("Blacklist '{}' can block holders from selling", name)
            }
            Self::MutableFeeRecipient { function, variable } => {
                format!("{}() re-points fee wallet '{}'", function, variable)
            }
            Self::TimeDependentFee { function } => {
                format!("{}() computes fees from block time/number", function)
            }
            Self::TradingToggle { name } => format!("Trading can be switched via '{}'", name),
            Self::TransactionLimit { name } => format!("Transfer limit '{}'", name),
            Self::Cooldown { name } => format!("Transfer cooldown '{}'", name),
            Self::ReflectionAccounting { name } => {
                format!("Reflection accounting via '{}'", name)
            }
            Self::SwapBack { function } => {
                format!("{}() swaps collected tax for ETH", function)
            }
            Self::OwnershipLock { name } => format!(
                "Ownership lock pattern '{}' - ownership can be reclaimed after renounce",
                name
            ),
            Self::TxOriginCheck { function } => format!("{}() reads tx.origin", function),
            Self::OwnerMint { function } => format!("{}() lets the owner mint supply", function),
        }
    }
}

/// A finding together with its contract and location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(flatten)]
    pub kind: FindingKind,
    pub severity: Severity,
    pub contract: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Finding {
    pub fn new(kind: FindingKind, contract: impl Into<String>, location: Option<Location>) -> Self {
        let severity = kind.severity();
        Self {
            kind,
            severity,
            contract: contract.into(),
            location,
        }
    }

    pub fn describe(&self) -> String {
        let line = self
            .location
            .as_ref()
            .map(|l| format!(" (line {})", l.line))
            .unwrap_or_default();
        format!(
            "[{}] {}: {}{}",
            self.severity.as_str(),
            self.contract,
            self.kind.description(),
            line
        )
    }
}

/// One file of a (possibly multi-file) Solidity source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_thresholds() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(20), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(21), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(60), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(61), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::High);
    }

    #[test]
    fn test_label_mapping() {
        assert_eq!(Label::from_level(RiskLevel::Low), Label::Safe);
        assert_eq!(Label::from_level(RiskLevel::Medium), Label::Suspicious);
        assert_eq!(Label::from_level(RiskLevel::High), Label::TaxAbuseCandidate);
        assert_eq!(
            serde_json::to_string(&Label::TaxAbuseCandidate).unwrap(),
            "\"tax_abuse_candidate\""
        );
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_asymmetric_fee_severity() {
        let mild = FindingKind::AsymmetricSellFee { buy_pct: 3.0, sell_pct: 5.0 };
        let harsh = FindingKind::AsymmetricSellFee { buy_pct: 0.0, sell_pct: 30.0 };
        assert_eq!(mild.severity(), Severity::Medium);
        assert_eq!(harsh.severity(), Severity::High);
    }

    #[test]
    fn test_finding_serializes_flat() {
        let finding = Finding::new(
            FindingKind::Blacklist { name: "bots".to_string() },
            "Token",
            Some(Location { function: None, line: 12 }),
        );
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["type"], "blacklist");
        assert_eq!(json["name"], "bots");
        assert_eq!(json["severity"], "high");
        assert!(finding.describe().contains("line 12"));
    }
}
