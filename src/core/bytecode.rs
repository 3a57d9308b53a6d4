//! Deployed bytecode scan
//!
//! Without source, the dispatcher's `PUSH4 <selector>` immediates are the
//! best signal of what a token can do. Selectors with leading zero bytes
//! arrive through shorter pushes. The walk honours PUSH1..PUSH32 operand
//! lengths so push-data is never mistaken for an opcode.

use alloy_sol_types::{sol, SolCall};
use lazy_static::lazy_static;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

use crate::core::features::{Feature, TaxFeatures};
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{Finding, FindingKind, Location};

const PUSH1: u8 = 0x60;
const PUSH4: u8 = 0x63;
const PUSH32: u8 = 0x7f;

// Tax-token admin surface
sol! {
    // Fee setters
    function setFee(uint256 fee) external;
    function setFees(uint256 buyFee, uint256 sellFee) external;
    function setTaxFeePercent(uint256 taxFee) external;
    function setLiquidityFeePercent(uint256 liquidityFee) external;
    function setBuyFee(uint256 fee) external;
    function setSellFee(uint256 fee) external;
    function setBuyTax(uint256 tax) external;
    function setSellTax(uint256 tax) external;
    function setTaxes(uint256 buyTax, uint256 sellTax) external;
    function updateBuyFees(uint256 marketingFee, uint256 liquidityFee, uint256 devFee) external;
    function updateSellFees(uint256 marketingFee, uint256 liquidityFee, uint256 devFee) external;
    function reduceFee(uint256 newFee) external;

    // Fee wallets
    function setMarketingWallet(address wallet) external;
    function setTaxWallet(address wallet) external;

    // Exemptions
    function excludeFromFee(address account) external;
    function includeInFee(address account) external;
    function setExcludedFromFee(address account, bool excluded) external;
    function isExcludedFromFee(address account) external view returns (bool);

    // Blacklists
    function setBots(address[] calldata bots, bool status) external;
    function addBots(address[] calldata bots) external;
    function delBot(address bot) external;
    function blacklist(address account, bool value) external;
    function isBot(address account) external view returns (bool);

    // Trading and limits
    function openTrading() external;
    function enableTrading() external;
    function setMaxTxAmount(uint256 amount) external;
    function setMaxWalletSize(uint256 amount) external;
    function removeLimits() external;
    function setCooldownEnabled(bool enabled) external;

    // Ownership lock
    function lock(uint256 time) external;
    function unlock() external;
    function getUnlockTime() external view returns (uint256);

    // Swap back and reflection
    function setSwapAndLiquifyEnabled(bool enabled) external;
    function manualswap() external;
    function tokenFromReflection(uint256 rAmount) external view returns (uint256);
    function reflectionFromToken(uint256 tAmount, bool deductTransferFee) external view returns (uint256);

    // Supply
    function mint(address to, uint256 amount) external;
}

/// One known selector and what it implies
#[derive(Debug, Clone)]
pub struct SelectorRule {
    pub selector: [u8; 4],
    pub signature: &'static str,
    pub features: &'static [Feature],
    /// State-changing admin function
    pub privileged: bool,
}

fn rule<C: SolCall>(features: &'static [Feature], privileged: bool) -> SelectorRule {
    SelectorRule {
        selector: C::SELECTOR,
        signature: C::SIGNATURE,
        features,
        privileged,
    }
}

const SET_FEE: &[Feature] = &[Feature::HasSetFee, Feature::HasFeeLogic];
const SET_SELL_FEE: &[Feature] = &[Feature::HasSetFee, Feature::HasFeeLogic, Feature::HasSellFee];

lazy_static! {
    pub static ref SELECTOR_RULES: Vec<SelectorRule> = vec![
        rule::<setFeeCall>(SET_FEE, true),
        rule::<setFeesCall>(SET_SELL_FEE, true),
        rule::<setTaxFeePercentCall>(SET_FEE, true),
        rule::<setLiquidityFeePercentCall>(SET_FEE, true),
        rule::<setBuyFeeCall>(SET_FEE, true),
        rule::<setSellFeeCall>(SET_SELL_FEE, true),
        rule::<setBuyTaxCall>(SET_FEE, true),
        rule::<setSellTaxCall>(SET_SELL_FEE, true),
        rule::<setTaxesCall>(SET_SELL_FEE, true),
        rule::<updateBuyFeesCall>(SET_FEE, true),
        rule::<updateSellFeesCall>(SET_SELL_FEE, true),
        rule::<reduceFeeCall>(SET_FEE, true),
        rule::<setMarketingWalletCall>(&[Feature::FeeRecipientMutable], true),
        rule::<setTaxWalletCall>(&[Feature::FeeRecipientMutable], true),
        rule::<excludeFromFeeCall>(&[Feature::HasWhitelist], true),
        rule::<includeInFeeCall>(&[Feature::HasWhitelist], true),
        rule::<setExcludedFromFeeCall>(&[Feature::HasWhitelist], true),
        rule::<isExcludedFromFeeCall>(&[Feature::HasWhitelist], false),
        rule::<setBotsCall>(&[Feature::HasBlacklist], true),
        rule::<addBotsCall>(&[Feature::HasBlacklist], true),
        rule::<delBotCall>(&[Feature::HasBlacklist], true),
        rule::<blacklistCall>(&[Feature::HasBlacklist], true),
        rule::<isBotCall>(&[Feature::HasBlacklist], false),
        rule::<openTradingCall>(&[Feature::HasTradingToggle], true),
        rule::<enableTradingCall>(&[Feature::HasTradingToggle], true),
        rule::<setMaxTxAmountCall>(&[Feature::HasMaxTxLimit], true),
        rule::<setMaxWalletSizeCall>(&[Feature::HasMaxTxLimit], true),
        rule::<removeLimitsCall>(&[Feature::HasMaxTxLimit], true),
        rule::<setCooldownEnabledCall>(&[Feature::HasCooldown], true),
        rule::<lockCall>(&[Feature::HasOwnershipLock], true),
        rule::<unlockCall>(&[Feature::HasOwnershipLock], true),
        rule::<getUnlockTimeCall>(&[Feature::HasOwnershipLock], false),
        rule::<setSwapAndLiquifyEnabledCall>(&[Feature::HasSwapBack], true),
        rule::<manualswapCall>(&[Feature::HasSwapBack], true),
        rule::<tokenFromReflectionCall>(&[Feature::IsReflection, Feature::HasFeeLogic], false),
        rule::<reflectionFromTokenCall>(&[Feature::IsReflection, Feature::HasFeeLogic], false),
        rule::<mintCall>(&[Feature::HasOwnerMint], true),
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectorMatch {
    pub selector: String,
    pub signature: String,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BytecodeScan {
    pub code_size: usize,
    pub selectors_found: usize,
    pub matched: Vec<SelectorMatch>,
    pub features: TaxFeatures,
    #[serde(skip)]
    pub findings: Vec<Finding>,
}

/// Decode a hex string (with or without `0x`) into runtime code
pub fn decode_hex(input: &str) -> AppResult<Vec<u8>> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits).map_err(|e| AppError::invalid_hex(format!("Invalid bytecode hex: {}", e)))
}

/// Selector-sized push immediates found by the opcode walk
#[derive(Debug, Default, PartialEq)]
pub struct PushedSelectors {
    /// `PUSH4` immediates in code order, without duplicates
    pub exact: Vec<[u8; 4]>,
    /// `PUSH1`..`PUSH3` immediates left-padded to four bytes. The optimizer
    /// pushes selectors with leading zero bytes this way.
    pub short: BTreeSet<[u8; 4]>,
}

impl PushedSelectors {
    fn has_exact(&self, selector: &[u8; 4]) -> bool {
        self.exact.contains(selector)
    }

    fn has_short(&self, selector: &[u8; 4]) -> bool {
        selector[0] == 0 && self.short.contains(selector)
    }
}

pub fn pushed_selectors(code: &[u8]) -> PushedSelectors {
    let mut seen = BTreeSet::new();
    let mut pushed = PushedSelectors::default();
    let mut pc = 0;
    while pc < code.len() {
        let op = code[pc];
        if !(PUSH1..=PUSH32).contains(&op) {
            pc += 1;
            continue;
        }
        let width = (op - PUSH1 + 1) as usize;
        if op <= PUSH4 && pc + width < code.len() {
            let mut selector = [0u8; 4];
            selector[4 - width..].copy_from_slice(&code[pc + 1..pc + 1 + width]);
            if op == PUSH4 {
                if seen.insert(selector) {
                    pushed.exact.push(selector);
                }
            } else {
                pushed.short.insert(selector);
            }
        }
        pc += 1 + width;
    }
    pushed
}

fn finding_for(rule: &SelectorRule) -> Option<FindingKind> {
    let name = rule.signature.to_string();
    let kind = match rule.features.first()? {
        Feature::HasSetFee => FindingKind::MutableFee {
            function: name,
            variables: Vec::new(),
        },
        Feature::FeeRecipientMutable => FindingKind::MutableFeeRecipient {
            function: name,
            variable: "fee wallet".to_string(),
        },
        Feature::HasWhitelist => FindingKind::FeeExemptionList { name },
        Feature::HasBlacklist => FindingKind::Blacklist { name },
        Feature::HasTradingToggle => FindingKind::TradingToggle { name },
        Feature::HasMaxTxLimit => FindingKind::TransactionLimit { name },
        Feature::HasCooldown => FindingKind::Cooldown { name },
        Feature::HasOwnershipLock => FindingKind::OwnershipLock { name },
        Feature::HasSwapBack => FindingKind::SwapBack { function: name },
        Feature::IsReflection => FindingKind::ReflectionAccounting { name },
        Feature::HasOwnerMint => FindingKind::OwnerMint { function: name },
        _ => return None,
    };
    Some(kind)
}

/// Scan runtime bytecode for tax-related selectors
pub fn scan_bytecode(input: &str, contract: &str) -> AppResult<BytecodeScan> {
    let code = decode_hex(input)?;
    if code.is_empty() {
        return Err(AppError::not_contract(contract));
    }
    Ok(scan_code(&code, contract, &SELECTOR_RULES))
}

fn scan_code(code: &[u8], contract: &str, rules: &[SelectorRule]) -> BytecodeScan {
    let pushed = pushed_selectors(code);
    let mut selectors_found = pushed.exact.len();
    let mut features = TaxFeatures::default();
    let mut matched = Vec::new();
    let mut findings = Vec::new();
    let mut privileged = 0usize;

    for rule in rules {
        if !pushed.has_exact(&rule.selector) {
            if !pushed.has_short(&rule.selector) {
                continue;
            }
            selectors_found += 1;
        }
        for feature in rule.features {
            features.flag(*feature, true);
        }
        if rule.privileged {
            privileged += 1;
        }
        if let Some(kind) = finding_for(rule) {
            findings.push(Finding::new(
                kind,
                contract,
                Some(Location {
                    function: Some(rule.signature.to_string()),
                    line: 0,
                }),
            ));
        }
        matched.push(SelectorMatch {
            selector: format!("0x{}", hex::encode(rule.selector)),
            signature: rule.signature.to_string(),
            features: rule.features.iter().map(|f| f.as_str().to_string()).collect(),
        });
    }

    if selectors_found > 0 {
        features.set(
            Feature::OwnerPrivilegeRatio,
            privileged as f64 / selectors_found as f64,
        );
    }
    findings.sort_by(|a, b| b.severity.cmp(&a.severity));

    debug!(
        "🧬 Bytecode scan: {} bytes, {} selectors, {} matched",
        code.len(),
        selectors_found,
        matched.len()
    );

    BytecodeScan {
        code_size: code.len(),
        selectors_found,
        matched,
        features,
        findings,
    }
}
