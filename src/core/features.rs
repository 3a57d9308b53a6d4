//! Static feature extraction
//!
//! Turns a parsed [`SourceUnit`] into the fixed [`TaxFeatures`] vector the
//! model scores, plus descriptive fee metrics and structured findings.
//!
//! Everything here is pattern matching over identifiers and token shapes:
//! - fee variables are numeric state variables named like `fee`/`tax`
//! - privileged functions carry an owner-style modifier or compare
//!   `msg.sender` against an owner-like variable
//! - fee setters are privileged entry points that write a fee variable
//! - the transfer path is everything reachable from `_transfer`/`transfer`
//!
//! All collections are ordered so the same text always yields the same
//! features.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

use crate::core::lexer::{parse_number, Token, TokenKind};
use crate::core::parser::{
    find_matching, ContractDef, ContractKind, FunctionDef, FunctionKind, SourceUnit, StateVar,
};
use crate::models::errors::{AppError, AppResult};
use crate::models::types::{Finding, FindingKind, Location};
use crate::utils::constants::DEFAULT_FEE_DENOMINATOR;

pub const FEATURE_COUNT: usize = 19;

/// Model input features, in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Feature {
    HasFeeLogic,
    HasSetFee,
    FeeSetterUnbounded,
    MaxFeeOverCap,
    HasSellFee,
    SellFeeExceedsBuyFee,
    HasWhitelist,
    HasBlacklist,
    FeeRecipientMutable,
    DynamicFee,
    HasMaxTxLimit,
    HasTradingToggle,
    HasCooldown,
    IsReflection,
    HasSwapBack,
    HasOwnershipLock,
    UsesTxOrigin,
    HasOwnerMint,
    OwnerPrivilegeRatio,
}

impl Feature {
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::HasFeeLogic,
        Feature::HasSetFee,
        Feature::FeeSetterUnbounded,
        Feature::MaxFeeOverCap,
        Feature::HasSellFee,
        Feature::SellFeeExceedsBuyFee,
        Feature::HasWhitelist,
        Feature::HasBlacklist,
        Feature::FeeRecipientMutable,
        Feature::DynamicFee,
        Feature::HasMaxTxLimit,
        Feature::HasTradingToggle,
        Feature::HasCooldown,
        Feature::IsReflection,
        Feature::HasSwapBack,
        Feature::HasOwnershipLock,
        Feature::UsesTxOrigin,
        Feature::HasOwnerMint,
        Feature::OwnerPrivilegeRatio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HasFeeLogic => "has_fee_logic",
            Self::HasSetFee => "has_set_fee",
            Self::FeeSetterUnbounded => "fee_setter_unbounded",
            Self::MaxFeeOverCap => "max_fee_over_cap",
            Self::HasSellFee => "has_sell_fee",
            Self::SellFeeExceedsBuyFee => "sell_fee_exceeds_buy_fee",
            Self::HasWhitelist => "has_whitelist",
            Self::HasBlacklist => "has_blacklist",
            Self::FeeRecipientMutable => "fee_recipient_mutable",
            Self::DynamicFee => "dynamic_fee",
            Self::HasMaxTxLimit => "has_max_tx_limit",
            Self::HasTradingToggle => "has_trading_toggle",
            Self::HasCooldown => "has_cooldown",
            Self::IsReflection => "is_reflection",
            Self::HasSwapBack => "has_swap_back",
            Self::HasOwnershipLock => "has_ownership_lock",
            Self::UsesTxOrigin => "uses_tx_origin",
            Self::HasOwnerMint => "has_owner_mint",
            Self::OwnerPrivilegeRatio => "owner_privilege_ratio",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.as_str() == name)
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Fixed feature vector. Serializes as an ordered `name -> value` map.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TaxFeatures {
    values: [f64; FEATURE_COUNT],
}

impl TaxFeatures {
    #[inline]
    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature.index()]
    }

    /// Values are clamped to [0, 1]
    pub fn set(&mut self, feature: Feature, value: f64) {
        self.values[feature.index()] = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
    }

    pub fn flag(&mut self, feature: Feature, on: bool) {
        self.set(feature, if on { 1.0 } else { 0.0 });
    }

    pub fn is_set(&self, feature: Feature) -> bool {
        self.get(feature) > 0.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Feature, f64)> + '_ {
        Feature::ALL.iter().map(move |f| (*f, self.get(*f)))
    }

    /// Features with a non-zero value
    pub fn active(&self) -> Vec<Feature> {
        self.iter().filter(|(_, v)| *v > 0.0).map(|(f, _)| f).collect()
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.iter().map(|(f, v)| (f.as_str().to_string(), v)).collect()
    }

    /// Build from a name map; missing names are 0, unknown names are rejected
    pub fn from_map(map: &BTreeMap<String, f64>) -> AppResult<Self> {
        let mut features = Self::default();
        for (name, value) in map {
            let feature = Feature::from_name(name).ok_or_else(|| AppError::unknown_feature(name))?;
            features.set(feature, *value);
        }
        Ok(features)
    }
}

impl Serialize for TaxFeatures {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter().map(|(f, v)| (f.as_str(), v)))
    }
}

impl<'de> Deserialize<'de> for TaxFeatures {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = BTreeMap::<String, f64>::deserialize(deserializer)?;
        Self::from_map(&map).map_err(serde::de::Error::custom)
    }
}

/// Descriptive fee numbers; not model inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeMetrics {
    pub fee_denominator: u64,
    pub max_fee_pct: Option<f64>,
    pub buy_fee_pct: Option<f64>,
    pub sell_fee_pct: Option<f64>,
    pub fee_variables: Vec<String>,
    pub privileged_functions: Vec<String>,
    pub transfer_functions: Vec<String>,
}

impl FeeMetrics {
    pub fn has_transfer_path(&self) -> bool {
        !self.transfer_functions.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub features: TaxFeatures,
    pub metrics: FeeMetrics,
    pub findings: Vec<Finding>,
}

// ============================================
// NAME CLASSIFIERS
// ============================================

const TRANSFER_ENTRIES: [&str; 7] = [
    "_transfer",
    "transfer",
    "transferFrom",
    "_update",
    "_tokenTransfer",
    "_beforeTokenTransfer",
    "_afterTokenTransfer",
];

const FEE_NAME_EXCLUDE: [&str; 24] = [
    "threshold", "amount", "collected", "denominator", "divisor", "precision", "limit", "wallet",
    "receiver", "recipient", "address", "addr", "exclude", "exempt", "enabled", "previous",
    "max", "min", "reduce", "swap", "tokens", "balance", "block", "count",
];

const RECIPIENT_WORDS: [&str; 8] =
    ["wallet", "receiver", "recipient", "treasury", "marketing", "dev", "fee", "tax"];

const OWNER_WORDS: [&str; 7] = ["owner", "admin", "dev", "marketing", "wallet", "deployer", "operator"];

const ASSIGN_OPS: [&str; 7] = ["=", "+=", "-=", "*=", "/=", "|=", "&="];

fn is_fee_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    (lower.contains("fee") || lower.contains("tax"))
        && !lower.starts_with("_tfee")
        && !lower.starts_with("tfee")
        && !FEE_NAME_EXCLUDE.iter().any(|w| lower.contains(w))
}

/// uint/int, or a user struct (`Fees public buyFees`)
fn is_numeric_type(type_name: &str) -> bool {
    if type_name.starts_with("uint") || type_name.starts_with("int") {
        return true;
    }
    let mut chars = type_name.chars();
    let first = chars.next();
    let second = chars.next();
    let interface_like = first == Some('I') && second.map_or(false, |c| c.is_ascii_uppercase());
    first.map_or(false, |c| c.is_ascii_uppercase())
        && !interface_like
        && !type_name.contains(&['(', '[', ' '][..])
}

fn is_recipient_var(var: &StateVar) -> bool {
    let lower = var.name.to_lowercase();
    var.type_name.starts_with("address") && RECIPIENT_WORDS.iter().any(|w| lower.contains(w))
}

fn lower_contains_any(name: &str, words: &[&str]) -> bool {
    let lower = name.to_lowercase();
    words.iter().any(|w| lower.contains(w))
}

// ============================================
// TOKEN HELPERS
// ============================================

fn idents(tokens: &[Token]) -> impl Iterator<Item = &str> {
    tokens.iter().filter(|t| t.is_ident()).map(|t| t.text.as_str())
}

fn has_member(tokens: &[Token], object: &str, member: &str) -> bool {
    tokens
        .windows(3)
        .any(|w| w[0].is(object) && w[1].is(".") && w[2].is(member))
}

fn uses_block_clock(tokens: &[Token]) -> bool {
    has_member(tokens, "block", "timestamp")
        || has_member(tokens, "block", "number")
        || tokens.iter().any(|t| t.is_ident() && t.is("now"))
}

/// Identifiers followed by `(`
fn called_names(body: &[Token]) -> BTreeSet<String> {
    body.windows(2)
        .filter(|w| w[0].is_ident() && w[1].is("("))
        .map(|w| w[0].text.clone())
        .collect()
}

/// Splits a body at `;`, `{` and `}`
fn statements(body: &[Token]) -> Vec<&[Token]> {
    body.split(|t| t.kind == TokenKind::Punct && (t.is(";") || t.is("{") || t.is("}")))
        .filter(|s| !s.is_empty())
        .collect()
}

fn find_matching_back(tokens: &[Token], close: usize) -> Option<usize> {
    let (left, right) = match tokens.get(close)?.text.as_str() {
        ")" => ("(", ")"),
        "]" => ("[", "]"),
        _ => return None,
    };
    let mut depth = 0usize;
    for i in (0..=close).rev() {
        if tokens[i].is(right) {
            depth += 1;
        } else if tokens[i].is(left) {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

struct Assignment<'t> {
    /// Identifiers on the left-hand side (`a.b[i]` -> `a`, `b`)
    chain: Vec<String>,
    rhs: &'t [Token],
}

impl Assignment<'_> {
    fn path(&self) -> String {
        self.chain.join(".")
    }
}

fn assignments(body: &[Token]) -> Vec<Assignment<'_>> {
    let mut out = Vec::new();
    for (i, tok) in body.iter().enumerate() {
        if tok.kind != TokenKind::Punct || !ASSIGN_OPS.contains(&tok.text.as_str()) {
            continue;
        }
        let mut chain = Vec::new();
        let mut j = i;
        while j > 0 {
            let prev = &body[j - 1];
            if prev.is("]") {
                match find_matching_back(body, j - 1) {
                    Some(open) => j = open,
                    None => break,
                }
            } else if prev.is_ident() {
                chain.push(prev.text.clone());
                j -= 1;
                if j > 0 && body[j - 1].is(".") {
                    j -= 1;
                } else {
                    break;
                }
            } else {
                break;
            }
        }
        if chain.is_empty() {
            continue;
        }
        chain.reverse();

        let mut end = i + 1;
        let mut depth = 0i32;
        while end < body.len() {
            let t = &body[end];
            if t.kind == TokenKind::Punct {
                match t.text.as_str() {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" if depth == 0 => break,
                    ")" | "]" | "}" => depth -= 1,
                    ";" | "," if depth == 0 => break,
                    _ => {}
                }
            }
            end += 1;
        }
        out.push(Assignment {
            chain,
            rhs: &body[i + 1..end],
        });
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum GuardKind {
    /// require/assert: the condition must hold
    Require,
    /// if: the condition selects a branch
    If,
}

struct Guard<'t> {
    kind: GuardKind,
    cond: &'t [Token],
    /// Tokens governed by an `if` (its statement or block)
    branch: &'t [Token],
}

fn guards(body: &[Token]) -> Vec<Guard<'_>> {
    let mut out = Vec::new();
    for (i, tok) in body.iter().enumerate() {
        let kind = match tok.text.as_str() {
            "require" | "assert" if tok.is_ident() => GuardKind::Require,
            "if" if tok.is_ident() => GuardKind::If,
            _ => continue,
        };
        if !body.get(i + 1).map_or(false, |t| t.is("(")) {
            continue;
        }
        let close = match find_matching(body, i + 1) {
            Some(c) => c,
            None => continue,
        };
        let branch = match (kind, body.get(close + 1)) {
            (GuardKind::If, Some(t)) if t.is("{") => {
                let end = find_matching(body, close + 1).unwrap_or(body.len());
                &body[close + 2..end.max(close + 2)]
            }
            (GuardKind::If, Some(_)) => {
                let end = body[close + 1..]
                    .iter()
                    .position(|t| t.is(";"))
                    .map_or(body.len(), |p| close + 1 + p);
                &body[close + 1..end]
            }
            _ => &body[close..close],
        };
        out.push(Guard {
            kind,
            cond: &body[i + 2..close],
            branch,
        });
    }
    out
}

/// Split a condition into clauses at top-level `&&`, `||` and `,`
fn clauses(cond: &[Token]) -> Vec<&[Token]> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, t) in cond.iter().enumerate() {
        if t.kind != TokenKind::Punct {
            continue;
        }
        match t.text.as_str() {
            "(" | "[" => depth += 1,
            ")" | "]" => depth -= 1,
            "&&" | "||" | "," if depth == 0 => {
                out.push(&cond[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&cond[start..]);
    out
}

// ============================================
// CONSTANT EVALUATION
// ============================================

/// Evaluate a constant arithmetic expression over numbers and known names
pub(crate) fn eval_const(tokens: &[Token], env: &BTreeMap<String, f64>) -> Option<f64> {
    if tokens.is_empty() {
        return None;
    }
    let mut eval = ConstEval {
        tokens,
        pos: 0,
        depth: 0,
        env,
    };
    let value = eval.expr()?;
    (eval.pos == tokens.len() && value.is_finite()).then_some(value)
}

/// Deepest parenthesis or `**` nesting the evaluator follows
const MAX_CONST_DEPTH: usize = 64;

struct ConstEval<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    env: &'a BTreeMap<String, f64>,
}

impl ConstEval<'_> {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(|t| t.text.as_str())
    }

    fn expr(&mut self) -> Option<f64> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some("+") => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some("-") => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Some(value),
            }
        }
    }

    fn term(&mut self) -> Option<f64> {
        let mut value = self.factor()?;
        loop {
            match self.peek() {
                Some("*") => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                Some("/") => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return None;
                    }
                    value /= divisor;
                }
                _ => return Some(value),
            }
        }
    }

    fn factor(&mut self) -> Option<f64> {
        let base = self.primary()?;
        if self.peek() == Some("**") {
            self.pos += 1;
            let exp = self.nested(Self::factor)?;
            return Some(base.powf(exp));
        }
        Some(base)
    }

    fn nested(&mut self, f: fn(&mut Self) -> Option<f64>) -> Option<f64> {
        if self.depth >= MAX_CONST_DEPTH {
            return None;
        }
        self.depth += 1;
        let value = f(self);
        self.depth -= 1;
        value
    }

    fn primary(&mut self) -> Option<f64> {
        let tok = self.tokens.get(self.pos)?;
        self.pos += 1;
        match tok.kind {
            TokenKind::Number => parse_number(&tok.text),
            TokenKind::Ident => self.env.get(&tok.text).copied(),
            TokenKind::Punct if tok.is("(") => {
                let value = self.nested(Self::expr)?;
                if self.peek() == Some(")") {
                    self.pos += 1;
                    Some(value)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

// ============================================
// EXTRACTOR
// ============================================

/// Static feature extractor
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    fee_cap_pct: f64,
}

impl FeatureExtractor {
    pub fn new(fee_cap_pct: f64) -> Self {
        Self { fee_cap_pct }
    }

    pub fn fee_cap_pct(&self) -> f64 {
        self.fee_cap_pct
    }

    pub fn extract(&self, unit: &SourceUnit) -> Extraction {
        let ctx = Context::new(unit);
        let mut state = State::default();

        let reachable = ctx.transfer_path();
        ctx.detect_fee_logic(&reachable, &mut state);
        ctx.detect_setters(&mut state);
        ctx.detect_lists_and_controls(&mut state);
        ctx.detect_dynamic_fee(&reachable, &mut state);
        ctx.detect_misc(&mut state);

        let denominator = ctx.fee_denominator();
        let fee_values = ctx.fee_values();
        let pct = |v: f64| v * 100.0 / denominator as f64;

        let buy = side_total(&fee_values, Some("buy")).map(pct);
        let sell = side_total(&fee_values, Some("sell")).map(pct);
        let generic = side_total(&fee_values, None).map(pct);

        let mut max_fee = None::<f64>;
        let mut consider = |v: Option<f64>| {
            if let Some(v) = v {
                max_fee = Some(max_fee.map_or(v, |m| m.max(v)));
            }
        };
        consider(buy);
        consider(sell);
        consider(generic);
        for value in fee_values.values() {
            consider(Some(pct(*value)));
        }
        for value in &state.setter_literals {
            consider(Some(pct(*value)));
        }
        for value in &state.setter_bounds {
            consider(Some(pct(*value)));
        }
        if state.unbounded_setter {
            consider(Some(100.0));
        }
        if max_fee.is_none() && !ctx.fee_vars.is_empty() {
            max_fee = Some(0.0);
        }

        let mut features = TaxFeatures::default();
        features.flag(Feature::HasFeeLogic, state.fee_logic_in.is_some());
        features.flag(Feature::HasSetFee, !state.setters.is_empty());
        features.flag(Feature::FeeSetterUnbounded, state.unbounded_setter);
        let over_cap = max_fee.map_or(false, |m| m > self.fee_cap_pct);
        features.flag(Feature::MaxFeeOverCap, over_cap);
        let has_sell = ctx.fee_vars.iter().any(|v| v.to_lowercase().contains("sell"));
        features.flag(Feature::HasSellFee, has_sell);
        let sell_exceeds = sell.map_or(false, |s| s > buy.unwrap_or(0.0));
        features.flag(Feature::SellFeeExceedsBuyFee, sell_exceeds);
        features.flag(Feature::HasWhitelist, state.whitelist.is_some());
        features.flag(Feature::HasBlacklist, state.blacklist.is_some());
        features.flag(Feature::FeeRecipientMutable, state.recipient_setter.is_some());
        features.flag(Feature::DynamicFee, state.dynamic_fee_in.is_some());
        features.flag(Feature::HasMaxTxLimit, state.max_tx.is_some());
        features.flag(Feature::HasTradingToggle, state.trading_toggle.is_some());
        features.flag(Feature::HasCooldown, state.cooldown.is_some());
        features.flag(Feature::IsReflection, state.reflection.is_some());
        features.flag(Feature::HasSwapBack, state.swap_back.is_some());
        features.flag(Feature::HasOwnershipLock, state.ownership_lock.is_some());
        features.flag(Feature::UsesTxOrigin, state.tx_origin_in.is_some());
        features.flag(Feature::HasOwnerMint, state.owner_mint_in.is_some());

        let entries = ctx.functions.iter().filter(|(_, f)| f.is_state_changing_entry()).count();
        let privileged = ctx
            .functions
            .iter()
            .filter(|(_, f)| f.is_state_changing_entry() && ctx.is_privileged(f))
            .count();
        let ratio = if entries == 0 { 0.0 } else { privileged as f64 / entries as f64 };
        features.set(Feature::OwnerPrivilegeRatio, ratio);

        let mut findings = state.findings;
        if over_cap {
            if let Some(max_fee_pct) = max_fee {
                findings.push(Finding::new(
                    FindingKind::ExcessiveFeeCap {
                        max_fee_pct,
                        cap_pct: self.fee_cap_pct,
                    },
                    ctx.primary.clone(),
                    None,
                ));
            }
        }
        if sell_exceeds {
            findings.push(Finding::new(
                FindingKind::AsymmetricSellFee {
                    buy_pct: buy.unwrap_or(0.0),
                    sell_pct: sell.unwrap_or(0.0),
                },
                ctx.primary.clone(),
                None,
            ));
        }
        findings.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| line_of(a).cmp(&line_of(b)))
                .then_with(|| a.kind.id().cmp(b.kind.id()))
        });

        let metrics = FeeMetrics {
            fee_denominator: denominator,
            max_fee_pct: max_fee,
            buy_fee_pct: buy,
            sell_fee_pct: sell,
            fee_variables: ctx.fee_vars.iter().cloned().collect(),
            privileged_functions: ctx
                .functions
                .iter()
                .filter(|(_, f)| f.kind == FunctionKind::Function && ctx.is_privileged(f))
                .map(|(_, f)| f.name.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            transfer_functions: reachable.iter().cloned().collect(),
        };

        debug!(
            "🔬 Extracted {} active features, {} findings, max fee {:?}%",
            features.active().len(),
            findings.len(),
            metrics.max_fee_pct
        );

        Extraction {
            features,
            metrics,
            findings,
        }
    }
}

fn line_of(finding: &Finding) -> u32 {
    finding.location.as_ref().map_or(0, |l| l.line)
}

/// Fee total for one side (`buy`/`sell`) or for side-less variables.
/// Stage groups (`initial`, `final`, ...) are alternatives, so the largest
/// group wins; within a group components add up unless a total is given.
fn side_total(values: &BTreeMap<String, f64>, side: Option<&str>) -> Option<f64> {
    const STAGES: [&str; 4] = ["initial", "final", "original", "launch"];
    let mut groups: BTreeMap<&str, (f64, Option<f64>)> = BTreeMap::new();
    for (name, value) in values {
        let lower = name.to_lowercase();
        let on_side = match side {
            Some(word) => lower.contains(word),
            None => !lower.contains("buy") && !lower.contains("sell") && !lower.contains("transfer"),
        };
        if !on_side {
            continue;
        }
        let stage = STAGES.iter().find(|s| lower.contains(*s)).copied().unwrap_or("base");
        let entry = groups.entry(stage).or_insert((0.0, None));
        if lower.contains("total") {
            entry.1 = Some(entry.1.map_or(*value, |t: f64| t.max(*value)));
        } else {
            entry.0 += value;
        }
    }
    groups
        .values()
        .map(|(sum, total)| total.unwrap_or(*sum))
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
}

#[derive(Default)]
struct State {
    findings: Vec<Finding>,
    fee_logic_in: Option<String>,
    setters: Vec<String>,
    unbounded_setter: bool,
    setter_bounds: Vec<f64>,
    setter_literals: Vec<f64>,
    whitelist: Option<String>,
    blacklist: Option<String>,
    recipient_setter: Option<String>,
    dynamic_fee_in: Option<String>,
    max_tx: Option<String>,
    trading_toggle: Option<String>,
    cooldown: Option<String>,
    reflection: Option<String>,
    swap_back: Option<String>,
    ownership_lock: Option<String>,
    tx_origin_in: Option<String>,
    owner_mint_in: Option<String>,
}

struct Context<'a> {
    functions: Vec<(&'a ContractDef, &'a FunctionDef)>,
    vars: Vec<(&'a ContractDef, &'a StateVar)>,
    /// Names with a known constant value
    constants: BTreeMap<String, f64>,
    fee_vars: BTreeSet<String>,
    /// Modifiers defined in the source that check `msg.sender`
    sender_modifiers: BTreeSet<String>,
    primary: String,
}

impl<'a> Context<'a> {
    fn new(unit: &'a SourceUnit) -> Self {
        let contracts: Vec<&ContractDef> = unit
            .contracts
            .iter()
            .filter(|c| c.kind != ContractKind::Interface)
            .collect();

        let functions: Vec<_> = contracts
            .iter()
            .flat_map(|c| c.functions.iter().map(move |f| (*c, f)))
            .collect();
        let vars: Vec<_> = contracts
            .iter()
            .flat_map(|c| c.state_vars.iter().map(move |v| (*c, v)))
            .collect();

        // Two passes so constants may reference earlier constants
        let mut constants = BTreeMap::new();
        for _ in 0..2 {
            for (_, var) in &vars {
                if let Some(value) = eval_const(&var.initializer, &constants) {
                    constants.insert(var.name.clone(), value);
                }
            }
        }

        let fee_vars = vars
            .iter()
            .filter(|(_, v)| !v.is_constant && is_numeric_type(&v.type_name) && is_fee_name(&v.name))
            .map(|(_, v)| v.name.clone())
            .collect();

        let sender_modifiers = functions
            .iter()
            .filter(|(_, f)| f.kind == FunctionKind::Modifier && has_sender_check(&f.body))
            .map(|(_, f)| f.name.clone())
            .collect();

        let primary = unit
            .contracts
            .iter()
            .rev()
            .find(|c| c.kind == ContractKind::Contract)
            .or_else(|| unit.contracts.last())
            .map(|c| c.name.clone())
            .unwrap_or_default();

        Self {
            functions,
            vars,
            constants,
            fee_vars,
            sender_modifiers,
            primary,
        }
    }

    fn is_privileged(&self, function: &FunctionDef) -> bool {
        let by_modifier = function.modifiers.iter().any(|m| {
            let lower = m.to_lowercase();
            lower.starts_with("only")
                || lower.contains("owner")
                || lower.contains("auth")
                || lower.contains("admin")
                || self.sender_modifiers.contains(m)
        });
        by_modifier || has_sender_check(&function.body)
    }

    fn is_fee_path(&self, chain: &[String]) -> bool {
        chain.first().map_or(false, |root| self.fee_vars.contains(root))
    }

    fn location(function: &FunctionDef) -> Option<Location> {
        Some(Location {
            function: Some(function.name.clone()),
            line: function.line,
        })
    }

    fn var_location(var: &StateVar) -> Option<Location> {
        Some(Location {
            function: None,
            line: var.line,
        })
    }

    /// Functions reachable from the transfer entry points
    fn transfer_path(&self) -> BTreeSet<String> {
        let by_name: BTreeMap<&str, Vec<&FunctionDef>> =
            self.functions.iter().fold(BTreeMap::new(), |mut acc, (_, f)| {
                acc.entry(f.name.as_str()).or_insert_with(Vec::new).push(*f);
                acc
            });

        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = TRANSFER_ENTRIES
            .iter()
            .copied()
            .filter(|n| by_name.get(n).map_or(false, |fs| fs.iter().any(|f| !f.body.is_empty())))
            .collect();

        while let Some(name) = queue.pop_front() {
            if !seen.insert(name.to_string()) {
                continue;
            }
            for function in by_name.get(name).into_iter().flatten() {
                for callee in called_names(&function.body) {
                    if let Some((key, _)) = by_name.get_key_value(callee.as_str()) {
                        if !seen.contains(*key) {
                            queue.push_back(key);
                        }
                    }
                }
            }
        }
        seen
    }

    fn reachable_functions<'s>(
        &'s self,
        reachable: &'s BTreeSet<String>,
    ) -> impl Iterator<Item = &'s (&'a ContractDef, &'a FunctionDef)> + 's {
        self.functions
            .iter()
            .filter(move |(_, f)| reachable.contains(&f.name) && !f.body.is_empty())
    }

    fn detect_fee_logic(&self, reachable: &BTreeSet<String>, state: &mut State) {
        for (contract, function) in self.reachable_functions(reachable) {
            let reads_fee = idents(&function.body).any(|id| self.fee_vars.contains(id));
            let calls_fee_helper = called_names(&function.body).iter().any(|name| {
                let lower = name.to_lowercase();
                (lower.contains("fee") || lower.contains("tax"))
                    && !lower.contains("exclude")
                    && !lower.contains("exempt")
            });
            if reads_fee || calls_fee_helper {
                state.fee_logic_in = Some(function.name.clone());
                state.findings.push(Finding::new(
                    FindingKind::FeeOnTransfer {
                        function: function.name.clone(),
                    },
                    contract.name.clone(),
                    Self::location(function),
                ));
                return;
            }
        }
    }

    fn detect_setters(&self, state: &mut State) {
        for (contract, function) in &self.functions {
            if !function.is_state_changing_entry() || !self.is_privileged(function) {
                continue;
            }
            let params: BTreeSet<&str> = function.param_names().collect();
            let assigned = assignments(&function.body);

            // Fee wallet re-pointing
            for assignment in &assigned {
                let recipient = self.vars.iter().find(|(_, v)| {
                    assignment.chain.first() == Some(&v.name) && is_recipient_var(v)
                });
                if let Some((_, var)) = recipient {
                    if state.recipient_setter.is_none() {
                        state.recipient_setter = Some(function.name.clone());
                    }
                    state.findings.push(Finding::new(
                        FindingKind::MutableFeeRecipient {
                            function: function.name.clone(),
                            variable: var.name.clone(),
                        },
                        contract.name.clone(),
                        Self::location(function),
                    ));
                    break;
                }
            }

            let fee_writes: Vec<&Assignment> =
                assigned.iter().filter(|a| self.is_fee_path(&a.chain)).collect();
            if fee_writes.is_empty() {
                continue;
            }

            let variables: Vec<String> = fee_writes
                .iter()
                .map(|a| a.path())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            state.setters.push(function.name.clone());

            let mut from_caller = false;
            for write in &fee_writes {
                if idents(write.rhs).any(|id| params.contains(id)) {
                    from_caller = true;
                } else if let Some(value) = eval_const(write.rhs, &self.constants) {
                    state.setter_literals.push(value);
                }
            }

            let subjects: BTreeSet<&str> = params
                .iter()
                .copied()
                .chain(assigned.iter().flat_map(|a| a.chain.iter().map(|s| s.as_str())))
                .collect();
            let (bounded, bound) = self.upper_bound(&function.body, &subjects);
            if let Some(value) = bound {
                state.setter_bounds.push(value);
            }

            let kind = if from_caller && !bounded {
                state.unbounded_setter = true;
                FindingKind::UnboundedFeeSetter {
                    function: function.name.clone(),
                    variables,
                }
            } else {
                FindingKind::MutableFee {
                    function: function.name.clone(),
                    variables,
                }
            };
            state
                .findings
                .push(Finding::new(kind, contract.name.clone(), Self::location(function)));
        }
    }

    /// Whether the body caps any of `subjects`, and the largest known cap
    fn upper_bound(&self, body: &[Token], subjects: &BTreeSet<&str>) -> (bool, Option<f64>) {
        let mut bounded = false;
        let mut bound: Option<f64> = None;
        for guard in guards(body) {
            for clause in clauses(guard.cond) {
                let Some(k) = clause.iter().position(|t| {
                    t.kind == TokenKind::Punct && matches!(t.text.as_str(), "<" | "<=" | ">" | ">=")
                }) else {
                    continue;
                };
                let (left, right) = (&clause[..k], &clause[k + 1..]);
                let less = matches!(clause[k].text.as_str(), "<" | "<=");
                let (subject, limit) = match (guard.kind, less) {
                    (GuardKind::Require, true) | (GuardKind::If, false) => (left, right),
                    (GuardKind::Require, false) | (GuardKind::If, true) => (right, left),
                };
                let mentions_subject = idents(subject)
                    .any(|id| subjects.contains(id) || self.fee_vars.contains(id) || is_fee_name(id));
                let limit_from_caller = idents(limit).any(|id| subjects.contains(id));
                if mentions_subject && !limit_from_caller {
                    bounded = true;
                    if let Some(value) = eval_const(limit, &self.constants) {
                        bound = Some(bound.map_or(value, |b| b.max(value)));
                    }
                }
            }
        }
        (bounded, bound)
    }

    fn detect_lists_and_controls(&self, state: &mut State) {
        for (contract, var) in &self.vars {
            let lower = var.name.to_lowercase();
            let is_mapping = var.type_name.starts_with("mapping");
            let location = Self::var_location(var);

            if is_mapping
                && ["excluded", "exempt", "whitelist"].iter().any(|w| lower.contains(w))
                && state.whitelist.is_none()
            {
                state.whitelist = Some(var.name.clone());
                state.findings.push(Finding::new(
                    FindingKind::FeeExemptionList { name: var.name.clone() },
                    contract.name.clone(),
                    location.clone(),
                ));
            }
            if is_mapping
                && ["bot", "blacklist", "blocklist", "blocked", "sniper", "banned"]
                    .iter()
                    .any(|w| lower.contains(w))
                && state.blacklist.is_none()
            {
                state.blacklist = Some(var.name.clone());
                state.findings.push(Finding::new(
                    FindingKind::Blacklist { name: var.name.clone() },
                    contract.name.clone(),
                    location.clone(),
                ));
            }
            if var.type_name == "bool" && lower.contains("trading") && state.trading_toggle.is_none() {
                state.trading_toggle = Some(var.name.clone());
                state.findings.push(Finding::new(
                    FindingKind::TradingToggle { name: var.name.clone() },
                    contract.name.clone(),
                    location.clone(),
                ));
            }
            self.name_controls(&var.name, contract, location, state);
        }

        for (contract, function) in &self.functions {
            let lower = function.name.to_lowercase();
            let location = Self::location(function);
            if ["excludefromfee", "includeinfee", "setfeeexempt", "whitelist", "setexcludedfromfee"]
                .iter()
                .any(|w| lower.contains(w))
                && state.whitelist.is_none()
            {
                state.whitelist = Some(function.name.clone());
                state.findings.push(Finding::new(
                    FindingKind::FeeExemptionList { name: function.name.clone() },
                    contract.name.clone(),
                    location.clone(),
                ));
            }
            let blacklist_fn = ["setbot", "addbot", "delbot", "removebot", "blockbot", "isbot"]
                .iter()
                .any(|w| lower.starts_with(w))
                || ["blacklist", "blocklist", "sniper"].iter().any(|w| lower.contains(w));
            if blacklist_fn && state.blacklist.is_none() {
                state.blacklist = Some(function.name.clone());
                state.findings.push(Finding::new(
                    FindingKind::Blacklist { name: function.name.clone() },
                    contract.name.clone(),
                    location.clone(),
                ));
            }
            if lower.contains("trading")
                && function.is_state_changing_entry()
                && self.is_privileged(function)
                && state.trading_toggle.is_none()
            {
                state.trading_toggle = Some(function.name.clone());
                state.findings.push(Finding::new(
                    FindingKind::TradingToggle { name: function.name.clone() },
                    contract.name.clone(),
                    location.clone(),
                ));
            }
            self.name_controls(&function.name, contract, location, state);
        }
    }

    /// Controls recognizable from a variable or function name alone
    fn name_controls(
        &self,
        name: &str,
        contract: &ContractDef,
        location: Option<Location>,
        state: &mut State,
    ) {
        let lower = name.to_lowercase();
        let owned = name.to_string();
        let findings = &mut state.findings;

        if lower_contains_any(name, &["maxtx", "maxtransaction", "maxwallet", "maxbuy", "maxsell"]) {
            let kind = FindingKind::TransactionLimit { name: owned.clone() };
            record_once(&mut state.max_tx, findings, &owned, kind, contract, &location);
        }
        if lower.contains("cooldown") {
            let kind = FindingKind::Cooldown { name: owned.clone() };
            record_once(&mut state.cooldown, findings, &owned, kind, contract, &location);
        }
        if matches!(
            lower.as_str(),
            "_rowned" | "_rtotal" | "tokenfromreflection" | "reflectionfromtoken"
        ) {
            let kind = FindingKind::ReflectionAccounting { name: owned.clone() };
            record_once(&mut state.reflection, findings, &owned, kind, contract, &location);
        }
        if lower_contains_any(
            name,
            &["swapandliquify", "swapback", "swaptokensforeth", "swaptokensforbnb"],
        ) {
            let kind = FindingKind::SwapBack { function: owned.clone() };
            record_once(&mut state.swap_back, findings, &owned, kind, contract, &location);
        }
        if matches!(
            lower.as_str(),
            "lock" | "unlock" | "getunlocktime" | "_previousowner" | "_locktime"
        ) {
            let kind = FindingKind::OwnershipLock { name: owned.clone() };
            record_once(&mut state.ownership_lock, findings, &owned, kind, contract, &location);
        }
    }

    fn detect_dynamic_fee(&self, reachable: &BTreeSet<String>, state: &mut State) {
        let fee_ish = |tokens: &[Token]| {
            idents(tokens).any(|id| self.fee_vars.contains(id) || is_fee_name(id))
        };
        let writes_fee = |tokens: &[Token]| {
            assignments(tokens)
                .iter()
                .any(|a| a.chain.iter().any(|n| self.fee_vars.contains(n) || is_fee_name(n)))
        };
        for (contract, function) in self.reachable_functions(reachable) {
            let guarded = guards(&function.body)
                .into_iter()
                .any(|g| uses_block_clock(g.cond) && (fee_ish(g.cond) || writes_fee(g.branch)));
            let inline = statements(&function.body)
                .into_iter()
                .any(|s| uses_block_clock(s) && fee_ish(s));
            if guarded || inline {
                state.dynamic_fee_in = Some(function.name.clone());
                state.findings.push(Finding::new(
                    FindingKind::TimeDependentFee {
                        function: function.name.clone(),
                    },
                    contract.name.clone(),
                    Self::location(function),
                ));
                return;
            }
        }
    }

    fn detect_misc(&self, state: &mut State) {
        for (contract, function) in &self.functions {
            if state.tx_origin_in.is_none() && has_member(&function.body, "tx", "origin") {
                state.tx_origin_in = Some(function.name.clone());
                state.findings.push(Finding::new(
                    FindingKind::TxOriginCheck {
                        function: function.name.clone(),
                    },
                    contract.name.clone(),
                    Self::location(function),
                ));
            }

            let mints = called_names(&function.body)
                .iter()
                .any(|c| c == "_mint" || c == "mint");
            if state.owner_mint_in.is_none()
                && mints
                && function.is_state_changing_entry()
                && self.is_privileged(function)
            {
                state.owner_mint_in = Some(function.name.clone());
                state.findings.push(Finding::new(
                    FindingKind::OwnerMint {
                        function: function.name.clone(),
                    },
                    contract.name.clone(),
                    Self::location(function),
                ));
            }
        }
    }

    /// Denominator used when fees are applied (`amount * fee / 100`)
    fn fee_denominator(&self) -> u64 {
        for (_, var) in &self.vars {
            let lower = var.name.to_lowercase();
            let named = lower.contains("denominator")
                || lower.contains("divisor")
                || ((lower.contains("fee") || lower.contains("tax"))
                    && (lower.contains("precision") || lower.contains("base")));
            if named {
                if let Some(value) = self.constants.get(&var.name) {
                    if *value >= 1.0 {
                        return *value as u64;
                    }
                }
            }
        }

        let mut counts: BTreeMap<u64, usize> = BTreeMap::new();
        for (_, function) in &self.functions {
            for statement in statements(&function.body) {
                let mentions_fee = idents(statement)
                    .any(|id| self.fee_vars.contains(id) || is_fee_name(id));
                if !mentions_fee {
                    continue;
                }
                for (i, tok) in statement.iter().enumerate() {
                    let divisor = if tok.is("/") {
                        divisor_after(statement, i + 1, &self.constants)
                    } else if tok.is("div") && statement.get(i + 1).map_or(false, |t| t.is("(")) {
                        find_matching(statement, i + 1)
                            .and_then(|close| eval_const(&statement[i + 2..close], &self.constants))
                    } else {
                        None
                    };
                    if let Some(d) = divisor.filter(|d| *d >= 100.0 && d.fract() == 0.0) {
                        *counts.entry(d as u64).or_insert(0) += 1;
                    }
                }
            }
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(d, _)| d)
            .unwrap_or(DEFAULT_FEE_DENOMINATOR)
    }

    /// Known fee values (raw, before the denominator) by variable path
    fn fee_values(&self) -> BTreeMap<String, f64> {
        let mut values = BTreeMap::new();
        for (_, var) in &self.vars {
            if self.fee_vars.contains(&var.name) {
                if let Some(value) = self.constants.get(&var.name) {
                    values.insert(var.name.clone(), *value);
                }
            }
        }

        for (_, function) in &self.functions {
            if function.kind != FunctionKind::Constructor {
                continue;
            }
            for assignment in assignments(&function.body) {
                let tracks_total = assignment.chain.iter().any(|n| {
                    let lower = n.to_lowercase();
                    lower.contains("total") && is_fee_name(n)
                });
                if !self.is_fee_path(&assignment.chain) && !tracks_total {
                    continue;
                }
                let mut env = self.constants.clone();
                env.extend(values.iter().map(|(k, v)| (k.clone(), *v)));
                if let Some(value) = eval_const(assignment.rhs, &env) {
                    values.insert(assignment.path(), value);
                }
            }
        }
        values
    }
}

/// Fills `slot` and records the finding the first time a control is seen
fn record_once(
    slot: &mut Option<String>,
    findings: &mut Vec<Finding>,
    name: &str,
    kind: FindingKind,
    contract: &ContractDef,
    location: &Option<Location>,
) {
    if slot.is_none() {
        *slot = Some(name.to_string());
        findings.push(Finding::new(kind, contract.name.clone(), location.clone()));
    }
}

/// Evaluates the operand right after a `/`
fn divisor_after(tokens: &[Token], start: usize, env: &BTreeMap<String, f64>) -> Option<f64> {
    let first = tokens.get(start)?;
    if first.is("(") {
        let close = find_matching(tokens, start)?;
        return eval_const(&tokens[start..=close], env);
    }
    // `100`, `FEE_DENOMINATOR` or `10 ** 2`
    if tokens.get(start + 1).map_or(false, |t| t.is("**")) {
        return eval_const(tokens.get(start..start + 3)?, env);
    }
    eval_const(&tokens[start..=start], env)
}

/// `msg.sender`/`_msgSender()` compared against an owner-like name
fn has_sender_check(body: &[Token]) -> bool {
    statements(body).into_iter().any(|s| {
        let sender = has_member(s, "msg", "sender") || s.iter().any(|t| t.is("_msgSender"));
        let compares = s.iter().any(|t| t.is("==") || t.is("!="));
        let owner_like = idents(s).any(|id| {
            !matches!(id, "msg" | "sender" | "_msgSender" | "require" | "if")
                && lower_contains_any(id, &OWNER_WORDS)
        });
        sender && compares && owner_like
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lexer::tokenize;
    use crate::core::parser::parse;

    fn extract(source: &str) -> Extraction {
        let unit = parse(&tokenize(source).tokens);
        FeatureExtractor::new(25.0).extract(&unit)
    }

    const OWNABLE: &str = r#"
        abstract contract Ownable {
            address private _owner;
            modifier onlyOwner() { require(_owner == msg.sender, "caller is not the owner"); _; }
            function owner() public view returns (address) { return _owner; }
            function renounceOwnership() public onlyOwner { _owner = address(0); }
        }
    "#;

    fn with_ownable(body: &str) -> String {
        format!("{}\n{}", OWNABLE, body)
    }

    #[test]
    fn test_feature_names_unique_and_ordered() {
        let names: BTreeSet<_> = Feature::ALL.iter().map(|f| f.as_str()).collect();
        assert_eq!(names.len(), FEATURE_COUNT);
        for (i, feature) in Feature::ALL.iter().enumerate() {
            assert_eq!(feature.index(), i);
            assert_eq!(Feature::from_name(feature.as_str()), Some(*feature));
        }
    }

    #[test]
    fn test_features_map_roundtrip_rejects_unknown() {
        let mut features = TaxFeatures::default();
        features.flag(Feature::HasBlacklist, true);
        features.set(Feature::OwnerPrivilegeRatio, 0.5);
        let json = serde_json::to_string(&features).unwrap();
        assert!(json.starts_with("{\"has_fee_logic\":0.0"));
        let back: TaxFeatures = serde_json::from_str(&json).unwrap();
        assert_eq!(back, features);

        let mut bad = BTreeMap::new();
        bad.insert("honeypot".to_string(), 1.0);
        let err = TaxFeatures::from_map(&bad).unwrap_err();
        assert_eq!(err.code_str(), "MODEL_UNKNOWN_FEATURE");
    }

    #[test]
    fn test_set_clamps() {
        let mut features = TaxFeatures::default();
        features.set(Feature::OwnerPrivilegeRatio, 3.0);
        assert_eq!(features.get(Feature::OwnerPrivilegeRatio), 1.0);
        features.set(Feature::OwnerPrivilegeRatio, f64::NAN);
        assert_eq!(features.get(Feature::OwnerPrivilegeRatio), 0.0);
    }

    #[test]
    fn test_eval_const() {
        let env = BTreeMap::from([("BASE".to_string(), 100.0)]);
        let eval = |s: &str| eval_const(&tokenize(s).tokens, &env);
        assert_eq!(eval("10 ** 2"), Some(100.0));
        assert_eq!(eval("2 + 3 * 4"), Some(14.0));
        assert_eq!(eval("(2 + 3) * BASE"), Some(500.0));
        assert_eq!(eval("x + 1"), None);
        assert_eq!(eval("1 / 0"), None);
    }

    #[test]
    fn test_eval_const_nesting_bound() {
        let env = BTreeMap::new();
        let eval = |s: &str| eval_const(&tokenize(s).tokens, &env);
        let shallow = format!("{}7{}", "(".repeat(MAX_CONST_DEPTH), ")".repeat(MAX_CONST_DEPTH));
        assert_eq!(eval(&shallow), Some(7.0));

        let deep = format!("{}7{}", "(".repeat(50_000), ")".repeat(50_000));
        assert_eq!(eval(&deep), None);
        assert_eq!(eval(&format!("1{}", " ** 1".repeat(10_000))), None);
    }

    #[test]
    fn test_unbounded_setter() {
        let ex = extract(&with_ownable(
            r#"
            contract Token is Ownable {
                uint256 public sellFee = 5;
                uint256 public buyFee = 5;
                function setSellFee(uint256 fee) external onlyOwner { sellFee = fee; }
                function _transfer(address a, address b, uint256 amt) internal {
                    uint256 tax = amt * sellFee / 100;
                }
            }
        "#,
        ));
        assert!(ex.features.is_set(Feature::HasSetFee));
        assert!(ex.features.is_set(Feature::FeeSetterUnbounded));
        assert!(ex.features.is_set(Feature::MaxFeeOverCap));
        assert!(ex.features.is_set(Feature::HasFeeLogic));
        assert_eq!(ex.metrics.max_fee_pct, Some(100.0));
        assert!(ex
            .findings
            .iter()
            .any(|f| matches!(f.kind, FindingKind::UnboundedFeeSetter { .. })));
        assert_eq!(ex.findings[0].kind.id(), "unbounded_fee_setter");
    }

    #[test]
    fn test_bounded_setter() {
        let ex = extract(&with_ownable(
            r#"
            contract Token is Ownable {
                uint256 public constant MAX_FEE = 10;
                uint256 public taxFee = 3;
                function setTaxFee(uint256 fee) external onlyOwner {
                    require(fee <= MAX_FEE, "fee too high");
                    taxFee = fee;
                }
            }
        "#,
        ));
        assert!(ex.features.is_set(Feature::HasSetFee));
        assert!(!ex.features.is_set(Feature::FeeSetterUnbounded));
        assert!(!ex.features.is_set(Feature::MaxFeeOverCap));
        assert_eq!(ex.metrics.max_fee_pct, Some(10.0));
        assert!(ex.findings.iter().any(|f| matches!(f.kind, FindingKind::MutableFee { .. })));
    }

    #[test]
    fn test_revert_style_bound() {
        let ex = extract(&with_ownable(
            r#"
            contract Token is Ownable {
                uint256 public buyTax;
                uint256 public sellTax;
                function setTaxes(uint256 b, uint256 s) external onlyOwner {
                    if (b + s > 20) revert();
                    buyTax = b;
                    sellTax = s;
                }
            }
        "#,
        ));
        assert!(!ex.features.is_set(Feature::FeeSetterUnbounded));
        assert_eq!(ex.metrics.max_fee_pct, Some(20.0));
    }

    #[test]
    fn test_lower_bound_is_not_a_cap() {
        let ex = extract(&with_ownable(
            r#"
            contract Token is Ownable {
                uint256 public taxFee;
                function setTaxFee(uint256 fee) external onlyOwner {
                    require(fee > 0, "zero");
                    taxFee = fee;
                }
            }
        "#,
        ));
        assert!(ex.features.is_set(Feature::FeeSetterUnbounded));
    }

    #[test]
    fn test_hidden_sender_check_is_privileged() {
        let ex = extract(
            r#"
            contract Token {
                address private _marketingWallet;
                uint256 private _sellTax = 3;
                function manualTax(uint256 t) external {
                    require(_msgSender() == _marketingWallet);
                    _sellTax = t;
                }
                function _msgSender() internal view returns (address) { return msg.sender; }
            }
        "#,
        );
        assert!(ex.features.is_set(Feature::HasSetFee));
        assert!(ex.features.is_set(Feature::FeeSetterUnbounded));
        assert_eq!(ex.metrics.privileged_functions, vec!["manualTax"]);
    }

    #[test]
    fn test_fee_denominator_and_sides() {
        let ex = extract(
            r#"
            contract Token {
                uint256 public buyMarketingFee = 200;
                uint256 public buyLiquidityFee = 100;
                uint256 public sellMarketingFee = 800;
                uint256 public sellLiquidityFee = 200;
                function _transfer(address f, address t, uint256 amount) internal {
                    uint256 fees = amount * sellMarketingFee / 10000;
                }
            }
        "#,
        );
        assert_eq!(ex.metrics.fee_denominator, 10000);
        assert_eq!(ex.metrics.buy_fee_pct, Some(3.0));
        assert_eq!(ex.metrics.sell_fee_pct, Some(10.0));
        assert!(ex.features.is_set(Feature::HasSellFee));
        assert!(ex.features.is_set(Feature::SellFeeExceedsBuyFee));
        assert!(!ex.features.is_set(Feature::MaxFeeOverCap));
    }

    #[test]
    fn test_staged_fees_take_max_not_sum() {
        let ex = extract(
            r#"
            contract Token {
                uint256 private _initialBuyTax = 20;
                uint256 private _finalBuyTax = 0;
                uint256 private _initialSellTax = 30;
                uint256 private _finalSellTax = 0;
            }
        "#,
        );
        assert_eq!(ex.metrics.buy_fee_pct, Some(20.0));
        assert_eq!(ex.metrics.sell_fee_pct, Some(30.0));
        assert!(ex.features.is_set(Feature::MaxFeeOverCap));
    }

    #[test]
    fn test_constructor_values_and_totals() {
        let ex = extract(
            r#"
            contract Token {
                uint256 public buyMarketingFee;
                uint256 public buyDevFee;
                uint256 public buyTotalFees;
                constructor() {
                    buyMarketingFee = 3;
                    buyDevFee = 2;
                    buyTotalFees = buyMarketingFee + buyDevFee;
                }
            }
        "#,
        );
        assert_eq!(ex.metrics.buy_fee_pct, Some(5.0));
    }

    #[test]
    fn test_lists_and_controls() {
        let ex = extract(&with_ownable(
            r#"
            contract Token is Ownable {
                mapping(address => bool) private _isExcludedFromFee;
                mapping(address => bool) private bots;
                mapping(address => uint256) private _holderLastTransferTimestamp;
                bool private tradingOpen;
                bool private cooldownEnabled = false;
                uint256 public _maxTxAmount = 1000;
                address payable private _taxWallet;
                function openTrading() external onlyOwner { tradingOpen = true; }
                function setTaxWallet(address payable w) external onlyOwner { _taxWallet = w; }
                function swapTokensForEth(uint256 amount) private {}
            }
        "#,
        ));
        for feature in [
            Feature::HasWhitelist,
            Feature::HasBlacklist,
            Feature::HasTradingToggle,
            Feature::HasCooldown,
            Feature::HasMaxTxLimit,
            Feature::FeeRecipientMutable,
            Feature::HasSwapBack,
        ] {
            assert!(ex.features.is_set(feature), "{} not set", feature.as_str());
        }
        assert!(!ex.features.is_set(Feature::HasFeeLogic));
    }

    #[test]
    fn test_dynamic_fee() {
        let ex = extract(
            r#"
            contract Token {
                uint256 public launchTime;
                uint256 public sellFee = 5;
                function _transfer(address from, address to, uint256 amount) internal {
                    uint256 fee = sellFee;
                    if (block.timestamp < launchTime + 60) { fee = 99; }
                }
            }
        "#,
        );
        assert!(ex.features.is_set(Feature::DynamicFee));
    }

    #[test]
    fn test_cooldown_is_not_dynamic_fee() {
        let ex = extract(
            r#"
            contract Token {
                uint256 public taxFee = 5;
                mapping(address => uint256) private cooldown;
                function _transfer(address from, address to, uint256 amount) internal {
                    require(cooldown[to] < block.timestamp);
                    uint256 t = amount * taxFee / 100;
                }
            }
        "#,
        );
        assert!(!ex.features.is_set(Feature::DynamicFee));
        assert!(ex.features.is_set(Feature::HasCooldown));
    }

    #[test]
    fn test_reachability_through_helpers() {
        let ex = extract(
            r#"
            contract Token {
                uint256 private _taxFee = 2;
                function transfer(address to, uint256 amount) public returns (bool) {
                    _move(msg.sender, to, amount);
                    return true;
                }
                function _move(address f, address t, uint256 a) private { _charge(a); }
                function _charge(uint256 a) private { uint256 x = a * _taxFee / 100; }
            }
        "#,
        );
        assert!(ex.features.is_set(Feature::HasFeeLogic));
        assert_eq!(ex.metrics.transfer_functions, vec!["_charge", "_move", "transfer"]);
    }

    #[test]
    fn test_ownership_lock_mint_and_origin() {
        let ex = extract(&with_ownable(
            r#"
            contract Token is Ownable {
                address private _previousOwner;
                uint256 private _lockTime;
                function lock(uint256 time) public onlyOwner { _lockTime = block.timestamp + time; }
                function mint(address to, uint256 amount) external onlyOwner { _mint(to, amount); }
                function _mint(address to, uint256 amount) internal {}
                function check() external { require(tx.origin == msg.sender); }
            }
        "#,
        ));
        assert!(ex.features.is_set(Feature::HasOwnershipLock));
        assert!(ex.features.is_set(Feature::HasOwnerMint));
        assert!(ex.features.is_set(Feature::UsesTxOrigin));
    }

    #[test]
    fn test_privilege_ratio() {
        let ex = extract(&with_ownable(
            r#"
            contract Token is Ownable {
                function a() external onlyOwner { uint z = 3; }
                function b() external { uint x = 1; }
                function c() external { uint y = 2; }
                function d() external view returns (uint) { return 1; }
            }
        "#,
        ));
        // renounceOwnership and a, out of four state-changing entries
        assert_eq!(ex.features.get(Feature::OwnerPrivilegeRatio), 0.5);
    }

    #[test]
    fn test_comments_and_strings_ignored() {
        let ex = extract(
            r#"
            contract Token {
                // function setFee(uint256 f) external onlyOwner { fee = f; }
                /* mapping(address => bool) bots; */
                string public note = "blacklist bots setFee cooldown";
                function transfer(address to, uint256 amount) public returns (bool) { return true; }
            }
        "#,
        );
        assert!(ex.features.active().is_empty());
        assert!(ex.findings.is_empty());
    }

    #[test]
    fn test_determinism() {
        let source = with_ownable(
            r#"
            contract Token is Ownable {
                uint256 public sellFee = 5;
                mapping(address => bool) private bots;
                function setSellFee(uint256 fee) external onlyOwner { sellFee = fee; }
            }
        "#,
        );
        let a = extract(&source);
        let b = extract(&source);
        assert_eq!(a.features, b.features);
        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.findings, b.findings);
    }
}
