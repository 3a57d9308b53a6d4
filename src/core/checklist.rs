//! Manual audit checklist
//!
//! A static table of questions an auditor asks about a taxed token, each
//! paired with an identifier pattern. Patterns only ever see identifier
//! tokens, so comments and string literals cannot trigger them.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::core::lexer::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    FeeVariables,
    FeeSetters,
    Exemptions,
    Blacklists,
    TradingControls,
    Limits,
    Ownership,
    Wallets,
    SwapMechanics,
    Reflection,
    Misc,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FeeVariables => "fee variables",
            Self::FeeSetters => "fee setters",
            Self::Exemptions => "exemptions",
            Self::Blacklists => "blacklists",
            Self::TradingControls => "trading controls",
            Self::Limits => "limits",
            Self::Ownership => "ownership",
            Self::Wallets => "wallets",
            Self::SwapMechanics => "swap mechanics",
            Self::Reflection => "reflection",
            Self::Misc => "misc",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChecklistItem {
    pub id: &'static str,
    pub category: Category,
    pub pattern: &'static str,
    pub question: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct ChecklistHit {
    pub id: String,
    pub category: String,
    pub question: String,
    pub occurrences: usize,
    pub first_line: u32,
}

macro_rules! item {
    ($id:literal, $cat:ident, $pattern:literal, $question:literal) => {
        ChecklistItem {
            id: $id,
            category: Category::$cat,
            pattern: $pattern,
            question: $question,
        }
    };
}

pub const CHECKLIST: [ChecklistItem; 40] = [
    // Fee variables
    item!("TX-01", FeeVariables, "fee", "Which variables hold fee rates, and who can change them?"),
    item!("TX-02", FeeVariables, "tax", "Which variables hold tax rates, and who can change them?"),
    item!("TX-03", FeeVariables, "buy.*(fee|tax)", "Is there a separate buy-side fee, and what is its initial value?"),
    item!("TX-04", FeeVariables, "sell.*(fee|tax)", "Is there a separate sell-side fee, and can it exceed the buy fee?"),
    item!("TX-05", FeeVariables, "transfer.*(fee|tax)", "Are plain wallet-to-wallet transfers taxed?"),
    item!("TX-06", FeeVariables, "^_?(take|calculate|get|remove|restore)(all)?.*(fee|tax)", "Which helpers compute or toggle fees inside the transfer path?"),
    item!("TX-07", FeeVariables, "denominator|divisor", "What denominator are fees divided by (100, 1000, 10000)?"),
    item!("TX-08", FeeVariables, "total.*fee|fee.*total", "Is the total fee the sum of its components, and is it capped?"),
    // Fee setters
    item!("TX-09", FeeSetters, "^_?set.*(fee|tax)", "Does every fee setter enforce an upper bound?"),
    item!("TX-10", FeeSetters, "^_?update.*(fee|tax)", "Does every fee update function enforce an upper bound?"),
    item!("TX-11", FeeSetters, "^_?(reduce|increase|change|adjust).*(fee|tax)", "Can fees be raised after launch, not only reduced?"),
    item!("TX-12", FeeSetters, "previous.*(fee|tax)", "Are fees saved and restored around special transfers?"),
    // Exemptions
    item!("TX-13", Exemptions, "exclude.*fee|excluded.*fee|isexcluded", "Which addresses are exempt from fees, and who can add to the list?"),
    item!("TX-14", Exemptions, "exempt", "Is there a generic exemption list, and what does it bypass?"),
    item!("TX-15", Exemptions, "whitelist", "Can the owner whitelist wallets to trade freely while others are taxed?"),
    item!("TX-16", Exemptions, "^_?include.*fee", "Can exempt addresses be re-included in fees?"),
    // Blacklists
    item!("TX-17", Blacklists, "blacklist|blocklist", "Can holders be blacklisted, and can the list block sells?"),
    item!("TX-18", Blacklists, "^_?(is|set|add|del|remove|block)?bots?$|^_?(set|add|del|remove|block)bots?", "Is there an anti-bot list that could trap ordinary holders?"),
    item!("TX-19", Blacklists, "sniper", "Are snipers detected, and what happens to flagged wallets?"),
    // Trading controls
    item!("TX-20", TradingControls, "trading(open|enabled|active)|(open|enable|start)trading", "Who can open or close trading, and can it be closed again?"),
    item!("TX-21", TradingControls, "launch(ed)?(at|block|time)", "Do fees or limits depend on blocks since launch?"),
    item!("TX-22", TradingControls, "deadblocks?", "Are buyers in the first blocks punished with extreme fees?"),
    item!("TX-23", TradingControls, "^_?(pause|paused|unpause)$", "Can transfers be paused?"),
    // Limits
    item!("TX-24", Limits, "maxtx|maxtransaction", "Is there a max transaction amount, and can it be set to zero?"),
    item!("TX-25", Limits, "maxwallet", "Is there a max wallet size, and can it trap holders?"),
    item!("TX-26", Limits, "cooldown", "Is there a per-address transfer cooldown?"),
    // Ownership
    item!("TX-27", Ownership, "^only(owner|admin|dev|operator)", "Which functions are owner-only, and what can they change?"),
    item!("TX-28", Ownership, "renounceownership", "Has ownership really been renounced, or can it be reclaimed?"),
    item!("TX-29", Ownership, "transferownership", "Can ownership be transferred to an unexpected address?"),
    item!("TX-30", Ownership, "previousowner|locktime|^_?lock$|^_?unlock$", "Is there a lock/unlock pattern that restores a previous owner?"),
    item!("TX-31", Ownership, "^_?owner$", "Where is the owner address stored, and is it shadowed?"),
    // Wallets
    item!("TX-32", Wallets, "(marketing|dev|team).*(wallet|address)|(fee|tax).*(wallet|receiver|recipient)", "Where does collected tax go, and can that wallet be changed?"),
    item!("TX-33", Wallets, "treasury", "Who controls the treasury that receives fees?"),
    // Swap mechanics
    item!("TX-34", SwapMechanics, "swapandliquify|swapback", "When does the contract sell collected tax, and who receives the proceeds?"),
    item!("TX-35", SwapMechanics, "swaptokensfor(eth|bnb)|supportingfeeontransfertokens", "Does the contract swap tokens for native currency on transfers?"),
    item!("TX-36", SwapMechanics, "swaptokensatamount|swapthreshold|numtokenssell", "Can the swap threshold be set so large sells fail?"),
    item!("TX-37", SwapMechanics, "uniswapv2pair|automatedmarketmaker|marketpair", "How are buys and sells told apart (pair detection)?"),
    // Reflection
    item!("TX-38", Reflection, "^_?r(owned|total)$|reflection", "Does the token use reflection accounting, and can exclusions break it?"),
    // Misc
    item!("TX-39", Misc, "^origin$", "Is tx.origin used to gate transfers?"),
    item!("TX-40", Misc, "^_?mint$", "Can new supply be minted after deployment?"),
];

lazy_static! {
    static ref PATTERNS: Vec<Regex> = CHECKLIST
        .iter()
        .map(|item| {
            // test_all_patterns_compile guards the table
            Regex::new(&format!("(?i){}", item.pattern)).unwrap_or_else(|_| never_matches())
        })
        .collect();
}

fn never_matches() -> Regex {
    // `$^` cannot match a non-empty identifier
    Regex::new("$^").unwrap_or_else(|e| panic!("static regex failed: {}", e))
}

/// Run every checklist item over the identifiers of a token stream
pub fn run_checklist(tokens: &[Token]) -> Vec<ChecklistHit> {
    CHECKLIST
        .iter()
        .zip(PATTERNS.iter())
        .filter_map(|(item, regex)| {
            let mut matching = tokens.iter().filter(|t| t.is_ident() && regex.is_match(&t.text));
            let first = matching.next()?;
            Some(ChecklistHit {
                id: item.id.to_string(),
                category: item.category.as_str().to_string(),
                question: item.question.to_string(),
                occurrences: 1 + matching.count(),
                first_line: first.line,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lexer::tokenize;

    #[test]
    fn test_all_patterns_compile() {
        for item in CHECKLIST.iter() {
            assert!(
                Regex::new(&format!("(?i){}", item.pattern)).is_ok(),
                "{} has a bad pattern",
                item.id
            );
        }
    }

    #[test]
    fn test_ids_unique_and_sequential() {
        for (i, item) in CHECKLIST.iter().enumerate() {
            assert_eq!(item.id, format!("TX-{:02}", i + 1));
        }
    }

    #[test]
    fn test_hits_in_table_order() {
        let tokens = tokenize(
            "function setSellFee(uint256 f) external onlyOwner { sellFee = f; }\n\
             mapping(address => bool) bots;",
        )
        .tokens;
        let hits = run_checklist(&tokens);
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["TX-01", "TX-04", "TX-09", "TX-18", "TX-27"]);
        let fee = &hits[0];
        assert_eq!(fee.occurrences, 2);
        assert_eq!(fee.first_line, 1);
        assert_eq!(hits[3].first_line, 2);
    }

    #[test]
    fn test_comments_and_strings_do_not_match() {
        let tokens = tokenize("// setFee blacklist\nstring s = \"maxWallet cooldown\";").tokens;
        assert!(run_checklist(&tokens).is_empty());
    }

    #[test]
    fn test_origin_only_matches_identifier() {
        let tokens = tokenize("require(tx.origin == msg.sender); uint originalSupply;").tokens;
        let hits = run_checklist(&tokens);
        let origin = hits.iter().find(|h| h.id == "TX-39").unwrap();
        assert_eq!(origin.occurrences, 1);
    }
}
