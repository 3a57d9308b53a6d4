//! Outline parser for Solidity
//!
//! Recovers contracts, state variables and function headers from the token
//! stream. Function bodies are kept as raw token slices; the feature
//! extractor pattern-matches over them instead of building a full AST.

use serde::{Deserialize, Serialize};

use crate::core::lexer::{Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractKind {
    Contract,
    Abstract,
    Library,
    Interface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionKind {
    Function,
    Constructor,
    Modifier,
    Receive,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    External,
    Internal,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mutability {
    NonPayable,
    Payable,
    View,
    Pure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub type_name: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateVar {
    pub name: String,
    pub type_name: String,
    pub is_constant: bool,
    pub initializer: Vec<Token>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub kind: FunctionKind,
    pub params: Vec<Param>,
    pub visibility: Visibility,
    pub mutability: Mutability,
    pub modifiers: Vec<String>,
    pub body: Vec<Token>,
    pub line: u32,
}

impl FunctionDef {
    /// Externally callable and able to change state
    pub fn is_state_changing_entry(&self) -> bool {
        self.kind == FunctionKind::Function
            && matches!(self.visibility, Visibility::Public | Visibility::External)
            && matches!(self.mutability, Mutability::NonPayable | Mutability::Payable)
            && !self.body.is_empty()
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().filter_map(|p| p.name.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContractDef {
    pub name: String,
    pub kind: ContractKind,
    pub bases: Vec<String>,
    pub state_vars: Vec<StateVar>,
    pub functions: Vec<FunctionDef>,
    pub line: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceUnit {
    pub pragma: Option<String>,
    pub contracts: Vec<ContractDef>,
}

const VISIBILITY_WORDS: [&str; 4] = ["public", "external", "internal", "private"];
const LOCATION_WORDS: [&str; 4] = ["memory", "storage", "calldata", "indexed"];
const VAR_ATTRIBUTES: [&str; 8] = [
    "public",
    "private",
    "internal",
    "external",
    "constant",
    "immutable",
    "override",
    "transient",
];

/// Index of the bracket closing the one at `open`
pub fn find_matching(tokens: &[Token], open: usize) -> Option<usize> {
    let (left, right) = match tokens.get(open)?.text.as_str() {
        "(" => ("(", ")"),
        "[" => ("[", "]"),
        "{" => ("{", "}"),
        _ => return None,
    };
    let mut depth = 0usize;
    for (i, tok) in tokens.iter().enumerate().skip(open) {
        if tok.kind != TokenKind::Punct {
            continue;
        }
        if tok.is(left) {
            depth += 1;
        } else if tok.is(right) {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Index of the next `target` at bracket depth zero, starting at `from`
fn find_at_depth_zero(tokens: &[Token], from: usize, targets: &[&str]) -> Option<usize> {
    let mut depth = 0i32;
    for (i, tok) in tokens.iter().enumerate().skip(from) {
        if tok.kind == TokenKind::Punct {
            if depth == 0 && targets.contains(&tok.text.as_str()) {
                return Some(i);
            }
            match tok.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth -= 1,
                _ => {}
            }
        } else if depth == 0 && targets.contains(&tok.text.as_str()) {
            return Some(i);
        }
    }
    None
}

/// Render tokens back into compact type text (`mapping(address=>bool)`)
pub fn join_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev_word = false;
    for tok in tokens {
        let word = tok.kind != TokenKind::Punct;
        if word && prev_word {
            out.push(' ');
        }
        out.push_str(&tok.text);
        prev_word = word;
    }
    out
}

/// Parse a token stream into contract outlines
pub fn parse(tokens: &[Token]) -> SourceUnit {
    let mut unit = SourceUnit::default();
    let mut i = 0;
    while i < tokens.len() {
        let tok = &tokens[i];
        if tok.is("pragma") {
            let end = find_at_depth_zero(tokens, i, &[";"]).unwrap_or(tokens.len());
            if unit.pragma.is_none() {
                unit.pragma = Some(join_tokens(&tokens[i + 1..end]));
            }
            i = end + 1;
            continue;
        }

        let kind = match tok.text.as_str() {
            "contract" => Some(ContractKind::Contract),
            "library" => Some(ContractKind::Library),
            "interface" => Some(ContractKind::Interface),
            "abstract" if tokens.get(i + 1).map_or(false, |t| t.is("contract")) => {
                i += 1;
                Some(ContractKind::Abstract)
            }
            _ => None,
        };

        match kind {
            Some(kind) if tok.is_ident() || tok.is("abstract") => {
                match parse_contract(tokens, i, kind) {
                    Some((contract, next)) => {
                        unit.contracts.push(contract);
                        i = next;
                    }
                    None => i += 1,
                }
            }
            _ => i += 1,
        }
    }
    unit
}

/// `at` points at the contract/library/interface keyword
fn parse_contract(tokens: &[Token], at: usize, kind: ContractKind) -> Option<(ContractDef, usize)> {
    let name_tok = tokens.get(at + 1).filter(|t| t.is_ident())?;
    let open = find_at_depth_zero(tokens, at + 2, &["{", ";"])?;
    if !tokens[open].is("{") {
        return None;
    }
    let close = find_matching(tokens, open).unwrap_or(tokens.len());

    let mut bases = Vec::new();
    let header = &tokens[at + 2..open];
    if header.first().map_or(false, |t| t.is("is")) {
        let mut expect_name = true;
        let mut depth = 0i32;
        for tok in &header[1..] {
            match tok.text.as_str() {
                "(" => depth += 1,
                ")" => depth -= 1,
                "," if depth == 0 => expect_name = true,
                _ if depth == 0 && expect_name && tok.is_ident() => {
                    bases.push(tok.text.clone());
                    expect_name = false;
                }
                _ => {}
            }
        }
    }

    let mut contract = ContractDef {
        name: name_tok.text.clone(),
        kind,
        bases,
        state_vars: Vec::new(),
        functions: Vec::new(),
        line: tokens[at].line,
    };
    let body_end = close.min(tokens.len());
    parse_members(&tokens[open + 1..body_end], &mut contract);
    Some((contract, body_end + 1))
}

fn parse_members(tokens: &[Token], contract: &mut ContractDef) {
    let mut i = 0;
    while i < tokens.len() {
        let tok = &tokens[i];
        let next = match tok.text.as_str() {
            "function" if tokens.get(i + 1).map_or(false, |t| t.is("(")) => {
                // function-typed state variable
                skip_statement(tokens, i)
            }
            "function" => parse_function(tokens, i, FunctionKind::Function, contract),
            "constructor" => parse_function(tokens, i, FunctionKind::Constructor, contract),
            "modifier" => parse_function(tokens, i, FunctionKind::Modifier, contract),
            "receive" if tokens.get(i + 1).map_or(false, |t| t.is("(")) => {
                parse_function(tokens, i, FunctionKind::Receive, contract)
            }
            "fallback" if tokens.get(i + 1).map_or(false, |t| t.is("(")) => {
                parse_function(tokens, i, FunctionKind::Fallback, contract)
            }
            "event" | "error" | "using" => skip_statement(tokens, i),
            "struct" | "enum" => match find_at_depth_zero(tokens, i, &["{"]) {
                Some(open) => find_matching(tokens, open).map_or(tokens.len(), |c| c + 1),
                None => tokens.len(),
            },
            ";" | "}" => i + 1,
            _ if tok.is_ident() => {
                let end = find_at_depth_zero(tokens, i, &[";"]).unwrap_or(tokens.len());
                if let Some(var) = parse_state_var(&tokens[i..end]) {
                    contract.state_vars.push(var);
                }
                end + 1
            }
            _ => i + 1,
        };
        i = next.max(i + 1);
    }
}

fn skip_statement(tokens: &[Token], at: usize) -> usize {
    find_at_depth_zero(tokens, at, &[";"]).map_or(tokens.len(), |e| e + 1)
}

fn parse_state_var(tokens: &[Token]) -> Option<StateVar> {
    let assign = tokens.iter().position(|t| t.is("="));
    let (lhs, initializer) = match assign {
        Some(eq) => (&tokens[..eq], tokens[eq + 1..].to_vec()),
        None => (tokens, Vec::new()),
    };

    let mut is_constant = false;
    let mut type_tokens = Vec::new();
    let mut name = None;
    let mut i = 0;
    while i < lhs.len() {
        let tok = &lhs[i];
        if VAR_ATTRIBUTES.contains(&tok.text.as_str()) {
            if tok.is("constant") {
                is_constant = true;
            }
            // override(A, B)
            if tok.is("override") && lhs.get(i + 1).map_or(false, |t| t.is("(")) {
                i = find_matching(lhs, i + 1).unwrap_or(lhs.len());
            }
        } else {
            type_tokens.push(tok.clone());
        }
        i += 1;
    }

    // The name is the last identifier; what precedes it is the type
    if type_tokens.last().map_or(false, |t| t.is_ident()) && type_tokens.len() >= 2 {
        name = type_tokens.pop().map(|t| t.text);
    }
    let name = name?;

    Some(StateVar {
        name,
        type_name: join_tokens(&type_tokens),
        is_constant,
        initializer,
        line: tokens.first().map_or(0, |t| t.line),
    })
}

/// `at` points at the introducing keyword; returns the index after the member
fn parse_function(
    tokens: &[Token],
    at: usize,
    kind: FunctionKind,
    contract: &mut ContractDef,
) -> usize {
    let line = tokens[at].line;
    let mut i = at + 1;
    let name = match kind {
        FunctionKind::Function | FunctionKind::Modifier => match tokens.get(i) {
            Some(t) if t.is_ident() => {
                i += 1;
                t.text.clone()
            }
            _ => return skip_statement(tokens, at),
        },
        FunctionKind::Constructor => "constructor".to_string(),
        FunctionKind::Receive => "receive".to_string(),
        FunctionKind::Fallback => "fallback".to_string(),
    };

    let mut params = Vec::new();
    if tokens.get(i).map_or(false, |t| t.is("(")) {
        let close = find_matching(tokens, i).unwrap_or(tokens.len());
        params = parse_params(&tokens[i + 1..close]);
        i = close + 1;
    }

    let mut visibility = match kind {
        FunctionKind::Receive | FunctionKind::Fallback => Visibility::External,
        FunctionKind::Modifier => Visibility::Internal,
        _ => Visibility::Public,
    };
    let mut mutability = Mutability::NonPayable;
    let mut modifiers = Vec::new();

    while i < tokens.len() && !tokens[i].is("{") && !tokens[i].is(";") {
        let tok = &tokens[i];
        let text = tok.text.as_str();
        if VISIBILITY_WORDS.contains(&text) {
            visibility = match text {
                "external" => Visibility::External,
                "internal" => Visibility::Internal,
                "private" => Visibility::Private,
                _ => Visibility::Public,
            };
        } else if text == "view" || text == "constant" {
            mutability = Mutability::View;
        } else if text == "pure" {
            mutability = Mutability::Pure;
        } else if text == "payable" {
            mutability = Mutability::Payable;
        } else if text == "returns" || text == "override" || text == "virtual" {
            // grouped arguments are skipped below
        } else if tok.is_ident() {
            modifiers.push(tok.text.clone());
        }

        if tokens.get(i + 1).map_or(false, |t| t.is("(")) {
            i = find_matching(tokens, i + 1).unwrap_or(tokens.len());
        }
        i += 1;
    }

    let (body, next) = match tokens.get(i) {
        Some(t) if t.is("{") => {
            let close = find_matching(tokens, i).unwrap_or(tokens.len());
            (tokens[i + 1..close.min(tokens.len())].to_vec(), close + 1)
        }
        _ => (Vec::new(), i + 1),
    };

    contract.functions.push(FunctionDef {
        name,
        kind,
        params,
        visibility,
        mutability,
        modifiers,
        body,
        line,
    });
    next
}

fn parse_params(tokens: &[Token]) -> Vec<Param> {
    if tokens.is_empty() {
        return Vec::new();
    }
    let mut params = Vec::new();
    let mut start = 0;
    loop {
        let end = find_at_depth_zero(tokens, start, &[","]).unwrap_or(tokens.len());
        let mut parts: Vec<Token> = tokens[start..end]
            .iter()
            .filter(|t| !LOCATION_WORDS.contains(&t.text.as_str()))
            .cloned()
            .collect();
        let named = parts.last().map_or(false, |t| t.is_ident() && !t.is("payable"));
        let name = if parts.len() >= 2 && named {
            parts.pop().map(|t| t.text)
        } else {
            None
        };
        if !parts.is_empty() {
            params.push(Param {
                type_name: join_tokens(&parts),
                name,
            });
        }
        if end >= tokens.len() {
            break;
        }
        start = end + 1;
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lexer::tokenize;

    const SOURCE: &str = r#"
        pragma solidity ^0.8.19;

        interface IERC20 {
            function transfer(address to, uint256 amount) external returns (bool);
        }

        abstract contract Base {
            address internal _owner;
            modifier onlyOwner() { require(msg.sender == _owner, "not owner"); _; }
        }

        contract Token is Base, IERC20 {
            struct Fees { uint256 buy; uint256 sell; }
            event FeeChanged(uint256 fee);
            uint256 public constant MAX_FEE = 10;
            uint256 public taxFee = 5;
            mapping(address => bool) private _isExcludedFromFee;
            address payable public marketingWallet;

            constructor() { _owner = msg.sender; }

            function setTaxFee(uint256 fee) external onlyOwner {
                require(fee <= MAX_FEE, "too high");
                taxFee = fee;
            }

            function transfer(address to, uint256 amount) external override returns (bool) {
                return true;
            }

            function balanceOf(address account) public view returns (uint256) { return 0; }

            receive() external payable {}
        }
    "#;

    fn unit() -> SourceUnit {
        parse(&tokenize(SOURCE).tokens)
    }

    #[test]
    fn test_contracts_and_kinds() {
        let unit = unit();
        assert_eq!(unit.pragma.as_deref(), Some("solidity^0.8.19"));
        let names: Vec<_> = unit.contracts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["IERC20", "Base", "Token"]);
        assert_eq!(unit.contracts[0].kind, ContractKind::Interface);
        assert_eq!(unit.contracts[1].kind, ContractKind::Abstract);
        assert_eq!(unit.contracts[2].bases, vec!["Base", "IERC20"]);
    }

    #[test]
    fn test_state_vars() {
        let unit = unit();
        let token = &unit.contracts[2];
        let vars: Vec<_> = token.state_vars.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(vars, vec!["MAX_FEE", "taxFee", "_isExcludedFromFee", "marketingWallet"]);
        assert!(token.state_vars[0].is_constant);
        assert_eq!(token.state_vars[1].initializer[0].text, "5");
        assert_eq!(token.state_vars[2].type_name, "mapping(address=>bool)");
        assert_eq!(token.state_vars[3].type_name, "address payable");
    }

    #[test]
    fn test_functions() {
        let unit = unit();
        let token = &unit.contracts[2];
        let names: Vec<_> = token.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["constructor", "setTaxFee", "transfer", "balanceOf", "receive"]);

        let setter = &token.functions[1];
        assert_eq!(setter.visibility, Visibility::External);
        assert_eq!(setter.modifiers, vec!["onlyOwner"]);
        assert_eq!(setter.params[0].name.as_deref(), Some("fee"));
        assert!(setter.is_state_changing_entry());
        assert!(setter.body.iter().any(|t| t.is("require")));

        let view = &token.functions[3];
        assert_eq!(view.mutability, Mutability::View);
        assert!(!view.is_state_changing_entry());

        assert_eq!(token.functions[4].kind, FunctionKind::Receive);
    }

    #[test]
    fn test_interface_functions_have_no_body() {
        let unit = unit();
        let iface = &unit.contracts[0];
        assert_eq!(iface.functions.len(), 1);
        assert!(iface.functions[0].body.is_empty());
    }

    #[test]
    fn test_modifier_parsed() {
        let unit = unit();
        let base = &unit.contracts[1];
        assert_eq!(base.functions[0].kind, FunctionKind::Modifier);
        assert_eq!(base.functions[0].name, "onlyOwner");
    }

    #[test]
    fn test_no_contract() {
        let unit = parse(&tokenize("pragma solidity 0.8.0; // nothing").tokens);
        assert!(unit.contracts.is_empty());
    }
}
