//! Solidity tokenizer
//!
//! Produces a flat token stream with line numbers. Comments vanish, string
//! and hex/unicode literals collapse into a single `Str` token, so nothing
//! inside them is ever seen as code by later stages.
//!
//! Unterminated comments and strings are recoverable: the construct is
//! closed at end of input and a diagnostic is recorded.

use serde::{Deserialize, Serialize};

use crate::models::errors::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Punct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
}

impl Token {
    #[inline]
    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }

    #[inline]
    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        self.kind == TokenKind::Number
    }
}

/// Recoverable lexer problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub line: u32,
    pub message: String,
}

impl Diagnostic {
    fn new(code: ErrorCode, line: u32, message: &str) -> Self {
        Self {
            code: code.as_str().to_string(),
            line,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Multi-character operators, longest first
const OPERATORS: [&str; 29] = [
    ">>>=", "<<=", ">>=", ">>>", "**", "==", "!=", "<=", ">=", "&&", "||", "++", "--", "+=",
    "-=", "*=", "/=", "%=", "|=", "&=", "^=", "=>", "<<", ">>", "->", ":=", "...", "..", "::",
];

struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    out: &'a mut Lexed,
}

/// Tokenize Solidity source text
pub fn tokenize(source: &str) -> Lexed {
    let mut out = Lexed::default();
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        out: &mut out,
    };
    lexer.run();
    out
}

impl<'a> Lexer<'a> {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind, text: String, line: u32) {
        self.out.tokens.push(Token { kind, text, line });
    }

    fn run(&mut self) {
        while let Some(c) = self.peek(0) {
            match c {
                '\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                c if c.is_whitespace() => self.pos += 1,
                '/' if self.peek(1) == Some('/') => self.skip_line_comment(),
                '/' if self.peek(1) == Some('*') => self.skip_block_comment(),
                '"' | '\'' => {
                    let line = self.line;
                    let text = self.read_string(c);
                    self.push(TokenKind::Str, text, line);
                }
                c if is_ident_start(c) => self.read_ident(),
                c if c.is_ascii_digit() => self.read_number(),
                '.' if self.peek(1).map_or(false, |n| n.is_ascii_digit()) => self.read_number(),
                _ => self.read_punct(),
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) {
        let start = self.line;
        self.pos += 2;
        loop {
            match self.peek(0) {
                None => {
                    self.out.diagnostics.push(Diagnostic::new(
                        ErrorCode::ParseUnterminatedComment,
                        start,
                        "block comment is never closed",
                    ));
                    return;
                }
                Some('*') if self.peek(1) == Some('/') => {
                    self.pos += 2;
                    return;
                }
                Some('\n') => {
                    self.line += 1;
                    self.pos += 1;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Reads a quoted literal, returning its contents without quotes
    fn read_string(&mut self, quote: char) -> String {
        let start = self.line;
        self.pos += 1;
        let mut text = String::new();
        loop {
            match self.peek(0) {
                None | Some('\n') => {
                    self.out.diagnostics.push(Diagnostic::new(
                        ErrorCode::ParseUnterminatedString,
                        start,
                        "string literal is never closed",
                    ));
                    return text;
                }
                Some('\\') => {
                    if let Some(next) = self.peek(1) {
                        text.push(next);
                        if next == '\n' {
                            self.line += 1;
                        }
                    }
                    self.pos += 2;
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return text;
                }
                Some(c) => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn read_ident(&mut self) {
        let line = self.line;
        let start = self.pos;
        while self.peek(0).map_or(false, is_ident_part) {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        // hex"..." and unicode"..." are string literals
        if (word == "hex" || word == "unicode") && matches!(self.peek(0), Some('"' | '\'')) {
            let quote = self.peek(0).unwrap_or('"');
            let text = self.read_string(quote);
            self.push(TokenKind::Str, text, line);
            return;
        }

        self.push(TokenKind::Ident, word, line);
    }

    fn read_number(&mut self) {
        let line = self.line;
        let start = self.pos;
        if self.peek(0) == Some('0') && matches!(self.peek(1), Some('x' | 'X')) {
            self.pos += 2;
            while self.peek(0).map_or(false, |c| c.is_ascii_hexdigit() || c == '_') {
                self.pos += 1;
            }
        } else {
            while let Some(c) = self.peek(0) {
                let exponent_sign = (c == '-' || c == '+')
                    && matches!(self.chars.get(self.pos.wrapping_sub(1)), Some('e' | 'E'));
                if c.is_ascii_digit() || c == '_' || c == 'e' || c == 'E' || exponent_sign {
                    self.pos += 1;
                } else if c == '.' && self.peek(1).map_or(false, |n| n.is_ascii_digit()) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        self.push(TokenKind::Number, text, line);
    }

    fn read_punct(&mut self) {
        let line = self.line;
        for op in OPERATORS {
            let len = op.chars().count();
            if self.pos + len <= self.chars.len()
                && self.chars[self.pos..self.pos + len].iter().copied().eq(op.chars())
            {
                self.pos += len;
                self.push(TokenKind::Punct, op.to_string(), line);
                return;
            }
        }
        let c = self.chars[self.pos];
        self.pos += 1;
        self.push(TokenKind::Punct, c.to_string(), line);
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Parse a Solidity numeric literal (`1_000`, `0x64`, `1e18`, `2.5e3`)
pub fn parse_number(text: &str) -> Option<f64> {
    let clean: String = text.chars().filter(|c| *c != '_').collect();
    if let Some(hex) = clean.strip_prefix("0x").or_else(|| clean.strip_prefix("0X")) {
        return u128::from_str_radix(hex, 16).ok().map(|v| v as f64);
    }
    clean.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(source: &str) -> Vec<String> {
        tokenize(source).tokens.into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_basic_tokens() {
        let toks = texts("uint256 public fee = 5;");
        assert_eq!(toks, vec!["uint256", "public", "fee", "=", "5", ";"]);
    }

    #[test]
    fn test_comments_removed() {
        let lexed = tokenize("// setFee(100)\n/* blacklist\n bots */ uint x;");
        let toks: Vec<_> = lexed.tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(toks, vec!["uint", "x", ";"]);
        assert_eq!(lexed.tokens[0].line, 3);
        assert!(lexed.diagnostics.is_empty());
    }

    #[test]
    fn test_strings_are_single_tokens() {
        let lexed = tokenize(r#"require(ok, "setFee blacklist");"#);
        let s = lexed.tokens.iter().find(|t| t.kind == TokenKind::Str).unwrap();
        assert_eq!(s.text, "setFee blacklist");
        assert!(!lexed.tokens.iter().any(|t| t.is("setFee")));
    }

    #[test]
    fn test_hex_string_literal() {
        let lexed = tokenize("bytes x = hex\"deadbeef\";");
        assert!(lexed.tokens.iter().any(|t| t.kind == TokenKind::Str && t.text == "deadbeef"));
        assert!(!lexed.tokens.iter().any(|t| t.is("hex")));
    }

    #[test]
    fn test_operators() {
        let toks = texts("a >>= 1; b <= c; mapping(address => bool) m; x ** 2;");
        assert!(toks.contains(&">>=".to_string()));
        assert!(toks.contains(&"<=".to_string()));
        assert!(toks.contains(&"=>".to_string()));
        assert!(toks.contains(&"**".to_string()));
    }

    #[test]
    fn test_numbers() {
        let toks = texts("x = 1_000 + 0xFF + 1e18 + 2.5e3;");
        assert!(toks.contains(&"1_000".to_string()));
        assert!(toks.contains(&"0xFF".to_string()));
        assert!(toks.contains(&"1e18".to_string()));
        assert!(toks.contains(&"2.5e3".to_string()));
        assert_eq!(parse_number("1_000"), Some(1000.0));
        assert_eq!(parse_number("0xFF"), Some(255.0));
        assert_eq!(parse_number("2.5e3"), Some(2500.0));
    }

    #[test]
    fn test_unterminated_comment_recovers() {
        let lexed = tokenize("uint a; /* never closed");
        assert_eq!(lexed.tokens.len(), 3);
        assert_eq!(lexed.diagnostics.len(), 1);
        assert_eq!(lexed.diagnostics[0].code, "PARSE_UNTERMINATED_COMMENT");
    }

    #[test]
    fn test_unterminated_string_recovers() {
        let lexed = tokenize("string s = \"oops\nuint b;");
        assert_eq!(lexed.diagnostics[0].code, "PARSE_UNTERMINATED_STRING");
        assert!(lexed.tokens.iter().any(|t| t.is("b") && t.line == 2));
    }
}
