//! Tokenizer for expression fragments.
//!
//! [`read`] splits the text between variable/tag delimiters into a flat
//! stream of typed tokens. Rules are tried in a fixed priority order against
//! the remaining suffix of the input; the first rule with a matching pattern
//! wins. The rule order is load-bearing: `STRING` must come before `VAR`,
//! `FILTER` before `FILTEREMPTY` before `LOGIC`, and the word aliases
//! (`and`, `gte`, `not`, ...) before the generic identifier rule.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Whitespace,
    Str,
    Filter,
    FilterEmpty,
    Function,
    FunctionEmpty,
    ParenOpen,
    ParenClose,
    Comma,
    Var,
    Number,
    Operator,
    BracketOpen,
    BracketClose,
    DotKey,
    /// Nesting state for an array literal; never produced by the lexer.
    ArrayOpen,
    CurlyOpen,
    CurlyClose,
    Colon,
    Comparator,
    Logic,
    Not,
    Bool,
    Assignment,
    /// Nesting state for a method call; never produced by the lexer.
    MethodOpen,
    Unknown,
}

/// A single lexed token.
///
/// `text` is the normalized match (trailing whitespace stripped, aliases
/// replaced), while `len` is the number of characters the rule consumed from
/// the original input. Summing `len` over a whole read reconstructs the
/// input length exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub kind: TokenKind,
    pub len: usize,
}

struct Rule {
    kind: TokenKind,
    patterns: Vec<Regex>,
    /// Capture group holding the token text; 0 is the whole match.
    idx: usize,
    replace: &'static [(&'static str, &'static str)],
}

impl Rule {
    fn new(kind: TokenKind, patterns: &[&str]) -> Self {
        Self {
            kind,
            patterns: patterns.iter().map(|p| Regex::new(p).unwrap()).collect(),
            idx: 0,
            replace: &[],
        }
    }

    fn idx(mut self, idx: usize) -> Self {
        self.idx = idx;
        self
    }

    fn replace(mut self, table: &'static [(&'static str, &'static str)]) -> Self {
        self.replace = table;
        self
    }
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new(TokenKind::Whitespace, &[r"^\s+"]),
        Rule::new(
            TokenKind::Str,
            &[r#"^"""#, r#"^".*?[^\\]""#, r"^''", r"^'.*?[^\\]'"],
        ),
        Rule::new(TokenKind::Filter, &[r"^\|\s*(\w+)\("]).idx(1),
        Rule::new(TokenKind::FilterEmpty, &[r"^\|\s*(\w+)"]).idx(1),
        Rule::new(TokenKind::FunctionEmpty, &[r"^\s*(\w+)\(\)"]).idx(1),
        Rule::new(TokenKind::Function, &[r"^\s*(\w+)\("]).idx(1),
        Rule::new(TokenKind::ParenOpen, &[r"^\("]),
        Rule::new(TokenKind::ParenClose, &[r"^\)"]),
        Rule::new(TokenKind::Comma, &[r"^,"]),
        Rule::new(TokenKind::Logic, &[r"^(&&|\|\|)\s*", r"^(and|or)\s+"])
            .idx(1)
            .replace(&[("and", "&&"), ("or", "||")]),
        Rule::new(
            TokenKind::Comparator,
            &[r"^(===|==|!==|!=|<=|<|>=|>|in\s|gte\s|gt\s|lte\s|lt\s)\s*"],
        )
        .idx(1)
        .replace(&[("gte", ">="), ("gt", ">"), ("lte", "<="), ("lt", "<")]),
        Rule::new(TokenKind::Assignment, &[r"^(=|\+=|-=|\*=|/=)"]),
        Rule::new(TokenKind::Not, &[r"^!\s*", r"^not\s+"]).replace(&[("not", "!")]),
        Rule::new(TokenKind::Bool, &[r"^(true|false)\s+", r"^(true|false)$"]).idx(1),
        Rule::new(TokenKind::Var, &[r"^[a-zA-Z_$]\w*((\.\$?\w*)+)?", r"^[a-zA-Z_$]\w*"]),
        Rule::new(TokenKind::BracketOpen, &[r"^\["]),
        Rule::new(TokenKind::BracketClose, &[r"^\]"]),
        Rule::new(TokenKind::CurlyOpen, &[r"^\{"]),
        Rule::new(TokenKind::Colon, &[r"^:"]),
        Rule::new(TokenKind::CurlyClose, &[r"^\}"]),
        Rule::new(TokenKind::DotKey, &[r"^\.(\w+)"]).idx(1),
        Rule::new(TokenKind::Number, &[r"^[+\-]?\d+(\.\d+)?"]),
        Rule::new(TokenKind::Operator, &[r"^(\+|-|/|\*|%)"]),
    ]
});

/// Lexes a single token off the front of `s`.
fn reader(s: &str) -> Token {
    for rule in RULES.iter() {
        for pattern in &rule.patterns {
            let Some(caps) = pattern.captures(s) else {
                continue;
            };
            let whole = caps.get(0).unwrap().as_str();
            let captured = caps
                .get(rule.idx)
                .map(|m| m.as_str())
                .unwrap_or(whole);
            let mut text = captured.trim_end().to_string();
            if let Some((_, to)) = rule.replace.iter().find(|(from, _)| *from == text) {
                text = (*to).to_string();
            }
            return Token {
                text,
                kind: rule.kind,
                len: whole.chars().count(),
            };
        }
    }

    // No rule matched: swallow the rest as a single UNKNOWN token so the
    // read always terminates. The expression parser rejects it later.
    Token {
        text: s.to_string(),
        kind: TokenKind::Unknown,
        len: s.chars().count(),
    }
}

/// Breaks an expression fragment into tokens, left to right, with no gaps.
pub fn read(s: &str) -> Vec<Token> {
    let chars: Vec<char> = s.chars().collect();
    let mut offset = 0;
    let mut tokens = Vec::new();

    while offset < chars.len() {
        let rest: String = chars[offset..].iter().collect();
        let token = reader(&rest);
        debug_assert!(token.len >= 1);
        offset += token.len.max(1);
        tokens.push(token);
    }

    tokens
}
