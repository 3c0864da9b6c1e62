#![deny(unreachable_pub)]
#![deny(elided_lifetimes_in_paths)]

//! Parser for stencil templates.
//!
//! Parsing happens in two layers. [`node::Document::parse`] splits a source
//! string into literal text and delimited chunks, producing a token tree of
//! [`node::Node`] values. Each variable or tag argument fragment is handed to
//! the [`lexer`] and then to the [`expr::TokenParser`], which turns the flat
//! token stream into an [`expr::Expr`].
//!
//! The parser knows nothing about rendering. Tag vocabularies, filter tables
//! and file loading are injected through the [`TagSet`], [`FilterSet`] and
//! [`ParseHost`] traits so that the engine crate stays in charge of them.

pub mod expr;
pub mod lexer;
pub mod node;

pub use expr::{fmt_num, unquote, ArgHooks, BinOp, Expr, HookAction, StateKind, TokenParser};
pub use lexer::{read, Token, TokenKind};
pub use node::{Arg, Document, MacroDef, Node, ParseSettings, TagNode};

use std::error::Error as StdError;
use std::fmt;

/// Delimiter configuration for a template dialect.
///
/// Every delimiter must be at least two characters, and the opening and
/// closing markers of a pair must differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    pub expr_start: String,
    pub expr_end: String,
    pub block_start: String,
    pub block_end: String,
    pub comment_start: String,
    pub comment_end: String,
}

impl Default for Syntax {
    fn default() -> Self {
        Self {
            expr_start: "{{".into(),
            expr_end: "}}".into(),
            block_start: "{%".into(),
            block_end: "%}".into(),
            comment_start: "{#".into(),
            comment_end: "#}".into(),
        }
    }
}

impl Syntax {
    pub fn validate(&self) -> Result<(), ParseError> {
        let pairs = [
            ("variable", &self.expr_start, &self.expr_end),
            ("tag", &self.block_start, &self.block_end),
            ("comment", &self.comment_start, &self.comment_end),
        ];
        for (what, open, close) in pairs {
            if open.chars().count() < 2 || close.chars().count() < 2 {
                return Err(ParseError::new(
                    format!("Option \"{what}\" open and close controls must be at least 2 characters"),
                    None,
                    None,
                ));
            }
            if open == close {
                return Err(ParseError::new(
                    format!("Option \"{what}\" open and close controls must not match"),
                    None,
                    None,
                ));
            }
        }
        Ok(())
    }
}

/// Escaping mode applied to variable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoEscape {
    #[default]
    Html,
    Js,
    Off,
}

/// A parse failure, annotated with the line and file it occurred in when
/// those are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    msg: String,
    line: Option<usize>,
    file: Option<String>,
}

impl ParseError {
    pub fn new(msg: impl Into<String>, line: Option<usize>, file: Option<&str>) -> Self {
        Self {
            msg: msg.into(),
            line,
            file: file.map(str::to_owned),
        }
    }

    pub fn message(&self) -> &str {
        &self.msg
    }

    pub fn line(&self) -> Option<usize> {
        self.line
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)?;
        if let Some(line) = self.line {
            write!(f, " on line {line}")?;
        }
        if let Some(file) = &self.file {
            write!(f, " in file {file}")?;
        }
        f.write_str(".")
    }
}

impl StdError for ParseError {}

/// Parsed form of a tag invocation, as returned by a tag's argument parser.
#[derive(Debug, Clone, PartialEq)]
pub struct TagMeta {
    pub args: Vec<Arg>,
    /// Whether the tag opens a body that runs until a matching `end` tag.
    pub ends: bool,
    /// Whether a top-level occurrence registers into the document block map.
    pub block_level: bool,
}

/// Filter table surface needed while parsing expressions.
pub trait FilterSet {
    fn has_filter(&self, name: &str) -> bool;
    /// Safe filters suppress auto-escaping of the whole expression.
    fn is_safe(&self, name: &str) -> bool;
}

/// Tag vocabulary. `parse_tag` returns `None` for unknown tag names.
pub trait TagSet {
    fn parse_tag(
        &self,
        name: &str,
        parser: &mut TokenParser<'_>,
        ctx: &mut TagContext<'_>,
    ) -> Option<Result<TagMeta, ParseError>>;
}

/// Gives tag argument parsers access to other template files, used by
/// `import` to pull macro definitions out of a sibling template.
pub trait ParseHost {
    fn parse_file(&self, path: &str, from: Option<&str>) -> Result<Document, ParseError>;
}

/// Context handed to a tag's argument parser.
pub struct TagContext<'a> {
    pub line: usize,
    pub filename: Option<String>,
    /// Name of the innermost unclosed tag, if any.
    pub open_tag: Option<String>,
    /// The document's default escaping mode.
    pub autoescape: AutoEscape,
    pub host: &'a dyn ParseHost,
}
