//! Expression parsing.
//!
//! [`TokenParser`] consumes the token stream of a single variable or tag
//! argument fragment and builds an [`Expr`] tree. It runs a state stack of
//! [`StateKind`] entries that mirrors open nesting constructs, plus a
//! parallel frame stack collecting the operands of whichever construct is
//! currently open. Operators are gathered flat per frame and assembled into
//! a tree with JavaScript precedence once the frame closes.
//!
//! Auto-escaping happens here: unless a safe filter or a function call was
//! seen, the finished expression is wrapped in the `e` filter.

use crate::lexer::{Token, TokenKind};
use crate::{AutoEscape, FilterSet, ParseError};

/// Variable names that may not start a path expression.
const RESERVED: &[&str] = &[
    "break", "case", "catch", "continue", "debugger", "default", "delete", "do", "else",
    "finally", "for", "function", "if", "in", "instanceof", "new", "return", "switch", "this",
    "throw", "try", "typeof", "var", "void", "while", "with",
];

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Str(String),
    Num(f64),
    Bool(bool),
    /// Dotted lookup path, resolved with safe navigation at render time.
    Path(Vec<String>),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    /// `base[index]` with a computed index.
    Index(Box<Expr>, Box<Expr>),
    /// `.key` applied to a non-path operand, e.g. `(a|first).name`.
    Attr(Box<Expr>, String),
    /// Filter application; the first argument is the piped input.
    Filter(String, Vec<Expr>),
    /// Named call, resolved against macros, then engine functions.
    FnCall(String, Vec<Expr>),
    /// `a.b.c(args)`; the full dotted path including the method name.
    MethodCall(Vec<String>, Vec<Expr>),
    /// Call of a computed value, e.g. `(x)(1)` or `a[0](1)`.
    CallValue(Box<Expr>, Vec<Expr>),
    Not(Box<Expr>),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq
            | BinOp::Ne
            | BinOp::StrictEq
            | BinOp::StrictNe
            | BinOp::Gt
            | BinOp::Gte
            | BinOp::Lt
            | BinOp::Lte
            | BinOp::In => 3,
            BinOp::Add | BinOp::Sub => 4,
            BinOp::Mul | BinOp::Div | BinOp::Mod => 5,
        }
    }

    fn from_text(text: &str) -> Option<Self> {
        Some(match text {
            "||" => BinOp::Or,
            "&&" => BinOp::And,
            "===" => BinOp::StrictEq,
            "!==" => BinOp::StrictNe,
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            ">=" => BinOp::Gte,
            ">" => BinOp::Gt,
            "<=" => BinOp::Lte,
            "<" => BinOp::Lt,
            "in" => BinOp::In,
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "%" => BinOp::Mod,
            _ => return None,
        })
    }
}

/// Open nesting constructs tracked while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    ParenOpen,
    Function,
    Filter,
    BracketOpen,
    ArrayOpen,
    CurlyOpen,
    Colon,
    MethodOpen,
}

#[derive(Debug, Clone)]
enum Piece {
    Operand(Expr),
    Op(BinOp),
    Not,
}

#[derive(Debug)]
enum FrameKind {
    Root,
    Group,
    Filter { name: String },
    Function { name: String },
    Method { path: Vec<String> },
    CallValue { callee: Expr },
    Array,
    Object,
    Index { base: Expr },
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    pieces: Vec<Piece>,
    args: Vec<Expr>,
    entries: Vec<(String, Expr)>,
    pending_key: Option<String>,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            pieces: Vec::new(),
            args: Vec::new(),
            entries: Vec::new(),
            pending_key: None,
        }
    }
}

/// Decision returned by an [`ArgHooks`] callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    /// The hook handled the token; the default machinery never sees it.
    Consumed,
    /// Fall through to the default expression machinery.
    Default,
}

/// Interception hooks for tag argument parsing.
///
/// A tag can observe every significant token before the default expression
/// machinery runs, consuming the ones it understands and rejecting the ones
/// it does not.
pub trait ArgHooks {
    fn on_token(
        &mut self,
        token: &Token,
        line: usize,
        file: Option<&str>,
    ) -> Result<HookAction, ParseError>;
}

pub struct TokenParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    state: Vec<StateKind>,
    frames: Vec<Frame>,
    filters: &'a dyn FilterSet,
    escape: AutoEscape,
    line: usize,
    file: Option<&'a str>,
    prev: Option<TokenKind>,
}

impl<'a> TokenParser<'a> {
    pub fn new(
        tokens: Vec<Token>,
        filters: &'a dyn FilterSet,
        escape: AutoEscape,
        line: usize,
        file: Option<&'a str>,
    ) -> Self {
        Self {
            tokens,
            pos: 0,
            state: Vec::new(),
            frames: vec![Frame::new(FrameKind::Root)],
            filters,
            escape,
            line,
            file,
            prev: None,
        }
    }

    /// Parses the whole stream as a variable expression, applying the
    /// auto-escape wrap unless a safe filter or function call disabled it.
    pub fn parse(mut self) -> Result<Expr, ParseError> {
        self.run(None)?;
        self.finish(true)
    }

    /// Parses all remaining tokens as a plain expression. Used by tag
    /// argument parsers after they have consumed their leading tokens.
    pub fn parse_rest(&mut self) -> Result<Expr, ParseError> {
        self.run(None)?;
        self.finish(false)
    }

    /// Like [`parse_rest`](Self::parse_rest), but each significant token is
    /// offered to `hooks` first.
    pub fn parse_rest_with(&mut self, hooks: &mut dyn ArgHooks) -> Result<Expr, ParseError> {
        self.run(Some(hooks))?;
        self.finish(false)
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn file(&self) -> Option<&str> {
        self.file
    }

    pub fn filters(&self) -> &dyn FilterSet {
        self.filters
    }

    /// True when no significant tokens remain.
    pub fn at_end(&self) -> bool {
        self.tokens[self.pos..]
            .iter()
            .all(|t| t.kind == TokenKind::Whitespace)
    }

    /// Peeks at the next significant token without consuming it.
    pub fn peek(&self) -> Option<&Token> {
        self.tokens[self.pos..]
            .iter()
            .find(|t| t.kind != TokenKind::Whitespace)
    }

    /// Consumes and returns the next significant token.
    pub fn next_significant(&mut self) -> Option<Token> {
        while self.pos < self.tokens.len() {
            let token = self.tokens[self.pos].clone();
            self.pos += 1;
            if token.kind != TokenKind::Whitespace {
                return Some(token);
            }
        }
        None
    }

    /// Consumes the next significant token, requiring the given kind.
    pub fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        match self.next_significant() {
            Some(token) if token.kind == kind => Ok(token),
            Some(token) => Err(self.err(format!(
                "Expected {what} but found \"{}\"",
                token.text
            ))),
            None => Err(self.err(format!("Expected {what} but found end of tag"))),
        }
    }

    /// Removes and returns all remaining tokens.
    pub fn take_rest(&mut self) -> Vec<Token> {
        self.tokens.split_off(self.pos)
    }

    /// Builds a fresh parser over `tokens` sharing this parser's filter
    /// table and error position.
    pub fn subparser(&self, tokens: Vec<Token>) -> TokenParser<'a> {
        TokenParser::new(tokens, self.filters, AutoEscape::Off, self.line, self.file)
    }

    pub fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError::new(msg, Some(self.line), self.file)
    }

    fn unable(&self) -> ParseError {
        let text: Vec<&str> = self.tokens.iter().map(|t| t.text.as_str()).collect();
        self.err(format!("Unable to parse \"{}\"", text.join(" ")))
    }

    fn run(&mut self, mut hooks: Option<&mut dyn ArgHooks>) -> Result<(), ParseError> {
        while self.pos < self.tokens.len() {
            let token = self.tokens[self.pos].clone();
            self.pos += 1;
            if token.kind == TokenKind::Whitespace {
                continue;
            }
            if let Some(hooks) = hooks.as_deref_mut() {
                if hooks.on_token(&token, self.line, self.file)? == HookAction::Consumed {
                    continue;
                }
            }
            self.feed(&token)?;
        }
        Ok(())
    }

    fn finish(&mut self, autoescape: bool) -> Result<Expr, ParseError> {
        if !self.state.is_empty() || self.frames.len() != 1 {
            return Err(self.unable());
        }
        let root = self.frames.pop().unwrap_or_else(|| Frame::new(FrameKind::Root));
        self.frames.push(Frame::new(FrameKind::Root));
        let mut expr = assemble(root.pieces).ok_or_else(|| self.unable())?;
        if autoescape {
            match self.escape {
                AutoEscape::Off => {}
                AutoEscape::Html => expr = Expr::Filter("e".into(), vec![expr]),
                AutoEscape::Js => {
                    expr = Expr::Filter("e".into(), vec![expr, Expr::Str("js".into())])
                }
            }
        }
        Ok(expr)
    }

    fn cur(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack underflow")
    }

    fn operand(&mut self, expr: Expr) {
        self.cur().pieces.push(Piece::Operand(expr));
    }

    fn pop_operand(&mut self) -> Option<Expr> {
        let frame = self.cur();
        match frame.pieces.last() {
            Some(Piece::Operand(_)) => match frame.pieces.pop() {
                Some(Piece::Operand(e)) => Some(e),
                _ => None,
            },
            _ => None,
        }
    }

    fn feed(&mut self, token: &Token) -> Result<(), ParseError> {
        // A method-open marker lives for exactly one token.
        if self.state.last() == Some(&StateKind::MethodOpen) {
            self.state.pop();
        }

        let text = token.text.as_str();
        match token.kind {
            TokenKind::Whitespace => return Ok(()),

            TokenKind::Str => self.operand(Expr::Str(unescape(unquote(text)))),

            TokenKind::Number => {
                // The lexer folds an explicit sign into the number, so
                // `a -1` arrives as two adjacent operands. Re-split it.
                let after_operand =
                    matches!(self.cur().pieces.last(), Some(Piece::Operand(_)));
                let (value, op) = if after_operand && text.starts_with('-') {
                    (&text[1..], Some(BinOp::Sub))
                } else if after_operand && text.starts_with('+') {
                    (&text[1..], Some(BinOp::Add))
                } else {
                    (text, None)
                };
                let num: f64 = value
                    .parse()
                    .map_err(|_| self.err(format!("Unable to parse number \"{text}\"")))?;
                if let Some(op) = op {
                    self.cur().pieces.push(Piece::Op(op));
                }
                self.operand(Expr::Num(num));
            }

            TokenKind::Bool => self.operand(Expr::Bool(text == "true")),

            TokenKind::Var => self.parse_var(text)?,

            TokenKind::Filter | TokenKind::FilterEmpty => {
                if !self.filters.has_filter(text) {
                    return Err(self.err(format!("Invalid filter \"{text}\"")));
                }
                if self.filters.is_safe(text) {
                    self.escape = AutoEscape::Off;
                }
                let input = self.take_filter_input(text)?;
                if token.kind == TokenKind::FilterEmpty {
                    self.operand(Expr::Filter(text.to_owned(), vec![input]));
                } else {
                    self.state.push(StateKind::Filter);
                    let mut frame = Frame::new(FrameKind::Filter {
                        name: text.to_owned(),
                    });
                    frame.args.push(input);
                    self.frames.push(frame);
                }
            }

            TokenKind::Function => {
                self.escape = AutoEscape::Off;
                self.state.push(StateKind::Function);
                self.frames.push(Frame::new(FrameKind::Function {
                    name: text.to_owned(),
                }));
            }

            TokenKind::FunctionEmpty => {
                self.escape = AutoEscape::Off;
                self.operand(Expr::FnCall(text.to_owned(), Vec::new()));
            }

            TokenKind::ParenOpen => {
                self.state.push(StateKind::ParenOpen);
                if self.prev == Some(TokenKind::Var) {
                    match self.pop_operand() {
                        Some(Expr::Path(path)) => {
                            self.escape = AutoEscape::Off;
                            self.state.push(StateKind::MethodOpen);
                            self.frames.push(Frame::new(FrameKind::Method { path }));
                        }
                        Some(other) => {
                            self.frames
                                .push(Frame::new(FrameKind::CallValue { callee: other }));
                        }
                        None => self.frames.push(Frame::new(FrameKind::Group)),
                    }
                } else if matches!(
                    self.prev,
                    Some(
                        TokenKind::BracketClose
                            | TokenKind::ParenClose
                            | TokenKind::FunctionEmpty
                            | TokenKind::FilterEmpty
                            | TokenKind::CurlyClose
                            | TokenKind::DotKey
                    )
                ) {
                    match self.pop_operand() {
                        Some(callee) => {
                            self.escape = AutoEscape::Off;
                            self.frames
                                .push(Frame::new(FrameKind::CallValue { callee }));
                        }
                        None => self.frames.push(Frame::new(FrameKind::Group)),
                    }
                } else {
                    self.frames.push(Frame::new(FrameKind::Group));
                }
            }

            TokenKind::ParenClose => {
                match self.state.pop() {
                    Some(StateKind::ParenOpen | StateKind::Function | StateKind::Filter) => {}
                    _ => return Err(self.err("Mismatched nesting state")),
                }
                if self.frames.len() < 2 {
                    return Err(self.err("Mismatched nesting state"));
                }
                let mut frame = self.frames.pop().expect("frame underflow");
                if !frame.pieces.is_empty() {
                    let pieces = std::mem::take(&mut frame.pieces);
                    let expr = assemble(pieces).ok_or_else(|| self.unable())?;
                    frame.args.push(expr);
                }
                let done = match frame.kind {
                    FrameKind::Group => match frame.args.len() {
                        1 => frame.args.remove(0),
                        _ => return Err(self.unable()),
                    },
                    FrameKind::Function { name } => Expr::FnCall(name, frame.args),
                    FrameKind::Filter { name } => Expr::Filter(name, frame.args),
                    FrameKind::Method { path } => Expr::MethodCall(path, frame.args),
                    FrameKind::CallValue { callee } => {
                        Expr::CallValue(Box::new(callee), frame.args)
                    }
                    _ => return Err(self.err("Mismatched nesting state")),
                };
                self.operand(done);
            }

            TokenKind::Comma => {
                match self.state.last() {
                    Some(
                        StateKind::Function
                        | StateKind::Filter
                        | StateKind::ArrayOpen
                        | StateKind::CurlyOpen
                        | StateKind::ParenOpen
                        | StateKind::Colon,
                    ) => {}
                    _ => return Err(self.err("Unexpected comma")),
                }
                if self.state.last() == Some(&StateKind::Colon) {
                    self.state.pop();
                }
                let is_object = matches!(self.cur().kind, FrameKind::Object);
                let is_sequence =
                    matches!(self.cur().kind, FrameKind::Group | FrameKind::Root);
                let pieces = std::mem::take(&mut self.cur().pieces);
                if is_object {
                    let key = self
                        .cur()
                        .pending_key
                        .take()
                        .ok_or_else(|| self.err("Unexpected comma"))?;
                    let value = assemble(pieces).ok_or_else(|| self.unable())?;
                    self.cur().entries.push((key, value));
                } else if is_sequence {
                    // Comma expression: earlier values evaluate and are
                    // discarded, the last one wins.
                    assemble(pieces).ok_or_else(|| self.unable())?;
                } else {
                    let value = assemble(pieces).ok_or_else(|| self.unable())?;
                    self.cur().args.push(value);
                }
            }

            TokenKind::Logic => {
                if self.prev.is_none()
                    || matches!(
                        self.prev,
                        Some(
                            TokenKind::Comma
                                | TokenKind::Logic
                                | TokenKind::BracketOpen
                                | TokenKind::CurlyOpen
                                | TokenKind::ParenOpen
                                | TokenKind::Function
                        )
                    )
                {
                    return Err(self.err(format!("Unexpected logic \"{text}\"")));
                }
                let op = BinOp::from_text(text)
                    .ok_or_else(|| self.err(format!("Unexpected logic \"{text}\"")))?;
                self.cur().pieces.push(Piece::Op(op));
            }

            TokenKind::Comparator => {
                if self.prev.is_none()
                    || matches!(
                        self.prev,
                        Some(
                            TokenKind::Comma
                                | TokenKind::Comparator
                                | TokenKind::Logic
                                | TokenKind::BracketOpen
                                | TokenKind::CurlyOpen
                                | TokenKind::ParenOpen
                                | TokenKind::Function
                                | TokenKind::Colon
                        )
                    )
                {
                    return Err(self.err(format!("Unexpected comparator \"{text}\"")));
                }
                let op = BinOp::from_text(text)
                    .ok_or_else(|| self.err(format!("Unexpected comparator \"{text}\"")))?;
                self.cur().pieces.push(Piece::Op(op));
            }

            TokenKind::Operator => {
                let op = BinOp::from_text(text)
                    .ok_or_else(|| self.err(format!("Unexpected operator \"{text}\"")))?;
                self.cur().pieces.push(Piece::Op(op));
            }

            TokenKind::Not => self.cur().pieces.push(Piece::Not),

            TokenKind::BracketOpen => {
                let indexing = matches!(
                    self.prev,
                    Some(TokenKind::Var | TokenKind::BracketClose | TokenKind::ParenClose)
                );
                if indexing {
                    let Some(base) = self.pop_operand() else {
                        return Err(self.err("Unexpected opening square bracket"));
                    };
                    self.state.push(StateKind::BracketOpen);
                    self.frames.push(Frame::new(FrameKind::Index { base }));
                } else {
                    self.state.push(StateKind::ArrayOpen);
                    self.frames.push(Frame::new(FrameKind::Array));
                }
            }

            TokenKind::BracketClose => {
                let st = self.state.pop();
                if !matches!(st, Some(StateKind::BracketOpen | StateKind::ArrayOpen)) {
                    return Err(self.err("Unexpected closing square bracket"));
                }
                if self.frames.len() < 2 {
                    return Err(self.err("Unexpected closing square bracket"));
                }
                let mut frame = self.frames.pop().expect("frame underflow");
                let pieces = std::mem::take(&mut frame.pieces);
                match frame.kind {
                    FrameKind::Index { base } => {
                        let idx = assemble(pieces).ok_or_else(|| self.unable())?;
                        self.operand(Expr::Index(Box::new(base), Box::new(idx)));
                    }
                    FrameKind::Array => {
                        if !pieces.is_empty() {
                            let expr = assemble(pieces).ok_or_else(|| self.unable())?;
                            frame.args.push(expr);
                        }
                        self.operand(Expr::Array(frame.args));
                    }
                    _ => return Err(self.err("Unexpected closing square bracket")),
                }
            }

            TokenKind::CurlyOpen => {
                self.state.push(StateKind::CurlyOpen);
                self.frames.push(Frame::new(FrameKind::Object));
            }

            TokenKind::Colon => {
                if self.state.last() != Some(&StateKind::CurlyOpen) {
                    return Err(self.err("Unexpected colon"));
                }
                self.state.push(StateKind::Colon);
                let line_err = self.err("Unexpected colon");
                let frame = self.cur();
                if frame.pending_key.is_some() {
                    return Err(line_err);
                }
                let key = match frame.pieces.pop() {
                    Some(Piece::Operand(Expr::Str(s))) => s,
                    Some(Piece::Operand(Expr::Num(n))) => fmt_num(n),
                    Some(Piece::Operand(Expr::Bool(b))) => b.to_string(),
                    _ => return Err(line_err),
                };
                frame.pending_key = Some(key);
            }

            TokenKind::CurlyClose => {
                if self.state.last() == Some(&StateKind::Colon) {
                    self.state.pop();
                }
                if self.state.pop() != Some(StateKind::CurlyOpen) {
                    return Err(self.err("Unexpected closing curly brace"));
                }
                if self.frames.len() < 2 {
                    return Err(self.err("Unexpected closing curly brace"));
                }
                let mut frame = self.frames.pop().expect("frame underflow");
                let pieces = std::mem::take(&mut frame.pieces);
                match frame.kind {
                    FrameKind::Object => {
                        if let Some(key) = frame.pending_key.take() {
                            let value = assemble(pieces).ok_or_else(|| self.unable())?;
                            frame.entries.push((key, value));
                        } else if !pieces.is_empty() {
                            return Err(self.err("Unexpected closing curly brace"));
                        }
                        self.operand(Expr::Object(frame.entries));
                    }
                    _ => return Err(self.err("Unexpected closing curly brace")),
                }
            }

            TokenKind::DotKey => {
                if !matches!(
                    self.prev,
                    Some(
                        TokenKind::Var
                            | TokenKind::BracketClose
                            | TokenKind::DotKey
                            | TokenKind::ParenClose
                            | TokenKind::FunctionEmpty
                            | TokenKind::FilterEmpty
                            | TokenKind::CurlyClose
                    )
                ) {
                    return Err(self.err(format!("Unexpected key \"{text}\"")));
                }
                let key = text.to_owned();
                let err = self.err(format!("Unexpected key \"{text}\""));
                let frame = self.cur();
                match frame.pieces.last_mut() {
                    Some(Piece::Operand(Expr::Path(path))) => path.push(key),
                    Some(Piece::Operand(other)) => {
                        let base = std::mem::replace(other, Expr::Bool(false));
                        *other = Expr::Attr(Box::new(base), key);
                    }
                    _ => return Err(err),
                }
            }

            TokenKind::Assignment => {
                return Err(self.err(format!("Unexpected assignment \"{text}\"")))
            }

            TokenKind::Unknown => {
                return Err(self.err(format!("Unable to parse \"{text}\"")))
            }

            TokenKind::ArrayOpen | TokenKind::MethodOpen => {
                return Err(self.err("Mismatched nesting state"))
            }
        }

        self.prev = Some(token.kind);
        Ok(())
    }

    fn parse_var(&mut self, text: &str) -> Result<(), ParseError> {
        let parts: Vec<String> = text.split('.').map(str::to_owned).collect();
        let head = parts[0].as_str();
        if RESERVED.contains(&head) {
            return Err(self.err(format!(
                "Reserved keyword \"{head}\" attempted to be used as a variable"
            )));
        }
        if self.state.last() == Some(&StateKind::CurlyOpen) {
            // Object-literal key position: bare words only.
            if parts.len() > 1 {
                return Err(self.err("Unexpected dot"));
            }
            self.operand(Expr::Str(parts.into_iter().next().expect("non-empty split")));
        } else {
            self.operand(Expr::Path(parts));
        }
        Ok(())
    }

    /// The value a filter applies to: the most recent completed operand, or
    /// the entire pending expression when the frame holds none.
    fn take_filter_input(&mut self, name: &str) -> Result<Expr, ParseError> {
        if let Some(expr) = self.pop_operand() {
            return Ok(expr);
        }
        let pieces = std::mem::take(&mut self.cur().pieces);
        if pieces.is_empty() {
            return Err(self.err(format!("Unexpected filter \"{name}\"")));
        }
        assemble(pieces).ok_or_else(|| self.unable())
    }
}

/// Folds a flat run of operands and operators into a tree, binding unary
/// `!` tightest, then `* / %`, `+ -`, comparators, `&&`, `||`.
fn assemble(pieces: Vec<Piece>) -> Option<Expr> {
    let mut pos = 0;
    let expr = assemble_binary(&pieces, &mut pos, 0)?;
    if pos != pieces.len() {
        return None;
    }
    Some(expr)
}

fn assemble_binary(pieces: &[Piece], pos: &mut usize, min: u8) -> Option<Expr> {
    let mut lhs = assemble_unary(pieces, pos)?;
    while let Some(Piece::Op(op)) = pieces.get(*pos) {
        let prec = op.precedence();
        if prec < min {
            break;
        }
        let op = *op;
        *pos += 1;
        let rhs = assemble_binary(pieces, pos, prec + 1)?;
        lhs = Expr::BinOp(op, Box::new(lhs), Box::new(rhs));
    }
    Some(lhs)
}

fn assemble_unary(pieces: &[Piece], pos: &mut usize) -> Option<Expr> {
    match pieces.get(*pos)? {
        Piece::Not => {
            *pos += 1;
            let inner = assemble_unary(pieces, pos)?;
            Some(Expr::Not(Box::new(inner)))
        }
        Piece::Operand(e) => {
            *pos += 1;
            Some(e.clone())
        }
        Piece::Op(_) => None,
    }
}

/// Strips matching single or double quotes from a string token.
pub fn unquote(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[bytes.len() - 1] == bytes[0]
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Resolves backslash escapes inside a string literal.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Formats a number the way template output does: integral values print
/// without a fractional part.
pub fn fmt_num(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
