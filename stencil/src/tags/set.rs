//! `set`: assignment into the context.
//!
//! The target may be a dotted path with optional literal bracket segments.
//! Compound operators read the current value first; assignment lands in
//! the scope that already defines the variable, or the root scope.

use stencil_parser::expr::unquote;
use stencil_parser::node::{Arg, TagNode};
use stencil_parser::{ParseError, TagContext, TokenKind, TokenParser};

use crate::error::{Error, Result};
use crate::eval::RenderContext;
use crate::tags::Tag;
use crate::value;

pub(crate) struct SetTag;

impl Tag for SetTag {
    fn parse(
        &self,
        parser: &mut TokenParser<'_>,
        _ctx: &mut TagContext<'_>,
    ) -> std::result::Result<Vec<Arg>, ParseError> {
        let target = parser.expect(TokenKind::Var, "a variable name")?;
        let mut segs: Vec<String> = target.text.split('.').map(str::to_owned).collect();

        loop {
            match parser.peek().map(|t| t.kind) {
                Some(TokenKind::DotKey) => {
                    let tok = parser.next_significant().expect("peeked");
                    segs.push(tok.text);
                }
                Some(TokenKind::BracketOpen) => {
                    parser.next_significant();
                    let key = match parser.next_significant() {
                        Some(tok) if tok.kind == TokenKind::Str => {
                            unquote(&tok.text).to_owned()
                        }
                        Some(tok) if tok.kind == TokenKind::Number => tok.text,
                        _ => {
                            return Err(parser
                                .err("Expected a string or number inside set target brackets"))
                        }
                    };
                    parser.expect(TokenKind::BracketClose, "\"]\"")?;
                    segs.push(key);
                }
                _ => break,
            }
        }

        let op = parser.expect(TokenKind::Assignment, "an assignment operator")?;
        if parser.at_end() {
            return Err(parser.err("No value provided for set"));
        }
        let value = parser.parse_rest()?;
        Ok(vec![Arg::Target(segs), Arg::Op(op.text), Arg::Expr(value)])
    }

    fn render(&self, node: &TagNode, rctx: &mut RenderContext<'_>) -> Result<()> {
        let mut segs = None;
        let mut op = "=";
        let mut expr = None;
        for arg in &node.args {
            match arg {
                Arg::Target(t) => segs = Some(t),
                Arg::Op(o) => op = o,
                Arg::Expr(e) => expr = Some(e),
                _ => {}
            }
        }
        let (segs, expr) = match (segs, expr) {
            (Some(s), Some(e)) => (s, e),
            _ => return Err(Error::Render("malformed set tag".into())),
        };

        let v = rctx.eval(expr)?;
        let out = if op == "=" {
            v
        } else {
            let cur = rctx.scopes.lookup(segs);
            match op {
                "+=" => value::add(&cur, &v),
                "-=" => value::arith(&cur, &v, |x, y| x - y),
                "*=" => value::arith(&cur, &v, |x, y| x * y),
                "/=" => value::arith(&cur, &v, |x, y| x / y),
                other => {
                    return Err(Error::Render(format!(
                        "unsupported assignment operator \"{other}\""
                    )))
                }
            }
        };
        rctx.scopes.assign(segs, out);
        Ok(())
    }
}
