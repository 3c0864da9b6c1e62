//! `if` / `elseif` / `else`.
//!
//! The branch markers are parsed as plain sibling nodes inside the `if`
//! body; rendering partitions the body at the markers and runs the first
//! branch whose condition holds. An `else` may carry an `if <cond>` tail,
//! which makes it behave exactly like `elseif`.

use stencil_parser::expr::Expr;
use stencil_parser::node::{Arg, Node, TagNode};
use stencil_parser::{ParseError, TagContext, TokenParser};

use crate::error::Result;
use crate::eval::RenderContext;
use crate::tags::Tag;
use crate::value;

pub(crate) struct IfTag;

impl Tag for IfTag {
    fn parse(
        &self,
        parser: &mut TokenParser<'_>,
        _ctx: &mut TagContext<'_>,
    ) -> std::result::Result<Vec<Arg>, ParseError> {
        if parser.at_end() {
            return Err(parser.err("No conditional statement provided"));
        }
        Ok(vec![Arg::Expr(parser.parse_rest()?)])
    }

    fn ends(&self) -> bool {
        true
    }

    fn render(&self, node: &TagNode, rctx: &mut RenderContext<'_>) -> Result<()> {
        for (cond, nodes) in partition(node) {
            let taken = match cond {
                Some(expr) => {
                    let v = rctx.eval(expr)?;
                    value::truthy(&v)
                }
                None => true,
            };
            if taken {
                for child in nodes {
                    rctx.render_children(std::slice::from_ref(child))?;
                }
                return Ok(());
            }
        }
        Ok(())
    }
}

/// Splits an `if` body into branches at its `elseif`/`else` markers.
fn partition(node: &TagNode) -> Vec<(Option<&Expr>, Vec<&Node>)> {
    let first = match node.args.first() {
        Some(Arg::Expr(expr)) => Some(expr),
        _ => None,
    };
    let mut branches = vec![(first, Vec::new())];
    for child in &node.content {
        match child {
            Node::Tag(tag)
                if tag.name == "elseif" || tag.name == "elif" || tag.name == "else" =>
            {
                let cond = match tag.args.first() {
                    Some(Arg::Expr(expr)) => Some(expr),
                    _ => None,
                };
                branches.push((cond, Vec::new()));
            }
            other => branches
                .last_mut()
                .expect("starts non-empty")
                .1
                .push(other),
        }
    }
    branches
}

/// Registered under both `elseif` and its `elif` alias.
pub(crate) struct ElseIfTag {
    pub(crate) name: &'static str,
}

impl Tag for ElseIfTag {
    fn parse(
        &self,
        parser: &mut TokenParser<'_>,
        ctx: &mut TagContext<'_>,
    ) -> std::result::Result<Vec<Arg>, ParseError> {
        if ctx.open_tag.as_deref() != Some("if") {
            return Err(parser.err(format!("Unexpected tag \"{}\"", self.name)));
        }
        if parser.at_end() {
            return Err(parser.err("No conditional statement provided"));
        }
        Ok(vec![Arg::Expr(parser.parse_rest()?)])
    }

    fn render(&self, _node: &TagNode, _rctx: &mut RenderContext<'_>) -> Result<()> {
        // Branch markers render through the enclosing if.
        Ok(())
    }
}

pub(crate) struct ElseTag;

impl Tag for ElseTag {
    fn parse(
        &self,
        parser: &mut TokenParser<'_>,
        ctx: &mut TagContext<'_>,
    ) -> std::result::Result<Vec<Arg>, ParseError> {
        if ctx.open_tag.as_deref() != Some("if") {
            return Err(parser.err("Unexpected tag \"else\""));
        }
        if parser.at_end() {
            return Ok(Vec::new());
        }
        // `else if <cond>` is accepted as an elseif.
        match parser.next_significant() {
            Some(token) if token.text == "if" => {}
            Some(token) => {
                return Err(parser.err(format!(
                    "\"else\" tag does not accept any tokens, found \"{}\"",
                    token.text
                )))
            }
            None => return Ok(Vec::new()),
        }
        if parser.at_end() {
            return Err(parser.err("No conditional statement provided"));
        }
        Ok(vec![Arg::Expr(parser.parse_rest()?)])
    }

    fn render(&self, _node: &TagNode, _rctx: &mut RenderContext<'_>) -> Result<()> {
        Ok(())
    }
}
