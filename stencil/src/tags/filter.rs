//! `filter`: applies a filter to everything its body renders.

use stencil_parser::node::{Arg, TagNode};
use stencil_parser::{ParseError, TagContext, Token, TokenKind, TokenParser};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::eval::{apply_filter, RenderContext};
use crate::tags::Tag;
use crate::value;

pub(crate) struct FilterTag;

impl Tag for FilterTag {
    fn parse(
        &self,
        parser: &mut TokenParser<'_>,
        _ctx: &mut TagContext<'_>,
    ) -> std::result::Result<Vec<Arg>, ParseError> {
        let head = parser
            .next_significant()
            .ok_or_else(|| parser.err("No filter specified"))?;

        let (name, has_args) = match head.kind {
            TokenKind::Var if !head.text.contains('.') => (head.text, false),
            TokenKind::FunctionEmpty => (head.text, false),
            TokenKind::Function => (head.text, true),
            _ => {
                return Err(parser.err(format!(
                    "Unexpected token \"{}\" in filter tag",
                    head.text
                )))
            }
        };
        if !parser.filters().has_filter(&name) {
            return Err(parser.err(format!("Filter \"{name}\" does not exist")));
        }

        let mut args = vec![Arg::Ident(name)];
        if has_args {
            for segment in split_call_args(parser)? {
                args.push(Arg::Expr(parser.subparser(segment).parse_rest()?));
            }
        } else if !parser.at_end() {
            let token = parser.next_significant().expect("checked non-empty");
            return Err(parser.err(format!(
                "Unexpected token \"{}\" in filter tag",
                token.text
            )));
        }
        Ok(args)
    }

    fn ends(&self) -> bool {
        true
    }

    fn render(&self, node: &TagNode, rctx: &mut RenderContext<'_>) -> Result<()> {
        let mut name = None;
        let mut args = Vec::new();
        for arg in &node.args {
            match arg {
                Arg::Ident(n) => name = Some(n.as_str()),
                Arg::Expr(expr) => args.push(rctx.eval(expr)?),
                _ => {}
            }
        }
        let name = name.ok_or_else(|| Error::Render("malformed filter tag".into()))?;

        let captured = rctx.capture(&node.content)?;
        let filtered = apply_filter(name, Value::String(captured), &args, rctx)?;
        let out = value::display(&filtered);
        rctx.write_str(&out);
        Ok(())
    }
}

/// Splits the tokens up to the closing paren of the filter call into
/// comma-separated argument segments, respecting nested brackets.
fn split_call_args(
    parser: &mut TokenParser<'_>,
) -> std::result::Result<Vec<Vec<Token>>, ParseError> {
    let mut segments = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let mut depth = 0usize;

    loop {
        let token = parser
            .next_significant()
            .ok_or_else(|| parser.err("Unclosed filter arguments"))?;
        match token.kind {
            TokenKind::ParenClose if depth == 0 => {
                if !current.is_empty() {
                    segments.push(current);
                }
                break;
            }
            TokenKind::ParenOpen
            | TokenKind::Function
            | TokenKind::Filter
            | TokenKind::BracketOpen
            | TokenKind::CurlyOpen => {
                depth += 1;
                current.push(token);
            }
            TokenKind::ParenClose | TokenKind::BracketClose | TokenKind::CurlyClose => {
                depth = depth.saturating_sub(1);
                current.push(token);
            }
            TokenKind::Comma if depth == 0 => {
                segments.push(std::mem::take(&mut current));
            }
            _ => current.push(token),
        }
    }

    if !parser.at_end() {
        let token = parser.next_significant().expect("checked non-empty");
        return Err(parser.err(format!(
            "Unexpected token \"{}\" in filter tag",
            token.text
        )));
    }
    Ok(segments)
}
