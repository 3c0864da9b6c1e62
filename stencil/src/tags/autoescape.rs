//! `autoescape`: switches escaping for the body.
//!
//! The escaping change is applied while the document is parsed, so the
//! renderer only has to walk the children.

use stencil_parser::node::{Arg, TagNode};
use stencil_parser::{unquote, ParseError, TagContext, TokenKind, TokenParser};

use crate::error::Result;
use crate::eval::RenderContext;
use crate::tags::{reject_args, Tag};

pub(crate) struct AutoEscapeTag;

impl Tag for AutoEscapeTag {
    fn parse(
        &self,
        parser: &mut TokenParser<'_>,
        _ctx: &mut TagContext<'_>,
    ) -> std::result::Result<Vec<Arg>, ParseError> {
        let token = parser
            .next_significant()
            .ok_or_else(|| parser.err("Expected true, false, \"js\" or \"html\""))?;
        let mode = match token.kind {
            TokenKind::Bool => token.text,
            TokenKind::Str => unquote(&token.text).to_owned(),
            _ => {
                return Err(parser.err(format!(
                    "Unexpected token \"{}\" in autoescape tag",
                    token.text
                )))
            }
        };
        if !matches!(mode.as_str(), "true" | "false" | "js" | "html") {
            return Err(parser.err(format!(
                "Unexpected token \"{mode}\" in autoescape tag"
            )));
        }
        reject_args(parser, "autoescape")?;
        Ok(vec![Arg::Ident(mode)])
    }

    fn ends(&self) -> bool {
        true
    }

    fn render(&self, node: &TagNode, rctx: &mut RenderContext<'_>) -> Result<()> {
        rctx.render_children(&node.content)
    }
}
