//! `raw`: the body is emitted verbatim, delimiters included.
//!
//! The document parser stops interpreting chunks between `raw` and
//! `endraw`, so the body arrives here as plain text nodes.

use stencil_parser::node::{Arg, TagNode};
use stencil_parser::{ParseError, TagContext, TokenParser};

use crate::error::Result;
use crate::eval::RenderContext;
use crate::tags::{reject_args, Tag};

pub(crate) struct RawTag;

impl Tag for RawTag {
    fn parse(
        &self,
        parser: &mut TokenParser<'_>,
        _ctx: &mut TagContext<'_>,
    ) -> std::result::Result<Vec<Arg>, ParseError> {
        reject_args(parser, "raw")?;
        Ok(Vec::new())
    }

    fn ends(&self) -> bool {
        true
    }

    fn render(&self, node: &TagNode, rctx: &mut RenderContext<'_>) -> Result<()> {
        rctx.render_children(&node.content)
    }
}
