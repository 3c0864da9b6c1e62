//! `spaceless`: collapses whitespace between HTML tags in the body.

use once_cell::sync::Lazy;
use regex::Regex;
use stencil_parser::node::{Arg, TagNode};
use stencil_parser::{ParseError, TagContext, TokenParser};

use crate::error::Result;
use crate::eval::RenderContext;
use crate::tags::{reject_args, Tag};

static BETWEEN_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s+<").expect("static pattern"));

pub(crate) struct SpacelessTag;

impl Tag for SpacelessTag {
    fn parse(
        &self,
        parser: &mut TokenParser<'_>,
        _ctx: &mut TagContext<'_>,
    ) -> std::result::Result<Vec<Arg>, ParseError> {
        reject_args(parser, "spaceless")?;
        Ok(Vec::new())
    }

    fn ends(&self) -> bool {
        true
    }

    fn render(&self, node: &TagNode, rctx: &mut RenderContext<'_>) -> Result<()> {
        let captured = rctx.capture(&node.content)?;
        let collapsed = BETWEEN_TAGS.replace_all(captured.trim(), "><");
        rctx.write_str(&collapsed);
        Ok(())
    }
}
