//! `block`, `extends` and `parent`.
//!
//! All three do their real work at compile time: `extends` records the
//! parent path on the document, and the inheritance resolver replaces
//! block contents and splices `parent` tags before rendering ever starts.
//! At render time a block simply renders its (already resolved) body.

use stencil_parser::node::{Arg, TagNode};
use stencil_parser::{ParseError, TagContext, TokenKind, TokenParser};

use crate::error::Result;
use crate::eval::RenderContext;
use crate::tags::{reject_args, Tag};

pub(crate) struct BlockTag;

impl Tag for BlockTag {
    fn parse(
        &self,
        parser: &mut TokenParser<'_>,
        _ctx: &mut TagContext<'_>,
    ) -> std::result::Result<Vec<Arg>, ParseError> {
        let mut name = String::new();
        while let Some(token) = parser.next_significant() {
            name.push_str(&token.text);
        }
        if name.is_empty() {
            return Err(parser.err("No block name given"));
        }
        Ok(vec![Arg::Ident(name)])
    }

    fn ends(&self) -> bool {
        true
    }

    fn block_level(&self) -> bool {
        true
    }

    fn render(&self, node: &TagNode, rctx: &mut RenderContext<'_>) -> Result<()> {
        rctx.render_children(&node.content)
    }
}

pub(crate) struct ExtendsTag;

impl Tag for ExtendsTag {
    fn parse(
        &self,
        parser: &mut TokenParser<'_>,
        _ctx: &mut TagContext<'_>,
    ) -> std::result::Result<Vec<Arg>, ParseError> {
        let path = parser.expect(TokenKind::Str, "a quoted template path")?;
        reject_args(parser, "extends")?;
        Ok(vec![Arg::Str(
            stencil_parser::unquote(&path.text).to_owned(),
        )])
    }

    fn render(&self, _node: &TagNode, _rctx: &mut RenderContext<'_>) -> Result<()> {
        Ok(())
    }
}

pub(crate) struct ParentTag;

impl Tag for ParentTag {
    fn parse(
        &self,
        parser: &mut TokenParser<'_>,
        _ctx: &mut TagContext<'_>,
    ) -> std::result::Result<Vec<Arg>, ParseError> {
        reject_args(parser, "parent")?;
        Ok(Vec::new())
    }

    fn render(&self, _node: &TagNode, _rctx: &mut RenderContext<'_>) -> Result<()> {
        // Spliced away during inheritance resolution; a parent tag in a
        // template without ancestors renders nothing.
        Ok(())
    }
}
