//! Tag implementations.
//!
//! A [`Tag`] couples an argument parser, run when the document parser meets
//! the tag, with a renderer run against the finished node tree. Custom tags
//! registered through [`Engine::set_tag`](crate::Engine::set_tag) implement
//! the same trait as the builtins.

use std::collections::HashMap;
use std::sync::Arc;

use stencil_parser::node::{Arg, TagNode};
use stencil_parser::{
    ArgHooks, HookAction, ParseError, TagContext, TagMeta, TagSet, Token, TokenParser,
};

use crate::error::Result;
use crate::eval::RenderContext;

mod autoescape;
mod cond;
mod filter;
mod forloop;
mod import;
mod include;
mod inherit;
mod macros;
mod raw;
mod set;
mod spaceless;

pub trait Tag: Send + Sync {
    /// Parses the argument tokens of one tag invocation.
    fn parse(
        &self,
        parser: &mut TokenParser<'_>,
        ctx: &mut TagContext<'_>,
    ) -> std::result::Result<Vec<Arg>, ParseError>;

    /// Renders the tag node into the output.
    fn render(&self, node: &TagNode, rctx: &mut RenderContext<'_>) -> Result<()>;

    /// Whether the tag opens a body closed by a matching `end` tag.
    fn ends(&self) -> bool {
        false
    }

    /// Whether a top-level occurrence registers in the document block map.
    fn block_level(&self) -> bool {
        false
    }
}

/// Registered tags, by name.
pub(crate) struct Tags {
    map: HashMap<String, Arc<dyn Tag>>,
}

impl Tags {
    pub(crate) fn builtins() -> Self {
        let mut tags = Tags {
            map: HashMap::new(),
        };
        tags.set("autoescape", Arc::new(autoescape::AutoEscapeTag));
        tags.set("block", Arc::new(inherit::BlockTag));
        tags.set("elif", Arc::new(cond::ElseIfTag { name: "elif" }));
        tags.set("else", Arc::new(cond::ElseTag));
        tags.set("elseif", Arc::new(cond::ElseIfTag { name: "elseif" }));
        tags.set("extends", Arc::new(inherit::ExtendsTag));
        tags.set("filter", Arc::new(filter::FilterTag));
        tags.set("for", Arc::new(forloop::ForTag));
        tags.set("if", Arc::new(cond::IfTag));
        tags.set("import", Arc::new(import::ImportTag));
        tags.set("include", Arc::new(include::IncludeTag));
        tags.set("macro", Arc::new(macros::MacroTag));
        tags.set("parent", Arc::new(inherit::ParentTag));
        tags.set("raw", Arc::new(raw::RawTag));
        tags.set("set", Arc::new(set::SetTag));
        tags.set("spaceless", Arc::new(spaceless::SpacelessTag));
        tags
    }

    pub(crate) fn set(&mut self, name: &str, tag: Arc<dyn Tag>) {
        self.map.insert(name.to_owned(), tag);
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<dyn Tag>> {
        self.map.get(name).cloned()
    }
}

impl TagSet for Tags {
    fn parse_tag(
        &self,
        name: &str,
        parser: &mut TokenParser<'_>,
        ctx: &mut TagContext<'_>,
    ) -> Option<std::result::Result<TagMeta, ParseError>> {
        let tag = self.map.get(name)?;
        Some(tag.parse(parser, ctx).map(|args| TagMeta {
            args,
            ends: tag.ends(),
            block_level: tag.block_level(),
        }))
    }
}

/// Hook that rejects every argument token, for tags that take none.
pub(crate) struct RejectArgs {
    pub(crate) tag: &'static str,
}

impl ArgHooks for RejectArgs {
    fn on_token(
        &mut self,
        token: &Token,
        line: usize,
        file: Option<&str>,
    ) -> std::result::Result<HookAction, ParseError> {
        Err(ParseError::new(
            format!("Unexpected token \"{}\" in {} tag", token.text, self.tag),
            Some(line),
            file,
        ))
    }
}

/// Errors out if any argument tokens remain, otherwise succeeds.
pub(crate) fn reject_args(
    parser: &mut TokenParser<'_>,
    tag: &'static str,
) -> std::result::Result<(), ParseError> {
    if !parser.at_end() {
        parser.parse_rest_with(&mut RejectArgs { tag })?;
    }
    Ok(())
}
