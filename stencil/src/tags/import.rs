//! `import`: binds another template's macros under a namespace.
//!
//! `{% import "forms.html" as forms %}` parses the target file at compile
//! time and captures its top-level macro definitions; the body of the
//! importing template then calls them as `forms.input(...)`.

use std::collections::HashMap;

use stencil_parser::node::{Arg, MacroDef, TagNode};
use stencil_parser::{unquote, ParseError, TagContext, TokenKind, TokenParser};

use crate::error::Result;
use crate::eval::RenderContext;
use crate::tags::{reject_args, Tag};

pub(crate) struct ImportTag;

impl Tag for ImportTag {
    fn parse(
        &self,
        parser: &mut TokenParser<'_>,
        ctx: &mut TagContext<'_>,
    ) -> std::result::Result<Vec<Arg>, ParseError> {
        let file = parser.expect(TokenKind::Str, "a quoted template path")?;
        let path = unquote(&file.text).to_owned();
        let kw = parser.expect(TokenKind::Var, "\"as\"")?;
        if kw.text != "as" {
            return Err(parser.err(format!("Expected \"as\" but found \"{}\"", kw.text)));
        }
        let alias = parser.expect(TokenKind::Var, "a namespace name")?;
        if alias.text.contains('.') {
            return Err(parser.err("Unexpected dot in import namespace"));
        }
        reject_args(parser, "import")?;

        let doc = ctx.host.parse_file(&path, ctx.filename.as_deref())?;
        let macros = collect_macros(&doc.nodes);
        Ok(vec![Arg::Ident(alias.text), Arg::Macros(macros)])
    }

    fn render(&self, node: &TagNode, rctx: &mut RenderContext<'_>) -> Result<()> {
        let mut alias = None;
        let mut defs: &[MacroDef] = &[];
        for arg in &node.args {
            match arg {
                Arg::Ident(name) => alias = Some(name.clone()),
                Arg::Macros(macros) => defs = macros,
                _ => {}
            }
        }
        if let Some(alias) = alias {
            let set: HashMap<String, MacroDef> = defs
                .iter()
                .map(|def| (def.name.clone(), def.clone()))
                .collect();
            rctx.namespaces.insert(alias, set);
        }
        Ok(())
    }
}

/// Pulls macro definitions out of a parsed document's top level.
fn collect_macros(nodes: &[stencil_parser::node::Node]) -> Vec<MacroDef> {
    use stencil_parser::node::Node;

    let mut out = Vec::new();
    for node in nodes {
        let Node::Tag(tag) = node else { continue };
        if tag.name != "macro" {
            continue;
        }
        let mut idents = tag.args.iter().filter_map(|arg| match arg {
            Arg::Ident(name) => Some(name.clone()),
            _ => None,
        });
        let Some(name) = idents.next() else { continue };
        out.push(MacroDef {
            name,
            params: idents.collect(),
            body: tag.content.clone(),
        });
    }
    out
}
