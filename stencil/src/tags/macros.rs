//! `macro`: a reusable template fragment with parameters.
//!
//! Defining a macro registers it for the rest of the render; calling it by
//! name evaluates the body in an isolated scope built from the call
//! arguments and inserts the captured output.

use stencil_parser::node::{Arg, MacroDef, TagNode};
use stencil_parser::{ParseError, TagContext, TokenKind, TokenParser};

use crate::error::Result;
use crate::eval::RenderContext;
use crate::tags::{reject_args, Tag};

pub(crate) struct MacroTag;

impl Tag for MacroTag {
    fn parse(
        &self,
        parser: &mut TokenParser<'_>,
        _ctx: &mut TagContext<'_>,
    ) -> std::result::Result<Vec<Arg>, ParseError> {
        let head = parser
            .next_significant()
            .ok_or_else(|| parser.err("Expected a macro definition"))?;
        let mut args = Vec::new();
        match head.kind {
            TokenKind::FunctionEmpty => args.push(Arg::Ident(head.text)),
            TokenKind::Function => {
                args.push(Arg::Ident(head.text));
                loop {
                    let token = parser
                        .next_significant()
                        .ok_or_else(|| parser.err("Unexpected end of macro definition"))?;
                    match token.kind {
                        TokenKind::ParenClose => break,
                        TokenKind::Comma => {}
                        TokenKind::Var if !token.text.contains('.') => {
                            args.push(Arg::Ident(token.text));
                        }
                        _ => {
                            return Err(parser.err(format!(
                                "Unexpected token \"{}\" in macro parameters",
                                token.text
                            )))
                        }
                    }
                }
            }
            _ => {
                return Err(parser.err(format!(
                    "Expected a macro definition but found \"{}\"",
                    head.text
                )))
            }
        }
        reject_args(parser, "macro")?;
        Ok(args)
    }

    fn ends(&self) -> bool {
        true
    }

    fn render(&self, node: &TagNode, rctx: &mut RenderContext<'_>) -> Result<()> {
        let mut idents = node.args.iter().filter_map(|arg| match arg {
            Arg::Ident(name) => Some(name.clone()),
            _ => None,
        });
        if let Some(name) = idents.next() {
            let def = MacroDef {
                name: name.clone(),
                params: idents.collect(),
                body: node.content.clone(),
            };
            rctx.macros.insert(name, def);
        }
        Ok(())
    }
}
