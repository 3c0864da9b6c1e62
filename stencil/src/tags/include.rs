//! `include`: renders another template in place.
//!
//! `{% include "partial.html" [with expr] [only] [ignore missing] %}`
//!
//! The included template sees the current context flattened to one scope;
//! `with` merges an extra object over it and `only` restricts the context
//! to the `with` value alone. `ignore missing` downgrades a load failure
//! to empty output.

use serde_json::{Map, Value};
use stencil_parser::expr::{unquote, Expr};
use stencil_parser::node::{Arg, TagNode};
use stencil_parser::{ParseError, TagContext, TokenKind, TokenParser};

use crate::engine::render_template;
use crate::error::{Error, Result};
use crate::eval::RenderContext;
use crate::tags::Tag;
use crate::value;

pub(crate) struct IncludeTag;

impl Tag for IncludeTag {
    fn parse(
        &self,
        parser: &mut TokenParser<'_>,
        _ctx: &mut TagContext<'_>,
    ) -> std::result::Result<Vec<Arg>, ParseError> {
        let mut tokens = Vec::new();
        while let Some(token) = parser.next_significant() {
            tokens.push(token);
        }
        if tokens.is_empty() {
            return Err(parser.err("No template path provided for include"));
        }

        let mut flags = Vec::new();
        let len = tokens.len();
        if len >= 2
            && tokens[len - 2].text == "ignore"
            && tokens[len - 1].text == "missing"
        {
            tokens.truncate(len - 2);
            flags.push(Arg::Flag("ignore_missing"));
        } else if tokens.last().map(|t| t.text.as_str()) == Some("ignore") {
            return Err(parser.err("Expected \"missing\" after \"ignore\""));
        }
        if tokens.last().map(|t| t.text.as_str()) == Some("only") {
            tokens.pop();
            flags.insert(0, Arg::Flag("only"));
        }

        if tokens.is_empty() {
            return Err(parser.err("No template path provided for include"));
        }
        let file = tokens.remove(0);
        let file = match file.kind {
            TokenKind::Str => Expr::Str(unquote(&file.text).to_owned()),
            TokenKind::Var => Expr::Path(file.text.split('.').map(str::to_owned).collect()),
            _ => {
                return Err(parser.err(format!(
                    "Unexpected token \"{}\" in include tag",
                    file.text
                )))
            }
        };
        let mut args = vec![Arg::Expr(file)];

        if !tokens.is_empty() {
            let kw = tokens.remove(0);
            if kw.text != "with" {
                return Err(parser.err(format!(
                    "Unexpected token \"{}\" in include tag",
                    kw.text
                )));
            }
            if tokens.is_empty() {
                return Err(parser.err("Expected an expression after \"with\""));
            }
            let with = parser.subparser(tokens).parse_rest()?;
            args.push(Arg::Expr(with));
        }

        args.extend(flags);
        Ok(args)
    }

    fn render(&self, node: &TagNode, rctx: &mut RenderContext<'_>) -> Result<()> {
        let mut exprs = node.args.iter().filter_map(|arg| match arg {
            Arg::Expr(e) => Some(e),
            _ => None,
        });
        let file_expr = exprs
            .next()
            .ok_or_else(|| Error::Render("include tag is missing its path".into()))?;
        let with_expr = exprs.next();
        let only = node.args.contains(&Arg::Flag("only"));
        let ignore_missing = node.args.contains(&Arg::Flag("ignore_missing"));

        let path = value::display(&rctx.eval(file_expr)?);
        let tpl = match rctx.env.compile_file(&path, rctx.filename.as_deref()) {
            Ok(tpl) => tpl,
            Err(Error::Load { .. }) if ignore_missing => return Ok(()),
            Err(err) => return Err(err),
        };

        let base = match with_expr {
            Some(expr) => {
                let v = rctx.eval(expr)?;
                let with_map = match v {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                if only {
                    with_map
                } else {
                    value::merge(&rctx.scopes.flatten(), &with_map)
                }
            }
            None => rctx.scopes.flatten(),
        };

        let rendered = render_template(rctx.env, &tpl, base)?;
        rctx.write_str(&rendered);
        Ok(())
    }
}
