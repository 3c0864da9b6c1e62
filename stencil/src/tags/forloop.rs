//! `for`: iteration over arrays and objects.
//!
//! Each pass pushes a scope holding the loop variables and a `loop` object
//! with `index`, `index0`, `revindex`, `revindex0`, `key`, `first` and
//! `last`.

use serde_json::{Map, Value};
use stencil_parser::node::{Arg, TagNode};
use stencil_parser::{ParseError, TagContext, TokenKind, TokenParser};

use crate::error::{Error, Result};
use crate::eval::RenderContext;
use crate::tags::Tag;

pub(crate) struct ForTag;

impl Tag for ForTag {
    fn parse(
        &self,
        parser: &mut TokenParser<'_>,
        _ctx: &mut TagContext<'_>,
    ) -> std::result::Result<Vec<Arg>, ParseError> {
        let first = parser.expect(TokenKind::Var, "a loop variable")?;
        if first.text.contains('.') {
            return Err(parser.err("Unexpected dot in loop variable"));
        }
        let mut args = vec![Arg::Ident(first.text)];

        if parser.peek().map(|t| t.kind) == Some(TokenKind::Comma) {
            parser.next_significant();
            let second = parser.expect(TokenKind::Var, "a loop variable")?;
            if second.text.contains('.') {
                return Err(parser.err("Unexpected dot in loop variable"));
            }
            args.push(Arg::Ident(second.text));
        }

        let kw = parser.expect(TokenKind::Comparator, "\"in\"")?;
        if kw.text != "in" {
            return Err(parser.err(format!("Expected \"in\" but found \"{}\"", kw.text)));
        }
        if parser.at_end() {
            return Err(parser.err("No iterable provided"));
        }
        args.push(Arg::Expr(parser.parse_rest()?));
        Ok(args)
    }

    fn ends(&self) -> bool {
        true
    }

    fn render(&self, node: &TagNode, rctx: &mut RenderContext<'_>) -> Result<()> {
        let mut vars = Vec::new();
        let mut iter_expr = None;
        for arg in &node.args {
            match arg {
                Arg::Ident(name) => vars.push(name.as_str()),
                Arg::Expr(expr) => iter_expr = Some(expr),
                _ => {}
            }
        }
        let iter_expr = iter_expr
            .ok_or_else(|| Error::Render("for tag is missing its iterable".into()))?;
        let iterable = rctx.eval(iter_expr)?;

        let items: Vec<(Value, Value)> = match iterable {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i), v))
                .collect(),
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| (Value::String(k), v))
                .collect(),
            _ => Vec::new(),
        };

        let len = items.len();
        for (i, (key, val)) in items.into_iter().enumerate() {
            let mut scope = Map::new();
            match vars.as_slice() {
                [value_var] => {
                    scope.insert((*value_var).to_owned(), val);
                }
                [key_var, value_var, ..] => {
                    scope.insert((*key_var).to_owned(), key.clone());
                    scope.insert((*value_var).to_owned(), val);
                }
                [] => {}
            }
            scope.insert("loop".into(), loop_object(i, len, key));

            rctx.push_scope(scope);
            let result = rctx.render_children(&node.content);
            rctx.pop_scope();
            result?;
        }
        Ok(())
    }
}

fn loop_object(i: usize, len: usize, key: Value) -> Value {
    let mut obj = Map::new();
    obj.insert("index".into(), Value::from(i + 1));
    obj.insert("index0".into(), Value::from(i));
    obj.insert("revindex".into(), Value::from(len - i));
    obj.insert("revindex0".into(), Value::from(len - i - 1));
    obj.insert("key".into(), key);
    obj.insert("first".into(), Value::Bool(i == 0));
    obj.insert("last".into(), Value::Bool(i + 1 == len));
    Value::Object(obj)
}
