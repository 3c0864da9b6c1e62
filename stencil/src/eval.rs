//! Expression evaluation and node rendering.
//!
//! Rendering walks the parsed node tree with a [`RenderContext`], which
//! owns the output buffer, the scope stack and any macros registered or
//! imported so far. Name resolution for calls goes macros first, then
//! engine functions, and silently evaluates to `null` when nothing
//! matches, so a template never fails on an undefined call.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::engine::Inner;
use crate::error::{Error, Result};
use crate::value;
use stencil_parser::expr::{BinOp, Expr};
use stencil_parser::node::{MacroDef, Node};

/// Stack of lookup scopes. Innermost scope wins; assignment targets the
/// scope that already holds the variable, falling back to the root.
pub(crate) struct Scopes {
    stack: Vec<Map<String, Value>>,
}

impl Scopes {
    pub(crate) fn new(base: Map<String, Value>) -> Self {
        Self { stack: vec![base] }
    }

    pub(crate) fn push(&mut self, scope: Map<String, Value>) {
        self.stack.push(scope);
    }

    pub(crate) fn pop(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    pub(crate) fn lookup(&self, segs: &[String]) -> Value {
        let Some(head) = segs.first() else {
            return Value::Null;
        };
        for scope in self.stack.iter().rev() {
            if let Some(v) = scope.get(head) {
                return value::walk(v, &segs[1..]);
            }
        }
        Value::Null
    }

    /// Assigns through a key path, creating intermediate objects as needed.
    pub(crate) fn assign(&mut self, segs: &[String], val: Value) {
        let Some(head) = segs.first() else { return };
        let idx = self
            .stack
            .iter()
            .rposition(|scope| scope.contains_key(head))
            .unwrap_or(0);
        let scope = &mut self.stack[idx];
        if segs.len() == 1 {
            scope.insert(head.clone(), val);
            return;
        }
        let mut cur = scope
            .entry(head.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        for seg in &segs[1..segs.len() - 1] {
            if !cur.is_object() {
                *cur = Value::Object(Map::new());
            }
            cur = cur
                .as_object_mut()
                .expect("just coerced to object")
                .entry(seg.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        if !cur.is_object() {
            *cur = Value::Object(Map::new());
        }
        let last = segs.last().expect("len checked above");
        cur.as_object_mut()
            .expect("just coerced to object")
            .insert(last.clone(), val);
    }

    /// Flattens the stack into a single map, innermost scopes winning.
    pub(crate) fn flatten(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for scope in &self.stack {
            for (k, v) in scope {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }
}

/// Mutable state of a single render.
pub struct RenderContext<'a> {
    pub(crate) env: &'a Inner,
    pub(crate) scopes: Scopes,
    pub(crate) macros: HashMap<String, MacroDef>,
    pub(crate) namespaces: HashMap<String, HashMap<String, MacroDef>>,
    /// Macro sets visible while rendering an imported macro body, so that
    /// imported macros can call their siblings without a namespace.
    pub(crate) siblings: Vec<HashMap<String, MacroDef>>,
    pub(crate) out: String,
    pub(crate) filename: Option<String>,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(
        env: &'a Inner,
        base: Map<String, Value>,
        filename: Option<String>,
    ) -> Self {
        Self {
            env,
            scopes: Scopes::new(base),
            macros: HashMap::new(),
            namespaces: HashMap::new(),
            siblings: Vec::new(),
            out: String::new(),
            filename,
        }
    }

    /// Appends literal text to the output.
    pub fn write_str(&mut self, s: &str) {
        self.out.push_str(s);
    }

    /// Evaluates an expression against the current scopes.
    pub fn eval(&mut self, expr: &Expr) -> Result<Value> {
        eval(expr, self)
    }

    /// Renders child nodes into the output buffer.
    pub fn render_children(&mut self, nodes: &[Node]) -> Result<()> {
        render_nodes(nodes, self)
    }

    /// Renders child nodes into a fresh buffer and returns it, leaving the
    /// main output untouched.
    pub fn capture(&mut self, nodes: &[Node]) -> Result<String> {
        let saved = std::mem::take(&mut self.out);
        let result = render_nodes(nodes, self);
        let produced = std::mem::replace(&mut self.out, saved);
        result?;
        Ok(produced)
    }

    /// Pushes a fresh lookup scope for the duration of a tag body.
    pub fn push_scope(&mut self, scope: Map<String, Value>) {
        self.scopes.push(scope);
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }
}

pub(crate) fn render_nodes(nodes: &[Node], rctx: &mut RenderContext<'_>) -> Result<()> {
    for node in nodes {
        match node {
            Node::Text(text) => rctx.out.push_str(text),
            Node::Output { expr, .. } => {
                let v = eval(expr, rctx)?;
                let s = value::display(&v);
                rctx.out.push_str(&s);
            }
            Node::Tag(tag) => {
                let handler = rctx.env.tag(&tag.name).ok_or_else(|| {
                    Error::Render(format!("unknown tag \"{}\"", tag.name))
                })?;
                handler.render(tag, rctx)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn eval(expr: &Expr, rctx: &mut RenderContext<'_>) -> Result<Value> {
    Ok(match expr {
        Expr::Str(s) => Value::String(s.clone()),
        Expr::Num(n) => value::number(*n),
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Path(segs) => rctx.scopes.lookup(segs),
        Expr::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval(item, rctx)?);
            }
            Value::Array(out)
        }
        Expr::Object(entries) => {
            let mut map = Map::new();
            for (key, item) in entries {
                map.insert(key.clone(), eval(item, rctx)?);
            }
            Value::Object(map)
        }
        Expr::Index(base, idx) => {
            let base = eval(base, rctx)?;
            let idx = eval(idx, rctx)?;
            value::index(&base, &idx)
        }
        Expr::Attr(base, key) => {
            let base = eval(base, rctx)?;
            value::walk(&base, std::slice::from_ref(key))
        }
        Expr::Not(inner) => {
            let v = eval(inner, rctx)?;
            Value::Bool(!value::truthy(&v))
        }
        Expr::BinOp(op, lhs, rhs) => eval_binop(*op, lhs, rhs, rctx)?,
        Expr::Filter(name, args) => {
            let mut evaled = Vec::with_capacity(args.len());
            for arg in args {
                evaled.push(eval(arg, rctx)?);
            }
            let input = evaled.remove(0);
            apply_filter(name, input, &evaled, rctx)?
        }
        Expr::FnCall(name, args) => {
            let args = eval_args(args, rctx)?;
            call_named(name, args, rctx)?
        }
        Expr::MethodCall(path, args) => {
            let args = eval_args(args, rctx)?;
            call_method(path, args, rctx)?
        }
        // A computed value is never callable in plain data contexts.
        Expr::CallValue(..) => Value::Null,
    })
}

fn eval_args(args: &[Expr], rctx: &mut RenderContext<'_>) -> Result<Vec<Value>> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        out.push(eval(arg, rctx)?);
    }
    Ok(out)
}

fn eval_binop(
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    rctx: &mut RenderContext<'_>,
) -> Result<Value> {
    // Logic operators short-circuit and yield the deciding operand, not a
    // boolean.
    match op {
        BinOp::And => {
            let l = eval(lhs, rctx)?;
            return if value::truthy(&l) { eval(rhs, rctx) } else { Ok(l) };
        }
        BinOp::Or => {
            let l = eval(lhs, rctx)?;
            return if value::truthy(&l) { Ok(l) } else { eval(rhs, rctx) };
        }
        _ => {}
    }

    let l = eval(lhs, rctx)?;
    let r = eval(rhs, rctx)?;
    Ok(match op {
        BinOp::Eq => Value::Bool(value::loose_eq(&l, &r)),
        BinOp::Ne => Value::Bool(!value::loose_eq(&l, &r)),
        BinOp::StrictEq => Value::Bool(value::strict_eq(&l, &r)),
        BinOp::StrictNe => Value::Bool(!value::strict_eq(&l, &r)),
        BinOp::Gt => Value::Bool(matches!(
            value::compare(&l, &r),
            Some(std::cmp::Ordering::Greater)
        )),
        BinOp::Gte => Value::Bool(matches!(
            value::compare(&l, &r),
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        )),
        BinOp::Lt => Value::Bool(matches!(
            value::compare(&l, &r),
            Some(std::cmp::Ordering::Less)
        )),
        BinOp::Lte => Value::Bool(matches!(
            value::compare(&l, &r),
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
        )),
        BinOp::In => Value::Bool(value::contains(&r, &l)),
        BinOp::Add => value::add(&l, &r),
        BinOp::Sub => value::arith(&l, &r, |x, y| x - y),
        BinOp::Mul => value::arith(&l, &r, |x, y| x * y),
        BinOp::Div => value::arith(&l, &r, |x, y| x / y),
        BinOp::Mod => value::arith(&l, &r, |x, y| x % y),
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    })
}

pub(crate) fn apply_filter(
    name: &str,
    input: Value,
    args: &[Value],
    rctx: &mut RenderContext<'_>,
) -> Result<Value> {
    let func = {
        let filters = rctx.env.filters();
        match filters.get(name) {
            Some(entry) => entry.func.clone(),
            None => {
                return Err(Error::Render(format!("unknown filter \"{name}\"")));
            }
        }
    };
    func(input, args)
}

/// Call resolution: imported siblings, render-local macros, engine
/// functions, then a silent no-op.
fn call_named(name: &str, args: Vec<Value>, rctx: &mut RenderContext<'_>) -> Result<Value> {
    if let Some(def) = rctx.siblings.last().and_then(|set| set.get(name)).cloned() {
        return invoke_macro(&def, args, None, rctx);
    }
    if let Some(def) = rctx.macros.get(name).cloned() {
        return invoke_macro(&def, args, None, rctx);
    }
    let func = rctx.env.function(name);
    match func {
        Some(func) => func(&args),
        None => Ok(Value::Null),
    }
}

fn call_method(
    path: &[String],
    args: Vec<Value>,
    rctx: &mut RenderContext<'_>,
) -> Result<Value> {
    if path.len() == 2 {
        if let Some(set) = rctx.namespaces.get(&path[0]) {
            if let Some(def) = set.get(&path[1]).cloned() {
                let siblings = rctx.namespaces[&path[0]].clone();
                return invoke_macro(&def, args, Some(siblings), rctx);
            }
        }
    }
    // Method calls on data values have no behavior to dispatch to.
    Ok(Value::Null)
}

/// Runs a macro body in an isolated scope built from its parameters and
/// returns the captured output as a string.
pub(crate) fn invoke_macro(
    def: &MacroDef,
    args: Vec<Value>,
    siblings: Option<HashMap<String, MacroDef>>,
    rctx: &mut RenderContext<'_>,
) -> Result<Value> {
    let mut base = Map::new();
    let mut args = args.into_iter();
    for param in &def.params {
        base.insert(param.clone(), args.next().unwrap_or(Value::Null));
    }

    let saved_scopes = std::mem::replace(&mut rctx.scopes, Scopes::new(base));
    let saved_out = std::mem::take(&mut rctx.out);
    let pushed = siblings.is_some();
    if let Some(set) = siblings {
        rctx.siblings.push(set);
    }

    let result = render_nodes(&def.body, rctx);

    if pushed {
        rctx.siblings.pop();
    }
    let produced = std::mem::replace(&mut rctx.out, saved_out);
    rctx.scopes = saved_scopes;
    result?;
    Ok(Value::String(produced))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_scope_lookup_shadowing() {
        let mut scopes = Scopes::new(map(json!({"x": 1, "y": 2})));
        scopes.push(map(json!({"x": 10})));
        assert_eq!(scopes.lookup(&["x".into()]), json!(10));
        assert_eq!(scopes.lookup(&["y".into()]), json!(2));
        scopes.pop();
        assert_eq!(scopes.lookup(&["x".into()]), json!(1));
    }

    #[test]
    fn test_assign_creates_path() {
        let mut scopes = Scopes::new(Map::new());
        scopes.assign(&["a".into(), "b".into(), "c".into()], json!(1));
        assert_eq!(
            scopes.lookup(&["a".into(), "b".into(), "c".into()]),
            json!(1)
        );
    }

    #[test]
    fn test_assign_targets_defining_scope() {
        let mut scopes = Scopes::new(map(json!({"x": 1})));
        scopes.push(Map::new());
        scopes.assign(&["x".into()], json!(5));
        scopes.pop();
        assert_eq!(scopes.lookup(&["x".into()]), json!(5));
    }

    #[test]
    fn test_flatten_inner_wins() {
        let mut scopes = Scopes::new(map(json!({"x": 1, "y": 2})));
        scopes.push(map(json!({"x": 10})));
        let flat = scopes.flatten();
        assert_eq!(flat.get("x"), Some(&json!(10)));
        assert_eq!(flat.get("y"), Some(&json!(2)));
    }
}
