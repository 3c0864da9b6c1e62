//! Engine configuration and the public template API.
//!
//! An [`Engine`] owns the delimiter configuration, the loader, and the
//! filter/function/tag tables. It is cheap to clone and safe to share
//! across threads; registration methods take `&self` and synchronize
//! internally. Compiled templates keep a handle back to their engine, so a
//! [`Template`] can be rendered repeatedly with different locals.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use log::debug;
use serde_json::{Map, Value};
use stencil_parser::node::{Document, Node, ParseSettings};
use stencil_parser::{AutoEscape, ParseError, ParseHost, Syntax};

use crate::error::{Error, Result};
use crate::eval::{render_nodes, RenderContext};
use crate::filters::Filters;
use crate::heritage;
use crate::loaders::{FileSystem, Loader};
use crate::tags::{Tag, Tags};
use crate::value;

pub type NativeFn = dyn Fn(&[Value]) -> Result<Value> + Send + Sync;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// Default escaping applied to variable output.
    pub autoescape: AutoEscape,
    /// Open and close delimiters for variable output.
    pub var_controls: (String, String),
    /// Open and close delimiters for tags.
    pub tag_controls: (String, String),
    /// Open and close delimiters for comments.
    pub cmt_controls: (String, String),
    /// Locals merged under the context of every render.
    pub locals: Map<String, Value>,
    /// Whether compiled files are cached by resolved path.
    pub cache: bool,
    /// Filename attributed to source-string compiles, anchoring relative
    /// references and error messages.
    pub filename: Option<String>,
    /// Path that relative [`Engine::compile_file`] arguments resolve
    /// against.
    pub resolve_from: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            autoescape: AutoEscape::Html,
            var_controls: ("{{".into(), "}}".into()),
            tag_controls: ("{%".into(), "%}".into()),
            cmt_controls: ("{#".into(), "#}".into()),
            locals: Map::new(),
            cache: true,
            filename: None,
            resolve_from: None,
        }
    }
}

impl Options {
    pub(crate) fn syntax(&self) -> Syntax {
        Syntax {
            expr_start: self.var_controls.0.clone(),
            expr_end: self.var_controls.1.clone(),
            block_start: self.tag_controls.0.clone(),
            block_end: self.tag_controls.1.clone(),
            comment_start: self.cmt_controls.0.clone(),
            comment_end: self.cmt_controls.1.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.syntax()
            .validate()
            .map_err(|err| Error::Options(err.message().to_owned()))
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|err| err.into_inner())
}

pub(crate) struct Inner {
    pub(crate) options: Options,
    loader: Box<dyn Loader>,
    filters: RwLock<Filters>,
    functions: RwLock<HashMap<String, Arc<NativeFn>>>,
    tags: RwLock<Tags>,
    cache: RwLock<HashMap<String, Arc<CompiledTemplate>>>,
}

impl Inner {
    pub(crate) fn filters(&self) -> RwLockReadGuard<'_, Filters> {
        read_lock(&self.filters)
    }

    pub(crate) fn tag(&self, name: &str) -> Option<Arc<dyn Tag>> {
        read_lock(&self.tags).get(name)
    }

    pub(crate) fn function(&self, name: &str) -> Option<Arc<NativeFn>> {
        read_lock(&self.functions).get(name).cloned()
    }

    pub(crate) fn loader(&self) -> &dyn Loader {
        &*self.loader
    }

    pub(crate) fn compile_source(
        &self,
        source: &str,
        filename: Option<&str>,
    ) -> Result<Arc<CompiledTemplate>> {
        self.compile_source_with(source, filename, &self.options)
    }

    pub(crate) fn compile_source_with(
        &self,
        source: &str,
        filename: Option<&str>,
        options: &Options,
    ) -> Result<Arc<CompiledTemplate>> {
        let syntax = options.syntax();
        let tags = read_lock(&self.tags);
        let filters = read_lock(&self.filters);
        let host = Host {
            loader: &*self.loader,
            tags: &tags,
            filters: &filters,
            syntax: &syntax,
            autoescape: options.autoescape,
        };
        let settings = ParseSettings {
            syntax: &syntax,
            autoescape: options.autoescape,
            filename,
        };
        let doc = Document::parse(source, &settings, &*tags, &*filters, &host)?;
        let nodes = heritage::flatten(doc, filename, &host)?;
        Ok(Arc::new(CompiledTemplate {
            nodes,
            filename: filename.map(str::to_owned),
        }))
    }

    pub(crate) fn compile_file(
        &self,
        path: &str,
        from: Option<&str>,
    ) -> Result<Arc<CompiledTemplate>> {
        let resolved = self.loader.resolve(path, from);
        if self.options.cache {
            if let Some(hit) = read_lock(&self.cache).get(&resolved) {
                debug!("template cache hit for {resolved}");
                return Ok(hit.clone());
            }
        }
        let source = self.loader.load(&resolved)?;
        let compiled = self.compile_source(&source, Some(&resolved))?;
        if self.options.cache {
            self.cache
                .write()
                .unwrap_or_else(|err| err.into_inner())
                .insert(resolved, compiled.clone());
        }
        Ok(compiled)
    }
}

/// Parse-time view over the engine used for nested template access, built
/// while the table locks are already held so nested parses never re-enter
/// them.
pub(crate) struct Host<'a> {
    pub(crate) loader: &'a dyn Loader,
    pub(crate) tags: &'a Tags,
    pub(crate) filters: &'a Filters,
    pub(crate) syntax: &'a Syntax,
    pub(crate) autoescape: AutoEscape,
}

impl Host<'_> {
    /// Resolves, loads and parses a referenced template, returning its
    /// resolved path alongside the document.
    pub(crate) fn load_parsed(
        &self,
        path: &str,
        from: Option<&str>,
    ) -> Result<(String, Document), ParseError> {
        let resolved = self.loader.resolve(path, from);
        let source = self
            .loader
            .load(&resolved)
            .map_err(|err| ParseError::new(err.to_string(), None, from))?;
        let settings = ParseSettings {
            syntax: self.syntax,
            autoescape: self.autoescape,
            filename: Some(&resolved),
        };
        let doc = Document::parse(&source, &settings, self.tags, self.filters, self)?;
        Ok((resolved, doc))
    }
}

impl ParseHost for Host<'_> {
    fn parse_file(&self, path: &str, from: Option<&str>) -> Result<Document, ParseError> {
        self.load_parsed(path, from).map(|(_, doc)| doc)
    }
}

/// A parsed template with inheritance already applied.
pub(crate) struct CompiledTemplate {
    pub(crate) nodes: Vec<Node>,
    pub(crate) filename: Option<String>,
}

/// Renders a compiled template against a fully built base context.
pub(crate) fn render_template(
    env: &Inner,
    tpl: &CompiledTemplate,
    base: Map<String, Value>,
) -> Result<String> {
    let mut rctx = RenderContext::new(env, base, tpl.filename.clone());
    render_nodes(&tpl.nodes, &mut rctx)?;
    Ok(rctx.out)
}

/// The template engine. Cloning is cheap and shares all state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Creates an engine with the default filesystem loader.
    pub fn new(options: Options) -> Result<Self> {
        Self::with_loader(options, Box::new(FileSystem::new()))
    }

    pub fn with_loader(options: Options, loader: Box<dyn Loader>) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                options,
                loader,
                filters: RwLock::new(crate::filters::builtins()),
                functions: RwLock::new(HashMap::new()),
                tags: RwLock::new(Tags::builtins()),
                cache: RwLock::new(HashMap::new()),
            }),
        })
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Registers a custom filter. Safe filters mark their output as not
    /// needing auto-escaping.
    pub fn set_filter(
        &self,
        name: &str,
        safe: bool,
        func: impl Fn(Value, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) {
        self.inner
            .filters
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .set(name, safe, func);
    }

    /// Registers a function callable from expressions.
    pub fn set_function(
        &self,
        name: &str,
        func: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) {
        self.inner
            .functions
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .insert(name.to_owned(), Arc::new(func));
    }

    /// Registers a custom tag.
    pub fn set_tag(&self, name: &str, tag: Arc<dyn Tag>) {
        self.inner
            .tags
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .set(name, tag);
    }

    fn template(&self, tpl: Arc<CompiledTemplate>) -> Template {
        Template {
            engine: self.clone(),
            locals: self.inner.options.locals.clone(),
            tpl,
        }
    }

    /// Compiles a template from a source string. The engine's
    /// `Options::filename`, when set, names the template.
    pub fn compile(&self, source: &str) -> Result<Template> {
        let filename = self.inner.options.filename.clone();
        Ok(self.template(self.inner.compile_source(source, filename.as_deref())?))
    }

    /// Compiles a source string with one-off options layered over the
    /// engine's: delimiters, autoescape, `filename` and `locals` all come
    /// from `options` for this template, while the loader and the
    /// filter/function/tag tables stay the engine's.
    pub fn compile_with(&self, source: &str, options: &Options) -> Result<Template> {
        options.validate()?;
        let tpl = self
            .inner
            .compile_source_with(source, options.filename.as_deref(), options)?;
        Ok(Template {
            engine: self.clone(),
            locals: value::merge(&self.inner.options.locals, &options.locals),
            tpl,
        })
    }

    /// Compiles a source string under a filename, which anchors relative
    /// `extends`/`include`/`import` references and error messages.
    pub fn compile_named(&self, source: &str, filename: &str) -> Result<Template> {
        Ok(self.template(self.inner.compile_source(source, Some(filename))?))
    }

    /// Compiles a template file through the loader, honoring the cache.
    /// Relative paths resolve against `Options::resolve_from` when set.
    pub fn compile_file(&self, path: &str) -> Result<Template> {
        let from = self.inner.options.resolve_from.clone();
        Ok(self.template(self.inner.compile_file(path, from.as_deref())?))
    }

    /// One-shot compile and render of a source string.
    pub fn render(&self, source: &str, locals: &Value) -> Result<String> {
        self.compile(source)?.render(locals)
    }

    /// One-shot compile and render of a template file.
    pub fn render_file(&self, path: &str, locals: &Value) -> Result<String> {
        self.compile_file(path)?.render(locals)
    }

    /// Drops all cached compiled files.
    pub fn invalidate_cache(&self) {
        self.inner
            .cache
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .clear();
    }
}

/// A compiled template bound to its engine.
#[derive(Clone)]
pub struct Template {
    engine: Engine,
    locals: Map<String, Value>,
    tpl: Arc<CompiledTemplate>,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("filename", &self.tpl.filename)
            .finish_non_exhaustive()
    }
}

impl Template {
    /// Renders with the given locals merged over the template's default
    /// locals. `locals` must be an object or `null`.
    pub fn render(&self, locals: &Value) -> Result<String> {
        let mut base = self.locals.clone();
        match locals {
            Value::Null => {}
            Value::Object(map) => base = value::merge(&base, map),
            other => {
                return Err(Error::Render(format!(
                    "render context must be an object, got {}",
                    value::display(other)
                )))
            }
        }
        render_template(&self.engine.inner, &self.tpl, base)
    }
}
