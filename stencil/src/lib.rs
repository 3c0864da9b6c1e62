#![deny(elided_lifetimes_in_paths)]
#![deny(unreachable_pub)]

//! stencil is a runtime template engine. Templates mix literal text with
//! `{{ ... }}` output expressions, `{% ... %}` tags and `{# ... #}`
//! comments, and render against JSON context data.
//!
//! ```
//! use serde_json::json;
//! use stencil::{Engine, Options};
//!
//! let engine = Engine::new(Options::default()).unwrap();
//! let out = engine
//!     .render("Hi {{ name }}!", &json!({ "name": "Zoe" }))
//!     .unwrap();
//! assert_eq!(out, "Hi Zoe!");
//! ```
//!
//! # Feature highlights
//!
//! * Filters with `|` chaining, and HTML/JS auto-escaping that safe
//!   filters such as `safe` opt out of
//! * Control tags: `if`/`elseif`/`else`, `for` with a `loop` object,
//!   `set`, `filter`, `autoescape`, `raw`, `spaceless`
//! * Template composition: `extends`/`block`/`parent` inheritance,
//!   `include`, and `macro`/`import`
//! * Pluggable [`Loader`]s, configurable delimiters, and custom filters,
//!   functions and tags registered on a running [`Engine`]
//!
//! Compiled [`Template`]s are cheap to clone and render repeatedly;
//! file templates are cached by resolved path until
//! [`Engine::invalidate_cache`] is called.

mod engine;
mod error;
mod eval;
mod filters;
mod heritage;
pub mod loaders;
mod tags;
mod value;

pub use engine::{Engine, NativeFn, Options, Template};
pub use error::{Error, ParseError, Result};
pub use eval::RenderContext;
pub use filters::FilterFn;
pub use loaders::{FileSystem, Loader, Memory};
pub use tags::Tag;

pub use serde_json::Value;
pub use stencil_parser::expr::{BinOp, Expr};
pub use stencil_parser::node::{Arg, Node, TagNode};
pub use stencil_parser::{AutoEscape, TagContext, Token, TokenKind, TokenParser};
