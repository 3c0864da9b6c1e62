//! Template document parsing.
//!
//! A source string is split on the configured delimiters into literal text,
//! variable chunks and tag chunks. Tags with bodies are tracked on an open
//! stack; a top-level `block` additionally registers itself into the
//! document's block map so the inheritance resolver can find it without
//! walking the tree.

use std::collections::HashMap;

use regex::Regex;

use crate::expr::Expr;
use crate::lexer;
use crate::{
    AutoEscape, FilterSet, ParseError, ParseHost, Syntax, TagContext, TagSet, TokenParser,
};

/// A node of the parsed template tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    /// A `{{ ... }}` output expression.
    Output { expr: Expr, line: usize },
    Tag(TagNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagNode {
    pub name: String,
    pub args: Vec<Arg>,
    pub content: Vec<Node>,
    pub ends: bool,
    pub block_level: bool,
    pub line: usize,
}

/// A parsed tag argument. The shape is tag-specific; each tag documents the
/// argument layout its renderer expects.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Expr(Expr),
    /// A bare word: block names, loop variables, macro parameters.
    Ident(String),
    /// An unquoted string literal, e.g. a template path.
    Str(String),
    /// Assignment target path for `set`.
    Target(Vec<String>),
    /// Assignment operator for `set` (`=`, `+=`, ...).
    Op(String),
    /// A keyword flag such as `only` or `ignore_missing`.
    Flag(&'static str),
    /// Macro definitions captured by `import`.
    Macros(Vec<MacroDef>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Node>,
}

/// A fully parsed template file, before inheritance resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Path named by an `extends` tag, if any.
    pub parent: Option<String>,
    pub nodes: Vec<Node>,
    /// Top-level blocks by name.
    pub blocks: HashMap<String, TagNode>,
}

/// Per-parse configuration.
pub struct ParseSettings<'a> {
    pub syntax: &'a Syntax,
    pub autoescape: AutoEscape,
    pub filename: Option<&'a str>,
}

impl Document {
    pub fn parse(
        source: &str,
        settings: &ParseSettings<'_>,
        tags: &dyn TagSet,
        filters: &dyn FilterSet,
        host: &dyn ParseHost,
    ) -> Result<Document, ParseError> {
        settings.syntax.validate()?;
        let src = source.replace("\r\n", "\n");
        let splitter = splitter(settings.syntax);

        let mut parser = DocParser {
            settings,
            tags,
            filters,
            host,
            line: 1,
            parent: None,
            nodes: Vec::new(),
            blocks: HashMap::new(),
            stack: Vec::new(),
            in_raw: false,
            escape: settings.autoescape,
            strip_next: false,
        };

        let mut last = 0;
        for m in splitter.find_iter(&src) {
            let text = &src[last..m.start()];
            parser.text(text);
            parser.line += newlines(text);
            let chunk = m.as_str();
            parser.chunk(chunk)?;
            parser.line += newlines(chunk);
            last = m.end();
        }
        parser.text(&src[last..]);

        if let Some(open) = parser.stack.last() {
            return Err(ParseError::new(
                format!("Unexpected end of template; expecting \"end{}\"", open.name),
                Some(parser.line),
                settings.filename,
            ));
        }

        Ok(Document {
            parent: parser.parent,
            nodes: parser.nodes,
            blocks: parser.blocks,
        })
    }
}

fn splitter(syntax: &Syntax) -> Regex {
    let pattern = format!(
        "(?s){co}.*?{cc}|{bo}.*?{bc}|{eo}.*?{ec}",
        co = regex::escape(&syntax.comment_start),
        cc = regex::escape(&syntax.comment_end),
        bo = regex::escape(&syntax.block_start),
        bc = regex::escape(&syntax.block_end),
        eo = regex::escape(&syntax.expr_start),
        ec = regex::escape(&syntax.expr_end),
    );
    Regex::new(&pattern).expect("delimiters escape to a valid pattern")
}

fn newlines(s: &str) -> usize {
    s.bytes().filter(|b| *b == b'\n').count()
}

enum ChunkKind {
    Var,
    Tag,
    Comment,
}

struct DocParser<'a> {
    settings: &'a ParseSettings<'a>,
    tags: &'a dyn TagSet,
    filters: &'a dyn FilterSet,
    host: &'a dyn ParseHost,
    line: usize,
    parent: Option<String>,
    nodes: Vec<Node>,
    blocks: HashMap<String, TagNode>,
    stack: Vec<TagNode>,
    in_raw: bool,
    escape: AutoEscape,
    strip_next: bool,
}

impl DocParser<'_> {
    fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError::new(msg, Some(self.line), self.settings.filename)
    }

    fn sink(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(top) => &mut top.content,
            None => &mut self.nodes,
        }
    }

    fn text(&mut self, text: &str) {
        let text = if self.strip_next && !self.in_raw {
            self.strip_next = false;
            text.trim_start()
        } else {
            text
        };
        if !text.is_empty() {
            self.sink().push(Node::Text(text.to_owned()));
        }
    }

    fn push_tag(&mut self, node: TagNode) {
        if self.stack.is_empty() && node.name == "block" {
            if let Some(Arg::Ident(name)) = node.args.first() {
                self.blocks.insert(name.clone(), node.clone());
            }
        }
        self.sink().push(Node::Tag(node));
    }

    fn strip_previous_text(&mut self) {
        if let Some(Node::Text(t)) = self.sink().last_mut() {
            let stripped = t.trim_end().to_owned();
            *t = stripped;
        }
    }

    fn chunk(&mut self, chunk: &str) -> Result<(), ParseError> {
        let syntax = self.settings.syntax;
        let (kind, open, close) = if chunk.starts_with(&syntax.comment_start) {
            (ChunkKind::Comment, &syntax.comment_start, &syntax.comment_end)
        } else if chunk.starts_with(&syntax.block_start) {
            (ChunkKind::Tag, &syntax.block_start, &syntax.block_end)
        } else {
            (ChunkKind::Var, &syntax.expr_start, &syntax.expr_end)
        };

        let mut inner = &chunk[open.len()..chunk.len() - close.len()];
        let strip_before = inner.starts_with('-');
        if strip_before {
            inner = &inner[1..];
        }
        let strip_after = inner.ends_with('-');
        if strip_after {
            inner = &inner[..inner.len() - 1];
        }
        let inner = inner.trim();

        if self.in_raw {
            // Everything inside raw passes through verbatim, except the
            // closing endraw tag itself.
            if matches!(kind, ChunkKind::Tag) && inner == "endraw" {
                return self.close_tag("raw", strip_before, strip_after);
            }
            self.sink().push(Node::Text(chunk.to_owned()));
            return Ok(());
        }

        match kind {
            ChunkKind::Comment => Ok(()),
            ChunkKind::Var => {
                if strip_before {
                    self.strip_previous_text();
                }
                if strip_after {
                    self.strip_next = true;
                }
                let tokens = lexer::read(inner);
                let expr = TokenParser::new(
                    tokens,
                    self.filters,
                    self.escape,
                    self.line,
                    self.settings.filename,
                )
                .parse()?;
                let line = self.line;
                self.sink().push(Node::Output { expr, line });
                Ok(())
            }
            ChunkKind::Tag => {
                if let Some(name) = inner.strip_prefix("end") {
                    let name = name.split_whitespace().next().unwrap_or(name).to_owned();
                    self.close_tag(&name, strip_before, strip_after)
                } else {
                    self.open_tag(inner, strip_before, strip_after)
                }
            }
        }
    }

    fn close_tag(
        &mut self,
        name: &str,
        strip_before: bool,
        strip_after: bool,
    ) -> Result<(), ParseError> {
        match self.stack.last() {
            Some(top) if top.name == name => {}
            _ => return Err(self.err(format!("Unexpected end of tag \"{name}\""))),
        }
        let mut node = self.stack.pop().expect("matched above");
        if strip_before {
            if let Some(Node::Text(t)) = node.content.last_mut() {
                *t = t.trim_end().to_owned();
            }
        }
        if strip_after {
            self.strip_next = true;
        }
        match name {
            "autoescape" => self.escape = self.settings.autoescape,
            "raw" => self.in_raw = false,
            _ => {}
        }
        self.push_tag(node);
        Ok(())
    }

    fn open_tag(
        &mut self,
        inner: &str,
        strip_before: bool,
        strip_after: bool,
    ) -> Result<(), ParseError> {
        if strip_before {
            self.strip_previous_text();
        }
        if strip_after {
            self.strip_next = true;
        }

        let (name, rest) = match inner.find(char::is_whitespace) {
            Some(at) => (&inner[..at], inner[at..].trim()),
            None => (inner, ""),
        };

        let tokens = lexer::read(rest);
        let mut parser = TokenParser::new(
            tokens,
            self.filters,
            AutoEscape::Off,
            self.line,
            self.settings.filename,
        );
        let mut ctx = TagContext {
            line: self.line,
            filename: self.settings.filename.map(str::to_owned),
            open_tag: self.stack.last().map(|t| t.name.clone()),
            autoescape: self.settings.autoescape,
            host: self.host,
        };

        let meta = match self.tags.parse_tag(name, &mut parser, &mut ctx) {
            Some(result) => result?,
            None => return Err(self.err(format!("Unexpected tag \"{name}\""))),
        };

        if name == "extends" {
            if self.parent.is_some() {
                return Err(self.err("Only one extends tag may be used per template"));
            }
            match meta.args.first() {
                Some(Arg::Str(path)) => self.parent = Some(path.clone()),
                _ => return Err(self.err("Unexpected tag \"extends\"")),
            }
            return Ok(());
        }

        if name == "autoescape" {
            self.escape = match meta.args.first() {
                Some(Arg::Ident(mode)) => match mode.as_str() {
                    "false" => AutoEscape::Off,
                    "js" => AutoEscape::Js,
                    _ => AutoEscape::Html,
                },
                _ => self.settings.autoescape,
            };
        }

        let node = TagNode {
            name: name.to_owned(),
            args: meta.args,
            content: Vec::new(),
            ends: meta.ends,
            block_level: meta.block_level,
            line: self.line,
        };

        if node.name == "raw" {
            self.in_raw = true;
        }

        if node.ends {
            self.stack.push(node);
        } else {
            self.push_tag(node);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoFilters;

    impl FilterSet for NoFilters {
        fn has_filter(&self, _: &str) -> bool {
            true
        }
        fn is_safe(&self, name: &str) -> bool {
            name == "safe" || name == "raw"
        }
    }

    struct NoTags;

    impl TagSet for NoTags {
        fn parse_tag(
            &self,
            _: &str,
            _: &mut TokenParser<'_>,
            _: &mut TagContext<'_>,
        ) -> Option<Result<crate::TagMeta, ParseError>> {
            None
        }
    }

    struct NoHost;

    impl ParseHost for NoHost {
        fn parse_file(&self, path: &str, _: Option<&str>) -> Result<Document, ParseError> {
            Err(ParseError::new(
                format!("Unable to load template {path}"),
                None,
                None,
            ))
        }
    }

    fn parse(source: &str) -> Result<Document, ParseError> {
        let syntax = Syntax::default();
        let settings = ParseSettings {
            syntax: &syntax,
            autoescape: AutoEscape::Off,
            filename: None,
        };
        Document::parse(source, &settings, &NoTags, &NoFilters, &NoHost)
    }

    #[test]
    fn test_plain_text() {
        let doc = parse("hello world").unwrap();
        assert_eq!(doc.nodes, vec![Node::Text("hello world".into())]);
    }

    #[test]
    fn test_comments_are_dropped() {
        let doc = parse("a{# gone #}b").unwrap();
        assert_eq!(
            doc.nodes,
            vec![Node::Text("a".into()), Node::Text("b".into())]
        );
    }

    #[test]
    fn test_variable_node() {
        let doc = parse("{{ name }}").unwrap();
        match &doc.nodes[0] {
            Node::Output { expr, line } => {
                assert_eq!(*expr, Expr::Path(vec!["name".into()]));
                assert_eq!(*line, 1);
            }
            other => panic!("expected output node, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_tag_errors() {
        let err = parse("{% bogus %}").unwrap_err();
        assert!(err.message().contains("Unexpected tag \"bogus\""));
    }

    #[test]
    fn test_line_numbers_in_errors() {
        let err = parse("a\nb\n{% bogus %}").unwrap_err();
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn test_error_display_format() {
        let err = ParseError::new("Unexpected tag \"x\"", Some(4), Some("a.html"));
        assert_eq!(
            err.to_string(),
            "Unexpected tag \"x\" on line 4 in file a.html."
        );
    }
}
