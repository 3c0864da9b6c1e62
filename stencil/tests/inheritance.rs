use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use stencil::{Engine, Error, Loader, Memory, Options};

fn engine(files: &[(&str, &str)]) -> Engine {
    let loader: Memory = files.iter().copied().collect();
    Engine::with_loader(Options::default(), Box::new(loader)).unwrap()
}

#[test]
fn test_block_default_content() {
    let engine = engine(&[]);
    assert_eq!(
        engine
            .render("<title>{% block title %}Default{% endblock %}</title>", &Value::Null)
            .unwrap(),
        "<title>Default</title>"
    );
}

#[test]
fn test_extends_overrides_block() {
    let engine = engine(&[
        ("base.html", "<title>{% block title %}Base{% endblock %}</title>"),
        (
            "child.html",
            "{% extends \"base.html\" %}{% block title %}Child{% endblock %}",
        ),
    ]);
    assert_eq!(
        engine.render_file("child.html", &Value::Null).unwrap(),
        "<title>Child</title>"
    );
}

#[test]
fn test_unoverridden_block_keeps_base_content() {
    let engine = engine(&[
        (
            "base.html",
            "{% block a %}A{% endblock %}|{% block b %}B{% endblock %}",
        ),
        (
            "child.html",
            "{% extends \"base.html\" %}{% block b %}beta{% endblock %}",
        ),
    ]);
    assert_eq!(
        engine.render_file("child.html", &Value::Null).unwrap(),
        "A|beta"
    );
}

#[test]
fn test_parent_splices_base_content() {
    let engine = engine(&[
        ("base.html", "({% block main %}M{% endblock %})"),
        (
            "child.html",
            "{% extends \"base.html\" %}{% block main %}{% parent %}+C{% endblock %}",
        ),
    ]);
    assert_eq!(
        engine.render_file("child.html", &Value::Null).unwrap(),
        "(M+C)"
    );
}

#[test]
fn test_three_level_chain() {
    let engine = engine(&[
        ("a.html", "{% block t %}A{% endblock %}"),
        (
            "b.html",
            "{% extends \"a.html\" %}{% block t %}{% parent %}B{% endblock %}",
        ),
        (
            "c.html",
            "{% extends \"b.html\" %}{% block t %}{% parent %}C{% endblock %}",
        ),
    ]);
    assert_eq!(engine.render_file("c.html", &Value::Null).unwrap(), "ABC");
}

#[test]
fn test_middle_template_layout_is_ignored() {
    // Only the outermost ancestor contributes layout; intermediate
    // templates contribute block overrides.
    let engine = engine(&[
        ("a.html", "[{% block t %}A{% endblock %}]"),
        (
            "b.html",
            "{% extends \"a.html\" %}ignored{% block t %}B{% endblock %}",
        ),
        ("c.html", "{% extends \"b.html\" %}"),
    ]);
    assert_eq!(engine.render_file("c.html", &Value::Null).unwrap(), "[B]");
}

#[test]
fn test_unplaced_child_blocks_are_prepended() {
    let engine = engine(&[
        ("base.html", "L:{% block main %}M{% endblock %}"),
        (
            "child.html",
            "{% extends \"base.html\" %}{% block extra %}X{% endblock %}{% block main %}C{% endblock %}",
        ),
    ]);
    assert_eq!(
        engine.render_file("child.html", &Value::Null).unwrap(),
        "XL:C"
    );
}

#[test]
fn test_blocks_render_against_the_context() {
    let engine = engine(&[
        ("base.html", "{% block main %}{% endblock %}"),
        (
            "child.html",
            "{% extends \"base.html\" %}{% block main %}{{ who }}{% endblock %}",
        ),
    ]);
    assert_eq!(
        engine
            .render_file("child.html", &json!({ "who": "Ana" }))
            .unwrap(),
        "Ana"
    );
}

#[test]
fn test_extends_resolves_relative_to_child() {
    let engine = engine(&[
        ("base.html", "[{% block t %}{% endblock %}]"),
        (
            "pages/child.html",
            "{% extends \"../base.html\" %}{% block t %}p{% endblock %}",
        ),
    ]);
    assert_eq!(
        engine.render_file("pages/child.html", &Value::Null).unwrap(),
        "[p]"
    );
}

#[test]
fn test_second_extends_is_rejected() {
    let engine = engine(&[("base.html", "B")]);
    let err = engine
        .compile("{% extends \"base.html\" %}{% extends \"base.html\" %}")
        .unwrap_err();
    assert!(err.to_string().contains("extends"), "{err}");
}

#[test]
fn test_circular_extends_is_detected() {
    let engine = engine(&[
        ("a.html", "{% extends \"b.html\" %}"),
        ("b.html", "{% extends \"a.html\" %}"),
    ]);
    let err = engine.render_file("a.html", &Value::Null).unwrap_err();
    assert!(err.to_string().contains("circular extends"), "{err}");
}

struct Counting {
    inner: Memory,
    loads: Arc<AtomicUsize>,
}

impl Loader for Counting {
    fn resolve(&self, to: &str, from: Option<&str>) -> String {
        self.inner.resolve(to, from)
    }

    fn load(&self, path: &str) -> Result<String, Error> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(path)
    }
}

fn counting_engine(options: Options) -> (Engine, Arc<AtomicUsize>) {
    let loads = Arc::new(AtomicUsize::new(0));
    let loader = Counting {
        inner: [("a.html", "A{{ x }}")].into_iter().collect(),
        loads: loads.clone(),
    };
    let engine = Engine::with_loader(options, Box::new(loader)).unwrap();
    (engine, loads)
}

#[test]
fn test_compiled_files_are_cached() {
    let (engine, loads) = counting_engine(Options::default());
    assert_eq!(engine.render_file("a.html", &json!({ "x": 1 })).unwrap(), "A1");
    assert_eq!(engine.render_file("a.html", &json!({ "x": 2 })).unwrap(), "A2");
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_invalidate_cache_reloads() {
    let (engine, loads) = counting_engine(Options::default());
    engine.render_file("a.html", &Value::Null).unwrap();
    engine.invalidate_cache();
    engine.render_file("a.html", &Value::Null).unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[test]
fn test_cache_can_be_disabled() {
    let (engine, loads) = counting_engine(Options {
        cache: false,
        ..Options::default()
    });
    engine.render_file("a.html", &Value::Null).unwrap();
    engine.render_file("a.html", &Value::Null).unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}
