use serde_json::{json, Value};
use stencil::{Engine, Memory, Options};

fn engine(files: &[(&str, &str)]) -> Engine {
    let loader: Memory = files.iter().copied().collect();
    Engine::with_loader(Options::default(), Box::new(loader)).unwrap()
}

#[test]
fn test_include_sees_current_context() {
    let engine = engine(&[("p.html", "[{{ x }}/{{ y }}]")]);
    assert_eq!(
        engine
            .render("{% include \"p.html\" %}", &json!({ "x": 1, "y": 2 }))
            .unwrap(),
        "[1/2]"
    );
}

#[test]
fn test_include_sees_set_variables() {
    let engine = engine(&[("p.html", "{{ n }}")]);
    assert_eq!(
        engine
            .render("{% set n = 7 %}{% include \"p.html\" %}", &Value::Null)
            .unwrap(),
        "7"
    );
}

#[test]
fn test_include_with_merges_over_context() {
    let engine = engine(&[("p.html", "[{{ x }}/{{ y }}]")]);
    assert_eq!(
        engine
            .render(
                "{% include \"p.html\" with data %}",
                &json!({ "x": 1, "y": 2, "data": { "x": 9 } })
            )
            .unwrap(),
        "[9/2]"
    );
}

#[test]
fn test_include_with_only_restricts_context() {
    let engine = engine(&[("p.html", "[{{ x }}/{{ y }}]")]);
    assert_eq!(
        engine
            .render(
                "{% include \"p.html\" with data only %}",
                &json!({ "x": 1, "y": 2, "data": { "x": 9 } })
            )
            .unwrap(),
        "[9/]"
    );
}

#[test]
fn test_include_bare_only_keeps_full_context() {
    // `only` restricts to the `with` value; without one there is nothing
    // to restrict to and the current context flows through.
    let engine = engine(&[("p.html", "[{{ x }}]")]);
    assert_eq!(
        engine
            .render("{% include \"p.html\" only %}", &json!({ "x": 1 }))
            .unwrap(),
        "[1]"
    );
}

#[test]
fn test_resolve_from_anchors_file_compiles() {
    let loader: Memory = [("pages/partial.html", "P")].into_iter().collect();
    let engine = Engine::with_loader(
        Options {
            resolve_from: Some("pages/index.html".into()),
            ..Options::default()
        },
        Box::new(loader),
    )
    .unwrap();
    assert_eq!(
        engine.render_file("partial.html", &Value::Null).unwrap(),
        "P"
    );
}

#[test]
fn test_include_ignore_missing() {
    let engine = engine(&[]);
    assert_eq!(
        engine
            .render("a{% include \"nope.html\" ignore missing %}b", &Value::Null)
            .unwrap(),
        "ab"
    );
}

#[test]
fn test_include_missing_is_an_error() {
    let engine = engine(&[]);
    let err = engine
        .render("{% include \"nope.html\" %}", &Value::Null)
        .unwrap_err();
    assert!(err.to_string().contains("nope.html"), "{err}");
}

#[test]
fn test_include_path_from_variable() {
    let engine = engine(&[("p.html", "P")]);
    assert_eq!(
        engine
            .render("{% include tpl %}", &json!({ "tpl": "p.html" }))
            .unwrap(),
        "P"
    );
}

#[test]
fn test_include_resolves_relative_to_including_file() {
    let engine = engine(&[
        ("pages/index.html", "<{% include \"partial.html\" %}>"),
        ("pages/partial.html", "P"),
    ]);
    assert_eq!(
        engine.render_file("pages/index.html", &Value::Null).unwrap(),
        "<P>"
    );
}

#[test]
fn test_include_inside_loop() {
    let engine = engine(&[("p.html", "{{ item }};")]);
    assert_eq!(
        engine
            .render(
                "{% for item in [1, 2] %}{% include \"p.html\" %}{% endfor %}",
                &Value::Null
            )
            .unwrap(),
        "1;2;"
    );
}

#[test]
fn test_import_namespaced_macro_call() {
    let engine = engine(&[(
        "macros.html",
        "{% macro hello(name) %}Hi {{ name }}{% endmacro %}",
    )]);
    assert_eq!(
        engine
            .render(
                "{% import \"macros.html\" as m %}{{ m.hello(\"Bo\") }}",
                &Value::Null
            )
            .unwrap(),
        "Hi Bo"
    );
}

#[test]
fn test_imported_macros_are_namespaced_only() {
    let engine = engine(&[(
        "macros.html",
        "{% macro hello(name) %}Hi {{ name }}{% endmacro %}",
    )]);
    assert_eq!(
        engine
            .render(
                "{% import \"macros.html\" as m %}[{{ hello(\"Bo\") }}]",
                &Value::Null
            )
            .unwrap(),
        "[]"
    );
}

#[test]
fn test_imported_macros_can_call_siblings() {
    let engine = engine(&[(
        "macros.html",
        "{% macro inner(x) %}[{{ x }}]{% endmacro %}{% macro outer(x) %}o{{ inner(x) }}{% endmacro %}",
    )]);
    assert_eq!(
        engine
            .render(
                "{% import \"macros.html\" as m %}{{ m.outer(\"z\") }}",
                &Value::Null
            )
            .unwrap(),
        "o[z]"
    );
}

#[test]
fn test_import_skips_non_macro_content() {
    let engine = engine(&[(
        "macros.html",
        "this text never renders{% macro one() %}1{% endmacro %}",
    )]);
    assert_eq!(
        engine
            .render("{% import \"macros.html\" as m %}{{ m.one() }}", &Value::Null)
            .unwrap(),
        "1"
    );
}

#[test]
fn test_import_missing_file_is_an_error() {
    let engine = engine(&[]);
    let err = engine
        .compile("{% import \"nope.html\" as m %}")
        .unwrap_err();
    assert!(err.to_string().contains("nope.html"), "{err}");
}

#[test]
fn test_unknown_namespaced_call_renders_empty() {
    let engine = engine(&[(
        "macros.html",
        "{% macro one() %}1{% endmacro %}",
    )]);
    assert_eq!(
        engine
            .render(
                "{% import \"macros.html\" as m %}[{{ m.two() }}]",
                &Value::Null
            )
            .unwrap(),
        "[]"
    );
}
