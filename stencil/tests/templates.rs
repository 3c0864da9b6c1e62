use serde_json::{json, Map, Value};
use stencil::{AutoEscape, Engine, Options};

fn render(source: &str, locals: Value) -> String {
    let engine = Engine::new(Options::default()).unwrap();
    engine.render(source, &locals).unwrap()
}

#[test]
fn test_plain_text_is_identity() {
    assert_eq!(render("hello world", Value::Null), "hello world");
    assert_eq!(render(r"c:\path\to\nothing", Value::Null), r"c:\path\to\nothing");
}

#[test]
fn test_variable_substitution() {
    assert_eq!(
        render("Hi {{ name }}!", json!({ "name": "Zoe" })),
        "Hi Zoe!"
    );
}

#[test]
fn test_undefined_variable_renders_empty() {
    assert_eq!(render("[{{ missing }}]", json!({})), "[]");
    assert_eq!(render("[{{ a.b.c }}]", json!({ "a": 1 })), "[]");
}

#[test]
fn test_comments_are_dropped() {
    assert_eq!(render("a{# not here #}b", Value::Null), "ab");
    assert_eq!(render("a{# {{ x }} {% if %} #}b", Value::Null), "ab");
}

#[test]
fn test_expression_output() {
    assert_eq!(render("{{ 1 + 2 }}", Value::Null), "3");
    assert_eq!(render("{{ 10 / 4 }}", Value::Null), "2.5");
    assert_eq!(render("{{ 2 * 3 - 1 }}", Value::Null), "5");
    assert_eq!(render("{{ (1 + 2) * 3 }}", Value::Null), "9");
    assert_eq!(render("{{ 2 gt 1 }}", Value::Null), "true");
    assert_eq!(render("{{ \"a\" + 1 }}", Value::Null), "a1");
}

#[test]
fn test_path_and_index_lookup() {
    let ctx = json!({
        "user": { "name": "Ada" },
        "items": [10, 20, 30],
        "keys": { "k": "v" },
    });
    assert_eq!(render("{{ user.name }}", ctx.clone()), "Ada");
    assert_eq!(render("{{ items[1] }}", ctx.clone()), "20");
    assert_eq!(render("{{ items.2 }}", ctx.clone()), "30");
    assert_eq!(render("{{ keys[\"k\"] }}", ctx), "v");
}

#[test]
fn test_array_and_object_display() {
    assert_eq!(render("{{ v }}", json!({ "v": [1, 2, 3] })), "1,2,3");
    assert_eq!(render("{{ v }}", json!({ "v": [1, [2, 3]] })), "1,2,3");
    assert_eq!(render("{{ v }}", json!({ "v": { "a": 1 } })), "[object Object]");
    assert_eq!(render("{{ v }}", json!({ "v": null })), "");
}

#[test]
fn test_filter_chain_applies_left_to_right() {
    assert_eq!(
        render("{{ v|first|upper }}", json!({ "v": ["apple", "pear"] })),
        "APPLE"
    );
    assert_eq!(
        render("{{ v|upper|first }}", json!({ "v": "apple" })),
        "A"
    );
}

#[test]
fn test_filter_arguments() {
    assert_eq!(
        render("{{ s|replace(\"a\", \"o\", \"g\") }}", json!({ "s": "banana" })),
        "bonono"
    );
    assert_eq!(
        render("{{ v|join(\" - \") }}", json!({ "v": [1, 2] })),
        "1 - 2"
    );
    assert_eq!(
        render("{{ missing|default(\"fallback\") }}", json!({})),
        "fallback"
    );
}

#[test]
fn test_autoescape_html_by_default() {
    assert_eq!(
        render("{{ v }}", json!({ "v": "<b>R&B</b>" })),
        "&lt;b&gt;R&amp;B&lt;/b&gt;"
    );
}

#[test]
fn test_safe_filters_skip_escaping() {
    assert_eq!(render("{{ v|safe }}", json!({ "v": "<b>" })), "<b>");
    assert_eq!(render("{{ v|raw }}", json!({ "v": "<b>" })), "<b>");
    assert_eq!(render("{{ v|upper|safe }}", json!({ "v": "<b>" })), "<B>");
}

#[test]
fn test_autoescape_off_option() {
    let engine = Engine::new(Options {
        autoescape: AutoEscape::Off,
        ..Options::default()
    })
    .unwrap();
    assert_eq!(
        engine.render("{{ v }}", &json!({ "v": "<b>" })).unwrap(),
        "<b>"
    );
}

#[test]
fn test_autoescape_js_option() {
    let engine = Engine::new(Options {
        autoescape: AutoEscape::Js,
        ..Options::default()
    })
    .unwrap();
    assert_eq!(
        engine.render("{{ v }}", &json!({ "v": "\"quoted\"" })).unwrap(),
        "\\u0022quoted\\u0022"
    );
}

#[test]
fn test_function_output_is_not_escaped() {
    let engine = Engine::new(Options::default()).unwrap();
    engine.set_function("tag", |args| {
        let name = args.first().and_then(Value::as_str).unwrap_or("div");
        Ok(Value::String(format!("<{name}>")))
    });
    assert_eq!(
        engine.render("{{ tag(\"p\") }}", &Value::Null).unwrap(),
        "<p>"
    );
}

#[test]
fn test_unknown_function_renders_empty() {
    assert_eq!(render("[{{ nosuch() }}]", Value::Null), "[]");
    assert_eq!(render("[{{ nosuch(1, 2) }}]", Value::Null), "[]");
}

#[test]
fn test_custom_filter() {
    let engine = Engine::new(Options::default()).unwrap();
    engine.set_filter("excite", false, |v, _| {
        Ok(Value::String(format!(
            "{}!",
            v.as_str().unwrap_or_default()
        )))
    });
    assert_eq!(
        engine.render("{{ w|excite }}", &json!({ "w": "wow" })).unwrap(),
        "wow!"
    );
}

#[test]
fn test_custom_safe_filter_skips_escaping() {
    let engine = Engine::new(Options::default()).unwrap();
    engine.set_filter("em", true, |v, _| {
        Ok(Value::String(format!(
            "<em>{}</em>",
            v.as_str().unwrap_or_default()
        )))
    });
    assert_eq!(
        engine.render("{{ w|em }}", &json!({ "w": "hi" })).unwrap(),
        "<em>hi</em>"
    );
}

#[test]
fn test_unknown_filter_is_a_parse_error() {
    let engine = Engine::new(Options::default()).unwrap();
    let err = engine.compile("{{ v|nosuch }}").unwrap_err();
    assert!(err.to_string().contains("nosuch"), "{err}");
}

#[test]
fn test_engine_locals_merge_under_render_locals() {
    let mut locals = Map::new();
    locals.insert("site".into(), json!("Stencil"));
    locals.insert("page".into(), json!("default"));
    let engine = Engine::new(Options {
        locals,
        ..Options::default()
    })
    .unwrap();
    assert_eq!(
        engine
            .render("{{ site }}/{{ page }}", &json!({ "page": "about" }))
            .unwrap(),
        "Stencil/about"
    );
}

#[test]
fn test_render_context_must_be_an_object() {
    let engine = Engine::new(Options::default()).unwrap();
    assert!(engine.render("x", &json!(5)).is_err());
    assert!(engine.render("x", &json!("s")).is_err());
    assert!(engine.render("x", &Value::Null).is_ok());
}

#[test]
fn test_custom_delimiters() {
    let engine = Engine::new(Options {
        var_controls: ("<$".into(), "$>".into()),
        tag_controls: ("<%".into(), "%>".into()),
        cmt_controls: ("<#".into(), "#>".into()),
        ..Options::default()
    })
    .unwrap();
    assert_eq!(
        engine
            .render(
                "<% if ok %><$ x $><% endif %><# gone #>{{ x }}",
                &json!({ "ok": true, "x": 1 })
            )
            .unwrap(),
        "1{{ x }}"
    );
}

#[test]
fn test_delimiters_must_be_two_characters() {
    let result = Engine::new(Options {
        var_controls: ("{".into(), "}".into()),
        ..Options::default()
    });
    assert!(result.is_err());
}

#[test]
fn test_delimiters_must_differ() {
    let result = Engine::new(Options {
        tag_controls: ("%%".into(), "%%".into()),
        ..Options::default()
    });
    assert!(result.is_err());
}

#[test]
fn test_whitespace_control_markers() {
    assert_eq!(render("a {{- v }} b", json!({ "v": 1 })), "a1 b");
    assert_eq!(render("a {{ v -}} b", json!({ "v": 1 })), "a1b");
    assert_eq!(
        render("x {%- if true -%} y {%- endif -%} z", Value::Null),
        "xyz"
    );
}

#[test]
fn test_unclosed_tag_reports_expected_end() {
    let engine = Engine::new(Options::default()).unwrap();
    let err = engine.compile("{% if x %}never closed").unwrap_err();
    assert!(err.to_string().contains("endif"), "{err}");
}

#[test]
fn test_parse_errors_carry_line_numbers() {
    let engine = Engine::new(Options::default()).unwrap();
    let err = engine
        .compile_named("line one\nline two\n{% bogus %}", "page.html")
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("line 3"), "{msg}");
    assert!(msg.contains("page.html"), "{msg}");
}

#[test]
fn test_template_debug_names_its_file() {
    let engine = Engine::new(Options::default()).unwrap();
    let tpl = engine.compile_named("hi", "page.html").unwrap();
    let repr = format!("{tpl:?}");
    assert!(repr.contains("Template"), "{repr}");
    assert!(repr.contains("page.html"), "{repr}");
}

#[test]
fn test_compile_with_one_off_options() {
    let engine = Engine::new(Options::default()).unwrap();
    let mut locals = Map::new();
    locals.insert("who".into(), json!("crew"));
    let tpl = engine
        .compile_with(
            "<$ greeting $> <$ who $>",
            &Options {
                var_controls: ("<$".into(), "$>".into()),
                locals,
                ..Options::default()
            },
        )
        .unwrap();
    assert_eq!(
        tpl.render(&json!({ "greeting": "hi" })).unwrap(),
        "hi crew"
    );
    // The engine itself keeps its own delimiters and locals.
    assert_eq!(engine.render("{{ who }}.", &Value::Null).unwrap(), ".");
}

#[test]
fn test_compile_with_autoescape_override() {
    let engine = Engine::new(Options::default()).unwrap();
    let tpl = engine
        .compile_with(
            "{{ v }}",
            &Options {
                autoescape: AutoEscape::Off,
                ..Options::default()
            },
        )
        .unwrap();
    assert_eq!(tpl.render(&json!({ "v": "<b>" })).unwrap(), "<b>");
}

#[test]
fn test_compile_with_validates_options() {
    let engine = Engine::new(Options::default()).unwrap();
    let result = engine.compile_with(
        "x",
        &Options {
            var_controls: ("{".into(), "}".into()),
            ..Options::default()
        },
    );
    assert!(result.is_err());
}

#[test]
fn test_options_filename_names_source_compiles() {
    let engine = Engine::new(Options {
        filename: Some("inline.html".into()),
        ..Options::default()
    })
    .unwrap();
    let err = engine.compile("{% bogus %}").unwrap_err();
    assert!(err.to_string().contains("inline.html"), "{err}");
}

#[test]
fn test_compiled_template_reuse() {
    let engine = Engine::new(Options::default()).unwrap();
    let tpl = engine.compile("{{ n }}").unwrap();
    assert_eq!(tpl.render(&json!({ "n": 1 })).unwrap(), "1");
    assert_eq!(tpl.render(&json!({ "n": 2 })).unwrap(), "2");
}
