//! End-to-end rendering tests through the parser and interpreter

#![cfg(feature = "parser")]

use templet::{
    parse, Context, EvalError, LoadError, MemoryLoader, ParserOptions, Position, Value,
};

fn render(source: &str, model: Value) -> Result<String, EvalError> {
    let template = parse("test.html", source).expect("template parses");
    Context::new().render(&template, model)
}

fn render_ok(source: &str) -> String {
    render(source, Value::Null).expect("render succeeds")
}

fn strings(items: &[&str]) -> Value {
    Value::list(items.iter().map(|s| Value::from(*s)))
}

#[test]
fn test_render_model_values() {
    let model = Value::map([
        ("name", Value::from("Ada")),
        ("langs", strings(&["rust", "ml"])),
    ]);
    let out = render("Hi {{ name }}: {{ join(langs, '/') }} ({{ len(langs) }})", model).unwrap();
    assert_eq!(out, "Hi Ada: rust/ml (2)");
}

#[test]
fn test_missing_values_render_empty() {
    assert_eq!(render_ok("[{{ nothing }}][{{ null }}]"), "[][]");
}

#[test]
fn test_for_loop_helpers() {
    let model = Value::map([("xs", strings(&["a", "b", "c"]))]);
    let out = render(
        "{% for x in xs %}{{ loop.index }}{{ x }}{% if not loop.last %},{% endif %}{% endfor %}",
        model,
    )
    .unwrap();
    assert_eq!(out, "1a,2b,3c");
}

#[test]
fn test_for_else_and_map_iteration() {
    assert_eq!(
        render_ok("{% for x in [] %}x{% else %}none{% endfor %}"),
        "none"
    );
    assert_eq!(
        render_ok("{% for k in {b: 1, a: 2} %}{{ k }}{% endfor %}"),
        "ab"
    );
}

#[test]
fn test_nested_loops_see_outer_variables() {
    assert_eq!(
        render_ok("{% for a in [1, 2] %}{% for b in [3] %}{{ a }}{{ b }}{% endfor %}{% endfor %}"),
        "1323"
    );
}

#[test]
fn test_break_and_continue() {
    let out = render_ok(
        "{% for x in range(5) %}\
         {% if x == 1 %}{% continue %}{% endif %}\
         {% if x == 3 %}{% break %}{% endif %}\
         {{ x }}{% endfor %}",
    );
    assert_eq!(out, "02");
}

#[test]
fn test_while_loop() {
    assert_eq!(
        render_ok("{% set i = 0 %}{% while i < 3 %}{{ i }}{% set i = i + 1 %}{% endwhile %}"),
        "012"
    );
}

#[test]
fn test_loop_sees_values_set_in_earlier_iterations() {
    assert_eq!(
        render_ok("{% for x in [1, 2, 3] %}[{{ acc }}]{% set acc = x %}{% endfor %}|{{ acc }}"),
        "[][1][2]|3"
    );
}

#[test]
fn test_while_counter_over_model_value() {
    let out = render(
        "{% while n < 3 %}{% set n = n + 1 %}{% endwhile %}{{ n }}",
        Value::map([("n", Value::Int(0))]),
    )
    .unwrap();
    assert_eq!(out, "3");
}

#[test]
fn test_function_accumulates_in_locals() {
    let out = render(
        "{% function total(xs) %}{% set sum = 0 %}\
         {% for x in xs %}{% set sum = sum + x %}{% endfor %}\
         {% return sum %}{% endfunction %}{{ total([1, 2, 3]) }}[{{ sum }}]",
        Value::map([("sum", Value::from("model"))]),
    )
    .unwrap();
    assert_eq!(out, "6[model]");
}

#[test]
fn test_self_referential_value_is_a_runtime_error() {
    let err = render_ok_err("{% set a = [1] %}{% set a[0] = a %}\n{{ a }}");
    assert!(matches!(err, EvalError::Conversion { .. }));
    assert_eq!(err.position().map(|p| p.line), Some(2));

    let err = render_ok_err("{% set a = [1] %}{% set a[0] = a %}{% set b = [1] %}{% set b[0] = b %}{{ a == b }}");
    assert!(matches!(err, EvalError::Type { .. }));
}

fn render_ok_err(source: &str) -> EvalError {
    render(source, Value::Null).unwrap_err()
}

#[test]
fn test_loop_budget_spans_loops() {
    let template = parse(
        "t",
        "{% for x in range(3) %}{% endfor %}{% for y in range(3) %}{% endfor %}",
    )
    .unwrap();
    let mut ctx = Context::builder().max_loop_iterations(5).build();
    let err = ctx.render(&template, Value::Null).unwrap_err();
    assert!(matches!(
        err,
        EvalError::LoopLimit { limit: 5, position } if position == Position::new(1, 36)
    ));
}

#[test]
fn test_loop_variable_is_read_only() {
    let err = render("{% for x in [1] %}{% set x = 2 %}{% endfor %}", Value::Null).unwrap_err();
    assert!(matches!(err, EvalError::ReadOnlyVariable { name, .. } if name == "x"));
}

#[test]
fn test_functions() {
    assert_eq!(
        render_ok("{% function add(a, b) %}{% return a + b %}{% endfunction %}{{ add(2, 3) }}"),
        "5"
    );
    assert_eq!(
        render_ok("{% function greet(who) %}<{{ who }}>{% endfunction %}{{ greet('bob') }}"),
        "<bob>"
    );
    let err = render(
        "{% function one(a) %}{% endfunction %}{{ one(1, 2) }}",
        Value::Null,
    )
    .unwrap_err();
    assert!(matches!(err, EvalError::ArgumentCount { expected: 1, actual: 2, .. }));
}

#[test]
fn test_recursion_limit() {
    let source = "{% function down(n) %}{% if n > 0 %}{{ down(n - 1) }}{% endif %}.{% endfunction %}";
    let mut ctx = Context::builder().max_recursion_depth(20).build();

    let ok = parse("t", &format!("{}{{{{ down(19) }}}}", source)).unwrap();
    assert_eq!(ctx.render(&ok, Value::Null).unwrap(), ".".repeat(20));

    let too_deep = parse("t", &format!("{}{{{{ down(20) }}}}", source)).unwrap();
    let err = ctx.render(&too_deep, Value::Null).unwrap_err();
    assert!(matches!(err, EvalError::RecursionLimit { limit: 20, .. }));
    assert_eq!(ctx.recursion_depth(), 0);
}

#[test]
fn test_global_statement() {
    let out = render_ok(
        "{% global count = 1 %}\
         {% function bump() %}{% global count = count + 1 %}{% endfunction %}\
         {{ bump() }}{{ bump() }}{{ count }}",
    );
    assert_eq!(out, "3");
}

#[test]
fn test_set_through_members_and_indexes() {
    let model = Value::map([
        ("user", Value::map([("name", Value::from("Ada"))])),
        ("tags", strings(&["a", "b"])),
    ]);
    let out = render(
        "{% set user.name = 'Grace' %}{% set tags[1] = 'z' %}{{ user.name }} {{ tags }}",
        model,
    )
    .unwrap();
    assert_eq!(out, "Grace [a, z]");
}

#[test]
fn test_capture() {
    assert_eq!(
        render_ok("{% capture block %}in{{ 1 + 1 }}{% endcapture %}[{{ upper(block) }}]"),
        "[IN2]"
    );
}

#[test]
fn test_implicit_invocation_in_templates() {
    let clock = Value::native("clock", |_: &mut Context, _: &[Value], _: Position| {
        Ok(Value::map([("year", Value::Int(2024))]))
    });
    let out = render("{{ clock.year }}", Value::map([("clock", clock)])).unwrap();
    assert_eq!(out, "2024");
}

#[test]
fn test_custom_builtin() {
    let template = parse("t", "{{ shout('hi') }}").unwrap();
    let mut ctx = Context::builder()
        .builtin("shout", |_ctx, args, position| {
            let text = templet::to_text(args.first().unwrap_or(&Value::Null), position)?;
            Ok(Value::from(format!("{}!", text.to_uppercase())))
        })
        .build();
    assert_eq!(ctx.render(&template, Value::Null).unwrap(), "HI!");
}

#[test]
fn test_runtime_errors_carry_positions() {
    let err = render("line one\n  {{ missing.x }}", Value::Null).unwrap_err();
    assert!(matches!(err, EvalError::MemberOfNull { .. }));
    assert_eq!(err.position().map(|p| p.line), Some(2));
}

#[test]
fn test_failed_render_restores_context() {
    let mut ctx = Context::new();
    let bad = parse("bad", "{% for x in [1] %}{{ 1 / 0 }}{% endfor %}").unwrap();
    assert!(matches!(
        ctx.render(&bad, Value::Null),
        Err(EvalError::DivisionByZero { .. })
    ));
    assert_eq!(ctx.global_depth(), 1);
    assert_eq!(ctx.loop_depth(), 0);
    assert_eq!(ctx.current_source_file(), None);
    assert_eq!(ctx.output(), "");

    let good = parse("good", "ok").unwrap();
    assert_eq!(ctx.render(&good, Value::Null).unwrap(), "ok");
}

fn site() -> MemoryLoader {
    MemoryLoader::new()
        .with(
            "pages/index.html",
            "{% set secret = 1 %}{% include 'nav.html' with {title: 'Home'} %}|{{ title }}|{% include '/footer.html' %}",
        )
        .with("pages/nav.html", "<nav>{{ title }}</nav>")
        .with("footer.html", "[{{ secret }}]{{ title }}{% return %}unreachable")
        .with("loop.html", "{% include 'loop.html' %}")
        .with("bad.html", "{% if %}")
}

#[test]
fn test_includes() {
    let mut ctx = Context::builder().loader(site()).build();
    let model = Value::map([("title", Value::from("Outer"))]);
    let out = ctx.render_name("pages/index.html", model.clone()).unwrap();
    assert_eq!(out, "<nav>Home</nav>|Outer|[1]Outer");
    assert_eq!(ctx.cached_templates(), 3);

    let again = ctx.render_name("pages/index.html", model).unwrap();
    assert_eq!(again, out);
    assert_eq!(ctx.cached_templates(), 3);
}

#[test]
fn test_include_failures() {
    let mut ctx = Context::builder()
        .loader(site())
        .max_recursion_depth(10)
        .build();

    let err = ctx.render_name("loop.html", Value::Null).unwrap_err();
    assert!(matches!(err, EvalError::RecursionLimit { limit: 10, .. }));

    let err = ctx.render_name("bad.html", Value::Null).unwrap_err();
    assert!(matches!(
        err,
        EvalError::Load {
            source: LoadError::Parse(_),
            ..
        }
    ));

    let err = ctx.render_name("missing.html", Value::Null).unwrap_err();
    assert!(matches!(
        err,
        EvalError::Load {
            source: LoadError::NotFound(_),
            ..
        }
    ));
    assert_eq!(ctx.global_depth(), 1);
}

#[test]
fn test_include_without_loader() {
    let err = render("{% include 'x.html' %}", Value::Null).unwrap_err();
    assert!(matches!(
        err,
        EvalError::Load {
            source: LoadError::NoLoader,
            ..
        }
    ));
}

#[test]
fn test_trim_blocks_from_context_options() {
    let loader =
        MemoryLoader::new().with("list.html", "{% for x in xs %}\n{{ x }}\n{% endfor %}\n");
    let model = Value::map([("xs", strings(&["a", "b"]))]);

    let mut plain = Context::builder().loader(loader.clone()).build();
    assert_eq!(
        plain.render_name("list.html", model.clone()).unwrap(),
        "\na\n\nb\n\n"
    );

    let mut trimmed = Context::builder()
        .loader(loader)
        .parser_options(ParserOptions::trim_blocks())
        .build();
    assert_eq!(trimmed.render_name("list.html", model).unwrap(), "a\nb\n");
}
