//! End-to-end behavior of generated code.

use brisk_engine::ast::builder::*;
use brisk_engine::ast::{
    BinaryOperator, Expression, Program, Statement, UnaryOperator, VariableKind,
};
use brisk_engine::compiler::Completion;
use brisk_engine::{Engine, EngineConfig, Error, Result, Value, VmOptions};

fn run(program: &Program) -> (Result<Value>, Vec<String>) {
    let mut engine = Engine::new();
    let result = engine.eval_program(program);
    (result, engine.take_output())
}

fn output(program: &Program) -> Vec<String> {
    let (result, lines) = run(program);
    if let Err(e) = result {
        panic!("program failed: {e}");
    }
    lines
}

fn uncaught(program: &Program) -> String {
    match run(program).0 {
        Err(Error::Uncaught { value, .. }) => value,
        other => panic!("expected an uncaught exception, got {other:?}"),
    }
}

fn sub(left: Expression, right: Expression) -> Expression {
    binary(BinaryOperator::Subtract, left, right)
}

// ============================================================================
// Bindings
// ============================================================================

#[test]
fn test_read_before_initialization_throws() {
    let program = script(vec![
        function_decl(
            "f",
            &[],
            vec![print(vec![ident("x")]), let_("x", Some(num(1.0)))],
        ),
        expr_stmt(call(ident("f"), vec![])),
    ]);
    assert_eq!(
        uncaught(&program),
        "ReferenceError: Cannot access 'x' before initialization"
    );
}

#[test]
fn test_typeof_on_uninitialized_binding_throws() {
    // Statically resolved.
    let program = script(vec![
        function_decl(
            "f",
            &[],
            vec![print(vec![typeof_(ident("y"))]), let_("y", None)],
        ),
        expr_stmt(call(ident("f"), vec![])),
    ]);
    assert!(uncaught(&program).starts_with("ReferenceError"));

    // Through a `with` scope.
    let program = script(vec![
        function_decl(
            "f",
            &[],
            vec![
                with(object(vec![]), block(vec![print(vec![typeof_(ident("x"))])])),
                let_("x", Some(num(1.0))),
            ],
        ),
        expr_stmt(call(ident("f"), vec![])),
    ]);
    assert_eq!(
        uncaught(&program),
        "ReferenceError: Cannot access 'x' before initialization"
    );
}

#[test]
fn test_typeof_unresolvable_is_undefined() {
    let program = script(vec![
        print(vec![typeof_(ident("nope"))]),
        with(object(vec![]), block(vec![print(vec![typeof_(ident("nope"))])])),
    ]);
    assert_eq!(output(&program), ["undefined", "undefined"]);
}

#[test]
fn test_last_function_declaration_wins() {
    let program = script(vec![
        function_decl("f", &[], vec![ret(Some(num(1.0)))]),
        function_decl("f", &[], vec![ret(Some(num(2.0)))]),
        print(vec![call(ident("f"), vec![])]),
        function_decl(
            "h",
            &[],
            vec![
                function_decl("k", &[], vec![ret(Some(str_lit("a")))]),
                function_decl("k", &[], vec![ret(Some(str_lit("b")))]),
                ret(Some(call(ident("k"), vec![]))),
            ],
        ),
        print(vec![call(ident("h"), vec![])]),
    ]);
    assert_eq!(output(&program), ["2", "b"]);
}

#[test]
fn test_global_instantiation_is_transactional() {
    let mut engine = Engine::new();
    engine
        .eval_program(&script(vec![let_("a", Some(num(1.0)))]))
        .unwrap();

    let err = engine
        .eval_program(&script(vec![var("b", Some(num(1.0))), let_("a", Some(num(2.0)))]))
        .unwrap_err();
    assert!(err.uncaught_value().unwrap().starts_with("SyntaxError"));
    assert!(engine.global("b").is_none());
    assert!(matches!(engine.global("a"), Some(Value::Number(n)) if n == 1.0));
}

#[test]
fn test_with_statement_writes_through_object() {
    let program = script(vec![
        var("o", Some(object(vec![("p", num(1.0))]))),
        with(ident("o"), block(vec![expr_stmt(assign(ident("p"), num(2.0)))])),
        print(vec![member(ident("o"), "p")]),
    ]);
    assert_eq!(output(&program), ["2"]);
}

// ============================================================================
// try / finally
// ============================================================================

#[test]
fn test_finally_runs_once_on_return() {
    let program = script(vec![
        function_decl(
            "f",
            &[],
            vec![try_finally(
                vec![ret(Some(num(1.0)))],
                vec![print(vec![str_lit("fin")])],
            )],
        ),
        print(vec![call(ident("f"), vec![])]),
    ]);
    assert_eq!(output(&program), ["fin", "1"]);
}

#[test]
fn test_finally_runs_once_on_break() {
    let program = script(vec![for_(
        Some(init_let("i", num(0.0))),
        Some(lt(ident("i"), num(3.0))),
        Some(post_inc(ident("i"))),
        block(vec![try_finally(
            vec![if_(strict_eq(ident("i"), num(1.0)), brk(None), None)],
            vec![print(vec![ident("i")])],
        )]),
    )]);
    assert_eq!(output(&program), ["0", "1"]);
}

#[test]
fn test_finally_runs_once_on_throw() {
    let program = script(vec![try_catch(
        vec![try_finally(
            vec![throw(str_lit("x"))],
            vec![print(vec![str_lit("f")])],
        )],
        "e",
        vec![print(vec![add(str_lit("c "), ident("e"))])],
    )]);
    assert_eq!(output(&program), ["f", "c x"]);
}

#[test]
fn test_throw_in_finally_suppresses_pending() {
    let program = script(vec![try_finally(
        vec![throw(str_lit("A"))],
        vec![throw(str_lit("B"))],
    )]);
    match run(&program).0 {
        Err(Error::Uncaught { value, suppressed }) => {
            assert_eq!(value, "B");
            assert_eq!(suppressed, ["A"]);
        }
        other => panic!("expected an uncaught exception, got {other:?}"),
    }
}

// ============================================================================
// Completion algebra
// ============================================================================

#[test]
fn test_completion_laws() {
    use Completion::*;
    for x in [Normal, Return, Throw, Break, Continue, Abrupt] {
        assert_eq!(Normal.then(x), x);
        assert_eq!(Break.then(x), Break);
        assert_eq!(Normal.select(x), Normal);
    }
    assert_eq!(Throw.select(Throw), Throw);
    assert_eq!(Break.select(Continue), Abrupt);
}

// ============================================================================
// Generators and async functions
// ============================================================================

#[test]
fn test_generator_round_trip() {
    let program = script(vec![
        generator_decl(
            "gen",
            &[],
            vec![
                var("x", Some(yield_(Some(num(1.0))))),
                print(vec![add(str_lit("got "), ident("x"))]),
                ret(Some(num(3.0))),
            ],
        ),
        var("it", Some(call(ident("gen"), vec![]))),
        print(vec![member(call_method(ident("it"), "next", vec![]), "value")]),
        print(vec![member(
            call_method(ident("it"), "next", vec![num(5.0)]),
            "value",
        )]),
        print(vec![member(call_method(ident("it"), "next", vec![]), "done")]),
    ]);
    assert_eq!(output(&program), ["1", "got 5", "3", "true"]);
}

#[test]
fn test_delegated_throw_surfaces_without_extra_inner_call() {
    let program = script(vec![
        generator_decl(
            "inner",
            &[],
            vec![
                print(vec![str_lit("start")]),
                expr_stmt(yield_(Some(num(1.0)))),
                print(vec![str_lit("resume")]),
                throw(str_lit("boom")),
            ],
        ),
        generator_decl(
            "outer",
            &[],
            vec![expr_stmt(yield_star(call(ident("inner"), vec![])))],
        ),
        var("g", Some(call(ident("outer"), vec![]))),
        expr_stmt(call_method(ident("g"), "next", vec![])),
        try_catch(
            vec![expr_stmt(call_method(ident("g"), "next", vec![]))],
            "e",
            vec![print(vec![add(str_lit("caught "), ident("e"))])],
        ),
        print(vec![member(call_method(ident("g"), "next", vec![]), "done")]),
    ]);
    assert_eq!(output(&program), ["start", "resume", "caught boom", "true"]);
}

#[test]
fn test_delegated_throw_without_throw_method_closes_inner() {
    let iterator = object(vec![
        (
            "next",
            function_expr(
                None,
                &[],
                vec![ret(Some(object(vec![
                    ("value", num(1.0)),
                    ("done", bool_lit(false)),
                ])))],
            ),
        ),
        (
            "return",
            function_expr(
                None,
                &[],
                vec![
                    print(vec![str_lit("return called")]),
                    ret(Some(object(vec![("done", bool_lit(true))]))),
                ],
            ),
        ),
    ]);
    let program = script(vec![
        var("it", Some(iterator)),
        var("iterable", Some(object(vec![]))),
        expr_stmt(assign(
            index(ident("iterable"), member(ident("Symbol"), "iterator")),
            function_expr(None, &[], vec![ret(Some(ident("it")))]),
        )),
        generator_decl(
            "outer",
            &[],
            vec![expr_stmt(yield_star(ident("iterable")))],
        ),
        var("g", Some(call(ident("outer"), vec![]))),
        expr_stmt(call_method(ident("g"), "next", vec![])),
        try_catch(
            vec![expr_stmt(call_method(ident("g"), "throw", vec![str_lit("x")]))],
            "e",
            vec![print(vec![ident("e")])],
        ),
    ]);
    assert_eq!(
        output(&program),
        ["return called", "TypeError: iterator.throw is not callable"]
    );
}

#[test]
fn test_resuming_a_running_generator_throws() {
    let program = script(vec![
        generator_decl(
            "gen",
            &[],
            vec![try_catch(
                vec![expr_stmt(call_method(ident("g"), "next", vec![]))],
                "e",
                vec![print(vec![ident("e")])],
            )],
        ),
        var("g", Some(call(ident("gen"), vec![]))),
        print(vec![member(call_method(ident("g"), "next", vec![]), "done")]),
    ]);
    assert_eq!(
        output(&program),
        ["TypeError: Generator is already running", "true"]
    );
}

/// Runs `setup` (which binds `inner`), delegates to it, then calls
/// `return(5)` on the outer generator while it is suspended.
fn return_through_delegate(mut setup: Vec<Statement>) -> Vec<String> {
    setup.extend([
        generator_decl(
            "outer",
            &[],
            vec![expr_stmt(yield_star(ident("inner")))],
        ),
        var("g", Some(call(ident("outer"), vec![]))),
        expr_stmt(call_method(ident("g"), "next", vec![])),
        var("r", Some(call_method(ident("g"), "return", vec![num(5.0)]))),
        print(vec![member(ident("r"), "value"), member(ident("r"), "done")]),
    ]);
    output(&script(setup))
}

#[test]
fn test_delegated_return_calls_inner_return() {
    let lines = return_through_delegate(vec![
        generator_decl(
            "source",
            &[],
            vec![try_finally(
                vec![
                    expr_stmt(yield_(Some(num(1.0)))),
                    expr_stmt(yield_(Some(num(2.0)))),
                ],
                vec![print(vec![str_lit("inner cleanup")])],
            )],
        ),
        var("inner", Some(call(ident("source"), vec![]))),
    ]);
    assert_eq!(lines, ["inner cleanup", "5 true"]);
}

#[test]
fn test_delegated_return_without_inner_return_completes() {
    let iterator = object(vec![(
        "next",
        function_expr(
            None,
            &[],
            vec![ret(Some(object(vec![
                ("value", num(1.0)),
                ("done", bool_lit(false)),
            ])))],
        ),
    )]);
    let lines = return_through_delegate(vec![
        var("it", Some(iterator)),
        var("inner", Some(object(vec![]))),
        expr_stmt(assign(
            index(ident("inner"), member(ident("Symbol"), "iterator")),
            function_expr(None, &[], vec![ret(Some(ident("it")))]),
        )),
    ]);
    assert_eq!(lines, ["5 true"]);
}

#[test]
fn test_async_function_resumes_from_job_queue() {
    let program = script(vec![
        async_decl(
            "af",
            &[],
            vec![
                var("v", Some(await_(num(1.0)))),
                print(vec![add(str_lit("after "), ident("v"))]),
                ret(Some(add(ident("v"), num(1.0)))),
            ],
        ),
        expr_stmt(call_method(
            call(ident("af"), vec![]),
            "then",
            vec![function_expr(
                None,
                &["r"],
                vec![print(vec![add(str_lit("then "), ident("r"))])],
            )],
        )),
        print(vec![str_lit("sync")]),
    ]);
    assert_eq!(output(&program), ["sync", "after 1", "then 2"]);
}

// ============================================================================
// Iteration
// ============================================================================

#[test]
fn test_for_of_break_closes_iterator() {
    let program = script(vec![
        generator_decl(
            "g",
            &[],
            vec![try_finally(
                vec![
                    expr_stmt(yield_(Some(num(1.0)))),
                    expr_stmt(yield_(Some(num(2.0)))),
                ],
                vec![print(vec![str_lit("cleanup")])],
            )],
        ),
        for_of(
            VariableKind::Const,
            "x",
            call(ident("g"), vec![]),
            block(vec![print(vec![ident("x")]), brk(None)]),
        ),
    ]);
    assert_eq!(output(&program), ["1", "cleanup"]);
}

#[test]
fn test_for_of_over_array() {
    let program = script(vec![for_of(
        VariableKind::Let,
        "x",
        array(vec![num(1.0), num(2.0), num(3.0)]),
        block(vec![
            print(vec![ident("x")]),
            if_(strict_eq(ident("x"), num(2.0)), brk(None), None),
        ]),
    )]);
    assert_eq!(output(&program), ["1", "2"]);
}

#[test]
fn test_for_in_enumerates_keys() {
    let program = script(vec![for_in(
        VariableKind::Const,
        "k",
        object(vec![("a", num(1.0)), ("b", num(2.0))]),
        print(vec![ident("k")]),
    )]);
    assert_eq!(output(&program), ["a", "b"]);
}

// ============================================================================
// switch and labels
// ============================================================================

#[test]
fn test_integer_switch_falls_through() {
    let cases = || {
        vec![
            case(num(1.0), vec![print(vec![str_lit("one")])]),
            case(num(2.0), vec![print(vec![str_lit("two")])]),
            case(num(3.0), vec![print(vec![str_lit("three")]), brk(None)]),
            default_case(vec![print(vec![str_lit("default")])]),
        ]
    };
    assert_eq!(
        output(&script(vec![switch(num(2.0), cases())])),
        ["two", "three"]
    );
    assert_eq!(
        output(&script(vec![switch(str_lit("2"), cases())])),
        ["default"]
    );
}

#[test]
fn test_string_switch_matches_only_strings() {
    let cases = || {
        vec![
            case(str_lit("1"), vec![print(vec![str_lit("one")]), brk(None)]),
            case(str_lit("x"), vec![print(vec![str_lit("x")])]),
            case(str_lit("y"), vec![print(vec![str_lit("y")]), brk(None)]),
            default_case(vec![print(vec![str_lit("other")])]),
        ]
    };
    assert_eq!(
        output(&script(vec![switch(str_lit("x"), cases())])),
        ["x", "y"]
    );
    assert_eq!(output(&script(vec![switch(num(1.0), cases())])), ["other"]);
    assert_eq!(output(&script(vec![switch(str_lit("1"), cases())])), ["one"]);
}

#[test]
fn test_labelled_continue_and_break() {
    let inner = for_(
        Some(init_let("j", num(0.0))),
        Some(lt(ident("j"), num(3.0))),
        Some(post_inc(ident("j"))),
        block(vec![
            if_(strict_eq(ident("j"), num(1.0)), cont(Some("outer")), None),
            if_(strict_eq(ident("i"), num(2.0)), brk(Some("outer")), None),
            print(vec![add(add(ident("i"), str_lit(":")), ident("j"))]),
        ]),
    );
    let program = script(vec![labeled(
        "outer",
        for_(
            Some(init_let("i", num(0.0))),
            Some(lt(ident("i"), num(3.0))),
            Some(post_inc(ident("i"))),
            block(vec![inner]),
        ),
    )]);
    assert_eq!(output(&program), ["0:0", "1:0"]);
}

#[test]
fn test_labelled_block_break() {
    let program = script(vec![
        labeled(
            "a",
            block(vec![
                print(vec![num(1.0)]),
                brk(Some("a")),
                print(vec![num(2.0)]),
            ]),
        ),
        print(vec![num(3.0)]),
    ]);
    assert_eq!(output(&program), ["1", "3"]);
}

#[test]
fn test_closures_capture_per_iteration_bindings() {
    let program = script(vec![
        var("fs", Some(array(vec![]))),
        for_(
            Some(init_let("i", num(0.0))),
            Some(lt(ident("i"), num(3.0))),
            Some(post_inc(ident("i"))),
            expr_stmt(call_method(
                ident("fs"),
                "push",
                vec![arrow_expr(&[], ident("i"))],
            )),
        ),
        for_of(
            VariableKind::Const,
            "f",
            ident("fs"),
            print(vec![call(ident("f"), vec![])]),
        ),
    ]);
    assert_eq!(output(&program), ["0", "1", "2"]);
}

// ============================================================================
// Calls
// ============================================================================

fn countdown() -> Vec<Statement> {
    vec![
        function_decl(
            "loop",
            &["n"],
            vec![
                if_(
                    strict_eq(ident("n"), num(0.0)),
                    ret(Some(str_lit("done"))),
                    None,
                ),
                ret(Some(call(ident("loop"), vec![sub(ident("n"), num(1.0))]))),
            ],
        ),
        expr_stmt(call(ident("loop"), vec![num(10_000.0)])),
    ]
}

#[test]
fn test_strict_tail_calls_do_not_grow_the_stack() {
    let (result, _) = run(&strict_script(countdown()));
    assert!(matches!(result, Ok(Value::String(s)) if &*s == "done"));
}

#[test]
fn test_deep_recursion_overflows() {
    let (result, _) = run(&script(countdown()));
    assert!(matches!(result, Err(Error::StackOverflow)));
}

#[test]
fn test_call_depth_limit_survives_a_small_native_stack() {
    let handle = std::thread::Builder::new()
        .stack_size(512 * 1024)
        .spawn(|| {
            let config = EngineConfig {
                vm: VmOptions {
                    max_call_depth: 2_000,
                    ..VmOptions::default()
                },
                ..EngineConfig::default()
            };
            let mut engine = Engine::with_config(config);
            let program = script(vec![
                function_decl("r", &[], vec![ret(Some(call(ident("r"), vec![])))]),
                try_catch(
                    vec![expr_stmt(call(ident("r"), vec![]))],
                    "e",
                    vec![print(vec![ident("e")])],
                ),
            ]);
            engine.eval_program(&program).map(|_| engine.take_output())
        })
        .unwrap();
    let lines = handle.join().unwrap().unwrap();
    assert_eq!(lines, ["InternalError: too much recursion"]);
}

#[test]
fn test_stack_overflow_is_catchable() {
    let program = script(vec![
        function_decl(
            "r",
            &[],
            vec![ret(Some(call(ident("r"), vec![])))],
        ),
        try_catch(
            vec![expr_stmt(call(ident("r"), vec![]))],
            "e",
            vec![print(vec![ident("e")])],
        ),
    ]);
    assert_eq!(output(&program), ["InternalError: too much recursion"]);
}

// ============================================================================
// Coercion
// ============================================================================

#[test]
fn test_coercion_round_trip_is_falsy() {
    let values = [
        num(0.0),
        unary(UnaryOperator::Minus, num(0.0)),
        ident("NaN"),
        str_lit(""),
        str_lit("0"),
        ident("undefined"),
        null(),
        object(vec![]),
    ];
    for value in values {
        let round_trip = not(not(unary(UnaryOperator::Plus, add(value, str_lit("")))));
        let (result, _) = run(&script(vec![expr_stmt(round_trip)]));
        assert!(matches!(result, Ok(Value::Boolean(false))), "{result:?}");
    }
}

#[test]
fn test_string_concatenation_order() {
    let program = script(vec![
        var("n", Some(num(4.0))),
        print(vec![add(str_lit("n="), ident("n"))]),
        print(vec![add(ident("n"), str_lit("!"))]),
        print(vec![template(&["<", ">"], vec![ident("n")])]),
    ]);
    assert_eq!(output(&program), ["n=4", "4!", "<4>"]);
}
