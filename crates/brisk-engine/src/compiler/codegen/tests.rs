use super::*;
use crate::ast::builder::*;
use crate::ast::{BinaryOperator, VariableKind};
use crate::compiler::bytecode::{HandlerKind, SwitchCases};
use crate::scope::analyze;

fn compile_with(program: &Program, options: &CompilerOptions) -> Result<FunctionTemplate> {
    let tree = analyze(program)?;
    generate_program(program, &tree, options)
}

fn compile(program: &Program) -> FunctionTemplate {
    compile_with(program, &CompilerOptions::default()).unwrap()
}

fn first_function(template: &FunctionTemplate) -> &FunctionTemplate {
    template.bytecode.functions.first().expect("no nested function")
}

#[test]
fn test_script_completion_register() {
    let template = compile(&script(vec![expr_stmt(num(1.0)), expr_stmt(num(2.0))]));
    assert_eq!(template.kind, FunctionKind::Script);
    assert_eq!(template.bytecode.count(OpCode::StoreReg), 2);
    assert_eq!(template.bytecode.count(OpCode::Return), 1);
}

#[test]
fn test_integer_switch_uses_table() {
    let program = script(vec![switch(
        ident("x"),
        vec![
            case(num(1.0), vec![brk(None)]),
            case(num(2.0), vec![brk(None)]),
            case(num(3.0), vec![]),
            default_case(vec![]),
        ],
    )]);
    let template = compile(&program);
    assert_eq!(template.bytecode.count(OpCode::SwitchTable), 1);
    assert_eq!(template.bytecode.count(OpCode::StrictEq), 0);
    assert_eq!(template.bytecode.switch_tables.len(), 1);
}

#[test]
fn test_string_switch_uses_table() {
    let program = script(vec![switch(
        ident("x"),
        vec![
            case(str_lit("a"), vec![brk(None)]),
            case(str_lit("b"), vec![]),
            case(str_lit("a"), vec![]),
            default_case(vec![]),
        ],
    )]);
    let template = compile(&program);
    assert_eq!(template.bytecode.count(OpCode::SwitchTable), 1);
    assert_eq!(template.bytecode.count(OpCode::StrictEq), 0);
    let SwitchCases::String(cases) = &template.bytecode.switch_tables[0].cases else {
        panic!("expected a string-keyed table");
    };
    assert_eq!(cases.len(), 2);
}

#[test]
fn test_mixed_switch_uses_comparisons() {
    let program = script(vec![switch(
        ident("x"),
        vec![case(num(1.0), vec![]), case(str_lit("a"), vec![])],
    )]);
    let template = compile(&program);
    assert_eq!(template.bytecode.count(OpCode::SwitchTable), 0);
    assert_eq!(template.bytecode.count(OpCode::StrictEq), 2);
}

#[test]
fn test_large_block_goes_out_of_line() {
    let body = vec![block(vec![
        let_("a", Some(num(1.0))),
        let_("b", Some(num(2.0))),
    ])];
    let options = CompilerOptions {
        block_inline_limit: 1,
        ..CompilerOptions::default()
    };
    let template = compile_with(&script(body.clone()), &options).unwrap();
    assert_eq!(template.bytecode.count(OpCode::CallUnit), 1);
    assert_eq!(template.bytecode.count(OpCode::ReturnUnit), 1);
    assert_eq!(template.bytecode.units.len(), 1);

    let inline = compile(&script(body));
    assert_eq!(inline.bytecode.count(OpCode::CallUnit), 0);
    assert_eq!(inline.bytecode.count(OpCode::CreateMutableBinding), 2);
}

#[test]
fn test_strict_tail_call() {
    let body = vec![function_decl(
        "g",
        &[],
        vec![ret(Some(call(ident("f"), vec![])))],
    )];
    let strict = compile(&strict_script(body.clone()));
    let g = first_function(&strict);
    assert_eq!(g.bytecode.count(OpCode::TailCall), 1);
    assert_eq!(g.bytecode.count(OpCode::Call), 0);

    let sloppy = compile(&script(body));
    let g = first_function(&sloppy);
    assert_eq!(g.bytecode.count(OpCode::TailCall), 0);
    assert_eq!(g.bytecode.count(OpCode::Call), 1);
}

#[test]
fn test_no_tail_call_inside_try() {
    let program = strict_script(vec![function_decl(
        "g",
        &[],
        vec![try_catch(
            vec![ret(Some(call(ident("f"), vec![])))],
            "e",
            vec![],
        )],
    )]);
    let template = compile(&program);
    assert_eq!(first_function(&template).bytecode.count(OpCode::TailCall), 0);
}

#[test]
fn test_finally_copies() {
    let program = script(vec![function_decl(
        "f",
        &[],
        vec![try_finally(
            vec![ret(Some(num(1.0)))],
            vec![expr_stmt(call(ident("g"), vec![]))],
        )],
    )]);
    let template = compile(&program);
    let f = first_function(&template);
    // One copy for the exceptional exit, one for the return.
    assert_eq!(f.bytecode.count(OpCode::Call), 2);
    assert_eq!(f.bytecode.count(OpCode::Rethrow), 1);
    assert!(
        f.bytecode
            .handlers
            .iter()
            .any(|h| matches!(h.kind, HandlerKind::Finally { .. }))
    );
}

#[test]
fn test_string_literal_concat() {
    let template = compile(&script(vec![expr_stmt(add(str_lit("a"), ident("x")))]));
    assert_eq!(template.bytecode.count(OpCode::Concat), 1);
    assert_eq!(template.bytecode.count(OpCode::Add), 0);

    let template = compile(&script(vec![expr_stmt(add(ident("x"), str_lit("")))]));
    assert_eq!(template.bytecode.count(OpCode::Concat), 0);
    assert_eq!(template.bytecode.count(OpCode::ToString), 1);
}

#[test]
fn test_numeric_operands_skip_conversion() {
    let program = script(vec![expr_stmt(binary(
        BinaryOperator::Subtract,
        num(3.0),
        num(1.0),
    ))]);
    let template = compile(&program);
    assert_eq!(template.bytecode.count(OpCode::ToNumber), 0);
    assert_eq!(template.bytecode.count(OpCode::Sub), 1);
}

#[test]
fn test_condition_skips_redundant_to_boolean() {
    let program = script(vec![if_(
        lt(ident("a"), ident("b")),
        expr_stmt(num(1.0)),
        None,
    )]);
    let template = compile(&program);
    assert_eq!(template.bytecode.count(OpCode::ToBoolean), 0);

    let program = script(vec![if_(ident("a"), expr_stmt(num(1.0)), None)]);
    let template = compile(&program);
    assert_eq!(template.bytecode.count(OpCode::ToBoolean), 1);
}

#[test]
fn test_tdz_check_only_where_needed() {
    let program = script(vec![function_decl(
        "f",
        &[],
        vec![
            expr_stmt(ident("x")),
            let_("x", Some(num(1.0))),
            var("v", None),
            expr_stmt(ident("v")),
        ],
    )]);
    let template = compile(&program);
    let f = first_function(&template);
    assert_eq!(f.bytecode.count(OpCode::GetSlotChecked), 1);
    assert_eq!(f.bytecode.count(OpCode::GetSlot), 1);
}

#[test]
fn test_unresolvable_break_is_internal_error() {
    let result = compile_with(&script(vec![brk(None)]), &CompilerOptions::default());
    assert!(matches!(result, Err(Error::Internal(_))));

    let result = compile_with(
        &script(vec![while_(bool_lit(true), brk(Some("nowhere")))]),
        &CompilerOptions::default(),
    );
    assert!(matches!(result, Err(Error::Internal(_))));
}

#[test]
fn test_async_generator_rejected() {
    let mut program = script(vec![generator_decl("g", &[], vec![])]);
    if let Statement::FunctionDeclaration(f) = &mut program.body[0] {
        f.is_async = true;
    }
    let result = compile_with(&program, &CompilerOptions::default());
    assert!(matches!(result, Err(Error::Internal(_))));
}

#[test]
fn test_generator_resume_points() {
    let program = script(vec![generator_decl(
        "g",
        &[],
        vec![expr_stmt(yield_(Some(num(1.0)))), expr_stmt(yield_(None))],
    )]);
    let template = compile(&program);
    let g = first_function(&template);
    assert_eq!(g.kind, FunctionKind::Generator);
    assert_eq!(g.bytecode.instructions[0].opcode, OpCode::ResumeDispatch);
    // The initial suspension plus one per yield.
    assert_eq!(g.bytecode.count(OpCode::Suspend), 3);
    assert_eq!(g.bytecode.resume_table.len(), 3);
}

#[test]
fn test_yield_outside_generator_rejected() {
    let program = script(vec![function_decl(
        "f",
        &[],
        vec![expr_stmt(yield_(None))],
    )]);
    let result = compile_with(&program, &CompilerOptions::default());
    assert!(matches!(result, Err(Error::Internal(_))));
}

#[test]
fn test_for_of_registers_iterator_close() {
    let program = script(vec![function_decl(
        "f",
        &["xs"],
        vec![for_of(
            VariableKind::Let,
            "x",
            ident("xs"),
            block(vec![brk(None)]),
        )],
    )]);
    let template = compile(&program);
    let f = first_function(&template);
    assert!(
        f.bytecode
            .handlers
            .iter()
            .any(|h| matches!(h.kind, HandlerKind::IterClose { .. }))
    );
    // The break closes the iterator on its way out.
    assert!(f.bytecode.count(OpCode::IteratorClose) >= 1);
}

#[test]
fn test_infinite_loop_is_abrupt() {
    let program = script(vec![function_decl(
        "f",
        &[],
        vec![while_(bool_lit(true), block(vec![]))],
    )]);
    let template = compile(&program);
    let f = first_function(&template);
    // No unreachable implicit `return undefined` after the loop.
    assert_eq!(f.bytecode.count(OpCode::Return), 0);
}
