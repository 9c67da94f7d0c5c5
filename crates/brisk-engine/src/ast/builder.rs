//! Programmatic AST construction.
//!
//! Hosts that do not go through JSON, and the test suites, assemble programs
//! from these helpers:
//!
//! ```rust,ignore
//! use brisk_engine::ast::builder::*;
//!
//! // let x = 1; print(x + 1);
//! let program = script(vec![
//!     let_("x", Some(num(1.0))),
//!     print(vec![add(ident("x"), num(1.0))]),
//! ]);
//! ```

use super::*;

// ============================================================================
// Programs
// ============================================================================

/// A sloppy-mode script.
pub fn script(body: Vec<Statement>) -> Program {
    Program {
        body,
        source_type: SourceType::Script,
        imports: Vec::new(),
    }
}

/// A script whose body starts with `"use strict"`.
pub fn strict_script(mut body: Vec<Statement>) -> Program {
    body.insert(0, expr_stmt(str_lit("use strict")));
    script(body)
}

/// A module body importing `imports`.
pub fn module(imports: &[&str], body: Vec<Statement>) -> Program {
    Program {
        body,
        source_type: SourceType::Module,
        imports: imports.iter().map(|name| id(name)).collect(),
    }
}

/// An identifier node.
pub fn id(name: &str) -> Identifier {
    Identifier {
        name: name.to_string(),
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// Identifier reference.
pub fn ident(name: &str) -> Expression {
    Expression::Identifier(id(name))
}

/// Numeric literal.
pub fn num(value: f64) -> Expression {
    Expression::Literal(Literal {
        value: LiteralValue::Number(value),
    })
}

/// String literal.
pub fn str_lit(value: &str) -> Expression {
    Expression::Literal(Literal {
        value: LiteralValue::String(value.to_string()),
    })
}

/// Boolean literal.
pub fn bool_lit(value: bool) -> Expression {
    Expression::Literal(Literal {
        value: LiteralValue::Boolean(value),
    })
}

/// `null`.
pub fn null() -> Expression {
    Expression::Literal(Literal {
        value: LiteralValue::Null,
    })
}

/// `this`.
pub fn this() -> Expression {
    Expression::This
}

/// Template literal from alternating string parts and substitutions.
pub fn template(quasis: &[&str], expressions: Vec<Expression>) -> Expression {
    Expression::TemplateLiteral(TemplateLiteral {
        quasis: quasis
            .iter()
            .map(|text| TemplateElement {
                value: TemplateValue {
                    cooked: text.to_string(),
                },
            })
            .collect(),
        expressions,
    })
}

/// Array literal without holes.
pub fn array(elements: Vec<Expression>) -> Expression {
    Expression::Array(ArrayExpression {
        elements: elements.into_iter().map(Some).collect(),
    })
}

/// Object literal with static keys.
pub fn object(properties: Vec<(&str, Expression)>) -> Expression {
    Expression::Object(ObjectExpression {
        properties: properties
            .into_iter()
            .map(|(key, value)| Property {
                key: ident(key),
                value,
                computed: false,
            })
            .collect(),
    })
}

/// Object literal from explicit properties.
pub fn object_with(properties: Vec<Property>) -> Expression {
    Expression::Object(ObjectExpression { properties })
}

/// `[key]: value`.
pub fn computed_property(key: Expression, value: Expression) -> Property {
    Property {
        key,
        value,
        computed: true,
    }
}

/// `key: value`.
pub fn property(key: &str, value: Expression) -> Property {
    Property {
        key: ident(key),
        value,
        computed: false,
    }
}

fn function_node(name: Option<&str>, params: &[&str], body: Vec<Statement>) -> Function {
    Function {
        id: name.map(id),
        params: params.iter().map(|p| id(p)).collect(),
        body: FunctionBody::Block(BlockStatement { body }),
        is_async: false,
        is_generator: false,
    }
}

/// `function name(params) { body }` as an expression.
pub fn function_expr(name: Option<&str>, params: &[&str], body: Vec<Statement>) -> Expression {
    Expression::Function(function_node(name, params, body))
}

/// `function* name(params) { body }` as an expression.
pub fn generator_expr(name: Option<&str>, params: &[&str], body: Vec<Statement>) -> Expression {
    let mut f = function_node(name, params, body);
    f.is_generator = true;
    Expression::Function(f)
}

/// `async function name(params) { body }` as an expression.
pub fn async_expr(name: Option<&str>, params: &[&str], body: Vec<Statement>) -> Expression {
    let mut f = function_node(name, params, body);
    f.is_async = true;
    Expression::Function(f)
}

/// `(params) => { body }`.
pub fn arrow(params: &[&str], body: Vec<Statement>) -> Expression {
    Expression::ArrowFunction(function_node(None, params, body))
}

/// `(params) => expr`.
pub fn arrow_expr(params: &[&str], body: Expression) -> Expression {
    Expression::ArrowFunction(Function {
        id: None,
        params: params.iter().map(|p| id(p)).collect(),
        body: FunctionBody::Expression(Box::new(body)),
        is_async: false,
        is_generator: false,
    })
}

/// Unary operation.
pub fn unary(operator: UnaryOperator, argument: Expression) -> Expression {
    Expression::Unary(UnaryExpression {
        operator,
        argument: Box::new(argument),
    })
}

/// `typeof argument`.
pub fn typeof_(argument: Expression) -> Expression {
    unary(UnaryOperator::Typeof, argument)
}

/// `!argument`.
pub fn not(argument: Expression) -> Expression {
    unary(UnaryOperator::Not, argument)
}

/// Update operation.
pub fn update(operator: UpdateOperator, prefix: bool, argument: Expression) -> Expression {
    Expression::Update(UpdateExpression {
        operator,
        prefix,
        argument: Box::new(argument),
    })
}

/// `argument++`.
pub fn post_inc(argument: Expression) -> Expression {
    update(UpdateOperator::Increment, false, argument)
}

/// Binary operation.
pub fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Expression {
    Expression::Binary(BinaryExpression {
        operator,
        left: Box::new(left),
        right: Box::new(right),
    })
}

/// `left + right`.
pub fn add(left: Expression, right: Expression) -> Expression {
    binary(BinaryOperator::Add, left, right)
}

/// `left === right`.
pub fn strict_eq(left: Expression, right: Expression) -> Expression {
    binary(BinaryOperator::StrictEqual, left, right)
}

/// `left < right`.
pub fn lt(left: Expression, right: Expression) -> Expression {
    binary(BinaryOperator::LessThan, left, right)
}

/// Logical operation.
pub fn logical(operator: LogicalOperator, left: Expression, right: Expression) -> Expression {
    Expression::Logical(LogicalExpression {
        operator,
        left: Box::new(left),
        right: Box::new(right),
    })
}

/// `target = value`.
pub fn assign(target: Expression, value: Expression) -> Expression {
    assign_op(AssignmentOperator::Assign, target, value)
}

/// Compound assignment.
pub fn assign_op(operator: AssignmentOperator, target: Expression, value: Expression) -> Expression {
    Expression::Assignment(AssignmentExpression {
        operator,
        left: Box::new(target),
        right: Box::new(value),
    })
}

/// `test ? consequent : alternate`.
pub fn conditional(test: Expression, consequent: Expression, alternate: Expression) -> Expression {
    Expression::Conditional(ConditionalExpression {
        test: Box::new(test),
        consequent: Box::new(consequent),
        alternate: Box::new(alternate),
    })
}

/// `callee(arguments)`.
pub fn call(callee: Expression, arguments: Vec<Expression>) -> Expression {
    Expression::Call(CallExpression {
        callee: Box::new(callee),
        arguments,
    })
}

/// `object.name(arguments)`.
pub fn call_method(object: Expression, name: &str, arguments: Vec<Expression>) -> Expression {
    call(member(object, name), arguments)
}

/// `new callee(arguments)`.
pub fn new_expr(callee: Expression, arguments: Vec<Expression>) -> Expression {
    Expression::New(CallExpression {
        callee: Box::new(callee),
        arguments,
    })
}

/// `object.name`.
pub fn member(object: Expression, name: &str) -> Expression {
    Expression::Member(MemberExpression {
        object: Box::new(object),
        property: Box::new(ident(name)),
        computed: false,
    })
}

/// `object[key]`.
pub fn index(object: Expression, key: Expression) -> Expression {
    Expression::Member(MemberExpression {
        object: Box::new(object),
        property: Box::new(key),
        computed: true,
    })
}

/// Comma expression.
pub fn sequence(expressions: Vec<Expression>) -> Expression {
    Expression::Sequence(SequenceExpression { expressions })
}

/// `yield argument`.
pub fn yield_(argument: Option<Expression>) -> Expression {
    Expression::Yield(YieldExpression {
        argument: argument.map(Box::new),
        delegate: false,
    })
}

/// `yield* argument`.
pub fn yield_star(argument: Expression) -> Expression {
    Expression::Yield(YieldExpression {
        argument: Some(Box::new(argument)),
        delegate: true,
    })
}

/// `await argument`.
pub fn await_(argument: Expression) -> Expression {
    Expression::Await(AwaitExpression {
        argument: Box::new(argument),
    })
}

// ============================================================================
// Statements
// ============================================================================

/// Expression statement.
pub fn expr_stmt(expression: Expression) -> Statement {
    Statement::Expression(ExpressionStatement { expression })
}

/// `print(arguments);`
pub fn print(arguments: Vec<Expression>) -> Statement {
    expr_stmt(call(ident("print"), arguments))
}

fn declaration(kind: VariableKind, name: &str, init: Option<Expression>) -> VariableDeclaration {
    VariableDeclaration {
        kind,
        declarations: vec![VariableDeclarator { id: id(name), init }],
    }
}

/// `var name = init;`
pub fn var(name: &str, init: Option<Expression>) -> Statement {
    Statement::VariableDeclaration(declaration(VariableKind::Var, name, init))
}

/// `let name = init;`
pub fn let_(name: &str, init: Option<Expression>) -> Statement {
    Statement::VariableDeclaration(declaration(VariableKind::Let, name, init))
}

/// `const name = init;`
pub fn const_(name: &str, init: Expression) -> Statement {
    Statement::VariableDeclaration(declaration(VariableKind::Const, name, Some(init)))
}

/// `function name(params) { body }`
pub fn function_decl(name: &str, params: &[&str], body: Vec<Statement>) -> Statement {
    Statement::FunctionDeclaration(function_node(Some(name), params, body))
}

/// `function* name(params) { body }`
pub fn generator_decl(name: &str, params: &[&str], body: Vec<Statement>) -> Statement {
    let mut f = function_node(Some(name), params, body);
    f.is_generator = true;
    Statement::FunctionDeclaration(f)
}

/// `async function name(params) { body }`
pub fn async_decl(name: &str, params: &[&str], body: Vec<Statement>) -> Statement {
    let mut f = function_node(Some(name), params, body);
    f.is_async = true;
    Statement::FunctionDeclaration(f)
}

/// `{ body }`
pub fn block(body: Vec<Statement>) -> Statement {
    Statement::Block(BlockStatement { body })
}

/// `if (test) consequent else alternate`
pub fn if_(test: Expression, consequent: Statement, alternate: Option<Statement>) -> Statement {
    Statement::If(IfStatement {
        test,
        consequent: Box::new(consequent),
        alternate: alternate.map(Box::new),
    })
}

/// `while (test) body`
pub fn while_(test: Expression, body: Statement) -> Statement {
    Statement::While(WhileStatement {
        test,
        body: Box::new(body),
    })
}

/// `do body while (test)`
pub fn do_while(body: Statement, test: Expression) -> Statement {
    Statement::DoWhile(DoWhileStatement {
        body: Box::new(body),
        test,
    })
}

/// `for (init; test; update) body`
pub fn for_(
    init: Option<ForInit>,
    test: Option<Expression>,
    update: Option<Expression>,
    body: Statement,
) -> Statement {
    Statement::For(ForStatement {
        init,
        test,
        update,
        body: Box::new(body),
    })
}

/// `let name = init` in a for-statement head.
pub fn init_let(name: &str, init: Expression) -> ForInit {
    ForInit::Declaration(declaration(VariableKind::Let, name, Some(init)))
}

/// `var name = init` in a for-statement head.
pub fn init_var(name: &str, init: Expression) -> ForInit {
    ForInit::Declaration(declaration(VariableKind::Var, name, Some(init)))
}

/// Expression initializer in a for-statement head.
pub fn init_expr(expression: Expression) -> ForInit {
    ForInit::Expression(expression)
}

/// `for (kind name of right) body`
pub fn for_of(kind: VariableKind, name: &str, right: Expression, body: Statement) -> Statement {
    Statement::ForOf(ForOfStatement {
        left: ForHead::Declaration(declaration(kind, name, None)),
        right,
        body: Box::new(body),
    })
}

/// `for (kind name in right) body`
pub fn for_in(kind: VariableKind, name: &str, right: Expression, body: Statement) -> Statement {
    Statement::ForIn(ForInStatement {
        left: ForHead::Declaration(declaration(kind, name, None)),
        right,
        body: Box::new(body),
    })
}

/// `return argument;`
pub fn ret(argument: Option<Expression>) -> Statement {
    Statement::Return(ReturnStatement { argument })
}

/// `break label;`
pub fn brk(label: Option<&str>) -> Statement {
    Statement::Break(JumpStatement {
        label: label.map(id),
    })
}

/// `continue label;`
pub fn cont(label: Option<&str>) -> Statement {
    Statement::Continue(JumpStatement {
        label: label.map(id),
    })
}

/// `throw argument;`
pub fn throw(argument: Expression) -> Statement {
    Statement::Throw(ThrowStatement { argument })
}

/// `try { block } catch (param) { handler }`
pub fn try_catch(block: Vec<Statement>, param: &str, handler: Vec<Statement>) -> Statement {
    try_statement(block, Some((param, handler)), None)
}

/// `try { block } finally { finalizer }`
pub fn try_finally(block: Vec<Statement>, finalizer: Vec<Statement>) -> Statement {
    try_statement(block, None, Some(finalizer))
}

/// `try { block } catch (param) { handler } finally { finalizer }`
pub fn try_catch_finally(
    block: Vec<Statement>,
    param: &str,
    handler: Vec<Statement>,
    finalizer: Vec<Statement>,
) -> Statement {
    try_statement(block, Some((param, handler)), Some(finalizer))
}

fn try_statement(
    block: Vec<Statement>,
    handler: Option<(&str, Vec<Statement>)>,
    finalizer: Option<Vec<Statement>>,
) -> Statement {
    Statement::Try(TryStatement {
        block: BlockStatement { body: block },
        handler: handler.map(|(param, body)| CatchClause {
            param: Some(id(param)),
            body: BlockStatement { body },
        }),
        finalizer: finalizer.map(|body| BlockStatement { body }),
    })
}

/// `label: body`
pub fn labeled(label: &str, body: Statement) -> Statement {
    Statement::Labeled(LabeledStatement {
        label: id(label),
        body: Box::new(body),
    })
}

/// `with (object) body`
pub fn with(object: Expression, body: Statement) -> Statement {
    Statement::With(WithStatement {
        object,
        body: Box::new(body),
    })
}

/// `switch (discriminant) { cases }`
pub fn switch(discriminant: Expression, cases: Vec<SwitchCase>) -> Statement {
    Statement::Switch(SwitchStatement {
        discriminant,
        cases,
    })
}

/// `case test: consequent`
pub fn case(test: Expression, consequent: Vec<Statement>) -> SwitchCase {
    SwitchCase {
        test: Some(test),
        consequent,
    }
}

/// `default: consequent`
pub fn default_case(consequent: Vec<Statement>) -> SwitchCase {
    SwitchCase {
        test: None,
        consequent,
    }
}
