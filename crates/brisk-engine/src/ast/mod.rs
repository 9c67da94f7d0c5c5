//! Abstract Syntax Tree (AST) definitions for JavaScript.
//!
//! These structures follow ESTree naming so that a program can be handed to
//! the engine as the JSON emitted by any ESTree-compatible parser. Every
//! syntactic category is a closed enum; translation code matches on them
//! exhaustively.

pub mod builder;

use serde::{Deserialize, Serialize};

/// A complete JavaScript program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// The statements in the program
    pub body: Vec<Statement>,
    /// Script or module goal
    #[serde(default, rename = "sourceType")]
    pub source_type: SourceType,
    /// Names a module body imports; bound before the body runs
    #[serde(default)]
    pub imports: Vec<Identifier>,
}

impl Program {
    /// Returns true when the program starts with a `"use strict"` directive
    /// or is a module.
    pub fn is_strict(&self) -> bool {
        self.source_type == SourceType::Module || has_use_strict(&self.body)
    }
}

/// Parse goal of a program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Classic script
    #[default]
    Script,
    /// ECMAScript module
    Module,
}

/// An identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    /// The name of the identifier
    pub name: String,
}

/// A JavaScript statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Statement {
    /// Variable declaration (var, let, const)
    VariableDeclaration(VariableDeclaration),
    /// Function, generator or async function declaration
    FunctionDeclaration(Function),
    /// Expression statement
    #[serde(rename = "ExpressionStatement")]
    Expression(ExpressionStatement),
    /// Block statement { ... }
    #[serde(rename = "BlockStatement")]
    Block(BlockStatement),
    /// If statement
    #[serde(rename = "IfStatement")]
    If(IfStatement),
    /// Switch statement
    #[serde(rename = "SwitchStatement")]
    Switch(SwitchStatement),
    /// While statement
    #[serde(rename = "WhileStatement")]
    While(WhileStatement),
    /// Do-while statement
    #[serde(rename = "DoWhileStatement")]
    DoWhile(DoWhileStatement),
    /// For statement
    #[serde(rename = "ForStatement")]
    For(ForStatement),
    /// For-in statement
    #[serde(rename = "ForInStatement")]
    ForIn(ForInStatement),
    /// For-of statement
    #[serde(rename = "ForOfStatement")]
    ForOf(ForOfStatement),
    /// Return statement
    #[serde(rename = "ReturnStatement")]
    Return(ReturnStatement),
    /// Break statement (with optional label)
    #[serde(rename = "BreakStatement")]
    Break(JumpStatement),
    /// Continue statement (with optional label)
    #[serde(rename = "ContinueStatement")]
    Continue(JumpStatement),
    /// Throw statement
    #[serde(rename = "ThrowStatement")]
    Throw(ThrowStatement),
    /// Try statement
    #[serde(rename = "TryStatement")]
    Try(TryStatement),
    /// With statement (sloppy mode only)
    #[serde(rename = "WithStatement")]
    With(WithStatement),
    /// Labeled statement
    #[serde(rename = "LabeledStatement")]
    Labeled(LabeledStatement),
    /// Debugger statement
    #[serde(rename = "DebuggerStatement")]
    Debugger,
    /// Empty statement (;)
    #[serde(rename = "EmptyStatement")]
    Empty,
}

/// Variable declaration kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    /// var declaration
    Var,
    /// let declaration
    Let,
    /// const declaration
    Const,
}

impl VariableKind {
    /// Returns true for `let` and `const`.
    pub fn is_lexical(self) -> bool {
        !matches!(self, VariableKind::Var)
    }
}

/// A variable declaration statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDeclaration {
    /// The kind of declaration
    pub kind: VariableKind,
    /// The declarators
    pub declarations: Vec<VariableDeclarator>,
}

/// A single variable declarator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDeclarator {
    /// The identifier being declared
    pub id: Identifier,
    /// Optional initializer expression
    #[serde(default)]
    pub init: Option<Expression>,
}

/// A function of any flavor.
///
/// The syntactic position decides whether it is a declaration, an expression
/// or an arrow function; see [`Statement::FunctionDeclaration`],
/// [`Expression::Function`] and [`Expression::ArrowFunction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// The function name
    #[serde(default)]
    pub id: Option<Identifier>,
    /// The parameters
    pub params: Vec<Identifier>,
    /// The function body
    pub body: FunctionBody,
    /// Whether this is an async function
    #[serde(default, rename = "async")]
    pub is_async: bool,
    /// Whether this is a generator function
    #[serde(default, rename = "generator")]
    pub is_generator: bool,
}

impl Function {
    /// Returns the declared name, if any.
    pub fn name(&self) -> Option<&str> {
        self.id.as_ref().map(|id| id.name.as_str())
    }

    /// Returns the statements of a block body; concise bodies have none.
    pub fn statements(&self) -> &[Statement] {
        match &self.body {
            FunctionBody::Block(block) => &block.body,
            FunctionBody::Expression(_) => &[],
        }
    }

    /// Returns true when the body opens with a `"use strict"` directive.
    pub fn has_use_strict(&self) -> bool {
        has_use_strict(self.statements())
    }
}

/// Body of a function: a block, or a single expression for concise arrows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FunctionBody {
    /// `{ ... }`
    Block(BlockStatement),
    /// `x => expr`
    Expression(Box<Expression>),
}

/// An expression statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionStatement {
    /// The expression
    pub expression: Expression,
}

/// A block statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockStatement {
    /// The statements in the block
    pub body: Vec<Statement>,
}

/// An if statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStatement {
    /// The condition
    pub test: Expression,
    /// The then branch
    pub consequent: Box<Statement>,
    /// The optional else branch
    #[serde(default)]
    pub alternate: Option<Box<Statement>>,
}

/// A switch statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchStatement {
    /// The value being switched on
    pub discriminant: Expression,
    /// The case clauses
    pub cases: Vec<SwitchCase>,
}

impl SwitchStatement {
    /// All statements of every clause, in source order.
    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.cases.iter().flat_map(|case| case.consequent.iter())
    }
}

/// A case clause; `test` is `None` for `default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// The case test, or None for default
    #[serde(default)]
    pub test: Option<Expression>,
    /// The statements of the clause
    pub consequent: Vec<Statement>,
}

/// A while statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhileStatement {
    /// The condition
    pub test: Expression,
    /// The loop body
    pub body: Box<Statement>,
}

/// A do-while statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoWhileStatement {
    /// The loop body
    pub body: Box<Statement>,
    /// The condition
    pub test: Expression,
}

/// A for statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForStatement {
    /// The initializer
    #[serde(default)]
    pub init: Option<ForInit>,
    /// The condition
    #[serde(default)]
    pub test: Option<Expression>,
    /// The update expression
    #[serde(default)]
    pub update: Option<Expression>,
    /// The loop body
    pub body: Box<Statement>,
}

/// Initializer of a for statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForInit {
    /// `for (var i = 0; ...)`
    Declaration(VariableDeclaration),
    /// `for (i = 0; ...)`
    Expression(Expression),
}

/// Left-hand side of a for-in / for-of statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForHead {
    /// `for (let x of ...)`
    Declaration(VariableDeclaration),
    /// `for (x of ...)`, `for (o.p in ...)`
    Target(Expression),
}

impl ForHead {
    /// Returns the lexical declaration kind and bound name of a `let` or
    /// `const` head.
    pub fn lexical_binding(&self) -> Option<(VariableKind, &str)> {
        match self {
            ForHead::Declaration(decl) if decl.kind.is_lexical() => decl
                .declarations
                .first()
                .map(|d| (decl.kind, d.id.name.as_str())),
            _ => None,
        }
    }
}

/// A for-in statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForInStatement {
    /// The binding or target
    pub left: ForHead,
    /// The object being enumerated
    pub right: Expression,
    /// The loop body
    pub body: Box<Statement>,
}

/// A for-of statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForOfStatement {
    /// The binding or target
    pub left: ForHead,
    /// The iterable
    pub right: Expression,
    /// The loop body
    pub body: Box<Statement>,
}

/// A return statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStatement {
    /// The return value
    #[serde(default)]
    pub argument: Option<Expression>,
}

/// A break or continue statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JumpStatement {
    /// The target label
    #[serde(default)]
    pub label: Option<Identifier>,
}

/// A throw statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrowStatement {
    /// The value to throw
    pub argument: Expression,
}

/// A try statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryStatement {
    /// The protected block
    pub block: BlockStatement,
    /// The catch clause
    #[serde(default)]
    pub handler: Option<CatchClause>,
    /// The finally block
    #[serde(default)]
    pub finalizer: Option<BlockStatement>,
}

/// A catch clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    /// The exception binding (optional catch binding when absent)
    #[serde(default)]
    pub param: Option<Identifier>,
    /// The handler body
    pub body: BlockStatement,
}

/// A with statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithStatement {
    /// The scope object
    pub object: Expression,
    /// The body
    pub body: Box<Statement>,
}

/// A labeled statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledStatement {
    /// The label
    pub label: Identifier,
    /// The labeled statement
    pub body: Box<Statement>,
}

/// A JavaScript expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Expression {
    /// Identifier reference
    Identifier(Identifier),
    /// Literal value
    Literal(Literal),
    /// Template literal without tag
    TemplateLiteral(TemplateLiteral),
    /// this
    #[serde(rename = "ThisExpression")]
    This,
    /// Array literal
    #[serde(rename = "ArrayExpression")]
    Array(ArrayExpression),
    /// Object literal
    #[serde(rename = "ObjectExpression")]
    Object(ObjectExpression),
    /// Function expression
    #[serde(rename = "FunctionExpression")]
    Function(Function),
    /// Arrow function
    #[serde(rename = "ArrowFunctionExpression")]
    ArrowFunction(Function),
    /// Unary operation
    #[serde(rename = "UnaryExpression")]
    Unary(UnaryExpression),
    /// Update operation (++ / --)
    #[serde(rename = "UpdateExpression")]
    Update(UpdateExpression),
    /// Binary operation
    #[serde(rename = "BinaryExpression")]
    Binary(BinaryExpression),
    /// Logical operation
    #[serde(rename = "LogicalExpression")]
    Logical(LogicalExpression),
    /// Assignment
    #[serde(rename = "AssignmentExpression")]
    Assignment(AssignmentExpression),
    /// Conditional (ternary)
    #[serde(rename = "ConditionalExpression")]
    Conditional(ConditionalExpression),
    /// Function call
    #[serde(rename = "CallExpression")]
    Call(CallExpression),
    /// new expression
    #[serde(rename = "NewExpression")]
    New(CallExpression),
    /// Member access
    #[serde(rename = "MemberExpression")]
    Member(MemberExpression),
    /// Comma-separated sequence
    #[serde(rename = "SequenceExpression")]
    Sequence(SequenceExpression),
    /// yield / yield*
    #[serde(rename = "YieldExpression")]
    Yield(YieldExpression),
    /// await
    #[serde(rename = "AwaitExpression")]
    Await(AwaitExpression),
}

impl Expression {
    /// Returns true for a literal value (not a template).
    pub fn is_value_literal(&self) -> bool {
        matches!(self, Expression::Literal(_))
    }

    /// Returns the string value of a string literal.
    pub fn as_string_literal(&self) -> Option<&str> {
        match self {
            Expression::Literal(Literal {
                value: LiteralValue::String(s),
            }) => Some(s),
            _ => None,
        }
    }

    /// Returns the identifier name of an identifier reference.
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Expression::Identifier(id) => Some(&id.name),
            _ => None,
        }
    }
}

/// A literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    /// The literal value
    pub value: LiteralValue,
}

/// The value of a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    /// true / false
    Boolean(bool),
    /// Numeric literal
    Number(f64),
    /// String literal
    String(String),
    /// null
    Null,
}

/// A template literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateLiteral {
    /// The string parts; one more than `expressions`
    pub quasis: Vec<TemplateElement>,
    /// The substitutions
    pub expressions: Vec<Expression>,
}

/// A string part of a template literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateElement {
    /// Raw and cooked text
    pub value: TemplateValue,
}

/// Text of a template element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateValue {
    /// Escape-processed text
    pub cooked: String,
}

/// An array literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayExpression {
    /// The elements (None for holes)
    pub elements: Vec<Option<Expression>>,
}

/// An object literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectExpression {
    /// The properties
    pub properties: Vec<Property>,
}

/// An object literal property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// The key: an identifier or literal, or any expression when computed
    pub key: Expression,
    /// The value
    pub value: Expression,
    /// Whether the key is `[expr]`
    #[serde(default)]
    pub computed: bool,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    /// -
    #[serde(rename = "-")]
    Minus,
    /// +
    #[serde(rename = "+")]
    Plus,
    /// !
    #[serde(rename = "!")]
    Not,
    /// ~
    #[serde(rename = "~")]
    BitwiseNot,
    /// typeof
    #[serde(rename = "typeof")]
    Typeof,
    /// void
    #[serde(rename = "void")]
    Void,
    /// delete
    #[serde(rename = "delete")]
    Delete,
}

/// A unary expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpression {
    /// The operator
    pub operator: UnaryOperator,
    /// The operand
    pub argument: Box<Expression>,
}

/// Update operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOperator {
    /// ++
    #[serde(rename = "++")]
    Increment,
    /// --
    #[serde(rename = "--")]
    Decrement,
}

/// An update expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateExpression {
    /// The operator
    pub operator: UpdateOperator,
    /// Whether the operator precedes the operand
    pub prefix: bool,
    /// The operand
    pub argument: Box<Expression>,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    /// ==
    #[serde(rename = "==")]
    Equal,
    /// !=
    #[serde(rename = "!=")]
    NotEqual,
    /// ===
    #[serde(rename = "===")]
    StrictEqual,
    /// !==
    #[serde(rename = "!==")]
    StrictNotEqual,
    /// <
    #[serde(rename = "<")]
    LessThan,
    /// <=
    #[serde(rename = "<=")]
    LessThanEqual,
    /// >
    #[serde(rename = ">")]
    GreaterThan,
    /// >=
    #[serde(rename = ">=")]
    GreaterThanEqual,
    /// <<
    #[serde(rename = "<<")]
    LeftShift,
    /// >>
    #[serde(rename = ">>")]
    RightShift,
    /// >>>
    #[serde(rename = ">>>")]
    UnsignedRightShift,
    /// +
    #[serde(rename = "+")]
    Add,
    /// -
    #[serde(rename = "-")]
    Subtract,
    /// *
    #[serde(rename = "*")]
    Multiply,
    /// /
    #[serde(rename = "/")]
    Divide,
    /// %
    #[serde(rename = "%")]
    Modulo,
    /// **
    #[serde(rename = "**")]
    Exponent,
    /// |
    #[serde(rename = "|")]
    BitwiseOr,
    /// ^
    #[serde(rename = "^")]
    BitwiseXor,
    /// &
    #[serde(rename = "&")]
    BitwiseAnd,
    /// in
    #[serde(rename = "in")]
    In,
    /// instanceof
    #[serde(rename = "instanceof")]
    Instanceof,
}

/// A binary expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpression {
    /// The operator
    pub operator: BinaryOperator,
    /// The left operand
    pub left: Box<Expression>,
    /// The right operand
    pub right: Box<Expression>,
}

/// Logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    /// &&
    #[serde(rename = "&&")]
    And,
    /// ||
    #[serde(rename = "||")]
    Or,
    /// ??
    #[serde(rename = "??")]
    NullishCoalescing,
}

/// A logical expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalExpression {
    /// The operator
    pub operator: LogicalOperator,
    /// The left operand
    pub left: Box<Expression>,
    /// The right operand
    pub right: Box<Expression>,
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignmentOperator {
    /// =
    #[serde(rename = "=")]
    Assign,
    /// +=
    #[serde(rename = "+=")]
    AddAssign,
    /// -=
    #[serde(rename = "-=")]
    SubtractAssign,
    /// *=
    #[serde(rename = "*=")]
    MultiplyAssign,
    /// /=
    #[serde(rename = "/=")]
    DivideAssign,
    /// %=
    #[serde(rename = "%=")]
    ModuloAssign,
    /// **=
    #[serde(rename = "**=")]
    ExponentAssign,
    /// <<=
    #[serde(rename = "<<=")]
    LeftShiftAssign,
    /// >>=
    #[serde(rename = ">>=")]
    RightShiftAssign,
    /// >>>=
    #[serde(rename = ">>>=")]
    UnsignedRightShiftAssign,
    /// |=
    #[serde(rename = "|=")]
    BitwiseOrAssign,
    /// ^=
    #[serde(rename = "^=")]
    BitwiseXorAssign,
    /// &=
    #[serde(rename = "&=")]
    BitwiseAndAssign,
}

impl AssignmentOperator {
    /// The binary operator a compound assignment applies.
    pub fn binary_operator(self) -> Option<BinaryOperator> {
        Some(match self {
            AssignmentOperator::Assign => return None,
            AssignmentOperator::AddAssign => BinaryOperator::Add,
            AssignmentOperator::SubtractAssign => BinaryOperator::Subtract,
            AssignmentOperator::MultiplyAssign => BinaryOperator::Multiply,
            AssignmentOperator::DivideAssign => BinaryOperator::Divide,
            AssignmentOperator::ModuloAssign => BinaryOperator::Modulo,
            AssignmentOperator::ExponentAssign => BinaryOperator::Exponent,
            AssignmentOperator::LeftShiftAssign => BinaryOperator::LeftShift,
            AssignmentOperator::RightShiftAssign => BinaryOperator::RightShift,
            AssignmentOperator::UnsignedRightShiftAssign => BinaryOperator::UnsignedRightShift,
            AssignmentOperator::BitwiseOrAssign => BinaryOperator::BitwiseOr,
            AssignmentOperator::BitwiseXorAssign => BinaryOperator::BitwiseXor,
            AssignmentOperator::BitwiseAndAssign => BinaryOperator::BitwiseAnd,
        })
    }
}

/// An assignment expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentExpression {
    /// The operator
    pub operator: AssignmentOperator,
    /// The target: identifier or member expression
    pub left: Box<Expression>,
    /// The value
    pub right: Box<Expression>,
}

/// A conditional expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalExpression {
    /// The condition
    pub test: Box<Expression>,
    /// Value when true
    pub consequent: Box<Expression>,
    /// Value when false
    pub alternate: Box<Expression>,
}

/// A call or new expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallExpression {
    /// The function being called
    pub callee: Box<Expression>,
    /// The arguments
    pub arguments: Vec<Expression>,
}

/// A member expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberExpression {
    /// The object
    pub object: Box<Expression>,
    /// The property: an identifier unless `computed`
    pub property: Box<Expression>,
    /// Whether this is `obj[expr]`
    #[serde(default)]
    pub computed: bool,
}

impl MemberExpression {
    /// Returns the static property name of `obj.name`.
    pub fn static_name(&self) -> Option<&str> {
        if self.computed {
            None
        } else {
            self.property.as_identifier()
        }
    }
}

/// A sequence expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceExpression {
    /// The expressions, evaluated left to right
    pub expressions: Vec<Expression>,
}

/// A yield expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldExpression {
    /// The yielded value
    #[serde(default)]
    pub argument: Option<Box<Expression>>,
    /// Whether this is `yield*`
    #[serde(default)]
    pub delegate: bool,
}

/// An await expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwaitExpression {
    /// The awaited value
    pub argument: Box<Expression>,
}

/// Returns true when the directive prologue of `body` contains `"use strict"`.
pub fn has_use_strict(body: &[Statement]) -> bool {
    for stmt in body {
        match stmt {
            Statement::Expression(ExpressionStatement { expression }) => {
                match expression.as_string_literal() {
                    Some("use strict") => return true,
                    Some(_) => continue,
                    None => return false,
                }
            }
            _ => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_estree() {
        let json = r#"{
            "type": "Program",
            "sourceType": "script",
            "body": [
                { "type": "VariableDeclaration", "kind": "let", "declarations": [
                    { "type": "VariableDeclarator",
                      "id": { "type": "Identifier", "name": "x" },
                      "init": { "type": "Literal", "value": 1 } }
                ]},
                { "type": "ExpressionStatement", "expression": {
                    "type": "BinaryExpression", "operator": "+",
                    "left": { "type": "Identifier", "name": "x" },
                    "right": { "type": "Literal", "value": "a" } } },
                { "type": "EmptyStatement" }
            ]
        }"#;
        let program: Program = serde_json::from_str(json).unwrap();
        assert_eq!(program.body.len(), 3);
        assert!(matches!(
            &program.body[0],
            Statement::VariableDeclaration(VariableDeclaration { kind: VariableKind::Let, .. })
        ));
        match &program.body[1] {
            Statement::Expression(ExpressionStatement {
                expression: Expression::Binary(bin),
            }) => {
                assert_eq!(bin.operator, BinaryOperator::Add);
                assert_eq!(bin.right.as_string_literal(), Some("a"));
            }
            other => panic!("unexpected statement {other:?}"),
        }
        assert_eq!(program.body[2], Statement::Empty);
    }

    #[test]
    fn test_deserialize_arrow_bodies() {
        let json = r#"{ "type": "ArrowFunctionExpression", "params": [],
            "body": { "type": "Literal", "value": null } }"#;
        let expr: Expression = serde_json::from_str(json).unwrap();
        match expr {
            Expression::ArrowFunction(f) => {
                assert!(matches!(f.body, FunctionBody::Expression(_)));
                assert!(f.statements().is_empty());
            }
            other => panic!("unexpected expression {other:?}"),
        }

        let json = r#"{ "type": "ArrowFunctionExpression", "params": [],
            "body": { "type": "BlockStatement", "body": [] } }"#;
        let expr: Expression = serde_json::from_str(json).unwrap();
        assert!(matches!(
            expr,
            Expression::ArrowFunction(Function { body: FunctionBody::Block(_), .. })
        ));
    }

    #[test]
    fn test_use_strict_directive() {
        let strict = vec![builder::expr_stmt(builder::str_lit("use strict"))];
        assert!(has_use_strict(&strict));
        let sloppy = vec![
            builder::expr_stmt(builder::num(1.0)),
            builder::expr_stmt(builder::str_lit("use strict")),
        ];
        assert!(!has_use_strict(&sloppy));
    }
}
