//! Builds the [`ScopeTree`] for a program.
//!
//! One pass over the AST. Each scope-owning node gets a scope whose binding
//! table is filled from the static declaration facts before its body is
//! walked; the walk itself only records facts that depend on references
//! (`arguments`, direct `eval`).

use tracing::trace;

use super::declarations::{
    block_lexical_declarations, top_level_lexical_declarations, var_declared_names,
    var_scoped_functions, LexicalKind,
};
use super::{Binding, BindingKind, NodeKey, Scope, ScopeId, ScopeKind, ScopeTree, ScopedNode};
use crate::ast::*;
use crate::error::{Error, Result};

/// Builds the scope tree of `program`.
///
/// Rejects redeclarations that are early errors and `with` in strict code;
/// everything else about the program is trusted.
pub fn analyze(program: &Program) -> Result<ScopeTree> {
    let mut binder = Binder {
        tree: ScopeTree::new(),
        current: ScopeId(0),
        functions: Vec::new(),
    };
    binder.program(program)?;
    trace!(scopes = binder.tree.len(), "scope analysis complete");
    Ok(binder.tree)
}

struct FunctionFrame {
    scope: ScopeId,
    arrow: bool,
    uses_arguments: bool,
    has_direct_eval: bool,
}

struct Binder {
    tree: ScopeTree,
    current: ScopeId,
    functions: Vec<FunctionFrame>,
}

impl Binder {
    fn enter(&mut self, kind: ScopeKind, node: NodeKey, strict: bool) -> ScopeId {
        let parent = if self.tree.is_empty() {
            None
        } else {
            Some(self.current)
        };
        let id = self.tree.push(Scope::new(kind, parent, node, strict));
        self.current = id;
        id
    }

    fn leave(&mut self, id: ScopeId) {
        if let Some(parent) = self.tree.scope(id).parent {
            self.current = parent;
        }
    }

    fn strict(&self) -> bool {
        !self.tree.is_empty() && self.tree.scope(self.current).strict
    }

    /// Adds `name` unless the scope already declares it. Returns whether a
    /// binding was added.
    fn declare(&mut self, scope: ScopeId, name: &str, kind: BindingKind) -> bool {
        let scope = self.tree.scope_mut(scope);
        if scope.index.contains_key(name) {
            return false;
        }
        scope.index.insert(name.to_string(), scope.bindings.len() as u32);
        scope.bindings.push(Binding {
            name: name.to_string(),
            kind,
        });
        true
    }

    fn set_kind(&mut self, scope: ScopeId, name: &str, kind: BindingKind) {
        let scope = self.tree.scope_mut(scope);
        if let Some(&slot) = scope.index.get(name) {
            scope.bindings[slot as usize].kind = kind;
        }
    }

    fn redeclaration(name: &str) -> Error {
        Error::syntax(format!("Identifier '{name}' has already been declared"))
    }

    // ========================================================================
    // Declaration tables
    // ========================================================================

    /// Fills a script, module or function scope from its body. Parameters
    /// and imports must already be declared.
    fn declare_var_scope(&mut self, scope: ScopeId, body: &[Statement]) -> Result<()> {
        for name in var_declared_names(body) {
            self.declare(scope, name, BindingKind::Var);
        }

        for function in var_scoped_functions(body) {
            let Some(name) = function.name() else { continue };
            match self.tree.scope(scope).kind_of(name) {
                None => {
                    self.declare(scope, name, BindingKind::Function);
                }
                Some(BindingKind::Var) => self.set_kind(scope, name, BindingKind::Function),
                Some(_) => {}
            }
        }

        for decl in top_level_lexical_declarations(body) {
            let kind = match decl.kind {
                LexicalKind::Const => BindingKind::Const,
                LexicalKind::Let | LexicalKind::Function => BindingKind::Let,
            };
            if !self.declare(scope, decl.name, kind) {
                return Err(Self::redeclaration(decl.name));
            }
        }
        Ok(())
    }

    fn declare_block<'a, I>(&mut self, scope: ScopeId, body: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Statement>,
    {
        let strict = self.tree.scope(scope).strict;
        for decl in block_lexical_declarations(body) {
            let kind = match decl.kind {
                LexicalKind::Let => BindingKind::Let,
                LexicalKind::Const => BindingKind::Const,
                LexicalKind::Function => BindingKind::Function,
            };
            if !self.declare(scope, decl.name, kind) {
                // Sloppy code may repeat a function declaration in a block.
                let repeated_function = kind == BindingKind::Function
                    && self.tree.scope(scope).kind_of(decl.name) == Some(BindingKind::Function);
                if strict || !repeated_function {
                    return Err(Self::redeclaration(decl.name));
                }
            }
        }
        Ok(())
    }

    /// A `var` may not cross a lexical declaration of the same name on its
    /// way to the var scope.
    fn check_var_hoisting(&self, name: &str) -> Result<()> {
        let mut id = self.current;
        loop {
            let scope = self.tree.scope(id);
            if scope.is_var_scope() {
                return Ok(());
            }
            match scope.kind_of(name) {
                Some(BindingKind::Let | BindingKind::Const | BindingKind::Function) => {
                    return Err(Self::redeclaration(name));
                }
                _ => {}
            }
            match scope.parent {
                Some(parent) => id = parent,
                None => return Ok(()),
            }
        }
    }

    // ========================================================================
    // Scopes
    // ========================================================================

    fn program(&mut self, program: &Program) -> Result<()> {
        let strict = program.is_strict();
        let kind = match program.source_type {
            SourceType::Script => ScopeKind::Script,
            SourceType::Module => ScopeKind::Module,
        };
        let scope = self.enter(kind, program.node_key(), strict);
        for import in &program.imports {
            if !self.declare(scope, &import.name, BindingKind::Import) {
                return Err(Self::redeclaration(&import.name));
            }
        }
        self.declare_var_scope(scope, &program.body)?;

        self.functions.push(FunctionFrame {
            scope,
            arrow: false,
            uses_arguments: false,
            has_direct_eval: false,
        });
        self.statements(&program.body)?;
        if let Some(frame) = self.functions.pop() {
            if frame.has_direct_eval {
                self.tree.scope_mut(scope).dynamic = true;
            }
        }
        Ok(())
    }

    fn function(&mut self, function: &Function, arrow: bool, expression: bool) -> Result<()> {
        let strict = self.strict() || function.has_use_strict();
        let scope = self.enter(ScopeKind::Function, function.node_key(), strict);
        self.tree.scope_mut(scope).arrow = arrow;

        for param in &function.params {
            if !self.declare(scope, &param.name, BindingKind::Parameter) && strict {
                return Err(Error::syntax(format!(
                    "Duplicate parameter name '{}' not allowed in this context",
                    param.name
                )));
            }
        }
        self.declare_var_scope(scope, function.statements())?;

        self.functions.push(FunctionFrame {
            scope,
            arrow,
            uses_arguments: false,
            has_direct_eval: false,
        });
        match &function.body {
            FunctionBody::Block(block) => self.statements(&block.body)?,
            FunctionBody::Expression(expr) => self.expression(expr)?,
        }
        let frame = self.functions.pop();

        if let Some(frame) = frame {
            if frame.has_direct_eval {
                self.tree.scope_mut(scope).dynamic = true;
            }
            if !arrow && (frame.uses_arguments || frame.has_direct_eval) {
                match self.tree.scope(scope).kind_of("arguments") {
                    None => {
                        self.declare(scope, "arguments", BindingKind::Arguments);
                    }
                    Some(BindingKind::Var) => {
                        self.set_kind(scope, "arguments", BindingKind::Arguments)
                    }
                    Some(_) => {}
                }
            }
        }

        if expression && !arrow {
            if let Some(name) = function.name() {
                self.declare(scope, name, BindingKind::Callee);
            }
        }

        self.leave(scope);
        Ok(())
    }

    fn block(&mut self, block: &BlockStatement) -> Result<()> {
        let strict = self.strict();
        let scope = self.enter(ScopeKind::Block, block.node_key(), strict);
        self.declare_block(scope, &block.body)?;
        self.statements(&block.body)?;
        self.leave(scope);
        Ok(())
    }

    /// Marks the nearest non-arrow function as needing its arguments object.
    fn uses_arguments(&mut self) {
        if let Some(frame) = self.functions.iter_mut().rev().find(|f| !f.arrow) {
            if self.tree.scope(frame.scope).kind == ScopeKind::Function {
                frame.uses_arguments = true;
            }
        }
    }

    fn direct_eval(&mut self) {
        if let Some(frame) = self.functions.last_mut() {
            frame.has_direct_eval = true;
        }
        // Arrows see the enclosing function's arguments through eval too.
        if let Some(frame) = self.functions.iter_mut().rev().find(|f| !f.arrow) {
            frame.has_direct_eval = true;
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn statements(&mut self, body: &[Statement]) -> Result<()> {
        for stmt in body {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn variable_declaration(&mut self, decl: &VariableDeclaration) -> Result<()> {
        for d in &decl.declarations {
            if decl.kind == VariableKind::Var {
                self.check_var_hoisting(&d.id.name)?;
            }
            if let Some(init) = &d.init {
                self.expression(init)?;
            }
        }
        Ok(())
    }

    fn loop_head(&mut self, node: NodeKey, decl: Option<&VariableDeclaration>) -> Result<ScopeId> {
        let strict = self.strict();
        let scope = self.enter(ScopeKind::Block, node, strict);
        if let Some(decl) = decl {
            let kind = match decl.kind {
                VariableKind::Var => None,
                VariableKind::Let => Some(BindingKind::Let),
                VariableKind::Const => Some(BindingKind::Const),
            };
            if let Some(kind) = kind {
                for d in &decl.declarations {
                    if !self.declare(scope, &d.id.name, kind) {
                        return Err(Self::redeclaration(&d.id.name));
                    }
                }
            }
        }
        Ok(scope)
    }

    fn for_head(&mut self, left: &ForHead) -> Result<()> {
        match left {
            ForHead::Declaration(decl) => self.variable_declaration(decl),
            ForHead::Target(target) => self.expression(target),
        }
    }

    fn statement(&mut self, stmt: &Statement) -> Result<()> {
        match stmt {
            Statement::VariableDeclaration(decl) => self.variable_declaration(decl),
            Statement::FunctionDeclaration(f) => self.function(f, false, false),
            Statement::Expression(s) => self.expression(&s.expression),
            Statement::Block(block) => self.block(block),
            Statement::If(s) => {
                self.expression(&s.test)?;
                self.statement(&s.consequent)?;
                if let Some(alt) = &s.alternate {
                    self.statement(alt)?;
                }
                Ok(())
            }
            Statement::Switch(s) => {
                self.expression(&s.discriminant)?;
                let strict = self.strict();
                let scope = self.enter(ScopeKind::Block, s.node_key(), strict);
                self.declare_block(scope, s.statements())?;
                for case in &s.cases {
                    if let Some(test) = &case.test {
                        self.expression(test)?;
                    }
                    self.statements(&case.consequent)?;
                }
                self.leave(scope);
                Ok(())
            }
            Statement::While(s) => {
                self.expression(&s.test)?;
                self.statement(&s.body)
            }
            Statement::DoWhile(s) => {
                self.statement(&s.body)?;
                self.expression(&s.test)
            }
            Statement::For(s) => {
                let decl = match &s.init {
                    Some(ForInit::Declaration(decl)) => Some(decl),
                    _ => None,
                };
                let scope = self.loop_head(s.node_key(), decl)?;
                match &s.init {
                    Some(ForInit::Declaration(decl)) => self.variable_declaration(decl)?,
                    Some(ForInit::Expression(expr)) => self.expression(expr)?,
                    None => {}
                }
                if let Some(test) = &s.test {
                    self.expression(test)?;
                }
                if let Some(update) = &s.update {
                    self.expression(update)?;
                }
                self.statement(&s.body)?;
                self.leave(scope);
                Ok(())
            }
            Statement::ForIn(s) => {
                self.expression(&s.right)?;
                let decl = match &s.left {
                    ForHead::Declaration(decl) => Some(decl),
                    ForHead::Target(_) => None,
                };
                let scope = self.loop_head(s.node_key(), decl)?;
                self.for_head(&s.left)?;
                self.statement(&s.body)?;
                self.leave(scope);
                Ok(())
            }
            Statement::ForOf(s) => {
                self.expression(&s.right)?;
                let decl = match &s.left {
                    ForHead::Declaration(decl) => Some(decl),
                    ForHead::Target(_) => None,
                };
                let scope = self.loop_head(s.node_key(), decl)?;
                self.for_head(&s.left)?;
                self.statement(&s.body)?;
                self.leave(scope);
                Ok(())
            }
            Statement::Return(s) => match &s.argument {
                Some(arg) => self.expression(arg),
                None => Ok(()),
            },
            Statement::Throw(s) => self.expression(&s.argument),
            Statement::Try(s) => {
                self.block(&s.block)?;
                if let Some(handler) = &s.handler {
                    let strict = self.strict();
                    let scope = self.enter(ScopeKind::Catch, handler.node_key(), strict);
                    if let Some(param) = &handler.param {
                        self.declare(scope, &param.name, BindingKind::Parameter);
                    }
                    self.block(&handler.body)?;
                    self.leave(scope);
                }
                if let Some(finalizer) = &s.finalizer {
                    self.block(finalizer)?;
                }
                Ok(())
            }
            Statement::With(s) => {
                if self.strict() {
                    return Err(Error::syntax(
                        "Strict mode code may not include a with statement",
                    ));
                }
                self.expression(&s.object)?;
                let scope = self.enter(ScopeKind::With, s.node_key(), false);
                self.statement(&s.body)?;
                self.leave(scope);
                Ok(())
            }
            Statement::Labeled(s) => self.statement(&s.body),
            Statement::Break(_)
            | Statement::Continue(_)
            | Statement::Debugger
            | Statement::Empty => Ok(()),
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn expressions<'a>(&mut self, exprs: impl IntoIterator<Item = &'a Expression>) -> Result<()> {
        for expr in exprs {
            self.expression(expr)?;
        }
        Ok(())
    }

    fn expression(&mut self, expr: &Expression) -> Result<()> {
        match expr {
            Expression::Identifier(id) => {
                if id.name == "arguments" {
                    self.uses_arguments();
                }
                Ok(())
            }
            Expression::Literal(_) | Expression::This => Ok(()),
            Expression::TemplateLiteral(t) => self.expressions(&t.expressions),
            Expression::Array(a) => self.expressions(a.elements.iter().flatten()),
            Expression::Object(o) => {
                for prop in &o.properties {
                    if prop.computed {
                        self.expression(&prop.key)?;
                    }
                    self.expression(&prop.value)?;
                }
                Ok(())
            }
            Expression::Function(f) => self.function(f, false, true),
            Expression::ArrowFunction(f) => self.function(f, true, true),
            Expression::Unary(u) => self.expression(&u.argument),
            Expression::Update(u) => self.expression(&u.argument),
            Expression::Binary(b) => {
                self.expression(&b.left)?;
                self.expression(&b.right)
            }
            Expression::Logical(l) => {
                self.expression(&l.left)?;
                self.expression(&l.right)
            }
            Expression::Assignment(a) => {
                self.expression(&a.left)?;
                self.expression(&a.right)
            }
            Expression::Conditional(c) => {
                self.expression(&c.test)?;
                self.expression(&c.consequent)?;
                self.expression(&c.alternate)
            }
            Expression::Call(c) => {
                if c.callee.as_identifier() == Some("eval") {
                    self.direct_eval();
                }
                self.expression(&c.callee)?;
                self.expressions(&c.arguments)
            }
            Expression::New(c) => {
                self.expression(&c.callee)?;
                self.expressions(&c.arguments)
            }
            Expression::Member(m) => {
                self.expression(&m.object)?;
                if m.computed {
                    self.expression(&m.property)?;
                }
                Ok(())
            }
            Expression::Sequence(s) => self.expressions(&s.expressions),
            Expression::Yield(y) => match &y.argument {
                Some(arg) => self.expression(arg),
                None => Ok(()),
            },
            Expression::Await(a) => self.expression(&a.argument),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;

    #[test]
    fn test_every_scoped_node_is_registered() {
        let program = script(vec![
            block(vec![let_("a", None)]),
            for_(Some(init_let("i", num(0.0))), None, None, block(vec![])),
            try_catch(vec![], "e", vec![]),
            switch(ident("x"), vec![case(num(1.0), vec![let_("b", None)])]),
        ]);
        let tree = analyze(&program).unwrap();
        // script, block, for head, for body, try block, catch, catch body, switch
        assert_eq!(tree.len(), 8);
        assert_eq!(tree.scope(tree.root()).kind(), ScopeKind::Script);
    }

    #[test]
    fn test_var_may_not_cross_lexical() {
        let program = script(vec![block(vec![let_("x", None), block(vec![var("x", None)])])]);
        assert!(matches!(analyze(&program), Err(Error::Syntax(_))));
    }

    #[test]
    fn test_with_rejected_in_strict_code() {
        let program = strict_script(vec![with(ident("o"), block(vec![]))]);
        assert!(matches!(analyze(&program), Err(Error::Syntax(_))));
    }

    #[test]
    fn test_sloppy_block_may_repeat_function() {
        let program = script(vec![block(vec![
            function_decl("f", &[], vec![]),
            function_decl("f", &[], vec![]),
        ])]);
        assert!(analyze(&program).is_ok());

        let program = strict_script(vec![block(vec![
            function_decl("f", &[], vec![]),
            function_decl("f", &[], vec![]),
        ])]);
        assert!(analyze(&program).is_err());
    }

    #[test]
    fn test_arrow_arguments_belong_to_enclosing_function() {
        let program = script(vec![function_decl(
            "f",
            &[],
            vec![ret(Some(arrow_expr(&[], ident("arguments"))))],
        )]);
        let tree = analyze(&program).unwrap();
        let f = match &program.body[0] {
            Statement::FunctionDeclaration(f) => f,
            _ => unreachable!(),
        };
        let scope = tree.scope(tree.scope_of(f).unwrap());
        assert_eq!(scope.kind_of("arguments"), Some(BindingKind::Arguments));
    }

    #[test]
    fn test_module_imports_come_first() {
        let program = module(&["dep"], vec![let_("x", None)]);
        let tree = analyze(&program).unwrap();
        let root = tree.scope(tree.root());
        assert_eq!(root.kind(), ScopeKind::Module);
        assert!(root.is_strict());
        assert_eq!(root.kind_of("dep"), Some(BindingKind::Import));
        assert_eq!(root.slot_of("x"), Some(1));
    }
}
