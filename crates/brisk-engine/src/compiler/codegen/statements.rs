//! Statement translation.

use super::labels::JumpTarget;
use super::{CodeGenerator, Completion};
use crate::ast::*;
use crate::compiler::bytecode::{FunctionKind, HandlerKind, LabelId, OpCode, Operand, SwitchKey};
use crate::error::{Error, Result};
use crate::scope::Resolution;

impl CodeGenerator<'_> {
    /// Translates a statement list, stopping at the first statement that
    /// cannot complete normally.
    pub(super) fn statements(&mut self, body: &[Statement]) -> Result<Completion> {
        let mut completion = Completion::Normal;
        for stmt in body {
            completion = completion.then(self.statement(stmt)?);
            if completion.is_abrupt() {
                break;
            }
        }
        Ok(completion)
    }

    pub(super) fn statement(&mut self, stmt: &Statement) -> Result<Completion> {
        match stmt {
            Statement::VariableDeclaration(decl) => {
                self.variable_declaration(decl)?;
                Ok(Completion::Normal)
            }
            // Hoisted by declaration instantiation
            Statement::FunctionDeclaration(_) => Ok(Completion::Normal),
            Statement::Expression(s) => {
                self.expression_boxed(&s.expression)?;
                match self.completion_register {
                    Some(register) => self.op_with(OpCode::StoreReg, Operand::Register(register)),
                    None => self.op(OpCode::Pop),
                };
                Ok(Completion::Normal)
            }
            Statement::Block(block) => self.block_statement(block),
            Statement::If(s) => self.if_statement(s),
            Statement::Switch(s) => self.switch_statement(s),
            Statement::While(s) => self.while_statement(s),
            Statement::DoWhile(s) => self.do_while_statement(s),
            Statement::For(s) => self.for_statement(s),
            Statement::ForIn(s) => self.for_in_of(s, &s.left, &s.right, &s.body, false),
            Statement::ForOf(s) => self.for_in_of(s, &s.left, &s.right, &s.body, true),
            Statement::Return(s) => self.return_statement(s),
            Statement::Break(s) => {
                let index = self.break_target(s.label.as_ref().map(|l| l.name.as_str()))?;
                self.jump_to(JumpTarget::Break(index))?;
                Ok(Completion::Break)
            }
            Statement::Continue(s) => {
                let index = self.continue_target(s.label.as_ref().map(|l| l.name.as_str()))?;
                self.jump_to(JumpTarget::Continue(index))?;
                Ok(Completion::Continue)
            }
            Statement::Throw(s) => {
                self.expression_boxed(&s.argument)?;
                self.op(OpCode::Throw);
                Ok(Completion::Throw)
            }
            Statement::Try(s) => self.try_statement(s),
            Statement::With(s) => self.with_statement(s),
            Statement::Labeled(s) => self.labeled_statement(s),
            Statement::Debugger => {
                self.op(OpCode::Nop);
                Ok(Completion::Normal)
            }
            Statement::Empty => Ok(Completion::Normal),
        }
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    pub(super) fn variable_declaration(&mut self, decl: &VariableDeclaration) -> Result<()> {
        for declarator in &decl.declarations {
            let name = declarator.id.name.as_str();
            if decl.kind.is_lexical() {
                match &declarator.init {
                    Some(init) => {
                        self.expression_boxed(init)?;
                    }
                    None => {
                        self.op(OpCode::Undefined);
                    }
                }
                self.initialize_binding(name)?;
            } else if let Some(init) = &declarator.init {
                self.expression_boxed(init)?;
                self.store_binding(name)?;
            }
        }
        Ok(())
    }

    /// Pops the top of stack into a lexical binding of the current scope.
    pub(super) fn initialize_binding(&mut self, name: &str) -> Result<()> {
        let resolved = self.tree.resolve_name(self.scope, name, false);
        match resolved.resolution {
            Resolution::Static { hops, slot, .. } => {
                self.op_with(OpCode::InitializeBinding, Operand::Slot { hops, slot });
            }
            Resolution::Global => {
                let operand = self.name_operand(name);
                self.op_with(OpCode::InitGlobal, operand);
            }
            Resolution::Dynamic | Resolution::Unresolved => {
                return Err(Error::internal(format!(
                    "lexical binding '{name}' is not statically resolvable"
                )));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Blocks and branches
    // ========================================================================

    pub(super) fn block_statement(&mut self, block: &BlockStatement) -> Result<Completion> {
        let scope = self.scope_id(block)?;
        self.statements_in_scope(scope, &block.body)
    }

    /// Translates a condition, converting with ToBoolean unless it is
    /// already a boolean.
    pub(super) fn condition(&mut self, test: &Expression) -> Result<()> {
        let ty = self.expression_value(test)?;
        self.to_boolean(ty);
        Ok(())
    }

    fn if_statement(&mut self, s: &IfStatement) -> Result<Completion> {
        self.condition(&s.test)?;
        let otherwise = self.label();
        self.jump(OpCode::JumpIfFalse, otherwise);
        let consequent = self.statement(&s.consequent)?;

        let Some(alternate) = &s.alternate else {
            self.place(otherwise);
            return Ok(consequent.select(Completion::Normal));
        };
        let end = self.label();
        if !consequent.is_abrupt() {
            self.jump(OpCode::Jump, end);
        }
        self.place(otherwise);
        let alternate = self.statement(alternate)?;
        self.place(end);
        Ok(consequent.select(alternate))
    }

    fn with_statement(&mut self, s: &WithStatement) -> Result<Completion> {
        self.expression_boxed(&s.object)?;
        let scope = self.scope_id(s)?;
        let outer = std::mem::replace(&mut self.scope, scope);
        self.push_env(OpCode::PushWithEnv);
        let completion = self.statement(&s.body)?;
        self.env_depth -= 1;
        if !completion.is_abrupt() {
            self.op(OpCode::PopEnv);
        }
        self.scope = outer;
        Ok(completion)
    }

    fn labeled_statement(&mut self, s: &LabeledStatement) -> Result<Completion> {
        self.pending_labels.push(s.label.name.clone());
        match &*s.body {
            Statement::Labeled(_)
            | Statement::While(_)
            | Statement::DoWhile(_)
            | Statement::For(_)
            | Statement::ForIn(_)
            | Statement::ForOf(_) => self.statement(&s.body),
            body => {
                let labels = std::mem::take(&mut self.pending_labels);
                let index = self.push_breakable(labels, false);
                let completion = self.statement(body)?;
                let scope = self.pop_jump_scope(index)?;
                self.place(scope.break_label.id());
                Ok(completion.normal(scope.break_label.is_used()))
            }
        }
    }

    // ========================================================================
    // Switch
    // ========================================================================

    fn switch_statement(&mut self, s: &SwitchStatement) -> Result<Completion> {
        self.expression_boxed(&s.discriminant)?;
        let discriminant = self.new_register();
        self.op_with(OpCode::StoreReg, Operand::Register(discriminant));

        let scope = self.scope_id(s)?;
        self.with_block_scope(scope, |generator| {
            generator.block_declaration_instantiation(scope, s.statements())?;
            generator.switch_body(s, discriminant)
        })
    }

    fn switch_body(&mut self, s: &SwitchStatement, discriminant: u32) -> Result<Completion> {
        let index = self.push_breakable(Vec::new(), true);
        let entries: Vec<LabelId> = s.cases.iter().map(|_| self.code.new_label()).collect();
        let default = s.cases.iter().position(|case| case.test.is_none());
        let otherwise = match default {
            Some(i) => entries[i],
            None => self.jump_scope(index)?.break_label.target(),
        };

        if let Some(keys) = self.keyed_cases(s) {
            let mut table: Vec<(SwitchKey, LabelId)> = Vec::new();
            for (key, entry) in keys {
                if !table.iter().any(|(k, _)| *k == key) {
                    table.push((key, entries[entry]));
                }
            }
            let table = self.code.add_switch_table(table, otherwise);
            self.op_with(OpCode::LoadReg, Operand::Register(discriminant));
            self.op_with(OpCode::SwitchTable, Operand::Table(table));
        } else {
            for (case, &entry) in s.cases.iter().zip(&entries) {
                let Some(test) = &case.test else { continue };
                self.op_with(OpCode::LoadReg, Operand::Register(discriminant));
                self.expression_boxed(test)?;
                self.op(OpCode::StrictEq);
                self.jump(OpCode::JumpIfTrue, entry);
            }
            self.jump(OpCode::Jump, otherwise);
        }

        let mut completion = Completion::Normal;
        for (case, &entry) in s.cases.iter().zip(&entries) {
            self.place(entry);
            completion = self.statements(&case.consequent)?;
        }

        let scope = self.pop_jump_scope(index)?;
        self.place(scope.break_label.id());
        Ok(completion.normal(scope.break_label.is_used() || default.is_none()))
    }

    /// Case keys paired with case indices, when every case test is an int32
    /// literal or every case test is a string literal, and there are enough
    /// of them for a jump table.
    fn keyed_cases(&self, s: &SwitchStatement) -> Option<Vec<(SwitchKey, usize)>> {
        let mut keys = Vec::new();
        for (index, case) in s.cases.iter().enumerate() {
            let Some(test) = &case.test else { continue };
            let Expression::Literal(Literal { value }) = test else {
                return None;
            };
            let key = match value {
                LiteralValue::Number(n)
                    if n.fract() == 0.0 && *n >= i32::MIN as f64 && *n <= i32::MAX as f64 =>
                {
                    SwitchKey::Int(*n as i32)
                }
                LiteralValue::String(text) => SwitchKey::String(text.as_str().into()),
                _ => return None,
            };
            if let Some((first, _)) = keys.first() {
                if std::mem::discriminant(first) != std::mem::discriminant(&key) {
                    return None;
                }
            }
            keys.push((key, index));
        }
        (keys.len() >= self.options.int_switch_min_cases.max(1)).then_some(keys)
    }

    // ========================================================================
    // Loops
    // ========================================================================

    fn while_statement(&mut self, s: &WhileStatement) -> Result<Completion> {
        let labels = std::mem::take(&mut self.pending_labels);
        let index = self.push_loop(labels);
        let head = self.loop_continue_label(index)?;
        self.place(head);

        let infinite = is_constant_true(&s.test);
        if !infinite {
            self.condition(&s.test)?;
            let exit = self.jump_scope(index)?.break_label.target();
            self.jump(OpCode::JumpIfFalse, exit);
        }
        let body = self.statement(&s.body)?;
        if !body.is_abrupt() {
            self.jump(OpCode::Jump, head);
        }

        let scope = self.pop_jump_scope(index)?;
        self.place(scope.break_label.id());
        Ok(scope.loop_completion(body, infinite))
    }

    fn do_while_statement(&mut self, s: &DoWhileStatement) -> Result<Completion> {
        let labels = std::mem::take(&mut self.pending_labels);
        let index = self.push_loop(labels);
        let start = self.label();
        self.place(start);

        let body = self.statement(&s.body)?;
        let infinite = is_constant_true(&s.test);
        let continued = self.jump_scope(index)?.continue_used();
        if !body.is_abrupt() || continued {
            let next = self.loop_continue_label(index)?;
            self.place(next);
            if infinite {
                self.jump(OpCode::Jump, start);
            } else {
                self.condition(&s.test)?;
                self.jump(OpCode::JumpIfTrue, start);
            }
        }

        let scope = self.pop_jump_scope(index)?;
        self.place(scope.break_label.id());
        Ok(scope.loop_completion(body, infinite))
    }

    fn for_statement(&mut self, s: &ForStatement) -> Result<Completion> {
        let labels = std::mem::take(&mut self.pending_labels);
        let scope = self.scope_id(s)?;
        let materializes = self.tree.scope(scope).materializes();
        let outer = std::mem::replace(&mut self.scope, scope);
        if materializes {
            self.push_env(OpCode::PushBlockEnv);
            self.create_bindings(scope);
        }

        let per_iteration = materializes
            && matches!(&s.init, Some(ForInit::Declaration(d)) if d.kind == VariableKind::Let);
        match &s.init {
            Some(ForInit::Declaration(decl)) => self.variable_declaration(decl)?,
            Some(ForInit::Expression(expr)) => {
                self.expression_boxed(expr)?;
                self.op(OpCode::Pop);
            }
            None => {}
        }
        if per_iteration {
            self.op(OpCode::CopyEnv);
        }

        let index = self.push_loop(labels);
        let head = self.label();
        self.place(head);
        let infinite = s.test.as_ref().is_none_or(is_constant_true);
        if let Some(test) = s.test.as_ref().filter(|_| !infinite) {
            self.condition(test)?;
            let exit = self.jump_scope(index)?.break_label.target();
            self.jump(OpCode::JumpIfFalse, exit);
        }

        let body = self.statement(&s.body)?;
        if !body.is_abrupt() || self.jump_scope(index)?.continue_used() {
            let next = self.loop_continue_label(index)?;
            self.place(next);
            if per_iteration {
                self.op(OpCode::CopyEnv);
            }
            if let Some(update) = &s.update {
                self.expression_boxed(update)?;
                self.op(OpCode::Pop);
            }
            self.jump(OpCode::Jump, head);
        }

        let jumps = self.pop_jump_scope(index)?;
        self.place(jumps.break_label.id());
        let completion = jumps.loop_completion(body, infinite);
        if materializes {
            self.env_depth -= 1;
            if !completion.is_abrupt() {
                self.op(OpCode::PopEnv);
            }
        }
        self.scope = outer;
        Ok(completion)
    }

    /// for-in and for-of. The right-hand side is evaluated outside the head
    /// scope; `let` and `const` heads get a fresh record per iteration.
    fn for_in_of<T: crate::scope::ScopedNode>(
        &mut self,
        node: &T,
        left: &ForHead,
        right: &Expression,
        body: &Statement,
        of: bool,
    ) -> Result<Completion> {
        let labels = std::mem::take(&mut self.pending_labels);
        self.expression_boxed(right)?;
        self.op(if of { OpCode::GetIterator } else { OpCode::EnumerateKeys });
        let iterator = self.new_register();
        self.op_with(OpCode::StoreReg, Operand::Register(iterator));

        let close = of.then(|| self.push_iter_close(iterator));
        let index = self.push_loop(labels);
        let next = self.loop_continue_label(index)?;
        let done = self.label();
        self.place(next);
        self.op_with(OpCode::LoadReg, Operand::Register(iterator));
        self.op(OpCode::Undefined);
        self.op(OpCode::IteratorNext);
        self.op(OpCode::Dup);
        self.op(OpCode::IteratorComplete);
        self.jump(OpCode::JumpIfTrue, done);
        self.op(OpCode::IteratorValue);
        if let Some(close) = close {
            self.open_iter_close(close);
        }

        let scope = self.scope_id(node)?;
        let materializes = self.tree.scope(scope).materializes();
        let outer = std::mem::replace(&mut self.scope, scope);
        if materializes {
            self.push_env(OpCode::PushBlockEnv);
            self.create_bindings(scope);
            self.op_with(OpCode::InitializeBinding, Operand::Slot { hops: 0, slot: 0 });
        } else {
            match left {
                ForHead::Declaration(decl) => {
                    let name = decl
                        .declarations
                        .first()
                        .map(|d| d.id.name.as_str())
                        .ok_or_else(|| Error::internal("empty for-in/of declaration"))?;
                    self.store_binding(name)?;
                }
                ForHead::Target(target) => self.assign_from_stack(target)?,
            }
        }

        let completion = self.statement(body)?;
        if materializes {
            self.env_depth -= 1;
        }
        if !completion.is_abrupt() {
            if materializes {
                self.op(OpCode::PopEnv);
            }
            self.jump(OpCode::Jump, next);
        }
        self.scope = outer;

        let jumps = self.pop_jump_scope(index)?;
        if let Some(close) = close {
            self.pop_iter_close(close)?;
        }
        self.place(done);
        self.op(OpCode::Pop);
        if jumps.break_label.is_used() {
            let exit = self.label();
            self.jump(OpCode::Jump, exit);
            self.place(jumps.break_label.id());
            if of {
                self.op_with(OpCode::LoadReg, Operand::Register(iterator));
                self.op(OpCode::IteratorClose);
            }
            self.place(exit);
        }
        Ok(Completion::Normal)
    }

    fn loop_continue_label(&mut self, index: usize) -> Result<LabelId> {
        self.jump_scope(index)?
            .continue_label
            .map(|l| l.id())
            .ok_or_else(|| Error::internal("loop without a continue label"))
    }

    // ========================================================================
    // Exits
    // ========================================================================

    fn return_statement(&mut self, s: &ReturnStatement) -> Result<Completion> {
        if matches!(self.kind, FunctionKind::Script | FunctionKind::Module) {
            return Err(Error::internal("return outside of a function"));
        }
        match &s.argument {
            Some(argument) => self.return_value(argument)?,
            None => {
                self.op(OpCode::Undefined);
                self.emit_return()?;
            }
        }
        Ok(Completion::Return)
    }

    /// Returns the value of `argument`, as a tail call when possible.
    pub(super) fn return_value(&mut self, argument: &Expression) -> Result<()> {
        if let Expression::Call(call) = argument {
            if self.tail_call_allowed() {
                self.call_expression(call, true)?;
                return Ok(());
            }
        }
        self.expression_boxed(argument)?;
        self.emit_return()
    }

    fn emit_return(&mut self) -> Result<()> {
        if self.has_cleanup() {
            let register = self.return_register();
            self.op_with(OpCode::StoreReg, Operand::Register(register));
            self.jump_to(JumpTarget::Return)
        } else {
            self.op(OpCode::Return);
            Ok(())
        }
    }

    fn tail_call_allowed(&self) -> bool {
        self.options.tail_calls
            && self.strict
            && matches!(self.kind, FunctionKind::Normal | FunctionKind::Arrow)
            && self.try_depth == 0
            && !self.has_cleanup()
    }

    // ========================================================================
    // Try
    // ========================================================================

    fn try_statement(&mut self, s: &TryStatement) -> Result<Completion> {
        let saved_env = self.new_register();
        self.op_with(OpCode::SaveEnv, Operand::Register(saved_env));
        match (&s.handler, &s.finalizer) {
            (Some(handler), None) => self.try_catch(&s.block, handler, saved_env),
            (handler, Some(finalizer)) => {
                self.try_finally(&s.block, handler.as_ref(), finalizer, saved_env)
            }
            (None, None) => Err(Error::internal("try without catch or finally")),
        }
    }

    fn try_catch(
        &mut self,
        block: &BlockStatement,
        handler: &CatchClause,
        saved_env: u32,
    ) -> Result<Completion> {
        let start = self.code.position();
        self.try_depth += 1;
        let completion = self.block_statement(block)?;
        self.try_depth -= 1;
        let end = self.code.position();

        let after = self.label();
        if !completion.is_abrupt() {
            self.jump(OpCode::Jump, after);
        }
        let entry = self.label();
        self.code.add_handler(start, end, entry, HandlerKind::Catch);
        self.place(entry);
        let caught = self.catch_clause(handler, saved_env)?;
        self.place(after);
        Ok(completion.select(caught))
    }

    /// The handler entry: the thrown value is on the stack.
    fn catch_clause(&mut self, handler: &CatchClause, saved_env: u32) -> Result<Completion> {
        self.op_with(OpCode::RestoreEnv, Operand::Register(saved_env));
        let scope = self.scope_id(handler)?;
        let materializes = self.tree.scope(scope).materializes();
        let outer = std::mem::replace(&mut self.scope, scope);
        if materializes {
            self.push_env(OpCode::PushBlockEnv);
            self.create_bindings(scope);
            self.op_with(OpCode::InitializeBinding, Operand::Slot { hops: 0, slot: 0 });
        } else {
            self.op(OpCode::Pop);
        }

        let completion = self.block_statement(&handler.body)?;
        if materializes {
            self.env_depth -= 1;
            if !completion.is_abrupt() {
                self.op(OpCode::PopEnv);
            }
        }
        self.scope = outer;
        Ok(completion)
    }

    /// try/finally and try/catch/finally.
    ///
    /// The finally body is emitted once for normal fallthrough, once as the
    /// exception handler (which rethrows the pending exception unless the
    /// body itself exits) and once for every distinct exit that left the
    /// protected region.
    fn try_finally(
        &mut self,
        block: &BlockStatement,
        handler: Option<&CatchClause>,
        finalizer: &BlockStatement,
        saved_env: u32,
    ) -> Result<Completion> {
        let pending = self.new_register();
        let finally_index = self.push_finally();
        let fallthrough = self.label();

        let start = self.code.position();
        self.try_depth += 1;
        let mut completion = self.block_statement(block)?;
        let block_end = self.code.position();
        if !completion.is_abrupt() {
            self.jump(OpCode::Jump, fallthrough);
        }
        if let Some(handler) = handler {
            let entry = self.label();
            self.code.add_handler(start, block_end, entry, HandlerKind::Catch);
            self.place(entry);
            let caught = self.catch_clause(handler, saved_env)?;
            if !caught.is_abrupt() {
                self.jump(OpCode::Jump, fallthrough);
            }
            completion = completion.select(caught);
        }
        self.try_depth -= 1;
        let protected_end = self.code.position();
        let temps = self.pop_finally(finally_index)?;

        // Exceptional exit
        let on_exception = self.label();
        self.code.add_handler(
            start,
            protected_end,
            on_exception,
            HandlerKind::Finally { register: pending },
        );
        self.place(on_exception);
        self.op_with(OpCode::RestoreEnv, Operand::Register(saved_env));
        let copy_start = self.code.position();
        let finally = self.block_statement(finalizer)?;
        let copy_end = self.code.position();
        self.code.add_handler(
            copy_start,
            copy_end,
            on_exception,
            HandlerKind::Suppress { register: pending },
        );
        if !finally.is_abrupt() {
            self.op_with(OpCode::Rethrow, Operand::Register(pending));
        }

        // Normal exit
        let end = self.label();
        if !completion.is_abrupt() {
            self.place(fallthrough);
            self.block_statement(finalizer)?;
            if !finally.is_abrupt() {
                self.jump(OpCode::Jump, end);
            }
        }

        // Exits that crossed the finally
        for temp in temps {
            self.place(temp.label);
            self.op_with(OpCode::RestoreEnv, Operand::Register(saved_env));
            self.block_statement(finalizer)?;
            if !finally.is_abrupt() {
                self.jump_to(temp.target)?;
            }
        }
        self.place(end);

        Ok(if finally.is_abrupt() { finally } else { completion })
    }

    // ========================================================================
    // Assignment targets
    // ========================================================================

    /// Assigns the value on top of the stack to `target`, consuming it.
    pub(super) fn assign_from_stack(&mut self, target: &Expression) -> Result<()> {
        match target {
            Expression::Identifier(id) => self.store_binding(&id.name),
            Expression::Member(m) => {
                self.expression_boxed(&m.object)?;
                match m.static_name() {
                    Some(name) => {
                        let operand = self.name_operand(name);
                        self.op(OpCode::Swap);
                        self.op_with(OpCode::SetProp, operand);
                    }
                    None => {
                        let key = self.expression_value(&m.property)?;
                        self.to_property_key(key);
                        self.op(OpCode::Rot3);
                        self.op(OpCode::Rot3);
                        self.op(OpCode::SetElem);
                    }
                }
                self.op(OpCode::Pop);
                Ok(())
            }
            _ => Err(Error::internal("invalid assignment target")),
        }
    }
}

/// Returns true for a test that is a truthy literal.
fn is_constant_true(test: &Expression) -> bool {
    match test {
        Expression::Literal(Literal { value }) => match value {
            LiteralValue::Boolean(b) => *b,
            LiteralValue::Number(n) => *n != 0.0 && !n.is_nan(),
            LiteralValue::String(s) => !s.is_empty(),
            LiteralValue::Null => false,
        },
        _ => false,
    }
}
