//! Code generation from the AST.
//!
//! One [`CodeGenerator`] translates one function body (or the program top
//! level) into a [`FunctionTemplate`]. Nested functions get their own
//! generator and end up in the parent's function table.
//!
//! # Module Structure
//!
//! - `declarations`: global, module, function and block instantiation
//! - `statements`: statements, including try lowering
//! - `expressions`: expressions over the [`ValType`] lattice
//! - `coroutine`: `yield`, `yield*` and `await`
//! - `labels`: the control stack, break/continue targets and finally replay
//! - `completion`: statement completion algebra

mod completion;
mod coroutine;
mod declarations;
mod expressions;
mod labels;
mod statements;
mod valtype;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tracing::debug;

pub use completion::Completion;
pub use valtype::ValType;

use self::expressions::Reference;
use self::labels::ControlEntry;
use super::bytecode::{
    Bytecode, Constant, FunctionKind, FunctionTemplate, Instruction, LabelId, OpCode, Operand,
};
use crate::ast::{Function, FunctionBody, Program, SourceType, Statement};
use crate::config::CompilerOptions;
use crate::error::{Error, Result};
use crate::runtime::exception::ErrorKind;
use crate::scope::{Name, ScopeId, ScopeTree, ScopedNode};

/// Compiles the top level of `program`.
pub(crate) fn generate_program(
    program: &Program,
    tree: &ScopeTree,
    options: &CompilerOptions,
) -> Result<FunctionTemplate> {
    let kind = match program.source_type {
        SourceType::Script => FunctionKind::Script,
        SourceType::Module => FunctionKind::Module,
    };
    let root = tree.root();
    let mut generator =
        CodeGenerator::new(tree, options, kind, tree.scope(root).is_strict(), root);

    let name = match kind {
        FunctionKind::Module => {
            generator.module_declaration_instantiation(program)?;
            "<module>"
        }
        _ => {
            generator.global_declaration_instantiation(&program.body)?;
            generator.completion_register = Some(generator.new_register());
            "<script>"
        }
    };

    let completion = generator.statements(&program.body)?;
    if !completion.is_abrupt() {
        match generator.completion_register {
            Some(register) => generator.op_with(OpCode::LoadReg, Operand::Register(register)),
            None => generator.op(OpCode::Undefined),
        };
        generator.op(OpCode::Return);
    }
    generator.finish(name, 0)
}

/// Translates one function body.
pub(crate) struct CodeGenerator<'a> {
    tree: &'a ScopeTree,
    options: &'a CompilerOptions,
    code: Bytecode,
    kind: FunctionKind,
    strict: bool,
    /// Innermost scope of the code being generated
    scope: ScopeId,
    /// Environment records pushed since entry
    env_depth: u32,
    control: Vec<ControlEntry>,
    /// Labels waiting for the next iteration statement
    pending_labels: Vec<String>,
    /// Nesting depth of exception-protected regions
    try_depth: u32,
    return_register: Option<u32>,
    completion_register: Option<u32>,
    reference: Option<Reference>,
    /// Out-of-line units, appended after the body
    deferred: Vec<(LabelId, Vec<Instruction>)>,
}

impl<'a> CodeGenerator<'a> {
    fn new(
        tree: &'a ScopeTree,
        options: &'a CompilerOptions,
        kind: FunctionKind,
        strict: bool,
        scope: ScopeId,
    ) -> Self {
        Self {
            tree,
            options,
            code: Bytecode::new(),
            kind,
            strict,
            scope,
            env_depth: 0,
            control: Vec::new(),
            pending_labels: Vec::new(),
            try_depth: 0,
            return_register: None,
            completion_register: None,
            reference: None,
            deferred: Vec::new(),
        }
    }

    /// Compiles a nested function into its own template.
    fn function_template(&mut self, function: &Function) -> Result<Arc<FunctionTemplate>> {
        let scope = self.scope_id(function)?;
        let tree = self.tree;
        let info = tree.scope(scope);
        let kind = match (info.is_arrow(), function.is_async, function.is_generator) {
            (_, true, true) => {
                return Err(Error::internal("async generators are not supported"));
            }
            (true, true, _) => FunctionKind::AsyncArrow,
            (true, false, _) => FunctionKind::Arrow,
            (false, true, false) => FunctionKind::Async,
            (false, false, true) => FunctionKind::Generator,
            (false, false, false) => FunctionKind::Normal,
        };

        let mut generator = CodeGenerator::new(tree, self.options, kind, info.is_strict(), scope);
        generator.function_body(function)?;
        let template = generator.finish(function.name().unwrap_or(""), function.params.len() as u32)?;
        Ok(Arc::new(template))
    }

    /// Compiles a nested function and returns its index in the function table.
    fn function_index(&mut self, function: &Function) -> Result<u32> {
        let template = self.function_template(function)?;
        Ok(self.code.add_function(template))
    }

    fn function_body(&mut self, function: &Function) -> Result<()> {
        if self.kind.is_resumable() {
            self.op(OpCode::ResumeDispatch);
        }
        self.function_declaration_instantiation(function)?;
        if self.kind == FunctionKind::Generator {
            self.generator_start();
        }

        match &function.body {
            FunctionBody::Block(block) => {
                if !self.statements(&block.body)?.is_abrupt() {
                    self.op(OpCode::Undefined);
                    self.op(OpCode::Return);
                }
            }
            FunctionBody::Expression(expression) => {
                self.return_value(expression)?;
            }
        }
        Ok(())
    }

    /// Appends out-of-line units, resolves labels and wraps up the template.
    fn finish(mut self, name: &str, param_count: u32) -> Result<FunctionTemplate> {
        for (entry, instructions) in std::mem::take(&mut self.deferred) {
            self.code.place_label(entry);
            self.code.instructions.extend(instructions);
        }
        self.code.resolve_labels()?;
        debug!(
            unit = name,
            kind = ?self.kind,
            instructions = self.code.instructions.len(),
            "compiled unit"
        );
        Ok(FunctionTemplate {
            name: Arc::from(name),
            kind: self.kind,
            param_count,
            strict: self.strict,
            bytecode: self.code,
        })
    }

    // ========================================================================
    // Emission helpers
    // ========================================================================

    fn op(&mut self, opcode: OpCode) -> usize {
        self.code.emit(Instruction::simple(opcode))
    }

    fn op_with(&mut self, opcode: OpCode, operand: Operand) -> usize {
        self.code.emit(Instruction::with_operand(opcode, operand))
    }

    fn label(&mut self) -> LabelId {
        self.code.new_label()
    }

    fn place(&mut self, label: LabelId) {
        self.code.place_label(label);
    }

    fn jump(&mut self, opcode: OpCode, label: LabelId) {
        self.op_with(opcode, Operand::Label(label));
    }

    fn new_register(&mut self) -> u32 {
        let register = self.code.register_count;
        self.code.register_count += 1;
        register
    }

    /// Register holding the value of a `return` that runs cleanup first.
    fn return_register(&mut self) -> u32 {
        match self.return_register {
            Some(register) => register,
            None => {
                let register = self.new_register();
                self.return_register = Some(register);
                register
            }
        }
    }

    fn name_operand(&mut self, name: &str) -> Operand {
        Operand::Name(self.code.add_name(name))
    }

    fn binding_operand(&mut self, name: &str, flag: bool) -> Operand {
        Operand::Binding {
            name: self.code.add_name(name),
            flag,
        }
    }

    fn number(&mut self, n: f64) {
        let index = self.code.add_constant(Constant::Number(n));
        self.op_with(OpCode::Const, Operand::Constant(index));
    }

    fn string(&mut self, s: &str) {
        let index = self.code.add_constant(Constant::String(Arc::from(s)));
        self.op_with(OpCode::Const, Operand::Constant(index));
    }

    fn throw_error(&mut self, kind: ErrorKind, message: &str) {
        let message = self.code.add_name(message);
        self.op_with(OpCode::ThrowError, Operand::Error { kind, message });
    }

    // ========================================================================
    // Scopes
    // ========================================================================

    fn scope_id<T: ScopedNode>(&self, node: &T) -> Result<ScopeId> {
        self.tree
            .scope_of(node)
            .ok_or_else(|| Error::internal("node has no scope"))
    }

    fn resolve(&self, identifier: &str) -> Name {
        self.tree.resolve_name(self.scope, identifier, false)
    }

    fn push_env(&mut self, opcode: OpCode) {
        self.op(opcode);
        self.env_depth += 1;
    }

    /// Runs `body` inside a block-like scope, pushing a declarative record
    /// when the scope has bindings.
    fn with_block_scope<F>(&mut self, scope: ScopeId, body: F) -> Result<Completion>
    where
        F: FnOnce(&mut Self) -> Result<Completion>,
    {
        let materializes = self.tree.scope(scope).materializes();
        let outer = std::mem::replace(&mut self.scope, scope);
        if materializes {
            self.push_env(OpCode::PushBlockEnv);
        }
        let completion = body(self)?;
        if materializes {
            self.env_depth -= 1;
            if !completion.is_abrupt() {
                self.op(OpCode::PopEnv);
            }
        }
        self.scope = outer;
        Ok(completion)
    }

    fn statements_in_scope(&mut self, scope: ScopeId, body: &[Statement]) -> Result<Completion> {
        self.with_block_scope(scope, |generator| {
            generator.block_declaration_instantiation(scope, body)?;
            generator.statements(body)
        })
    }
}
