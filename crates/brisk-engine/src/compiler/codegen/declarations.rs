//! Declaration instantiation.
//!
//! Every flavor follows the same two phases: create a binding for each
//! declared name, then initialize function declarations with fresh
//! closures, visiting them in reverse source order so that the last
//! declaration of a name wins.

use rustc_hash::FxHashSet;
use tracing::trace;

use super::CodeGenerator;
use crate::ast::{Function, Program, Statement};
use crate::compiler::bytecode::{OpCode, Operand};
use crate::error::{Error, Result};
use crate::scope::declarations::{
    block_lexical_declarations, top_level_lexical_declarations, var_declared_names,
    var_scoped_functions, LexicalKind,
};
use crate::scope::{BindingKind, ScopeId};

impl CodeGenerator<'_> {
    /// Creates the bindings of a declarative scope in slot order.
    pub(super) fn create_bindings(&mut self, scope: ScopeId) {
        let tree = self.tree;
        for binding in tree.scope(scope).bindings() {
            let (opcode, flag) = match binding.kind {
                BindingKind::Const | BindingKind::Import => (OpCode::CreateImmutableBinding, true),
                BindingKind::Callee => (OpCode::CreateImmutableBinding, false),
                BindingKind::Arguments if self.strict => (OpCode::CreateImmutableBinding, true),
                _ => (OpCode::CreateMutableBinding, false),
            };
            let operand = self.binding_operand(&binding.name, flag);
            self.op_with(opcode, operand);
        }
    }

    fn slot(&self, scope: ScopeId, name: &str) -> Result<u32> {
        self.tree
            .scope(scope)
            .slot_of(name)
            .ok_or_else(|| Error::internal(format!("'{name}' is not declared in its scope")))
    }

    /// Initializes var-scoped function declarations of `scope`, last
    /// declaration first.
    fn instantiate_functions<'f>(
        &mut self,
        scope: ScopeId,
        functions: impl DoubleEndedIterator<Item = &'f Function>,
    ) -> Result<()> {
        let mut initialized = FxHashSet::default();
        for function in functions.rev() {
            let Some(name) = function.name() else { continue };
            if !initialized.insert(name) {
                continue;
            }
            let index = self.function_index(function)?;
            self.op_with(OpCode::Closure, Operand::Function(index));
            let slot = self.slot(scope, name)?;
            self.op_with(OpCode::InitializeBinding, Operand::Slot { hops: 0, slot });
        }
        Ok(())
    }

    // ========================================================================
    // Scripts
    // ========================================================================

    /// GlobalDeclarationInstantiation.
    ///
    /// All checks run before the first binding is created, so a conflict
    /// leaves the global environment untouched.
    pub(super) fn global_declaration_instantiation(&mut self, body: &[Statement]) -> Result<()> {
        let lexicals = top_level_lexical_declarations(body);
        let functions = var_scoped_functions(body);
        let var_names = var_declared_names(body);

        for decl in &lexicals {
            let operand = self.name_operand(decl.name);
            self.op_with(OpCode::CheckGlobalLexical, operand);
        }
        for name in var_names
            .iter()
            .copied()
            .chain(functions.iter().filter_map(|f| f.name()))
        {
            let operand = self.name_operand(name);
            self.op_with(OpCode::CheckGlobalVar, operand);
        }

        let mut function_names = FxHashSet::default();
        let mut to_initialize = Vec::new();
        for function in functions.iter().rev() {
            if let Some(name) = function.name() {
                if function_names.insert(name) {
                    to_initialize.push(*function);
                }
            }
        }
        for function in &to_initialize {
            let operand = self.name_operand(function.name().unwrap_or_default());
            self.op_with(OpCode::CheckGlobalFunction, operand);
        }

        let declared_vars: Vec<&str> = var_names
            .into_iter()
            .filter(|name| !function_names.contains(name))
            .collect();
        for name in &declared_vars {
            let operand = self.name_operand(name);
            self.op_with(OpCode::CheckGlobalVarDeclarable, operand);
        }

        for decl in &lexicals {
            let operand = self.binding_operand(decl.name, decl.kind == LexicalKind::Const);
            self.op_with(OpCode::CreateGlobalLexical, operand);
        }
        for function in to_initialize {
            let index = self.function_index(function)?;
            self.op_with(OpCode::Closure, Operand::Function(index));
            let operand = self.binding_operand(function.name().unwrap_or_default(), false);
            self.op_with(OpCode::CreateGlobalFunction, operand);
        }
        for name in declared_vars {
            let operand = self.binding_operand(name, false);
            self.op_with(OpCode::CreateGlobalVar, operand);
        }
        trace!(
            lexicals = lexicals.len(),
            functions = function_names.len(),
            "global declarations instantiated"
        );
        Ok(())
    }

    // ========================================================================
    // Modules and functions
    // ========================================================================

    pub(super) fn module_declaration_instantiation(&mut self, program: &Program) -> Result<()> {
        let scope = self.scope;
        self.create_bindings(scope);
        for (index, import) in program.imports.iter().enumerate() {
            self.op_with(OpCode::LoadImport, Operand::Count(index as u32));
            let slot = self.slot(scope, &import.name)?;
            self.op_with(OpCode::InitializeBinding, Operand::Slot { hops: 0, slot });
        }
        self.initialize_vars(scope);
        self.instantiate_functions(scope, var_scoped_functions(&program.body).into_iter())
    }

    /// FunctionDeclarationInstantiation, run by the prologue against the
    /// record the VM created for the call.
    pub(super) fn function_declaration_instantiation(&mut self, function: &Function) -> Result<()> {
        let scope = self.scope;
        self.create_bindings(scope);

        // Later duplicates overwrite earlier ones.
        for (index, param) in function.params.iter().enumerate() {
            self.op_with(OpCode::LoadArg, Operand::Count(index as u32));
            let slot = self.slot(scope, &param.name)?;
            self.op_with(OpCode::InitializeBinding, Operand::Slot { hops: 0, slot });
        }

        let tree = self.tree;
        let info = tree.scope(scope);
        if info.kind_of("arguments") == Some(BindingKind::Arguments) {
            self.op(OpCode::CreateArguments);
            let slot = self.slot(scope, "arguments")?;
            self.op_with(OpCode::InitializeBinding, Operand::Slot { hops: 0, slot });
        }

        self.initialize_vars(scope);
        self.instantiate_functions(scope, var_scoped_functions(function.statements()).into_iter())?;

        if let Some(name) = function.name() {
            if info.kind_of(name) == Some(BindingKind::Callee) {
                self.op(OpCode::LoadCallee);
                let slot = self.slot(scope, name)?;
                self.op_with(OpCode::InitializeBinding, Operand::Slot { hops: 0, slot });
            }
        }
        Ok(())
    }

    fn initialize_vars(&mut self, scope: ScopeId) {
        let tree = self.tree;
        for (slot, binding) in tree.scope(scope).bindings().iter().enumerate() {
            if binding.kind == BindingKind::Var {
                self.op(OpCode::Undefined);
                self.op_with(
                    OpCode::InitializeBinding,
                    Operand::Slot {
                        hops: 0,
                        slot: slot as u32,
                    },
                );
            }
        }
    }

    // ========================================================================
    // Blocks
    // ========================================================================

    /// BlockDeclarationInstantiation for the record just pushed for `scope`.
    ///
    /// Large blocks are compiled into an out-of-line unit entered with
    /// `CallUnit`.
    pub(super) fn block_declaration_instantiation<'s, I>(&mut self, scope: ScopeId, body: I) -> Result<()>
    where
        I: IntoIterator<Item = &'s Statement>,
    {
        let count = self.tree.scope(scope).bindings().len();
        if count == 0 {
            return Ok(());
        }
        let functions: Vec<&Function> = block_lexical_declarations(body)
            .into_iter()
            .filter_map(|decl| decl.function)
            .collect();

        if count <= self.options.block_inline_limit {
            trace!(bindings = count, "block declarations inline");
            self.create_bindings(scope);
            return self.instantiate_functions(scope, functions.into_iter());
        }

        trace!(bindings = count, "block declarations out of line");
        let entry = self.label();
        let unit = self.code.add_unit(entry);
        self.op_with(OpCode::CallUnit, Operand::Unit(unit));
        let start = self.code.position();
        self.create_bindings(scope);
        self.instantiate_functions(scope, functions.into_iter())?;
        self.op(OpCode::ReturnUnit);
        let instructions = self.code.instructions.split_off(start);
        self.deferred.push((entry, instructions));
        Ok(())
    }
}
