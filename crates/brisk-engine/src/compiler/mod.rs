//! Bytecode compiler.
//!
//! Turns an ESTree [`Program`] into a tree of [`FunctionTemplate`]s. Scope
//! analysis runs first and rejects early errors; code generation then
//! relies on every name being resolved.
//!
//! # Module Structure
//!
//! - `bytecode`: instructions, operands, handler and resume tables
//! - `codegen`: translation from the AST
//! - `disasm`: human-readable listings

pub mod bytecode;
pub mod codegen;
pub mod disasm;

use std::sync::Arc;

use tracing::debug;

pub use bytecode::{Bytecode, FunctionKind, FunctionTemplate, Instruction, OpCode, Operand};
pub use codegen::{Completion, ValType};

use crate::ast::{Program, SourceType};
use crate::config::CompilerOptions;
use crate::error::{Error, Result};
use crate::scope::analyze;

/// A compiled program, ready to run.
#[derive(Debug, Clone)]
pub struct Script {
    /// Top-level unit; nested functions hang off its function table
    pub template: Arc<FunctionTemplate>,
    /// Goal the program was compiled for
    pub source_type: SourceType,
    /// Imported names, in the order `LoadImport` indexes them
    pub imports: Vec<String>,
}

impl Script {
    /// Total number of instructions across all units.
    pub fn instruction_count(&self) -> usize {
        fn count(template: &FunctionTemplate) -> usize {
            template.bytecode.instructions.len()
                + template
                    .bytecode
                    .functions
                    .iter()
                    .map(|f| count(f))
                    .sum::<usize>()
        }
        count(&self.template)
    }
}

/// Compiles `program` for whichever goal it declares.
pub fn compile(program: &Program, options: &CompilerOptions) -> Result<Script> {
    let tree = analyze(program)?;
    let template = codegen::generate_program(program, &tree, options)?;
    let script = Script {
        template: Arc::new(template),
        source_type: program.source_type,
        imports: program.imports.iter().map(|i| i.name.clone()).collect(),
    };
    debug!(
        source_type = ?script.source_type,
        scopes = tree.len(),
        instructions = script.instruction_count(),
        "compiled program"
    );
    Ok(script)
}

/// Compiles `program` as a script.
pub fn compile_script(program: &Program, options: &CompilerOptions) -> Result<Script> {
    if program.source_type != SourceType::Script {
        return Err(Error::syntax("expected a script, found a module"));
    }
    compile(program, options)
}

/// Compiles `program` as a module.
pub fn compile_module(program: &Program, options: &CompilerOptions) -> Result<Script> {
    if program.source_type != SourceType::Module {
        return Err(Error::syntax("expected a module, found a script"));
    }
    compile(program, options)
}

/// Compiles independent programs on the rayon pool.
#[cfg(feature = "parallel")]
pub fn compile_parallel(programs: &[Program], options: &CompilerOptions) -> Vec<Result<Script>> {
    use rayon::prelude::*;

    programs
        .par_iter()
        .map(|program| compile(program, options))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;

    #[test]
    fn test_goal_mismatch() {
        let options = CompilerOptions::default();
        let m = module(&["x"], vec![]);
        assert!(matches!(compile_script(&m, &options), Err(Error::Syntax(_))));
        assert!(compile_module(&m, &options).is_ok());

        let s = script(vec![]);
        assert!(matches!(compile_module(&s, &options), Err(Error::Syntax(_))));
    }

    #[test]
    fn test_module_imports_recorded() {
        let m = module(&["a", "b"], vec![expr_stmt(ident("a"))]);
        let compiled = compile(&m, &CompilerOptions::default()).unwrap();
        assert_eq!(compiled.imports, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(compiled.template.kind, FunctionKind::Module);
        assert_eq!(compiled.template.bytecode.count(OpCode::LoadImport), 2);
    }

    #[test]
    fn test_instruction_count_includes_nested() {
        let s = script(vec![function_decl("f", &[], vec![ret(Some(num(1.0)))])]);
        let compiled = compile(&s, &CompilerOptions::default()).unwrap();
        assert!(compiled.instruction_count() > compiled.template.bytecode.instructions.len());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_compile_parallel_keeps_order() {
        let programs = vec![script(vec![]), module(&[], vec![]), script(vec![brk(None)])];
        let results = compile_parallel(&programs, &CompilerOptions::default());
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().source_type, SourceType::Script);
        assert_eq!(results[1].as_ref().unwrap().source_type, SourceType::Module);
        assert!(results[2].is_err());
    }
}
