// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # brisk-engine
//!
//! The code-generation core of an ECMAScript engine, implemented in Rust.
//!
//! ## Overview
//!
//! Programs arrive as ESTree ASTs (built in Rust with [`ast::builder`] or
//! read from JSON). This crate provides:
//! - Static scope analysis with slot resolution and early errors
//! - Declaration instantiation for scripts, modules, functions and blocks
//! - Bytecode generation, including `try`/`finally` lowering and coroutine
//!   state machines for generators and async functions
//! - A reference stack VM that executes the generated code
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use brisk_engine::{ast::builder::*, Engine, Value};
//!
//! let mut engine = Engine::new();
//! let program = script(vec![expr_stmt(add(num(1.0), num(2.0)))]);
//! let result = engine.eval_program(&program)?;
//! assert!(matches!(result, Value::Number(n) if n == 3.0));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod compiler;
pub mod config;
pub mod error;
pub mod gc;
pub mod runtime;
pub mod scope;
pub mod vm;

#[cfg(feature = "async")]
pub mod async_engine;

use std::path::Path;

use rustc_hash::FxHashMap;
use tracing::debug;

pub use ast::{Program, SourceType};
pub use compiler::Script;
pub use config::{CompilerOptions, EngineConfig, VmOptions};
pub use error::{Error, Result};
pub use runtime::value::Value;
pub use vm::Vm;

#[cfg(feature = "async")]
pub use async_engine::AsyncEngine;
#[cfg(all(feature = "async", feature = "parallel"))]
pub use async_engine::ParallelExecutor;

/// The main engine instance.
///
/// Owns the configuration and one VM (heap, realm and job queue). Scripts
/// run against the same global environment, so declarations persist from
/// one run to the next.
pub struct Engine {
    config: EngineConfig,
    vm: Vm,
}

impl Engine {
    /// Creates an engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an engine with `config`.
    pub fn with_config(config: EngineConfig) -> Self {
        let vm = Vm::new(config.vm.clone());
        Self { config, vm }
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compiles `program` as a script.
    pub fn compile_script(&self, program: &Program) -> Result<Script> {
        compiler::compile_script(program, &self.config.compiler)
    }

    /// Compiles `program` as a module.
    pub fn compile_module(&self, program: &Program) -> Result<Script> {
        compiler::compile_module(program, &self.config.compiler)
    }

    /// Runs a compiled program and returns its completion value.
    ///
    /// Modules run with an empty import table; use
    /// [`run_module`](Self::run_module) to supply one. Pending jobs are not
    /// drained.
    pub fn run(&mut self, script: &Script) -> Result<Value> {
        match script.source_type {
            SourceType::Script => self.vm.run_script(script.template.clone()),
            SourceType::Module => self.run_module(script, &FxHashMap::default()),
        }
    }

    /// Runs a compiled module with its pre-resolved imports.
    pub fn run_module(&mut self, script: &Script, imports: &FxHashMap<String, Value>) -> Result<Value> {
        if script.source_type != SourceType::Module {
            return Err(Error::internal("not a module"));
        }
        let values = script
            .imports
            .iter()
            .map(|name| {
                imports
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::internal(format!("unresolved import '{name}'")))
            })
            .collect::<Result<Vec<_>>>()?;
        self.vm.run_module(script.template.clone(), values)
    }

    /// Compiles and runs `program`, then drains the job queue.
    pub fn eval_program(&mut self, program: &Program) -> Result<Value> {
        let script = compiler::compile(program, &self.config.compiler)?;
        let value = self.run(&script)?;
        self.run_jobs()?;
        Ok(value)
    }

    /// Parses an ESTree JSON document and evaluates it.
    pub fn eval_json(&mut self, json: &str) -> Result<Value> {
        let program: Program = serde_json::from_str(json)?;
        self.eval_program(&program)
    }

    /// Reads an ESTree JSON file and evaluates it.
    pub fn eval_file(&mut self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        debug!(path = %path.display(), "evaluating file");
        let json = std::fs::read_to_string(path)?;
        self.eval_json(&json)
    }

    /// Runs queued promise jobs until the queue is empty; returns how many ran.
    pub fn run_jobs(&mut self) -> Result<usize> {
        self.vm
            .run_jobs()
            .map_err(|exception| self.vm.uncaught(exception))
    }

    /// Calls a function value with an undefined receiver.
    pub fn call(&mut self, callee: &Value, args: &[Value]) -> Result<Value> {
        self.vm
            .call(callee, &Value::Undefined, args)
            .map_err(|exception| self.vm.uncaught(exception))
    }

    /// Reads a global binding, lexical declarations included.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.vm
            .heap
            .get_binding_value(self.vm.realm.global_env, name, true)
            .ok()
    }

    /// Renders a value the way `print` does.
    pub fn display(&mut self, value: &Value) -> String {
        self.vm.display(value)
    }

    /// Lines written by `print` so far.
    pub fn output(&self) -> &[String] {
        self.vm.output()
    }

    /// Takes the lines written by `print`.
    pub fn take_output(&mut self) -> Vec<String> {
        self.vm.take_output()
    }

    /// The underlying VM.
    pub fn vm(&mut self) -> &mut Vm {
        &mut self.vm
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Loads an ESTree JSON program from disk.
pub fn load_program(path: impl AsRef<Path>) -> Result<Program> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;

    #[test]
    fn test_engine_eval_completion_value() {
        let mut engine = Engine::new();
        let program = script(vec![expr_stmt(add(num(1.0), num(2.0)))]);
        let result = engine.eval_program(&program).unwrap();
        assert!(matches!(result, Value::Number(n) if n == 3.0));
    }

    #[test]
    fn test_globals_persist_across_runs() {
        let mut engine = Engine::new();
        engine
            .eval_program(&script(vec![let_("x", Some(num(4.0)))]))
            .unwrap();
        let result = engine
            .eval_program(&script(vec![expr_stmt(ident("x"))]))
            .unwrap();
        assert!(matches!(result, Value::Number(n) if n == 4.0));
        assert!(matches!(engine.global("x"), Some(Value::Number(n)) if n == 4.0));
    }

    #[test]
    fn test_module_imports() {
        let mut engine = Engine::new();
        let program = module(&["a"], vec![expr_stmt(call(ident("print"), vec![ident("a")]))]);
        let compiled = engine.compile_module(&program).unwrap();
        assert!(matches!(engine.run(&compiled), Err(Error::Internal(_))));

        let mut imports = FxHashMap::default();
        imports.insert("a".to_string(), Value::Number(7.0));
        engine.run_module(&compiled, &imports).unwrap();
        assert_eq!(engine.take_output(), vec!["7".to_string()]);
    }

    #[test]
    fn test_print_output() {
        let mut engine = Engine::new();
        engine
            .eval_program(&script(vec![print(vec![str_lit("hi"), num(2.0)])]))
            .unwrap();
        assert_eq!(engine.output(), ["hi 2".to_string()]);
    }

    #[test]
    fn test_eval_json() {
        let mut engine = Engine::new();
        let program = script(vec![expr_stmt(str_lit("ok"))]);
        let json = serde_json::to_string(&program).unwrap();
        let result = engine.eval_json(&json).unwrap();
        assert!(matches!(result, Value::String(s) if &*s == "ok"));
    }
}
