//! Asynchronous engine APIs.
//!
//! Wraps [`Engine`] for hosts running on tokio: AST files are read with
//! non-blocking I/O, compiled outside the engine lock and cached by path.
//!
//! # Example
//!
//! ```ignore
//! use brisk_engine::AsyncEngine;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = AsyncEngine::new();
//!     let result = engine.run_file("program.json").await.unwrap();
//!     println!("{}", engine.display(&result).await);
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::compiler::{self, Script};
use crate::config::{CompilerOptions, EngineConfig};
use crate::error::{Error, Result};
use crate::{Engine, Program, Value};

/// An asynchronous engine.
pub struct AsyncEngine {
    engine: Arc<RwLock<Engine>>,
    options: CompilerOptions,
    cache: parking_lot::RwLock<FxHashMap<PathBuf, Arc<Script>>>,
}

impl AsyncEngine {
    /// Creates an engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an engine with `config`.
    pub fn with_config(config: EngineConfig) -> Self {
        let options = config.compiler.clone();
        Self {
            engine: Arc::new(RwLock::new(Engine::with_config(config))),
            options,
            cache: parking_lot::RwLock::new(FxHashMap::default()),
        }
    }

    /// Reads and parses an ESTree JSON file.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<Program> {
        let json = fs::read_to_string(path.as_ref()).await?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Compiles the program in `path`, reusing an earlier compilation of the
    /// same path.
    pub async fn compile_file(&self, path: impl AsRef<Path>) -> Result<Arc<Script>> {
        let path = path.as_ref();
        if let Some(script) = self.cache.read().get(path) {
            debug!(path = %path.display(), "compiled program cache hit");
            return Ok(script.clone());
        }
        let program = self.load(path).await?;
        let script = Arc::new(compiler::compile(&program, &self.options)?);
        self.cache.write().insert(path.to_path_buf(), script.clone());
        Ok(script)
    }

    /// Compiles several files concurrently; results follow `paths`.
    pub async fn compile_files(&self, paths: &[impl AsRef<Path>]) -> Vec<Result<Arc<Script>>> {
        let futures: Vec<_> = paths.iter().map(|p| self.compile_file(p)).collect();
        futures::future::join_all(futures).await
    }

    /// Runs a compiled program and drains the job queue.
    pub async fn run(&self, script: &Script) -> Result<Value> {
        let mut engine = self.engine.write().await;
        let value = engine.run(script)?;
        engine.run_jobs()?;
        Ok(value)
    }

    /// Compiles and runs the program in `path`.
    pub async fn run_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        let script = self.compile_file(path).await?;
        self.run(&script).await
    }

    /// Compiles every file concurrently, then runs them in order. Stops at
    /// the first failure.
    pub async fn run_files(&self, paths: &[impl AsRef<Path>]) -> Result<Vec<Value>> {
        let scripts = self.compile_files(paths).await;
        let mut values = Vec::with_capacity(scripts.len());
        for script in scripts {
            let script = script?;
            values.push(self.run(&script).await?);
        }
        Ok(values)
    }

    /// Renders a value the way `print` does.
    pub async fn display(&self, value: &Value) -> String {
        self.engine.write().await.display(value)
    }

    /// Takes the lines written by `print`.
    pub async fn take_output(&self) -> Vec<String> {
        self.engine.write().await.take_output()
    }

    /// Shared handle to the wrapped engine.
    pub fn engine(&self) -> Arc<RwLock<Engine>> {
        self.engine.clone()
    }

    /// Number of cached compilations.
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }
}

impl Default for AsyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiles programs on a dedicated rayon pool.
#[cfg(feature = "parallel")]
pub struct ParallelExecutor {
    pool: rayon::ThreadPool,
}

#[cfg(feature = "parallel")]
impl ParallelExecutor {
    /// Creates an executor with the default number of threads.
    pub fn new() -> Result<Self> {
        Self::build(rayon::ThreadPoolBuilder::new())
    }

    /// Creates an executor with `num_threads` threads.
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        Self::build(rayon::ThreadPoolBuilder::new().num_threads(num_threads))
    }

    fn build(builder: rayon::ThreadPoolBuilder) -> Result<Self> {
        let pool = builder
            .build()
            .map_err(|e| Error::internal(format!("failed to create thread pool: {e}")))?;
        Ok(Self { pool })
    }

    /// Compiles `programs` in parallel; results follow the input order.
    pub fn compile_parallel(
        &self,
        programs: &[Program],
        options: &CompilerOptions,
    ) -> Vec<Result<Script>> {
        self.pool
            .install(|| compiler::compile_parallel(programs, options))
    }

    /// Parses ESTree JSON documents in parallel.
    pub fn parse_parallel(&self, sources: &[&str]) -> Vec<Result<Program>> {
        use rayon::prelude::*;

        self.pool.install(|| {
            sources
                .par_iter()
                .map(|source| serde_json::from_str(source).map_err(Error::from))
                .collect()
        })
    }
}
