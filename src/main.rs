// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! brisk - command line driver for the brisk ECMAScript code generator
//!
//! Programs are ESTree ASTs serialized as JSON.
//!
//! ## Commands
//!
//! - `run`: compile and execute a program, then print its completion value
//! - `disasm`: print the bytecode of every compiled unit
//! - `check`: compile several programs in parallel and report each result

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use brisk_engine::{AsyncEngine, EngineConfig, ParallelExecutor, compiler, load_program};
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_CONFIG: &str = "brisk.toml";

#[derive(Parser)]
#[command(
    name = "brisk",
    about = "Compile and run ECMAScript ASTs",
    version,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Configuration file (defaults to ./brisk.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a program and print its completion value
    Run {
        /// ESTree JSON file
        file: PathBuf,
    },
    /// Print the bytecode for every unit of a program
    Disasm {
        /// ESTree JSON file
        file: PathBuf,
    },
    /// Compile programs in parallel and report per-file status
    Check {
        /// ESTree JSON files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("BRISK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => EngineConfig::load_or_default(DEFAULT_CONFIG)
            .with_context(|| format!("failed to load '{DEFAULT_CONFIG}'"))?,
    };
    debug!(?config, "configuration loaded");
    Ok(config)
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Run { file } => run(config, &file).await,
        Command::Disasm { file } => disasm(&config, &file),
        Command::Check { files } => check(&config, &files),
    }
}

async fn run(config: EngineConfig, file: &Path) -> anyhow::Result<ExitCode> {
    let engine = AsyncEngine::with_config(config);
    let result = engine.run_file(file).await;

    for line in engine.take_output().await {
        println!("{line}");
    }

    match result {
        Ok(value) => {
            if !value.is_undefined() {
                println!("{}", engine.display(&value).await.bright_white());
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(brisk_engine::Error::Uncaught { value, suppressed }) => {
            eprintln!("{}: {}", "Uncaught".red().bold(), value);
            for s in suppressed {
                eprintln!("  {} {}", "suppressed:".dimmed(), s);
            }
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).with_context(|| format!("failed to run '{}'", file.display())),
    }
}

fn disasm(config: &EngineConfig, file: &Path) -> anyhow::Result<ExitCode> {
    let program =
        load_program(file).with_context(|| format!("failed to read '{}'", file.display()))?;
    let script = compiler::compile(&program, &config.compiler)?;
    print!("{}", script.template);
    Ok(ExitCode::SUCCESS)
}

fn check(config: &EngineConfig, files: &[PathBuf]) -> anyhow::Result<ExitCode> {
    let executor = ParallelExecutor::new()?;

    let mut programs = Vec::with_capacity(files.len());
    let mut failures = 0;
    for file in files {
        match load_program(file) {
            Ok(program) => programs.push((file, program)),
            Err(e) => {
                failures += 1;
                println!("{} {}: {}", "error".red().bold(), file.display(), e);
            }
        }
    }

    let (paths, programs): (Vec<_>, Vec<_>) = programs.into_iter().unzip();
    let results = executor.compile_parallel(&programs, &config.compiler);
    for (path, result) in paths.into_iter().zip(results) {
        match result {
            Ok(script) => println!(
                "{} {} ({} instructions)",
                "ok".green().bold(),
                path.display(),
                script.instruction_count()
            ),
            Err(e) => {
                failures += 1;
                println!("{} {}: {}", "error".red().bold(), path.display(), e);
            }
        }
    }

    if failures == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{} of {} files failed", failures, files.len());
        Ok(ExitCode::FAILURE)
    }
}
