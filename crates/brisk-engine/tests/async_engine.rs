//! Tests for the tokio-facing engine wrapper.

#![cfg(feature = "async")]

use std::path::PathBuf;

use brisk_engine::ast::Program;
use brisk_engine::ast::builder::*;
use brisk_engine::{AsyncEngine, Value};

fn write_program(name: &str, program: &Program) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("brisk-async-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string(program).unwrap()).unwrap();
    path
}

#[tokio::test]
async fn test_run_file() {
    let path = write_program(
        "run_file.json",
        &script(vec![
            print(vec![str_lit("hello")]),
            expr_stmt(add(num(20.0), num(22.0))),
        ]),
    );
    let engine = AsyncEngine::new();
    let value = engine.run_file(&path).await.unwrap();
    assert!(matches!(value, Value::Number(n) if n == 42.0));
    assert_eq!(engine.display(&value).await, "42");
    assert_eq!(engine.take_output().await, ["hello"]);
}

#[tokio::test]
async fn test_compile_cache() {
    let path = write_program("cached.json", &script(vec![expr_stmt(num(1.0))]));
    let engine = AsyncEngine::new();
    let first = engine.compile_file(&path).await.unwrap();
    let second = engine.compile_file(&path).await.unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(engine.cached(), 1);
}

#[tokio::test]
async fn test_run_files_in_order() {
    let a = write_program("order_a.json", &script(vec![var("x", Some(num(1.0)))]));
    let b = write_program(
        "order_b.json",
        &script(vec![expr_stmt(add(ident("x"), num(1.0)))]),
    );
    let engine = AsyncEngine::new();
    let values = engine.run_files(&[a, b]).await.unwrap();
    assert_eq!(values.len(), 2);
    assert!(matches!(values[1], Value::Number(n) if n == 2.0));
}

#[tokio::test]
async fn test_missing_file_fails() {
    let present = write_program("present.json", &script(vec![]));
    let missing = present.with_file_name("missing.json");
    let engine = AsyncEngine::new();
    let results = engine.compile_files(&[present, missing]).await;
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(brisk_engine::Error::Io(_))));
    assert_eq!(engine.cached(), 1);
}

#[cfg(feature = "parallel")]
#[test]
fn test_parallel_executor() {
    use brisk_engine::{CompilerOptions, ParallelExecutor};

    let executor = ParallelExecutor::with_threads(2).unwrap();
    let sources = [
        serde_json::to_string(&script(vec![expr_stmt(num(1.0))])).unwrap(),
        "not json".to_string(),
    ];
    let refs: Vec<&str> = sources.iter().map(String::as_str).collect();
    let parsed = executor.parse_parallel(&refs);
    assert!(parsed[0].is_ok());
    assert!(parsed[1].is_err());

    let programs = vec![script(vec![]), script(vec![brk(None)])];
    let compiled = executor.compile_parallel(&programs, &CompilerOptions::default());
    assert!(compiled[0].is_ok());
    assert!(compiled[1].is_err());
}
