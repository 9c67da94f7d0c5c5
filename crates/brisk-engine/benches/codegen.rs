//! Benchmarks for scope analysis and bytecode generation.
//!
//! Run with: `cargo bench -p brisk-engine`.

use brisk_engine::ast::builder::*;
use brisk_engine::ast::{Program, Statement};
use brisk_engine::compiler;
use brisk_engine::{CompilerOptions, Engine};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

/// `n` functions, each summing a loop counter into a local.
fn generate_functions(n: usize) -> Program {
    let mut body: Vec<Statement> = Vec::with_capacity(n + 1);
    for i in 0..n {
        body.push(function_decl(
            &format!("f{i}"),
            &["n"],
            vec![
                let_("sum", Some(num(0.0))),
                for_(
                    Some(init_let("i", num(0.0))),
                    Some(lt(ident("i"), ident("n"))),
                    Some(post_inc(ident("i"))),
                    block(vec![expr_stmt(assign(
                        ident("sum"),
                        add(ident("sum"), ident("i")),
                    ))]),
                ),
                ret(Some(ident("sum"))),
            ],
        ));
    }
    body.push(expr_stmt(call(ident("f0"), vec![num(100.0)])));
    script(body)
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let options = CompilerOptions::default();

    for size in [10, 100, 1000] {
        let program = generate_functions(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &program, |b, program| {
            b.iter(|| compiler::compile(black_box(program), &options).expect("compile failed"));
        });
    }
    group.finish();
}

fn bench_compile_and_run(c: &mut Criterion) {
    let program = generate_functions(10);
    c.bench_function("compile_and_run", |b| {
        b.iter(|| {
            let mut engine = Engine::new();
            engine.eval_program(black_box(&program)).expect("run failed")
        });
    });
}

criterion_group!(benches, bench_compile, bench_compile_and_run);
criterion_main!(benches);
