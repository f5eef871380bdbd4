use criterion::{Criterion, black_box, criterion_group, criterion_main};
use minilang::vm::Machine;
use minilang::{Limits, ir, lexer, parser, sema};

const FIB: &str = r#"
fn fib(n: int) -> int {
    if (n < 2) {
        return n;
    }
    return fib(n - 1) + fib(n - 2);
}

fn main() -> int {
    return fib(18);
}
"#;

fn loop_heavy(iterations: u32) -> String {
    format!(
        r#"
fn main() -> int {{
    let total: int = 0;
    let i: int = 0;
    while (i < {iterations}) {{
        total = total + i * 2 - 1;
        i = i + 1;
    }}
    return total;
}}
"#
    )
}

fn statement_heavy(count: usize) -> String {
    let mut source = String::from("fn main() -> int {\n    let x: int = 1;\n");
    for _ in 0..count {
        source.push_str("    x = (x + 3) * 2 - x / 2;\n");
    }
    source.push_str("    return x;\n}\n");
    source
}

fn workloads() -> Vec<(&'static str, String)> {
    vec![
        ("fib", FIB.to_string()),
        ("loop", loop_heavy(10_000)),
        ("wide", statement_heavy(400)),
    ]
}

fn bench_stages(c: &mut Criterion) {
    let limits = Limits::default();
    for (label, source) in workloads() {
        let (tokens, errors) = lexer::tokenize(&source);
        assert!(errors.is_empty());
        let (program, errors) = parser::parse(tokens.clone(), &limits);
        assert!(errors.is_empty());
        let analysis = sema::analyze(&program);
        assert!(!analysis.has_errors());

        c.bench_function(&format!("lex_{label}"), |b| {
            b.iter(|| {
                let out = lexer::tokenize(black_box(&source));
                black_box(out);
            })
        });

        c.bench_function(&format!("parse_{label}"), |b| {
            b.iter(|| {
                let out = parser::parse(black_box(tokens.clone()), &limits);
                black_box(out);
            })
        });

        c.bench_function(&format!("analyze_{label}"), |b| {
            b.iter(|| {
                let out = sema::analyze(black_box(&program));
                black_box(out);
            })
        });

        c.bench_function(&format!("lower_{label}"), |b| {
            b.iter(|| {
                let out = ir::lower(black_box(&program), black_box(&analysis)).expect("lower");
                black_box(out);
            })
        });
    }
}

fn bench_execution(c: &mut Criterion) {
    let limits = Limits::default();
    for (label, source) in workloads() {
        let (tokens, errors) = lexer::tokenize(&source);
        assert!(errors.is_empty());
        let (program, errors) = parser::parse(tokens, &limits);
        assert!(errors.is_empty());
        let analysis = sema::analyze(&program);
        assert!(!analysis.has_errors());
        let lowered = ir::lower(&program, &analysis).expect("lower");

        c.bench_function(&format!("execute_{label}"), |b| {
            b.iter(|| {
                let outcome = Machine::new(black_box(&lowered), &limits)
                    .run()
                    .expect("run");
                black_box(outcome);
            })
        });
    }
}

criterion_group!(benches, bench_stages, bench_execution);
criterion_main!(benches);
