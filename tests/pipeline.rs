use indoc::indoc;
use minilang::vm::{Command, DebugController, DebugEventKind, Machine};
use minilang::{Limits, lexer, pipeline};

fn compile_clean(source: &str) -> minilang::ir::ProgramIr {
    let output = pipeline::compile(source, &Limits::default());
    assert!(
        !output.has_errors(),
        "unexpected diagnostics: {:?}",
        output.diagnostics
    );
    output.ir.expect("pipeline stopped before lowering")
}

#[test]
fn parsing_is_deterministic_across_runs() {
    let source = indoc! {"
        fn gcd(a: int, b: int) -> int {
            while (b != 0) {
                let t: int = b;
                b = a - a / b * b;
                a = t;
            }
            return a;
        }

        fn main() -> int {
            return gcd(48, 18);
        }
    "};
    let first = pipeline::compile(source, &Limits::default());
    let second = pipeline::compile(source, &Limits::default());
    assert_eq!(first.program, second.program);
    assert_eq!(first.diagnostics, second.diagnostics);
}

#[test]
fn arithmetic_precedence_from_tokens_to_exit_code() {
    let (tokens, errors) = lexer::tokenize("2+3*4");
    assert!(errors.is_empty());
    let lexemes: Vec<&str> = tokens.iter().map(|token| token.lexeme).collect();
    assert_eq!(lexemes, ["2", "+", "3", "*", "4", ""]);

    let program = compile_clean("fn main() -> int { return 2 + 3 * 4; }");
    let outcome = Machine::new(&program, &Limits::default()).run().unwrap();
    assert_eq!(outcome.exit, 14);
}

#[test]
fn stepping_visits_loop_statements_in_source_order() {
    let program = compile_clean(indoc! {"
        fn main() -> int {
            let x: int = 1;
            while (x < 3) {
                x = x + 1;
            }
            return x;
        }
    "});
    let outcome = Machine::new(&program, &Limits::default()).run().unwrap();
    assert_eq!(outcome.exit, 3);

    let mut debugger = DebugController::new(Machine::new(&program, &Limits::default()));
    let mut lines = vec![debugger.launch().line];
    loop {
        let event = debugger.resume(Command::StepInto);
        if event.kind == DebugEventKind::Terminated {
            break;
        }
        lines.push(event.line);
    }
    assert_eq!(lines, [2, 3, 4, 3, 4, 3, 6]);
}

#[test]
fn breakpoints_pause_each_iteration_until_the_loop_exits() {
    let program = compile_clean(indoc! {"
        fn main() -> int {
            let x: int = 1;
            while (x < 3) {
                x = x + 1;
            }
            return x;
        }
    "});
    let mut debugger = DebugController::new(Machine::new(&program, &Limits::default()));
    debugger.add_breakpoint(4);
    debugger.launch();
    let mut pauses = 0;
    loop {
        let event = debugger.resume(Command::Continue);
        match event.kind {
            DebugEventKind::Paused => {
                assert_eq!(event.line, 4);
                pauses += 1;
            }
            DebugEventKind::Terminated => break,
            other => panic!("unexpected event kind {other:?}"),
        }
    }
    assert_eq!(pauses, 2);
}

#[test]
fn recursion_and_output_work_end_to_end() {
    let program = compile_clean(indoc! {r#"
        fn fib(n: int) -> int {
            if (n < 2) {
                return n;
            }
            return fib(n - 1) + fib(n - 2);
        }

        fn main() -> int {
            let result: int = fib(10);
            println("fib(10) =", result);
            return result;
        }
    "#});
    let outcome = Machine::new(&program, &Limits::default()).run().unwrap();
    assert_eq!(outcome.exit, 55);
    assert_eq!(outcome.output, "fib(10) = 55\n");
}
