use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result, bail};

use minilang::diagnostics::Diagnostic;
use minilang::ir::ProgramIr;
use minilang::timing::StageTimings;
use minilang::vm::{Command, DebugController, DebugEventKind, Machine};
use minilang::{Limits, exchange, pipeline};

fn main() -> Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let mut emit: Option<String> = None;
    let mut trace = false;
    let mut timings = false;
    let mut breakpoints: Vec<u32> = Vec::new();
    let mut input_path: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--emit" => {
                emit = Some(
                    args.next()
                        .ok_or_else(|| anyhow::anyhow!("Missing artifact name after --emit"))?,
                );
            }
            "--trace" => trace = true,
            "--timings" => timings = true,
            "--break" => {
                let line = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing line number after --break"))?;
                breakpoints.push(
                    line.parse()
                        .with_context(|| format!("Invalid line number '{line}'"))?,
                );
            }
            _ => {
                input_path = Some(arg);
                if args.next().is_some() {
                    bail!("Only one input file is supported");
                }
                break;
            }
        }
    }

    let source = if let Some(path) = input_path {
        fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let limits = Limits::default();
    let output = pipeline::compile(&source, &limits);

    if timings {
        report_timings(&output.timings)?;
    }

    if let Some(artifact) = emit.as_deref() {
        return emit_artifact(artifact, &output);
    }

    report_diagnostics(&output.diagnostics)?;
    if output.has_errors() {
        std::process::exit(1);
    }
    let Some(program) = output.ir.as_ref() else {
        std::process::exit(1);
    };

    if trace || !breakpoints.is_empty() {
        run_debugger(program, &limits, trace, &breakpoints)
    } else {
        run_program(program, &limits)
    }
}

fn run_program(program: &ProgramIr, limits: &Limits) -> Result<()> {
    match Machine::new(program, limits).run() {
        Ok(outcome) => {
            if !outcome.output.is_empty() {
                print!("{}", outcome.output);
            }
            std::process::exit(outcome.exit as i32);
        }
        Err(err) => {
            eprintln!("{}", serde_json::to_string(&Diagnostic::from(&err))?);
            std::process::exit(70);
        }
    }
}

fn run_debugger(
    program: &ProgramIr,
    limits: &Limits,
    trace: bool,
    breakpoints: &[u32],
) -> Result<()> {
    let mut debugger = DebugController::new(Machine::new(program, limits));
    for &line in breakpoints {
        debugger.add_breakpoint(line);
    }
    let command = if trace {
        Command::StepInto
    } else {
        Command::Continue
    };
    let mut event = debugger.launch();
    loop {
        println!("{}", serde_json::to_string(&exchange::debug_event(&event))?);
        match event.kind {
            DebugEventKind::Terminated => {
                let output = debugger.machine().output();
                if !output.is_empty() {
                    print!("{output}");
                }
                std::process::exit(debugger.machine().exit_code() as i32);
            }
            DebugEventKind::ErrorHalted => std::process::exit(70),
            _ => event = debugger.resume(command),
        }
    }
}

fn emit_artifact(artifact: &str, output: &pipeline::CompileOutput<'_>) -> Result<()> {
    let rendered = match artifact {
        "tokens" => serde_json::to_string_pretty(&exchange::tokens(&output.tokens))?,
        "ast" => match output.program.as_ref() {
            Some(program) => serde_json::to_string_pretty(&exchange::program(program))?,
            None => return report_failure(output),
        },
        "ir" => match output.ir.as_ref() {
            Some(program) => serde_json::to_string_pretty(&exchange::program_ir(program))?,
            None => return report_failure(output),
        },
        "cfg" => match output.ir.as_ref() {
            Some(program) if !output.cfgs.is_empty() => {
                serde_json::to_string_pretty(&exchange::program_cfgs(&output.cfgs, program))?
            }
            _ => return report_failure(output),
        },
        other => bail!("Unknown artifact '{other}' (expected tokens, ast, ir or cfg)"),
    };
    println!("{rendered}");
    report_diagnostics(&output.diagnostics)?;
    if output.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

fn report_failure(output: &pipeline::CompileOutput<'_>) -> Result<()> {
    report_diagnostics(&output.diagnostics)?;
    std::process::exit(1);
}

fn report_diagnostics(diagnostics: &[Diagnostic]) -> Result<()> {
    for diagnostic in diagnostics {
        eprintln!("{}", serde_json::to_string(diagnostic)?);
    }
    Ok(())
}

fn report_timings(timings: &StageTimings) -> Result<()> {
    let mut map = serde_json::Map::new();
    for (stage, duration) in timings {
        map.insert(
            stage.name().to_string(),
            serde_json::json!(duration.as_secs_f64() * 1000.0),
        );
    }
    eprintln!("{}", serde_json::Value::Object(map));
    Ok(())
}

/// Enable with `RUST_LOG=minilang=debug`; logs go to stderr so stdout stays
/// machine-readable.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr).with_target(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}
