//! Front-to-back compilation driver.
//!
//! Stages run in order under timing capture; every stage error lands in
//! `diagnostics` in stage order. A stage that reports errors keeps its own
//! artifact for inspection but stops the pipeline, so IR is never lowered
//! from an analysis that still holds errors. Unreachable-block findings are
//! warnings and do not stop anything.
//!
//! Every call owns all of its state; compiling in parallel sessions needs
//! no coordination.

use crate::Limits;
use crate::ast::Program;
use crate::cfg::{self, Cfg};
use crate::diagnostics::{Diagnostic, Stage};
use crate::ir::{self, ProgramIr};
use crate::lexer;
use crate::parser;
use crate::sema::{self, Analysis};
use crate::timing::StageTimings;
use crate::token::Token;

pub struct CompileOutput<'src> {
    pub tokens: Vec<Token<'src>>,
    pub program: Option<Program>,
    pub analysis: Option<Analysis>,
    pub ir: Option<ProgramIr>,
    /// One graph per lowered function, in declaration order.
    pub cfgs: Vec<Cfg>,
    pub diagnostics: Vec<Diagnostic>,
    pub timings: StageTimings,
}

impl CompileOutput<'_> {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

pub fn compile<'src>(source: &'src str, limits: &Limits) -> CompileOutput<'src> {
    let mut timings = StageTimings::new();
    let mut diagnostics = Vec::new();

    let (tokens, lex_errors) = timings.record(Stage::Lexer, || lexer::tokenize(source));
    diagnostics.extend(lex_errors.iter().map(Diagnostic::from));
    tracing::debug!(tokens = tokens.len(), errors = lex_errors.len(), "lexed");
    if !lex_errors.is_empty() {
        return CompileOutput {
            tokens,
            program: None,
            analysis: None,
            ir: None,
            cfgs: Vec::new(),
            diagnostics,
            timings,
        };
    }

    let (program, parse_errors) =
        timings.record(Stage::Parser, || parser::parse(tokens.clone(), limits));
    diagnostics.extend(parse_errors.iter().map(Diagnostic::from));
    tracing::debug!(
        functions = program.functions.len(),
        errors = parse_errors.len(),
        "parsed"
    );
    if !parse_errors.is_empty() {
        return CompileOutput {
            tokens,
            program: Some(program),
            analysis: None,
            ir: None,
            cfgs: Vec::new(),
            diagnostics,
            timings,
        };
    }

    let analysis = timings.record(Stage::Sema, || sema::analyze(&program));
    diagnostics.extend(analysis.errors.iter().map(Diagnostic::from));
    tracing::debug!(errors = analysis.errors.len(), "analyzed");
    if analysis.has_errors() {
        return CompileOutput {
            tokens,
            program: Some(program),
            analysis: Some(analysis),
            ir: None,
            cfgs: Vec::new(),
            diagnostics,
            timings,
        };
    }

    let lowered = timings.record(Stage::Ir, || ir::lower(&program, &analysis));
    let lowered = match lowered {
        Ok(lowered) => lowered,
        Err(internal) => {
            diagnostics.push(Diagnostic::error(Stage::Ir, internal.to_string(), 0, 0));
            return CompileOutput {
                tokens,
                program: Some(program),
                analysis: Some(analysis),
                ir: None,
                cfgs: Vec::new(),
                diagnostics,
                timings,
            };
        }
    };
    tracing::debug!(functions = lowered.functions.len(), "lowered");

    let mut cfgs = Vec::with_capacity(lowered.functions.len());
    timings.record(Stage::Cfg, || {
        for function in &lowered.functions {
            match cfg::build(function) {
                Ok(graph) => {
                    if let Err(internal) = graph.validate() {
                        diagnostics.push(Diagnostic::error(
                            Stage::Cfg,
                            internal.to_string(),
                            0,
                            0,
                        ));
                        continue;
                    }
                    for &block in &graph.unreachable {
                        let line = graph.blocks[block].range.start;
                        let line = function.line_info.get(line).map_or(0, |info| info.line);
                        diagnostics.push(Diagnostic::warning(
                            Stage::Cfg,
                            format!("Unreachable block b{block} in `{}`", function.name),
                            line,
                            0,
                        ));
                    }
                    cfgs.push(graph);
                }
                Err(internal) => {
                    diagnostics.push(Diagnostic::error(Stage::Cfg, internal.to_string(), 0, 0));
                }
            }
        }
    });
    tracing::debug!(graphs = cfgs.len(), "graphs built");

    CompileOutput {
        tokens,
        program: Some(program),
        analysis: Some(analysis),
        ir: Some(lowered),
        cfgs,
        diagnostics,
        timings,
    }
}
