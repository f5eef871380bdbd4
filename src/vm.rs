//! Register-machine execution of lowered programs.
//!
//! The machine is an explicit resumable state machine: all execution state
//! lives in [`Machine`] (frame stack, instruction pointers, output), so a
//! driver can run one instruction at a time and inspect the paused state
//! between units. [`DebugController`] builds stepping and breakpoints on
//! top of that; [`Machine::run`] is the plain run-to-completion path.

mod debug;
mod error;
mod value;

pub use debug::{
    Command, DebugController, DebugEvent, DebugEventKind, FrameSnapshot, wrap_line_trace,
};
pub use error::RuntimeError;
pub use value::Value;

use crate::Limits;
use crate::diagnostics::InternalError;
use crate::ir::{Builtin, Callee, Const, FunctionIr, Inst, LabelId, Operand, ProgramIr, TempId};
use value::{apply_binary, apply_unary};

/// Lifecycle of one execution. `Terminated` and `ErrorHalted` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    Running,
    Paused,
    Terminated,
    ErrorHalted,
}

/// Result of a completed run: `main`'s return value plus everything the
/// program printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub exit: i64,
    pub output: String,
}

struct Frame {
    function: usize,
    ip: usize,
    slots: Vec<Option<Value>>,
    temps: Vec<Option<Value>>,
    /// Caller temp that receives this frame's return value. `None` only for
    /// the entry frame.
    return_dst: Option<TempId>,
}

pub struct Machine<'ir> {
    program: &'ir ProgramIr,
    limits: Limits,
    frames: Vec<Frame>,
    state: State,
    output: String,
    exit: i64,
}

impl<'ir> Machine<'ir> {
    pub fn new(program: &'ir ProgramIr, limits: &Limits) -> Self {
        Machine {
            program,
            limits: *limits,
            frames: Vec::new(),
            state: State::Created,
            output: String::new(),
            exit: 0,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn exit_code(&self) -> i64 {
        self.exit
    }

    /// Push the entry frame and leave the machine Running, paused-equivalent
    /// at the first instruction of `main`.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        if self.state != State::Created {
            return Err(InternalError::new("machine started twice").into());
        }
        let main = self
            .program
            .function(self.program.main)
            .ok_or_else(|| InternalError::new("entry function index out of range"))?;
        if self.limits.max_call_depth == 0 {
            return Err(RuntimeError::StackOverflow {
                limit: 0,
                line: main.line_info.first().map_or(0, |info| info.line),
            });
        }
        tracing::debug!(function = %main.name, "execution started");
        self.frames.push(Frame {
            function: self.program.main,
            ip: 0,
            slots: vec![None; main.slot_names.len()],
            temps: vec![None; main.temp_count],
            return_dst: None,
        });
        self.state = State::Running;
        Ok(())
    }

    /// Run to completion without stepping.
    pub fn run(mut self) -> Result<Outcome, RuntimeError> {
        self.start()?;
        loop {
            if self.advance()? {
                return Ok(Outcome {
                    exit: self.exit,
                    output: self.output,
                });
            }
        }
    }

    /// Execute one instruction, folding the result into the machine state.
    /// `Ok(true)` once the program has terminated.
    fn advance(&mut self) -> Result<bool, RuntimeError> {
        match self.step() {
            Ok(true) => {
                self.state = State::Terminated;
                tracing::debug!(exit = self.exit, "execution terminated");
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(err) => {
                self.state = State::ErrorHalted;
                tracing::debug!(error = %err, "execution halted");
                Err(err)
            }
        }
    }

    fn step(&mut self) -> Result<bool, RuntimeError> {
        let (inst, line) = {
            let frame = self.top()?;
            let function = self.function_of(frame)?;
            let inst = function.instrs.get(frame.ip).cloned().ok_or_else(|| {
                InternalError::new(format!(
                    "instruction pointer ran past the end of `{}`",
                    function.name
                ))
            })?;
            let line = function.line_info.get(frame.ip).map_or(0, |info| info.line);
            (inst, line)
        };

        match inst {
            Inst::Label { .. } => {}
            Inst::Load { dst, src } => {
                let value = self.read_operand(&src, line)?;
                self.write_temp(dst, value)?;
            }
            Inst::Store { slot, src } => {
                let value = self.read_operand(&src, line)?;
                let frame = self.top_mut()?;
                let cell = frame.slots.get_mut(slot.0 as usize).ok_or_else(|| {
                    InternalError::new(format!("store to missing slot {}", slot.0))
                })?;
                *cell = Some(value);
            }
            Inst::Binary { dst, op, lhs, rhs } => {
                let lhs = self.read_operand(&lhs, line)?;
                let rhs = self.read_operand(&rhs, line)?;
                let value = apply_binary(op, &lhs, &rhs, line)?;
                self.write_temp(dst, value)?;
            }
            Inst::Unary { dst, op, src } => {
                let value = self.read_operand(&src, line)?;
                let value = apply_unary(op, &value, line)?;
                self.write_temp(dst, value)?;
            }
            Inst::Jump { target } => {
                let next = self.jump_target(target)?;
                self.top_mut()?.ip = next;
                return Ok(false);
            }
            Inst::JumpIf { cond, target } => {
                let taken = self.read_operand(&cond, line)?.as_bool(line)?;
                if taken {
                    let next = self.jump_target(target)?;
                    self.top_mut()?.ip = next;
                    return Ok(false);
                }
            }
            Inst::Call { dst, callee, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in &args {
                    values.push(self.read_operand(arg, line)?);
                }
                return self.enter_call(dst, &callee, values, line).map(|()| false);
            }
            Inst::Return { value } => {
                let result = match &value {
                    Some(operand) => self.read_operand(operand, line)?,
                    None => Value::Int(0),
                };
                let finished = self.top_pop()?;
                return match finished.return_dst {
                    Some(dst) => {
                        self.write_temp(dst, result)?;
                        Ok(false)
                    }
                    None => {
                        if let Value::Int(code) = result {
                            self.exit = code;
                        }
                        Ok(true)
                    }
                };
            }
        }
        self.top_mut()?.ip += 1;
        Ok(false)
    }

    fn enter_call(
        &mut self,
        dst: TempId,
        callee: &Callee,
        args: Vec<Value>,
        line: u32,
    ) -> Result<(), RuntimeError> {
        match callee {
            Callee::Builtin(builtin) => {
                let rendered: Vec<String> = args.iter().map(Value::to_string).collect();
                self.output.push_str(&rendered.join(" "));
                if *builtin == Builtin::Println {
                    self.output.push('\n');
                }
                self.write_temp(dst, Value::Int(0))?;
                self.top_mut()?.ip += 1;
                Ok(())
            }
            Callee::Function { index, name } => {
                if self.frames.len() >= self.limits.max_call_depth {
                    return Err(RuntimeError::StackOverflow {
                        limit: self.limits.max_call_depth,
                        line,
                    });
                }
                let target = self.program.function(*index).ok_or_else(|| {
                    InternalError::new(format!("call target `{name}` is out of range"))
                })?;
                let mut slots = vec![None; target.slot_names.len()];
                for (cell, value) in slots.iter_mut().zip(args) {
                    *cell = Some(value);
                }
                let temps = vec![None; target.temp_count];
                // Advance the caller first so the return resumes after the call.
                self.top_mut()?.ip += 1;
                self.frames.push(Frame {
                    function: *index,
                    ip: 0,
                    slots,
                    temps,
                    return_dst: Some(dst),
                });
                Ok(())
            }
        }
    }

    fn read_operand(&self, operand: &Operand, line: u32) -> Result<Value, RuntimeError> {
        match operand {
            Operand::Const(Const::Int(value)) => Ok(Value::Int(*value)),
            Operand::Const(Const::Bool(value)) => Ok(Value::Bool(*value)),
            Operand::Const(Const::Str(value)) => Ok(Value::Str(value.clone())),
            Operand::Temp(temp) => {
                let frame = self.top()?;
                frame
                    .temps
                    .get(temp.0 as usize)
                    .and_then(Clone::clone)
                    .ok_or_else(|| {
                        InternalError::new(format!(
                            "{} read before being written",
                            crate::ir::temp_text(*temp)
                        ))
                        .into()
                    })
            }
            Operand::Slot(slot) => {
                let frame = self.top()?;
                let function = self.function_of(frame)?;
                frame
                    .slots
                    .get(slot.0 as usize)
                    .and_then(Clone::clone)
                    .ok_or_else(|| RuntimeError::UnboundVariable {
                        name: function.slot_name(*slot).to_string(),
                        line,
                    })
            }
        }
    }

    fn write_temp(&mut self, temp: TempId, value: Value) -> Result<(), RuntimeError> {
        let frame = self.top_mut()?;
        let cell = frame
            .temps
            .get_mut(temp.0 as usize)
            .ok_or_else(|| InternalError::new(format!("write to missing temp {}", temp.0)))?;
        *cell = Some(value);
        Ok(())
    }

    fn jump_target(&self, label: LabelId) -> Result<usize, RuntimeError> {
        let frame = self.top()?;
        let function = self.function_of(frame)?;
        function
            .label_target(label)
            .ok_or_else(|| {
                InternalError::new(format!("jump to unbound label in `{}`", function.name)).into()
            })
    }

    fn function_of(&self, frame: &Frame) -> Result<&'ir FunctionIr, RuntimeError> {
        self.program
            .function(frame.function)
            .ok_or_else(|| InternalError::new("frame references a missing function").into())
    }

    fn top(&self) -> Result<&Frame, RuntimeError> {
        self.frames
            .last()
            .ok_or_else(|| InternalError::new("no active frame").into())
    }

    fn top_mut(&mut self) -> Result<&mut Frame, RuntimeError> {
        self.frames
            .last_mut()
            .ok_or_else(|| InternalError::new("no active frame").into())
    }

    fn top_pop(&mut self) -> Result<Frame, RuntimeError> {
        self.frames
            .pop()
            .ok_or_else(|| InternalError::new("no active frame").into())
    }

    fn depth(&self) -> usize {
        self.frames.len()
    }

    /// True when the next instruction to execute opens a source statement.
    fn at_statement_boundary(&self) -> bool {
        let Some(frame) = self.frames.last() else {
            return false;
        };
        self.program
            .function(frame.function)
            .and_then(|function| function.line_info.get(frame.ip))
            .is_some_and(|info| info.stmt_start)
    }

    fn current_line(&self) -> u32 {
        let Some(frame) = self.frames.last() else {
            return 0;
        };
        self.program
            .function(frame.function)
            .and_then(|function| function.line_info.get(frame.ip))
            .map_or(0, |info| info.line)
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{Limits, ir, lexer, parser, sema};

    fn lower_source(source: &str) -> ir::ProgramIr {
        let (tokens, lex_errors) = lexer::tokenize(source);
        assert!(lex_errors.is_empty(), "lex errors: {lex_errors:?}");
        let (program, parse_errors) = parser::parse(tokens, &Limits::default());
        assert!(parse_errors.is_empty(), "parse errors: {parse_errors:?}");
        let analysis = sema::analyze(&program);
        assert!(!analysis.has_errors(), "sema errors: {:?}", analysis.errors);
        ir::lower(&program, &analysis).expect("lowering failed")
    }

    fn run_source(source: &str) -> Result<Outcome, RuntimeError> {
        let program_ir = lower_source(source);
        Machine::new(&program_ir, &Limits::default()).run()
    }

    #[test]
    fn precedence_multiplies_before_adding() {
        let outcome = run_source("fn main() -> int { return 2 + 3 * 4; }").unwrap();
        assert_eq!(outcome.exit, 14);
        assert_eq!(outcome.output, "");
    }

    #[test]
    fn division_floors_toward_negative_infinity() {
        let outcome = run_source("fn main() -> int { return (0 - 7) / 2; }").unwrap();
        assert_eq!(outcome.exit, -4);
    }

    #[test]
    fn division_by_zero_halts_with_the_line() {
        let program_ir = lower_source(indoc! {"
            fn main() -> int {
                let zero: int = 0;
                return 1 / zero;
            }
        "});
        let err = Machine::new(&program_ir, &Limits::default())
            .run()
            .unwrap_err();
        assert_eq!(err, RuntimeError::DivisionByZero { line: 3 });
    }

    #[test]
    fn while_loop_runs_to_fixpoint() {
        let outcome = run_source(indoc! {"
            fn main() -> int {
                let x: int = 1;
                while (x < 3) {
                    x = x + 1;
                }
                return x;
            }
        "})
        .unwrap();
        assert_eq!(outcome.exit, 3);
    }

    #[test]
    fn builtins_append_to_output() {
        let outcome = run_source(indoc! {r#"
            fn main() -> int {
                print("a", 1);
                println("b");
                println(true);
                return 0;
            }
        "#})
        .unwrap();
        assert_eq!(outcome.output, "a 1b\ntrue\n");
    }

    #[test]
    fn calls_pass_arguments_and_return_values() {
        let outcome = run_source(indoc! {"
            fn double(n: int) -> int {
                return n * 2;
            }

            fn main() -> int {
                return double(double(5));
            }
        "})
        .unwrap();
        assert_eq!(outcome.exit, 20);
    }

    #[test]
    fn short_circuit_skips_the_right_operand() {
        // The right operand would divide by zero if evaluated.
        let outcome = run_source(indoc! {"
            fn boom() -> bool {
                let zero: int = 0;
                return 1 / zero == 0;
            }

            fn main() -> int {
                if (false && boom()) {
                    return 1;
                }
                if (true || boom()) {
                    return 2;
                }
                return 3;
            }
        "})
        .unwrap();
        assert_eq!(outcome.exit, 2);
    }

    #[test]
    fn runaway_recursion_overflows_at_the_limit() {
        let program_ir = lower_source(indoc! {"
            fn spin() -> int {
                return spin();
            }

            fn main() -> int {
                return spin();
            }
        "});
        let limits = Limits {
            max_call_depth: 16,
            ..Limits::default()
        };
        let err = Machine::new(&program_ir, &limits).run().unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::StackOverflow { limit: 16, .. }
        ));
    }

    #[test]
    fn bare_return_exits_with_zero() {
        let outcome = run_source("fn main() -> int { return; }").unwrap();
        assert_eq!(outcome.exit, 0);
    }

    #[test]
    fn falling_off_main_exits_with_zero() {
        let outcome = run_source(indoc! {r#"
            fn main() -> int {
                println("done");
            }
        "#})
        .unwrap();
        assert_eq!(outcome.exit, 0);
        assert_eq!(outcome.output, "done\n");
    }

    #[test]
    fn termination_is_an_absorbing_state() {
        let program_ir = lower_source("fn main() -> int { return 7; }");
        let mut machine = Machine::new(&program_ir, &Limits::default());
        machine.start().unwrap();
        while !machine.advance().unwrap() {}
        assert_eq!(machine.state(), State::Terminated);
        assert_eq!(machine.exit_code(), 7);
    }
}
