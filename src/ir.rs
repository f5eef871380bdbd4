//! Three-address intermediate representation and AST lowering.
//!
//! Each function lowers to a flat instruction list. Every intermediate value
//! lands in a fresh temporary; variables live in frame slots assigned by the
//! analyzer, so shadowed names never collide. Control flow is explicit:
//! labels plus single-target conditional jumps whose false path is always
//! the fallthrough. Logical `&&`/`||` lower to branches, so the right
//! operand stays unevaluated whenever the left one decides the result.

use rustc_hash::FxHashMap;

use crate::ast::{
    Assign, BinOp, Binary, Block, Call, Expr, FunctionDecl, If, Literal, LiteralValue, NodeId,
    Program, Return, Stmt, UnOp, Unary, VarDecl, While,
};
use crate::diagnostics::InternalError;
use crate::sema::{Analysis, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int(i64),
    Bool(bool),
    Str(String),
}

impl std::fmt::Display for Const {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Const::Int(value) => write!(f, "{value}"),
            Const::Bool(value) => write!(f, "{value}"),
            Const::Str(value) => write!(f, "{value:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Temp(TempId),
    Slot(SlotId),
    Const(Const),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Lt => "lt",
            BinaryOp::Gt => "gt",
            BinaryOp::Le => "le",
            BinaryOp::Ge => "ge",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Not => "lnot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Print,
    Println,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Builtin> {
        match name {
            "print" => Some(Builtin::Print),
            "println" => Some(Builtin::Println),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Println => "println",
        }
    }
}

/// Call target, resolved at lowering time so the machine never looks a
/// function up by name. The name rides along for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Function { index: usize, name: String },
    Builtin(Builtin),
}

impl Callee {
    pub fn name(&self) -> &str {
        match self {
            Callee::Function { name, .. } => name,
            Callee::Builtin(builtin) => builtin.name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Load {
        dst: TempId,
        src: Operand,
    },
    Store {
        slot: SlotId,
        src: Operand,
    },
    Binary {
        dst: TempId,
        op: BinaryOp,
        lhs: Operand,
        rhs: Operand,
    },
    Unary {
        dst: TempId,
        op: UnaryOp,
        src: Operand,
    },
    Call {
        dst: TempId,
        callee: Callee,
        args: Vec<Operand>,
    },
    Jump {
        target: LabelId,
    },
    JumpIf {
        cond: Operand,
        target: LabelId,
    },
    Label {
        label: LabelId,
    },
    Return {
        value: Option<Operand>,
    },
}

/// Source attribution for one instruction. `stmt_start` marks the first
/// instruction lowered for a statement, including each re-evaluation of a
/// loop condition; those are the only pause points the machine honours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInfo {
    pub line: u32,
    pub stmt_start: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionIr {
    pub name: String,
    pub param_count: usize,
    /// Slot index -> variable name, in declaration order.
    pub slot_names: Vec<String>,
    pub temp_count: usize,
    pub instrs: Vec<Inst>,
    /// Parallel to `instrs`.
    pub line_info: Vec<LineInfo>,
    /// Label id -> index of its Label instruction.
    pub labels: Vec<usize>,
}

impl FunctionIr {
    pub fn label_target(&self, label: LabelId) -> Option<usize> {
        self.labels.get(label.0 as usize).copied()
    }

    pub fn slot_name(&self, slot: SlotId) -> &str {
        self.slot_names
            .get(slot.0 as usize)
            .map(String::as_str)
            .unwrap_or("?")
    }

    pub fn operand_text(&self, operand: &Operand) -> String {
        match operand {
            Operand::Temp(temp) => temp_text(*temp),
            Operand::Slot(slot) => self.slot_name(*slot).to_string(),
            Operand::Const(value) => value.to_string(),
        }
    }

    pub fn inst_text(&self, inst: &Inst) -> String {
        match inst {
            Inst::Load { dst, src } => {
                format!("{} = load {}", temp_text(*dst), self.operand_text(src))
            }
            Inst::Store { slot, src } => {
                format!("store {}, {}", self.slot_name(*slot), self.operand_text(src))
            }
            Inst::Binary { dst, op, lhs, rhs } => format!(
                "{} = {} {}, {}",
                temp_text(*dst),
                op.mnemonic(),
                self.operand_text(lhs),
                self.operand_text(rhs)
            ),
            Inst::Unary { dst, op, src } => format!(
                "{} = {} {}",
                temp_text(*dst),
                op.mnemonic(),
                self.operand_text(src)
            ),
            Inst::Call { dst, callee, args } => {
                let mut text = format!("{} = call {}", temp_text(*dst), callee.name());
                for arg in args {
                    text.push_str(", ");
                    text.push_str(&self.operand_text(arg));
                }
                text
            }
            Inst::Jump { target } => format!("jump {}", label_text(*target)),
            Inst::JumpIf { cond, target } => format!(
                "jumpif {}, {}",
                self.operand_text(cond),
                label_text(*target)
            ),
            Inst::Label { label } => format!("{}:", label_text(*label)),
            Inst::Return { value } => match value {
                Some(operand) => format!("return {}", self.operand_text(operand)),
                None => "return".to_string(),
            },
        }
    }

}

pub fn temp_text(temp: TempId) -> String {
    format!("t{}", temp.0 + 1)
}

pub fn label_text(label: LabelId) -> String {
    format!("L{}", label.0 + 1)
}

impl std::fmt::Display for FunctionIr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "func {}()", self.name)?;
        for inst in &self.instrs {
            match inst {
                Inst::Label { .. } => writeln!(f, "{}", self.inst_text(inst))?,
                _ => writeln!(f, "  {}", self.inst_text(inst))?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramIr {
    /// In declaration order; `Callee::Function` indexes into this.
    pub functions: Vec<FunctionIr>,
    pub entry_points: FxHashMap<String, usize>,
    /// Index of `main`.
    pub main: usize,
}

impl ProgramIr {
    pub fn function(&self, index: usize) -> Option<&FunctionIr> {
        self.functions.get(index)
    }
}

impl std::fmt::Display for ProgramIr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, function) in self.functions.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{function}")?;
        }
        Ok(())
    }
}

/// Lower an analyzed program. The analysis must be error-free; lowering an
/// analysis that still holds errors is a caller bug, not a user error.
pub fn lower(program: &Program, analysis: &Analysis) -> Result<ProgramIr, InternalError> {
    if analysis.has_errors() {
        return Err(InternalError::new(
            "lowering requires an error-free analysis",
        ));
    }
    let mut entry_points = FxHashMap::default();
    for (index, decl) in program.functions.iter().enumerate() {
        entry_points.insert(decl.name.clone(), index);
    }
    let mut functions = Vec::with_capacity(program.functions.len());
    for decl in &program.functions {
        let lowerer = FunctionLowerer::new(analysis, &entry_points);
        functions.push(lowerer.lower_function(decl)?);
    }
    let main = entry_points
        .get("main")
        .copied()
        .ok_or_else(|| InternalError::new("entry function missing after analysis"))?;
    Ok(ProgramIr {
        functions,
        entry_points,
        main,
    })
}

struct FunctionLowerer<'a> {
    analysis: &'a Analysis,
    function_indexes: &'a FxHashMap<String, usize>,
    instrs: Vec<Inst>,
    line_info: Vec<LineInfo>,
    labels: Vec<Option<usize>>,
    temp_count: u32,
    pending_stmt: Option<u32>,
    last_line: u32,
}

impl<'a> FunctionLowerer<'a> {
    fn new(analysis: &'a Analysis, function_indexes: &'a FxHashMap<String, usize>) -> Self {
        Self {
            analysis,
            function_indexes,
            instrs: Vec::new(),
            line_info: Vec::new(),
            labels: Vec::new(),
            temp_count: 0,
            pending_stmt: None,
            last_line: 1,
        }
    }

    fn lower_function(mut self, decl: &FunctionDecl) -> Result<FunctionIr, InternalError> {
        let info = self
            .analysis
            .functions
            .get(&decl.name)
            .ok_or_else(|| InternalError::new(format!("no signature for `{}`", decl.name)))?;
        let slot_names: Vec<String> = info.slots.iter().map(|slot| slot.name.clone()).collect();
        self.last_line = decl.span.start_line;
        self.lower_block(&decl.body)?;
        if !matches!(self.instrs.last(), Some(Inst::Return { .. })) {
            // Falling off the end of a body yields int 0.
            self.emit(Inst::Return { value: None });
        }
        let mut labels = Vec::with_capacity(self.labels.len());
        for (index, target) in self.labels.iter().enumerate() {
            let target = target.ok_or_else(|| {
                InternalError::new(format!("label L{} never bound", index + 1))
            })?;
            labels.push(target);
        }
        Ok(FunctionIr {
            name: decl.name.clone(),
            param_count: decl.params.len(),
            slot_names,
            temp_count: self.temp_count as usize,
            instrs: self.instrs,
            line_info: self.line_info,
            labels,
        })
    }

    fn lower_block(&mut self, block: &Block) -> Result<(), InternalError> {
        for stmt in &block.statements {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), InternalError> {
        match stmt {
            Stmt::VarDecl(decl) => self.lower_var_decl(decl),
            Stmt::Assign(assign) => self.lower_assign(assign),
            Stmt::If(stmt) => self.lower_if(stmt),
            Stmt::While(stmt) => self.lower_while(stmt),
            Stmt::Return(stmt) => self.lower_return(stmt),
            Stmt::Block(block) => self.lower_block(block),
            Stmt::Expr(expr) => {
                self.mark_stmt(expr.span().start_line);
                self.lower_expr(expr)?;
                Ok(())
            }
        }
    }

    fn lower_var_decl(&mut self, decl: &VarDecl) -> Result<(), InternalError> {
        self.mark_stmt(decl.span.start_line);
        let slot = self.slot_of(decl.id)?;
        let src = match &decl.init {
            Some(init) => self.lower_expr(init)?,
            None => Operand::Const(self.default_const(decl.id)?),
        };
        self.emit(Inst::Store { slot, src });
        Ok(())
    }

    fn lower_assign(&mut self, assign: &Assign) -> Result<(), InternalError> {
        self.mark_stmt(assign.span.start_line);
        let src = self.lower_expr(&assign.value)?;
        let slot = self.slot_of(assign.id)?;
        self.emit(Inst::Store { slot, src });
        Ok(())
    }

    fn lower_if(&mut self, stmt: &If) -> Result<(), InternalError> {
        self.mark_stmt(stmt.span.start_line);
        let cond = self.lower_expr(&stmt.cond)?;
        let l_then = self.new_label();
        let l_end = self.new_label();
        self.emit(Inst::JumpIf {
            cond,
            target: l_then,
        });
        // False path falls through: the else block (or nothing) sits right
        // after the branch, the then block behind its label.
        if let Some(else_block) = &stmt.else_block {
            self.lower_block(else_block)?;
        }
        self.emit(Inst::Jump { target: l_end });
        self.bind_label(l_then);
        self.lower_block(&stmt.then_block)?;
        self.bind_label(l_end);
        Ok(())
    }

    fn lower_while(&mut self, stmt: &While) -> Result<(), InternalError> {
        let l_head = self.new_label();
        let l_body = self.new_label();
        let l_end = self.new_label();
        // The head label is the statement boundary, so every loop iteration
        // re-arrives at a pause point before the condition runs.
        self.mark_stmt(stmt.span.start_line);
        self.bind_label(l_head);
        let cond = self.lower_expr(&stmt.cond)?;
        self.emit(Inst::JumpIf {
            cond,
            target: l_body,
        });
        self.emit(Inst::Jump { target: l_end });
        self.bind_label(l_body);
        self.lower_block(&stmt.body)?;
        self.emit(Inst::Jump { target: l_head });
        self.bind_label(l_end);
        Ok(())
    }

    fn lower_return(&mut self, stmt: &Return) -> Result<(), InternalError> {
        self.mark_stmt(stmt.span.start_line);
        let value = match &stmt.value {
            Some(expr) => Some(self.lower_expr(expr)?),
            None => None,
        };
        self.emit(Inst::Return { value });
        Ok(())
    }

    fn lower_expr(&mut self, expr: &Expr) -> Result<Operand, InternalError> {
        match expr {
            Expr::Literal(Literal { value, .. }) => {
                let dst = self.new_temp();
                let src = Operand::Const(match value {
                    LiteralValue::Int(value) => Const::Int(*value),
                    LiteralValue::Bool(value) => Const::Bool(*value),
                    LiteralValue::Str(value) => Const::Str(value.clone()),
                });
                self.emit(Inst::Load { dst, src });
                Ok(Operand::Temp(dst))
            }
            Expr::Identifier(identifier) => {
                let slot = self.slot_of(identifier.id)?;
                let dst = self.new_temp();
                self.emit(Inst::Load {
                    dst,
                    src: Operand::Slot(slot),
                });
                Ok(Operand::Temp(dst))
            }
            Expr::Unary(unary) => self.lower_unary(unary),
            Expr::Binary(binary) => self.lower_binary(binary),
            Expr::Call(call) => self.lower_call(call),
        }
    }

    fn lower_unary(&mut self, unary: &Unary) -> Result<Operand, InternalError> {
        let src = self.lower_expr(&unary.operand)?;
        let dst = self.new_temp();
        let op = match unary.op {
            UnOp::Neg => UnaryOp::Neg,
            UnOp::Not => UnaryOp::Not,
        };
        self.emit(Inst::Unary { dst, op, src });
        Ok(Operand::Temp(dst))
    }

    fn lower_binary(&mut self, binary: &Binary) -> Result<Operand, InternalError> {
        let op = match binary.op {
            BinOp::And => return self.lower_and(binary),
            BinOp::Or => return self.lower_or(binary),
            BinOp::Add => BinaryOp::Add,
            BinOp::Sub => BinaryOp::Sub,
            BinOp::Mul => BinaryOp::Mul,
            BinOp::Div => BinaryOp::Div,
            BinOp::Lt => BinaryOp::Lt,
            BinOp::Gt => BinaryOp::Gt,
            BinOp::Le => BinaryOp::Le,
            BinOp::Ge => BinaryOp::Ge,
            BinOp::Eq => BinaryOp::Eq,
            BinOp::Ne => BinaryOp::Ne,
        };
        let lhs = self.lower_expr(&binary.lhs)?;
        let rhs = self.lower_expr(&binary.rhs)?;
        let dst = self.new_temp();
        self.emit(Inst::Binary { dst, op, lhs, rhs });
        Ok(Operand::Temp(dst))
    }

    fn lower_and(&mut self, binary: &Binary) -> Result<Operand, InternalError> {
        let lhs = self.lower_expr(&binary.lhs)?;
        let l_rhs = self.new_label();
        let l_end = self.new_label();
        let dst = self.new_temp();
        self.emit(Inst::JumpIf {
            cond: lhs,
            target: l_rhs,
        });
        self.emit(Inst::Load {
            dst,
            src: Operand::Const(Const::Bool(false)),
        });
        self.emit(Inst::Jump { target: l_end });
        self.bind_label(l_rhs);
        let rhs = self.lower_expr(&binary.rhs)?;
        self.emit(Inst::Load { dst, src: rhs });
        self.bind_label(l_end);
        Ok(Operand::Temp(dst))
    }

    fn lower_or(&mut self, binary: &Binary) -> Result<Operand, InternalError> {
        let lhs = self.lower_expr(&binary.lhs)?;
        let l_true = self.new_label();
        let l_end = self.new_label();
        let dst = self.new_temp();
        self.emit(Inst::JumpIf {
            cond: lhs,
            target: l_true,
        });
        let rhs = self.lower_expr(&binary.rhs)?;
        self.emit(Inst::Load { dst, src: rhs });
        self.emit(Inst::Jump { target: l_end });
        self.bind_label(l_true);
        self.emit(Inst::Load {
            dst,
            src: Operand::Const(Const::Bool(true)),
        });
        self.bind_label(l_end);
        Ok(Operand::Temp(dst))
    }

    fn lower_call(&mut self, call: &Call) -> Result<Operand, InternalError> {
        let callee = match Builtin::from_name(&call.callee) {
            Some(builtin) => Callee::Builtin(builtin),
            None => {
                let index = self.function_indexes.get(&call.callee).ok_or_else(|| {
                    InternalError::new(format!("call to unknown function `{}`", call.callee))
                })?;
                Callee::Function {
                    index: *index,
                    name: call.callee.clone(),
                }
            }
        };
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(self.lower_expr(arg)?);
        }
        let dst = self.new_temp();
        self.emit(Inst::Call { dst, callee, args });
        Ok(Operand::Temp(dst))
    }

    fn default_const(&self, node: NodeId) -> Result<Const, InternalError> {
        let symbol_id = self
            .analysis
            .resolution(node)
            .ok_or_else(|| InternalError::new("declaration missing a resolved symbol"))?;
        match self.analysis.symbol(symbol_id).ty {
            Type::Int => Ok(Const::Int(0)),
            Type::Bool => Ok(Const::Bool(false)),
            Type::Str => Ok(Const::Str(String::new())),
            other => Err(InternalError::new(format!(
                "variable declared with non-storable type {other}"
            ))),
        }
    }

    fn slot_of(&self, node: NodeId) -> Result<SlotId, InternalError> {
        let symbol_id = self
            .analysis
            .resolution(node)
            .ok_or_else(|| InternalError::new("name missing a resolved symbol"))?;
        let symbol = self.analysis.symbol(symbol_id);
        let slot = symbol
            .slot
            .ok_or_else(|| InternalError::new(format!("symbol `{}` has no frame slot", symbol.name)))?;
        Ok(SlotId(slot))
    }

    fn mark_stmt(&mut self, line: u32) {
        self.pending_stmt = Some(line);
    }

    fn emit(&mut self, inst: Inst) {
        let info = match self.pending_stmt.take() {
            Some(line) => {
                self.last_line = line;
                LineInfo {
                    line,
                    stmt_start: true,
                }
            }
            None => LineInfo {
                line: self.last_line,
                stmt_start: false,
            },
        };
        self.instrs.push(inst);
        self.line_info.push(info);
    }

    fn new_temp(&mut self) -> TempId {
        let temp = TempId(self.temp_count);
        self.temp_count += 1;
        temp
    }

    fn new_label(&mut self) -> LabelId {
        let label = LabelId(self.labels.len() as u32);
        self.labels.push(None);
        label
    }

    fn bind_label(&mut self, label: LabelId) {
        self.labels[label.0 as usize] = Some(self.instrs.len());
        self.emit(Inst::Label { label });
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{Limits, lexer, parser, sema};

    fn lower_source(source: &str) -> ProgramIr {
        let (tokens, lex_errors) = lexer::tokenize(source);
        assert!(lex_errors.is_empty(), "lex errors: {lex_errors:?}");
        let (program, parse_errors) = parser::parse(tokens, &Limits::default());
        assert!(parse_errors.is_empty(), "parse errors: {parse_errors:?}");
        let analysis = sema::analyze(&program);
        assert!(!analysis.has_errors(), "sema errors: {:?}", analysis.errors);
        lower(&program, &analysis).expect("lowering failed")
    }

    fn temp(id: u32) -> Operand {
        Operand::Temp(TempId(id))
    }

    fn load_const(dst: u32, value: Const) -> Inst {
        Inst::Load {
            dst: TempId(dst),
            src: Operand::Const(value),
        }
    }

    #[test]
    fn literals_materialize_into_fresh_temps() {
        let ir = lower_source("fn main() -> int { return 2 + 3 * 4; }");
        let main = &ir.functions[ir.main];
        let expected = vec![
            load_const(0, Const::Int(2)),
            load_const(1, Const::Int(3)),
            load_const(2, Const::Int(4)),
            Inst::Binary {
                dst: TempId(3),
                op: BinaryOp::Mul,
                lhs: temp(1),
                rhs: temp(2),
            },
            Inst::Binary {
                dst: TempId(4),
                op: BinaryOp::Add,
                lhs: temp(0),
                rhs: temp(3),
            },
            Inst::Return {
                value: Some(temp(4)),
            },
        ];
        assert_eq!(main.instrs, expected);
        assert_eq!(main.temp_count, 5);
    }

    #[test]
    fn if_else_falls_through_to_else_block() {
        let ir = lower_source(indoc! {"
            fn main() -> int {
                let x: int = 0;
                if (x == 0) {
                    x = 1;
                } else {
                    x = 2;
                }
                return x;
            }
        "});
        let main = &ir.functions[ir.main];
        let jumpif = main
            .instrs
            .iter()
            .position(|inst| matches!(inst, Inst::JumpIf { .. }))
            .expect("no conditional jump");
        // The instruction after the branch begins the else block.
        assert!(matches!(
            &main.instrs[jumpif + 1],
            Inst::Load {
                src: Operand::Const(Const::Int(2)),
                ..
            }
        ));
    }

    #[test]
    fn while_re_arrives_at_head_label() {
        let ir = lower_source(indoc! {"
            fn main() -> int {
                let x: int = 1;
                while (x < 3) {
                    x = x + 1;
                }
                return x;
            }
        "});
        let main = &ir.functions[ir.main];
        let head = main
            .instrs
            .iter()
            .position(|inst| matches!(inst, Inst::Label { .. }))
            .expect("no head label");
        assert!(main.line_info[head].stmt_start);
        assert_eq!(main.line_info[head].line, 3);
        let head_label = match &main.instrs[head] {
            Inst::Label { label } => *label,
            _ => unreachable!(),
        };
        // The loop body closes with a jump back to the head.
        assert!(
            main.instrs
                .iter()
                .any(|inst| matches!(inst, Inst::Jump { target } if *target == head_label))
        );
        // One statement boundary each: let, loop head, body assign, return.
        let stmt_starts = main.line_info.iter().filter(|info| info.stmt_start).count();
        assert_eq!(stmt_starts, 4);
    }

    #[test]
    fn logical_and_short_circuits_through_branches() {
        let ir = lower_source(indoc! {"
            fn main() -> int {
                let a: bool = false;
                let b: bool = true;
                if (a && b) {
                    return 1;
                }
                return 0;
            }
        "});
        let main = &ir.functions[ir.main];
        let jumpif = main
            .instrs
            .iter()
            .position(|inst| matches!(inst, Inst::JumpIf { .. }))
            .expect("no branch for &&");
        assert!(matches!(
            &main.instrs[jumpif + 1],
            Inst::Load {
                src: Operand::Const(Const::Bool(false)),
                ..
            }
        ));
        assert!(matches!(&main.instrs[jumpif + 2], Inst::Jump { .. }));
    }

    #[test]
    fn function_without_trailing_return_gets_synthetic_one() {
        let ir = lower_source(indoc! {"
            fn main() -> int {
                println(\"done\");
            }
        "});
        let main = &ir.functions[ir.main];
        assert!(matches!(main.instrs.last(), Some(Inst::Return { value: None })));
    }

    #[test]
    fn uninitialized_variables_get_typed_defaults() {
        let ir = lower_source(indoc! {"
            fn main() -> int {
                let i: int;
                let b: bool;
                let s: string;
                return i;
            }
        "});
        let main = &ir.functions[ir.main];
        let stores: Vec<&Inst> = main
            .instrs
            .iter()
            .filter(|inst| matches!(inst, Inst::Store { .. }))
            .collect();
        assert_eq!(stores.len(), 3);
        assert!(matches!(
            stores[0],
            Inst::Store {
                src: Operand::Const(Const::Int(0)),
                ..
            }
        ));
        assert!(matches!(
            stores[1],
            Inst::Store {
                src: Operand::Const(Const::Bool(false)),
                ..
            }
        ));
        assert!(matches!(
            stores[2],
            Inst::Store {
                src: Operand::Const(Const::Str(_)),
                ..
            }
        ));
    }

    #[test]
    fn temps_are_not_reassigned() {
        let ir = lower_source(indoc! {"
            fn main() -> int {
                let x: int = 2 + 3;
                let y: int = x * x;
                print(x, y);
                return y - x;
            }
        "});
        let main = &ir.functions[ir.main];
        let mut seen = Vec::new();
        for inst in &main.instrs {
            let dst = match inst {
                Inst::Load { dst, .. }
                | Inst::Binary { dst, .. }
                | Inst::Unary { dst, .. }
                | Inst::Call { dst, .. } => Some(*dst),
                _ => None,
            };
            if let Some(dst) = dst {
                assert!(!seen.contains(&dst), "temp {dst:?} written twice");
                seen.push(dst);
            }
        }
    }

    #[test]
    fn calls_resolve_to_declaration_indexes() {
        let ir = lower_source(indoc! {"
            fn double(n: int) -> int {
                return n * 2;
            }
            fn main() -> int {
                return double(21);
            }
        "});
        assert_eq!(ir.entry_points["double"], 0);
        assert_eq!(ir.entry_points["main"], 1);
        assert_eq!(ir.main, 1);
        let main = &ir.functions[1];
        assert!(main.instrs.iter().any(|inst| matches!(
            inst,
            Inst::Call {
                callee: Callee::Function { index: 0, .. },
                ..
            }
        )));
    }

    #[test]
    fn lowering_rejects_erroneous_analysis() {
        let (tokens, _) = lexer::tokenize("fn main() -> int { x = x + 1; return 0; }");
        let (program, _) = parser::parse(tokens, &Limits::default());
        let analysis = sema::analyze(&program);
        assert!(analysis.has_errors());
        assert!(lower(&program, &analysis).is_err());
    }

    #[test]
    fn pretty_text_matches_golden_form() {
        let ir = lower_source("fn main() -> int { return 2 + 3 * 4; }");
        let main = &ir.functions[ir.main];
        let expected = indoc! {"
            func main()
              t1 = load 2
              t2 = load 3
              t3 = load 4
              t4 = mul t2, t3
              t5 = add t1, t4
              return t5
        "};
        assert_eq!(main.to_string(), expected);
    }
}
