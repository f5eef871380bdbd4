//! Serializable boundary shapes.
//!
//! Everything a UI, visualizer, or foreign-language backend sees crosses
//! through these structs, serialized with `serde_json`. Span keys are
//! camelCase; kind strings are lowercase. `Diagnostic` already serializes
//! in its wire shape and needs no wrapper here.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::ast::{
    Block, Expr, FunctionDecl, Literal, LiteralValue, Param, Program, Stmt,
};
use crate::cfg::{Cfg, EdgeKind};
use crate::ir::{self, FunctionIr, Inst};
use crate::token::{Span, Token, TokenCategory};
use crate::vm::{DebugEvent, DebugEventKind, FrameSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenExchange {
    pub kind: TokenCategory,
    pub lexeme: String,
    pub line: u32,
    pub col: u32,
}

pub fn tokens(tokens: &[Token<'_>]) -> Vec<TokenExchange> {
    tokens
        .iter()
        .map(|token| TokenExchange {
            kind: token.kind.category(),
            lexeme: token.lexeme.to_string(),
            line: token.line(),
            col: token.column(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanExchange {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl From<Span> for SpanExchange {
    fn from(span: Span) -> Self {
        SpanExchange {
            start_line: span.start_line,
            start_col: span.start_col,
            end_line: span.end_line,
            end_col: span.end_col,
        }
    }
}

/// Generic AST tree: every node is `{kind, span, attributes, children}` so
/// consumers can render it without knowing the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AstNode {
    pub kind: &'static str,
    pub span: SpanExchange,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<AstNode>,
}

impl AstNode {
    fn new(kind: &'static str, span: Span) -> Self {
        AstNode {
            kind,
            span: span.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    fn attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

pub fn program(program: &Program) -> AstNode {
    let mut node = AstNode::new("Program", program.span);
    node.children = program.functions.iter().map(function).collect();
    node
}

fn function(decl: &FunctionDecl) -> AstNode {
    let mut node = AstNode::new("Function", decl.span)
        .attr("name", &decl.name)
        .attr("returnType", &decl.ret_type.name);
    node.children = decl.params.iter().map(param).collect();
    node.children.push(block(&decl.body));
    node
}

fn param(param: &Param) -> AstNode {
    AstNode::new("Param", param.span)
        .attr("name", &param.name)
        .attr("type", &param.ty.name)
}

fn block(body: &Block) -> AstNode {
    let mut node = AstNode::new("Block", body.span);
    node.children = body.statements.iter().map(statement).collect();
    node
}

fn statement(stmt: &Stmt) -> AstNode {
    match stmt {
        Stmt::VarDecl(decl) => {
            let mut node = AstNode::new("VarDecl", decl.span)
                .attr("name", &decl.name)
                .attr("type", &decl.ty.name);
            if let Some(init) = &decl.init {
                node.children.push(expression(init));
            }
            node
        }
        Stmt::Assign(assign) => {
            let mut node = AstNode::new("Assign", assign.span).attr("name", &assign.name);
            node.children.push(expression(&assign.value));
            node
        }
        Stmt::If(branch) => {
            let mut node = AstNode::new("If", branch.span);
            node.children.push(expression(&branch.cond));
            node.children.push(block(&branch.then_block));
            if let Some(else_block) = &branch.else_block {
                node.children.push(block(else_block));
            }
            node
        }
        Stmt::While(repeat) => {
            let mut node = AstNode::new("While", repeat.span);
            node.children.push(expression(&repeat.cond));
            node.children.push(block(&repeat.body));
            node
        }
        Stmt::Return(ret) => {
            let mut node = AstNode::new("Return", ret.span);
            if let Some(value) = &ret.value {
                node.children.push(expression(value));
            }
            node
        }
        Stmt::Block(body) => block(body),
        Stmt::Expr(expr) => {
            let mut node = AstNode::new("ExprStmt", expr.span());
            node.children.push(expression(expr));
            node
        }
    }
}

fn expression(expr: &Expr) -> AstNode {
    match expr {
        Expr::Literal(literal) => literal_node(literal),
        Expr::Identifier(ident) => AstNode::new("Identifier", ident.span).attr("name", &ident.name),
        Expr::Unary(unary) => {
            let mut node = AstNode::new("Unary", unary.span).attr("op", unary.op.symbol());
            node.children.push(expression(&unary.operand));
            node
        }
        Expr::Binary(binary) => {
            let mut node = AstNode::new("Binary", binary.span).attr("op", binary.op.symbol());
            node.children.push(expression(&binary.lhs));
            node.children.push(expression(&binary.rhs));
            node
        }
        Expr::Call(call) => {
            let mut node = AstNode::new("Call", call.span).attr("callee", &call.callee);
            node.children = call.args.iter().map(expression).collect();
            node
        }
    }
}

fn literal_node(literal: &Literal) -> AstNode {
    let (ty, value) = match &literal.value {
        LiteralValue::Int(value) => ("int", value.to_string()),
        LiteralValue::Bool(value) => ("bool", value.to_string()),
        LiteralValue::Str(value) => ("string", value.clone()),
    };
    AstNode::new("Literal", literal.span)
        .attr("type", ty)
        .attr("value", value)
}

/// One lowered instruction: `{op, args, result?, label?}` with operands in
/// their printed form (`t1`, `x`, `"lit"`, `L2`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IrInstruction {
    pub op: &'static str,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

pub fn instructions(function: &FunctionIr) -> Vec<IrInstruction> {
    function
        .instrs
        .iter()
        .map(|inst| instruction(function, inst))
        .collect()
}

fn instruction(function: &FunctionIr, inst: &Inst) -> IrInstruction {
    let operand = |op| function.operand_text(op);
    match inst {
        Inst::Load { dst, src } => IrInstruction {
            op: "load",
            args: vec![operand(src)],
            result: Some(ir::temp_text(*dst)),
            label: None,
        },
        Inst::Store { slot, src } => IrInstruction {
            op: "store",
            args: vec![function.slot_name(*slot).to_string(), operand(src)],
            result: None,
            label: None,
        },
        Inst::Binary { dst, op, lhs, rhs } => IrInstruction {
            op: op.mnemonic(),
            args: vec![operand(lhs), operand(rhs)],
            result: Some(ir::temp_text(*dst)),
            label: None,
        },
        Inst::Unary { dst, op, src } => IrInstruction {
            op: op.mnemonic(),
            args: vec![operand(src)],
            result: Some(ir::temp_text(*dst)),
            label: None,
        },
        Inst::Call { dst, callee, args } => {
            let mut rendered = vec![callee.name().to_string()];
            rendered.extend(args.iter().map(operand));
            IrInstruction {
                op: "call",
                args: rendered,
                result: Some(ir::temp_text(*dst)),
                label: None,
            }
        }
        Inst::Jump { target } => IrInstruction {
            op: "jump",
            args: vec![ir::label_text(*target)],
            result: None,
            label: None,
        },
        Inst::JumpIf { cond, target } => IrInstruction {
            op: "jumpif",
            args: vec![operand(cond), ir::label_text(*target)],
            result: None,
            label: None,
        },
        Inst::Label { label } => IrInstruction {
            op: "label",
            args: Vec::new(),
            result: None,
            label: Some(ir::label_text(*label)),
        },
        Inst::Return { value } => IrInstruction {
            op: "return",
            args: value.as_ref().map(operand).into_iter().collect(),
            result: None,
            label: None,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionIrExchange {
    pub function: String,
    pub instructions: Vec<IrInstruction>,
}

/// Whole-program IR, one entry per function in declaration order.
pub fn program_ir(program: &ir::ProgramIr) -> Vec<FunctionIrExchange> {
    program
        .functions
        .iter()
        .map(|function| FunctionIrExchange {
            function: function.name.clone(),
            instructions: instructions(function),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CfgNode {
    pub id: usize,
    pub instructions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CfgEdge {
    pub from: usize,
    pub to: usize,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CfgExchange {
    pub nodes: Vec<CfgNode>,
    pub edges: Vec<CfgEdge>,
    pub entry: usize,
}

pub fn cfg(cfg: &Cfg, function: &FunctionIr) -> CfgExchange {
    let nodes = cfg
        .blocks
        .iter()
        .map(|block| CfgNode {
            id: block.id,
            instructions: function.instrs[block.range.clone()]
                .iter()
                .map(|inst| function.inst_text(inst))
                .collect(),
        })
        .collect();
    let edges = cfg
        .blocks
        .iter()
        .flat_map(|block| {
            block.successors.iter().map(|edge| CfgEdge {
                from: block.id,
                to: edge.to,
                kind: edge.kind,
            })
        })
        .collect();
    CfgExchange {
        nodes,
        edges,
        entry: cfg.entry,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionCfgExchange {
    pub function: String,
    #[serde(flatten)]
    pub graph: CfgExchange,
}

/// Graphs paired with their owning functions, in declaration order.
pub fn program_cfgs(cfgs: &[Cfg], program: &ir::ProgramIr) -> Vec<FunctionCfgExchange> {
    cfgs.iter()
        .zip(&program.functions)
        .map(|(graph, function)| FunctionCfgExchange {
            function: function.name.clone(),
            graph: cfg(graph, function),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameExchange {
    pub function: String,
    pub bindings: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugEventExchange {
    pub kind: &'static str,
    pub line: u32,
    pub call_stack: Vec<FrameExchange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn debug_event(event: &DebugEvent) -> DebugEventExchange {
    DebugEventExchange {
        kind: event_kind(event.kind),
        line: event.line,
        call_stack: event.call_stack.iter().map(frame).collect(),
        message: event.message.clone(),
    }
}

fn event_kind(kind: DebugEventKind) -> &'static str {
    match kind {
        DebugEventKind::Entered => "entered",
        DebugEventKind::Stepped => "stepped",
        DebugEventKind::Paused => "paused",
        DebugEventKind::Terminated => "terminated",
        DebugEventKind::ErrorHalted => "errorHalted",
    }
}

fn frame(snapshot: &FrameSnapshot) -> FrameExchange {
    FrameExchange {
        function: snapshot.function.clone(),
        bindings: snapshot.bindings.iter().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use serde_json::json;

    use super::*;
    use crate::vm::{Command, DebugController, Machine};
    use crate::{Limits, cfg as cfg_mod, ir as ir_mod, lexer, parser, sema};

    fn compile(source: &str) -> (Program, ir_mod::ProgramIr) {
        let (tokens, lex_errors) = lexer::tokenize(source);
        assert!(lex_errors.is_empty());
        let (program, parse_errors) = parser::parse(tokens, &Limits::default());
        assert!(parse_errors.is_empty());
        let analysis = sema::analyze(&program);
        assert!(!analysis.has_errors());
        let lowered = ir_mod::lower(&program, &analysis).expect("lowering failed");
        (program, lowered)
    }

    #[test]
    fn token_exchange_carries_category_and_position() {
        let (raw, errors) = lexer::tokenize("2+3*4");
        assert!(errors.is_empty());
        let exchange = tokens(&raw);
        let kinds: Vec<serde_json::Value> = exchange
            .iter()
            .map(|token| serde_json::to_value(token.kind).unwrap())
            .collect();
        assert_eq!(kinds, vec![
            json!("literal"),
            json!("operator"),
            json!("literal"),
            json!("operator"),
            json!("literal"),
            json!("eof"),
        ]);
        assert_eq!(exchange[0].lexeme, "2");
        assert_eq!(exchange[0].line, 1);
        assert_eq!(exchange[0].col, 1);
    }

    #[test]
    fn ast_nodes_use_camel_case_span_keys() {
        let (program_ast, _) = compile("fn main() -> int { return 1 + 2; }");
        let tree = program(&program_ast);
        let value = serde_json::to_value(&tree).unwrap();
        assert_eq!(value["kind"], json!("Program"));
        assert_eq!(value["span"]["startLine"], json!(1));
        let function = &value["children"][0];
        assert_eq!(function["attributes"]["name"], json!("main"));
        assert_eq!(function["attributes"]["returnType"], json!("int"));
        let ret = &function["children"][0]["children"][0];
        assert_eq!(ret["kind"], json!("Return"));
        assert_eq!(ret["children"][0]["attributes"]["op"], json!("+"));
    }

    #[test]
    fn ir_exchange_uses_mnemonics_and_printed_operands() {
        let (_, lowered) = compile("fn main() -> int { return 2 + 3 * 4; }");
        let main = &lowered.functions[lowered.main];
        let exchange = instructions(main);
        let ops: Vec<&str> = exchange.iter().map(|inst| inst.op).collect();
        assert_eq!(ops, ["load", "load", "load", "mul", "add", "return"]);
        assert_eq!(exchange[3].result.as_deref(), Some("t4"));
        assert_eq!(exchange[3].args, ["t2", "t3"]);
        let value = serde_json::to_value(&exchange[0]).unwrap();
        // Absent result/label keys are omitted, not null.
        assert!(value.get("label").is_none());
    }

    #[test]
    fn cfg_exchange_orders_taken_before_fallthrough() {
        let (_, lowered) = compile(indoc! {"
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
        let main = &lowered.functions[lowered.main];
        let graph = cfg_mod::build(main).unwrap();
        let exchange = cfg(&graph, main);
        assert_eq!(exchange.entry, 0);
        let value = serde_json::to_value(&exchange).unwrap();
        let kinds: Vec<&str> = value["edges"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|edge| edge["from"] == json!(0))
            .map(|edge| edge["kind"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, ["taken", "fallthrough"]);
        assert!(!exchange.nodes[0].instructions.is_empty());
    }

    #[test]
    fn debug_event_exchange_uses_call_stack_key() {
        let (_, lowered) = compile("fn main() -> int { return 0; }");
        let mut debugger = DebugController::new(Machine::new(&lowered, &Limits::default()));
        let entered = debug_event(&debugger.launch());
        let value = serde_json::to_value(&entered).unwrap();
        assert_eq!(value["kind"], json!("entered"));
        assert_eq!(value["callStack"][0]["function"], json!("main"));
        assert!(value.get("message").is_none());
        let done = debug_event(&debugger.resume(Command::Continue));
        assert_eq!(done.kind, "terminated");
    }
}
