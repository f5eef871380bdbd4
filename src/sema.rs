//! Name resolution and static type checking.
//!
//! A signature pass collects every function first, so calls may reference
//! declarations that appear later in the file. Body checking then walks each
//! function with an explicit scope chain. The analyzer never halts on an
//! error: an unresolved name is reported once and replaced by a placeholder
//! symbol of unknown type, and unknown types are compatible with everything,
//! which keeps one mistake from echoing through every enclosing expression.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::ast::{
    Assign, BinOp, Binary, Block, Call, Expr, FunctionDecl, Identifier, If, Literal, LiteralValue,
    NodeId, Program, Return, Stmt, TypeRef, UnOp, Unary, VarDecl, While,
};
use crate::token::Span;

pub const BUILTINS: [&str; 2] = ["print", "println"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error("Undefined identifier `{name}` at {line}:{col}")]
    UndefinedSymbol { name: String, line: u32, col: u32 },
    #[error("Redeclaration of `{name}` at {line}:{col}")]
    DuplicateDeclaration { name: String, line: u32, col: u32 },
    #[error("{message} at {line}:{col}")]
    TypeMismatch {
        message: String,
        line: u32,
        col: u32,
    },
    #[error("`{callee}` expects {expected} argument(s), found {found} at {line}:{col}")]
    ArityMismatch {
        callee: String,
        expected: usize,
        found: usize,
        line: u32,
        col: u32,
    },
    #[error("No entry point: expected `fn main() -> int`")]
    MissingMain,
}

impl SemanticError {
    pub fn line(&self) -> u32 {
        match self {
            SemanticError::UndefinedSymbol { line, .. }
            | SemanticError::DuplicateDeclaration { line, .. }
            | SemanticError::TypeMismatch { line, .. }
            | SemanticError::ArityMismatch { line, .. } => *line,
            SemanticError::MissingMain => 0,
        }
    }

    pub fn col(&self) -> u32 {
        match self {
            SemanticError::UndefinedSymbol { col, .. }
            | SemanticError::DuplicateDeclaration { col, .. }
            | SemanticError::TypeMismatch { col, .. }
            | SemanticError::ArityMismatch { col, .. } => *col,
            SemanticError::MissingMain => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Type {
    Int,
    Bool,
    Str,
    Void,
    #[default]
    Unknown,
}

impl Type {
    pub fn name(self) -> &'static str {
        match self {
            Type::Int => "int",
            Type::Bool => "bool",
            Type::Str => "string",
            Type::Void => "void",
            Type::Unknown => "unknown",
        }
    }

    pub fn from_ref(type_ref: &TypeRef) -> Type {
        match type_ref.name.as_str() {
            "int" => Type::Int,
            "bool" => Type::Bool,
            "string" => Type::Str,
            _ => Type::Unknown,
        }
    }

    /// Unknown stands in for a type the analyzer could not determine; it
    /// matches anything so one root cause yields one error.
    pub fn compatible(self, other: Type) -> bool {
        self == Type::Unknown || other == Type::Unknown || self == other
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Parameter,
    Function,
    /// Placeholder bound after an undefined-name report.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: Type,
    pub declared_at: Span,
    pub scope_depth: u32,
    /// Frame slot for variables and parameters, in declaration order.
    pub slot: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotInfo {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionInfo {
    pub symbol: SymbolId,
    pub params: Vec<Type>,
    pub ret: Type,
    /// One entry per variable or parameter slot, in declaration order.
    pub slots: Vec<SlotInfo>,
}

/// Everything later stages need: the symbol arena, the node-to-symbol
/// side table, per-function signatures and slot layouts, and the ordered
/// error list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Analysis {
    pub symbols: Vec<Symbol>,
    pub resolutions: FxHashMap<NodeId, SymbolId>,
    pub functions: FxHashMap<String, FunctionInfo>,
    pub errors: Vec<SemanticError>,
}

impl Analysis {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn resolution(&self, node: NodeId) -> Option<SymbolId> {
        self.resolutions.get(&node).copied()
    }
}

pub fn analyze(program: &Program) -> Analysis {
    let mut analyzer = Analyzer::default();
    analyzer.run(program);
    Analysis {
        symbols: analyzer.symbols,
        resolutions: analyzer.resolutions,
        functions: analyzer.functions,
        errors: analyzer.errors,
    }
}

#[derive(Default)]
struct Analyzer {
    symbols: Vec<Symbol>,
    scopes: Vec<FxHashMap<String, SymbolId>>,
    resolutions: FxHashMap<NodeId, SymbolId>,
    functions: FxHashMap<String, FunctionInfo>,
    errors: Vec<SemanticError>,
    current_slots: Vec<SlotInfo>,
    current_ret: Type,
}

impl Analyzer {
    fn run(&mut self, program: &Program) {
        self.collect_signatures(program);
        if !self.functions.contains_key("main") {
            self.errors.push(SemanticError::MissingMain);
        }
        for decl in &program.functions {
            self.check_function(decl);
        }
    }

    fn collect_signatures(&mut self, program: &Program) {
        for decl in &program.functions {
            if self.functions.contains_key(&decl.name) {
                self.errors.push(SemanticError::DuplicateDeclaration {
                    name: decl.name.clone(),
                    line: decl.span.start_line,
                    col: decl.span.start_col,
                });
                continue;
            }
            let params = decl
                .params
                .iter()
                .map(|param| Type::from_ref(&param.ty))
                .collect();
            let ret = Type::from_ref(&decl.ret_type);
            let symbol = self.push_symbol(Symbol {
                name: decl.name.clone(),
                kind: SymbolKind::Function,
                ty: ret,
                declared_at: decl.span,
                scope_depth: 0,
                slot: None,
            });
            self.resolutions.insert(decl.id, symbol);
            self.functions.insert(
                decl.name.clone(),
                FunctionInfo {
                    symbol,
                    params,
                    ret,
                    slots: Vec::new(),
                },
            );
        }
    }

    fn check_function(&mut self, decl: &FunctionDecl) {
        self.current_slots = Vec::new();
        self.current_ret = Type::from_ref(&decl.ret_type);
        self.scopes.push(FxHashMap::default());
        for param in &decl.params {
            self.declare(
                &param.name,
                SymbolKind::Parameter,
                Type::from_ref(&param.ty),
                param.span,
                param.id,
            );
        }
        self.check_block(&decl.body);
        self.scopes.pop();
        let slots = std::mem::take(&mut self.current_slots);
        if let Some(info) = self.functions.get_mut(&decl.name) {
            info.slots = slots;
        }
    }

    fn check_block(&mut self, block: &Block) {
        self.scopes.push(FxHashMap::default());
        for stmt in &block.statements {
            self.check_stmt(stmt);
        }
        self.scopes.pop();
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl(decl) => self.check_var_decl(decl),
            Stmt::Assign(assign) => self.check_assign(assign),
            Stmt::If(stmt) => self.check_if(stmt),
            Stmt::While(stmt) => self.check_while(stmt),
            Stmt::Return(stmt) => self.check_return(stmt),
            Stmt::Block(block) => self.check_block(block),
            Stmt::Expr(expr) => {
                self.check_expr(expr);
            }
        }
    }

    fn check_var_decl(&mut self, decl: &VarDecl) {
        let declared = Type::from_ref(&decl.ty);
        if let Some(init) = &decl.init {
            let found = self.check_expr(init);
            if !declared.compatible(found) {
                self.type_mismatch(
                    format!(
                        "Type mismatch for `{}`: {} != {}",
                        decl.name, declared, found
                    ),
                    decl.span,
                );
            }
        }
        self.declare(&decl.name, SymbolKind::Variable, declared, decl.span, decl.id);
    }

    fn check_assign(&mut self, assign: &Assign) {
        let target = self.resolve_name(assign.id, &assign.name, assign.span);
        let value = self.check_expr(&assign.value);
        if !target.compatible(value) {
            self.type_mismatch(
                format!(
                    "Type mismatch in assignment to `{}`: {} != {}",
                    assign.name, target, value
                ),
                assign.span,
            );
        }
    }

    fn check_if(&mut self, stmt: &If) {
        let cond = self.check_expr(&stmt.cond);
        if !cond.compatible(Type::Bool) {
            self.type_mismatch("if condition must be bool".to_string(), stmt.cond.span());
        }
        self.check_block(&stmt.then_block);
        if let Some(else_block) = &stmt.else_block {
            self.check_block(else_block);
        }
    }

    fn check_while(&mut self, stmt: &While) {
        let cond = self.check_expr(&stmt.cond);
        if !cond.compatible(Type::Bool) {
            self.type_mismatch(
                "while condition must be bool".to_string(),
                stmt.cond.span(),
            );
        }
        self.check_block(&stmt.body);
    }

    fn check_return(&mut self, stmt: &Return) {
        // A bare `return` yields int 0 at runtime and is accepted in any
        // function; only a valued return is checked against the signature.
        if let Some(value) = &stmt.value {
            let found = self.check_expr(value);
            if !self.current_ret.compatible(found) {
                self.type_mismatch(
                    format!(
                        "Return type mismatch: {} != {}",
                        self.current_ret, found
                    ),
                    stmt.span,
                );
            }
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> Type {
        match expr {
            Expr::Literal(Literal { value, .. }) => match value {
                LiteralValue::Int(_) => Type::Int,
                LiteralValue::Bool(_) => Type::Bool,
                LiteralValue::Str(_) => Type::Str,
            },
            Expr::Identifier(Identifier { id, name, span }) => {
                self.resolve_name(*id, name, *span)
            }
            Expr::Unary(unary) => self.check_unary(unary),
            Expr::Binary(binary) => self.check_binary(binary),
            Expr::Call(call) => self.check_call(call),
        }
    }

    fn check_unary(&mut self, unary: &Unary) -> Type {
        let operand = self.check_expr(&unary.operand);
        match unary.op {
            UnOp::Not => {
                if !operand.compatible(Type::Bool) {
                    self.type_mismatch("! expects bool".to_string(), unary.span);
                    return Type::Unknown;
                }
                Type::Bool
            }
            UnOp::Neg => {
                if !operand.compatible(Type::Int) {
                    self.type_mismatch("unary - expects int".to_string(), unary.span);
                    return Type::Unknown;
                }
                Type::Int
            }
        }
    }

    fn check_binary(&mut self, binary: &Binary) -> Type {
        let lhs = self.check_expr(&binary.lhs);
        let rhs = self.check_expr(&binary.rhs);
        match binary.op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                if !lhs.compatible(Type::Int) || !rhs.compatible(Type::Int) {
                    self.type_mismatch("arithmetic expects int".to_string(), binary.span);
                    return Type::Unknown;
                }
                Type::Int
            }
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne => {
                if lhs == Type::Void || rhs == Type::Void || !lhs.compatible(rhs) {
                    self.type_mismatch("compare type mismatch".to_string(), binary.span);
                    return Type::Unknown;
                }
                Type::Bool
            }
            BinOp::And | BinOp::Or => {
                if !lhs.compatible(Type::Bool) || !rhs.compatible(Type::Bool) {
                    self.type_mismatch("logical expects bool".to_string(), binary.span);
                    return Type::Unknown;
                }
                Type::Bool
            }
        }
    }

    fn check_call(&mut self, call: &Call) -> Type {
        if BUILTINS.contains(&call.callee.as_str()) {
            for (index, arg) in call.args.iter().enumerate() {
                let ty = self.check_expr(arg);
                if ty == Type::Void {
                    self.type_mismatch(
                        format!("Argument {} of `{}` is void", index + 1, call.callee),
                        arg.span(),
                    );
                }
            }
            return Type::Void;
        }

        let arg_types: Vec<Type> = call.args.iter().map(|arg| self.check_expr(arg)).collect();

        let Some(info) = self.functions.get(&call.callee) else {
            self.errors.push(SemanticError::UndefinedSymbol {
                name: call.callee.clone(),
                line: call.span.start_line,
                col: call.span.start_col,
            });
            let symbol = self.push_symbol(Symbol {
                name: call.callee.clone(),
                kind: SymbolKind::Unresolved,
                ty: Type::Unknown,
                declared_at: call.span,
                scope_depth: 0,
                slot: None,
            });
            self.functions.insert(
                call.callee.clone(),
                FunctionInfo {
                    symbol,
                    params: Vec::new(),
                    ret: Type::Unknown,
                    slots: Vec::new(),
                },
            );
            self.resolutions.insert(call.id, symbol);
            return Type::Unknown;
        };

        let symbol = info.symbol;
        let params = info.params.clone();
        let ret = info.ret;
        self.resolutions.insert(call.id, symbol);
        if matches!(self.symbols[symbol.0 as usize].kind, SymbolKind::Unresolved) {
            return Type::Unknown;
        }

        if arg_types.len() != params.len() {
            self.errors.push(SemanticError::ArityMismatch {
                callee: call.callee.clone(),
                expected: params.len(),
                found: arg_types.len(),
                line: call.span.start_line,
                col: call.span.start_col,
            });
            return ret;
        }
        for (index, (&found, &expected)) in arg_types.iter().zip(params.iter()).enumerate() {
            if !expected.compatible(found) {
                self.type_mismatch(
                    format!(
                        "Argument {} of `{}`: {} != {}",
                        index + 1,
                        call.callee,
                        expected,
                        found
                    ),
                    call.args[index].span(),
                );
            }
        }
        ret
    }

    /// Look a name up through the scope chain; on failure report once and
    /// bind a placeholder so every later reference resolves silently.
    fn resolve_name(&mut self, node: NodeId, name: &str, span: Span) -> Type {
        if let Some(symbol_id) = self.lookup(name) {
            self.resolutions.insert(node, symbol_id);
            return self.symbols[symbol_id.0 as usize].ty;
        }
        self.errors.push(SemanticError::UndefinedSymbol {
            name: name.to_string(),
            line: span.start_line,
            col: span.start_col,
        });
        let depth = self.scopes.len() as u32;
        let symbol_id = self.push_symbol(Symbol {
            name: name.to_string(),
            kind: SymbolKind::Unresolved,
            ty: Type::Unknown,
            declared_at: span,
            scope_depth: depth,
            slot: None,
        });
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), symbol_id);
        }
        self.resolutions.insert(node, symbol_id);
        Type::Unknown
    }

    fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn declare(
        &mut self,
        name: &str,
        kind: SymbolKind,
        ty: Type,
        span: Span,
        node: NodeId,
    ) -> SymbolId {
        if let Some(&existing) = self.scopes.last().and_then(|scope| scope.get(name)) {
            // A placeholder left by an undefined-name report is absorbed by
            // the real declaration rather than counted as a redeclaration.
            if !matches!(self.symbols[existing.0 as usize].kind, SymbolKind::Unresolved) {
                self.errors.push(SemanticError::DuplicateDeclaration {
                    name: name.to_string(),
                    line: span.start_line,
                    col: span.start_col,
                });
            }
        }
        let slot = self.current_slots.len() as u32;
        self.current_slots.push(SlotInfo {
            name: name.to_string(),
            ty,
        });
        let depth = self.scopes.len() as u32;
        let symbol_id = self.push_symbol(Symbol {
            name: name.to_string(),
            kind,
            ty,
            declared_at: span,
            scope_depth: depth,
            slot: Some(slot),
        });
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), symbol_id);
        }
        self.resolutions.insert(node, symbol_id);
        symbol_id
    }

    fn push_symbol(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    fn type_mismatch(&mut self, message: String, span: Span) {
        self.errors.push(SemanticError::TypeMismatch {
            message,
            line: span.start_line,
            col: span.start_col,
        });
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::{Limits, lexer, parser};

    fn analyze_source(source: &str) -> Analysis {
        let (tokens, lex_errors) = lexer::tokenize(source);
        assert!(lex_errors.is_empty(), "lex errors: {lex_errors:?}");
        let (program, parse_errors) = parser::parse(tokens, &Limits::default());
        assert!(parse_errors.is_empty(), "parse errors: {parse_errors:?}");
        analyze(&program)
    }

    #[test]
    fn undeclared_assignment_reports_one_error() {
        let analysis = analyze_source(indoc! {"
            fn main() -> int {
                x = x + 1;
                return 0;
            }
        "});
        assert_eq!(analysis.errors.len(), 1);
        assert!(matches!(
            &analysis.errors[0],
            SemanticError::UndefinedSymbol { name, line: 2, .. } if name == "x"
        ));
    }

    #[test]
    fn duplicate_declaration_reports_second_span() {
        let analysis = analyze_source(indoc! {"
            fn main() -> int {
                let x: int;
                let x: int;
                return 0;
            }
        "});
        assert_eq!(analysis.errors.len(), 1);
        assert!(matches!(
            &analysis.errors[0],
            SemanticError::DuplicateDeclaration { name, line: 3, .. } if name == "x"
        ));
    }

    #[test]
    fn shadowing_across_scopes_is_allowed() {
        let analysis = analyze_source(indoc! {"
            fn main() -> int {
                let x: int = 1;
                {
                    let x: string = \"inner\";
                    println(x);
                }
                return x;
            }
        "});
        assert!(analysis.errors.is_empty(), "errors: {:?}", analysis.errors);
        let slots = &analysis.functions["main"].slots;
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].ty, Type::Int);
        assert_eq!(slots[1].ty, Type::Str);
    }

    #[test]
    fn placeholder_suppresses_cascading_errors() {
        let analysis = analyze_source(indoc! {"
            fn main() -> int {
                let x: int = y + 1;
                x = y;
                return x;
            }
        "});
        assert_eq!(analysis.errors.len(), 1);
        assert!(matches!(
            &analysis.errors[0],
            SemanticError::UndefinedSymbol { name, .. } if name == "y"
        ));
    }

    #[test]
    fn condition_must_be_bool() {
        let analysis = analyze_source("fn main() -> int { if (1) { } return 0; }");
        assert_eq!(analysis.errors.len(), 1);
        assert!(
            analysis.errors[0]
                .to_string()
                .contains("if condition must be bool")
        );
    }

    #[test]
    fn arithmetic_operands_must_be_int() {
        let analysis = analyze_source("fn main() -> int { return 1 + true; }");
        assert!(
            analysis
                .errors
                .iter()
                .any(|err| err.to_string().contains("arithmetic expects int"))
        );
    }

    #[test]
    fn comparison_operands_must_match() {
        let analysis = analyze_source("fn main() -> bool { return 1 < \"a\"; }");
        assert!(
            analysis
                .errors
                .iter()
                .any(|err| err.to_string().contains("compare type mismatch"))
        );
    }

    #[test]
    fn calls_resolve_forward_declarations() {
        let analysis = analyze_source(indoc! {"
            fn main() -> int {
                return helper(2);
            }
            fn helper(n: int) -> int {
                return n * 2;
            }
        "});
        assert!(analysis.errors.is_empty(), "errors: {:?}", analysis.errors);
    }

    #[test]
    fn call_arity_is_checked() {
        let analysis = analyze_source(indoc! {"
            fn add(a: int, b: int) -> int {
                return a + b;
            }
            fn main() -> int {
                return add(1);
            }
        "});
        assert_eq!(analysis.errors.len(), 1);
        assert!(matches!(
            &analysis.errors[0],
            SemanticError::ArityMismatch {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn call_argument_types_are_checked() {
        let analysis = analyze_source(indoc! {"
            fn add(a: int, b: int) -> int {
                return a + b;
            }
            fn main() -> int {
                return add(1, true);
            }
        "});
        assert_eq!(analysis.errors.len(), 1);
        assert!(analysis.errors[0].to_string().contains("Argument 2"));
    }

    #[test]
    fn missing_main_is_reported() {
        let analysis = analyze_source("fn helper() -> int { return 0; }");
        assert!(
            analysis
                .errors
                .iter()
                .any(|err| matches!(err, SemanticError::MissingMain))
        );
    }

    #[test]
    fn builtins_accept_any_values() {
        let analysis = analyze_source(indoc! {"
            fn main() -> int {
                print(1, \"a\", true);
                println();
                return 0;
            }
        "});
        assert!(analysis.errors.is_empty(), "errors: {:?}", analysis.errors);
    }

    #[test]
    fn void_call_is_not_a_value() {
        let analysis = analyze_source("fn main() -> int { let x: int = print(1); return x; }");
        assert_eq!(analysis.errors.len(), 1);
        assert!(analysis.errors[0].to_string().contains("Type mismatch"));
    }

    #[test]
    fn return_type_is_checked() {
        let analysis = analyze_source("fn flag() -> bool { return 1; } fn main() -> int { return 0; }");
        assert_eq!(analysis.errors.len(), 1);
        assert!(
            analysis.errors[0]
                .to_string()
                .contains("Return type mismatch")
        );
    }

    #[test]
    fn slots_follow_declaration_order() {
        let analysis = analyze_source(indoc! {"
            fn scale(a: int, flag: bool) -> int {
                let b: int = a * 2;
                return b;
            }
            fn main() -> int {
                return scale(2, true);
            }
        "});
        assert!(analysis.errors.is_empty(), "errors: {:?}", analysis.errors);
        let slots = &analysis.functions["scale"].slots;
        let names: Vec<&str> = slots.iter().map(|slot| slot.name.as_str()).collect();
        assert_eq!(names, ["a", "flag", "b"]);
    }
}
