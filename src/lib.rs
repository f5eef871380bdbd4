pub mod ast;
pub mod cfg;
pub mod diagnostics;
pub mod exchange;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod pipeline;
pub mod sema;
pub mod timing;
pub mod token;
pub mod vm;

/// Configurable resource bounds shared by the parser (expression nesting)
/// and the machine (call depth).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_expr_depth: usize,
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_expr_depth: 128,
            max_call_depth: 256,
        }
    }
}
