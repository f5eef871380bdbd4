//! Recursive-descent parser with precedence-climbing expressions.
//!
//! The parser owns the buffered token stream and reports syntax errors
//! without giving up: after a failed construct it discards tokens up to a
//! synchronisation point and resumes with the next statement, so one typo
//! does not hide every later finding. Failed constructs produce no node.

use thiserror::Error;

use crate::Limits;
use crate::ast::{
    Assign, BinOp, Binary, Block, Call, Expr, FunctionDecl, Identifier, If, Literal, LiteralValue,
    NodeId, Param, Program, Return, Stmt, TypeRef, UnOp, Unary, VarDecl, While,
};
use crate::token::{Span, Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("Expected {expected}, found {found} at {line}:{col}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: u32,
        col: u32,
    },
    #[error("Expression nesting exceeds {limit} levels at {line}:{col}")]
    NestingTooDeep { limit: usize, line: u32, col: u32 },
}

impl SyntaxError {
    pub fn line(&self) -> u32 {
        match self {
            SyntaxError::UnexpectedToken { line, .. }
            | SyntaxError::NestingTooDeep { line, .. } => *line,
        }
    }

    pub fn col(&self) -> u32 {
        match self {
            SyntaxError::UnexpectedToken { col, .. } | SyntaxError::NestingTooDeep { col, .. } => {
                *col
            }
        }
    }
}

pub struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
    next_node_id: u32,
    max_expr_depth: usize,
    errors: Vec<SyntaxError>,
}

impl<'src> Parser<'src> {
    pub fn new(mut tokens: Vec<Token<'src>>, limits: &Limits) -> Self {
        // The lexer always terminates the stream; guard direct callers.
        if !tokens.last().is_some_and(Token::is_eof) {
            let span = tokens.last().map(|token| token.span).unwrap_or_default();
            tokens.push(Token::new(TokenKind::Eof, "", span));
        }
        Self {
            tokens,
            pos: 0,
            next_node_id: 0,
            max_expr_depth: limits.max_expr_depth,
            errors: Vec::new(),
        }
    }

    pub fn parse_program(&mut self) -> Program {
        let mut functions = Vec::new();
        while !self.current().is_eof() {
            if matches!(self.current().kind, TokenKind::Fn) {
                match self.parse_function() {
                    Ok(function) => functions.push(function),
                    Err(err) => {
                        self.errors.push(err);
                        self.synchronize_decl();
                    }
                }
            } else {
                let err = self.error("`fn`");
                self.errors.push(err);
                self.advance();
                self.synchronize_decl();
            }
        }
        let span = match (functions.first(), functions.last()) {
            (Some(first), Some(last)) => first.span.merge(last.span),
            _ => Span::default(),
        };
        Program { functions, span }
    }

    pub fn errors(&self) -> &[SyntaxError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<SyntaxError> {
        self.errors
    }

    fn parse_function(&mut self) -> Result<FunctionDecl, SyntaxError> {
        let fn_token = self.expect(TokenKind::Fn, "`fn`")?;
        let (name, _) = self.expect_identifier("function name")?;
        let id = self.next_id();
        self.expect(TokenKind::LParen, "`(`")?;
        let params = self.parse_params()?;
        self.expect(TokenKind::RParen, "`)`")?;
        self.expect(TokenKind::Arrow, "`->`")?;
        let ret_type = self.parse_type()?;
        let body = self.parse_block()?;
        let span = fn_token.span.merge(body.span);
        Ok(FunctionDecl {
            id,
            name,
            params,
            ret_type,
            body,
            span,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, SyntaxError> {
        let mut params = Vec::new();
        if matches!(self.current().kind, TokenKind::RParen) {
            return Ok(params);
        }
        loop {
            let (name, name_span) = self.expect_identifier("parameter name")?;
            let id = self.next_id();
            self.expect(TokenKind::Colon, "`:`")?;
            let ty = self.parse_type()?;
            let span = name_span.merge(ty.span);
            params.push(Param { id, name, ty, span });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_type(&mut self) -> Result<TypeRef, SyntaxError> {
        match self.current().kind {
            TokenKind::IntType | TokenKind::BoolType | TokenKind::StringType => {
                let token = self.advance();
                Ok(TypeRef {
                    name: token.lexeme.to_string(),
                    span: token.span,
                })
            }
            _ => Err(self.error("a type (`int`, `bool` or `string`)")),
        }
    }

    fn parse_block(&mut self) -> Result<Block, SyntaxError> {
        let open = self.expect(TokenKind::LBrace, "`{`")?;
        let mut statements = Vec::new();
        while !matches!(self.current().kind, TokenKind::RBrace | TokenKind::Eof) {
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
        }
        let close = self.expect(TokenKind::RBrace, "`}`")?;
        Ok(Block {
            statements,
            span: open.span.merge(close.span),
        })
    }

    fn parse_statement(&mut self) -> Result<Stmt, SyntaxError> {
        match self.current().kind {
            TokenKind::Let => self.parse_var_decl().map(Stmt::VarDecl),
            TokenKind::If => self.parse_if().map(Stmt::If),
            TokenKind::While => self.parse_while().map(Stmt::While),
            TokenKind::Return => self.parse_return().map(Stmt::Return),
            TokenKind::LBrace => self.parse_block().map(Stmt::Block),
            TokenKind::Identifier(_) if matches!(self.peek().kind, TokenKind::Equal) => {
                self.parse_assign().map(Stmt::Assign)
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_var_decl(&mut self) -> Result<VarDecl, SyntaxError> {
        let let_token = self.expect(TokenKind::Let, "`let`")?;
        let (name, _) = self.expect_identifier("variable name")?;
        let id = self.next_id();
        self.expect(TokenKind::Colon, "`:`")?;
        let ty = self.parse_type()?;
        let init = if self.eat(TokenKind::Equal) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let semi = self.expect(TokenKind::Semicolon, "`;`")?;
        Ok(VarDecl {
            id,
            name,
            ty,
            init,
            span: let_token.span.merge(semi.span),
        })
    }

    fn parse_assign(&mut self) -> Result<Assign, SyntaxError> {
        let (name, name_span) = self.expect_identifier("assignment target")?;
        let id = self.next_id();
        self.expect(TokenKind::Equal, "`=`")?;
        let value = self.parse_expr()?;
        let semi = self.expect(TokenKind::Semicolon, "`;`")?;
        Ok(Assign {
            id,
            name,
            value,
            span: name_span.merge(semi.span),
        })
    }

    fn parse_if(&mut self) -> Result<If, SyntaxError> {
        let if_token = self.expect(TokenKind::If, "`if`")?;
        self.expect(TokenKind::LParen, "`(`")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "`)`")?;
        let then_block = self.parse_block()?;
        let else_block = if self.eat(TokenKind::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };
        let end = else_block
            .as_ref()
            .map(|block| block.span)
            .unwrap_or(then_block.span);
        Ok(If {
            cond,
            then_block,
            else_block,
            span: if_token.span.merge(end),
        })
    }

    fn parse_while(&mut self) -> Result<While, SyntaxError> {
        let while_token = self.expect(TokenKind::While, "`while`")?;
        self.expect(TokenKind::LParen, "`(`")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "`)`")?;
        let body = self.parse_block()?;
        let span = while_token.span.merge(body.span);
        Ok(While { cond, body, span })
    }

    fn parse_return(&mut self) -> Result<Return, SyntaxError> {
        let return_token = self.expect(TokenKind::Return, "`return`")?;
        let value = if matches!(self.current().kind, TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let semi = self.expect(TokenKind::Semicolon, "`;`")?;
        Ok(Return {
            value,
            span: return_token.span.merge(semi.span),
        })
    }

    fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary(1, 0)
    }

    /// Precedence climbing: fold in operators binding at least as tightly as
    /// `min_bp`, recursing with `bp + 1` for left associativity.
    fn parse_binary(&mut self, min_bp: u8, depth: usize) -> Result<Expr, SyntaxError> {
        self.check_depth(depth)?;
        let mut lhs = self.parse_unary(depth + 1)?;
        while let Some((op, bp)) = self.peek_binary_op() {
            if bp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_binary(bp + 1, depth + 1)?;
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary(Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            });
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self, depth: usize) -> Result<Expr, SyntaxError> {
        self.check_depth(depth)?;
        let op = match self.current().kind {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Bang => Some(UnOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let op_token = self.advance();
            let operand = self.parse_unary(depth + 1)?;
            let span = op_token.span.merge(operand.span());
            return Ok(Expr::Unary(Unary {
                op,
                operand: Box::new(operand),
                span,
            }));
        }
        self.parse_primary(depth)
    }

    fn parse_primary(&mut self, depth: usize) -> Result<Expr, SyntaxError> {
        match &self.current().kind {
            TokenKind::Number(value) => {
                let value = *value;
                let token = self.advance();
                Ok(Expr::Literal(Literal {
                    value: LiteralValue::Int(value),
                    span: token.span,
                }))
            }
            TokenKind::StringLit(text) => {
                let text = text.clone();
                let token = self.advance();
                Ok(Expr::Literal(Literal {
                    value: LiteralValue::Str(text),
                    span: token.span,
                }))
            }
            TokenKind::True | TokenKind::False => {
                let value = matches!(self.current().kind, TokenKind::True);
                let token = self.advance();
                Ok(Expr::Literal(Literal {
                    value: LiteralValue::Bool(value),
                    span: token.span,
                }))
            }
            TokenKind::Identifier(name) => {
                let name = name.to_string();
                let token = self.advance();
                if matches!(self.current().kind, TokenKind::LParen) {
                    self.parse_call(name, token.span, depth)
                } else {
                    Ok(Expr::Identifier(Identifier {
                        id: self.next_id(),
                        name,
                        span: token.span,
                    }))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_binary(1, depth + 1)?;
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(expr)
            }
            _ => Err(self.error("an expression")),
        }
    }

    fn parse_call(&mut self, callee: String, callee_span: Span, depth: usize) -> Result<Expr, SyntaxError> {
        self.expect(TokenKind::LParen, "`(`")?;
        let mut args = Vec::new();
        if !matches!(self.current().kind, TokenKind::RParen) {
            loop {
                args.push(self.parse_binary(1, depth + 1)?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RParen, "`)`")?;
        Ok(Expr::Call(Call {
            id: self.next_id(),
            callee,
            args,
            span: callee_span.merge(close.span),
        }))
    }

    fn peek_binary_op(&self) -> Option<(BinOp, u8)> {
        let op = match self.current().kind {
            TokenKind::OrOr => BinOp::Or,
            TokenKind::AndAnd => BinOp::And,
            TokenKind::EqualEqual => BinOp::Eq,
            TokenKind::BangEqual => BinOp::Ne,
            TokenKind::Less => BinOp::Lt,
            TokenKind::Greater => BinOp::Gt,
            TokenKind::LessEqual => BinOp::Le,
            TokenKind::GreaterEqual => BinOp::Ge,
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            _ => return None,
        };
        Some((op, binding_power(op)))
    }

    fn check_depth(&self, depth: usize) -> Result<(), SyntaxError> {
        if depth > self.max_expr_depth {
            let token = self.current();
            return Err(SyntaxError::NestingTooDeep {
                limit: self.max_expr_depth,
                line: token.line(),
                col: token.column(),
            });
        }
        Ok(())
    }

    /// Discard tokens until a statement boundary: past a `;`, or stopping
    /// before a brace or a keyword that can begin a statement.
    fn synchronize(&mut self) {
        while !self.current().is_eof() {
            match self.current().kind {
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::RBrace
                | TokenKind::LBrace
                | TokenKind::Let
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Return
                | TokenKind::Fn => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn synchronize_decl(&mut self) {
        while !self.current().is_eof() && !matches!(self.current().kind, TokenKind::Fn) {
            self.advance();
        }
    }

    fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    fn current(&self) -> &Token<'src> {
        &self.tokens[self.pos]
    }

    fn peek(&self) -> &Token<'src> {
        let next = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[next]
    }

    fn advance(&mut self) -> Token<'src> {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind<'static>) -> bool {
        if self.current().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(
        &mut self,
        kind: TokenKind<'static>,
        expected: &str,
    ) -> Result<Token<'src>, SyntaxError> {
        if self.current().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.error(expected))
        }
    }

    fn expect_identifier(&mut self, expected: &str) -> Result<(String, Span), SyntaxError> {
        if let TokenKind::Identifier(name) = self.current().kind {
            let name = name.to_string();
            let token = self.advance();
            Ok((name, token.span))
        } else {
            Err(self.error(expected))
        }
    }

    fn error(&self, expected: &str) -> SyntaxError {
        let token = self.current();
        let found = if token.is_eof() {
            "end of input".to_string()
        } else {
            format!("`{}`", token.lexeme)
        };
        SyntaxError::UnexpectedToken {
            expected: expected.to_string(),
            found,
            line: token.line(),
            col: token.column(),
        }
    }
}

fn binding_power(op: BinOp) -> u8 {
    match op {
        BinOp::Or => 1,
        BinOp::And => 2,
        BinOp::Eq | BinOp::Ne => 3,
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => 4,
        BinOp::Add | BinOp::Sub => 5,
        BinOp::Mul | BinOp::Div => 6,
    }
}

/// Parse a full token stream, returning the best-effort tree and every
/// syntax error in source order.
pub fn parse<'src>(tokens: Vec<Token<'src>>, limits: &Limits) -> (Program, Vec<SyntaxError>) {
    let mut parser = Parser::new(tokens, limits);
    let program = parser.parse_program();
    (program, parser.into_errors())
}
