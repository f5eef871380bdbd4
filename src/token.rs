use serde::Serialize;

/// Half-open source region in 1-based line/column coordinates.
///
/// `end_col` points one past the last character, so a single-character token
/// at line 1 column 4 spans `1:4..1:5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Span {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        let (start_line, start_col) =
            if (self.start_line, self.start_col) <= (other.start_line, other.start_col) {
                (self.start_line, self.start_col)
            } else {
                (other.start_line, other.start_col)
            };
        let (end_line, end_col) = if (self.end_line, self.end_col) >= (other.end_line, other.end_col)
        {
            (self.end_line, self.end_col)
        } else {
            (other.end_line, other.end_col)
        };
        Span::new(start_line, start_col, end_line, end_col)
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start_line, self.start_col)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'src> {
    Identifier(&'src str),
    Number(i64),
    /// String literal with escape sequences already decoded.
    StringLit(String),

    // Keywords
    Fn,
    Let,
    If,
    Else,
    While,
    Return,
    True,
    False,
    IntType,
    BoolType,
    StringType,

    // Operators
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Less,         // <
    Greater,      // >
    LessEqual,    // <=
    GreaterEqual, // >=
    EqualEqual,   // ==
    BangEqual,    // !=
    AndAnd,       // &&
    OrOr,         // ||
    Bang,         // !
    Equal,        // =

    // Punctuation
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    Comma,     // ,
    Colon,     // :
    Semicolon, // ;
    Arrow,     // ->

    Eof,
}

/// Coarse classification used by the exchange form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenCategory {
    Identifier,
    Keyword,
    Literal,
    Operator,
    Punctuation,
    Eof,
}

impl<'src> TokenKind<'src> {
    pub fn category(&self) -> TokenCategory {
        use TokenKind::*;
        match self {
            Identifier(_) => TokenCategory::Identifier,
            Number(_) | StringLit(_) | True | False => TokenCategory::Literal,
            Fn | Let | If | Else | While | Return | IntType | BoolType | StringType => {
                TokenCategory::Keyword
            }
            Plus | Minus | Star | Slash | Less | Greater | LessEqual | GreaterEqual
            | EqualEqual | BangEqual | AndAnd | OrOr | Bang | Equal => TokenCategory::Operator,
            LParen | RParen | LBrace | RBrace | Comma | Colon | Semicolon | Arrow => {
                TokenCategory::Punctuation
            }
            Eof => TokenCategory::Eof,
        }
    }

    /// Keyword lookup for a scanned identifier, `None` for plain names.
    pub fn keyword(ident: &str) -> Option<TokenKind<'static>> {
        let kind = match ident {
            "fn" => TokenKind::Fn,
            "let" => TokenKind::Let,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "return" => TokenKind::Return,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "int" => TokenKind::IntType,
            "bool" => TokenKind::BoolType,
            "string" => TokenKind::StringType,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'src> {
    pub kind: TokenKind<'src>,
    pub lexeme: &'src str,
    pub span: Span,
}

impl<'src> Token<'src> {
    pub fn new(kind: TokenKind<'src>, lexeme: &'src str, span: Span) -> Self {
        Self { kind, lexeme, span }
    }

    pub fn line(&self) -> u32 {
        self.span.start_line
    }

    pub fn column(&self) -> u32 {
        self.span.start_col
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_spans_in_either_order() {
        let first = Span::new(1, 4, 1, 7);
        let second = Span::new(3, 1, 3, 2);
        assert_eq!(first.merge(second), Span::new(1, 4, 3, 2));
        assert_eq!(second.merge(first), Span::new(1, 4, 3, 2));
    }

    #[test]
    fn categorizes_token_kinds() {
        assert_eq!(
            TokenKind::Identifier("x").category(),
            TokenCategory::Identifier
        );
        assert_eq!(TokenKind::Number(3).category(), TokenCategory::Literal);
        assert_eq!(TokenKind::True.category(), TokenCategory::Literal);
        assert_eq!(TokenKind::While.category(), TokenCategory::Keyword);
        assert_eq!(TokenKind::EqualEqual.category(), TokenCategory::Operator);
        assert_eq!(TokenKind::Arrow.category(), TokenCategory::Punctuation);
        assert_eq!(TokenKind::Eof.category(), TokenCategory::Eof);
    }

    #[test]
    fn recognizes_keywords() {
        assert_eq!(TokenKind::keyword("while"), Some(TokenKind::While));
        assert_eq!(TokenKind::keyword("string"), Some(TokenKind::StringType));
        assert_eq!(TokenKind::keyword("whileloop"), None);
    }
}
