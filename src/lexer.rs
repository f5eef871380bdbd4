use std::{iter::Peekable, str::CharIndices};

use thiserror::Error;

use crate::token::{Span, Token, TokenKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Unexpected character '{character}' at {line}:{col}")]
    UnexpectedCharacter { character: char, line: u32, col: u32 },
    #[error("Unterminated string literal at {line}:{col}")]
    UnterminatedString { line: u32, col: u32 },
    #[error("Number literal '{literal}' is out of range at {line}:{col}")]
    NumberOutOfRange {
        literal: String,
        line: u32,
        col: u32,
    },
}

impl LexError {
    pub fn line(&self) -> u32 {
        match self {
            LexError::UnexpectedCharacter { line, .. }
            | LexError::UnterminatedString { line, .. }
            | LexError::NumberOutOfRange { line, .. } => *line,
        }
    }

    pub fn col(&self) -> u32 {
        match self {
            LexError::UnexpectedCharacter { col, .. }
            | LexError::UnterminatedString { col, .. }
            | LexError::NumberOutOfRange { col, .. } => *col,
        }
    }
}

/// Streaming scanner producing a finite token sequence terminated by `Eof`.
///
/// Unrecognised input is reported through the accumulated error list and
/// skipped, so downstream stages always see a best-effort token stream.
pub struct Lexer<'src> {
    input: &'src str,
    base: usize,
    chars: Peekable<CharIndices<'src>>,
    line: u32,
    column: u32,
    errors: Vec<LexError>,
    eof_emitted: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(input: &'src str) -> Self {
        Self {
            input,
            base: 0,
            chars: input.char_indices().peekable(),
            line: 1,
            column: 1,
            errors: Vec::new(),
            eof_emitted: false,
        }
    }

    /// Restart lexing from an arbitrary byte offset of `input`, recomputing
    /// the line/column position from the preceding text. The offset is
    /// snapped back to the nearest character boundary.
    pub fn starting_at(input: &'src str, offset: usize) -> Self {
        let mut offset = offset.min(input.len());
        while !input.is_char_boundary(offset) {
            offset -= 1;
        }
        let prefix = &input[..offset];
        let line = 1 + prefix.matches('\n').count() as u32;
        let column = 1 + prefix.chars().rev().take_while(|&c| c != '\n').count() as u32;
        Self {
            input,
            base: offset,
            chars: input[offset..].char_indices().peekable(),
            line,
            column,
            errors: Vec::new(),
            eof_emitted: false,
        }
    }

    /// Errors recorded so far. Complete once `Eof` has been produced.
    pub fn errors(&self) -> &[LexError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<LexError> {
        self.errors
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn current_index(&mut self) -> usize {
        match self.chars.peek() {
            Some(&(idx, _)) => self.base + idx,
            None => self.input.len(),
        }
    }

    fn advance_char(&mut self) -> Option<char> {
        let next = self.chars.next().map(|(_, c)| c);
        if let Some(c) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.advance_char();
            } else if c == '/' && self.peek_second() == Some('/') {
                while let Some(c) = self.peek_char() {
                    if c == '\n' {
                        break;
                    }
                    self.advance_char();
                }
            } else {
                break;
            }
        }
    }

    fn peek_second(&mut self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next().map(|(_, c)| c)
    }

    fn next_token(&mut self) -> Token<'src> {
        loop {
            self.skip_trivia();

            let Some(c) = self.peek_char() else {
                self.eof_emitted = true;
                let at = self.input.len();
                let span = Span::new(self.line, self.column, self.line, self.column);
                return Token::new(TokenKind::Eof, &self.input[at..at], span);
            };
            let start = self.current_index();
            let start_line = self.line;
            let start_col = self.column;

            if c.is_alphabetic() || c == '_' {
                return self.read_identifier(start, start_line, start_col);
            }
            if c.is_ascii_digit() {
                match self.read_number(start, start_line, start_col) {
                    Some(token) => return token,
                    None => continue,
                }
            }
            if c == '"' {
                match self.read_string(start, start_line, start_col) {
                    Some(token) => return token,
                    None => continue,
                }
            }
            match self.read_operator(start, start_line, start_col) {
                Some(token) => return token,
                None => {
                    // Skip the offending character and keep scanning.
                    self.advance_char();
                    self.errors.push(LexError::UnexpectedCharacter {
                        character: c,
                        line: start_line,
                        col: start_col,
                    });
                }
            }
        }
    }

    fn span_from(&self, start_line: u32, start_col: u32) -> Span {
        Span::new(start_line, start_col, self.line, self.column)
    }

    fn read_identifier(&mut self, start: usize, line: u32, col: u32) -> Token<'src> {
        self.advance_char();
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' {
                self.advance_char();
            } else {
                break;
            }
        }
        let lexeme = &self.input[start..self.current_index()];
        let kind = TokenKind::keyword(lexeme).unwrap_or(TokenKind::Identifier(lexeme));
        Token::new(kind, lexeme, self.span_from(line, col))
    }

    fn read_number(&mut self, start: usize, line: u32, col: u32) -> Option<Token<'src>> {
        self.advance_char();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.advance_char();
            } else {
                break;
            }
        }
        let lexeme = &self.input[start..self.current_index()];
        match lexeme.parse::<i64>() {
            Ok(value) => Some(Token::new(
                TokenKind::Number(value),
                lexeme,
                self.span_from(line, col),
            )),
            Err(_) => {
                self.errors.push(LexError::NumberOutOfRange {
                    literal: lexeme.to_string(),
                    line,
                    col,
                });
                None
            }
        }
    }

    fn read_string(&mut self, start: usize, line: u32, col: u32) -> Option<Token<'src>> {
        self.advance_char(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek_char() {
                None | Some('\n') => {
                    // Leave the newline for trivia so the next line lexes cleanly.
                    self.errors.push(LexError::UnterminatedString { line, col });
                    return None;
                }
                Some('"') => {
                    self.advance_char();
                    let lexeme = &self.input[start..self.current_index()];
                    return Some(Token::new(
                        TokenKind::StringLit(value),
                        lexeme,
                        self.span_from(line, col),
                    ));
                }
                Some('\\') => {
                    self.advance_char();
                    match self.advance_char() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some('0') => value.push('\0'),
                        Some(other) => value.push(other),
                        None => {
                            self.errors.push(LexError::UnterminatedString { line, col });
                            return None;
                        }
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.advance_char();
                }
            }
        }
    }

    /// Operators and punctuation, longest match first so `==`, `<=`, `->`
    /// and friends win over their one-character prefixes.
    fn read_operator(&mut self, start: usize, line: u32, col: u32) -> Option<Token<'src>> {
        let first = self.peek_char()?;
        let second = self.peek_second();
        let (kind, len) = match (first, second) {
            ('=', Some('=')) => (TokenKind::EqualEqual, 2),
            ('!', Some('=')) => (TokenKind::BangEqual, 2),
            ('<', Some('=')) => (TokenKind::LessEqual, 2),
            ('>', Some('=')) => (TokenKind::GreaterEqual, 2),
            ('&', Some('&')) => (TokenKind::AndAnd, 2),
            ('|', Some('|')) => (TokenKind::OrOr, 2),
            ('-', Some('>')) => (TokenKind::Arrow, 2),
            ('+', _) => (TokenKind::Plus, 1),
            ('-', _) => (TokenKind::Minus, 1),
            ('*', _) => (TokenKind::Star, 1),
            ('/', _) => (TokenKind::Slash, 1),
            ('<', _) => (TokenKind::Less, 1),
            ('>', _) => (TokenKind::Greater, 1),
            ('!', _) => (TokenKind::Bang, 1),
            ('=', _) => (TokenKind::Equal, 1),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('{', _) => (TokenKind::LBrace, 1),
            ('}', _) => (TokenKind::RBrace, 1),
            (',', _) => (TokenKind::Comma, 1),
            (':', _) => (TokenKind::Colon, 1),
            (';', _) => (TokenKind::Semicolon, 1),
            _ => return None,
        };
        for _ in 0..len {
            self.advance_char();
        }
        let lexeme = &self.input[start..self.current_index()];
        Some(Token::new(kind, lexeme, self.span_from(line, col)))
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token<'src>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.eof_emitted {
            return None;
        }
        Some(self.next_token())
    }
}

/// Lex the whole input, returning the token stream (always ending in `Eof`)
/// together with every error encountered along the way.
pub fn tokenize(input: &str) -> (Vec<Token<'_>>, Vec<LexError>) {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    for token in lexer.by_ref() {
        tokens.push(token);
    }
    (tokens, lexer.into_errors())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        let (tokens, errors) = tokenize(input);
        assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
        tokens.into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn lexes_arithmetic_expression() {
        assert_eq!(
            kinds("2+3*4"),
            vec![Number(2), Plus, Number(3), Star, Number(4), Eof]
        );
    }

    #[test]
    fn lexes_function_declaration() {
        let input = indoc! {r#"
            // entry point
            fn main() -> int {
                let msg: string = "hi\n";
                println(msg);
                return 0;
            }
        "#};
        assert_eq!(
            kinds(input),
            vec![
                Fn,
                Identifier("main"),
                LParen,
                RParen,
                Arrow,
                IntType,
                LBrace,
                Let,
                Identifier("msg"),
                Colon,
                StringType,
                Equal,
                StringLit("hi\n".to_string()),
                Semicolon,
                Identifier("println"),
                LParen,
                Identifier("msg"),
                RParen,
                Semicolon,
                Return,
                Number(0),
                Semicolon,
                RBrace,
                Eof,
            ]
        );
    }

    #[test]
    fn prefers_longest_operator_match() {
        assert_eq!(
            kinds("a <= b == c && d != e"),
            vec![
                Identifier("a"),
                LessEqual,
                Identifier("b"),
                EqualEqual,
                Identifier("c"),
                AndAnd,
                Identifier("d"),
                BangEqual,
                Identifier("e"),
                Eof,
            ]
        );
        assert_eq!(kinds("< = > -"), vec![Less, Equal, Greater, Minus, Eof]);
    }

    #[test]
    fn records_positions() {
        let (tokens, _) = tokenize("let x;\n  x");
        assert_eq!(tokens[0].span, crate::token::Span::new(1, 1, 1, 4));
        assert_eq!(tokens[1].span, crate::token::Span::new(1, 5, 1, 6));
        assert_eq!(tokens[3].span, crate::token::Span::new(2, 3, 2, 4));
    }

    #[test]
    fn skips_unexpected_character_and_continues() {
        let (tokens, errors) = tokenize("let @ x");
        let kinds: Vec<_> = tokens.into_iter().map(|token| token.kind).collect();
        assert_eq!(kinds, vec![Let, Identifier("x"), Eof]);
        assert_eq!(
            errors,
            vec![LexError::UnexpectedCharacter {
                character: '@',
                line: 1,
                col: 5,
            }]
        );
    }

    #[test]
    fn recovers_from_unterminated_string() {
        let (tokens, errors) = tokenize("let s: string = \"oops;\nlet y: int;");
        assert_eq!(
            errors,
            vec![LexError::UnterminatedString { line: 1, col: 17 }]
        );
        // Lexing resumes on the following line.
        assert!(
            tokens
                .iter()
                .any(|token| token.kind == Identifier("y") && token.line() == 2)
        );
    }

    #[test]
    fn reports_number_out_of_range() {
        let (tokens, errors) = tokenize("99999999999999999999999999");
        assert_eq!(tokens.len(), 1, "only Eof should remain");
        assert!(matches!(errors[0], LexError::NumberOutOfRange { .. }));
    }

    #[test]
    fn restarts_from_byte_offset() {
        let input = "let a: int = 1;\nlet b: int = 2;\n";
        let offset = input.find("let b").expect("offset of second decl");
        let restarted: Vec<_> = Lexer::starting_at(input, offset).collect();
        assert_eq!(restarted[0].kind, Let);
        assert_eq!(restarted[1].kind, Identifier("b"));
        assert_eq!(restarted[1].span.start_line, 2);
        assert_eq!(restarted[1].span.start_col, 5);
    }

    #[test]
    fn empty_input_yields_single_eof() {
        let (tokens, errors) = tokenize("");
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_eof());
        assert!(errors.is_empty());
    }
}
