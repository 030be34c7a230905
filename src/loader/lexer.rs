//! Streaming tokenizer for `.isa` source text.
//!
//! `#include` lines are resolved before lexing (see
//! [`crate::loader::composer`]), so `#` never reaches this tokenizer in a
//! well-formed document.

use crate::error::IsaError;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    String,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Colon,
    Semicolon,
    Comma,
    Dot,
    Question,
    Equals,
    EqualEqual,
    BangEqual,
    Bang,
    Less,
    LessEqual,
    ShiftLeft,
    Greater,
    GreaterEqual,
    ShiftRight,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    AmpAmp,
    Pipe,
    PipePipe,
    Caret,
    Tilde,
    EOF,
}

#[derive(Clone, Copy)]
enum Radix {
    Binary,
    Octal,
    Decimal,
    Hex,
}

impl Radix {
    fn accepts(self, ch: char) -> bool {
        match self {
            Radix::Binary => matches!(ch, '0' | '1'),
            Radix::Octal => matches!(ch, '0'..='7'),
            Radix::Decimal => ch.is_ascii_digit(),
            Radix::Hex => ch.is_ascii_hexdigit(),
        }
    }
}

pub struct Lexer<'src> {
    src: &'src str,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str) -> Self {
        Self {
            src,
            offset: 0,
            line: 1,
            column: 0,
        }
    }

    /// Produces the next token.
    pub fn next_token(&mut self) -> Result<Token, IsaError> {
        self.skip_ignorable()?;
        if self.is_eof() {
            let (line, column) = self.position();
            return Ok(self.make_token(TokenKind::EOF, "", line, column));
        }
        let ch = self.peek_char().expect("not eof");

        match ch {
            '{' => Ok(self.consume_single(TokenKind::LBrace)),
            '}' => Ok(self.consume_single(TokenKind::RBrace)),
            '[' => Ok(self.consume_single(TokenKind::LBracket)),
            ']' => Ok(self.consume_single(TokenKind::RBracket)),
            '(' => Ok(self.consume_single(TokenKind::LParen)),
            ')' => Ok(self.consume_single(TokenKind::RParen)),
            ':' => Ok(self.consume_single(TokenKind::Colon)),
            ';' => Ok(self.consume_single(TokenKind::Semicolon)),
            ',' => Ok(self.consume_single(TokenKind::Comma)),
            '.' => Ok(self.consume_single(TokenKind::Dot)),
            '?' => Ok(self.consume_single(TokenKind::Question)),
            '+' => Ok(self.consume_single(TokenKind::Plus)),
            '-' => Ok(self.consume_single(TokenKind::Minus)),
            '*' => Ok(self.consume_single(TokenKind::Star)),
            '/' => Ok(self.consume_single(TokenKind::Slash)),
            '%' => Ok(self.consume_single(TokenKind::Percent)),
            '^' => Ok(self.consume_single(TokenKind::Caret)),
            '~' => Ok(self.consume_single(TokenKind::Tilde)),
            '=' => Ok(self.consume_paired('=', TokenKind::EqualEqual, TokenKind::Equals)),
            '!' => Ok(self.consume_paired('=', TokenKind::BangEqual, TokenKind::Bang)),
            '&' => Ok(self.consume_paired('&', TokenKind::AmpAmp, TokenKind::Amp)),
            '|' => Ok(self.consume_paired('|', TokenKind::PipePipe, TokenKind::Pipe)),
            '<' => Ok(self.consume_angle(TokenKind::ShiftLeft, TokenKind::LessEqual, TokenKind::Less)),
            '>' => Ok(self.consume_angle(TokenKind::ShiftRight, TokenKind::GreaterEqual, TokenKind::Greater)),
            '"' => self.consume_string(),
            '#' => Err(IsaError::Lexer(format!(
                "'#' directives must appear on their own line before any declaration, line {}, column {}",
                self.line,
                self.column + 1
            ))),
            ch if ch.is_ascii_digit() => self.consume_number(),
            ch if is_ident_start(ch) => Ok(self.consume_identifier()),
            _ => Err(IsaError::Lexer(format!(
                "unexpected character '{}', line {}, column {}",
                ch,
                self.line,
                self.column + 1
            ))),
        }
    }

    fn consume_identifier(&mut self) -> Token {
        let start = self.offset;
        let (line, column) = self.position();
        self.advance_char();
        while let Some(ch) = self.peek_char() {
            if is_ident_part(ch) {
                self.advance_char();
            } else {
                break;
            }
        }
        self.make_token_from_span(TokenKind::Identifier, start, self.offset, line, column)
    }

    fn consume_number(&mut self) -> Result<Token, IsaError> {
        let start = self.offset;
        let (line, column) = self.position();
        let mut radix = Radix::Decimal;
        let mut digits_consumed = 0usize;
        let mut require_digit = false;

        if self.peek_char() == Some('0') {
            self.advance_char();
            digits_consumed += 1;
            if let Some(next) = self.peek_char() {
                match next {
                    'x' | 'X' => {
                        radix = Radix::Hex;
                        self.advance_char();
                        digits_consumed = 0;
                        require_digit = true;
                    }
                    'b' | 'B' => {
                        radix = Radix::Binary;
                        self.advance_char();
                        digits_consumed = 0;
                        require_digit = true;
                    }
                    'o' | 'O' => {
                        radix = Radix::Octal;
                        self.advance_char();
                        digits_consumed = 0;
                        require_digit = true;
                    }
                    _ => {}
                }
            }
        } else {
            self.advance_char();
            digits_consumed += 1;
        }

        while let Some(ch) = self.peek_char() {
            if ch == '_' {
                self.advance_char();
                continue;
            }
            if radix.accepts(ch) {
                self.advance_char();
                digits_consumed += 1;
            } else {
                break;
            }
        }

        if require_digit && digits_consumed == 0 {
            return Err(IsaError::Lexer(format!(
                "numeric literal requires digits after its radix prefix, line {line}"
            )));
        }

        Ok(self.make_token_from_span(TokenKind::Number, start, self.offset, line, column))
    }

    fn consume_string(&mut self) -> Result<Token, IsaError> {
        let start_line = self.line;
        let start_col = self.column + 1;
        self.advance_char(); // opening quote
        let mut value = String::new();
        while let Some(ch) = self.peek_char() {
            match ch {
                '"' => {
                    self.advance_char();
                    return Ok(Token {
                        kind: TokenKind::String,
                        lexeme: value,
                        line: start_line,
                        column: start_col,
                    });
                }
                '\\' => {
                    self.advance_char();
                    if let Some(escaped) = self.peek_char() {
                        let actual = match escaped {
                            'n' => '\n',
                            't' => '\t',
                            '"' => '"',
                            '\\' => '\\',
                            other => other,
                        };
                        value.push(actual);
                        self.advance_char();
                    } else {
                        return Err(IsaError::Lexer(format!(
                            "unterminated escape sequence, line {start_line}"
                        )));
                    }
                }
                '\n' => {
                    return Err(IsaError::Lexer(format!(
                        "unterminated string literal, line {start_line}"
                    )));
                }
                other => {
                    value.push(other);
                    self.advance_char();
                }
            }
        }
        Err(IsaError::Lexer(format!(
            "unterminated string literal, line {start_line}"
        )))
    }

    /// Two-character operator when `second` follows, else the single form.
    fn consume_paired(&mut self, second: char, double: TokenKind, single: TokenKind) -> Token {
        let start = self.offset;
        let (line, column) = self.position();
        self.advance_char();
        if self.peek_char() == Some(second) {
            self.advance_char();
            self.make_token_from_span(double, start, self.offset, line, column)
        } else {
            self.make_token_from_span(single, start, self.offset, line, column)
        }
    }

    /// `<` and `>` each have three forms: shift, comparison-equal, plain.
    fn consume_angle(&mut self, shift: TokenKind, le_ge: TokenKind, plain: TokenKind) -> Token {
        let start = self.offset;
        let (line, column) = self.position();
        let first = self.peek_char().expect("caller checked");
        self.advance_char();
        match self.peek_char() {
            Some(ch) if ch == first => {
                self.advance_char();
                self.make_token_from_span(shift, start, self.offset, line, column)
            }
            Some('=') => {
                self.advance_char();
                self.make_token_from_span(le_ge, start, self.offset, line, column)
            }
            _ => self.make_token_from_span(plain, start, self.offset, line, column),
        }
    }

    fn consume_line_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            self.advance_char();
            if ch == '\n' {
                break;
            }
        }
    }

    fn consume_block_comment(&mut self) -> Result<(), IsaError> {
        let start_line = self.line;
        self.advance_char(); // '/'
        self.advance_char(); // '*'
        while let Some(ch) = self.peek_char() {
            if ch == '*' && self.peek_next_char() == Some('/') {
                self.advance_char();
                self.advance_char();
                return Ok(());
            }
            self.advance_char();
        }
        Err(IsaError::Lexer(format!(
            "unterminated block comment, line {start_line}"
        )))
    }

    fn consume_single(&mut self, kind: TokenKind) -> Token {
        let start = self.offset;
        let (line, column) = self.position();
        self.advance_char();
        self.make_token_from_span(kind, start, self.offset, line, column)
    }

    fn skip_ignorable(&mut self) -> Result<(), IsaError> {
        loop {
            self.skip_whitespace();
            match (self.peek_char(), self.peek_next_char()) {
                (Some('/'), Some('/')) => self.consume_line_comment(),
                (Some('/'), Some('*')) => self.consume_block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.offset..].chars().next()
    }

    fn peek_next_char(&self) -> Option<char> {
        let mut iter = self.src[self.offset..].chars();
        iter.next()?;
        iter.next()
    }

    fn advance_char(&mut self) {
        if let Some(ch) = self.peek_char() {
            let len = ch.len_utf8();
            self.offset += len;
            if ch == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        } else {
            self.offset = self.src.len();
        }
    }

    fn is_eof(&self) -> bool {
        self.offset >= self.src.len()
    }

    fn position(&self) -> (usize, usize) {
        (self.line, self.column + 1)
    }

    fn make_token(&self, kind: TokenKind, lexeme: &str, line: usize, column: usize) -> Token {
        Token {
            kind,
            lexeme: lexeme.to_string(),
            line,
            column,
        }
    }

    fn make_token_from_span(
        &self,
        kind: TokenKind,
        start: usize,
        end: usize,
        line: usize,
        column: usize,
    ) -> Token {
        let slice = &self.src[start..end];
        self.make_token(kind, slice, line, column)
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_part(ch: char) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

/// Parses an integer literal lexeme, honoring `0x`/`0b`/`0o` prefixes and
/// `_` digit separators.
pub fn parse_int(lexeme: &str) -> Result<u128, IsaError> {
    let cleaned: String = lexeme.chars().filter(|&ch| ch != '_').collect();
    let (digits, radix) = if let Some(rest) = cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        (rest, 16)
    } else if let Some(rest) = cleaned.strip_prefix("0b").or_else(|| cleaned.strip_prefix("0B")) {
        (rest, 2)
    } else if let Some(rest) = cleaned.strip_prefix("0o").or_else(|| cleaned.strip_prefix("0O")) {
        (rest, 8)
    } else {
        (cleaned.as_str(), 10)
    };
    u128::from_str_radix(digits, radix)
        .map_err(|err| IsaError::Lexer(format!("invalid numeric literal '{lexeme}': {err}")))
}
