//! Parser core: token plumbing, error recovery, and the top-level
//! `architecture` and section dispatch productions.

use std::path::{Path, PathBuf};

use crate::diagnostic::{
    DiagnosticPhase, IsaDiagnostic, SourcePosition, SourceSpan,
};
use crate::error::IsaError;
use crate::spec::{IsaSpecification, PropertyValue};

use super::{Lexer, Token, TokenKind, parse_int};
use super::{formats, instructions, registers};

/// One parsed source file before composition: its declarations plus whether
/// it carried an `architecture` block. A file without one is a partial and
/// becomes a complete specification only through composition.
#[derive(Debug, Clone)]
pub struct ParsedUnit {
    pub spec: IsaSpecification,
    pub has_architecture: bool,
}

pub struct Parser<'src> {
    lexer: Lexer<'src>,
    peeked: Option<Token>,
    last_token: Option<Token>,
    path: PathBuf,
    diagnostics: Vec<IsaDiagnostic>,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str, path: PathBuf) -> Self {
        Self {
            lexer: Lexer::new(source),
            peeked: None,
            last_token: None,
            path,
            diagnostics: Vec::new(),
        }
    }

    /// Parses a whole file. Syntax errors are collected and reported as one
    /// batch; parsing resumes at the next top-level item after each one.
    pub fn parse_document(&mut self) -> Result<ParsedUnit, IsaError> {
        let mut unit = ParsedUnit {
            spec: IsaSpecification::default(),
            has_architecture: false,
        };
        while !self.check(TokenKind::EOF)? {
            if let Err(err) = self.parse_top_level(&mut unit) {
                self.handle_parse_error(err)?;
            }
        }

        if self.diagnostics.is_empty() {
            Ok(unit)
        } else {
            Err(IsaError::Diagnostics {
                phase: DiagnosticPhase::Parser,
                diagnostics: std::mem::take(&mut self.diagnostics),
            })
        }
    }

    fn parse_top_level(&mut self, unit: &mut ParsedUnit) -> Result<(), IsaError> {
        let keyword = self.expect_identifier_token("section keyword")?;
        match keyword.lexeme.as_str() {
            "architecture" => self.parse_architecture(unit),
            "registers" => registers::parse_section(self, &mut unit.spec),
            "formats" => formats::parse_section(self, &mut unit.spec),
            "instructions" => instructions::parse_section(self, &mut unit.spec),
            other => Err(IsaError::Parser(format!(
                "unknown top-level section '{other}'"
            ))),
        }
    }

    /// `architecture NAME { property* section* }`. Properties are bare
    /// `name: value` pairs; anything whose name is a section keyword opens
    /// that section instead.
    fn parse_architecture(&mut self, unit: &mut ParsedUnit) -> Result<(), IsaError> {
        if unit.has_architecture {
            return Err(IsaError::Parser(
                "a file may declare at most one architecture block".into(),
            ));
        }
        let name = self.expect_identifier("architecture name")?;
        self.expect(TokenKind::LBrace, "'{' to open the architecture block")?;
        unit.has_architecture = true;
        unit.spec.name = name;
        unit.spec.source_path = Some(self.path.clone());

        while !self.check(TokenKind::RBrace)? && !self.check(TokenKind::EOF)? {
            let keyword = self.expect_identifier_token("architecture property or section")?;
            match keyword.lexeme.as_str() {
                "registers" => registers::parse_section(self, &mut unit.spec)?,
                "formats" => formats::parse_section(self, &mut unit.spec)?,
                "instructions" => instructions::parse_section(self, &mut unit.spec)?,
                _ => {
                    self.expect(TokenKind::Colon, "':' after property name")?;
                    let value = self.parse_property_value(&keyword.lexeme)?;
                    unit.spec.properties.insert(keyword.lexeme, value);
                }
            }
        }
        self.expect(TokenKind::RBrace, "'}' to close the architecture block")?;
        Ok(())
    }

    fn parse_property_value(&mut self, property: &str) -> Result<PropertyValue, IsaError> {
        let token = self.consume()?;
        match token.kind {
            TokenKind::Number => Ok(PropertyValue::Int(parse_int(&token.lexeme)?)),
            TokenKind::String => Ok(PropertyValue::Text(token.lexeme)),
            _ => Err(IsaError::Parser(format!(
                "expected a number or string value for property '{property}'"
            ))),
        }
    }

    pub(super) fn expect_identifier_token(&mut self, context: &str) -> Result<Token, IsaError> {
        let token = self.consume()?;
        if token.kind == TokenKind::Identifier {
            Ok(token)
        } else {
            Err(IsaError::Parser(format!(
                "expected identifier for {context}"
            )))
        }
    }

    pub(super) fn expect_identifier(&mut self, context: &str) -> Result<String, IsaError> {
        Ok(self.expect_identifier_token(context)?.lexeme)
    }

    pub(super) fn expect(&mut self, kind: TokenKind, context: &str) -> Result<Token, IsaError> {
        let token = self.consume()?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(IsaError::Parser(format!("expected {context}")))
        }
    }

    pub(super) fn expect_number(&mut self, context: &str) -> Result<u128, IsaError> {
        let token = self.expect(TokenKind::Number, context)?;
        parse_int(&token.lexeme)
    }

    /// Consumes the next token when it matches, returning whether it did.
    pub(super) fn match_token(&mut self, kind: TokenKind) -> Result<bool, IsaError> {
        if self.check(kind)? {
            self.consume()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Consumes the next token when it is the given bare keyword.
    pub(super) fn eat_keyword(&mut self, keyword: &str) -> Result<bool, IsaError> {
        if self.at_keyword(keyword)? {
            self.consume()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub(super) fn at_keyword(&mut self, keyword: &str) -> Result<bool, IsaError> {
        let token = self.peek()?;
        Ok(token.kind == TokenKind::Identifier && token.lexeme == keyword)
    }

    pub(super) fn check(&mut self, kind: TokenKind) -> Result<bool, IsaError> {
        Ok(self.peek()?.kind == kind)
    }

    pub(super) fn peek(&mut self) -> Result<&Token, IsaError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        Ok(self.peeked.as_ref().expect("peeked token must exist"))
    }

    pub(super) fn consume(&mut self) -> Result<Token, IsaError> {
        let token = if let Some(token) = self.peeked.take() {
            token
        } else {
            self.lexer.next_token()?
        };
        self.last_token = Some(token.clone());
        Ok(token)
    }

    fn handle_parse_error(&mut self, err: IsaError) -> Result<(), IsaError> {
        match err {
            IsaError::Parser(msg) => {
                self.push_parser_diagnostic(msg);
                self.synchronize();
                Ok(())
            }
            IsaError::Diagnostics {
                phase: DiagnosticPhase::Parser,
                diagnostics,
            } => {
                self.diagnostics.extend(diagnostics);
                self.synchronize();
                Ok(())
            }
            other => Err(other),
        }
    }

    fn push_parser_diagnostic(&mut self, message: String) {
        let span = self.current_error_span();
        self.diagnostics.push(IsaDiagnostic::error(
            DiagnosticPhase::Parser,
            "parser.syntax",
            message,
            span,
        ));
    }

    fn current_error_span(&mut self) -> Option<SourceSpan> {
        if let Some(token) = self.peeked.as_ref() {
            return Some(span_from_token(&self.path, token));
        }
        self.last_token
            .as_ref()
            .map(|token| span_from_token(&self.path, token))
    }

    /// Skips ahead to the next plausible top-level item so one syntax error
    /// does not cascade. Balanced brace groups are skipped whole and stray
    /// closers are swallowed.
    fn synchronize(&mut self) {
        loop {
            match self.peek() {
                Ok(token) => match token.kind {
                    TokenKind::EOF => break,
                    TokenKind::Identifier
                        if matches!(
                            token.lexeme.as_str(),
                            "architecture" | "registers" | "formats" | "instructions"
                        ) =>
                    {
                        break;
                    }
                    TokenKind::LBrace => {
                        if self.skip_braced_group().is_err() {
                            break;
                        }
                    }
                    _ => {
                        if self.consume().is_err() {
                            break;
                        }
                    }
                },
                Err(_) => break,
            }
        }
    }

    fn skip_braced_group(&mut self) -> Result<(), IsaError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut depth = 1usize;
        while depth > 0 {
            let token = self.consume()?;
            match token.kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth -= 1,
                TokenKind::EOF => break,
                _ => {}
            }
        }
        Ok(())
    }
}

fn span_from_token(path: &Path, token: &Token) -> SourceSpan {
    let start = SourcePosition::new(token.line, token.column);
    let mut line = token.line;
    let mut column = token.column;
    for ch in token.lexeme.chars() {
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    SourceSpan::new(path.to_path_buf(), start, SourcePosition::new(line, column))
}

/// Convenience helper used by the composer when parsing a file without
/// needing to hold onto the parser instance.
pub fn parse_str(path: PathBuf, src: &str) -> Result<ParsedUnit, IsaError> {
    let mut parser = Parser::new(src, path);
    parser.parse_document()
}
