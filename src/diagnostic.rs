//! Structured diagnostics shared by the lexer, parser, and validator.

use std::path::PathBuf;

/// Phase of the pipeline that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticPhase {
    Lexer,
    Parser,
    Validation,
}

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

/// A precise source position (1-indexed line/column) inside an ISA document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
}

impl SourcePosition {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A [start, end] span referencing a specific ISA file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    pub path: PathBuf,
    pub start: SourcePosition,
    pub end: SourcePosition,
}

impl SourceSpan {
    pub fn new(path: PathBuf, start: SourcePosition, end: SourcePosition) -> Self {
        Self { path, start, end }
    }

    pub fn point(path: PathBuf, position: SourcePosition) -> Self {
        Self {
            path,
            start: position,
            end: position,
        }
    }
}

/// Structured diagnostic suitable for batch reporting.
#[derive(Debug, Clone)]
pub struct IsaDiagnostic {
    pub phase: DiagnosticPhase,
    pub level: DiagnosticLevel,
    pub code: &'static str,
    pub message: String,
    pub span: Option<SourceSpan>,
}

impl IsaDiagnostic {
    pub fn error(
        phase: DiagnosticPhase,
        code: &'static str,
        message: impl Into<String>,
        span: Option<SourceSpan>,
    ) -> Self {
        Self {
            phase,
            level: DiagnosticLevel::Error,
            code,
            message: message.into(),
            span,
        }
    }

    pub fn warning(
        phase: DiagnosticPhase,
        code: &'static str,
        message: impl Into<String>,
        span: Option<SourceSpan>,
    ) -> Self {
        Self {
            phase,
            level: DiagnosticLevel::Warning,
            code,
            message: message.into(),
            span,
        }
    }

    pub fn format_human(&self) -> String {
        let location = self
            .span
            .as_ref()
            .map(|span| {
                format!(
                    "{}:{}:{}",
                    span.path.display(),
                    span.start.line,
                    span.start.column
                )
            })
            .unwrap_or_else(|| "<unknown>".to_string());
        format!(
            "{level:?} {code}: {message} @ {location}",
            level = self.level,
            code = self.code,
            message = self.message,
            location = location
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_location() {
        let span = SourceSpan::point(PathBuf::from("core.isa"), SourcePosition::new(4, 9));
        let diag = IsaDiagnostic::error(
            DiagnosticPhase::Validation,
            "field-overlap",
            "fields 'opcode' and 'rd' overlap",
            Some(span),
        );
        let text = diag.format_human();
        assert!(text.contains("field-overlap"));
        assert!(text.contains("core.isa:4:9"));
    }

    #[test]
    fn formats_without_location() {
        let diag = IsaDiagnostic::warning(DiagnosticPhase::Parser, "empty-block", "empty block", None);
        assert!(diag.format_human().contains("<unknown>"));
    }
}
