//! Failure taxonomy for loading, composing, validating, and executing ISA
//! descriptions. Composition policy violations are fatal and carry the
//! offending paths; lexer/parser/validation problems travel as diagnostic
//! batches so one run reports everything it found.

use std::fmt;
use std::path::PathBuf;

use crate::diagnostic::{DiagnosticPhase, IsaDiagnostic};

pub type IsaResult<T> = Result<T, IsaError>;

#[derive(Debug)]
pub enum IsaError {
    Io(std::io::Error),
    /// Single tokenizer failure; the parser folds these into a batch.
    Lexer(String),
    /// Single syntax failure; the parser folds these into a batch.
    Parser(String),
    Diagnostics {
        phase: DiagnosticPhase,
        diagnostics: Vec<IsaDiagnostic>,
    },
    /// An `#include` path was revisited while still being resolved.
    CircularDependency {
        chain: Vec<PathBuf>,
    },
    /// More than one direct include carries an `architecture` block.
    MultipleInheritance {
        path: PathBuf,
        bases: Vec<PathBuf>,
    },
    /// An include carries an `architecture` block but the including file
    /// does not declare one of its own.
    ArchitectureExtensionRequired {
        path: PathBuf,
        base: PathBuf,
    },
    /// In inheritance mode every sibling of the base must be a partial.
    PartialDefinitionRequired {
        path: PathBuf,
        offender: PathBuf,
    },
    /// Merge mode requires globally unique entity names.
    DuplicateDefinition {
        kind: &'static str,
        name: String,
        first: PathBuf,
        second: PathBuf,
    },
    /// Fault raised while assembling source text against the model.
    Assembly(String),
    /// Fault raised while interpreting an instruction's behavior.
    Execution(String),
}

impl From<std::io::Error> for IsaError {
    fn from(err: std::io::Error) -> Self {
        IsaError::Io(err)
    }
}

impl fmt::Display for IsaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsaError::Io(err) => write!(f, "I/O error: {err}"),
            IsaError::Lexer(msg) => write!(f, "lexer error: {msg}"),
            IsaError::Parser(msg) => write!(f, "parser error: {msg}"),
            IsaError::Diagnostics { phase, diagnostics } => {
                writeln!(f, "{phase:?} produced {} issue(s):", diagnostics.len())?;
                for diag in diagnostics {
                    writeln!(f, "  - {}", diag.format_human())?;
                }
                Ok(())
            }
            IsaError::CircularDependency { chain } => {
                let rendered: Vec<String> = chain
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect();
                write!(f, "circular dependency detected: {}", rendered.join(" -> "))
            }
            IsaError::MultipleInheritance { path, bases } => {
                let rendered: Vec<String> = bases
                    .iter()
                    .map(|base| base.display().to_string())
                    .collect();
                write!(
                    f,
                    "{} includes more than one architecture definition: {}",
                    path.display(),
                    rendered.join(", ")
                )
            }
            IsaError::ArchitectureExtensionRequired { path, base } => write!(
                f,
                "{} includes architecture {} and must declare an architecture block of its own",
                path.display(),
                base.display()
            ),
            IsaError::PartialDefinitionRequired { path, offender } => write!(
                f,
                "{} already inherits an architecture; {} must be a partial definition",
                path.display(),
                offender.display()
            ),
            IsaError::DuplicateDefinition {
                kind,
                name,
                first,
                second,
            } => write!(
                f,
                "duplicate {kind} '{name}' defined in both {} and {}",
                first.display(),
                second.display()
            ),
            IsaError::Assembly(msg) => write!(f, "assembly error: {msg}"),
            IsaError::Execution(msg) => write!(f, "execution error: {msg}"),
        }
    }
}

impl std::error::Error for IsaError {}

impl IsaError {
    pub fn assembly(msg: impl Into<String>) -> Self {
        IsaError::Assembly(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        IsaError::Execution(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_names_full_chain() {
        let err = IsaError::CircularDependency {
            chain: vec![
                PathBuf::from("a.isa"),
                PathBuf::from("b.isa"),
                PathBuf::from("a.isa"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "circular dependency detected: a.isa -> b.isa -> a.isa"
        );
    }

    #[test]
    fn duplicate_message_names_both_locations() {
        let err = IsaError::DuplicateDefinition {
            kind: "register",
            name: "R".to_string(),
            first: PathBuf::from("base.isa"),
            second: PathBuf::from("ext.isa"),
        };
        let text = err.to_string();
        assert!(text.contains("base.isa"));
        assert!(text.contains("ext.isa"));
        assert!(text.contains("register 'R'"));
    }
}
