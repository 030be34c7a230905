//! `.isa` file loading: lexer, parser, and the include composer.

pub mod composer;
pub mod lexer;
pub mod parser;

pub use composer::{IsaComposer, compose_file};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::{ParsedUnit, Parser, parse_str};

use std::path::Path;

use crate::error::IsaResult;
use crate::spec::{IsaSpecification, Validator};

/// Composes the include tree rooted at `entry` and validates the result.
/// This is the front door for consumers that just want a usable model.
pub fn load_specification<P: AsRef<Path>>(entry: P) -> IsaResult<IsaSpecification> {
    let spec = compose_file(entry)?;
    Validator::new().validate(&spec)?;
    Ok(spec)
}
