//! Recursive-descent parser for the `.isa` description language.
//!
//! [`document`] owns the token plumbing and top-level dispatch; the
//! section modules each own one declaration family. All of them report
//! through [`Parser::parse_document`]'s diagnostic batch.

mod behavior;
mod document;
mod formats;
mod instructions;
mod registers;

pub use document::{ParsedUnit, Parser, parse_str};

pub(super) use super::lexer::{Lexer, Token, TokenKind, parse_int};
