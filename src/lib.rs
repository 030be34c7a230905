//! Compiler for textual instruction-set descriptions.
//!
//! An `.isa` document declares registers, encoding formats, instructions,
//! and their register-transfer behaviors; documents compose through
//! `#include` with inheritance and override rules. The pipeline is
//! [`loader`] (lex, parse, compose, validate) into the [`spec`] model, and
//! [`codegen`] derives the toolchain from that model: assembler,
//! disassembler, behavioral simulator, and reference documentation. [`rtl`]
//! holds the behavior trees, their interpreter, and the shared formatter.
//!
//! ```no_run
//! use isaforge::codegen::BuildPlan;
//! use isaforge::loader::IsaComposer;
//! use isaforge::spec::Validator;
//!
//! # fn main() -> isaforge::error::IsaResult<()> {
//! let mut composer = IsaComposer::new();
//! let spec = composer.compose("demo.isa")?;
//! Validator::new().validate(&spec)?;
//! let build = BuildPlan::new(&spec, composer.fingerprint()).run();
//! assert!(build.documentation.is_some());
//! # Ok(())
//! # }
//! ```

pub mod codegen;
pub mod diagnostic;
pub mod error;
pub mod loader;
pub mod rtl;
pub mod spec;

pub use codegen::{Artifacts, BuildPlan, ToolchainBuild};
pub use error::{IsaError, IsaResult};
pub use loader::load_specification;
pub use spec::IsaSpecification;
