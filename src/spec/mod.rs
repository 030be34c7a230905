//! The architecture model: registers, formats, instructions, and the
//! operations defined over them.
//!
//! Everything in this module is plain data plus bit arithmetic. Parsing
//! produces an [`IsaSpecification`], composition merges several of them,
//! validation inspects one, and the drivers in [`crate::codegen`] consume
//! one. No module here performs I/O.

pub mod builder;
pub mod field;
pub mod format;
pub mod instruction;
pub mod matcher;
pub mod model;
pub mod register;
pub mod validator;

pub use builder::SpecBuilder;
pub use field::BitField;
pub use format::{BundleFormat, BundleSlot, InstructionFormat};
pub use instruction::{EncodingAssignment, Instruction, InstructionAlias, OperandSpec};
pub use matcher::{InstructionMatch, InstructionMatcher};
pub use model::{IsaSpecification, PropertyValue};
pub use register::{Register, RegisterAlias, RegisterKind, VirtualComponent, VirtualRegister};
pub use validator::Validator;
