//! Register-transfer behavior: the statement tree instructions carry and
//! the interpreter that executes it against machine state.

pub mod ast;
pub mod builtins;
pub mod interp;
pub mod pretty;

pub use ast::{BinaryOp, LValue, RtlBlock, RtlExpr, RtlStatement, UnaryOp};
pub use interp::{MachineState, RtlInterpreter};
