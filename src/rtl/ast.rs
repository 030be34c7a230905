//! Register-transfer-level behavior trees attached to instructions.
//!
//! The parser lowers each `behavior` block into an [`RtlBlock`]; the
//! interpreter walks it and the documentation driver pretty-prints it. All
//! nodes are plain data so behaviors can be built programmatically too.

/// A parsed `behavior` block: one or more statements executed in order.
#[derive(Debug, Clone, PartialEq)]
pub struct RtlBlock {
    pub statements: Vec<RtlStatement>,
}

impl RtlBlock {
    pub fn new(statements: Vec<RtlStatement>) -> Self {
        Self { statements }
    }
}

/// An assignment, shared by plain statements and `for` headers.
#[derive(Debug, Clone, PartialEq)]
pub struct RtlAssignment {
    pub target: LValue,
    pub expr: RtlExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RtlStatement {
    Assignment(RtlAssignment),
    Conditional {
        condition: RtlExpr,
        then_body: Vec<RtlStatement>,
        else_body: Vec<RtlStatement>,
    },
    /// `MEM[address] = value`
    MemoryStore { address: RtlExpr, value: RtlExpr },
    /// `target = MEM[address]`
    MemoryLoad { target: LValue, address: RtlExpr },
    /// No iteration cap is enforced here; a condition that never goes false
    /// is the author's error, bounded only by the interpreter's optional
    /// step budget.
    ForLoop {
        init: RtlAssignment,
        condition: RtlExpr,
        update: RtlAssignment,
        body: Vec<RtlStatement>,
    },
}

/// Assignment targets.
#[derive(Debug, Clone, PartialEq)]
pub enum LValue {
    /// `R[expr]`, or a register file name with no index.
    Register { reg: String, index: Option<Box<RtlExpr>> },
    /// `FLAGS.C`
    Field { reg: String, field: String },
    /// A bare name; resolved at evaluation time to a declared register,
    /// virtual register, alias, or a fresh temporary.
    Variable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RtlExpr {
    Constant(u128),
    /// A bare name read: an operand, temporary, or declared register,
    /// resolved at evaluation time.
    OperandRef(String),
    Register { reg: String, index: Option<Box<RtlExpr>> },
    Field { reg: String, field: String },
    Binary { op: BinaryOp, left: Box<RtlExpr>, right: Box<RtlExpr> },
    Unary { op: UnaryOp, expr: Box<RtlExpr> },
    Ternary {
        condition: Box<RtlExpr>,
        then_expr: Box<RtlExpr>,
        else_expr: Box<RtlExpr>,
    },
    /// `base[msb:lsb]`, inclusive on both ends.
    BitSlice { base: Box<RtlExpr>, msb: u32, lsb: u32 },
    Call { function: String, args: Vec<RtlExpr> },
}

impl RtlExpr {
    pub fn binary(op: BinaryOp, left: RtlExpr, right: RtlExpr) -> Self {
        RtlExpr::Binary { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn unary(op: UnaryOp, expr: RtlExpr) -> Self {
        RtlExpr::Unary { op, expr: Box::new(expr) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinaryOp {
    /// Source-form operator token, used by the documentation renderer.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}
