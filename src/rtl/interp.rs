//! Tree-walking interpreter for instruction behavior blocks.
//!
//! Arithmetic follows the 32-bit architectural domain: binary and unary
//! operators reinterpret their operands as signed 32-bit integers, compute
//! exactly, and mask the result back to 32 bits. Comparisons are signed and
//! yield `0`/`1`. Division and modulo floor toward negative infinity, and a
//! zero divisor yields `0` rather than trapping. Right shift is arithmetic
//! when the sign bit is set.
//!
//! Name resolution for bare identifiers goes register alias, then virtual
//! register, then concrete register, then execution-local temporary, then
//! operand, then `0`. Unknown names in explicit register syntax (`Q[i]`,
//! `Q.field`) are hard errors: they signal a broken ISA definition, not a
//! missing operand.

use std::collections::BTreeMap;

use ahash::AHashMap;

use crate::error::{IsaError, IsaResult};
use crate::rtl::ast::{
    BinaryOp, LValue, RtlAssignment, RtlBlock, RtlExpr, RtlStatement, UnaryOp,
};
use crate::rtl::builtins::{self, WORD_MASK};
use crate::spec::field::mask_bits;
use crate::spec::instruction::Instruction;
use crate::spec::model::IsaSpecification;
use crate::spec::register::{Register, VirtualRegister};

/// Value of one declared register: a scalar or an indexable file.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterValue {
    Scalar(u128),
    File(Vec<u128>),
}

/// Mutable register and memory state threaded through execution.
///
/// Memory is word-oriented: a 32-bit key holds a 32-bit masked value, and
/// unwritten addresses read as `0`.
#[derive(Debug, Clone, Default)]
pub struct MachineState {
    pub registers: BTreeMap<String, RegisterValue>,
    pub memory: AHashMap<u32, u128>,
}

impl MachineState {
    /// Zero-initializes every register the specification declares.
    pub fn from_spec(spec: &IsaSpecification) -> Self {
        let mut registers = BTreeMap::new();
        for reg in &spec.registers {
            let value = match reg.count {
                Some(count) => RegisterValue::File(vec![0; count as usize]),
                None => RegisterValue::Scalar(0),
            };
            registers.insert(reg.name.clone(), value);
        }
        Self { registers, memory: AHashMap::new() }
    }

    pub fn scalar(&self, name: &str) -> Option<u128> {
        match self.registers.get(name)? {
            RegisterValue::Scalar(v) => Some(*v),
            RegisterValue::File(_) => None,
        }
    }

    pub fn set_scalar(&mut self, name: &str, value: u128) -> bool {
        match self.registers.get_mut(name) {
            Some(RegisterValue::Scalar(v)) => {
                *v = value;
                true
            }
            _ => false,
        }
    }

    pub fn element(&self, name: &str, index: usize) -> Option<u128> {
        match self.registers.get(name)? {
            RegisterValue::File(values) => values.get(index).copied(),
            RegisterValue::Scalar(_) => None,
        }
    }

    pub fn set_element(&mut self, name: &str, index: usize, value: u128) -> bool {
        match self.registers.get_mut(name) {
            Some(RegisterValue::File(values)) if index < values.len() => {
                values[index] = value;
                true
            }
            _ => false,
        }
    }
}

/// What a register-ish name resolved to.
enum Resolved<'a> {
    Concrete(&'a Register, Option<u128>),
    Virtual(&'a VirtualRegister),
}

/// Executes behavior blocks against a [`MachineState`].
pub struct RtlInterpreter<'a> {
    spec: &'a IsaSpecification,
    state: &'a mut MachineState,
    operands: AHashMap<String, u128>,
    /// Execution-local temporaries, inspectable after a run.
    pub variables: AHashMap<String, u128>,
    step_budget: Option<u64>,
    steps: u64,
}

impl<'a> RtlInterpreter<'a> {
    pub fn new(spec: &'a IsaSpecification, state: &'a mut MachineState) -> Self {
        Self {
            spec,
            state,
            operands: AHashMap::new(),
            variables: AHashMap::new(),
            step_budget: None,
            steps: 0,
        }
    }

    /// Caps the number of statements one run may execute, as a stop against
    /// RTL whose loop condition never goes false.
    pub fn with_step_budget(mut self, budget: u64) -> Self {
        self.step_budget = Some(budget);
        self
    }

    /// Replaces the operand environment for the next execution.
    pub fn set_operands<I>(&mut self, operands: I)
    where
        I: IntoIterator<Item = (String, u128)>,
    {
        self.operands = operands.into_iter().collect();
    }

    pub fn set_operand(&mut self, name: impl Into<String>, value: u128) {
        self.operands.insert(name.into(), value);
    }

    /// Drops temporaries from a previous execution.
    pub fn clear_locals(&mut self) {
        self.variables.clear();
    }

    /// Runs the instruction's behavior block, if it has one.
    pub fn execute(&mut self, instruction: &Instruction) -> IsaResult<()> {
        let Some(behavior) = instruction.behavior.as_ref() else {
            return Ok(());
        };
        self.run_block(behavior)
    }

    pub fn run_block(&mut self, block: &RtlBlock) -> IsaResult<()> {
        for stmt in &block.statements {
            self.run_statement(stmt)?;
        }
        Ok(())
    }

    fn run_statement(&mut self, stmt: &RtlStatement) -> IsaResult<()> {
        self.tick()?;
        match stmt {
            RtlStatement::Assignment(assign) => self.run_assignment(assign),
            RtlStatement::Conditional { condition, then_body, else_body } => {
                let taken = if self.eval(condition)? != 0 { then_body } else { else_body };
                for stmt in taken {
                    self.run_statement(stmt)?;
                }
                Ok(())
            }
            RtlStatement::MemoryStore { address, value } => {
                let addr = (self.eval(address)? & WORD_MASK) as u32;
                let value = self.eval(value)? & WORD_MASK;
                self.state.memory.insert(addr, value);
                Ok(())
            }
            RtlStatement::MemoryLoad { target, address } => {
                let addr = (self.eval(address)? & WORD_MASK) as u32;
                let value = self.state.memory.get(&addr).copied().unwrap_or(0);
                self.write(target, value)
            }
            RtlStatement::ForLoop { init, condition, update, body } => {
                self.run_assignment(init)?;
                while self.eval(condition)? != 0 {
                    for stmt in body {
                        self.run_statement(stmt)?;
                    }
                    self.tick()?;
                    self.run_assignment(update)?;
                }
                Ok(())
            }
        }
    }

    fn run_assignment(&mut self, assign: &RtlAssignment) -> IsaResult<()> {
        let value = self.eval(&assign.expr)?;
        self.write(&assign.target, value)
    }

    fn tick(&mut self) -> IsaResult<()> {
        self.steps += 1;
        if let Some(budget) = self.step_budget {
            if self.steps > budget {
                return Err(IsaError::execution(format!(
                    "step budget of {budget} statements exceeded"
                )));
            }
        }
        Ok(())
    }

    pub fn eval(&mut self, expr: &RtlExpr) -> IsaResult<u128> {
        match expr {
            RtlExpr::Constant(v) => Ok(*v),
            RtlExpr::OperandRef(name) => self.read_name(name),
            RtlExpr::Register { reg, index } => self.read_register(reg, index.as_deref()),
            RtlExpr::Field { reg, field } => self.read_field(reg, field),
            RtlExpr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(apply_binary(*op, left, right))
            }
            RtlExpr::Unary { op, expr } => {
                let value = self.eval(expr)?;
                Ok(apply_unary(*op, value))
            }
            RtlExpr::Ternary { condition, then_expr, else_expr } => {
                if self.eval(condition)? != 0 {
                    self.eval(then_expr)
                } else {
                    self.eval(else_expr)
                }
            }
            RtlExpr::BitSlice { base, msb, lsb } => {
                let value = self.eval(base)?;
                if msb < lsb {
                    return Ok(0);
                }
                Ok((value >> lsb) & mask_bits(msb - lsb + 1))
            }
            RtlExpr::Call { function, args } => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<IsaResult<Vec<u128>>>()?;
                builtins::apply(function, &values)
            }
        }
    }

    fn write(&mut self, target: &LValue, value: u128) -> IsaResult<()> {
        match target {
            LValue::Register { reg, index } => self.write_register(reg, index.as_deref(), value),
            LValue::Field { reg, field } => self.write_field(reg, field, value),
            LValue::Variable(name) => self.write_name(name, value),
        }
    }

    /// Resolves a register-ish name, following aliases. `Ok(None)` means the
    /// name denotes no declared register at all.
    fn resolve_name(&self, name: &str) -> IsaResult<Option<Resolved<'a>>> {
        let spec = self.spec;
        if let Some(alias) = spec.resolve_register_alias(name) {
            if alias.target_index.is_none() {
                if let Some(virt) = spec.get_virtual_register(&alias.target_reg_name) {
                    return Ok(Some(Resolved::Virtual(virt)));
                }
            }
            let Some(reg) = spec.get_register(&alias.target_reg_name) else {
                return Err(IsaError::execution(format!(
                    "alias '{}' targets unknown register '{}'",
                    name, alias.target_reg_name
                )));
            };
            return Ok(Some(Resolved::Concrete(
                reg,
                alias.target_index.map(u128::from),
            )));
        }
        if let Some(virt) = spec.get_virtual_register(name) {
            return Ok(Some(Resolved::Virtual(virt)));
        }
        Ok(spec.get_register(name).map(|reg| Resolved::Concrete(reg, None)))
    }

    fn read_name(&mut self, name: &str) -> IsaResult<u128> {
        match self.resolve_name(name)? {
            Some(Resolved::Concrete(reg, index)) => self.read_concrete(reg, index, name),
            Some(Resolved::Virtual(virt)) => self.read_virtual(virt),
            None => {
                if let Some(value) = self.variables.get(name) {
                    return Ok(*value);
                }
                Ok(self.operands.get(name).copied().unwrap_or(0))
            }
        }
    }

    fn write_name(&mut self, name: &str, value: u128) -> IsaResult<()> {
        match self.resolve_name(name)? {
            Some(Resolved::Concrete(reg, index)) => self.write_concrete(reg, index, value, name),
            Some(Resolved::Virtual(virt)) => self.write_virtual(virt, value),
            None => {
                self.variables.insert(name.to_string(), value & WORD_MASK);
                Ok(())
            }
        }
    }

    fn read_register(&mut self, reg_name: &str, index: Option<&RtlExpr>) -> IsaResult<u128> {
        let explicit = match index {
            Some(expr) => Some(self.eval(expr)?),
            None => None,
        };
        match self.resolve_name(reg_name)? {
            Some(Resolved::Concrete(reg, alias_index)) => {
                let index = self.merge_indices(reg_name, alias_index, explicit)?;
                self.read_concrete(reg, index, reg_name)
            }
            Some(Resolved::Virtual(virt)) => {
                if explicit.is_some() {
                    return Err(IsaError::execution(format!(
                        "virtual register '{}' is not indexable",
                        virt.name
                    )));
                }
                self.read_virtual(virt)
            }
            None => Err(IsaError::execution(format!("unknown register '{reg_name}'"))),
        }
    }

    fn write_register(
        &mut self,
        reg_name: &str,
        index: Option<&RtlExpr>,
        value: u128,
    ) -> IsaResult<()> {
        let explicit = match index {
            Some(expr) => Some(self.eval(expr)?),
            None => None,
        };
        match self.resolve_name(reg_name)? {
            Some(Resolved::Concrete(reg, alias_index)) => {
                let index = self.merge_indices(reg_name, alias_index, explicit)?;
                self.write_concrete(reg, index, value, reg_name)
            }
            Some(Resolved::Virtual(virt)) => {
                if explicit.is_some() {
                    return Err(IsaError::execution(format!(
                        "virtual register '{}' is not indexable",
                        virt.name
                    )));
                }
                self.write_virtual(virt, value)
            }
            None => Err(IsaError::execution(format!("unknown register '{reg_name}'"))),
        }
    }

    fn merge_indices(
        &self,
        reg_name: &str,
        alias_index: Option<u128>,
        explicit: Option<u128>,
    ) -> IsaResult<Option<u128>> {
        match (alias_index, explicit) {
            (Some(_), Some(_)) => Err(IsaError::execution(format!(
                "alias '{reg_name}' already selects an element and cannot be indexed"
            ))),
            (Some(a), None) => Ok(Some(a)),
            (None, other) => Ok(other),
        }
    }

    fn read_concrete(
        &self,
        reg: &Register,
        index: Option<u128>,
        display_name: &str,
    ) -> IsaResult<u128> {
        match (self.state.registers.get(&reg.name), index) {
            (Some(RegisterValue::File(values)), Some(i)) => {
                if i >= values.len() as u128 {
                    return Err(IsaError::execution(format!(
                        "register index {i} out of range for '{}'",
                        reg.name
                    )));
                }
                Ok(values[i as usize])
            }
            (Some(RegisterValue::File(_)), None) => Err(IsaError::execution(format!(
                "register file '{display_name}' requires an index"
            ))),
            (Some(RegisterValue::Scalar(v)), None) => Ok(*v),
            (Some(RegisterValue::Scalar(_)), Some(_)) => Err(IsaError::execution(format!(
                "register '{display_name}' is not a register file"
            ))),
            (None, _) => Err(IsaError::execution(format!(
                "unknown register '{display_name}'"
            ))),
        }
    }

    fn write_concrete(
        &mut self,
        reg: &Register,
        index: Option<u128>,
        value: u128,
        display_name: &str,
    ) -> IsaResult<()> {
        let value = value & mask_bits(reg.width);
        match (self.state.registers.get_mut(&reg.name), index) {
            (Some(RegisterValue::File(values)), Some(i)) => {
                if i >= values.len() as u128 {
                    return Err(IsaError::execution(format!(
                        "register index {i} out of range for '{}'",
                        reg.name
                    )));
                }
                values[i as usize] = value;
                Ok(())
            }
            (Some(RegisterValue::File(_)), None) => Err(IsaError::execution(format!(
                "register file '{display_name}' requires an index"
            ))),
            (Some(RegisterValue::Scalar(slot)), None) => {
                *slot = value;
                Ok(())
            }
            (Some(RegisterValue::Scalar(_)), Some(_)) => Err(IsaError::execution(format!(
                "register '{display_name}' is not a register file"
            ))),
            (None, _) => Err(IsaError::execution(format!(
                "unknown register '{display_name}'"
            ))),
        }
    }

    /// Concatenates component values, first component in the low bits.
    fn read_virtual(&self, virt: &VirtualRegister) -> IsaResult<u128> {
        let spec = self.spec;
        let mut value = 0u128;
        let mut shift = 0u32;
        for comp in &virt.components {
            let Some(reg) = spec.get_register(&comp.reg_name) else {
                return Err(IsaError::execution(format!(
                    "virtual register '{}' references unknown register '{}'",
                    virt.name, comp.reg_name
                )));
            };
            let part = self.read_concrete(reg, comp.index.map(u128::from), &comp.reg_name)?;
            value |= (part & mask_bits(reg.width)) << shift;
            shift += reg.width;
        }
        Ok(value & mask_bits(virt.width))
    }

    /// Splits the value across components, low bits into the first.
    fn write_virtual(&mut self, virt: &VirtualRegister, value: u128) -> IsaResult<()> {
        let spec = self.spec;
        let value = value & mask_bits(virt.width);
        let mut shift = 0u32;
        for comp in &virt.components {
            let Some(reg) = spec.get_register(&comp.reg_name) else {
                return Err(IsaError::execution(format!(
                    "virtual register '{}' references unknown register '{}'",
                    virt.name, comp.reg_name
                )));
            };
            let chunk = (value >> shift) & mask_bits(reg.width);
            self.write_concrete(reg, comp.index.map(u128::from), chunk, &comp.reg_name)?;
            shift += reg.width;
        }
        Ok(())
    }

    fn read_field(&mut self, reg_name: &str, field_name: &str) -> IsaResult<u128> {
        let (reg, index) = self.field_target(reg_name)?;
        let Some(field) = reg.field(field_name) else {
            return Err(IsaError::execution(format!(
                "unknown field '{field_name}' on register '{reg_name}'"
            )));
        };
        let whole = self.read_concrete(reg, index, reg_name)?;
        Ok(field.extract(whole))
    }

    fn write_field(&mut self, reg_name: &str, field_name: &str, value: u128) -> IsaResult<()> {
        let (reg, index) = self.field_target(reg_name)?;
        let Some(field) = reg.field(field_name) else {
            return Err(IsaError::execution(format!(
                "unknown field '{field_name}' on register '{reg_name}'"
            )));
        };
        let whole = self.read_concrete(reg, index, reg_name)?;
        let updated = field.insert(whole, value);
        self.write_concrete(reg, index, updated, reg_name)
    }

    fn field_target(&self, reg_name: &str) -> IsaResult<(&'a Register, Option<u128>)> {
        match self.resolve_name(reg_name)? {
            Some(Resolved::Concrete(reg, index)) => Ok((reg, index)),
            Some(Resolved::Virtual(_)) => Err(IsaError::execution(format!(
                "virtual register '{reg_name}' has no fields"
            ))),
            None => Err(IsaError::execution(format!("unknown register '{reg_name}'"))),
        }
    }
}

fn to_signed_32(value: u128) -> i64 {
    let v = (value & WORD_MASK) as i64;
    if v & 0x8000_0000 != 0 { v - 0x1_0000_0000 } else { v }
}

fn mask_32(value: i64) -> u128 {
    (value as u128) & WORD_MASK
}

/// Floor division, rounding toward negative infinity.
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 && (a < 0) != (b < 0) { q - 1 } else { q }
}

/// Floor modulo; the result takes the divisor's sign.
fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) { r + b } else { r }
}

fn apply_binary(op: BinaryOp, left: u128, right: u128) -> u128 {
    let l = to_signed_32(left);
    let r = to_signed_32(right);
    match op {
        BinaryOp::Add => mask_32(l + r),
        BinaryOp::Sub => mask_32(l - r),
        BinaryOp::Mul => mask_32(l * r),
        BinaryOp::Div => {
            if r == 0 { 0 } else { mask_32(floor_div(l, r)) }
        }
        BinaryOp::Mod => {
            if r == 0 { 0 } else { mask_32(floor_mod(l, r)) }
        }
        // shift counts outside 0..=31 saturate: left shifts to 0, right
        // shifts to the sign-extension limit
        BinaryOp::Shl => {
            if (0..32).contains(&r) {
                ((l as u32 as u128) << r) & WORD_MASK
            } else {
                0
            }
        }
        BinaryOp::Shr => {
            let shift = if (0..32).contains(&r) { r as u32 } else { 31 };
            (((l as i32) >> shift) as u32) as u128
        }
        BinaryOp::BitAnd => mask_32(l & r),
        BinaryOp::BitOr => mask_32(l | r),
        BinaryOp::BitXor => mask_32(l ^ r),
        BinaryOp::LogicalAnd => u128::from(l != 0 && r != 0),
        BinaryOp::LogicalOr => u128::from(l != 0 || r != 0),
        BinaryOp::Eq => u128::from(l == r),
        BinaryOp::Ne => u128::from(l != r),
        BinaryOp::Lt => u128::from(l < r),
        BinaryOp::Gt => u128::from(l > r),
        BinaryOp::Le => u128::from(l <= r),
        BinaryOp::Ge => u128::from(l >= r),
    }
}

fn apply_unary(op: UnaryOp, value: u128) -> u128 {
    let v = to_signed_32(value);
    match op {
        UnaryOp::Neg => mask_32(-v),
        UnaryOp::Not => u128::from(v == 0),
        UnaryOp::BitNot => mask_32(!v),
    }
}
