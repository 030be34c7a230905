//! Instruction definitions and the bit-exact operand codec.
//!
//! An [`Instruction`] couples a mnemonic with a format reference, constant
//! encoding assignments, operand specifications, an optional display
//! template, and an optional behavior block. The codec methods here are the
//! single source of truth for how operand values map onto instruction words;
//! the assembler, disassembler, and simulator all go through them.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::rtl::ast::RtlBlock;
use crate::spec::format::InstructionFormat;

/// One named operand and the encoding fields it occupies.
///
/// A simple operand occupies the single field sharing its name. A
/// distributed operand is split across several fields, listed
/// least-significant chunk first: field 0 holds the low-order bits of the
/// operand value, each following field the next `width()` bits up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandSpec {
    pub name: String,
    /// Component fields for a distributed operand; empty means simple.
    pub field_names: SmallVec<[String; 2]>,
}

impl OperandSpec {
    pub fn simple(name: impl Into<String>) -> Self {
        Self { name: name.into(), field_names: SmallVec::new() }
    }

    pub fn distributed<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            field_names: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_distributed(&self) -> bool {
        !self.field_names.is_empty()
    }
}

/// A `field = value` pair from an instruction's `encoding` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingAssignment {
    pub field: String,
    pub value: u128,
}

impl EncodingAssignment {
    pub fn new(field: impl Into<String>, value: u128) -> Self {
        Self { field: field.into(), value }
    }
}

/// A single instruction definition.
///
/// `format` names the encoding layout. Bundle instructions additionally name
/// a `bundle_format` describing slot positions and list the member mnemonics
/// that may occupy those slots; their `format` then acts as the fixed-width
/// identification carrier.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub mnemonic: String,
    pub format: Option<String>,
    pub bundle_format: Option<String>,
    pub encoding: SmallVec<[EncodingAssignment; 4]>,
    pub operand_specs: SmallVec<[OperandSpec; 4]>,
    pub assembly_syntax: Option<String>,
    pub behavior: Option<RtlBlock>,
    pub external_behavior: bool,
    pub bundle_instructions: Vec<String>,
}

impl Instruction {
    pub fn new(mnemonic: impl Into<String>) -> Self {
        Self {
            mnemonic: mnemonic.into(),
            format: None,
            bundle_format: None,
            encoding: SmallVec::new(),
            operand_specs: SmallVec::new(),
            assembly_syntax: None,
            behavior: None,
            external_behavior: false,
            bundle_instructions: Vec::new(),
        }
    }

    pub fn is_bundle(&self) -> bool {
        self.bundle_format.is_some() || !self.bundle_instructions.is_empty()
    }

    /// Value assigned to `field` in the `encoding` block, if any.
    pub fn encoding_value(&self, field: &str) -> Option<u128> {
        self.encoding.iter().find(|a| a.field == field).map(|a| a.value)
    }

    pub fn operand(&self, name: &str) -> Option<&OperandSpec> {
        self.operand_specs.iter().find(|s| s.name == name)
    }

    /// Operand names in declaration order, for default display rendering.
    pub fn operand_names(&self) -> impl Iterator<Item = &str> {
        self.operand_specs.iter().map(|s| s.name.as_str())
    }

    /// Tests whether `word` is an encoding of this instruction under
    /// `format`.
    ///
    /// When the format declares identification fields, only those are
    /// consulted; each one with a determinable expected value (instruction
    /// encoding assignment first, format constant otherwise) must extract to
    /// that value, and valueless identification fields constrain nothing.
    /// Without identification fields, every format field carrying an
    /// expected value participates. An instruction that constrains no bits
    /// at all never matches, and an encoding assignment naming a field the
    /// format lacks can never be satisfied.
    pub fn matches_encoding(&self, format: &InstructionFormat, word: u128) -> bool {
        let mut tested = false;
        if !format.identification_fields.is_empty() {
            for name in &format.identification_fields {
                let Some(field) = format.field(name) else {
                    return false;
                };
                let Some(expected) = self.encoding_value(name).or(field.constant) else {
                    continue;
                };
                if field.extract(word) != expected {
                    return false;
                }
                tested = true;
            }
        } else {
            for assignment in &self.encoding {
                if format.field(&assignment.field).is_none() {
                    return false;
                }
            }
            for field in &format.fields {
                let Some(expected) = self.encoding_value(&field.name).or(field.constant) else {
                    continue;
                };
                if field.extract(word) != expected {
                    return false;
                }
                tested = true;
            }
        }
        tested
    }

    /// Extracts every declared operand from `word`.
    ///
    /// Distributed operands pack their component fields least-significant
    /// first. Operands whose fields are absent from the format are skipped
    /// rather than reported; validation flags them separately.
    pub fn decode_operands(
        &self,
        format: &InstructionFormat,
        word: u128,
    ) -> BTreeMap<String, u128> {
        let mut operands = BTreeMap::new();
        for spec in &self.operand_specs {
            if spec.is_distributed() {
                let mut value = 0u128;
                let mut shift = 0u32;
                for field_name in &spec.field_names {
                    if let Some(field) = format.field(field_name) {
                        value |= field.extract(word) << shift;
                        shift += field.width();
                    }
                }
                operands.insert(spec.name.clone(), value);
            } else if let Some(field) = format.field(&spec.name) {
                operands.insert(spec.name.clone(), field.extract(word));
            }
        }
        operands
    }

    /// Builds the instruction word for the given operand values.
    ///
    /// Format-level constants are laid down first, then the instruction's
    /// encoding assignments, then operand values; distributed operands are
    /// split low-chunk-first, each chunk masked to its field's width. The
    /// exact inverse of [`Instruction::decode_operands`].
    pub fn encode(
        &self,
        format: &InstructionFormat,
        operands: &BTreeMap<String, u128>,
    ) -> u128 {
        let mut word = 0u128;
        for field in &format.fields {
            word = field.insert_constant(word);
        }
        for assignment in &self.encoding {
            if let Some(field) = format.field(&assignment.field) {
                word = field.insert(word, assignment.value);
            }
        }
        for spec in &self.operand_specs {
            let Some(&value) = operands.get(&spec.name) else {
                continue;
            };
            if spec.is_distributed() {
                let mut remaining = value;
                for field_name in &spec.field_names {
                    if let Some(field) = format.field(field_name) {
                        let chunk = remaining & crate::spec::field::mask_bits(field.width());
                        word = field.insert(word, chunk);
                        remaining >>= field.width();
                    }
                }
            } else if let Some(field) = format.field(&spec.name) {
                word = field.insert(word, value);
            }
        }
        word
    }
}

/// An `alias instruction NAME = TARGET` declaration.
///
/// Aliases share the target's encoding and behavior; only the display
/// template may be overridden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionAlias {
    pub alias_mnemonic: String,
    pub target_mnemonic: String,
    pub assembly_syntax: Option<String>,
}

impl InstructionAlias {
    pub fn new(alias: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            alias_mnemonic: alias.into(),
            target_mnemonic: target.into(),
            assembly_syntax: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::field::BitField;

    fn r_type() -> InstructionFormat {
        let mut format = InstructionFormat::new("R_TYPE", 32);
        format.fields.push(BitField::with_constant("opcode", 5, 0, 0x01));
        format.fields.push(BitField::new("rd", 10, 6));
        format.fields.push(BitField::new("rs1", 15, 11));
        format.fields.push(BitField::new("rs2", 20, 16));
        format.fields.push(BitField::new("funct", 26, 21));
        format
    }

    fn add() -> Instruction {
        let mut instr = Instruction::new("ADD");
        instr.format = Some("R_TYPE".to_string());
        instr.encoding.push(EncodingAssignment::new("funct", 0x0A));
        instr.operand_specs.push(OperandSpec::simple("rd"));
        instr.operand_specs.push(OperandSpec::simple("rs1"));
        instr.operand_specs.push(OperandSpec::simple("rs2"));
        instr
    }

    #[test]
    fn encode_applies_format_constants() {
        let format = r_type();
        let instr = add();
        let mut operands = BTreeMap::new();
        operands.insert("rd".to_string(), 1);
        operands.insert("rs1".to_string(), 2);
        operands.insert("rs2".to_string(), 3);
        let word = instr.encode(&format, &operands);
        assert_eq!(word & 0x3F, 0x01, "format constant must land in the word");
        assert_eq!((word >> 6) & 0x1F, 1);
        assert_eq!((word >> 11) & 0x1F, 2);
        assert_eq!((word >> 16) & 0x1F, 3);
        assert_eq!((word >> 21) & 0x3F, 0x0A);
    }

    #[test]
    fn matches_requires_constants_and_assignments() {
        let format = r_type();
        let instr = add();
        let good = 0x01 | (5 << 6) | (7 << 11) | (9 << 16) | (0x0A << 21);
        assert!(instr.matches_encoding(&format, good));

        let wrong_opcode = 0x02 | (5 << 6) | (0x0A << 21);
        assert!(!instr.matches_encoding(&format, wrong_opcode));

        let wrong_funct = 0x01 | (5 << 6) | (0x0B << 21);
        assert!(!instr.matches_encoding(&format, wrong_funct));
    }

    #[test]
    fn matches_via_format_constant_alone() {
        let format = r_type();
        let mut instr = add();
        instr.encoding.clear();
        assert!(instr.matches_encoding(&format, 0x01 | (3 << 6)));
        assert!(!instr.matches_encoding(&format, 0x02 | (3 << 6)));
    }

    #[test]
    fn identification_fields_narrow_the_test() {
        let mut format = r_type();
        format.identification_fields.push("opcode".to_string());
        let instr = add();
        // funct disagrees, but only opcode participates in identification
        let word = 0x01 | (0x3F << 21);
        assert!(instr.matches_encoding(&format, word));
        assert!(!instr.matches_encoding(&format, 0x02));
    }

    #[test]
    fn unconstrained_instruction_never_matches() {
        let mut format = InstructionFormat::new("ANY", 32);
        format.fields.push(BitField::new("imm", 31, 0));
        let mut instr = Instruction::new("NOP");
        instr.format = Some("ANY".to_string());
        assert!(!instr.matches_encoding(&format, 0));
        assert!(!instr.matches_encoding(&format, 0xFFFF_FFFF));
    }

    #[test]
    fn encoding_naming_missing_field_never_matches() {
        let format = r_type();
        let mut instr = add();
        instr.encoding.push(EncodingAssignment::new("ghost", 1));
        assert!(!instr.matches_encoding(&format, 0x01 | (0x0A << 21)));
    }

    #[test]
    fn distributed_operand_round_trip() {
        let mut format = InstructionFormat::new("SPLIT", 16);
        format.fields.push(BitField::with_constant("opcode", 3, 0, 0x5));
        format.fields.push(BitField::new("rd_low", 6, 4));
        format.fields.push(BitField::new("rd_high", 15, 14));
        let mut instr = Instruction::new("MOVX");
        instr.format = Some("SPLIT".to_string());
        instr.operand_specs.push(OperandSpec::distributed("rd", ["rd_low", "rd_high"]));

        // rd = 10 = 0b01_010 splits into low 3 bits then high 2 bits
        let mut operands = BTreeMap::new();
        operands.insert("rd".to_string(), 10);
        let word = instr.encode(&format, &operands);
        assert_eq!((word >> 4) & 0x7, 0b010, "low chunk");
        assert_eq!((word >> 14) & 0x3, 0b01, "high chunk");
        assert_eq!(word & 0xF, 0x5);

        let decoded = instr.decode_operands(&format, word);
        assert_eq!(decoded.get("rd"), Some(&10));
    }

    #[test]
    fn decode_skips_unknown_fields() {
        let format = r_type();
        let mut instr = add();
        instr.operand_specs.push(OperandSpec::simple("phantom"));
        let decoded = instr.decode_operands(&format, 0x01 | (4 << 6));
        assert_eq!(decoded.get("rd"), Some(&4));
        assert!(!decoded.contains_key("phantom"));
    }

    #[test]
    fn distributed_chunks_mask_to_field_width() {
        let mut format = InstructionFormat::new("SPLIT", 16);
        format.fields.push(BitField::new("lo", 2, 0));
        format.fields.push(BitField::new("hi", 10, 8));
        let mut instr = Instruction::new("LDI");
        instr.format = Some("SPLIT".to_string());
        instr.operand_specs.push(OperandSpec::distributed("imm", ["lo", "hi"]));

        let mut operands = BTreeMap::new();
        operands.insert("imm".to_string(), 0b111_101);
        let word = instr.encode(&format, &operands);
        assert_eq!(word & 0x7, 0b101);
        assert_eq!((word >> 8) & 0x7, 0b111);
    }
}
