//! Helpers for constructing [`IsaSpecification`]s programmatically without
//! routing through the file parser.
//!
//! Tests and embedders use this to assemble small architectures in memory;
//! the result is the same model type the parser produces, so validation and
//! the drivers behave identically.

use crate::rtl::ast::RtlBlock;
use crate::spec::field::BitField;
use crate::spec::format::{BundleFormat, BundleSlot, InstructionFormat};
use crate::spec::instruction::{
    EncodingAssignment, Instruction, InstructionAlias, OperandSpec,
};
use crate::spec::model::{IsaSpecification, PropertyValue};
use crate::spec::register::{
    Register, RegisterAlias, RegisterKind, VirtualComponent, VirtualRegister,
};

/// Convenience wrapper for assembling a full architecture in memory.
pub struct SpecBuilder {
    spec: IsaSpecification,
}

impl SpecBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { spec: IsaSpecification::new(name) }
    }

    pub fn property(&mut self, name: impl Into<String>, value: PropertyValue) -> &mut Self {
        self.spec.properties.insert(name.into(), value);
        self
    }

    pub fn word_size(&mut self, bits: u32) -> &mut Self {
        self.property("word_size", PropertyValue::Int(bits as u128))
    }

    /// Appends a scalar register.
    pub fn register(&mut self, kind: RegisterKind, name: impl Into<String>, width: u32) -> &mut Self {
        self.spec.registers.push(Register::scalar(kind, name, width));
        self
    }

    /// Appends a register file of `count` entries.
    pub fn register_file(
        &mut self,
        kind: RegisterKind,
        name: impl Into<String>,
        width: u32,
        count: u32,
    ) -> &mut Self {
        self.spec.registers.push(Register::file(kind, name, width, count));
        self
    }

    /// Appends a register with named subfields.
    pub fn register_with_fields(
        &mut self,
        kind: RegisterKind,
        name: impl Into<String>,
        width: u32,
        fields: impl IntoIterator<Item = BitField>,
    ) -> &mut Self {
        let mut register = Register::scalar(kind, name, width);
        register.fields = fields.into_iter().collect();
        self.spec.registers.push(register);
        self
    }

    /// Appends a virtual register over the given components, listed
    /// least-significant first.
    pub fn virtual_register(
        &mut self,
        name: impl Into<String>,
        width: u32,
        components: impl IntoIterator<Item = VirtualComponent>,
    ) -> &mut Self {
        self.spec.virtual_registers.push(VirtualRegister {
            name: name.into(),
            width,
            components: components.into_iter().collect(),
        });
        self
    }

    pub fn register_alias(
        &mut self,
        alias: impl Into<String>,
        target: impl Into<String>,
        index: Option<u32>,
    ) -> &mut Self {
        self.spec.register_aliases.push(RegisterAlias {
            alias_name: alias.into(),
            target_reg_name: target.into(),
            target_index: index,
        });
        self
    }

    /// Begins a format declaration; call [`FormatBuilder::finish`] to push it.
    pub fn format(&mut self, name: impl Into<String>, width: u32) -> FormatBuilder<'_> {
        FormatBuilder {
            builder: self,
            format: InstructionFormat::new(name, width),
        }
    }

    /// Begins a bundle format declaration.
    pub fn bundle_format(&mut self, name: impl Into<String>, width: u32) -> BundleFormatBuilder<'_> {
        BundleFormatBuilder {
            builder: self,
            format: BundleFormat::new(name, width),
        }
    }

    /// Begins an instruction declaration; call
    /// [`InstructionBuilder::finish`] to push it.
    pub fn instruction(&mut self, mnemonic: impl Into<String>) -> InstructionBuilder<'_> {
        InstructionBuilder {
            builder: self,
            instr: Instruction::new(mnemonic),
        }
    }

    pub fn instruction_alias(
        &mut self,
        alias: impl Into<String>,
        target: impl Into<String>,
        assembly_syntax: Option<String>,
    ) -> &mut Self {
        let mut decl = InstructionAlias::new(alias, target);
        decl.assembly_syntax = assembly_syntax;
        self.spec.instruction_aliases.push(decl);
        self
    }

    /// Finishes building and returns the assembled specification.
    pub fn build(self) -> IsaSpecification {
        self.spec
    }
}

/// Builder for one [`InstructionFormat`].
pub struct FormatBuilder<'a> {
    builder: &'a mut SpecBuilder,
    format: InstructionFormat,
}

impl<'a> FormatBuilder<'a> {
    /// Adds a plain field; the bit range is given low bit first, matching
    /// the textual `[lsb:msb]` form.
    pub fn field(mut self, name: impl Into<String>, lsb: u32, msb: u32) -> Self {
        self.format.fields.push(BitField::new(name, msb, lsb));
        self
    }

    /// Adds a field pinned to a constant value.
    pub fn constant_field(
        mut self,
        name: impl Into<String>,
        lsb: u32,
        msb: u32,
        value: u128,
    ) -> Self {
        self.format.fields.push(BitField::with_constant(name, msb, lsb, value));
        self
    }

    /// Replaces the identification field list.
    pub fn identification<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.format.identification_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn finish(self) -> &'a mut SpecBuilder {
        self.builder.spec.formats.push(self.format);
        self.builder
    }
}

/// Builder for one [`BundleFormat`].
pub struct BundleFormatBuilder<'a> {
    builder: &'a mut SpecBuilder,
    format: BundleFormat,
}

impl<'a> BundleFormatBuilder<'a> {
    /// Adds a slot; the bit range is given low bit first.
    pub fn slot(mut self, name: impl Into<String>, lsb: u32, msb: u32) -> Self {
        self.format.slots.push(BundleSlot::new(name, msb, lsb));
        self
    }

    pub fn instruction_start(mut self, bit: u32) -> Self {
        self.format.instruction_start_bit = Some(bit);
        self
    }

    pub fn finish(self) -> &'a mut SpecBuilder {
        self.builder.spec.bundle_formats.push(self.format);
        self.builder
    }
}

/// Builder for the richer [`Instruction`] structure.
pub struct InstructionBuilder<'a> {
    builder: &'a mut SpecBuilder,
    instr: Instruction,
}

impl<'a> InstructionBuilder<'a> {
    /// Sets the format reference used for encoding and identification.
    pub fn format(mut self, name: impl Into<String>) -> Self {
        self.instr.format = Some(name.into());
        self
    }

    /// Marks the instruction as a bundle over the named layout.
    pub fn bundle_format(mut self, name: impl Into<String>) -> Self {
        self.instr.bundle_format = Some(name.into());
        self
    }

    /// Adds one `field = value` encoding assignment.
    pub fn encode(mut self, field: impl Into<String>, value: u128) -> Self {
        self.instr.encoding.push(EncodingAssignment::new(field, value));
        self
    }

    /// Appends simple operands, one per same-named field.
    pub fn operands<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.instr.operand_specs.push(OperandSpec::simple(name));
        }
        self
    }

    /// Appends a distributed operand split across `fields`, low chunk first.
    pub fn distributed_operand<I, S>(mut self, name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instr
            .operand_specs
            .push(OperandSpec::distributed(name, fields));
        self
    }

    pub fn assembly_syntax(mut self, template: impl Into<String>) -> Self {
        self.instr.assembly_syntax = Some(template.into());
        self
    }

    pub fn behavior(mut self, block: RtlBlock) -> Self {
        self.instr.behavior = Some(block);
        self
    }

    pub fn external_behavior(mut self) -> Self {
        self.instr.external_behavior = true;
        self
    }

    /// Lists the member mnemonics a bundle may carry.
    pub fn bundle_members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instr.bundle_instructions = members.into_iter().map(Into::into).collect();
        self
    }

    /// Completes the builder and pushes the instruction into the owning
    /// specification.
    pub fn finish(self) -> &'a mut SpecBuilder {
        self.builder.spec.instructions.push(self.instr);
        self.builder
    }
}

/// Utility for naming a virtual-register component without spelling out the
/// struct each time.
pub fn component(reg: impl Into<String>, index: Option<u32>) -> VirtualComponent {
    match index {
        Some(i) => VirtualComponent::indexed(reg, i),
        None => VirtualComponent::scalar(reg),
    }
}
