//! The composed architecture model.
//!
//! [`IsaSpecification`] is the single object every downstream consumer works
//! against: the validator, the matcher, the RTL interpreter, and the four
//! artifact drivers. It holds declaration-ordered entity lists plus the
//! alias-resolving lookups; composition (`#include` handling) produces one
//! fully merged instance per top-level file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::spec::format::{BundleFormat, InstructionFormat};
use crate::spec::instruction::{Instruction, InstructionAlias};
use crate::spec::register::{Register, RegisterAlias, VirtualRegister};

/// A value from the architecture `properties`-style header entries
/// (`word_size: 32`, `endianness: "little"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Int(u128),
    Text(String),
}

impl PropertyValue {
    pub fn as_int(&self) -> Option<u128> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            PropertyValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Int(_) => None,
            PropertyValue::Text(s) => Some(s.as_str()),
        }
    }
}

/// Default consumed width when a word matches nothing (see the matcher).
pub const DEFAULT_INSTRUCTION_BITS: u32 = 32;

/// One fully composed instruction-set architecture.
///
/// Entity vectors preserve source declaration order; for instructions that
/// order is observable, since [`IsaSpecification::decode_instruction`] scans
/// linearly and the first match wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IsaSpecification {
    pub name: String,
    /// Path of the file that declared the `architecture` block, when known.
    pub source_path: Option<PathBuf>,
    pub properties: BTreeMap<String, PropertyValue>,
    pub registers: Vec<Register>,
    pub virtual_registers: Vec<VirtualRegister>,
    pub register_aliases: Vec<RegisterAlias>,
    pub formats: Vec<InstructionFormat>,
    pub bundle_formats: Vec<BundleFormat>,
    pub instructions: Vec<Instruction>,
    pub instruction_aliases: Vec<InstructionAlias>,
}

impl IsaSpecification {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// Architecture word size in bits, defaulting to 32 when undeclared.
    pub fn word_size(&self) -> u32 {
        self.property("word_size")
            .and_then(PropertyValue::as_int)
            .map(|v| v as u32)
            .unwrap_or(DEFAULT_INSTRUCTION_BITS)
    }

    /// Looks up a register by name, following `alias register` declarations
    /// transitively to the concrete register. Returns `None` on a miss;
    /// callers decide whether that is fatal.
    pub fn get_register(&self, name: &str) -> Option<&Register> {
        let resolved = self.resolve_register_alias(name).map_or(name, |a| {
            a.target_reg_name.as_str()
        });
        self.registers.iter().find(|r| r.name == resolved)
    }

    /// Resolves an alias chain to its final [`RegisterAlias`], or `None`
    /// when `name` is not an alias. A repeated name ends the walk rather
    /// than looping.
    pub fn resolve_register_alias(&self, name: &str) -> Option<&RegisterAlias> {
        let mut seen: Vec<&str> = Vec::new();
        let mut current = self.register_aliases.iter().find(|a| a.alias_name == name)?;
        seen.push(current.alias_name.as_str());
        while let Some(next) = self
            .register_aliases
            .iter()
            .find(|a| a.alias_name == current.target_reg_name)
        {
            if seen.contains(&next.alias_name.as_str()) {
                break;
            }
            seen.push(next.alias_name.as_str());
            current = next;
        }
        Some(current)
    }

    pub fn get_virtual_register(&self, name: &str) -> Option<&VirtualRegister> {
        self.virtual_registers.iter().find(|v| v.name == name)
    }

    pub fn get_format(&self, name: &str) -> Option<&InstructionFormat> {
        self.formats.iter().find(|f| f.name == name)
    }

    pub fn get_bundle_format(&self, name: &str) -> Option<&BundleFormat> {
        self.bundle_formats.iter().find(|f| f.name == name)
    }

    /// Looks up an instruction by mnemonic, following `alias instruction`
    /// declarations transitively to the target definition.
    pub fn get_instruction(&self, mnemonic: &str) -> Option<&Instruction> {
        if let Some(found) = self.instructions.iter().find(|i| i.mnemonic == mnemonic) {
            return Some(found);
        }
        let alias = self.resolve_instruction_alias(mnemonic)?;
        self.instructions
            .iter()
            .find(|i| i.mnemonic == alias.target_mnemonic)
    }

    pub fn resolve_instruction_alias(&self, mnemonic: &str) -> Option<&InstructionAlias> {
        let mut seen: Vec<&str> = Vec::new();
        let mut current = self
            .instruction_aliases
            .iter()
            .find(|a| a.alias_mnemonic == mnemonic)?;
        seen.push(current.alias_mnemonic.as_str());
        while let Some(next) = self
            .instruction_aliases
            .iter()
            .find(|a| a.alias_mnemonic == current.target_mnemonic)
        {
            if seen.contains(&next.alias_mnemonic.as_str()) {
                break;
            }
            seen.push(next.alias_mnemonic.as_str());
            current = next;
        }
        Some(current)
    }

    /// Carrier format of an instruction: the format used for identification
    /// and operand encoding. For bundles this is the fixed-width header
    /// format, not the bundle layout.
    pub fn carrier_format(&self, instr: &Instruction) -> Option<&InstructionFormat> {
        instr.format.as_deref().and_then(|name| self.get_format(name))
    }

    /// Total encoded width of an instruction in bits: the bundle layout
    /// width for bundles, the format width otherwise.
    pub fn width_bits(&self, instr: &Instruction) -> Option<u32> {
        if let Some(name) = instr.bundle_format.as_deref() {
            return self.get_bundle_format(name).map(|b| b.width);
        }
        self.carrier_format(instr).map(|f| f.width)
    }

    /// Minimum bits that must be visible to identify an instruction. Regular
    /// instructions take this from their format; bundles from their carrier
    /// format, falling back to one word for headerless bundles.
    pub fn identification_bits(&self, instr: &Instruction) -> Option<u32> {
        if instr.is_bundle() {
            return Some(
                self.carrier_format(instr)
                    .map(InstructionFormat::min_identification_bits)
                    .unwrap_or(DEFAULT_INSTRUCTION_BITS),
            );
        }
        self.carrier_format(instr)
            .map(InstructionFormat::min_identification_bits)
    }

    /// Linear declaration-order scan; the first instruction whose encoding
    /// matches wins. Overlapping encodings are therefore disambiguated by
    /// author-controlled ordering.
    pub fn decode_instruction(&self, word: u128) -> Option<&Instruction> {
        self.instructions.iter().find(|instr| {
            self.carrier_format(instr)
                .is_some_and(|format| instr.matches_encoding(format, word))
        })
    }

    /// All `(kind, name)` pairs defined by this specification, for duplicate
    /// detection during merge-mode composition.
    pub fn named_entities(&self) -> Vec<(&'static str, &str)> {
        let mut out: Vec<(&'static str, &str)> = Vec::new();
        out.extend(self.registers.iter().map(|r| ("register", r.name.as_str())));
        out.extend(
            self.virtual_registers
                .iter()
                .map(|v| ("virtual register", v.name.as_str())),
        );
        out.extend(
            self.register_aliases
                .iter()
                .map(|a| ("register alias", a.alias_name.as_str())),
        );
        out.extend(self.formats.iter().map(|f| ("format", f.name.as_str())));
        out.extend(
            self.bundle_formats
                .iter()
                .map(|f| ("bundle format", f.name.as_str())),
        );
        out.extend(
            self.instructions
                .iter()
                .map(|i| ("instruction", i.mnemonic.as_str())),
        );
        out.extend(
            self.instruction_aliases
                .iter()
                .map(|a| ("instruction alias", a.alias_mnemonic.as_str())),
        );
        out
    }

    /// Folds another unit's definitions into this one. Same-kind same-name
    /// entities from `other` replace the existing definition in place, so
    /// the base's declaration order survives extension; new entities append.
    /// Duplicate policy lives in the composer, which checks names before
    /// calling this.
    pub fn absorb(&mut self, other: IsaSpecification) {
        // later unit wins on property conflicts
        self.properties.extend(other.properties);
        Self::fold(&mut self.registers, other.registers, |r| r.name.clone());
        Self::fold(&mut self.virtual_registers, other.virtual_registers, |v| {
            v.name.clone()
        });
        Self::fold(&mut self.register_aliases, other.register_aliases, |a| {
            a.alias_name.clone()
        });
        Self::fold(&mut self.formats, other.formats, |f| f.name.clone());
        Self::fold(&mut self.bundle_formats, other.bundle_formats, |f| {
            f.name.clone()
        });
        Self::fold(&mut self.instructions, other.instructions, |i| {
            i.mnemonic.clone()
        });
        Self::fold(&mut self.instruction_aliases, other.instruction_aliases, |a| {
            a.alias_mnemonic.clone()
        });
    }

    fn fold<T, K>(target: &mut Vec<T>, incoming: Vec<T>, key: K)
    where
        K: Fn(&T) -> String,
    {
        for item in incoming {
            let name = key(&item);
            match target.iter_mut().find(|existing| key(existing) == name) {
                Some(slot) => *slot = item,
                None => target.push(item),
            }
        }
    }
}
