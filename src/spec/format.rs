//! Instruction formats and VLIW bundle layouts.

use smallvec::SmallVec;

use super::field::{BitField, mask_bits};

/// A fixed-width instruction layout built from named bit fields.
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionFormat {
    pub name: String,
    pub width: u32,
    pub fields: SmallVec<[BitField; 4]>,
    /// Subset of `fields` used to decide "is this word an instance of this
    /// format's instructions". Empty means callers fall back to encoding
    /// assignments.
    pub identification_fields: Vec<String>,
}

impl InstructionFormat {
    pub fn new(name: impl Into<String>, width: u32) -> Self {
        Self {
            name: name.into(),
            width,
            fields: SmallVec::new(),
            identification_fields: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&BitField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn resolved_identification_fields(&self) -> Vec<&BitField> {
        self.identification_fields
            .iter()
            .filter_map(|name| self.field(name))
            .collect()
    }

    /// Fewest low-order bits that must be visible before this format's
    /// identification fields can be tested. Without identification fields
    /// the whole width is needed.
    pub fn min_identification_bits(&self) -> u32 {
        let fields = self.resolved_identification_fields();
        if fields.is_empty() {
            return self.width;
        }
        fields.iter().map(|field| field.msb + 1).max().unwrap_or(self.width)
    }
}

/// One contiguous sub-range of a bundle holding a packed sub-instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSlot {
    pub name: String,
    pub msb: u32,
    pub lsb: u32,
}

impl BundleSlot {
    pub fn new(name: impl Into<String>, msb: u32, lsb: u32) -> Self {
        Self {
            name: name.into(),
            msb,
            lsb,
        }
    }

    pub fn width(&self) -> u32 {
        self.msb - self.lsb + 1
    }

    pub fn extract(&self, word: u128) -> u128 {
        (word >> self.lsb) & mask_bits(self.width())
    }

    pub fn insert(&self, word: u128, value: u128) -> u128 {
        let mask = mask_bits(self.width()) << self.lsb;
        (word & !mask) | ((value << self.lsb) & mask)
    }
}

/// A fixed-width container packing sub-instructions into adjacent slots.
/// Identification of the bundle itself goes through the owning
/// instruction's carrier format, not through the slots.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleFormat {
    pub name: String,
    pub width: u32,
    /// Bit offset where slot payloads begin, when the layout declares one.
    pub instruction_start_bit: Option<u32>,
    pub slots: SmallVec<[BundleSlot; 4]>,
    pub identification_fields: Vec<String>,
}

impl BundleFormat {
    pub fn new(name: impl Into<String>, width: u32) -> Self {
        Self {
            name: name.into(),
            width,
            instruction_start_bit: None,
            slots: SmallVec::new(),
            identification_fields: Vec::new(),
        }
    }

    pub fn slot(&self, name: &str) -> Option<&BundleSlot> {
        self.slots.iter().find(|slot| slot.name == name)
    }
}
