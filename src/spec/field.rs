//! Named bit ranges and the mask arithmetic every encode/decode path is
//! built on. Words are `u128` so bundle and vector layouts wider than 64
//! bits stay exact.

/// Width-sized all-ones mask. Widths of 128 and above saturate to the full
/// word rather than overflowing the shift.
pub fn mask_bits(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

/// A named `[lsb, msb]` bit range, optionally pinned to a constant value.
///
/// Invariant: `msb >= lsb`. The parser stores ranges as written and the
/// validator rejects inverted ones before any arithmetic runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitField {
    pub name: String,
    pub msb: u32,
    pub lsb: u32,
    pub constant: Option<u128>,
}

impl BitField {
    pub fn new(name: impl Into<String>, msb: u32, lsb: u32) -> Self {
        Self {
            name: name.into(),
            msb,
            lsb,
            constant: None,
        }
    }

    pub fn with_constant(name: impl Into<String>, msb: u32, lsb: u32, constant: u128) -> Self {
        Self {
            name: name.into(),
            msb,
            lsb,
            constant: Some(constant),
        }
    }

    pub fn width(&self) -> u32 {
        self.msb - self.lsb + 1
    }

    /// Mask positioned at the field's location within the word.
    pub fn mask(&self) -> u128 {
        mask_bits(self.width()) << self.lsb
    }

    /// Reads the field out of `word`, right-aligned.
    pub fn extract(&self, word: u128) -> u128 {
        (word >> self.lsb) & mask_bits(self.width())
    }

    /// Writes `value` into the field via read-modify-write. Values wider
    /// than the field are silently truncated to its width; assemblers
    /// lean on this for immediates that carry sign bits.
    pub fn insert(&self, word: u128, value: u128) -> u128 {
        (word & !self.mask()) | ((value << self.lsb) & self.mask())
    }

    /// Applies the field's declared constant, if any.
    pub fn insert_constant(&self, word: u128) -> u128 {
        match self.constant {
            Some(constant) => self.insert(word, constant),
            None => word,
        }
    }

    /// True when `value` fits the field without truncation.
    pub fn accepts(&self, value: u128) -> bool {
        value <= mask_bits(self.width())
    }
}
