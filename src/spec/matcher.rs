//! Width-based instruction identification.
//!
//! Given a raw word of unknown width, the matcher decides which declared
//! instruction it encodes and therefore how many bytes to consume. Widths
//! are tried shortest first; within a width class instructions are tested in
//! declaration order, so overlapping encodings resolve the same way as
//! [`IsaSpecification::decode_instruction`].

use std::collections::BTreeMap;

use crate::spec::field::mask_bits;
use crate::spec::instruction::Instruction;
use crate::spec::model::{DEFAULT_INSTRUCTION_BITS, IsaSpecification};

/// Bytes consumed when nothing matches. Not an error: a stream with an
/// unknown word still advances, and callers render or log the gap.
pub const DEFAULT_ADVANCE_BYTES: u32 = DEFAULT_INSTRUCTION_BITS / 8;

/// All instructions sharing one declared width.
#[derive(Debug)]
pub struct WidthClass {
    pub width_bits: u32,
    /// Fewest bits a driver must fetch before identification can run for
    /// this class: the minimum identification width across members.
    pub peek_bits: u32,
    /// Indices into the specification's instruction list, declaration order.
    pub members: Vec<usize>,
}

impl WidthClass {
    pub fn width_bytes(&self) -> u32 {
        (self.width_bits + 7) / 8
    }
}

/// A successful identification.
#[derive(Debug)]
pub struct InstructionMatch<'a> {
    pub instruction: &'a Instruction,
    pub width_bits: u32,
}

impl InstructionMatch<'_> {
    pub fn width_bytes(&self) -> u32 {
        (self.width_bits + 7) / 8
    }
}

/// Precomputed width table over one specification.
pub struct InstructionMatcher<'a> {
    spec: &'a IsaSpecification,
    classes: Vec<WidthClass>,
}

impl<'a> InstructionMatcher<'a> {
    pub fn new(spec: &'a IsaSpecification) -> Self {
        let mut grouped: BTreeMap<u32, WidthClass> = BTreeMap::new();
        for (index, instr) in spec.instructions.iter().enumerate() {
            let Some(width) = spec.width_bits(instr) else {
                continue;
            };
            let peek = spec
                .identification_bits(instr)
                .unwrap_or(DEFAULT_INSTRUCTION_BITS);
            let class = grouped.entry(width).or_insert_with(|| WidthClass {
                width_bits: width,
                peek_bits: peek,
                members: Vec::new(),
            });
            class.peek_bits = class.peek_bits.min(peek);
            class.members.push(index);
        }
        Self { spec, classes: grouped.into_values().collect() }
    }

    /// Width classes, shortest first.
    pub fn classes(&self) -> &[WidthClass] {
        &self.classes
    }

    /// Tests the members of one class against a word already masked (or
    /// peeked) to at least the class's peek width.
    pub fn match_in_class(&self, class: &WidthClass, word: u128) -> Option<&'a Instruction> {
        class.members.iter().copied().find_map(|index| {
            let instr = &self.spec.instructions[index];
            let format = self.spec.carrier_format(instr)?;
            instr.matches_encoding(format, word).then_some(instr)
        })
    }

    /// Identifies `word`, trying widths shortest first and masking the word
    /// to each candidate width. `None` means nothing matched; callers
    /// advance by [`DEFAULT_ADVANCE_BYTES`] when scanning a stream.
    pub fn match_word(&self, word: u128) -> Option<InstructionMatch<'a>> {
        for class in &self.classes {
            let masked = word & mask_bits(class.width_bits);
            if let Some(instruction) = self.match_in_class(class, masked) {
                return Some(InstructionMatch {
                    instruction,
                    width_bits: class.width_bits,
                });
            }
        }
        None
    }

    /// Identifies one bundle slot's word. The member declared for that slot
    /// is tried first, then every other non-bundle instruction of the slot's
    /// width, in declaration order.
    pub fn match_slot_member(
        &self,
        bundle: &Instruction,
        slot_index: usize,
        slot_width: u32,
        word: u128,
    ) -> Option<&'a Instruction> {
        let declared = bundle
            .bundle_instructions
            .get(slot_index)
            .and_then(|name| self.spec.get_instruction(name));
        let fallback = self
            .spec
            .instructions
            .iter()
            .filter(|candidate| !candidate.is_bundle());
        declared.into_iter().chain(fallback).find(|candidate| {
            self.spec.carrier_format(candidate).is_some_and(|format| {
                format.width == slot_width && candidate.matches_encoding(format, word)
            })
        })
    }
}
