//! Byte-stream disassembler.
//!
//! The walker consumes a little-endian image, identifying each statement
//! through the width-class matcher and rendering its display template.
//! Unidentified words produce an `UNKNOWN 0x…` line and the cursor advances
//! by [`DEFAULT_ADVANCE_BYTES`] so one stray word cannot derail the listing.

use super::{default_display, render_template};
use crate::spec::field::mask_bits;
use crate::spec::instruction::Instruction;
use crate::spec::matcher::{DEFAULT_ADVANCE_BYTES, InstructionMatcher};
use crate::spec::model::IsaSpecification;

/// One decoded statement of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLine {
    pub address: u64,
    pub word: u128,
    pub width_bytes: u32,
    pub mnemonic: String,
    pub operands: Vec<String>,
    pub text: String,
}

/// Disassembles images against one specification.
pub struct Disassembler<'a> {
    spec: &'a IsaSpecification,
    matcher: InstructionMatcher<'a>,
    fingerprint: Option<String>,
}

impl<'a> Disassembler<'a> {
    pub fn new(spec: &'a IsaSpecification) -> Self {
        Self {
            spec,
            matcher: InstructionMatcher::new(spec),
            fingerprint: None,
        }
    }

    /// Stamps listings with the model fingerprint they were produced from.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Disassembles `bytes` and annotates each line with `base` offsets.
    pub fn disassemble(&self, bytes: &[u8], base: u64) -> Vec<ListingLine> {
        let mut cursor = 0usize;
        let mut address = base;
        let mut listing = Vec::new();

        while cursor < bytes.len() {
            let remaining = &bytes[cursor..];
            let line = match self.identify(remaining) {
                Some((instruction, word, width_bytes)) => {
                    self.render(instruction, word, width_bytes, address)
                }
                None => {
                    let width_bytes = (DEFAULT_ADVANCE_BYTES as usize).min(remaining.len());
                    let word = read_word(&remaining[..width_bytes]);
                    unknown_line(address, word, width_bytes as u32)
                }
            };
            cursor += line.width_bytes as usize;
            address += u64::from(line.width_bytes);
            listing.push(line);
        }

        listing
    }

    /// Renders a full textual listing, stamped with the fingerprint when one
    /// was supplied.
    pub fn listing(&self, bytes: &[u8], base: u64) -> String {
        let mut out = String::new();
        out.push_str(&format!("// {} disassembly\n", self.spec.name));
        if let Some(fingerprint) = &self.fingerprint {
            out.push_str(&format!("// model fingerprint: {fingerprint}\n"));
        }
        for line in self.disassemble(bytes, base) {
            let digits = (line.width_bytes * 2) as usize;
            out.push_str(&format!(
                "{:08X}:  {:0digits$X}  {}\n",
                line.address, line.word, line.text
            ));
        }
        out
    }

    /// Tries each width class shortest first against the head of `bytes`.
    fn identify(&self, bytes: &[u8]) -> Option<(&'a Instruction, u128, u32)> {
        for class in self.matcher.classes() {
            let width_bytes = class.width_bytes() as usize;
            if bytes.len() < width_bytes {
                continue;
            }
            let word = read_word(&bytes[..width_bytes]) & mask_bits(class.width_bits);
            if let Some(instruction) = self.matcher.match_in_class(class, word) {
                return Some((instruction, word, class.width_bytes()));
            }
        }
        None
    }

    fn render(
        &self,
        instruction: &'a Instruction,
        word: u128,
        width_bytes: u32,
        address: u64,
    ) -> ListingLine {
        if instruction.is_bundle() {
            return self.render_bundle(instruction, word, width_bytes, address);
        }

        let operands = self.operand_values(instruction, word);
        let texts: Vec<String> = operands.iter().map(|value| value.to_string()).collect();
        let (mnemonic, template) = self.display_source(instruction);
        let text = match template {
            Some(template) => render_template(template, |name| {
                instruction
                    .operand_specs
                    .iter()
                    .position(|spec| spec.name == name)
                    .map(|at| operands[at].to_string())
            }),
            None => default_display(mnemonic, &texts),
        };
        ListingLine {
            address,
            word,
            width_bytes,
            mnemonic: mnemonic.to_string(),
            operands: texts,
            text,
        }
    }

    /// Renders a bundle by disassembling each slot recursively, then
    /// substituting the member texts into `{slot0}`, `{slot1}`, ... of the
    /// bundle's template, or the `MNEM [ s0, s1 ]` default shape.
    fn render_bundle(
        &self,
        bundle: &'a Instruction,
        word: u128,
        width_bytes: u32,
        address: u64,
    ) -> ListingLine {
        let slots = bundle
            .bundle_format
            .as_deref()
            .and_then(|name| self.spec.get_bundle_format(name))
            .map(|layout| layout.slots.as_slice())
            .unwrap_or_default();

        let mut member_texts = Vec::with_capacity(slots.len());
        for (index, slot) in slots.iter().enumerate() {
            let slot_word = slot.extract(word);
            let member = self
                .matcher
                .match_slot_member(bundle, index, slot.width(), slot_word);
            let text = match member {
                Some(member) => {
                    self.render(member, slot_word, (slot.width() + 7) / 8, address)
                        .text
                }
                None => {
                    let digits = ((slot.width() + 7) / 8 * 2) as usize;
                    format!("UNKNOWN 0x{slot_word:0digits$X}")
                }
            };
            member_texts.push(text);
        }

        let header_operands = self.operand_values(bundle, word);
        let (mnemonic, template) = self.display_source(bundle);
        let text = match template {
            Some(template) => render_template(template, |name| {
                if let Some(index) = name
                    .strip_prefix("slot")
                    .and_then(|digits| digits.parse::<usize>().ok())
                {
                    return member_texts.get(index).cloned();
                }
                bundle
                    .operand_specs
                    .iter()
                    .position(|spec| spec.name == name)
                    .map(|at| header_operands[at].to_string())
            }),
            None => format!("{mnemonic} [ {} ]", member_texts.join(", ")),
        };
        ListingLine {
            address,
            word,
            width_bytes,
            mnemonic: mnemonic.to_string(),
            operands: member_texts,
            text,
        }
    }

    /// Operand values in declaration order, absent fields reading zero.
    fn operand_values(&self, instruction: &'a Instruction, word: u128) -> Vec<u128> {
        let decoded = self
            .spec
            .carrier_format(instruction)
            .map(|format| instruction.decode_operands(format, word))
            .unwrap_or_default();
        instruction
            .operand_specs
            .iter()
            .map(|spec| decoded.get(&spec.name).copied().unwrap_or(0))
            .collect()
    }

    /// The mnemonic and template to display: an alias override targeting
    /// this instruction wins over the instruction's own syntax.
    fn display_source(&self, instruction: &'a Instruction) -> (&'a str, Option<&'a str>) {
        let alias = self
            .spec
            .instruction_aliases
            .iter()
            .find(|alias| {
                alias.target_mnemonic == instruction.mnemonic && alias.assembly_syntax.is_some()
            });
        match alias {
            Some(alias) => (&alias.alias_mnemonic, alias.assembly_syntax.as_deref()),
            None => (&instruction.mnemonic, instruction.assembly_syntax.as_deref()),
        }
    }
}

fn unknown_line(address: u64, word: u128, width_bytes: u32) -> ListingLine {
    let digits = (width_bytes * 2) as usize;
    ListingLine {
        address,
        word,
        width_bytes,
        mnemonic: "UNKNOWN".into(),
        operands: vec![format!("0x{word:0digits$X}")],
        text: format!("UNKNOWN 0x{word:0digits$X}"),
    }
}

fn read_word(bytes: &[u8]) -> u128 {
    let mut word = 0u128;
    for (shift, byte) in bytes.iter().enumerate() {
        word |= u128::from(*byte) << (8 * shift);
    }
    word
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::assembler::{Assembler, emit_image};
    use crate::spec::builder::SpecBuilder;
    use crate::spec::register::RegisterKind;

    fn demo_spec() -> IsaSpecification {
        let mut builder = SpecBuilder::new("Demo");
        builder.register_file(RegisterKind::Gpr, "R", 32, 16);
        builder
            .format("R_TYPE", 32)
            .constant_field("opcode", 0, 5, 0x01)
            .field("rd", 6, 10)
            .field("rs1", 11, 15)
            .field("rs2", 16, 20)
            .field("funct", 21, 26)
            .identification(["opcode", "funct"])
            .finish();
        builder
            .format("HDR", 32)
            .constant_field("opcode", 0, 7, 0xFF)
            .identification(["opcode"])
            .finish();
        builder
            .bundle_format("PAIR", 96)
            .slot("slot0", 32, 63)
            .slot("slot1", 64, 95)
            .instruction_start(32)
            .finish();
        builder
            .instruction("ADD")
            .format("R_TYPE")
            .encode("funct", 0x0A)
            .operands(["rd", "rs1", "rs2"])
            .assembly_syntax("ADD R{rd}, R{rs1}, R{rs2}")
            .external_behavior()
            .finish();
        builder
            .instruction("SUB")
            .format("R_TYPE")
            .encode("funct", 0x0B)
            .operands(["rd", "rs1", "rs2"])
            .external_behavior()
            .finish();
        builder
            .instruction("PAIR2")
            .format("HDR")
            .bundle_format("PAIR")
            .bundle_members(["ADD", "SUB"])
            .finish();
        builder.build()
    }

    fn assemble(spec: &IsaSpecification, source: &str) -> Vec<u8> {
        let mut assembler = Assembler::new(spec);
        let words = assembler.assemble(source).expect("assembles");
        emit_image(&words)
    }

    #[test]
    fn renders_display_templates() {
        let spec = demo_spec();
        let image = assemble(&spec, "ADD R1, R2, R3");
        let listing = Disassembler::new(&spec).disassemble(&image, 0);
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].mnemonic, "ADD");
        assert_eq!(listing[0].text, "ADD R1, R2, R3");
        assert_eq!(listing[0].operands, vec!["1", "2", "3"]);
    }

    #[test]
    fn default_shape_when_template_absent() {
        let spec = demo_spec();
        let image = assemble(&spec, "SUB R4, R5, R6");
        let listing = Disassembler::new(&spec).disassemble(&image, 0);
        assert_eq!(listing[0].text, "SUB 4, 5, 6");
    }

    #[test]
    fn unknown_word_advances_four_bytes() {
        let spec = demo_spec();
        // opcode 0x3F matches nothing declared; recovery resumes at ADD
        let image = [0x3F, 0x00, 0x00, 0x00, 0x41, 0x10, 0x43, 0x01];
        let listing = Disassembler::new(&spec).disassemble(&image, 0x100);
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].text, "UNKNOWN 0x0000003F");
        assert_eq!(listing[0].width_bytes, 4);
        assert_eq!(listing[1].address, 0x104);
        assert_eq!(listing[1].mnemonic, "ADD");
    }

    #[test]
    fn ragged_tail_is_reported_not_dropped() {
        let spec = demo_spec();
        let image = [0xAB, 0xCD];
        let listing = Disassembler::new(&spec).disassemble(&image, 0);
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].width_bytes, 2);
        assert_eq!(listing[0].text, "UNKNOWN 0xCDAB");
    }

    #[test]
    fn bundle_renders_member_slots() {
        let spec = demo_spec();
        let image = assemble(&spec, "BUNDLE { ADD R1, R2, R3, SUB R4, R5, R6 }");
        let listing = Disassembler::new(&spec).disassemble(&image, 0);
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].mnemonic, "PAIR2");
        assert_eq!(listing[0].width_bytes, 12);
        assert_eq!(listing[0].text, "PAIR2 [ ADD R1, R2, R3, SUB 4, 5, 6 ]");
    }

    #[test]
    fn bundle_template_with_slot_placeholders() {
        let mut builder = SpecBuilder::new("Slots");
        builder
            .format("OP", 32)
            .constant_field("opcode", 0, 7, 0x2A)
            .field("n", 8, 15)
            .identification(["opcode"])
            .finish();
        builder
            .format("HDR", 32)
            .constant_field("opcode", 0, 7, 0xFF)
            .identification(["opcode"])
            .finish();
        builder
            .bundle_format("PAIR", 96)
            .slot("slot0", 32, 63)
            .slot("slot1", 64, 95)
            .finish();
        builder
            .instruction("NOPN")
            .format("OP")
            .operands(["n"])
            .external_behavior()
            .finish();
        builder
            .instruction("TWIN")
            .format("HDR")
            .bundle_format("PAIR")
            .bundle_members(["NOPN", "NOPN"])
            .assembly_syntax("TWIN {{ {slot0} || {slot1} }}")
            .finish();
        let spec = builder.build();

        let mut assembler = Assembler::new(&spec);
        let words = assembler
            .assemble("BUNDLE { NOPN 7, NOPN 9 }")
            .expect("assembles");
        let image = emit_image(&words);
        let listing = Disassembler::new(&spec).disassemble(&image, 0);
        assert_eq!(listing[0].text, "TWIN { NOPN 7 || NOPN 9 }");
    }

    #[test]
    fn alias_display_override_wins() {
        let mut builder = SpecBuilder::new("Alias");
        builder
            .format("OP", 32)
            .constant_field("opcode", 0, 7, 0x11)
            .field("rd", 8, 12)
            .field("rs1", 13, 17)
            .identification(["opcode"])
            .finish();
        builder
            .instruction("OR")
            .format("OP")
            .operands(["rd", "rs1"])
            .external_behavior()
            .finish();
        builder.instruction_alias("MV", "OR", Some("MV R{rd}, R{rs1}".into()));
        let spec = builder.build();

        let mut assembler = Assembler::new(&spec);
        let words = assembler.assemble("OR 3, 4").expect("assembles");
        let image = emit_image(&words);
        let listing = Disassembler::new(&spec).disassemble(&image, 0);
        assert_eq!(listing[0].mnemonic, "MV");
        assert_eq!(listing[0].text, "MV R3, R4");
    }

    #[test]
    fn listing_text_carries_fingerprint() {
        let spec = demo_spec();
        let image = assemble(&spec, "ADD R1, R2, R3");
        let text = Disassembler::new(&spec)
            .with_fingerprint("cafe1234")
            .listing(&image, 0);
        assert!(text.contains("// model fingerprint: cafe1234"), "{text}");
        assert!(text.contains("ADD R1, R2, R3"), "{text}");
        assert!(text.starts_with("// Demo disassembly"), "{text}");
    }
}
