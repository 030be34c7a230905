//! Artifact drivers derived from a composed model: an assembler, a
//! disassembler, an interpreting simulator, and a documentation renderer.
//!
//! Every driver consumes the same [`InstructionView`] (mnemonic, carrier
//! layout, operand specs, display template, encoding assignments, behavior),
//! so none of them re-derives encoding or execution semantics locally.

pub mod assembler;
pub mod disassembler;
pub mod docs;
pub mod simulator;

pub use assembler::{Assembler, EncodedWord, emit_image};
pub use disassembler::{Disassembler, ListingLine};
pub use simulator::{Fault, Simulator};

use bitflags::bitflags;

use crate::rtl::ast::RtlBlock;
use crate::spec::format::{BundleFormat, InstructionFormat};
use crate::spec::instruction::{EncodingAssignment, Instruction, OperandSpec};
use crate::spec::model::IsaSpecification;

bitflags! {
    /// Driver selection for one toolchain build.
    #[derive(Debug, Default, PartialEq, Eq, Copy, Clone)]
    pub struct Artifacts: u32 {
        const ASSEMBLER    = 0b0001;
        const DISASSEMBLER = 0b0010;
        const SIMULATOR    = 0b0100;
        const DOCS         = 0b1000;
    }
}

/// One instruction as the drivers see it.
#[derive(Clone, Copy)]
pub struct InstructionView<'a> {
    spec: &'a IsaSpecification,
    instruction: &'a Instruction,
}

impl<'a> InstructionView<'a> {
    pub fn new(spec: &'a IsaSpecification, instruction: &'a Instruction) -> Self {
        Self { spec, instruction }
    }

    pub fn instruction(&self) -> &'a Instruction {
        self.instruction
    }

    pub fn mnemonic(&self) -> &'a str {
        &self.instruction.mnemonic
    }

    /// The identification layout: the instruction's own format, which for a
    /// bundle is the fixed-size header, never the slot layout.
    pub fn format(&self) -> Option<&'a InstructionFormat> {
        self.spec.carrier_format(self.instruction)
    }

    pub fn bundle_format(&self) -> Option<&'a BundleFormat> {
        self.instruction
            .bundle_format
            .as_deref()
            .and_then(|name| self.spec.get_bundle_format(name))
    }

    pub fn operand_specs(&self) -> &'a [OperandSpec] {
        &self.instruction.operand_specs
    }

    pub fn encoding(&self) -> &'a [EncodingAssignment] {
        &self.instruction.encoding
    }

    pub fn behavior(&self) -> Option<&'a RtlBlock> {
        self.instruction.behavior.as_ref()
    }

    pub fn display_template(&self) -> Option<&'a str> {
        self.instruction.assembly_syntax.as_deref()
    }

    /// The declared template, or the `MNEMONIC {op1}, {op2}` shape derived
    /// from the operand specs when none was written.
    pub fn syntax(&self) -> String {
        if let Some(template) = self.display_template() {
            return template.to_string();
        }
        let placeholders: Vec<String> = self
            .instruction
            .operand_names()
            .map(|name| format!("{{{name}}}"))
            .collect();
        if placeholders.is_empty() {
            self.mnemonic().to_string()
        } else {
            format!("{} {}", self.mnemonic(), placeholders.join(", "))
        }
    }
}

/// Renders a `{name}` placeholder template. Doubled braces emit literal
/// braces; placeholders the resolver does not recognize stay in place
/// unreplaced, so partially-bound templates remain readable.
pub fn render_template<F>(template: &str, mut resolve: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' if matches!(chars.peek(), Some('{')) => {
                chars.next();
                result.push('{');
            }
            '}' if matches!(chars.peek(), Some('}')) => {
                chars.next();
                result.push('}');
            }
            '{' => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next == '}' {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                if matches!(chars.peek(), Some('}')) {
                    chars.next();
                    match resolve(&name) {
                        Some(value) => result.push_str(&value),
                        None => {
                            result.push('{');
                            result.push_str(&name);
                            result.push('}');
                        }
                    }
                } else {
                    // Unterminated placeholder: copy it through as written.
                    result.push('{');
                    result.push_str(&name);
                }
            }
            _ => result.push(ch),
        }
    }
    result
}

/// Default display for a decoded instruction when no template is declared:
/// `MNEMONIC v1, v2, ...` in operand-spec order.
pub fn default_display(mnemonic: &str, operands: &[String]) -> String {
    if operands.is_empty() {
        mnemonic.to_string()
    } else {
        format!("{mnemonic} {}", operands.join(", "))
    }
}

/// Selects and constructs the drivers for one toolchain build. The
/// fingerprint is the digest of the composed source text and travels into
/// rendered artifacts so stale output can be detected.
pub struct BuildPlan<'a> {
    spec: &'a IsaSpecification,
    fingerprint: String,
    artifacts: Artifacts,
}

/// The drivers a [`BuildPlan`] run produced, one slot per selected flag.
pub struct ToolchainBuild<'a> {
    pub assembler: Option<Assembler<'a>>,
    pub disassembler: Option<Disassembler<'a>>,
    pub simulator: Option<Simulator<'a>>,
    pub documentation: Option<String>,
}

impl<'a> BuildPlan<'a> {
    pub fn new(spec: &'a IsaSpecification, fingerprint: impl Into<String>) -> Self {
        Self {
            spec,
            fingerprint: fingerprint.into(),
            artifacts: Artifacts::all(),
        }
    }

    pub fn select(mut self, artifacts: Artifacts) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn artifacts(&self) -> Artifacts {
        self.artifacts
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn assembler(&self) -> Assembler<'a> {
        Assembler::new(self.spec)
    }

    pub fn disassembler(&self) -> Disassembler<'a> {
        Disassembler::new(self.spec).with_fingerprint(self.fingerprint.clone())
    }

    pub fn simulator(&self) -> Simulator<'a> {
        Simulator::new(self.spec)
    }

    pub fn documentation(&self) -> String {
        docs::render(self.spec, &self.fingerprint)
    }

    /// Constructs every selected driver.
    pub fn run(&self) -> ToolchainBuild<'a> {
        ToolchainBuild {
            assembler: self
                .artifacts
                .contains(Artifacts::ASSEMBLER)
                .then(|| self.assembler()),
            disassembler: self
                .artifacts
                .contains(Artifacts::DISASSEMBLER)
                .then(|| self.disassembler()),
            simulator: self
                .artifacts
                .contains(Artifacts::SIMULATOR)
                .then(|| self.simulator()),
            documentation: self
                .artifacts
                .contains(Artifacts::DOCS)
                .then(|| self.documentation()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::builder::SpecBuilder;

    fn tiny_spec() -> IsaSpecification {
        let mut builder = SpecBuilder::new("Tiny");
        builder
            .format("R", 32)
            .constant_field("opcode", 0, 5, 0x01)
            .field("rd", 6, 10)
            .field("rs1", 11, 15)
            .identification(["opcode"])
            .finish();
        builder
            .instruction("MV")
            .format("R")
            .operands(["rd", "rs1"])
            .external_behavior()
            .finish();
        builder.build()
    }

    #[test]
    fn template_substitutes_and_escapes() {
        let rendered = render_template("{{{rd}}} <- {rs1}", |name| match name {
            "rd" => Some("3".into()),
            "rs1" => Some("7".into()),
            _ => None,
        });
        assert_eq!(rendered, "{3} <- 7");
    }

    #[test]
    fn unknown_placeholder_stays_verbatim() {
        let rendered = render_template("MV {rd}, {mystery}", |name| {
            (name == "rd").then(|| "1".to_string())
        });
        assert_eq!(rendered, "MV 1, {mystery}");
    }

    #[test]
    fn unterminated_placeholder_copies_through() {
        let rendered = render_template("MV {rd", |_| Some("1".into()));
        assert_eq!(rendered, "MV {rd");
    }

    #[test]
    fn view_synthesizes_default_syntax() {
        let spec = tiny_spec();
        let instr = spec.get_instruction("MV").expect("MV declared");
        let view = InstructionView::new(&spec, instr);
        assert_eq!(view.syntax(), "MV {rd}, {rs1}");
        assert!(view.display_template().is_none());
        assert_eq!(view.format().map(|f| f.name.as_str()), Some("R"));
    }

    #[test]
    fn default_display_joins_operand_values() {
        assert_eq!(default_display("NOP", &[]), "NOP");
        assert_eq!(
            default_display("ADD", &["1".into(), "2".into(), "3".into()]),
            "ADD 1, 2, 3"
        );
    }

    #[test]
    fn build_plan_gates_drivers_on_selection() {
        let spec = tiny_spec();
        let plan = BuildPlan::new(&spec, "deadbeef")
            .select(Artifacts::ASSEMBLER | Artifacts::DOCS);
        let build = plan.run();
        assert!(build.assembler.is_some());
        assert!(build.documentation.is_some());
        assert!(build.disassembler.is_none());
        assert!(build.simulator.is_none());
    }

    #[test]
    fn build_plan_defaults_to_all_artifacts() {
        let spec = tiny_spec();
        let plan = BuildPlan::new(&spec, "deadbeef");
        assert_eq!(plan.artifacts(), Artifacts::all());
    }
}
