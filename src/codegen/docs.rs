//! Reference-document renderer.
//!
//! Produces one markdown document for a composed model: properties,
//! registers, encoding formats, bundle layouts, and a section per
//! instruction with its behavior printed through the shared RTL formatter,
//! so documentation and error messages show behaviors identically.

use super::InstructionView;
use crate::rtl::pretty;
use crate::spec::field::BitField;
use crate::spec::instruction::{Instruction, OperandSpec};
use crate::spec::model::{IsaSpecification, PropertyValue};

/// Renders the full document, stamped with the model fingerprint.
pub fn render(spec: &IsaSpecification, fingerprint: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {} Instruction Set\n\n", spec.name));
    out.push_str(&format!("Model fingerprint: `{fingerprint}`\n\n"));

    properties(&mut out, spec);
    registers(&mut out, spec);
    formats(&mut out, spec);
    bundle_formats(&mut out, spec);
    instructions(&mut out, spec);
    instruction_aliases(&mut out, spec);
    out
}

fn properties(out: &mut String, spec: &IsaSpecification) {
    if spec.properties.is_empty() {
        return;
    }
    out.push_str("## Properties\n\n");
    out.push_str("| Property | Value |\n|---|---|\n");
    for (name, value) in &spec.properties {
        let text = match value {
            PropertyValue::Int(v) => v.to_string(),
            PropertyValue::Text(s) => s.clone(),
        };
        out.push_str(&format!("| {name} | {text} |\n"));
    }
    out.push('\n');
}

fn registers(out: &mut String, spec: &IsaSpecification) {
    if spec.registers.is_empty() {
        return;
    }
    out.push_str("## Registers\n\n");
    out.push_str("| Name | Kind | Width | Count | Fields |\n|---|---|---|---|---|\n");
    for reg in &spec.registers {
        let count = reg.count.map(|c| c.to_string()).unwrap_or_default();
        let fields = field_list(&reg.fields);
        out.push_str(&format!(
            "| {} | {} | {} | {count} | {fields} |\n",
            reg.name,
            reg.kind.keyword(),
            reg.width
        ));
    }
    out.push('\n');

    if !spec.virtual_registers.is_empty() {
        out.push_str("### Virtual registers\n\n");
        out.push_str("| Name | Width | Composed of |\n|---|---|---|\n");
        for vreg in &spec.virtual_registers {
            let parts: Vec<String> = vreg
                .components
                .iter()
                .map(|part| match part.index {
                    Some(index) => format!("{}[{index}]", part.reg_name),
                    None => part.reg_name.clone(),
                })
                .collect();
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                vreg.name,
                vreg.width,
                parts.join(", ")
            ));
        }
        out.push('\n');
    }

    if !spec.register_aliases.is_empty() {
        out.push_str("### Register aliases\n\n");
        out.push_str("| Alias | Target |\n|---|---|\n");
        for alias in &spec.register_aliases {
            let target = match alias.target_index {
                Some(index) => format!("{}[{index}]", alias.target_reg_name),
                None => alias.target_reg_name.clone(),
            };
            out.push_str(&format!("| {} | {target} |\n", alias.alias_name));
        }
        out.push('\n');
    }
}

fn formats(out: &mut String, spec: &IsaSpecification) {
    if spec.formats.is_empty() {
        return;
    }
    out.push_str("## Instruction formats\n\n");
    for format in &spec.formats {
        out.push_str(&format!("### {} ({} bits)\n\n", format.name, format.width));
        out.push_str("| Field | Bits | Constant |\n|---|---|---|\n");
        for field in &format.fields {
            let constant = field
                .constant
                .map(|value| format!("0x{value:X}"))
                .unwrap_or_default();
            out.push_str(&format!(
                "| {} | [{}:{}] | {constant} |\n",
                field.name, field.msb, field.lsb
            ));
        }
        out.push('\n');
        if !format.identification_fields.is_empty() {
            out.push_str(&format!(
                "Identification fields: {}\n\n",
                format.identification_fields.join(", ")
            ));
        }
    }
}

fn bundle_formats(out: &mut String, spec: &IsaSpecification) {
    if spec.bundle_formats.is_empty() {
        return;
    }
    out.push_str("## Bundle formats\n\n");
    for bundle in &spec.bundle_formats {
        out.push_str(&format!("### {} ({} bits)\n\n", bundle.name, bundle.width));
        if let Some(start) = bundle.instruction_start_bit {
            out.push_str(&format!("Instructions start at bit {start}.\n\n"));
        }
        out.push_str("| Slot | Bits |\n|---|---|\n");
        for slot in &bundle.slots {
            out.push_str(&format!("| {} | [{}:{}] |\n", slot.name, slot.msb, slot.lsb));
        }
        out.push('\n');
    }
}

fn instructions(out: &mut String, spec: &IsaSpecification) {
    if spec.instructions.is_empty() {
        return;
    }
    out.push_str("## Instructions\n\n");
    for instruction in &spec.instructions {
        let view = InstructionView::new(spec, instruction);
        out.push_str(&format!("### {}\n\n", instruction.mnemonic));
        out.push_str(&format!("Syntax: `{}`\n\n", view.syntax()));

        if let Some(format) = &instruction.format {
            out.push_str(&format!("- format: {format}\n"));
        }
        if let Some(bundle) = &instruction.bundle_format {
            out.push_str(&format!("- bundle format: {bundle}\n"));
        }
        if !instruction.bundle_instructions.is_empty() {
            out.push_str(&format!(
                "- members: {}\n",
                instruction.bundle_instructions.join(", ")
            ));
        }
        if !instruction.operand_specs.is_empty() {
            let names: Vec<String> =
                instruction.operand_specs.iter().map(operand_text).collect();
            out.push_str(&format!("- operands: {}\n", names.join(", ")));
        }
        for assignment in &instruction.encoding {
            out.push_str(&format!(
                "- encoding: {} = 0x{:X}\n",
                assignment.field, assignment.value
            ));
        }
        out.push('\n');

        behavior(out, instruction);
    }
}

fn behavior(out: &mut String, instruction: &Instruction) {
    if instruction.external_behavior {
        out.push_str("Behavior: external.\n\n");
        return;
    }
    let Some(block) = &instruction.behavior else {
        return;
    };
    out.push_str("Behavior:\n\n```\n");
    out.push_str(&pretty::render_block(block));
    out.push_str("```\n\n");
}

fn instruction_aliases(out: &mut String, spec: &IsaSpecification) {
    if spec.instruction_aliases.is_empty() {
        return;
    }
    out.push_str("## Instruction aliases\n\n");
    out.push_str("| Alias | Target | Syntax |\n|---|---|---|\n");
    for alias in &spec.instruction_aliases {
        let syntax = alias
            .assembly_syntax
            .as_deref()
            .map(|template| format!("`{template}`"))
            .unwrap_or_default();
        out.push_str(&format!(
            "| {} | {} | {syntax} |\n",
            alias.alias_mnemonic, alias.target_mnemonic
        ));
    }
    out.push('\n');
}

fn operand_text(spec: &OperandSpec) -> String {
    if spec.is_distributed() {
        format!("{} ({})", spec.name, spec.field_names.join(", "))
    } else {
        spec.name.clone()
    }
}

fn field_list(fields: &[BitField]) -> String {
    let parts: Vec<String> = fields
        .iter()
        .map(|field| format!("{} [{}:{}]", field.name, field.msb, field.lsb))
        .collect();
    parts.join(", ")
}
