//! Semantic validation for composed architecture models.
//!
//! Validation is a separate, explicitly invoked pass: parsing and
//! composition never run it implicitly. Findings accumulate so one run
//! reports every problem; [`Validator::validate`] fails only when at least
//! one finding is an error, leaving advisory warnings inspectable through
//! [`Validator::check`].

use std::collections::BTreeSet;

use crate::diagnostic::{DiagnosticLevel, DiagnosticPhase, IsaDiagnostic};
use crate::error::{IsaError, IsaResult};
use crate::rtl::ast::{LValue, RtlExpr, RtlStatement};
use crate::spec::field::mask_bits;
use crate::spec::format::InstructionFormat;
use crate::spec::instruction::Instruction;
use crate::spec::model::IsaSpecification;

pub struct Validator {
    diagnostics: Vec<IsaDiagnostic>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self { diagnostics: Vec::new() }
    }

    /// Runs every check and returns all findings, warnings included.
    pub fn check(&mut self, spec: &IsaSpecification) -> &[IsaDiagnostic] {
        self.diagnostics.clear();
        self.check_duplicates(spec);
        self.check_registers(spec);
        self.check_formats(spec);
        self.check_instructions(spec);
        self.check_register_aliases(spec);
        self.check_virtual_registers(spec);
        self.check_instruction_aliases(spec);
        &self.diagnostics
    }

    /// Runs every check and fails if any finding is an error.
    pub fn validate(&mut self, spec: &IsaSpecification) -> IsaResult<()> {
        self.check(spec);
        if self
            .diagnostics
            .iter()
            .any(|d| d.level == DiagnosticLevel::Error)
        {
            return Err(IsaError::Diagnostics {
                phase: DiagnosticPhase::Validation,
                diagnostics: std::mem::take(&mut self.diagnostics),
            });
        }
        Ok(())
    }

    fn error(&mut self, code: &'static str, message: impl Into<String>) {
        self.diagnostics
            .push(IsaDiagnostic::error(DiagnosticPhase::Validation, code, message, None));
    }

    fn warning(&mut self, code: &'static str, message: impl Into<String>) {
        self.diagnostics
            .push(IsaDiagnostic::warning(DiagnosticPhase::Validation, code, message, None));
    }

    fn check_duplicates(&mut self, spec: &IsaSpecification) {
        let mut seen: BTreeSet<(&str, &str)> = BTreeSet::new();
        for (kind, name) in spec.named_entities() {
            if !seen.insert((kind, name)) {
                self.error(
                    "validation.duplicate-definition",
                    format!("{kind} '{name}' defined multiple times"),
                );
            }
        }
    }

    fn check_registers(&mut self, spec: &IsaSpecification) {
        for reg in &spec.registers {
            let mut fields: BTreeSet<&str> = BTreeSet::new();
            for field in &reg.fields {
                if !fields.insert(field.name.as_str()) {
                    self.error(
                        "validation.register.duplicate-field",
                        format!("field '{}' declared multiple times on register '{}'", field.name, reg.name),
                    );
                }
                if field.msb < field.lsb {
                    self.error(
                        "validation.register.field-range",
                        format!(
                            "field '{}' on register '{}' has an inverted bit range",
                            field.name, reg.name
                        ),
                    );
                    continue;
                }
                if field.msb >= reg.width {
                    self.error(
                        "validation.register.field-range",
                        format!(
                            "field '{}' on register '{}' exceeds register width {}",
                            field.name, reg.name, reg.width
                        ),
                    );
                }
            }
        }
    }

    fn check_formats(&mut self, spec: &IsaSpecification) {
        for format in &spec.formats {
            let mut names: BTreeSet<&str> = BTreeSet::new();
            for field in &format.fields {
                if !names.insert(field.name.as_str()) {
                    self.error(
                        "validation.format.duplicate-field",
                        format!(
                            "field '{}' declared multiple times in format '{}'",
                            field.name, format.name
                        ),
                    );
                }
                if field.msb < field.lsb {
                    self.error(
                        "validation.format.field-range",
                        format!(
                            "field '{}' in format '{}' has an inverted bit range",
                            field.name, format.name
                        ),
                    );
                    continue;
                }
                if field.msb >= format.width {
                    self.error(
                        "validation.format.field-range",
                        format!(
                            "field '{}' in format '{}' exceeds format width {}",
                            field.name, format.name, format.width
                        ),
                    );
                }
                if let Some(constant) = field.constant {
                    if constant > mask_bits(field.width()) {
                        self.error(
                            "validation.format.constant-overflow",
                            format!(
                                "constant value {constant:#x} for field '{}' exceeds field width {} in format '{}'",
                                field.name,
                                field.width(),
                                format.name
                            ),
                        );
                    }
                }
            }
            self.check_field_overlap(format);
            for id_field in &format.identification_fields {
                if format.field(id_field).is_none() {
                    self.error(
                        "validation.format.unknown-identification-field",
                        format!(
                            "identification field '{id_field}' not defined in format '{}'",
                            format.name
                        ),
                    );
                }
            }
        }
        for bundle in &spec.bundle_formats {
            for slot in &bundle.slots {
                if slot.msb < slot.lsb {
                    self.error(
                        "validation.bundle.slot-range",
                        format!(
                            "slot '{}' in bundle format '{}' has an inverted bit range",
                            slot.name, bundle.name
                        ),
                    );
                } else if slot.msb >= bundle.width {
                    self.error(
                        "validation.bundle.slot-range",
                        format!(
                            "slot '{}' in bundle format '{}' exceeds bundle width {}",
                            slot.name, bundle.name, bundle.width
                        ),
                    );
                }
            }
            if let Some(start) = bundle.instruction_start_bit {
                if start >= bundle.width {
                    self.error(
                        "validation.bundle.instruction-start",
                        format!(
                            "instruction start bit {start} exceeds bundle format '{}' width {}",
                            bundle.name, bundle.width
                        ),
                    );
                }
            }
        }
    }

    fn check_field_overlap(&mut self, format: &InstructionFormat) {
        for (i, a) in format.fields.iter().enumerate() {
            if a.msb < a.lsb {
                continue;
            }
            for b in format.fields.iter().skip(i + 1) {
                if b.msb < b.lsb {
                    continue;
                }
                if a.mask() & b.mask() != 0 {
                    self.error(
                        "validation.format.field-overlap",
                        format!(
                            "fields '{}' and '{}' overlap in format '{}'",
                            a.name, b.name, format.name
                        ),
                    );
                }
            }
        }
    }

    fn check_instructions(&mut self, spec: &IsaSpecification) {
        for instr in &spec.instructions {
            let format = match instr.format.as_deref() {
                Some(name) => match spec.get_format(name) {
                    Some(found) => Some(found),
                    None => {
                        self.error(
                            "validation.instruction.unknown-format",
                            format!(
                                "instruction '{}' references unknown format '{name}'",
                                instr.mnemonic
                            ),
                        );
                        None
                    }
                },
                None => {
                    if !instr.is_bundle() {
                        self.warning(
                            "validation.instruction.no-format",
                            format!("instruction '{}' declares no format", instr.mnemonic),
                        );
                    }
                    None
                }
            };

            if let Some(bundle_name) = instr.bundle_format.as_deref() {
                if spec.get_bundle_format(bundle_name).is_none() {
                    self.error(
                        "validation.instruction.unknown-bundle-format",
                        format!(
                            "instruction '{}' references unknown bundle format '{bundle_name}'",
                            instr.mnemonic
                        ),
                    );
                }
            }
            for member in &instr.bundle_instructions {
                if spec.get_instruction(member).is_none() {
                    self.error(
                        "validation.instruction.unknown-bundle-member",
                        format!(
                            "bundle '{}' lists unknown member instruction '{member}'",
                            instr.mnemonic
                        ),
                    );
                }
            }

            if let Some(format) = format {
                self.check_encoding(instr, format);
            }

            if instr.behavior.is_none() && !instr.external_behavior && !instr.is_bundle() {
                self.warning(
                    "validation.instruction.missing-behavior",
                    format!(
                        "instruction '{}' is missing behavior (declare a behavior block or external_behavior: true)",
                        instr.mnemonic
                    ),
                );
            }
            if let Some(behavior) = &instr.behavior {
                for stmt in &behavior.statements {
                    self.check_statement(spec, instr, stmt);
                }
            }
        }
    }

    fn check_encoding(&mut self, instr: &Instruction, format: &InstructionFormat) {
        for assignment in &instr.encoding {
            let Some(field) = format.field(&assignment.field) else {
                self.error(
                    "validation.instruction.encoding-unknown-field",
                    format!(
                        "encoding assignment '{}' does not name a field of format '{}' (instruction '{}')",
                        assignment.field, format.name, instr.mnemonic
                    ),
                );
                continue;
            };
            if field.constant.is_some() {
                self.error(
                    "validation.instruction.encoding-overrides-constant",
                    format!(
                        "instruction '{}' encoding cannot override constant field '{}' of format '{}'",
                        instr.mnemonic, field.name, format.name
                    ),
                );
            }
            if assignment.value > mask_bits(field.width()) {
                self.error(
                    "validation.instruction.encoding-overflow",
                    format!(
                        "encoding value {:#x} for field '{}' exceeds field width {} (instruction '{}')",
                        assignment.value,
                        field.name,
                        field.width(),
                        instr.mnemonic
                    ),
                );
            }
        }
    }

    /// A name is a legal register reference when it denotes a register,
    /// register alias, or virtual register.
    fn register_like(&self, spec: &IsaSpecification, name: &str) -> bool {
        spec.get_register(name).is_some()
            || spec.get_virtual_register(name).is_some()
            || spec.resolve_register_alias(name).is_some()
    }

    fn check_statement(&mut self, spec: &IsaSpecification, instr: &Instruction, stmt: &RtlStatement) {
        match stmt {
            RtlStatement::Assignment(assign) => {
                self.check_lvalue(spec, instr, &assign.target);
                self.check_expr(spec, instr, &assign.expr);
            }
            RtlStatement::Conditional { condition, then_body, else_body } => {
                self.check_expr(spec, instr, condition);
                for stmt in then_body.iter().chain(else_body) {
                    self.check_statement(spec, instr, stmt);
                }
            }
            RtlStatement::MemoryStore { address, value } => {
                self.check_expr(spec, instr, address);
                self.check_expr(spec, instr, value);
            }
            RtlStatement::MemoryLoad { target, address } => {
                self.check_lvalue(spec, instr, target);
                self.check_expr(spec, instr, address);
            }
            RtlStatement::ForLoop { init, condition, update, body } => {
                self.check_lvalue(spec, instr, &init.target);
                self.check_expr(spec, instr, &init.expr);
                self.check_expr(spec, instr, condition);
                self.check_lvalue(spec, instr, &update.target);
                self.check_expr(spec, instr, &update.expr);
                for stmt in body {
                    self.check_statement(spec, instr, stmt);
                }
            }
        }
    }

    fn check_lvalue(&mut self, spec: &IsaSpecification, instr: &Instruction, lvalue: &LValue) {
        match lvalue {
            LValue::Register { reg, index } => {
                self.check_register_ref(spec, instr, reg);
                if let Some(index) = index {
                    self.check_expr(spec, instr, index);
                }
            }
            LValue::Field { reg, field } => self.check_field_ref(spec, instr, reg, field),
            // bare names may be temporaries, never an error here
            LValue::Variable(_) => {}
        }
    }

    fn check_expr(&mut self, spec: &IsaSpecification, instr: &Instruction, expr: &RtlExpr) {
        match expr {
            RtlExpr::Constant(_) | RtlExpr::OperandRef(_) => {}
            RtlExpr::Register { reg, index } => {
                self.check_register_ref(spec, instr, reg);
                if let Some(index) = index {
                    self.check_expr(spec, instr, index);
                }
            }
            RtlExpr::Field { reg, field } => self.check_field_ref(spec, instr, reg, field),
            RtlExpr::Binary { left, right, .. } => {
                self.check_expr(spec, instr, left);
                self.check_expr(spec, instr, right);
            }
            RtlExpr::Unary { expr, .. } => self.check_expr(spec, instr, expr),
            RtlExpr::Ternary { condition, then_expr, else_expr } => {
                self.check_expr(spec, instr, condition);
                self.check_expr(spec, instr, then_expr);
                self.check_expr(spec, instr, else_expr);
            }
            RtlExpr::BitSlice { base, .. } => self.check_expr(spec, instr, base),
            RtlExpr::Call { args, .. } => {
                for arg in args {
                    self.check_expr(spec, instr, arg);
                }
            }
        }
    }

    fn check_register_ref(&mut self, spec: &IsaSpecification, instr: &Instruction, reg: &str) {
        if !self.register_like(spec, reg) {
            self.error(
                "validation.behavior.unknown-register",
                format!(
                    "behavior of '{}' references unknown register '{reg}'",
                    instr.mnemonic
                ),
            );
        }
    }

    fn check_field_ref(
        &mut self,
        spec: &IsaSpecification,
        instr: &Instruction,
        reg: &str,
        field: &str,
    ) {
        let Some(register) = spec.get_register(reg) else {
            self.error(
                "validation.behavior.unknown-register",
                format!(
                    "behavior of '{}' references unknown register '{reg}'",
                    instr.mnemonic
                ),
            );
            return;
        };
        if register.field(field).is_none() {
            self.error(
                "validation.behavior.unknown-field",
                format!(
                    "behavior of '{}' references unknown field '{field}' on register '{}'",
                    instr.mnemonic, register.name
                ),
            );
        }
    }

    fn check_register_aliases(&mut self, spec: &IsaSpecification) {
        for alias in &spec.register_aliases {
            let Some(resolved) = spec.resolve_register_alias(&alias.alias_name) else {
                continue;
            };
            let target = &resolved.target_reg_name;
            if let Some(register) = spec.get_register(target) {
                if let Some(index) = resolved.target_index {
                    if !register.is_register_file() {
                        self.error(
                            "validation.alias.not-a-file",
                            format!(
                                "alias '{}' indexes register '{}' which is not a register file",
                                alias.alias_name, register.name
                            ),
                        );
                    } else if register.count.is_some_and(|count| index >= count) {
                        self.error(
                            "validation.alias.index-range",
                            format!(
                                "alias '{}' index {index} out of range for register '{}'",
                                alias.alias_name, register.name
                            ),
                        );
                    }
                }
            } else if spec.get_virtual_register(target).is_none() {
                self.error(
                    "validation.alias.unknown-target",
                    format!(
                        "alias '{}' targets unknown register '{target}'",
                        alias.alias_name
                    ),
                );
            }
        }
    }

    fn check_virtual_registers(&mut self, spec: &IsaSpecification) {
        for virt in &spec.virtual_registers {
            let mut total_width = 0u32;
            for comp in &virt.components {
                let Some(register) = spec.get_register(&comp.reg_name) else {
                    self.error(
                        "validation.virtual.unknown-component",
                        format!(
                            "virtual register '{}' references unknown register '{}'",
                            virt.name, comp.reg_name
                        ),
                    );
                    continue;
                };
                match comp.index {
                    Some(_) if !register.is_register_file() => {
                        self.error(
                            "validation.virtual.component-index",
                            format!(
                                "virtual register '{}' indexes register '{}' which is not a register file",
                                virt.name, register.name
                            ),
                        );
                    }
                    Some(index) if register.count.is_some_and(|count| index >= count) => {
                        self.error(
                            "validation.virtual.component-index",
                            format!(
                                "virtual register '{}' component index {index} out of range for register '{}'",
                                virt.name, register.name
                            ),
                        );
                    }
                    None if register.is_register_file() => {
                        self.error(
                            "validation.virtual.component-index",
                            format!(
                                "component '{}' of virtual register '{}' requires an index",
                                register.name, virt.name
                            ),
                        );
                    }
                    _ => {}
                }
                total_width += register.width;
            }
            if total_width != 0 && total_width != virt.width {
                self.warning(
                    "validation.virtual.width-mismatch",
                    format!(
                        "virtual register '{}' declares width {} but its components total {}",
                        virt.name, virt.width, total_width
                    ),
                );
            }
        }
    }

    fn check_instruction_aliases(&mut self, spec: &IsaSpecification) {
        for alias in &spec.instruction_aliases {
            let Some(resolved) = spec.resolve_instruction_alias(&alias.alias_mnemonic) else {
                continue;
            };
            if spec
                .instructions
                .iter()
                .all(|i| i.mnemonic != resolved.target_mnemonic)
            {
                self.error(
                    "validation.alias.unknown-instruction",
                    format!(
                        "instruction alias '{}' targets unknown instruction '{}'",
                        alias.alias_mnemonic, resolved.target_mnemonic
                    ),
                );
            }
        }
    }
}
