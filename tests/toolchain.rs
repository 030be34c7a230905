use std::fs;
use std::path::{Path, PathBuf};

use hex_literal::hex;
use tempfile::tempdir;

use isaforge::IsaSpecification;
use isaforge::codegen::{Artifacts, BuildPlan, emit_image};
use isaforge::loader::IsaComposer;
use isaforge::spec::Validator;

const REGS_SRC: &str = r"
registers {
    gpr R 32 [16]
    sfr PC 32
    alias register SP = R[15]
}
";

const MAIN_SRC: &str = r#"
#include "regs.isa"

architecture DemoRISC {
    word_size: 32
    endianness: "little"

    formats {
        format R_TYPE 32 {
            opcode: [0:5] = 0x01
            rd: [6:10]
            rs1: [11:15]
            rs2: [16:20]
            funct: [21:26]
            identification_fields: opcode, funct
        }
        format I_TYPE 32 {
            opcode: [0:5] = 0x02
            rd: [6:10]
            imm: [11:30]
            identification_fields: opcode
        }
        format J_TYPE 32 {
            opcode: [0:5] = 0x03
            offset: [6:25]
            identification_fields: opcode
        }
        format W_TYPE 32 {
            opcode: [0:5] = 0x04
            rd: [6:10]
            imm_low: [11:13]
            imm_high: [26:28]
            identification_fields: opcode
        }
        format PAIR_HDR 32 {
            marker: [0:7] = 0xFF
            identification_fields: marker
        }
        bundle format PAIR 96 {
            slot0: [32:63]
            slot1: [64:95]
            instruction_start: 32
        }
    }

    instructions {
        instruction ADD {
            format: R_TYPE
            encoding: { funct=0x0A }
            operands: rd, rs1, rs2
            assembly_syntax: "ADD R{rd}, R{rs1}, R{rs2}"
            behavior: {
                R[rd] = R[rs1] + R[rs2];
            }
        }
        instruction SUB {
            format: R_TYPE
            encoding: { funct=0x0B }
            operands: rd, rs1, rs2
            assembly_syntax: "SUB R{rd}, R{rs1}, R{rs2}"
            behavior: {
                R[rd] = R[rs1] - R[rs2];
            }
        }
        instruction LDI {
            format: I_TYPE
            operands: rd, imm
            assembly_syntax: "LDI R{rd}, {imm}"
            behavior: {
                R[rd] = imm;
            }
        }
        instruction BR {
            format: J_TYPE
            operands: offset
            assembly_syntax: "BR {offset}"
            behavior: {
                PC = PC + 4 + offset * 4;
            }
        }
        instruction MOVW {
            format: W_TYPE
            operands: rd, imm(imm_low, imm_high)
            assembly_syntax: "MOVW R{rd}, {imm}"
            behavior: {
                R[rd] = imm;
            }
        }
        instruction PAIR2 {
            format: PAIR_HDR
            bundle_format: PAIR
            bundle_instructions: ADD, SUB
        }
        alias instruction SUM = ADD
    }
}
"#;

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write file");
    path
}

/// Composes and validates the two-file demo model, returning it with the
/// fingerprint of its source text.
fn compose_demo() -> (IsaSpecification, String) {
    let dir = tempdir().expect("tempdir");
    write_file(dir.path(), "regs.isa", REGS_SRC);
    let main = write_file(dir.path(), "demo.isa", MAIN_SRC);

    let mut composer = IsaComposer::new();
    let spec = composer.compose(&main).expect("compose demo model");
    Validator::new().validate(&spec).expect("validate demo model");
    (spec, composer.fingerprint())
}

#[test]
fn assembles_simulates_and_disassembles_a_composed_model() {
    let (spec, fingerprint) = compose_demo();
    let plan = BuildPlan::new(&spec, fingerprint);

    let mut assembler = plan.assembler();
    let words = assembler
        .assemble(
            "LDI R2, 10\n\
             LDI R3, 20\n\
             ADD R1, R2, R3\n",
        )
        .expect("assemble");
    assert_eq!(words.len(), 3);
    assert_eq!(words[0].value, 0x5082);
    assert_eq!(words[1].value, 0xA0C2);
    assert_eq!(words[2].value, 0x0143_1041);

    let image = emit_image(&words);
    assert_eq!(image, hex!("82500000 c2a00000 41104301"));

    let mut simulator = plan.simulator();
    simulator.load_image(&image, 0);
    let steps = simulator.run(10).expect("run");
    assert_eq!(steps, 3);
    assert!(simulator.halted());
    assert_eq!(simulator.pc(), 12);
    assert_eq!(simulator.state().element("R", 1), Some(30));
    assert_eq!(simulator.state().element("R", 2), Some(10));
    assert_eq!(simulator.state().element("R", 3), Some(20));

    let disassembler = plan.disassembler();
    let lines = disassembler.disassemble(&image, 0);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0].text, "LDI R2, 10");
    assert_eq!(lines[1].text, "LDI R3, 20");
    assert_eq!(lines[2].text, "ADD R1, R2, R3");
    assert_eq!(lines[2].address, 8);

    let listing = disassembler.listing(&image, 0);
    if std::env::var_os("SHOW_LISTING").is_some() {
        eprintln!("{listing}");
    }
    assert!(listing.starts_with("// DemoRISC disassembly\n"));
    assert!(listing.contains(&format!("// model fingerprint: {}", plan.fingerprint())));
    assert!(listing.contains("00000008:  01431041  ADD R1, R2, R3"));
}

#[test]
fn pc_relative_branches_resolve_labels() {
    let (spec, fingerprint) = compose_demo();
    let plan = BuildPlan::new(&spec, fingerprint);

    let mut assembler = plan.assembler();
    let words = assembler
        .assemble(
            "        LDI R1, 1\n\
                     BR skip\n\
                     LDI R1, 99\n\
             skip:   LDI R2, 7\n",
        )
        .expect("assemble");
    assert_eq!(assembler.labels().get("skip"), Some(&12));
    // (12 - 4 - 4) / 4 = 1 word forward
    assert_eq!(words[1].value, 0x43);

    let mut simulator = plan.simulator();
    simulator.load_image(&emit_image(&words), 0);
    let steps = simulator.run(10).expect("run");
    assert_eq!(steps, 3, "the branch skips one statement");
    assert_eq!(simulator.state().element("R", 1), Some(1));
    assert_eq!(simulator.state().element("R", 2), Some(7));
    assert_eq!(simulator.pc(), 16);
}

#[test]
fn bundle_groups_round_trip_through_the_toolchain() {
    let (spec, fingerprint) = compose_demo();
    let plan = BuildPlan::new(&spec, fingerprint);

    let mut assembler = plan.assembler();
    let words = assembler
        .assemble(
            "LDI R1, 10\n\
             LDI R2, 3\n\
             BUNDLE { ADD R4, R1, R2, SUB R5, R1, R2 }\n",
        )
        .expect("assemble");
    assert_eq!(words[2].address, 8);
    assert_eq!(words[2].width_bytes, 12);
    assert_eq!(
        words[2].value,
        0xFF | (0x0142_0901u128 << 32) | (0x0162_0941u128 << 64)
    );

    let image = emit_image(&words);
    assert_eq!(image.len(), 20);

    let mut simulator = plan.simulator();
    simulator.load_image(&image, 0);
    let steps = simulator.run(10).expect("run");
    assert_eq!(steps, 3, "a bundle counts as one statement");
    assert_eq!(simulator.state().element("R", 4), Some(13));
    assert_eq!(simulator.state().element("R", 5), Some(7));
    assert_eq!(simulator.pc(), 20);

    let lines = plan.disassembler().disassemble(&image, 0);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[2].text, "PAIR2 [ ADD R4, R1, R2, SUB R5, R1, R2 ]");
    assert_eq!(lines[2].width_bytes, 12);
}

#[test]
fn distributed_operands_round_trip() {
    let (spec, fingerprint) = compose_demo();
    let plan = BuildPlan::new(&spec, fingerprint);

    let words = plan
        .assembler()
        .assemble("MOVW R1, 10")
        .expect("assemble");
    // imm 10 splits into imm_low=2 and imm_high=1
    assert_eq!(words[0].value, 0x0400_1044);

    let image = emit_image(&words);
    let lines = plan.disassembler().disassemble(&image, 0);
    assert_eq!(lines[0].text, "MOVW R1, 10");

    let mut simulator = plan.simulator();
    simulator.load_image(&image, 0);
    simulator.run(1).expect("run");
    assert_eq!(simulator.state().element("R", 1), Some(10));
}

#[test]
fn register_aliases_and_symbols_resolve_in_operands() {
    let (spec, fingerprint) = compose_demo();
    let plan = BuildPlan::new(&spec, fingerprint);

    let mut assembler = plan.assembler();
    assembler.define_symbol("LIMIT", 40);
    let words = assembler
        .assemble(
            "ADD SP, R1, R2\n\
             LDI R3, LIMIT\n",
        )
        .expect("assemble");
    assert_eq!(words[0].value, 0x0142_0BC1, "SP encodes as R[15]");
    assert_eq!(words[1].value, 0x0001_40C2);

    let mut simulator = plan.simulator();
    simulator.load_image(&emit_image(&words), 0);
    simulator.state_mut().set_element("R", 1, 12);
    simulator.state_mut().set_element("R", 2, 30);
    let steps = simulator.run(10).expect("run");
    assert_eq!(steps, 2);
    assert_eq!(simulator.state().element("R", 15), Some(42));
    assert_eq!(simulator.state().element("R", 3), Some(40));
}

#[test]
fn alias_mnemonics_assemble_like_their_targets() {
    let (spec, fingerprint) = compose_demo();
    let plan = BuildPlan::new(&spec, fingerprint);

    let direct = plan
        .assembler()
        .assemble("ADD R1, R2, R3")
        .expect("assemble ADD");
    let aliased = plan
        .assembler()
        .assemble("SUM R1, R2, R3")
        .expect("assemble SUM");
    let lowered = plan
        .assembler()
        .assemble("add r1, r2, r3")
        .expect("assemble lowercase");
    assert_eq!(direct[0].value, aliased[0].value);
    assert_eq!(direct[0].value, lowered[0].value);
}

#[test]
fn unknown_words_disassemble_as_gaps_but_halt_the_simulator() {
    let (spec, fingerprint) = compose_demo();
    let plan = BuildPlan::new(&spec, fingerprint);

    // no opcode decodes to 0x3F; the second word is ADD R1, R2, R3
    let image = hex!("3f000000 41104301");

    let lines = plan.disassembler().disassemble(&image, 0);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].mnemonic, "UNKNOWN");
    assert_eq!(lines[0].text, "UNKNOWN 0x0000003F");
    assert_eq!(lines[1].text, "ADD R1, R2, R3");

    let mut simulator = plan.simulator();
    simulator.load_image(&image, 0);
    let steps = simulator.run(5).expect("run");
    assert_eq!(steps, 0, "execution stops at the first unknown word");
    assert!(simulator.halted());
    assert_eq!(simulator.instruction_count(), 0);
}

#[test]
fn documentation_covers_declared_entities() {
    let (spec, fingerprint) = compose_demo();
    let plan = BuildPlan::new(&spec, fingerprint);
    let doc = plan.documentation();

    assert!(doc.starts_with("# DemoRISC Instruction Set\n"));
    assert!(doc.contains(&format!("Model fingerprint: `{}`", plan.fingerprint())));

    assert!(doc.contains("| R | gpr | 32 | 16 |"));
    assert!(doc.contains("| SP | R[15] |"));

    assert!(doc.contains("### R_TYPE (32 bits)"));
    assert!(doc.contains("| opcode | [5:0] | 0x1 |"));
    assert!(doc.contains("Identification fields: opcode, funct"));

    assert!(doc.contains("### PAIR (96 bits)"));
    assert!(doc.contains("Instructions start at bit 32."));
    assert!(doc.contains("| slot0 | [63:32] |"));

    assert!(doc.contains("### ADD"));
    assert!(doc.contains("Syntax: `ADD R{rd}, R{rs1}, R{rs2}`"));
    assert!(doc.contains("- encoding: funct = 0xA"));
    assert!(doc.contains("R[rd] = (R[rs1] + R[rs2]);"));

    assert!(doc.contains("### PAIR2"));
    assert!(doc.contains("- bundle format: PAIR"));
    assert!(doc.contains("- members: ADD, SUB"));

    assert!(doc.contains("- operands: rd, imm (imm_low, imm_high)"));
    assert!(doc.contains("| SUM | ADD |"));
}

#[test]
fn fingerprint_is_stable_across_recomposition() {
    let (_, first) = compose_demo();
    let (_, second) = compose_demo();
    assert_eq!(first, second);
    assert_eq!(first.len(), 64);
    assert!(first.bytes().all(|b| b.is_ascii_hexdigit()));

    let dir = tempdir().expect("tempdir");
    write_file(
        dir.path(),
        "regs.isa",
        "registers { gpr R 32 [16] sfr PC 32 sfr SCRATCH 32 alias register SP = R[15] }",
    );
    let main = write_file(dir.path(), "demo.isa", MAIN_SRC);
    let mut composer = IsaComposer::new();
    composer.compose(&main).expect("compose modified model");
    assert_ne!(composer.fingerprint(), first);
}

#[test]
fn build_plan_constructs_only_selected_artifacts() {
    let (spec, fingerprint) = compose_demo();

    let full = BuildPlan::new(&spec, fingerprint.clone()).run();
    assert!(full.assembler.is_some());
    assert!(full.disassembler.is_some());
    assert!(full.simulator.is_some());
    assert!(full.documentation.is_some());

    let partial = BuildPlan::new(&spec, fingerprint)
        .select(Artifacts::DISASSEMBLER | Artifacts::DOCS)
        .run();
    assert!(partial.assembler.is_none());
    assert!(partial.simulator.is_none());
    assert!(partial.disassembler.is_some());
    let doc = partial.documentation.expect("documentation rendered");
    assert!(doc.contains("# DemoRISC Instruction Set"));
}
