//! Behavioral simulator.
//!
//! Owns the machine state built from a specification, fetches through the
//! width-class matcher, and runs each matched instruction's behavior in a
//! fresh interpreter. The program counter lives in the simulator; a declared
//! `PC` register mirrors it during execution, and a behavioral write to that
//! register redirects the fetch instead of the default width advance.

use std::fmt;

use crate::error::IsaResult;
use crate::rtl::interp::{MachineState, RtlInterpreter};
use crate::spec::field::mask_bits;
use crate::spec::instruction::Instruction;
use crate::spec::matcher::InstructionMatcher;
use crate::spec::model::IsaSpecification;

/// Behaviors are bounded by default so a runaway loop surfaces as a fault
/// instead of hanging `step`.
const DEFAULT_RTL_STEP_BUDGET: u64 = 1 << 16;

/// An execution failure, tied to the address being executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub address: u64,
    pub message: String,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault at {:#010X}: {}", self.address, self.message)
    }
}

impl std::error::Error for Fault {}

/// Executes images against one specification.
pub struct Simulator<'a> {
    spec: &'a IsaSpecification,
    matcher: InstructionMatcher<'a>,
    state: MachineState,
    pc: u64,
    halted: bool,
    instruction_count: u64,
    rtl_budget: u64,
}

impl<'a> Simulator<'a> {
    pub fn new(spec: &'a IsaSpecification) -> Self {
        Self {
            spec,
            matcher: InstructionMatcher::new(spec),
            state: MachineState::from_spec(spec),
            pc: 0,
            halted: false,
            instruction_count: 0,
            rtl_budget: DEFAULT_RTL_STEP_BUDGET,
        }
    }

    /// Overrides the per-instruction behavior statement budget.
    pub fn with_rtl_budget(mut self, budget: u64) -> Self {
        self.rtl_budget = budget;
        self
    }

    pub fn pc(&self) -> u64 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u64) {
        self.pc = pc;
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut MachineState {
        &mut self.state
    }

    /// Loads a little-endian image as 32-bit cells starting at `base`, a
    /// short tail zero-padded, and points the program counter at it.
    pub fn load_image(&mut self, bytes: &[u8], base: u64) {
        for (index, chunk) in bytes.chunks(4).enumerate() {
            let mut word = 0u128;
            for (shift, byte) in chunk.iter().enumerate() {
                word |= u128::from(*byte) << (8 * shift);
            }
            self.state.memory.insert((base + index as u64 * 4) as u32, word);
        }
        self.pc = base;
        self.halted = false;
    }

    /// Executes the instruction at the program counter.
    ///
    /// `Ok(true)` means one instruction ran; `Ok(false)` means the machine
    /// is halted, which a word matching nothing also causes. A behavior
    /// error halts the machine and surfaces as a [`Fault`] at the current
    /// address, with registers and memory left as the failing behavior last
    /// wrote them.
    pub fn step(&mut self) -> Result<bool, Fault> {
        if self.halted {
            return Ok(false);
        }
        let Some((instruction, word, width_bytes)) = self.fetch() else {
            self.halted = true;
            return Ok(false);
        };

        let mirrored = self.mirror_pc();
        let outcome = if instruction.is_bundle() {
            self.execute_bundle(instruction, word)
        } else {
            self.execute_member(instruction, word)
        };
        if let Err(err) = outcome {
            self.halted = true;
            return Err(Fault {
                address: self.pc,
                message: err.to_string(),
            });
        }

        self.advance(mirrored, width_bytes);
        self.instruction_count += 1;
        Ok(true)
    }

    /// Steps until the machine halts, a fault is raised, or `max_steps`
    /// instructions have run. Returns how many ran.
    pub fn run(&mut self, max_steps: u64) -> Result<u64, Fault> {
        let mut steps = 0;
        while steps < max_steps && self.step()? {
            steps += 1;
        }
        Ok(steps)
    }

    /// Identifies the word at the program counter, shortest width first.
    fn fetch(&self) -> Option<(&'a Instruction, u128, u32)> {
        self.matcher.classes().iter().find_map(|class| {
            let word = self.load_bits(self.pc, class.width_bits);
            self.matcher
                .match_in_class(class, word)
                .map(|instruction| (instruction, word, class.width_bytes()))
        })
    }

    /// Reads `bits` starting at a byte address, crossing 32-bit cells.
    /// Unwritten cells read as zero.
    fn load_bits(&self, address: u64, bits: u32) -> u128 {
        let mut word = 0u128;
        for index in 0..(bits + 7) / 8 {
            let byte_addr = address + u64::from(index);
            let cell = self
                .state
                .memory
                .get(&((byte_addr & !3) as u32))
                .copied()
                .unwrap_or(0);
            let byte = (cell >> (8 * (byte_addr & 3))) & 0xFF;
            word |= byte << (8 * index);
        }
        word & mask_bits(bits)
    }

    fn execute_member(&mut self, instruction: &Instruction, word: u128) -> IsaResult<()> {
        let operands = self
            .spec
            .carrier_format(instruction)
            .map(|format| instruction.decode_operands(format, word))
            .unwrap_or_default();
        let mut interp = RtlInterpreter::new(self.spec, &mut self.state)
            .with_step_budget(self.rtl_budget);
        interp.set_operands(operands);
        interp.execute(instruction)
    }

    /// Runs every identified slot of a bundle in slot order. A slot whose
    /// word identifies nothing is skipped rather than faulting, so sparse
    /// bundles execute their populated slots.
    fn execute_bundle(&mut self, bundle: &Instruction, word: u128) -> IsaResult<()> {
        let Some(layout) = bundle
            .bundle_format
            .as_deref()
            .and_then(|name| self.spec.get_bundle_format(name))
        else {
            return Ok(());
        };
        for (index, slot) in layout.slots.iter().enumerate() {
            let slot_word = slot.extract(word);
            let Some(member) = self
                .matcher
                .match_slot_member(bundle, index, slot.width(), slot_word)
            else {
                continue;
            };
            self.execute_member(member, slot_word)?;
        }
        Ok(())
    }

    /// Writes the program counter into a declared scalar `PC` register,
    /// returning the mirrored value so [`Self::advance`] can tell a
    /// behavioral redirect apart from the untouched mirror.
    fn mirror_pc(&mut self) -> Option<u128> {
        let register = self
            .spec
            .get_register("PC")
            .filter(|register| !register.is_register_file())?;
        let value = u128::from(self.pc) & mask_bits(register.width);
        self.state.set_scalar("PC", value);
        Some(value)
    }

    fn advance(&mut self, mirrored: Option<u128>, width_bytes: u32) {
        if let Some(before) = mirrored {
            let after = self.state.scalar("PC").unwrap_or(before);
            if after != before {
                self.pc = after as u64;
                return;
            }
        }
        self.pc += u64::from(width_bytes);
    }
}
