//! Two-pass assembler over a composed model.
//!
//! Pass one scans the source for labels and assigns every statement a byte
//! address from its encoded width; pass two parses operand tokens and builds
//! the words through the model's codec, so assembler output and
//! [`Instruction::encode`] can never disagree. `BUNDLE { a, b }` groups pack
//! member instructions into the slots of a declared bundle instruction.

use std::collections::BTreeMap;

use crate::error::{IsaError, IsaResult};
use crate::spec::instruction::Instruction;
use crate::spec::model::IsaSpecification;

/// One encoded statement: its byte address, word value, and encoded width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedWord {
    pub address: u64,
    pub value: u128,
    pub width_bytes: u32,
}

/// Serializes encoded words to a little-endian image, zero-padding each word
/// to its own byte width. Mixed-width streams therefore stay contiguous.
pub fn emit_image(words: &[EncodedWord]) -> Vec<u8> {
    let mut image = Vec::new();
    for word in words {
        for i in 0..word.width_bytes {
            image.push(((word.value >> (8 * i)) & 0xFF) as u8);
        }
    }
    image
}

/// A line reduced to its statement, pass one's output and pass two's input.
#[derive(Debug)]
enum StatementBody {
    Plain {
        mnemonic: String,
        operands: Vec<String>,
    },
    /// Bundle members as `(mnemonic, operand tokens)` in slot order.
    Bundle {
        members: Vec<(String, Vec<String>)>,
    },
}

#[derive(Debug)]
struct Statement {
    line_no: usize,
    address: u64,
    width_bytes: u32,
    body: StatementBody,
}

/// Assembles textual programs against one specification.
///
/// Mnemonics match case-insensitively and instruction aliases are accepted,
/// with the alias target supplying the encoding. Labels are collected per
/// call; symbols persist across calls so a caller can predefine constants.
pub struct Assembler<'a> {
    spec: &'a IsaSpecification,
    labels: BTreeMap<String, u64>,
    symbols: BTreeMap<String, u64>,
}

impl<'a> Assembler<'a> {
    pub fn new(spec: &'a IsaSpecification) -> Self {
        Self {
            spec,
            labels: BTreeMap::new(),
            symbols: BTreeMap::new(),
        }
    }

    /// Predefines a named constant usable wherever an operand is expected.
    pub fn define_symbol(&mut self, name: impl Into<String>, value: u64) {
        self.symbols.insert(name.into(), value);
    }

    /// Labels collected by the most recent assembly, name to byte address.
    pub fn labels(&self) -> &BTreeMap<String, u64> {
        &self.labels
    }

    /// Assembles `source` with the first statement at address zero.
    pub fn assemble(&mut self, source: &str) -> IsaResult<Vec<EncodedWord>> {
        self.assemble_at(source, 0)
    }

    /// Assembles `source` with the first statement at `origin`.
    pub fn assemble_at(&mut self, source: &str, origin: u64) -> IsaResult<Vec<EncodedWord>> {
        let statements = self.scan(source, origin)?;
        let mut words = Vec::with_capacity(statements.len());
        for stmt in &statements {
            let value = match &stmt.body {
                StatementBody::Plain { mnemonic, operands } => {
                    self.encode_plain(stmt, mnemonic, operands)?
                }
                StatementBody::Bundle { members } => self.encode_bundle(stmt, members)?,
            };
            words.push(EncodedWord {
                address: stmt.address,
                value,
                width_bytes: stmt.width_bytes,
            });
        }
        Ok(words)
    }

    /// Pass one: strip comments, record labels, and size every statement.
    fn scan(&mut self, source: &str, origin: u64) -> IsaResult<Vec<Statement>> {
        self.labels.clear();
        let mut statements = Vec::new();
        let mut address = origin;
        for (index, raw) in source.lines().enumerate() {
            let line_no = index + 1;
            let mut line = match raw.find("//") {
                Some(at) => &raw[..at],
                None => raw,
            }
            .trim();

            if let Some((label, rest)) = split_label(line) {
                if self.labels.insert(label.to_string(), address).is_some() {
                    return Err(IsaError::assembly(format!(
                        "line {line_no}: duplicate label '{label}'"
                    )));
                }
                line = rest.trim();
            }
            if line.is_empty() {
                continue;
            }

            let body = self.parse_statement(line, line_no)?;
            let width_bytes = self.statement_width(&body, line_no)?;
            statements.push(Statement {
                line_no,
                address,
                width_bytes,
                body,
            });
            address += u64::from(width_bytes);
        }
        Ok(statements)
    }

    fn parse_statement(&self, line: &str, line_no: usize) -> IsaResult<StatementBody> {
        if let Some(inner) = bundle_group(line) {
            let inner = inner.map_err(|msg| {
                IsaError::assembly(format!("line {line_no}: {msg}"))
            })?;
            let members = self.parse_bundle_members(inner, line_no)?;
            return Ok(StatementBody::Bundle { members });
        }

        let (head, rest) = split_mnemonic(line);
        let instr = self.find_instruction(head).ok_or_else(|| {
            IsaError::assembly(format!("line {line_no}: unknown instruction '{head}'"))
        })?;
        let operands = rest
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();
        Ok(StatementBody::Plain {
            mnemonic: instr.mnemonic.clone(),
            operands,
        })
    }

    /// Splits a bundle body on commas, opening a new member whenever a part
    /// begins with a known mnemonic and treating every other part as one
    /// more operand of the member before it.
    fn parse_bundle_members(
        &self,
        inner: &str,
        line_no: usize,
    ) -> IsaResult<Vec<(String, Vec<String>)>> {
        let mut members: Vec<(String, Vec<String>)> = Vec::new();
        for part in inner.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (head, rest) = split_mnemonic(part);
            if let Some(instr) = self.find_instruction(head) {
                let mut operands = Vec::new();
                if !rest.is_empty() {
                    operands.push(rest.to_string());
                }
                members.push((instr.mnemonic.clone(), operands));
            } else if let Some((_, operands)) = members.last_mut() {
                operands.push(part.to_string());
            } else {
                return Err(IsaError::assembly(format!(
                    "line {line_no}: bundle member must begin with an instruction mnemonic, found '{part}'"
                )));
            }
        }
        if members.is_empty() {
            return Err(IsaError::assembly(format!(
                "line {line_no}: empty bundle group"
            )));
        }
        Ok(members)
    }

    fn statement_width(&self, body: &StatementBody, line_no: usize) -> IsaResult<u32> {
        match body {
            StatementBody::Plain { mnemonic, .. } => {
                let instr = self.expect_instruction(mnemonic, line_no)?;
                let bits = self.spec.width_bits(instr).ok_or_else(|| {
                    IsaError::assembly(format!(
                        "line {line_no}: instruction '{mnemonic}' names no format"
                    ))
                })?;
                Ok((bits + 7) / 8)
            }
            StatementBody::Bundle { members } => {
                let instr = self.select_bundle(members.len(), line_no)?;
                let bits = self.spec.width_bits(instr).ok_or_else(|| {
                    IsaError::assembly(format!(
                        "line {line_no}: bundle '{}' names no bundle format",
                        instr.mnemonic
                    ))
                })?;
                Ok((bits + 7) / 8)
            }
        }
    }

    fn encode_plain(
        &self,
        stmt: &Statement,
        mnemonic: &str,
        operands: &[String],
    ) -> IsaResult<u128> {
        let instr = self.expect_instruction(mnemonic, stmt.line_no)?;
        self.encode_instruction(instr, operands, stmt.address, stmt.line_no)
    }

    fn encode_instruction(
        &self,
        instr: &Instruction,
        operands: &[String],
        address: u64,
        line_no: usize,
    ) -> IsaResult<u128> {
        let Some(format) = self.spec.carrier_format(instr) else {
            return Err(IsaError::assembly(format!(
                "line {line_no}: instruction '{}' references missing format",
                instr.mnemonic
            )));
        };
        if operands.len() != instr.operand_specs.len() {
            return Err(IsaError::assembly(format!(
                "line {line_no}: instruction '{}' expects {} operand(s) but got {}",
                instr.mnemonic,
                instr.operand_specs.len(),
                operands.len()
            )));
        }
        let mut values = BTreeMap::new();
        for (spec, token) in instr.operand_specs.iter().zip(operands) {
            let value = self.operand_value(token, address, line_no)?;
            values.insert(spec.name.clone(), value);
        }
        Ok(instr.encode(format, &values))
    }

    /// Packs member words into the slots of the bundle instruction whose
    /// layout takes this many members, laying the header down first.
    fn encode_bundle(
        &self,
        stmt: &Statement,
        members: &[(String, Vec<String>)],
    ) -> IsaResult<u128> {
        let bundle = self.select_bundle(members.len(), stmt.line_no)?;
        let layout_name = bundle.bundle_format.as_deref().unwrap_or_default();
        let Some(layout) = self.spec.get_bundle_format(layout_name) else {
            return Err(IsaError::assembly(format!(
                "line {}: bundle '{}' references missing bundle format '{layout_name}'",
                stmt.line_no, bundle.mnemonic
            )));
        };

        let mut word = match self.spec.carrier_format(bundle) {
            Some(header) => bundle.encode(header, &BTreeMap::new()),
            None => 0,
        };
        for (slot, (mnemonic, operands)) in layout.slots.iter().zip(members) {
            let member = self.expect_instruction(mnemonic, stmt.line_no)?;
            let encoded =
                self.encode_instruction(member, operands, stmt.address, stmt.line_no)?;
            word = slot.insert(word, encoded);
        }
        Ok(word)
    }

    /// Resolves one operand token: a numeric literal, a label (encoded
    /// PC-relative in words), a predefined symbol, a register alias naming an
    /// element, or a register-file reference like `R5`.
    fn operand_value(&self, token: &str, address: u64, line_no: usize) -> IsaResult<u128> {
        if let Some(value) = parse_numeric(token) {
            // negative literals sign-extend; field insertion truncates
            return Ok(value as u128);
        }
        if let Some(&label_addr) = self.labels.get(token) {
            let offset = (label_addr as i64 - address as i64 - 4).div_euclid(4);
            return Ok(offset as u128);
        }
        if let Some(&value) = self.symbols.get(token) {
            return Ok(u128::from(value));
        }
        if let Some(alias) = self.spec.resolve_register_alias(token) {
            if let Some(index) = alias.target_index {
                return Ok(u128::from(index));
            }
        }
        if let Some(index) = self.register_index(token, line_no)? {
            return Ok(index);
        }
        Err(IsaError::assembly(format!(
            "line {line_no}: unresolvable operand '{token}'"
        )))
    }

    /// Interprets `R5`-style tokens against the declared register files.
    fn register_index(&self, token: &str, line_no: usize) -> IsaResult<Option<u128>> {
        for reg in &self.spec.registers {
            let Some(count) = reg.count else {
                continue;
            };
            let name_len = reg.name.len();
            if token.len() <= name_len {
                continue;
            }
            let (prefix, digits) = token.split_at(name_len);
            if !prefix.eq_ignore_ascii_case(&reg.name) {
                continue;
            }
            let Ok(index) = digits.parse::<u32>() else {
                continue;
            };
            if index >= count {
                return Err(IsaError::assembly(format!(
                    "line {line_no}: register index {index} out of range for '{}'",
                    reg.name
                )));
            }
            return Ok(Some(u128::from(index)));
        }
        Ok(None)
    }

    fn expect_instruction(&self, mnemonic: &str, line_no: usize) -> IsaResult<&'a Instruction> {
        self.find_instruction(mnemonic).ok_or_else(|| {
            IsaError::assembly(format!("line {line_no}: unknown instruction '{mnemonic}'"))
        })
    }

    /// Mnemonic lookup: exact first (aliases included), then a
    /// case-insensitive scan over instructions and aliases.
    fn find_instruction(&self, mnemonic: &str) -> Option<&'a Instruction> {
        if let Some(found) = self.spec.get_instruction(mnemonic) {
            return Some(found);
        }
        if let Some(found) = self
            .spec
            .instructions
            .iter()
            .find(|i| i.mnemonic.eq_ignore_ascii_case(mnemonic))
        {
            return Some(found);
        }
        let alias = self
            .spec
            .instruction_aliases
            .iter()
            .find(|a| a.alias_mnemonic.eq_ignore_ascii_case(mnemonic))?;
        self.spec.get_instruction(&alias.target_mnemonic)
    }

    /// First declared bundle instruction whose layout has `members` slots.
    fn select_bundle(&self, members: usize, line_no: usize) -> IsaResult<&'a Instruction> {
        self.spec
            .instructions
            .iter()
            .find(|instr| {
                instr.is_bundle()
                    && instr
                        .bundle_format
                        .as_deref()
                        .and_then(|name| self.spec.get_bundle_format(name))
                        .is_some_and(|layout| layout.slots.len() == members)
            })
            .ok_or_else(|| {
                IsaError::assembly(format!(
                    "line {line_no}: no bundle instruction takes {members} member(s)"
                ))
            })
    }
}

/// Splits off a leading `name:` label. Returns `None` when the line carries
/// no label, so `loop: ADD R1, R2, R3` yields the label and the statement.
fn split_label(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    let candidate = line[..colon].trim();
    if candidate.is_empty() {
        return None;
    }
    let mut chars = candidate.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return None;
    }
    Some((candidate, &line[colon + 1..]))
}

/// First whitespace-delimited token and the remainder of the line.
fn split_mnemonic(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    }
}

/// Extracts the body of a `BUNDLE { ... }` group, or `None` when the line is
/// not a bundle statement. The error case is a bundle keyword without a
/// well-formed brace pair.
fn bundle_group(line: &str) -> Option<Result<&str, &'static str>> {
    let head_len = line
        .find(|ch: char| ch.is_whitespace() || ch == '{')
        .unwrap_or(line.len());
    if !line[..head_len].eq_ignore_ascii_case("BUNDLE") {
        return None;
    }
    let rest = line[head_len..].trim_start();
    let Some(body) = rest.strip_prefix('{') else {
        return Some(Err("bundle group must open with '{'"));
    };
    let Some(inner) = body.trim_end().strip_suffix('}') else {
        return Some(Err("unterminated bundle group"));
    };
    Some(Ok(inner))
}

/// Signed integer literal with `0x`/`0b`/`0o` prefixes and `_` separators.
fn parse_numeric(token: &str) -> Option<i64> {
    let trimmed = token.trim();
    let (sign, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let cleaned = body.replace('_', "");
    let (radix, digits) = if let Some(hex) = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        (16, hex)
    } else if let Some(bin) = cleaned
        .strip_prefix("0b")
        .or_else(|| cleaned.strip_prefix("0B"))
    {
        (2, bin)
    } else if let Some(oct) = cleaned
        .strip_prefix("0o")
        .or_else(|| cleaned.strip_prefix("0O"))
    {
        (8, oct)
    } else {
        (10, cleaned.as_str())
    };
    if digits.is_empty() {
        return None;
    }
    i64::from_str_radix(digits, radix).ok().map(|v| v * sign)
}
