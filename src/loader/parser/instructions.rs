//! `instructions` section productions: instruction definitions, encoding
//! blocks, operand lists, and instruction aliases.

use crate::error::IsaError;
use crate::spec::{
    EncodingAssignment, Instruction, InstructionAlias, IsaSpecification, OperandSpec,
};

use super::behavior;
use super::{Parser, TokenKind};

pub(super) fn parse_section(
    parser: &mut Parser,
    spec: &mut IsaSpecification,
) -> Result<(), IsaError> {
    parser.expect(TokenKind::LBrace, "'{' to open the instructions section")?;
    while !parser.check(TokenKind::RBrace)? {
        if parser.check(TokenKind::EOF)? {
            return Err(IsaError::Parser("unterminated instructions section".into()));
        }
        if parser.eat_keyword("instruction")? {
            spec.instructions.push(parse_instruction(parser)?);
        } else if parser.eat_keyword("alias")? {
            if !parser.eat_keyword("instruction")? {
                return Err(IsaError::Parser(
                    "expected 'instruction' after 'alias' in an instructions section".into(),
                ));
            }
            spec.instruction_aliases.push(parse_instruction_alias(parser)?);
        } else {
            return Err(IsaError::Parser(
                "expected 'instruction' or 'alias instruction' declaration".into(),
            ));
        }
    }
    parser.expect(TokenKind::RBrace, "'}' to close the instructions section")?;
    Ok(())
}

fn parse_instruction(parser: &mut Parser) -> Result<Instruction, IsaError> {
    let mnemonic = parser.expect_identifier("instruction mnemonic")?;
    let mut instr = Instruction::new(mnemonic);
    parser.expect(TokenKind::LBrace, "'{' to open the instruction body")?;
    while !parser.check(TokenKind::RBrace)? {
        if parser.check(TokenKind::EOF)? {
            return Err(IsaError::Parser(format!(
                "unterminated body for instruction '{}'",
                instr.mnemonic
            )));
        }
        let keyword = parser.expect_identifier_token("instruction attribute")?;
        match keyword.lexeme.as_str() {
            "format" => {
                parser.expect(TokenKind::Colon, "':' after format")?;
                instr.format = Some(parser.expect_identifier("format name")?);
            }
            "bundle_format" => {
                parser.expect(TokenKind::Colon, "':' after bundle_format")?;
                instr.bundle_format = Some(parser.expect_identifier("bundle format name")?);
            }
            "encoding" => {
                parser.expect(TokenKind::Colon, "':' after encoding")?;
                parse_encoding_block(parser, &mut instr)?;
            }
            "operands" => {
                parser.expect(TokenKind::Colon, "':' after operands")?;
                parse_operand_list(parser, &mut instr)?;
            }
            "assembly_syntax" => {
                parser.expect(TokenKind::Colon, "':' after assembly_syntax")?;
                let template = parser.expect(TokenKind::String, "assembly syntax string")?;
                instr.assembly_syntax = Some(template.lexeme);
            }
            "behavior" => {
                // the colon is optional here
                parser.match_token(TokenKind::Colon)?;
                instr.behavior = Some(behavior::parse_block(parser, &instr.mnemonic)?);
            }
            "external_behavior" => {
                parser.expect(TokenKind::Colon, "':' after external_behavior")?;
                instr.external_behavior = parse_bool(parser)?;
            }
            "bundle_instructions" => {
                parser.expect(TokenKind::Colon, "':' after bundle_instructions")?;
                instr.bundle_instructions = parse_mnemonic_list(parser)?;
            }
            other => {
                return Err(IsaError::Parser(format!(
                    "unknown instruction attribute '{other}' in '{}'",
                    instr.mnemonic
                )));
            }
        }
    }
    parser.expect(TokenKind::RBrace, "'}' to close the instruction body")?;
    Ok(instr)
}

/// `{ field=value, field=value }`; an empty block and a trailing comma are
/// both accepted.
fn parse_encoding_block(parser: &mut Parser, instr: &mut Instruction) -> Result<(), IsaError> {
    parser.expect(TokenKind::LBrace, "'{' to open the encoding block")?;
    while !parser.check(TokenKind::RBrace)? {
        let field = parser.expect_identifier("encoding field name")?;
        parser.expect(TokenKind::Equals, "'=' after encoding field name")?;
        let value = parser.expect_number("encoding value")?;
        instr.encoding.push(EncodingAssignment::new(field, value));
        if !parser.match_token(TokenKind::Comma)? {
            break;
        }
    }
    parser.expect(TokenKind::RBrace, "'}' to close the encoding block")?;
    Ok(())
}

/// `name, name(field, field), name` where the parenthesized form declares a
/// distributed operand split across the listed fields, low chunk first.
fn parse_operand_list(parser: &mut Parser, instr: &mut Instruction) -> Result<(), IsaError> {
    loop {
        let name = parser.expect_identifier("operand name")?;
        if parser.match_token(TokenKind::LParen)? {
            let mut fields = vec![parser.expect_identifier("operand field name")?];
            while parser.match_token(TokenKind::Comma)? {
                fields.push(parser.expect_identifier("operand field name")?);
            }
            parser.expect(TokenKind::RParen, "')' after operand field list")?;
            instr
                .operand_specs
                .push(OperandSpec::distributed(name, fields));
        } else {
            instr.operand_specs.push(OperandSpec::simple(name));
        }
        if !parser.match_token(TokenKind::Comma)? {
            break;
        }
    }
    Ok(())
}

fn parse_mnemonic_list(parser: &mut Parser) -> Result<Vec<String>, IsaError> {
    let mut names = vec![parser.expect_identifier("bundle member mnemonic")?];
    while parser.match_token(TokenKind::Comma)? {
        names.push(parser.expect_identifier("bundle member mnemonic")?);
    }
    Ok(names)
}

fn parse_bool(parser: &mut Parser) -> Result<bool, IsaError> {
    let token = parser.expect_identifier_token("'true' or 'false'")?;
    match token.lexeme.as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(IsaError::Parser(format!(
            "expected 'true' or 'false', found '{other}'"
        ))),
    }
}

/// `alias instruction NAME = TARGET` with an optional
/// `{ assembly_syntax: "..." }` override body.
fn parse_instruction_alias(parser: &mut Parser) -> Result<InstructionAlias, IsaError> {
    let alias_mnemonic = parser.expect_identifier("alias mnemonic")?;
    parser.expect(TokenKind::Equals, "'=' between alias and target")?;
    let target = parser.expect_identifier("alias target mnemonic")?;
    let mut alias = InstructionAlias::new(alias_mnemonic, target);
    if parser.match_token(TokenKind::LBrace)? {
        while !parser.check(TokenKind::RBrace)? {
            if parser.check(TokenKind::EOF)? {
                return Err(IsaError::Parser(format!(
                    "unterminated body for alias '{}'",
                    alias.alias_mnemonic
                )));
            }
            if parser.eat_keyword("assembly_syntax")? {
                parser.expect(TokenKind::Colon, "':' after assembly_syntax")?;
                let template = parser.expect(TokenKind::String, "assembly syntax string")?;
                alias.assembly_syntax = Some(template.lexeme);
            } else {
                return Err(IsaError::Parser(format!(
                    "only assembly_syntax may be overridden in alias '{}'",
                    alias.alias_mnemonic
                )));
            }
        }
        parser.expect(TokenKind::RBrace, "'}' to close the alias body")?;
    }
    Ok(alias)
}
