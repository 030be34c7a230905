//! `formats` section productions: instruction formats and bundle layouts.

use crate::error::IsaError;
use crate::spec::{BitField, BundleFormat, BundleSlot, InstructionFormat, IsaSpecification};

use super::{Parser, TokenKind};

pub(super) fn parse_section(
    parser: &mut Parser,
    spec: &mut IsaSpecification,
) -> Result<(), IsaError> {
    parser.expect(TokenKind::LBrace, "'{' to open the formats section")?;
    while !parser.check(TokenKind::RBrace)? {
        if parser.check(TokenKind::EOF)? {
            return Err(IsaError::Parser("unterminated formats section".into()));
        }
        if parser.eat_keyword("bundle")? {
            if !parser.eat_keyword("format")? {
                return Err(IsaError::Parser("expected 'format' after 'bundle'".into()));
            }
            spec.bundle_formats.push(parse_bundle_format(parser)?);
        } else if parser.eat_keyword("format")? {
            spec.formats.push(parse_format(parser)?);
        } else {
            return Err(IsaError::Parser(
                "expected 'format' or 'bundle format' declaration".into(),
            ));
        }
    }
    parser.expect(TokenKind::RBrace, "'}' to close the formats section")?;
    Ok(())
}

/// `format NAME WIDTH { field* }` where the body may also carry one
/// `identification_fields: name, name` entry.
fn parse_format(parser: &mut Parser) -> Result<InstructionFormat, IsaError> {
    let name = parser.expect_identifier("format name")?;
    let width = parser.expect_number("format width in bits")? as u32;
    let mut format = InstructionFormat::new(name, width);
    parser.expect(TokenKind::LBrace, "'{' to open the format body")?;
    while !parser.check(TokenKind::RBrace)? {
        if parser.check(TokenKind::EOF)? {
            return Err(IsaError::Parser(format!(
                "unterminated body for format '{}'",
                format.name
            )));
        }
        if parser.eat_keyword("identification_fields")? {
            parser.expect(TokenKind::Colon, "':' after identification_fields")?;
            format.identification_fields = parse_name_list(parser, "identification field name")?;
        } else {
            format.fields.push(parse_bit_field(parser, true)?);
        }
    }
    parser.expect(TokenKind::RBrace, "'}' to close the format body")?;
    Ok(format)
}

/// `bundle format NAME WIDTH { slot* }` where the body may also carry
/// `instruction_start: N` and `identification_fields: ...` entries.
fn parse_bundle_format(parser: &mut Parser) -> Result<BundleFormat, IsaError> {
    let name = parser.expect_identifier("bundle format name")?;
    let width = parser.expect_number("bundle format width in bits")? as u32;
    let mut bundle = BundleFormat::new(name, width);
    parser.expect(TokenKind::LBrace, "'{' to open the bundle format body")?;
    while !parser.check(TokenKind::RBrace)? {
        if parser.check(TokenKind::EOF)? {
            return Err(IsaError::Parser(format!(
                "unterminated body for bundle format '{}'",
                bundle.name
            )));
        }
        if parser.eat_keyword("identification_fields")? {
            parser.expect(TokenKind::Colon, "':' after identification_fields")?;
            bundle.identification_fields = parse_name_list(parser, "identification field name")?;
        } else if parser.eat_keyword("instruction_start")? {
            parser.expect(TokenKind::Colon, "':' after instruction_start")?;
            bundle.instruction_start_bit =
                Some(parser.expect_number("instruction start bit")? as u32);
        } else {
            let slot_name = parser.expect_identifier("slot name")?;
            parser.expect(TokenKind::Colon, "':' after slot name")?;
            parser.expect(TokenKind::LBracket, "'[' to open the slot range")?;
            let lsb = parser.expect_number("slot low bit")? as u32;
            parser.expect(TokenKind::Colon, "':' between slot bits")?;
            let msb = parser.expect_number("slot high bit")? as u32;
            parser.expect(TokenKind::RBracket, "']' to close the slot range")?;
            bundle.slots.push(BundleSlot::new(slot_name, msb, lsb));
        }
    }
    parser.expect(TokenKind::RBrace, "'}' to close the bundle format body")?;
    Ok(bundle)
}

/// `NAME: [lsb:msb]` with an optional `= constant` suffix where permitted.
/// Ranges are written low bit first and stored as declared; the validator
/// rejects inverted ones.
pub(super) fn parse_bit_field(
    parser: &mut Parser,
    allow_constant: bool,
) -> Result<BitField, IsaError> {
    let name = parser.expect_identifier("field name")?;
    parser.expect(TokenKind::Colon, "':' after field name")?;
    parser.expect(TokenKind::LBracket, "'[' to open the bit range")?;
    let lsb = parser.expect_number("field low bit")? as u32;
    parser.expect(TokenKind::Colon, "':' between low and high bit")?;
    let msb = parser.expect_number("field high bit")? as u32;
    parser.expect(TokenKind::RBracket, "']' to close the bit range")?;
    if parser.match_token(TokenKind::Equals)? {
        if !allow_constant {
            return Err(IsaError::Parser(format!(
                "field '{name}' cannot carry a constant value here"
            )));
        }
        let constant = parser.expect_number("field constant value")?;
        return Ok(BitField::with_constant(name, msb, lsb, constant));
    }
    Ok(BitField::new(name, msb, lsb))
}

fn parse_name_list(parser: &mut Parser, context: &str) -> Result<Vec<String>, IsaError> {
    let mut names = vec![parser.expect_identifier(context)?];
    while parser.match_token(TokenKind::Comma)? {
        names.push(parser.expect_identifier(context)?);
    }
    Ok(names)
}
