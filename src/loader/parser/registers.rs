//! `registers` section productions: physical registers and register files,
//! virtual concatenations, and register aliases.

use smallvec::SmallVec;

use crate::error::IsaError;
use crate::spec::{
    IsaSpecification, Register, RegisterAlias, RegisterKind, VirtualComponent, VirtualRegister,
};

use super::formats::parse_bit_field;
use super::{Parser, TokenKind};

pub(super) fn parse_section(
    parser: &mut Parser,
    spec: &mut IsaSpecification,
) -> Result<(), IsaError> {
    parser.expect(TokenKind::LBrace, "'{' to open the registers section")?;
    while !parser.check(TokenKind::RBrace)? {
        if parser.check(TokenKind::EOF)? {
            return Err(IsaError::Parser("unterminated registers section".into()));
        }
        let keyword = parser.expect_identifier_token("register declaration keyword")?;
        match keyword.lexeme.as_str() {
            "gpr" => spec.registers.push(parse_register(parser, RegisterKind::Gpr)?),
            "sfr" => spec.registers.push(parse_register(parser, RegisterKind::Sfr)?),
            "vec" => spec
                .registers
                .push(parse_register(parser, RegisterKind::Vector)?),
            "virtual" => spec.virtual_registers.push(parse_virtual_register(parser)?),
            "alias" => spec.register_aliases.push(parse_register_alias(parser)?),
            other => {
                return Err(IsaError::Parser(format!(
                    "unknown register declaration '{other}'"
                )));
            }
        }
    }
    parser.expect(TokenKind::RBrace, "'}' to close the registers section")?;
    Ok(())
}

/// `KIND NAME WIDTH` with optional `[count]` file size, optional
/// `(element_width, lanes)` vector shape, and an optional `{ field* }`
/// block. Register fields never carry constants.
fn parse_register(parser: &mut Parser, kind: RegisterKind) -> Result<Register, IsaError> {
    let name = parser.expect_identifier("register name")?;
    let width = parser.expect_number("register width in bits")? as u32;
    let mut register = Register::scalar(kind, name, width);

    if parser.match_token(TokenKind::LBracket)? {
        register.count = Some(parser.expect_number("register file size")? as u32);
        parser.expect(TokenKind::RBracket, "']' after register file size")?;
    }
    if parser.match_token(TokenKind::LParen)? {
        register.element_width = Some(parser.expect_number("vector element width")? as u32);
        parser.expect(TokenKind::Comma, "',' between element width and lane count")?;
        register.lanes = Some(parser.expect_number("vector lane count")? as u32);
        parser.expect(TokenKind::RParen, "')' after vector shape")?;
    }
    if parser.match_token(TokenKind::LBrace)? {
        while !parser.check(TokenKind::RBrace)? {
            if parser.check(TokenKind::EOF)? {
                return Err(IsaError::Parser(format!(
                    "unterminated field block for register '{}'",
                    register.name
                )));
            }
            register.fields.push(parse_bit_field(parser, false)?);
        }
        parser.expect(TokenKind::RBrace, "'}' to close the field block")?;
    }
    Ok(register)
}

/// `virtual NAME WIDTH { component, component }` where each component is a
/// register name with an optional `[index]`. Component 0 holds the least
/// significant bits.
fn parse_virtual_register(parser: &mut Parser) -> Result<VirtualRegister, IsaError> {
    let name = parser.expect_identifier("virtual register name")?;
    let width = parser.expect_number("virtual register width in bits")? as u32;
    parser.expect(TokenKind::LBrace, "'{' to open the component list")?;
    let mut components: SmallVec<[VirtualComponent; 2]> = SmallVec::new();
    loop {
        let reg_name = parser.expect_identifier("component register name")?;
        if parser.match_token(TokenKind::LBracket)? {
            let index = parser.expect_number("component index")? as u32;
            parser.expect(TokenKind::RBracket, "']' after component index")?;
            components.push(VirtualComponent::indexed(reg_name, index));
        } else {
            components.push(VirtualComponent::scalar(reg_name));
        }
        if !parser.match_token(TokenKind::Comma)? {
            break;
        }
    }
    parser.expect(TokenKind::RBrace, "'}' to close the component list")?;
    Ok(VirtualRegister {
        name,
        width,
        components,
    })
}

/// `alias register NAME = TARGET` with an optional `[index]` on the target.
fn parse_register_alias(parser: &mut Parser) -> Result<RegisterAlias, IsaError> {
    if !parser.eat_keyword("register")? {
        return Err(IsaError::Parser(
            "expected 'register' after 'alias' in a registers section".into(),
        ));
    }
    let alias_name = parser.expect_identifier("alias name")?;
    parser.expect(TokenKind::Equals, "'=' between alias and target")?;
    let target_reg_name = parser.expect_identifier("alias target register")?;
    let mut alias = RegisterAlias {
        alias_name,
        target_reg_name,
        target_index: None,
    };
    if parser.match_token(TokenKind::LBracket)? {
        alias.target_index = Some(parser.expect_number("alias target index")? as u32);
        parser.expect(TokenKind::RBracket, "']' after alias target index")?;
    }
    Ok(alias)
}
