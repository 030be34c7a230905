//! `behavior` block productions: RTL statements and the expression grammar.
//!
//! Precedence, loosest first: ternary, `||`, `&&`, `|`, `^`, `&`, equality,
//! relational, shifts, additive, multiplicative, unary, postfix. Memory
//! access is statement-level only: a load must be the entire right-hand
//! side of its assignment.

use crate::error::IsaError;
use crate::rtl::ast::{
    BinaryOp, LValue, RtlAssignment, RtlBlock, RtlExpr, RtlStatement, UnaryOp,
};

use super::{Parser, TokenKind, parse_int};

/// Parses `{ statement+ }`. An empty block is a syntax error; instructions
/// without behavior omit the block or declare `external_behavior: true`.
pub(super) fn parse_block(parser: &mut Parser, mnemonic: &str) -> Result<RtlBlock, IsaError> {
    parser.expect(TokenKind::LBrace, "'{' to open the behavior block")?;
    let statements = parse_statements(parser)?;
    if statements.is_empty() {
        return Err(IsaError::Parser(format!(
            "behavior block of '{mnemonic}' must contain at least one statement"
        )));
    }
    parser.expect(TokenKind::RBrace, "'}' to close the behavior block")?;
    Ok(RtlBlock::new(statements))
}

fn parse_statements(parser: &mut Parser) -> Result<Vec<RtlStatement>, IsaError> {
    let mut statements = Vec::new();
    while !parser.check(TokenKind::RBrace)? {
        if parser.check(TokenKind::EOF)? {
            return Err(IsaError::Parser("unterminated behavior block".into()));
        }
        statements.push(parse_statement(parser)?);
    }
    Ok(statements)
}

fn parse_statement(parser: &mut Parser) -> Result<RtlStatement, IsaError> {
    if parser.at_keyword("if")? {
        return parse_conditional(parser);
    }
    if parser.at_keyword("for")? {
        return parse_for_loop(parser);
    }
    if parser.eat_keyword("MEM")? {
        parser.expect(TokenKind::LBracket, "'[' after MEM")?;
        let address = parse_expr(parser)?;
        parser.expect(TokenKind::RBracket, "']' after memory address")?;
        parser.expect(TokenKind::Equals, "'=' in memory store")?;
        let value = parse_expr(parser)?;
        parser.expect(TokenKind::Semicolon, "';' after memory store")?;
        return Ok(RtlStatement::MemoryStore { address, value });
    }

    let target = parse_lvalue(parser)?;
    parser.expect(TokenKind::Equals, "'=' in assignment")?;
    if parser.eat_keyword("MEM")? {
        parser.expect(TokenKind::LBracket, "'[' after MEM")?;
        let address = parse_expr(parser)?;
        parser.expect(TokenKind::RBracket, "']' after memory address")?;
        parser.expect(TokenKind::Semicolon, "';' after memory load")?;
        return Ok(RtlStatement::MemoryLoad { target, address });
    }
    let expr = parse_expr(parser)?;
    parser.expect(TokenKind::Semicolon, "';' after assignment")?;
    Ok(RtlStatement::Assignment(RtlAssignment { target, expr }))
}

/// `if (cond) { ... }` with an optional `else { ... }` or `else if` chain.
fn parse_conditional(parser: &mut Parser) -> Result<RtlStatement, IsaError> {
    parser.consume()?;
    parser.expect(TokenKind::LParen, "'(' after if")?;
    let condition = parse_expr(parser)?;
    parser.expect(TokenKind::RParen, "')' after the if condition")?;
    parser.expect(TokenKind::LBrace, "'{' to open the if body")?;
    let then_body = parse_statements(parser)?;
    parser.expect(TokenKind::RBrace, "'}' to close the if body")?;

    let mut else_body = Vec::new();
    if parser.eat_keyword("else")? {
        if parser.at_keyword("if")? {
            else_body.push(parse_conditional(parser)?);
        } else {
            parser.expect(TokenKind::LBrace, "'{' to open the else body")?;
            else_body = parse_statements(parser)?;
            parser.expect(TokenKind::RBrace, "'}' to close the else body")?;
        }
    }
    Ok(RtlStatement::Conditional {
        condition,
        then_body,
        else_body,
    })
}

/// `for (init; condition; update) { ... }` where init and update are plain
/// assignments.
fn parse_for_loop(parser: &mut Parser) -> Result<RtlStatement, IsaError> {
    parser.consume()?;
    parser.expect(TokenKind::LParen, "'(' after for")?;
    let init = parse_plain_assignment(parser)?;
    parser.expect(TokenKind::Semicolon, "';' after the loop initializer")?;
    let condition = parse_expr(parser)?;
    parser.expect(TokenKind::Semicolon, "';' after the loop condition")?;
    let update = parse_plain_assignment(parser)?;
    parser.expect(TokenKind::RParen, "')' after the loop update")?;
    parser.expect(TokenKind::LBrace, "'{' to open the loop body")?;
    let body = parse_statements(parser)?;
    parser.expect(TokenKind::RBrace, "'}' to close the loop body")?;
    Ok(RtlStatement::ForLoop {
        init,
        condition,
        update,
        body,
    })
}

fn parse_plain_assignment(parser: &mut Parser) -> Result<RtlAssignment, IsaError> {
    let target = parse_lvalue(parser)?;
    parser.expect(TokenKind::Equals, "'=' in assignment")?;
    let expr = parse_expr(parser)?;
    Ok(RtlAssignment { target, expr })
}

fn parse_lvalue(parser: &mut Parser) -> Result<LValue, IsaError> {
    let name = parser.expect_identifier("assignment target")?;
    if parser.match_token(TokenKind::LBracket)? {
        let index = parse_expr(parser)?;
        parser.expect(TokenKind::RBracket, "']' after the register index")?;
        return Ok(LValue::Register {
            reg: name,
            index: Some(Box::new(index)),
        });
    }
    if parser.match_token(TokenKind::Dot)? {
        let field = parser.expect_identifier("field name")?;
        return Ok(LValue::Field { reg: name, field });
    }
    Ok(LValue::Variable(name))
}

fn parse_expr(parser: &mut Parser) -> Result<RtlExpr, IsaError> {
    parse_ternary(parser)
}

fn parse_ternary(parser: &mut Parser) -> Result<RtlExpr, IsaError> {
    let condition = parse_logical_or(parser)?;
    if parser.match_token(TokenKind::Question)? {
        let then_expr = parse_expr(parser)?;
        parser.expect(TokenKind::Colon, "':' in ternary expression")?;
        let else_expr = parse_expr(parser)?;
        return Ok(RtlExpr::Ternary {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        });
    }
    Ok(condition)
}

fn parse_logical_or(parser: &mut Parser) -> Result<RtlExpr, IsaError> {
    let mut expr = parse_logical_and(parser)?;
    while parser.match_token(TokenKind::PipePipe)? {
        let rhs = parse_logical_and(parser)?;
        expr = RtlExpr::binary(BinaryOp::LogicalOr, expr, rhs);
    }
    Ok(expr)
}

fn parse_logical_and(parser: &mut Parser) -> Result<RtlExpr, IsaError> {
    let mut expr = parse_bit_or(parser)?;
    while parser.match_token(TokenKind::AmpAmp)? {
        let rhs = parse_bit_or(parser)?;
        expr = RtlExpr::binary(BinaryOp::LogicalAnd, expr, rhs);
    }
    Ok(expr)
}

fn parse_bit_or(parser: &mut Parser) -> Result<RtlExpr, IsaError> {
    let mut expr = parse_bit_xor(parser)?;
    while parser.match_token(TokenKind::Pipe)? {
        let rhs = parse_bit_xor(parser)?;
        expr = RtlExpr::binary(BinaryOp::BitOr, expr, rhs);
    }
    Ok(expr)
}

fn parse_bit_xor(parser: &mut Parser) -> Result<RtlExpr, IsaError> {
    let mut expr = parse_bit_and(parser)?;
    while parser.match_token(TokenKind::Caret)? {
        let rhs = parse_bit_and(parser)?;
        expr = RtlExpr::binary(BinaryOp::BitXor, expr, rhs);
    }
    Ok(expr)
}

fn parse_bit_and(parser: &mut Parser) -> Result<RtlExpr, IsaError> {
    let mut expr = parse_equality(parser)?;
    while parser.match_token(TokenKind::Amp)? {
        let rhs = parse_equality(parser)?;
        expr = RtlExpr::binary(BinaryOp::BitAnd, expr, rhs);
    }
    Ok(expr)
}

fn parse_equality(parser: &mut Parser) -> Result<RtlExpr, IsaError> {
    let mut expr = parse_relational(parser)?;
    loop {
        if parser.match_token(TokenKind::EqualEqual)? {
            let rhs = parse_relational(parser)?;
            expr = RtlExpr::binary(BinaryOp::Eq, expr, rhs);
            continue;
        }
        if parser.match_token(TokenKind::BangEqual)? {
            let rhs = parse_relational(parser)?;
            expr = RtlExpr::binary(BinaryOp::Ne, expr, rhs);
            continue;
        }
        break;
    }
    Ok(expr)
}

fn parse_relational(parser: &mut Parser) -> Result<RtlExpr, IsaError> {
    let mut expr = parse_shift(parser)?;
    loop {
        let op = match parser.peek()?.kind {
            TokenKind::Less => BinaryOp::Lt,
            TokenKind::LessEqual => BinaryOp::Le,
            TokenKind::Greater => BinaryOp::Gt,
            TokenKind::GreaterEqual => BinaryOp::Ge,
            _ => break,
        };
        parser.consume()?;
        let rhs = parse_shift(parser)?;
        expr = RtlExpr::binary(op, expr, rhs);
    }
    Ok(expr)
}

fn parse_shift(parser: &mut Parser) -> Result<RtlExpr, IsaError> {
    let mut expr = parse_additive(parser)?;
    loop {
        let op = match parser.peek()?.kind {
            TokenKind::ShiftLeft => BinaryOp::Shl,
            TokenKind::ShiftRight => BinaryOp::Shr,
            _ => break,
        };
        parser.consume()?;
        let rhs = parse_additive(parser)?;
        expr = RtlExpr::binary(op, expr, rhs);
    }
    Ok(expr)
}

fn parse_additive(parser: &mut Parser) -> Result<RtlExpr, IsaError> {
    let mut expr = parse_multiplicative(parser)?;
    loop {
        let op = match parser.peek()?.kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            _ => break,
        };
        parser.consume()?;
        let rhs = parse_multiplicative(parser)?;
        expr = RtlExpr::binary(op, expr, rhs);
    }
    Ok(expr)
}

fn parse_multiplicative(parser: &mut Parser) -> Result<RtlExpr, IsaError> {
    let mut expr = parse_unary(parser)?;
    loop {
        let op = match parser.peek()?.kind {
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            _ => break,
        };
        parser.consume()?;
        let rhs = parse_unary(parser)?;
        expr = RtlExpr::binary(op, expr, rhs);
    }
    Ok(expr)
}

fn parse_unary(parser: &mut Parser) -> Result<RtlExpr, IsaError> {
    let op = match parser.peek()?.kind {
        TokenKind::Minus => Some(UnaryOp::Neg),
        TokenKind::Bang => Some(UnaryOp::Not),
        TokenKind::Tilde => Some(UnaryOp::BitNot),
        _ => None,
    };
    if let Some(op) = op {
        parser.consume()?;
        let expr = parse_unary(parser)?;
        return Ok(RtlExpr::unary(op, expr));
    }
    parse_postfix(parser)
}

/// Postfix forms: `name[index]` register-file access, `base[msb:lsb]` bit
/// slice with constant bounds, and `name.field` access. Indexing and field
/// access require a plain name on the left; slices apply to any expression.
fn parse_postfix(parser: &mut Parser) -> Result<RtlExpr, IsaError> {
    let mut expr = parse_primary(parser)?;
    loop {
        if parser.match_token(TokenKind::LBracket)? {
            let first = parse_expr(parser)?;
            if parser.match_token(TokenKind::Colon)? {
                let second = parse_expr(parser)?;
                parser.expect(TokenKind::RBracket, "']' to close the bit slice")?;
                let msb = constant_bound(&first, "bit slice high bound")?;
                let lsb = constant_bound(&second, "bit slice low bound")?;
                expr = RtlExpr::BitSlice {
                    base: Box::new(expr),
                    msb,
                    lsb,
                };
                continue;
            }
            parser.expect(TokenKind::RBracket, "']' to close the register index")?;
            let RtlExpr::OperandRef(reg) = expr else {
                return Err(IsaError::Parser(
                    "register indexing requires a plain register name".into(),
                ));
            };
            expr = RtlExpr::Register {
                reg,
                index: Some(Box::new(first)),
            };
            continue;
        }
        if parser.match_token(TokenKind::Dot)? {
            let field = parser.expect_identifier("field name")?;
            let RtlExpr::OperandRef(reg) = expr else {
                return Err(IsaError::Parser(
                    "field access requires a plain register name".into(),
                ));
            };
            expr = RtlExpr::Field { reg, field };
            continue;
        }
        break;
    }
    Ok(expr)
}

fn parse_primary(parser: &mut Parser) -> Result<RtlExpr, IsaError> {
    if parser.match_token(TokenKind::LParen)? {
        let expr = parse_expr(parser)?;
        parser.expect(TokenKind::RParen, "')' to close the grouped expression")?;
        return Ok(expr);
    }
    if parser.check(TokenKind::Number)? {
        let token = parser.consume()?;
        return Ok(RtlExpr::Constant(parse_int(&token.lexeme)?));
    }
    if parser.check(TokenKind::Identifier)? {
        let token = parser.consume()?;
        if parser.match_token(TokenKind::LParen)? {
            let args = parse_argument_list(parser)?;
            return Ok(RtlExpr::Call {
                function: token.lexeme,
                args,
            });
        }
        return Ok(RtlExpr::OperandRef(token.lexeme));
    }
    Err(IsaError::Parser(format!(
        "expected an expression, found '{}'",
        parser.peek()?.lexeme
    )))
}

fn parse_argument_list(parser: &mut Parser) -> Result<Vec<RtlExpr>, IsaError> {
    let mut args = Vec::new();
    if parser.match_token(TokenKind::RParen)? {
        return Ok(args);
    }
    loop {
        args.push(parse_expr(parser)?);
        if parser.match_token(TokenKind::Comma)? {
            continue;
        }
        parser.expect(TokenKind::RParen, "')' to close the argument list")?;
        break;
    }
    Ok(args)
}

fn constant_bound(expr: &RtlExpr, context: &str) -> Result<u32, IsaError> {
    match expr {
        RtlExpr::Constant(value) => Ok(*value as u32),
        _ => Err(IsaError::Parser(format!("{context} must be a constant"))),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::diagnostic::DiagnosticPhase;
    use crate::error::IsaError;
    use crate::rtl::ast::{BinaryOp, LValue, RtlBlock, RtlExpr, RtlStatement, UnaryOp};

    use super::super::parse_str;

    fn behavior_of(body: &str) -> RtlBlock {
        let doc =
            format!("instructions {{ instruction T {{ format: F behavior: {{ {body} }} }} }}");
        let unit = parse_str(PathBuf::from("test.isa"), &doc).expect("parse");
        unit.spec.instructions[0]
            .behavior
            .clone()
            .expect("behavior block")
    }

    fn behavior_err(body: &str) -> IsaError {
        let doc =
            format!("instructions {{ instruction T {{ format: F behavior: {{ {body} }} }} }}");
        parse_str(PathBuf::from("test.isa"), &doc).unwrap_err()
    }

    fn expect_parser_diag(err: IsaError, needle: &str) {
        match err {
            IsaError::Diagnostics {
                phase: DiagnosticPhase::Parser,
                diagnostics,
            } => {
                assert!(
                    diagnostics.iter().any(|diag| diag.message.contains(needle)),
                    "diagnostics missing '{needle}': {diagnostics:?}"
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parses_register_file_assignment() {
        let block = behavior_of("R[rd] = R[rs1] + R[rs2]; PC = PC + 4;");
        assert_eq!(block.statements.len(), 2);
        let RtlStatement::Assignment(first) = &block.statements[0] else {
            panic!("expected assignment: {:?}", block.statements[0]);
        };
        assert!(matches!(
            &first.target,
            LValue::Register { reg, index: Some(index) }
                if reg == "R" && matches!(index.as_ref(), RtlExpr::OperandRef(name) if name == "rd")
        ));
        assert!(matches!(
            &first.expr,
            RtlExpr::Binary { op: BinaryOp::Add, .. }
        ));
        let RtlStatement::Assignment(second) = &block.statements[1] else {
            panic!("expected assignment: {:?}", block.statements[1]);
        };
        assert!(matches!(&second.target, LValue::Variable(name) if name == "PC"));
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let block = behavior_of("x = a + b * c;");
        let RtlStatement::Assignment(assign) = &block.statements[0] else {
            panic!("expected assignment");
        };
        let RtlExpr::Binary { op, right, .. } = &assign.expr else {
            panic!("expected binary expression: {:?}", assign.expr);
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            right.as_ref(),
            RtlExpr::Binary { op: BinaryOp::Mul, .. }
        ));
    }

    #[test]
    fn shift_binds_tighter_than_comparison() {
        let block = behavior_of("x = a < b << 2;");
        let RtlStatement::Assignment(assign) = &block.statements[0] else {
            panic!("expected assignment");
        };
        let RtlExpr::Binary { op, right, .. } = &assign.expr else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, BinaryOp::Lt);
        assert!(matches!(
            right.as_ref(),
            RtlExpr::Binary { op: BinaryOp::Shl, .. }
        ));
    }

    #[test]
    fn unary_operators_nest() {
        let block = behavior_of("x = -~y;");
        let RtlStatement::Assignment(assign) = &block.statements[0] else {
            panic!("expected assignment");
        };
        let RtlExpr::Unary { op: UnaryOp::Neg, expr } = &assign.expr else {
            panic!("expected negation: {:?}", assign.expr);
        };
        assert!(matches!(
            expr.as_ref(),
            RtlExpr::Unary { op: UnaryOp::BitNot, .. }
        ));
    }

    #[test]
    fn parses_ternary_expression() {
        let block = behavior_of("x = a == 0 ? 1 : 2;");
        let RtlStatement::Assignment(assign) = &block.statements[0] else {
            panic!("expected assignment");
        };
        let RtlExpr::Ternary { condition, then_expr, else_expr } = &assign.expr else {
            panic!("expected ternary: {:?}", assign.expr);
        };
        assert!(matches!(
            condition.as_ref(),
            RtlExpr::Binary { op: BinaryOp::Eq, .. }
        ));
        assert!(matches!(then_expr.as_ref(), RtlExpr::Constant(1)));
        assert!(matches!(else_expr.as_ref(), RtlExpr::Constant(2)));
    }

    #[test]
    fn parses_conditional_with_else_if_chain() {
        let block = behavior_of(
            "if (a == 1) { x = 1; } else if (a == 2) { x = 2; } else { x = 3; }",
        );
        let RtlStatement::Conditional { then_body, else_body, .. } = &block.statements[0] else {
            panic!("expected conditional");
        };
        assert_eq!(then_body.len(), 1);
        assert_eq!(else_body.len(), 1);
        let RtlStatement::Conditional { else_body: inner_else, .. } = &else_body[0] else {
            panic!("expected nested conditional");
        };
        assert_eq!(inner_else.len(), 1);
    }

    #[test]
    fn parses_memory_store_and_load() {
        let block = behavior_of("MEM[R[rs1] + offset] = R[rd]; R[rd] = MEM[R[rs1]];");
        assert!(matches!(
            &block.statements[0],
            RtlStatement::MemoryStore { .. }
        ));
        let RtlStatement::MemoryLoad { target, .. } = &block.statements[1] else {
            panic!("expected memory load: {:?}", block.statements[1]);
        };
        assert!(matches!(target, LValue::Register { reg, .. } if reg == "R"));
    }

    #[test]
    fn parses_for_loop_header_and_body() {
        let block = behavior_of("for (i = 0; i < 4; i = i + 1) { V[i] = 0; }");
        let RtlStatement::ForLoop { init, condition, update, body } = &block.statements[0] else {
            panic!("expected for loop");
        };
        assert!(matches!(&init.target, LValue::Variable(name) if name == "i"));
        assert!(matches!(
            condition,
            RtlExpr::Binary { op: BinaryOp::Lt, .. }
        ));
        assert!(matches!(&update.target, LValue::Variable(name) if name == "i"));
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn parses_calls_and_bit_slices() {
        let block = behavior_of("x = sign_extend(imm, 12) + y[7:0];");
        let RtlStatement::Assignment(assign) = &block.statements[0] else {
            panic!("expected assignment");
        };
        let RtlExpr::Binary { left, right, .. } = &assign.expr else {
            panic!("expected binary expression");
        };
        let RtlExpr::Call { function, args } = left.as_ref() else {
            panic!("expected call: {left:?}");
        };
        assert_eq!(function, "sign_extend");
        assert_eq!(args.len(), 2);
        let RtlExpr::BitSlice { msb, lsb, .. } = right.as_ref() else {
            panic!("expected bit slice: {right:?}");
        };
        assert_eq!((*msb, *lsb), (7, 0));
    }

    #[test]
    fn field_access_parses_on_both_sides() {
        let block = behavior_of("PSW.C = PSW.V;");
        let RtlStatement::Assignment(assign) = &block.statements[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(
            &assign.target,
            LValue::Field { reg, field } if reg == "PSW" && field == "C"
        ));
        assert!(matches!(
            &assign.expr,
            RtlExpr::Field { reg, field } if reg == "PSW" && field == "V"
        ));
    }

    #[test]
    fn empty_behavior_block_is_an_error() {
        expect_parser_diag(behavior_err(""), "at least one statement");
    }

    #[test]
    fn bit_slice_bounds_must_be_constant() {
        expect_parser_diag(behavior_err("x = y[a:0];"), "must be a constant");
    }

    #[test]
    fn missing_semicolon_is_reported() {
        expect_parser_diag(behavior_err("x = 1"), "';' after assignment");
    }
}
