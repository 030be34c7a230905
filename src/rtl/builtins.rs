//! Built-in functions callable from RTL behavior blocks.
//!
//! Everything works in the 32-bit architectural domain: arguments are masked
//! to 32 bits where the operation demands it and results come back 32-bit
//! masked. Each function enforces its exact arity; a wrong count or an
//! unknown name is an unconditional execution error, never a silent default.

use crate::error::{IsaError, IsaResult};
use crate::spec::field::mask_bits;

/// Mask of the 32-bit architectural word.
pub const WORD_MASK: u128 = 0xFFFF_FFFF;

fn as_u32(v: u128) -> u32 {
    (v & WORD_MASK) as u32
}

fn expect_arity(function: &str, args: &[u128], counts: &[usize]) -> IsaResult<()> {
    if counts.contains(&args.len()) {
        return Ok(());
    }
    let expected = counts
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(" or ");
    Err(IsaError::execution(format!(
        "built-in '{}' expects {} arguments, got {}",
        function,
        expected,
        args.len()
    )))
}

/// Dispatches one built-in call. `None`-like misses are errors here: RTL
/// that names an unknown function is an ISA-definition bug.
pub fn apply(function: &str, args: &[u128]) -> IsaResult<u128> {
    match function {
        "sign_extend" | "sext" | "sx" => {
            expect_arity(function, args, &[2, 3])?;
            let to = args.get(2).map_or(32, |v| *v as u32);
            Ok(sign_extend(args[0], args[1] as u32, to))
        }
        "zero_extend" | "zext" | "zx" => {
            expect_arity(function, args, &[2, 3])?;
            let to = args.get(2).map_or(32, |v| *v as u32);
            Ok(zero_extend(args[0], args[1] as u32, to))
        }
        "extract_bits" => {
            expect_arity(function, args, &[3])?;
            Ok(extract_bits(args[0], args[1] as u32, args[2] as u32))
        }
        "to_signed" => {
            expect_arity(function, args, &[2])?;
            Ok(sign_extend(args[0], args[1] as u32, 32))
        }
        "to_unsigned" => {
            expect_arity(function, args, &[2])?;
            Ok(zero_extend(args[0], args[1] as u32, 32))
        }
        "ssov" => {
            expect_arity(function, args, &[2])?;
            Ok(ssov(args[0], args[1] as u32))
        }
        "suov" => {
            expect_arity(function, args, &[2])?;
            Ok(suov(args[0], args[1] as u32))
        }
        "carry" => {
            expect_arity(function, args, &[3])?;
            let sum = (args[0] & WORD_MASK) + (args[1] & WORD_MASK) + (args[2] & WORD_MASK);
            Ok(u128::from(sum > WORD_MASK))
        }
        "borrow" => {
            expect_arity(function, args, &[3])?;
            let need = (args[1] & WORD_MASK) + (args[2] & WORD_MASK);
            Ok(u128::from((args[0] & WORD_MASK) < need))
        }
        "reverse16" => {
            expect_arity(function, args, &[1])?;
            Ok(((args[0] & 0xFFFF) as u16).reverse_bits() as u128)
        }
        "leading_ones" => {
            expect_arity(function, args, &[1])?;
            Ok(as_u32(args[0]).leading_ones() as u128)
        }
        "leading_zeros" => {
            expect_arity(function, args, &[1])?;
            Ok(as_u32(args[0]).leading_zeros() as u128)
        }
        "leading_signs" => {
            expect_arity(function, args, &[1])?;
            Ok(leading_signs(as_u32(args[0])) as u128)
        }
        other => Err(IsaError::execution(format!(
            "unknown built-in function '{other}'"
        ))),
    }
}

/// True when `name` denotes a built-in, alias spellings included.
pub fn is_builtin(name: &str) -> bool {
    matches!(
        name,
        "sign_extend"
            | "sext"
            | "sx"
            | "zero_extend"
            | "zext"
            | "zx"
            | "extract_bits"
            | "to_signed"
            | "to_unsigned"
            | "ssov"
            | "suov"
            | "carry"
            | "borrow"
            | "reverse16"
            | "leading_ones"
            | "leading_zeros"
            | "leading_signs"
    )
}

fn sign_extend(v: u128, from_bits: u32, to_bits: u32) -> u128 {
    let to_bits = to_bits.min(32);
    if from_bits == 0 || from_bits > to_bits {
        return v & mask_bits(to_bits);
    }
    let value = v & mask_bits(from_bits);
    let sign = (value >> (from_bits - 1)) & 1;
    if sign == 1 {
        (value | (mask_bits(to_bits) & !mask_bits(from_bits))) & mask_bits(to_bits)
    } else {
        value
    }
}

fn zero_extend(v: u128, from_bits: u32, to_bits: u32) -> u128 {
    v & mask_bits(from_bits.min(to_bits.min(32)))
}

fn extract_bits(v: u128, msb: u32, lsb: u32) -> u128 {
    if msb < lsb {
        return 0;
    }
    (v >> lsb) & mask_bits(msb - lsb + 1)
}

/// Signed saturation. Values strictly above `2^(width-1)` are read as
/// negative two's complement; the exact sign-bit pattern therefore counts as
/// positive overflow and clamps to the signed maximum.
fn ssov(v: u128, width: u32) -> u128 {
    let width = width.clamp(1, 32);
    let half = 1i128 << (width - 1);
    let signed = if v > half as u128 {
        v as i128 - (1i128 << width)
    } else {
        v as i128
    };
    if signed > half - 1 {
        ((half - 1) as u128) & WORD_MASK
    } else if signed < -half {
        ((-half) as u128) & WORD_MASK
    } else {
        v & WORD_MASK
    }
}

/// Unsigned saturation into `[0, 2^width - 1]`.
fn suov(v: u128, width: u32) -> u128 {
    let max = mask_bits(width.min(32));
    if v & WORD_MASK > max { max } else { v & WORD_MASK }
}

/// Count of leading bits, after the sign bit, that equal the sign bit.
fn leading_signs(v: u32) -> u32 {
    let normalized = if v & 0x8000_0000 != 0 { !v } else { v };
    (normalized << 1).leading_zeros().min(31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssov_saturates_positive_overflow() {
        assert_eq!(apply("ssov", &[0x8000_0000, 32]).expect("ssov"), 0x7FFF_FFFF);
        assert_eq!(apply("ssov", &[0x7FFF_FFFF, 32]).expect("ssov"), 0x7FFF_FFFF);
        assert_eq!(apply("ssov", &[0xFFFF_FFFF, 32]).expect("ssov"), 0xFFFF_FFFF);
        assert_eq!(apply("ssov", &[0x8000, 16]).expect("ssov"), 0x7FFF);
    }

    #[test]
    fn suov_saturates_unsigned() {
        assert_eq!(apply("suov", &[0x1_0000, 16]).expect("suov"), 0xFFFF);
        assert_eq!(apply("suov", &[0xFFFF, 16]).expect("suov"), 0xFFFF);
        assert_eq!(apply("suov", &[0xFFFF_FFFF, 32]).expect("suov"), 0xFFFF_FFFF);
    }

    #[test]
    fn carry_detects_unsigned_overflow() {
        assert_eq!(apply("carry", &[0xFFFF_FFFF, 1, 0]).expect("carry"), 1);
        assert_eq!(apply("carry", &[0x7FFF_FFFF, 1, 0]).expect("carry"), 0);
        assert_eq!(apply("carry", &[0xFFFF_FFFF, 0, 1]).expect("carry"), 1);
    }

    #[test]
    fn borrow_detects_unsigned_underflow() {
        assert_eq!(apply("borrow", &[0, 1, 0]).expect("borrow"), 1);
        assert_eq!(apply("borrow", &[1, 0, 0]).expect("borrow"), 0);
        assert_eq!(apply("borrow", &[1, 1, 1]).expect("borrow"), 1);
    }

    #[test]
    fn reverse16_mirrors_low_half() {
        assert_eq!(apply("reverse16", &[0x1234]).expect("reverse16"), 0x2C48);
        assert_eq!(apply("reverse16", &[0x8000]).expect("reverse16"), 0x0001);
        assert_eq!(apply("reverse16", &[0x0001]).expect("reverse16"), 0x8000);
    }

    #[test]
    fn leading_bit_counts() {
        assert_eq!(apply("leading_ones", &[0xFFFF_FFFF]).expect("ones"), 32);
        assert_eq!(apply("leading_ones", &[0xF000_0000]).expect("ones"), 4);
        assert_eq!(apply("leading_ones", &[0]).expect("ones"), 0);

        assert_eq!(apply("leading_zeros", &[0]).expect("zeros"), 32);
        assert_eq!(apply("leading_zeros", &[1]).expect("zeros"), 31);
        assert_eq!(apply("leading_zeros", &[0x8000_0000]).expect("zeros"), 0);

        assert_eq!(apply("leading_signs", &[0xFFFF_FFFF]).expect("signs"), 31);
        assert_eq!(apply("leading_signs", &[0x8000_0000]).expect("signs"), 0);
        assert_eq!(apply("leading_signs", &[0xC000_0000]).expect("signs"), 1);
    }

    #[test]
    fn extension_helpers() {
        assert_eq!(apply("sign_extend", &[0x80, 8]).expect("sext"), 0xFFFF_FF80);
        assert_eq!(apply("sext", &[0x7F, 8]).expect("sext"), 0x7F);
        assert_eq!(apply("sx", &[0x8, 4, 8]).expect("sx"), 0xF8);
        assert_eq!(apply("zero_extend", &[0xFFFF_FF80, 8]).expect("zext"), 0x80);
        assert_eq!(apply("to_signed", &[0x8000, 16]).expect("to_signed"), 0xFFFF_8000);
        assert_eq!(apply("to_unsigned", &[0xFFFF_8000, 16]).expect("to_unsigned"), 0x8000);
        assert_eq!(apply("extract_bits", &[0xABCD, 15, 8]).expect("extract"), 0xAB);
    }

    #[test]
    fn arity_violations_are_errors() {
        let err = apply("carry", &[1, 2]).expect_err("two args is wrong");
        assert!(err.to_string().contains("expects 3 arguments"));
        let err = apply("reverse16", &[1, 2]).expect_err("one arg only");
        assert!(err.to_string().contains("reverse16"));
    }

    #[test]
    fn unknown_function_is_an_error() {
        let err = apply("frobnicate", &[1]).expect_err("unknown name");
        assert!(err.to_string().contains("frobnicate"));
        assert!(!is_builtin("frobnicate"));
        assert!(is_builtin("sext"));
    }
}
