//! CPU and FPU register names.

/// Conventional names of the 32 general purpose registers, in number order.
#[rustfmt::skip]
pub const GPR_NAMES: [&str; 32] = [
    "$zero", "$at", "$v0", "$v1", "$a0", "$a1", "$a2", "$a3",
    "$t0",   "$t1", "$t2", "$t3", "$t4", "$t5", "$t6", "$t7",
    "$s0",   "$s1", "$s2", "$s3", "$s4", "$s5", "$s6", "$s7",
    "$t8",   "$t9", "$k0", "$k1", "$gp", "$sp", "$fp", "$ra",
];

/// Look up a general purpose register by its conventional name, e.g. `$t1`.
pub fn gpr_name_number(name: &str) -> Option<u8> {
    GPR_NAMES
        .iter()
        .position(|candidate| *candidate == name)
        .map(|number| number as u8)
}

/// Parse a general purpose register given by number, e.g. `$9`.
pub fn gpr_number(literal: &str) -> Option<u8> {
    let digits = literal.strip_prefix('$')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match digits.parse::<u8>() {
        Ok(number) if number < 32 => Some(number),
        _ => None,
    }
}

/// Parse a floating point register name, e.g. `$f12`.
pub fn fp_register_number(literal: &str) -> Option<u8> {
    let digits = literal.strip_prefix("$f")?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match digits.parse::<u8>() {
        Ok(number) if number < 32 => Some(number),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_gpr_names() {
        assert_eq!(gpr_name_number("$zero"), Some(0));
        assert_eq!(gpr_name_number("$t1"), Some(9));
        assert_eq!(gpr_name_number("$sp"), Some(29));
        assert_eq!(gpr_name_number("$ra"), Some(31));
        assert_eq!(gpr_name_number("$t1x"), None);
        assert_eq!(gpr_name_number("t1"), None);
    }

    #[test]
    fn test_gpr_numbers() {
        assert_eq!(gpr_number("$0"), Some(0));
        assert_eq!(gpr_number("$31"), Some(31));
        assert_eq!(gpr_number("$32"), None);
        assert_eq!(gpr_number("$"), None);
        assert_eq!(gpr_number("$1a"), None);
    }

    #[test]
    fn test_fp_registers() {
        assert_eq!(fp_register_number("$f0"), Some(0));
        assert_eq!(fp_register_number("$f31"), Some(31));
        assert_eq!(fp_register_number("$f32"), None);
        assert_eq!(fp_register_number("$fp"), None);
        assert_eq!(fp_register_number("$f"), None);
    }
}
