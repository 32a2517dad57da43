//! ISO 6346 container-number check digits.
//!
//! A container number is four owner-code letters, six serial digits, and one
//! check digit (`SEGU3474023`). The check digit is derived from the first ten
//! characters: letters map to numeric values starting at A=10 and skipping
//! every multiple of 11, digits map to themselves, each value is weighted by
//! a power of two by position, and the digit is `(sum mod 11) mod 10`.

use crate::error::{Error, Result};

/// Letter values A..=Z. Multiples of 11 are skipped, so B is 12, L is 23
/// and V is 34.
const LETTER_VALUES: [u32; 26] = [
    10, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, 34, 35,
    36, 37, 38,
];

fn char_value(c: char) -> Result<u32> {
    match c {
        '0'..='9' => Ok(c as u32 - '0' as u32),
        'A'..='Z' => Ok(LETTER_VALUES[(c as u8 - b'A') as usize]),
        other => Err(Error::validation(format!(
            "container number contains invalid character '{other}'"
        ))),
    }
}

/// Derive the check digit for a 10-character owner-code + serial prefix.
///
/// Lowercase letters are accepted and treated as uppercase.
///
/// # Errors
///
/// Returns a validation error if the prefix is not exactly 10 alphanumeric
/// ASCII characters.
pub fn check_digit(prefix: &str) -> Result<u8> {
    if prefix.len() != 10 || !prefix.is_ascii() {
        return Err(Error::validation(format!(
            "container prefix must be 10 ASCII characters, got '{prefix}'"
        )));
    }

    let mut sum: u32 = 0;
    for (pos, c) in prefix.chars().enumerate() {
        let value = char_value(c.to_ascii_uppercase())?;
        // Leftmost character carries weight 2^0.
        sum += value << pos;
    }

    Ok(((sum % 11) % 10) as u8)
}

/// Append the derived check digit to a 10-character prefix.
pub fn checked_number(prefix: &str) -> Result<String> {
    let digit = check_digit(prefix)?;
    Ok(format!("{}{digit}", prefix.to_ascii_uppercase()))
}

/// Whether a full 11-character container number carries the right check
/// digit. Anything that is not 11 ASCII characters is invalid.
pub fn is_valid(container_no: &str) -> bool {
    if container_no.len() != 11 || !container_no.is_ascii() {
        return false;
    }

    let (prefix, last) = container_no.split_at(10);
    match (check_digit(prefix), last.chars().next()) {
        (Ok(expected), Some(c)) => c.to_digit(10) == Some(u32::from(expected)),
        _ => false,
    }
}
