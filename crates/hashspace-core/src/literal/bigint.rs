//! Canonical big integer encoding.
//!
//! A sign character (`+` or `-`) followed by the lowercase hex magnitude with
//! no leading zero nibble. Zero is `+0`; `-0` is not canonical.

use crate::core::{HashspaceError, Result};

pub fn encode(n: i128) -> String {
    let sign = if n < 0 { '-' } else { '+' };
    format!("{}{:x}", sign, n.unsigned_abs())
}

pub fn check_encoding(text: &str) -> bool {
    let mut chars = text.chars();
    let sign = match chars.next() {
        Some(c @ ('+' | '-')) => c,
        _ => return false,
    };
    let magnitude = chars.as_str();
    if magnitude.is_empty() || magnitude.len() > 32 {
        return false;
    }
    if !magnitude
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return false;
    }
    if magnitude == "0" {
        return sign == '+';
    }
    !magnitude.starts_with('0')
}

pub fn decode(text: &str) -> Result<i128> {
    if !check_encoding(text) {
        return Err(HashspaceError::ValidationFailed(format!(
            "non-canonical bigint encoding: {text:?}"
        )));
    }
    let (sign, magnitude) = text.split_at(1);
    let magnitude = u128::from_str_radix(magnitude, 16)
        .map_err(|e| HashspaceError::ValidationFailed(e.to_string()))?;
    if sign == "-" {
        if magnitude == i128::MIN.unsigned_abs() {
            return Ok(i128::MIN);
        }
        i128::try_from(magnitude)
            .map(|m| -m)
            .map_err(|_| HashspaceError::ValidationFailed(format!("bigint out of range: {text}")))
    } else {
        i128::try_from(magnitude)
            .map_err(|_| HashspaceError::ValidationFailed(format!("bigint out of range: {text}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_and_signs() {
        assert_eq!(encode(0), "+0");
        assert_eq!(encode(255), "+ff");
        assert_eq!(encode(-16), "-10");
        assert_eq!(decode("+0").unwrap(), 0);
        assert_eq!(decode("-10").unwrap(), -16);
    }

    #[test]
    fn test_round_trip_extremes() {
        for n in [i128::MIN, i128::MIN + 1, -1, 1, i128::MAX, 1 << 64] {
            assert_eq!(decode(&encode(n)).unwrap(), n);
        }
    }

    #[test]
    fn test_check_encoding() {
        assert!(check_encoding("+0"));
        assert!(!check_encoding("+00"));
        assert!(!check_encoding("-0"));
        assert!(!check_encoding("+0a"));
        assert!(!check_encoding("+g1"));
        assert!(!check_encoding("+A"));
        assert!(!check_encoding("*1"));
        assert!(!check_encoding("+"));
        assert!(!check_encoding(""));
    }

    #[test]
    fn test_malformed_is_error_not_panic() {
        let err = decode("+00").unwrap_err();
        assert!(err.is_rejection());
        let too_big = format!("+{}", "f".repeat(32));
        assert!(decode(&too_big).is_err());
    }
}
