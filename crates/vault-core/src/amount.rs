//! Conversion between user-entered decimal amounts and raw minor units.
//!
//! Parsing is exact: `"0.1"` with 2 decimals is 10 minor units, never a
//! float approximation. More fractional digits than the token has decimals
//! is rejected instead of rounded.

use crate::error::VaultError;

/// A validated, strictly positive amount of one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAmount {
    raw: u64,
    decimals: u8,
    entered: String,
}

impl TokenAmount {
    /// Minor units submitted on-chain.
    pub fn raw(&self) -> u64 {
        self.raw
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// The amount as the user typed it (trimmed).
    pub fn entered(&self) -> &str {
        &self.entered
    }
}

/// Parse a human-entered decimal amount into minor units.
pub fn parse_amount(input: &str, decimals: u8) -> Result<TokenAmount, VaultError> {
    let entered = input.trim();
    if entered.is_empty() {
        return Err(VaultError::InvalidAmount(
            "Please enter an amount".into(),
        ));
    }

    let (whole, fraction) = entered.split_once('.').unwrap_or((entered, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(VaultError::InvalidAmount(format!(
            "'{entered}' is not a valid amount"
        )));
    }

    if fraction.len() > decimals as usize {
        return Err(VaultError::InvalidAmount(format!(
            "this token supports at most {decimals} decimal places"
        )));
    }

    let padding = decimals as usize - fraction.len();
    let digits = whole
        .bytes()
        .chain(fraction.bytes())
        .chain(std::iter::repeat(b'0').take(padding));

    let mut raw: u64 = 0;
    for digit in digits {
        raw = raw
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(digit - b'0')))
            .ok_or_else(|| VaultError::InvalidAmount(format!("'{entered}' is too large")))?;
    }

    if raw == 0 {
        return Err(VaultError::InvalidAmount(
            "amount must be greater than zero".into(),
        ));
    }

    Ok(TokenAmount {
        raw,
        decimals,
        entered: entered.to_string(),
    })
}

/// Render raw minor units with exactly `decimals` fractional digits.
pub fn format_amount(raw: u64, decimals: u8) -> String {
    if decimals == 0 {
        return raw.to_string();
    }
    let scale = 10u128.pow(u32::from(decimals));
    let raw = u128::from(raw);
    format!(
        "{}.{:0width$}",
        raw / scale,
        raw % scale,
        width = decimals as usize
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_matches_division_for_all_decimals() {
        for d in 0u8..=9 {
            let raw = 123_456_789_012u64;
            let scale = 10u64.pow(u32::from(d));
            let expected = if d == 0 {
                raw.to_string()
            } else {
                format!("{}.{:0w$}", raw / scale, raw % scale, w = d as usize)
            };
            let formatted = format_amount(raw, d);
            assert_eq!(formatted, expected, "decimals {d}");
            let fractional = formatted.split_once('.').map_or(0, |(_, f)| f.len());
            assert_eq!(fractional, d as usize);
        }
    }

    #[test]
    fn format_small_values_pad_with_zeros() {
        assert_eq!(format_amount(10_000, 2), "100.00");
        assert_eq!(format_amount(5, 3), "0.005");
        assert_eq!(format_amount(0, 9), "0.000000000");
        assert_eq!(format_amount(42, 0), "42");
    }

    #[test]
    fn format_handles_u64_max() {
        assert_eq!(format_amount(u64::MAX, 9), "18446744073.709551615");
    }

    #[test]
    fn parse_whole_and_fractional_amounts() {
        assert_eq!(parse_amount("100", 2).unwrap().raw(), 10_000);
        assert_eq!(parse_amount("0.5", 2).unwrap().raw(), 50);
        assert_eq!(parse_amount(".25", 2).unwrap().raw(), 25);
        assert_eq!(parse_amount("7.", 0).unwrap().raw(), 7);
        assert_eq!(parse_amount("1.000000001", 9).unwrap().raw(), 1_000_000_001);
    }

    #[test]
    fn parse_keeps_entered_text() {
        let amount = parse_amount("  40 ", 2).unwrap();
        assert_eq!(amount.entered(), "40");
        assert_eq!(amount.decimals(), 2);
    }

    #[test]
    fn parse_rejects_excess_precision() {
        let err = parse_amount("0.001", 2).unwrap_err();
        assert!(matches!(err, VaultError::InvalidAmount(_)));
    }

    #[test]
    fn parse_rejects_non_positive_and_malformed() {
        for input in ["", "0", "0.00", "-1", "+1", "1e3", "abc", ".", "1.2.3", "NaN", "inf", "1 000"] {
            assert!(
                matches!(parse_amount(input, 2), Err(VaultError::InvalidAmount(_))),
                "expected rejection for {input:?}"
            );
        }
    }

    #[test]
    fn parse_rejects_overflow() {
        assert!(parse_amount("18446744073709551616", 0).is_err());
        assert!(parse_amount("18446744074", 9).is_err());
        assert_eq!(parse_amount("18446744073709551615", 0).unwrap().raw(), u64::MAX);
    }
}
