//! CPU quantity parsing
//!
//! Kubernetes reports CPU as decimal quantities: `250m`, `1`, `1.5`, and
//! from the metrics API often `123456789n`. Values are rounded up to whole
//! millicores, matching `Quantity::MilliValue` semantics.

use crate::error::{ProviderError, ProviderResult};

/// Parse a CPU quantity string into millicores
pub fn parse_cpu_millis(quantity: &str) -> ProviderResult<u64> {
    let quantity = quantity.trim();
    if quantity.is_empty() {
        return Err(ProviderError::Transient("empty cpu quantity".to_string()));
    }

    let split = quantity
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(quantity.len());
    let (number, suffix) = quantity.split_at(split);

    // Power of ten that converts one unit of the suffix to millicores
    let exponent: i32 = match suffix {
        "n" => -6,
        "u" => -3,
        "m" => 0,
        "" => 3,
        "k" => 6,
        "M" => 9,
        "G" => 12,
        _ => {
            return Err(ProviderError::Transient(format!(
                "unsupported cpu quantity suffix in {quantity:?}"
            )))
        }
    };

    let invalid = || ProviderError::Transient(format!("invalid cpu quantity {quantity:?}"));

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    // value = mantissa * 10^-(fraction digits), kept as integers
    let digits = format!("{whole}{fraction}");
    let significant = digits.trim_start_matches('0');
    let mantissa: u128 = if significant.is_empty() {
        0
    } else {
        significant.parse().map_err(|_| invalid())?
    };
    let shift = exponent - fraction.len() as i32;

    let millis = if shift >= 0 {
        10u128
            .checked_pow(shift as u32)
            .and_then(|p| mantissa.checked_mul(p))
            .ok_or_else(invalid)?
    } else {
        match 10u128.checked_pow(shift.unsigned_abs()) {
            Some(divisor) => mantissa.div_ceil(divisor),
            // Below 1m at any precision, rounds up to 1m if nonzero
            None => u128::from(mantissa > 0),
        }
    };

    u64::try_from(millis).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millicores() {
        assert_eq!(parse_cpu_millis("250m").unwrap(), 250);
        assert_eq!(parse_cpu_millis("0m").unwrap(), 0);
    }

    #[test]
    fn test_whole_and_fractional_cores() {
        assert_eq!(parse_cpu_millis("1").unwrap(), 1000);
        assert_eq!(parse_cpu_millis("1.5").unwrap(), 1500);
        assert_eq!(parse_cpu_millis("0.1").unwrap(), 100);
    }

    #[test]
    fn test_nanocores_round_up() {
        assert_eq!(parse_cpu_millis("123456789n").unwrap(), 124);
        assert_eq!(parse_cpu_millis("1000000n").unwrap(), 1);
        assert_eq!(parse_cpu_millis("1n").unwrap(), 1);
    }

    #[test]
    fn test_microcores() {
        assert_eq!(parse_cpu_millis("2500u").unwrap(), 3);
    }

    #[test]
    fn test_decimal_cores_are_exact() {
        assert_eq!(parse_cpu_millis("2.007").unwrap(), 2007);
        assert_eq!(parse_cpu_millis("0.3").unwrap(), 300);
        assert_eq!(parse_cpu_millis(".5").unwrap(), 500);
        assert_eq!(parse_cpu_millis("0.0005").unwrap(), 1);
        assert_eq!(parse_cpu_millis("1.25k").unwrap(), 1_250_000);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(parse_cpu_millis("").is_err());
        assert!(parse_cpu_millis("abc").is_err());
        assert!(parse_cpu_millis("12Ki").is_err());
        assert!(parse_cpu_millis("-1").is_err());
        assert!(parse_cpu_millis(".").is_err());
        assert!(parse_cpu_millis("1.2.3").is_err());
    }
}
