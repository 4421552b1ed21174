//! Human-readable size labels as printed by `du -h`.

use crate::error::SizeParseError;

const UNITS: [char; 4] = ['K', 'M', 'G', 'T'];

/// Bytes in one GiB.
pub const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn unit_multiplier(unit: char) -> Option<f64> {
    UNITS
        .iter()
        .position(|&u| u == unit)
        .map(|exp| 1024f64.powi(exp as i32 + 1))
}

/// Decode a label like `2.5G`, `512`, or `4.0K` into bytes.
///
/// The trailing unit is optional and case-insensitive. Any other trailing
/// letter is not a unit, so the whole label must then be numeric.
pub fn parse(label: &str) -> Result<f64, SizeParseError> {
    let invalid = || SizeParseError {
        label: label.to_string(),
    };

    let upper = label.trim().to_ascii_uppercase();
    let (number, multiplier) = match upper.char_indices().last() {
        Some((idx, unit)) => match unit_multiplier(unit) {
            Some(multiplier) => (&upper[..idx], multiplier),
            None => (upper.as_str(), 1.0),
        },
        None => return Err(invalid()),
    };

    let value: f64 = number.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }
    Ok(value * multiplier)
}

/// Like [`parse`], but an undecodable label counts as zero bytes.
pub fn parse_or_zero(label: &str) -> f64 {
    parse(label).unwrap_or(0.0)
}

/// Encode a byte count the way `du -h` does: values below ten keep one
/// decimal, everything is rounded up.
pub fn format(bytes: u64) -> String {
    if bytes < 1024 {
        return bytes.to_string();
    }

    let mut value = bytes as f64;
    let mut unit_index = 0;
    while value >= 1024.0 && unit_index < UNITS.len() {
        value /= 1024.0;
        unit_index += 1;
    }

    let unit = UNITS[unit_index - 1];
    if value < 10.0 {
        let rounded = (value * 10.0).ceil() / 10.0;
        if rounded >= 10.0 {
            format!("10{}", unit)
        } else {
            format!("{:.1}{}", rounded, unit)
        }
    } else {
        let rounded = value.ceil();
        if rounded >= 1024.0 && unit_index < UNITS.len() {
            format!("1.0{}", UNITS[unit_index])
        } else {
            format!("{}{}", rounded as u64, unit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse("512").unwrap(), 512.0);
        assert_eq!(parse("4.0K").unwrap(), 4096.0);
        assert_eq!(parse("2.5G").unwrap(), 2.5 * GIB);
        assert_eq!(parse("1T").unwrap(), 1024.0 * GIB);
        assert_eq!(parse("1.5m").unwrap(), 1.5 * 1024.0 * 1024.0);
    }

    #[test]
    fn test_binary_multiples_agree() {
        assert_eq!(parse("1024K").unwrap(), parse("1M").unwrap());
        assert_eq!(parse("1024M").unwrap(), parse("1G").unwrap());
        assert_eq!(parse("1024G").unwrap(), parse("1T").unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("").is_err());
        assert!(parse("G").is_err());
        assert!(parse("abc").is_err());
        assert!(parse("12X").is_err());
        assert!(parse("512B").is_err());
        assert!(parse("-1K").is_err());
        assert!(parse("inf").is_err());

        let err = parse("12X").unwrap_err();
        assert_eq!(err.label, "12X");
    }

    #[test]
    fn test_parse_or_zero() {
        assert_eq!(parse_or_zero("??"), 0.0);
        assert_eq!(parse_or_zero("2K"), 2048.0);
    }

    #[test]
    fn test_format_like_du() {
        assert_eq!(format(0), "0");
        assert_eq!(format(1023), "1023");
        assert_eq!(format(4096), "4.0K");
        assert_eq!(format(4097), "4.1K");
        assert_eq!(format(15 * 1024 * 1024), "15M");
        assert_eq!(format((2.5 * GIB) as u64), "2.5G");
        assert_eq!(format(1024 * 1024 - 1), "1.0M");
    }

    #[test]
    fn test_format_never_understates() {
        for bytes in [1024u64, 5000, 123_456, 9_999_999, 3 * 1024 * 1024 * 1024 + 17] {
            assert!(parse(&format(bytes)).unwrap() >= bytes as f64, "{}", bytes);
        }
    }

    proptest! {
        #[test]
        fn parse_is_monotonic_per_unit(
            a in 0u32..100_000,
            b in 0u32..100_000,
            unit in prop::sample::select(vec!["", "K", "M", "G", "T"]),
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let lo_bytes = parse(&format!("{}{}", lo, unit)).unwrap();
            let hi_bytes = parse(&format!("{}{}", hi, unit)).unwrap();
            prop_assert!(lo_bytes <= hi_bytes);
        }
    }
}
