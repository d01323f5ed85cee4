//! Exact resource quantities.
//!
//! Quantities are stored as integer milli-units so that comparisons never
//! touch floating point. Parsing accepts the Kubernetes notation:
//!
//! | Form | Example | Value |
//! |------|---------|-------|
//! | integer / decimal | `2`, `1.5` | 2, 1.5 |
//! | milli | `500m` | 0.5 |
//! | decimal SI | `1k`, `2G` | 1000, 2·10⁹ |
//! | binary SI | `4Gi` | 4·2³⁰ |
//! | exponent | `1e3` | 1000 |
//!
//! Precision finer than one milli-unit rounds up.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced while parsing a quantity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity is empty")]
    Empty,

    #[error("invalid quantity '{input}': {message}")]
    Invalid { input: String, message: String },

    #[error("quantity '{0}' is out of range")]
    Overflow(String),
}

impl QuantityError {
    fn invalid(input: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            input: input.to_string(),
            message: message.into(),
        }
    }
}

/// A resource quantity in milli-units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity {
    millis: i128,
}

const BINARY_DISPLAY_SUFFIXES: [(&str, i128); 5] = [
    ("Ei", 1 << 60),
    ("Pi", 1 << 50),
    ("Ti", 1 << 40),
    ("Gi", 1 << 30),
    ("Mi", 1 << 20),
];

impl Quantity {
    pub const ZERO: Quantity = Quantity { millis: 0 };

    /// Creates a quantity from whole units.
    pub const fn from_units(units: i64) -> Self {
        Self {
            millis: units as i128 * 1000,
        }
    }

    /// Creates a quantity from milli-units.
    pub const fn from_millis(millis: i128) -> Self {
        Self { millis }
    }

    /// Creates a quantity of `mib` mebibytes, expressed in bytes.
    pub const fn from_mebibytes(mib: i64) -> Self {
        Self::from_units(mib * 1024 * 1024)
    }

    /// Creates a quantity of `gib` gibibytes, expressed in bytes.
    pub const fn from_gibibytes(gib: i64) -> Self {
        Self::from_mebibytes(gib * 1024)
    }

    /// Parses a quantity in Kubernetes notation.
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, unsigned) = match s.as_bytes()[0] {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let number_end = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_end);

        let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(QuantityError::invalid(input, "missing digits"));
        }
        if frac_part.contains('.') {
            return Err(QuantityError::invalid(input, "more than one decimal point"));
        }

        let digits = format!("{int_part}{frac_part}");
        let mantissa: i128 = digits
            .parse()
            .map_err(|_| QuantityError::Overflow(input.to_string()))?;

        let scale = Scale::from_suffix(suffix).ok_or_else(|| {
            QuantityError::invalid(input, format!("unknown suffix '{suffix}'"))
        })?;

        // value = mantissa / 10^frac_len * multiplier * 10^exp10, in milli-units.
        let mut numerator = mantissa
            .checked_mul(scale.multiplier)
            .and_then(|n| n.checked_mul(1000))
            .ok_or_else(|| QuantityError::Overflow(input.to_string()))?;
        let mut denominator_exp = frac_part.len() as i32;

        if scale.exp10 >= 0 {
            numerator = pow10(scale.exp10 as u32)
                .and_then(|p| numerator.checked_mul(p))
                .ok_or_else(|| QuantityError::Overflow(input.to_string()))?;
        } else {
            denominator_exp += -scale.exp10;
        }

        let denominator =
            pow10(denominator_exp as u32).ok_or_else(|| QuantityError::Overflow(input.to_string()))?;
        let mut millis = numerator / denominator;
        if numerator % denominator != 0 {
            millis += 1;
        }

        Ok(Self {
            millis: if negative { -millis } else { millis },
        })
    }

    /// Returns the value in milli-units.
    pub fn millis(&self) -> i128 {
        self.millis
    }

    pub fn is_zero(&self) -> bool {
        self.millis == 0
    }

    pub fn is_positive(&self) -> bool {
        self.millis > 0
    }

    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.millis.checked_add(other.millis).map(Quantity::from_millis)
    }

    /// Subtracts `other`, clamping the result at zero.
    pub fn saturating_sub(self, other: Quantity) -> Quantity {
        Quantity::from_millis((self.millis - other.millis).max(0))
    }
}

struct Scale {
    multiplier: i128,
    exp10: i32,
}

impl Scale {
    fn from_suffix(suffix: &str) -> Option<Self> {
        let binary = |power: u32| Scale {
            multiplier: 1i128 << power,
            exp10: 0,
        };
        let decimal = |exp10: i32| Scale {
            multiplier: 1,
            exp10,
        };

        let scale = match suffix {
            "" => decimal(0),
            "m" => decimal(-3),
            "k" => decimal(3),
            "M" => decimal(6),
            "G" => decimal(9),
            "T" => decimal(12),
            "P" => decimal(15),
            "E" => decimal(18),
            "Ki" => binary(10),
            "Mi" => binary(20),
            "Gi" => binary(30),
            "Ti" => binary(40),
            "Pi" => binary(50),
            "Ei" => binary(60),
            other => {
                let exponent = other
                    .strip_prefix('e')
                    .or_else(|| other.strip_prefix('E'))?;
                decimal(exponent.parse::<i32>().ok().filter(|e| (-30..=30).contains(e))?)
            }
        };
        Some(scale)
    }
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.millis % 1000 != 0 {
            return write!(f, "{}m", self.millis);
        }

        let units = self.millis / 1000;
        if units != 0 {
            for (suffix, factor) in BINARY_DISPLAY_SUFFIXES {
                if units % factor == 0 {
                    return write!(f, "{}{}", units / factor, suffix);
                }
            }
        }
        write!(f, "{units}")
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for Quantity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct QuantityVisitor;

        impl serde::de::Visitor<'_> for QuantityVisitor {
            type Value = Quantity;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a quantity string such as \"500m\" or \"4Gi\", or an integer")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Quantity, E> {
                Quantity::parse(v).map_err(E::custom)
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Quantity, E> {
                Ok(Quantity::from_units(v))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Quantity, E> {
                Ok(Quantity::from_millis(v as i128 * 1000))
            }
        }

        deserializer.deserialize_any(QuantityVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1", 1_000)]
    #[case("0", 0)]
    #[case("500m", 500)]
    #[case("1.5", 1_500)]
    #[case(".5", 500)]
    #[case("2k", 2_000_000)]
    #[case("1M", 1_000_000_000)]
    #[case("1Ki", 1_024_000)]
    #[case("4Gi", 4 * (1i128 << 30) * 1000)]
    #[case("1e3", 1_000_000)]
    #[case("0.0001", 1)]
    #[case("-2", -2_000)]
    fn test_parse(#[case] input: &str, #[case] millis: i128) {
        assert_eq!(Quantity::parse(input).unwrap().millis(), millis);
    }

    #[rstest]
    #[case::empty("")]
    #[case::bad_suffix("3X")]
    #[case::no_digits("Gi")]
    #[case::two_points("1.2.3")]
    #[case::exponent_too_large("1e31")]
    #[case::exponent_min_i32("1e-2147483648")]
    fn test_parse_rejects(#[case] input: &str) {
        assert!(Quantity::parse(input).is_err());
    }

    #[test]
    fn test_sub_milli_rounds_up() {
        assert_eq!(Quantity::parse("1.0001m").unwrap().millis(), 2);
    }

    #[test]
    fn test_exact_comparison() {
        let a = Quantity::parse("1024Mi").unwrap();
        let b = Quantity::parse("1Gi").unwrap();
        assert_eq!(a, b);
        assert!(Quantity::parse("999m").unwrap() < Quantity::parse("1").unwrap());
    }

    #[rstest]
    #[case("2", "2")]
    #[case("250m", "250m")]
    #[case("4096Mi", "4Gi")]
    #[case("1Ki", "1024")]
    #[case("1500Mi", "1500Mi")]
    fn test_display(#[case] input: &str, #[case] shown: &str) {
        assert_eq!(Quantity::parse(input).unwrap().to_string(), shown);
    }

    #[test]
    fn test_saturating_sub_clamps() {
        let small = Quantity::from_units(1);
        let big = Quantity::from_units(3);
        assert_eq!(small.saturating_sub(big), Quantity::ZERO);
        assert_eq!(big.saturating_sub(small), Quantity::from_units(2));
    }

    #[test]
    fn test_serde() {
        let q: Quantity = serde_json::from_str("\"2Gi\"").unwrap();
        assert_eq!(q, Quantity::from_gibibytes(2));

        let q: Quantity = serde_json::from_str("4").unwrap();
        assert_eq!(q, Quantity::from_units(4));

        assert_eq!(serde_json::to_string(&Quantity::from_millis(100)).unwrap(), "\"100m\"");
    }
}
