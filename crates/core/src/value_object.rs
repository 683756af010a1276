//! Value objects: equality by value, not identity.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Monetary amount in minor currency units (e.g. paisa, cents).
///
/// Signed: trial-balance rows carry debits as negative amounts.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Sum that reports overflow instead of saturating.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        amounts.into_iter().try_fold(Money::ZERO, Money::checked_add)
    }

    /// `self * numerator / denominator`, rounded half away from zero.
    ///
    /// Used for percentage discounts/taxes and quantity-weighted costs.
    /// `None` when the result does not fit in `i64` minor units; a zero
    /// denominator yields zero.
    pub fn scale(self, numerator: i64, denominator: i64) -> Option<Money> {
        if denominator == 0 {
            return Some(Money::ZERO);
        }
        let n = self.0 as i128 * numerator as i128;
        let d = denominator as i128;
        let q = n / d;
        let r = n % d;
        let rounded = if (r.abs() * 2) >= d.abs() {
            q + if (n < 0) ^ (d < 0) { -1 } else { 1 }
        } else {
            q
        };
        i64::try_from(rounded).ok().map(Money)
    }

    /// [`Money::scale`] clamped to the `i64` range, for reporting figures.
    pub fn saturating_scale(self, numerator: i64, denominator: i64) -> Money {
        self.scale(numerator, denominator).unwrap_or_else(|| {
            let negative = (self.0 < 0) ^ (numerator < 0) ^ (denominator < 0);
            if negative { Money(i64::MIN) } else { Money(i64::MAX) }
        })
    }

    /// Render as major units with two decimals (`-1234.50`).
    pub fn to_major_string(self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }

    /// Parse a major-unit amount such as `261,080` or `-1234.5`.
    ///
    /// Thousands separators are ignored; more than two decimals is rejected.
    pub fn parse_major(raw: &str) -> Option<Money> {
        let cleaned: String = raw.chars().filter(|c| !matches!(c, ',' | '"' | ' ')).collect();
        let (negative, digits) = match cleaned.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, cleaned.as_str()),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if whole.is_empty() || fraction.len() > 2 || !all_digits(whole) || !all_digits(fraction) {
            return None;
        }
        let cents = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().ok()? * 10,
            _ => fraction.parse::<i64>().ok()?,
        };
        let minor = whole.parse::<i64>().ok()?.checked_mul(100)?.checked_add(cents)?;
        Some(Money(if negative { -minor } else { minor }))
    }

    /// Value in major units, for ratios and reporting.
    pub fn as_major_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_major_string())
    }
}

// Operators saturate at the i64 bounds. Amounts taken from callers go
// through the checked forms before they are stored.
impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        *self = *self + rhs;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        *self = *self - rhs;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(self.0.saturating_neg())
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_major_units_with_two_decimals() {
        assert_eq!(Money::from_minor(123450).to_major_string(), "1234.50");
        assert_eq!(Money::from_minor(-5).to_major_string(), "-0.05");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn scale_rounds_half_away_from_zero() {
        // 10% of 1.05 = 0.105 -> 0.11
        assert_eq!(Money::from_minor(105).scale(10, 100), Some(Money::from_minor(11)));
        assert_eq!(Money::from_minor(-105).scale(10, 100), Some(Money::from_minor(-11)));
        assert_eq!(Money::from_minor(100).scale(1, 3), Some(Money::from_minor(33)));
        assert_eq!(Money::from_minor(100).scale(1, 0), Some(Money::ZERO));
    }

    #[test]
    fn scale_reports_results_outside_i64() {
        let price = Money::from_minor(4_000_000_000_000);
        assert_eq!(price.scale(4_000_000_000, 1), None);
        assert_eq!(price.saturating_scale(4_000_000_000, 1), Money::from_minor(i64::MAX));
        assert_eq!(price.saturating_scale(-4_000_000_000, 1), Money::from_minor(i64::MIN));
    }

    #[test]
    fn checked_forms_detect_overflow() {
        let max = Money::from_minor(i64::MAX);
        assert_eq!(max.checked_add(Money::from_minor(1)), None);
        assert_eq!(Money::from_minor(i64::MIN).checked_sub(Money::from_minor(1)), None);
        assert_eq!(Money::checked_sum([max, max, Money::from_minor(2)]), None);
        assert_eq!(
            Money::checked_sum([Money::from_minor(5), Money::from_minor(7)]),
            Some(Money::from_minor(12))
        );
        assert_eq!(max + Money::from_minor(1), max);
    }

    #[test]
    fn major_amounts_parse_with_separators() {
        assert_eq!(Money::parse_major("261,080"), Some(Money::from_minor(26_108_000)));
        assert_eq!(Money::parse_major("\"2,400\""), Some(Money::from_minor(240_000)));
        assert_eq!(Money::parse_major("12.5"), Some(Money::from_minor(1_250)));
        assert_eq!(Money::parse_major("-0.07"), Some(Money::from_minor(-7)));
        assert_eq!(Money::parse_major("1.234"), None);
        assert_eq!(Money::parse_major("abc"), None);
        assert_eq!(Money::parse_major(""), None);
        assert_eq!(Money::parse_major("99999999999999999999"), None);
    }

    #[test]
    fn sums_signed_amounts() {
        let total: Money = [Money::from_minor(500), Money::from_minor(-200)].iter().sum();
        assert_eq!(total, Money::from_minor(300));
        assert_eq!((-total).abs(), total);
    }
}
