use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

const MINOR_PER_MAJOR: f64 = 100.0;

/// Fixed-point currency amount in minor units (cents).
///
/// Serialized as a decimal number of major units, e.g. `12.34`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Rounds to the nearest minor unit; `None` for NaN/infinite input
    pub fn from_major(major: f64) -> Option<Self> {
        if !major.is_finite() {
            return None;
        }
        Some(Money((major * MINOR_PER_MAJOR).round() as i64))
    }

    pub fn minor(&self) -> i64 {
        self.0
    }

    pub fn to_major(&self) -> f64 {
        self.0 as f64 / MINOR_PER_MAJOR
    }

    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// `self * percent / 100`, rounded to the nearest minor unit
    pub fn percent(&self, percent: f64) -> Self {
        Money((self.0 as f64 * percent / 100.0).round() as i64)
    }
}

impl TryFrom<f64> for Money {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Money::from_major(value).ok_or_else(|| format!("invalid amount {}", value))
    }
}

impl From<Money> for f64 {
    fn from(money: Money) -> f64 {
        money.to_major()
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_minor(30000).to_string(), "300.00");
        assert_eq!(Money::from_minor(-5).to_string(), "-0.05");
        assert_eq!(Money::from_minor(1234).to_string(), "12.34");
    }

    #[test]
    fn test_from_major_rounds() {
        assert_eq!(Money::from_major(0.1 + 0.2), Some(Money::from_minor(30)));
        assert_eq!(Money::from_major(19.999), Some(Money::from_minor(2000)));
        assert_eq!(Money::from_major(f64::NAN), None);
    }

    #[test]
    fn test_json_as_decimal() {
        let money: Money = serde_json::from_str("900.5").unwrap();
        assert_eq!(money.minor(), 90050);
        assert_eq!(serde_json::to_string(&money).unwrap(), "900.5");
    }

    #[test]
    fn test_percent() {
        assert_eq!(Money::from_minor(10000).percent(33.333), Money::from_minor(3333));
    }
}
