//! Retention strings ("24h", "5w") and the per-cadence policy built from them.
//!
//! Everything is expressed in minutes so it compares directly against file
//! and object modification times. Zero means keep forever.

use crate::cadence::Cadence;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

const MINUTES_PER_HOUR: u64 = 60;
const MINUTES_PER_DAY: u64 = 24 * MINUTES_PER_HOUR;
const MINUTES_PER_WEEK: u64 = 7 * MINUTES_PER_DAY;
const MINUTES_PER_MONTH: u64 = 31 * MINUTES_PER_DAY;
const MINUTES_PER_YEAR: u64 = 365 * MINUTES_PER_DAY;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TtlError {
    #[error("retention value is empty")]
    Empty,

    #[error("retention '{0}' must start with a non-negative integer")]
    MissingNumber(String),

    #[error("retention '{0}' has no unit (use m, h, d, w, M or y)")]
    MissingUnit(String),

    #[error("retention '{value}' has unknown unit '{unit}' (use m, h, d, w, M or y)")]
    UnknownUnit { value: String, unit: String },

    #[error("retention '{0}' is too large")]
    Overflow(String),
}

/// Parse `<non-negative integer><unit>` into minutes.
///
/// Units: `m` minutes, `h` hours, `d` days, `w` weeks, `M` months (31 days),
/// `y` years (365 days). Whitespace between number and unit is allowed.
/// `0`, with or without a unit, means unlimited and yields `0`.
pub fn parse_ttl(input: &str) -> Result<u64, TtlError> {
    let value = input.trim();
    if value.is_empty() {
        return Err(TtlError::Empty);
    }

    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, rest) = value.split_at(digits_end);
    if digits.is_empty() {
        return Err(TtlError::MissingNumber(value.to_string()));
    }

    let amount: u64 = digits
        .parse()
        .map_err(|_| TtlError::Overflow(value.to_string()))?;
    let unit = rest.trim_start();

    if unit.is_empty() {
        return if amount == 0 {
            Ok(0)
        } else {
            Err(TtlError::MissingUnit(value.to_string()))
        };
    }

    let factor = match unit {
        "m" => 1,
        "h" => MINUTES_PER_HOUR,
        "d" => MINUTES_PER_DAY,
        "w" => MINUTES_PER_WEEK,
        "M" => MINUTES_PER_MONTH,
        "y" => MINUTES_PER_YEAR,
        other => {
            return Err(TtlError::UnknownUnit {
                value: value.to_string(),
                unit: other.to_string(),
            })
        }
    };

    amount
        .checked_mul(factor)
        .ok_or_else(|| TtlError::Overflow(value.to_string()))
}

/// Minutes-to-live for a single cadence. `0` never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ttl(u64);

impl Ttl {
    pub const UNLIMITED: Ttl = Ttl(0);

    pub fn from_minutes(minutes: u64) -> Self {
        Ttl(minutes)
    }

    pub fn minutes(&self) -> u64 {
        self.0
    }

    pub fn is_unlimited(&self) -> bool {
        self.0 == 0
    }

    /// Anything last modified before the returned instant has expired.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_unlimited() {
            return None;
        }
        let minutes = i64::try_from(self.0).ok()?;
        Duration::try_minutes(minutes).and_then(|d| now.checked_sub_signed(d))
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unlimited() {
            f.write_str("unlimited")
        } else {
            write!(f, "{}m", self.0)
        }
    }
}

/// Cadence → minutes-to-live. Cadences without an entry are unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    ttls: BTreeMap<Cadence, Ttl>,
}

impl RetentionPolicy {
    pub fn set(&mut self, cadence: Cadence, ttl: Ttl) {
        self.ttls.insert(cadence, ttl);
    }

    pub fn ttl(&self, cadence: Cadence) -> Ttl {
        self.ttls.get(&cadence).copied().unwrap_or(Ttl::UNLIMITED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_unlimited() {
        assert_eq!(parse_ttl("0"), Ok(0));
        assert_eq!(parse_ttl("0d"), Ok(0));
        assert_eq!(parse_ttl("0 y"), Ok(0));
    }

    #[test]
    fn test_units() {
        assert_eq!(parse_ttl("30m"), Ok(30));
        assert_eq!(parse_ttl("24h"), Ok(1440));
        assert_eq!(parse_ttl("7d"), Ok(10080));
        assert_eq!(parse_ttl("1w"), Ok(10080));
        assert_eq!(parse_ttl("1M"), Ok(44640));
        assert_eq!(parse_ttl("1y"), Ok(525600));
    }

    #[test]
    fn test_whitespace_between_number_and_unit() {
        assert_eq!(parse_ttl(" 2 h "), Ok(120));
    }

    #[test]
    fn test_rejections() {
        assert_eq!(parse_ttl(""), Err(TtlError::Empty));
        assert_eq!(parse_ttl("   "), Err(TtlError::Empty));
        assert!(matches!(parse_ttl("10x"), Err(TtlError::UnknownUnit { .. })));
        assert!(matches!(parse_ttl("h"), Err(TtlError::MissingNumber(_))));
        assert!(matches!(parse_ttl("-5d"), Err(TtlError::MissingNumber(_))));
        assert!(matches!(parse_ttl("12"), Err(TtlError::MissingUnit(_))));
        assert!(matches!(parse_ttl("5dd"), Err(TtlError::UnknownUnit { .. })));
        assert!(matches!(parse_ttl("1.5h"), Err(TtlError::UnknownUnit { .. })));
    }

    #[test]
    fn test_overflow_rejected() {
        assert!(matches!(
            parse_ttl("99999999999999999999y"),
            Err(TtlError::Overflow(_))
        ));
        assert!(matches!(
            parse_ttl("18446744073709551615y"),
            Err(TtlError::Overflow(_))
        ));
    }

    #[test]
    fn test_cutoff() {
        let now = Utc::now();
        assert_eq!(Ttl::UNLIMITED.cutoff(now), None);
        assert_eq!(
            Ttl::from_minutes(90).cutoff(now),
            Some(now - Duration::minutes(90))
        );
    }

    #[test]
    fn test_policy_defaults_to_unlimited() {
        let mut policy = RetentionPolicy::default();
        policy.set(Cadence::Daily, Ttl::from_minutes(1440));
        assert_eq!(policy.ttl(Cadence::Daily).minutes(), 1440);
        assert!(policy.ttl(Cadence::Weekly).is_unlimited());
    }
}
