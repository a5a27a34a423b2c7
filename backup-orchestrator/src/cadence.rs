//! Backup cadences and the period label each one backs up.

use crate::utils::errors::BackupError;
use chrono::{Datelike, Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Frequency a scheduler invokes the orchestrator with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Cadence {
    pub const ALL: [Cadence; 6] = [
        Cadence::Minutely,
        Cadence::Hourly,
        Cadence::Daily,
        Cadence::Weekly,
        Cadence::Monthly,
        Cadence::Yearly,
    ];

    /// Lowercase name, also used as the cadence subfolder name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Minutely => "minutely",
            Cadence::Hourly => "hourly",
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
            Cadence::Yearly => "yearly",
        }
    }

    /// Uppercase form used inside project config keys.
    pub fn key(&self) -> &'static str {
        match self {
            Cadence::Minutely => "MINUTELY",
            Cadence::Hourly => "HOURLY",
            Cadence::Daily => "DAILY",
            Cadence::Weekly => "WEEKLY",
            Cadence::Monthly => "MONTHLY",
            Cadence::Yearly => "YEARLY",
        }
    }

    /// `BACKUP_FREQUENCY_<CADENCE>`
    pub fn frequency_key(&self) -> String {
        format!("BACKUP_FREQUENCY_{}", self.key())
    }

    /// `TTL_<CADENCE>_BACKUP`
    pub fn ttl_key(&self) -> String {
        format!("TTL_{}_BACKUP", self.key())
    }

    /// Label of the period that closed right before `now`.
    ///
    /// A run fires after the period it backs up has ended, so an hourly run
    /// at 14:03 labels its artifacts with the 13:00 hour.
    pub fn previous_period_label(&self, now: NaiveDateTime) -> String {
        match self {
            Cadence::Minutely => (now - Duration::minutes(1))
                .format("%Y-%m-%d_%H-%M")
                .to_string(),
            Cadence::Hourly => (now - Duration::hours(1))
                .format("%Y-%m-%d_%H-00")
                .to_string(),
            Cadence::Daily => (now.date() - Duration::days(1))
                .format("%Y-%m-%d")
                .to_string(),
            Cadence::Weekly => (now.date() - Duration::weeks(1))
                .format("%G-W%V")
                .to_string(),
            Cadence::Monthly => {
                let (year, month) = if now.month() == 1 {
                    (now.year() - 1, 12)
                } else {
                    (now.year(), now.month() - 1)
                };
                format!("{year:04}-{month:02}")
            }
            Cadence::Yearly => format!("{:04}", now.year() - 1),
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cadence {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Cadence::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| {
                BackupError::Config(format!(
                    "unknown cadence '{s}' (expected minutely, hourly, daily, weekly, monthly or yearly)"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .expect("valid test timestamp")
    }

    #[test]
    fn test_parse_cadence() {
        assert_eq!("daily".parse::<Cadence>().unwrap(), Cadence::Daily);
        assert_eq!(" Hourly ".parse::<Cadence>().unwrap(), Cadence::Hourly);
        assert!("fortnightly".parse::<Cadence>().is_err());
    }

    #[test]
    fn test_config_keys() {
        assert_eq!(Cadence::Daily.frequency_key(), "BACKUP_FREQUENCY_DAILY");
        assert_eq!(Cadence::Monthly.ttl_key(), "TTL_MONTHLY_BACKUP");
    }

    #[test]
    fn test_hourly_labels_previous_hour() {
        let label = Cadence::Hourly.previous_period_label(at(2024, 3, 10, 14, 3));
        assert_eq!(label, "2024-03-10_13-00");
    }

    #[test]
    fn test_hourly_crosses_midnight() {
        let label = Cadence::Hourly.previous_period_label(at(2024, 3, 10, 0, 5));
        assert_eq!(label, "2024-03-09_23-00");
    }

    #[test]
    fn test_minutely_and_daily() {
        let now = at(2024, 3, 1, 0, 0);
        assert_eq!(Cadence::Minutely.previous_period_label(now), "2024-02-29_23-59");
        assert_eq!(Cadence::Daily.previous_period_label(now), "2024-02-29");
    }

    #[test]
    fn test_weekly_uses_iso_week() {
        // 2024-01-08 is Monday of ISO week 2.
        assert_eq!(Cadence::Weekly.previous_period_label(at(2024, 1, 8, 0, 10)), "2024-W01");
        // Previous week of early January can belong to the prior ISO year.
        assert_eq!(Cadence::Weekly.previous_period_label(at(2021, 1, 4, 0, 0)), "2020-W53");
    }

    #[test]
    fn test_monthly_and_yearly() {
        assert_eq!(Cadence::Monthly.previous_period_label(at(2024, 1, 1, 0, 0)), "2023-12");
        assert_eq!(Cadence::Monthly.previous_period_label(at(2024, 7, 15, 8, 0)), "2024-06");
        assert_eq!(Cadence::Yearly.previous_period_label(at(2024, 1, 1, 0, 0)), "2023");
    }
}
