//! Calendar-month keys.
//!
//! Monthly aggregates, incidents and invoices are keyed by the first day of
//! their month. `MonthDate` only ever holds such a date.

use std::fmt;

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonthError {
    #[error("month must match YYYY-MM-01, got {0:?}")]
    Format(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthDate(NaiveDate);

impl MonthDate {
    /// Accepts `YYYY-MM-01` and the shorthand `YYYY-MM`.
    pub fn parse(raw: &str) -> Result<Self, MonthError> {
        let trimmed = raw.trim();
        let candidate = match trimmed.len() {
            7 => format!("{trimmed}-01"),
            10 => trimmed.to_string(),
            _ => return Err(MonthError::Format(raw.to_string())),
        };
        let date = NaiveDate::parse_from_str(&candidate, "%Y-%m-%d")
            .map_err(|_| MonthError::Format(raw.to_string()))?;
        if date.day() != 1 {
            return Err(MonthError::Format(raw.to_string()));
        }
        Ok(Self(date))
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self(date.with_day(1).unwrap_or(date))
    }

    pub fn first_day(self) -> NaiveDate {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + Months::new(1))
    }

    /// Exclusive upper bound, the first day of the following month.
    pub fn end_exclusive(self) -> NaiveDate {
        self.next().0
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.0 && date < self.end_exclusive()
    }

    pub fn start_datetime(self) -> NaiveDateTime {
        self.0.and_hms_opt(0, 0, 0).unwrap_or_default()
    }

    pub fn end_datetime(self) -> NaiveDateTime {
        self.end_exclusive().and_hms_opt(0, 0, 0).unwrap_or_default()
    }

    /// `YYYY-MM`, used in storage keys and file names.
    pub fn short(self) -> String {
        self.0.format("%Y-%m").to_string()
    }
}

impl fmt::Display for MonthDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl From<MonthDate> for NaiveDate {
    fn from(value: MonthDate) -> Self {
        value.0
    }
}

impl Serialize for MonthDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        MonthDate::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_and_short_forms() {
        let canonical = MonthDate::parse("2024-03-01").unwrap();
        let short = MonthDate::parse("2024-03").unwrap();
        assert_eq!(canonical, short);
        assert_eq!(canonical.to_string(), "2024-03-01");
        assert_eq!(canonical.short(), "2024-03");
    }

    #[test]
    fn rejects_mid_month_and_garbage() {
        assert!(MonthDate::parse("2024-03-15").is_err());
        assert!(MonthDate::parse("2024-13-01").is_err());
        assert!(MonthDate::parse("march").is_err());
        assert!(MonthDate::parse("").is_err());
    }

    #[test]
    fn december_rolls_into_next_year() {
        let december = MonthDate::parse("2023-12-01").unwrap();
        assert_eq!(
            december.end_exclusive(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
        assert!(december.contains(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()));
        assert!(!december.contains(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
    }

    #[test]
    fn deserializes_from_json_string() {
        let month: MonthDate = serde_json::from_str("\"2024-02\"").unwrap();
        assert_eq!(month.first_day(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert!(serde_json::from_str::<MonthDate>("\"2024-02-10\"").is_err());
    }
}
