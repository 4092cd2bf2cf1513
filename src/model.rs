use std::collections::HashMap;
use std::path::PathBuf;

use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate, NaiveTime};
use chrono_tz::Tz;

use crate::errors::ConfigError;

/// Recurrence rule deciding whether an entry is due on a calendar date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateMatcher {
    /// Recurs every month on this day (1-31).
    DayOfMonth(u32),
    /// Fires on exactly this date.
    Exact(NaiveDate),
}

impl DateMatcher {
    /// Parses a matcher literal, trying day-of-month first and falling back
    /// to an ISO date. An integer outside 1-31 is an error, not a fallback.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let value = value.trim();
        if let Ok(day) = value.parse::<u32>() {
            if (1..=31).contains(&day) {
                return Ok(DateMatcher::DayOfMonth(day));
            }
            return Err(ConfigError::InvalidDateMatcher(value.to_owned()));
        }
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(DateMatcher::Exact)
            .map_err(|_| ConfigError::InvalidDateMatcher(value.to_owned()))
    }

    pub fn matches(&self, candidate: NaiveDate) -> bool {
        match self {
            DateMatcher::DayOfMonth(day) => candidate.day() == *day,
            DateMatcher::Exact(date) => *date == candidate,
        }
    }
}

pub fn parse_date_matchers(values: &[String]) -> Result<Vec<DateMatcher>, ConfigError> {
    values.iter().map(|value| DateMatcher::parse(value)).collect()
}

/// Where an account's amount comes from: a fixed literal, or a named fetcher
/// invoked with string arguments from the configuration.
#[derive(Debug, Clone)]
pub enum AccountSource {
    Literal(BigDecimal),
    Fetched {
        function: String,
        args: HashMap<String, String>,
    },
}

#[derive(Debug, Clone)]
pub struct AccountSpec {
    pub account: String,
    pub currency: String,
    pub source: AccountSource,
    pub precision: u32,
}

/// A date matcher plus the accounts that are due together when it fires.
#[derive(Debug)]
pub struct AutoBalanceEntry {
    pub matchers: Vec<DateMatcher>,
    pub accounts: Vec<AccountSpec>,
}

impl AutoBalanceEntry {
    pub fn matches(&self, candidate: NaiveDate) -> bool {
        self.matchers.iter().any(|matcher| matcher.matches(candidate))
    }
}

/// Process-wide configuration, constructed once per invocation and read-only
/// afterward. `runtime` is the time-of-day cutoff before which nothing is
/// processed for "today"; daily data sources may not have settled earlier.
#[derive(Debug)]
pub struct AutoBalanceConfig {
    pub entries: Vec<AutoBalanceEntry>,
    pub runtime: NaiveTime,
    pub timezone: Option<Tz>,
    pub default_currency: String,
    pub ledger: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_parse_date_matchers_supports_day_and_iso() {
        let matchers = parse_date_matchers(&["5".into(), "2024-07-15".into()]).unwrap();

        assert_eq!(matchers[0], DateMatcher::DayOfMonth(5));
        assert_eq!(matchers[1], DateMatcher::Exact(date(2024, 7, 15)));
    }

    #[test]
    fn test_parse_date_matcher_accepts_leading_zero_day() {
        assert_eq!(DateMatcher::parse("01").unwrap(), DateMatcher::DayOfMonth(1));
    }

    #[test]
    fn test_parse_date_matcher_rejects_out_of_range_day() {
        assert!(DateMatcher::parse("0").is_err());
        assert!(DateMatcher::parse("32").is_err());
    }

    #[test]
    fn test_parse_date_matcher_rejects_garbage() {
        assert!(DateMatcher::parse("not-a-date").is_err());
        assert!(DateMatcher::parse("2024/07/15").is_err());
    }

    #[test]
    fn test_day_of_month_recurs_monthly() {
        let matcher = DateMatcher::DayOfMonth(15);

        assert!(matcher.matches(date(2024, 7, 15)));
        assert!(matcher.matches(date(2024, 8, 15)));
        assert!(!matcher.matches(date(2024, 7, 16)));
    }

    #[test]
    fn test_exact_date_is_one_shot() {
        let matcher = DateMatcher::Exact(date(2024, 7, 15));

        assert!(matcher.matches(date(2024, 7, 15)));
        assert!(!matcher.matches(date(2024, 8, 15)));
    }

    #[test]
    fn test_entry_matches_any_of_its_matchers() {
        let entry = AutoBalanceEntry {
            matchers: vec![DateMatcher::DayOfMonth(1), DateMatcher::DayOfMonth(15)],
            accounts: Vec::new(),
        };

        assert!(entry.matches(date(2024, 7, 1)));
        assert!(entry.matches(date(2024, 7, 15)));
        assert!(!entry.matches(date(2024, 7, 2)));
    }
}
