//! Calendar-month arithmetic and timestamp parsing.
//!
//! Cohort and timeline bucketing work on whole calendar months. A
//! `YearMonth` renders as `YYYY-MM`, which is also its wire format.

use crate::error::{AnalyticsError, AnalyticsResult};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        debug_assert!((1..=12).contains(&month), "month out of range: {month}");
        Self { year, month }
    }

    pub fn of(ts: &NaiveDateTime) -> Self {
        Self::new(ts.year(), ts.month())
    }

    /// Whole calendar months from `earlier` to `self`. Negative when `self`
    /// precedes `earlier`.
    pub fn months_since(&self, earlier: &YearMonth) -> i64 {
        (self.year as i64 - earlier.year as i64) * 12 + (self.month as i64 - earlier.month as i64)
    }

    /// Days between the first days of the two months, divided by 30.
    /// Kept only for comparing against outputs produced with the day-count rule;
    /// it undercounts gaps that start at February and overcounts long gaps.
    pub fn thirty_day_buckets_since(&self, earlier: &YearMonth) -> i64 {
        let days = (self.first_day() - earlier.first_day()).num_days();
        days.div_euclid(30)
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || AnalyticsError::DataQuality(format!("invalid month label '{s}'"));
        let (y, m) = s.split_once('-').ok_or_else(bad)?;
        let year: i32 = y.parse().map_err(|_| bad())?;
        let month: u32 = m.parse().map_err(|_| bad())?;
        if !(1..=12).contains(&month) {
            return Err(bad());
        }
        Ok(Self { year, month })
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a source timestamp. Empty strings are treated as missing.
pub fn parse_timestamp(raw: &str) -> AnalyticsResult<Option<NaiveDateTime>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(Some(ts));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0));
    }
    Err(AnalyticsError::DataQuality(format!("unparseable timestamp '{raw}'")))
}
