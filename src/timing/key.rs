//! Reading identity: which passage a timing table belongs to.
//!
//! A [`ReadingKey`] is everything a [`TimingProvider`] needs to resolve one
//! table: the reading id, the liturgical section it belongs to and the
//! calendar date it is read on.
//!
//! [`TimingProvider`]: crate::provider::TimingProvider

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ReadingCategory
// ---------------------------------------------------------------------------

/// Section of the daily readings a passage comes from.
///
/// Serialised in camelCase (`"firstReading"`, `"psalm"`, …) to match the
/// timing-data wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadingCategory {
    FirstReading,
    Psalm,
    /// Only present on Sundays and solemnities.
    SecondReading,
    Gospel,
}

impl ReadingCategory {
    /// Wire / path name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingCategory::FirstReading => "firstReading",
            ReadingCategory::Psalm => "psalm",
            ReadingCategory::SecondReading => "secondReading",
            ReadingCategory::Gospel => "gospel",
        }
    }
}

impl fmt::Display for ReadingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingCategory {
    type Err = KeyParseError;

    /// Accepts the wire name plus a few short aliases (`first`, `second`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "firstReading" | "first" => Ok(ReadingCategory::FirstReading),
            "psalm" => Ok(ReadingCategory::Psalm),
            "secondReading" | "second" => Ok(ReadingCategory::SecondReading),
            "gospel" => Ok(ReadingCategory::Gospel),
            other => Err(KeyParseError::UnknownCategory(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ReadingDate
// ---------------------------------------------------------------------------

/// Calendar date in ISO `YYYY-MM-DD` form.
///
/// ```
/// use highlight_sync::timing::ReadingDate;
///
/// let date: ReadingDate = "2024-02-29".parse().unwrap();
/// assert_eq!(date.to_string(), "2024-02-29");
/// assert!("2023-02-29".parse::<ReadingDate>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReadingDate {
    year: u16,
    month: u8,
    day: u8,
}

impl ReadingDate {
    /// Build a date, rejecting impossible month/day combinations.
    pub fn new(year: u16, month: u8, day: u8) -> Result<Self, KeyParseError> {
        if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
            return Err(KeyParseError::InvalidDate(format!(
                "{year:04}-{month:02}-{day:02}"
            )));
        }
        Ok(Self { year, month, day })
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn day(&self) -> u8 {
        self.day
    }
}

fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

impl fmt::Display for ReadingDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for ReadingDate {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || KeyParseError::InvalidDate(s.to_string());

        // Exactly `YYYY-MM-DD`: ten bytes, dashes at 4 and 7.
        let bytes = s.as_bytes();
        if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
            return Err(invalid());
        }

        let digits = |range: std::ops::Range<usize>| -> Result<u16, KeyParseError> {
            let part = &s[range];
            if !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse::<u16>().map_err(|_| invalid())
        };

        let year = digits(0..4)?;
        let month = digits(5..7)? as u8;
        let day = digits(8..10)? as u8;

        Self::new(year, month, day).map_err(|_| invalid())
    }
}

impl Serialize for ReadingDate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReadingDate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// ReadingKey
// ---------------------------------------------------------------------------

/// Identifies one timing table: reading id + category + date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingKey {
    pub reading_id: String,
    pub category: ReadingCategory,
    pub date: ReadingDate,
}

impl ReadingKey {
    pub fn new(reading_id: impl Into<String>, category: ReadingCategory, date: ReadingDate) -> Self {
        Self {
            reading_id: reading_id.into(),
            category,
            date,
        }
    }
}

impl fmt::Display for ReadingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.date, self.category, self.reading_id)
    }
}

// ---------------------------------------------------------------------------
// KeyParseError
// ---------------------------------------------------------------------------

/// Errors from parsing the parts of a [`ReadingKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    #[error("invalid date (expected YYYY-MM-DD): {0}")]
    InvalidDate(String),

    #[error("unknown reading category: {0}")]
    UnknownCategory(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
