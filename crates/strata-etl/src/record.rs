//! The fixed eight-column record model.
//!
//! `c6` and `c7` are dates parsed best-effort: a value that does not parse
//! becomes [`DateField::Unparseable`] instead of failing the file. Every other
//! column is an optional string, with an empty source field meaning null.

use chrono::{NaiveDate, NaiveDateTime};

/// Column names in source-file order.
pub const COLUMN_NAMES: [&str; 8] = ["c1", "c2", "c3", "c4", "c5", "c6", "c7", "c8"];

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// A best-effort parsed date column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DateField {
    /// A calendar date.
    Parsed(NaiveDate),
    /// The source value was missing or not a recognisable date.
    Unparseable,
}

impl DateField {
    /// Parses a raw column value.
    ///
    /// Accepts `YYYY-MM-DD` and `YYYY-MM-DD[ T]HH:MM:SS[.fff]` (keeping the
    /// date). Anything else, including a missing value, is `Unparseable`.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::Unparseable;
        };

        if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
            return Self::Parsed(date);
        }
        DATETIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map_or(Self::Unparseable, |dt| Self::Parsed(dt.date()))
    }

    /// Returns the date, if parsed.
    #[must_use]
    pub fn date(self) -> Option<NaiveDate> {
        match self {
            Self::Parsed(date) => Some(date),
            Self::Unparseable => None,
        }
    }
}

impl From<NaiveDate> for DateField {
    fn from(date: NaiveDate) -> Self {
        Self::Parsed(date)
    }
}

impl From<Option<NaiveDate>> for DateField {
    fn from(date: Option<NaiveDate>) -> Self {
        date.map_or(Self::Unparseable, Self::Parsed)
    }
}

/// One source record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub struct Record {
    pub c1: Option<String>,
    pub c2: Option<String>,
    pub c3: Option<String>,
    pub c4: Option<String>,
    pub c5: Option<String>,
    pub c6: DateField,
    pub c7: DateField,
    pub c8: Option<String>,
}

impl Record {
    /// Builds a record from raw column values in source order.
    #[must_use]
    pub fn from_raw(columns: [Option<&str>; 8]) -> Self {
        let [c1, c2, c3, c4, c5, c6, c7, c8] = columns;
        let owned = |v: Option<&str>| v.map(str::to_string);
        Self {
            c1: owned(c1),
            c2: owned(c2),
            c3: owned(c3),
            c4: owned(c4),
            c5: owned(c5),
            c6: DateField::parse(c6),
            c7: DateField::parse(c7),
            c8: owned(c8),
        }
    }

    /// Returns the composite deduplication key (`c1`, `c7`, `c8`).
    #[must_use]
    pub fn dedup_key(&self) -> DedupKey<'_> {
        DedupKey {
            c1: self.c1.as_deref(),
            c7: self.c7,
            c8: self.c8.as_deref(),
        }
    }
}

/// Composite key identifying one logical record across duplicate occurrences.
///
/// Nulls compare equal to each other, so two records that both lack `c8`
/// collide if `c1` and `c7` match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey<'a> {
    /// Business identifier.
    pub c1: Option<&'a str>,
    /// Partition date.
    pub c7: DateField,
    /// Discriminator.
    pub c8: Option<&'a str>,
}
