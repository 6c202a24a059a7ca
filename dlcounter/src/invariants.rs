use std::str::FromStr;

use chrono::{
    DateTime, NaiveDateTime, Utc,
    format::{Fixed, Item, StrftimeItems},
};
use derive_more::{AsRef, Debug, Display};

/// Aggregation key: the requested path relative to the configured prefix.
#[derive(Debug, Display, AsRef, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(String);

impl FileId {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for FileId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("file identifier cannot be empty".into());
        }
        Ok(Self(s.into()))
    }
}

/// Request time, normalised to UTC with whole-second precision.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Parses the bracketed log time with a strftime format. Formats without
    /// an offset are read as UTC.
    pub fn parse(raw: &str, format: &str) -> Option<Self> {
        if has_offset(format) {
            return DateTime::parse_from_str(raw, format)
                .ok()
                .map(|dt| dt.with_timezone(&Utc).into());
        }
        NaiveDateTime::parse_from_str(raw, format)
            .ok()
            .map(|naive| naive.and_utc().into())
    }

    pub fn from_unix(secs: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp(secs, 0).map(Self)
    }

    pub fn unix(self) -> i64 {
        self.0.timestamp()
    }

    pub fn into_utc(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(DateTime::<Utc>::from_timestamp(value.timestamp(), 0).unwrap_or(value))
    }
}

/// True when `format` reads a UTC offset, so a time without one is malformed.
fn has_offset(format: &str) -> bool {
    StrftimeItems::new(format).any(|item| {
        matches!(
            item,
            Item::Fixed(
                Fixed::TimezoneOffset
                    | Fixed::TimezoneOffsetColon
                    | Fixed::TimezoneOffsetDoubleColon
                    | Fixed::TimezoneOffsetTripleColon
                    | Fixed::TimezoneOffsetColonZ
                    | Fixed::TimezoneOffsetZ
                    | Fixed::RFC2822
                    | Fixed::RFC3339
            )
        )
    })
}
