//! HL7 date values (`YYYY[MM[DD]]`) and timestamp formatting.

use time::macros::format_description;
use time::{Date, Month, OffsetDateTime};

/// A calendar date at the precision it was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialDate {
    /// `YYYY`.
    Year(i32),
    /// `YYYYMM`.
    YearMonth(i32, Month),
    /// `YYYYMMDD`.
    Day(Date),
}

impl PartialDate {
    /// Parses an HL7 `DT` value, validating it against the calendar.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        if !value.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        let year = value.get(0..4)?.parse::<i32>().ok()?;
        let month = || {
            value
                .get(4..6)
                .and_then(|digits| digits.parse::<u8>().ok())
                .and_then(|number| Month::try_from(number).ok())
        };
        match value.len() {
            4 => Some(Self::Year(year)),
            6 => Some(Self::YearMonth(year, month()?)),
            8 => {
                let day = value.get(6..8)?.parse::<u8>().ok()?;
                Date::from_calendar_date(year, month()?, day)
                    .ok()
                    .map(Self::Day)
            }
            _ => None,
        }
    }

    /// Whether `date` falls inside this value at its precision.
    #[must_use]
    pub fn contains(&self, date: Date) -> bool {
        match *self {
            Self::Year(year) => date.year() == year,
            Self::YearMonth(year, month) => date.year() == year && date.month() == month,
            Self::Day(day) => date == day,
        }
    }
}

/// Whether `value` is a valid HL7 date: `YYYY`, `YYYYMM` or `YYYYMMDD`.
#[must_use]
pub fn is_hl7_date(value: &str) -> bool {
    PartialDate::parse(value).is_some()
}

/// Formats a date as `YYYYMMDD`.
#[must_use]
pub fn format_date(date: Date) -> String {
    date.format(format_description!("[year][month][day]"))
        .unwrap_or_default()
}

/// Formats a UTC instant as an HL7 `DTM` value, `YYYYMMDDHHMMSS`.
#[must_use]
pub fn format_timestamp(instant: OffsetDateTime) -> String {
    instant
        .format(format_description!(
            "[year][month][day][hour][minute][second]"
        ))
        .unwrap_or_default()
}
