//! PDF date strings (`D:YYYYMMDDHHmmSS+HH'mm'`), formatting and parsing.

use time::{Date, Month, OffsetDateTime, Time, UtcOffset};

/// Formats a timestamp the way `/CreationDate` and `/ModDate` expect it
pub fn to_pdf_timestamp(date: &OffsetDateTime) -> String {
    let offset = date.offset();
    let offset_sign = if offset.is_negative() { '-' } else { '+' };
    format!(
        "D:{:04}{:02}{:02}{:02}{:02}{:02}{offset_sign}{:02}'{:02}'",
        date.year(),
        u8::from(date.month()),
        date.day(),
        date.hour(),
        date.minute(),
        date.second(),
        offset.whole_hours().abs(),
        offset.minutes_past_hour().abs(),
    )
}

/// Parses a PDF date string (e.g. `D:20170505150224+02'00'`).
/// The timezone suffix is optional and ignored beyond the sign.
pub fn parse_pdf_date(s: &str) -> Option<OffsetDateTime> {
    let s = s.strip_prefix("D:").unwrap_or(s);
    if s.len() < 14 {
        return None;
    }
    let year: i32 = s[0..4].parse().ok()?;
    let month: u8 = s[4..6].parse().ok()?;
    let day: u8 = s[6..8].parse().ok()?;
    let hour: u8 = s[8..10].parse().ok()?;
    let minute: u8 = s[10..12].parse().ok()?;
    let second: u8 = s[12..14].parse().ok()?;
    let month = Month::try_from(month).ok()?;

    Some(OffsetDateTime::new_in_offset(
        Date::from_calendar_date(year, month, day).ok()?,
        Time::from_hms(hour, minute, second).ok()?,
        UtcOffset::UTC,
    ))
}
