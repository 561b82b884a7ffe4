//! Day-first date parsing for free-form spreadsheet text.

use chrono::NaiveDate;

/// Cell values treated as "no value" (compared case-insensitively).
const MISSING_TOKENS: [&str; 6] = ["", "na", "n/a", "null", "none", "nan"];

/// Parse a date written with day-first component ordering.
///
/// Accepted shapes: `DD/MM/YYYY`, `DD-MM-YYYY`, `DD.MM.YYYY`, `DD/MM/YY`, and
/// ISO-like `YYYY-MM-DD` / `YYYY/MM/DD`. A trailing time part
/// (`05/01/2024 13:00`, `2024-01-05T00:00:00`) is ignored. Empty text, missing
/// tokens and anything unparseable yield `None`.
pub fn parse_day_first(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if is_missing_token(trimmed) {
        return None;
    }

    let date_part = trimmed.split([' ', 'T']).next()?;
    parse_components(date_part)
}

pub fn is_missing_token(text: &str) -> bool {
    let text = text.trim();
    MISSING_TOKENS.iter().any(|t| text.eq_ignore_ascii_case(t))
}

/// Four-digit-year day-first layouts.
const DAY_FIRST: [&str; 3] = ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];
/// Two-digit-year day-first layouts; chrono's `%y` puts 70-99 in the 1900s.
const DAY_FIRST_SHORT_YEAR: [&str; 3] = ["%d/%m/%y", "%d-%m-%y", "%d.%m.%y"];
const YEAR_FIRST: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

fn parse_components(text: &str) -> Option<NaiveDate> {
    // `%Y` accepts any number of digits, so pick the layouts by the width of
    // the year component before handing the text to chrono.
    let leading = text.bytes().take_while(u8::is_ascii_digit).count();
    let trailing = text.bytes().rev().take_while(u8::is_ascii_digit).count();

    let formats: &[&str] = match (leading, trailing) {
        (4, 1..=2) => &YEAR_FIRST,
        (1..=2, 4) => &DAY_FIRST,
        (1..=2, 2) => &DAY_FIRST_SHORT_YEAR,
        _ => return None,
    };

    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
}
