//! Date parsing and the `DD/MM/YYYY HH:MM` display format.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};

pub const DISPLAY_FORMAT: &str = "%d/%m/%Y %H:%M";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

/// Parse date-time text typed or pasted into a cell.
///
/// Accepts RFC 3339 (offsets are folded into UTC), ISO 8601 without an
/// offset, date-only text (midnight), and day-first `D/M/YYYY H:MM`.
pub fn parse_date_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .map(|d| d.and_time(NaiveTime::MIN))
}

pub fn format_display(dt: &NaiveDateTime) -> String {
    dt.format(DISPLAY_FORMAT).to_string()
}

/// Week label derived from an entry date: ISO week, two digits, with the
/// year appended when the date falls in a later calendar year than `today`.
pub fn week_label(date: NaiveDate, today: NaiveDate) -> String {
    let week = date.iso_week().week();
    if date.year() > today.year() {
        format!("{:02}/{}", week, date.year())
    } else {
        format!("{:02}", week)
    }
}

/// First `DD/MM/YYYY` date found anywhere in free text.
pub fn find_day_first_date(text: &str) -> Option<NaiveDate> {
    let bytes = text.as_bytes();
    if bytes.len() < 10 {
        return None;
    }
    (0..=bytes.len() - 10).find_map(|i| {
        let window = text.get(i..i + 10)?;
        let b = window.as_bytes();
        let shaped = b[2] == b'/'
            && b[5] == b'/'
            && [0, 1, 3, 4, 6, 7, 8, 9].iter().all(|&j| b[j].is_ascii_digit());
        if !shaped {
            return None;
        }
        NaiveDate::parse_from_str(window, "%d/%m/%Y").ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn test_parse_iso_and_rfc3339() {
        assert_eq!(parse_date_text("2024-01-10T09:00"), Some(dt(2024, 1, 10, 9, 0)));
        assert_eq!(parse_date_text("2024-01-10T09:00:00.000"), Some(dt(2024, 1, 10, 9, 0)));
        assert_eq!(parse_date_text("2024-01-10T09:00:00+02:00"), Some(dt(2024, 1, 10, 7, 0)));
        assert_eq!(parse_date_text("2024-01-10T09:00:00Z"), Some(dt(2024, 1, 10, 9, 0)));
    }

    #[test]
    fn test_date_only_is_midnight() {
        assert_eq!(parse_date_text("2024-03-05"), Some(dt(2024, 3, 5, 0, 0)));
        assert_eq!(parse_date_text("05/03/2024"), Some(dt(2024, 3, 5, 0, 0)));
    }

    #[test]
    fn test_day_first_with_time() {
        assert_eq!(parse_date_text("5/3/2024 8:30"), Some(dt(2024, 3, 5, 8, 30)));
        assert_eq!(parse_date_text(" 25/12/2024 17:05 "), Some(dt(2024, 12, 25, 17, 5)));
    }

    #[test]
    fn test_garbage_rejected() {
        assert_eq!(parse_date_text("next tuesday"), None);
        assert_eq!(parse_date_text("31/02/2024 10:00"), None);
        assert_eq!(parse_date_text("   "), None);
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let d = dt(2024, 1, 10, 9, 0);
        let text = format_display(&d);
        assert_eq!(text, "10/01/2024 09:00");
        assert_eq!(parse_date_text(&text), Some(d));
    }

    #[test]
    fn test_week_label() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let jan = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        assert_eq!(week_label(jan, today), "02");
        let next_year = NaiveDate::from_ymd_opt(2025, 4, 9).unwrap();
        assert_eq!(week_label(next_year, today), "15/2025");
    }

    #[test]
    fn test_find_day_first_date() {
        assert_eq!(
            find_day_first_date("avant le 03/04/2024 ou 20000 kms"),
            NaiveDate::from_ymd_opt(2024, 4, 3)
        );
        assert_eq!(find_day_first_date("20000 kms"), None);
        assert_eq!(find_day_first_date("é 1/2/2024"), None);
    }
}
