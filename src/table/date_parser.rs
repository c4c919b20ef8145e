use chrono::{NaiveDate, NaiveDateTime};

use super::utils::clean_str;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];

/// Coerce a date cell to a calendar day. Unparseable input is `None`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = clean_str(s);
    if s.is_empty() {
        return None;
    }
    // fast path for the feed's own `YYYY-MM-DD`
    let b = s.as_bytes();
    if b.len() == 10 && b[4] == b'-' && b[7] == b'-' {
        let year: i32 = s[0..4].parse().ok()?;
        let month: u32 = s[5..7].parse().ok()?;
        let day: u32 = s[8..10].parse().ok()?;
        if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(d);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_feed_and_fallback_formats() {
        let d = NaiveDate::from_ymd_opt(2021, 3, 7).unwrap();
        assert_eq!(parse_date("2021-03-07"), Some(d));
        assert_eq!(parse_date("\"2021-03-07\""), Some(d));
        assert_eq!(parse_date("2021/03/07"), Some(d));
        assert_eq!(parse_date("2021-03-07 10:11:12"), Some(d));
    }

    #[test]
    fn garbage_is_missing() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("2021-13-01"), None);
        assert_eq!(parse_date("yesterday"), None);
    }
}
