/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}

/// Markers the feed (and most CSV writers) use for an empty value.
const NULL_MARKERS: &[&str] = &["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

pub fn is_null(raw: &str) -> bool {
    NULL_MARKERS.contains(&clean_str(raw))
}

/// Numeric coercion: anything that is not a finite number is missing.
pub fn parse_f64(raw: &str) -> Option<f64> {
    clean_str(raw)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_quotes_and_whitespace() {
        assert_eq!(clean_str("  \"Peru\" "), "Peru");
        assert_eq!(clean_str("\""), "\"");
    }

    #[test]
    fn null_markers() {
        assert!(is_null(""));
        assert!(is_null("  NaN "));
        assert!(!is_null("0"));
    }

    #[test]
    fn numeric_coercion_never_raises() {
        assert_eq!(parse_f64("12.5"), Some(12.5));
        assert_eq!(parse_f64("-3"), Some(-3.0));
        assert_eq!(parse_f64("abc"), None);
        assert_eq!(parse_f64("inf"), None);
        assert_eq!(parse_f64(""), None);
    }
}
