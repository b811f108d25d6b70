use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d-%H-%M-%S",
];

/// Parse the date strings found in settings, extracted shoreline files and CSVs.
/// Values without an offset are taken as UTC.
pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Two values match when both are dates for the same instant,
/// otherwise when they are equal as values or as text.
pub fn values_match(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(a), Value::String(b)) => strings_match(a, b),
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::Number(b)) | (Value::Number(b), Value::String(a)) => {
            a.trim() == b.to_string()
        }
        _ => left == right,
    }
}

/// String comparison with the same date rule as `values_match`
pub fn strings_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (parse_datetime(a), parse_datetime(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Timestamp used in the names of detection JPEGs
pub fn jpg_timestamp(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d-%H-%M-%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_datetime() {
        let expected = Utc.with_ymd_and_hms(2018, 12, 5, 16, 14, 8).unwrap();
        assert_eq!(parse_datetime("2018-12-05 16:14:08"), Some(expected));
        assert_eq!(parse_datetime("2018-12-05 16:14:8"), Some(expected));
        assert_eq!(parse_datetime("2018-12-05T16:14:08+00:00"), Some(expected));
        assert_eq!(parse_datetime("2018-12-05 16:14:08+00:00"), Some(expected));
        assert_eq!(parse_datetime("2018-12-05 18:14:08+02:00"), Some(expected));
        assert_eq!(parse_datetime("2018-12-05-16-14-08"), Some(expected));
        assert_eq!(
            parse_datetime("2023-01-02"),
            Some(Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_datetime("L8"), None);
        assert_eq!(parse_datetime(""), None);
    }

    #[test]
    fn test_values_match() {
        assert!(values_match(
            &json!("2023-01-02 00:00:00+00:00"),
            &json!("2023-01-02")
        ));
        assert!(values_match(&json!("L8"), &json!("L8")));
        assert!(!values_match(&json!("L8"), &json!("L9")));
        assert!(values_match(&json!(1), &json!(1.0)));
        assert!(values_match(&json!("17"), &json!(17)));
        assert!(!values_match(&json!(null), &json!("L8")));
    }

    #[test]
    fn test_jpg_timestamp() {
        let date = Utc.with_ymd_and_hms(2021, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(jpg_timestamp(&date), "2021-01-01-12-00-00");
    }
}
