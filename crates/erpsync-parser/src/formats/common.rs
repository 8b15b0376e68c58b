use chrono::{NaiveDate, NaiveDateTime};

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: [&str; 4] = [
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse a date as the ERP and the curated files write it. The ERP emits
/// day-first dates (`15/06/2024`), sometimes with a time part; curated files
/// use ISO dates.
pub fn parse_erp_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }

    let without_fraction = trimmed.split('.').next().unwrap_or(trimmed);
    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(without_fraction, format) {
            return Some(ts.date());
        }
    }

    None
}

/// Date parameter format expected by the sales endpoint (`MM/DD/YYYY`).
pub fn format_api_date(date: NaiveDate) -> String {
    date.format("%m/%d/%Y").to_string()
}

pub fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = trimmed.parse::<f64>() {
        return value.is_finite().then_some(value);
    }
    // Decimal comma without thousands separators ("12,5").
    if trimmed.matches(',').count() == 1 && !trimmed.contains('.') {
        return trimmed
            .replace(',', ".")
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite());
    }
    None
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "s" | "si" | "y" | "yes" => Some(true),
        "0" | "f" | "false" | "n" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_day_first_and_iso_dates() {
        let expected = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(parse_erp_date("15/06/2024"), Some(expected));
        assert_eq!(parse_erp_date(" 2024-06-15 "), Some(expected));
        assert_eq!(parse_erp_date("15/06/2024 10:32:00"), Some(expected));
        assert_eq!(parse_erp_date("2024-06-15T08:00:00.000"), Some(expected));
        assert_eq!(parse_erp_date("06/15/2024"), None);
        assert_eq!(parse_erp_date(""), None);
    }

    #[test]
    fn api_dates_are_month_first() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 5).unwrap();
        assert_eq!(format_api_date(date), "06/05/2024");
    }

    #[test]
    fn decimals_accept_a_lone_decimal_comma() {
        assert_eq!(parse_decimal("12.50"), Some(12.5));
        assert_eq!(parse_decimal("12,5"), Some(12.5));
        assert_eq!(parse_decimal("1.234,5"), None);
        assert_eq!(parse_decimal("NaN"), None);
    }
}
