//! Input checks shared by the engine and the HTTP layer.

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Url;

/// Syntactic email check: one `@`, non-empty local part, dotted domain,
/// no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

/// Accept an RFC 3339 timestamp or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_booking_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Any absolute URL, including app schemes such as `exp://`.
pub fn is_valid_base_url(raw: &str) -> bool {
    Url::parse(raw).is_ok()
}

/// `{base}/r/{code}`. This path shape is embedded in links already handed
/// out and must not change.
pub fn referral_link(base_url: &str, code: &str) -> String {
    format!("{}/r/{}", base_url.trim_end_matches('/'), code)
}

/// Trimmed value, `None` when empty.
pub fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}
