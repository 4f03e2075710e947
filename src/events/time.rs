use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse a Teamwork timestamp such as `2024-01-05T10:00:00Z`.
///
/// The trailing `Z` is rewritten to `+00:00` before RFC 3339 parsing. Offsetless
/// values are read as UTC.
pub fn parse_upstream_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalized = match trimmed.strip_suffix(['Z', 'z']) {
        Some(head) => format!("{head}+00:00"),
        None => trimmed.to_string(),
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Like [`parse_upstream_timestamp`], falling back to the current time.
pub fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(parse_upstream_timestamp)
        .unwrap_or_else(Utc::now)
}
