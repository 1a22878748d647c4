use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub fn now_rfc3339() -> String {
    format_rfc3339(OffsetDateTime::now_utc())
}

pub fn now_unix() -> u64 {
    OffsetDateTime::now_utc().unix_timestamp().max(0) as u64
}

pub fn format_rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn parse_rfc3339(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339).ok()
}

/// Seconds since the Unix epoch for an RFC 3339 string; 0 when unparsable or
/// before the epoch.
pub fn rfc3339_to_unix(s: &str) -> u64 {
    parse_rfc3339(s)
        .map(|t| t.unix_timestamp().max(0) as u64)
        .unwrap_or(0)
}

pub fn unix_to_rfc3339(secs: u64) -> String {
    let secs = i64::try_from(secs).unwrap_or(i64::MAX);
    match OffsetDateTime::from_unix_timestamp(secs) {
        Ok(t) => format_rfc3339(t),
        Err(_) => format_rfc3339(OffsetDateTime::UNIX_EPOCH),
    }
}
