//! Timestamp helpers.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// RFC 3339 with millisecond precision and a `Z` suffix, as sent on the wire.
#[must_use]
pub fn to_wire(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// [`to_wire`] applied to [`now`].
#[must_use]
pub fn now_wire() -> String {
    to_wire(now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn wire_format_uses_millis_and_z() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(to_wire(ts), "2026-01-02T03:04:05.000Z");
    }

    #[test]
    fn now_wire_parses_back() {
        let s = now_wire();
        assert!(DateTime::parse_from_rfc3339(&s).is_ok());
    }
}
