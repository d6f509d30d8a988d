//! Conversion between envelope ids (epoch milliseconds) and the ISO-8601
//! `sendTime` strings used by the transport layer.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Errors converting to or from a send time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendTimeError {
    #[error("timestamp out of range: {0}")]
    OutOfRange(i64),
    #[error("unparseable send time: {0}")]
    Unparseable(String),
}

/// Render an epoch-millisecond id as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn to_send_time(id: i64) -> Result<String, SendTimeError> {
    DateTime::<Utc>::from_timestamp_millis(id)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or(SendTimeError::OutOfRange(id))
}

/// Parse a send time back into epoch milliseconds.
///
/// Accepts RFC 3339 with any offset, a date-time without offset (read as
/// UTC), or a bare date (midnight UTC).
pub fn parse_send_time(raw: &str) -> Result<i64, SendTimeError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc().timestamp_millis());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc().timestamp_millis());
        }
    }
    Err(SendTimeError::Unparseable(raw.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_millisecond_utc() {
        assert_eq!(
            to_send_time(1_700_000_001_000).unwrap(),
            "2023-11-14T22:13:21.000Z"
        );
    }

    #[test]
    fn renders_sub_second_part() {
        assert_eq!(to_send_time(1_679_234_567_890).unwrap(), "2023-03-19T14:02:47.890Z");
    }

    #[test]
    fn renders_epoch() {
        assert_eq!(to_send_time(0).unwrap(), "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn out_of_range_id() {
        assert_eq!(to_send_time(i64::MAX), Err(SendTimeError::OutOfRange(i64::MAX)));
    }

    #[test]
    fn round_trip_preserves_id() {
        for id in [0, 1, 999, 1_700_000_000_000, 1_700_000_001_234, 1_679_234_567_890] {
            let rendered = to_send_time(id).unwrap();
            assert_eq!(parse_send_time(&rendered).unwrap(), id, "{rendered}");
        }
    }

    #[test]
    fn parses_offset() {
        let ms = parse_send_time("2023-11-15T01:13:21.000+03:00").unwrap();
        assert_eq!(ms, 1_700_000_001_000);
    }

    #[test]
    fn parses_without_offset_as_utc() {
        let ms = parse_send_time("2023-11-14T22:13:21").unwrap();
        assert_eq!(ms, 1_700_000_001_000);
    }

    #[test]
    fn parses_bare_date() {
        assert_eq!(parse_send_time("1970-01-02").unwrap(), 86_400_000);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_send_time("yesterday"),
            Err(SendTimeError::Unparseable(_))
        ));
    }
}
