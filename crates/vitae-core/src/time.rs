//! Timestamps are stored as RFC 3339 UTC text with fixed millisecond
//! precision (`2026-10-16T08:00:00.000Z`) so that SQL string comparison
//! orders them chronologically.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;

pub fn encode(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn decode(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Read a NOT NULL timestamp column.
pub fn column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    decode(&raw).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a nullable timestamp column.
pub fn column_opt(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        decode(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn encoding_is_fixed_width_and_sortable() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let b = a + Duration::milliseconds(1);
        let c = a + Duration::days(400);
        assert_eq!(encode(a), "2026-01-02T03:04:05.000Z");
        assert_eq!(encode(a).len(), encode(c).len());
        assert!(encode(a) < encode(b));
        assert!(encode(b) < encode(c));
    }

    #[test]
    fn decode_accepts_offsets() {
        let ts = decode("2026-01-02T05:04:05+02:00").unwrap();
        assert_eq!(encode(ts), "2026-01-02T03:04:05.000Z");
    }
}
