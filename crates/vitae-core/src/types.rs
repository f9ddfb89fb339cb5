//! Value types shared between the stores, the search evaluator and the
//! notification senders.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Browser push subscription as handed over by the service worker.
///
/// Stored verbatim as JSON on the user row and forwarded untouched to the
/// push relay, so field names follow the W3C `PushSubscription` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(
        rename = "expirationTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expiration_time: Option<String>,
    pub keys: PushKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Inclusive calendar-day window used by event-style searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// 00:00:00 UTC on the first day.
    pub fn start_of_window(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// 00:00:00 UTC on the day after the last day. Exclusive upper bound,
    /// so every instant of the last day is inside the window.
    pub fn after_window(&self) -> DateTime<Utc> {
        let next = self.end.succ_opt().unwrap_or(NaiveDate::MAX);
        next.and_time(NaiveTime::MIN).and_utc()
    }

    pub fn is_single_day(&self) -> bool {
        self.start == self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_bounds_cover_whole_days() {
        let w = DateWindow::new(
            NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 5, 3).unwrap(),
        );
        assert_eq!(w.start_of_window().to_rfc3339(), "2026-05-01T00:00:00+00:00");
        assert_eq!(w.after_window().to_rfc3339(), "2026-05-04T00:00:00+00:00");
        assert!(!w.is_single_day());
    }

    #[test]
    fn last_second_of_the_window_is_inside() {
        let day = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        let w = DateWindow::new(day, day);
        let late = day.and_hms_milli_opt(23, 59, 59, 500).unwrap().and_utc();
        assert!(late >= w.start_of_window());
        assert!(late < w.after_window());
        assert_eq!(w.after_window().to_rfc3339(), "2027-01-01T00:00:00+00:00");
    }

    #[test]
    fn subscription_uses_browser_field_names() {
        let json = r#"{"endpoint":"https://push.example/abc","expirationTime":null,
                       "keys":{"p256dh":"pk","auth":"au"}}"#;
        let sub: PushSubscription = serde_json::from_str(json).unwrap();
        assert_eq!(sub.keys.auth, "au");
        assert!(sub.expiration_time.is_none());
        let back = serde_json::to_value(&sub).unwrap();
        assert!(back.get("expirationTime").is_none());
    }
}
