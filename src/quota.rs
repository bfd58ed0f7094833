use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use parking_lot::Mutex;
use tracing::warn;

use crate::error::ServiceError;

/// Service-wide daily request budget. One counter for all callers, reset at
/// UTC midnight.
pub struct DailyQuota {
    limit: u32,
    window: Mutex<QuotaWindow>,
}

struct QuotaWindow {
    count: u32,
    resets_at: DateTime<Utc>,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub resets_at: DateTime<Utc>,
}

impl DailyQuota {
    pub fn new(limit: u32) -> Self {
        Self::starting_at(limit, Utc::now())
    }

    pub fn starting_at(limit: u32, now: DateTime<Utc>) -> Self {
        Self {
            limit,
            window: Mutex::new(QuotaWindow {
                count: 0,
                resets_at: next_midnight(now),
            }),
        }
    }

    pub fn try_acquire(&self) -> QuotaDecision {
        self.try_acquire_at(Utc::now())
    }

    pub fn try_acquire_at(&self, now: DateTime<Utc>) -> QuotaDecision {
        let mut window = self.window.lock();
        if now >= window.resets_at {
            window.count = 0;
            window.resets_at = next_midnight(now);
        }
        if window.count >= self.limit {
            return QuotaDecision {
                allowed: false,
                limit: self.limit,
                remaining: 0,
                resets_at: window.resets_at,
            };
        }
        window.count += 1;
        QuotaDecision {
            allowed: true,
            limit: self.limit,
            remaining: self.limit - window.count,
            resets_at: window.resets_at,
        }
    }
}

fn next_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = (now + chrono::Duration::days(1)).date_naive();
    Utc.from_utc_datetime(&tomorrow.and_time(NaiveTime::MIN))
}

/// Admission middleware for the generation routes. Rejected requests never
/// reach a handler; admitted ones get the usual rate limit headers.
pub async fn quota_guard(
    State(quota): State<Arc<DailyQuota>>,
    request: Request,
    next: Next,
) -> Response {
    let decision = quota.try_acquire();
    if !decision.allowed {
        warn!(limit = decision.limit, "daily request limit reached");
        return ServiceError::QuotaExceeded {
            limit: decision.limit,
        }
        .into_response();
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("X-RateLimit-Limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", value);
    }
    let reset = decision
        .resets_at
        .to_rfc3339_opts(SecondsFormat::Millis, true);
    if let Ok(value) = HeaderValue::from_str(&reset) {
        headers.insert("X-RateLimit-Reset", value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn counts_down_to_zero_then_rejects() {
        let quota = DailyQuota::starting_at(2, noon());

        let first = quota.try_acquire_at(noon());
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);

        let second = quota.try_acquire_at(noon());
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let third = quota.try_acquire_at(noon());
        assert!(!third.allowed);
        assert_eq!(third.remaining, 0);
    }

    #[test]
    fn window_resets_at_utc_midnight() {
        let quota = DailyQuota::starting_at(1, noon());
        assert!(quota.try_acquire_at(noon()).allowed);
        assert!(!quota.try_acquire_at(noon()).allowed);

        let next_day = Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 1).unwrap();
        let decision = quota.try_acquire_at(next_day);
        assert!(decision.allowed);
        assert_eq!(
            decision.resets_at,
            Utc.with_ymd_and_hms(2026, 3, 16, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejections_do_not_consume_the_budget() {
        let quota = DailyQuota::starting_at(1, noon());
        assert!(quota.try_acquire_at(noon()).allowed);
        for _ in 0..5 {
            assert!(!quota.try_acquire_at(noon()).allowed);
        }

        let next_day = Utc.with_ymd_and_hms(2026, 3, 15, 6, 0, 0).unwrap();
        assert!(quota.try_acquire_at(next_day).allowed);
    }

    #[test]
    fn reset_time_is_the_following_midnight() {
        let late = Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap();
        assert_eq!(
            next_midnight(late),
            Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()
        );
    }
}
