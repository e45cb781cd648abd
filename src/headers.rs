use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::rate_limit::Decision;

pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

// Reset is epoch seconds
pub fn insert_quota_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_secs: u64) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(reset_secs));
}

pub fn insert_decision(headers: &mut HeaderMap, decision: &Decision) {
    insert_quota_headers(headers, decision.limit, decision.remaining, decision.reset_at_secs());
}
