//! Request and token-refresh counters
//!
//! - `spotify_requests_total` (counter): labels `status`, `method`
//! - `spotify_token_refreshes_total` (counter): labels `caller`, `outcome`
//!
//! Status `0` marks requests that never produced a response (timeouts,
//! connection failures). Without an installed recorder these are no-ops.

/// Record an authorized request with its final status and HTTP method.
pub fn record_request(status: u16, method: &str) {
    metrics::counter!("spotify_requests_total", "status" => status.to_string(), "method" => method.to_string())
        .increment(1);
}

/// Record a token refresh attempt for the given caller kind.
pub fn record_refresh(caller: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("spotify_token_refreshes_total", "caller" => caller.to_string(), "outcome" => outcome)
        .increment(1);
}
