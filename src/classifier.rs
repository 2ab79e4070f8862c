use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::StoreError;
use crate::models::Outcome;
use crate::rate_limit::RateLimiter;
use crate::store::CounterStore;
use crate::tokens::{TokenAuthority, fingerprint};

// Matched case-sensitively as a substring, not as an HTTP header name
const BEARER_MARKER: &str = "Authorization: Bearer";

/// Bearer token of the first line carrying the marker.
///
/// The token is the third whitespace-separated field of that line. Only the
/// marker line is decoded, so stray bytes elsewhere in the buffer (another
/// header, a character cut at the buffer end) do not hide the token. A marker
/// line that is not UTF-8, a missing marker, or a marker line without a third
/// field all mean "no token".
pub fn extract_token(request: &[u8]) -> Option<&str> {
    let marker = BEARER_MARKER.as_bytes();
    let line = request
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .find(|line| line.windows(marker.len()).any(|w| w == marker))?;
    std::str::from_utf8(line).ok()?.split_whitespace().nth(2)
}

/// Decides the outcome for one raw request.
pub struct Classifier<S> {
    tokens: TokenAuthority,
    rate_limiter: RateLimiter<S>,
}

impl<S: CounterStore> Classifier<S> {
    pub fn new(tokens: TokenAuthority, rate_limiter: RateLimiter<S>) -> Self {
        Self {
            tokens,
            rate_limiter,
        }
    }

    pub fn tokens(&self) -> &TokenAuthority {
        &self.tokens
    }

    pub fn rate_limiter(&self) -> &RateLimiter<S> {
        &self.rate_limiter
    }

    pub async fn classify(&self, client: &str, request: &[u8]) -> Result<Outcome, StoreError> {
        self.classify_at(client, request, Utc::now()).await
    }

    /// Tokens are checked against the allow-list and never rate limited.
    /// Token-less requests go through the rate limiter.
    pub async fn classify_at(
        &self,
        client: &str,
        request: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Outcome, StoreError> {
        if let Some(token) = extract_token(request) {
            let outcome = if self.tokens.contains(token) {
                Outcome::Ok
            } else {
                Outcome::Forbidden
            };
            debug!(client, token = %fingerprint(token), %outcome, "bearer token checked");
            return Ok(outcome);
        }

        if self.rate_limiter.is_threshold_exceeded(client, now).await? {
            Ok(Outcome::TooManyRequests)
        } else {
            Ok(Outcome::NotAuthorized)
        }
    }
}
