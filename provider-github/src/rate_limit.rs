//! Rate-limit governor
//!
//! Tracks GitHub's primary quota (`X-RateLimit-Remaining` / `X-RateLimit-Reset`)
//! and the secondary abuse-detection throttle, and decides before every call
//! whether it may go out now. State is kept in the [`TtlCache`] so it survives
//! across chunks and across unrelated syncs.

use bridge_traits::error::Result;
use bridge_traits::http::HttpResponse;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;

const RECORD_KEY: &str = "github.rate_limit";
const RECORD_TTL: Duration = Duration::from_secs(2 * 60 * 60);
/// 2^10 seconds is already past any sane secondary cooldown
const MAX_BACKOFF_EXPONENT: u32 = 10;
const MAX_JITTER_MS: u64 = 1000;

/// Persisted view of the remote quota.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub remaining: Option<u64>,
    /// Unix epoch seconds at which the primary window resets
    pub reset_epoch: Option<i64>,
    /// Unix millis until which the secondary throttle is in effect
    pub secondary_backoff_until_ms: Option<i64>,
    /// Unix millis derived from the last `Retry-After` header
    pub retry_after_until_ms: Option<i64>,
    /// Consecutive throttled responses without a `Retry-After`
    pub backoff_attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    SecondaryBackoff,
    RetryAfter,
    PrimaryExhausted,
}

/// What the caller must do before issuing a governed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GovernorDecision {
    Proceed,
    /// Cached quota is missing or stale; refresh it with the rate-limit probe.
    Probe,
    Wait {
        /// `raw` capped at the configured maximum
        duration: Duration,
        raw: Duration,
        /// `raw` is longer than the caller is allowed to sleep
        exceeded: bool,
        reason: WaitReason,
    },
}

pub struct RateLimitGovernor {
    cache: TtlCache,
    threshold: u64,
    max_wait: Duration,
}

impl RateLimitGovernor {
    pub fn new(cache: TtlCache, threshold: u64, max_wait: Duration) -> Self {
        Self {
            cache,
            threshold,
            max_wait,
        }
    }

    pub async fn load(&self) -> Result<RateLimitRecord> {
        Ok(self
            .cache
            .get::<RateLimitRecord>(RECORD_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn save(&self, record: &RateLimitRecord) -> Result<()> {
        self.cache.set(RECORD_KEY, record, RECORD_TTL).await
    }

    fn now_ms(&self) -> i64 {
        self.cache.clock().unix_timestamp_millis()
    }

    fn wait(&self, millis: i64, reason: WaitReason) -> GovernorDecision {
        let raw = Duration::from_millis(millis.max(0) as u64);
        GovernorDecision::Wait {
            duration: raw.min(self.max_wait),
            raw,
            exceeded: raw > self.max_wait,
            reason,
        }
    }

    fn primary_decision(&self, record: &RateLimitRecord, now_ms: i64) -> Option<GovernorDecision> {
        match (record.remaining, record.reset_epoch) {
            (Some(remaining), Some(reset)) if remaining < self.threshold => {
                let reset_ms = reset.saturating_mul(1000);
                (reset_ms > now_ms)
                    .then(|| self.wait(reset_ms - now_ms, WaitReason::PrimaryExhausted))
            }
            _ => None,
        }
    }

    /// Decide whether a governed call may go out now.
    ///
    /// Checks the secondary backoff window, then the `Retry-After` window, then
    /// the cached primary quota. A quota below threshold whose reset is still in
    /// the future is trusted as-is; a missing or already-reset quota asks for a probe.
    pub async fn pre_call_check(&self) -> Result<GovernorDecision> {
        let record = self.load().await?;
        let now = self.now_ms();

        if let Some(until) = record.secondary_backoff_until_ms.filter(|&t| t > now) {
            return Ok(self.wait(until - now, WaitReason::SecondaryBackoff));
        }

        if let Some(until) = record.retry_after_until_ms.filter(|&t| t > now) {
            return Ok(self.wait(until - now, WaitReason::RetryAfter));
        }

        if let Some(wait) = self.primary_decision(&record, now) {
            return Ok(wait);
        }

        match record.remaining {
            Some(remaining) if remaining >= self.threshold => Ok(GovernorDecision::Proceed),
            _ => Ok(GovernorDecision::Probe),
        }
    }

    /// Store fresh numbers from the probe and decide again.
    pub async fn after_probe(&self, remaining: u64, reset_epoch: i64) -> Result<GovernorDecision> {
        let mut record = self.load().await?;
        record.remaining = Some(remaining);
        record.reset_epoch = Some(reset_epoch);
        self.save(&record).await?;

        debug!(remaining, reset_epoch, "Refreshed rate limit from probe");

        Ok(self
            .primary_decision(&record, self.now_ms())
            .unwrap_or(GovernorDecision::Proceed))
    }

    /// Fold what a response says about the quota into the persisted record.
    pub async fn record_response(&self, response: &HttpResponse) -> Result<()> {
        let mut record = self.load().await?;
        let now = self.now_ms();

        let remaining =
            header_number::<u64>(response, "x-ratelimit-remaining", "ratelimit-remaining");
        if remaining.is_some() {
            record.remaining = remaining;
        }
        let reset = header_number::<i64>(response, "x-ratelimit-reset", "ratelimit-reset");
        if reset.is_some() {
            record.reset_epoch = reset;
        }

        if response.is_rate_limited() {
            match header_number::<u64>(response, "retry-after", "retry-after") {
                Some(secs) => {
                    record.retry_after_until_ms = Some(now + (secs as i64) * 1000);
                    warn!(
                        status = response.status,
                        retry_after_secs = secs,
                        "Throttled with Retry-After"
                    );
                }
                None => {
                    let backoff = backoff_with_jitter(record.backoff_attempt);
                    record.secondary_backoff_until_ms = Some(now + backoff.as_millis() as i64);
                    record.backoff_attempt = record.backoff_attempt.saturating_add(1);
                    warn!(
                        status = response.status,
                        attempt = record.backoff_attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Secondary rate limit hit, backing off"
                    );
                }
            }
        } else if response.is_success() || response.status == 304 {
            if record.backoff_attempt > 0 || record.secondary_backoff_until_ms.is_some() {
                info!("Rate limit backoff cleared");
            }
            record.backoff_attempt = 0;
            record.secondary_backoff_until_ms = None;
        }

        self.save(&record).await
    }
}

fn header_number<T: std::str::FromStr>(
    response: &HttpResponse,
    name: &str,
    fallback: &str,
) -> Option<T> {
    response
        .header(name)
        .or_else(|| response.header(fallback))
        .and_then(|value| value.trim().parse().ok())
}

/// `2^attempt` seconds plus up to one second of jitter.
fn backoff_with_jitter(attempt: u32) -> Duration {
    let base = Duration::from_secs(1u64 << attempt.min(MAX_BACKOFF_EXPONENT));
    let jitter = rand::thread_rng().gen_range(0..MAX_JITTER_MS);
    base + Duration::from_millis(jitter)
}
