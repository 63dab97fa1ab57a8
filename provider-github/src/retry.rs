//! Bounded retry around single HTTP exchanges
//!
//! The connector runs every attempt through here. `attempt` performs one
//! exchange; `before_retry` runs between attempts and may sleep or abort,
//! which is where the rate-limit governor gets a say.

use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpResponse, ResponseClass, RetryPolicy};
use std::future::Future;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Drive `attempt` until it succeeds, fails permanently, or the policy runs out.
///
/// Retriable responses that survive every attempt are returned as-is so the
/// caller can read rate-limit headers off the final one.
pub(crate) async fn retry_with_policy<A, AFut, G, GFut>(
    policy: &RetryPolicy,
    url: &str,
    mut attempt: A,
    mut before_retry: G,
) -> Result<HttpResponse>
where
    A: FnMut() -> AFut,
    AFut: Future<Output = Result<HttpResponse>>,
    G: FnMut() -> GFut,
    GFut: Future<Output = Result<()>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt_no = 0;

    loop {
        attempt_no += 1;
        debug!(
            attempt = attempt_no,
            max_attempts = max_attempts,
            url = %url,
            "Executing HTTP request"
        );

        match attempt().await {
            Ok(response) => match response.classify() {
                ResponseClass::Retriable if attempt_no < max_attempts => {
                    warn!(
                        status = response.status,
                        attempt = attempt_no,
                        "HTTP request failed with retryable status"
                    );
                }
                _ => return Ok(response),
            },
            Err(BridgeError::Network { kind, message })
                if kind.is_retriable() && attempt_no < max_attempts =>
            {
                warn!(
                    error = %message,
                    kind = %kind,
                    attempt = attempt_no,
                    "HTTP request failed"
                );
            }
            Err(e) => return Err(e),
        }

        let delay = policy.delay_for_attempt(attempt_no);
        debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
        sleep(delay).await;
        before_retry().await?;
    }
}
