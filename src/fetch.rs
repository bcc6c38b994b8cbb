use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::RawOffer;
use crate::error::FetchError;

/// Boundary to the upstream that produces offers. Kept as a trait so the
/// batch runner can be exercised against in-memory sources.
#[async_trait]
pub trait OfferSource: Send + Sync {
    async fn fetch_offers(&self, product_name: &str) -> Result<Vec<RawOffer>, FetchError>;

    /// Resolve an input product into the concrete models to watch. More than
    /// one entry means the input was ambiguous. Default: echo the input.
    async fn resolve_models(&self, product_name: &str) -> Result<Vec<String>, FetchError> {
        Ok(vec![product_name.to_string()])
    }
}

pub const BASE_BACKOFF: Duration = Duration::from_millis(400);

/// Per-call resilience knobs. `retries` is the number of retries after the
/// first attempt, so `retries + 1` attempts total.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub base_backoff: Duration,
}

/// One terminal success or failure per product: each attempt races the
/// source call against `policy.timeout` (the losing call future is dropped,
/// so nothing leaks across attempts), failures back off `base * 2^attempt`
/// and retry, and the last error is surfaced once retries are exhausted.
pub async fn fetch_with_resilience<S: OfferSource + ?Sized>(
    source: &S,
    product_name: &str,
    policy: &RetryPolicy,
) -> Result<Vec<RawOffer>, FetchError> {
    let mut attempt: u32 = 0;
    loop {
        let result = match tokio::time::timeout(policy.timeout, source.fetch_offers(product_name))
            .await
        {
            Ok(inner) => inner,
            Err(_) => Err(FetchError::Timeout(policy.timeout)),
        };

        match result {
            Ok(offers) => return Ok(offers),
            Err(err) if attempt >= policy.retries => return Err(err),
            Err(err) => {
                let backoff = policy.base_backoff * 2u32.pow(attempt);
                warn!(
                    product = product_name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "offer fetch failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
