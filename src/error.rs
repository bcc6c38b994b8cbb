use std::time::Duration;

use thiserror::Error;

/// Failure modes for a single offer-source call.
///
/// All three variants go through the same retry loop: a malformed payload is
/// retried just like a transport failure, since the upstream regularly
/// recovers on a second attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("offer source timed out after {0:?}")]
    Timeout(Duration),

    #[error("offer source request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("offer source returned a malformed payload: {0}")]
    MalformedPayload(String),
}
