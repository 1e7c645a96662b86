//! Record fetcher — bounded retry over a [`ProgressSource`].
//!
//! Only transient upstream failures are retried. Not-found, malformed and
//! unexpected failures return immediately. When every attempt fails
//! transiently the caller gets `TemporarilyUnavailable`, never `NotFound`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::{ProgressRecord, ProgressSource};
use crate::error::{FetchError, LookupError};

/// Transient-failure retry budget for a single fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_secs(2),
        }
    }
}

/// Wraps an upstream lookup with the retry policy.
#[derive(Clone)]
pub struct RecordFetcher {
    source: Arc<dyn ProgressSource>,
    policy: RetryPolicy,
}

impl RecordFetcher {
    pub fn new(source: Arc<dyn ProgressSource>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    /// Fetch the record for `identity`.
    pub async fn fetch(&self, identity: &str) -> Result<ProgressRecord, FetchError> {
        let attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.source.lookup(identity).await {
                Ok(record) => return Ok(record),
                Err(LookupError::Transient { reason }) => {
                    warn!(identity, attempt, attempts, %reason, "Hiscores degraded");
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.delay).await;
                    }
                }
                Err(LookupError::NotFound { identity }) => {
                    info!(%identity, "Player not found");
                    return Err(FetchError::NotFound { identity });
                }
                Err(LookupError::Malformed { identity, reason }) => {
                    warn!(%identity, %reason, "Could not read stats data");
                    return Err(FetchError::Unreadable { identity, reason });
                }
                Err(LookupError::Unexpected { reason }) => {
                    tracing::error!(identity, %reason, "Unexpected hiscores failure");
                    return Err(FetchError::Unknown { reason });
                }
            }
        }

        info!(identity, "Hiscores temporarily unavailable");
        Err(FetchError::TemporarilyUnavailable { attempts })
    }
}
