use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::core::config::StreamingConfig;
use crate::core::error::SourceError;
use crate::core::types::{ContainerId, MediaObject, ObjectId};
use crate::observability::metrics as obs;
use crate::stream::location::LocationHandle;

use super::{BoundedFetch, ObjectLookup};

// ---------------------------------------------------------------------------
// RetryingFetch
// ---------------------------------------------------------------------------

/// Upper bound on the pause between two attempts.
pub const MAX_FETCH_BACKOFF: Duration = Duration::from_secs(60);

/// Repeats failed bounded fetches with exponential backoff.
///
/// Only transient errors are retried; a rejected or missing location fails
/// immediately. Lookups pass straight through.
pub struct RetryingFetch<F> {
    inner: F,
    max_retries: u32,
    initial_backoff: Duration,
}

impl<F> RetryingFetch<F> {
    pub fn new(inner: F, max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            inner,
            max_retries,
            initial_backoff,
        }
    }

    pub fn from_config(inner: F, config: &StreamingConfig) -> Self {
        Self::new(
            inner,
            config.fetch_retry_attempts,
            Duration::from_millis(config.fetch_retry_backoff_ms),
        )
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F: ObjectLookup> ObjectLookup for RetryingFetch<F> {
    async fn lookup_object(
        &self,
        container_id: ContainerId,
        object_id: ObjectId,
    ) -> Result<MediaObject, SourceError> {
        self.inner.lookup_object(container_id, object_id).await
    }
}

impl<F: BoundedFetch> BoundedFetch for RetryingFetch<F> {
    async fn fetch(
        &self,
        location: &LocationHandle,
        offset: u64,
        limit: u32,
    ) -> Result<Bytes, SourceError> {
        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                let backoff = backoff_for(self.initial_backoff, attempt);
                debug!(
                    %location,
                    offset,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "retrying bounded fetch"
                );
                obs::inc_remote_fetch_retry();
                tokio::time::sleep(backoff).await;
            }

            match self.inner.fetch(location, offset, limit).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    warn!(%location, offset, attempt, error = %e, "bounded fetch failed");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// `initial * 2^(attempt - 1)`, saturating at [`MAX_FETCH_BACKOFF`].
fn backoff_for(initial: Duration, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(16);
    initial
        .checked_mul(factor)
        .unwrap_or(MAX_FETCH_BACKOFF)
        .min(MAX_FETCH_BACKOFF)
}
