use std::future::Future;

use crate::core::error::StoreError;

// ---------------------------------------------------------------------------
// Bounded retry
// ---------------------------------------------------------------------------

/// Bounded-attempt wrapper applied uniformly to store listing and store read
/// operations.
///
/// Stateless and shared; one instance is constructed from configuration and
/// copied wherever a store call needs it. Deadline, cancellation, and
/// not-found failures are terminal and propagate on the first attempt;
/// exhausting the attempt budget surfaces the last transient error.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run `op` up to `max_attempts` times, retrying only transient errors.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut last = StoreError::Transient {
            reason: "retry budget was empty".to_string(),
        };
        for attempt in 1..=self.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    tracing::debug!(attempt, error = %err, "retrying store operation");
                    last = err;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last)
    }
}
