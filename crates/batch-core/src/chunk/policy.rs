use std::time::Duration;

use crate::constants::DEFAULT_RETRY_LIMIT;
use crate::errors::BatchError;

/// Cuántos errores por ítem (lectura o transformación) se toleran en un step.
/// Con límite 0 cualquier error por ítem falla el step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipPolicy {
    pub skip_limit: u32,
}

impl SkipPolicy {
    pub fn none() -> Self {
        Self { skip_limit: 0 }
    }

    pub fn limit(skip_limit: u32) -> Self {
        Self { skip_limit }
    }

    /// `Ok(())` si el ítem se puede saltar. En otro caso devuelve el error con
    /// el que debe fallar el step.
    pub fn check(&self, error: &BatchError, skipped_so_far: u64) -> Result<(), BatchError> {
        if !error.is_item_error() || self.skip_limit == 0 {
            return Err(error.clone());
        }
        if skipped_so_far >= u64::from(self.skip_limit) {
            return Err(BatchError::SkipLimitExceeded { limit: self.skip_limit,
                                                       cause: error.to_string() });
        }
        Ok(())
    }
}

/// Reintentos de la escritura de un chunk. `max_attempts` cuenta el primer
/// intento; el backoff crece linealmente con el número de intento.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_RETRY_LIMIT,
               backoff: Duration::ZERO }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1),
               backoff }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}
