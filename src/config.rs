use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ManagerError, Result};

/// Hard ceiling on a single outgoing payload.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Tunables recognized by [`crate::ReliabilityManager::new`].
///
/// Loading this from a file or environment is explicitly outside this
/// crate's scope; the struct derives `serde` so an embedder can do so
/// trivially on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    pub bloom_filter_capacity: usize,
    pub bloom_filter_error_rate: f64,
    pub max_message_history: usize,
    pub max_causal_history: usize,
    pub resend_interval: Duration,
    pub max_resend_attempts: u32,
    pub sync_message_interval: Duration,
    pub buffer_sweep_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            bloom_filter_capacity: 10_000,
            bloom_filter_error_rate: 0.001,
            max_message_history: 1_000,
            max_causal_history: 10,
            resend_interval: Duration::from_secs(60),
            max_resend_attempts: 5,
            sync_message_interval: Duration::from_secs(30),
            buffer_sweep_interval: Duration::from_secs(60),
        }
    }
}

impl ManagerConfig {
    /// Validates the configuration, flooring non-positive sizing fields to
    /// their defaults and rejecting out-of-range rates.
    pub fn validate(mut self) -> Result<Self> {
        let defaults = Self::default();
        if self.bloom_filter_capacity == 0 {
            self.bloom_filter_capacity = defaults.bloom_filter_capacity;
        }
        if self.max_message_history == 0 {
            self.max_message_history = defaults.max_message_history;
        }
        if self.max_causal_history == 0 {
            self.max_causal_history = defaults.max_causal_history;
        }
        if !(self.bloom_filter_error_rate > 0.0 && self.bloom_filter_error_rate < 1.0) {
            return Err(ManagerError::InvalidArgument(format!(
                "bloom_filter_error_rate must be in (0, 1), got {}",
                self.bloom_filter_error_rate
            )));
        }
        if self.max_resend_attempts == 0 {
            self.max_resend_attempts = defaults.max_resend_attempts;
        }
        Ok(self)
    }
}
