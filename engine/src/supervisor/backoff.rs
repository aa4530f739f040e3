//! Restart delay computation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ProcessDefinition;

/// How successive restart delays grow. The default doubles the delay
/// per consecutive failure, capped at `restart_max_delay_sec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum BackoffStrategy {
    Fixed,
    Exponential { base: u32 },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential { base: 2 }
    }
}

impl BackoffStrategy {
    /// Delay before restart attempt number `attempt` (1-based, usually
    /// the consecutive failure count). Never decreases as `attempt`
    /// grows.
    pub fn delay(&self, definition: &ProcessDefinition, attempt: u32) -> Duration {
        let base_delay = definition.restart_delay_sec;
        let max_delay = definition.restart_max_delay_sec.max(base_delay);
        let secs = match self {
            Self::Fixed => base_delay,
            Self::Exponential { base } => {
                let exponent = attempt.saturating_sub(1);
                match (*base as u64).checked_pow(exponent) {
                    Some(factor) => base_delay.saturating_mul(factor),
                    None => u64::MAX,
                }
            }
        };
        Duration::from_secs(secs.min(max_delay))
    }
}
