//! Resource limits applied to a spawned process

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};

/// Per-process resource ceilings. All fields optional; present values
/// must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceLimits {
    /// CPU budget in millicores (1000 = one full core).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_millis: Option<u64>,
    /// Address space cap in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    /// Maximum number of tasks the process may create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pids_limit: Option<u64>,
}

impl ResourceLimits {
    pub fn has_limits(&self) -> bool {
        self.cpu_millis.is_some() || self.memory_bytes.is_some() || self.pids_limit.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.cpu_millis == Some(0) {
            return Err(DomainError::ResourceLimitError(
                "cpu_millis must be greater than zero".to_string(),
            ));
        }
        if self.memory_bytes == Some(0) {
            return Err(DomainError::ResourceLimitError(
                "memory_bytes must be greater than zero".to_string(),
            ));
        }
        if self.pids_limit == Some(0) {
            return Err(DomainError::ResourceLimitError(
                "pids_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_limits_are_valid() {
        let limits = ResourceLimits::default();
        assert!(!limits.has_limits());
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let limits = ResourceLimits {
            memory_bytes: Some(0),
            ..Default::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn test_positive_values_accepted() {
        let limits = ResourceLimits {
            cpu_millis: Some(500),
            memory_bytes: Some(64 * 1024 * 1024),
            pids_limit: Some(32),
        };
        assert!(limits.has_limits());
        assert!(limits.validate().is_ok());
    }
}
