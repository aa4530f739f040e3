//! Health check configuration

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};

/// Probe mechanism for a periodic liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckKind {
    /// HTTP GET against the target URL; any 2xx status is healthy.
    Http,
    /// TCP connect to `host:port`; a successful connect is healthy.
    Tcp,
    /// Run the target command; exit status zero is healthy.
    Exec,
}

/// Periodic liveness probe attached to a process definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    #[serde(rename = "type")]
    pub kind: HealthCheckKind,
    /// URL for http, `host:port` for tcp, command line for exec.
    pub target: String,
    #[serde(default = "default_interval")]
    pub interval_sec: u64,
    #[serde(default = "default_timeout")]
    pub timeout_sec: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_interval() -> u64 {
    30
}

fn default_timeout() -> u64 {
    5
}

fn default_retries() -> u32 {
    3
}

impl HealthCheck {
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(DomainError::HealthCheckError(
                "target cannot be empty".to_string(),
            ));
        }
        if self.interval_sec == 0 {
            return Err(DomainError::HealthCheckError(
                "interval_sec must be greater than zero".to_string(),
            ));
        }
        if self.timeout_sec == 0 {
            return Err(DomainError::HealthCheckError(
                "timeout_sec must be greater than zero".to_string(),
            ));
        }
        if self.retries == 0 {
            return Err(DomainError::HealthCheckError(
                "retries must be greater than zero".to_string(),
            ));
        }
        match self.kind {
            HealthCheckKind::Http => {
                if !self.target.starts_with("http://") && !self.target.starts_with("https://") {
                    return Err(DomainError::HealthCheckError(format!(
                        "http target must be a URL, got '{}'",
                        self.target
                    )));
                }
            }
            HealthCheckKind::Tcp => {
                if !self.target.contains(':') {
                    return Err(DomainError::HealthCheckError(format!(
                        "tcp target must be host:port, got '{}'",
                        self.target
                    )));
                }
            }
            HealthCheckKind::Exec => {}
        }
        Ok(())
    }
}
