//! Socket activation configuration

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SocketProtocol {
    #[default]
    Tcp,
    Unix,
}

/// A listening socket the supervisor binds on behalf of the process.
/// The bound descriptor is handed to the child when an inbound
/// connection triggers its start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketSpec {
    /// `host:port` for tcp, filesystem path for unix.
    pub address: String,
    #[serde(default)]
    pub protocol: SocketProtocol,
}

impl SocketSpec {
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(DomainError::InvalidCommand(
                "socket address cannot be empty".to_string(),
            ));
        }
        if self.protocol == SocketProtocol::Tcp && !self.address.contains(':') {
            return Err(DomainError::InvalidCommand(format!(
                "tcp socket address must be host:port, got '{}'",
                self.address
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_address_needs_port() {
        let spec = SocketSpec {
            address: "127.0.0.1".to_string(),
            protocol: SocketProtocol::Tcp,
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_unix_path_accepted() {
        let spec = SocketSpec {
            address: "/run/app/app.sock".to_string(),
            protocol: SocketProtocol::Unix,
        };
        assert!(spec.validate().is_ok());
    }
}
