//! Restart policy value object

use serde::{Deserialize, Serialize};

/// Rule governing whether a terminated process is automatically respawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    #[default]
    Never,
    Always,
    OnFailure,
}

impl RestartPolicy {
    /// Decide whether a spontaneous exit should schedule a restart.
    /// `success` reflects the exit status against the success set.
    pub fn should_restart(&self, success: bool) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::OnFailure => !success,
        }
    }
}

impl std::fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Never => "never",
            Self::Always => "always",
            Self::OnFailure => "on-failure",
        };
        write!(f, "{s}")
    }
}
