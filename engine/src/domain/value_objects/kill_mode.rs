//! Kill mode value object

use serde::{Deserialize, Serialize};

/// How a stop signal is delivered: to the main process only, or to its
/// whole process group (the child runs in its own session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum KillMode {
    #[default]
    Process,
    ProcessGroup,
}

impl std::fmt::Display for KillMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Process => "process",
            Self::ProcessGroup => "process-group",
        };
        write!(f, "{s}")
    }
}
