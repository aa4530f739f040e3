//! Events processed by a process's supervision actor.
//!
//! Every lifecycle-relevant occurrence for one process flows through a
//! single queue, so events are handled strictly in arrival order.

use std::os::unix::io::RawFd;

use tokio::sync::oneshot;

use crate::domain::{ExitStatus, Result};

pub enum ProcessEvent {
    /// Start the process. `manual` starts reset the start-limit window;
    /// restart-driven starts do not.
    StartRequested {
        listen_fds: Vec<RawFd>,
        manual: bool,
        resp: Option<oneshot::Sender<Result<u32>>>,
    },
    /// Stop the process and cancel any pending restart or probe.
    StopRequested {
        resp: Option<oneshot::Sender<Result<()>>>,
    },
    /// The watched process exited.
    Terminated { exit: ExitStatus },
    /// The health monitor saw `retries` consecutive probe failures.
    HealthFailed,
    /// A scheduled restart delay elapsed.
    RestartDue,
}

impl std::fmt::Debug for ProcessEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartRequested { manual, listen_fds, .. } => f
                .debug_struct("StartRequested")
                .field("manual", manual)
                .field("listen_fds", listen_fds)
                .finish(),
            Self::StopRequested { .. } => f.debug_struct("StopRequested").finish(),
            Self::Terminated { exit } => {
                f.debug_struct("Terminated").field("exit", exit).finish()
            }
            Self::HealthFailed => write!(f, "HealthFailed"),
            Self::RestartDue => write!(f, "RestartDue"),
        }
    }
}
