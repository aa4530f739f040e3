pub mod health_check;
pub mod kill_mode;
pub mod process_id;
pub mod process_state;
pub mod resource_limits;
pub mod restart_policy;
pub mod socket_spec;

pub use health_check::{HealthCheck, HealthCheckKind};
pub use kill_mode::KillMode;
pub use process_id::ProcessId;
pub use process_state::ProcessState;
pub use resource_limits::ResourceLimits;
pub use restart_policy::RestartPolicy;
pub use socket_spec::{SocketProtocol, SocketSpec};
