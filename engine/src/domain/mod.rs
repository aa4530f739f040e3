pub mod command;
pub mod constants;
pub mod definition;
pub mod error;
pub mod value_objects;

pub use command::{CreateProcessCommand, Dependencies, Hooks, OutputTarget, StartBehavior};
pub use definition::{ExitStatus, ProcessDefinition};
pub use error::{DomainError, Result};
pub use value_objects::{
    HealthCheck, HealthCheckKind, KillMode, ProcessId, ProcessState, ResourceLimits,
    RestartPolicy, SocketProtocol, SocketSpec,
};
