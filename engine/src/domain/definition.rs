//! Process definition aggregate: validated configuration plus the
//! runtime state the supervisor tracks for it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::command::{
    CreateProcessCommand, Dependencies, Hooks, OutputTarget, StartBehavior,
};
use crate::domain::constants;
use crate::domain::error::{DomainError, Result};
use crate::domain::value_objects::{
    HealthCheck, KillMode, ProcessId, ProcessState, ResourceLimits, RestartPolicy, SocketSpec,
};

/// Exit information recorded when a process terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// An exit is successful when it was not killed by a signal and its
    /// code is in the configured success set.
    pub fn is_success(&self, success_exit_status: &[i32]) -> bool {
        if self.signal.is_some() {
            return false;
        }
        match self.code {
            Some(code) => success_exit_status.contains(&code),
            None => false,
        }
    }
}

/// A registered process: its immutable configuration and mutable
/// runtime state. Runtime state is only mutated through the owning
/// supervision actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDefinition {
    id: ProcessId,
    name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub environment_file: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub ambient_capabilities: Vec<String>,

    pub restart_policy: RestartPolicy,
    pub restart_delay_sec: u64,
    pub restart_max_delay_sec: u64,
    pub start_limit_burst: u32,
    pub start_limit_interval_sec: u64,
    pub timeout_start_sec: u64,
    pub timeout_stop_sec: u64,
    pub kill_mode: KillMode,
    pub kill_signal: String,
    pub success_exit_status: Vec<i32>,

    pub resource_limits: ResourceLimits,
    pub dependencies: Dependencies,
    pub runtime_directory: Vec<PathBuf>,
    pub pidfile: Option<PathBuf>,
    pub hooks: Hooks,
    pub health_check: Option<HealthCheck>,
    pub socket: Option<SocketSpec>,
    pub start_behavior: StartBehavior,
    pub stdout: OutputTarget,
    pub stderr: OutputTarget,

    state: ProcessState,
    pid: Option<u32>,
    run_count: u64,
    last_exit: Option<ExitStatus>,
    consecutive_failures: u32,
    start_times: Vec<SystemTime>,
}

impl ProcessDefinition {
    /// Validate a creation request and build the definition. Checks run
    /// in a fixed order so the first problem reported is deterministic:
    /// name, command, runtime directories, capabilities, resource
    /// limits, then the remaining optional sections.
    pub fn from_command(cmd: CreateProcessCommand) -> Result<Self> {
        validate_name(&cmd.name)?;
        validate_command(&cmd.command)?;
        validate_runtime_directories(&cmd.runtime_directory)?;
        validate_capabilities(&cmd.ambient_capabilities)?;
        cmd.resource_limits.validate()?;

        if constants::signal_number(&cmd.kill_signal).is_none() {
            return Err(DomainError::InvalidCommand(format!(
                "unknown kill signal '{}'",
                cmd.kill_signal
            )));
        }
        if let Some(hc) = &cmd.health_check {
            hc.validate()?;
        }
        if let Some(socket) = &cmd.socket {
            socket.validate()?;
        }

        // A process depending on itself is tolerated here so configs can
        // be loaded; starting it fails with the cycle named.
        if cmd.dependencies.requires.contains(&cmd.name)
            || cmd.dependencies.wants.contains(&cmd.name)
        {
            warn!(
                process = %cmd.name,
                "process declares a dependency on itself, it will fail to start"
            );
        }

        Ok(Self {
            id: ProcessId::generate(),
            name: cmd.name,
            command: cmd.command,
            args: cmd.args,
            env: cmd.env,
            environment_file: cmd.environment_file,
            working_dir: cmd.working_dir,
            user: cmd.user,
            group: cmd.group,
            ambient_capabilities: cmd.ambient_capabilities,
            restart_policy: cmd.restart_policy,
            restart_delay_sec: cmd.restart_delay_sec,
            restart_max_delay_sec: cmd.restart_max_delay_sec,
            start_limit_burst: cmd.start_limit_burst,
            start_limit_interval_sec: cmd.start_limit_interval_sec,
            timeout_start_sec: cmd.timeout_start_sec,
            timeout_stop_sec: cmd.timeout_stop_sec,
            kill_mode: cmd.kill_mode,
            kill_signal: cmd.kill_signal,
            success_exit_status: cmd.success_exit_status,
            resource_limits: cmd.resource_limits,
            dependencies: cmd.dependencies,
            runtime_directory: cmd.runtime_directory,
            pidfile: cmd.pidfile,
            hooks: cmd.hooks,
            health_check: cmd.health_check,
            socket: cmd.socket,
            start_behavior: cmd.start_behavior,
            stdout: cmd.stdout,
            stderr: cmd.stderr,
            state: ProcessState::Created,
            pid: None,
            run_count: 0,
            last_exit: None,
            consecutive_failures: 0,
            start_times: Vec::new(),
        })
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    pub fn last_exit(&self) -> Option<ExitStatus> {
        self.last_exit
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn kill_signal_number(&self) -> i32 {
        constants::signal_number(&self.kill_signal).unwrap_or(libc::SIGTERM)
    }

    /// Record a start attempt and check the burst limit over the
    /// sliding window. Returns false when the limit is exhausted, in
    /// which case the attempt was not recorded.
    pub fn try_record_start_attempt(&mut self, now: SystemTime) -> bool {
        let window = Duration::from_secs(self.start_limit_interval_sec);
        self.start_times
            .retain(|t| now.duration_since(*t).map(|d| d <= window).unwrap_or(false));
        if self.start_times.len() >= self.start_limit_burst as usize {
            return false;
        }
        self.start_times.push(now);
        true
    }

    /// Explicit operator starts clear the burst window so a manual
    /// start always gets a fresh budget.
    pub fn reset_start_limit(&mut self) {
        self.start_times.clear();
    }

    pub fn mark_starting(&mut self) {
        self.state = ProcessState::Starting;
    }

    pub fn mark_running(&mut self, pid: u32) {
        self.state = ProcessState::Running;
        self.pid = Some(pid);
        self.run_count += 1;
    }

    pub fn mark_stopping(&mut self) {
        self.state = ProcessState::Stopping;
    }

    /// Record a termination. `state` is the resulting lifecycle state
    /// decided by the supervision logic (Stopped or Failed).
    pub fn mark_exited(&mut self, exit: ExitStatus, state: ProcessState) {
        self.pid = None;
        self.last_exit = Some(exit);
        self.state = state;
        if exit.is_success(&self.success_exit_status) {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }
    }

    /// Record a start that never produced a live process.
    pub fn mark_spawn_failed(&mut self) {
        self.pid = None;
        self.state = ProcessState::Failed;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub fn mark_stopped(&mut self) {
        self.pid = None;
        self.state = ProcessState::Stopped;
    }

    pub fn mark_failed(&mut self) {
        self.pid = None;
        self.state = ProcessState::Failed;
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DomainError::InvalidName("name cannot be empty".to_string()));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(DomainError::InvalidName(format!(
            "name '{name}' cannot contain whitespace"
        )));
    }
    if name.len() > constants::MAX_NAME_LEN {
        return Err(DomainError::InvalidName(format!(
            "name exceeds {} characters",
            constants::MAX_NAME_LEN
        )));
    }
    Ok(())
}

fn validate_command(command: &str) -> Result<()> {
    if command.trim().is_empty() {
        return Err(DomainError::InvalidCommand(
            "command cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_runtime_directories(dirs: &[PathBuf]) -> Result<()> {
    for dir in dirs {
        if dir.is_absolute() {
            return Err(DomainError::RuntimeDirectoryError(format!(
                "'{}' must be a relative path",
                dir.display()
            )));
        }
        if dir.components().any(|c| c == std::path::Component::ParentDir) {
            return Err(DomainError::RuntimeDirectoryError(format!(
                "'{}' cannot contain '..'",
                dir.display()
            )));
        }
        if dir.as_os_str().is_empty() {
            return Err(DomainError::RuntimeDirectoryError(
                "runtime directory cannot be empty".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_capabilities(caps: &[String]) -> Result<()> {
    for cap in caps {
        if !constants::is_known_capability(cap) {
            return Err(DomainError::CapabilityError(format!(
                "unknown capability '{cap}'"
            )));
        }
    }
    Ok(())
}
