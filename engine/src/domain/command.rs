//! Creation request DTO, also the YAML configuration schema.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::constants;
use crate::domain::value_objects::{HealthCheck, KillMode, ResourceLimits, RestartPolicy, SocketSpec};

/// Whether a process starts only on explicit request or as soon as it
/// is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StartBehavior {
    #[default]
    Manual,
    Automatic,
}

/// Where a spawned process's stdout or stderr goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputTarget {
    #[default]
    Null,
    Inherit,
    /// Append to the given file, created if missing.
    File(PathBuf),
}

/// Hook command lines run around the process lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Hooks {
    /// Run before spawn; any failure aborts the start.
    #[serde(default)]
    pub pre_start: Vec<String>,
    /// Run after spawn, asynchronously; failures are logged only.
    #[serde(default)]
    pub post_start: Vec<String>,
    /// Run after the process has fully stopped.
    #[serde(default)]
    pub post_stop: Vec<String>,
}

impl Hooks {
    pub fn is_empty(&self) -> bool {
        self.pre_start.is_empty() && self.post_start.is_empty() && self.post_stop.is_empty()
    }
}

/// Declared relationships to other processes, by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Dependencies {
    /// Hard dependencies; must exist and be started first.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Soft dependencies; started first when present, ignored otherwise.
    #[serde(default)]
    pub wants: Vec<String>,
    /// Pure ordering; start after these, no existence requirement.
    #[serde(default)]
    pub after: Vec<String>,
    /// Pure ordering; start before these.
    #[serde(default)]
    pub before: Vec<String>,
    /// Mutual exclusion; starting fails while any of these is active.
    #[serde(default)]
    pub conflicts: Vec<String>,
}

impl Dependencies {
    pub fn is_empty(&self) -> bool {
        self.requires.is_empty()
            && self.wants.is_empty()
            && self.after.is_empty()
            && self.before.is_empty()
            && self.conflicts.is_empty()
    }
}

/// Everything needed to register a process. Only `name` and `command`
/// are mandatory; the rest falls back to supervisor defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateProcessCommand {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// KEY=value file merged beneath `env`. A leading '-' makes a
    /// missing file non-fatal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub ambient_capabilities: Vec<String>,

    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default = "default_restart_delay")]
    pub restart_delay_sec: u64,
    #[serde(default = "default_restart_max_delay")]
    pub restart_max_delay_sec: u64,
    #[serde(default = "default_start_limit_burst")]
    pub start_limit_burst: u32,
    #[serde(default = "default_start_limit_interval")]
    pub start_limit_interval_sec: u64,
    #[serde(default = "default_timeout_start")]
    pub timeout_start_sec: u64,
    #[serde(default = "default_timeout_stop")]
    pub timeout_stop_sec: u64,
    #[serde(default)]
    pub kill_mode: KillMode,
    #[serde(default = "default_kill_signal")]
    pub kill_signal: String,
    #[serde(default = "default_success_exit_status")]
    pub success_exit_status: Vec<i32>,

    #[serde(default)]
    pub resource_limits: ResourceLimits,
    #[serde(default)]
    pub dependencies: Dependencies,
    /// Directories created under the runtime root before start and
    /// removed after stop. Must be relative paths.
    #[serde(default)]
    pub runtime_directory: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pidfile: Option<PathBuf>,
    #[serde(default)]
    pub hooks: Hooks,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<SocketSpec>,
    #[serde(default)]
    pub start_behavior: StartBehavior,

    #[serde(default)]
    pub stdout: OutputTarget,
    #[serde(default)]
    pub stderr: OutputTarget,
}

fn default_restart_delay() -> u64 {
    constants::DEFAULT_RESTART_DELAY_SEC
}

fn default_restart_max_delay() -> u64 {
    constants::DEFAULT_RESTART_MAX_DELAY_SEC
}

fn default_start_limit_burst() -> u32 {
    constants::DEFAULT_START_LIMIT_BURST
}

fn default_start_limit_interval() -> u64 {
    constants::DEFAULT_START_LIMIT_INTERVAL_SEC
}

fn default_timeout_start() -> u64 {
    constants::DEFAULT_TIMEOUT_START_SEC
}

fn default_timeout_stop() -> u64 {
    constants::DEFAULT_TIMEOUT_STOP_SEC
}

fn default_kill_signal() -> String {
    constants::DEFAULT_KILL_SIGNAL.to_string()
}

fn default_success_exit_status() -> Vec<i32> {
    vec![constants::SUCCESS_EXIT_CODE]
}

impl CreateProcessCommand {
    /// Minimal command with every optional field at its default.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            environment_file: None,
            working_dir: None,
            user: None,
            group: None,
            ambient_capabilities: Vec::new(),
            restart_policy: RestartPolicy::default(),
            restart_delay_sec: default_restart_delay(),
            restart_max_delay_sec: default_restart_max_delay(),
            start_limit_burst: default_start_limit_burst(),
            start_limit_interval_sec: default_start_limit_interval(),
            timeout_start_sec: default_timeout_start(),
            timeout_stop_sec: default_timeout_stop(),
            kill_mode: KillMode::default(),
            kill_signal: default_kill_signal(),
            success_exit_status: default_success_exit_status(),
            resource_limits: ResourceLimits::default(),
            dependencies: Dependencies::default(),
            runtime_directory: Vec::new(),
            pidfile: None,
            hooks: Hooks::default(),
            health_check: None,
            socket: None,
            start_behavior: StartBehavior::default(),
            stdout: OutputTarget::default(),
            stderr: OutputTarget::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_gets_defaults() {
        let cmd: CreateProcessCommand =
            serde_yaml::from_str("name: web\ncommand: /usr/bin/web").unwrap();
        assert_eq!(cmd.name, "web");
        assert_eq!(cmd.restart_policy, RestartPolicy::Never);
        assert_eq!(cmd.kill_signal, "SIGTERM");
        assert_eq!(cmd.kill_mode, KillMode::Process);
        assert_eq!(cmd.success_exit_status, vec![0]);
        assert_eq!(cmd.timeout_stop_sec, 10);
        assert_eq!(cmd.start_behavior, StartBehavior::Manual);
    }

    #[test]
    fn test_full_yaml_round_trip() {
        let yaml = r#"
name: db
command: /usr/bin/postgres
args: ["-D", "/var/lib/pg"]
restart_policy: on-failure
restart_delay_sec: 2
kill_mode: process-group
dependencies:
  requires: [network]
  conflicts: [db-old]
health_check:
  type: tcp
  target: "127.0.0.1:5432"
start_behavior: automatic
"#;
        let cmd: CreateProcessCommand = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cmd.restart_policy, RestartPolicy::OnFailure);
        assert_eq!(cmd.kill_mode, KillMode::ProcessGroup);
        assert_eq!(cmd.dependencies.requires, vec!["network"]);
        assert_eq!(cmd.dependencies.conflicts, vec!["db-old"]);
        assert_eq!(cmd.start_behavior, StartBehavior::Automatic);
        let hc = cmd.health_check.unwrap();
        assert_eq!(hc.retries, 3);
    }
}
