//! Process spawning.
//!
//! `ProcessLauncher` is the seam between supervision logic and the
//! operating system: the real `OsLauncher` forks and execs, tests plug
//! in scripted launchers. `Spawner` drives the full start sequence
//! around a launcher: runtime directories, environment assembly,
//! pre-start hooks, spawn, pidfile.

pub mod env_file;
pub mod hooks;
pub mod runtime_dir;

use std::collections::HashMap;
use std::ffi::CString;
use std::os::unix::io::RawFd;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::domain::{
    DomainError, ExitStatus, KillMode, OutputTarget, ProcessDefinition, ResourceLimits, Result,
};

/// Everything a launcher needs to exec one process.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub ambient_capabilities: Vec<String>,
    pub resource_limits: ResourceLimits,
    pub stdout: OutputTarget,
    pub stderr: OutputTarget,
    /// Pre-bound listening sockets, duplicated to fd 3 onward in the
    /// child with `LISTEN_FDS`/`LISTEN_PID` set.
    pub listen_fds: Vec<RawFd>,
}

/// A spawned process: its pid plus a one-shot exit notification.
#[derive(Debug)]
pub struct LaunchedProcess {
    pub pid: u32,
    pub exit: oneshot::Receiver<ExitStatus>,
}

#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, spec: SpawnSpec) -> Result<LaunchedProcess>;
    async fn kill(&self, pid: u32, signal: i32, mode: KillMode) -> Result<()>;
    async fn is_alive(&self, pid: u32) -> bool;
}

/// Launcher backed by fork/exec.
#[derive(Default)]
pub struct OsLauncher;

impl OsLauncher {
    pub fn new() -> Self {
        Self
    }

    fn configure_output(target: &OutputTarget) -> Result<Stdio> {
        match target {
            OutputTarget::Null => Ok(Stdio::null()),
            OutputTarget::Inherit => Ok(Stdio::inherit()),
            OutputTarget::File(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| {
                        DomainError::SpawnError(format!(
                            "failed to open output file '{}': {e}",
                            path.display()
                        ))
                    })?;
                Ok(Stdio::from(file))
            }
        }
    }

    fn configure_pre_exec(cmd: &mut std::process::Command, spec: &SpawnSpec) -> Result<()> {
        let uid_opt = match &spec.user {
            Some(user) => {
                let uid = lookup_uid(user)?;
                debug!(user = %user, uid = uid, "resolved process user");
                Some(uid)
            }
            None => None,
        };
        let gid_opt = match &spec.group {
            Some(group) => {
                let gid = lookup_gid(group)?;
                debug!(group = %group, gid = gid, "resolved process group");
                Some(gid)
            }
            None => None,
        };

        let limits = spec.resource_limits;
        let use_rlimit = limits.has_limits();
        let capabilities = spec.ambient_capabilities.clone();
        let has_capabilities = !capabilities.is_empty();
        let socket_fds = spec.listen_fds.clone();
        let has_socket_fds = !socket_fds.is_empty();

        if has_socket_fds {
            cmd.env("LISTEN_FDS", socket_fds.len().to_string());
            cmd.env("LISTEN_PID", std::process::id().to_string());
        }

        unsafe {
            cmd.pre_exec(move || {
                // New session so a process-group kill reaches children
                // without touching the supervisor. Failure means we are
                // already a session leader.
                let _ = libc::setsid();

                if has_socket_fds {
                    for (i, &fd) in socket_fds.iter().enumerate() {
                        let target_fd = 3 + i as i32;
                        if libc::dup2(fd, target_fd) == -1 {
                            return Err(std::io::Error::last_os_error());
                        }
                    }
                }

                if use_rlimit {
                    apply_rlimits(&limits)?;
                }

                #[cfg(target_os = "linux")]
                {
                    let needs_caps_after_setuid = has_capabilities && uid_opt.is_some();

                    if has_capabilities {
                        const PR_SET_SECUREBITS: libc::c_int = 28;
                        const SECBIT_KEEP_CAPS: libc::c_ulong = 0x10;
                        if libc::prctl(PR_SET_SECUREBITS, SECBIT_KEEP_CAPS) != 0 {
                            return Err(std::io::Error::last_os_error());
                        }
                        raise_ambient_capabilities(&capabilities)?;
                    }

                    // Group before user; setgid is no longer permitted
                    // after dropping to an unprivileged uid.
                    if let Some(gid) = gid_opt {
                        if libc::setgid(gid) != 0 {
                            return Err(std::io::Error::last_os_error());
                        }
                    }
                    if let Some(uid) = uid_opt {
                        if libc::setuid(uid) != 0 {
                            return Err(std::io::Error::last_os_error());
                        }
                    }

                    if needs_caps_after_setuid {
                        raise_ambient_capabilities(&capabilities)?;
                    }

                    const PR_SET_PDEATHSIG: libc::c_int = 1;
                    if libc::prctl(PR_SET_PDEATHSIG, libc::SIGKILL) != 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                }

                #[cfg(all(unix, not(target_os = "linux")))]
                {
                    if let Some(gid) = gid_opt {
                        if libc::setgid(gid) != 0 {
                            return Err(std::io::Error::last_os_error());
                        }
                    }
                    if let Some(uid) = uid_opt {
                        if libc::setuid(uid) != 0 {
                            return Err(std::io::Error::last_os_error());
                        }
                    }
                }

                Ok(())
            });
        }

        Ok(())
    }

    fn create_exit_handle(mut child: std::process::Child, pid: u32) -> oneshot::Receiver<ExitStatus> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || match child.wait() {
                Ok(status) => {
                    use std::os::unix::process::ExitStatusExt;
                    let exit = ExitStatus {
                        code: status.code(),
                        signal: status.signal(),
                    };
                    debug!(pid = pid, code = ?exit.code, signal = ?exit.signal, "process exited");
                    exit
                }
                Err(e) => {
                    error!(pid = pid, error = %e, "failed to wait for process");
                    ExitStatus {
                        code: None,
                        signal: None,
                    }
                }
            })
            .await
            .unwrap_or(ExitStatus {
                code: None,
                signal: None,
            });
            let _ = tx.send(outcome);
        });
        rx
    }
}

#[async_trait]
impl ProcessLauncher for OsLauncher {
    async fn launch(&self, spec: SpawnSpec) -> Result<LaunchedProcess> {
        info!(process = %spec.name, command = %spec.command, args = ?spec.args, "spawning process");

        let mut cmd = std::process::Command::new(&spec.command);
        cmd.args(&spec.args);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Self::configure_output(&spec.stdout)?);
        cmd.stderr(Self::configure_output(&spec.stderr)?);

        Self::configure_pre_exec(&mut cmd, &spec)?;

        let child = cmd.spawn().map_err(|e| {
            error!(process = %spec.name, command = %spec.command, error = %e, "failed to spawn");
            DomainError::SpawnError(format!("failed to spawn '{}': {e}", spec.command))
        })?;
        let pid = child.id();
        info!(process = %spec.name, pid = pid, "process spawned");

        let exit = Self::create_exit_handle(child, pid);
        Ok(LaunchedProcess { pid, exit })
    }

    async fn kill(&self, pid: u32, signal: i32, mode: KillMode) -> Result<()> {
        let target = match mode {
            KillMode::Process => pid as i32,
            KillMode::ProcessGroup => -(pid as i32),
        };
        let result = unsafe { libc::kill(target, signal) };
        if result != 0 {
            let err = std::io::Error::last_os_error();
            // ESRCH means the process is already gone, which is what a
            // kill is after anyway.
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            warn!(pid = pid, signal = signal, error = %err, "failed to signal process");
            return Err(DomainError::SpawnError(format!(
                "failed to send signal {signal} to pid {pid}: {err}"
            )));
        }
        debug!(pid = pid, signal = signal, mode = %mode, "signal sent");
        Ok(())
    }

    async fn is_alive(&self, pid: u32) -> bool {
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }
}

fn apply_rlimits(limits: &ResourceLimits) -> std::io::Result<()> {
    use libc::{rlimit, setrlimit, RLIMIT_AS, RLIMIT_CPU, RLIMIT_NPROC};

    if let Some(memory_bytes) = limits.memory_bytes {
        let limit = rlimit {
            rlim_cur: memory_bytes,
            rlim_max: memory_bytes,
        };
        unsafe {
            if setrlimit(RLIMIT_AS, &limit) != 0 {
                return Err(std::io::Error::last_os_error());
            }
        }
    }

    if let Some(cpu_millis) = limits.cpu_millis {
        // Millicores express a rate; rlimits only cap total CPU seconds.
        // One hour of wall time at the requested rate is the ceiling.
        let cpu_seconds = (cpu_millis * 3600) / 1000;
        let limit = rlimit {
            rlim_cur: cpu_seconds,
            rlim_max: cpu_seconds,
        };
        unsafe {
            if setrlimit(RLIMIT_CPU, &limit) != 0 {
                return Err(std::io::Error::last_os_error());
            }
        }
    }

    if let Some(pids) = limits.pids_limit {
        let limit = rlimit {
            rlim_cur: pids,
            rlim_max: pids,
        };
        unsafe {
            if setrlimit(RLIMIT_NPROC, &limit) != 0 {
                return Err(std::io::Error::last_os_error());
            }
        }
    }

    Ok(())
}

#[cfg(target_os = "linux")]
fn raise_ambient_capabilities(capabilities: &[String]) -> std::io::Result<()> {
    use caps::{CapSet, Capability};

    for cap_str in capabilities {
        let capability = cap_str.parse::<Capability>().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid capability '{cap_str}': {e}"),
            )
        })?;
        for set in [CapSet::Permitted, CapSet::Inheritable, CapSet::Ambient] {
            caps::raise(None, set, capability).map_err(|e| {
                std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    format!("failed to raise {cap_str}: {e}"),
                )
            })?;
        }
    }
    Ok(())
}

pub(crate) fn lookup_uid(user: &str) -> Result<u32> {
    let user_cstr = CString::new(user)
        .map_err(|e| DomainError::SpawnError(format!("invalid user '{user}': {e}")))?;
    unsafe {
        let pwd = libc::getpwnam(user_cstr.as_ptr());
        if pwd.is_null() {
            return Err(DomainError::SpawnError(format!("user '{user}' not found")));
        }
        Ok((*pwd).pw_uid)
    }
}

pub(crate) fn lookup_gid(group: &str) -> Result<u32> {
    let group_cstr = CString::new(group)
        .map_err(|e| DomainError::SpawnError(format!("invalid group '{group}': {e}")))?;
    unsafe {
        let grp = libc::getgrnam(group_cstr.as_ptr());
        if grp.is_null() {
            return Err(DomainError::SpawnError(format!("group '{group}' not found")));
        }
        Ok((*grp).gr_gid)
    }
}

pub fn write_pidfile(path: &Path, pid: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            DomainError::SpawnError(format!(
                "failed to create pidfile directory {}: {e}",
                parent.display()
            ))
        })?;
    }
    std::fs::write(path, format!("{pid}\n")).map_err(|e| {
        DomainError::SpawnError(format!("failed to write pidfile {}: {e}", path.display()))
    })?;
    debug!(pidfile = %path.display(), pid = pid, "wrote pidfile");
    Ok(())
}

pub fn remove_pidfile(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(pidfile = %path.display(), error = %e, "failed to remove pidfile");
        }
    }
}

/// Drives the complete start sequence for a definition.
pub struct Spawner {
    launcher: Arc<dyn ProcessLauncher>,
    runtime_root: PathBuf,
}

impl Spawner {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, runtime_root: PathBuf) -> Self {
        Self {
            launcher,
            runtime_root,
        }
    }

    /// Runtime directories, environment, pre-start hooks, spawn,
    /// pidfile. A failing pre-start hook aborts before anything is
    /// exec'd.
    pub async fn start(
        &self,
        definition: &ProcessDefinition,
        listen_fds: Vec<RawFd>,
    ) -> Result<LaunchedProcess> {
        runtime_dir::create_runtime_directories(&self.runtime_root, definition)?;

        let env = assemble_env(definition)?;

        hooks::execute_hooks(definition.name(), "pre-start", &definition.hooks.pre_start).await?;

        let spec = SpawnSpec {
            name: definition.name().to_string(),
            command: definition.command.clone(),
            args: definition.args.clone(),
            env,
            working_dir: definition.working_dir.clone(),
            user: definition.user.clone(),
            group: definition.group.clone(),
            ambient_capabilities: definition.ambient_capabilities.clone(),
            resource_limits: definition.resource_limits,
            stdout: definition.stdout.clone(),
            stderr: definition.stderr.clone(),
            listen_fds,
        };
        let launched = self.launcher.launch(spec).await?;

        if let Some(pidfile) = &definition.pidfile {
            write_pidfile(pidfile, launched.pid)?;
        }
        Ok(launched)
    }

    pub async fn signal_stop(&self, definition: &ProcessDefinition, pid: u32) -> Result<()> {
        self.launcher
            .kill(pid, definition.kill_signal_number(), definition.kill_mode)
            .await
    }

    pub async fn signal_kill(&self, definition: &ProcessDefinition, pid: u32) -> Result<()> {
        self.launcher
            .kill(pid, libc::SIGKILL, definition.kill_mode)
            .await
    }

    /// Post-stop cleanup: pidfile and runtime directories.
    pub fn cleanup(&self, definition: &ProcessDefinition) {
        if let Some(pidfile) = &definition.pidfile {
            remove_pidfile(pidfile);
        }
        runtime_dir::cleanup_runtime_directories(&self.runtime_root, definition);
    }
}

/// Merge environment layers: the environment file underneath the
/// explicit `env` map. The parent environment is inherited as the base.
fn assemble_env(definition: &ProcessDefinition) -> Result<HashMap<String, String>> {
    let mut env = HashMap::new();
    if let Some(file_spec) = &definition.environment_file {
        env.extend(env_file::load_environment_file(file_spec)?);
    }
    for (key, value) in &definition.env {
        env.insert(key.clone(), value.clone());
    }
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CreateProcessCommand;

    #[test]
    fn test_env_map_overrides_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("app.env");
        std::fs::write(&env_path, "SHARED=from_file\nFILE_ONLY=1\n").unwrap();

        let mut cmd = CreateProcessCommand::new("web", "/bin/true");
        cmd.environment_file = Some(env_path.display().to_string());
        cmd.env.insert("SHARED".to_string(), "from_map".to_string());
        let def = ProcessDefinition::from_command(cmd).unwrap();

        let env = assemble_env(&def).unwrap();
        assert_eq!(env.get("SHARED"), Some(&"from_map".to_string()));
        assert_eq!(env.get("FILE_ONLY"), Some(&"1".to_string()));
    }

    #[test]
    fn test_pidfile_write_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/web.pid");
        write_pidfile(&path, 1234).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1234\n");
        remove_pidfile(&path);
        assert!(!path.exists());
        // Removing a missing pidfile is quiet.
        remove_pidfile(&path);
    }

    #[tokio::test]
    async fn test_launch_and_wait_for_exit() {
        let launcher = OsLauncher::new();
        let spec = SpawnSpec {
            name: "true".to_string(),
            command: "/bin/true".to_string(),
            args: vec![],
            env: HashMap::new(),
            working_dir: None,
            user: None,
            group: None,
            ambient_capabilities: vec![],
            resource_limits: ResourceLimits::default(),
            stdout: OutputTarget::Null,
            stderr: OutputTarget::Null,
            listen_fds: vec![],
        };
        let launched = launcher.launch(spec).await.unwrap();
        let exit = launched.exit.await.unwrap();
        assert_eq!(exit.code, Some(0));
        assert_eq!(exit.signal, None);
    }

    #[tokio::test]
    async fn test_launch_missing_binary_fails() {
        let launcher = OsLauncher::new();
        let spec = SpawnSpec {
            name: "ghost".to_string(),
            command: "/nonexistent/binary".to_string(),
            args: vec![],
            env: HashMap::new(),
            working_dir: None,
            user: None,
            group: None,
            ambient_capabilities: vec![],
            resource_limits: ResourceLimits::default(),
            stdout: OutputTarget::Null,
            stderr: OutputTarget::Null,
            listen_fds: vec![],
        };
        let err = launcher.launch(spec).await.unwrap_err();
        assert!(matches!(err, DomainError::SpawnError(_)));
    }

    #[tokio::test]
    async fn test_kill_terminates_child() {
        let launcher = OsLauncher::new();
        let spec = SpawnSpec {
            name: "sleeper".to_string(),
            command: "/bin/sleep".to_string(),
            args: vec!["30".to_string()],
            env: HashMap::new(),
            working_dir: None,
            user: None,
            group: None,
            ambient_capabilities: vec![],
            resource_limits: ResourceLimits::default(),
            stdout: OutputTarget::Null,
            stderr: OutputTarget::Null,
            listen_fds: vec![],
        };
        let launched = launcher.launch(spec).await.unwrap();
        launcher
            .kill(launched.pid, libc::SIGTERM, KillMode::Process)
            .await
            .unwrap();
        let exit = launched.exit.await.unwrap();
        assert_eq!(exit.signal, Some(libc::SIGTERM));
    }

    #[tokio::test]
    async fn test_stdout_appends_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.log");
        let launcher = OsLauncher::new();
        for _ in 0..2 {
            let spec = SpawnSpec {
                name: "echo".to_string(),
                command: "/bin/echo".to_string(),
                args: vec!["hello".to_string()],
                env: HashMap::new(),
                working_dir: None,
                user: None,
                group: None,
                ambient_capabilities: vec![],
                resource_limits: ResourceLimits::default(),
                stdout: OutputTarget::File(out.clone()),
                stderr: OutputTarget::Null,
                listen_fds: vec![],
            };
            let launched = launcher.launch(spec).await.unwrap();
            let _ = launched.exit.await;
        }
        let contents = std::fs::read_to_string(&out).unwrap();
        assert_eq!(contents, "hello\nhello\n");
    }
}
