//! Supervisor engine: the public face of the crate.
//!
//! The engine owns the registry, one supervision actor per process,
//! the spawner, and the socket activator. It is cheap to clone; all
//! clones share the same state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config;
use crate::deps::DependencyGraph;
use crate::domain::{
    CreateProcessCommand, DomainError, ProcessDefinition, ProcessId, ProcessState, Result,
    StartBehavior,
};
use crate::registry::ProcessRegistry;
use crate::socket::{ActivationEvent, SocketActivator};
use crate::spawn::{OsLauncher, ProcessLauncher, Spawner};
use crate::supervisor::{spawn_actor, ActorHandle, BackoffStrategy};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root under which `runtime_directory` entries are created.
    pub runtime_dir_root: PathBuf,
    /// Stop an active conflicting process instead of refusing the
    /// start. Off by default; the default behavior is a strict reject.
    pub conflict_auto_stop: bool,
    pub backoff: BackoffStrategy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            runtime_dir_root: PathBuf::from("/run"),
            conflict_auto_stop: false,
            backoff: BackoffStrategy::default(),
        }
    }
}

struct ActorEntry {
    handle: ActorHandle,
    cancel: CancellationToken,
}

struct Inner {
    config: EngineConfig,
    registry: Arc<ProcessRegistry>,
    spawner: Arc<Spawner>,
    activator: SocketActivator,
    activation_tx: mpsc::UnboundedSender<ActivationEvent>,
    actors: Mutex<HashMap<ProcessId, ActorEntry>>,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Engine backed by the real fork/exec launcher.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_launcher(config, Arc::new(OsLauncher::new()))
    }

    pub fn with_launcher(config: EngineConfig, launcher: Arc<dyn ProcessLauncher>) -> Self {
        let registry = Arc::new(ProcessRegistry::new());
        let spawner = Arc::new(Spawner::new(launcher, config.runtime_dir_root.clone()));
        let (activation_tx, activation_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            config,
            registry,
            spawner,
            activator: SocketActivator::new(),
            activation_tx,
            actors: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        });
        spawn_activation_dispatcher(Arc::downgrade(&inner), activation_rx);
        Self { inner }
    }

    /// Validate and register a process. An `automatic` process gets a
    /// follow-up start whose failure is logged, not rolled back.
    pub fn create(&self, cmd: CreateProcessCommand) -> Result<ProcessId> {
        let definition = ProcessDefinition::from_command(cmd)?;
        let name = definition.name().to_string();
        let socket = definition.socket.clone();
        let start_behavior = definition.start_behavior;

        let id = self.inner.registry.insert(definition)?;
        self.register_actor(id, &name);

        if let Some(spec) = socket {
            if let Err(e) = self
                .inner
                .activator
                .bind(&name, &spec, self.inner.activation_tx.clone())
            {
                self.teardown(id);
                return Err(e);
            }
        }

        info!(process = %name, id = %id, "process created");

        if start_behavior == StartBehavior::Automatic {
            let engine = self.clone();
            let name = name.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.start(&name).await {
                    error!(process = %name, error = %e, "automatic start failed");
                }
            });
        }
        Ok(id)
    }

    /// Start a process and its dependency closure, dependencies first.
    pub async fn start(&self, name: &str) -> Result<u32> {
        self.start_with(name, true).await
    }

    async fn start_with(&self, name: &str, manual: bool) -> Result<u32> {
        let snapshot = self.inner.registry.snapshot();
        let graph = DependencyGraph::from_snapshot(&snapshot);
        let order = graph.start_order(name)?;
        let required = graph.required_closure(name);

        let mut target_pid = 0;
        for member in &order {
            let is_target = member == name;
            if let Some(conflict) = self.live_conflict(&graph, member) {
                if self.inner.config.conflict_auto_stop {
                    warn!(
                        process = %member,
                        conflict = %conflict,
                        "stopping conflicting process before start"
                    );
                    self.stop(&conflict).await?;
                } else if is_target || required.contains(member.as_str()) {
                    return Err(DomainError::ConflictError(conflict));
                } else {
                    warn!(
                        process = %name,
                        dependency = %member,
                        conflict = %conflict,
                        "skipping soft dependency with an active conflict"
                    );
                    continue;
                }
            }
            let handle = self.handle_for(member)?;
            let fds = self.inner.activator.fd_for(member).into_iter().collect();
            let result = handle.start(fds, manual && is_target).await;
            match result {
                Ok(pid) => {
                    if is_target {
                        target_pid = pid;
                    }
                }
                Err(e) if is_target || required.contains(member.as_str()) => {
                    error!(process = %name, dependency = %member, error = %e, "start aborted");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        process = %name,
                        dependency = %member,
                        error = %e,
                        "soft dependency failed to start"
                    );
                }
            }
        }
        Ok(target_pid)
    }

    /// Stop a process: signal, await termination, run post-stop
    /// cleanup. Cancels any pending restart.
    pub async fn stop(&self, name: &str) -> Result<()> {
        self.handle_for(name)?.stop().await
    }

    pub async fn restart(&self, name: &str) -> Result<u32> {
        self.stop(name).await?;
        self.start(name).await
    }

    /// Remove a process from the registry. A live process is refused
    /// unless `force`, which stops it first.
    pub async fn delete(&self, name: &str, force: bool) -> Result<()> {
        let definition = self
            .inner
            .registry
            .get_by_name(name)
            .ok_or_else(|| DomainError::ProcessNotFound(name.to_string()))?;
        let state = definition.state();
        // A Created definition never ran; deleting it needs no stop.
        if !state.is_terminal() && state != ProcessState::Created {
            if !force {
                return Err(DomainError::InvalidStateTransition {
                    from: state.to_string(),
                    to: "deleted".to_string(),
                });
            }
            self.stop(name).await?;
        }
        self.teardown(definition.id());
        info!(process = %name, "process deleted");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ProcessDefinition> {
        self.inner.registry.get_by_name(name)
    }

    pub fn list(&self) -> Vec<ProcessDefinition> {
        self.inner.registry.snapshot()
    }

    /// Load one configuration file. All entries are validated before
    /// any is registered; a bad entry rejects the whole file.
    pub fn load_config_file(&self, path: &Path) -> Result<Vec<ProcessId>> {
        let commands = config::parse_config_file(path)?;
        let mut definitions = Vec::with_capacity(commands.len());
        for cmd in commands {
            definitions.push(ProcessDefinition::from_command(cmd)?);
        }

        let mut autostart = Vec::new();
        let mut sockets = Vec::new();
        for def in &definitions {
            if def.start_behavior == StartBehavior::Automatic {
                autostart.push(def.name().to_string());
            }
            if let Some(spec) = &def.socket {
                sockets.push((def.name().to_string(), spec.clone()));
            }
        }
        let names: Vec<(ProcessId, String)> = definitions
            .iter()
            .map(|d| (d.id(), d.name().to_string()))
            .collect();

        let ids = self.inner.registry.insert_batch(definitions)?;
        for (id, name) in &names {
            self.register_actor(*id, name);
        }
        for (name, spec) in sockets {
            if let Err(e) = self
                .inner
                .activator
                .bind(&name, &spec, self.inner.activation_tx.clone())
            {
                error!(process = %name, error = %e, "failed to bind activation socket");
            }
        }
        info!(file = %path.display(), processes = ids.len(), "configuration loaded");

        for name in autostart {
            let engine = self.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.start(&name).await {
                    error!(process = %name, error = %e, "automatic start failed");
                }
            });
        }
        Ok(ids)
    }

    /// Load every configuration file in a directory, name order. Bad
    /// files are logged and skipped; the rest still load.
    pub fn load_config_dir(&self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        for path in config::config_files_in(dir)? {
            match self.load_config_file(&path) {
                Ok(ids) => loaded += ids.len(),
                Err(e) => {
                    error!(file = %path.display(), error = %e, "skipping configuration file");
                }
            }
        }
        Ok(loaded)
    }

    /// Stop every active process and end all actors.
    pub async fn shutdown(&self) {
        info!("engine shutting down");
        let names: Vec<String> = self
            .inner
            .registry
            .snapshot()
            .into_iter()
            .filter(|d| d.state().is_active())
            .map(|d| d.name().to_string())
            .collect();
        for name in names {
            if let Err(e) = self.stop(&name).await {
                warn!(process = %name, error = %e, "stop during shutdown failed");
            }
        }
        self.inner.shutdown.cancel();
    }

    fn register_actor(&self, id: ProcessId, name: &str) {
        let cancel = self.inner.shutdown.child_token();
        let handle = spawn_actor(
            id,
            name.to_string(),
            Arc::clone(&self.inner.registry),
            Arc::clone(&self.inner.spawner),
            self.inner.config.backoff,
            cancel.clone(),
        );
        self.lock_actors().insert(id, ActorEntry { handle, cancel });
    }

    fn teardown(&self, id: ProcessId) {
        if let Some(entry) = self.lock_actors().remove(&id) {
            entry.cancel.cancel();
        }
        let _ = self.inner.registry.remove(id);
    }

    /// Conflicts are resolved against the current registry state, not
    /// the snapshot the graph was built from, so a process stopped
    /// earlier in the same start sequence no longer blocks.
    fn live_conflict(&self, graph: &DependencyGraph, member: &str) -> Option<String> {
        let conflict = graph.active_conflict(member)?;
        let active = self
            .inner
            .registry
            .get_by_name(&conflict)
            .map(|d| d.state().is_active())
            .unwrap_or(false);
        active.then_some(conflict)
    }

    fn handle_for(&self, name: &str) -> Result<ActorHandle> {
        let id = self
            .inner
            .registry
            .id_of(name)
            .ok_or_else(|| DomainError::ProcessNotFound(name.to_string()))?;
        self.lock_actors()
            .get(&id)
            .map(|entry| entry.handle.clone())
            .ok_or_else(|| DomainError::ProcessNotFound(name.to_string()))
    }

    fn lock_actors(&self) -> std::sync::MutexGuard<'_, HashMap<ProcessId, ActorEntry>> {
        match self.inner.actors.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Receive socket readiness events and start the owning process. A
/// connection while the process is already active is left alone; the
/// running process owns the listening fd.
fn spawn_activation_dispatcher(
    inner: Weak<Inner>,
    mut rx: mpsc::UnboundedReceiver<ActivationEvent>,
) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Some(inner) = inner.upgrade() else { return };
            let Some(definition) = inner.registry.get_by_name(&event.process) else {
                continue;
            };
            if definition.state().is_active() || definition.state() == ProcessState::Stopping {
                continue;
            }
            info!(process = %event.process, fd = event.fd, "socket activation");
            let engine = Engine { inner };
            if let Err(e) = engine.start_with(&event.process, false).await {
                error!(process = %event.process, error = %e, "socket activation start failed");
            }
        }
    });
}
