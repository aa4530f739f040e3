//! Per-process supervision actor.
//!
//! Each registered process gets one actor owning a serialized event
//! queue. All state transitions for the process happen inside its
//! actor, so no two lifecycle decisions for the same process ever
//! interleave. A spawn is awaited inside the event handler, which
//! means a stop queued during a spawn is processed only once the spawn
//! has finished.

use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::{
    DomainError, ExitStatus, ProcessDefinition, ProcessId, ProcessState, Result,
};
use crate::health;
use crate::registry::ProcessRegistry;
use crate::spawn::Spawner;
use crate::supervisor::{BackoffStrategy, ProcessEvent};

/// Handle the engine keeps per actor. Dropping it ends the actor once
/// the queue drains.
#[derive(Clone)]
pub struct ActorHandle {
    tx: mpsc::UnboundedSender<ProcessEvent>,
}

impl ActorHandle {
    pub async fn start(&self, listen_fds: Vec<RawFd>, manual: bool) -> Result<u32> {
        let (tx, rx) = oneshot::channel();
        self.send(ProcessEvent::StartRequested {
            listen_fds,
            manual,
            resp: Some(tx),
        })?;
        rx.await
            .map_err(|_| DomainError::SpawnError("supervision actor is gone".to_string()))?
    }

    pub async fn stop(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(ProcessEvent::StopRequested { resp: Some(tx) })?;
        rx.await
            .map_err(|_| DomainError::SpawnError("supervision actor is gone".to_string()))?
    }

    fn send(&self, event: ProcessEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| DomainError::SpawnError("supervision actor is gone".to_string()))
    }
}

pub fn spawn_actor(
    id: ProcessId,
    name: String,
    registry: Arc<ProcessRegistry>,
    spawner: Arc<Spawner>,
    backoff: BackoffStrategy,
    shutdown: CancellationToken,
) -> ActorHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let actor = ProcessActor {
        id,
        name,
        registry,
        spawner,
        backoff,
        self_tx: tx.clone(),
        health_cancel: None,
        restart_cancel: None,
        escalation_cancel: None,
        stop_responders: Vec::new(),
        health_failed: false,
    };
    tokio::spawn(actor.run(rx, shutdown));
    ActorHandle { tx }
}

struct ProcessActor {
    id: ProcessId,
    name: String,
    registry: Arc<ProcessRegistry>,
    spawner: Arc<Spawner>,
    backoff: BackoffStrategy,
    self_tx: mpsc::UnboundedSender<ProcessEvent>,
    health_cancel: Option<CancellationToken>,
    restart_cancel: Option<CancellationToken>,
    escalation_cancel: Option<CancellationToken>,
    stop_responders: Vec<oneshot::Sender<Result<()>>>,
    health_failed: bool,
}

impl ProcessActor {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<ProcessEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = shutdown.cancelled() => break,
            };
            debug!(process = %self.name, event = ?event, "handling event");
            match event {
                ProcessEvent::StartRequested {
                    listen_fds,
                    manual,
                    resp,
                } => self.handle_start(listen_fds, manual, resp).await,
                ProcessEvent::StopRequested { resp } => self.handle_stop(resp).await,
                ProcessEvent::Terminated { exit } => self.handle_terminated(exit).await,
                ProcessEvent::HealthFailed => self.handle_health_failed().await,
                ProcessEvent::RestartDue => self.handle_start(Vec::new(), false, None).await,
            }
        }
        self.cancel_timers();
        debug!(process = %self.name, "supervision actor stopped");
    }

    async fn handle_start(
        &mut self,
        listen_fds: Vec<RawFd>,
        manual: bool,
        resp: Option<oneshot::Sender<Result<u32>>>,
    ) {
        let Some(definition) = self.registry.get(self.id) else {
            respond(resp, Err(DomainError::ProcessNotFound(self.name.clone())));
            return;
        };

        match definition.state() {
            ProcessState::Running => {
                // Idempotent: starting a running process reports its pid.
                let pid = definition.pid().unwrap_or_default();
                respond(resp, Ok(pid));
                return;
            }
            ProcessState::Stopping | ProcessState::Starting => {
                respond(
                    resp,
                    Err(DomainError::InvalidStateTransition {
                        from: definition.state().to_string(),
                        to: ProcessState::Starting.to_string(),
                    }),
                );
                return;
            }
            _ => {}
        }

        // A start supersedes any pending restart timer.
        if let Some(cancel) = self.restart_cancel.take() {
            cancel.cancel();
        }

        let now = SystemTime::now();
        let allowed = self
            .registry
            .update(self.id, |def| {
                if manual {
                    def.reset_start_limit();
                }
                def.try_record_start_attempt(now)
            })
            .unwrap_or(false);
        if !allowed {
            warn!(
                process = %self.name,
                burst = definition.start_limit_burst,
                interval_sec = definition.start_limit_interval_sec,
                "start limit exceeded, refusing to start"
            );
            let _ = self.registry.update(self.id, |def| def.mark_failed());
            respond(
                resp,
                Err(DomainError::SpawnError(format!(
                    "start limit exceeded for '{}'",
                    self.name
                ))),
            );
            return;
        }

        let _ = self.registry.update(self.id, |def| def.mark_starting());
        self.health_failed = false;

        let result = self.run_start_sequence(&definition, listen_fds).await;
        match result {
            Ok(launched) => {
                let pid = launched.pid;
                let _ = self.registry.update(self.id, |def| def.mark_running(pid));
                info!(process = %self.name, pid = pid, "process running");

                let exit_tx = self.self_tx.clone();
                let exit = launched.exit;
                tokio::spawn(async move {
                    if let Ok(status) = exit.await {
                        let _ = exit_tx.send(ProcessEvent::Terminated { exit: status });
                    }
                });

                if !definition.hooks.post_start.is_empty() {
                    let name = self.name.clone();
                    let hooks = definition.hooks.post_start.clone();
                    tokio::spawn(async move {
                        crate::spawn::hooks::execute_hooks_logged(&name, "post-start", &hooks)
                            .await;
                    });
                }

                if let Some(check) = definition.health_check.clone() {
                    let cancel = CancellationToken::new();
                    health::spawn_monitor(
                        self.name.clone(),
                        check,
                        self.self_tx.clone(),
                        cancel.clone(),
                    );
                    self.health_cancel = Some(cancel);
                }

                respond(resp, Ok(pid));
            }
            Err(e) => {
                error!(process = %self.name, error = %e, "start failed");
                let _ = self.registry.update(self.id, |def| def.mark_spawn_failed());
                respond(resp, Err(e));
                // A failed spawn counts as a failure termination for
                // the restart policy.
                if definition.restart_policy.should_restart(false) {
                    self.maybe_schedule_restart().await;
                }
            }
        }
    }

    async fn run_start_sequence(
        &self,
        definition: &ProcessDefinition,
        listen_fds: Vec<RawFd>,
    ) -> Result<crate::spawn::LaunchedProcess> {
        let start = self.spawner.start(definition, listen_fds);
        if definition.timeout_start_sec == 0 {
            return start.await;
        }
        match tokio::time::timeout(Duration::from_secs(definition.timeout_start_sec), start).await
        {
            Ok(result) => result,
            Err(_) => Err(DomainError::SpawnError(format!(
                "start of '{}' timed out after {}s",
                self.name, definition.timeout_start_sec
            ))),
        }
    }

    async fn handle_stop(&mut self, resp: Option<oneshot::Sender<Result<()>>>) {
        self.cancel_timers();

        let Some(definition) = self.registry.get(self.id) else {
            respond(resp, Err(DomainError::ProcessNotFound(self.name.clone())));
            return;
        };

        match (definition.state(), definition.pid()) {
            (ProcessState::Running | ProcessState::Starting, Some(pid)) => {
                let _ = self.registry.update(self.id, |def| def.mark_stopping());
                if let Some(tx) = resp {
                    self.stop_responders.push(tx);
                }
                if let Err(e) = self.spawner.signal_stop(&definition, pid).await {
                    warn!(process = %self.name, pid = pid, error = %e, "stop signal failed");
                }
                self.arm_kill_escalation(&definition, pid);
            }
            _ => {
                // Nothing is running. An explicit stop still lands the
                // process in the stopped state, clearing a failure.
                if definition.state() != ProcessState::Created {
                    let _ = self.registry.update(self.id, |def| def.mark_stopped());
                }
                respond(resp, Ok(()));
            }
        }
    }

    async fn handle_terminated(&mut self, exit: ExitStatus) {
        self.cancel_timers();

        let Some(definition) = self.registry.get(self.id) else {
            return;
        };
        if let Some(pidfile) = &definition.pidfile {
            crate::spawn::remove_pidfile(pidfile);
        }

        let explicit_stop = definition.state() == ProcessState::Stopping;
        let success =
            !self.health_failed && exit.is_success(&definition.success_exit_status);
        self.health_failed = false;

        info!(
            process = %self.name,
            code = ?exit.code,
            signal = ?exit.signal,
            success = success,
            "process terminated"
        );

        if explicit_stop {
            crate::spawn::hooks::execute_hooks_logged(
                &self.name,
                "post-stop",
                &definition.hooks.post_stop,
            )
            .await;
            self.spawner.cleanup(&definition);
            let _ = self.registry.update(self.id, |def| {
                def.mark_exited(exit, ProcessState::Stopped)
            });
            for tx in self.stop_responders.drain(..) {
                let _ = tx.send(Ok(()));
            }
            return;
        }

        let next_state = if success {
            ProcessState::Stopped
        } else {
            ProcessState::Failed
        };
        let _ = self
            .registry
            .update(self.id, |def| def.mark_exited(exit, next_state));

        crate::spawn::hooks::execute_hooks_logged(
            &self.name,
            "post-stop",
            &definition.hooks.post_stop,
        )
        .await;

        if definition.restart_policy.should_restart(success) {
            self.maybe_schedule_restart().await;
        } else {
            self.spawner.cleanup(&definition);
        }
    }

    async fn handle_health_failed(&mut self) {
        let Some(definition) = self.registry.get(self.id) else {
            return;
        };
        let (state, pid) = (definition.state(), definition.pid());
        if state != ProcessState::Running {
            return;
        }
        let Some(pid) = pid else { return };
        warn!(process = %self.name, pid = pid, "health check failed, terminating process");
        // The exit is then judged a failure regardless of exit code,
        // feeding the restart policy like any crash.
        self.health_failed = true;
        if let Err(e) = self.spawner.signal_stop(&definition, pid).await {
            warn!(process = %self.name, pid = pid, error = %e, "failed to signal unhealthy process");
        }
        self.arm_kill_escalation(&definition, pid);
    }

    /// Escalate to SIGKILL if the process outlives its grace period.
    /// Cancelled by the termination handler.
    fn arm_kill_escalation(&mut self, definition: &ProcessDefinition, pid: u32) {
        let cancel = CancellationToken::new();
        self.escalation_cancel = Some(cancel.clone());
        let spawner = Arc::clone(&self.spawner);
        let def = definition.clone();
        let grace = Duration::from_secs(def.timeout_stop_sec);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(grace) => {
                    warn!(process = %def.name(), pid = pid, "stop timeout, escalating to SIGKILL");
                    let _ = spawner.signal_kill(&def, pid).await;
                }
            }
        });
    }

    /// Schedule a restart after the backoff delay, unless the start
    /// limit is already exhausted.
    async fn maybe_schedule_restart(&mut self) {
        let Some(definition) = self.registry.get(self.id) else {
            return;
        };
        let attempt = definition.consecutive_failures().max(1);
        let delay = self.backoff.delay(&definition, attempt);
        info!(
            process = %self.name,
            delay_sec = delay.as_secs(),
            attempt = attempt,
            "scheduling restart"
        );

        let cancel = CancellationToken::new();
        self.restart_cancel = Some(cancel.clone());
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(ProcessEvent::RestartDue);
                }
            }
        });
    }

    fn cancel_timers(&mut self) {
        if let Some(cancel) = self.health_cancel.take() {
            cancel.cancel();
        }
        if let Some(cancel) = self.restart_cancel.take() {
            cancel.cancel();
        }
        if let Some(cancel) = self.escalation_cancel.take() {
            cancel.cancel();
        }
    }
}

fn respond<T>(resp: Option<oneshot::Sender<Result<T>>>, result: Result<T>) {
    if let Some(tx) = resp {
        let _ = tx.send(result);
    }
}
