//! Periodic health probing.
//!
//! One monitor task per running process with a health check. Probe
//! failures are counted; after `retries` consecutive failures the
//! monitor reports `HealthFailed` to the process's actor and resets
//! its counter. Any probe success also resets the counter. The monitor
//! is cancelled whenever the process leaves the running state.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::{HealthCheck, HealthCheckKind};
use crate::supervisor::ProcessEvent;

pub fn spawn_monitor(
    process: String,
    check: HealthCheck,
    tx: mpsc::UnboundedSender<ProcessEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(check.interval_sec));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so a freshly
        // started process gets a full interval to come up.
        interval.tick().await;

        let mut failures = 0u32;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(process = %process, "health monitor cancelled");
                    return;
                }
                _ = interval.tick() => {}
            }

            if probe(&check).await {
                if failures > 0 {
                    debug!(process = %process, "health probe recovered");
                }
                failures = 0;
                continue;
            }

            failures += 1;
            warn!(
                process = %process,
                failures = failures,
                retries = check.retries,
                "health probe failed"
            );
            if failures >= check.retries {
                failures = 0;
                if tx.send(ProcessEvent::HealthFailed).is_err() {
                    return;
                }
            }
        }
    });
}

/// Run one probe. A probe that errors or exceeds `timeout_sec` counts
/// as a failure.
async fn probe(check: &HealthCheck) -> bool {
    let timeout = Duration::from_secs(check.timeout_sec);
    match check.kind {
        HealthCheckKind::Http => probe_http(check.target.clone(), timeout).await,
        HealthCheckKind::Tcp => probe_tcp(&check.target, timeout).await,
        HealthCheckKind::Exec => probe_exec(&check.target, timeout).await,
    }
}

async fn probe_http(url: String, timeout: Duration) -> bool {
    let result = tokio::task::spawn_blocking(move || {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        match agent.get(&url).call() {
            Ok(response) => (200..300).contains(&response.status()),
            Err(_) => false,
        }
    })
    .await;
    result.unwrap_or(false)
}

async fn probe_tcp(target: &str, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, tokio::net::TcpStream::connect(target)).await,
        Ok(Ok(_))
    )
}

async fn probe_exec(command_line: &str, timeout: Duration) -> bool {
    let mut parts = command_line.split_whitespace();
    let Some(program) = parts.next() else {
        return false;
    };
    let status = tokio::time::timeout(
        timeout,
        tokio::process::Command::new(program).args(parts).status(),
    )
    .await;
    matches!(status, Ok(Ok(s)) if s.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(kind: HealthCheckKind, target: &str, timeout_sec: u64) -> HealthCheck {
        HealthCheck {
            kind,
            target: target.to_string(),
            interval_sec: 1,
            timeout_sec,
            retries: 2,
        }
    }

    #[tokio::test]
    async fn test_exec_probe_follows_exit_status() {
        assert!(probe(&check(HealthCheckKind::Exec, "/bin/true", 5)).await);
        assert!(!probe(&check(HealthCheckKind::Exec, "/bin/false", 5)).await);
    }

    #[tokio::test]
    async fn test_exec_probe_timeout_is_failure() {
        assert!(!probe(&check(HealthCheckKind::Exec, "/bin/sleep 10", 1)).await);
    }

    #[tokio::test]
    async fn test_tcp_probe_against_live_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(probe(&check(HealthCheckKind::Tcp, &addr.to_string(), 2)).await);
    }

    #[tokio::test]
    async fn test_tcp_probe_refused_connection_is_failure() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert!(!probe(&check(HealthCheckKind::Tcp, &addr.to_string(), 2)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_reports_after_consecutive_failures() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        spawn_monitor(
            "web".to_string(),
            check(HealthCheckKind::Exec, "/bin/false", 5),
            tx,
            cancel.clone(),
        );
        // Two failed probes at one-second intervals reach the retry
        // threshold.
        let event = tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("monitor did not report")
            .expect("channel closed");
        assert!(matches!(event, ProcessEvent::HealthFailed));
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_cancelled_monitor_stops_probing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        spawn_monitor(
            "web".to_string(),
            check(HealthCheckKind::Exec, "/bin/false", 5),
            tx,
            cancel.clone(),
        );
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
