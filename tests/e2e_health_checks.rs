//! Health probing driving the process lifecycle.

use std::time::Duration;

use psup_engine::domain::{HealthCheck, HealthCheckKind, RestartPolicy};
use psup_engine::ProcessState;
use psup_e2e_tests::{sleeper, test_engine, wait_for_run_count, wait_for_state};
use serial_test::serial;

fn exec_check(target: &str) -> HealthCheck {
    HealthCheck {
        kind: HealthCheckKind::Exec,
        target: target.to_string(),
        interval_sec: 1,
        timeout_sec: 2,
        retries: 2,
    }
}

#[tokio::test]
#[serial]
async fn test_healthy_process_keeps_running() {
    let (engine, _root) = test_engine();
    let mut cmd = sleeper("healthy");
    cmd.health_check = Some(exec_check("/bin/true"));
    engine.create(cmd).unwrap();
    engine.start("healthy").await.unwrap();

    // Several probe intervals pass without incident.
    tokio::time::sleep(Duration::from_secs(4)).await;
    let def = engine.get("healthy").unwrap();
    assert_eq!(def.state(), ProcessState::Running);
    assert_eq!(def.run_count(), 1);

    engine.stop("healthy").await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_unhealthy_process_is_terminated_and_restarted() {
    let (engine, _root) = test_engine();
    let mut cmd = sleeper("ailing");
    cmd.health_check = Some(exec_check("/bin/false"));
    cmd.restart_policy = RestartPolicy::OnFailure;
    cmd.restart_delay_sec = 0;
    cmd.start_limit_burst = 100;
    engine.create(cmd).unwrap();
    engine.start("ailing").await.unwrap();

    // Two failed probes a second apart trip the check; the process is
    // killed and the failure feeds the restart policy.
    wait_for_run_count(&engine, "ailing", 2).await;
    engine.stop("ailing").await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_unhealthy_process_without_restart_fails() {
    let (engine, _root) = test_engine();
    let mut cmd = sleeper("doomed");
    cmd.health_check = Some(exec_check("/bin/false"));
    engine.create(cmd).unwrap();
    engine.start("doomed").await.unwrap();

    wait_for_state(&engine, "doomed", ProcessState::Failed).await;
    assert_eq!(engine.get("doomed").unwrap().run_count(), 1);
}

#[tokio::test]
#[serial]
async fn test_probes_stop_after_explicit_stop() {
    let (engine, root) = test_engine();
    let marker = root.path().join("probe-ran");
    let mut cmd = sleeper("probed");
    cmd.health_check = Some(exec_check(&format!("/usr/bin/touch {}", marker.display())));
    engine.create(cmd).unwrap();
    engine.start("probed").await.unwrap();
    engine.stop("probed").await.unwrap();

    // Any probe marker from before the stop is irrelevant; after the
    // stop no new probe may run.
    let _ = std::fs::remove_file(&marker);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!marker.exists());
}

#[tokio::test]
#[serial]
async fn test_tcp_health_check_against_own_listener() {
    let (engine, _root) = test_engine();
    // A stand-in listener plays the part of the service's port.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let mut cmd = sleeper("tcp-svc");
    cmd.health_check = Some(HealthCheck {
        kind: HealthCheckKind::Tcp,
        target: addr,
        interval_sec: 1,
        timeout_sec: 2,
        retries: 2,
    });
    engine.create(cmd).unwrap();
    engine.start("tcp-svc").await.unwrap();

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(engine.get("tcp-svc").unwrap().state(), ProcessState::Running);
    engine.stop("tcp-svc").await.unwrap();
}
