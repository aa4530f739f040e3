//! Shared helpers for the end-to-end suite.
//!
//! Each test builds its own in-process engine rooted in a temporary
//! directory and drives real child processes through it.

use std::time::Duration;

use psup_engine::domain::CreateProcessCommand;
use psup_engine::{Engine, EngineConfig, ProcessState};

/// Engine rooted in a fresh temp directory. Keep the guard alive for
/// the duration of the test.
pub fn test_engine() -> (Engine, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = EngineConfig {
        runtime_dir_root: dir.path().to_path_buf(),
        ..Default::default()
    };
    (Engine::new(config), dir)
}

/// A process that stays alive until stopped.
pub fn sleeper(name: &str) -> CreateProcessCommand {
    let mut cmd = CreateProcessCommand::new(name, "/bin/sleep");
    cmd.args = vec!["300".to_string()];
    cmd
}

/// A process that exits immediately with the given code.
pub fn exiting(name: &str, code: i32) -> CreateProcessCommand {
    let mut cmd = CreateProcessCommand::new(name, "/bin/sh");
    cmd.args = vec!["-c".to_string(), format!("exit {code}")];
    cmd
}

/// Poll until the process reaches `state` or the timeout expires.
pub async fn wait_for_state(engine: &Engine, name: &str, state: ProcessState) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let current = engine.get(name).map(|d| d.state());
        if current == Some(state) {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("process '{name}' never reached {state}, last seen {current:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Poll until the run count reaches at least `count`.
pub async fn wait_for_run_count(engine: &Engine, name: &str, count: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let current = engine.get(name).map(|d| d.run_count()).unwrap_or(0);
        if current >= count {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("process '{name}' run count stuck at {current}, wanted {count}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
