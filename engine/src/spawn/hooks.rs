//! Lifecycle hook execution.

use tracing::{debug, warn};

use crate::domain::{DomainError, Result};

/// Run hook command lines sequentially, stopping at the first failure.
/// Each line is split on whitespace; the first token is the program.
pub async fn execute_hooks(process: &str, phase: &str, hooks: &[String]) -> Result<()> {
    for hook in hooks {
        let mut parts = hook.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            DomainError::SpawnError(format!("empty {phase} hook for process '{process}'"))
        })?;
        debug!(process = %process, phase = %phase, hook = %hook, "running hook");
        let status = tokio::process::Command::new(program)
            .args(parts)
            .status()
            .await
            .map_err(|e| {
                DomainError::SpawnError(format!("{phase} hook '{hook}' failed to run: {e}"))
            })?;
        if !status.success() {
            return Err(DomainError::SpawnError(format!(
                "{phase} hook '{hook}' exited with {status}"
            )));
        }
    }
    Ok(())
}

/// Run hooks where failure must not affect the process lifecycle.
/// Failures are logged and swallowed.
pub async fn execute_hooks_logged(process: &str, phase: &str, hooks: &[String]) {
    if let Err(e) = execute_hooks(process, phase, hooks).await {
        warn!(process = %process, phase = %phase, error = %e, "hook failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hooks_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let hooks = vec![
            format!("/usr/bin/touch {}", a.display()),
            format!("/usr/bin/touch {}", b.display()),
        ];
        execute_hooks("test", "pre-start", &hooks).await.unwrap();
        assert!(a.exists());
        assert!(b.exists());
    }

    #[tokio::test]
    async fn test_failing_hook_stops_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let after = dir.path().join("after");
        let hooks = vec![
            "/bin/false".to_string(),
            format!("/usr/bin/touch {}", after.display()),
        ];
        assert!(execute_hooks("test", "pre-start", &hooks).await.is_err());
        assert!(!after.exists());
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let hooks = vec!["/nonexistent/hook".to_string()];
        assert!(execute_hooks("test", "post-stop", &hooks).await.is_err());
    }

    #[tokio::test]
    async fn test_logged_variant_swallows_failure() {
        let hooks = vec!["/bin/false".to_string()];
        execute_hooks_logged("test", "post-start", &hooks).await;
    }
}
