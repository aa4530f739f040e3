//! Name uniqueness across the registry.

use psup_engine::domain::CreateProcessCommand;
use psup_engine::DomainError;
use psup_e2e_tests::{sleeper, test_engine};

#[tokio::test]
async fn test_duplicate_name_is_rejected() {
    let (engine, _root) = test_engine();
    engine.create(sleeper("web")).unwrap();
    let err = engine.create(sleeper("web")).unwrap_err();
    assert!(matches!(err, DomainError::DuplicateProcess(name) if name == "web"));
    assert_eq!(engine.list().len(), 1);
}

#[tokio::test]
async fn test_duplicate_rejection_keeps_original() {
    let (engine, _root) = test_engine();
    engine.create(sleeper("web")).unwrap();
    let original = engine.get("web").unwrap();

    let mut other = CreateProcessCommand::new("web", "/bin/true");
    other.args = vec!["different".to_string()];
    let _ = engine.create(other).unwrap_err();

    let still = engine.get("web").unwrap();
    assert_eq!(still.id(), original.id());
    assert_eq!(still.command, "/bin/sleep");
}

#[tokio::test]
async fn test_deleted_name_can_be_reused() {
    let (engine, _root) = test_engine();
    engine.create(sleeper("web")).unwrap();
    engine.delete("web", false).await.unwrap();
    assert!(engine.get("web").is_none());
    engine.create(sleeper("web")).unwrap();
    assert!(engine.get("web").is_some());
}

#[tokio::test]
async fn test_create_then_fetch_round_trip() {
    let (engine, _root) = test_engine();
    let mut cmd = sleeper("worker");
    cmd.env.insert("MODE".to_string(), "batch".to_string());
    cmd.restart_delay_sec = 7;
    let id = engine.create(cmd).unwrap();

    let fetched = engine.get("worker").unwrap();
    assert_eq!(fetched.id(), id);
    assert_eq!(fetched.name(), "worker");
    assert_eq!(fetched.command, "/bin/sleep");
    assert_eq!(fetched.env.get("MODE"), Some(&"batch".to_string()));
    assert_eq!(fetched.restart_delay_sec, 7);
    assert_eq!(fetched.run_count(), 0);
    assert_eq!(fetched.pid(), None);
}
