//! YAML configuration loading: defaults, all-or-nothing files, and
//! directory sweeps.

use psup_engine::domain::RestartPolicy;
use psup_engine::{DomainError, ProcessState};
use psup_e2e_tests::{test_engine, wait_for_state};

#[tokio::test]
async fn test_minimal_entry_gets_defaults() {
    let (engine, root) = test_engine();
    let path = root.path().join("procs.yaml");
    std::fs::write(
        &path,
        "processes:\n  - name: web\n    command: /bin/sleep\n    args: [\"300\"]\n",
    )
    .unwrap();

    engine.load_config_file(&path).unwrap();
    let def = engine.get("web").unwrap();
    assert_eq!(def.restart_policy, RestartPolicy::Never);
    assert_eq!(def.kill_signal, "SIGTERM");
    assert_eq!(def.timeout_stop_sec, 10);
    assert_eq!(def.success_exit_status, vec![0]);
    assert_eq!(def.state(), ProcessState::Created);
}

#[tokio::test]
async fn test_bad_entry_rejects_whole_file() {
    let (engine, root) = test_engine();
    let path = root.path().join("procs.yaml");
    std::fs::write(
        &path,
        concat!(
            "processes:\n",
            "  - name: good\n",
            "    command: /bin/true\n",
            "  - name: \"bad name\"\n",
            "    command: /bin/true\n",
        ),
    )
    .unwrap();

    let err = engine.load_config_file(&path).unwrap_err();
    assert!(matches!(err, DomainError::InvalidName(_)));
    // All-or-nothing: the valid entry did not land either.
    assert!(engine.get("good").is_none());
}

#[tokio::test]
async fn test_parse_error_names_file_and_line() {
    let (engine, root) = test_engine();
    let path = root.path().join("broken.yaml");
    std::fs::write(
        &path,
        "processes:\n  - name: web\n    command: /bin/true\n    restart_policy: occasionally\n",
    )
    .unwrap();

    let err = engine.load_config_file(&path).unwrap_err();
    match err {
        DomainError::ConfigError { file, line, .. } => {
            assert!(file.ends_with("broken.yaml"));
            assert!(line > 0);
        }
        other => panic!("expected config error, got {other}"),
    }
}

#[tokio::test]
async fn test_directory_load_skips_bad_files() {
    let (engine, root) = test_engine();
    let conf = root.path().join("conf.d");
    std::fs::create_dir(&conf).unwrap();
    std::fs::write(
        conf.join("10-web.yaml"),
        "processes:\n  - name: web\n    command: /bin/true\n",
    )
    .unwrap();
    std::fs::write(conf.join("20-broken.yaml"), "processes: {not a list}\n").unwrap();
    std::fs::write(
        conf.join("30-db.yaml"),
        "processes:\n  - name: db\n    command: /bin/true\n",
    )
    .unwrap();

    let loaded = engine.load_config_dir(&conf).unwrap();
    assert_eq!(loaded, 2);
    assert!(engine.get("web").is_some());
    assert!(engine.get("db").is_some());
}

#[tokio::test]
async fn test_automatic_processes_start_after_load() {
    let (engine, root) = test_engine();
    let path = root.path().join("auto.yaml");
    std::fs::write(
        &path,
        concat!(
            "processes:\n",
            "  - name: auto-svc\n",
            "    command: /bin/sleep\n",
            "    args: [\"300\"]\n",
            "    start_behavior: automatic\n",
            "  - name: manual-svc\n",
            "    command: /bin/sleep\n",
            "    args: [\"300\"]\n",
        ),
    )
    .unwrap();

    engine.load_config_file(&path).unwrap();
    wait_for_state(&engine, "auto-svc", ProcessState::Running).await;
    assert_eq!(engine.get("manual-svc").unwrap().state(), ProcessState::Created);
    engine.stop("auto-svc").await.unwrap();
}

#[tokio::test]
async fn test_duplicate_across_files_rejects_second_file() {
    let (engine, root) = test_engine();
    let first = root.path().join("first.yaml");
    let second = root.path().join("second.yaml");
    std::fs::write(
        &first,
        "processes:\n  - name: web\n    command: /bin/true\n",
    )
    .unwrap();
    std::fs::write(
        &second,
        concat!(
            "processes:\n",
            "  - name: fresh\n",
            "    command: /bin/true\n",
            "  - name: web\n",
            "    command: /bin/false\n",
        ),
    )
    .unwrap();

    engine.load_config_file(&first).unwrap();
    let err = engine.load_config_file(&second).unwrap_err();
    assert!(matches!(err, DomainError::DuplicateProcess(_)));
    assert!(engine.get("fresh").is_none());
    assert_eq!(engine.get("web").unwrap().command, "/bin/true");
}
