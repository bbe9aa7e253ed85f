use rustle_connect::execution::{CommandError, RunOptions};
use rustle_connect::{ConnectSettings, Connection, Host, LocalConnection, LocalHost};
use std::time::Duration;
use tempfile::TempDir;

fn local() -> LocalConnection {
    LocalConnection::new(LocalHost::new(), &ConnectSettings::without_ssh_config())
}

#[tokio::test]
async fn test_echo_hidden() {
    let result = local().run("echo hi", &RunOptions::new()).await.unwrap();
    assert!(result.ok());
    assert_eq!(result.return_code, 0);
    assert_eq!(result.stdout, "hi");
    assert_eq!(result.stderr, "");
    assert_eq!(result.command, "echo hi");
}

#[tokio::test]
async fn test_visible_run_still_captures() {
    let options = RunOptions::new().with_hide(false).with_warn(true);
    let result = local()
        .run("printf 'a\\r\\nb\\n'; echo err >&2", &options)
        .await
        .unwrap();
    assert_eq!(result.stdout, "a\nb");
    assert_eq!(result.stderr, "err");
}

#[tokio::test]
async fn test_failure_with_warn_returns_result() {
    let result = local()
        .run("false", &RunOptions::new().with_warn(true))
        .await
        .unwrap();
    assert!(!result.ok());
    assert_eq!(result.return_code, 1);
}

#[tokio::test]
async fn test_failure_without_warn_is_an_error() {
    match local().run("exit 3", &RunOptions::new()).await {
        Err(CommandError::Failed { return_code, .. }) => assert_eq!(return_code, 3),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stderr_without_warn_is_an_error() {
    assert!(matches!(
        local().run("echo oops >&2", &RunOptions::new()).await,
        Err(CommandError::Stderr { .. })
    ));
}

#[tokio::test]
async fn test_runs_are_deterministic() {
    let conn = local();
    let options = RunOptions::new().with_warn(true);
    let command = "echo out; echo err >&2; exit 4";

    let first = conn.run(command, &options).await.unwrap();
    let second = conn.run(command, &options).await.unwrap();
    assert_eq!(
        (first.return_code, &first.stdout, &first.stderr),
        (second.return_code, &second.stdout, &second.stderr)
    );
    assert_eq!(first.return_code, 4);
}

#[tokio::test]
async fn test_cwd_and_env() {
    let dir = TempDir::new().unwrap();
    let options = RunOptions::new()
        .with_cwd(dir.path().to_string_lossy())
        .with_env("RUSTLE_GREETING", "hello");

    let result = local()
        .run("echo $RUSTLE_GREETING; pwd", &options)
        .await
        .unwrap();
    let lines: Vec<&str> = result.stdout.lines().collect();
    assert_eq!(lines[0], "hello");

    let dir_name = dir.path().file_name().unwrap().to_string_lossy().to_string();
    assert!(lines[1].ends_with(&dir_name));
}

#[tokio::test]
async fn test_cwd_expands_home() {
    let conn = local();
    let home = conn
        .run("cd \"$HOME\" && pwd", &RunOptions::new())
        .await
        .unwrap()
        .stdout;

    for cwd in ["~", "$HOME"] {
        let result = conn
            .run("pwd", &RunOptions::new().with_cwd(cwd))
            .await
            .unwrap();
        assert_eq!(result.stdout, home, "cwd {cwd}");
        assert_eq!(result.stderr, "");
    }
}

#[tokio::test]
async fn test_timeout_is_fatal() {
    let options = RunOptions::new().with_timeout(Duration::from_millis(200));
    assert!(matches!(
        local().run("sleep 5", &options).await,
        Err(CommandError::Timeout { .. })
    ));
}

#[tokio::test]
async fn test_promise_exposes_exit_status() {
    let conn = local();
    let mut promise = conn
        .run_promise("echo streamed", &RunOptions::new())
        .await
        .unwrap();
    assert_eq!(promise.command(), "echo streamed");
    assert_eq!(promise.wait().await.unwrap(), 0);
    assert!(promise.is_done());

    let result = promise.get_result(true, false).await.unwrap();
    assert_eq!(result.stdout, "streamed");
}

#[tokio::test]
async fn test_connect_local_host() {
    let conn = Host::local()
        .connect(&ConnectSettings::without_ssh_config())
        .unwrap();
    assert!(conn.host().is_local());
    assert!(conn.run("true", &RunOptions::new()).await.unwrap().ok());
    conn.close().await.unwrap();
}
