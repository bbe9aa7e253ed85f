use std::process::Command;

fn rustle_connect(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_rustle-connect"))
        .arg("--no-ssh-config")
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn test_run_exits_with_command_return_code() {
    assert_eq!(rustle_connect(&["run", "exit 3"]).status.code(), Some(3));
    assert_eq!(rustle_connect(&["run", "--warn", "exit 3"]).status.code(), Some(3));
}

#[test]
fn test_successful_run() {
    let output = rustle_connect(&["run", "echo ok"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("ok"));
}
