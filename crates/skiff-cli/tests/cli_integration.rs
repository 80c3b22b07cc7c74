use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn skiff() -> Command {
    let mut cmd = Command::cargo_bin("skiff").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("SKIFF_CONNECT_TIMEOUT");
    cmd
}

#[test]
fn test_help_exits_zero() {
    skiff()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("skiff"))
        .stdout(predicate::str::contains("--check"));
}

#[test]
fn test_check_lists_steps_without_connecting() {
    let assert = skiff()
        .args(["--check", fixture_path("deploy.skiff").to_str().unwrap()])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("CONNECT deploy@10.0.0.5:2222"));
    assert!(stdout.contains("UPLOAD ./dist, ./static/robots.txt to releases/{{RELEASE}}"));
    assert!(stdout.contains("RUN ln -sfn releases/{{RELEASE}} current"));
    assert!(stdout.contains("9 step(s)"));

    // Passwords and trailing comments never show up
    assert!(!stdout.contains("hunter2"));
    assert!(!stdout.contains("switch the symlink"));
}

#[test]
fn test_check_json_output() {
    let assert = skiff()
        .args([
            "--check",
            "--format",
            "json",
            fixture_path("deploy.skiff").to_str().unwrap(),
        ])
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let steps = json["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 9);
    assert_eq!(steps[1]["line"], 3);
    assert_eq!(steps[1]["action"]["type"], "Connect");
    assert_eq!(steps[1]["action"]["params"]["port"], 2222);
    assert!(steps[1]["action"]["params"].get("password").is_none());
    assert_eq!(steps[0]["action"]["params"]["source"]["kind"], "literal");
}

#[test]
fn test_check_reads_stdin() {
    skiff()
        .arg("--check")
        .write_stdin("VAR X = 1\n# comment\nENV A=b\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 step(s)"));
}

#[test]
fn test_grammar_error_exits_two() {
    skiff()
        .arg(fixture_path("bad_keyword.skiff").to_str().unwrap())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Grammar error at line 3"))
        .stderr(predicate::str::contains("FETCH"))
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_missing_script_exits_four() {
    skiff()
        .arg("/definitely/not/here.skiff")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_local_only_script_runs() {
    let dir = tempfile::tempdir().unwrap();
    skiff()
        .args(["-C", dir.path().to_str().unwrap()])
        .arg(fixture_path("local_only.skiff").to_str().unwrap())
        .assert()
        .success()
        .stdout(predicate::str::contains("[step 1]: VAR GREETING = hello"))
        .stdout(predicate::str::contains("[step 3]: CMD true"))
        .stdout(predicate::str::contains("[step 4]: done!"));
}

#[test]
fn test_remote_step_before_connect_exits_three() {
    skiff()
        .arg(fixture_path("needs_connection.skiff").to_str().unwrap())
        .assert()
        .code(3)
        .stdout(predicate::str::contains("[step 1]: VAR A = 1"))
        .stdout(predicate::str::contains("done!").not())
        .stderr(predicate::str::contains("Step 2 failed"))
        .stderr(predicate::str::contains("you need to connect to a server first"));
}

#[test]
fn test_log_file_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("skiff.log");
    skiff()
        .args(["-v", "--log-file", log.to_str().unwrap(), "--check"])
        .arg(fixture_path("local_only.skiff").to_str().unwrap())
        .assert()
        .success();

    let content = std::fs::read_to_string(&log).unwrap();
    assert!(content.contains("script parsed"));
}
