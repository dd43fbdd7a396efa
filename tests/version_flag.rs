use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn prints_version() {
    Command::cargo_bin("subtube")
        .expect("subtube binary")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    Command::cargo_bin("subtube")
        .expect("subtube binary")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("subtube"))
        .stdout(predicate::str::contains("--format"))
        .stdout(predicate::str::contains("--clear-cache"));
}

#[test]
fn format_flag_requires_a_value() {
    let exe = env!("CARGO_BIN_EXE_subtube");
    let output = std::process::Command::new(exe)
        .arg("--format")
        .output()
        .expect("run subtube --format");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8(output.stderr).expect("stderr utf8");
    assert!(stderr.contains("needs a quality value"), "stderr was: {}", stderr.trim());
}

#[test]
fn unknown_argument_is_rejected() {
    Command::cargo_bin("subtube")
        .expect("subtube binary")
        .arg("--bogus")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown argument"));
}
