//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn cli_without_arguments_prints_usage() {
    let mut cmd = cargo_bin_cmd!("vista");
    cmd.assert()
        .failure()
        .stdout("")
        .stderr(predicate::str::contains("Usage: vista"));
}

#[test]
fn help_lists_subcommands() {
    let mut cmd = cargo_bin_cmd!("vista");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("up").and(predicate::str::contains("down")));
}

#[test]
fn up_rejects_malformed_tags() {
    let mut cmd = cargo_bin_cmd!("vista");
    cmd.args(["up", "demo", "--tag", "missing-separator"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("key=value"));
}
