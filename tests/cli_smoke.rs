//! Behavioural smoke test for the CLI entrypoint.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;

#[test]
fn cli_without_command_prints_usage_and_fails() {
    let mut cmd = cargo_bin_cmd!("entrypoint");
    for name in [
        "SCRATCH_SIZE",
        "BATCH_FILE_TYPE",
        "BATCH_FILE_S3_URL",
        "ENTRYPOINT_LOG_LEVEL",
    ] {
        cmd.env_remove(name);
    }

    cmd.assert()
        .code(1)
        .stdout(contains("You didn't specify a command! Exiting."))
        .stderr(contains("Exiting with return code").not());
}
