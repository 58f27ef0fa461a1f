//! Fake volume tool and bootstrap script for behavioural tests.
//!
//! Integration tests are compiled as separate crates, so this file is shared
//! via:
//!
//! ```rust
//! #[path = "support/fake_tools.rs"]
//! mod fake_tools;
//! ```

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Environment variables the entrypoint reads; cleared for every test run.
const JOB_ENV: [&str; 7] = [
    "SCRATCH_SIZE",
    "BATCH_FILE_TYPE",
    "BATCH_FILE_S3_URL",
    "ENTRYPOINT_VOLUME_TOOL",
    "ENTRYPOINT_TEARDOWN_SUBCOMMAND",
    "ENTRYPOINT_BOOTSTRAP_SCRIPT",
    "ENTRYPOINT_LOG_LEVEL",
];

/// Sandbox holding a fake volume tool that appends each call to a log.
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    /// Creates a sandbox whose tool prints `ids` on `ebsmount`.
    ///
    /// `provision_status` and `teardown_status` set the tool's exit codes.
    pub fn new(ids: &str, provision_status: i32, teardown_status: i32) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let sandbox = Self { dir };
        let log = sandbox.log_path();
        sandbox.write_script(
            "volume-tool",
            &format!(
                r#"#!/bin/sh
echo "tool $*" >> "{log}"
case "$1" in
  ebsmount)
    if [ {provision_status} -ne 0 ]; then echo "no capacity" >&2; exit {provision_status}; fi
    echo "{ids}"
    ;;
  *)
    if [ {teardown_status} -ne 0 ]; then echo "detach failed" >&2; exit {teardown_status}; fi
    ;;
esac
"#,
                log = log.display()
            ),
        );
        sandbox.write_script(
            "bootstrap.sh",
            &format!(
                "#!/bin/sh\necho \"bootstrap $#\" >> \"{}\"\necho bootstrapped\n",
                log.display()
            ),
        );
        sandbox
    }

    /// Returns a sandbox whose tool always succeeds and reports `vol-1`.
    pub fn healthy() -> Self {
        Self::new("vol-1", 0, 0)
    }

    /// Path of the call log.
    pub fn log_path(&self) -> PathBuf {
        self.dir.path().join("calls.log")
    }

    /// Lines recorded in the call log, in call order.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.log_path())
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    /// Shell snippet that records `label` in the call log.
    pub fn record(&self, label: &str) -> String {
        format!("echo \"{label}\" >> \"{}\"", self.log_path().display())
    }

    /// Builds an `entrypoint` command wired to the fake tool and script.
    pub fn command(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("entrypoint");
        for name in JOB_ENV {
            cmd.env_remove(name);
        }
        cmd.current_dir(self.dir.path())
            .env("ENTRYPOINT_VOLUME_TOOL", self.dir.path().join("volume-tool"))
            .env(
                "ENTRYPOINT_BOOTSTRAP_SCRIPT",
                self.dir.path().join("bootstrap.sh"),
            );
        cmd
    }

    fn write_script(&self, name: &str, body: &str) {
        let path = self.dir.path().join(name);
        fs::write(&path, body).expect("write script");
        make_executable(&path);
    }
}

fn make_executable(path: &Path) {
    let mut permissions = fs::metadata(path).expect("metadata").permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions).expect("chmod");
}
