//! Tests for `ProcessCommandRunner` against real child processes.

use super::*;
use rstest::rstest;
use std::time::Duration;

fn sh(script: &str) -> Vec<OsString> {
    vec![OsString::from("-c"), OsString::from(script)]
}

#[tokio::test]
async fn run_captures_stdout_and_stderr_separately() {
    let runner = ProcessCommandRunner::silent();
    let result = runner
        .run("sh", &sh("echo out-1; echo err-1 1>&2; echo out-2"))
        .await
        .expect("command should run");

    assert_eq!(result.code, 0);
    assert_eq!(result.stdout, "out-1\nout-2");
    assert_eq!(result.stderr, "err-1");
    assert!(result.is_success());
}

#[tokio::test]
async fn run_trims_only_the_final_newline() {
    let runner = ProcessCommandRunner::silent();
    let result = runner
        .run("sh", &sh("printf 'vol-a vol-b\\n\\n'"))
        .await
        .expect("command should run");

    assert_eq!(result.stdout, "vol-a vol-b\n");
}

#[rstest]
#[case("exit 0", 0)]
#[case("exit 1", 1)]
#[case("echo partial; exit 42", 42)]
#[tokio::test]
async fn run_reports_process_exit_code(#[case] script: &str, #[case] expected: i32) {
    let runner = ProcessCommandRunner::silent();
    let result = runner.run("sh", &sh(script)).await.expect("command should run");

    assert_eq!(result.code, expected);
}

#[tokio::test]
async fn run_maps_signal_termination_to_shell_convention() {
    let runner = ProcessCommandRunner::silent();
    let result = runner
        .run("sh", &sh("kill -9 $$"))
        .await
        .expect("command should run");

    assert_eq!(result.code, SIGNAL_EXIT_BASE + 9);
}

#[cfg(unix)]
#[rstest]
#[case::exited_zero(0, 0)]
#[case::killed(9, SIGNAL_EXIT_BASE + 9)]
#[case::stopped(0x137f, UNKNOWN_EXIT_CODE)]
fn exit_code_from_status_covers_every_termination(#[case] raw: i32, #[case] expected: i32) {
    use std::os::unix::process::ExitStatusExt;

    assert_eq!(exit_code_from_status(ExitStatus::from_raw(raw)), expected);
}

#[rstest]
#[case::streaming(true)]
#[case::capturing(false)]
#[tokio::test]
async fn background_process_holding_pipes_does_not_block_return(#[case] streaming: bool) {
    let runner = ProcessCommandRunner::silent();
    let args = sh("sleep 30 & echo started; exit 4");
    let started = std::time::Instant::now();

    let code = tokio::time::timeout(Duration::from_secs(10), async {
        if streaming {
            runner.run_streaming("sh", &args).await
        } else {
            runner.run("sh", &args).await.map(|result| result.code)
        }
    })
    .await
    .expect("runner must return once the child exits")
    .expect("command should run");

    assert_eq!(code, 4);
    assert!(
        started.elapsed() < DRAIN_GRACE_PERIOD + Duration::from_secs(5),
        "took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn run_streaming_returns_exit_code() {
    let runner = ProcessCommandRunner::silent();
    let code = runner
        .run_streaming("sh", &sh("echo streamed; echo also 1>&2; exit 3"))
        .await
        .expect("command should run");

    assert_eq!(code, 3);
}

#[tokio::test]
async fn run_tolerates_non_utf8_output() {
    let runner = ProcessCommandRunner::silent();
    let result = runner
        .run("sh", &sh("printf 'ok\\n\\377\\376\\nafter\\n'"))
        .await
        .expect("command should run");

    assert_eq!(result.code, 0);
    assert!(result.stdout.starts_with("ok\n"));
    assert!(result.stdout.ends_with("\nafter"));
}

#[tokio::test]
async fn large_interleaved_output_does_not_deadlock() {
    // Roughly 100 KiB per stream, well past a default 64 KiB pipe buffer.
    let script = concat!(
        "i=0; while [ $i -lt 2000 ]; do ",
        "echo \"out-$i ................................................\"; ",
        "echo \"err-$i ................................................\" 1>&2; ",
        "i=$((i+1)); done"
    );
    let runner = ProcessCommandRunner::silent();
    let args = sh(script);

    let result = tokio::time::timeout(Duration::from_secs(60), runner.run("sh", &args))
        .await
        .expect("runner must not deadlock")
        .expect("command should run");

    assert_eq!(result.code, 0);
    assert!(result.stdout.len() > 64 * 1024);
    assert!(result.stderr.len() > 64 * 1024);
    assert_eq!(result.stdout.lines().count(), 2000);
    assert_eq!(result.stderr.lines().count(), 2000);
    assert!(result.stdout.lines().all(|line| line.starts_with("out-")));
    assert!(result.stderr.lines().all(|line| line.starts_with("err-")));
}

#[tokio::test]
async fn stderr_flood_while_stdout_is_quiet_does_not_deadlock() {
    let script = "i=0; while [ $i -lt 4000 ]; do echo \"stderr-only-line-$i ........\" 1>&2; i=$((i+1)); done; echo done";
    let runner = ProcessCommandRunner::silent();
    let args = sh(script);

    let result = tokio::time::timeout(Duration::from_secs(60), runner.run("sh", &args))
        .await
        .expect("runner must not deadlock")
        .expect("command should run");

    assert_eq!(result.stdout, "done");
    assert_eq!(result.stderr.lines().count(), 4000);
}

#[tokio::test]
async fn run_reports_spawn_failure() {
    let runner = ProcessCommandRunner::silent();
    let err = runner
        .run("definitely-not-a-real-binary-xyz", &[])
        .await
        .expect_err("spawn should fail");

    assert!(
        matches!(err, RunnerError::Spawn { ref command, .. } if command == "definitely-not-a-real-binary-xyz"),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn run_streaming_reports_spawn_failure() {
    let runner = ProcessCommandRunner::silent();
    let err = runner
        .run_streaming("definitely-not-a-real-binary-xyz", &[OsString::from("a")])
        .await
        .expect_err("spawn should fail");

    assert!(matches!(err, RunnerError::Spawn { .. }), "unexpected error: {err:?}");
}

#[rstest]
#[case("batchit", &[], "batchit")]
#[case("batchit", &["ebsmount", "--size", "50"], "batchit ebsmount --size 50")]
#[case("sh", &["-c", "echo a b"], "sh -c 'echo a b'")]
fn render_command_escapes_arguments(
    #[case] program: &str,
    #[case] args: &[&str],
    #[case] expected: &str,
) {
    let args: Vec<OsString> = args.iter().map(OsString::from).collect();
    assert_eq!(render_command(program, &args), expected);
}
