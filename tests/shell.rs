// tests/shell.rs
#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]

use agentsh::{
    ExecContext, InterruptCause, Shell, ShellError, ShellOptions, command_blocker,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn shell_in(dir: &std::path::Path) -> Shell {
    Shell::new(ShellOptions {
        working_dir: Some(dir.to_path_buf()),
        ..ShellOptions::default()
    })
    .unwrap()
}

#[test]
fn test_exported_variable_persists_between_calls() {
    let dir = tempdir().unwrap();
    let shell = shell_in(dir.path());
    let ctx = ExecContext::background();

    let first = shell.exec(&ctx, "export FOO=bar");
    assert!(first.success(), "{:?}", first.error);

    let second = shell.exec(&ctx, "echo $FOO");
    assert!(second.success(), "{:?}", second.error);
    assert_eq!(second.stdout, "bar\n");
    assert!(shell.environment().iter().any(|e| e == "FOO=bar"));
}

#[test]
fn test_cd_persists_between_calls() {
    // --- Setup ---
    let dir = tempdir().unwrap();
    let sub = dir.path().join("sub");
    std::fs::create_dir(&sub).unwrap();
    let shell = shell_in(dir.path());
    let ctx = ExecContext::background();

    // --- Action ---
    let result = shell.exec(&ctx, "cd sub");
    assert!(result.success(), "{:?}", result.error);
    let pwd = shell.exec(&ctx, "pwd");

    // --- Assertions ---
    let expected = dunce::canonicalize(&sub).unwrap();
    let reported = dunce::canonicalize(PathBuf::from(pwd.stdout.trim())).unwrap();
    assert_eq!(reported, expected);
    assert_eq!(dunce::canonicalize(shell.working_dir()).unwrap(), expected);
}

#[test]
fn test_failing_command_keeps_output_and_status() {
    let dir = tempdir().unwrap();
    let shell = shell_in(dir.path());

    let result = shell.exec(&ExecContext::background(), "echo partial; echo oops >&2; exit 7");

    assert_eq!(result.stdout, "partial\n");
    assert_eq!(result.stderr, "oops\n");
    assert_eq!(result.exit_code(), 7);
    assert!(matches!(result.error, Some(ShellError::ExitStatus { code: 7 })));
}

fn guarded_shell(dir: &std::path::Path, blocked: &[&'static str]) -> Shell {
    Shell::new(ShellOptions {
        working_dir: Some(dir.to_path_buf()),
        block_funcs: vec![command_blocker(blocked.iter().copied())],
        ..ShellOptions::default()
    })
    .unwrap()
}

fn assert_blocked(result: &agentsh::ExecResult, name: &str) {
    match &result.error {
        Some(ShellError::Blocked { command }) => assert_eq!(command, name),
        other => panic!("expected {} to be blocked, got {:?}", name, other),
    }
}

#[test]
fn test_blocked_command_stops_the_script() {
    // --- Setup ---
    let dir = tempdir().unwrap();
    let shell = guarded_shell(dir.path(), &["curl"]);

    // --- Action ---
    let result = shell.exec(
        &ExecContext::background(),
        "touch before && curl http://example.com; touch after",
    );

    // --- Assertions ---
    assert_blocked(&result, "curl");
    assert!(
        result
            .error
            .as_ref()
            .unwrap()
            .to_string()
            .contains("not allowed for security reasons")
    );
    // Commands before the refused one have run; nothing after it does.
    assert!(dir.path().join("before").exists());
    assert!(!dir.path().join("after").exists());
}

#[test]
fn test_command_names_built_at_run_time_are_checked() {
    let dir = tempdir().unwrap();
    let shell = guarded_shell(dir.path(), &["printf"]);
    let ctx = ExecContext::background();

    for script in [
        "for c in printf; do $c LOOP; done",
        "read c <<< printf; $c READ",
        "c=prin; c=${c}tf; $c CONCAT",
        "eval \"printf EVAL\"",
        "set -- printf SET; \"$@\"",
    ] {
        let result = shell.exec(&ctx, script);
        assert_blocked(&result, "printf");
        assert!(result.stdout.is_empty(), "{} printed {:?}", script, result.stdout);
    }
}

#[test]
fn test_forwarding_function_runs_allowed_commands() {
    let dir = tempdir().unwrap();
    let shell = guarded_shell(dir.path(), &["curl"]);

    let result = shell.exec(&ExecContext::background(), "run() { \"$@\"; }; run echo harmless");

    assert!(result.success(), "{:?}", result.error);
    assert_eq!(result.stdout, "harmless\n");
}

#[test]
fn test_deadline_interrupts_long_command() {
    let dir = tempdir().unwrap();
    let shell = shell_in(dir.path());
    let ctx = ExecContext::with_timeout(Duration::from_millis(300));

    let started = Instant::now();
    let result = shell.exec(&ctx, "sleep 10");

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(result.is_interrupt());
    assert!(matches!(
        result.error,
        Some(ShellError::Interrupted {
            cause: InterruptCause::DeadlineExceeded
        })
    ));
}

#[test]
fn test_cancelled_command_leaves_state_untouched() {
    let dir = tempdir().unwrap();
    let shell = Arc::new(shell_in(dir.path()));
    let ctx = ExecContext::background();

    let canceller = {
        let ctx = ctx.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            ctx.cancel();
        })
    };
    let started = Instant::now();
    let result = shell.exec(&ctx, "export LEAKED=1; cd /; sleep 10");
    canceller.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(result.is_interrupt());
    assert!(!shell.environment().iter().any(|e| e.starts_with("LEAKED=")));
    assert_eq!(
        dunce::canonicalize(shell.working_dir()).unwrap(),
        dunce::canonicalize(dir.path()).unwrap()
    );
}

#[test]
fn test_concurrent_calls_are_serialized() {
    // --- Setup ---
    let dir = tempdir().unwrap();
    let shell = Arc::new(shell_in(dir.path()));

    // --- Action ---
    // Each call writes a start and an end line around a sleep. Overlapping
    // calls would interleave their lines.
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let shell = Arc::clone(&shell);
            thread::spawn(move || {
                let result = shell.exec(
                    &ExecContext::background(),
                    "echo start >> calls.log; sleep 0.1; echo end >> calls.log",
                );
                assert!(result.success(), "{:?}", result.error);
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    // --- Assertions ---
    let log = std::fs::read_to_string(dir.path().join("calls.log")).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 8);
    for pair in lines.chunks(2) {
        assert_eq!(pair, ["start", "end"]);
    }
}

#[test]
fn test_parse_error_is_reported_without_running() {
    let dir = tempdir().unwrap();
    let shell = shell_in(dir.path());

    let result = shell.exec(&ExecContext::background(), "echo 'unterminated");

    assert!(matches!(result.error, Some(ShellError::Parse { .. })));
    assert!(result.stdout.is_empty());
}

#[test]
fn test_run_once_does_not_leak_state() {
    let dir = tempdir().unwrap();
    let ctx = ExecContext::background();

    let first = Shell::run_once(&ctx, dir.path(), "export ONCE=1; echo $ONCE", ShellOptions::default());
    assert_eq!(first.stdout, "1\n");

    let second = Shell::run_once(&ctx, dir.path(), "echo \"[$ONCE]\"", ShellOptions::default());
    assert_eq!(second.stdout, "[]\n");
}
