// src/core/interp/tests.rs

use super::*;
use crate::core::policy::{BlockPolicy, command_blocker};
use crate::core::syntax;
use std::sync::PoisonError;

struct Run {
    result: Result<i32, ShellError>,
    stdout: String,
    stderr: String,
    shell: Interpreter,
}

fn text(buffer: &io::SharedBuf) -> String {
    String::from_utf8_lossy(&buffer.lock().unwrap_or_else(PoisonError::into_inner)).into_owned()
}

fn run_in(script: &str, cwd: &Path, blocked: &[&str]) -> Run {
    let policy = if blocked.is_empty() {
        BlockPolicy::allow_all()
    } else {
        BlockPolicy::new(vec![command_blocker(blocked.iter().copied())])
    };
    let env: Vec<String> = vec![
        format!("PATH={}", std::env::var("PATH").unwrap_or_default()),
        "HOME=/home/agent".to_string(),
    ];
    let mut shell = Interpreter::new(
        "test",
        cwd,
        &env,
        HandlerChain::standard(policy),
        ExecContext::background(),
    );
    let (stdout, out_buf) = Out::buffer();
    let (stderr, err_buf) = Out::buffer();
    let io = Io {
        stdin: In::Null,
        stdout,
        stderr,
    };
    let program = syntax::parse(script).unwrap();
    let result = shell.run(&program, &io);
    Run {
        result,
        stdout: text(&out_buf),
        stderr: text(&err_buf),
        shell,
    }
}

fn run(script: &str) -> Run {
    run_in(script, Path::new("/"), &[])
}

fn assert_blocked(run: &Run, command: &str) {
    match &run.result {
        Err(ShellError::Blocked { command: name }) => assert_eq!(name, command),
        other => panic!("expected {} to be blocked, got {:?}", command, other),
    }
}

#[test]
fn test_loop_variable_command_is_blocked() {
    let run = run_in("for c in printf; do $c LOOP; done", Path::new("/"), &["printf"]);
    assert_blocked(&run, "printf");
    assert!(!run.stdout.contains("LOOP"));
}

#[test]
fn test_command_read_from_here_string_is_blocked() {
    let run = run_in("read c <<< printf; $c READ", Path::new("/"), &["printf"]);
    assert_blocked(&run, "printf");
    assert!(!run.stdout.contains("READ"));
}

#[test]
fn test_eval_and_command_builtin_are_judged_by_expanded_argv() {
    let run = run_in("eval 'printf EVAL'", Path::new("/"), &["printf"]);
    assert_blocked(&run, "printf");

    let run = run_in("command printf CMD", Path::new("/"), &["printf"]);
    assert_blocked(&run, "printf");
    assert!(!run.stdout.contains("CMD"));
}

#[test]
fn test_forwarding_function_runs_harmless_argv() {
    let run = run_in("run() { \"$@\"; }; run echo harmless", Path::new("/"), &["curl"]);
    assert_eq!(run.result.unwrap(), 0);
    assert_eq!(run.stdout, "harmless\n");
}

#[test]
fn test_forwarding_function_still_blocks_forwarded_command() {
    let run = run_in("run() { \"$@\"; }; run curl http://evil", Path::new("/"), &["curl"]);
    assert_blocked(&run, "curl");
}

#[test]
fn test_blocked_command_stops_the_script() {
    // --- Setup ---
    let dir = tempfile::tempdir().unwrap();

    // --- Execution ---
    let run = run_in("touch before; curl x; touch after", dir.path(), &["curl"]);

    // --- Assertions ---
    assert_blocked(&run, "curl");
    assert!(dir.path().join("before").exists());
    assert!(!dir.path().join("after").exists());
}

#[test]
fn test_echo_and_variables() {
    let run = run("NAME=world; echo \"hello $NAME\" ${MISSING:-default}");
    assert_eq!(run.result.unwrap(), 0);
    assert_eq!(run.stdout, "hello world default\n");
}

#[test]
fn test_and_or_lists_follow_status() {
    let run = run("false && echo no; false || echo yes; true && echo also");
    assert_eq!(run.stdout, "yes\nalso\n");
}

#[test]
fn test_builtin_pipeline_feeds_next_stage() {
    let run = run("echo one two | { read a b; echo \"$b-$a\"; }");
    assert_eq!(run.stdout, "two-one\n");
}

#[test]
fn test_external_pipeline_runs_concurrently() {
    let run = run("printf 'b\\na\\n' | sort");
    assert_eq!(run.result.unwrap(), 0);
    assert_eq!(run.stdout, "a\nb\n");
}

#[test]
fn test_pipefail_reports_failing_stage() {
    let run = run("false | true; echo $?; set -o pipefail; false | true; echo $?");
    assert_eq!(run.stdout, "0\n1\n");
}

#[test]
fn test_functions_locals_and_return() {
    let script = r#"
X=outer
f() {
    local X=inner
    echo "$1:$X"
    return 3
}
f arg
echo "$?:$X"
"#;
    let run = run(script);
    assert_eq!(run.stdout, "arg:inner\n3:outer\n");
}

#[test]
fn test_subshell_changes_do_not_leak() {
    let run = run("X=1; (X=2; cd /tmp); echo $X; pwd");
    assert_eq!(run.stdout, "1\n/\n");
}

#[test]
fn test_cd_persists_in_the_shell() {
    // --- Setup ---
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    let canonical = dunce::canonicalize(dir.path().join("sub")).unwrap();

    // --- Execution ---
    let run = run_in("cd sub && export MARK=set", dir.path(), &[]);

    // --- Assertions ---
    assert_eq!(run.result.unwrap(), 0);
    assert_eq!(run.shell.cwd(), canonical.as_path());
    assert!(run.shell.env().contains(&"MARK=set".to_string()));
}

#[test]
fn test_errexit_stops_after_failure() {
    let run = run("set -e; echo a; false; echo b");
    assert_eq!(run.result.unwrap(), 1);
    assert_eq!(run.stdout, "a\n");
}

#[test]
fn test_errexit_ignores_conditions() {
    let run = run("set -e; if false; then echo no; fi; false || echo ok; echo end");
    assert_eq!(run.stdout, "ok\nend\n");
}

#[test]
fn test_exit_status_ends_script() {
    let run = run("echo a; exit 4; echo b");
    assert_eq!(run.result.unwrap(), 4);
    assert_eq!(run.stdout, "a\n");
}

#[test]
fn test_loops_with_break_and_continue() {
    let script = r#"
for i in 1 2 3 4 5; do
    if [ "$i" = 2 ]; then continue; fi
    if [ "$i" -gt 4 ]; then break; fi
    echo $i
done
n=0
while [ $n -lt 3 ]; do n=$((n + 1)); done
echo "n=$n"
"#;
    let run = run(script);
    assert_eq!(run.stdout, "1\n3\n4\nn=3\n");
}

#[test]
fn test_case_and_extended_test() {
    let script = r#"
case "file.rs" in
    *.txt) echo text ;;
    *.rs) echo rust ;;
esac
[[ abc == a* && ! -z abc ]] && echo matched
"#;
    let run = run(script);
    assert_eq!(run.stdout, "rust\nmatched\n");
}

#[test]
fn test_command_substitution_and_arithmetic() {
    let run = run("x=$(echo 20); echo $((x * 2 + 2)) `echo tick`");
    assert_eq!(run.stdout, "42 tick\n");
}

#[test]
fn test_brace_expansion_and_globbing() {
    // --- Setup ---
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "").unwrap();
    std::fs::write(dir.path().join("b.txt"), "").unwrap();

    // --- Execution ---
    let run = run_in("echo {x,y}z *.txt '*.txt'", dir.path(), &[]);

    // --- Assertions ---
    assert_eq!(run.stdout, "xz yz a.txt b.txt *.txt\n");
}

#[test]
fn test_redirections_write_files() {
    // --- Setup ---
    let dir = tempfile::tempdir().unwrap();

    // --- Execution ---
    let run = run_in("echo one > out; echo two >> out; cat < out", dir.path(), &[]);

    // --- Assertions ---
    assert_eq!(run.stdout, "one\ntwo\n");
}

#[test]
fn test_unknown_command_is_127() {
    let run = run("definitely-not-a-command-xyz; echo $?");
    assert_eq!(run.stdout, "127\n");
    assert!(run.stderr.contains("command not found"));
}

#[test]
fn test_readonly_assignment_fails() {
    let run = run("readonly R=1; R=2; echo \"$? $R\"");
    assert_eq!(run.stdout, "1 1\n");
    assert!(run.stderr.contains("readonly"));
}

#[test]
fn test_cancelled_context_stops_before_first_command() {
    // --- Setup ---
    let ctx = ExecContext::background();
    ctx.cancel();
    let mut shell = Interpreter::new("test", Path::new("/"), &[], HandlerChain::default(), ctx);
    let program = syntax::parse("echo never").unwrap();

    // --- Execution ---
    let result = shell.run(&program, &Io::quiet());

    // --- Assertions ---
    assert!(matches!(result, Err(ShellError::Interrupted { .. })));
}
