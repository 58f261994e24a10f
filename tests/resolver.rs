// tests/resolver.rs

#![allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]

use agentsh::{
    CommandRunner, ExecContext, MapEnvironment, ResolveError, ShellError, ShellVariableResolver,
    VariableResolver, resolve_all,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Answers substitutions from a fixed table and records what it was asked.
struct StubRunner {
    answers: BTreeMap<&'static str, &'static str>,
    calls: Mutex<Vec<String>>,
}

impl StubRunner {
    fn new(answers: &[(&'static str, &'static str)]) -> Arc<Self> {
        Arc::new(Self {
            answers: answers.iter().copied().collect(),
            calls: Mutex::new(Vec::new()),
        })
    }
}

impl CommandRunner for StubRunner {
    fn run_command(&self, _ctx: &ExecContext, command: &str) -> Result<String, ShellError> {
        self.calls.lock().unwrap().push(command.to_string());
        self.answers
            .get(command)
            .map(|out| out.to_string())
            .ok_or(ShellError::ExitStatus { code: 1 })
    }
}

fn env() -> MapEnvironment {
    [
        ("HOME", "/home/user"),
        ("TOKEN", "sk-1"),
        ("USER", "testuser"),
        ("HOST", "localhost"),
        ("EMPTY", ""),
    ]
    .into_iter()
    .collect()
}

fn resolver(runner: Arc<StubRunner>) -> ShellVariableResolver {
    ShellVariableResolver::with_runner(Arc::new(env()), runner)
}

#[test]
fn test_plain_and_braced_variables() {
    let resolver = resolver(StubRunner::new(&[]));
    assert_eq!(resolver.resolve_value("$HOME").unwrap(), "/home/user");
    assert_eq!(resolver.resolve_value("Bearer ${TOKEN}").unwrap(), "Bearer sk-1");
    assert_eq!(resolver.resolve_value("no dollars here").unwrap(), "no dollars here");
}

#[test]
fn test_command_substitution_is_trimmed() {
    let runner = StubRunner::new(&[("date +%Y", "2024\n")]);
    let resolver = resolver(runner.clone());

    let value = resolver.resolve_value("$USER-$(date +%Y)-$HOST").unwrap();

    assert_eq!(value, "testuser-2024-localhost");
    assert_eq!(*runner.calls.lock().unwrap(), vec!["date +%Y".to_string()]);
}

#[test]
fn test_nested_substitution_is_passed_whole_to_the_shell() {
    let runner = StubRunner::new(&[("echo $(echo inner)", "nested")]);
    let resolver = resolver(runner.clone());

    assert_eq!(resolver.resolve_value("$(echo $(echo inner))").unwrap(), "nested");
    assert_eq!(runner.calls.lock().unwrap().len(), 1);
}

#[test]
fn test_syntax_errors() {
    let resolver = resolver(StubRunner::new(&[]));
    assert_eq!(
        resolver.resolve_value("$"),
        Err(ResolveError::LoneDollar { position: 0 })
    );
    assert_eq!(
        resolver.resolve_value("cost: 5$"),
        Err(ResolveError::LoneDollar { position: 7 })
    );
    assert_eq!(
        resolver.resolve_value("$1"),
        Err(ResolveError::InvalidVariableStart {
            character: '1',
            position: 1
        })
    );
    assert_eq!(
        resolver.resolve_value("$(echo hi"),
        Err(ResolveError::UnmatchedParen { position: 0 })
    );
    assert_eq!(
        resolver.resolve_value("x ${HOME"),
        Err(ResolveError::UnmatchedBrace { position: 2 })
    );
}

#[test]
fn test_unset_and_empty_variables_fail() {
    let resolver = resolver(StubRunner::new(&[]));
    assert_eq!(
        resolver.resolve_value("$NOPE"),
        Err(ResolveError::UnsetVariable {
            name: "NOPE".into()
        })
    );
    assert_eq!(
        resolver.resolve_value("${EMPTY}"),
        Err(ResolveError::UnsetVariable {
            name: "EMPTY".into()
        })
    );
}

#[test]
fn test_environment_values_are_never_evaluated() {
    // --- Setup ---
    let runner = StubRunner::new(&[]);
    let env: MapEnvironment = [("PAYLOAD", "$(rm x)"), ("ALIAS", "$HOME")]
        .into_iter()
        .collect();
    let resolver = ShellVariableResolver::with_runner(Arc::new(env), runner.clone());

    // --- Assertions ---
    assert_eq!(resolver.resolve_value("$PAYLOAD").unwrap(), "$(rm x)");
    assert_eq!(resolver.resolve_value("${ALIAS}/bin").unwrap(), "$HOME/bin");
    assert!(runner.calls.lock().unwrap().is_empty());
}

#[test]
fn test_special_parameters_are_rejected() {
    let resolver = resolver(StubRunner::new(&[]));
    assert_eq!(
        resolver.resolve_value("a$#b"),
        Err(ResolveError::InvalidVariableStart {
            character: '#',
            position: 2
        })
    );
    assert_eq!(
        resolver.resolve_value("x$-"),
        Err(ResolveError::InvalidVariableStart {
            character: '-',
            position: 2
        })
    );
}

#[test]
fn test_failed_substitution_names_the_command() {
    let resolver = resolver(StubRunner::new(&[]));
    match resolver.resolve_value("$(false)") {
        Err(ResolveError::CommandFailed { command, message }) => {
            assert_eq!(command, "false");
            assert_eq!(message, "exit status 1");
        }
        other => panic!("expected a command failure, got {:?}", other),
    }
}

#[test]
fn test_resolve_all_partitions_results() {
    // --- Setup ---
    let resolver = resolver(StubRunner::new(&[("cat key", "secret")]));
    let raw: BTreeMap<String, String> = [
        ("home", "$HOME"),
        ("key", "$(cat key)"),
        ("broken", "$MISSING"),
        ("literal", "text"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    // --- Action ---
    let resolved = resolve_all(&resolver, &raw);

    // --- Assertions ---
    assert_eq!(resolved.values.len(), 3);
    assert_eq!(resolved.values["home"], "/home/user");
    assert_eq!(resolved.values["key"], "secret");
    assert_eq!(resolved.values["literal"], "text");
    assert_eq!(resolved.failures.len(), 1);
    assert!(resolved.failures.contains_key("broken"));
}

#[cfg(unix)]
#[test]
fn test_real_shell_substitution() {
    let env: MapEnvironment = [("PATH", std::env::var("PATH").unwrap_or_default())]
        .into_iter()
        .collect();
    let resolver = ShellVariableResolver::new(env).unwrap();
    assert_eq!(resolver.resolve_value("v=$(echo  hello )").unwrap(), "v=hello");
}
