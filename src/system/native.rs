// src/system/native.rs

//! Windows-native execution: `cmd` and PowerShell wrappers, plus an
//! in-process `cd` so directory changes persist without spawning anything.

use crate::core::context::ExecContext;
use crate::system::process::{self, ProcessError, ProcessOutcome};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Which native interpreter runs the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeShell {
    /// `cmd /C`.
    Cmd,
    /// `powershell -Command`.
    PowerShell,
}

/// A parsed `cd`/`chdir` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdRequest {
    /// Bare `cd`: prints the current directory.
    Print,
    /// `cd <target>`, with surrounding quotes removed.
    Change(String),
}

/// Recognizes a standalone `cd`, `cd /d` or `chdir` command.
///
/// Anything chained with other commands (`cd x && make`) is not a standalone
/// `cd` and returns `None`.
pub fn parse_cd(command: &str) -> Option<CdRequest> {
    let trimmed = command.trim();
    if trimmed.contains(['&', '|', '<', '>', '\n']) {
        return None;
    }
    let (head, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (trimmed, ""),
    };
    if !head.eq_ignore_ascii_case("cd") && !head.eq_ignore_ascii_case("chdir") {
        return None;
    }

    let rest = match (rest.get(..2), rest.get(2..)) {
        (Some(flag), Some(tail)) if flag.eq_ignore_ascii_case("/d") => tail.trim(),
        _ => rest,
    };
    let target = rest.trim_matches('"');
    if target.is_empty() {
        Some(CdRequest::Print)
    } else {
        Some(CdRequest::Change(target.to_string()))
    }
}

/// Splits a native command line into the argv of every command it chains.
///
/// Segments end at an unquoted `&`, `&&`, `|`, `||`, `;`, newline or
/// parenthesis. Single quotes only quote for PowerShell. Each argv has its
/// command name reduced to the lower-cased file name without `.exe`, so
/// `C:\Tools\CURL.EXE` is judged as `curl`.
pub fn split_commands(command: &str, shell: NativeShell) -> Vec<Vec<String>> {
    let quotes: &[char] = match shell {
        NativeShell::Cmd => &['"'],
        NativeShell::PowerShell => &['"', '\''],
    };
    let is_separator = |c: char| matches!(c, '&' | '|' | ';' | '\n' | '\r' | '(' | ')');
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in command.chars() {
        match quote {
            Some(open) if c == open => {
                quote = None;
                current.push(c);
            }
            Some(_) => current.push(c),
            None if quotes.contains(&c) => {
                quote = Some(c);
                current.push(c);
            }
            None if is_separator(c) => segments.push(std::mem::take(&mut current)),
            None => current.push(c),
        }
    }
    segments.push(current);
    segments
        .iter()
        .map(|segment| words(segment, quotes))
        .filter(|argv| !argv.is_empty())
        .map(normalize_name)
        .collect()
}

/// Whitespace-separated words with quotes removed. Backslashes are path
/// separators here, never escapes.
fn words(segment: &str, quotes: &[char]) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    for c in segment.chars() {
        match quote {
            Some(open) if c == open => quote = None,
            Some(_) => current.push(c),
            None if quotes.contains(&c) => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

fn normalize_name(mut argv: Vec<String>) -> Vec<String> {
    if let Some(name) = argv.first_mut() {
        let base = name.rsplit(['\\', '/']).next().unwrap_or(name.as_str());
        let lower = base.to_ascii_lowercase();
        *name = match lower.strip_suffix(".exe") {
            Some(stem) => stem.to_string(),
            None => lower,
        };
    }
    argv
}

/// Resolves a `cd` target against `cwd` and checks that it is a directory.
///
/// Supports `.`, `..`, relative paths, absolute paths and bare drive letters
/// (`D:` means the root of that drive).
pub fn resolve_cd_target(cwd: &Path, target: &str) -> Option<PathBuf> {
    let is_drive_letter = target.len() == 2
        && target.ends_with(':')
        && target.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    let candidate = if is_drive_letter {
        PathBuf::from(format!("{}\\", target))
    } else {
        let path = Path::new(target);
        if path.is_absolute() || path.has_root() {
            path.to_path_buf()
        } else {
            cwd.join(path)
        }
    };
    let resolved = dunce::canonicalize(&candidate).ok()?;
    resolved.is_dir().then_some(resolved)
}

/// The single command line given to `cmd /C`.
pub fn cmd_line(cwd: &Path, command: &str) -> String {
    format!(
        "cd /d \"{}\" && {}",
        dunce::simplified(cwd).display(),
        command
    )
}

/// The script given to `powershell -Command`.
pub fn powershell_script(cwd: &Path, command: &str) -> String {
    let cwd = dunce::simplified(cwd).display().to_string().replace('\'', "''");
    format!("Set-Location -LiteralPath '{}'; {}", cwd, command)
}

fn build_command(shell: NativeShell, cwd: &Path, command: &str) -> Command {
    match shell {
        NativeShell::Cmd => {
            let mut cmd = Command::new("cmd");
            let line = cmd_line(cwd, command);
            #[cfg(windows)]
            {
                use std::os::windows::process::CommandExt;
                // cmd does its own parsing; MSVC-style quoting would break it.
                cmd.arg("/S").arg("/C").raw_arg(format!("\"{}\"", line));
            }
            #[cfg(not(windows))]
            {
                cmd.arg("/C").arg(line);
            }
            cmd
        }
        NativeShell::PowerShell => {
            let mut cmd = Command::new("powershell");
            cmd.args(["-NoProfile", "-NonInteractive", "-Command"])
                .arg(powershell_script(cwd, command));
            cmd
        }
    }
}

/// Runs `command` in a native shell, starting in `cwd` with `env`.
pub fn run(
    shell: NativeShell,
    command: &str,
    cwd: &Path,
    env: &[String],
    ctx: &ExecContext,
) -> Result<ProcessOutcome, ProcessError> {
    let mut child = build_command(shell, cwd, command);
    child
        .current_dir(dunce::simplified(cwd))
        .env_clear()
        .envs(env.iter().filter_map(|entry| entry.split_once('=')));
    let label = match shell {
        NativeShell::Cmd => "cmd",
        NativeShell::PowerShell => "powershell",
    };
    process::run(child, label, ctx)
}
