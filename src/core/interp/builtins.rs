// src/core/interp/builtins.rs

//! Builtin commands. Each one is reached through the exec-handler chain like
//! any other command, and receives the full argv including its own name.

use super::io::Io;
use super::{Control, Flow, Interpreter, pattern, vars};
use crate::constants::GENERIC_FAILURE_CODE;
use crate::core::syntax;
use brush_parser::ast;
use std::path::{Path, PathBuf};

pub(crate) type Builtin = fn(&mut Interpreter, &[String], &Io) -> Flow;

/// The builtin called `name`, if there is one.
pub(crate) fn lookup(name: &str) -> Option<Builtin> {
    let builtin: Builtin = match name {
        ":" | "true" => |_, _, _| Ok(0),
        "false" => |_, _, _| Ok(1),
        // Jobs are detached and signals never reach scripts, so these have
        // nothing to do.
        "wait" | "trap" | "hash" | "shopt" => |_, _, _| Ok(0),
        "echo" => echo,
        "cd" => cd,
        "pwd" => pwd,
        "export" => export,
        "readonly" => readonly,
        "declare" | "typeset" => declare,
        "local" => local,
        "unset" => unset,
        "set" => set,
        "shift" => shift,
        "exit" => exit,
        "return" => return_,
        "break" => break_,
        "continue" => continue_,
        "read" => read,
        "eval" => eval,
        "source" | "." => source,
        "test" | "[" => test,
        "let" => let_,
        "command" => command,
        "type" => type_,
        "exec" => exec,
        _ => return None,
    };
    Some(builtin)
}

fn args(argv: &[String]) -> &[String] {
    argv.get(1..).unwrap_or_default()
}

fn name_of(argv: &[String]) -> &str {
    argv.first().map_or("", String::as_str)
}

/// A numeric argument, or the usage error for it.
fn numeric(argv: &[String], io: &Io) -> Result<Option<i64>, i32> {
    match args(argv).first() {
        None => Ok(None),
        Some(arg) => arg.trim().parse().map(Some).map_err(|_| {
            io.error(format!("{}: {}: numeric argument required", name_of(argv), arg));
            2
        }),
    }
}

/// Truncates to the 0..=255 range exit statuses live in.
fn status_byte(n: i64) -> i32 {
    i32::try_from(n.rem_euclid(256)).unwrap_or(GENERIC_FAILURE_CODE)
}

fn echo(_: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    let mut newline = true;
    let mut escapes = false;
    let mut words = args(argv);
    while let Some((flag, rest)) = words.split_first() {
        let letters = flag.strip_prefix('-').filter(|l| {
            !l.is_empty() && l.chars().all(|c| matches!(c, 'n' | 'e' | 'E'))
        });
        let Some(letters) = letters else {
            break;
        };
        for letter in letters.chars() {
            match letter {
                'n' => newline = false,
                'e' => escapes = true,
                _ => escapes = false,
            }
        }
        words = rest;
    }
    let mut text = words.join(" ");
    if escapes {
        match unescape_echo(&text) {
            (unescaped, true) => {
                io.stdout.write_str(&unescaped)?;
                return Ok(0);
            }
            (unescaped, false) => text = unescaped,
        }
    }
    if newline {
        text.push('\n');
    }
    io.stdout.write_str(&text)?;
    Ok(0)
}

/// `echo -e` escapes. The flag is true when `\c` cut the output short.
fn unescape_echo(text: &str) -> (String, bool) {
    let mut out = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('a') => out.push('\x07'),
            Some('b') => out.push('\x08'),
            Some('e') => out.push('\x1b'),
            Some('f') => out.push('\x0c'),
            Some('v') => out.push('\x0b'),
            Some('\\') => out.push('\\'),
            Some('c') => return (out, true),
            Some('0') => {
                let mut digits = String::new();
                while digits.len() < 3 {
                    match chars.peek() {
                        Some(&d @ '0'..='7') => {
                            digits.push(d);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                let byte = u8::from_str_radix(&digits, 8).unwrap_or(0);
                out.push(char::from(byte));
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    (out, false)
}

fn cd(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    let mut print = false;
    let target = match args(argv).first().map(String::as_str) {
        None => match shell.vars.get("HOME") {
            Some(home) => home.to_string(),
            None => {
                io.error("cd: HOME not set");
                return Ok(GENERIC_FAILURE_CODE);
            }
        },
        Some("-") => match shell.vars.get("OLDPWD") {
            Some(previous) => {
                print = true;
                previous.to_string()
            }
            None => {
                io.error("cd: OLDPWD not set");
                return Ok(GENERIC_FAILURE_CODE);
            }
        },
        Some(dir) => dir.to_string(),
    };
    let path = shell.cwd.join(&target);
    let resolved = match dunce::canonicalize(&path) {
        Ok(resolved) if resolved.is_dir() => resolved,
        Ok(_) => {
            io.error(format!("cd: {}: Not a directory", target));
            return Ok(GENERIC_FAILURE_CODE);
        }
        Err(_) => {
            io.error(format!("cd: {}: No such file or directory", target));
            return Ok(GENERIC_FAILURE_CODE);
        }
    };
    let previous = shell.cwd.to_string_lossy().into_owned();
    shell.vars.set("OLDPWD", &previous);
    shell.vars.set("PWD", &resolved.to_string_lossy());
    log::trace!("[shell {}] cd -> '{}'", shell.shell_id, resolved.display());
    shell.cwd = resolved;
    if print {
        io.stdout.write_str(&format!("{}\n", shell.cwd.display()))?;
    }
    Ok(0)
}

fn pwd(shell: &mut Interpreter, _: &[String], io: &Io) -> Flow {
    io.stdout.write_str(&format!("{}\n", shell.cwd.display()))?;
    Ok(0)
}

/// Splits `NAME=value` arguments; options (leading `-`) are returned apart.
fn split_options(argv: &[String]) -> (Vec<&str>, Vec<&str>) {
    let mut options = Vec::new();
    let mut operands = Vec::new();
    let mut in_options = true;
    for arg in args(argv) {
        if in_options && arg == "--" {
            in_options = false;
        } else if in_options && arg.len() > 1 && (arg.starts_with('-') || arg.starts_with('+')) {
            options.push(arg.as_str());
        } else {
            in_options = false;
            operands.push(arg.as_str());
        }
    }
    (options, operands)
}

fn print_variables(shell: &Interpreter, prefix: &str, io: &Io) -> Flow {
    for (name, value) in shell.vars.iter() {
        io.stdout
            .write_str(&format!("{}{}=\"{}\"\n", prefix, name, value.replace('"', "\\\"")))?;
    }
    Ok(0)
}

/// Assigns each `NAME=value` operand, or just declares a bare `NAME`.
/// `local` records the previous value in the current call frame first.
fn define(shell: &mut Interpreter, operands: &[&str], local: bool, io: &Io) -> Flow {
    let mut status = 0;
    for operand in operands {
        let (name, value) = match operand.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (*operand, None),
        };
        if !vars::is_name(name) {
            io.error(format!("{}: `{}': not a valid identifier", name_of_builtin(local), operand));
            status = GENERIC_FAILURE_CODE;
            continue;
        }
        if local {
            let previous = shell.vars.get(name).map(str::to_string);
            if let Some(frame) = shell.local_frames.last_mut()
                && !frame.iter().any(|(saved, _)| saved == name)
            {
                frame.push((name.to_string(), previous));
            }
        }
        match value {
            Some(value) => shell.assign(name, value, io)?,
            None if local => shell.assign(name, "", io)?,
            None => {
                if shell.vars.get(name).is_none() {
                    shell.assign(name, "", io)?;
                }
            }
        }
    }
    Ok(status)
}

fn name_of_builtin(local: bool) -> &'static str {
    if local { "local" } else { "export" }
}

fn export(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    let (options, operands) = split_options(argv);
    if operands.is_empty() || options.contains(&"-p") {
        return print_variables(shell, "declare -x ", io);
    }
    // Every variable is already exported; `-n` cannot take that back.
    define(shell, &operands, false, io)
}

fn readonly(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    let (_, operands) = split_options(argv);
    if operands.is_empty() {
        for name in shell.readonly.iter() {
            io.stdout.write_str(&format!("declare -r {}\n", name))?;
        }
        return Ok(0);
    }
    let status = define(shell, &operands, false, io)?;
    for operand in operands {
        let name = operand.split_once('=').map_or(operand, |(name, _)| name);
        if vars::is_name(name) {
            shell.readonly.insert(name.to_string());
        }
    }
    Ok(status)
}

fn declare(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    let (options, operands) = split_options(argv);
    if options.iter().any(|o| o.contains('a') || o.contains('A')) {
        io.error(format!("{}: arrays are not supported", name_of(argv)));
        return Ok(2);
    }
    if operands.is_empty() {
        return print_variables(shell, "declare -- ", io);
    }
    let global = options.iter().any(|o| o.starts_with('-') && o.contains('g'));
    let local = shell.call_depth > 0 && !global;
    let status = define(shell, &operands, local, io)?;
    if options.iter().any(|o| o.starts_with('-') && o.contains('r')) {
        for operand in operands {
            let name = operand.split_once('=').map_or(operand, |(name, _)| name);
            shell.readonly.insert(name.to_string());
        }
    }
    Ok(status)
}

fn local(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    if shell.call_depth == 0 {
        io.error("local: can only be used in a function");
        return Ok(GENERIC_FAILURE_CODE);
    }
    let (_, operands) = split_options(argv);
    define(shell, &operands, true, io)
}

fn unset(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    let (options, operands) = split_options(argv);
    let functions = options.contains(&"-f");
    let mut status = 0;
    for name in operands {
        if functions {
            shell.functions.remove(name);
            continue;
        }
        if shell.readonly.contains(name) {
            io.error(format!("unset: {}: cannot unset: readonly variable", name));
            status = GENERIC_FAILURE_CODE;
            continue;
        }
        if shell.vars.unset(name).is_none() && !options.contains(&"-v") {
            shell.functions.remove(name);
        }
    }
    Ok(status)
}

fn set(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    let mut rest = args(argv);
    if rest.is_empty() {
        return print_variables(shell, "", io);
    }
    while let Some((arg, tail)) = rest.split_first() {
        if arg == "--" {
            shell.positional = tail.to_vec();
            return Ok(0);
        }
        let (enable, letters) = match (arg.strip_prefix('-'), arg.strip_prefix('+')) {
            (Some(letters), _) if !letters.is_empty() => (true, letters),
            (_, Some(letters)) if !letters.is_empty() => (false, letters),
            _ => {
                shell.positional = rest.to_vec();
                return Ok(0);
            }
        };
        rest = tail;
        for letter in letters.chars() {
            let option = match letter {
                'e' => "errexit",
                'u' => "nounset",
                'f' => "noglob",
                'o' => match rest.split_first() {
                    Some((name, tail)) => {
                        rest = tail;
                        name.as_str()
                    }
                    None => {
                        for (name, on) in [
                            ("errexit", shell.flags.errexit),
                            ("noglob", shell.flags.noglob),
                            ("nounset", shell.flags.nounset),
                            ("pipefail", shell.flags.pipefail),
                        ] {
                            let state = if on { "on" } else { "off" };
                            io.stdout.write_str(&format!("{:<15}\t{}\n", name, state))?;
                        }
                        continue;
                    }
                },
                // Tracing and the rest are accepted and ignored.
                'x' | 'v' | 'h' | 'B' | 'C' | 'a' | 'b' | 'm' | 'H' | 'P' | 'T' | 'E' => continue,
                other => {
                    io.error(format!("set: -{}: invalid option", other));
                    return Ok(2);
                }
            };
            match option {
                "errexit" => shell.flags.errexit = enable,
                "nounset" => shell.flags.nounset = enable,
                "noglob" => shell.flags.noglob = enable,
                "pipefail" => shell.flags.pipefail = enable,
                "xtrace" | "verbose" | "allexport" | "noclobber" | "hashall" | "monitor"
                | "posix" | "errtrace" | "functrace" | "braceexpand" => {}
                other => {
                    io.error(format!("set: {}: invalid option name", other));
                    return Ok(2);
                }
            }
        }
    }
    Ok(0)
}

fn shift(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    let count = match numeric(argv, io) {
        Ok(count) => count.unwrap_or(1),
        Err(status) => return Ok(status),
    };
    let Ok(count) = usize::try_from(count) else {
        return Ok(GENERIC_FAILURE_CODE);
    };
    if count > shell.positional.len() {
        return Ok(GENERIC_FAILURE_CODE);
    }
    shell.positional.drain(..count);
    Ok(0)
}

fn exit(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    match numeric(argv, io) {
        Ok(Some(n)) => Err(Control::Exit(status_byte(n))),
        Ok(None) => Err(Control::Exit(shell.last_status)),
        Err(status) => Err(Control::Exit(status)),
    }
}

fn return_(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    if shell.call_depth == 0 && shell.source_depth == 0 {
        io.error("return: can only `return' from a function or sourced script");
        return Ok(GENERIC_FAILURE_CODE);
    }
    match numeric(argv, io) {
        Ok(Some(n)) => Err(Control::Return(status_byte(n))),
        Ok(None) => Err(Control::Return(shell.last_status)),
        Err(status) => Err(Control::Return(status)),
    }
}

/// The loop count for `break n` and `continue n`, capped at the nesting.
fn loop_levels(shell: &Interpreter, argv: &[String], io: &Io) -> Result<usize, i32> {
    let levels = numeric(argv, io)?.unwrap_or(1);
    match usize::try_from(levels) {
        Ok(levels) if levels >= 1 => Ok(levels.min(shell.loop_depth)),
        _ => {
            io.error(format!("{}: {}: loop count out of range", name_of(argv), levels));
            Err(GENERIC_FAILURE_CODE)
        }
    }
}

fn break_(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    if shell.loop_depth == 0 {
        return Ok(0);
    }
    match loop_levels(shell, argv, io) {
        Ok(levels) => Err(Control::Break(levels)),
        Err(status) => Ok(status),
    }
}

fn continue_(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    if shell.loop_depth == 0 {
        return Ok(0);
    }
    match loop_levels(shell, argv, io) {
        Ok(levels) => Err(Control::Continue(levels)),
        Err(status) => Ok(status),
    }
}

fn read(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    let mut raw = false;
    let mut names = Vec::new();
    let mut rest = args(argv).iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "-r" => raw = true,
            "-p" => {
                if let Some(prompt) = rest.next() {
                    io.stderr.write_str(prompt)?;
                }
            }
            "-a" => {
                io.error("read: arrays are not supported");
                return Ok(2);
            }
            flag if flag.starts_with('-') && names.is_empty() && flag.len() > 1 => {
                io.error(format!("read: {}: invalid option", flag));
                return Ok(2);
            }
            name => names.push(name.to_string()),
        }
    }

    let mut line = String::new();
    let mut complete = false;
    while let Some((part, newline)) = io.stdin.read_line() {
        complete = newline;
        // Without -r a trailing backslash joins the next line.
        if !raw && newline && part.ends_with('\\') {
            line.push_str(part.strip_suffix('\\').unwrap_or(&part));
            continue;
        }
        line.push_str(&part);
        break;
    }
    let at_end = !complete && line.is_empty();
    if !raw {
        line = pattern::unescape(&line);
    }

    if names.is_empty() {
        shell.assign("REPLY", &line, io)?;
    } else {
        let ifs = shell.ifs();
        let values = split_for_read(&line, &ifs, names.len());
        for (index, name) in names.iter().enumerate() {
            if !vars::is_name(name) {
                io.error(format!("read: `{}': not a valid identifier", name));
                return Ok(GENERIC_FAILURE_CODE);
            }
            let value = values.get(index).map_or("", String::as_str);
            shell.assign(name, value, io)?;
        }
    }
    Ok(if at_end || !complete { 1 } else { 0 })
}

/// Splits a line into at most `count` values; the last takes the rest.
fn split_for_read(line: &str, ifs: &str, count: usize) -> Vec<String> {
    let is_space = |c: char| ifs.contains(c) && c.is_whitespace();
    let is_delimiter = |c: char| ifs.contains(c);
    let mut values = Vec::new();
    let mut rest = line.trim_matches(is_space);
    while values.len() + 1 < count && !rest.is_empty() {
        match rest.find(is_delimiter) {
            Some(index) => {
                values.push(rest.get(..index).unwrap_or_default().to_string());
                let after = rest.get(index..).unwrap_or_default();
                let mut chars = after.chars();
                // One delimiter, plus the spaces around it.
                let trimmed = chars.as_str().trim_start_matches(is_space);
                let trimmed = match chars.next() {
                    Some(c) if c.is_whitespace() => {
                        let after_space = trimmed;
                        match after_space.chars().next() {
                            Some(d) if is_delimiter(d) && !d.is_whitespace() => {
                                after_space.get(d.len_utf8()..).unwrap_or_default()
                            }
                            _ => after_space,
                        }
                    }
                    _ => after.get(1..).unwrap_or_default(),
                };
                rest = trimmed.trim_start_matches(is_space);
            }
            None => {
                values.push(rest.to_string());
                rest = "";
            }
        }
    }
    if !rest.is_empty() {
        values.push(rest.to_string());
    }
    values
}

fn eval(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    let script = args(argv).join(" ");
    match syntax::parse(&script) {
        Ok(program) => shell.run_program(&program, io),
        Err(e) => {
            io.error(format!("eval: {}", e));
            Ok(2)
        }
    }
}

fn source(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    let Some(file) = args(argv).first() else {
        io.error(format!("{}: filename argument required", name_of(argv)));
        return Ok(2);
    };
    let Some(path) = find_source(shell, file) else {
        io.error(format!("{}: No such file or directory", file));
        return Ok(GENERIC_FAILURE_CODE);
    };
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => {
            io.error(format!("{}: {}", file, e));
            return Ok(GENERIC_FAILURE_CODE);
        }
    };
    let program = match syntax::parse(&text) {
        Ok(program) => program,
        Err(e) => {
            io.error(format!("{}: {}", file, e));
            return Ok(2);
        }
    };
    let extra = args(argv).get(1..).unwrap_or_default();
    let saved = (!extra.is_empty()).then(|| std::mem::replace(&mut shell.positional, extra.to_vec()));
    shell.source_depth += 1;
    let result = shell.run_program(&program, io);
    shell.source_depth -= 1;
    if let Some(saved) = saved {
        shell.positional = saved;
    }
    match result {
        Err(Control::Return(status)) => Ok(status),
        other => other,
    }
}

fn find_source(shell: &Interpreter, file: &str) -> Option<PathBuf> {
    if file.contains('/') {
        let path = shell.cwd.join(file);
        return path.is_file().then_some(path);
    }
    search_path(shell, file)
        .or_else(|| Some(shell.cwd.join(file)).filter(|path| path.is_file()))
}

/// The first `PATH` entry holding a file called `name`.
fn search_path(shell: &Interpreter, name: &str) -> Option<PathBuf> {
    let path = shell.vars.get("PATH")?;
    std::env::split_paths(path)
        .map(|dir| shell.cwd.join(dir).join(name))
        .find(|candidate| candidate.is_file())
}

fn test(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    let mut operands: Vec<&str> = args(argv).iter().map(String::as_str).collect();
    if name_of(argv) == "[" {
        if operands.last() != Some(&"]") {
            io.error("[: missing `]'");
            return Ok(2);
        }
        operands.pop();
    }
    let mut parser = TestParser {
        args: &operands,
        pos: 0,
        cwd: &shell.cwd,
    };
    match parser.parse() {
        Ok(result) => Ok(i32::from(!result)),
        Err(message) => {
            io.error(format!("{}: {}", name_of(argv), message));
            Ok(2)
        }
    }
}

/// Recursive descent over `test` arguments: `-o` binds looser than `-a`,
/// which binds looser than `!`.
struct TestParser<'a> {
    args: &'a [&'a str],
    pos: usize,
    cwd: &'a Path,
}

impl<'a> TestParser<'a> {
    fn parse(&mut self) -> Result<bool, String> {
        if self.args.is_empty() {
            return Ok(false);
        }
        let result = self.or()?;
        match self.args.get(self.pos) {
            None => Ok(result),
            Some(extra) => Err(format!("{}: unexpected argument", extra)),
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.args.get(self.pos).copied()
    }

    fn remaining(&self) -> usize {
        self.args.len().saturating_sub(self.pos)
    }

    fn or(&mut self) -> Result<bool, String> {
        let mut result = self.and()?;
        while self.peek() == Some("-o") {
            self.pos += 1;
            let right = self.and()?;
            result = result || right;
        }
        Ok(result)
    }

    fn and(&mut self) -> Result<bool, String> {
        let mut result = self.not()?;
        while self.peek() == Some("-a") {
            self.pos += 1;
            let right = self.not()?;
            result = result && right;
        }
        Ok(result)
    }

    fn not(&mut self) -> Result<bool, String> {
        if self.peek() == Some("!") && self.remaining() > 1 {
            self.pos += 1;
            return Ok(!self.not()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<bool, String> {
        let Some(first) = self.peek() else {
            return Err("argument expected".to_string());
        };
        if first == "(" && self.remaining() > 2 {
            self.pos += 1;
            let result = self.or()?;
            if self.peek() != Some(")") {
                return Err("`)' expected".to_string());
            }
            self.pos += 1;
            return Ok(result);
        }
        if let (Some(op), Some(right)) = (self.args.get(self.pos + 1), self.args.get(self.pos + 2))
            && is_binary_operator(op)
        {
            self.pos += 3;
            return binary_test(op, first, right, self.cwd);
        }
        if is_unary_operator(first)
            && let Some(operand) = self.args.get(self.pos + 1)
        {
            self.pos += 2;
            return unary_test(first, operand, self.cwd);
        }
        self.pos += 1;
        Ok(!first.is_empty())
    }
}

fn is_unary_operator(op: &str) -> bool {
    matches!(
        op,
        "-e" | "-a" | "-f" | "-d" | "-r" | "-w" | "-x" | "-s" | "-L" | "-h" | "-b" | "-c" | "-p"
            | "-S" | "-n" | "-z" | "-t" | "-v"
    )
}

fn is_binary_operator(op: &str) -> bool {
    matches!(
        op,
        "=" | "==" | "!=" | "<" | ">" | "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge" | "-nt"
            | "-ot" | "-ef"
    )
}

/// Evaluates a unary test operator. Paths are relative to `cwd`.
pub(crate) fn unary_test(op: &str, operand: &str, cwd: &Path) -> Result<bool, String> {
    let path = cwd.join(operand);
    let metadata = || std::fs::metadata(&path).ok();
    Ok(match op {
        "-n" => !operand.is_empty(),
        "-z" => operand.is_empty(),
        "-e" | "-a" => metadata().is_some(),
        "-f" => metadata().is_some_and(|m| m.is_file()),
        "-d" => metadata().is_some_and(|m| m.is_dir()),
        "-s" => metadata().is_some_and(|m| m.len() > 0),
        "-L" | "-h" => std::fs::symlink_metadata(&path).is_ok_and(|m| m.file_type().is_symlink()),
        "-r" => metadata().is_some(),
        "-w" => metadata().is_some_and(|m| !m.permissions().readonly()),
        "-x" => metadata().is_some_and(|m| is_executable(&m)),
        "-b" | "-c" | "-p" | "-S" => special_file(op, &path),
        // No terminal is ever attached.
        "-t" => false,
        other => return Err(format!("{}: unary operator expected", other)),
    })
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    metadata.is_file()
}

#[cfg(unix)]
fn special_file(op: &str, path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;
    std::fs::metadata(path).is_ok_and(|m| {
        let kind = m.file_type();
        match op {
            "-b" => kind.is_block_device(),
            "-c" => kind.is_char_device(),
            "-p" => kind.is_fifo(),
            _ => kind.is_socket(),
        }
    })
}

#[cfg(not(unix))]
fn special_file(_: &str, _: &Path) -> bool {
    false
}

fn integer(text: &str) -> Result<i64, String> {
    text.trim()
        .parse()
        .map_err(|_| format!("{}: integer expression expected", text))
}

/// Evaluates a binary test operator. `=` and `==` compare literally here;
/// `[[ ]]` handles its pattern forms itself.
pub(crate) fn binary_test(op: &str, left: &str, right: &str, cwd: &Path) -> Result<bool, String> {
    let modified = |p: &str| std::fs::metadata(cwd.join(p)).and_then(|m| m.modified()).ok();
    Ok(match op {
        "=" | "==" => left == right,
        "!=" => left != right,
        "<" => left < right,
        ">" => left > right,
        "-eq" => integer(left)? == integer(right)?,
        "-ne" => integer(left)? != integer(right)?,
        "-lt" => integer(left)? < integer(right)?,
        "-le" => integer(left)? <= integer(right)?,
        "-gt" => integer(left)? > integer(right)?,
        "-ge" => integer(left)? >= integer(right)?,
        "-nt" => match (modified(left), modified(right)) {
            (Some(l), Some(r)) => l > r,
            (Some(_), None) => true,
            _ => false,
        },
        "-ot" => match (modified(left), modified(right)) {
            (Some(l), Some(r)) => l < r,
            (None, Some(_)) => true,
            _ => false,
        },
        "-ef" => match (dunce::canonicalize(cwd.join(left)), dunce::canonicalize(cwd.join(right))) {
            (Ok(l), Ok(r)) => l == r,
            _ => false,
        },
        other => return Err(format!("{}: binary operator expected", other)),
    })
}

fn let_(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    if args(argv).is_empty() {
        io.error("let: expression expected");
        return Ok(GENERIC_FAILURE_CODE);
    }
    let mut last = 0;
    for expr in args(argv) {
        last = shell.eval_arithmetic(expr, io)?;
    }
    Ok(i32::from(last == 0))
}

/// How `name` would be run: a function, a builtin or a file on `PATH`.
fn describe(shell: &Interpreter, name: &str) -> Option<(String, Option<PathBuf>)> {
    if shell.functions.contains_key(name) {
        return Some(("function".to_string(), None));
    }
    if lookup(name).is_some() {
        return Some(("shell builtin".to_string(), None));
    }
    if name.contains('/') {
        let path = shell.cwd.join(name);
        return path.is_file().then(|| ("file".to_string(), Some(path)));
    }
    search_path(shell, name).map(|path| ("file".to_string(), Some(path)))
}

fn command(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    let rest = args(argv);
    match rest.first().map(String::as_str) {
        Some(flag @ ("-v" | "-V")) => {
            let mut status = 0;
            for name in rest.get(1..).unwrap_or_default() {
                match describe(shell, name) {
                    Some((_, Some(path))) if flag == "-v" => {
                        io.stdout.write_str(&format!("{}\n", path.display()))?;
                    }
                    Some(_) if flag == "-v" => io.stdout.write_str(&format!("{}\n", name))?,
                    Some((kind, path)) => {
                        let shown = path.map_or(kind, |p| p.display().to_string());
                        io.stdout.write_str(&format!("{} is {}\n", name, shown))?;
                    }
                    None => status = GENERIC_FAILURE_CODE,
                }
            }
            Ok(status)
        }
        Some(_) => {
            // Runs the named command through the chain again, bypassing
            // functions of the same name.
            shell.through_chain(rest, &mut |this: &mut Interpreter, argv: &[String]| {
                this.dispatch(argv, &[], io, true)
            })
        }
        None => Ok(0),
    }
}

fn type_(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    let mut status = 0;
    for name in args(argv) {
        match describe(shell, name) {
            Some((kind, None)) => io.stdout.write_str(&format!("{} is a {}\n", name, kind))?,
            Some((_, Some(path))) => {
                io.stdout.write_str(&format!("{} is {}\n", name, path.display()))?;
            }
            None => {
                io.error(format!("type: {}: not found", name));
                status = GENERIC_FAILURE_CODE;
            }
        }
    }
    Ok(status)
}

fn exec(shell: &mut Interpreter, argv: &[String], io: &Io) -> Flow {
    let rest = args(argv);
    if rest.is_empty() {
        return Ok(0);
    }
    let status = shell.through_chain(rest, &mut |this: &mut Interpreter, argv: &[String]| {
        this.dispatch(argv, &[], io, true)
    })?;
    Err(Control::Exit(status))
}

impl Interpreter {
    /// `[[ ... ]]`. Words are expanded without splitting or globbing; the
    /// right side of `==` and `!=` is a pattern.
    pub(super) fn eval_extended_test(
        &mut self,
        expr: &ast::ExtendedTestExpr,
        io: &Io,
    ) -> Flow<bool> {
        match expr {
            ast::ExtendedTestExpr::And(left, right) => {
                Ok(self.eval_extended_test(left, io)? && self.eval_extended_test(right, io)?)
            }
            ast::ExtendedTestExpr::Or(left, right) => {
                Ok(self.eval_extended_test(left, io)? || self.eval_extended_test(right, io)?)
            }
            ast::ExtendedTestExpr::Not(inner) => Ok(!self.eval_extended_test(inner, io)?),
            ast::ExtendedTestExpr::Parenthesized(inner) => self.eval_extended_test(inner, io),
            ast::ExtendedTestExpr::UnaryTest(predicate, word) => {
                let operand = self.expand_string(&word.to_string(), io)?;
                let op = predicate.to_string();
                if op == "-v" {
                    return Ok(self.vars.get(&operand).is_some());
                }
                self.test_result(unary_test(&op, &operand, &self.cwd), io)
            }
            ast::ExtendedTestExpr::BinaryTest(predicate, left, right) => {
                let op = predicate.to_string();
                let left = self.expand_string(&left.to_string(), io)?;
                match op.as_str() {
                    "==" | "=" | "!=" => {
                        let pattern = self.expand_pattern(&right.to_string(), io)?;
                        let matched = pattern::matches(&pattern, &left);
                        Ok(if op == "!=" { !matched } else { matched })
                    }
                    "=~" => {
                        let right = self.expand_string(&right.to_string(), io)?;
                        match regex::Regex::new(&right) {
                            Ok(re) => Ok(re.is_match(&left)),
                            Err(e) => {
                                io.error(format!("[[: {}: {}", right, e));
                                Err(Control::Failed(2))
                            }
                        }
                    }
                    _ => {
                        let right = self.expand_string(&right.to_string(), io)?;
                        self.test_result(binary_test(&op, &left, &right, &self.cwd), io)
                    }
                }
            }
        }
    }

    fn test_result(&self, result: Result<bool, String>, io: &Io) -> Flow<bool> {
        result.map_err(|message| {
            io.error(format!("[[: {}", message));
            Control::Failed(2)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_test(args: &[&str], cwd: &Path) -> Result<bool, String> {
        TestParser { args, pos: 0, cwd }.parse()
    }

    #[test]
    fn test_string_and_integer_tests() {
        let cwd = Path::new(".");
        assert_eq!(run_test(&["abc"], cwd), Ok(true));
        assert_eq!(run_test(&[""], cwd), Ok(false));
        assert_eq!(run_test(&["-n"], cwd), Ok(true));
        assert_eq!(run_test(&["a", "=", "a"], cwd), Ok(true));
        assert_eq!(run_test(&["3", "-lt", "10"], cwd), Ok(true));
        assert_eq!(run_test(&["!", "3", "-lt", "10"], cwd), Ok(false));
        assert!(run_test(&["x", "-eq", "1"], cwd).is_err());
    }

    #[test]
    fn test_connectives_and_grouping() {
        let cwd = Path::new(".");
        assert_eq!(run_test(&["a", "-o", "", "-a", ""], cwd), Ok(true));
        assert_eq!(run_test(&["(", "a", "-o", "", ")", "-a", ""], cwd), Ok(false));
    }

    #[test]
    fn test_file_tests_are_relative_to_cwd() {
        // --- Setup ---
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        // --- Assertions ---
        assert_eq!(unary_test("-f", "file", dir.path()), Ok(true));
        assert_eq!(unary_test("-s", "file", dir.path()), Ok(true));
        assert_eq!(unary_test("-d", "sub", dir.path()), Ok(true));
        assert_eq!(unary_test("-e", "missing", dir.path()), Ok(false));
        assert_eq!(binary_test("-ef", "sub/..", ".", dir.path()), Ok(true));
    }

    #[test]
    fn test_echo_escapes() {
        assert_eq!(unescape_echo("a\\tb"), ("a\tb".to_string(), false));
        assert_eq!(unescape_echo("stop\\chere"), ("stop".to_string(), true));
        assert_eq!(unescape_echo("\\0101"), ("A".to_string(), false));
    }

    #[test]
    fn test_read_splitting_gives_rest_to_last_name() {
        assert_eq!(split_for_read("  a b  c d ", " \t\n", 2), vec!["a", "b  c d"]);
        assert_eq!(split_for_read("x:y:z", ":", 3), vec!["x", "y", "z"]);
        assert_eq!(split_for_read("one", " \t\n", 3), vec!["one"]);
    }

    #[test]
    fn test_status_byte_wraps() {
        assert_eq!(status_byte(256), 0);
        assert_eq!(status_byte(-1), 255);
        assert_eq!(status_byte(3), 3);
    }
}
