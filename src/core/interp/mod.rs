// src/core/interp/mod.rs

//! An embedded POSIX shell interpreter over the `brush_parser` syntax tree.
//!
//! Scripts never reach a host shell. Every simple command is expanded here,
//! then handed to the exec-handler chain with its final argv right before it
//! would run. Functions, builtins and external programs all dispatch through
//! the chain, so a command name produced by a loop variable, `read`, `eval`
//! or `"$@"` is judged exactly like a literal one.

mod arith;
mod braces;
mod builtins;
mod expand;
pub(crate) mod io;
mod pattern;
mod vars;

pub(crate) use io::{In, Io, Out};

use crate::constants::{GENERIC_FAILURE_CODE, MAX_CALL_DEPTH};
use crate::core::context::ExecContext;
use crate::core::handlers::{ExecRequest, HandlerChain};
use crate::core::shell::ShellError;
use crate::system::process::{self, Input, ProcessError, Stage};
use brush_parser::ast;
use io::CaptureMap;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use vars::VarTable;

/// `$0` inside scripts.
const SCRIPT_NAME: &str = "agentsh";

/// Non-local exits out of the command being run.
#[derive(Debug)]
pub(crate) enum Control {
    Break(usize),
    Continue(usize),
    Return(i32),
    Exit(i32),
    /// Stops the whole script: a blocked command, an interrupt, or a failure
    /// of the interpreter itself.
    Fatal(ShellError),
    /// Aborts the current command only, with this status. Raised by bad
    /// substitutions and arithmetic errors.
    Failed(i32),
}

pub(crate) type Flow<T = i32> = Result<T, Control>;

#[derive(Debug, Clone, Copy, Default)]
struct Flags {
    errexit: bool,
    nounset: bool,
    pipefail: bool,
    noglob: bool,
}

/// A `NAME=value` prefix or assignment, after expansion.
#[derive(Debug, Clone)]
struct Binding {
    name: String,
    value: String,
}

/// The pieces of a simple command, in source order.
#[derive(Debug, Default)]
struct SimpleParts<'a> {
    assignments: Vec<String>,
    words: Vec<String>,
    redirects: Vec<&'a ast::IoRedirect>,
}

impl<'a> SimpleParts<'a> {
    fn new(command: &'a ast::SimpleCommand) -> Result<Self, String> {
        let mut parts = Self::default();
        let prefix = command.prefix.iter().flat_map(|p| p.0.iter());
        for item in prefix {
            match item {
                ast::CommandPrefixOrSuffixItem::AssignmentWord(_, word) => {
                    parts.assignments.push(word.to_string());
                }
                ast::CommandPrefixOrSuffixItem::Word(word) => parts.words.push(word.to_string()),
                ast::CommandPrefixOrSuffixItem::IoRedirect(redirect) => {
                    parts.redirects.push(redirect);
                }
                ast::CommandPrefixOrSuffixItem::ProcessSubstitution(..) => {
                    return Err("process substitution is not supported".to_string());
                }
            }
        }
        if let Some(name) = &command.word_or_name {
            parts.words.push(name.to_string());
        }
        let suffix = command.suffix.iter().flat_map(|s| s.0.iter());
        for item in suffix {
            match item {
                // `export A=1`: after the name it is an ordinary argument.
                ast::CommandPrefixOrSuffixItem::AssignmentWord(_, word)
                | ast::CommandPrefixOrSuffixItem::Word(word) => parts.words.push(word.to_string()),
                ast::CommandPrefixOrSuffixItem::IoRedirect(redirect) => {
                    parts.redirects.push(redirect);
                }
                ast::CommandPrefixOrSuffixItem::ProcessSubstitution(..) => {
                    return Err("process substitution is not supported".to_string());
                }
            }
        }
        Ok(parts)
    }
}

/// What one stage of a concurrent pipeline will run.
struct StagePlan {
    command: Command,
    label: String,
    io: Io,
}

/// Result of one pass through a loop body.
enum Step {
    Next(i32),
    Stop(i32),
}

/// One script run's worth of shell state.
///
/// Cloning yields a subshell: it sees everything, and nothing it changes
/// flows back.
#[derive(Debug, Clone)]
pub(crate) struct Interpreter {
    shell_id: String,
    ctx: ExecContext,
    handlers: HandlerChain<i32>,
    cwd: PathBuf,
    vars: VarTable,
    readonly: HashSet<String>,
    /// One frame per active function call: the names made local there and
    /// the values to restore on return.
    local_frames: Vec<Vec<(String, Option<String>)>>,
    functions: HashMap<String, Arc<ast::FunctionBody>>,
    positional: Vec<String>,
    last_status: i32,
    flags: Flags,
    /// Non-zero while running a condition, where `set -e` does not apply.
    condition_depth: usize,
    loop_depth: usize,
    call_depth: usize,
    source_depth: usize,
    /// Set for `&` jobs: external commands start detached.
    detached: bool,
    last_bg: Option<u32>,
    last_subst_status: Option<i32>,
}

impl Interpreter {
    pub(crate) fn new(
        shell_id: &str,
        cwd: &Path,
        env: &[String],
        handlers: HandlerChain<i32>,
        ctx: ExecContext,
    ) -> Self {
        let mut vars = VarTable::from_env(env);
        vars.set("PWD", &cwd.to_string_lossy());
        Self {
            shell_id: shell_id.to_string(),
            ctx,
            handlers,
            cwd: cwd.to_path_buf(),
            vars,
            readonly: HashSet::new(),
            local_frames: Vec::new(),
            functions: HashMap::new(),
            positional: Vec::new(),
            last_status: 0,
            flags: Flags::default(),
            condition_depth: 0,
            loop_depth: 0,
            call_depth: 0,
            source_depth: 0,
            detached: false,
            last_bg: None,
            last_subst_status: None,
        }
    }

    pub(crate) fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// The variable table as `KEY=VALUE` entries.
    pub(crate) fn env(&self) -> Vec<String> {
        self.vars.to_env()
    }

    /// Runs a whole program. `exit` ends it early with its status; a blocked
    /// command or an interrupt ends it with the error.
    pub(crate) fn run(&mut self, program: &ast::Program, io: &Io) -> Result<i32, ShellError> {
        match self.run_program(program, io) {
            Ok(status) | Err(Control::Exit(status)) => Ok(status),
            Err(Control::Fatal(e)) => Err(e),
            Err(Control::Failed(status) | Control::Return(status)) => Ok(status),
            Err(Control::Break(_) | Control::Continue(_)) => Ok(self.last_status),
        }
    }

    fn run_program(&mut self, program: &ast::Program, io: &Io) -> Flow {
        let mut status = 0;
        for list in &program.complete_commands {
            status = self.run_list(list, io)?;
        }
        Ok(status)
    }

    fn check_interrupt(&self) -> Flow<()> {
        match self.ctx.interrupt() {
            Some(cause) => Err(Control::Fatal(ShellError::Interrupted { cause })),
            None => Ok(()),
        }
    }

    fn run_list(&mut self, list: &ast::CompoundList, io: &Io) -> Flow {
        let mut status = self.last_status;
        for ast::CompoundListItem(and_or, separator) in &list.0 {
            self.check_interrupt()?;
            status = match separator {
                ast::SeparatorOperator::Async => self.run_async(and_or)?,
                ast::SeparatorOperator::Sequence => self.run_and_or(and_or, io)?,
            };
            self.last_status = status;
        }
        Ok(status)
    }

    /// `cmd &`: runs in a subshell whose external commands start detached
    /// with null stdio. Builtins in it run to completion first.
    fn run_async(&mut self, and_or: &ast::AndOrList) -> Flow {
        let mut job = self.clone();
        job.detached = true;
        job.last_bg = None;
        match job.run_and_or(and_or, &Io::quiet()) {
            Err(Control::Fatal(e)) => return Err(Control::Fatal(e)),
            Ok(_) | Err(_) => {}
        }
        if job.last_bg.is_some() {
            self.last_bg = job.last_bg;
        }
        Ok(0)
    }

    fn run_and_or(&mut self, list: &ast::AndOrList, io: &Io) -> Flow {
        let mut pending = list.additional.iter();
        let mut current = &list.first;
        loop {
            let next = pending.next();
            let status = match next {
                Some(_) => self.run_guarded(|this| this.run_pipeline(current, io))?,
                None => return self.run_pipeline(current, io),
            };
            self.last_status = status;
            // Skip pipelines whose operator does not match the status.
            let mut upcoming = next;
            loop {
                match upcoming {
                    Some(ast::AndOr::And(pipeline)) if status == 0 => {
                        current = pipeline;
                        break;
                    }
                    Some(ast::AndOr::Or(pipeline)) if status != 0 => {
                        current = pipeline;
                        break;
                    }
                    Some(_) => upcoming = pending.next(),
                    None => return Ok(status),
                }
            }
        }
    }

    /// Runs `f` as a condition: `set -e` does not fire inside it.
    fn run_guarded(&mut self, f: impl FnOnce(&mut Self) -> Flow) -> Flow {
        self.condition_depth += 1;
        let result = f(self);
        self.condition_depth -= 1;
        result
    }

    fn run_pipeline(&mut self, pipeline: &ast::Pipeline, io: &Io) -> Flow {
        self.check_interrupt()?;
        let status = match pipeline.seq.as_slice() {
            [] => 0,
            [command] if pipeline.bang => self.run_guarded(|this| this.run_command(command, io))?,
            [command] => self.run_command(command, io)?,
            commands => match self.run_external_pipeline(commands, io)? {
                Some(status) => status,
                None => self.run_staged_pipeline(commands, io)?,
            },
        };
        let status = if pipeline.bang {
            i32::from(status == 0)
        } else {
            status
        };
        self.last_status = status;
        if self.flags.errexit && !pipeline.bang && status != 0 && self.condition_depth == 0 {
            return Err(Control::Exit(status));
        }
        Ok(status)
    }

    fn pipeline_status(&self, statuses: &[i32]) -> i32 {
        if self.flags.pipefail {
            statuses.iter().rev().find(|&&s| s != 0).copied().unwrap_or(0)
        } else {
            statuses.last().copied().unwrap_or(0)
        }
    }

    /// A pipeline where every stage is a plain external command runs as one
    /// OS pipeline, all stages at once. `None` means it is not such a
    /// pipeline.
    fn run_external_pipeline(&mut self, commands: &[ast::Command], io: &Io) -> Flow<Option<i32>> {
        if self.detached {
            return Ok(None);
        }
        let mut simple = Vec::with_capacity(commands.len());
        for command in commands {
            let ast::Command::Simple(command) = command else {
                return Ok(None);
            };
            let Some(name) = &command.word_or_name else {
                return Ok(None);
            };
            let name = name.to_string();
            let literal = name.chars().all(|c| c.is_alphanumeric() || "-_./+".contains(c));
            if !literal || builtins::lookup(&name).is_some() || self.functions.contains_key(&name) {
                return Ok(None);
            }
            simple.push(command);
        }

        let last = simple.len().saturating_sub(1);
        let mut plans = Vec::with_capacity(simple.len());
        for (index, command) in simple.into_iter().enumerate() {
            let stage_io = Io {
                stdin: if index == 0 { io.stdin.clone() } else { In::Pipe },
                stdout: if index == last { io.stdout.clone() } else { Out::Pipe },
                stderr: io.stderr.clone(),
            };
            // Each stage is a subshell: its assignments do not survive it.
            let mut stage_shell = self.clone();
            match stage_shell.plan_stage(command, &stage_io)? {
                Some(plan) => plans.push(plan),
                None => return Ok(Some(GENERIC_FAILURE_CODE)),
            }
        }

        let map = CaptureMap::new(io);
        let mut stages = Vec::with_capacity(plans.len());
        for plan in plans {
            let mut stage = Stage::new(plan.command, plan.label);
            stage.stdin = plan.io.stdin.to_input();
            stage.stdout = map.target(&plan.io.stdout)?;
            stage.stderr = map.target(&plan.io.stderr)?;
            stages.push(stage);
        }
        let outcome = match process::run_pipeline(stages, Input::Null, &self.ctx) {
            Ok(outcome) => outcome,
            Err(ProcessError::Spawn { command, source }) => {
                return Ok(Some(spawn_failure(&command, &source, io)));
            }
            Err(e) => return Err(Control::Fatal(e.into())),
        };
        map.deliver(&outcome);
        if let Some(cause) = outcome.interrupted {
            return Err(Control::Fatal(ShellError::Interrupted { cause }));
        }
        let statuses: Vec<i32> = outcome
            .codes
            .iter()
            .map(|code| code.unwrap_or(GENERIC_FAILURE_CODE))
            .collect();
        Ok(Some(self.pipeline_status(&statuses)))
    }

    /// Expands one stage and passes it through the chain without running it.
    /// `None` after reporting a stage that cannot start.
    fn plan_stage(&mut self, command: &ast::SimpleCommand, io: &Io) -> Flow<Option<StagePlan>> {
        let parts = match SimpleParts::new(command) {
            Ok(parts) => parts,
            Err(message) => {
                io.error(message);
                return Ok(None);
            }
        };
        let argv = self.expand_words(&parts.words, io)?;
        let bindings = self.expand_bindings(&parts.assignments, io)?;
        let io = match self.apply_redirects(&parts.redirects, io)? {
            Ok(io) => io,
            Err(message) => {
                io.error(message);
                return Ok(None);
            }
        };
        if argv.is_empty() {
            return Ok(None);
        }
        let mut plan = None;
        self.through_chain(&argv, &mut |this: &mut Interpreter, argv: &[String]| {
            plan = Some(StagePlan {
                command: this.external_command(argv, &bindings),
                label: argv.first().cloned().unwrap_or_default(),
                io: io.clone(),
            });
            Ok(0)
        })?;
        Ok(plan)
    }

    /// Any other pipeline: each stage runs to completion in a subshell and
    /// its output becomes the next stage's input.
    fn run_staged_pipeline(&mut self, commands: &[ast::Command], io: &Io) -> Flow {
        let last = commands.len().saturating_sub(1);
        let mut input = io.stdin.clone();
        let mut statuses = Vec::with_capacity(commands.len());
        for (index, command) in commands.iter().enumerate() {
            let (stdout, buffer) = if index == last {
                (io.stdout.clone(), None)
            } else {
                let (out, buffer) = Out::buffer();
                (out, Some(buffer))
            };
            let stage_io = Io {
                stdin: input.clone(),
                stdout,
                stderr: io.stderr.clone(),
            };
            let status = self.subshell(|sub| sub.run_command(command, &stage_io))?;
            statuses.push(status);
            if let Some(buffer) = buffer {
                let bytes = std::mem::take(&mut *buffer.lock().unwrap_or_else(|e| e.into_inner()));
                input = In::from_bytes(bytes);
            }
        }
        Ok(self.pipeline_status(&statuses))
    }

    /// Runs `f` on a copy of this shell. Only a fatal error escapes it.
    fn subshell(&self, f: impl FnOnce(&mut Self) -> Flow) -> Flow {
        let mut sub = self.clone();
        match f(&mut sub) {
            Ok(status)
            | Err(Control::Exit(status) | Control::Return(status) | Control::Failed(status)) => {
                Ok(status)
            }
            Err(Control::Break(_) | Control::Continue(_)) => Ok(0),
            Err(Control::Fatal(e)) => Err(Control::Fatal(e)),
        }
    }

    fn run_command(&mut self, command: &ast::Command, io: &Io) -> Flow {
        let result = match command {
            ast::Command::Simple(simple) => self.run_simple(simple, io),
            ast::Command::Compound(compound, redirects) => {
                self.run_compound(compound, redirects.as_ref(), io)
            }
            ast::Command::Function(definition) => {
                let name = definition.fname.to_string();
                log::trace!("[shell {}] defined function '{}'", self.shell_id, name);
                self.functions
                    .insert(name, Arc::new(definition.body.clone()));
                Ok(0)
            }
            ast::Command::ExtendedTest(test) => self
                .eval_extended_test(&test.expr, io)
                .map(|matched| i32::from(!matched)),
        };
        match result {
            Err(Control::Failed(status)) => Ok(status),
            other => other,
        }
    }

    fn run_simple(&mut self, command: &ast::SimpleCommand, io: &Io) -> Flow {
        let parts = match SimpleParts::new(command) {
            Ok(parts) => parts,
            Err(message) => {
                io.error(message);
                return Ok(GENERIC_FAILURE_CODE);
            }
        };
        self.last_subst_status = None;
        let argv = self.expand_words(&parts.words, io)?;
        let bindings = self.expand_bindings(&parts.assignments, io)?;
        let io = match self.apply_redirects(&parts.redirects, io)? {
            Ok(io) => io,
            Err(message) => {
                io.error(message);
                return Ok(GENERIC_FAILURE_CODE);
            }
        };
        if argv.is_empty() {
            for binding in &bindings {
                self.assign(&binding.name, &binding.value, &io)?;
            }
            return Ok(self.last_subst_status.unwrap_or(0));
        }
        self.through_chain(&argv, &mut |this: &mut Interpreter, argv: &[String]| {
            this.dispatch(argv, &bindings, &io, false)
        })
    }

    /// Passes `argv` through the exec-handler chain; `terminal` runs only if
    /// every handler lets it through.
    fn through_chain(
        &mut self,
        argv: &[String],
        terminal: &mut dyn FnMut(&mut Self, &[String]) -> Flow,
    ) -> Flow {
        let handlers = self.handlers.clone();
        let ctx = self.ctx.clone();
        let cwd = self.cwd.clone();
        let shell_id = self.shell_id.clone();
        let request = ExecRequest {
            shell_id: &shell_id,
            argv,
            cwd: &cwd,
            ctx: &ctx,
        };
        // Control flow other than a fatal error has to cross the chain, which
        // only knows statuses and errors.
        let mut escaped = None;
        let result = handlers.run(&request, &mut |req: &ExecRequest<'_>| {
            match terminal(self, req.argv) {
                Ok(status) => Ok(status),
                Err(Control::Fatal(e)) => Err(e),
                Err(other) => {
                    escaped = Some(other);
                    Ok(GENERIC_FAILURE_CODE)
                }
            }
        });
        if let Some(control) = escaped {
            return Err(control);
        }
        result.map_err(Control::Fatal)
    }

    /// Runs an argv that the chain has already let through.
    fn dispatch(
        &mut self,
        argv: &[String],
        bindings: &[Binding],
        io: &Io,
        skip_functions: bool,
    ) -> Flow {
        let Some(name) = argv.first() else {
            return Ok(0);
        };
        if !skip_functions && let Some(body) = self.functions.get(name).cloned() {
            return self.call_function(name, &body, argv.get(1..).unwrap_or_default(), bindings, io);
        }
        if let Some(builtin) = builtins::lookup(name) {
            return self.with_bindings(bindings, |this| builtin(this, argv, io));
        }
        self.run_external(argv, bindings, io)
    }

    /// Runs `f` with `bindings` set, then restores the previous values.
    fn with_bindings(&mut self, bindings: &[Binding], f: impl FnOnce(&mut Self) -> Flow) -> Flow {
        let saved: Vec<(String, Option<String>)> = bindings
            .iter()
            .map(|b| (b.name.clone(), self.vars.get(&b.name).map(str::to_string)))
            .collect();
        for binding in bindings {
            self.vars.set(&binding.name, &binding.value);
        }
        let result = f(self);
        for (name, value) in saved.into_iter().rev() {
            match value {
                Some(value) => self.vars.set(&name, &value),
                None => {
                    self.vars.unset(&name);
                }
            }
        }
        result
    }

    fn call_function(
        &mut self,
        name: &str,
        body: &ast::FunctionBody,
        args: &[String],
        bindings: &[Binding],
        io: &Io,
    ) -> Flow {
        if self.call_depth >= MAX_CALL_DEPTH {
            io.error(format!("{}: maximum function nesting level exceeded", name));
            return Err(Control::Failed(GENERIC_FAILURE_CODE));
        }
        let saved = std::mem::replace(&mut self.positional, args.to_vec());
        self.local_frames.push(Vec::new());
        self.call_depth += 1;
        let result = self.with_bindings(bindings, |this| {
            let ast::FunctionBody(command, redirects) = body;
            this.run_compound(command, redirects.as_ref(), io)
        });
        self.call_depth -= 1;
        for (var, value) in self.local_frames.pop().unwrap_or_default().into_iter().rev() {
            match value {
                Some(value) => self.vars.set(&var, &value),
                None => {
                    self.vars.unset(&var);
                }
            }
        }
        self.positional = saved;
        match result {
            Err(Control::Return(status)) => Ok(status),
            other => other,
        }
    }

    /// The process for `argv` with the shell's variables and `bindings` as
    /// its environment.
    fn external_command(&self, argv: &[String], bindings: &[Binding]) -> Command {
        let (program, args) = argv
            .split_first()
            .map_or(("", <&[String]>::default()), |(p, a)| (p.as_str(), a));
        let mut command = if program.contains('/') {
            Command::new(self.cwd.join(program))
        } else {
            Command::new(program)
        };
        command
            .args(args)
            .current_dir(&self.cwd)
            .env_clear()
            .envs(self.vars.iter());
        for binding in bindings {
            command.env(&binding.name, &binding.value);
        }
        command
    }

    fn run_external(&mut self, argv: &[String], bindings: &[Binding], io: &Io) -> Flow {
        let command = self.external_command(argv, bindings);
        let label = argv.first().cloned().unwrap_or_default();
        if self.detached {
            return match process::spawn_detached(command, &label) {
                Ok(pid) => {
                    self.last_bg = Some(pid);
                    Ok(0)
                }
                Err(ProcessError::Spawn { command, source }) => {
                    Ok(spawn_failure(&command, &source, io))
                }
                Err(e) => Err(Control::Fatal(e.into())),
            };
        }

        let map = CaptureMap::new(io);
        let mut stage = Stage::new(command, label);
        stage.stdin = io.stdin.to_input();
        stage.stdout = map.target(&io.stdout)?;
        stage.stderr = map.target(&io.stderr)?;
        let outcome = match process::run_pipeline(vec![stage], Input::Null, &self.ctx) {
            Ok(outcome) => outcome,
            Err(ProcessError::Spawn { command, source }) => {
                return Ok(spawn_failure(&command, &source, io));
            }
            Err(e) => return Err(Control::Fatal(e.into())),
        };
        map.deliver(&outcome);
        if let Some(cause) = outcome.interrupted {
            return Err(Control::Fatal(ShellError::Interrupted { cause }));
        }
        Ok(outcome
            .codes
            .first()
            .copied()
            .flatten()
            .unwrap_or(GENERIC_FAILURE_CODE))
    }

    fn run_compound(
        &mut self,
        command: &ast::CompoundCommand,
        redirects: Option<&ast::RedirectList>,
        io: &Io,
    ) -> Flow {
        let redirects: Vec<&ast::IoRedirect> = redirects.iter().flat_map(|r| r.0.iter()).collect();
        let io = match self.apply_redirects(&redirects, io)? {
            Ok(io) => io,
            Err(message) => {
                io.error(message);
                return Ok(GENERIC_FAILURE_CODE);
            }
        };
        match command {
            ast::CompoundCommand::BraceGroup(group) => self.run_list(&group.list, &io),
            ast::CompoundCommand::Subshell(subshell) => {
                self.subshell(|sub| sub.run_list(&subshell.list, &io))
            }
            ast::CompoundCommand::ForClause(clause) => self.run_for(
                &clause.variable_name,
                clause.values.as_deref(),
                &clause.body.list,
                &io,
            ),
            ast::CompoundCommand::WhileClause(clause) => {
                self.run_while(&clause.0, &clause.1.list, false, &io)
            }
            ast::CompoundCommand::UntilClause(clause) => {
                self.run_while(&clause.0, &clause.1.list, true, &io)
            }
            ast::CompoundCommand::IfClause(clause) => {
                if self.run_guarded(|this| this.run_list(&clause.condition, &io))? == 0 {
                    return self.run_list(&clause.then, &io);
                }
                for branch in clause.elses.iter().flatten() {
                    match &branch.condition {
                        Some(condition) => {
                            if self.run_guarded(|this| this.run_list(condition, &io))? == 0 {
                                return self.run_list(&branch.body, &io);
                            }
                        }
                        None => return self.run_list(&branch.body, &io),
                    }
                }
                Ok(0)
            }
            ast::CompoundCommand::CaseClause(clause) => {
                let value = self.expand_string(&clause.value.to_string(), &io)?;
                for case in &clause.cases {
                    for raw in &case.patterns {
                        let pattern = self.expand_pattern(&raw.to_string(), &io)?;
                        if pattern::matches(&pattern, &value) {
                            return match &case.cmd {
                                Some(list) => self.run_list(list, &io),
                                None => Ok(0),
                            };
                        }
                    }
                }
                Ok(0)
            }
            ast::CompoundCommand::Arithmetic(command) => {
                let value = self.eval_arithmetic(&command.expr.to_string(), &io)?;
                Ok(i32::from(value == 0))
            }
            ast::CompoundCommand::ArithmeticForClause(clause) => {
                let text = |expr: &Option<ast::UnexpandedArithmeticExpr>| {
                    expr.as_ref().map(ToString::to_string).unwrap_or_default()
                };
                let (init, condition, update) =
                    (text(&clause.initializer), text(&clause.condition), text(&clause.updater));
                self.eval_arithmetic(&init, &io)?;
                let mut status = 0;
                loop {
                    self.check_interrupt()?;
                    if !condition.trim().is_empty() && self.eval_arithmetic(&condition, &io)? == 0 {
                        break;
                    }
                    match self.loop_body(&clause.body.list, &io)? {
                        Step::Next(s) => status = s,
                        Step::Stop(s) => {
                            status = s;
                            break;
                        }
                    }
                    self.eval_arithmetic(&update, &io)?;
                }
                Ok(status)
            }
        }
    }

    fn loop_body(&mut self, body: &ast::CompoundList, io: &Io) -> Flow<Step> {
        self.loop_depth += 1;
        let result = self.run_list(body, io);
        self.loop_depth -= 1;
        match result {
            Ok(status) => Ok(Step::Next(status)),
            Err(Control::Break(n)) if n > 1 => Err(Control::Break(n - 1)),
            Err(Control::Break(_)) => Ok(Step::Stop(0)),
            Err(Control::Continue(n)) if n > 1 => Err(Control::Continue(n - 1)),
            Err(Control::Continue(_)) => Ok(Step::Next(0)),
            Err(other) => Err(other),
        }
    }

    fn run_for(
        &mut self,
        variable: &str,
        values: Option<&[ast::Word]>,
        body: &ast::CompoundList,
        io: &Io,
    ) -> Flow {
        let values = match values {
            Some(words) => {
                let raw: Vec<String> = words.iter().map(ToString::to_string).collect();
                self.expand_words(&raw, io)?
            }
            None => self.positional.clone(),
        };
        let mut status = 0;
        for value in values {
            self.check_interrupt()?;
            self.assign(variable, &value, io)?;
            match self.loop_body(body, io)? {
                Step::Next(s) => status = s,
                Step::Stop(s) => {
                    status = s;
                    break;
                }
            }
        }
        Ok(status)
    }

    fn run_while(
        &mut self,
        condition: &ast::CompoundList,
        body: &ast::CompoundList,
        until: bool,
        io: &Io,
    ) -> Flow {
        let mut status = 0;
        loop {
            self.check_interrupt()?;
            let tested = self.run_guarded(|this| this.run_list(condition, io))?;
            if (tested == 0) == until {
                break;
            }
            match self.loop_body(body, io)? {
                Step::Next(s) => status = s,
                Step::Stop(s) => {
                    status = s;
                    break;
                }
            }
        }
        Ok(status)
    }

    /// Sets a variable, refusing read-only ones.
    fn assign(&mut self, name: &str, value: &str, io: &Io) -> Flow<()> {
        if self.readonly.contains(name) {
            io.error(format!("{}: readonly variable", name));
            return Err(Control::Failed(GENERIC_FAILURE_CODE));
        }
        self.vars.set(name, value);
        Ok(())
    }

    /// Expands `NAME=value` and `NAME+=value` words.
    fn expand_bindings(&mut self, raw: &[String], io: &Io) -> Flow<Vec<Binding>> {
        let mut bindings = Vec::with_capacity(raw.len());
        for word in raw {
            let Some((target, value)) = word.split_once('=') else {
                continue;
            };
            let (name, append) = match target.strip_suffix('+') {
                Some(name) => (name, true),
                None => (target, false),
            };
            if !vars::is_name(name) || (value.starts_with('(') && value.ends_with(')')) {
                io.error(format!("{}: arrays are not supported", name));
                return Err(Control::Failed(GENERIC_FAILURE_CODE));
            }
            let mut value = self.expand_string(value, io)?;
            if append {
                value = format!("{}{}", self.vars.get(name).unwrap_or_default(), value);
            }
            bindings.push(Binding {
                name: name.to_string(),
                value,
            });
        }
        Ok(bindings)
    }
}

/// Reports a program that could not be started and returns its status.
fn spawn_failure(command: &str, source: &std::io::Error, io: &Io) -> i32 {
    match source.kind() {
        ErrorKind::NotFound => {
            io.error(format!("{}: command not found", command));
            127
        }
        ErrorKind::PermissionDenied => {
            io.error(format!("{}: Permission denied", command));
            126
        }
        _ => {
            io.error(format!("{}: {}", command, source));
            126
        }
    }
}

#[cfg(test)]
mod tests;
