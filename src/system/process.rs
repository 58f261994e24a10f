// src/system/process.rs

//! Spawning of external programs: single commands and pipelines of them.
//!
//! Every stage gets its own process group so the whole tree under it can be
//! killed when the context ends. Captured output is read on background
//! threads and collected over a channel while the children are polled.

use crate::constants::{GENERIC_FAILURE_CODE, POLL_INTERVAL, READER_GRACE_PERIOD};
use crate::core::context::{ExecContext, InterruptCause};
use std::fs::File;
use std::io::{self, PipeReader, PipeWriter, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Failure to start or reap a child process.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The program could not be started.
    #[error("Command '{command}' could not be executed: {source}")]
    Spawn {
        /// Label of the command that failed.
        command: String,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The child was started but its status could not be collected.
    #[error("Failed to wait for command '{command}': {source}")]
    Wait {
        /// Label of the command that failed.
        command: String,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },
    /// An anonymous pipe between stages could not be created.
    #[error("Failed to create a pipe: {0}")]
    Pipe(#[source] io::Error),
}

/// What a child process left behind.
///
/// Output is kept even when the run was interrupted, so callers can show
/// whatever the command printed before it was stopped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
    /// Exit code, or `128 + signal` for a child killed by a signal.
    pub code: Option<i32>,
    /// Set when the context ended before the child did.
    pub interrupted: Option<InterruptCause>,
}

impl ProcessOutcome {
    /// An outcome for a command that was never started or was cut short.
    pub fn interrupted(cause: InterruptCause) -> Self {
        Self {
            interrupted: Some(cause),
            ..Self::default()
        }
    }
}

/// One of the two captured streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Collected into `PipelineOutcome::stdout`.
    Stdout,
    /// Collected into `PipelineOutcome::stderr`.
    Stderr,
}

/// Where a stage reads its standard input from.
#[derive(Debug, Default)]
pub enum Input {
    /// The previous stage's output, or the pipeline input for the first stage.
    #[default]
    Inherit,
    /// End of file straight away.
    Null,
    /// Fed from memory by a writer thread.
    Bytes(Vec<u8>),
    /// An open file.
    File(File),
}

/// Where a stage writes one of its output streams.
#[derive(Debug)]
pub enum Target {
    /// Into the next stage. On the last stage this captures as stdout.
    Pipe,
    /// Into one of the captured streams.
    Capture(Stream),
    /// An open file.
    File(File),
    /// Discarded.
    Null,
}

/// One command of a pipeline with its wiring.
#[derive(Debug)]
pub struct Stage {
    /// The program, its arguments, cwd and environment. Stdio is overwritten.
    pub command: Command,
    /// Names the command in errors and log lines.
    pub label: String,
    /// Standard input.
    pub stdin: Input,
    /// Standard output.
    pub stdout: Target,
    /// Standard error.
    pub stderr: Target,
}

impl Stage {
    /// A stage reading from the pipe, writing stdout onward and capturing
    /// stderr.
    pub fn new(command: Command, label: impl Into<String>) -> Self {
        Self {
            command,
            label: label.into(),
            stdin: Input::Inherit,
            stdout: Target::Pipe,
            stderr: Target::Capture(Stream::Stderr),
        }
    }
}

/// The result of a whole pipeline.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// Bytes captured as stdout by any stage.
    pub stdout: Vec<u8>,
    /// Bytes captured as stderr by any stage.
    pub stderr: Vec<u8>,
    /// One entry per stage, in order. `None` for a stage that was killed.
    pub codes: Vec<Option<i32>>,
    /// Set when the context ended before the pipeline did.
    pub interrupted: Option<InterruptCause>,
}

impl PipelineOutcome {
    fn interrupted(cause: InterruptCause, stages: usize) -> Self {
        Self {
            codes: vec![None; stages],
            interrupted: Some(cause),
            ..Self::default()
        }
    }
}

enum ReaderEvent {
    Data(Stream, Vec<u8>),
    Closed,
}

/// Runs `command` to completion with captured output, honoring `ctx`.
///
/// stdin is always null. See `run_pipeline` for the polling and kill rules.
pub fn run(command: Command, label: &str, ctx: &ExecContext) -> Result<ProcessOutcome, ProcessError> {
    let mut stage = Stage::new(command, label);
    stage.stdin = Input::Null;
    let outcome = run_pipeline(vec![stage], Input::Null, ctx)?;
    Ok(ProcessOutcome {
        stdout: String::from_utf8_lossy(&outcome.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&outcome.stderr).into_owned(),
        code: outcome.codes.first().copied().flatten(),
        interrupted: outcome.interrupted,
    })
}

/// Runs `stages` concurrently, each stage's `Target::Pipe` output feeding
/// the next one's `Input::Inherit`.
///
/// The children are polled every `POLL_INTERVAL`; once the context is
/// cancelled or its deadline passes, every stage's process tree is killed and
/// reaped before returning. Output that arrived before that point is kept.
pub fn run_pipeline(
    stages: Vec<Stage>,
    input: Input,
    ctx: &ExecContext,
) -> Result<PipelineOutcome, ProcessError> {
    // Pre-flight cancellation check.
    if let Some(cause) = ctx.interrupt() {
        log::debug!("Not starting pipeline of {} stage(s): {}", stages.len(), cause);
        return Ok(PipelineOutcome::interrupted(cause, stages.len()));
    }

    let (tx, rx) = mpsc::channel();
    let mut readers = 0usize;
    let total = stages.len();

    // Kill whatever already started if we leave early through an error.
    let mut children = scopeguard::guard(Vec::<(Child, String)>::new(), |mut children| {
        for (child, _) in children.iter_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                kill_tree(child);
                child.wait().ok();
            }
        }
    });

    let mut pipeline_input = Some(input);
    let mut upstream: Option<PipeReader> = None;
    for (index, stage) in stages.into_iter().enumerate() {
        let Stage {
            mut command,
            label,
            stdin,
            stdout,
            stderr,
        } = stage;
        let previous = upstream.take();
        let stdin = match stdin {
            Input::Inherit if index == 0 => pipeline_input.take().unwrap_or(Input::Null),
            other => other,
        };

        let mut wiring = Wiring::new(index + 1 == total, &tx, &mut readers);
        command
            .stdin(input_stdio(stdin, previous).map_err(ProcessError::Pipe)?)
            .stdout(wiring.stdio(stdout).map_err(ProcessError::Pipe)?)
            .stderr(wiring.stdio(stderr).map_err(ProcessError::Pipe)?);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // A fresh process group, so grandchildren can be killed with the child.
            command.process_group(0);
        }

        let child = command.spawn().map_err(|e| ProcessError::Spawn {
            command: label.clone(),
            source: e,
        })?;
        // Our copies of the pipe ends must close, or readers never see EOF.
        drop(command);
        upstream = wiring.finish();
        log::debug!("Spawned '{}' (PID: {})", label, child.id());
        children.push((child, label));
    }
    drop(upstream);
    drop(tx);

    let mut codes: Vec<Option<i32>> = vec![None; children.len()];
    let mut interrupted = None;
    // Non-blocking wait loop to allow for cancellation.
    loop {
        let mut running = false;
        for ((child, label), code) in children.iter_mut().zip(codes.iter_mut()) {
            if code.is_some() {
                continue;
            }
            match child.try_wait() {
                Ok(Some(status)) => *code = Some(exit_code_of(status)),
                Ok(None) => running = true,
                Err(e) => {
                    return Err(ProcessError::Wait {
                        command: label.clone(),
                        source: e,
                    });
                }
            }
        }
        if !running {
            break;
        }
        if let Some(cause) = ctx.interrupt() {
            for ((child, label), code) in children.iter_mut().zip(codes.iter()) {
                if code.is_none() {
                    log::debug!("{}, killing '{}' (PID: {})...", cause, label, child.id());
                    kill_tree(child);
                    // Reap it so no zombie is left behind.
                    child.wait().ok();
                }
            }
            interrupted = Some(cause);
            break;
        }
        thread::sleep(next_tick(ctx));
    }
    let mut children = scopeguard::ScopeGuard::into_inner(children);

    let mut output = OutputCollector::new(readers);
    if interrupted.is_none() {
        // Background jobs may still hold the pipes after the children exit.
        if let Some(cause) = output.drain_until_closed(&rx, ctx) {
            log::debug!("{} while reading pipeline output", cause);
            for (child, _) in children.iter_mut() {
                kill_tree(child);
            }
            interrupted = Some(cause);
        }
    }
    if interrupted.is_some() {
        output.drain_for(&rx, READER_GRACE_PERIOD);
    }

    Ok(PipelineOutcome {
        stdout: output.stdout,
        stderr: output.stderr,
        codes,
        interrupted,
    })
}

/// Starts `command` without waiting for it: null stdio, its own process group.
///
/// Used for `&` jobs. The child is not tracked afterwards.
pub fn spawn_detached(mut command: Command, label: &str) -> Result<u32, ProcessError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let child = command.spawn().map_err(|e| ProcessError::Spawn {
        command: label.to_string(),
        source: e,
    })?;
    log::debug!("Started background job '{}' (PID: {})", label, child.id());
    Ok(child.id())
}

fn input_stdio(input: Input, previous: Option<PipeReader>) -> io::Result<Stdio> {
    match input {
        Input::Inherit => Ok(previous.map_or_else(Stdio::null, Stdio::from)),
        Input::Null => Ok(Stdio::null()),
        Input::File(file) => Ok(Stdio::from(file)),
        Input::Bytes(bytes) => {
            let (reader, mut writer) = io::pipe()?;
            thread::spawn(move || {
                // A child that stops reading early closes the pipe; that is fine.
                if let Err(e) = writer.write_all(&bytes) {
                    log::trace!("stdin feeder stopped: {}", e);
                }
            });
            Ok(Stdio::from(reader))
        }
    }
}

/// The pipes created for one stage.
struct Wiring<'a> {
    last: bool,
    tx: &'a Sender<ReaderEvent>,
    readers: &'a mut usize,
    next_reader: Option<PipeReader>,
    next_writer: Option<PipeWriter>,
    stdout_capture: Option<PipeWriter>,
    stderr_capture: Option<PipeWriter>,
}

impl<'a> Wiring<'a> {
    fn new(last: bool, tx: &'a Sender<ReaderEvent>, readers: &'a mut usize) -> Self {
        Self {
            last,
            tx,
            readers,
            next_reader: None,
            next_writer: None,
            stdout_capture: None,
            stderr_capture: None,
        }
    }

    /// Both streams pointed at the same target share one pipe, so their
    /// relative order is kept.
    fn stdio(&mut self, target: Target) -> io::Result<Stdio> {
        match target {
            Target::Pipe if !self.last => {
                let writer = match &self.next_writer {
                    Some(writer) => writer.try_clone()?,
                    None => {
                        let (reader, writer) = io::pipe()?;
                        self.next_reader = Some(reader);
                        let clone = writer.try_clone()?;
                        self.next_writer = Some(writer);
                        clone
                    }
                };
                Ok(Stdio::from(writer))
            }
            Target::Pipe => self.capture(Stream::Stdout),
            Target::Capture(stream) => self.capture(stream),
            Target::File(file) => Ok(Stdio::from(file)),
            Target::Null => Ok(Stdio::null()),
        }
    }

    fn capture(&mut self, stream: Stream) -> io::Result<Stdio> {
        let slot = match stream {
            Stream::Stdout => &mut self.stdout_capture,
            Stream::Stderr => &mut self.stderr_capture,
        };
        if let Some(writer) = slot {
            return Ok(Stdio::from(writer.try_clone()?));
        }
        let (reader, writer) = io::pipe()?;
        spawn_reader(reader, stream, self.tx.clone());
        *self.readers += 1;
        let clone = writer.try_clone()?;
        *slot = Some(writer);
        Ok(Stdio::from(clone))
    }

    /// Drops our write ends and hands back the read end for the next stage.
    fn finish(self) -> Option<PipeReader> {
        self.next_reader
    }
}

/// Sleeps for at most one poll interval, and never past the deadline.
fn next_tick(ctx: &ExecContext) -> Duration {
    match ctx.deadline() {
        Some(deadline) => deadline
            .saturating_duration_since(Instant::now())
            .min(POLL_INTERVAL)
            .max(Duration::from_millis(1)),
        None => POLL_INTERVAL,
    }
}

fn spawn_reader(mut pipe: PipeReader, stream: Stream, tx: Sender<ReaderEvent>) {
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = buf.get(..n).map(<[u8]>::to_vec).unwrap_or_default();
                    if tx.send(ReaderEvent::Data(stream, chunk)).is_err() {
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::debug!("Reading {:?} failed: {}", stream, e);
                    break;
                }
            }
        }
        tx.send(ReaderEvent::Closed).ok();
    });
}

struct OutputCollector {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    open: usize,
}

impl OutputCollector {
    fn new(open: usize) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            open,
        }
    }

    fn accept(&mut self, event: ReaderEvent) {
        match event {
            ReaderEvent::Data(Stream::Stdout, bytes) => self.stdout.extend(bytes),
            ReaderEvent::Data(Stream::Stderr, bytes) => self.stderr.extend(bytes),
            ReaderEvent::Closed => self.open = self.open.saturating_sub(1),
        }
    }

    fn is_done(&self) -> bool {
        self.open == 0
    }

    /// Reads until every pipe closes. Returns the interrupt cause if the
    /// context finished first.
    fn drain_until_closed(
        &mut self,
        rx: &Receiver<ReaderEvent>,
        ctx: &ExecContext,
    ) -> Option<InterruptCause> {
        while !self.is_done() {
            match rx.recv_timeout(next_tick(ctx)) {
                Ok(event) => self.accept(event),
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(cause) = ctx.interrupt() {
                        return Some(cause);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        None
    }

    /// Collects whatever arrives within `grace`.
    fn drain_for(&mut self, rx: &Receiver<ReaderEvent>, grace: Duration) {
        let until = Instant::now() + grace;
        while !self.is_done() {
            let left = until.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            match rx.recv_timeout(left) {
                Ok(event) => self.accept(event),
                Err(_) => break,
            }
        }
    }
}

fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    GENERIC_FAILURE_CODE
}

/// Kills the child together with everything it started.
fn kill_tree(child: &mut Child) {
    let pid = child.id();
    #[cfg(unix)]
    let group_killed = Command::new("kill")
        .args(["-KILL", "--", &format!("-{}", pid)])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success());
    #[cfg(windows)]
    let group_killed = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success());
    #[cfg(not(any(unix, windows)))]
    let group_killed = false;

    if !group_killed && let Err(e) = child.kill() {
        log::warn!("Failed to kill child process {}: {}", pid, e);
    }
}
