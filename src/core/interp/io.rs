// src/core/interp/io.rs

//! Standard streams as seen by the interpreter, and redirections over them.

use super::{Control, Flow, Interpreter};
use crate::system::process::{Input, PipelineOutcome, Stream, Target};
use brush_parser::ast;
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

pub(crate) type SharedBuf = Arc<Mutex<Vec<u8>>>;

/// Where an output stream goes.
#[derive(Debug, Clone)]
pub(crate) enum Out {
    Buffer(SharedBuf),
    File(Arc<File>),
    Null,
    /// Into the next stage of an all-external pipeline. Builtins never see it.
    Pipe,
}

impl Out {
    pub(crate) fn buffer() -> (Self, SharedBuf) {
        let buffer = SharedBuf::default();
        (Self::Buffer(buffer.clone()), buffer)
    }

    pub(crate) fn write(&self, bytes: &[u8]) -> io::Result<()> {
        match self {
            Self::Buffer(buffer) => {
                buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(bytes);
                Ok(())
            }
            Self::File(file) => (&**file).write_all(bytes),
            Self::Null | Self::Pipe => Ok(()),
        }
    }

    pub(crate) fn write_str(&self, text: &str) -> io::Result<()> {
        self.write(text.as_bytes())
    }

    fn same_buffer(&self, other: &SharedBuf) -> bool {
        matches!(self, Self::Buffer(buffer) if Arc::ptr_eq(buffer, other))
    }
}

/// Where standard input comes from.
#[derive(Debug, Clone)]
pub(crate) enum In {
    Null,
    /// Shared so that successive `read`s consume successive lines.
    Bytes(Arc<Mutex<Cursor<Vec<u8>>>>),
    /// From the previous stage of an all-external pipeline.
    Pipe,
}

impl In {
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::Bytes(Arc::new(Mutex::new(Cursor::new(bytes))))
    }

    /// The next line without its newline, and whether a newline ended it.
    /// `None` at end of input.
    pub(crate) fn read_line(&self) -> Option<(String, bool)> {
        let Self::Bytes(cursor) = self else {
            return None;
        };
        let mut cursor = cursor.lock().unwrap_or_else(PoisonError::into_inner);
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        while let Ok(1) = cursor.read(&mut byte) {
            if byte == [b'\n'] {
                return Some((String::from_utf8_lossy(&line).into_owned(), true));
            }
            line.extend_from_slice(&byte);
        }
        (!line.is_empty()).then(|| (String::from_utf8_lossy(&line).into_owned(), false))
    }

    /// Everything not consumed yet. The stream is at its end afterwards.
    pub(crate) fn take_rest(&self) -> Vec<u8> {
        let mut rest = Vec::new();
        if let Self::Bytes(cursor) = self {
            let mut cursor = cursor.lock().unwrap_or_else(PoisonError::into_inner);
            cursor.read_to_end(&mut rest).ok();
        }
        rest
    }

    pub(crate) fn to_input(&self) -> Input {
        match self {
            Self::Null => Input::Null,
            Self::Bytes(_) => Input::Bytes(self.take_rest()),
            Self::Pipe => Input::Inherit,
        }
    }
}

/// The three standard streams.
#[derive(Debug, Clone)]
pub(crate) struct Io {
    pub(crate) stdin: In,
    pub(crate) stdout: Out,
    pub(crate) stderr: Out,
}

impl Io {
    pub(crate) fn quiet() -> Self {
        Self {
            stdin: In::Null,
            stdout: Out::Null,
            stderr: Out::Null,
        }
    }

    /// Reports a shell-level error on stderr.
    pub(crate) fn error(&self, message: impl AsRef<str>) {
        // Nothing sensible is left to do if stderr itself is broken.
        self.stderr
            .write_str(&format!("agentsh: {}\n", message.as_ref()))
            .ok();
    }
}

/// Maps in-memory buffers onto the two streams a child process can capture,
/// and hands the captured bytes back afterwards.
#[derive(Debug)]
pub(crate) struct CaptureMap {
    stdout: Option<SharedBuf>,
    stderr: Option<SharedBuf>,
}

impl CaptureMap {
    pub(crate) fn new(io: &Io) -> Self {
        let stdout = match &io.stdout {
            Out::Buffer(buffer) => Some(buffer.clone()),
            _ => None,
        };
        let stderr = match &io.stderr {
            Out::Buffer(buffer) if !stdout.as_ref().is_some_and(|out| Arc::ptr_eq(out, buffer)) => {
                Some(buffer.clone())
            }
            _ => None,
        };
        Self { stdout, stderr }
    }

    pub(crate) fn target(&self, out: &Out) -> io::Result<Target> {
        Ok(match out {
            Out::Buffer(_) if self.stdout.as_ref().is_some_and(|b| out.same_buffer(b)) => {
                Target::Capture(Stream::Stdout)
            }
            Out::Buffer(_) => Target::Capture(Stream::Stderr),
            Out::File(file) => Target::File(file.try_clone()?),
            Out::Null => Target::Null,
            Out::Pipe => Target::Pipe,
        })
    }

    pub(crate) fn deliver(&self, outcome: &PipelineOutcome) {
        let stdout = self.stdout.as_ref().or(self.stderr.as_ref());
        let stderr = self.stderr.as_ref().or(self.stdout.as_ref());
        for (buffer, bytes) in [(stdout, &outcome.stdout), (stderr, &outcome.stderr)] {
            if let Some(buffer) = buffer
                && !bytes.is_empty()
            {
                buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(bytes);
            }
        }
    }
}

/// The file descriptor a redirection applies to, when it is one we model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fd {
    Stdin,
    Stdout,
    Stderr,
}

impl Fd {
    fn from_number(n: i64) -> Option<Self> {
        match n {
            0 => Some(Self::Stdin),
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            _ => None,
        }
    }
}

fn is_dev_null(path: &str) -> bool {
    path == "/dev/null" || path.eq_ignore_ascii_case("nul")
}

impl Interpreter {
    /// Applies `redirects` left to right on top of `io`.
    ///
    /// The inner result is the message to report when a file cannot be
    /// opened; the command then fails with status 1 without running.
    pub(super) fn apply_redirects(
        &mut self,
        redirects: &[&ast::IoRedirect],
        io: &Io,
    ) -> Flow<Result<Io, String>> {
        let mut io = io.clone();
        for redirect in redirects {
            match redirect {
                ast::IoRedirect::File(fd, kind, target) => {
                    let default_fd = match kind {
                        ast::IoFileRedirectKind::Read | ast::IoFileRedirectKind::DuplicateInput => 0,
                        _ => 1,
                    };
                    let fd = Fd::from_number(fd.map_or(default_fd, i64::from));
                    let target = match target {
                        ast::IoFileRedirectTarget::Filename(word) => {
                            self.expand_string(&word.to_string(), &io)?
                        }
                        ast::IoFileRedirectTarget::Duplicate(word) => {
                            self.expand_string(&word.to_string(), &io)?
                        }
                        ast::IoFileRedirectTarget::Fd(n) => n.to_string(),
                        ast::IoFileRedirectTarget::ProcessSubstitution(..) => {
                            return Ok(Err("process substitution is not supported".to_string()));
                        }
                    };
                    let Some(fd) = fd else {
                        continue;
                    };
                    let applied = match kind {
                        ast::IoFileRedirectKind::Read => self.redirect_input(&mut io, fd, &target),
                        ast::IoFileRedirectKind::Append => {
                            self.redirect_output(&mut io, fd, &target, OutputMode::Append)
                        }
                        ast::IoFileRedirectKind::Write => {
                            self.redirect_output(&mut io, fd, &target, OutputMode::Truncate)
                        }
                        ast::IoFileRedirectKind::DuplicateOutput => {
                            duplicate_output(&mut io, fd, &target);
                            Ok(())
                        }
                        ast::IoFileRedirectKind::DuplicateInput => {
                            if target == "-" && fd == Fd::Stdin {
                                io.stdin = In::Null;
                            }
                            Ok(())
                        }
                        // `>|` and `<>`.
                        _ => self.redirect_output(&mut io, fd, &target, OutputMode::Keep),
                    };
                    if let Err(message) = applied {
                        return Ok(Err(message));
                    }
                }
                ast::IoRedirect::HereDocument(fd, doc) => {
                    let body = doc.doc.to_string();
                    let body = if doc.requires_expansion {
                        self.expand_heredoc(&body, &io)?
                    } else {
                        body
                    };
                    if Fd::from_number(fd.map_or(0, i64::from)) == Some(Fd::Stdin) {
                        io.stdin = In::from_bytes(body.into_bytes());
                    }
                }
                ast::IoRedirect::HereString(fd, word) => {
                    let mut text = self.expand_string(&word.to_string(), &io)?;
                    text.push('\n');
                    if Fd::from_number(fd.map_or(0, i64::from)) == Some(Fd::Stdin) {
                        io.stdin = In::from_bytes(text.into_bytes());
                    }
                }
                ast::IoRedirect::OutputAndError(word, append) => {
                    let target = self.expand_string(&word.to_string(), &io)?;
                    let mode = if *append {
                        OutputMode::Append
                    } else {
                        OutputMode::Truncate
                    };
                    if let Err(message) = self.redirect_output(&mut io, Fd::Stdout, &target, mode) {
                        return Ok(Err(message));
                    }
                    io.stderr = io.stdout.clone();
                }
            }
        }
        Ok(Ok(io))
    }

    fn redirect_input(&self, io: &mut Io, fd: Fd, target: &str) -> Result<(), String> {
        if fd != Fd::Stdin {
            return Ok(());
        }
        if is_dev_null(target) {
            io.stdin = In::Null;
            return Ok(());
        }
        let path = self.cwd.join(target);
        let bytes = std::fs::read(&path).map_err(|e| format!("{}: {}", target, os_message(&e)))?;
        io.stdin = In::from_bytes(bytes);
        Ok(())
    }

    fn redirect_output(
        &self,
        io: &mut Io,
        fd: Fd,
        target: &str,
        mode: OutputMode,
    ) -> Result<(), String> {
        let out = if is_dev_null(target) {
            Out::Null
        } else {
            let file = open_for_writing(&self.cwd.join(target), mode)
                .map_err(|e| format!("{}: {}", target, os_message(&e)))?;
            Out::File(Arc::new(file))
        };
        match fd {
            Fd::Stdout => io.stdout = out,
            Fd::Stderr => io.stderr = out,
            Fd::Stdin => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum OutputMode {
    Truncate,
    Append,
    Keep,
}

fn open_for_writing(path: &Path, mode: OutputMode) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    match mode {
        OutputMode::Truncate => options.write(true).truncate(true),
        OutputMode::Append => options.append(true),
        OutputMode::Keep => options.write(true),
    };
    options.open(path)
}

/// `n>&m` and `n>&-`.
fn duplicate_output(io: &mut Io, fd: Fd, target: &str) {
    let source = match target {
        "1" => io.stdout.clone(),
        "2" => io.stderr.clone(),
        "-" => Out::Null,
        _ => return,
    };
    match fd {
        Fd::Stdout => io.stdout = source,
        Fd::Stderr => io.stderr = source,
        Fd::Stdin => {}
    }
}

/// `No such file or directory` rather than Rust's `... (os error 2)`.
fn os_message(e: &io::Error) -> String {
    match e.kind() {
        io::ErrorKind::NotFound => "No such file or directory".to_string(),
        io::ErrorKind::PermissionDenied => "Permission denied".to_string(),
        io::ErrorKind::IsADirectory => "Is a directory".to_string(),
        _ => e.to_string(),
    }
}

impl From<io::Error> for Control {
    fn from(e: io::Error) -> Self {
        Self::Fatal(crate::core::shell::ShellError::Setup {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_line_consumes_successive_lines() {
        let input = In::from_bytes(b"one\ntwo\nlast".to_vec());
        assert_eq!(input.read_line(), Some(("one".to_string(), true)));
        assert_eq!(input.read_line(), Some(("two".to_string(), true)));
        assert_eq!(input.read_line(), Some(("last".to_string(), false)));
        assert_eq!(input.read_line(), None);
    }

    #[test]
    fn test_take_rest_after_partial_read() {
        let input = In::from_bytes(b"head\nrest of it\n".to_vec());
        input.read_line();
        assert_eq!(input.take_rest(), b"rest of it\n");
        assert!(input.take_rest().is_empty());
    }

    #[test]
    fn test_capture_map_merges_streams_sharing_a_buffer() {
        // --- Setup ---
        let (out, buffer) = Out::buffer();
        let io = Io {
            stdin: In::Null,
            stdout: out.clone(),
            stderr: out,
        };
        let map = CaptureMap::new(&io);

        // --- Action ---
        let stderr_target = map.target(&io.stderr).unwrap();
        map.deliver(&PipelineOutcome {
            stdout: b"joined\n".to_vec(),
            ..PipelineOutcome::default()
        });

        // --- Assertions ---
        assert!(matches!(stderr_target, Target::Capture(Stream::Stdout)));
        assert_eq!(*buffer.lock().unwrap(), b"joined\n");
    }

    #[test]
    fn test_capture_map_keeps_separate_buffers_apart() {
        let (stdout, out_buf) = Out::buffer();
        let (stderr, err_buf) = Out::buffer();
        let io = Io {
            stdin: In::Null,
            stdout,
            stderr,
        };
        let map = CaptureMap::new(&io);
        assert!(matches!(
            map.target(&io.stderr).unwrap(),
            Target::Capture(Stream::Stderr)
        ));
        map.deliver(&PipelineOutcome {
            stdout: b"o".to_vec(),
            stderr: b"e".to_vec(),
            ..PipelineOutcome::default()
        });
        assert_eq!(*out_buf.lock().unwrap(), b"o");
        assert_eq!(*err_buf.lock().unwrap(), b"e");
    }

    #[test]
    fn test_duplicate_output_copies_current_target() {
        let (stdout, _) = Out::buffer();
        let mut io = Io {
            stdin: In::Null,
            stdout,
            stderr: Out::Null,
        };
        duplicate_output(&mut io, Fd::Stderr, "1");
        assert!(matches!(io.stderr, Out::Buffer(_)));
        duplicate_output(&mut io, Fd::Stdout, "-");
        assert!(matches!(io.stdout, Out::Null));
    }
}
