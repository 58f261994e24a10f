// src/core/handlers.rs

//! The exec-handler chain: an ordered list of middlewares wrapping the step
//! that really runs a command.
//!
//! The interpreter runs the chain once per simple command, at the moment the
//! command is dispatched, with the argv that is about to execute: every
//! expansion has happened and nothing has been spawned yet. A handler either
//! passes the request on with `next` or refuses it.

use crate::core::context::ExecContext;
use crate::core::policy::BlockPolicy;
use crate::core::shell::ShellError;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Everything a handler may inspect about one dispatched command.
#[derive(Debug, Clone, Copy)]
pub struct ExecRequest<'a> {
    /// Short id of the shell running the command, for log lines.
    pub shell_id: &'a str,
    /// The fully expanded argv. Never empty.
    pub argv: &'a [String],
    /// The interpreter's working directory at dispatch time.
    pub cwd: &'a Path,
    /// The context bounding the whole `exec` call.
    pub ctx: &'a ExecContext,
}

/// The rest of the chain, as seen from one handler.
pub type Next<'n, T> = &'n mut dyn FnMut(&ExecRequest<'_>) -> Result<T, ShellError>;

/// One middleware of the chain.
pub trait ExecHandler<T>: Send + Sync {
    /// Inspects `request` and either calls `next` or returns an error.
    fn handle(&self, request: &ExecRequest<'_>, next: Next<'_, T>) -> Result<T, ShellError>;
}

/// Ordered middlewares. The first handler added runs first.
pub struct HandlerChain<T> {
    handlers: Vec<Arc<dyn ExecHandler<T>>>,
}

impl<T> fmt::Debug for HandlerChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl<T> Clone for HandlerChain<T> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

impl<T> Default for HandlerChain<T> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl<T: 'static> HandlerChain<T> {
    /// The standard chain: trace logging, then the block policy.
    pub fn standard(policy: BlockPolicy) -> Self {
        let mut chain = Self::default();
        chain.push(Arc::new(TraceHandler));
        chain.push(Arc::new(BlockPolicyHandler::new(policy)));
        chain
    }

    /// Appends `handler`; it runs after every handler already present.
    pub fn push(&mut self, handler: Arc<dyn ExecHandler<T>>) {
        self.handlers.push(handler);
    }

    /// Number of handlers in the chain.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True for a chain that goes straight to the terminal step.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the request through every handler and finally through `terminal`.
    pub fn run(
        &self,
        request: &ExecRequest<'_>,
        terminal: &mut dyn FnMut(&ExecRequest<'_>) -> Result<T, ShellError>,
    ) -> Result<T, ShellError> {
        self.run_from(0, request, terminal)
    }

    fn run_from(
        &self,
        index: usize,
        request: &ExecRequest<'_>,
        terminal: &mut dyn FnMut(&ExecRequest<'_>) -> Result<T, ShellError>,
    ) -> Result<T, ShellError> {
        match self.handlers.get(index) {
            Some(handler) => handler.handle(request, &mut |req: &ExecRequest<'_>| {
                self.run_from(index + 1, req, &mut *terminal)
            }),
            None => terminal(request),
        }
    }
}

/// Logs every command before it runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceHandler;

impl<T> ExecHandler<T> for TraceHandler {
    fn handle(&self, request: &ExecRequest<'_>, next: Next<'_, T>) -> Result<T, ShellError> {
        log::trace!("[shell {}] argv: {:?}", request.shell_id, request.argv);
        next(request)
    }
}

/// Refuses any command the block policy vetoes.
#[derive(Debug, Clone)]
pub struct BlockPolicyHandler {
    policy: BlockPolicy,
}

impl BlockPolicyHandler {
    /// A handler enforcing `policy`.
    pub fn new(policy: BlockPolicy) -> Self {
        Self { policy }
    }

    /// The error for `argv` if any predicate refuses it.
    pub fn check(&self, argv: &[String]) -> Result<(), ShellError> {
        match self.policy.check(argv) {
            Some(index) => {
                log::debug!("Predicate #{} blocked {:?}", index, argv);
                Err(ShellError::Blocked {
                    command: argv.first().cloned().unwrap_or_default(),
                })
            }
            None => Ok(()),
        }
    }
}

impl<T> ExecHandler<T> for BlockPolicyHandler {
    fn handle(&self, request: &ExecRequest<'_>, next: Next<'_, T>) -> Result<T, ShellError> {
        self.check(request.argv)?;
        next(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::command_blocker;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<&'static str>>, &'static str);

    impl ExecHandler<String> for Recorder {
        fn handle(
            &self,
            request: &ExecRequest<'_>,
            next: Next<'_, String>,
        ) -> Result<String, ShellError> {
            self.0.lock().unwrap().push(self.1);
            next(request)
        }
    }

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn request<'a>(argv: &'a [String], ctx: &'a ExecContext) -> ExecRequest<'a> {
        ExecRequest {
            shell_id: "test",
            argv,
            cwd: Path::new("."),
            ctx,
        }
    }

    #[test]
    fn test_handlers_run_in_order_then_terminal() {
        let first = Arc::new(Recorder(Mutex::new(Vec::new()), "first"));
        let second = Arc::new(Recorder(Mutex::new(Vec::new()), "second"));
        let mut chain: HandlerChain<String> = HandlerChain::default();
        chain.push(first.clone());
        chain.push(second.clone());

        let ctx = ExecContext::background();
        let words = argv(&["echo", "hi"]);
        let result = chain.run(&request(&words, &ctx), &mut |req: &ExecRequest<'_>| {
            Ok(req.argv.join(" ").to_uppercase())
        });

        assert_eq!(result.unwrap(), "ECHO HI");
        assert_eq!(*first.0.lock().unwrap(), vec!["first"]);
        assert_eq!(*second.0.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn test_block_policy_short_circuits_terminal() {
        let chain: HandlerChain<()> =
            HandlerChain::standard(BlockPolicy::new(vec![command_blocker(["curl"])]));
        let ctx = ExecContext::background();
        let mut ran = false;

        let words = argv(&["curl", "example.com"]);
        let result = chain.run(&request(&words, &ctx), &mut |_: &ExecRequest<'_>| {
            ran = true;
            Ok(())
        });

        match result {
            Err(ShellError::Blocked { command }) => assert_eq!(command, "curl"),
            other => panic!("expected a blocked error, got {:?}", other),
        }
        assert!(!ran);
    }

    #[test]
    fn test_allowed_argv_reaches_terminal_once() {
        let chain: HandlerChain<i32> =
            HandlerChain::standard(BlockPolicy::new(vec![command_blocker(["curl"])]));
        let ctx = ExecContext::background();
        let mut calls = 0;

        let words = argv(&["echo", "curl"]);
        let status = chain
            .run(&request(&words, &ctx), &mut |_: &ExecRequest<'_>| {
                calls += 1;
                Ok(0)
            })
            .unwrap();

        assert_eq!(status, 0);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_empty_policy_blocks_nothing() {
        let handler = BlockPolicyHandler::new(BlockPolicy::allow_all());
        assert!(handler.check(&argv(&["sudo", "reboot"])).is_ok());
    }
}
