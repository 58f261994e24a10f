// src/core/context.rs

//! Cancellation and deadlines shared by every layer that can block.

use crate::CancellationToken;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Why a run was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptCause {
    /// The token was flipped, usually by Ctrl+C.
    Cancelled,
    /// The deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for InterruptCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "context canceled"),
            Self::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

/// Cancellation and deadline carried into every execution.
///
/// Clones share the same token, so cancelling any clone cancels them all.
/// The deadline is per-value: a child context can only shorten it.
#[derive(Debug, Clone)]
pub struct ExecContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::background()
    }
}

impl ExecContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Wraps an existing token, e.g. one flipped by a Ctrl+C handler.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// A fresh context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().child_with_timeout(timeout)
    }

    /// A fresh context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// Derives a context sharing this token whose deadline is the earlier of
    /// the current one and `now + timeout`.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now().checked_add(timeout);
        let deadline = match (self.deadline, candidate) {
            (Some(current), Some(new)) => Some(current.min(new)),
            (current, new) => current.or(new),
        };
        Self {
            token: Arc::clone(&self.token),
            deadline,
        }
    }

    /// Cancels this context and every clone sharing its token.
    pub fn cancel(&self) {
        self.token.store(true, Ordering::SeqCst);
    }

    /// The shared cancellation flag.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// When this context expires, if ever.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the reason this context is done, if it is.
    /// Explicit cancellation wins over an expired deadline.
    pub fn interrupt(&self) -> Option<InterruptCause> {
        if self.token.load(Ordering::SeqCst) {
            return Some(InterruptCause::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(InterruptCause::DeadlineExceeded),
            _ => None,
        }
    }

    /// True once the context is cancelled or past its deadline.
    pub fn is_done(&self) -> bool {
        self.interrupt().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_never_done() {
        let ctx = ExecContext::background();
        assert!(!ctx.is_done());
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let ctx = ExecContext::background();
        let child = ctx.child_with_timeout(Duration::from_secs(60));
        ctx.cancel();
        assert_eq!(child.interrupt(), Some(InterruptCause::Cancelled));
    }

    #[test]
    fn test_zero_timeout_is_already_expired() {
        let ctx = ExecContext::with_timeout(Duration::ZERO);
        assert_eq!(ctx.interrupt(), Some(InterruptCause::DeadlineExceeded));
    }

    #[test]
    fn test_child_keeps_the_earlier_deadline() {
        let parent = ExecContext::with_timeout(Duration::from_secs(1));
        let child = parent.child_with_timeout(Duration::from_secs(3600));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[test]
    fn test_past_deadline_is_exceeded() {
        let ctx = ExecContext::with_deadline(Instant::now());
        assert_eq!(ctx.interrupt(), Some(InterruptCause::DeadlineExceeded));
        ctx.cancel();
        assert_eq!(ctx.interrupt(), Some(InterruptCause::Cancelled));
    }
}
