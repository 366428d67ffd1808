//! Per-call context: a timeout and a cancellation token threaded through every stage.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Context {
    timeout: Duration,
    cancel: CancellationToken,
}

/// Why a guarded call did not finish. Callers treat both like an I/O failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Interrupted {
    #[error("timed out")]
    TimedOut,
    #[error("cancelled")]
    Cancelled,
}

impl Context {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(timeout: Duration, cancel: CancellationToken) -> Self {
        Self { timeout, cancel }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Same timeout, child token: cancelling the parent cancels this one.
    pub fn child(&self) -> Self {
        Self {
            timeout: self.timeout,
            cancel: self.cancel.child_token(),
        }
    }

    /// Race `fut` against the timeout and the cancellation token.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
            r = tokio::time::timeout(self.timeout, fut) => r.map_err(|_| Interrupted::TimedOut),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_within_timeout() {
        let ctx = Context::new(Duration::from_secs(1));
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
    }

    #[tokio::test]
    async fn times_out() {
        let ctx = Context::new(Duration::from_millis(20));
        let r = ctx
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert_eq!(r, Err(Interrupted::TimedOut));
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let ctx = Context::default();
        ctx.cancel();
        let r = ctx.run(async { 1 }).await;
        assert_eq!(r, Err(Interrupted::Cancelled));
    }

    #[tokio::test]
    async fn parent_cancels_child() {
        let parent = Context::default();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }
}
