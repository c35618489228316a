//! Request-scoped cancellation, the Rust stand-in for Go's
//! `context.Context`.
//!
//! Every suspension point in the fetch pipeline — HTTP GETs, subprocess
//! exec, cache I/O, backoff sleeps — takes a [`FetchContext`] and races
//! its own work against cancellation, so a client disconnect or
//! deadline promptly unwinds the whole chain instead of leaking a
//! background fetch.

use crate::error::{Error, Result};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// A cancellation token plus an optional deadline, threaded through one
/// inbound request's fetch/verify/cache pipeline.
#[derive(Debug, Clone)]
pub struct FetchContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl FetchContext {
    /// A context with no deadline, cancelled only by an explicit `cancel()`.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A context that self-cancels after `timeout` elapses.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Signals cancellation to every clone of this context.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// A child context: cancelling the parent cancels the child, but
    /// not vice versa.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Returns an error immediately if already cancelled or past deadline.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Sleeps for `duration`, waking early (with an error) if the
    /// context is cancelled or its deadline elapses first.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.check()?;
        let sleep_for = match self.deadline {
            Some(deadline) => duration.min(deadline.saturating_duration_since(Instant::now())),
            None => duration,
        };
        tokio::select! {
            () = self.token.cancelled() => Err(Error::Cancelled),
            () = tokio::time::sleep(sleep_for) => self.check(),
        }
    }

    /// Races `fut` against cancellation/deadline, returning whichever
    /// resolves first.
    pub async fn race<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        if let Some(deadline) = self.deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::select! {
                () = self.token.cancelled() => Err(Error::Cancelled),
                () = tokio::time::sleep(remaining) => Err(Error::DeadlineExceeded),
                result = fut => result,
            }
        } else {
            tokio::select! {
                () = self.token.cancelled() => Err(Error::Cancelled),
                result = fut => result,
            }
        }
    }
}

impl Default for FetchContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn check_passes_when_not_cancelled() {
        let ctx = FetchContext::new();
        assert!(ctx.check().is_ok());
    }

    #[tokio::test]
    async fn check_fails_after_cancel() {
        let ctx = FetchContext::new();
        ctx.cancel();
        assert!(matches!(ctx.check(), Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn race_returns_cancelled_error_on_cancel() {
        let ctx = FetchContext::new();
        let ctx2 = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            ctx2.cancel();
        });
        let result: Result<()> = ctx
            .race(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn race_returns_future_result_when_it_wins() {
        let ctx = FetchContext::new();
        let result = ctx.race(async { Ok::<_, Error>(42) }).await.unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn child_cancelled_by_parent() {
        let parent = FetchContext::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.check().is_err());
    }

    #[tokio::test]
    async fn deadline_exceeded_when_already_past() {
        let ctx = FetchContext::with_timeout(Duration::from_millis(0));
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(matches!(ctx.check(), Err(Error::DeadlineExceeded)));
    }
}
