//! One-way broadcast cancellation.
//!
//! A [`CancellationToken`] starts active and can be cancelled exactly once, with a
//! [`CancelReason`]. All clones observe the same state. Checking the state is a single atomic
//! load; waiting for it is backed by a [`watch`] channel so that late subscribers never miss a
//! cancellation that happened before they started waiting.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// Why a token was cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// The executor started shutting down.
    Shutdown,
    /// Running and queued tasks were asked to stop.
    TasksCancelled,
    /// Cancelled by the embedding application.
    Requested(Cow<'static, str>),
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Shutdown => f.write_str("shutdown"),
            CancelReason::TasksCancelled => f.write_str("tasks cancelled"),
            CancelReason::Requested(reason) => write!(f, "requested: {reason}"),
        }
    }
}

#[derive(Debug)]
struct TokenInner {
    cancelled: AtomicBool,
    reason_tx: watch::Sender<Option<CancelReason>>,
}

/// Broadcast, idempotent, one-way cancellation signal.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Creates an active token.
    pub fn new() -> Self {
        let (reason_tx, _) = watch::channel(None);

        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                reason_tx,
            }),
        }
    }

    /// Cancels the token.
    ///
    /// Returns `true` if this call performed the transition. Later calls keep the first reason
    /// and return `false`.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        self.inner.reason_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }

            // Stored before waiters are notified so that woken tasks see the flag set.
            self.inner.cancelled.store(true, Ordering::Release);
            *current = Some(reason);

            true
        })
    }

    /// Returns `true` once the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Returns the reason of the cancellation, if any.
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason_tx.borrow().clone()
    }

    /// Resolves once the token is cancelled, immediately if it already is.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }

        let mut reason_rx = self.inner.reason_tx.subscribe();
        // The sender lives as long as `self`, so the wait can only end on cancellation.
        let _ = reason_rx.wait_for(Option::is_some).await;
    }

    /// Runs `future` until it completes or the token is cancelled, whichever happens first.
    ///
    /// Returns [`None`] when cancellation won. The future is dropped at that point.
    pub async fn run_until_cancelled<F>(&self, future: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;

            _ = self.cancelled() => None,
            output = future => Some(output),
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn starts_active() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.reason(), None);
    }

    #[test]
    fn cancel_is_idempotent_and_keeps_first_reason() {
        let token = CancellationToken::new();

        assert!(token.cancel(CancelReason::Shutdown));
        assert!(!token.cancel(CancelReason::Requested("again".into())));

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some(CancelReason::Shutdown));
    }

    #[test]
    fn clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();

        clone.cancel(CancelReason::TasksCancelled);

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some(CancelReason::TasksCancelled));
    }

    #[tokio::test]
    async fn cancelled_resolves_for_all_waiters() {
        let token = CancellationToken::new();

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let token = token.clone();
                tokio::spawn(async move { token.cancelled().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel(CancelReason::Shutdown);

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(5), waiter)
                .await
                .expect("waiter should observe cancellation")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel(CancelReason::Shutdown);

        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("already cancelled token should resolve immediately");
    }

    #[tokio::test]
    async fn run_until_cancelled_returns_output_or_none() {
        let token = CancellationToken::new();
        assert_eq!(token.run_until_cancelled(async { 7 }).await, Some(7));

        token.cancel(CancelReason::Requested("test".into()));
        let output = token
            .run_until_cancelled(tokio::time::sleep(Duration::from_secs(60)))
            .await;
        assert_eq!(output, None);
    }
}
