use crate::{MapError, Result};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation flag shared between a request and its fetches.
///
/// Cancelling never preempts anything: holders check the token at I/O
/// boundaries (or race an I/O future against [`cancelled`](Self::cancelled))
/// and bail out with `MapError::Cancelled`. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every clone of this token
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, AtomicOrdering::SeqCst) {
            self.state.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(AtomicOrdering::SeqCst)
    }

    /// `Err(Cancelled)` once the token has been cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(MapError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Runs `future` unless the token is cancelled first
    pub async fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(MapError::Cancelled),
            result = future => result,
        }
    }
}
