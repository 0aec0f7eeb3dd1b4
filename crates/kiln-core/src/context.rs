//! Per-request execution context.
//!
//! Carries a cancellation signal and an optional deadline. Services call
//! [`AppContext::check`] between store calls and wrap store futures in
//! [`AppContext::run`] so an abandoned request stops early.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{KilnError, KilnResult};

#[derive(Debug, Clone)]
pub struct AppContext {
    request_id: Uuid,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    deadline: Option<Instant>,
    shielded: bool,
}

impl Default for AppContext {
    fn default() -> Self {
        Self::background()
    }
}

impl AppContext {
    /// A context that is never cancelled unless asked to be.
    pub fn background() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            request_id: Uuid::new_v4(),
            cancel_tx: Arc::new(tx),
            cancel_rx: rx,
            deadline: None,
            shielded: false,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().child_with_timeout(timeout)
    }

    /// Derive a context sharing this one's cancellation signal, with the
    /// tighter of the two deadlines.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            request_id: self.request_id,
            cancel_tx: Arc::clone(&self.cancel_tx),
            cancel_rx: self.cancel_rx.clone(),
            deadline: Some(deadline),
            shielded: self.shielded,
        }
    }

    /// A clone whose [`run`](Self::run) still refuses to start once
    /// cancelled or expired, but never abandons a future it has started.
    ///
    /// Compensated store sections run under it: a write that was dropped
    /// after reaching the database would have no undo entry.
    pub fn shielded(&self) -> Self {
        Self {
            shielded: true,
            ..self.clone()
        }
    }


    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Signal cancellation to this context and every clone of it.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Fail fast if the context is cancelled or past its deadline.
    pub fn check(&self) -> KilnResult<()> {
        if self.is_cancelled() {
            return Err(KilnError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(KilnError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Race `fut` against cancellation and the deadline.
    pub async fn run<T>(&self, fut: impl Future<Output = KilnResult<T>>) -> KilnResult<T> {
        self.check()?;
        if self.shielded {
            return fut.await;
        }

        let mut cancel_rx = self.cancel_rx.clone();
        let cancelled = async move {
            if cancel_rx.wait_for(|cancelled| *cancelled).await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(KilnError::Cancelled),
            _ = expired => Err(KilnError::DeadlineExceeded),
            result = fut => result,
        }
    }
}
