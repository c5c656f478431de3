//! Cancellation and deadlines for engine calls.

use crate::error::Error;
use futures::future::{self, BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Context carries the caller's cancellation signals and deadline into every
/// cluster call and wait loop.
///
/// Contexts are cheap to clone. Deriving a context never loosens its parent:
/// a child keeps the parent's cancellation signals and the earlier of the two
/// deadlines.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: Vec<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// CancelHandle cancels the context it was created with, and every context
/// derived from it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Context::default()
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut ctx = self.clone();
        ctx.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        ctx
    }

    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        let mut ctx = self.clone();
        ctx.cancel.push(receiver);
        (
            ctx,
            CancelHandle {
                sender: Arc::new(sender),
            },
        )
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.iter().any(|rx| *rx.borrow())
    }

    /// The error this context has ended with, if it has.
    pub fn err(&self) -> Option<Error> {
        if self.is_cancelled() {
            return Some(Error::Cancelled("context cancelled".into()));
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Some(Error::DeadlineExceeded("context deadline exceeded".into()))
            }
            _ => None,
        }
    }

    pub fn check(&self) -> Result<(), Error> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Error {
        let cancelled = self.cancelled();
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Error::Cancelled("context cancelled".into()),
            _ = expired => Error::DeadlineExceeded("context deadline exceeded".into()),
        }
    }

    fn cancelled(&self) -> BoxFuture<'static, ()> {
        if self.cancel.is_empty() {
            return future::pending().boxed();
        }
        let waits = self.cancel.iter().cloned().map(|mut rx| {
            async move {
                // A dropped handle can no longer cancel.
                let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
                if closed {
                    future::pending::<()>().await;
                }
            }
            .boxed()
        });
        future::select_all(waits).map(|_| ()).boxed()
    }

    /// Runs `fut` unless the context ends first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            result = fut => result,
        }
    }

    /// Sleeps for `duration` unless the context ends first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Error> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}
