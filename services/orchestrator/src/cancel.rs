//! Run cancellation
//!
//! A `CancelHandle` flips a watch channel once; every `CancelToken` clone
//! observes it. Tokens are checked between pipeline stages, never inside a
//! store write.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// A connected handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (handle, token) = cancel_pair();
        // Keep the sender alive for the life of the process
        std::mem::forget(handle);
        token
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Pends forever if the handle is
    /// dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// A token that fires when this one does or after `timeout`, whichever is first.
    pub fn with_timeout(&self, timeout: Option<Duration>) -> (CancelToken, JoinHandle<()>) {
        let (handle, token) = cancel_pair();
        if self.is_cancelled() {
            handle.cancel();
        }
        let parent = self.clone();
        let watcher = tokio::spawn(async move {
            match timeout {
                Some(limit) => {
                    tokio::select! {
                        _ = parent.cancelled() => {}
                        _ = tokio::time::sleep(limit) => {
                            tracing::warn!(timeout_secs = limit.as_secs(), "run timeout reached, cancelling");
                        }
                    }
                }
                None => parent.cancelled().await,
            }
            handle.cancel();
        });
        (token, watcher)
    }
}
