//! Cooperative cancellation for evaluation attempts.
//!
//! A `CancelHandle` is registered in the lock registry so that a newer attempt
//! can signal an older one; the attempt itself holds the matching
//! `CancelToken` and checks it at every suspension point.

use std::sync::Arc;

use tokio::sync::watch;

/// Create a connected handle/token pair.
pub fn cancellation_pair() -> (CancelHandle, CancelToken) {
    let (sender, receiver) = watch::channel(false);
    (
        CancelHandle {
            sender: Arc::new(sender),
        },
        CancelToken { receiver },
    )
}

/// Signalling side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Signal cancellation. Returns true only for the call that actually
    /// flipped the token.
    pub fn cancel(&self) -> bool {
        self.sender.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Observing side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is signalled.
    ///
    /// If every handle is dropped without cancelling, this never resolves.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_pair_is_not_cancelled() {
        let (handle, token) = cancellation_pair();
        assert!(!handle.is_cancelled());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_reported_once() {
        let (handle, token) = cancellation_pair();
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cloned_handles_share_state() {
        let (handle, token) = cancellation_pair();
        let other = handle.clone();
        assert!(other.cancel());
        assert!(!handle.cancel());
        assert!(token.clone().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_signal() {
        let (handle, token) = cancellation_pair();
        let waiter = tokio::spawn(async move { token.cancelled().await });
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancellation should be observed")
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_already_cancelled() {
        let (handle, token) = cancellation_pair();
        handle.cancel();
        tokio::time::timeout(Duration::from_millis(10), token.cancelled())
            .await
            .expect("already-cancelled token should resolve at once");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_never_cancels() {
        let (handle, token) = cancellation_pair();
        drop(handle);
        let result = tokio::time::timeout(Duration::from_secs(60), token.cancelled()).await;
        assert!(result.is_err());
        assert!(!token.is_cancelled());
    }
}
