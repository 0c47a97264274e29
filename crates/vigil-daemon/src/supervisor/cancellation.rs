use tokio::sync::watch;

/// Sending side of a [`CancellationToken`].
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

/// Stops the tick loop between ticks. Dropping the handle counts as
/// cancellation.
#[derive(Clone)]
pub struct CancellationToken {
    receiver: watch::Receiver<bool>,
}

impl CancellationToken {
    pub fn new() -> (CancelHandle, Self) {
        let (sender, receiver) = watch::channel(false);
        (CancelHandle { sender }, Self { receiver })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    pub async fn cancelled(&mut self) {
        while !*self.receiver.borrow() {
            if self.receiver.changed().await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let (handle, token) = CancellationToken::new();
        let mut waiter = token.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });

        assert!(!token.is_cancelled());
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(token.is_cancelled());
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_handle_releases_waiters() {
        let (handle, mut token) = CancellationToken::new();
        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), token.cancelled()).await.unwrap();
    }

    #[test]
    fn test_cancelled_stays_pending_until_cancel() {
        let (handle, mut token) = CancellationToken::new();
        let mut waiter = tokio_test::task::spawn(async move { token.cancelled().await });

        tokio_test::assert_pending!(waiter.poll());
        handle.cancel();
        assert!(waiter.is_woken());
        tokio_test::assert_ready!(waiter.poll());
    }
}
