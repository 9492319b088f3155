//! A single cancellation scope shared by every worker and the aggregator.

use std::time::Duration;
use tokio::sync::watch;

#[derive(Clone)]
pub struct CancellationScope {
    rx: watch::Receiver<bool>,
}

pub struct CancellationTrigger {
    tx: watch::Sender<bool>,
}

/// Build a trigger/scope pair. Dropping the trigger without calling `cancel`
/// leaves the scope permanently un-cancelled (waiters simply never wake).
pub fn scope() -> (CancellationTrigger, CancellationScope) {
    let (tx, rx) = watch::channel(false);
    (CancellationTrigger { tx }, CancellationScope { rx })
}

impl CancellationTrigger {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancellationScope {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Waits until the scope is cancelled. Returns immediately if it already
    /// is.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleeps for `dur` unless the scope is cancelled first. Returns `true`
    /// if cancellation fired before the full duration elapsed.
    pub async fn sleep_or_cancelled(&mut self, dur: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(dur) => false,
            _ = self.cancelled() => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn sleep_completes_when_not_cancelled() {
        let (_trigger, mut s) = scope();
        let cancelled = s.sleep_or_cancelled(Duration::from_millis(20)).await;
        assert!(!cancelled);
    }

    #[tokio::test]
    async fn cancel_wakes_a_sleeping_waiter_immediately() {
        let (trigger, mut s) = scope();
        let task = tokio::spawn(async move { s.sleep_or_cancelled(Duration::from_secs(10)).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let start = Instant::now();
        trigger.cancel();

        let cancelled = task.await.unwrap();
        assert!(cancelled);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn already_cancelled_scope_returns_immediately() {
        let (trigger, mut s) = scope();
        trigger.cancel();
        let start = Instant::now();
        let cancelled = s.sleep_or_cancelled(Duration::from_secs(10)).await;
        assert!(cancelled);
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
