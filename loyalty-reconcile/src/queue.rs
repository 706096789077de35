//! Bounded reconciliation queue.
//!
//! Two producers feed it: order upload through [`QueueHandle::try_submit`],
//! which never waits, and the discovery loop through [`QueueHandle::push`],
//! which waits for space. A single [`QueueReceiver`] drains it.

use loyalty_domain::Order;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::error::ReconcileError;

/// Why a best-effort submission was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No free slot
    QueueFull,
    /// The worker is gone
    QueueClosed,
}

/// Outcome of a best-effort submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// The order is in the queue
    Enqueued,
    /// The order was not queued; discovery will pick it up later
    Dropped(DropReason),
}

/// Outcome of a blocking push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The order is in the queue
    Enqueued,
    /// Shutdown was requested while waiting for space
    Cancelled,
    /// The worker is gone
    Closed,
}

/// Create a queue with room for `capacity` orders.
///
/// # Errors
///
/// Returns `ReconcileError::InvalidConfig` if `capacity` is zero.
pub fn bounded(capacity: usize) -> Result<(QueueHandle, QueueReceiver), ReconcileError> {
    if capacity == 0 {
        return Err(ReconcileError::InvalidConfig(
            "queue capacity must be greater than zero".to_string(),
        ));
    }
    let (tx, rx) = mpsc::channel(capacity);
    Ok((QueueHandle { tx }, QueueReceiver { rx }))
}

/// Producer side of the queue.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    tx: mpsc::Sender<Order>,
}

impl QueueHandle {
    /// Enqueue without waiting; drops the order if there is no room.
    pub fn try_submit(&self, order: Order) -> Submission {
        match self.tx.try_send(order) {
            Ok(()) => Submission::Enqueued,
            Err(TrySendError::Full(_)) => Submission::Dropped(DropReason::QueueFull),
            Err(TrySendError::Closed(_)) => Submission::Dropped(DropReason::QueueClosed),
        }
    }

    /// Enqueue, waiting for room until `shutdown` fires.
    pub async fn push(&self, order: Order, shutdown: &CancellationToken) -> PushOutcome {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => PushOutcome::Cancelled,
            sent = self.tx.send(order) => match sent {
                Ok(()) => PushOutcome::Enqueued,
                Err(_) => PushOutcome::Closed,
            },
        }
    }
}

/// Consumer side of the queue.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<Order>,
}

impl QueueReceiver {
    /// Wait for the next order; `None` once every producer is gone.
    pub async fn recv(&mut self) -> Option<Order> {
        self.rx.recv().await
    }

    /// Refuse further orders. Already queued orders can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_domain::OrderNumber;
    use std::time::Duration;
    use uuid::Uuid;

    fn order() -> Order {
        Order::new(Uuid::now_v7(), OrderNumber::parse("79927398713").unwrap())
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(bounded(0), Err(ReconcileError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_try_submit_drops_when_full() {
        let (handle, mut receiver) = bounded(1).unwrap();

        assert_eq!(handle.try_submit(order()), Submission::Enqueued);
        assert_eq!(handle.try_submit(order()), Submission::Dropped(DropReason::QueueFull));

        assert!(receiver.recv().await.is_some());
        assert_eq!(handle.try_submit(order()), Submission::Enqueued);
    }

    #[tokio::test]
    async fn test_try_submit_after_close() {
        let (handle, mut receiver) = bounded(4).unwrap();
        receiver.close();

        assert_eq!(handle.try_submit(order()), Submission::Dropped(DropReason::QueueClosed));
    }

    #[tokio::test]
    async fn test_push_cancelled_while_full() {
        let (handle, _receiver) = bounded(1).unwrap();
        let shutdown = CancellationToken::new();
        assert_eq!(handle.push(order(), &shutdown).await, PushOutcome::Enqueued);

        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let outcome =
            tokio::time::timeout(Duration::from_secs(1), handle.push(order(), &shutdown)).await;
        assert_eq!(outcome.unwrap(), PushOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_push_waits_for_space() {
        let (handle, mut receiver) = bounded(1).unwrap();
        let shutdown = CancellationToken::new();
        handle.push(order(), &shutdown).await;

        let pusher = handle.clone();
        let token = shutdown.clone();
        let pending = tokio::spawn(async move { pusher.push(order(), &token).await });

        assert!(receiver.recv().await.is_some());
        assert_eq!(pending.await.unwrap(), PushOutcome::Enqueued);
        assert!(receiver.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_push_after_close() {
        let (handle, mut receiver) = bounded(1).unwrap();
        receiver.close();

        let outcome = handle.push(order(), &CancellationToken::new()).await;
        assert_eq!(outcome, PushOutcome::Closed);
    }
}
