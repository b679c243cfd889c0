//! Fan-in queue shared by every input port.
//!
//! Many producers hold a [`QueueSink`]; exactly one dispatch loop holds the
//! [`QueueReceiver`]. Ordering is FIFO per producer. Capacity is a deployment
//! choice: `None` builds an unbounded channel, `Some(n)` a bounded one where
//! producers wait for room.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::Message;

use super::error::QueueError;

#[derive(Clone)]
enum SenderInner {
    Bounded(mpsc::Sender<Message>),
    Unbounded(mpsc::UnboundedSender<Message>),
}

enum ReceiverInner {
    Bounded(mpsc::Receiver<Message>),
    Unbounded(mpsc::UnboundedReceiver<Message>),
}

/// Write-only handle given to input ports.
///
/// Once shutdown is signalled the sink refuses further pushes, so a port that
/// misses its cancellation check still cannot feed the loop.
#[derive(Clone)]
pub struct QueueSink {
    inner: SenderInner,
    shutdown: CancellationToken,
}

/// Consumer end, owned by the dispatch loop
pub struct QueueReceiver {
    inner: ReceiverInner,
}

/// Create a fan-in queue with the given capacity
pub fn fan_in(capacity: Option<usize>, shutdown: CancellationToken) -> (QueueSink, QueueReceiver) {
    match capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (
                QueueSink {
                    inner: SenderInner::Bounded(tx),
                    shutdown,
                },
                QueueReceiver {
                    inner: ReceiverInner::Bounded(rx),
                },
            )
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                QueueSink {
                    inner: SenderInner::Unbounded(tx),
                    shutdown,
                },
                QueueReceiver {
                    inner: ReceiverInner::Unbounded(rx),
                },
            )
        }
    }
}

impl QueueSink {
    /// Enqueue a message, waiting for room if the queue is bounded and full.
    ///
    /// Returns [`QueueError::Closed`] once shutdown has been signalled or the
    /// dispatch loop is gone.
    pub async fn push(&self, message: Message) -> Result<(), QueueError> {
        if self.shutdown.is_cancelled() {
            return Err(QueueError::Closed);
        }

        match &self.inner {
            SenderInner::Unbounded(tx) => tx.send(message).map_err(|_| QueueError::Closed),
            SenderInner::Bounded(tx) => {
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => Err(QueueError::Closed),
                    sent = tx.send(message) => sent.map_err(|_| QueueError::Closed),
                }
            }
        }
    }

    /// Enqueue without waiting. Fails with [`QueueError::Full`] on a full
    /// bounded queue.
    pub fn try_push(&self, message: Message) -> Result<(), QueueError> {
        if self.shutdown.is_cancelled() {
            return Err(QueueError::Closed);
        }

        match &self.inner {
            SenderInner::Unbounded(tx) => tx.send(message).map_err(|_| QueueError::Closed),
            SenderInner::Bounded(tx) => tx.try_send(message).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => QueueError::Full,
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
            }),
        }
    }

    /// True once shutdown is signalled or the receiver is dropped
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
            || match &self.inner {
                SenderInner::Bounded(tx) => tx.is_closed(),
                SenderInner::Unbounded(tx) => tx.is_closed(),
            }
    }
}

impl QueueReceiver {
    /// Next message, or `None` once every sink is dropped and the queue drained
    pub async fn recv(&mut self) -> Option<Message> {
        match &mut self.inner {
            ReceiverInner::Bounded(rx) => rx.recv().await,
            ReceiverInner::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Stop accepting new messages; already queued ones can still be received
    pub fn close(&mut self) {
        match &mut self.inner {
            ReceiverInner::Bounded(rx) => rx.close(),
            ReceiverInner::Unbounded(rx) => rx.close(),
        }
    }
}
