use common::domain::{AdmittedItem, Message};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("request queue is full")]
    QueueFull,

    #[error("request queue is closed")]
    Closed,
}

/// Producer handle for the bounded admission queue.
///
/// Cheap to clone. Every submitted message is stamped with its admission time.
/// Once the pipeline starts shutting down all submissions fail with
/// [`SubmitError::Closed`].
#[derive(Debug, Clone)]
pub struct RequestQueue {
    tx: mpsc::Sender<AdmittedItem>,
}

impl RequestQueue {
    /// Create the queue and the receiving half handed to the dispatcher
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AdmittedItem>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Wait for capacity, then enqueue
    pub async fn submit(&self, message: Message) -> Result<(), SubmitError> {
        self.tx
            .send(AdmittedItem::new(message))
            .await
            .map_err(|_| SubmitError::Closed)
    }

    /// Enqueue without waiting
    pub fn try_submit(&self, message: Message) -> Result<(), SubmitError> {
        self.tx
            .try_send(AdmittedItem::new(message))
            .map_err(|e| match e {
                TrySendError::Full(_) => SubmitError::QueueFull,
                TrySendError::Closed(_) => SubmitError::Closed,
            })
    }

    /// Wait at most `timeout` for capacity
    pub async fn submit_timeout(
        &self,
        message: Message,
        timeout: Duration,
    ) -> Result<(), SubmitError> {
        self.tx
            .send_timeout(AdmittedItem::new(message), timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => SubmitError::QueueFull,
                SendTimeoutError::Closed(_) => SubmitError::Closed,
            })
    }

    pub fn max_capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
