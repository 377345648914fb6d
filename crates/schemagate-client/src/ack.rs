//! Per-record acknowledgements.
//!
//! `publish()` hands back a [`PendingAck`] as soon as the record is queued.
//! The delivery task resolves it later with an [`Acknowledgement`]. Awaiting a
//! `PendingAck` never fails: if the publisher is torn down first the ack
//! resolves to `Rejected(Abandoned)`.

use schemagate_schema::ValidationOutcome;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Why a record was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// Client-side validation failed; the record never left the client.
    Validation { outcome: ValidationOutcome },

    /// The broker enforces schemas and refused the record.
    ServerValidation { message: String },

    /// The broker could not be reached or failed; the caller may retry.
    Transport { message: String },

    /// The publisher was torn down before the record was acknowledged.
    Abandoned,
}

impl RejectReason {
    /// Client- or server-side schema rejection.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RejectReason::Validation { .. } | RejectReason::ServerValidation { .. }
        )
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, RejectReason::Transport { .. })
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Validation { outcome } => write!(f, "validation failed: {}", outcome),
            RejectReason::ServerValidation { message } => {
                write!(f, "rejected by broker: {}", message)
            }
            RejectReason::Transport { message } => write!(f, "transport failure: {}", message),
            RejectReason::Abandoned => f.write_str("abandoned before acknowledgement"),
        }
    }
}

/// Final outcome of one publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Acknowledgement {
    Accepted {
        topic: String,
        partition: u32,
        offset: u64,
    },
    Rejected {
        topic: String,
        reason: RejectReason,
    },
}

impl Acknowledgement {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Acknowledgement::Accepted { .. })
    }

    pub fn topic(&self) -> &str {
        match self {
            Acknowledgement::Accepted { topic, .. } | Acknowledgement::Rejected { topic, .. } => {
                topic
            }
        }
    }

    /// (partition, offset) of an accepted record.
    pub fn position(&self) -> Option<(u32, u64)> {
        match self {
            Acknowledgement::Accepted {
                partition, offset, ..
            } => Some((*partition, *offset)),
            Acknowledgement::Rejected { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            Acknowledgement::Accepted { .. } => None,
            Acknowledgement::Rejected { reason, .. } => Some(reason),
        }
    }
}

impl fmt::Display for Acknowledgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Acknowledgement::Accepted {
                topic,
                partition,
                offset,
            } => write!(f, "accepted {}/{}@{}", topic, partition, offset),
            Acknowledgement::Rejected { topic, reason } => {
                write!(f, "rejected {}: {}", topic, reason)
            }
        }
    }
}

/// Handle to an acknowledgement that may not have arrived yet.
///
/// Await it directly or call [`PendingAck::wait`].
#[derive(Debug)]
pub struct PendingAck {
    topic: String,
    receiver: oneshot::Receiver<Acknowledgement>,
}

impl PendingAck {
    pub(crate) fn new(topic: &str) -> (oneshot::Sender<Acknowledgement>, Self) {
        let (sender, receiver) = oneshot::channel();
        let pending = Self {
            topic: topic.to_string(),
            receiver,
        };
        (sender, pending)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the acknowledgement.
    pub async fn wait(self) -> Acknowledgement {
        self.await
    }

    /// The acknowledgement if it has already arrived.
    pub fn try_ack(&mut self) -> Option<Acknowledgement> {
        match self.receiver.try_recv() {
            Ok(ack) => Some(ack),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(self.abandoned()),
        }
    }

    fn abandoned(&self) -> Acknowledgement {
        Acknowledgement::Rejected {
            topic: self.topic.clone(),
            reason: RejectReason::Abandoned,
        }
    }
}

impl Future for PendingAck {
    type Output = Acknowledgement;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(ack)) => Poll::Ready(ack),
            Poll::Ready(Err(_)) => Poll::Ready(self.abandoned()),
            Poll::Pending => Poll::Pending,
        }
    }
}
