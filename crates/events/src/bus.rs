//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus is the **transport layer** for events after they've been persisted
//! to the event store:
//!
//! ```text
//! Command → Event Store (append) → Event Bus (publish) → Consumers
//!                                                          ├─ projections
//!                                                          └─ workers
//! ```
//!
//! Delivery is **at-least-once** and events are stored before they are
//! published, so consumers must be idempotent and the store remains the
//! source of truth. Publication failure after a successful append is
//! surfaced to the caller, which can safely republish.

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

/// A subscription to an event stream.
///
/// Each subscription gets a copy of all events published to the bus
/// (broadcast semantics). Subscriptions are designed for single-threaded
/// consumption; messages arrive in publication order per publisher.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// Lightweight contract, no storage assumptions: works with in-memory
/// channels or an external broker. Implementations must be `Send + Sync`;
/// multiple threads can publish concurrently.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
