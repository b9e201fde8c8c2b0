//! DataVault Queue - broker plumbing between ingest and placement.
//!
//! The scheduler publishes one [`ChunkMessage`] per chunk; every worker
//! runs a consumer that handles messages one at a time with manual
//! ack/nack. The broker is AMQP ([`AmqpQueue`]); tests swap in the
//! in-process [`MemoryQueue`], which keeps the same at-least-once
//! redelivery behavior.

pub mod amqp;
pub mod memory;
pub mod message;

pub use amqp::AmqpQueue;
pub use memory::MemoryQueue;
pub use message::ChunkMessage;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("message encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// What to do with a delivery once it has been handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Done with the message (successfully handled, or poison).
    Ack,
    /// Put the message back for redelivery.
    Requeue,
}

/// Publishing side of the chunk queue.
#[async_trait]
pub trait ChunkPublisher: Send + Sync {
    async fn publish(&self, msg: &ChunkMessage) -> Result<(), QueueError>;
}

/// Consuming side: one delivery payload in, a [`Disposition`] out.
///
/// Implementations must be idempotent; the broker may deliver the same
/// payload more than once.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> Disposition;
}
