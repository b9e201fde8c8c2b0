//! In-process queue with the broker's redelivery behavior.
//!
//! Tests use this in place of AMQP: same payloads, same at-least-once
//! semantics (a requeued delivery goes to the tail and comes around
//! again).

use crate::{ChunkMessage, ChunkPublisher, Disposition, MessageHandler, QueueError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// FIFO of raw payloads with requeue-on-nack.
#[derive(Default)]
pub struct MemoryQueue {
    messages: Mutex<VecDeque<Vec<u8>>>,
}

impl MemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an arbitrary payload, bypassing [`ChunkMessage`]
    /// encoding. Lets tests inject malformed messages.
    pub fn push_raw(&self, payload: Vec<u8>) {
        self.messages.lock().push_back(payload);
    }

    /// Pop the next payload, if any.
    pub fn pop(&self) -> Option<Vec<u8>> {
        self.messages.lock().pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Deliver messages to `handler` until the queue drains or
    /// `max_deliveries` is reached (a bound so a permanently requeueing
    /// handler cannot hang a test). Returns the number of deliveries
    /// made.
    pub async fn drain(&self, handler: &dyn MessageHandler, max_deliveries: usize) -> usize {
        let mut delivered = 0;
        while delivered < max_deliveries {
            let Some(payload) = self.pop() else { break };
            delivered += 1;
            match handler.handle(&payload).await {
                Disposition::Ack => {}
                Disposition::Requeue => self.push_raw(payload),
            }
        }
        delivered
    }
}

#[async_trait]
impl ChunkPublisher for MemoryQueue {
    async fn publish(&self, msg: &ChunkMessage) -> Result<(), QueueError> {
        self.push_raw(msg.to_json()?);
        Ok(())
    }
}
