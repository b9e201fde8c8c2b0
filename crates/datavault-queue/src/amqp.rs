//! AMQP binding for the chunk queue.

use crate::{ChunkMessage, ChunkPublisher, Disposition, MessageHandler, QueueError};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::{info, warn};

/// Durable AMQP queue carrying [`ChunkMessage`]s.
///
/// One instance wraps one channel; the scheduler uses it to publish and
/// each worker uses its own to consume with prefetch 1, so an unacked
/// message throttles the producer side.
pub struct AmqpQueue {
    // Held so the channel outlives this handle.
    _connection: Connection,
    channel: Channel,
    queue: String,
}

impl AmqpQueue {
    /// Connect to the broker and declare the durable queue. Failing to
    /// reach the broker here is fatal for the calling process.
    pub async fn connect(uri: &str, queue: &str) -> Result<Self, QueueError> {
        let connection = Connection::connect(uri, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        info!(queue, "declared broker queue");
        Ok(Self {
            _connection: connection,
            channel,
            queue: queue.to_string(),
        })
    }

    /// Consume deliveries one at a time, acking or requeueing per the
    /// handler's disposition. Runs until the broker closes the stream.
    pub async fn consume(
        &self,
        consumer_tag: &str,
        handler: &dyn MessageHandler,
    ) -> Result<(), QueueError> {
        self.channel.basic_qos(1, BasicQosOptions::default()).await?;
        let mut consumer = self
            .channel
            .basic_consume(
                &self.queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        info!(queue = %self.queue, consumer_tag, "consuming chunk messages");

        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(d) => d,
                Err(e) => {
                    warn!("broker delivery error: {e}");
                    return Err(e.into());
                }
            };
            match handler.handle(&delivery.data).await {
                Disposition::Ack => delivery.ack(BasicAckOptions::default()).await?,
                Disposition::Requeue => {
                    delivery
                        .nack(BasicNackOptions {
                            requeue: true,
                            ..BasicNackOptions::default()
                        })
                        .await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkPublisher for AmqpQueue {
    async fn publish(&self, msg: &ChunkMessage) -> Result<(), QueueError> {
        let payload = msg.to_json()?;
        self.channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &payload,
                // Persistent delivery mode; the queue itself is durable.
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?
            .await?;
        Ok(())
    }
}
