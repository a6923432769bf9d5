use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use log::{debug, info};
use thiserror::Error;

/// A named broker routing target corresponding to one logical consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    /// Short name used in span names and log lines.
    pub label: &'static str,
    /// Fully qualified RPC service name.
    pub service: &'static str,
    pub exchange: &'static str,
    pub routing_key: &'static str,
    pub queue: &'static str,
}

/// Destination consumed by the world-info worker.
pub const WORLD_INFO: Destination = Destination {
    label: "world_info",
    service: "world_info",
    exchange: "world_info_exchange",
    routing_key: "world_info.rpc",
    queue: "world_info",
};

/// Destination consumed by the external-provider worker.
pub const EXT_PROVIDER: Destination = Destination {
    label: "ext_provider",
    service: "world_info.ext_provider",
    exchange: "world_info_ext_provider_exchange",
    routing_key: "world_info.ext_provider.rpc",
    queue: "world_info.ext_provider",
};

/// Transport message handed to the broker: the serialized envelope plus
/// trace headers mirroring the envelope's trace context and a send timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub trace_id: String,
    pub span_id: String,
    pub timestamp_ms: u64,
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),
    #[error("broker unreachable: {0}")]
    Connection(String),
}

/// Publish seam in front of the broker client. One implementation speaks
/// AMQP; tests substitute a recording fake.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(
        &self,
        destination: &Destination,
        message: WireMessage,
    ) -> Result<(), BrokerError>;
}

/// AMQP broker client. A single channel is shared across all publish calls;
/// lapin channels are internally synchronized for concurrent use.
pub struct AmqpBroker {
    channel: Channel,
}

impl AmqpBroker {
    pub async fn connect(addr: &str) -> Result<Self, BrokerError> {
        let connection = Connection::connect(addr, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        info!("Connected to broker at {}", addr);
        Ok(Self { channel })
    }

    /// Declare both destinations: topic exchange, durable queue, binding.
    /// Idempotent on the broker side.
    pub async fn declare_topology(&self) -> Result<(), BrokerError> {
        for destination in [&WORLD_INFO, &EXT_PROVIDER] {
            self.channel
                .exchange_declare(
                    destination.exchange,
                    ExchangeKind::Topic,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            self.channel
                .queue_declare(
                    destination.queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            self.channel
                .queue_bind(
                    destination.queue,
                    destination.exchange,
                    destination.routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
            debug!(
                "Declared queue {} bound to {} via {}",
                destination.queue, destination.exchange, destination.routing_key
            );
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for AmqpBroker {
    async fn publish(
        &self,
        destination: &Destination,
        message: WireMessage,
    ) -> Result<(), BrokerError> {
        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from("trace_id"),
            AMQPValue::LongString(message.trace_id.clone().into()),
        );
        headers.insert(
            ShortString::from("span_id"),
            AMQPValue::LongString(message.span_id.clone().into()),
        );

        let properties = BasicProperties::default()
            .with_content_type(ShortString::from(message.content_type))
            .with_headers(headers)
            // AMQP message timestamps are whole seconds.
            .with_timestamp(message.timestamp_ms / 1000);

        self.channel
            .basic_publish(
                destination.exchange,
                destination.routing_key,
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await?
            .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Captures published messages instead of talking to a broker.
    pub struct RecordingBroker {
        messages: Mutex<Vec<(Destination, WireMessage)>>,
        fail_with: Option<String>,
    }

    impl RecordingBroker {
        pub fn new() -> Self {
            Self {
                messages: Mutex::new(Vec::new()),
                fail_with: None,
            }
        }

        pub fn failing(reason: &str) -> Self {
            Self {
                messages: Mutex::new(Vec::new()),
                fail_with: Some(reason.to_string()),
            }
        }

        pub fn published(&self) -> Vec<(Destination, WireMessage)> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageBroker for RecordingBroker {
        async fn publish(
            &self,
            destination: &Destination,
            message: WireMessage,
        ) -> Result<(), BrokerError> {
            if let Some(reason) = &self.fail_with {
                return Err(BrokerError::Connection(reason.clone()));
            }
            self.messages.lock().unwrap().push((*destination, message));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destinations_never_share_routing() {
        assert_ne!(WORLD_INFO.exchange, EXT_PROVIDER.exchange);
        assert_ne!(WORLD_INFO.routing_key, EXT_PROVIDER.routing_key);
        assert_ne!(WORLD_INFO.queue, EXT_PROVIDER.queue);
    }

    #[test]
    fn test_destination_names_match_consumer_contract() {
        assert_eq!(WORLD_INFO.exchange, "world_info_exchange");
        assert_eq!(WORLD_INFO.routing_key, "world_info.rpc");
        assert_eq!(WORLD_INFO.queue, "world_info");
        assert_eq!(EXT_PROVIDER.exchange, "world_info_ext_provider_exchange");
        assert_eq!(EXT_PROVIDER.routing_key, "world_info.ext_provider.rpc");
        assert_eq!(EXT_PROVIDER.queue, "world_info.ext_provider");
    }
}
