use std::sync::Arc;

use log::{error, info};
use serde_json::{Map, Value};
use uuid::Uuid;

use worldinfo_commons::rpc::RpcRequest;
use worldinfo_commons::utils::TimeUtility;

use crate::broker::{Destination, MessageBroker, WireMessage, EXT_PROVIDER, WORLD_INFO};
use crate::error::ProduceError;
use crate::trace::{Span, Tracer};

/// Logical caller selecting which consumer a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    WorldInfo,
    ExtProvider,
}

impl Route {
    pub fn destination(self) -> &'static Destination {
        match self {
            Route::WorldInfo => &WORLD_INFO,
            Route::ExtProvider => &EXT_PROVIDER,
        }
    }
}

/// Builds JSON-RPC request envelopes and publishes them to the broker.
///
/// Each call emits exactly one span and one log line, and enqueues at most
/// one message. Publishing is fire-and-forget: nothing here waits for or
/// correlates responses, and failed publishes are not retried.
pub struct RpcProducer {
    broker: Arc<dyn MessageBroker>,
    tracer: Arc<dyn Tracer>,
}

impl RpcProducer {
    pub fn new(broker: Arc<dyn MessageBroker>, tracer: Arc<dyn Tracer>) -> Self {
        Self { broker, tracer }
    }

    pub async fn send_world_info_request(
        &self,
        method: &str,
        params: Map<String, Value>,
    ) -> Result<String, ProduceError> {
        self.publish(Route::WorldInfo, method, params).await
    }

    pub async fn send_ext_provider_request(
        &self,
        method: &str,
        params: Map<String, Value>,
    ) -> Result<String, ProduceError> {
        self.publish(Route::ExtProvider, method, params).await
    }

    /// Publish one request to the route's destination and return the
    /// generated request identifier. The span is closed exactly once on
    /// every exit path.
    pub async fn publish(
        &self,
        route: Route,
        method: &str,
        params: Map<String, Value>,
    ) -> Result<String, ProduceError> {
        let destination = route.destination();
        let mut span = self
            .tracer
            .start_span(&format!("{}.rpc.send", destination.label));
        span.set_attribute("rpc.service", destination.service);
        span.set_attribute("rpc.method", method);
        span.set_attribute("messaging.system", "rabbitmq");
        span.set_attribute("messaging.destination", destination.queue);
        span.set_attribute("messaging.destination_kind", "queue");

        let result = self.try_publish(&mut span, destination, method, params).await;
        match &result {
            Ok(_) => {
                span.add_event("message_sent");
                span.set_ok();
            }
            Err(err) => {
                span.record_error(err);
                error!("Failed to send {} request: {}", destination.label, err);
            }
        }
        span.end();
        result
    }

    async fn try_publish(
        &self,
        span: &mut Span,
        destination: &Destination,
        method: &str,
        params: Map<String, Value>,
    ) -> Result<String, ProduceError> {
        let request_id = Uuid::new_v4().to_string();
        let context = span.context().clone();
        let request = RpcRequest::new(request_id.as_str(), method, params)
            .with_trace(context.trace_id.as_str(), context.span_id.as_str());

        let body = serde_json::to_vec(&request)?;
        let message = WireMessage {
            body,
            content_type: "application/json",
            trace_id: context.trace_id,
            span_id: context.span_id,
            timestamp_ms: TimeUtility::get_timestamp_ms(),
        };

        span.add_event("sending_message");
        info!(
            "Sending JSON-RPC request: id={}, method={}, trace_id={}",
            request_id, method, message.trace_id
        );

        self.broker.publish(destination, message).await?;
        Ok(request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    use chrono::Utc;
    use serde_json::json;

    use crate::broker::testing::RecordingBroker;
    use crate::trace::{RandomTracer, SpanStatus};

    fn producer_over(broker: Arc<RecordingBroker>) -> RpcProducer {
        RpcProducer::new(broker, Arc::new(RandomTracer::seeded(11)))
    }

    #[tokio::test]
    async fn test_publish_returns_uuid_request_id() {
        let broker = Arc::new(RecordingBroker::new());
        let producer = producer_over(broker.clone());

        let request_id = producer
            .publish(Route::WorldInfo, "getWeatherInfo", Map::new())
            .await
            .unwrap();

        assert!(Uuid::parse_str(&request_id).is_ok());

        let published = broker.published();
        assert_eq!(published.len(), 1);
        let decoded: RpcRequest = serde_json::from_slice(&published[0].1.body).unwrap();
        assert_eq!(decoded.method, "getWeatherInfo");
        assert!(decoded.params.is_empty());
        assert_eq!(decoded.jsonrpc, "1.0");
        assert_eq!(decoded.id, request_id);
    }

    #[tokio::test]
    async fn test_request_ids_never_repeat() {
        let broker = Arc::new(RecordingBroker::new());
        let producer = producer_over(broker);

        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let request_id = producer
                .publish(Route::WorldInfo, "getTimeInfo", Map::new())
                .await
                .unwrap();
            assert!(seen.insert(request_id), "request id repeated");
        }
    }

    #[tokio::test]
    async fn test_routes_never_cross() {
        let broker = Arc::new(RecordingBroker::new());
        let producer = producer_over(broker.clone());

        producer
            .send_world_info_request("getWeatherInfo", Map::new())
            .await
            .unwrap();
        producer
            .send_ext_provider_request("fetchNewsData", Map::new())
            .await
            .unwrap();

        let published = broker.published();
        assert_eq!(published[0].0, WORLD_INFO);
        assert_eq!(published[0].0.exchange, "world_info_exchange");
        assert_eq!(published[0].0.routing_key, "world_info.rpc");
        assert_eq!(published[1].0, EXT_PROVIDER);
        assert_eq!(published[1].0.exchange, "world_info_ext_provider_exchange");
        assert_eq!(published[1].0.routing_key, "world_info.ext_provider.rpc");
    }

    #[tokio::test]
    async fn test_published_body_round_trips() {
        let broker = Arc::new(RecordingBroker::new());
        let producer = producer_over(broker.clone());

        let mut params = Map::new();
        params.insert("location".to_string(), json!("New York"));
        let request_id = producer
            .publish(Route::WorldInfo, "getWeatherInfo", params.clone())
            .await
            .unwrap();

        let (_, message) = &broker.published()[0];
        let decoded: RpcRequest = serde_json::from_slice(&message.body).unwrap();
        assert_eq!(decoded.id, request_id);
        assert_eq!(decoded.method, "getWeatherInfo");
        assert_eq!(decoded.params, params);
        let age = Utc::now() - decoded.timestamp;
        assert!(age.num_seconds() < 5, "timestamp too far from now: {:?}", age);

        // Wire headers mirror the envelope's trace context.
        assert_eq!(decoded.trace_id.as_deref(), Some(message.trace_id.as_str()));
        assert_eq!(decoded.span_id.as_deref(), Some(message.span_id.as_str()));
        assert_eq!(message.content_type, "application/json");
    }

    #[tokio::test]
    async fn test_broker_failure_surfaces_as_publish_error() {
        let ended: Arc<Mutex<Vec<SpanStatus>>> = Arc::default();
        let sink = ended.clone();
        let tracer = RandomTracer::seeded(5)
            .with_observer(Arc::new(move |span| {
                sink.lock().unwrap().push(span.status().clone());
            }));
        let producer = RpcProducer::new(
            Arc::new(RecordingBroker::failing("connection refused")),
            Arc::new(tracer),
        );

        let err = producer
            .publish(Route::ExtProvider, "fetchGeoLocation", Map::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ProduceError::Publish(_)));
        assert!(err.to_string().contains("connection refused"));

        // The span was marked with error status before being closed.
        let ended = ended.lock().unwrap();
        assert_eq!(ended.len(), 1);
        assert!(matches!(ended[0], SpanStatus::Error(_)));
    }
}
