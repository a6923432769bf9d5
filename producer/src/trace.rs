use std::fmt::Display;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Opaque identifiers correlating one operation with a distributed trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    /// 128-bit trace identifier, 32 lowercase hex characters.
    pub trace_id: String,
    /// 64-bit span identifier, 16 lowercase hex characters.
    pub span_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanStatus {
    Unset,
    Ok,
    Error(String),
}

/// Hook invoked with the finished span when it is ended. This is where a
/// tracing backend exporter attaches; the core itself only records.
pub type SpanObserver = Arc<dyn Fn(&Span) + Send + Sync>;

/// One traced operation. Ending consumes the span, so it is closed exactly
/// once on every exit path.
pub struct Span {
    name: String,
    context: TraceContext,
    attributes: Vec<(&'static str, String)>,
    events: Vec<&'static str>,
    status: SpanStatus,
    started_at: Instant,
    observer: Option<SpanObserver>,
}

impl Span {
    fn new(name: &str, context: TraceContext, observer: Option<SpanObserver>) -> Self {
        Self {
            name: name.to_string(),
            context,
            attributes: Vec::new(),
            events: Vec::new(),
            status: SpanStatus::Unset,
            started_at: Instant::now(),
            observer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    pub fn status(&self) -> &SpanStatus {
        &self.status
    }

    pub fn attributes(&self) -> &[(&'static str, String)] {
        &self.attributes
    }

    pub fn set_attribute(&mut self, key: &'static str, value: impl Into<String>) {
        self.attributes.push((key, value.into()));
    }

    pub fn add_event(&mut self, name: &'static str) {
        self.events.push(name);
    }

    pub fn set_ok(&mut self) {
        self.status = SpanStatus::Ok;
    }

    pub fn record_error(&mut self, error: &dyn Display) {
        self.status = SpanStatus::Error(error.to_string());
    }

    /// Close the span and hand it to the observer, if any.
    pub fn end(self) {
        debug!(
            "span={} trace_id={} span_id={} status={:?} elapsed_ms={}",
            self.name,
            self.context.trace_id,
            self.context.span_id,
            self.status,
            self.started_at.elapsed().as_millis()
        );
        if let Some(observer) = self.observer.clone() {
            observer(&self);
        }
    }
}

/// Supplies a trace identifier and span identifier for each outbound
/// operation and records its outcome. The tracing backend receiving the span
/// data is an external collaborator behind [`SpanObserver`].
pub trait Tracer: Send + Sync {
    fn start_span(&self, name: &str) -> Span;
}

/// Tracer drawing identifiers from an injected seedable rng.
pub struct RandomTracer {
    rng: Mutex<StdRng>,
    observer: Option<SpanObserver>,
}

impl RandomTracer {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
            observer: None,
        }
    }

    /// Deterministic identifiers for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: SpanObserver) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl Tracer for RandomTracer {
    fn start_span(&self, name: &str) -> Span {
        let (trace_id, span_id) = {
            let mut rng = self.rng.lock().expect("tracer rng lock");
            (
                format!("{:032x}", rng.random::<u128>()),
                format!("{:016x}", rng.random::<u64>()),
            )
        };
        Span::new(name, TraceContext { trace_id, span_id }, self.observer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_have_otel_format() {
        let tracer = RandomTracer::seeded(1);
        let span = tracer.start_span("test.span");
        assert_eq!(span.context().trace_id.len(), 32);
        assert_eq!(span.context().span_id.len(), 16);
        assert!(span
            .context()
            .trace_id
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_seeded_tracer_is_deterministic() {
        let a = RandomTracer::seeded(42).start_span("a");
        let b = RandomTracer::seeded(42).start_span("b");
        assert_eq!(a.context(), b.context());
    }

    #[test]
    fn test_consecutive_spans_differ() {
        let tracer = RandomTracer::seeded(7);
        let first = tracer.start_span("first");
        let second = tracer.start_span("second");
        assert_ne!(first.context().trace_id, second.context().trace_id);
        assert_ne!(first.context().span_id, second.context().span_id);
    }

    #[test]
    fn test_observer_sees_final_status() {
        let ended: Arc<Mutex<Vec<(String, SpanStatus)>>> = Arc::default();
        let sink = ended.clone();
        let tracer = RandomTracer::seeded(3).with_observer(Arc::new(move |span: &Span| {
            sink.lock()
                .unwrap()
                .push((span.name().to_string(), span.status().clone()));
        }));

        let mut span = tracer.start_span("op");
        span.record_error(&"boom");
        span.end();

        let ended = ended.lock().unwrap();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].0, "op");
        assert_eq!(ended[0].1, SpanStatus::Error("boom".to_string()));
    }
}
