use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use log::{error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::{SchedulerConfig, TimerConfig};
use crate::producer::{Route, RpcProducer};
use crate::trace::Tracer;

/// Method pool exercised against the world-info destination.
const WORLD_INFO_METHODS: [&str; 4] = [
    "getWeatherInfo",
    "getTimeInfo",
    "getLocationInfo",
    "getCurrencyInfo",
];

/// Method pool exercised against the external-provider destination.
const EXT_PROVIDER_METHODS: [&str; 4] = [
    "fetchWeatherData",
    "fetchGeoLocation",
    "fetchImageOfDay",
    "fetchNewsData",
];

/// Base coordinate for synthesized geolocation requests (New York).
const BASE_LAT: f64 = 40.7128;
const BASE_LON: f64 = -74.0060;
const COORD_JITTER_STD_DEV: f64 = 0.1;

/// Synthesize parameters for a method.
///
/// Total over both method pools, with a catch-all default for anything else.
/// For a given method the key set is fixed; only the timestamp and the
/// coordinate jitter vary between calls.
pub fn synthesize_params(method: &str, rng: &mut impl Rng) -> Map<String, Value> {
    let now = Utc::now().to_rfc3339();
    let value = match method {
        "getWeatherInfo" | "fetchWeatherData" => json!({
            "location": "New York",
            "units": "metric",
            "timestamp": now,
        }),
        "getTimeInfo" => json!({
            "timezone": "UTC",
            "format": "ISO8601",
            "timestamp": now,
        }),
        "getLocationInfo" | "fetchGeoLocation" => {
            let jitter = Normal::new(0.0, COORD_JITTER_STD_DEV).expect("valid jitter std dev");
            json!({
                "lat": BASE_LAT + jitter.sample(rng),
                "lon": BASE_LON + jitter.sample(rng),
                "timestamp": now,
            })
        }
        "getCurrencyInfo" => json!({
            "from": "USD",
            "to": "EUR",
            "amount": 100.0,
            "timestamp": now,
        }),
        "fetchImageOfDay" => json!({
            "category": "nature",
            "resolution": "1920x1080",
            "timestamp": now,
        }),
        "fetchNewsData" => json!({
            "category": "technology",
            "limit": 10,
            "timestamp": now,
        }),
        _ => json!({
            "timestamp": now,
            "source": "scheduled-task",
        }),
    };
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Timer-driven synthetic load for both destinations.
///
/// Two independent fixed-interval loops run until process exit. A tick never
/// blocks on broker I/O and a tick's failure never stops the schedule.
pub struct ScheduledProducer {
    producer: Arc<RpcProducer>,
    tracer: Arc<dyn Tracer>,
    config: SchedulerConfig,
    rng: Mutex<StdRng>,
}

impl ScheduledProducer {
    pub fn new(producer: Arc<RpcProducer>, tracer: Arc<dyn Tracer>, config: SchedulerConfig) -> Self {
        Self::with_rng(producer, tracer, config, StdRng::from_os_rng())
    }

    /// Injected rng, seedable for deterministic tests.
    pub fn with_rng(
        producer: Arc<RpcProducer>,
        tracer: Arc<dyn Tracer>,
        config: SchedulerConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            producer,
            tracer,
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Spawn both interval loops as detached tasks.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let shared = Arc::new(self);
        let world_info = shared.config.world_info;
        let ext_provider = shared.config.ext_provider;
        vec![
            tokio::spawn(Self::run_loop(shared.clone(), Route::WorldInfo, world_info)),
            tokio::spawn(Self::run_loop(shared, Route::ExtProvider, ext_provider)),
        ]
    }

    async fn run_loop(this: Arc<Self>, route: Route, timer: TimerConfig) {
        let start = time::Instant::now() + timer.initial_delay;
        let mut interval = time::interval_at(start, timer.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            this.clone().tick(route, timer.interval);
        }
    }

    /// One scheduled tick: draw a method, synthesize its parameters, fire
    /// the publish. The tick span travels into the publish task and is ended
    /// there, once the outcome is known, so its status always reflects the
    /// real result.
    fn tick(self: Arc<Self>, route: Route, interval: Duration) -> JoinHandle<()> {
        let destination = route.destination();
        let mut span = self
            .tracer
            .start_span(&format!("scheduled.{}.send", destination.label));
        span.set_attribute("scheduler.type", "fixed_interval");
        span.set_attribute("scheduler.interval", format!("{}s", interval.as_secs()));

        let methods = match route {
            Route::WorldInfo => &WORLD_INFO_METHODS,
            Route::ExtProvider => &EXT_PROVIDER_METHODS,
        };
        let (method, params) = {
            let mut rng = self.rng.lock().expect("scheduler rng lock");
            let method = methods[rng.random_range(0..methods.len())];
            (method, synthesize_params(method, &mut *rng))
        };

        info!(
            "Scheduled task: sending {} request - method: {}",
            destination.label, method
        );
        span.add_event("sending_request");

        let label = destination.label;
        tokio::spawn(async move {
            match self.producer.publish(route, method, params).await {
                Ok(request_id) => {
                    span.set_ok();
                    info!("Scheduled {} request sent: {}", label, request_id);
                }
                Err(err) => {
                    span.record_error(&err);
                    error!("Scheduled {} request failed: {}", label, err);
                }
            }
            span.end();
        })
    }
}
