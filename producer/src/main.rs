use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use worldinfo_producer::api::{self, ApiState};
use worldinfo_producer::broker::AmqpBroker;
use worldinfo_producer::config::Config;
use worldinfo_producer::producer::RpcProducer;
use worldinfo_producer::scheduler::ScheduledProducer;
use worldinfo_producer::trace::{RandomTracer, Tracer};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;

    let broker = AmqpBroker::connect(&config.amqp_addr)
        .await
        .with_context(|| format!("failed to connect to broker at {}", config.amqp_addr))?;
    broker
        .declare_topology()
        .await
        .context("failed to declare broker topology")?;

    let tracer: Arc<dyn Tracer> = Arc::new(RandomTracer::new());
    let producer = Arc::new(RpcProducer::new(Arc::new(broker), tracer.clone()));

    if config.scheduler.enabled {
        ScheduledProducer::new(producer.clone(), tracer.clone(), config.scheduler).spawn();
        info!("Synthetic request generator enabled");
    }

    let app = api::router(ApiState { producer, tracer });
    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;
    info!("worldinfo-producer listening on {}", config.http_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
