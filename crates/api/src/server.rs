//! Process wiring shared by the service binaries.
//!
//! Each participant service runs its HTTP API next to an outbox relay and a
//! saga consumer. All three stop on SIGINT/SIGTERM: the server drains first,
//! then the background tasks are told to stop and awaited.

use std::sync::Arc;

use axum::Router;
use common::topics::{SAGA_EVENTS, SAGA_RESPONSES};
use domain::{OrderSagaHandler, OrderService, OrderStore, SalesSagaHandler, SalesService, SalesStore};
use metrics_exporter_prometheus::PrometheusHandle;
use outbox::{
    InMemoryMessageBus, MessageBus, NatsMessageBus, OutboxError, OutboxRelay, OutboxStore,
    RelayConfig, SagaConsumer, SagaEventHandler,
};
use saga::{
    CoordinatorConfig, HttpOrderParticipant, HttpSalesParticipant, SagaCoordinator, WorkflowStore,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::sync::watch;

use crate::config::Config;
use crate::shutdown::shutdown_signal;

/// Errors that stop a service before or while serving.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("messaging error: {0}")]
    Messaging(#[from] OutboxError),

    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Connects to NATS when `NATS_URL` is set, otherwise uses an in-process bus.
///
/// The in-process bus only reaches subscribers in the same process, so
/// separately deployed services will not see each other's events.
pub async fn message_bus(config: &Config) -> Result<Arc<dyn MessageBus>, BootstrapError> {
    match &config.nats_url {
        Some(url) => Ok(Arc::new(NatsMessageBus::connect(url).await?)),
        None => {
            tracing::warn!("NATS_URL not set, using in-process message bus");
            Ok(Arc::new(InMemoryMessageBus::new()))
        }
    }
}

/// Opens a PostgreSQL connection pool.
pub async fn connect_database(url: &str) -> Result<PgPool, BootstrapError> {
    let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
    tracing::info!("connected to PostgreSQL");
    Ok(pool)
}

fn relay_config(config: &Config, topic: &str) -> RelayConfig {
    RelayConfig {
        topic: topic.to_string(),
        poll_interval: config.outbox_poll_interval,
        backoff: config.outbox_backoff,
    }
}

/// Serves `app` on the configured address until a shutdown signal arrives.
pub async fn serve(config: &Config, app: Router) -> Result<(), BootstrapError> {
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| BootstrapError::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(BootstrapError::Serve)?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

/// Runs a participant: HTTP API, outbox relay to `publish_topic`, and a
/// consumer of `consume_topic`.
async fn run_participant<X, H>(
    config: Config,
    app: Router,
    outbox: X,
    publish_topic: &str,
    consume_topic: &str,
    handler: H,
) -> Result<(), BootstrapError>
where
    X: OutboxStore + 'static,
    H: SagaEventHandler,
{
    let bus = message_bus(&config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let relay = OutboxRelay::new(outbox, bus.clone(), relay_config(&config, publish_topic));
    let relay_task = tokio::spawn(relay.run(shutdown_rx.clone()));
    let consumer_task = SagaConsumer::new(bus, consume_topic, handler)
        .start(shutdown_rx)
        .await?;

    let served = serve(&config, app).await;

    let _ = shutdown_tx.send(true);
    for (name, task) in [("relay", relay_task), ("consumer", consumer_task)] {
        if let Err(error) = task.await {
            tracing::error!(task = name, %error, "background task ended abnormally");
        }
    }
    served
}

/// Runs the order service: it publishes to `saga_events` and consumes
/// sales outcomes from `saga_responses`.
pub async fn run_order_service<S, X>(
    config: Config,
    store: S,
    outbox: X,
    metrics: PrometheusHandle,
) -> Result<(), BootstrapError>
where
    S: OrderStore + Clone,
    X: OutboxStore + 'static,
{
    let service = OrderService::new(store);
    let app = crate::order_service_app(service.clone(), metrics);
    let handler = OrderSagaHandler::new(service);
    run_participant(config, app, outbox, SAGA_EVENTS, SAGA_RESPONSES, handler).await
}

/// Runs the sales service: it consumes `saga_events` and publishes its
/// outcomes to `saga_responses`.
pub async fn run_sales_service<S, X>(
    config: Config,
    store: S,
    outbox: X,
    metrics: PrometheusHandle,
) -> Result<(), BootstrapError>
where
    S: SalesStore + Clone,
    X: OutboxStore + 'static,
{
    let service = SalesService::new(store);
    let app = crate::sales_service_app(service.clone(), metrics);
    let handler = SalesSagaHandler::new(service);
    run_participant(config, app, outbox, SAGA_RESPONSES, SAGA_EVENTS, handler).await
}

/// Runs the orchestrator against the participant services over HTTP, with
/// the workflow sweeper in the background.
pub async fn run_orchestrator(
    config: Config,
    metrics: PrometheusHandle,
) -> Result<(), BootstrapError> {
    let client = reqwest::Client::builder()
        .timeout(config.step_timeout)
        .build()?;

    let store = WorkflowStore::new();
    let coordinator = SagaCoordinator::new(
        store.clone(),
        HttpOrderParticipant::new(client.clone(), config.order_service_url.clone()),
        HttpSalesParticipant::new(client, config.sales_service_url.clone()),
        CoordinatorConfig {
            step_timeout: config.step_timeout,
        },
    );
    tracing::info!(
        order_service = %config.order_service_url,
        sales_service = %config.sales_service_url,
        "orchestrator configured"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(store.run_sweeper(
        config.workflow_retention,
        config.workflow_sweep_interval,
        shutdown_rx,
    ));

    let served = serve(&config, crate::orchestrator_app(coordinator, metrics)).await;

    let _ = shutdown_tx.send(true);
    if let Err(error) = sweeper.await {
        tracing::error!(%error, "workflow sweeper ended abnormally");
    }
    served
}
