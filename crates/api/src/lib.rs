//! HTTP services for the order placement saga.
//!
//! Three applications share this crate:
//! - the orchestrator, exposing the saga engine under `/orchestrate`
//! - the order service (catalog and orders)
//! - the sales service (vouchers and sales transactions)
//!
//! Every application also serves `/health` and a Prometheus `/metrics`
//! endpoint, with structured request tracing.

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod telemetry;

use axum::Router;
use axum::routing::{get, post, put};
use domain::{OrderService, OrderStore, SalesService, SalesStore};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{OrderParticipant, SagaCoordinator, SalesParticipant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds the orchestrator router.
pub fn orchestrator_app<O, P>(
    coordinator: SagaCoordinator<O, P>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    O: OrderParticipant,
    P: SalesParticipant,
{
    let router = Router::new()
        .route(
            "/orchestrate/order",
            post(routes::orchestrate::start::<O, P>),
        )
        .route("/orchestrate/{id}", get(routes::orchestrate::status::<O, P>))
        .route(
            "/orchestrate/{id}/compensate",
            post(routes::orchestrate::compensate::<O, P>),
        )
        .with_state(coordinator);

    with_observability(router, "orchestrator", metrics_handle)
}

/// Builds the order service router.
pub fn order_service_app<S: OrderStore + Clone>(
    service: OrderService<S>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let router = Router::new()
        .route("/products", get(routes::orders::list_products::<S>))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/status", put(routes::orders::update_status::<S>))
        .with_state(service);

    with_observability(router, "order-service", metrics_handle)
}

/// Builds the sales service router.
pub fn sales_service_app<S: SalesStore + Clone>(
    service: SalesService<S>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let router = Router::new()
        .route(
            "/vouchers",
            get(routes::sales::list_vouchers::<S>).post(routes::sales::create_voucher::<S>),
        )
        .route("/sales/process", post(routes::sales::process::<S>))
        .route("/sales/{id}/reverse", post(routes::sales::reverse::<S>))
        .route("/sales/{id}", get(routes::sales::get_by_order::<S>))
        .with_state(service);

    with_observability(router, "sales-service", metrics_handle)
}

fn with_observability(
    router: Router,
    service: &'static str,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    router
        .route("/health", get(move || routes::health::check(service)))
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
