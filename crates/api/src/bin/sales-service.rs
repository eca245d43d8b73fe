//! Sales service entry point.

use api::config::Config;
use api::routes::metrics;
use api::server::{self, BootstrapError};
use api::telemetry;
use domain::{InMemorySalesStore, PostgresSalesStore};
use metrics_exporter_prometheus::PrometheusHandle;

async fn run(config: Config, metrics_handle: PrometheusHandle) -> Result<(), BootstrapError> {
    match config.database_url.clone() {
        Some(url) => {
            let store = PostgresSalesStore::new(server::connect_database(&url).await?);
            store.run_migrations().await?;
            let outbox = store.outbox();
            server::run_sales_service(config, store, outbox, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store with demo vouchers");
            let store = InMemorySalesStore::with_demo_vouchers();
            let outbox = store.outbox().clone();
            server::run_sales_service(config, store, outbox, metrics_handle).await
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env(3000);
    telemetry::init_tracing(&config);

    let metrics_handle = metrics::install_recorder().expect("failed to install Prometheus recorder");

    if let Err(error) = run(config, metrics_handle).await {
        tracing::error!(%error, "sales service stopped");
        std::process::exit(1);
    }
}
