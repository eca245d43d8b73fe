//! Orchestrator entry point.

use api::config::Config;
use api::routes::metrics;
use api::{server, telemetry};

#[tokio::main]
async fn main() {
    let config = Config::from_env(8081);
    telemetry::init_tracing(&config);

    let metrics_handle = metrics::install_recorder().expect("failed to install Prometheus recorder");

    if let Err(error) = server::run_orchestrator(config, metrics_handle).await {
        tracing::error!(%error, "orchestrator stopped");
        std::process::exit(1);
    }
}
