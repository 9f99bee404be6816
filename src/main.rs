use std::process;
use std::sync::Arc;

use tracing::{error, info};

use prometheus_graph_gateway::{
    api::gateway,
    backend::PrometheusClient,
    config::Config,
    logging, metrics,
    schema::{self, QuerySurface},
};

#[tokio::main]
async fn main() {
    // Configuration must be usable before anything serves
    let config_path = Config::config_path();
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    };

    logging::init_logger(config.log_enabled);
    metrics::init_metrics();

    let client = match PrometheusClient::connect(&config.prometheus_address, config.log_enabled) {
        Ok(client) => client,
        Err(err) => {
            error!("{}", err);
            process::exit(1);
        }
    };
    let backend = Arc::new(client);

    // Startup barrier: the surface is published only after synthesis
    // succeeds in full.
    let fields = match schema::synthesize(&*backend).await {
        Ok(fields) => fields,
        Err(err) => {
            error!("dynamic field synthesis failed: {}", err);
            process::exit(1);
        }
    };

    let surface = Arc::new(QuerySurface::new(backend, fields));
    info!("query surface ready with {} fields", surface.field_names().len());

    if let Err(err) = gateway::start_gateway(&config, surface).await {
        error!("{}", err);
        process::exit(1);
    }
}
