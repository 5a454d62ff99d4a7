//! Process entrypoint: wires the broker, cache, job controller, response
//! handler, and frontend together and runs them as concurrent tasks
//! into one running service.
mod unconfigured;

use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
};

use broker::{
    Broker,
    FileBroker,
};
use cache::ResultCache;
use clap::Parser;
use controller::Controller;
use frontend::AppState;
use metric_registry::{
    AggregatorRegistry,
    MetricRegistry,
};
use response_handler::ResponseHandler;
use unconfigured::{
    UnconfiguredCohortResolver,
    UnconfiguredDataSource,
};

#[derive(Parser, Debug)]
#[command(name = "metrics-server")]
#[command(about = "Asynchronous metrics API service: request broker, job controller, response handler, and HTTP frontend")]
struct Cli {
    /// Directory holding the four broker target files and the result cache.
    #[arg(long, env = "METRICS_BASE_DIR", default_value = "./data")]
    base_dir: PathBuf,

    /// Address the HTTP frontend listens on.
    #[arg(long, env = "METRICS_BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind_addr: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    common::env::init_tracing();
    let cli = Cli::parse();

    std::fs::create_dir_all(&cli.base_dir)?;
    let broker: Arc<dyn Broker> = Arc::new(FileBroker::open(&cli.base_dir)?);
    let cache = Arc::new(ResultCache::new(broker.clone()));

    let controller = Arc::new(Controller::new(
        broker.clone(),
        Arc::new(UnconfiguredCohortResolver),
        Arc::new(UnconfiguredDataSource),
        Arc::new(MetricRegistry::builtin()),
        Arc::new(AggregatorRegistry::builtin()),
    ));
    let response_handler = Arc::new(ResponseHandler::new(broker.clone(), cache.clone()));

    tokio::spawn(controller.clone().start());
    tokio::spawn(response_handler.start());

    let app = frontend::router(AppState {
        broker,
        cache,
        controller,
    });

    let listener = tokio::net::TcpListener::bind(cli.bind_addr).await?;
    tracing::info!(bind_addr = %cli.bind_addr, base_dir = %cli.base_dir.display(), "metrics-server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
