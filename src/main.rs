// Main entry point for resrgan-server.
// Sets up the Tokio runtime, loads the model catalog, initializes the weight
// store and inference dispatcher, and starts the HTTP server.

mod app;
mod backend;
mod dispatcher;
mod error;
mod extract_request_data;
mod handlers;
mod headers;
mod image_codec;
mod listeners;
mod models;
mod registry;
mod shutdown_signal;
mod upsampler;
mod weights;
mod worker_pool;

use app::AppState;
use backend::CpuBackend;
use clap::Parser;
use dispatcher::Dispatcher;
use registry::ModelRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;
use weights::WeightStore;
use worker_pool::InferencePool;

/// Command line arguments for resrgan-server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct AppConfig {
    /// Hostname/IP to bind the server to.
    /// If this option is specified without value, it will default to "*", meaning the server will listen on all interfaces.
    #[arg(long, env = "RESRGAN_SERVER_HOST", default_value = "localhost", num_args = 0..=1, default_missing_value = "*")]
    host: String,

    /// Port number to listen on.
    #[arg(short, long, env = "RESRGAN_SERVER_PORT", default_value_t = 6796)]
    port: u16,

    /// Path to the JSON model catalog.
    #[arg(
        long,
        env = "RESRGAN_SERVER_MODELS_CONFIG",
        default_value = "config/models.json"
    )]
    models_config: String,

    /// Directory used as the weight artifact cache.
    #[arg(long, env = "RESRGAN_SERVER_WEIGHTS_DIR", default_value = "weights")]
    weights_dir: String,

    /// Number of concurrent inference jobs.
    #[arg(long, env = "RESRGAN_SERVER_WORKERS", default_value_t = 2)]
    workers: usize,

    /// Number of jobs that may wait for a worker before new requests are
    /// rejected with 429.
    #[arg(long, env = "RESRGAN_SERVER_QUEUE_DEPTH", default_value_t = 8)]
    queue_depth: usize,
}

#[tokio::main]
async fn main() {
    // Parse command line args and environment variables
    let config = AppConfig::parse();

    // Initialize tracing subscriber for structured logging.
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("Starting resrgan-server...");

    // --- Load the model catalog ---
    // Model definitions are deployment-time facts; the registry is built once
    // and shared read-only with every request.
    let registry = ModelRegistry::load_file(&config.models_config).unwrap_or_else(|err| {
        tracing::error!(
            "FATAL: Failed to load model catalog: {}. Server cannot operate without models.",
            err
        );
        eprintln!("FATAL: Model catalog initialization failed. See logs for details. Exiting.");
        std::process::exit(1);
    });
    tracing::info!("Available models: {:?}", registry.model_names());
    if registry.is_empty() {
        tracing::warn!(
            "Model catalog is empty. The server will run but cannot upscale anything."
        );
    }

    // --- Initialize the weight store ---
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3600)) // 1 hour timeout for large weight files
        .build()
        .unwrap_or_else(|err| {
            tracing::error!("FATAL: Failed to create HTTP client: {}", err);
            std::process::exit(1);
        });
    let weights = WeightStore::new(&config.weights_dir, http_client).unwrap_or_else(|err| {
        tracing::error!(
            "FATAL: Cannot prepare weight cache directory '{}': {}",
            config.weights_dir,
            err
        );
        std::process::exit(1);
    });
    tracing::info!("Weight cache directory: {}", config.weights_dir);

    // --- Assemble dispatcher and worker pool ---
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(registry),
        Arc::new(weights),
        Arc::new(CpuBackend),
    ));
    let pool = Arc::new(InferencePool::new(config.workers, config.queue_depth));
    tracing::info!(
        "Inference pool: {} worker(s), queue depth {}",
        config.workers,
        config.queue_depth
    );

    let app = app::create_app(AppState { dispatcher, pool });
    tracing::info!("Axum router configured.");

    // --- Start HTTP Server ---
    let listener = match listeners::create_listener(&config.host, config.port).await {
        Ok((addr, l)) => {
            tracing::info!("Server successfully bound. Listening on {}", addr);
            l
        }
        Err(e) => {
            tracing::error!("FATAL: Failed to bind server: {}", e);
            eprintln!("FATAL: Could not bind server. Error: {}. Exiting.", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal::shutdown_signal())
        .await
    {
        tracing::error!("Server run error: {}", e);
        eprintln!("ERROR: Server shut down unexpectedly. Error: {}", e);
    }

    tracing::info!("resrgan-server has shut down.");
}
