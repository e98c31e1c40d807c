use std::process::ExitCode;
use std::sync::Arc;

use tracing::info;

use vodgate::core::config::AppConfig;
use vodgate::gateway::router::{self, AppState};
use vodgate::storage::memory::InMemoryStore;
use vodgate::storage::ObjectStore;
use vodgate::vod::chapters::FfprobeDurationProbe;

#[tokio::main]
async fn main() -> ExitCode {
    if std::env::args().any(|arg| arg == "--version") {
        println!("vodgate {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.log_level, &config.log_format);

    info!(version = env!("CARGO_PKG_VERSION"), "vodgate starting");

    let store = match build_store(&config) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("failed to initialize store backend: {e}");
            return ExitCode::FAILURE;
        }
    };

    // An invalid filter pattern fails here, before the listener exists.
    let probe = Arc::new(FfprobeDurationProbe);
    let state = match AppState::new(config.clone(), store, Some(probe)) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let app = router::build_router(state);

    let listener = match tokio::net::TcpListener::bind(&config.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("failed to bind {}: {e}", config.listen);
            return ExitCode::FAILURE;
        }
    };

    info!(
        listen = %config.listen,
        bucket = %config.bucket_name,
        proxy_endpoint = %config.proxy.endpoint,
        map_endpoint = %config.map.endpoint,
        "listening"
    );

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("server error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match config.store.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        #[cfg(feature = "s3")]
        "s3" => Ok(Arc::new(vodgate::storage::s3::S3ObjectStore::new(
            &config.store,
        ))),
        other => anyhow::bail!("unsupported store backend: {other}"),
    }
}

fn init_tracing(log_level: &str, log_format: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("debug"));

    match log_format {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
