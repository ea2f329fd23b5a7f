use dotenv::dotenv;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use examwatch_server::{
    config::AppConfig,
    reducer::VerdictReducer,
    routes,
    store::{MemoryStore, MongoStore, SessionStore},
    AppState,
};

#[tokio::main]
async fn main() {
    dotenv().ok();

    // initialize logging tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("[server] invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let store: Arc<dyn SessionStore> = match &config.mongo_uri {
        Some(uri) => match MongoStore::connect(uri, &config.db_name).await {
            Ok(s) => Arc::new(s),
            Err(e) => {
                tracing::error!("[server] failed to connect to database: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("[server] MONGO_URI not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    tracing::info!(
        "[server] verdict thresholds: suspicious <= {}, warning <= {}",
        config.thresholds.suspicious(),
        config.thresholds.warning()
    );
    let state = Arc::new(AppState::new(
        store,
        config.severity.clone(),
        VerdictReducer::new(config.thresholds),
    ));
    let app = routes::router(state);

    let listener = match tokio::net::TcpListener::bind(config.bind).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("[server] failed to bind {}: {}", config.bind, e);
            std::process::exit(1);
        }
    };
    tracing::info!("[server] started on http://{}", config.bind);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("[server] server error: {}", e);
        std::process::exit(1);
    }
}
