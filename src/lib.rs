pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{EngineError, EngineResult};

pub use logic::{
    ActivityLogReader, BulkMutationEngine, DropdownResolver, ExportFormat, ExportRenderer, FilterComposer,
    Predicate, QueryHandle, QueryPlan, ValidationError, ValidationErrorType, ValidationResult,
};

// Export all model types
pub use model::*;

// Export seed module
pub use seed::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, Store};

use std::path::Path;
use std::sync::Arc;

use crate::api::handlers::AppContext;
use crate::config::{AppConfig, Backend};

/// Resource definitions from the configured file, or the demo register when
/// the file is absent.
pub fn load_registry(config: &AppConfig) -> anyhow::Result<ResourceRegistry> {
    let path = Path::new(&config.resources.path);
    if path.exists() {
        let registry = ResourceRegistry::load_from_file(path)?;
        log::info!("Loaded {} resources from {}", registry.names().len(), path.display());
        Ok(registry)
    } else {
        log::warn!(
            "Resource file {} not found, serving the demo asset register",
            path.display()
        );
        Ok(seed::demo_registry())
    }
}

/// Router over a seeded memory store with the demo register
pub async fn demo_app(config: AppConfig) -> anyhow::Result<axum::Router> {
    let store = MemoryStore::new();
    seed::load_demo_data(&store).await?;
    let context = AppContext::new(store, seed::demo_registry(), config);
    Ok(api::routes::create_router().with_state(Arc::new(context)))
}

/// Builds the router for the configured backend.
pub async fn build_app(config: AppConfig) -> anyhow::Result<axum::Router> {
    let registry = load_registry(&config)?;

    match config.backend {
        Backend::Memory => {
            log::info!("Using in-memory backend with demo data");
            let store = MemoryStore::new();
            seed::load_demo_data(&store).await?;
            let context = AppContext::new(store, registry, config);
            Ok(api::routes::create_router().with_state(Arc::new(context)))
        }
        Backend::Postgres => {
            log::info!("Connecting to PostgreSQL...");
            let database_url = config.database_url()?;
            let store = PostgresStore::new(&database_url, config.max_connections()).await?;
            let context = AppContext::new(store, registry, config);
            Ok(api::routes::create_router().with_state(Arc::new(context)))
        }
    }
}

/// Loads `.env` and configuration, initialises logging and serves until
/// the listener fails.
pub async fn run_server() -> anyhow::Result<()> {
    use axum::serve;
    use env_logger::Builder;
    use log::LevelFilter;
    use tokio::net::TcpListener;

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // RUST_LOG overrides the defaults
    let _ = Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .parse_default_env()
        .try_init();

    log::info!("Admin engine starting");

    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: server={}:{} backend={:?}",
        config.server.host,
        config.server.port,
        config.backend
    );

    let bind_address = config.server_address();
    let app = build_app(config).await?;

    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Admin engine running on http://{}", bind_address);
    serve(listener, app).await?;

    Ok(())
}
