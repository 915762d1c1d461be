use anyhow::Context;
use position_ledger::api::{self, AppState};
use position_ledger::{init_db, Config, ImporterRegistry, PositionManager, Repository};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("Configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    let repo = Arc::new(Repository::new(pool));

    let importers = ImporterRegistry::with_defaults(&config, repo.clone());
    tracing::info!(?importers, "CSV importers registered");
    let manager = Arc::new(PositionManager::new(
        repo,
        importers,
        config.max_import_bytes,
    ));

    let app = api::create_router(AppState::new(manager, config));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
