use anyhow::Context;
use tracing_subscriber::EnvFilter;

use tourist_spots::api::{create_router, AppState};
use tourist_spots::config::Config;
use tourist_spots::db;
use tourist_spots::services::Recommender;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tourist_spots=debug,tower_http=debug")),
        )
        .init();

    let config = Config::from_env()?;

    // Database
    let pool = db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to database")?;
    db::init_schema(&pool)
        .await
        .context("Failed to create database schema")?;

    // Model, encoders and dataset are immutable for the process lifetime
    let recommender = Recommender::load(&config.model_dir, config.ranking()?)?;

    let address = config.bind_address();
    let state = AppState::new(pool, recommender, config);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!(address = %address, "Server running");
    axum::serve(listener, app).await?;

    Ok(())
}
