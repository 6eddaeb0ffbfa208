mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use banter_ai::GeminiClient;
use banter_api::AppStateInner;

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "banter=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env().context("reading configuration from environment")?;

    // Init database
    let db = banter_db::Database::open(&PathBuf::from(&config.db_path))?;

    // Upstream completion client
    let mut ai = GeminiClient::new(config.ai_api_key.clone(), config.ai_model.clone())
        .context("building completion client")?;
    if let Some(base_url) = &config.ai_base_url {
        ai = ai.with_base_url(base_url.clone());
    }

    let state = AppStateInner::new(db, Arc::new(ai));

    let app = banter_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Banter server listening on {}", addr);
    info!("Completion model: {}", config.ai_model);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
