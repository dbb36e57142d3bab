mod backend;
mod config;
mod db;
mod models;
mod routes;
mod services;
mod state;

use std::sync::Arc;
use std::time::Duration;

use services::snapshot::{MemorySnapshotStore, PgSnapshotStore, SnapshotStore};

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("failed to load .env: {e}");
        }
    }
    tracing_subscriber::fmt::init();

    let config = config::AppConfig::from_env().expect("invalid configuration");
    let port = config.port;

    let backend = backend::SupabaseBackend::new(&config.supabase).expect("backend client init failed");
    tracing::info!(url = %config.supabase.url, bucket = %config.supabase.avatar_bucket, "backend gateway configured");

    let store: Arc<dyn SnapshotStore> = match &config.database_url {
        Some(url) => {
            let pool = db::init_pool(url)
                .await
                .expect("database init failed");
            Arc::new(PgSnapshotStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; session records are kept in memory only");
            Arc::new(MemorySnapshotStore::new())
        }
    };

    let catalog = services::catalog::Catalog::load().expect("catalog seed invalid");
    let sweep_every = Duration::from_secs(config.session_sweep_secs);
    let record_max_age = config.record_max_age();
    let state = state::AppState::new(config, Arc::new(backend), store, catalog);
    let _sweeper = services::registry::spawn_sweeper(Arc::clone(&state.sessions), sweep_every, record_max_age);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "streamfront listening");
    axum::serve(listener, app).await.expect("server failed");
}
