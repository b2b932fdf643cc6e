use std::sync::Arc;

use crate::auth::TokenKeys;
use crate::config::Config;
use crate::state::AppState;
use crate::store::{MemoryStore, PgStore, SocialStore};

mod auth;
mod config;
mod error;
mod extractors;
mod graph;
mod models;
mod observability;
mod routes;
mod state;
mod store;
mod validation;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let config = Config::from_env()?;
    observability::init_tracing(&config);

    let store: Arc<dyn SocialStore> = match config.database_url.as_deref() {
        Some(url) => {
            let store = PgStore::connect(url, config.db_max_connections).await?;
            tracing::info!(component = "store", "connected to postgres, migrations applied");
            Arc::new(store)
        }
        None => {
            tracing::warn!(
                component = "store",
                "DATABASE_URL not set, using in-memory store. Data is lost on restart!"
            );
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(store, TokenKeys::from_config(&config));
    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(component = "bootstrap", addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
