use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use quiz_engine::{
    config::{get_config, init_config},
    database::pool::{create_pool, run_migrations},
    routes,
    services::store_service::{CorpusStore, MemoryStore, PgStore},
    AppState,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    init_config()?;
    let config = get_config();

    let store: Arc<dyn CorpusStore> = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            run_migrations(&pool).await?;
            info!("Using Postgres corpus store");
            Arc::new(PgStore::new(pool))
        }
        None => {
            let store = match &config.catalogue_path {
                Some(path) => MemoryStore::from_catalogue_file(path).await?,
                None => {
                    tracing::warn!("Neither DATABASE_URL nor CATALOGUE_PATH set, starting with an empty catalogue");
                    MemoryStore::new()
                }
            };
            info!("Using in-memory corpus store");
            Arc::new(store)
        }
    };

    let app_state = AppState::from_config(store)?;

    let app = routes::router(app_state, config.api_rps)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024));

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
