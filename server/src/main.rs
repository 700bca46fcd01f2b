use std::process;
use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use planit_server::config::Config;
use planit_server::routes::create_routes;
use planit_server::state::AppState;
use planit_server::store::PgStore;

const DEFAULT_LOG_FILTER: &str = "planit_server=info,tower_http=info";

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            process::exit(1);
        }
    };

    let store = match PgStore::connect(&config.database_url, config.database_max_connections).await
    {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            process::exit(1);
        }
    };

    tracing::info!("Successfully connected to database");

    if let Err(e) = store.migrate().await {
        tracing::error!(error = %e, "Failed to run migrations");
        process::exit(1);
    }

    tracing::info!("Migrations run successfully");

    let state = AppState::new(Arc::new(store), &config);
    let app = create_routes(state, &config);

    let listener = match TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = %config.bind_addr, "Failed to bind address");
            process::exit(1);
        }
    };

    tracing::info!("Server running at http://{}", config.bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Server failed");
        process::exit(1);
    }
}
