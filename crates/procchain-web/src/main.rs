use std::sync::Arc;

use procchain_web::app::{AppState, build_router};
use procchain_web::config::{Config, Overrides, parse_cli};
use procchain_web::db::{Db, init_sqlite};
use procchain_web::fetch::HttpProcessSource;
use tokio::net::TcpListener;
use tracing::info;

fn main() {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(async {
            if let Err(err) = run().await {
                eprintln!("{err}");
                std::process::exit(1);
            }
        });
}

async fn run() -> Result<(), String> {
    let cli = parse_cli()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env(Overrides::from(cli))?;
    let db = Db::new(config.db_path.clone());
    init_sqlite(&db).map_err(|e| format!("failed to init sqlite at {:?}: {e}", db.path()))?;

    let state = AppState {
        db: Arc::new(db),
        source: Arc::new(HttpProcessSource::new(config.fetch_timeout)),
        owner_header: config.owner_header.clone(),
    };

    let listener = TcpListener::bind(&config.http_addr)
        .await
        .map_err(|e| format!("failed to bind HTTP on {}: {e}", config.http_addr))?;
    info!(
        http_addr = %config.http_addr,
        db_path = %config.db_path.display(),
        fetch_timeout_secs = config.fetch_timeout.as_secs(),
        owner_header = %config.owner_header,
        "procchain-web HTTP API ready"
    );

    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| format!("HTTP server error: {e}"))
}
