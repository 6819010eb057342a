use clap::Parser;
use hive_sync::{cli::Args, create_router_with_config, store::HiveStore, sync::SyncConfig, RouterConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hive_sync=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Using database at: {}", args.database.display());
    let store = Arc::new(HiveStore::new(&args.database).expect("Failed to open hive store"));

    let sync = SyncConfig {
        backfill_timeout: Duration::from_secs(args.backfill_timeout_secs),
        reconcile_interval: Duration::from_secs(args.reconcile_interval_secs),
        ..SyncConfig::default()
    };

    let app = create_router_with_config(RouterConfig { store, sync }).await;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .expect("Invalid address");

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");
    axum::serve(listener, app).await.expect("Server error");
}
