use axum::{routing::get, Json};
use hearth_extension::{ExtensionHost, LoaderConfig};
use sea_orm_migration::MigratorTrait;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod api;
mod core_extension;

#[derive(Serialize)]
struct ApiStatus {
    status: &'static str,
    version: &'static str,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Database connection
    let db_config = hearth_db::DatabaseConfig::from_env();
    tracing::info!("connecting to database...");
    let db = hearth_db::connect(&db_config)
        .await
        .expect("failed to connect to database");

    // Host schema
    tracing::info!("running database migrations...");
    hearth_migration::Migrator::up(&db, None)
        .await
        .expect("failed to run migrations");
    tracing::info!("migrations complete");

    let config = LoaderConfig::from_env();
    let host_namespace = config.host_namespace.clone();
    let host = ExtensionHost::with_database(db.clone(), config);

    let state = Arc::new(api::AppState {
        extensions: host.service.clone(),
    });

    // The core feature set comes first; further extensions follow it.
    let descriptors = vec![core_extension::descriptor(
        &host_namespace,
        &db,
        state.clone(),
    )];

    let handles = host
        .loader
        .load_all(&descriptors)
        .await
        .expect("failed to load extensions");

    // This process now runs every change made before it started.
    if let Err(e) = state.extensions.clear_restart_required().await {
        tracing::warn!("failed to clear restart flag: {e}");
    }

    let app = core_extension::mount(&handles)
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = std::env::var("HEARTH_BIND")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080)));
    tracing::info!(%addr, extensions = handles.len(), "server started");

    axum::serve(
        tokio::net::TcpListener::bind(addr)
            .await
            .expect("failed to bind listener"),
        app,
    )
    .await
    .expect("server error");
}

async fn healthz() -> Json<ApiStatus> {
    Json(ApiStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
