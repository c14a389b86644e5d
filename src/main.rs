use rusty_library_circulation::{
    adapters::clock::SystemClock,
    adapters::postgres::{Database, PostgresCirculationStore, PostgresLibraryDirectory},
    api::{handlers::AppState, router::create_router},
    application::circulation::{CirculationSettings, ServiceDependencies},
    config::AppConfig,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().expect("Failed to load configuration");

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "rusty_library_circulation={},tower_http=debug",
                    config.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Initialize database connection pool
    let database = Database::connect(&config.database)
        .await
        .expect("Failed to connect to database");

    database
        .migrate()
        .await
        .expect("Failed to run database migrations");

    // ハンドルを保持している間だけ生存確認が動く
    let _keepalive = database.spawn_keepalive(config.database.liveness_interval());

    // Initialize adapters
    let pool = database.pool().clone();
    let service_deps = ServiceDependencies {
        store: Arc::new(PostgresCirculationStore::new(pool.clone())),
        directory: Arc::new(PostgresLibraryDirectory::new(pool)),
        clock: Arc::new(SystemClock),
        settings: CirculationSettings {
            transaction_timeout: config.circulation.transaction_timeout(),
        },
    };

    // Create application state
    let app_state = Arc::new(AppState { service_deps });

    // Create router
    let app = create_router(app_state);

    // Server configuration
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", addr);

    // Start server
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
