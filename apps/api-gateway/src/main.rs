use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vysion_core::{
    EventPublisher, Persistence,
    adapters::{InMemoryEventBus, MIGRATOR, PostgresStore, RedisEventBus},
};
use vysion_gateway::{AppState, application::ApplicationError, config::GatewayConfig, create_app};

async fn connect_store(url: &str) -> Result<Persistence, ApplicationError> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .map_err(|e| ApplicationError::Startup(format!("Postgres connection failed: {}", e)))?;

    info!("Applying database migrations...");
    MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| ApplicationError::Startup(format!("Database migration failed: {}", e)))?;
    info!("Migrations applied successfully.");

    Ok(Persistence::from_store(PostgresStore::new(pool)))
}

async fn event_bus() -> Arc<dyn EventPublisher> {
    match std::env::var("REDIS_URL") {
        Ok(url) => match RedisEventBus::new(&url, None).await {
            Ok(bus) => return Arc::new(bus),
            Err(e) => warn!("Redis unavailable, Z-report announcements stay in-process: {}", e),
        },
        Err(_) => info!("REDIS_URL not set, using the in-memory event bus"),
    }
    Arc::new(InMemoryEventBus::default())
}

async fn run() -> Result<(), ApplicationError> {
    let config = GatewayConfig::from_env()?;
    info!(
        environment = ?config.environment,
        timezone = %config.reference_tz,
        "Starting Vysion gateway v{}...",
        env!("CARGO_PKG_VERSION")
    );
    if config.environment.is_production() && config.cron_secret.is_none() {
        warn!("CRON_SECRET not set: every cron call will be refused");
    }

    let persistence = match std::env::var("DATABASE_URL") {
        // A configured but broken database is fatal; the schema may be half-applied.
        Ok(url) => Some(connect_store(&url).await?),
        Err(_) => {
            warn!("DATABASE_URL not set (store-backed routes answer 503)");
            None
        }
    };

    let bind_addr = config.bind_addr;
    let app_state = AppState {
        config: Arc::new(config),
        persistence,
        event_bus: event_bus().await,
    };
    let app = create_app(app_state);

    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| ApplicationError::Startup(format!("Failed to bind to {}: {}", bind_addr, e)))?;
    info!("Vysion gateway listening on {}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|e| ApplicationError::Startup(format!("Server failed to run: {}", e)))
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}
