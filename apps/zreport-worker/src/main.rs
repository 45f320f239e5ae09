use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vysion_core::{
    Persistence,
    adapters::{MIGRATOR, PostgresStore, RedisEventBus},
    archive::{ArchivalRunResult, ArchiveWindow, Archiver},
};

mod config;
mod schedule;

use config::WorkerConfig;
use schedule::{next_run_after, retry_delay};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn log_result(result: &ArchivalRunResult) {
    let summary = serde_json::to_string(result).unwrap_or_else(|e| e.to_string());
    if result.failed > 0 {
        warn!(failed = result.failed, "Archival run finished with failures: {}", summary);
    } else {
        info!("Archival run finished: {}", summary);
    }
}

/// Archive the day before `as_of`, retrying the same window while the run aborts.
/// Returns `false` when shutdown was requested during a retry wait.
async fn archive_day(archiver: &Archiver, as_of: DateTime<Utc>, tz: Tz) -> bool {
    let window = match ArchiveWindow::previous_civil_day(as_of, tz) {
        Ok(window) => window,
        Err(e) => {
            error!("Cannot compute the archival window for {}: {}", as_of, e);
            return true;
        }
    };

    let mut attempt = 0;
    loop {
        let err = match archiver.run_window(window).await {
            Ok(result) => {
                log_result(&result);
                return true;
            }
            Err(e) => e,
        };
        attempt += 1;
        let Some(delay) = retry_delay(attempt) else {
            error!(
                target_date = %window.date,
                "Giving up on Z-report archival after {} attempts, backfill with as_of={}: {}",
                attempt,
                window.end.to_rfc3339(),
                err
            );
            return true;
        };
        warn!(
            target_date = %window.date,
            attempt,
            retry_in_secs = delay.as_secs(),
            "Archival run aborted, retrying: {}",
            err
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tokio::signal::ctrl_c() => {
                error!(target_date = %window.date, "Shutdown before the window was archived");
                return false;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = WorkerConfig::from_env()?;
    info!(
        timezone = %config.reference_tz,
        archive_at = %config.archive_at,
        "Starting Z-report worker v{}...",
        env!("CARGO_PKG_VERSION")
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .connect(&config.database_url)
        .await?;
    info!("Database connection pool established.");

    info!("Applying database migrations...");
    MIGRATOR.run(&pool).await?;
    info!("Migrations applied successfully.");

    let mut archiver = Archiver::new(
        Persistence::from_store(PostgresStore::new(pool)),
        config.reference_tz,
    );
    match &config.redis_url {
        Some(url) => match RedisEventBus::new(url, None).await {
            Ok(bus) => {
                info!("Connected to Redis for Z-report announcements.");
                archiver = archiver.with_publisher(Arc::new(bus));
            }
            Err(e) => warn!("Redis unavailable, runs will not be announced: {}", e),
        },
        None => info!("REDIS_URL not set, runs will not be announced"),
    }

    if config.run_on_start {
        info!("ARCHIVER_RUN_ON_START set, archiving now");
        if !archive_day(&archiver, Utc::now(), config.reference_tz).await {
            return Ok(());
        }
    }

    loop {
        let now = Utc::now();
        let next = next_run_after(now, config.reference_tz, config.archive_at);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next_run = %next, "Waiting for the next archival run");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                if !archive_day(&archiver, next, config.reference_tz).await {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping Z-report worker.");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;
    use vysion_core::{
        CoreError, OrderRepository, TenantRepository, ZReportRepository,
        adapters::InMemoryStore,
        domain::{
            order::{Order, OrderLine, OrderStatus, PaymentMethod},
            tenant::Tenant,
        },
    };

    /// Fails the first `outages` order reads, then delegates.
    struct FlakyOrders {
        inner: InMemoryStore,
        outages: AtomicUsize,
    }

    #[async_trait]
    impl OrderRepository for FlakyOrders {
        async fn insert(&self, order: &Order) -> Result<(), CoreError> {
            self.inner.insert(order).await
        }
        async fn find(&self, tenant_slug: &str, order_id: Uuid) -> Result<Option<Order>, CoreError> {
            self.inner.find(tenant_slug, order_id).await
        }
        async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<(), CoreError> {
            self.inner.update_status(order_id, status).await
        }
        async fn completed_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Order>, CoreError> {
            let remaining = self.outages.load(Ordering::SeqCst);
            if remaining > 0 {
                self.outages.store(remaining - 1, Ordering::SeqCst);
                return Err(CoreError::Internal("connection reset".into()));
            }
            self.inner.completed_between(start, end).await
        }
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    async fn archiver_with_outages(outages: usize) -> (Archiver, InMemoryStore) {
        let store = InMemoryStore::default();
        store
            .create(&Tenant::new("dupont", "Friterie Dupont", Utc::now()).unwrap())
            .await
            .unwrap();
        let mut order = Order::place(
            "dupont",
            vec![OrderLine {
                name: "Friet".into(),
                quantity: 1,
                unit_price: Decimal::new(1060, 2),
            }],
            PaymentMethod::Cash,
            None,
            utc("2024-06-15T10:00:00Z"),
        )
        .unwrap();
        order.status = OrderStatus::Completed;
        store.insert(&order).await.unwrap();

        let persistence = Persistence {
            tenants: Arc::new(store.clone()),
            orders: Arc::new(FlakyOrders {
                inner: store.clone(),
                outages: AtomicUsize::new(outages),
            }),
            z_reports: Arc::new(store.clone()),
        };
        (
            Archiver::new(persistence, chrono_tz::Europe::Brussels),
            store,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_run_is_retried_for_the_same_day() {
        let (archiver, store) = archiver_with_outages(2).await;

        // 00:05 Brussels on June 16th; the retries land later that morning
        let completed = archive_day(&archiver, utc("2024-06-15T22:05:00Z"), chrono_tz::Europe::Brussels).await;

        assert!(completed);
        assert_eq!(store.call_count("orders.completed_between"), 1);
        let reports = store.list_for_tenant("dupont", None, None).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].report_date, chrono::NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_stop_after_the_last_backoff() {
        let (archiver, store) = archiver_with_outages(usize::MAX).await;

        let completed = archive_day(&archiver, utc("2024-06-15T22:05:00Z"), chrono_tz::Europe::Brussels).await;

        assert!(completed);
        assert_eq!(store.call_count("orders.completed_between"), 0);
        assert!(store.list_for_tenant("dupont", None, None).await.unwrap().is_empty());
    }
}
