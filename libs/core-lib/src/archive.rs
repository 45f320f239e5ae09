//! Daily Z-report archival.
//!
//! One pass compiles a report per tenant for the civil day before `as_of`, with
//! a fixed number of store round-trips for the read phase regardless of how
//! many tenants had activity.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::domain::{order::Order, tenant::TenantSettings, z_report::ZReport};
use crate::{CoreError, EventPublisher, Persistence};

pub const Z_REPORT_ARCHIVED_EVENT: &str = "ZReportArchived";

/// Errors that abort a whole run.
#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to fetch completed orders in [{start}, {end}): {source}")]
    OrderFetch {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        #[source]
        source: CoreError,
    },
    #[error("Timezone error: {0}")]
    Timezone(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveStage {
    Settings,
    ExistingLookup,
    Compute,
    Insert,
    Update,
}

impl fmt::Display for ArchiveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArchiveStage::Settings => "settings",
            ArchiveStage::ExistingLookup => "existing_lookup",
            ArchiveStage::Compute => "compute",
            ArchiveStage::Insert => "insert",
            ArchiveStage::Update => "update",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantFailure {
    pub tenant: String,
    pub stage: ArchiveStage,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivalRunResult {
    pub target_date: NaiveDate,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub tenants_processed: usize,
    pub archived: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub failures: Vec<TenantFailure>,
}

/// A civil day in the reference timezone and the UTC span it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveWindow {
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// First instant of `date` in `tz`. Falls forward an hour at a time when
/// midnight itself is skipped by a DST jump.
fn local_day_start(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>, ArchiveError> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..3)
        .find_map(|h| {
            tz.from_local_datetime(&(midnight + Duration::hours(h)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| ArchiveError::Timezone(format!("No local midnight for {date} in {tz}")))
}

impl ArchiveWindow {
    pub fn for_date(date: NaiveDate, tz: Tz) -> Result<Self, ArchiveError> {
        let next = date
            .succ_opt()
            .ok_or_else(|| ArchiveError::Timezone(format!("No day after {date}")))?;
        Ok(Self {
            date,
            start: local_day_start(date, tz)?,
            end: local_day_start(next, tz)?,
        })
    }

    /// The civil day before the one `as_of` falls on, in `tz`.
    pub fn previous_civil_day(as_of: DateTime<Utc>, tz: Tz) -> Result<Self, ArchiveError> {
        let today = as_of.with_timezone(&tz).date_naive();
        let date = today
            .pred_opt()
            .ok_or_else(|| ArchiveError::Timezone(format!("No day before {today}")))?;
        Self::for_date(date, tz)
    }
}

#[derive(Serialize)]
struct ZReportArchived<'a> {
    tenant_slug: &'a str,
    report_date: NaiveDate,
    report_id: String,
    order_count: i32,
    total: String,
    content_hash: &'a str,
}

pub struct Archiver {
    persistence: Persistence,
    reference_tz: Tz,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl Archiver {
    pub fn new(persistence: Persistence, reference_tz: Tz) -> Self {
        Self {
            persistence,
            reference_tz,
            publisher: None,
        }
    }

    /// Announce every archived report on `tenant:<slug>:z-reports`.
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Archive the civil day before `as_of`.
    pub async fn run(&self, as_of: DateTime<Utc>) -> Result<ArchivalRunResult, ArchiveError> {
        let window = ArchiveWindow::previous_civil_day(as_of, self.reference_tz)?;
        self.run_window(window).await
    }

    pub async fn run_window(&self, window: ArchiveWindow) -> Result<ArchivalRunResult, ArchiveError> {
        let started = Instant::now();
        info!(
            target_date = %window.date,
            start = %window.start,
            end = %window.end,
            "Starting Z-report archival run"
        );

        let orders = self
            .persistence
            .orders
            .completed_between(window.start, window.end)
            .await
            .map_err(|source| {
                error!(
                    start = %window.start,
                    end = %window.end,
                    error = %source,
                    "Failed to fetch completed orders"
                );
                ArchiveError::OrderFetch {
                    start: window.start,
                    end: window.end,
                    source,
                }
            })?;

        let mut run = RunTally::new(window);
        if orders.is_empty() {
            info!(target_date = %window.date, "No completed orders in window, nothing to archive");
            return Ok(run.finish(started));
        }

        let by_tenant = partition_by_tenant(orders);
        let slugs: Vec<String> = by_tenant.keys().cloned().collect();
        run.tenants_processed = slugs.len();

        let settings: HashMap<String, TenantSettings> =
            match self.persistence.tenants.settings_for(&slugs).await {
                Ok(rows) => rows
                    .into_iter()
                    .map(|s| (s.tenant_slug.clone(), s))
                    .collect(),
                Err(e) => {
                    run.fail_all(&slugs, ArchiveStage::Settings, &e);
                    return Ok(run.finish(started));
                }
            };

        let existing: HashMap<String, ZReport> = match self
            .persistence
            .z_reports
            .find_for_date(&slugs, window.date)
            .await
        {
            Ok(rows) => rows
                .into_iter()
                .map(|r| (r.tenant_slug.clone(), r))
                .collect(),
            Err(e) => {
                run.fail_all(&slugs, ArchiveStage::ExistingLookup, &e);
                return Ok(run.finish(started));
            }
        };

        let generated_at = Utc::now();
        let mut inserts = Vec::new();
        let mut updates = Vec::new();
        for (slug, tenant_orders) in &by_tenant {
            let tenant_settings = settings.get(slug);
            if tenant_settings.is_none() {
                warn!(tenant = %slug, "No settings row, archiving with the default VAT bracket");
            }
            match ZReport::compile(slug, window.date, tenant_orders, tenant_settings, generated_at) {
                Ok(report) => match existing.get(slug) {
                    Some(prior) => {
                        if prior.content_hash == report.content_hash {
                            info!(tenant = %slug, "Z-report unchanged since last run");
                        }
                        updates.push(report.with_id(prior.id));
                    }
                    None => inserts.push(report),
                },
                Err(e) => run.fail(slug, ArchiveStage::Compute, &e),
            }
        }

        let mut archived_reports: Vec<&ZReport> = Vec::new();

        if !inserts.is_empty() {
            match self.persistence.z_reports.insert_many(&inserts).await {
                Ok(()) => {
                    run.archived += inserts.len();
                    archived_reports.extend(inserts.iter());
                }
                Err(e) => {
                    for report in &inserts {
                        run.fail(&report.tenant_slug, ArchiveStage::Insert, &e);
                    }
                }
            }
        }

        for report in &updates {
            match self.persistence.z_reports.update(report).await {
                Ok(()) => {
                    run.archived += 1;
                    archived_reports.push(report);
                }
                Err(e) => run.fail(&report.tenant_slug, ArchiveStage::Update, &e),
            }
        }

        self.announce(&archived_reports).await;

        Ok(run.finish(started))
    }

    async fn announce(&self, reports: &[&ZReport]) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        for report in reports {
            let event = ZReportArchived {
                tenant_slug: &report.tenant_slug,
                report_date: report.report_date,
                report_id: report.id.to_string(),
                order_count: report.order_count,
                total: report.total.to_string(),
                content_hash: &report.content_hash,
            };
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => {
                    warn!(tenant = %report.tenant_slug, "Failed to serialize ZReportArchived: {}", e);
                    continue;
                }
            };
            let topic = format!("tenant:{}:z-reports", report.tenant_slug);
            if let Err(e) = publisher
                .publish(&topic, Z_REPORT_ARCHIVED_EVENT, &payload)
                .await
            {
                warn!(tenant = %report.tenant_slug, "Failed to publish ZReportArchived: {}", e);
            }
        }
    }
}

fn partition_by_tenant(orders: Vec<Order>) -> BTreeMap<String, Vec<Order>> {
    let mut by_tenant: BTreeMap<String, Vec<Order>> = BTreeMap::new();
    for order in orders {
        by_tenant
            .entry(order.tenant_slug.clone())
            .or_default()
            .push(order);
    }
    by_tenant
}

struct RunTally {
    window: ArchiveWindow,
    tenants_processed: usize,
    archived: usize,
    failures: Vec<TenantFailure>,
}

impl RunTally {
    fn new(window: ArchiveWindow) -> Self {
        Self {
            window,
            tenants_processed: 0,
            archived: 0,
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, tenant: &str, stage: ArchiveStage, err: &dyn fmt::Display) {
        error!(tenant = %tenant, stage = %stage, error = %err, "Z-report archival failed for tenant");
        self.failures.push(TenantFailure {
            tenant: tenant.to_string(),
            stage,
            error: err.to_string(),
        });
    }

    fn fail_all(&mut self, tenants: &[String], stage: ArchiveStage, err: &dyn fmt::Display) {
        for tenant in tenants {
            self.fail(tenant, stage, err);
        }
    }

    fn finish(self, started: Instant) -> ArchivalRunResult {
        let result = ArchivalRunResult {
            target_date: self.window.date,
            window_start: self.window.start,
            window_end: self.window.end,
            tenants_processed: self.tenants_processed,
            archived: self.archived,
            failed: self.failures.len(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            failures: self.failures,
        };
        info!(
            target_date = %result.target_date,
            tenants = result.tenants_processed,
            archived = result.archived,
            failed = result.failed,
            duration_ms = result.duration_ms,
            "Z-report archival run finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory_event_bus::InMemoryEventBus;
    use crate::adapters::in_memory_repository::InMemoryStore;
    use crate::domain::order::OrderStatus;
    use crate::domain::tenant::Tenant;
    use crate::{OrderRepository, TenantRepository, ZReportRepository};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use uuid::Uuid;

    const BRUSSELS: Tz = chrono_tz::Europe::Brussels;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn seed_tenant(store: &InMemoryStore, slug: &str, vat: i32) {
        store
            .create(&Tenant::new(slug, slug, Utc::now()).unwrap())
            .await
            .unwrap();
        store
            .save_settings(&TenantSettings {
                tenant_slug: slug.to_string(),
                vat_percentage: vat,
                business_name: format!("{slug} bv"),
                address: "Markt 1".into(),
                vat_number: None,
            })
            .await
            .unwrap();
    }

    async fn seed_order(
        store: &InMemoryStore,
        slug: &str,
        total: &str,
        method: &str,
        status: OrderStatus,
        created_at: DateTime<Utc>,
    ) -> Uuid {
        let order = Order {
            id: Uuid::new_v4(),
            tenant_slug: slug.to_string(),
            total: dec(total),
            payment_method: method.to_string(),
            status,
            customer_name: None,
            items: vec![],
            created_at,
        };
        store.insert(&order).await.unwrap();
        order.id
    }

    // 00:05 Brussels summer time on June 16th
    fn as_of_june_16() -> DateTime<Utc> {
        utc("2024-06-15T22:05:00Z")
    }

    #[test]
    fn test_window_follows_reference_timezone() {
        let window = ArchiveWindow::previous_civil_day(as_of_june_16(), BRUSSELS).unwrap();
        assert_eq!(window.date, ymd(2024, 6, 15));
        assert_eq!(window.start, utc("2024-06-14T22:00:00Z"));
        assert_eq!(window.end, utc("2024-06-15T22:00:00Z"));
    }

    #[test]
    fn test_window_spans_dst_changes() {
        let spring = ArchiveWindow::for_date(ymd(2024, 3, 31), BRUSSELS).unwrap();
        assert_eq!(spring.end - spring.start, Duration::hours(23));
        let autumn = ArchiveWindow::for_date(ymd(2024, 10, 27), BRUSSELS).unwrap();
        assert_eq!(autumn.end - autumn.start, Duration::hours(25));
    }

    #[tokio::test]
    async fn test_order_attributed_to_civil_date() {
        let store = InMemoryStore::default();
        seed_tenant(&store, "dupont", 6).await;
        // 00:15 on June 15th in Brussels, still June 14th in UTC
        let id = seed_order(&store, "dupont", "12.00", "cash", OrderStatus::Completed, utc("2024-06-14T22:15:00Z")).await;

        let archiver = Archiver::new(Persistence::from_store(store.clone()), BRUSSELS);
        let result = archiver.run(as_of_june_16()).await.unwrap();
        assert_eq!(result.target_date, ymd(2024, 6, 15));
        assert_eq!(result.archived, 1);

        let reports = store.find_for_date(&["dupont".to_string()], ymd(2024, 6, 15)).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].order_ids, vec![id]);

        let earlier = store.find_for_date(&["dupont".to_string()], ymd(2024, 6, 14)).await.unwrap();
        assert!(earlier.is_empty());
    }

    #[tokio::test]
    async fn test_only_completed_orders_inside_window_count() {
        let store = InMemoryStore::default();
        seed_tenant(&store, "dupont", 6).await;
        seed_order(&store, "dupont", "106.00", "Contant", OrderStatus::Completed, utc("2024-06-15T10:00:00Z")).await;
        seed_order(&store, "dupont", "50.00", "cash", OrderStatus::Cancelled, utc("2024-06-15T11:00:00Z")).await;
        seed_order(&store, "dupont", "20.00", "cash", OrderStatus::Preparing, utc("2024-06-15T12:00:00Z")).await;
        // Exactly at the window end belongs to the next day
        seed_order(&store, "dupont", "7.00", "cash", OrderStatus::Completed, utc("2024-06-15T22:00:00Z")).await;

        let archiver = Archiver::new(Persistence::from_store(store.clone()), BRUSSELS);
        let result = archiver.run(as_of_june_16()).await.unwrap();
        assert_eq!(result.archived, 1);

        let report = &store.list_for_tenant("dupont", None, None).await.unwrap()[0];
        assert_eq!(report.order_count, 1);
        assert_eq!(report.total, dec("106.00"));
        assert_eq!(report.subtotal, dec("100.00"));
        assert_eq!(report.tax_low, dec("6.00"));
        assert_eq!(report.tax_mid, Decimal::ZERO);
        assert_eq!(report.tax_high, Decimal::ZERO);
        assert_eq!(report.cash_total, dec("106.00"));
    }

    #[tokio::test]
    async fn test_rerun_updates_in_place() {
        let store = InMemoryStore::default();
        seed_tenant(&store, "dupont", 21).await;
        seed_order(&store, "dupont", "10.00", "pin", OrderStatus::Completed, utc("2024-06-15T10:00:00Z")).await;
        seed_order(&store, "dupont", "5.50", "stripe", OrderStatus::Completed, utc("2024-06-15T18:00:00Z")).await;

        let archiver = Archiver::new(Persistence::from_store(store.clone()), BRUSSELS);
        let first = archiver.run(as_of_june_16()).await.unwrap();
        let after_first = store.list_for_tenant("dupont", None, None).await.unwrap();
        let second = archiver.run(as_of_june_16()).await.unwrap();
        let after_second = store.list_for_tenant("dupont", None, None).await.unwrap();

        assert_eq!(first.archived, 1);
        assert_eq!(second.archived, 1);
        assert_eq!(after_first.len(), 1);
        assert_eq!(after_second.len(), 1);
        assert_eq!(after_first[0].id, after_second[0].id);
        assert_eq!(after_first[0].content_hash, after_second[0].content_hash);
        assert_eq!(after_first[0].total, after_second[0].total);
        assert_eq!(after_first[0].tax_high, after_second[0].tax_high);
        assert_eq!(store.call_count("z_reports.update"), 1);
    }

    #[tokio::test]
    async fn test_zero_activity_day() {
        let store = InMemoryStore::default();
        seed_tenant(&store, "dupont", 6).await;

        let archiver = Archiver::new(Persistence::from_store(store.clone()), BRUSSELS);
        let result = archiver.run(as_of_june_16()).await.unwrap();
        assert_eq!(result.tenants_processed, 0);
        assert_eq!(result.archived, 0);
        assert_eq!(result.failed, 0);
        assert_eq!(store.call_count("z_reports.insert_many"), 0);
        assert!(store.list_for_tenant("dupont", None, None).await.unwrap().is_empty());
    }

    async fn read_calls_for(tenant_count: usize) -> (usize, usize) {
        let store = InMemoryStore::default();
        for i in 0..tenant_count {
            let slug = format!("tenant-{i}");
            seed_tenant(&store, &slug, 6).await;
            seed_order(&store, &slug, "10.00", "cash", OrderStatus::Completed, utc("2024-06-15T10:00:00Z")).await;
        }
        store.reset_call_counts();

        let archiver = Archiver::new(Persistence::from_store(store.clone()), BRUSSELS);
        let result = archiver.run(as_of_june_16()).await.unwrap();
        assert_eq!(result.archived, tenant_count);

        let reads = store.call_count("orders.completed_between")
            + store.call_count("tenants.settings_for")
            + store.call_count("z_reports.find_for_date");
        (reads, store.total_calls())
    }

    #[tokio::test]
    async fn test_read_phase_is_constant_in_tenant_count() {
        let (reads_one, total_one) = read_calls_for(1).await;
        let (reads_many, total_many) = read_calls_for(25).await;
        assert_eq!(reads_one, 3);
        assert_eq!(reads_many, 3);
        // First run only inserts, so the write phase is a single bulk call too
        assert_eq!(total_one, 4);
        assert_eq!(total_many, 4);
    }

    #[tokio::test]
    async fn test_unsupported_vat_fails_only_that_tenant() {
        let store = InMemoryStore::default();
        seed_tenant(&store, "good", 12).await;
        store.create(&Tenant::new("legacy", "Legacy", Utc::now()).unwrap()).await.unwrap();
        // Written before settings validation existed
        store
            .save_settings(&TenantSettings {
                tenant_slug: "legacy".into(),
                vat_percentage: 9,
                business_name: "Legacy".into(),
                address: String::new(),
                vat_number: None,
            })
            .await
            .unwrap();
        seed_order(&store, "good", "11.20", "card", OrderStatus::Completed, utc("2024-06-15T10:00:00Z")).await;
        seed_order(&store, "legacy", "9.00", "cash", OrderStatus::Completed, utc("2024-06-15T10:00:00Z")).await;

        let archiver = Archiver::new(Persistence::from_store(store.clone()), BRUSSELS);
        let result = archiver.run(as_of_june_16()).await.unwrap();
        assert_eq!(result.tenants_processed, 2);
        assert_eq!(result.archived, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.failures[0].tenant, "legacy");
        assert_eq!(result.failures[0].stage, ArchiveStage::Compute);

        let good = &store.list_for_tenant("good", None, None).await.unwrap()[0];
        assert_eq!(good.subtotal, dec("10.00"));
        assert_eq!(good.tax_mid, dec("1.20"));
    }

    /// Delegates to an in-memory store but refuses the flagged operations.
    #[derive(Clone)]
    struct RejectingWrites {
        inner: InMemoryStore,
        fail_lookups: bool,
        fail_inserts: bool,
        fail_updates: bool,
    }

    #[async_trait]
    impl ZReportRepository for RejectingWrites {
        async fn find_for_date(&self, slugs: &[String], date: NaiveDate) -> Result<Vec<ZReport>, CoreError> {
            if self.fail_lookups {
                return Err(CoreError::Internal("lookup rejected".into()));
            }
            self.inner.find_for_date(slugs, date).await
        }
        async fn insert_many(&self, reports: &[ZReport]) -> Result<(), CoreError> {
            if self.fail_inserts {
                return Err(CoreError::Internal("bulk insert rejected".into()));
            }
            self.inner.insert_many(reports).await
        }
        async fn update(&self, report: &ZReport) -> Result<(), CoreError> {
            if self.fail_updates {
                return Err(CoreError::Internal("update rejected".into()));
            }
            self.inner.update(report).await
        }
        async fn list_for_tenant(&self, slug: &str, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Vec<ZReport>, CoreError> {
            self.inner.list_for_tenant(slug, from, to).await
        }
    }

    fn persistence_with(store: &InMemoryStore, z_reports: RejectingWrites) -> Persistence {
        Persistence {
            tenants: Arc::new(store.clone()),
            orders: Arc::new(store.clone()),
            z_reports: Arc::new(z_reports),
        }
    }

    #[tokio::test]
    async fn test_bulk_insert_failure_is_counted() {
        let store = InMemoryStore::default();
        for slug in ["a", "b", "c"] {
            seed_tenant(&store, slug, 6).await;
            seed_order(&store, slug, "10.00", "cash", OrderStatus::Completed, utc("2024-06-15T10:00:00Z")).await;
        }
        let rejecting = RejectingWrites { inner: store.clone(), fail_lookups: false, fail_inserts: true, fail_updates: false };

        let archiver = Archiver::new(persistence_with(&store, rejecting), BRUSSELS);
        let result = archiver.run(as_of_june_16()).await.unwrap();
        assert_eq!(result.tenants_processed, 3);
        assert_eq!(result.archived, 0);
        assert_eq!(result.failed, 3);
        assert!(result.failures.iter().all(|f| f.stage == ArchiveStage::Insert));
    }

    #[tokio::test]
    async fn test_update_failure_does_not_block_inserts() {
        let store = InMemoryStore::default();
        for slug in ["existing", "fresh"] {
            seed_tenant(&store, slug, 6).await;
            seed_order(&store, slug, "10.00", "cash", OrderStatus::Completed, utc("2024-06-15T10:00:00Z")).await;
        }
        // Archive "existing" once so the next run stages an update for it
        let prior = ZReport::compile("existing", ymd(2024, 6, 15), &[], None, Utc::now()).unwrap();
        store.insert_many(&[prior]).await.unwrap();

        let rejecting = RejectingWrites { inner: store.clone(), fail_lookups: false, fail_inserts: false, fail_updates: true };
        let archiver = Archiver::new(persistence_with(&store, rejecting), BRUSSELS);
        let result = archiver.run(as_of_june_16()).await.unwrap();

        assert_eq!(result.archived, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.failures[0].tenant, "existing");
        assert_eq!(result.failures[0].stage, ArchiveStage::Update);
        assert_eq!(store.list_for_tenant("fresh", None, None).await.unwrap().len(), 1);
    }

    /// Settings reads always fail; everything else goes to the inner store.
    struct BrokenSettings(InMemoryStore);

    #[async_trait]
    impl TenantRepository for BrokenSettings {
        async fn create(&self, tenant: &Tenant) -> Result<(), CoreError> {
            self.0.create(tenant).await
        }
        async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, CoreError> {
            self.0.find_by_slug(slug).await
        }
        async fn save_settings(&self, settings: &TenantSettings) -> Result<(), CoreError> {
            self.0.save_settings(settings).await
        }
        async fn settings_for(&self, _slugs: &[String]) -> Result<Vec<TenantSettings>, CoreError> {
            Err(CoreError::Internal("settings unavailable".into()))
        }
    }

    async fn seed_three_active_tenants(store: &InMemoryStore) {
        for slug in ["a", "b", "c"] {
            seed_tenant(store, slug, 6).await;
            seed_order(store, slug, "10.00", "cash", OrderStatus::Completed, utc("2024-06-15T10:00:00Z")).await;
        }
        store.reset_call_counts();
    }

    #[tokio::test]
    async fn test_settings_read_failure_fails_every_tenant() {
        let store = InMemoryStore::default();
        seed_three_active_tenants(&store).await;
        let persistence = Persistence {
            tenants: Arc::new(BrokenSettings(store.clone())),
            orders: Arc::new(store.clone()),
            z_reports: Arc::new(store.clone()),
        };

        let result = Archiver::new(persistence, BRUSSELS).run(as_of_june_16()).await.unwrap();
        assert_eq!(result.tenants_processed, 3);
        assert_eq!(result.archived, 0);
        assert_eq!(result.failed, result.tenants_processed);
        assert!(result.failures.iter().all(|f| f.stage == ArchiveStage::Settings));
        let mut tenants: Vec<&str> = result.failures.iter().map(|f| f.tenant.as_str()).collect();
        tenants.sort();
        assert_eq!(tenants, ["a", "b", "c"]);
        assert_eq!(store.call_count("z_reports.find_for_date"), 0);
        assert_eq!(store.call_count("z_reports.insert_many"), 0);
        assert_eq!(store.call_count("z_reports.update"), 0);
    }

    #[tokio::test]
    async fn test_existing_lookup_failure_fails_every_tenant() {
        let store = InMemoryStore::default();
        seed_three_active_tenants(&store).await;
        let rejecting = RejectingWrites { inner: store.clone(), fail_lookups: true, fail_inserts: false, fail_updates: false };

        let archiver = Archiver::new(persistence_with(&store, rejecting), BRUSSELS);
        let result = archiver.run(as_of_june_16()).await.unwrap();
        assert_eq!(result.tenants_processed, 3);
        assert_eq!(result.archived + result.failed, result.tenants_processed);
        assert_eq!(result.failed, 3);
        assert!(result.failures.iter().all(|f| f.stage == ArchiveStage::ExistingLookup));
        assert_eq!(store.call_count("z_reports.insert_many"), 0);
        assert_eq!(store.call_count("z_reports.update"), 0);
        assert!(store.list_for_tenant("a", None, None).await.unwrap().is_empty());
    }

    /// Order reads always fail.
    struct BrokenOrders;

    #[async_trait]
    impl OrderRepository for BrokenOrders {
        async fn insert(&self, _order: &Order) -> Result<(), CoreError> {
            Err(CoreError::Internal("down".into()))
        }
        async fn find(&self, _tenant_slug: &str, _order_id: Uuid) -> Result<Option<Order>, CoreError> {
            Err(CoreError::Internal("down".into()))
        }
        async fn update_status(&self, _order_id: Uuid, _status: OrderStatus) -> Result<(), CoreError> {
            Err(CoreError::Internal("down".into()))
        }
        async fn completed_between(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<Vec<Order>, CoreError> {
            Err(CoreError::Internal("down".into()))
        }
    }

    #[tokio::test]
    async fn test_order_fetch_failure_is_fatal() {
        let store = InMemoryStore::default();
        let persistence = Persistence {
            tenants: Arc::new(store.clone()),
            orders: Arc::new(BrokenOrders),
            z_reports: Arc::new(store.clone()),
        };
        let archiver = Archiver::new(persistence, BRUSSELS);
        match archiver.run(as_of_june_16()).await {
            Err(ArchiveError::OrderFetch { start, end, .. }) => {
                assert_eq!(start, utc("2024-06-14T22:00:00Z"));
                assert_eq!(end, utc("2024-06-15T22:00:00Z"));
            }
            other => panic!("Expected OrderFetch error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_archived_reports_are_announced() {
        let store = InMemoryStore::default();
        seed_tenant(&store, "dupont", 6).await;
        seed_order(&store, "dupont", "10.00", "cash", OrderStatus::Completed, utc("2024-06-15T10:00:00Z")).await;

        let bus = InMemoryEventBus::default();
        let mut receiver = bus.subscribe("tenant:dupont:z-reports");
        let archiver = Archiver::new(Persistence::from_store(store.clone()), BRUSSELS)
            .with_publisher(Arc::new(bus.clone()));
        archiver.run(as_of_june_16()).await.unwrap();

        let message = receiver.try_recv().expect("ZReportArchived published");
        assert_eq!(message.event_type, Z_REPORT_ARCHIVED_EVENT);
        let body: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
        assert_eq!(body["tenant_slug"], "dupont");
        assert_eq!(body["report_date"], "2024-06-15");
        assert_eq!(body["order_count"], 1);
    }
}
