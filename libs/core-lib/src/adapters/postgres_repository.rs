use crate::domain::{
    order::{Order, OrderLine, OrderStatus},
    tenant::{Tenant, TenantSettings, TenantStatus},
    z_report::ZReport,
};
use crate::{CoreError, OrderRepository, TenantRepository, ZReportRepository};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::migrate::Migrator;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// Schema shared by the gateway and the worker.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

// 19 binds per row keeps each statement well under the 65535 parameter limit.
const INSERT_CHUNK: usize = 1000;

const Z_REPORT_COLUMNS: &str = "id, tenant_slug, report_date, order_count, subtotal, tax_low, \
     tax_mid, tax_high, total, cash_total, card_total, online_total, business_name, \
     business_address, vat_number, order_ids, content_hash, generated_at, is_archived";

fn infra(e: sqlx::Error) -> CoreError {
    CoreError::Infrastructure(Box::new(e))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

#[derive(sqlx::FromRow, Debug)]
struct TenantRow {
    slug: String,
    name: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = CoreError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        let status = TenantStatus::parse(&row.status).ok_or_else(|| {
            CoreError::Serialization(format!(
                "Unknown status {:?} on tenant {}",
                row.status, row.slug
            ))
        })?;
        Ok(Tenant {
            slug: row.slug,
            name: row.name,
            status,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow, Debug)]
struct SettingsRow {
    tenant_slug: String,
    vat_percentage: i32,
    business_name: String,
    address: String,
    vat_number: Option<String>,
}

impl From<SettingsRow> for TenantSettings {
    fn from(row: SettingsRow) -> Self {
        TenantSettings {
            tenant_slug: row.tenant_slug,
            vat_percentage: row.vat_percentage,
            business_name: row.business_name,
            address: row.address,
            vat_number: row.vat_number,
        }
    }
}

#[derive(sqlx::FromRow, Debug)]
struct OrderRow {
    id: Uuid,
    tenant_slug: String,
    total: Decimal,
    payment_method: String,
    status: String,
    customer_name: Option<String>,
    items: Json<Vec<OrderLine>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = CoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::parse(&row.status)
            .map_err(|e| CoreError::Serialization(format!("Order {}: {}", row.id, e)))?;
        Ok(Order {
            id: row.id,
            tenant_slug: row.tenant_slug,
            total: row.total,
            payment_method: row.payment_method,
            status,
            customer_name: row.customer_name,
            items: row.items.0,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow, Debug)]
struct ZReportRow {
    id: Uuid,
    tenant_slug: String,
    report_date: NaiveDate,
    order_count: i32,
    subtotal: Decimal,
    tax_low: Decimal,
    tax_mid: Decimal,
    tax_high: Decimal,
    total: Decimal,
    cash_total: Decimal,
    card_total: Decimal,
    online_total: Decimal,
    business_name: String,
    business_address: String,
    vat_number: Option<String>,
    order_ids: Vec<Uuid>,
    content_hash: String,
    generated_at: DateTime<Utc>,
    is_archived: bool,
}

impl From<ZReportRow> for ZReport {
    fn from(row: ZReportRow) -> Self {
        ZReport {
            id: row.id,
            tenant_slug: row.tenant_slug,
            report_date: row.report_date,
            order_count: row.order_count,
            subtotal: row.subtotal,
            tax_low: row.tax_low,
            tax_mid: row.tax_mid,
            tax_high: row.tax_high,
            total: row.total,
            cash_total: row.cash_total,
            card_total: row.card_total,
            online_total: row.online_total,
            business_name: row.business_name,
            business_address: row.business_address,
            vat_number: row.vat_number,
            order_ids: row.order_ids,
            content_hash: row.content_hash,
            generated_at: row.generated_at,
            is_archived: row.is_archived,
        }
    }
}

/// PostgreSQL implementation of every repository port using sqlx.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantRepository for PostgresStore {
    async fn create(&self, tenant: &Tenant) -> Result<(), CoreError> {
        sqlx::query("INSERT INTO tenants (slug, name, status, created_at) VALUES ($1, $2, $3, $4)")
            .bind(&tenant.slug)
            .bind(&tenant.name)
            .bind(tenant.status.as_str())
            .bind(tenant.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    CoreError::AlreadyExists(format!("Tenant {}", tenant.slug))
                } else {
                    infra(e)
                }
            })?;
        Ok(())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, CoreError> {
        let row: Option<TenantRow> =
            sqlx::query_as("SELECT slug, name, status, created_at FROM tenants WHERE slug = $1")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await
                .map_err(infra)?;
        row.map(Tenant::try_from).transpose()
    }

    async fn save_settings(&self, settings: &TenantSettings) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO tenant_settings (tenant_slug, vat_percentage, business_name, address, vat_number)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (tenant_slug) DO UPDATE SET
                vat_percentage = EXCLUDED.vat_percentage,
                business_name = EXCLUDED.business_name,
                address = EXCLUDED.address,
                vat_number = EXCLUDED.vat_number,
                updated_at = NOW()",
        )
        .bind(&settings.tenant_slug)
        .bind(settings.vat_percentage)
        .bind(&settings.business_name)
        .bind(&settings.address)
        .bind(&settings.vat_number)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                CoreError::NotFound(format!("Tenant {}", settings.tenant_slug))
            } else {
                infra(e)
            }
        })?;
        Ok(())
    }

    async fn settings_for(&self, slugs: &[String]) -> Result<Vec<TenantSettings>, CoreError> {
        if slugs.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<SettingsRow> = sqlx::query_as(
            "SELECT tenant_slug, vat_percentage, business_name, address, vat_number
             FROM tenant_settings WHERE tenant_slug = ANY($1)",
        )
        .bind(slugs)
        .fetch_all(&self.pool)
        .await
        .map_err(infra)?;
        Ok(rows.into_iter().map(TenantSettings::from).collect())
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn insert(&self, order: &Order) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO orders (id, tenant_slug, total, payment_method, status, customer_name, items, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(order.id)
        .bind(&order.tenant_slug)
        .bind(order.total)
        .bind(&order.payment_method)
        .bind(order.status.as_str())
        .bind(&order.customer_name)
        .bind(Json(&order.items))
        .bind(order.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CoreError::AlreadyExists(format!("Order {}", order.id))
            } else if is_foreign_key_violation(&e) {
                CoreError::NotFound(format!("Tenant {}", order.tenant_slug))
            } else {
                infra(e)
            }
        })?;
        Ok(())
    }

    async fn find(&self, tenant_slug: &str, order_id: Uuid) -> Result<Option<Order>, CoreError> {
        let row: Option<OrderRow> = sqlx::query_as(
            "SELECT id, tenant_slug, total, payment_method, status, customer_name, items, created_at
             FROM orders WHERE id = $1 AND tenant_slug = $2",
        )
        .bind(order_id)
        .bind(tenant_slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(infra)?;
        row.map(Order::try_from).transpose()
    }

    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(infra)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Order {}", order_id)));
        }
        Ok(())
    }

    async fn completed_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>, CoreError> {
        // 'delivered' is the legacy spelling of 'completed'
        let rows: Vec<OrderRow> = sqlx::query_as(
            "SELECT id, tenant_slug, total, payment_method, status, customer_name, items, created_at
             FROM orders
             WHERE status IN ('completed', 'delivered') AND created_at >= $1 AND created_at < $2
             ORDER BY created_at",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(infra)?;
        rows.into_iter().map(Order::try_from).collect()
    }
}

#[async_trait]
impl ZReportRepository for PostgresStore {
    async fn find_for_date(
        &self,
        slugs: &[String],
        date: NaiveDate,
    ) -> Result<Vec<ZReport>, CoreError> {
        if slugs.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "SELECT {} FROM z_reports WHERE report_date = $1 AND tenant_slug = ANY($2)",
            Z_REPORT_COLUMNS
        );
        let rows: Vec<ZReportRow> = sqlx::query_as(&query)
            .bind(date)
            .bind(slugs)
            .fetch_all(&self.pool)
            .await
            .map_err(infra)?;
        Ok(rows.into_iter().map(ZReport::from).collect())
    }

    async fn insert_many(&self, reports: &[ZReport]) -> Result<(), CoreError> {
        if reports.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(infra)?;
        for chunk in reports.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO z_reports ({}) ", Z_REPORT_COLUMNS));
            builder.push_values(chunk, |mut row, r| {
                row.push_bind(r.id)
                    .push_bind(r.tenant_slug.clone())
                    .push_bind(r.report_date)
                    .push_bind(r.order_count)
                    .push_bind(r.subtotal)
                    .push_bind(r.tax_low)
                    .push_bind(r.tax_mid)
                    .push_bind(r.tax_high)
                    .push_bind(r.total)
                    .push_bind(r.cash_total)
                    .push_bind(r.card_total)
                    .push_bind(r.online_total)
                    .push_bind(r.business_name.clone())
                    .push_bind(r.business_address.clone())
                    .push_bind(r.vat_number.clone())
                    .push_bind(r.order_ids.clone())
                    .push_bind(r.content_hash.clone())
                    .push_bind(r.generated_at)
                    .push_bind(r.is_archived);
            });
            // Overlapping runs converge: the row keeps its id, the content is replaced.
            builder.push(
                " ON CONFLICT (tenant_slug, report_date) DO UPDATE SET
                    order_count = EXCLUDED.order_count,
                    subtotal = EXCLUDED.subtotal,
                    tax_low = EXCLUDED.tax_low,
                    tax_mid = EXCLUDED.tax_mid,
                    tax_high = EXCLUDED.tax_high,
                    total = EXCLUDED.total,
                    cash_total = EXCLUDED.cash_total,
                    card_total = EXCLUDED.card_total,
                    online_total = EXCLUDED.online_total,
                    business_name = EXCLUDED.business_name,
                    business_address = EXCLUDED.business_address,
                    vat_number = EXCLUDED.vat_number,
                    order_ids = EXCLUDED.order_ids,
                    content_hash = EXCLUDED.content_hash,
                    generated_at = EXCLUDED.generated_at,
                    is_archived = EXCLUDED.is_archived",
            );
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(infra)?;
        }
        tx.commit().await.map_err(infra)?;
        Ok(())
    }

    async fn update(&self, report: &ZReport) -> Result<(), CoreError> {
        let result = sqlx::query(
            "UPDATE z_reports SET
                order_count = $3, subtotal = $4, tax_low = $5, tax_mid = $6, tax_high = $7,
                total = $8, cash_total = $9, card_total = $10, online_total = $11,
                business_name = $12, business_address = $13, vat_number = $14,
                order_ids = $15, content_hash = $16, generated_at = $17, is_archived = $18
             WHERE id = $1 AND tenant_slug = $2",
        )
        .bind(report.id)
        .bind(&report.tenant_slug)
        .bind(report.order_count)
        .bind(report.subtotal)
        .bind(report.tax_low)
        .bind(report.tax_mid)
        .bind(report.tax_high)
        .bind(report.total)
        .bind(report.cash_total)
        .bind(report.card_total)
        .bind(report.online_total)
        .bind(&report.business_name)
        .bind(&report.business_address)
        .bind(&report.vat_number)
        .bind(&report.order_ids)
        .bind(&report.content_hash)
        .bind(report.generated_at)
        .bind(report.is_archived)
        .execute(&self.pool)
        .await
        .map_err(infra)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("Z-report {}", report.id)));
        }
        Ok(())
    }

    async fn list_for_tenant(
        &self,
        slug: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<ZReport>, CoreError> {
        let query = format!(
            "SELECT {} FROM z_reports
             WHERE tenant_slug = $1
               AND ($2::date IS NULL OR report_date >= $2)
               AND ($3::date IS NULL OR report_date <= $3)
             ORDER BY report_date DESC",
            Z_REPORT_COLUMNS
        );
        let rows: Vec<ZReportRow> = sqlx::query_as(&query)
            .bind(slug)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(infra)?;
        Ok(rows.into_iter().map(ZReport::from).collect())
    }
}
