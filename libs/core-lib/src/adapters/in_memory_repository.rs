use crate::domain::{
    order::{Order, OrderStatus},
    tenant::{Tenant, TenantSettings},
    z_report::ZReport,
};
use crate::{CoreError, OrderRepository, TenantRepository, ZReportRepository};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use std::sync::Arc;
use uuid::Uuid;

/// In-memory implementation of every repository port, for tests and
/// single-executable mode. Also counts calls per operation so callers can
/// assert on round-trips.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tenants: Arc<DashMap<String, Tenant>>,
    settings: Arc<DashMap<String, TenantSettings>>,
    orders: Arc<DashMap<Uuid, Order>>,
    // (tenant slug, report date) -> report
    z_reports: Arc<DashMap<(String, NaiveDate), ZReport>>,
    calls: Arc<DashMap<&'static str, usize>>,
}

impl InMemoryStore {
    fn record(&self, op: &'static str) {
        *self.calls.entry(op).or_insert(0) += 1;
    }

    /// Calls made to one operation, e.g. `"orders.completed_between"`.
    pub fn call_count(&self, op: &str) -> usize {
        self.calls.get(op).map(|c| *c.value()).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|c| *c.value()).sum()
    }

    pub fn reset_call_counts(&self) {
        self.calls.clear();
    }

    fn ensure_tenant(&self, slug: &str) -> Result<(), CoreError> {
        if self.tenants.contains_key(slug) {
            Ok(())
        } else {
            Err(CoreError::NotFound(format!("Tenant {}", slug)))
        }
    }
}

#[async_trait]
impl TenantRepository for InMemoryStore {
    async fn create(&self, tenant: &Tenant) -> Result<(), CoreError> {
        self.record("tenants.create");
        match self.tenants.entry(tenant.slug.clone()) {
            Entry::Occupied(_) => Err(CoreError::AlreadyExists(format!(
                "Tenant {}",
                tenant.slug
            ))),
            Entry::Vacant(slot) => {
                slot.insert(tenant.clone());
                Ok(())
            }
        }
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, CoreError> {
        self.record("tenants.find_by_slug");
        Ok(self.tenants.get(slug).map(|t| t.value().clone()))
    }

    async fn save_settings(&self, settings: &TenantSettings) -> Result<(), CoreError> {
        self.record("tenants.save_settings");
        self.ensure_tenant(&settings.tenant_slug)?;
        self.settings
            .insert(settings.tenant_slug.clone(), settings.clone());
        Ok(())
    }

    async fn settings_for(&self, slugs: &[String]) -> Result<Vec<TenantSettings>, CoreError> {
        self.record("tenants.settings_for");
        Ok(slugs
            .iter()
            .filter_map(|slug| self.settings.get(slug).map(|s| s.value().clone()))
            .collect())
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert(&self, order: &Order) -> Result<(), CoreError> {
        self.record("orders.insert");
        self.ensure_tenant(&order.tenant_slug)?;
        match self.orders.entry(order.id) {
            Entry::Occupied(_) => {
                Err(CoreError::AlreadyExists(format!("Order {}", order.id)))
            }
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                Ok(())
            }
        }
    }

    async fn find(&self, tenant_slug: &str, order_id: Uuid) -> Result<Option<Order>, CoreError> {
        self.record("orders.find");
        Ok(self
            .orders
            .get(&order_id)
            .filter(|o| o.tenant_slug == tenant_slug)
            .map(|o| o.value().clone()))
    }

    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<(), CoreError> {
        self.record("orders.update_status");
        match self.orders.get_mut(&order_id) {
            Some(mut order) => {
                order.status = status;
                Ok(())
            }
            None => Err(CoreError::NotFound(format!("Order {}", order_id))),
        }
    }

    async fn completed_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>, CoreError> {
        self.record("orders.completed_between");
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|o| {
                o.status == OrderStatus::Completed && o.created_at >= start && o.created_at < end
            })
            .map(|o| o.value().clone())
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}

#[async_trait]
impl ZReportRepository for InMemoryStore {
    async fn find_for_date(
        &self,
        slugs: &[String],
        date: NaiveDate,
    ) -> Result<Vec<ZReport>, CoreError> {
        self.record("z_reports.find_for_date");
        Ok(slugs
            .iter()
            .filter_map(|slug| {
                self.z_reports
                    .get(&(slug.clone(), date))
                    .map(|r| r.value().clone())
            })
            .collect())
    }

    async fn insert_many(&self, reports: &[ZReport]) -> Result<(), CoreError> {
        self.record("z_reports.insert_many");
        for report in reports {
            self.ensure_tenant(&report.tenant_slug)?;
        }
        for report in reports {
            let key = (report.tenant_slug.clone(), report.report_date);
            let mut row = report.clone();
            // A concurrent run got there first: overwrite its content, keep its id.
            if let Some(existing) = self.z_reports.get(&key) {
                row.id = existing.id;
            }
            self.z_reports.insert(key, row);
        }
        Ok(())
    }

    async fn update(&self, report: &ZReport) -> Result<(), CoreError> {
        self.record("z_reports.update");
        let mut row = self
            .z_reports
            .iter_mut()
            .find(|r| r.id == report.id)
            .ok_or_else(|| CoreError::NotFound(format!("Z-report {}", report.id)))?;
        if row.tenant_slug != report.tenant_slug || row.report_date != report.report_date {
            return Err(CoreError::Conflict(format!(
                "Z-report {} belongs to {} on {}",
                report.id, row.tenant_slug, row.report_date
            )));
        }
        *row = report.clone();
        Ok(())
    }

    async fn list_for_tenant(
        &self,
        slug: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<ZReport>, CoreError> {
        self.record("z_reports.list_for_tenant");
        let mut reports: Vec<ZReport> = self
            .z_reports
            .iter()
            .filter(|r| r.tenant_slug == slug)
            .filter(|r| from.is_none_or(|f| r.report_date >= f))
            .filter(|r| to.is_none_or(|t| r.report_date <= t))
            .map(|r| r.value().clone())
            .collect();
        reports.sort_by(|a, b| b.report_date.cmp(&a.report_date));
        Ok(reports)
    }
}
