use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::{error::Error as StdError, fmt::Debug, sync::Arc};
use uuid::Uuid;

// Declare modules
pub mod adapters;
pub mod archive;
pub mod config;
pub mod domain;
pub mod routing;

use domain::{
    order::{Order, OrderStatus},
    tenant::{Tenant, TenantSettings},
    z_report::ZReport,
};

// Common error type for the core library
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] Box<dyn StdError + Send + Sync>),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<domain::tenant::TenantError> for CoreError {
    fn from(err: domain::tenant::TenantError) -> Self {
        match err {
            domain::tenant::TenantError::InvalidSlug(slug) => {
                CoreError::Validation(format!("Invalid tenant slug: {:?}", slug))
            }
            domain::tenant::TenantError::UnsupportedVatRate(rate) => CoreError::Validation(
                format!("Unsupported VAT percentage {} (expected 6, 12 or 21)", rate),
            ),
            domain::tenant::TenantError::InvalidInput(msg) => CoreError::Validation(msg),
        }
    }
}

impl From<domain::order::OrderError> for CoreError {
    fn from(err: domain::order::OrderError) -> Self {
        match err {
            domain::order::OrderError::InvalidTransition { from, to } => CoreError::Conflict(
                format!("Order cannot move from {} to {}", from.as_str(), to.as_str()),
            ),
            domain::order::OrderError::UnknownStatus(s) => {
                CoreError::Validation(format!("Unknown order status: {}", s))
            }
            domain::order::OrderError::InvalidInput(msg) => CoreError::Validation(msg),
        }
    }
}

// Port for tenant records and their settings
#[async_trait]
pub trait TenantRepository: Send + Sync {
    /// Create a tenant. Fails with `AlreadyExists` when the slug is taken.
    async fn create(&self, tenant: &Tenant) -> Result<(), CoreError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, CoreError>;

    /// Insert or replace the settings row of an existing tenant.
    async fn save_settings(&self, settings: &TenantSettings) -> Result<(), CoreError>;

    /// Bulk read of settings for exactly the given tenants. Tenants without a
    /// settings row are simply absent from the result.
    async fn settings_for(&self, slugs: &[String]) -> Result<Vec<TenantSettings>, CoreError>;
}

// Port for storefront orders
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), CoreError>;

    async fn find(&self, tenant_slug: &str, order_id: Uuid) -> Result<Option<Order>, CoreError>;

    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<(), CoreError>;

    /// Every completed order, across all tenants, created in `[start, end)`.
    async fn completed_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Order>, CoreError>;
}

// Port for the Z-report archive table
#[async_trait]
pub trait ZReportRepository: Send + Sync {
    /// Existing reports for `date`, restricted to the given tenants.
    async fn find_for_date(
        &self,
        slugs: &[String],
        date: NaiveDate,
    ) -> Result<Vec<ZReport>, CoreError>;

    /// Bulk insert. Rows colliding on `(tenant_slug, report_date)` overwrite the
    /// existing row so that overlapping runs converge on the same state.
    async fn insert_many(&self, reports: &[ZReport]) -> Result<(), CoreError>;

    /// Update the row identified by `report.id` in place.
    async fn update(&self, report: &ZReport) -> Result<(), CoreError>;

    /// Reports of one tenant, newest first, optionally bounded (inclusive).
    async fn list_for_tenant(
        &self,
        slug: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<ZReport>, CoreError>;
}

// Port for publishing events to a message bus
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        event_type: &str,
        event_payload: &[u8],
    ) -> Result<(), CoreError>;
}

/// The repositories a request or a job needs, bundled so they travel together.
#[derive(Clone)]
pub struct Persistence {
    pub tenants: Arc<dyn TenantRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub z_reports: Arc<dyn ZReportRepository>,
}

impl Persistence {
    /// All three ports backed by one store that implements each of them.
    pub fn from_store<S>(store: S) -> Self
    where
        S: TenantRepository + OrderRepository + ZReportRepository + Clone + 'static,
    {
        Self {
            tenants: Arc::new(store.clone()),
            orders: Arc::new(store.clone()),
            z_reports: Arc::new(store),
        }
    }
}

impl Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence").finish_non_exhaustive()
    }
}
