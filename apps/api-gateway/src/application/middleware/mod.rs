pub mod auth;
pub mod tenant_routing;

pub use auth::{CronAuthError, admin_key_auth, authorize_cron, bearer_token};
pub use tenant_routing::{ResolvedTenant, tenant_routing};
