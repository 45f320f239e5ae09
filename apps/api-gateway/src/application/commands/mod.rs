pub mod create_order;
pub mod create_tenant;
pub mod save_settings;
pub mod update_order_status;

pub use create_order::CreateOrderHandler;
pub use create_tenant::CreateTenantHandler;
pub use save_settings::SaveSettingsHandler;
pub use update_order_status::UpdateOrderStatusHandler;
