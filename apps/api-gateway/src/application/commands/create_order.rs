use crate::{ApiResult, AppState, ensure_persistence, map_core_error};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use vysion_core::{
    CoreError, Persistence,
    domain::order::{Order, OrderLine, PaymentMethod},
};

pub struct CreateOrderHandler {
    persistence: Persistence,
}

impl CreateOrderHandler {
    pub fn new(persistence: Persistence) -> Self {
        Self { persistence }
    }

    pub async fn handle(&self, tenant_slug: &str, command: CreateOrderDto) -> Result<Order, CoreError> {
        match self.persistence.tenants.find_by_slug(tenant_slug).await? {
            Some(tenant) if tenant.is_active() => {}
            _ => return Err(CoreError::NotFound(format!("Tenant {}", tenant_slug))),
        }
        let order = Order::place(
            tenant_slug,
            command.items,
            command.payment_method,
            command.customer_name,
            Utc::now(),
        )?;
        self.persistence.orders.insert(&order).await?;
        info!(tenant = %tenant_slug, order_id = %order.id, total = %order.total, "Order placed");
        Ok(order)
    }
}

#[derive(Deserialize, Debug)]
pub struct CreateOrderDto {
    pub items: Vec<OrderLine>,
    pub payment_method: PaymentMethod,
    pub customer_name: Option<String>,
}

pub async fn handle_create_order_request(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(payload): Json<CreateOrderDto>,
) -> ApiResult<impl IntoResponse> {
    let persistence = ensure_persistence(&state)?;
    let handler = CreateOrderHandler::new(persistence.clone());
    let order = handler
        .handle(&tenant, payload)
        .await
        .map_err(map_core_error)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "order_id": order.id,
            "total": order.total,
            "status": order.status,
        })),
    ))
}
