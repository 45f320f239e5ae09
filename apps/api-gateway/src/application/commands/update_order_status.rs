use crate::{ApiResult, AppState, ensure_persistence, map_core_error};
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use vysion_core::{
    CoreError, OrderRepository,
    domain::order::{Order, OrderStatus},
};

pub struct UpdateOrderStatusHandler {
    order_repository: Arc<dyn OrderRepository>,
}

impl UpdateOrderStatusHandler {
    pub fn new(order_repository: Arc<dyn OrderRepository>) -> Self {
        Self { order_repository }
    }

    pub async fn handle(
        &self,
        tenant_slug: &str,
        order_id: Uuid,
        next: OrderStatus,
    ) -> Result<Order, CoreError> {
        let mut order = self
            .order_repository
            .find(tenant_slug, order_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Order {}", order_id)))?;
        order.status = order.status.transition_to(next)?;
        self.order_repository
            .update_status(order.id, order.status)
            .await?;
        info!(tenant = %tenant_slug, order_id = %order_id, status = order.status.as_str(), "Order status changed");
        Ok(order)
    }
}

#[derive(Deserialize, Debug)]
pub struct UpdateOrderStatusDto {
    pub status: String,
}

pub async fn handle_update_order_status_request(
    State(state): State<AppState>,
    Path((tenant, order_id)): Path<(String, Uuid)>,
    Json(payload): Json<UpdateOrderStatusDto>,
) -> ApiResult<impl IntoResponse> {
    let persistence = ensure_persistence(&state)?;
    let next = OrderStatus::parse(payload.status.trim())
        .map_err(|e| map_core_error(e.into()))?;
    let handler = UpdateOrderStatusHandler::new(persistence.orders.clone());
    let order = handler
        .handle(&tenant, order_id, next)
        .await
        .map_err(map_core_error)?;
    Ok(Json(serde_json::json!({
        "order_id": order.id,
        "status": order.status,
    })))
}
