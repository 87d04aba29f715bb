use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Order, OrderItem};

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrderItemRequest {
    pub menu_item_id: Uuid,
    pub quantity: i32,
}

/// The client sends its computed total; the server recomputes subtotal and
/// fee from authoritative prices and rejects a mismatch.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub restaurant_id: Uuid,
    pub items: Vec<OrderItemRequest>,
    pub delivery_address: Option<String>,
    pub total: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
    /// Required when moving into `delivering` through this endpoint.
    pub driver_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
