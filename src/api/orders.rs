//! Order routes.
//!
//! GET   /orders/my          - Orders the caller is a party to
//! GET   /orders/{id}        - Fetch one order
//! PATCH /orders/{id}/status - Advance, confirm or cancel an order

use axum::extract::{Path, State};
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::Deserialize;

use crate::api::ApiResponse;
use crate::api::extract::ApiJson;
use crate::api::error::ApiResult;
use crate::order::Order;
use crate::service::MarketService;
use crate::types::Actor;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StatusBody {
    pub status: String,
}

pub fn router() -> Router<MarketService> {
    Router::new()
        .route("/orders/my", get(my_orders))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/status", patch(update_order_status))
}

async fn my_orders(
    State(service): State<MarketService>,
    actor: Actor,
) -> ApiResult<Json<ApiResponse<Vec<Order>>>> {
    let orders = service.my_orders(&actor)?;
    let message = format!("{} orders", orders.len());
    Ok(ApiResponse::new(orders, message))
}

async fn get_order(
    State(service): State<MarketService>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<Order>>> {
    Ok(ApiResponse::new(service.get_order(&id, &actor)?, "Order found"))
}

async fn update_order_status(
    State(service): State<MarketService>,
    actor: Actor,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<StatusBody>,
) -> ApiResult<Json<ApiResponse<Order>>> {
    let order = service.update_order_status(&id, &body.status, &actor)?;
    let message = format!("Order status updated to {}", order.status);
    Ok(ApiResponse::new(order, message))
}
