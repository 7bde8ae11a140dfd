//! Request routes.
//!
//! POST /requests             - Post a buy request (dealer)
//! GET  /requests/open        - List open requests
//! GET  /requests/{id}        - Fetch one request
//! POST /requests/{id}/accept - Accept a request outright (farmer)

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::api::ApiResponse;
use crate::api::extract::ApiJson;
use crate::api::error::ApiResult;
use crate::order::Order;
use crate::request::{Request, RequestDraft};
use crate::service::MarketService;
use crate::types::{Actor, NumberInput};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AcceptBody {
    pub agreed_price: Option<NumberInput>,
}

pub fn router() -> Router<MarketService> {
    Router::new()
        .route("/requests", post(create_request))
        .route("/requests/open", get(open_requests))
        .route("/requests/{id}", get(get_request))
        .route("/requests/{id}/accept", post(accept_request))
}

async fn create_request(
    State(service): State<MarketService>,
    actor: Actor,
    ApiJson(draft): ApiJson<RequestDraft>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Request>>)> {
    let request = service.create_request(draft, &actor)?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::new(request, "Request created"),
    ))
}

async fn open_requests(
    State(service): State<MarketService>,
    _actor: Actor,
) -> ApiResult<Json<ApiResponse<Vec<Request>>>> {
    let requests = service.open_requests()?;
    let message = format!("{} open requests", requests.len());
    Ok(ApiResponse::new(requests, message))
}

async fn get_request(
    State(service): State<MarketService>,
    _actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<Request>>> {
    Ok(ApiResponse::new(service.get_request(&id)?, "Request found"))
}

async fn accept_request(
    State(service): State<MarketService>,
    actor: Actor,
    Path(id): Path<String>,
    body: Option<ApiJson<AcceptBody>>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Order>>)> {
    let agreed_price = body
        .and_then(|ApiJson(body)| body.agreed_price)
        .map(|price| price.value("agreedPrice"))
        .transpose()?;
    let order = service.accept_request(&id, agreed_price, &actor)?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::new(order, "Request accepted and order placed"),
    ))
}
