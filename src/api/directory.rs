//! User and MSP catalog routes.
//!
//! POST /users          - Register a user in the directory
//! GET  /msp            - List MSP entries
//! GET  /msp/{product}  - MSP for one product
//! POST /msp            - Set a product's MSP (admin)

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::api::ApiResponse;
use crate::api::extract::ApiJson;
use crate::api::error::ApiResult;
use crate::msp::MspEntry;
use crate::service::MarketService;
use crate::types::{Actor, NumberInput, Role};
use crate::users::User;

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct MspBody {
    pub product: String,
    pub price: NumberInput,
}

pub fn router() -> Router<MarketService> {
    Router::new()
        .route("/users", post(register_user))
        .route("/msp", get(msp_list).post(upsert_msp))
        .route("/msp/{product}", get(msp_for))
}

async fn register_user(
    State(service): State<MarketService>,
    ApiJson(body): ApiJson<RegisterBody>,
) -> ApiResult<(StatusCode, Json<ApiResponse<User>>)> {
    let user = service.register_user(&body.name, body.role)?;
    Ok((StatusCode::CREATED, ApiResponse::new(user, "User registered")))
}

async fn msp_list(
    State(service): State<MarketService>,
) -> ApiResult<Json<ApiResponse<Vec<MspEntry>>>> {
    let entries = service.msp_list()?;
    let message = format!("{} products", entries.len());
    Ok(ApiResponse::new(entries, message))
}

async fn msp_for(
    State(service): State<MarketService>,
    Path(product): Path<String>,
) -> ApiResult<Json<ApiResponse<MspEntry>>> {
    Ok(ApiResponse::new(service.msp_for(&product)?, "MSP found"))
}

async fn upsert_msp(
    State(service): State<MarketService>,
    actor: Actor,
    ApiJson(body): ApiJson<MspBody>,
) -> ApiResult<Json<ApiResponse<MspEntry>>> {
    let price = body.price.value("price")?;
    let entry = service.upsert_msp(&body.product, price, &actor)?;
    Ok(ApiResponse::new(entry, "MSP updated"))
}
