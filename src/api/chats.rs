//! Chat routes.
//!
//! POST /chats                - Open (or reuse) a chat with the other party
//! GET  /chats/my             - The caller's chats
//! GET  /chats/{id}/messages  - Chat transcript
//! POST /chats/{id}/messages  - Send a message
//! POST /chats/{id}/deal      - Submit deal terms

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::ApiResponse;
use crate::api::extract::ApiJson;
use crate::api::error::ApiResult;
use crate::chat::{Chat, DealOutcome, DealProposal, Message, OpenChat};
use crate::order::Order;
use crate::service::MarketService;
use crate::types::Actor;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MessageBody {
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DealResponse {
    pub matched: bool,
    pub already_placed: bool,
    pub order: Option<Order>,
}

impl From<DealOutcome> for DealResponse {
    fn from(outcome: DealOutcome) -> Self {
        match outcome {
            DealOutcome::Matched {
                order,
                already_placed,
            } => Self {
                matched: true,
                already_placed,
                order: Some(order),
            },
            DealOutcome::Waiting | DealOutcome::Mismatch => Self {
                matched: false,
                already_placed: false,
                order: None,
            },
        }
    }
}

pub fn router() -> Router<MarketService> {
    Router::new()
        .route("/chats", post(create_or_get_chat))
        .route("/chats/my", get(my_chats))
        .route(
            "/chats/{id}/messages",
            get(chat_messages).post(send_message),
        )
        .route("/chats/{id}/deal", post(submit_deal))
}

async fn create_or_get_chat(
    State(service): State<MarketService>,
    actor: Actor,
    ApiJson(open): ApiJson<OpenChat>,
) -> ApiResult<Json<ApiResponse<Chat>>> {
    let chat = service.create_or_get_chat(&open, &actor)?;
    Ok(ApiResponse::new(chat, "Chat ready"))
}

async fn my_chats(
    State(service): State<MarketService>,
    actor: Actor,
) -> ApiResult<Json<ApiResponse<Vec<Chat>>>> {
    let chats = service.my_chats(&actor)?;
    let message = format!("{} chats", chats.len());
    Ok(ApiResponse::new(chats, message))
}

async fn chat_messages(
    State(service): State<MarketService>,
    actor: Actor,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<Vec<Message>>>> {
    let messages = service.chat_messages(&id, &actor)?;
    let message = format!("{} messages", messages.len());
    Ok(ApiResponse::new(messages, message))
}

async fn send_message(
    State(service): State<MarketService>,
    actor: Actor,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<MessageBody>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Message>>)> {
    let sent = service.send_message(&id, &body.text, &actor)?;
    Ok((StatusCode::CREATED, ApiResponse::new(sent, "Message sent")))
}

async fn submit_deal(
    State(service): State<MarketService>,
    actor: Actor,
    Path(id): Path<String>,
    ApiJson(proposal): ApiJson<DealProposal>,
) -> ApiResult<Json<ApiResponse<DealResponse>>> {
    let outcome = service.submit_deal(&id, proposal, &actor)?;
    let message = outcome.message();
    Ok(ApiResponse::new(DealResponse::from(outcome), message))
}
