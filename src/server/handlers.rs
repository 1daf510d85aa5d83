use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chat::{Answer, ChatMode, QueryOrchestrator};
use crate::core::errors::AppError;

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<QueryOrchestrator>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub user_msg: String,
    pub mode: ChatMode,
    pub llm: String,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn query(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<Answer>, AppError> {
    if req.user_msg.trim().is_empty() {
        return Err(AppError::BadRequest("empty user_msg".to_string()));
    }

    let answer = state
        .orchestrator
        .answer(&req.user_msg, req.mode, &req.llm)
        .await?;
    Ok(Json(answer))
}
