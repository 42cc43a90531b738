// handlers.rs
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    Json,
};

use crate::error::AppError;
use crate::models::{ApiResponse, CreatePollRequest, CreatedPoll, Poll, TokenQuery, VoteRequest};
use crate::origin::RequestOrigin;
use crate::services::PollService;
use crate::store::VoteStore;

type Service<S> = State<Arc<PollService<S>>>;

fn required_token(query: TokenQuery) -> Result<String, AppError> {
    query
        .shareable_id
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| AppError::InvalidInput("shareableId is required".to_string()))
}

/// Create a poll and hand back its shareable id
pub async fn create_poll<S: VoteStore>(
    State(service): Service<S>,
    payload: Result<Json<CreatePollRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedPoll>>), AppError> {
    let Json(request) = payload.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let poll = service.create_poll(request).await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(poll.into()))))
}

/// Fetch a poll for the voting page
pub async fn get_poll<S: VoteStore>(
    State(service): Service<S>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<ApiResponse<Poll>>, AppError> {
    let token = required_token(query)?;
    Ok(Json(ApiResponse::ok(service.get_poll(&token).await?)))
}

/// Current tallies for a poll
pub async fn get_results<S: VoteStore>(
    State(service): Service<S>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<ApiResponse<Poll>>, AppError> {
    let token = required_token(query)?;
    Ok(Json(ApiResponse::ok(service.get_results(&token).await?)))
}

/// Vote for an option
pub async fn vote<S: VoteStore>(
    State(service): Service<S>,
    origin: RequestOrigin,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Poll>>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::InvalidInput(e.body_text()))?;

    let poll = service
        .submit_vote(
            &request.shareable_id,
            &request.option,
            request.voter_fingerprint.as_deref(),
            &origin,
        )
        .await?;

    Ok(Json(ApiResponse::ok(poll)))
}

pub async fn health() -> &'static str {
    "ok"
}
