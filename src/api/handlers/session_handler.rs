use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    api::{app_state::AppState, dto::session_dto::*},
    error::AppError,
};

pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Creating session for subject: {}", request.subject_id);

    if request.subject_id.trim().is_empty() {
        return Err(AppError::Validation("subject_id 不能为空".into()));
    }

    let reply = state
        .orchestrator
        .start(&request.subject_id, request.mode)
        .await?;

    Ok((StatusCode::CREATED, Json(TurnReplyResponse::from(reply))))
}

pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let sessions = state.store.list_sessions().await?;
    let summaries: Vec<SessionSummaryResponse> =
        sessions.iter().map(SessionSummaryResponse::from).collect();
    Ok(Json(summaries))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .store
        .load_session(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("会话不存在: {id}")))?;
    Ok(Json(SessionDetailResponse::from(&session)))
}

pub async fn post_turn(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TurnRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Turn for session {}", id);

    if request.content.trim().is_empty() {
        return Err(AppError::Validation("发言内容不能为空".into()));
    }

    let reply = state.orchestrator.handle_turn(id, &request.content).await?;
    Ok(Json(TurnReplyResponse::from(reply)))
}

pub async fn submit_scales(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SubmitScalesRequest>,
) -> Result<impl IntoResponse, AppError> {
    debug!("Scales submitted for session {}", id);

    let scores: Vec<_> = request.scores.iter().map(|s| (s.kind, s.total)).collect();
    let reply = state.orchestrator.submit_scales(id, &scores).await?;
    Ok(Json(TurnReplyResponse::from(reply)))
}

pub async fn resume_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.orchestrator.resume(id).await?;
    Ok(Json(SessionDetailResponse::from(&session)))
}

pub async fn cancel_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    // 确认会话存在再挂取消标志
    state
        .store
        .load_session(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("会话不存在: {id}")))?;

    state.orchestrator.cancel(id);
    Ok(StatusCode::ACCEPTED)
}
