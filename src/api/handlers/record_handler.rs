use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    api::{app_state::AppState, dto::record_dto::MedicalRecordResponse},
    error::AppError,
};

pub async fn list_records(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let records = state.store.list_records().await?;
    let responses: Vec<MedicalRecordResponse> =
        records.into_iter().map(MedicalRecordResponse::from).collect();
    Ok(Json(responses))
}

pub async fn get_record_by_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let record = state
        .store
        .record_for_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("会话没有病历: {session_id}")))?;
    Ok(Json(MedicalRecordResponse::from(record)))
}
