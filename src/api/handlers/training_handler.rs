use axum::{extract::State, response::IntoResponse, Json};
use tracing::info;

use crate::{
    api::{
        app_state::AppState,
        dto::training_dto::{TrainingRequest, TrainingResponse},
    },
    error::AppError,
};

pub async fn run_training(
    State(state): State<AppState>,
    Json(request): Json<TrainingRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.subjects.is_empty() {
        return Err(AppError::Validation("训练对象列表不能为空".into()));
    }
    info!("Training batch requested: {} subjects", request.subjects.len());

    let subjects = request.subjects.into_iter().map(Into::into).collect();
    let report = state.training.run(subjects).await;
    Ok(Json(TrainingResponse::from(report)))
}
