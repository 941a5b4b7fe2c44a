//! Training Routes
//!
//! 定义批量训练的 API 路由。

use crate::api::handlers::training_handler::*;
use axum::{routing::post, Router};

use crate::api::app_state::AppState;

/// 创建训练路由器
pub fn create_training_router() -> Router<AppState> {
    Router::new().route("/training/run", post(run_training))
}
