//! Record Routes
//!
//! 定义病历相关的 API 路由。

use crate::api::handlers::record_handler::*;
use axum::{routing::get, Router};

use crate::api::app_state::AppState;

/// 创建病历路由器
pub fn create_record_router() -> Router<AppState> {
    Router::new()
        .route("/records", get(list_records))
        .route("/records/by-session/:session_id", get(get_record_by_session))
}
