//! 可观测性模块
//!
//! 原子计数器实现的应用指标、健康检查与 Prometheus 文本端点。

use axum::{response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// 应用指标
#[derive(Clone, Default)]
pub struct AppMetrics {
    pub sessions_started: Arc<AtomicU64>,
    pub sessions_active: Arc<AtomicUsize>,
    pub sessions_closed: Arc<AtomicU64>,
    pub sessions_cancelled: Arc<AtomicU64>,
    pub turns_total: Arc<AtomicU64>,
    pub generation_fallbacks: Arc<AtomicU64>,
    pub degraded_selections: Arc<AtomicU64>,
    pub records_written: Arc<AtomicU64>,
}

impl AppMetrics {
    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::SeqCst);
        self.sessions_active.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::SeqCst);
        self.sessions_active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn record_session_cancelled(&self) {
        self.sessions_cancelled.fetch_add(1, Ordering::SeqCst);
        self.sessions_active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn record_turn(&self) {
        self.turns_total.fetch_add(1, Ordering::SeqCst);
    }

    /// 生成失败、降级到脚本化文案
    pub fn record_generation_fallback(&self) {
        self.generation_fallbacks.fetch_add(1, Ordering::SeqCst);
    }

    /// 分诊在空语料下退回默认疗法
    pub fn record_degraded_selection(&self) {
        self.degraded_selections.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_medical_record(&self) {
        self.records_written.fetch_add(1, Ordering::SeqCst);
    }

    /// 生成 Prometheus 格式指标
    pub fn gather(&self) -> String {
        format!(
            r#"# HELP sessions_started_total Counseling sessions started
# TYPE sessions_started_total counter
sessions_started_total {}
# HELP sessions_active Active counseling sessions
# TYPE sessions_active gauge
sessions_active {}
# HELP sessions_closed_total Counseling sessions closed normally
# TYPE sessions_closed_total counter
sessions_closed_total {}
# HELP sessions_cancelled_total Counseling sessions cancelled
# TYPE sessions_cancelled_total counter
sessions_cancelled_total {}
# HELP turns_total Visitor turns processed
# TYPE turns_total counter
turns_total {}
# HELP generation_fallbacks_total Replies degraded to scripted text
# TYPE generation_fallbacks_total counter
generation_fallbacks_total {}
# HELP degraded_selections_total Therapist selections degraded to default
# TYPE degraded_selections_total counter
degraded_selections_total {}
# HELP medical_records_total Medical records written
# TYPE medical_records_total counter
medical_records_total {}
"#,
            self.sessions_started.load(Ordering::SeqCst),
            self.sessions_active.load(Ordering::SeqCst),
            self.sessions_closed.load(Ordering::SeqCst),
            self.sessions_cancelled.load(Ordering::SeqCst),
            self.turns_total.load(Ordering::SeqCst),
            self.generation_fallbacks.load(Ordering::SeqCst),
            self.degraded_selections.load(Ordering::SeqCst),
            self.records_written.load(Ordering::SeqCst),
        )
    }
}

/// 健康检查与指标的共享状态
#[derive(Clone)]
pub struct ObservabilityState {
    pub metrics: Arc<AppMetrics>,
    pub start_time: DateTime<Utc>,
    pub version: String,
}

impl ObservabilityState {
    pub fn new(version: String) -> Self {
        Self {
            metrics: Arc::new(AppMetrics::default()),
            start_time: Utc::now(),
            version,
        }
    }

    pub fn uptime_seconds(&self) -> f64 {
        (Utc::now() - self.start_time).num_seconds() as f64
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: f64,
}

pub async fn health_check(
    state: axum::extract::State<Arc<ObservabilityState>>,
) -> impl IntoResponse {
    Json(HealthStatus {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: state.version.clone(),
        uptime_seconds: state.uptime_seconds(),
    })
}

pub async fn liveness() -> impl IntoResponse {
    "OK"
}

pub async fn metrics(state: axum::extract::State<Arc<ObservabilityState>>) -> impl IntoResponse {
    (axum::http::StatusCode::OK, state.metrics.gather())
}

pub async fn version(state: axum::extract::State<Arc<ObservabilityState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "version": state.version,
        "uptime_seconds": state.uptime_seconds(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// 创建可观测性路由
pub fn create_observability_router(state: Arc<ObservabilityState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
        .route("/metrics", get(metrics))
        .route("/version", get(version))
        .with_state(state)
}
