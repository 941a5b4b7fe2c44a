//! 会话 DTO
//!
//! 定义会话相关的请求和响应数据结构。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::record::ScaleKind;
use crate::models::session::{Session, SessionMode, SessionPhase};
use crate::services::orchestrator::TurnReply;

/// 创建会话请求
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// 来访者标识
    pub subject_id: String,
    /// 运行模式，缺省为交互模式
    #[serde(default)]
    pub mode: SessionMode,
}

/// 来访者发言请求
#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub content: String,
}

/// 量表分数提交请求
#[derive(Debug, Deserialize)]
pub struct SubmitScalesRequest {
    pub scores: Vec<ScaleScoreDto>,
}

#[derive(Debug, Deserialize)]
pub struct ScaleScoreDto {
    pub kind: ScaleKind,
    pub total: f64,
}

/// 一次交互的响应
#[derive(Debug, Serialize)]
pub struct TurnReplyResponse {
    pub session_id: Uuid,
    pub phase: SessionPhase,
    pub reply: String,
    pub closed: bool,
}

impl From<TurnReply> for TurnReplyResponse {
    fn from(reply: TurnReply) -> Self {
        Self {
            session_id: reply.session_id,
            phase: reply.phase,
            reply: reply.reply,
            closed: reply.closed,
        }
    }
}

/// 会话概要
#[derive(Debug, Serialize)]
pub struct SessionSummaryResponse {
    pub id: Uuid,
    pub subject_id: String,
    pub mode: SessionMode,
    pub phase: SessionPhase,
    pub turn: u32,
    pub selected_therapy: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummaryResponse {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            subject_id: session.subject_id.clone(),
            mode: session.mode,
            phase: session.phase,
            turn: session.turn,
            selected_therapy: session.selected_therapy.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}

/// 会话详情（含话题分与画像）
#[derive(Debug, Serialize)]
pub struct SessionDetailResponse {
    #[serde(flatten)]
    pub summary: SessionSummaryResponse,
    pub core_topic: Option<String>,
    pub topics: Vec<TopicDto>,
    pub portrait: String,
    pub profile_complete: bool,
}

#[derive(Debug, Serialize)]
pub struct TopicDto {
    pub name: String,
    pub score: i32,
    pub visits: u32,
}

impl From<&Session> for SessionDetailResponse {
    fn from(session: &Session) -> Self {
        Self {
            summary: session.into(),
            core_topic: session.topics.core_name().map(String::from),
            topics: session
                .topics
                .entries()
                .iter()
                .map(|t| TopicDto {
                    name: t.name.clone(),
                    score: t.score,
                    visits: t.visits,
                })
                .collect(),
            portrait: session.portrait.render(),
            profile_complete: session.profile_complete,
        }
    }
}
