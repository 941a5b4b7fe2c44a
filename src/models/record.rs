//! 量表测评与病历记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 内置量表
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScaleKind {
    /// 一般健康问卷
    Ghq20,
    /// 幸福感指数量表
    Campbell,
    /// 感知压力量表
    Cpss,
}

impl ScaleKind {
    pub const ALL: [ScaleKind; 3] = [ScaleKind::Ghq20, ScaleKind::Campbell, ScaleKind::Cpss];

    pub fn label(&self) -> &'static str {
        match self {
            ScaleKind::Ghq20 => "GHQ-20 一般健康问卷",
            ScaleKind::Campbell => "Campbell 幸福感指数",
            ScaleKind::Cpss => "CPSS 感知压力量表",
        }
    }
}

/// 单份量表的作答结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScaleResult {
    pub kind: ScaleKind,
    pub total: f64,
}

/// 一次完整测评（若干量表的总分集合）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScaleBattery {
    pub results: Vec<ScaleResult>,
}

impl ScaleBattery {
    pub fn record(&mut self, kind: ScaleKind, total: f64) {
        match self.results.iter_mut().find(|r| r.kind == kind) {
            Some(existing) => existing.total = total,
            None => self.results.push(ScaleResult { kind, total }),
        }
    }

    pub fn total(&self) -> f64 {
        self.results.iter().map(|r| r.total).sum()
    }

    pub fn is_complete(&self) -> bool {
        ScaleKind::ALL
            .iter()
            .all(|k| self.results.iter().any(|r| r.kind == *k))
    }
}

/// 疗后相对疗前的总分改善（分数越高代表症状越重，改善为正）
pub fn improvement_score(pre: &ScaleBattery, post: &ScaleBattery) -> f64 {
    pre.total() - post.total()
}

/// 病历记录
///
/// 会话关闭时一次性写入，之后不可变更；以 session_id 去重保证
/// 重试落库不会产生重复病历。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub subject_id: String,
    /// 采用的疗法类型，如 "cbt"
    pub therapy_type: String,
    pub core_topic: String,
    pub pre_scales: ScaleBattery,
    pub post_scales: ScaleBattery,
    pub improvement: f64,
    /// 咨询过程摘要
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl MedicalRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: Uuid,
        subject_id: impl Into<String>,
        therapy_type: impl Into<String>,
        core_topic: impl Into<String>,
        pre_scales: ScaleBattery,
        post_scales: ScaleBattery,
        summary: impl Into<String>,
    ) -> Self {
        let improvement = improvement_score(&pre_scales, &post_scales);
        Self {
            id: Uuid::new_v4(),
            session_id,
            subject_id: subject_id.into(),
            therapy_type: therapy_type.into(),
            core_topic: core_topic.into(),
            pre_scales,
            post_scales,
            improvement,
            summary: summary.into(),
            created_at: Utc::now(),
        }
    }
}
