//! 技能经验库
//!
//! 会话结束后按角色沉淀的经验条目：档案师一份、所采用疗法的咨询师一份。
//! 只追加，供后续会话的提示词召回。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 技能归属角色
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SkillRole {
    /// 档案师
    Profiler,
    /// 具体疗法的咨询师，值为疗法类型（如 "cbt"）
    Therapist(String),
}

impl SkillRole {
    /// 存储集合名，一类角色一个集合
    pub fn collection(&self) -> String {
        match self {
            SkillRole::Profiler => "profiler_skills".to_string(),
            SkillRole::Therapist(therapy) => format!("therapist_{therapy}_skills"),
        }
    }
}

/// 一条技能经验
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillEntry {
    pub id: Uuid,
    pub role: SkillRole,
    pub session_id: Uuid,
    /// 本次会话总结出的经验教训
    pub lesson: String,
    /// 会话成效（量表改善分），用于判断经验可信度
    pub outcome: f64,
    pub created_at: DateTime<Utc>,
}

impl SkillEntry {
    pub fn new(role: SkillRole, session_id: Uuid, lesson: impl Into<String>, outcome: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            session_id,
            lesson: lesson.into(),
            outcome,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_collection_names() {
        assert_eq!(SkillRole::Profiler.collection(), "profiler_skills");
        assert_eq!(
            SkillRole::Therapist("cbt".into()).collection(),
            "therapist_cbt_skills"
        );
        assert_eq!(
            SkillRole::Therapist("psychodynamic".into()).collection(),
            "therapist_psychodynamic_skills"
        );
    }
}
