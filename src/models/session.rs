//! 会话实体与环节状态机
//!
//! 环节图是线性的：Init → Greeting → PreScale → Profiling →
//! ProfileReview → TherapistSelection → Therapy → PostScale →
//! Evaluation → Closed。非法跳转在模型层直接拒绝，编排器只负责
//! 在合法转移之后落一次快照。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::portrait::Portrait;
use crate::models::record::ScaleBattery;
use crate::models::stage::StageTracker;
use crate::models::topic::TopicScoreTable;

/// 会话环节
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Init,
    Greeting,
    PreScale,
    Profiling,
    ProfileReview,
    TherapistSelection,
    Therapy,
    PostScale,
    Evaluation,
    Closed,
}

impl SessionPhase {
    /// 线性环节图中的下一环节
    pub fn next(&self) -> Option<SessionPhase> {
        use SessionPhase::*;
        match self {
            Init => Some(Greeting),
            Greeting => Some(PreScale),
            PreScale => Some(Profiling),
            Profiling => Some(ProfileReview),
            ProfileReview => Some(TherapistSelection),
            TherapistSelection => Some(Therapy),
            Therapy => Some(PostScale),
            PostScale => Some(Evaluation),
            Evaluation => Some(Closed),
            Closed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Closed)
    }

    pub fn label(&self) -> &'static str {
        use SessionPhase::*;
        match self {
            Init => "初始化",
            Greeting => "开场问候",
            PreScale => "疗前测评",
            Profiling => "档案采集",
            ProfileReview => "档案复核",
            TherapistSelection => "咨询师分诊",
            Therapy => "正式咨询",
            PostScale => "疗后测评",
            Evaluation => "总结评估",
            Closed => "已结束",
        }
    }
}

/// 会话运行模式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// 真实来访者交互
    #[default]
    Interactive,
    /// 批量训练（模拟来访者驱动）
    Training,
}

/// 发言方
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Visitor,
    Counselor,
}

/// 一轮对话中的一条发言
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueEntry {
    pub speaker: Speaker,
    pub content: String,
    /// 所属轮次，从 1 开始
    pub turn: u32,
    pub timestamp: DateTime<Utc>,
}

/// 咨询会话
///
/// 整个可变工作集都在这里：对话史、画像、话题分、阶段状态、量表。
/// 每次合法环节转移后整体序列化落库，崩溃后可从快照恢复。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub subject_id: String,
    pub mode: SessionMode,
    pub phase: SessionPhase,
    /// 全局轮次计数，来访者每发言一次加一
    pub turn: u32,
    /// 档案采集环节已消耗的轮次
    pub profile_turns: u32,
    pub profile_complete: bool,
    /// 档案质量评分 [0,1]
    pub profile_quality: f64,
    pub dialogue: Vec<DialogueEntry>,
    pub portrait: Portrait,
    pub topics: TopicScoreTable,
    pub stages: StageTracker,
    pub pre_scales: ScaleBattery,
    pub post_scales: ScaleBattery,
    /// 分诊选定的疗法类型
    pub selected_therapy: Option<String>,
    /// 病历是否已写入（重试去重标志）
    pub record_written: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(subject_id: impl Into<String>, mode: SessionMode) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            subject_id: subject_id.into(),
            mode,
            phase: SessionPhase::Init,
            turn: 0,
            profile_turns: 0,
            profile_complete: false,
            profile_quality: 0.0,
            dialogue: Vec::new(),
            portrait: Portrait::new(),
            topics: TopicScoreTable::new(),
            stages: StageTracker::new(),
            pre_scales: ScaleBattery::default(),
            post_scales: ScaleBattery::default(),
            selected_therapy: None,
            record_written: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.phase.is_terminal()
    }

    /// 推进到线性环节图中的下一环节
    pub fn advance_phase(&mut self) -> Result<SessionPhase, AppError> {
        let next = self.phase.next().ok_or_else(|| {
            AppError::Validation(format!("会话 {} 已结束，无法继续推进", self.id))
        })?;
        self.phase = next;
        self.updated_at = Utc::now();
        Ok(next)
    }

    /// 中止会话：跳过剩余环节直接关闭，不做总结评估
    pub fn abort(&mut self) {
        self.phase = SessionPhase::Closed;
        self.updated_at = Utc::now();
    }

    /// 记录来访者发言并推进全局轮次
    pub fn push_visitor(&mut self, content: impl Into<String>) {
        self.turn += 1;
        self.dialogue.push(DialogueEntry {
            speaker: Speaker::Visitor,
            content: content.into(),
            turn: self.turn,
            timestamp: Utc::now(),
        });
        self.updated_at = Utc::now();
    }

    /// 记录咨询侧发言（不推进轮次）
    pub fn push_counselor(&mut self, content: impl Into<String>) {
        self.dialogue.push(DialogueEntry {
            speaker: Speaker::Counselor,
            content: content.into(),
            turn: self.turn,
            timestamp: Utc::now(),
        });
        self.updated_at = Utc::now();
    }

    /// 最近 n 轮对话的纯文本，供提示词拼接
    pub fn recent_dialogue(&self, n: usize) -> String {
        let skip = self.dialogue.len().saturating_sub(n);
        self.dialogue[skip..]
            .iter()
            .map(|e| {
                let who = match e.speaker {
                    Speaker::Visitor => "来访者",
                    Speaker::Counselor => "咨询师",
                };
                format!("{who}：{}", e.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 来访者最后一条发言
    pub fn last_visitor_utterance(&self) -> Option<&str> {
        self.dialogue
            .iter()
            .rev()
            .find(|e| e.speaker == Speaker::Visitor)
            .map(|e| e.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_chain_is_linear_and_terminal() {
        let mut phase = SessionPhase::Init;
        let mut hops = 0;
        while let Some(next) = phase.next() {
            phase = next;
            hops += 1;
        }
        assert_eq!(phase, SessionPhase::Closed);
        assert_eq!(hops, 9);
    }

    #[test]
    fn test_advance_past_closed_is_rejected() {
        let mut session = Session::new("s-001", SessionMode::Interactive);
        while !session.is_closed() {
            session.advance_phase().unwrap();
        }
        assert!(matches!(
            session.advance_phase(),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_visitor_utterance_advances_turn() {
        let mut session = Session::new("s-001", SessionMode::Interactive);
        session.push_visitor("最近睡不好");
        session.push_counselor("能具体说说吗？");
        session.push_visitor("一闭眼就想考试的事");

        assert_eq!(session.turn, 2);
        assert_eq!(session.last_visitor_utterance(), Some("一闭眼就想考试的事"));
    }

    #[test]
    fn test_recent_dialogue_window() {
        let mut session = Session::new("s-001", SessionMode::Interactive);
        for i in 0..5 {
            session.push_visitor(format!("第{i}句"));
        }
        let text = session.recent_dialogue(2);
        assert!(text.contains("第3句"));
        assert!(text.contains("第4句"));
        assert!(!text.contains("第2句"));
    }

    #[test]
    fn test_session_snapshot_roundtrip() {
        let mut session = Session::new("s-001", SessionMode::Training);
        session.push_visitor("你好");
        session.advance_phase().unwrap();

        let json = serde_json::to_string(&session).unwrap();
        let restored: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.id, session.id);
        assert_eq!(restored.phase, SessionPhase::Greeting);
        assert_eq!(restored.turn, 1);
    }
}
