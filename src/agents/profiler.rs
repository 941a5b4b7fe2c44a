//! 档案师智能体
//!
//! 档案环节的提问方：从来访者发言中抽取画像事实，并决定下一个
//! 采集问题。发言生成失败时降级到脚本化问句，画像抽取失败时
//! 返回空增量。

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::agents::llm::{generate_with_retry, parse_json_payload, ChatModel};
use crate::agents::text::clean_numbering;
use crate::models::portrait::{PortraitCategory, PortraitDelta};
use crate::models::session::Session;
use crate::models::skill::SkillEntry;
use crate::observability::AppMetrics;

const SYSTEM: &str = "你是心理咨询机构的档案师，负责在正式咨询前温和地了解来访者的基本情况。提问简短、每次只问一件事。";

/// 画像抽取失败或无新信息时的兜底问句
const FALLBACK_QUESTIONS: [&str; 3] = [
    "能再多说说当时发生了什么吗？",
    "那段时间你的心情大概是什么样的？",
    "遇到这种情况时，你一般会怎么做？",
];

#[derive(Deserialize)]
struct PortraitReply {
    #[serde(default)]
    facts: Vec<FactReply>,
}

#[derive(Deserialize)]
struct FactReply {
    category: PortraitCategory,
    content: String,
}

pub struct ProfilerAgent {
    llm: Arc<dyn ChatModel>,
    max_retries: u32,
    metrics: Arc<AppMetrics>,
}

impl ProfilerAgent {
    pub fn new(llm: Arc<dyn ChatModel>, max_retries: u32, metrics: Arc<AppMetrics>) -> Self {
        Self {
            llm,
            max_retries,
            metrics,
        }
    }

    /// 从来访者最新发言中抽取画像增量，失败时返回空增量
    pub async fn extract_portrait(&self, session: &Session) -> PortraitDelta {
        let Some(utterance) = session.last_visitor_utterance() else {
            return PortraitDelta::default();
        };

        let prompt = format!(
            "来访者刚说：「{utterance}」\n\n从中抽取画像事实，输出 JSON：\n{{\"facts\": [{{\"category\": \"events|emotions|behaviors|relationships\", \"content\": \"一句话事实\"}}]}}\n没有可抽取的信息时输出空数组。",
        );

        match generate_with_retry(self.llm.as_ref(), SYSTEM, &prompt, self.max_retries)
            .await
            .and_then(|raw| parse_json_payload::<PortraitReply>(&raw))
        {
            Ok(reply) => PortraitDelta {
                facts: reply
                    .facts
                    .into_iter()
                    .map(|f| (f.category, f.content))
                    .collect(),
            },
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "portrait extraction failed, empty delta");
                self.metrics.record_generation_fallback();
                PortraitDelta::default()
            }
        }
    }

    /// 生成下一个采集问题；生成失败时轮换脚本化问句
    pub async fn next_question(&self, session: &Session, skills: &[SkillEntry]) -> String {
        let lessons = skills
            .iter()
            .map(|s| format!("- {}", s.lesson))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "当前画像：\n{}\n最近对话：\n{}\n历史经验：\n{}\n\n提出下一个了解来访者情况的问题，只输出问题本身。",
            session.portrait.render(),
            session.recent_dialogue(4),
            if lessons.is_empty() { "（无）".to_string() } else { lessons },
        );

        match generate_with_retry(self.llm.as_ref(), SYSTEM, &prompt, self.max_retries).await {
            Ok(raw) => clean_numbering(&raw),
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "profiler question generation failed, using scripted question");
                self.metrics.record_generation_fallback();
                self.fallback_question(session.profile_turns)
            }
        }
    }

    /// 脚本化问句，按档案轮次轮换
    pub fn fallback_question(&self, profile_turn: u32) -> String {
        FALLBACK_QUESTIONS[(profile_turn as usize) % FALLBACK_QUESTIONS.len()].to_string()
    }
}

pub fn create_profiler_agent(
    llm: Arc<dyn ChatModel>,
    max_retries: u32,
    metrics: Arc<AppMetrics>,
) -> ProfilerAgent {
    ProfilerAgent::new(llm, max_retries, metrics)
}
