//! 督导智能体
//!
//! 会话流程里所有「判定」都由它出：话题相关性、阶段完成度、
//! 档案完整性、核心议题、总结与经验沉淀。判定失败一律取保守
//! 默认值，绝不让评估环节卡死会话推进。

use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::agents::llm::{generate_with_retry, parse_json_payload, ChatModel};
use crate::agents::text::clean_numbering;
use crate::error::Result;
use crate::models::session::Session;
use crate::models::stage::StageSpec;
use crate::models::topic::Relevance;
use crate::observability::AppMetrics;

const SYSTEM: &str = "你是心理咨询流程的督导，负责对对话做结构化判定。只输出要求的 JSON，不要任何多余文字。";

/// 话题相关性判定结果
#[derive(Debug, Clone)]
pub struct RelevanceAssessment {
    pub relevance: Relevance,
    /// relevance 为 other 时给出的新话题名
    pub new_topic: Option<String>,
}

/// 档案完整性判定结果
#[derive(Debug, Clone, Copy)]
pub struct ProfileAssessment {
    pub complete: bool,
    /// 质量评分 [0,1]
    pub quality: f64,
}

#[derive(Deserialize)]
struct RelevanceReply {
    relevance: Relevance,
    #[serde(default)]
    new_topic: Option<String>,
}

#[derive(Deserialize)]
struct StageReply {
    #[serde(default)]
    satisfied: Vec<String>,
}

#[derive(Deserialize)]
struct ProfileReply {
    complete: bool,
    #[serde(default)]
    quality: f64,
}

pub struct SupervisorAgent {
    llm: Arc<dyn ChatModel>,
    max_retries: u32,
    metrics: Arc<AppMetrics>,
}

impl SupervisorAgent {
    pub fn new(llm: Arc<dyn ChatModel>, max_retries: u32, metrics: Arc<AppMetrics>) -> Self {
        Self {
            llm,
            max_retries,
            metrics,
        }
    }

    async fn judge(&self, prompt: &str) -> Result<String> {
        generate_with_retry(self.llm.as_ref(), SYSTEM, prompt, self.max_retries).await
    }

    /// 判定来访者最新发言与已知话题的关联程度
    ///
    /// 判定失败时回退为「无增量信息」（不调分、不注册新话题）。
    pub async fn classify_relevance(
        &self,
        session: &Session,
        known_topics: &[String],
    ) -> RelevanceAssessment {
        let prompt = format!(
            "已知话题列表：{}\n最近对话：\n{}\n\n判断来访者最新发言与已知话题的关系，输出 JSON：\n{{\"relevance\": \"high|medium|none|other\", \"new_topic\": \"仅当出现全新话题时给出话题名，否则为 null\"}}\nhigh=深入展开已知话题；medium=提及已知话题；none=与已知话题无关且无新话题；other=出现了列表之外的新话题。",
            known_topics.join("、"),
            session.recent_dialogue(6),
        );

        match self.judge(&prompt).await.and_then(|raw| {
            parse_json_payload::<RelevanceReply>(&raw)
        }) {
            Ok(reply) => RelevanceAssessment {
                relevance: reply.relevance,
                new_topic: reply.new_topic.filter(|t| !t.trim().is_empty()),
            },
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "relevance judgement failed, treating turn as neutral");
                self.metrics.record_generation_fallback();
                // Other 且无新话题名是中性结果：不调分、不注册
                RelevanceAssessment {
                    relevance: Relevance::Other,
                    new_topic: None,
                }
            }
        }
    }

    /// 判定当前阶段有哪些完成要素已被本轮对话满足
    ///
    /// 判定失败时返回空集，阶段推进依靠轮次预算兜底。
    pub async fn evaluate_stage_completion(
        &self,
        session: &Session,
        spec: &StageSpec,
    ) -> Vec<String> {
        let prompt = format!(
            "当前咨询阶段：{}（{}）\n完成要素清单：{}\n最近对话：\n{}\n\n列出清单中已经被对话满足的要素，输出 JSON：{{\"satisfied\": [\"要素名\", ...]}}。没有满足任何要素时输出空数组。",
            spec.name,
            spec.description,
            spec.criteria.join("、"),
            session.recent_dialogue(6),
        );

        match self
            .judge(&prompt)
            .await
            .and_then(|raw| parse_json_payload::<StageReply>(&raw))
        {
            Ok(reply) => reply.satisfied,
            Err(e) => {
                warn!(session_id = %session.id, stage = %spec.name, error = %e, "stage evaluation failed, no criteria marked");
                self.metrics.record_generation_fallback();
                Vec::new()
            }
        }
    }

    /// 判定画像是否已足够支撑分诊
    ///
    /// 判定失败时视为未完成，由轮次上限兜底退出档案环节。
    pub async fn check_profile_complete(&self, session: &Session) -> ProfileAssessment {
        let prompt = format!(
            "来访者画像：\n{}\n最近对话：\n{}\n\n判断画像是否已覆盖事件、情绪、行为三方面且足以进行分诊，输出 JSON：{{\"complete\": true|false, \"quality\": 0.0到1.0}}",
            session.portrait.render(),
            session.recent_dialogue(4),
        );

        match self
            .judge(&prompt)
            .await
            .and_then(|raw| parse_json_payload::<ProfileReply>(&raw))
        {
            Ok(reply) => ProfileAssessment {
                complete: reply.complete,
                quality: reply.quality.clamp(0.0, 1.0),
            },
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "profile check failed, assuming incomplete");
                self.metrics.record_generation_fallback();
                ProfileAssessment {
                    complete: false,
                    quality: 0.0,
                }
            }
        }
    }

    /// 从画像对话中提取核心议题，失败时退回配置的兜底话题
    pub async fn extract_core_topic(&self, session: &Session, fallback: &str) -> String {
        let prompt = format!(
            "来访者画像：\n{}\n\n用不超过八个字概括来访者的核心困扰，直接输出短语本身。",
            session.portrait.render(),
        );

        match self.judge(&prompt).await {
            Ok(raw) => {
                let topic = clean_numbering(&raw);
                if topic.is_empty() {
                    fallback.to_string()
                } else {
                    topic
                }
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "core topic extraction failed, using fallback topic");
                self.metrics.record_generation_fallback();
                fallback.to_string()
            }
        }
    }

    /// 生成整次会话的咨询过程摘要，失败时给出模板化摘要
    pub async fn summarize_session(&self, session: &Session) -> String {
        let prompt = format!(
            "核心议题：{}\n采用疗法：{}\n完整对话：\n{}\n\n用三到五句话总结本次咨询的过程与效果，直接输出摘要文本。",
            session
                .topics
                .core_name()
                .unwrap_or("未明确"),
            session.selected_therapy.as_deref().unwrap_or("未分诊"),
            session.recent_dialogue(usize::MAX),
        );

        match self.judge(&prompt).await {
            Ok(raw) => clean_numbering(&raw),
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "session summary failed, using template");
                self.metrics.record_generation_fallback();
                format!(
                    "围绕「{}」完成一次{}会话，共 {} 轮对话。",
                    session.topics.core_name().unwrap_or("情绪困扰"),
                    session.selected_therapy.as_deref().unwrap_or("咨询"),
                    session.turn,
                )
            }
        }
    }

    /// 沉淀一条角色经验，失败时给出模板化经验
    pub async fn distill_lesson(&self, session: &Session, role_label: &str) -> String {
        let prompt = format!(
            "角色：{}\n核心议题：{}\n完整对话：\n{}\n\n站在该角色的角度总结一条下次可复用的经验，一句话，直接输出。",
            role_label,
            session.topics.core_name().unwrap_or("未明确"),
            session.recent_dialogue(usize::MAX),
        );

        match self.judge(&prompt).await {
            Ok(raw) => clean_numbering(&raw),
            Err(e) => {
                warn!(session_id = %session.id, role = role_label, error = %e, "lesson distillation failed, using template");
                self.metrics.record_generation_fallback();
                format!(
                    "处理「{}」类议题时注意循序渐进、先共情再引导。",
                    session.topics.core_name().unwrap_or("情绪困扰"),
                )
            }
        }
    }
}

pub fn create_supervisor_agent(
    llm: Arc<dyn ChatModel>,
    max_retries: u32,
    metrics: Arc<AppMetrics>,
) -> SupervisorAgent {
    SupervisorAgent::new(llm, max_retries, metrics)
}
