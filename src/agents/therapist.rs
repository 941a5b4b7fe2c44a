//! 咨询师智能体
//!
//! 由疗法描述符配置的通用咨询师：同一套生成逻辑，喂不同的
//! 疗法设定与阶段引导就是不同的咨询师。生成失败时降级到
//! 当前阶段的脚本化子问题。

use std::sync::Arc;

use tracing::warn;

use crate::agents::llm::{generate_with_retry, ChatModel};
use crate::agents::text::clean_numbering;
use crate::models::session::Session;
use crate::models::skill::SkillEntry;
use crate::models::stage::StageSpec;
use crate::models::therapist::TherapistDescriptor;
use crate::observability::AppMetrics;

pub struct TherapistAgent {
    descriptor: TherapistDescriptor,
    llm: Arc<dyn ChatModel>,
    max_retries: u32,
    metrics: Arc<AppMetrics>,
}

impl TherapistAgent {
    pub fn new(
        descriptor: TherapistDescriptor,
        llm: Arc<dyn ChatModel>,
        max_retries: u32,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            descriptor,
            llm,
            max_retries,
            metrics,
        }
    }

    pub fn descriptor(&self) -> &TherapistDescriptor {
        &self.descriptor
    }

    fn system_prompt(&self) -> String {
        format!(
            "你是{}，擅长{}。咨询风格：{}。回复温和简短，一次只推进一小步，结尾带一个开放式问题。",
            self.descriptor.name,
            self.descriptor.expertise.join("、"),
            self.descriptor.style,
        )
    }

    /// 生成一轮咨询回复
    ///
    /// 以当前阶段的引导子问题为目标，生成失败时直接使用该子问题
    /// 作为脚本化回复，保证会话总能推进。
    pub async fn respond(
        &self,
        session: &Session,
        stage: &StageSpec,
        sub_question: Option<&str>,
        skills: &[SkillEntry],
    ) -> String {
        let lessons = skills
            .iter()
            .map(|s| format!("- {}", s.lesson))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "核心议题：{}\n当前阶段：{}（{}）\n本轮引导方向：{}\n来访者画像：\n{}\n最近对话：\n{}\n历史经验：\n{}\n\n给出你作为咨询师的下一句回复，只输出回复本身。",
            session.topics.core_name().unwrap_or("未明确"),
            stage.name,
            stage.description,
            sub_question.unwrap_or("自由推进"),
            session.portrait.render(),
            session.recent_dialogue(6),
            if lessons.is_empty() { "（无）".to_string() } else { lessons },
        );

        match generate_with_retry(
            self.llm.as_ref(),
            &self.system_prompt(),
            &prompt,
            self.max_retries,
        )
        .await
        {
            Ok(raw) => clean_numbering(&raw),
            Err(e) => {
                warn!(
                    session_id = %session.id,
                    therapist = %self.descriptor.id,
                    error = %e,
                    "therapist generation failed, using scripted sub-question"
                );
                self.metrics.record_generation_fallback();
                self.fallback_response(sub_question)
            }
        }
    }

    /// 脚本化回复：优先用阶段子问题，没有时用通用引导语
    pub fn fallback_response(&self, sub_question: Option<&str>) -> String {
        match sub_question {
            Some(q) => q.to_string(),
            None => "我们慢慢来，能再多说一点你的感受吗？".to_string(),
        }
    }
}

pub fn create_therapist_agent(
    descriptor: TherapistDescriptor,
    llm: Arc<dyn ChatModel>,
    max_retries: u32,
    metrics: Arc<AppMetrics>,
) -> TherapistAgent {
    TherapistAgent::new(descriptor, llm, max_retries, metrics)
}
