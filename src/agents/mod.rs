//! 智能体模块
//!
//! 督导、档案师、咨询师共用同一个对话模型抽象，各自携带
//! 自己的系统设定与降级策略。

pub mod llm;
pub mod profiler;
pub mod supervisor;
pub mod text;
pub mod therapist;

pub use llm::{generate_with_retry, parse_json_payload, ChatModel, OpenAiChatModel};
pub use profiler::{create_profiler_agent, ProfilerAgent};
pub use supervisor::{
    create_supervisor_agent, ProfileAssessment, RelevanceAssessment, SupervisorAgent,
};
pub use text::{clean_numbering, strip_code_fence};
pub use therapist::{create_therapist_agent, TherapistAgent};
