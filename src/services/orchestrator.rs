//! 会话编排服务
//!
//! 整条咨询流水线的驱动者：环节状态机、话题计分、阶段推进、
//! 分诊、收尾评估。单个会话内严格串行，每次合法环节转移之后
//! 落一次快照，崩溃后可从快照恢复继续。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::llm::ChatModel;
use crate::agents::profiler::ProfilerAgent;
use crate::agents::supervisor::SupervisorAgent;
use crate::agents::therapist::TherapistAgent;
use crate::config::CounselingConfig;
use crate::error::{AppError, Result};
use crate::index::{EmbeddingModel, VectorIndex, VectorMetadata};
use crate::models::record::{MedicalRecord, ScaleKind};
use crate::models::session::{Session, SessionMode, SessionPhase};
use crate::models::skill::{SkillEntry, SkillRole};
use crate::models::stage::{StageCatalog, StageProgress};
use crate::models::therapist::TherapistCatalog;
use crate::models::topic::Relevance;
use crate::observability::AppMetrics;
use crate::services::selector::{SelectionOutcome, TherapistSelector};
use crate::storage::MemoryStore;

const GREETING: &str = "你好，欢迎来到心理咨询室。这里是安全的空间，我们会先做几份简短的量表，再慢慢了解你的情况。想先随便聊两句吗？";
const PRE_SCALE_PROMPT: &str = "在正式开始前，请完成三份量表：GHQ-20 一般健康问卷、Campbell 幸福感指数、CPSS 感知压力量表。提交分数后我们继续。";
const POST_SCALE_PROMPT: &str = "今天的咨询就到这里。请再完成一次三份量表，让我们看看这段时间的变化。";
const SCALE_REMINDER: &str = "请先提交量表分数，我们再继续。";

/// 每次召回的历史经验条数
const SKILL_RECALL_LIMIT: usize = 3;

/// 一次交互的返回
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub session_id: Uuid,
    pub phase: SessionPhase,
    pub reply: String,
    pub closed: bool,
}

pub struct SessionOrchestrator {
    store: Arc<dyn MemoryStore>,
    index: Arc<dyn VectorIndex>,
    embedding: Arc<dyn EmbeddingModel>,
    supervisor: SupervisorAgent,
    profiler: ProfilerAgent,
    therapists: HashMap<String, TherapistAgent>,
    selector: TherapistSelector,
    stage_catalog: StageCatalog,
    config: CounselingConfig,
    metrics: Arc<AppMetrics>,
    /// 取消标志，在环节边界检查
    cancel_flags: DashMap<Uuid, Arc<AtomicBool>>,
}

impl SessionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn MemoryStore>,
        index: Arc<dyn VectorIndex>,
        embedding: Arc<dyn EmbeddingModel>,
        llm: Arc<dyn ChatModel>,
        config: CounselingConfig,
        max_retries: u32,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        let catalog = TherapistCatalog::new(config.therapists.clone());
        let therapists = config
            .therapists
            .iter()
            .map(|d| {
                (
                    d.id.clone(),
                    TherapistAgent::new(d.clone(), llm.clone(), max_retries, metrics.clone()),
                )
            })
            .collect();
        let selector = TherapistSelector::new(
            catalog,
            index.clone(),
            embedding.clone(),
            config.selection.clone(),
        );

        Self {
            store,
            index,
            embedding,
            supervisor: SupervisorAgent::new(llm.clone(), max_retries, metrics.clone()),
            profiler: ProfilerAgent::new(llm, max_retries, metrics.clone()),
            therapists,
            selector,
            stage_catalog: StageCatalog::with_turn_budget(config.stage_turn_budget),
            config,
            metrics,
            cancel_flags: DashMap::new(),
        }
    }

    /// 快照落库，持久化失败时原地幂等重试一次
    async fn persist(&self, session: &Session) -> Result<()> {
        if let Err(e) = self.store.save_session(session).await {
            warn!(session_id = %session.id, error = %e, "snapshot persist failed, retrying once");
            self.store.save_session(session).await?;
        }
        Ok(())
    }

    async fn load(&self, session_id: Uuid) -> Result<Session> {
        self.store
            .load_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("会话不存在: {session_id}")))
    }

    /// 经验召回尽力而为：读失败降级为空列表，绝不阻断当前轮
    async fn recall_skills(&self, session_id: Uuid, role: &SkillRole) -> Vec<SkillEntry> {
        match self.store.recall_skills(role, SKILL_RECALL_LIMIT).await {
            Ok(skills) => skills,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "skill recall failed, proceeding without lessons");
                Vec::new()
            }
        }
    }

    fn cancel_flag(&self, session_id: Uuid) -> Arc<AtomicBool> {
        self.cancel_flags
            .entry(session_id)
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    /// 环节边界的取消检查；命中时关闭会话并落快照
    async fn check_cancelled(&self, session: &mut Session) -> Result<()> {
        if self.cancel_flag(session.id).load(Ordering::SeqCst) {
            session.abort();
            self.persist(session).await?;
            self.metrics.record_session_cancelled();
            self.cancel_flags.remove(&session.id);
            return Err(AppError::Cancelled(session.id.to_string()));
        }
        Ok(())
    }

    /// 开启新会话
    pub async fn start(&self, subject_id: &str, mode: SessionMode) -> Result<TurnReply> {
        let mut session = Session::new(subject_id, mode);
        self.persist(&session).await?;

        session.advance_phase()?; // Init -> Greeting
        session.push_counselor(GREETING);
        self.persist(&session).await?;

        self.metrics.record_session_started();
        info!(session_id = %session.id, subject_id, "session started");

        Ok(TurnReply {
            session_id: session.id,
            phase: session.phase,
            reply: GREETING.to_string(),
            closed: false,
        })
    }

    /// 从快照恢复一个未结束的会话
    pub async fn resume(&self, session_id: Uuid) -> Result<Session> {
        let session = self.load(session_id).await?;
        if session.is_closed() {
            return Err(AppError::Validation(format!("会话已结束: {session_id}")));
        }
        info!(session_id = %session_id, phase = session.phase.label(), "session resumed");
        Ok(session)
    }

    /// 请求取消；在下一个环节边界生效
    pub fn cancel(&self, session_id: Uuid) {
        self.cancel_flag(session_id).store(true, Ordering::SeqCst);
        info!(session_id = %session_id, "cancellation requested");
    }

    /// 处理一次来访者发言
    pub async fn handle_turn(&self, session_id: Uuid, content: &str) -> Result<TurnReply> {
        let mut session = self.load(session_id).await?;
        if session.is_closed() {
            return Err(AppError::Validation(format!("会话已结束: {session_id}")));
        }
        self.check_cancelled(&mut session).await?;

        let reply = match session.phase {
            SessionPhase::Init | SessionPhase::Greeting => {
                session.push_visitor(content);
                if session.phase == SessionPhase::Init {
                    session.advance_phase()?; // Init -> Greeting
                }
                session.advance_phase()?; // Greeting -> PreScale
                PRE_SCALE_PROMPT.to_string()
            }
            SessionPhase::PreScale | SessionPhase::PostScale => {
                session.push_visitor(content);
                SCALE_REMINDER.to_string()
            }
            SessionPhase::Profiling => {
                session.push_visitor(content);
                self.metrics.record_turn();
                self.profiling_turn(&mut session).await?
            }
            SessionPhase::ProfileReview | SessionPhase::TherapistSelection => {
                // 恢复到自动环节时补跑分诊链
                session.push_visitor(content);
                self.run_triage(&mut session).await?
            }
            SessionPhase::Therapy => {
                session.push_visitor(content);
                self.metrics.record_turn();
                self.therapy_turn(&mut session).await?
            }
            SessionPhase::Evaluation => {
                // 恢复到评估环节时补跑收尾
                self.finalize(&mut session).await?
            }
            SessionPhase::Closed => unreachable!("closed sessions are rejected above"),
        };

        session.push_counselor(&reply);
        self.persist(&session).await?;

        Ok(TurnReply {
            session_id: session.id,
            phase: session.phase,
            reply,
            closed: session.is_closed(),
        })
    }

    /// 提交量表分数；疗前齐备进入档案环节，疗后齐备触发收尾
    pub async fn submit_scales(
        &self,
        session_id: Uuid,
        scores: &[(ScaleKind, f64)],
    ) -> Result<TurnReply> {
        let mut session = self.load(session_id).await?;
        self.check_cancelled(&mut session).await?;

        let reply = match session.phase {
            SessionPhase::PreScale => {
                for (kind, total) in scores {
                    session.pre_scales.record(*kind, *total);
                }
                if session.pre_scales.is_complete() {
                    session.advance_phase()?; // PreScale -> Profiling
                    self.persist(&session).await?;
                    let skills = self.recall_skills(session.id, &SkillRole::Profiler).await;
                    self.profiler.next_question(&session, &skills).await
                } else {
                    SCALE_REMINDER.to_string()
                }
            }
            SessionPhase::PostScale => {
                for (kind, total) in scores {
                    session.post_scales.record(*kind, *total);
                }
                if session.post_scales.is_complete() {
                    session.advance_phase()?; // PostScale -> Evaluation
                    self.persist(&session).await?;
                    self.finalize(&mut session).await?
                } else {
                    SCALE_REMINDER.to_string()
                }
            }
            other => {
                return Err(AppError::Validation(format!(
                    "当前环节（{}）不接受量表提交",
                    other.label()
                )))
            }
        };

        session.push_counselor(&reply);
        self.persist(&session).await?;

        Ok(TurnReply {
            session_id: session.id,
            phase: session.phase,
            reply,
            closed: session.is_closed(),
        })
    }

    /// 档案环节的一轮：抽画像、判完整性、到点或达标就进入分诊链
    async fn profiling_turn(&self, session: &mut Session) -> Result<String> {
        let delta = self.profiler.extract_portrait(session).await;
        let turn = session.turn;
        session.portrait.absorb(delta, turn);
        session.profile_turns += 1;

        let assessment = self.supervisor.check_profile_complete(session).await;
        session.profile_quality = assessment.quality;

        if assessment.complete || session.profile_turns >= self.config.profile_max_turns {
            // 轮次上限兜底退出，此时 complete 可能仍为 false
            session.profile_complete = assessment.complete;
            session.advance_phase()?; // Profiling -> ProfileReview
            self.persist(session).await?;
            return self.run_triage(session).await;
        }

        let skills = self.recall_skills(session.id, &SkillRole::Profiler).await;
        Ok(self.profiler.next_question(session, &skills).await)
    }

    /// 分诊链：核心议题定型 → 疗法选择 → 进入正式咨询
    async fn run_triage(&self, session: &mut Session) -> Result<String> {
        self.check_cancelled(session).await?;

        if session.phase == SessionPhase::ProfileReview {
            let topic = self
                .supervisor
                .extract_core_topic(session, &self.config.fallback_topic)
                .await;
            session
                .topics
                .seed_core(&topic, self.config.initial_topic_score);
            info!(session_id = %session.id, topic = %topic, "core topic seeded");

            session.advance_phase()?; // ProfileReview -> TherapistSelection
            self.persist(session).await?;
        }

        let catalog = TherapistCatalog::new(self.config.therapists.clone());
        let outcome = match self
            .selector
            .select(&session.portrait.render(), &catalog.candidate_ids())
            .await
        {
            Ok(outcome) => outcome,
            // 嵌入服务不可用时分诊降级为默认疗法，会话照常进入咨询
            Err(AppError::Embedding(e)) => {
                warn!(session_id = %session.id, error = %e, "embedding unavailable, selection degraded to default therapy");
                SelectionOutcome {
                    therapy_type: self.config.selection.default_therapy.clone(),
                    degraded: true,
                    scores: Vec::new(),
                }
            }
            Err(e) => return Err(e),
        };
        if outcome.degraded {
            self.metrics.record_degraded_selection();
        }
        session.selected_therapy = Some(outcome.therapy_type.clone());

        session.advance_phase()?; // TherapistSelection -> Therapy
        self.persist(session).await?;

        let therapist = self.therapist_for(session)?;
        let spec = self.stage_catalog.spec(session.stages.current()).clone();
        let sub_question = session.stages.next_sub_question(&spec).map(str::to_string);
        let opening = therapist
            .respond(session, &spec, sub_question.as_deref(), &[])
            .await;

        Ok(format!(
            "接下来由{}陪你继续。{}",
            therapist.descriptor().name,
            opening
        ))
    }

    fn therapist_for(&self, session: &Session) -> Result<&TherapistAgent> {
        let therapy = session
            .selected_therapy
            .as_deref()
            .ok_or_else(|| AppError::Internal("会话尚未完成分诊".into()))?;
        self.therapists
            .get(therapy)
            .ok_or_else(|| AppError::Internal(format!("未知疗法类型: {therapy}")))
    }

    /// 正式咨询的一轮：话题计分 → 阶段评估 → 咨询师回复
    async fn therapy_turn(&self, session: &mut Session) -> Result<String> {
        // 话题计分
        let known = session.topics.names();
        let assessment = self.supervisor.classify_relevance(session, &known).await;
        match assessment.relevance {
            Relevance::Other => {
                if let Some(name) = assessment.new_topic {
                    let id = session.topics.register(&name);
                    info!(session_id = %session.id, topic = %name, "new topic registered");
                    session.topics.visit(id);
                }
            }
            relevance => {
                if let Some(core) = session.topics.core_topic() {
                    session.topics.apply_delta(core, relevance.delta());
                    session.topics.visit(core);
                }
            }
        }
        session.topics.core_topic();

        // 阶段评估与推进
        let spec = self.stage_catalog.spec(session.stages.current()).clone();
        let satisfied = self
            .supervisor
            .evaluate_stage_completion(session, &spec)
            .await;
        session.stages.mark_satisfied(&spec, &satisfied);
        session.stages.record_turn();

        match session.stages.evaluate_progress(&spec) {
            StageProgress::TherapyComplete => {
                session.advance_phase()?; // Therapy -> PostScale
                self.persist(session).await?;
                Ok(POST_SCALE_PROMPT.to_string())
            }
            progress => {
                if let StageProgress::Advanced(stage) = progress {
                    info!(session_id = %session.id, stage = stage.key(), "cbt stage advanced");
                    self.persist(session).await?;
                }
                let therapist = self.therapist_for(session)?;
                let spec = self.stage_catalog.spec(session.stages.current()).clone();
                let sub_question = session.stages.next_sub_question(&spec).map(str::to_string);
                let role =
                    SkillRole::Therapist(session.selected_therapy.clone().unwrap_or_default());
                let skills = self.recall_skills(session.id, &role).await;
                Ok(therapist
                    .respond(session, &spec, sub_question.as_deref(), &skills)
                    .await)
            }
        }
    }

    /// 收尾：病历落库（幂等）、画像入向量语料、经验沉淀、关闭会话
    async fn finalize(&self, session: &mut Session) -> Result<String> {
        self.check_cancelled(session).await?;

        let therapy = session
            .selected_therapy
            .clone()
            .unwrap_or_else(|| self.config.selection.default_therapy.clone());
        let core_topic = session
            .topics
            .core_name()
            .unwrap_or(&self.config.fallback_topic)
            .to_string();

        if !session.record_written {
            let summary = self.supervisor.summarize_session(session).await;
            let record = MedicalRecord::new(
                session.id,
                session.subject_id.clone(),
                therapy.clone(),
                core_topic.clone(),
                session.pre_scales.clone(),
                session.post_scales.clone(),
                summary,
            );

            // 病历追加按会话去重，重试不会产生重复记录
            let appended = match self.store.append_record(&record).await {
                Ok(appended) => appended,
                Err(e) => {
                    warn!(session_id = %session.id, error = %e, "record append failed, retrying once");
                    self.store.append_record(&record).await?
                }
            };
            if appended {
                self.metrics.record_medical_record();
                self.index_record(session, &record).await;
                self.distill_skills(session, &therapy, record.improvement)
                    .await?;
            }
            session.record_written = true;
            self.persist(session).await?;
        }

        session.advance_phase()?; // Evaluation -> Closed
        self.persist(session).await?;
        self.metrics.record_session_closed();
        self.cancel_flags.remove(&session.id);

        let improvement = crate::models::record::improvement_score(
            &session.pre_scales,
            &session.post_scales,
        );
        info!(session_id = %session.id, improvement, "session closed");

        Ok(format!(
            "本次围绕「{core_topic}」的咨询已经完成，量表总分改善 {improvement:.1} 分。照顾好自己，随时欢迎回来。"
        ))
    }

    /// 画像向量入语料；嵌入服务不可用时跳过，不影响会话收尾
    async fn index_record(&self, session: &Session, record: &MedicalRecord) {
        let text = session.portrait.render();
        match self.embedding.encode(&text).await {
            Ok(vector) => {
                let metadata = VectorMetadata {
                    subject_id: session.subject_id.clone(),
                    record_id: record.id.to_string(),
                    therapy_type: record.therapy_type.clone(),
                    improvement: record.improvement,
                    timestamp: record.created_at,
                };
                if let Err(e) = self
                    .index
                    .add(&record.id.to_string(), &vector, metadata)
                    .await
                {
                    warn!(session_id = %session.id, error = %e, "portrait indexing failed");
                }
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "embedding unavailable, record not indexed");
            }
        }
    }

    /// 沉淀档案师与所用疗法咨询师的经验
    async fn distill_skills(
        &self,
        session: &Session,
        therapy: &str,
        improvement: f64,
    ) -> Result<()> {
        let profiler_lesson = self.supervisor.distill_lesson(session, "档案师").await;
        self.store
            .append_skill(&SkillEntry::new(
                SkillRole::Profiler,
                session.id,
                profiler_lesson,
                improvement,
            ))
            .await?;

        let therapist_lesson = self.supervisor.distill_lesson(session, "咨询师").await;
        self.store
            .append_skill(&SkillEntry::new(
                SkillRole::Therapist(therapy.to_string()),
                session.id,
                therapist_lesson,
                improvement,
            ))
            .await?;

        Ok(())
    }
}
