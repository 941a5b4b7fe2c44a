// Integration tests for the counseling session pipeline
//
// Tests cover:
// - Full session lifecycle from greeting to medical record
// - Profiling turn cap and degraded exits
// - CBT stage monotonicity and liveness under evaluator failure
// - Topic scoring during therapy
// - Selection fallback on an empty corpus and on embedding outage
// - Best-effort skill recall under store read failures
// - Crash resume, cancellation and full-LLM-outage liveness

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use psyche::agents::llm::ChatModel;
use psyche::config::CounselingConfig;
use psyche::error::{AppError, Result};
use psyche::index::{EmbeddingModel, MemoryVectorIndex, SimpleEmbeddingModel, VectorIndex};
use psyche::models::record::{MedicalRecord, ScaleKind};
use psyche::models::session::{Session, SessionMode, SessionPhase};
use psyche::models::skill::{SkillEntry, SkillRole};
use psyche::observability::AppMetrics;
use psyche::services::orchestrator::SessionOrchestrator;
use psyche::storage::{InMemoryStore, MemoryStore};

const DIM: usize = 64;

/// Keyword-routed fake model: answers each judgement prompt with a
/// canned JSON payload and everything else with a generic line.
struct RoutedFakeModel {
    profile_complete: bool,
    stage_all_satisfied: bool,
    relevance: &'static str,
}

impl RoutedFakeModel {
    fn cooperative() -> Self {
        Self {
            profile_complete: true,
            stage_all_satisfied: true,
            relevance: "high",
        }
    }

    fn stubborn() -> Self {
        Self {
            profile_complete: false,
            stage_all_satisfied: false,
            relevance: "high",
        }
    }
}

#[async_trait]
impl ChatModel for RoutedFakeModel {
    async fn generate(&self, _system: &str, prompt: &str) -> Result<String> {
        if prompt.contains("抽取画像事实") {
            return Ok(
                r#"{"facts": [{"category": "emotions", "content": "考前焦虑"}]}"#.to_string(),
            );
        }
        if prompt.contains("判断画像是否已覆盖") {
            return Ok(format!(
                r#"{{"complete": {}, "quality": 0.8}}"#,
                self.profile_complete
            ));
        }
        if prompt.contains("判断来访者最新发言") {
            return Ok(format!(r#"{{"relevance": "{}"}}"#, self.relevance));
        }
        if prompt.contains("已经被对话满足的要素") {
            if self.stage_all_satisfied {
                // 覆盖所有阶段的全部要素名
                return Ok(r#"{"satisfied": ["情境描述", "情绪命名", "自动思维陈述", "思维模式归类", "陷阱实例确认", "支持证据检视", "反对证据检视", "替代解释提出", "现实思维表述", "行动计划制定"]}"#.to_string());
            }
            return Ok(r#"{"satisfied": []}"#.to_string());
        }
        if prompt.contains("核心困扰") {
            return Ok("学业压力".to_string());
        }
        Ok("好的，我们继续聊聊。".to_string())
    }
}

/// A model whose every call fails, to exercise scripted fallbacks.
struct DeadModel;

#[async_trait]
impl ChatModel for DeadModel {
    async fn generate(&self, _system: &str, _prompt: &str) -> Result<String> {
        Err(AppError::Generation("service down".into()))
    }
}

/// An embedding backend that is always unavailable.
struct DeadEmbedding;

#[async_trait]
impl EmbeddingModel for DeadEmbedding {
    async fn encode(&self, _text: &str) -> Result<Vec<f32>> {
        Err(AppError::Embedding("embedding service down".into()))
    }

    async fn encode_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Err(AppError::Embedding("embedding service down".into()))
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

/// A store whose skill reads fail, everything else delegating to memory.
struct RecallFailStore(InMemoryStore);

#[async_trait]
impl MemoryStore for RecallFailStore {
    async fn save_session(&self, session: &Session) -> Result<()> {
        self.0.save_session(session).await
    }

    async fn load_session(&self, id: Uuid) -> Result<Option<Session>> {
        self.0.load_session(id).await
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.0.list_sessions().await
    }

    async fn append_record(&self, record: &MedicalRecord) -> Result<bool> {
        self.0.append_record(record).await
    }

    async fn record_for_session(&self, session_id: Uuid) -> Result<Option<MedicalRecord>> {
        self.0.record_for_session(session_id).await
    }

    async fn list_records(&self) -> Result<Vec<MedicalRecord>> {
        self.0.list_records().await
    }

    async fn append_skill(&self, entry: &SkillEntry) -> Result<()> {
        self.0.append_skill(entry).await
    }

    async fn recall_skills(&self, _role: &SkillRole, _limit: usize) -> Result<Vec<SkillEntry>> {
        Err(AppError::Persistence("skill collection corrupted".into()))
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    index: Arc<MemoryVectorIndex>,
    metrics: Arc<AppMetrics>,
    orchestrator: SessionOrchestrator,
}

fn harness(llm: Arc<dyn ChatModel>, stage_turn_budget: u32) -> Harness {
    harness_with_embedding(llm, Arc::new(SimpleEmbeddingModel::new(DIM)), stage_turn_budget)
}

fn harness_with_embedding(
    llm: Arc<dyn ChatModel>,
    embedding: Arc<dyn EmbeddingModel>,
    stage_turn_budget: u32,
) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let index = Arc::new(MemoryVectorIndex::new(DIM));
    let metrics = Arc::new(AppMetrics::default());
    let config = CounselingConfig {
        stage_turn_budget,
        ..CounselingConfig::default()
    };
    let orchestrator = SessionOrchestrator::new(
        store.clone(),
        index.clone(),
        embedding,
        llm,
        config,
        0,
        metrics.clone(),
    );
    Harness {
        store,
        index,
        metrics,
        orchestrator,
    }
}

async fn load(store: &InMemoryStore, id: Uuid) -> Session {
    store.load_session(id).await.unwrap().unwrap()
}

const PRE: [(ScaleKind, f64); 3] = [
    (ScaleKind::Ghq20, 15.0),
    (ScaleKind::Campbell, 10.0),
    (ScaleKind::Cpss, 35.0),
];
const POST: [(ScaleKind, f64); 3] = [
    (ScaleKind::Ghq20, 9.0),
    (ScaleKind::Campbell, 8.0),
    (ScaleKind::Cpss, 29.0),
];

/// Drive a session from greeting up to the Therapy phase.
async fn drive_to_therapy(h: &Harness) -> Uuid {
    let started = h
        .orchestrator
        .start("student-001", SessionMode::Interactive)
        .await
        .unwrap();
    assert_eq!(started.phase, SessionPhase::Greeting);

    let reply = h.orchestrator.handle_turn(started.session_id, "你好").await.unwrap();
    assert_eq!(reply.phase, SessionPhase::PreScale);

    h.orchestrator
        .submit_scales(started.session_id, &PRE)
        .await
        .unwrap();

    // 画像采集：合作模型一轮即判完整，顽固模型靠轮次上限兜底
    let mut guard = 0;
    loop {
        let reply = h
            .orchestrator
            .handle_turn(started.session_id, "最近考试压力大，睡不好")
            .await
            .unwrap();
        if reply.phase == SessionPhase::Therapy {
            break;
        }
        guard += 1;
        assert!(guard <= 4, "profiling should exit within its turn cap");
    }

    started.session_id
}

#[tokio::test]
async fn test_full_session_lifecycle_writes_record_and_skills() {
    let h = harness(Arc::new(RoutedFakeModel::cooperative()), 5);
    let session_id = drive_to_therapy(&h).await;

    // 合作模型每轮判满所有要素：四个阶段各一轮即完成
    let mut turns = 0;
    loop {
        let reply = h
            .orchestrator
            .handle_turn(session_id, "我明白了，确实是我想得太绝对")
            .await
            .unwrap();
        turns += 1;
        if reply.phase == SessionPhase::PostScale {
            break;
        }
        assert!(turns <= 4, "cooperative therapy should finish in four turns");
    }

    let finished = h
        .orchestrator
        .submit_scales(session_id, &POST)
        .await
        .unwrap();
    assert!(finished.closed);

    // 病历写入且改善分为疗前减疗后
    let record = h
        .store
        .record_for_session(session_id)
        .await
        .unwrap()
        .expect("medical record must exist");
    assert_eq!(record.therapy_type, "cbt");
    assert_eq!(record.improvement, (15.0 + 10.0 + 35.0) - (9.0 + 8.0 + 29.0));
    assert_eq!(record.core_topic, "学业压力");

    // 画像向量入语料
    assert_eq!(h.index.count("cbt").await.unwrap(), 1);

    // 两个角色的经验各一条
    let profiler_skills = h.store.recall_skills(&SkillRole::Profiler, 10).await.unwrap();
    let cbt_skills = h
        .store
        .recall_skills(&SkillRole::Therapist("cbt".into()), 10)
        .await
        .unwrap();
    assert_eq!(profiler_skills.len(), 1);
    assert_eq!(cbt_skills.len(), 1);

    // 会话关闭后拒绝继续发言
    let err = h.orchestrator.handle_turn(session_id, "还在吗").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_profiling_exits_at_turn_cap_when_never_complete() {
    let h = harness(Arc::new(RoutedFakeModel::stubborn()), 2);
    let session_id = drive_to_therapy(&h).await;

    let session = load(&h.store, session_id).await;
    assert_eq!(session.phase, SessionPhase::Therapy);
    // 轮次上限兜底退出时 complete 保持 false
    assert!(!session.profile_complete);
    assert_eq!(session.profile_turns, 3);
}

#[tokio::test]
async fn test_stage_budget_guarantees_therapy_termination() {
    // 评估永远不判满任何要素，只能靠每阶段 2 轮的预算推进
    let h = harness(Arc::new(RoutedFakeModel::stubborn()), 2);
    let session_id = drive_to_therapy(&h).await;

    let mut last_stage_index = 0;
    let mut turns = 0;
    loop {
        let reply = h.orchestrator.handle_turn(session_id, "嗯……").await.unwrap();
        turns += 1;

        let session = load(&h.store, session_id).await;
        let index = session.stages.current().index();
        assert!(index >= last_stage_index, "stage index must never regress");
        last_stage_index = index;

        if reply.phase == SessionPhase::PostScale {
            break;
        }
        assert!(turns <= 4 * 2, "therapy must end within 4 * budget turns");
    }
    assert_eq!(turns, 4 * 2);
}

#[tokio::test]
async fn test_topic_score_grows_with_relevant_turns() {
    // 顽固模型不判满阶段要素，留在第一阶段里观察话题分
    let h = harness(Arc::new(RoutedFakeModel::stubborn()), 5);

    let session_id = drive_to_therapy(&h).await;
    for _ in 0..3 {
        h.orchestrator.handle_turn(session_id, "还是考试的事").await.unwrap();
    }

    let session = load(&h.store, session_id).await;
    let core = session.topics.core_name().expect("core topic seeded");
    assert_eq!(core, "学业压力");
    let id = session.topics.find(core).unwrap();
    // 基线 5 分，三轮 high 各 +2
    assert_eq!(session.topics.score(id), Some(5 + 3 * 2));
}

#[tokio::test]
async fn test_empty_corpus_selects_default_therapy() {
    let h = harness(Arc::new(RoutedFakeModel::cooperative()), 5);
    let session_id = drive_to_therapy(&h).await;

    let session = load(&h.store, session_id).await;
    assert_eq!(session.selected_therapy.as_deref(), Some("cbt"));
}

#[tokio::test]
async fn test_embedding_outage_degrades_to_default_therapy() {
    let h = harness_with_embedding(
        Arc::new(RoutedFakeModel::cooperative()),
        Arc::new(DeadEmbedding),
        5,
    );
    let session_id = drive_to_therapy(&h).await;

    // 嵌入服务不可用时分诊退回默认疗法，会话不能卡在分诊环节
    let session = load(&h.store, session_id).await;
    assert_eq!(session.phase, SessionPhase::Therapy);
    assert_eq!(session.selected_therapy.as_deref(), Some("cbt"));
    assert!(
        h.metrics
            .degraded_selections
            .load(std::sync::atomic::Ordering::SeqCst)
            >= 1
    );
}

#[tokio::test]
async fn test_skill_recall_failure_does_not_block_turns() {
    let store = Arc::new(RecallFailStore(InMemoryStore::new()));
    let orchestrator = SessionOrchestrator::new(
        store.clone(),
        Arc::new(MemoryVectorIndex::new(DIM)),
        Arc::new(SimpleEmbeddingModel::new(DIM)),
        Arc::new(RoutedFakeModel::cooperative()),
        CounselingConfig::default(),
        0,
        Arc::new(AppMetrics::default()),
    );

    let started = orchestrator
        .start("student-004", SessionMode::Interactive)
        .await
        .unwrap();
    orchestrator
        .handle_turn(started.session_id, "你好")
        .await
        .unwrap();

    // 疗前量表齐备后的第一问就要召回档案师经验，读失败也要给出问句
    let reply = orchestrator
        .submit_scales(started.session_id, &PRE)
        .await
        .unwrap();
    assert_eq!(reply.phase, SessionPhase::Profiling);
    assert!(!reply.reply.is_empty());

    // 正式咨询的回复同样要在召回失败时照常产出
    let reply = orchestrator
        .handle_turn(started.session_id, "考试压力很大")
        .await
        .unwrap();
    assert_eq!(reply.phase, SessionPhase::Therapy);
    let reply = orchestrator
        .handle_turn(started.session_id, "嗯，我想是的")
        .await
        .unwrap();
    assert!(!reply.reply.is_empty());
}

#[tokio::test]
async fn test_resume_from_snapshot_preserves_state() {
    let h = harness(Arc::new(RoutedFakeModel::stubborn()), 2);
    let session_id = drive_to_therapy(&h).await;
    h.orchestrator.handle_turn(session_id, "我说不上来").await.unwrap();

    // 共享同一存储的新编排器模拟进程重启
    let embedding = Arc::new(SimpleEmbeddingModel::new(DIM));
    let reborn = SessionOrchestrator::new(
        h.store.clone(),
        h.index.clone(),
        embedding,
        Arc::new(RoutedFakeModel::stubborn()),
        CounselingConfig {
            stage_turn_budget: 2,
            ..CounselingConfig::default()
        },
        0,
        Arc::new(AppMetrics::default()),
    );

    let resumed = reborn.resume(session_id).await.unwrap();
    assert_eq!(resumed.phase, SessionPhase::Therapy);
    assert_eq!(resumed.topics.core_name(), Some("学业压力"));

    // 恢复后可以继续推进
    let reply = reborn.handle_turn(session_id, "那我再想想").await.unwrap();
    assert!(!reply.reply.is_empty());
}

#[tokio::test]
async fn test_cancellation_closes_session_at_boundary() {
    let h = harness(Arc::new(RoutedFakeModel::stubborn()), 2);
    let session_id = drive_to_therapy(&h).await;

    h.orchestrator.cancel(session_id);
    let err = h.orchestrator.handle_turn(session_id, "喂？").await.unwrap_err();
    assert!(matches!(err, AppError::Cancelled(_)));

    // 取消后会话被关闭且没有病历
    let session = load(&h.store, session_id).await;
    assert!(session.is_closed());
    assert!(h
        .store
        .record_for_session(session_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_session_completes_even_when_llm_is_down() {
    // 所有判定走保守默认值，所有发言走脚本化文案
    let h = harness(Arc::new(DeadModel), 2);
    let started = h
        .orchestrator
        .start("student-002", SessionMode::Interactive)
        .await
        .unwrap();
    let session_id = started.session_id;

    h.orchestrator.handle_turn(session_id, "你好").await.unwrap();
    h.orchestrator.submit_scales(session_id, &PRE).await.unwrap();

    let mut turns = 0;
    loop {
        let reply = h.orchestrator.handle_turn(session_id, "最近很累").await.unwrap();
        assert!(!reply.reply.is_empty(), "fallback reply must not be empty");
        turns += 1;
        if reply.phase == SessionPhase::PostScale {
            break;
        }
        assert!(turns < 40, "session must keep moving despite llm outage");
    }

    let finished = h.orchestrator.submit_scales(session_id, &POST).await.unwrap();
    assert!(finished.closed);

    // 病历仍然写入，核心议题落在兜底话题上
    let record = h
        .store
        .record_for_session(session_id)
        .await
        .unwrap()
        .expect("record written despite outage");
    assert_eq!(record.core_topic, "情绪困扰");
}

#[tokio::test]
async fn test_scale_submission_rejected_outside_scale_phases() {
    let h = harness(Arc::new(RoutedFakeModel::cooperative()), 5);
    let started = h
        .orchestrator
        .start("student-003", SessionMode::Interactive)
        .await
        .unwrap();

    // 问候环节不接受量表
    let err = h
        .orchestrator
        .submit_scales(started.session_id, &PRE)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}
