//! 批量训练服务
//!
//! 用脚本化来访者批量跑完整会话流程，让病历语料与技能经验
//! 随训练量增长。跨会话用有界并发，单个会话内部仍然严格串行。

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::error::Result;
use crate::models::record::ScaleKind;
use crate::models::session::SessionMode;
use crate::services::orchestrator::SessionOrchestrator;

/// 一个脚本化来访者
#[derive(Debug, Clone)]
pub struct SimulatedSubject {
    pub subject_id: String,
    /// 按顺序送入的发言脚本
    pub utterances: Vec<String>,
    /// 疗前量表总分 (GHQ-20, Campbell, CPSS)
    pub pre_scales: (f64, f64, f64),
    /// 疗后量表总分
    pub post_scales: (f64, f64, f64),
}

/// 单个训练会话的结果
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub subject_id: String,
    pub closed: bool,
    pub error: Option<String>,
}

/// 整批训练的汇总
#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub outcomes: Vec<TrainingOutcome>,
}

pub struct TrainingRunner {
    orchestrator: Arc<SessionOrchestrator>,
    workers: usize,
}

impl TrainingRunner {
    pub fn new(orchestrator: Arc<SessionOrchestrator>, workers: usize) -> Self {
        Self {
            orchestrator,
            workers: workers.max(1),
        }
    }

    /// 跑一批脚本化会话，并发度受 workers 限制
    pub async fn run(&self, subjects: Vec<SimulatedSubject>) -> TrainingReport {
        let total = subjects.len();
        info!(total, workers = self.workers, "training batch started");

        let outcomes: Vec<TrainingOutcome> = stream::iter(subjects)
            .map(|subject| {
                let orchestrator = self.orchestrator.clone();
                async move { Self::run_one(orchestrator, subject).await }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let completed = outcomes.iter().filter(|o| o.closed).count();
        let report = TrainingReport {
            total,
            completed,
            failed: total - completed,
            outcomes,
        };
        info!(
            total = report.total,
            completed = report.completed,
            failed = report.failed,
            "training batch finished"
        );
        report
    }

    /// 单个脚本化会话：问候 → 疗前量表 → 按脚本对话至会话关闭 → 疗后量表
    async fn run_one(
        orchestrator: Arc<SessionOrchestrator>,
        subject: SimulatedSubject,
    ) -> TrainingOutcome {
        match Self::drive(orchestrator, &subject).await {
            Ok(closed) => TrainingOutcome {
                subject_id: subject.subject_id,
                closed,
                error: None,
            },
            Err(e) => {
                warn!(subject_id = %subject.subject_id, error = %e, "training session failed");
                TrainingOutcome {
                    subject_id: subject.subject_id,
                    closed: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn drive(
        orchestrator: Arc<SessionOrchestrator>,
        subject: &SimulatedSubject,
    ) -> Result<bool> {
        let started = orchestrator
            .start(&subject.subject_id, SessionMode::Training)
            .await?;
        let session_id = started.session_id;

        // 问候环节应答一句，进入疗前测评
        orchestrator.handle_turn(session_id, "你好").await?;
        let (g, c, p) = subject.pre_scales;
        orchestrator
            .submit_scales(
                session_id,
                &[
                    (ScaleKind::Ghq20, g),
                    (ScaleKind::Campbell, c),
                    (ScaleKind::Cpss, p),
                ],
            )
            .await?;

        // 按脚本推进；脚本耗尽后循环复用，直到流程自己走到疗后测评
        let mut cursor = 0usize;
        loop {
            let line = subject
                .utterances
                .get(cursor % subject.utterances.len().max(1))
                .map(String::as_str)
                .unwrap_or("嗯，我在想这个问题。");
            cursor += 1;

            let reply = orchestrator.handle_turn(session_id, line).await?;
            if reply.phase == crate::models::SessionPhase::PostScale {
                break;
            }
            if reply.closed {
                return Ok(true);
            }
        }

        let (g, c, p) = subject.post_scales;
        let finished = orchestrator
            .submit_scales(
                session_id,
                &[
                    (ScaleKind::Ghq20, g),
                    (ScaleKind::Campbell, c),
                    (ScaleKind::Cpss, p),
                ],
            )
            .await?;

        Ok(finished.closed)
    }
}

pub fn create_training_runner(
    orchestrator: Arc<SessionOrchestrator>,
    workers: usize,
) -> TrainingRunner {
    TrainingRunner::new(orchestrator, workers)
}
