use std::sync::Arc;

use crate::services::orchestrator::SessionOrchestrator;
use crate::services::training::TrainingRunner;
use crate::storage::MemoryStore;

/// 应用共享状态
#[derive(Clone)]
pub struct AppState {
    /// 会话编排服务
    pub orchestrator: Arc<SessionOrchestrator>,
    /// 存储（病历与会话查询直接走它）
    pub store: Arc<dyn MemoryStore>,
    /// 批量训练服务
    pub training: Arc<TrainingRunner>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("orchestrator", &"Arc<SessionOrchestrator>")
            .field("store", &"Arc<dyn MemoryStore>")
            .field("training", &"Arc<TrainingRunner>")
            .finish()
    }
}

impl AppState {
    pub fn new(
        orchestrator: Arc<SessionOrchestrator>,
        store: Arc<dyn MemoryStore>,
        training: Arc<TrainingRunner>,
    ) -> Self {
        Self {
            orchestrator,
            store,
            training,
        }
    }
}
