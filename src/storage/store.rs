//! 存储抽象与内存实现

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::models::record::MedicalRecord;
use crate::models::session::Session;
use crate::models::skill::{SkillEntry, SkillRole};

/// 存储 trait
///
/// 三类数据：会话快照（整体覆盖写）、病历（追加、按会话去重）、
/// 技能经验（按角色集合追加）。追加语义保证重试落库幂等。
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// 落一次会话快照（覆盖同 ID 旧快照）
    async fn save_session(&self, session: &Session) -> Result<()>;

    /// 按 ID 读取会话快照
    async fn load_session(&self, id: Uuid) -> Result<Option<Session>>;

    /// 列出所有会话快照
    async fn list_sessions(&self) -> Result<Vec<Session>>;

    /// 追加病历；同一会话已有病历时跳过并返回 false
    async fn append_record(&self, record: &MedicalRecord) -> Result<bool>;

    /// 查某会话的病历
    async fn record_for_session(&self, session_id: Uuid) -> Result<Option<MedicalRecord>>;

    /// 列出全部病历
    async fn list_records(&self) -> Result<Vec<MedicalRecord>>;

    /// 追加一条技能经验
    async fn append_skill(&self, entry: &SkillEntry) -> Result<()>;

    /// 召回某角色最近的技能经验
    async fn recall_skills(&self, role: &SkillRole, limit: usize) -> Result<Vec<SkillEntry>>;
}

/// 内存存储实现
///
/// 病历追加经过互斥锁串行化，避免并发会话同时收尾时交错写入。
pub struct InMemoryStore {
    sessions: DashMap<Uuid, Session>,
    records: Mutex<Vec<MedicalRecord>>,
    skills: DashMap<String, Vec<SkillEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            records: Mutex::new(Vec::new()),
            skills: DashMap::new(),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn save_session(&self, session: &Session) -> Result<()> {
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn load_session(&self, id: Uuid) -> Result<Option<Session>> {
        Ok(self.sessions.get(&id).map(|s| s.clone()))
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> =
            self.sessions.iter().map(|e| e.value().clone()).collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn append_record(&self, record: &MedicalRecord) -> Result<bool> {
        let mut records = self.records.lock();
        if records.iter().any(|r| r.session_id == record.session_id) {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    async fn record_for_session(&self, session_id: Uuid) -> Result<Option<MedicalRecord>> {
        Ok(self
            .records
            .lock()
            .iter()
            .find(|r| r.session_id == session_id)
            .cloned())
    }

    async fn list_records(&self) -> Result<Vec<MedicalRecord>> {
        Ok(self.records.lock().clone())
    }

    async fn append_skill(&self, entry: &SkillEntry) -> Result<()> {
        self.skills
            .entry(entry.role.collection())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn recall_skills(&self, role: &SkillRole, limit: usize) -> Result<Vec<SkillEntry>> {
        let entries = self
            .skills
            .get(&role.collection())
            .map(|v| {
                let skip = v.len().saturating_sub(limit);
                v[skip..].to_vec()
            })
            .unwrap_or_default();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::ScaleBattery;
    use crate::models::session::SessionMode;

    fn record(session_id: Uuid) -> MedicalRecord {
        MedicalRecord::new(
            session_id,
            "s-001",
            "cbt",
            "学业压力",
            ScaleBattery::default(),
            ScaleBattery::default(),
            "摘要",
        )
    }

    #[tokio::test]
    async fn test_session_snapshot_overwrite() {
        let store = InMemoryStore::new();
        let mut session = Session::new("s-001", SessionMode::Interactive);
        store.save_session(&session).await.unwrap();

        session.push_visitor("你好");
        store.save_session(&session).await.unwrap();

        let loaded = store.load_session(session.id).await.unwrap().unwrap();
        assert_eq!(loaded.turn, 1);
        assert_eq!(store.list_sessions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_append_is_idempotent_per_session() {
        let store = InMemoryStore::new();
        let session_id = Uuid::new_v4();

        assert!(store.append_record(&record(session_id)).await.unwrap());
        assert!(!store.append_record(&record(session_id)).await.unwrap());
        assert_eq!(store.list_records().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_skill_recall_returns_most_recent() {
        let store = InMemoryStore::new();
        let role = SkillRole::Therapist("cbt".into());
        for i in 0..5 {
            store
                .append_skill(&SkillEntry::new(
                    role.clone(),
                    Uuid::new_v4(),
                    format!("经验{i}"),
                    1.0,
                ))
                .await
                .unwrap();
        }

        let recalled = store.recall_skills(&role, 2).await.unwrap();
        assert_eq!(recalled.len(), 2);
        assert_eq!(recalled[0].lesson, "经验3");
        assert_eq!(recalled[1].lesson, "经验4");

        // 其他角色集合互不串扰
        let other = store.recall_skills(&SkillRole::Profiler, 10).await.unwrap();
        assert!(other.is_empty());
    }
}
