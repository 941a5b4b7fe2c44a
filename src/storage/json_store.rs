//! JSON 文件存储实现
//!
//! 每个集合一个 JSON 文件，写入走「临时文件 + 原子改名」，
//! 进程内用互斥锁把追加串行化。适合单机部署与训练场景。

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::record::MedicalRecord;
use crate::models::session::Session;
use crate::models::skill::{SkillEntry, SkillRole};
use crate::storage::store::MemoryStore;

pub struct JsonFileStore {
    data_dir: PathBuf,
    /// 串行化所有文件写入
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(data_dir.join("sessions"))?;
        fs::create_dir_all(data_dir.join("skills"))?;
        Ok(Self {
            data_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn session_path(&self, id: Uuid) -> PathBuf {
        self.data_dir.join("sessions").join(format!("{id}.json"))
    }

    fn records_path(&self) -> PathBuf {
        self.data_dir.join("medical_records.json")
    }

    fn skills_path(&self, role: &SkillRole) -> PathBuf {
        self.data_dir
            .join("skills")
            .join(format!("{}.json", role.collection()))
    }

    /// 先写临时文件再改名，崩溃时不会留下半个文件
    fn write_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(value)?;
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, path).map_err(|e| {
            AppError::Persistence(format!("原子改名失败 {}: {e}", path.display()))
        })?;
        Ok(())
    }

    fn read_or_default<T: DeserializeOwned + Default>(&self, path: &Path) -> Result<T> {
        if !path.exists() {
            return Ok(T::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait]
impl MemoryStore for JsonFileStore {
    async fn save_session(&self, session: &Session) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.write_atomic(&self.session_path(session.id), session)
    }

    async fn load_session(&self, id: Uuid) -> Result<Option<Session>> {
        let path = self.session_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        for entry in fs::read_dir(self.data_dir.join("sessions"))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path)?;
            sessions.push(serde_json::from_str::<Session>(&raw)?);
        }
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn append_record(&self, record: &MedicalRecord) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let path = self.records_path();
        let mut records: Vec<MedicalRecord> = self.read_or_default(&path)?;
        if records.iter().any(|r| r.session_id == record.session_id) {
            return Ok(false);
        }
        records.push(record.clone());
        self.write_atomic(&path, &records)?;
        Ok(true)
    }

    async fn record_for_session(&self, session_id: Uuid) -> Result<Option<MedicalRecord>> {
        let records: Vec<MedicalRecord> = self.read_or_default(&self.records_path())?;
        Ok(records.into_iter().find(|r| r.session_id == session_id))
    }

    async fn list_records(&self) -> Result<Vec<MedicalRecord>> {
        self.read_or_default(&self.records_path())
    }

    async fn append_skill(&self, entry: &SkillEntry) -> Result<()> {
        let _guard = self.write_lock.lock();
        let path = self.skills_path(&entry.role);
        let mut entries: Vec<SkillEntry> = self.read_or_default(&path)?;
        entries.push(entry.clone());
        self.write_atomic(&path, &entries)
    }

    async fn recall_skills(&self, role: &SkillRole, limit: usize) -> Result<Vec<SkillEntry>> {
        let entries: Vec<SkillEntry> = self.read_or_default(&self.skills_path(role))?;
        let skip = entries.len().saturating_sub(limit);
        Ok(entries[skip..].to_vec())
    }
}
