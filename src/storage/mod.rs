//! 存储模块
//!
//! 根据配置选择内存或 JSON 文件后端。

use std::sync::Arc;

use crate::config::StorageConfig;
use crate::error::{AppError, Result};

pub mod json_store;
pub mod store;

pub use json_store::JsonFileStore;
pub use store::{InMemoryStore, MemoryStore};

/// 根据配置创建存储实例
pub fn create_store(config: &StorageConfig) -> Result<Arc<dyn MemoryStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        "json" => Ok(Arc::new(JsonFileStore::new(&config.data_dir)?)),
        other => Err(AppError::Config(format!("未知存储后端: {other}"))),
    }
}
