use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::therapist::TherapistDescriptor;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务地址
    pub host: String,
    /// 服务端口
    pub port: u16,
    /// 请求超时（秒）
    pub request_timeout: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
    /// 日志文件路径
    pub log_dir: Option<PathBuf>,
}

/// 语言模型服务配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI 兼容接口地址
    pub api_base: String,
    /// API 密钥
    pub api_key: String,
    /// 模型名称
    pub model_name: String,
    /// 采样温度
    pub temperature: f64,
    /// 请求超时（秒）
    pub request_timeout: u64,
    /// 失败重试次数（超出后降级为脚本化话术）
    pub max_retries: u32,
}

/// 嵌入模型配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding 后端类型: "http" 或 "simple"
    pub backend: String,
    /// 嵌入服务地址
    pub api_base: String,
    /// 模型名称
    pub model_name: String,
    /// 向量维度
    pub dimension: usize,
    /// 请求超时（秒）
    pub request_timeout: u64,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// 存储后端: "memory" 或 "json"
    pub backend: String,
    /// JSON 文件存储目录
    pub data_dir: PathBuf,
}

/// 咨询师选择配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// 参与聚合的最近邻案例数
    pub top_k: usize,
    /// 相似度权重
    pub similarity_weight: f64,
    /// 历史疗效权重
    pub effectiveness_weight: f64,
    /// 语料为空时的兜底流派
    pub default_therapy: String,
    /// 疗效归一化分母（量表改善分数的满量程）
    pub improvement_span: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_weight: 0.7,
            effectiveness_weight: 0.3,
            default_therapy: "cbt".into(),
            improvement_span: 30.0,
        }
    }
}

/// 咨询流程配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CounselingConfig {
    /// 侧写阶段最大对话轮次（硬上限，防止侧写不收敛导致死循环）
    pub profile_max_turns: u32,
    /// 核心话题的初始分数
    pub initial_topic_score: i32,
    /// 核心话题提取失败时的兜底话题
    pub fallback_topic: String,
    /// CBT 每阶段的默认轮次预算（阶段配置未指定时使用）
    pub stage_turn_budget: u32,
    /// 训练模式并发会话数
    pub workers: usize,
    /// 咨询师选择配置
    pub selection: SelectionConfig,
    /// 咨询师目录
    pub therapists: Vec<TherapistDescriptor>,
}

impl Default for CounselingConfig {
    fn default() -> Self {
        Self {
            profile_max_turns: 3,
            initial_topic_score: 5,
            fallback_topic: "情绪困扰".into(),
            stage_turn_budget: 5,
            workers: 4,
            selection: SelectionConfig::default(),
            therapists: TherapistDescriptor::default_catalog(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 语言模型配置
    pub llm: LlmConfig,
    /// 嵌入模型配置
    pub embedding: EmbeddingConfig,
    /// 存储配置
    pub storage: StorageConfig,
    /// 咨询流程配置
    pub counseling: CounselingConfig,
    /// 应用名称
    pub app_name: String,
    /// 环境
    pub environment: String,
}

impl AppConfig {
    /// 创建开发环境配置
    pub fn development() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8080,
                request_timeout: 30,
            },
            logging: LoggingConfig {
                level: "debug".into(),
                structured: true,
                log_dir: Some(PathBuf::from("./logs")),
            },
            llm: LlmConfig {
                api_base: "https://api.siliconflow.cn/v1".into(),
                api_key: String::new(),
                model_name: "Tongyi-Zhiwen/QwenLong-L1-32B".into(),
                temperature: 0.5,
                request_timeout: 60,
                max_retries: 2,
            },
            embedding: EmbeddingConfig {
                backend: "simple".into(),
                api_base: "http://localhost:11434".into(),
                model_name: "all-MiniLM-L6-v2".into(),
                dimension: 384,
                request_timeout: 60,
            },
            storage: StorageConfig {
                backend: "memory".into(),
                data_dir: PathBuf::from("./data/long-term-memories"),
            },
            counseling: CounselingConfig::default(),
            app_name: "psyche".into(),
            environment: "development".into(),
        }
    }

    /// 创建生产环境配置
    pub fn production() -> Self {
        let mut config = Self::development();
        config.environment = "production".into();
        config.logging.level = "info".into();
        config.storage.backend = "json".into();
        config.counseling.workers = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(4);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_development_defaults() {
        let config = AppConfig::development();
        assert_eq!(config.counseling.selection.top_k, 5);
        assert_eq!(config.counseling.selection.default_therapy, "cbt");
        assert_eq!(config.counseling.initial_topic_score, 5);
        assert!(config.counseling.therapists.len() >= 2);
    }

    #[test]
    fn test_production_overrides() {
        let config = AppConfig::production();
        assert_eq!(config.environment, "production");
        assert_eq!(config.storage.backend, "json");
    }
}
