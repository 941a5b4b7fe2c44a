use crate::config::config::AppConfig;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use std::path::PathBuf;

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 搜索路径：
    /// 1. ./config.toml
    /// 2. 环境变量（PSYCHE_ 前缀）
    pub fn load() -> Result<AppConfig, figment::Error> {
        let figment = Figment::from(figment::providers::Serialized::defaults(
            AppConfig::development(),
        ))
        .merge(Toml::file("config.toml"))
        .merge(Env::prefixed("PSYCHE_").split("_").global());

        figment.extract()
    }

    /// 从指定路径加载配置
    pub fn load_from(path: PathBuf) -> Result<AppConfig, figment::Error> {
        let figment = Figment::from(figment::providers::Serialized::defaults(
            AppConfig::development(),
        ))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PSYCHE_").split("_").global());

        figment.extract()
    }

    /// 验证配置
    pub fn validate(config: &AppConfig) -> Result<(), ConfigValidationError> {
        if config.server.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }

        if config.embedding.dimension == 0 {
            return Err(ConfigValidationError::InvalidDimension);
        }

        if config.counseling.therapists.is_empty() {
            return Err(ConfigValidationError::EmptyTherapistCatalog);
        }

        let default = &config.counseling.selection.default_therapy;
        if !config
            .counseling
            .therapists
            .iter()
            .any(|t| &t.id == default)
        {
            return Err(ConfigValidationError::UnknownDefaultTherapy(
                default.clone(),
            ));
        }

        if config.counseling.selection.top_k == 0 {
            return Err(ConfigValidationError::InvalidTopK);
        }

        Ok(())
    }
}

/// 配置验证错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("服务端口无效，必须大于 0")]
    InvalidPort,

    #[error("向量维度无效，必须大于 0")]
    InvalidDimension,

    #[error("咨询师目录为空")]
    EmptyTherapistCatalog,

    #[error("兜底流派不在咨询师目录中: {0}")]
    UnknownDefaultTherapy(String),

    #[error("选择器 top_k 无效，必须大于 0")]
    InvalidTopK,
}

/// 获取默认配置文件路径
pub fn default_config_path() -> PathBuf {
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_development_config() {
        let config = AppConfig::development();
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_default_therapy() {
        let mut config = AppConfig::development();
        config.counseling.selection.default_therapy = "hypnosis".into();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::UnknownDefaultTherapy(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_catalog() {
        let mut config = AppConfig::development();
        config.counseling.therapists.clear();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::EmptyTherapistCatalog)
        ));
    }
}
