//! 对话模型客户端
//!
//! OpenAI 兼容的 chat/completions 接口，带超时与有界重试。

use async_trait::async_trait;
use reqwest;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::agents::text::strip_code_fence;
use crate::config::LlmConfig;
use crate::error::{AppError, Result};

/// 生成式对话模型
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 给定系统设定与用户提示词，生成一段回复
    async fn generate(&self, system: &str, prompt: &str) -> Result<String>;
}

/// OpenAI 兼容接口客户端
pub struct OpenAiChatModel {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model_name: String,
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            model_name: config.model_name.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model_name,
                "temperature": self.temperature,
                "messages": [
                    {"role": "system", "content": system},
                    {"role": "user", "content": prompt},
                ],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Generation(format!(
                "模型接口返回 {status}: {error_text}"
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Generation(format!("模型响应解析失败: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::Generation("模型响应没有任何候选".into()))
    }
}

/// 带重试的生成调用
///
/// 只对可重试错误（生成失败、超时）重试，重试耗尽后把最后的错误
/// 原样返回，由调用方决定是否降级到脚本化文案。
pub async fn generate_with_retry(
    model: &dyn ChatModel,
    system: &str,
    prompt: &str,
    max_retries: u32,
) -> Result<String> {
    let mut last_err = None;
    for attempt in 0..=max_retries {
        match model.generate(system, prompt).await {
            Ok(text) => return Ok(text),
            Err(e @ (AppError::Generation(_) | AppError::Timeout(_))) => {
                warn!(attempt, error = %e, "generation attempt failed");
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| AppError::Generation("生成失败".into())))
}

/// 解析模型输出中的 JSON 负载
///
/// 模型经常把 JSON 包在 Markdown 代码栅栏里，先剥掉再解析。
pub fn parse_json_payload<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let cleaned = strip_code_fence(raw);
    serde_json::from_str(cleaned.trim())
        .map_err(|e| AppError::Generation(format!("模型 JSON 输出解析失败: {e}")))
}


#[cfg(test)]
mod tests {
    use super::testing::{FailingChatModel, ScriptedChatModel};
    use super::*;

    #[tokio::test]
    async fn test_retry_exhaustion_returns_generation_error() {
        let model = FailingChatModel;
        let err = generate_with_retry(&model, "sys", "prompt", 2)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failure() {
        let mut model = MockChatModel::new();
        let mut seq = mockall::Sequence::new();
        model
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(AppError::Generation("transient".into())));
        model
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("恢复了".to_string()));

        let out = generate_with_retry(&model, "sys", "p", 2).await.unwrap();
        assert_eq!(out, "恢复了");
    }

    #[tokio::test]
    async fn test_scripted_model_replays_in_order() {
        let model = ScriptedChatModel::new(vec!["一", "二"]);
        assert_eq!(model.generate("", "").await.unwrap(), "一");
        assert_eq!(model.generate("", "").await.unwrap(), "二");
        assert_eq!(model.generate("", "").await.unwrap(), "二");
    }

    #[test]
    fn test_parse_json_payload_strips_fence() {
        #[derive(serde::Deserialize)]
        struct Out {
            score: u32,
        }
        let raw = "```json\n{\"score\": 7}\n```";
        let out: Out = parse_json_payload(raw).unwrap();
        assert_eq!(out.score, 7);
    }
}
