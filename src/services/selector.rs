//! 咨询师分诊服务
//!
//! 基于画像向量在病历语料中检索相似个案，按
//! score = w1 * 平均相似度 + w2 * 平均疗效 给每种候选疗法打分。
//! 空语料时确定性地退回默认疗法并记录降级。

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::SelectionConfig;
use crate::error::{AppError, Result};
use crate::index::{EmbeddingModel, VectorIndex};
use crate::models::therapist::TherapistCatalog;

/// 单个候选疗法的评分明细
#[derive(Debug, Clone)]
pub struct TypeScore {
    pub therapy_type: String,
    pub score: f64,
    pub mean_similarity: f64,
    pub mean_effectiveness: f64,
    /// 参与评分的历史个案数
    pub cases: usize,
}

/// 分诊结果
#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    pub therapy_type: String,
    /// 空语料降级标志
    pub degraded: bool,
    pub scores: Vec<TypeScore>,
}

pub struct TherapistSelector {
    catalog: TherapistCatalog,
    index: Arc<dyn VectorIndex>,
    embedding: Arc<dyn EmbeddingModel>,
    config: SelectionConfig,
}

impl TherapistSelector {
    pub fn new(
        catalog: TherapistCatalog,
        index: Arc<dyn VectorIndex>,
        embedding: Arc<dyn EmbeddingModel>,
        config: SelectionConfig,
    ) -> Self {
        Self {
            catalog,
            index,
            embedding,
            config,
        }
    }

    /// 疗效归一化：改善分按配置跨度折算到 [0,1]
    fn effectiveness(&self, improvement: f64) -> f64 {
        (improvement / self.config.improvement_span).clamp(0.0, 1.0)
    }

    /// 给定画像文本与候选疗法集合，选出疗法类型
    ///
    /// 候选为空是调用方错误；嵌入服务不可用时错误原样上抛，
    /// 绝不拿随机向量凑合。
    pub async fn select(&self, portrait_text: &str, candidates: &[String]) -> Result<SelectionOutcome> {
        let candidates: Vec<String> = candidates
            .iter()
            .filter(|c| self.catalog.get(c).is_some())
            .cloned()
            .collect();
        if candidates.is_empty() {
            return Err(AppError::NoCandidates(
                "分诊候选疗法集合为空".to_string(),
            ));
        }

        let query = self.embedding.encode(portrait_text).await?;

        let mut scores = Vec::with_capacity(candidates.len());
        for therapy_type in &candidates {
            let hits = self
                .index
                .search(&query, std::slice::from_ref(therapy_type), self.config.top_k)
                .await?;
            if hits.is_empty() {
                continue;
            }

            let mean_similarity =
                hits.iter().map(|h| h.score as f64).sum::<f64>() / hits.len() as f64;
            let mean_effectiveness = hits
                .iter()
                .map(|h| self.effectiveness(h.metadata.improvement))
                .sum::<f64>()
                / hits.len() as f64;

            scores.push(TypeScore {
                therapy_type: therapy_type.clone(),
                score: self.config.similarity_weight * mean_similarity
                    + self.config.effectiveness_weight * mean_effectiveness,
                mean_similarity,
                mean_effectiveness,
                cases: hits.len(),
            });
        }

        if scores.is_empty() {
            // 冷启动：整个语料里都没有候选疗法的个案
            let fallback = if candidates.contains(&self.config.default_therapy) {
                self.config.default_therapy.clone()
            } else {
                candidates[0].clone()
            };
            warn!(
                therapy = %fallback,
                "no historical cases for any candidate, falling back to default therapy"
            );
            return Ok(SelectionOutcome {
                therapy_type: fallback,
                degraded: true,
                scores,
            });
        }

        // 总分降序；平分时个案多者优先，再按目录优先级
        scores.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.cases.cmp(&a.cases))
                .then_with(|| {
                    self.catalog
                        .priority_of(&a.therapy_type)
                        .cmp(&self.catalog.priority_of(&b.therapy_type))
                })
        });

        let winner = scores[0].therapy_type.clone();
        info!(
            therapy = %winner,
            score = scores[0].score,
            cases = scores[0].cases,
            "therapist selected"
        );

        Ok(SelectionOutcome {
            therapy_type: winner,
            degraded: false,
            scores,
        })
    }
}

pub fn create_therapist_selector(
    catalog: TherapistCatalog,
    index: Arc<dyn VectorIndex>,
    embedding: Arc<dyn EmbeddingModel>,
    config: SelectionConfig,
) -> TherapistSelector {
    TherapistSelector::new(catalog, index, embedding, config)
}
