//! 画像向量索引
//!
//! 病历画像向量的相似检索，用于咨询师分诊时寻找历史相似个案。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub subject_id: String,
    /// 对应病历 ID
    pub record_id: String,
    /// 该病历采用的疗法类型
    pub therapy_type: String,
    /// 该病历的量表改善分
    pub improvement: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSearchResult {
    pub id: String,
    pub score: f32,
    pub metadata: VectorMetadata,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn add(&self, id: &str, vector: &[f32], metadata: VectorMetadata) -> Result<()>;

    /// 在给定疗法类型范围内检索最相似的画像向量
    async fn search(
        &self,
        query: &[f32],
        therapy_types: &[String],
        limit: usize,
    ) -> Result<Vec<VectorSearchResult>>;

    async fn count(&self, therapy_type: &str) -> Result<u64>;

    async fn exists(&self, id: &str) -> Result<bool>;
}

pub struct MemoryVectorIndex {
    vectors: dashmap::DashMap<String, (u64, Vec<f32>, VectorMetadata)>,
    /// 入库序号，平分时按入库先后排序
    insert_seq: std::sync::atomic::AtomicU64,
    dimension: usize,
}

impl MemoryVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: dashmap::DashMap::new(),
            insert_seq: std::sync::atomic::AtomicU64::new(0),
            dimension,
        }
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(AppError::Validation(format!(
                "向量维度不匹配: 期望 {}，实际 {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn add(&self, id: &str, vector: &[f32], metadata: VectorMetadata) -> Result<()> {
        self.check_dimension(vector)?;

        let seq = self
            .insert_seq
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.vectors
            .insert(id.to_string(), (seq, vector.to_vec(), metadata));

        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        therapy_types: &[String],
        limit: usize,
    ) -> Result<Vec<VectorSearchResult>> {
        self.check_dimension(query)?;

        let mut scored: Vec<_> = self
            .vectors
            .iter()
            .filter(|ref_multi| therapy_types.contains(&ref_multi.value().2.therapy_type))
            .map(|ref_multi| {
                let (id, (seq, vector, meta)) = ref_multi.pair();
                let score = Self::cosine_similarity(query, vector);
                (
                    *seq,
                    VectorSearchResult {
                        id: id.clone(),
                        score,
                        metadata: meta.clone(),
                    },
                )
            })
            .collect();

        // 分数相同的按入库先后排序，保证检索结果可复现
        scored.sort_by(|(seq_a, a), (seq_b, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| seq_a.cmp(seq_b))
        });
        scored.truncate(limit);

        Ok(scored.into_iter().map(|(_, result)| result).collect())
    }

    async fn count(&self, therapy_type: &str) -> Result<u64> {
        let count = self
            .vectors
            .iter()
            .filter(|ref_multi| ref_multi.value().2.therapy_type == therapy_type)
            .count();
        Ok(count as u64)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.vectors.contains_key(id))
    }
}

pub fn create_vector_index(dimension: usize) -> std::sync::Arc<dyn VectorIndex> {
    std::sync::Arc::new(MemoryVectorIndex::new(dimension))
}
