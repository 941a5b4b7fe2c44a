//! 训练 DTO

use serde::{Deserialize, Serialize};

use crate::services::training::{SimulatedSubject, TrainingReport};

/// 批量训练请求
#[derive(Debug, Deserialize)]
pub struct TrainingRequest {
    pub subjects: Vec<SimulatedSubjectDto>,
}

#[derive(Debug, Deserialize)]
pub struct SimulatedSubjectDto {
    pub subject_id: String,
    pub utterances: Vec<String>,
    /// (GHQ-20, Campbell, CPSS) 疗前总分
    pub pre_scales: (f64, f64, f64),
    /// (GHQ-20, Campbell, CPSS) 疗后总分
    pub post_scales: (f64, f64, f64),
}

impl From<SimulatedSubjectDto> for SimulatedSubject {
    fn from(dto: SimulatedSubjectDto) -> Self {
        Self {
            subject_id: dto.subject_id,
            utterances: dto.utterances,
            pre_scales: dto.pre_scales,
            post_scales: dto.post_scales,
        }
    }
}

/// 批量训练响应
#[derive(Debug, Serialize)]
pub struct TrainingResponse {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub failures: Vec<TrainingFailureDto>,
}

#[derive(Debug, Serialize)]
pub struct TrainingFailureDto {
    pub subject_id: String,
    pub error: String,
}

impl From<TrainingReport> for TrainingResponse {
    fn from(report: TrainingReport) -> Self {
        Self {
            total: report.total,
            completed: report.completed,
            failed: report.failed,
            failures: report
                .outcomes
                .into_iter()
                .filter(|o| !o.closed)
                .map(|o| TrainingFailureDto {
                    subject_id: o.subject_id,
                    error: o.error.unwrap_or_else(|| "未正常关闭".to_string()),
                })
                .collect(),
        }
    }
}
