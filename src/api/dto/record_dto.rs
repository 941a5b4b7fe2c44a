//! 病历 DTO

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::record::{MedicalRecord, ScaleResult};

/// 病历响应
#[derive(Debug, Serialize)]
pub struct MedicalRecordResponse {
    pub id: Uuid,
    pub session_id: Uuid,
    pub subject_id: String,
    pub therapy_type: String,
    pub core_topic: String,
    pub pre_scales: Vec<ScaleResult>,
    pub post_scales: Vec<ScaleResult>,
    pub improvement: f64,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl From<MedicalRecord> for MedicalRecordResponse {
    fn from(record: MedicalRecord) -> Self {
        Self {
            id: record.id,
            session_id: record.session_id,
            subject_id: record.subject_id,
            therapy_type: record.therapy_type,
            core_topic: record.core_topic,
            pre_scales: record.pre_scales.results,
            post_scales: record.post_scales.results,
            improvement: record.improvement,
            summary: record.summary,
            created_at: record.created_at,
        }
    }
}
