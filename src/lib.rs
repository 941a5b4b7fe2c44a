//! Psyche - 多智能体心理咨询会话编排服务
//!
//! 督导、档案师、咨询师多智能体协同完成一次结构化的咨询流程：
//! 量表测评、画像采集、话题计分、咨询师分诊、四阶段认知行为干预，
//! 以及病历沉淀与经验积累。

pub mod agents;
pub mod api;
pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;
