//! DTO 模块
//!
//! 定义 API 层的请求和响应数据结构。

pub mod record_dto;
pub mod session_dto;
pub mod training_dto;
