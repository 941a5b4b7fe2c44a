//! Handlers 模块
//!
//! 定义 API 请求处理函数。

pub mod record_handler;
pub mod session_handler;
pub mod training_handler;
