/// 统一错误处理模块
pub mod error;

/// 配置模块
pub mod config;

/// 功能聚合模块
pub mod features;

/// 应用状态聚合模块
pub mod state;

// 导出常用类型供外部使用
pub use config::AppConfig;
pub use error::{AppError, ErrorEnvelope, FieldError};
pub use state::AppState;
