//! 统一错误模型
//! 定义活动日志管道的内部错误类型
//!
//! 注意：错误不会越过 `ActivityLogService` 的对外边界，
//! 服务层将所有失败吸收为布尔结果并记录日志。

use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Buffer I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
