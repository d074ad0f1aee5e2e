//! Database repository layer

pub mod activity_log_repo;

pub use activity_log_repo::ActivityLogRepository;

use crate::error::AppError;
use crate::models::activity_log::{ActivityLogEntry, ActivityLogFilters, ActivityLogRecord};

/// 永久存储端口
///
/// 一条成功刷写的缓冲条目对应审计表中的一行，行一经插入不再更新。
/// 单条写入的成败独立上报，由调用方统计整批结果。
#[async_trait::async_trait]
pub trait ActivityStore: Send + Sync {
    /// 将单个条目写入永久存储
    async fn insert_entry(&self, entry: &ActivityLogEntry) -> Result<(), AppError>;

    /// 按过滤条件查询已持久化的日志，按 created_at 倒序
    async fn query_entries(
        &self,
        filters: &ActivityLogFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ActivityLogRecord>, AppError>;

    /// 统计匹配的日志条数
    async fn count_entries(&self, filters: &ActivityLogFilters) -> Result<i64, AppError>;
}
