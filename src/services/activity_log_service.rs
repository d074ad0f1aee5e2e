//! 活动日志服务
//!
//! 记录活动的唯一入口：条目先缓冲到 JSON 文件，缓冲达到容量阈值后
//! 在同一次调用内整批刷写数据库。只有整批全部成功才清空缓冲，
//! 失败时保留全部条目等待下次调用重试，因此同一条目可能被写入
//! 多次（至少一次语义）。任何后端失败都被吸收为布尔结果，
//! 审计日志绝不拖垮调用方的主操作。

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::buffer::BufferStore;
use crate::config::ActivityLogConfig;
use crate::error::AppError;
use crate::models::activity_log::{
    ActivityLogEntry, ActivityLogFilters, ActivityLogRecord, ActivityStatus,
};
use crate::repository::{ActivityLogRepository, ActivityStore};

/// 活动操作类型
#[derive(Debug, Clone, Copy)]
pub enum ActivityAction {
    // 用户相关
    UserRegister,
    UserLoginSuccess,
    UserLoginFailed,
    UserLogout,
    UserUpdate,
    UserDelete,

    // 账户相关
    AccountCreate,
    AccountUpdate,
    AccountDelete,

    // 交易相关
    TransactionCreate,
    TransactionUpdate,
    TransactionDelete,

    // 分类相关
    CategoryCreate,
    CategoryUpdate,
    CategoryDelete,

    // 贷款相关
    LoanCreate,
    LoanUpdate,
    LoanDelete,

    // 投资相关
    InvestmentCreate,
    InvestmentUpdate,
    InvestmentDelete,

    // 对账单相关
    StatementExtract,

    // 系统相关
    SystemStartup,
    SystemShutdown,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::UserRegister => "user_register",
            ActivityAction::UserLoginSuccess => "user_login_success",
            ActivityAction::UserLoginFailed => "user_login_failed",
            ActivityAction::UserLogout => "user_logout",
            ActivityAction::UserUpdate => "user_update",
            ActivityAction::UserDelete => "user_delete",

            ActivityAction::AccountCreate => "account_create",
            ActivityAction::AccountUpdate => "account_update",
            ActivityAction::AccountDelete => "account_delete",

            ActivityAction::TransactionCreate => "transaction_create",
            ActivityAction::TransactionUpdate => "transaction_update",
            ActivityAction::TransactionDelete => "transaction_delete",

            ActivityAction::CategoryCreate => "category_create",
            ActivityAction::CategoryUpdate => "category_update",
            ActivityAction::CategoryDelete => "category_delete",

            ActivityAction::LoanCreate => "loan_create",
            ActivityAction::LoanUpdate => "loan_update",
            ActivityAction::LoanDelete => "loan_delete",

            ActivityAction::InvestmentCreate => "investment_create",
            ActivityAction::InvestmentUpdate => "investment_update",
            ActivityAction::InvestmentDelete => "investment_delete",

            ActivityAction::StatementExtract => "statement_extract",

            ActivityAction::SystemStartup => "system_startup",
            ActivityAction::SystemShutdown => "system_shutdown",
        }
    }
}

/// 活动日志参数结构体
///
/// `created_at` 不在参数中：由服务在调用时刻统一打点。
#[derive(Debug, Clone)]
pub struct ActivityLogParams<'a> {
    pub user_id: Option<i32>,
    pub action: &'a str,
    pub resource_type: Option<&'a str>,
    pub resource_id: Option<i32>,
    pub description: Option<&'a str>,
    pub metadata: Option<serde_json::Value>,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub status: ActivityStatus,
    pub error_message: Option<&'a str>,
}

impl<'a> ActivityLogParams<'a> {
    /// 以默认值构造（status = success，其余字段为空）
    pub fn new(action: &'a str) -> Self {
        Self {
            user_id: None,
            action,
            resource_type: None,
            resource_id: None,
            description: None,
            metadata: None,
            ip_address: None,
            user_agent: None,
            status: ActivityStatus::Success,
            error_message: None,
        }
    }
}

/// 缓冲区状态快照
#[derive(Debug, Clone, Serialize)]
pub struct BufferStatus {
    pub buffered_count: usize,
    pub max_buffer_size: usize,
    pub buffer_file_exists: bool,
    pub buffer_usage_percent: f32,
}

/// 活动日志服务
pub struct ActivityLogService<S: ActivityStore = ActivityLogRepository> {
    store: S,
    buffer: BufferStore,
    max_buffer_size: usize,
    /// 缓冲文件是整体读改写资源，所有访问必须经此锁串行化
    buffer_lock: Mutex<()>,
}

impl<S: ActivityStore> ActivityLogService<S> {
    pub fn new(store: S, config: &ActivityLogConfig) -> Self {
        Self {
            store,
            buffer: BufferStore::new(config.buffer_path.as_str()),
            max_buffer_size: config.max_buffer_size,
            buffer_lock: Mutex::new(()),
        }
    }

    /// 使用现成的缓冲区构造（测试与嵌入场景）
    pub fn with_buffer(store: S, buffer: BufferStore, max_buffer_size: usize) -> Self {
        Self {
            store,
            buffer,
            max_buffer_size,
            buffer_lock: Mutex::new(()),
        }
    }

    /// 记录一次活动
    ///
    /// 返回 true 表示条目已落盘：低于阈值时已持久化到缓冲文件，
    /// 达到阈值时整批条目已全部写入数据库。返回 false 表示缓冲
    /// 写入失败或刷写未完全成功；刷写失败时所有条目（含本次的）
    /// 保留在缓冲中，下次调用会重试整批。
    pub async fn log_activity(&self, params: ActivityLogParams<'_>) -> bool {
        if params.action.trim().is_empty() {
            warn!("Rejected activity log with empty action");
            return false;
        }

        let entry = ActivityLogEntry {
            user_id: params.user_id,
            action: params.action.to_string(),
            resource_type: params.resource_type.map(str::to_string),
            resource_id: params.resource_id,
            description: params.description.map(str::to_string),
            log_data: params.metadata,
            ip_address: params.ip_address.map(str::to_string),
            user_agent: params.user_agent.map(str::to_string),
            status: params.status,
            error_message: params.error_message.map(str::to_string),
            created_at: chrono::Utc::now(),
        };

        let _guard = self.buffer_lock.lock().await;

        let mut buffered = self.buffer.load();
        buffered.push(entry);

        if buffered.len() >= self.max_buffer_size {
            if self.flush_batch(&buffered).await {
                if let Err(e) = self.buffer.clear() {
                    // 条目已入库，文件残留只会造成重复行
                    warn!(error = %e, "Flushed buffer but failed to remove buffer file");
                }
                metrics::gauge!("activity_log.buffered").set(0.0);
                info!(count = buffered.len(), "Flushed activity logs to database");
                return true;
            }

            // 刷写失败：整批条目（含触发条目）写回缓冲等待重试
            if let Err(e) = self.buffer.save(&buffered) {
                error!(error = %e, "Flush failed and buffer could not be persisted");
            } else {
                error!(
                    count = buffered.len(),
                    "Failed to flush activity logs, keeping in buffer"
                );
            }
            metrics::gauge!("activity_log.buffered").set(buffered.len() as f64);
            return false;
        }

        match self.buffer.save(&buffered) {
            Ok(()) => {
                metrics::gauge!("activity_log.buffered").set(buffered.len() as f64);
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to save activity log buffer");
                false
            }
        }
    }

    /// 记录用户操作
    pub async fn log_user_action(
        &self,
        user_id: i32,
        action: ActivityAction,
        description: Option<&str>,
    ) -> bool {
        self.log_activity(ActivityLogParams {
            user_id: Some(user_id),
            description,
            ..ActivityLogParams::new(action.as_str())
        })
        .await
    }

    /// 记录系统事件（无用户主体）
    pub async fn log_system_action(
        &self,
        action: ActivityAction,
        description: Option<&str>,
    ) -> bool {
        self.log_activity(ActivityLogParams {
            description,
            ..ActivityLogParams::new(action.as_str())
        })
        .await
    }

    /// 按需刷写全部缓冲条目（优雅停机、运维排空）
    ///
    /// 缓冲为空时直接返回 true，不触碰永久存储。
    pub async fn force_flush(&self) -> bool {
        let _guard = self.buffer_lock.lock().await;

        let buffered = self.buffer.load();
        if buffered.is_empty() {
            return true;
        }

        if !self.flush_batch(&buffered).await {
            return false;
        }

        if let Err(e) = self.buffer.clear() {
            warn!(error = %e, "Flushed buffer but failed to remove buffer file");
        }
        metrics::gauge!("activity_log.buffered").set(0.0);
        info!(count = buffered.len(), "Force-flushed activity logs to database");
        true
    }

    /// 缓冲区状态快照（只读，无副作用）
    pub async fn get_buffer_status(&self) -> BufferStatus {
        let _guard = self.buffer_lock.lock().await;

        let buffered_count = self.buffer.load().len();
        BufferStatus {
            buffered_count,
            max_buffer_size: self.max_buffer_size,
            buffer_file_exists: self.buffer.exists(),
            buffer_usage_percent: (buffered_count as f32 / self.max_buffer_size as f32) * 100.0,
        }
    }

    /// 查询已持久化的活动日志
    pub async fn get_activity_logs(
        &self,
        filters: &ActivityLogFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ActivityLogRecord>, AppError> {
        self.store.query_entries(filters, limit, offset).await
    }

    /// 统计匹配的活动日志条数
    pub async fn count_activity_logs(&self, filters: &ActivityLogFilters) -> Result<i64, AppError> {
        self.store.count_entries(filters).await
    }

    /// 整批刷写：逐条写入并统计成功数
    ///
    /// 单条失败不会中止整批，所有条目尝试完毕后才判定结果；
    /// 只有 successes == total 才算刷写成功。
    async fn flush_batch(&self, entries: &[ActivityLogEntry]) -> bool {
        let mut success_count = 0usize;

        for (index, entry) in entries.iter().enumerate() {
            match self.store.insert_entry(entry).await {
                Ok(()) => success_count += 1,
                Err(e) => {
                    error!(
                        index,
                        action = %entry.action,
                        error = %e,
                        "Failed to persist activity log entry"
                    );
                }
            }
        }

        metrics::counter!("activity_log.flushed_total").increment(success_count as u64);

        if success_count == entries.len() {
            debug!(count = entries.len(), "All buffered entries persisted");
            true
        } else {
            metrics::counter!("activity_log.flush_failures_total").increment(1);
            warn!(
                success_count,
                total = entries.len(),
                "Partial flush, buffer will be retained"
            );
            false
        }
    }
}
