//! 缓冲与刷写管道集成测试
//!
//! 使用内存 mock 永久存储验证缓冲阈值、整批刷写与失败保留语义

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use budgetbrain_activity::buffer::BufferStore;
use budgetbrain_activity::error::AppError;
use budgetbrain_activity::models::activity_log::{
    ActivityLogEntry, ActivityLogFilters, ActivityLogRecord, ActivityStatus,
};
use budgetbrain_activity::repository::ActivityStore;
use budgetbrain_activity::services::activity_log_service::{
    ActivityLogParams, ActivityLogService,
};
use tempfile::TempDir;

/// 记录所有写入的 mock 永久存储，可配置第 N 次插入失败或全部失败
#[derive(Clone)]
struct MockStore {
    inner: Arc<MockStoreInner>,
}

struct MockStoreInner {
    inserted: Mutex<Vec<ActivityLogEntry>>,
    attempts: AtomicUsize,
    fail_on_attempt: Option<usize>,
    fail_all: bool,
}

impl MockStore {
    fn new() -> Self {
        Self::with_failures(None, false)
    }

    /// 第 attempt 次插入失败（从 1 开始计数），其余成功
    fn failing_on(attempt: usize) -> Self {
        Self::with_failures(Some(attempt), false)
    }

    fn failing_always() -> Self {
        Self::with_failures(None, true)
    }

    fn with_failures(fail_on_attempt: Option<usize>, fail_all: bool) -> Self {
        Self {
            inner: Arc::new(MockStoreInner {
                inserted: Mutex::new(Vec::new()),
                attempts: AtomicUsize::new(0),
                fail_on_attempt,
                fail_all,
            }),
        }
    }

    fn inserted_count(&self) -> usize {
        self.inner.inserted.lock().unwrap().len()
    }

    fn inserted_actions(&self) -> Vec<String> {
        self.inner
            .inserted
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }

    fn inserted_entries(&self) -> Vec<ActivityLogEntry> {
        self.inner.inserted.lock().unwrap().clone()
    }

    fn attempt_count(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActivityStore for MockStore {
    async fn insert_entry(&self, entry: &ActivityLogEntry) -> Result<(), AppError> {
        let attempt = self.inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.inner.fail_all || self.inner.fail_on_attempt == Some(attempt) {
            return Err(AppError::Database(sqlx::Error::PoolClosed));
        }
        self.inner.inserted.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn query_entries(
        &self,
        _filters: &ActivityLogFilters,
        _limit: i64,
        _offset: i64,
    ) -> Result<Vec<ActivityLogRecord>, AppError> {
        Ok(Vec::new())
    }

    async fn count_entries(&self, _filters: &ActivityLogFilters) -> Result<i64, AppError> {
        Ok(self.inserted_count() as i64)
    }
}

fn service_in(
    tmp: &TempDir,
    store: MockStore,
    max_buffer_size: usize,
) -> ActivityLogService<MockStore> {
    let buffer = BufferStore::new(tmp.path().join("activity_logs.json"));
    ActivityLogService::with_buffer(store, buffer, max_buffer_size)
}

/// 旁路读取缓冲文件，验证服务写入的内容
fn buffer_reader(tmp: &TempDir) -> BufferStore {
    BufferStore::new(tmp.path().join("activity_logs.json"))
}

#[tokio::test]
async fn buffers_entries_below_threshold_in_order() {
    // 低于阈值：写入只进缓冲，数据库无行
    let tmp = TempDir::new().unwrap();
    let store = MockStore::new();
    let service = service_in(&tmp, store.clone(), 50);

    for i in 0..49 {
        let action = format!("action_{}", i);
        assert!(service.log_activity(ActivityLogParams::new(&action)).await);
    }

    let status = service.get_buffer_status().await;
    assert_eq!(status.buffered_count, 49);
    assert_eq!(status.max_buffer_size, 50);
    assert!(status.buffer_file_exists);
    assert_eq!(store.inserted_count(), 0);

    // 缓冲中的顺序与调用顺序一致
    let buffered = buffer_reader(&tmp).load();
    let actions: Vec<_> = buffered.iter().map(|e| e.action.as_str()).collect();
    let expected: Vec<String> = (0..49).map(|i| format!("action_{}", i)).collect();
    assert_eq!(actions, expected.iter().map(String::as_str).collect::<Vec<_>>());
}

#[tokio::test]
async fn flush_triggers_at_threshold_and_clears_buffer() {
    // 第 50 次写入在同一调用内触发整批刷写
    let tmp = TempDir::new().unwrap();
    let store = MockStore::new();
    let service = service_in(&tmp, store.clone(), 50);

    for i in 0..50 {
        let action = format!("action_{}", i);
        assert!(service.log_activity(ActivityLogParams::new(&action)).await);
    }

    let status = service.get_buffer_status().await;
    assert_eq!(status.buffered_count, 0);
    assert!(!status.buffer_file_exists);

    // 数据库 50 行，保持调用顺序
    let actions = store.inserted_actions();
    assert_eq!(actions.len(), 50);
    let expected: Vec<String> = (0..50).map(|i| format!("action_{}", i)).collect();
    assert_eq!(actions, expected);
}

#[tokio::test]
async fn partial_failure_retains_full_buffer() {
    // 单条插入失败时整批保留，已成功插入的行不回滚
    let tmp = TempDir::new().unwrap();
    let store = MockStore::failing_on(30);
    let service = service_in(&tmp, store.clone(), 50);

    for i in 0..49 {
        let action = format!("action_{}", i);
        assert!(service.log_activity(ActivityLogParams::new(&action)).await);
    }

    let result = service.log_activity(ActivityLogParams::new("action_49")).await;
    assert!(!result);

    let status = service.get_buffer_status().await;
    assert_eq!(status.buffered_count, 50);
    assert!(status.buffer_file_exists);
    assert_eq!(store.inserted_count(), 49);
}

#[tokio::test]
async fn next_append_retries_oversized_buffer() {
    // 部分失败后，下一次写入重试整批（已入库的条目会重复，至少一次语义）
    let tmp = TempDir::new().unwrap();
    let store = MockStore::failing_on(30);
    let service = service_in(&tmp, store.clone(), 50);

    for i in 0..50 {
        let action = format!("action_{}", i);
        service.log_activity(ActivityLogParams::new(&action)).await;
    }
    assert_eq!(store.inserted_count(), 49);
    assert_eq!(service.get_buffer_status().await.buffered_count, 50);

    // 第 51 次写入：缓冲 51 条 >= 阈值，整批重试且全部成功
    assert!(service.log_activity(ActivityLogParams::new("action_50")).await);

    let status = service.get_buffer_status().await;
    assert_eq!(status.buffered_count, 0);
    // 49 行旧数据 + 51 行重试批次
    assert_eq!(store.inserted_count(), 100);
}

#[tokio::test]
async fn total_failure_returns_false_without_panic() {
    // 数据库整体不可用时返回 false，不向调用方抛出
    let tmp = TempDir::new().unwrap();
    let store = MockStore::failing_always();
    let service = service_in(&tmp, store.clone(), 3);

    assert!(service.log_activity(ActivityLogParams::new("a")).await);
    assert!(service.log_activity(ActivityLogParams::new("b")).await);
    let result = service.log_activity(ActivityLogParams::new("c")).await;
    assert!(!result);

    let status = service.get_buffer_status().await;
    assert_eq!(status.buffered_count, 3);
    assert_eq!(store.inserted_count(), 0);
}

#[tokio::test]
async fn buffer_write_failure_returns_false() {
    // 缓冲后端不可写（路径指向目录）时返回 false
    let tmp = TempDir::new().unwrap();
    let store = MockStore::new();
    let buffer = BufferStore::new(tmp.path());
    let service = ActivityLogService::with_buffer(store.clone(), buffer, 50);

    let result = service.log_activity(ActivityLogParams::new("user_login_success")).await;
    assert!(!result);
    assert_eq!(store.inserted_count(), 0);
}

#[tokio::test]
async fn force_flush_empty_buffer_is_noop() {
    // 空缓冲的 force_flush 返回 true 且不触碰存储
    let tmp = TempDir::new().unwrap();
    let store = MockStore::new();
    let service = service_in(&tmp, store.clone(), 50);

    assert!(service.force_flush().await);
    assert_eq!(store.attempt_count(), 0);
}

#[tokio::test]
async fn force_flush_drains_buffer_below_threshold() {
    let tmp = TempDir::new().unwrap();
    let store = MockStore::new();
    let service = service_in(&tmp, store.clone(), 50);

    for action in ["user_register", "account_create", "transaction_create"] {
        assert!(service.log_activity(ActivityLogParams::new(action)).await);
    }

    assert!(service.force_flush().await);

    let status = service.get_buffer_status().await;
    assert_eq!(status.buffered_count, 0);
    assert!(!status.buffer_file_exists);
    assert_eq!(
        store.inserted_actions(),
        vec!["user_register", "account_create", "transaction_create"]
    );
}

#[tokio::test]
async fn force_flush_failure_keeps_buffer() {
    let tmp = TempDir::new().unwrap();
    let store = MockStore::failing_always();
    let service = service_in(&tmp, store.clone(), 50);

    service.log_activity(ActivityLogParams::new("a")).await;
    service.log_activity(ActivityLogParams::new("b")).await;

    assert!(!service.force_flush().await);
    assert_eq!(service.get_buffer_status().await.buffered_count, 2);
}

#[tokio::test]
async fn corrupt_buffer_file_is_discarded() {
    // 损坏的缓冲文件被丢弃，新条目正常写入
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("activity_logs.json");
    std::fs::write(&path, "%% definitely not json %%").unwrap();

    let store = MockStore::new();
    let service = ActivityLogService::with_buffer(store, BufferStore::new(&path), 50);

    assert!(service.log_activity(ActivityLogParams::new("user_login_success")).await);

    let status = service.get_buffer_status().await;
    assert_eq!(status.buffered_count, 1);
}

#[tokio::test]
async fn empty_action_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = MockStore::new();
    let service = service_in(&tmp, store.clone(), 50);

    assert!(!service.log_activity(ActivityLogParams::new("")).await);
    assert!(!service.log_activity(ActivityLogParams::new("   ")).await);

    let status = service.get_buffer_status().await;
    assert_eq!(status.buffered_count, 0);
    assert!(!status.buffer_file_exists);
}

#[tokio::test]
async fn created_at_is_stamped_once_and_survives_flush() {
    // created_at 在构造时打点，经缓冲与刷写不变
    let tmp = TempDir::new().unwrap();
    let store = MockStore::new();
    let service = service_in(&tmp, store.clone(), 50);

    let params = ActivityLogParams {
        user_id: Some(12),
        resource_type: Some("transaction"),
        resource_id: Some(77),
        metadata: Some(serde_json::json!({"amount": 45.9})),
        status: ActivityStatus::Warning,
        error_message: Some("partial import"),
        ..ActivityLogParams::new("transaction_create")
    };
    assert!(service.log_activity(params).await);

    let buffered = buffer_reader(&tmp).load();
    assert_eq!(buffered.len(), 1);
    let buffered_entry = buffered[0].clone();

    assert!(service.force_flush().await);

    let inserted = service_inserted_single(&store);
    assert_eq!(inserted, buffered_entry);
    assert_eq!(inserted.status, ActivityStatus::Warning);
    assert_eq!(inserted.created_at, buffered_entry.created_at);
}

fn service_inserted_single(store: &MockStore) -> ActivityLogEntry {
    let entries = store.inserted_entries();
    assert_eq!(entries.len(), 1);
    entries[0].clone()
}

#[tokio::test]
async fn buffer_usage_percent_reflects_fill_level() {
    let tmp = TempDir::new().unwrap();
    let store = MockStore::new();
    let service = service_in(&tmp, store, 4);

    service.log_activity(ActivityLogParams::new("a")).await;
    service.log_activity(ActivityLogParams::new("b")).await;

    let status = service.get_buffer_status().await;
    assert_eq!(status.buffered_count, 2);
    assert!((status.buffer_usage_percent - 50.0).abs() < f32::EPSILON);
}
