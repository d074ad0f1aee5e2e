//! Activity log repository (活动日志数据访问)

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::error::AppError;
use crate::models::activity_log::{ActivityLogEntry, ActivityLogFilters, ActivityLogRecord};
use crate::repository::ActivityStore;

pub struct ActivityLogRepository {
    db: PgPool,
}

impl ActivityLogRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ActivityStore for ActivityLogRepository {
    /// 插入活动日志（created_at 来自条目本身，recorded_at 由数据库生成）
    async fn insert_entry(&self, entry: &ActivityLogEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO tb_bb_activity_logs (
                user_id, action, resource_type, resource_id, description,
                log_data, ip_address, user_agent, status, error_message, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.resource_type)
        .bind(entry.resource_id)
        .bind(&entry.description)
        .bind(&entry.log_data)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.status.as_str())
        .bind(&entry.error_message)
        .bind(entry.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// 查询活动日志
    async fn query_entries(
        &self,
        filters: &ActivityLogFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ActivityLogRecord>, AppError> {
        let mut query = String::from("SELECT * FROM tb_bb_activity_logs WHERE 1=1");
        let mut index = 0;

        if filters.user_id.is_some() {
            index += 1;
            query.push_str(&format!(" AND user_id = ${}", index));
        }
        if filters.action.is_some() {
            index += 1;
            query.push_str(&format!(" AND action = ${}", index));
        }
        if filters.status.is_some() {
            index += 1;
            query.push_str(&format!(" AND status = ${}", index));
        }
        if filters.start_time.is_some() {
            index += 1;
            query.push_str(&format!(" AND created_at >= ${}", index));
        }
        if filters.end_time.is_some() {
            index += 1;
            query.push_str(&format!(" AND created_at <= ${}", index));
        }

        query.push_str(&format!(
            " ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            index + 1,
            index + 2
        ));

        let mut query_builder = sqlx::query_as::<_, ActivityLogRecord>(&query);

        if let Some(user_id) = filters.user_id {
            query_builder = query_builder.bind(user_id);
        }
        if let Some(action) = &filters.action {
            query_builder = query_builder.bind(action);
        }
        if let Some(status) = &filters.status {
            query_builder = query_builder.bind(status);
        }
        if let Some(start_time) = filters.start_time {
            query_builder = query_builder.bind(start_time);
        }
        if let Some(end_time) = filters.end_time {
            query_builder = query_builder.bind(end_time);
        }

        let records = query_builder
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

        Ok(records)
    }

    /// 统计活动日志数量
    async fn count_entries(&self, filters: &ActivityLogFilters) -> Result<i64, AppError> {
        let mut query = String::from("SELECT COUNT(*) FROM tb_bb_activity_logs WHERE 1=1");
        let mut index = 0;

        if filters.user_id.is_some() {
            index += 1;
            query.push_str(&format!(" AND user_id = ${}", index));
        }
        if filters.action.is_some() {
            index += 1;
            query.push_str(&format!(" AND action = ${}", index));
        }
        if filters.status.is_some() {
            index += 1;
            query.push_str(&format!(" AND status = ${}", index));
        }
        if filters.start_time.is_some() {
            index += 1;
            query.push_str(&format!(" AND created_at >= ${}", index));
        }
        if filters.end_time.is_some() {
            index += 1;
            query.push_str(&format!(" AND created_at <= ${}", index));
        }

        let mut query_builder = sqlx::query(&query);

        if let Some(user_id) = filters.user_id {
            query_builder = query_builder.bind(user_id);
        }
        if let Some(action) = &filters.action {
            query_builder = query_builder.bind(action);
        }
        if let Some(status) = &filters.status {
            query_builder = query_builder.bind(status);
        }
        if let Some(start_time) = filters.start_time {
            query_builder = query_builder.bind(start_time);
        }
        if let Some(end_time) = filters.end_time {
            query_builder = query_builder.bind(end_time);
        }

        let count: i64 = query_builder.fetch_one(&self.db).await?.get(0);
        Ok(count)
    }
}
