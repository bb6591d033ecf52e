//! 死信记录仓储
//!
//! 只追加的失败台账：对账消息重试耗尽后先落库、后确认，
//! 人工介入以此表为操作入口。记录永不删除、无自动过期。

use chrono::Utc;
use sqlx::PgPool;

use mall_shared::error::Result;
use mall_shared::messages::DeadLetterMessage;

use crate::models::DeadLetterRecord;

/// 人工处理提示，写入每条死信记录
const REMARK_MANUAL_REVIEW: &str = "需人工介入";

/// 死信记录仓储
pub struct DeadLetterRepository {
    pool: PgPool,
}

impl DeadLetterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 持久化一条死信，返回记录 id
    ///
    /// 调用方必须在此调用成功之后才能确认消息，保证"确认即已落库"。
    pub async fn insert(&self, msg: &DeadLetterMessage) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO dead_letter_record
                (order_id, source_topic, error, retry_count, failed_at, remark, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(msg.order_id)
        .bind(&msg.source_topic)
        .bind(&msg.error)
        .bind(msg.retry_count as i32)
        .bind(msg.failed_at)
        .bind(REMARK_MANUAL_REVIEW)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// 按时间倒序列出最近的死信记录，供人工排查
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<DeadLetterRecord>> {
        let records = sqlx::query_as::<_, DeadLetterRecord>(
            r#"
            SELECT id, order_id, source_topic, error, retry_count, failed_at, remark, created_at
            FROM dead_letter_record
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
