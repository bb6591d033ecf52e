//! 支付单仓储

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use mall_shared::error::Result;

use crate::models::{NewPayOrder, PayOrder, PayStatus};

/// 支付单数据访问
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PayOrderRepo: Send + Sync {
    /// 按 id 查询支付单
    async fn get(&self, pay_order_id: i64) -> Result<Option<PayOrder>>;

    /// 按业务订单号查询支付单（每个订单至多一张）
    async fn get_by_biz_order_no(&self, biz_order_no: i64) -> Result<Option<PayOrder>>;

    /// 新建支付单，返回 id
    async fn create(&self, new: &NewPayOrder) -> Result<i64>;

    /// 换渠道重置：更新渠道与有效期、清空二维码引用，
    /// id 与订单关联保持不变
    async fn reset_for_channel_switch(
        &self,
        pay_order_id: i64,
        pay_channel_code: &str,
        pay_over_time: DateTime<Utc>,
    ) -> Result<()>;

    /// 条件翻转为支付成功并写入成功时间
    ///
    /// 仅当支付单仍处于可支付状态（未提交/待支付）时生效；
    /// 返回 false 表示并发支付或关闭已先一步赢得状态。
    async fn mark_success(
        &self,
        pay_order_id: i64,
        pay_success_time: DateTime<Utc>,
    ) -> Result<bool>;
}

/// PostgreSQL 实现
pub struct PgPayOrderRepository {
    pool: PgPool,
}

impl PgPayOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, biz_order_no, biz_user_id, pay_channel_code, amount, status,
           pay_over_time, pay_success_time, qr_code_url, create_time, update_time
    FROM pay_order
"#;

#[async_trait]
impl PayOrderRepo for PgPayOrderRepository {
    async fn get(&self, pay_order_id: i64) -> Result<Option<PayOrder>> {
        let order = sqlx::query_as::<_, PayOrder>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(pay_order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(order)
    }

    async fn get_by_biz_order_no(&self, biz_order_no: i64) -> Result<Option<PayOrder>> {
        let order =
            sqlx::query_as::<_, PayOrder>(&format!("{SELECT_COLUMNS} WHERE biz_order_no = $1"))
                .bind(biz_order_no)
                .fetch_optional(&self.pool)
                .await?;

        Ok(order)
    }

    async fn create(&self, new: &NewPayOrder) -> Result<i64> {
        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO pay_order
                (biz_order_no, biz_user_id, pay_channel_code, amount, status,
                 pay_over_time, create_time, update_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING id
            "#,
        )
        .bind(new.biz_order_no)
        .bind(new.biz_user_id)
        .bind(&new.pay_channel_code)
        .bind(new.amount)
        .bind(new.status)
        .bind(new.pay_over_time)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn reset_for_channel_switch(
        &self,
        pay_order_id: i64,
        pay_channel_code: &str,
        pay_over_time: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pay_order
            SET pay_channel_code = $1,
                pay_over_time = $2,
                qr_code_url = NULL,
                update_time = $3
            WHERE id = $4
            "#,
        )
        .bind(pay_channel_code)
        .bind(pay_over_time)
        .bind(Utc::now())
        .bind(pay_order_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_success(
        &self,
        pay_order_id: i64,
        pay_success_time: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE pay_order
            SET status = $1, pay_success_time = $2, update_time = $3
            WHERE id = $4 AND status IN ($5, $6)
            "#,
        )
        .bind(PayStatus::TradeSuccess)
        .bind(pay_success_time)
        .bind(Utc::now())
        .bind(pay_order_id)
        .bind(PayStatus::NotCommit)
        .bind(PayStatus::WaitBuyerPay)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
