//! 订单仓储
//!
//! 提供订单与订单明细的数据访问。状态迁移使用条件更新
//! （`UPDATE ... WHERE id = $1 AND status = 1`）充当乐观锁：
//! 并发调用者中至多一个观察到迁移成功，其余拿到 0 行受影响。

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use mall_shared::error::Result;

use crate::models::{NewOrderDetail, Order, OrderDetail, OrderStatus};

/// 订单仓储
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 获取事务句柄，创建订单的事务边界由服务层控制
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ==================== 查询操作 ====================

    /// 按 id 查询订单
    pub async fn get_order(&self, order_id: i64) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, user_id, total_fee, payment_type, status, pay_time, create_time
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// 列出订单的全部明细
    pub async fn list_details(&self, order_id: i64) -> Result<Vec<OrderDetail>> {
        let details = sqlx::query_as::<_, OrderDetail>(
            r#"
            SELECT id, order_id, item_id, name, spec, price, num, image
            FROM order_detail
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(details)
    }

    // ==================== 事务内写入 ====================

    /// 插入订单（状态固定为未支付），返回新订单 id
    pub async fn insert_order(
        &self,
        conn: &mut PgConnection,
        user_id: i64,
        total_fee: i64,
        payment_type: i16,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (user_id, total_fee, payment_type, status, create_time)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(total_fee)
        .bind(payment_type)
        .bind(OrderStatus::Unpaid)
        .bind(Utc::now())
        .fetch_one(conn)
        .await?;

        Ok(id)
    }

    /// 批量插入订单明细，与订单同事务
    pub async fn insert_details(
        &self,
        conn: &mut PgConnection,
        order_id: i64,
        details: &[NewOrderDetail],
    ) -> Result<()> {
        for detail in details {
            sqlx::query(
                r#"
                INSERT INTO order_detail (order_id, item_id, name, spec, price, num, image)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order_id)
            .bind(detail.item_id)
            .bind(&detail.name)
            .bind(&detail.spec)
            .bind(detail.price)
            .bind(detail.num)
            .bind(&detail.image)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    // ==================== 条件状态迁移 ====================

    /// 未支付 -> 已支付，同时写入支付完成时间
    ///
    /// 返回是否真正发生了迁移；false 表示订单已不在未支付状态（重复投递或已取消），
    /// 调用方应视为良性无操作。
    pub async fn mark_pay_success(&self, order_id: i64, pay_time: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $1, pay_time = $2
            WHERE id = $3 AND status = $4
            "#,
        )
        .bind(OrderStatus::Paid)
        .bind(pay_time)
        .bind(order_id)
        .bind(OrderStatus::Unpaid)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 未支付 -> 已取消
    pub async fn mark_cancelled(&self, order_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $1
            WHERE id = $2 AND status = $3
            "#,
        )
        .bind(OrderStatus::Cancelled)
        .bind(order_id)
        .bind(OrderStatus::Unpaid)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
