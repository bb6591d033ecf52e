//! 订单与订单明细实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OrderStatus;

/// 订单
///
/// 由下单操作创建，此后只通过状态条件更新变更，永不删除。
/// `pay_time` 仅在 未支付->已支付 迁移时写入一次。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    /// 订单总金额（分），按下单时商品服务返回的单价计算
    pub total_fee: i64,
    /// 支付方式
    pub payment_type: i16,
    pub status: OrderStatus,
    /// 支付完成时间，仅支付成功后非空
    pub pay_time: Option<DateTime<Utc>>,
    pub create_time: DateTime<Utc>,
}

/// 订单明细
///
/// 下单时对商品信息的快照：单价是复制值而非引用，
/// 商品后续调价不会影响历史订单。与订单同事务写入，此后不可变。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderDetail {
    pub id: i64,
    pub order_id: i64,
    pub item_id: i64,
    pub name: String,
    pub spec: Option<String>,
    /// 下单时的商品单价（分）
    pub price: i64,
    pub num: i32,
    pub image: Option<String>,
}

/// 待插入的订单明细（无 id）
#[derive(Debug, Clone)]
pub struct NewOrderDetail {
    pub item_id: i64,
    pub name: String,
    pub spec: Option<String>,
    pub price: i64,
    pub num: i32,
    pub image: Option<String>,
}

/// 死信落库记录
///
/// 对账消息重试耗尽后的持久化形态，只追加不删除、不过期，
/// 人工介入时以此表为操作入口。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeadLetterRecord {
    pub id: i64,
    pub order_id: i64,
    pub source_topic: String,
    pub error: String,
    pub retry_count: i32,
    pub failed_at: DateTime<Utc>,
    /// 处理提示，固定写入"需人工介入"
    pub remark: String,
    pub created_at: DateTime<Utc>,
}
