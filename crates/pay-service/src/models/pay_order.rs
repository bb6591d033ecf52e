//! 支付单实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PayStatus;

/// 支付单
///
/// `biz_order_no` 唯一，每个业务订单至多一张支付单；
/// 换渠道重新申请时原地重置而非新建，id 与订单关联保持不变。
/// `pay_over_time` 仅记录不主动清理，过期回收依赖订单侧的延迟对账。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PayOrder {
    pub id: i64,
    /// 业务订单号（订单 id）
    pub biz_order_no: i64,
    /// 付款用户 id
    pub biz_user_id: i64,
    /// 支付渠道编码（如 balance）
    pub pay_channel_code: String,
    /// 支付金额（分）
    pub amount: i64,
    pub status: PayStatus,
    /// 支付有效期
    pub pay_over_time: DateTime<Utc>,
    /// 支付成功时间，状态翻转为成功时写入
    pub pay_success_time: Option<DateTime<Utc>>,
    /// 支付二维码地址，换渠道重置时清空
    pub qr_code_url: Option<String>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

/// 新建支付单的写入参数
#[derive(Debug, Clone)]
pub struct NewPayOrder {
    pub biz_order_no: i64,
    pub biz_user_id: i64,
    pub pay_channel_code: String,
    pub amount: i64,
    pub status: PayStatus,
    pub pay_over_time: DateTime<Utc>,
}
