//! 消息信封定义
//!
//! 订单/支付链路中流转的三类消息：延迟对账消息、支付成功事件、死信信封。
//! 统一使用 camelCase JSON 序列化，便于与网关及前端侧的约定保持一致。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// OrderDelayMessage — 延迟对账消息
// ---------------------------------------------------------------------------

/// 延迟对账消息
///
/// 下单时发布，`deliver_at` 为期望的投递时间（发布时间 + 固定延迟）。
/// broker 本身不提供延迟投递，由对账消费者读取 `deliver_at` 并等待到点后再处理，
/// 与死信重试的时间戳门控是同一思路。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDelayMessage {
    /// 业务订单 id
    pub order_id: i64,
    /// 期望投递时间
    pub deliver_at: DateTime<Utc>,
    /// 消息创建时间
    pub created_at: DateTime<Utc>,
}

impl OrderDelayMessage {
    /// 以当前时间为基准构造延迟 `delay_seconds` 秒投递的消息
    pub fn new(order_id: i64, delay_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            deliver_at: now + Duration::seconds(delay_seconds),
            created_at: now,
        }
    }

    /// 距离投递时间还需等待多久；已到点则返回 None
    pub fn remaining_delay(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        let remaining = self.deliver_at - now;
        if remaining > Duration::zero() {
            remaining.to_std().ok()
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// PaySuccessMessage — 支付成功事件
// ---------------------------------------------------------------------------

/// 支付成功事件
///
/// 支付服务在支付单状态翻转为成功后发布，交易服务消费后把订单标记为已支付。
/// 负载只携带业务订单 id：消费方的处理是幂等的条件更新，重复投递无害。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaySuccessMessage {
    /// 业务订单 id
    pub order_id: i64,
    /// 支付单 id
    pub pay_order_id: i64,
    /// 支付成功时间
    pub pay_success_time: DateTime<Utc>,
}

impl PaySuccessMessage {
    pub fn new(order_id: i64, pay_order_id: i64, pay_success_time: DateTime<Utc>) -> Self {
        Self {
            order_id,
            pay_order_id,
            pay_success_time,
        }
    }
}

// ---------------------------------------------------------------------------
// DeadLetterMessage — 死信信封
// ---------------------------------------------------------------------------

/// 死信信封
///
/// 对账消息在消费侧重试耗尽后包装为死信，附加失败原因与重试元数据，
/// 由死信落库消费者持久化后等待人工介入。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterMessage {
    /// 业务订单 id
    pub order_id: i64,
    /// 原始 topic
    pub source_topic: String,
    /// 最后一次失败原因
    pub error: String,
    /// 已重试次数
    pub retry_count: u32,
    /// 进入死信的时间
    pub failed_at: DateTime<Utc>,
    /// 来源服务
    pub source_service: String,
}

impl DeadLetterMessage {
    pub fn new(
        order_id: i64,
        source_topic: impl Into<String>,
        error: impl Into<String>,
        retry_count: u32,
        source_service: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            source_topic: source_topic.into(),
            error: error.into(),
            retry_count,
            failed_at: Utc::now(),
            source_service: source_service.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_delay_message_deliver_at() {
        let msg = OrderDelayMessage::new(1001, 120);
        let delta = msg.deliver_at - msg.created_at;
        assert_eq!(delta.num_seconds(), 120);
    }

    #[test]
    fn test_remaining_delay_before_due() {
        let msg = OrderDelayMessage::new(1001, 120);
        // 刚创建时应还需等待约 120 秒
        let remaining = msg.remaining_delay(msg.created_at).unwrap();
        assert!(remaining.as_secs() >= 119 && remaining.as_secs() <= 120);
    }

    #[test]
    fn test_remaining_delay_after_due() {
        let msg = OrderDelayMessage::new(1001, 120);
        // 投递时间已过，无需等待
        let after = msg.deliver_at + Duration::seconds(1);
        assert!(msg.remaining_delay(after).is_none());
    }

    #[test]
    fn test_pay_success_message_serialization() {
        let msg = PaySuccessMessage::new(1001, 2002, Utc::now());
        let json = serde_json::to_string(&msg).unwrap();

        // camelCase 序列化约定
        assert!(json.contains("orderId"));
        assert!(json.contains("payOrderId"));
        assert!(json.contains("paySuccessTime"));

        let back: PaySuccessMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.order_id, 1001);
        assert_eq!(back.pay_order_id, 2002);
    }

    #[test]
    fn test_dead_letter_message() {
        let msg = DeadLetterMessage::new(
            1001,
            "trade.delay.order",
            "数据库连接失败",
            3,
            "trade-service",
        );

        assert_eq!(msg.order_id, 1001);
        assert_eq!(msg.retry_count, 3);

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("sourceTopic"));
        assert!(json.contains("retryCount"));
        assert!(json.contains("failedAt"));
        assert!(json.contains("sourceService"));
    }
}
