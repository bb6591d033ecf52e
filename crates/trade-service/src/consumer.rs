//! 支付成功事件消费者
//!
//! 订单状态收敛的直接路径：支付服务发布 `pay.success` 事件，
//! 本消费者收到后把订单标记为已支付。标记是条件更新，
//! 重复投递或与延迟对账路径交错都只会产生良性无操作。

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use mall_shared::config::AppConfig;
use mall_shared::error::Result;
use mall_shared::kafka::{AckMode, ConsumerMessage, MessageConsumer, topics};
use mall_shared::messages::PaySuccessMessage;

use crate::service::OrderService;

/// 支付成功事件消费者
pub struct PayStatusConsumer {
    consumer: MessageConsumer,
    order_service: Arc<OrderService>,
}

impl PayStatusConsumer {
    pub fn new(config: &AppConfig, order_service: Arc<OrderService>) -> Result<Self> {
        let consumer = MessageConsumer::new(&config.kafka, Some("pay-status"), AckMode::Auto)?;
        Ok(Self {
            consumer,
            order_service,
        })
    }

    /// 启动消费循环，直到收到 shutdown 信号
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.consumer.subscribe(&[topics::PAY_SUCCESS])?;

        info!(topic = topics::PAY_SUCCESS, "支付成功事件消费者已启动");

        let order_service = self.order_service;

        self.consumer
            .start(shutdown, |msg| {
                let order_service = order_service.clone();
                async move { handle_pay_success(&order_service, &msg).await }
            })
            .await;

        info!("支付成功事件消费者已停止");
        Ok(())
    }
}

/// 处理单条支付成功事件
///
/// 处理失败（如数据库瞬时故障）返回 Err 由消费循环记日志；
/// at-least-once 投递下该订单最终仍会经由延迟对账路径收敛。
pub async fn handle_pay_success(
    order_service: &OrderService,
    msg: &ConsumerMessage,
) -> Result<()> {
    let event: PaySuccessMessage = msg.deserialize_payload()?;

    info!(
        order_id = event.order_id,
        pay_order_id = event.pay_order_id,
        "收到支付成功事件"
    );

    order_service.mark_order_pay_success(event.order_id).await
}
