//! 延迟对账消费者
//!
//! 下单 120 秒后收到延迟消息，主动核对支付单状态并把订单推进到终态：
//! 支付已成功则补标记（直接通知丢失时的补偿路径），否则视为放弃支付，
//! 取消订单并恢复库存。订单已不在未支付状态时直接返回（另一条路径已收敛）。
//!
//! 处理失败按退避策略重试，重试耗尽后消息进入死信 topic 由落库消费者持久化。
//! broker 不提供延迟投递，消费侧按信封中的投递时间等待到点后再处理。
//!
//! 延迟消息是订单收敛的唯一兜底，采用处理成功后才提交 offset 的确认模式：
//! 等待期间进程崩溃时消息会被重新投递，而不是被自动提交悄悄确认掉。

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use mall_shared::config::AppConfig;
use mall_shared::error::Result;
use mall_shared::kafka::{AckMode, ConsumerMessage, MessageConsumer, MessageProducer, topics};
use mall_shared::messages::{DeadLetterMessage, OrderDelayMessage};
use mall_shared::retry::{RetryPolicy, retry_with_policy};

use crate::clients::{PayClient, PayOrderDto};
use crate::models::{Order, OrderStatus};
use crate::service::OrderService;

/// 死信信封中的来源服务标识
const SOURCE_SERVICE: &str = "trade-service";

// ---------------------------------------------------------------------------
// 对账决策
// ---------------------------------------------------------------------------

/// 对账动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// 订单不存在或已离开未支付状态，无需处理
    AlreadyResolved,
    /// 支付单已成功但订单仍未支付——补标记为已支付
    MarkPaid,
    /// 支付未成功——视为放弃，取消订单并恢复库存
    Cancel,
}

/// 根据订单与支付单的当前状态决定对账动作
///
/// 纯函数：两条收敛路径的全部交错情形都归结为这三种动作。
pub fn decide(order: Option<&Order>, pay_order: Option<&PayOrderDto>) -> ReconcileAction {
    match order {
        None => ReconcileAction::AlreadyResolved,
        Some(o) if o.status != OrderStatus::Unpaid => ReconcileAction::AlreadyResolved,
        Some(_) => match pay_order {
            Some(p) if p.is_success() => ReconcileAction::MarkPaid,
            _ => ReconcileAction::Cancel,
        },
    }
}

// ---------------------------------------------------------------------------
// ReconciliationWorker — 单条消息的对账处理
// ---------------------------------------------------------------------------

/// 对账处理器
///
/// 与消费循环解耦，便于在重试执行器内反复调用。
pub struct ReconciliationWorker {
    order_service: Arc<OrderService>,
    pay_client: Arc<dyn PayClient>,
}

impl ReconciliationWorker {
    pub fn new(order_service: Arc<OrderService>, pay_client: Arc<dyn PayClient>) -> Self {
        Self {
            order_service,
            pay_client,
        }
    }

    /// 对单个订单执行一次对账
    pub async fn reconcile(&self, order_id: i64) -> Result<()> {
        // 1. 本地订单状态：不在未支付状态说明另一条路径已经收敛
        let order = self.order_service.get_order(order_id).await?;

        // 2. 支付单状态：只有订单仍未支付时才需要查询
        let pay_order = match &order {
            Some(o) if o.status == OrderStatus::Unpaid => {
                self.pay_client
                    .query_pay_order_by_biz_order_no(order_id)
                    .await?
            }
            _ => None,
        };

        match decide(order.as_ref(), pay_order.as_ref()) {
            ReconcileAction::AlreadyResolved => {
                debug!(order_id, "订单已收敛，对账无需处理");
                Ok(())
            }
            ReconcileAction::MarkPaid => {
                // 支付成功通知丢失，由对账补偿
                info!(order_id, "支付单已成功但订单未标记，补偿标记为已支付");
                self.order_service.mark_order_pay_success(order_id).await
            }
            ReconcileAction::Cancel => {
                info!(order_id, "延迟窗口内未完成支付，取消订单并恢复库存");
                self.order_service.cancel_order(order_id).await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ReconciliationConsumer — 消费循环
// ---------------------------------------------------------------------------

/// 延迟对账消费者
///
/// 组合 MessageConsumer（消息拉取）、ReconciliationWorker（对账处理）
/// 与 MessageProducer（死信投递），形成完整的消费管道。
pub struct ReconciliationConsumer {
    consumer: MessageConsumer,
    worker: Arc<ReconciliationWorker>,
    producer: MessageProducer,
    retry_policy: RetryPolicy,
}

impl ReconciliationConsumer {
    /// 创建延迟对账消费者
    ///
    /// 延迟消息处理完成前 offset 不提交：handler 内的到点等待可长达
    /// 延迟窗口全程，自动提交会在等待期间确认消息，崩溃即永久丢失。
    pub fn new(
        config: &AppConfig,
        worker: Arc<ReconciliationWorker>,
        producer: MessageProducer,
    ) -> Result<Self> {
        let consumer = MessageConsumer::new(&config.kafka, Some("delay"), AckMode::AfterHandle)?;
        Ok(Self {
            consumer,
            worker,
            producer,
            retry_policy: RetryPolicy::with_max_retries(config.saga.max_consume_retries),
        })
    }

    /// 启动消费循环，直到收到 shutdown 信号
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.consumer.subscribe(&[topics::TRADE_DELAY_ORDER])?;

        info!(topic = topics::TRADE_DELAY_ORDER, "延迟对账消费者已启动");

        let worker = self.worker;
        let producer = self.producer;
        let policy = self.retry_policy;

        self.consumer
            .start(shutdown, |msg| {
                let worker = worker.clone();
                let producer = producer.clone();
                let policy = policy.clone();
                async move { handle_delay_message(&worker, &producer, &policy, &msg).await }
            })
            .await;

        info!("延迟对账消费者已停止");
        Ok(())
    }
}

/// 解析延迟消息负载
///
/// 无法反序列化的消息没有重试价值，构造死信信封（order_id 置 0，
/// 错误中附带原始负载）由调用方送入台账，不允许确认后无声丢弃。
fn parse_delay_message(
    msg: &ConsumerMessage,
) -> std::result::Result<OrderDelayMessage, DeadLetterMessage> {
    msg.deserialize_payload().map_err(|e| {
        DeadLetterMessage::new(
            0,
            topics::TRADE_DELAY_ORDER,
            format!("{e}; 原始负载: {}", String::from_utf8_lossy(&msg.payload)),
            0,
            SOURCE_SERVICE,
        )
    })
}

/// 处理单条延迟消息的完整流程
///
/// 拆分为独立函数而非方法，便于在测试中直接调用而无需构造完整的 Consumer。
/// 流程：反序列化 -> 等待到投递时间 -> 带重试的对账 -> 耗尽后送入死信
pub async fn handle_delay_message(
    worker: &ReconciliationWorker,
    producer: &MessageProducer,
    policy: &RetryPolicy,
    msg: &ConsumerMessage,
) -> Result<()> {
    let delay_msg = match parse_delay_message(msg) {
        Ok(delay_msg) => delay_msg,
        Err(dead_letter) => {
            // 坏负载也要进台账；投递失败返回 Err，消息会被重新拉取
            error!(error = %dead_letter.error, "延迟消息无法解析，直接送入死信");
            producer
                .send_json(topics::TRADE_DEAD_LETTER, "unparseable", &dead_letter)
                .await?;
            return Ok(());
        }
    };
    let order_id = delay_msg.order_id;

    // 延迟门控：未到投递时间则等待
    if let Some(wait) = delay_msg.remaining_delay(chrono::Utc::now()) {
        debug!(order_id, wait_secs = wait.as_secs(), "延迟消息未到投递时间，等待");
        tokio::time::sleep(wait).await;
    }

    info!(order_id, "收到延迟对账消息");

    let result = retry_with_policy(policy, "reconcile_order", || worker.reconcile(order_id)).await;

    if let Err(e) = result {
        // 重试耗尽或不可重试：送入死信，由落库消费者持久化后等待人工介入
        error!(order_id, error = %e, "对账处理失败，消息送入死信");

        let dead_letter = DeadLetterMessage::new(
            order_id,
            topics::TRADE_DELAY_ORDER,
            e.to_string(),
            policy.max_retries,
            SOURCE_SERVICE,
        );

        if let Err(send_err) = producer
            .send_json(topics::TRADE_DEAD_LETTER, &order_id.to_string(), &dead_letter)
            .await
        {
            error!(order_id, error = %send_err, "死信投递失败，消息可能丢失");
            return Err(send_err);
        }
    }

    Ok(())
}
