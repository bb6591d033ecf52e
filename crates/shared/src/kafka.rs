//! 消息总线适配层
//!
//! 将 rdkafka 的底层 API 封装为业务友好的 Producer/Consumer 抽象，
//! 统一消息序列化、生产者确认（publisher confirm）语义和优雅关闭语义。
//! 延迟投递不依赖 broker 能力，由消息信封中的投递时间戳配合消费侧等待实现
//! （见 `messages::OrderDelayMessage`）。

use std::time::Duration;

use rdkafka::Offset;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::error::MallError;

// ---------------------------------------------------------------------------
// Topic 常量
// ---------------------------------------------------------------------------

/// 集中管理所有 topic 名称，防止字符串散落在各服务中导致拼写不一致
pub mod topics {
    /// 下单后发送的延迟对账消息（120 秒后由交易服务消费）
    pub const TRADE_DELAY_ORDER: &str = "trade.delay.order";
    /// 支付成功事件（支付服务发布，交易服务消费后标记订单已支付）
    pub const PAY_SUCCESS: &str = "pay.success";
    /// 对账消费重试耗尽后的死信，由死信落库消费者持久化
    pub const TRADE_DEAD_LETTER: &str = "trade.dead.letter";
}

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的消息的统一表示
///
/// 将 rdkafka 的 `BorrowedMessage`（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以安全地跨 await 点传递给异步处理函数。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
}

impl ConsumerMessage {
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload: msg.payload().map(|p| p.to_vec()).unwrap_or_default(),
            timestamp: msg.timestamp().to_millis(),
        }
    }

    /// 将 JSON 格式负载反序列化为目标类型
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T, MallError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| MallError::Kafka(format!("负载反序列化失败: {e}")))
    }
}

// ---------------------------------------------------------------------------
// MessageProducer
// ---------------------------------------------------------------------------

/// 面向业务的消息生产者
///
/// 封装 `FutureProducer` 并提供类型安全的 JSON 发送方法。
/// `send` 会等待 broker 的投递回执，等价于生产者确认机制
/// （publisher confirm）：返回 Ok 即收到 ack，返回 Err 即 nack 或发送异常。
#[derive(Clone)]
pub struct MessageProducer {
    producer: FutureProducer,
}

impl MessageProducer {
    /// 根据配置创建生产者
    ///
    /// `message.timeout.ms` 设为 5 秒：5 秒内仍无法投递视为 nack，
    /// 由调用方决定是记录日志放行还是向上传播。
    pub fn new(config: &KafkaConfig) -> Result<Self, MallError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| MallError::Kafka(format!("创建生产者失败: {e}")))?;

        info!(brokers = %config.brokers, "消息生产者已初始化");
        Ok(Self { producer })
    }

    /// 发送原始字节消息并等待投递回执
    pub async fn send(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<(i32, i64), MallError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        let delivery = self
            .producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| MallError::Kafka(format!("发送消息失败: {e}")))?;

        debug!(
            topic,
            key,
            partition = delivery.partition,
            offset = delivery.offset,
            "消息已发送，收到 ack"
        );
        Ok((delivery.partition, delivery.offset))
    }

    /// 将值序列化为 JSON 后发送
    pub async fn send_json<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        value: &T,
    ) -> Result<(i32, i64), MallError> {
        let payload =
            serde_json::to_vec(value).map_err(|e| MallError::Kafka(format!("序列化失败: {e}")))?;

        self.send(topic, key, &payload).await
    }

    /// 发送并将确认结果落日志，不向调用方传播失败
    ///
    /// 订单创建和支付成功事件的发布都采用此语义：本地事务已提交，
    /// 消息发送失败不应使业务操作失败，只记录 nack 日志等待兜底路径收敛。
    pub async fn send_json_logged<T: Serialize>(&self, topic: &str, key: &str, value: &T) {
        match self.send_json(topic, key, value).await {
            Ok((partition, offset)) => {
                debug!(topic, key, partition, offset, "发送消息成功，收到 ack");
            }
            Err(e) => {
                error!(topic, key, error = %e, "发送消息失败，收到 nack 或异常");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MessageConsumer
// ---------------------------------------------------------------------------

/// 处理失败后重新拉取前的退避，避免对同一条坏消息热循环
const FAILED_MESSAGE_BACKOFF: Duration = Duration::from_millis(500);

/// 消息确认模式
///
/// 处理很快且有兜底路径的消费者采用自动提交即可；
/// 承担丢失保证的消费者（延迟对账、死信落库）必须处理成功后才提交，
/// 确保不会出现"确认了却没处理"的丢失。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// 自动提交 offset（至少一次投递 + 幂等处理）
    Auto,
    /// handler 返回 Ok 后才提交 offset
    AfterHandle,
}

/// 面向业务的消息消费者
///
/// 封装 `StreamConsumer` 并提供基于 `watch` channel 的优雅关闭语义，
/// 确保进程退出时不会丢失正在处理的消息。
pub struct MessageConsumer {
    consumer: StreamConsumer,
    ack_mode: AckMode,
}

impl MessageConsumer {
    /// 创建消费者
    ///
    /// `group_id_suffix` 允许同一服务内不同消费逻辑使用独立的消费组，
    /// 例如 "trade-service.delay" 和 "trade-service.dead-letter"。
    pub fn new(
        config: &KafkaConfig,
        group_id_suffix: Option<&str>,
        ack_mode: AckMode,
    ) -> Result<Self, MallError> {
        let group_id = match group_id_suffix {
            Some(suffix) => format!("{}.{}", config.consumer_group, suffix),
            None => config.consumer_group.clone(),
        };

        let auto_commit = match ack_mode {
            AckMode::Auto => "true",
            AckMode::AfterHandle => "false",
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", auto_commit)
            .create()
            .map_err(|e| MallError::Kafka(format!("创建消费者失败: {e}")))?;

        info!(brokers = %config.brokers, group_id, ?ack_mode, "消息消费者已初始化");
        Ok(Self { consumer, ack_mode })
    }

    /// 当前确认模式
    pub fn ack_mode(&self) -> AckMode {
        self.ack_mode
    }

    /// 订阅指定的 topic 列表
    pub fn subscribe(&self, topics: &[&str]) -> Result<(), MallError> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| MallError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, "已订阅 topics");
        Ok(())
    }

    /// 启动消费循环
    ///
    /// 使用 `tokio::select!` 同时监听消息流和关闭信号：
    /// - 收到消息时调用 handler 处理；handler 返回错误只记录日志而不中断循环，
    ///   避免单条坏消息导致整个消费者停止。
    /// - `AckMode::AfterHandle` 模式下仅在 handler 成功后提交 offset；
    ///   提交 offset N 即确认该分区 N 之前的全部消息，因此处理失败时
    ///   不能越过失败消息继续前进——回退到失败位置等待重新拉取，
    ///   直到该消息处理成功才会推进。
    /// - 关闭信号变为 `true` 时退出循环，确保正在执行的 handler 能自然完成。
    pub async fn start<F, Fut>(self, mut shutdown: watch::Receiver<bool>, handler: F)
    where
        F: Fn(ConsumerMessage) -> Fut,
        Fut: std::future::Future<Output = Result<(), MallError>>,
    {
        use futures::StreamExt;

        let stream = self.consumer.stream();
        futures::pin_mut!(stream);

        info!("消费循环已启动");

        loop {
            tokio::select! {
                // 偏向关闭信号，保证收到关闭时能尽快退出
                biased;

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("收到关闭信号，消费循环退出");
                        break;
                    }
                }

                msg_result = stream.next() => {
                    let Some(msg_result) = msg_result else {
                        warn!("消息流意外结束");
                        break;
                    };

                    match msg_result {
                        Ok(borrowed_msg) => {
                            let msg = ConsumerMessage::from_borrowed(&borrowed_msg);
                            debug!(
                                topic = %msg.topic,
                                partition = msg.partition,
                                offset = msg.offset,
                                "收到消息"
                            );

                            match handler(msg).await {
                                Ok(()) => {
                                    if self.ack_mode == AckMode::AfterHandle
                                        && let Err(e) = self
                                            .consumer
                                            .commit_message(&borrowed_msg, CommitMode::Async)
                                    {
                                        warn!(error = %e, "提交 offset 失败，消息可能被重复投递");
                                    }
                                }
                                Err(e) => {
                                    error!(error = %e, "处理消息失败");

                                    if self.ack_mode == AckMode::AfterHandle {
                                        // 回退到失败消息的位置：后续任何提交都不得
                                        // 把这条未处理成功的消息一并确认掉
                                        if let Err(seek_err) = self.consumer.seek(
                                            borrowed_msg.topic(),
                                            borrowed_msg.partition(),
                                            Offset::Offset(borrowed_msg.offset()),
                                            Duration::from_secs(5),
                                        ) {
                                            warn!(error = %seek_err, "回退 offset 失败");
                                        }
                                        tokio::time::sleep(FAILED_MESSAGE_BACKOFF).await;
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "接收消息出错");
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
