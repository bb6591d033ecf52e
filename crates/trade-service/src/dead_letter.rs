//! 死信落库消费者
//!
//! 对账消息重试耗尽后的终点：每一条死信必须先持久化到失败台账，
//! 再确认消费（`AckMode::AfterHandle`），绝不允许"确认了却没记录"。
//! 落库失败时返回错误，offset 不提交，消息会被重新投递。

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use mall_shared::config::AppConfig;
use mall_shared::error::Result;
use mall_shared::kafka::{AckMode, ConsumerMessage, MessageConsumer, topics};
use mall_shared::messages::DeadLetterMessage;

use crate::repository::DeadLetterRepository;

/// 死信落库消费者
pub struct DeadLetterConsumer {
    consumer: MessageConsumer,
    repo: Arc<DeadLetterRepository>,
}

impl DeadLetterConsumer {
    /// 创建死信消费者
    ///
    /// 使用 `.dead-letter` 后缀作为独立消费组，并启用处理成功后才提交
    /// offset 的确认模式。
    pub fn new(config: &AppConfig, repo: Arc<DeadLetterRepository>) -> Result<Self> {
        let consumer =
            MessageConsumer::new(&config.kafka, Some("dead-letter"), AckMode::AfterHandle)?;
        Ok(Self { consumer, repo })
    }

    /// 启动消费循环，直到收到 shutdown 信号
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.consumer.subscribe(&[topics::TRADE_DEAD_LETTER])?;

        info!(topic = topics::TRADE_DEAD_LETTER, "死信落库消费者已启动");

        let repo = self.repo;

        self.consumer
            .start(shutdown, |msg| {
                let repo = repo.clone();
                async move { handle_dead_letter(&repo, &msg).await }
            })
            .await;

        info!("死信落库消费者已停止");
        Ok(())
    }
}

/// 持久化单条死信
///
/// 返回 Ok 即表示记录已落库，消费循环此后才会提交 offset。
pub async fn handle_dead_letter(repo: &DeadLetterRepository, msg: &ConsumerMessage) -> Result<()> {
    let dead_letter: DeadLetterMessage = msg.deserialize_payload()?;

    let record_id = repo.insert(&dead_letter).await?;

    error!(
        order_id = dead_letter.order_id,
        source_topic = %dead_letter.source_topic,
        retry_count = dead_letter.retry_count,
        record_id,
        error = %dead_letter.error,
        "订单延迟对账多次失败已落入死信台账，请人工介入或补偿"
    );

    Ok(())
}
