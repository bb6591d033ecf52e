//! 消费确认语义集成测试
//!
//! 使用真实 Kafka 验证 `AckMode::AfterHandle` 的丢失保证：
//! 处理失败的消息必须被重新投递，且在它处理成功之前不能推进到
//! 同分区的后续消息（提交任何更大的 offset 都会把失败消息一并确认）。
//!
//! ## 运行方式
//!
//! ```bash
//! TEST_KAFKA_BROKERS=localhost:9092 \
//!   cargo test --test kafka_consumer_test -- --ignored
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use mall_shared::error::MallError;
use mall_shared::kafka::{AckMode, MessageConsumer, MessageProducer};
use mall_shared::test_utils::test_kafka_config;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    order_id: i64,
}

#[tokio::test]
#[ignore]
async fn test_after_handle_retries_failed_message_before_advancing() {
    let config = test_kafka_config();
    // 每次运行独立 topic，避免历史消息干扰
    let topic = format!("test.ack.{}", uuid::Uuid::new_v4());

    let producer = MessageProducer::new(&config).expect("创建生产者失败");
    for order_id in 1..=3_i64 {
        producer
            .send_json(&topic, &order_id.to_string(), &Envelope { order_id })
            .await
            .expect("发送测试消息失败");
    }

    let consumer = MessageConsumer::new(&config, Some("ack-test"), AckMode::AfterHandle)
        .expect("创建消费者失败");
    consumer.subscribe(&[&topic]).expect("订阅失败");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    // (order_id, 本次处理是否成功) 的完整时间线
    let timeline: Arc<Mutex<Vec<(i64, bool)>>> = Arc::new(Mutex::new(Vec::new()));
    // 第 2 条消息前两次处理强制失败
    let failures_left = Arc::new(AtomicU32::new(2));

    let run = {
        let timeline = timeline.clone();
        let shutdown_tx = shutdown_tx.clone();
        consumer.start(shutdown_rx, move |msg| {
            let timeline = timeline.clone();
            let failures_left = failures_left.clone();
            let shutdown_tx = shutdown_tx.clone();
            async move {
                let envelope: Envelope = msg.deserialize_payload()?;
                let order_id = envelope.order_id;

                if order_id == 2 && failures_left.load(Ordering::SeqCst) > 0 {
                    failures_left.fetch_sub(1, Ordering::SeqCst);
                    timeline.lock().unwrap().push((order_id, false));
                    return Err(MallError::Kafka("模拟处理失败".to_string()));
                }

                timeline.lock().unwrap().push((order_id, true));
                if order_id == 3 {
                    let _ = shutdown_tx.send(true);
                }
                Ok(())
            }
        })
    };

    tokio::time::timeout(Duration::from_secs(60), run)
        .await
        .expect("消费循环未在限期内完成");

    let timeline = timeline.lock().unwrap().clone();

    // 成功序列保序：失败消息处理成功之前，后续消息不得被处理
    let succeeded: Vec<i64> = timeline
        .iter()
        .filter(|(_, ok)| *ok)
        .map(|(id, _)| *id)
        .collect();
    assert_eq!(succeeded, vec![1, 2, 3]);

    // 消息 2 被重新投递两次后才成功（2 次失败 + 1 次成功）
    let attempts_on_2 = timeline.iter().filter(|(id, _)| *id == 2).count();
    assert_eq!(attempts_on_2, 3);
}
