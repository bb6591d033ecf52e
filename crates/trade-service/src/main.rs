//! 交易服务入口
//!
//! 装配订单服务与三个消费者（支付成功事件、延迟对账、死信落库），
//! 以 watch channel 广播关闭信号实现优雅退出。

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

use mall_shared::config::AppConfig;
use mall_shared::database::Database;
use mall_shared::kafka::MessageProducer;

use trade_service::clients::{HttpItemClient, HttpPayClient};
use trade_service::consumer::PayStatusConsumer;
use trade_service::dead_letter::DeadLetterConsumer;
use trade_service::reconciliation::{ReconciliationConsumer, ReconciliationWorker};
use trade_service::repository::{DeadLetterRepository, OrderRepository};
use trade_service::service::OrderService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::load("trade-service").unwrap_or_else(|e| {
        tracing::warn!("加载配置失败，使用默认配置: {e}");
        AppConfig::default()
    });

    info!(environment = %config.environment, "trade-service 启动中...");

    // 数据库与消息总线
    let db = Database::connect(&config.database).await?;
    let pool = db.pool().clone();
    let producer = MessageProducer::new(&config.kafka)?;

    // 协作方客户端
    let item_client = Arc::new(HttpItemClient::new(config.services.item_service_url.clone()));
    let pay_client = Arc::new(HttpPayClient::new(config.services.pay_service_url.clone()));

    // 服务与仓储
    let order_service = Arc::new(OrderService::new(
        OrderRepository::new(pool.clone()),
        item_client,
        producer.clone(),
        config.saga.reconcile_delay_seconds,
    ));
    let dead_letter_repo = Arc::new(DeadLetterRepository::new(pool.clone()));

    // 消费者
    let pay_status = PayStatusConsumer::new(&config, order_service.clone())?;
    let reconciliation = ReconciliationConsumer::new(
        &config,
        Arc::new(ReconciliationWorker::new(order_service.clone(), pay_client)),
        producer.clone(),
    )?;
    let dead_letter = DeadLetterConsumer::new(&config, dead_letter_repo)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::new();
    handles.push(tokio::spawn(pay_status.run(shutdown_rx.clone())));
    handles.push(tokio::spawn(reconciliation.run(shutdown_rx.clone())));
    handles.push(tokio::spawn(dead_letter.run(shutdown_rx)));

    info!("trade-service 已启动，等待退出信号");

    signal::ctrl_c().await?;
    info!("收到退出信号，开始优雅关闭");
    shutdown_tx.send(true)?;

    for handle in handles {
        let _ = handle.await;
    }

    db.close().await;
    info!("trade-service 已退出");
    Ok(())
}
