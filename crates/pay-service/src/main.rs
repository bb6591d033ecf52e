//! 支付服务入口
//!
//! 装配支付单服务及其协作方客户端。对外的 HTTP 路由由网关侧承载，
//! 本进程启动后常驻，等待退出信号。

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing::info;

use mall_shared::config::AppConfig;
use mall_shared::database::Database;
use mall_shared::kafka::MessageProducer;

use pay_service::clients::{HttpCartClient, HttpTradeClient, HttpUserClient};
use pay_service::repository::PgPayOrderRepository;
use pay_service::service::{KafkaPaySuccessPublisher, PayOrderService};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::load("pay-service").unwrap_or_else(|e| {
        tracing::warn!("加载配置失败，使用默认配置: {e}");
        AppConfig::default()
    });

    info!(environment = %config.environment, "pay-service 启动中...");

    let db = Database::connect(&config.database).await?;
    let producer = MessageProducer::new(&config.kafka)?;

    let _service = Arc::new(PayOrderService::new(
        Arc::new(PgPayOrderRepository::new(db.pool().clone())),
        Arc::new(HttpUserClient::new(config.services.user_service_url.clone())),
        Arc::new(HttpCartClient::new(config.services.cart_service_url.clone())),
        Arc::new(HttpTradeClient::new(config.services.trade_service_url.clone())),
        Arc::new(KafkaPaySuccessPublisher::new(producer)),
        config.saga.pay_expire_minutes,
    ));

    info!("pay-service 已启动，等待退出信号");

    signal::ctrl_c().await?;
    info!("收到退出信号，开始优雅关闭");

    db.close().await;
    info!("pay-service 已退出");
    Ok(())
}
