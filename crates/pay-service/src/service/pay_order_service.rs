//! 支付单服务
//!
//! 支付链路的两个入口：
//! - `apply_pay_order`：幂等前门。每个业务订单至多一张支付单，
//!   重复申请重放同一张单，换渠道原地重置，终态直接拒绝。
//! - `try_pay_order_by_balance`：余额支付。先扣款后条件翻转状态；
//!   翻转失败时扣款已经发生，按既定取舍返回错误而不自动退款。
//!
//! 支付成功事件的发布失败只记日志：订单侧的延迟对账是通知丢失时的兜底。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{info, instrument, warn};

use mall_shared::error::{MallError, Result};
use mall_shared::kafka::{MessageProducer, topics};
use mall_shared::messages::PaySuccessMessage;

use crate::clients::{CartClient, TradeClient, UserClient};
use crate::models::{NewPayOrder, PayOrder, PayStatus};
use crate::repository::PayOrderRepo;

// ---------------------------------------------------------------------------
// 支付成功事件发布
// ---------------------------------------------------------------------------

/// 支付成功事件发布器
///
/// 发布失败在实现内部记日志消化，不向支付主流程传播。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaySuccessPublisher: Send + Sync {
    async fn publish_pay_success(&self, message: &PaySuccessMessage);
}

/// 基于 Kafka 生产者的发布实现
pub struct KafkaPaySuccessPublisher {
    producer: MessageProducer,
}

impl KafkaPaySuccessPublisher {
    pub fn new(producer: MessageProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl PaySuccessPublisher for KafkaPaySuccessPublisher {
    async fn publish_pay_success(&self, message: &PaySuccessMessage) {
        self.producer
            .send_json_logged(topics::PAY_SUCCESS, &message.order_id.to_string(), message)
            .await;
    }
}

// ---------------------------------------------------------------------------
// PayOrderService
// ---------------------------------------------------------------------------

/// 支付单申请请求
#[derive(Debug, Clone)]
pub struct ApplyPayOrderRequest {
    /// 业务订单号（订单 id）
    pub biz_order_no: i64,
    /// 付款用户 id
    pub biz_user_id: i64,
    /// 支付渠道编码
    pub pay_channel_code: String,
    /// 支付金额（分）
    pub amount: i64,
}

/// 支付单服务
pub struct PayOrderService {
    repo: Arc<dyn PayOrderRepo>,
    user_client: Arc<dyn UserClient>,
    cart_client: Arc<dyn CartClient>,
    trade_client: Arc<dyn TradeClient>,
    publisher: Arc<dyn PaySuccessPublisher>,
    /// 支付单有效期（分钟），仅记录不主动清理
    pay_expire_minutes: i64,
}

impl PayOrderService {
    pub fn new(
        repo: Arc<dyn PayOrderRepo>,
        user_client: Arc<dyn UserClient>,
        cart_client: Arc<dyn CartClient>,
        trade_client: Arc<dyn TradeClient>,
        publisher: Arc<dyn PaySuccessPublisher>,
        pay_expire_minutes: i64,
    ) -> Self {
        Self {
            repo,
            user_client,
            cart_client,
            trade_client,
            publisher,
            pay_expire_minutes,
        }
    }

    /// 申请支付单，返回支付单 id
    ///
    /// 五个分支：
    /// 1. 不存在 -> 新建（待支付，有效期 now + 有效分钟数）
    /// 2. 已成功 -> `AlreadyPaid`
    /// 3. 已关闭 -> `OrderClosed`
    /// 4. 挂起且渠道未变 -> 直接重放同一张单
    /// 5. 挂起且渠道变更 -> 原地重置（新有效期、清空二维码），id 不变
    #[instrument(skip(self, request), fields(biz_order_no = request.biz_order_no))]
    pub async fn apply_pay_order(&self, request: ApplyPayOrderRequest) -> Result<i64> {
        if request.amount <= 0 {
            return Err(MallError::Validation("支付金额必须为正".to_string()));
        }

        // 先查后建，保证每个订单至多一张支付单
        let existing = self.repo.get_by_biz_order_no(request.biz_order_no).await?;

        let Some(pay_order) = existing else {
            let new = NewPayOrder {
                biz_order_no: request.biz_order_no,
                biz_user_id: request.biz_user_id,
                pay_channel_code: request.pay_channel_code.clone(),
                amount: request.amount,
                status: PayStatus::WaitBuyerPay,
                pay_over_time: Utc::now() + Duration::minutes(self.pay_expire_minutes),
            };
            let id = self.repo.create(&new).await?;
            info!(pay_order_id = id, "支付单已创建");
            return Ok(id);
        };

        match pay_order.status {
            PayStatus::TradeSuccess => Err(MallError::AlreadyPaid),
            PayStatus::TradeClosed => Err(MallError::OrderClosed),
            _ if pay_order.pay_channel_code == request.pay_channel_code => {
                // 幂等重放
                info!(pay_order_id = pay_order.id, "重复申请，重放已有支付单");
                Ok(pay_order.id)
            }
            _ => {
                // 换渠道：重置而非新建，id 与订单关联保持不变
                info!(
                    pay_order_id = pay_order.id,
                    old_channel = %pay_order.pay_channel_code,
                    new_channel = %request.pay_channel_code,
                    "支付渠道变更，重置支付单"
                );
                self.repo
                    .reset_for_channel_switch(
                        pay_order.id,
                        &request.pay_channel_code,
                        Utc::now() + Duration::minutes(self.pay_expire_minutes),
                    )
                    .await?;
                Ok(pay_order.id)
            }
        }
    }

    /// 余额支付
    ///
    /// 1. 支付单必须处于待支付状态，否则 `AlreadyClosedOrPaid`
    /// 2. 扣减余额；失败原样传播，支付单状态不变
    /// 3. 条件翻转为支付成功；0 行受影响说明并发对手已先翻转，
    ///    此时扣款已发生，仍返回 `AlreadyClosedOrPaid`（既定取舍，不自动退款）
    /// 4. 尽力而为地清理购物车中已购商品行
    /// 5. 发布支付成功事件，发布失败只记日志
    #[instrument(skip(self, pw))]
    pub async fn try_pay_order_by_balance(&self, pay_order_id: i64, pw: &str) -> Result<()> {
        let pay_order = self
            .repo
            .get(pay_order_id)
            .await?
            .ok_or_else(|| MallError::NotFound {
                entity: "pay_order".to_string(),
                id: pay_order_id.to_string(),
            })?;

        if pay_order.status != PayStatus::WaitBuyerPay {
            return Err(MallError::AlreadyClosedOrPaid);
        }

        // 扣款在状态翻转之前，失败时支付单无任何变化
        self.user_client.deduct_money(pw, pay_order.amount).await?;

        let pay_success_time = Utc::now();
        let updated = self.repo.mark_success(pay_order_id, pay_success_time).await?;
        if !updated {
            // 扣款已发生但状态被并发对手先翻转，按既定取舍报错
            warn!(pay_order_id, "扣款成功但状态翻转失败，支付单已被并发处理");
            return Err(MallError::AlreadyClosedOrPaid);
        }

        info!(
            pay_order_id,
            biz_order_no = pay_order.biz_order_no,
            "余额支付成功"
        );

        self.cleanup_cart(&pay_order).await;

        let event =
            PaySuccessMessage::new(pay_order.biz_order_no, pay_order_id, pay_success_time);
        self.publisher.publish_pay_success(&event).await;

        Ok(())
    }

    /// 按业务订单号查询支付单（对账读模型）
    pub async fn query_by_biz_order_no(&self, biz_order_no: i64) -> Result<Option<PayOrder>> {
        self.repo.get_by_biz_order_no(biz_order_no).await
    }

    /// 支付成功后的购物车清理
    ///
    /// 整体尽力而为：明细查询失败跳过清理，单行删除失败记日志继续。
    async fn cleanup_cart(&self, pay_order: &PayOrder) {
        let details = match self
            .trade_client
            .query_order_details(pay_order.biz_order_no)
            .await
        {
            Ok(details) => details,
            Err(e) => {
                warn!(
                    biz_order_no = pay_order.biz_order_no,
                    error = %e,
                    "查询订单明细失败，跳过购物车清理"
                );
                return;
            }
        };

        for detail in &details {
            if let Err(e) = self
                .cart_client
                .remove_cart_line(pay_order.biz_user_id, detail.item_id)
                .await
            {
                warn!(
                    user_id = pay_order.biz_user_id,
                    item_id = detail.item_id,
                    error = %e,
                    "删除购物车行失败"
                );
            }
        }
    }
}
