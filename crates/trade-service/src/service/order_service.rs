//! 订单服务
//!
//! 下单、标记支付成功、取消订单三个操作的业务实现。
//!
//! 下单是整条链路唯一的多步本地事务：订单、订单明细与远程库存扣减
//! 处于同一事务边界内，远程扣减失败会连同已写入的本地行一起回滚——
//! "本地已提交、远程却失败"是这条链路最主要的正确性风险。
//! 下单成功后发送的延迟对账消息是通知丢失时的唯一兜底，
//! 其发送失败只记日志不回滚订单（订单已提交，此处退款并不合适）。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use mall_shared::error::{MallError, Result};
use mall_shared::kafka::{MessageProducer, topics};
use mall_shared::messages::OrderDelayMessage;

use crate::clients::{ItemClient, ItemDto};
use crate::models::{NewOrderDetail, Order, OrderDetail};
use crate::repository::OrderRepository;

/// 下单请求中的一行（商品 id + 数量）
///
/// 同时是商品服务扣减库存接口的请求体元素。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub item_id: i64,
    pub num: i32,
}

/// 下单请求
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub user_id: i64,
    pub payment_type: i16,
    pub details: Vec<OrderLine>,
}

/// 订单服务
///
/// 依赖商品服务客户端（trait object，避免泛型在消费者链路传播）、
/// 订单仓储与消息生产者。
pub struct OrderService {
    repo: OrderRepository,
    item_client: Arc<dyn ItemClient>,
    producer: MessageProducer,
    /// 延迟对账消息的延迟秒数
    reconcile_delay_seconds: i64,
}

impl OrderService {
    pub fn new(
        repo: OrderRepository,
        item_client: Arc<dyn ItemClient>,
        producer: MessageProducer,
        reconcile_delay_seconds: i64,
    ) -> Self {
        Self {
            repo,
            item_client,
            producer,
            reconcile_delay_seconds,
        }
    }

    /// 下单
    ///
    /// 1. 查询商品，任一商品不存在则短路失败（尚无任何写入）
    /// 2. 按商品服务返回的单价计算总价（不信任调用方报价，防止篡改）
    /// 3. 同一事务内写入订单与明细
    /// 4. 调用商品服务扣减库存；失败则回滚整个事务
    /// 5. 发送 120 秒延迟对账消息；发送失败只记日志，不影响下单结果
    ///
    /// 本层不做幂等：重复调用会创建不同的订单，幂等由支付层兜住。
    #[instrument(skip(self, request), fields(user_id = request.user_id))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<i64> {
        if request.details.is_empty() {
            return Err(MallError::Validation("订单明细不能为空".to_string()));
        }
        if request.details.iter().any(|line| line.num <= 0) {
            return Err(MallError::Validation("购买数量必须为正".to_string()));
        }

        // 合并同一商品的购买数量
        let num_map = merge_lines(&request.details);
        let item_ids: Vec<i64> = num_map.keys().copied().collect();

        // 1. 查询商品并校验全部存在
        let items = self.item_client.query_items_by_ids(&item_ids).await?;
        check_items_exist(&items, &item_ids)?;

        // 2. 按商品服务返回的单价计算总价
        let total_fee = compute_total(&items, &num_map);
        let details = build_details(&items, &num_map);

        // 3/4. 订单 + 明细 + 远程库存扣减，同一事务边界
        let mut tx = self.repo.pool().begin().await?;

        let order_id = self
            .repo
            .insert_order(&mut tx, request.user_id, total_fee, request.payment_type)
            .await?;
        self.repo.insert_details(&mut tx, order_id, &details).await?;

        let deduct_lines: Vec<OrderLine> = num_map
            .iter()
            .map(|(&item_id, &num)| OrderLine { item_id, num })
            .collect();

        if let Err(e) = self.item_client.deduct_stock(&deduct_lines).await {
            // 远程扣减失败，连同本地订单与明细一起回滚；
            // 回滚自身的失败只记日志，调用方始终看到真实的失败原因
            error!(order_id, error = %e, "扣减库存失败，回滚订单创建");
            if let Err(rollback_err) = tx.rollback().await {
                error!(order_id, error = %rollback_err, "回滚事务失败");
            }
            return Err(e);
        }

        tx.commit().await?;

        // 5. 延迟对账消息：通知丢失时的唯一兜底，发送失败不回滚订单
        let delay_msg = OrderDelayMessage::new(order_id, self.reconcile_delay_seconds);
        self.producer
            .send_json_logged(topics::TRADE_DELAY_ORDER, &order_id.to_string(), &delay_msg)
            .await;

        info!(
            order_id,
            total_fee,
            delay_seconds = self.reconcile_delay_seconds,
            "订单已创建，延迟对账消息已发出"
        );
        Ok(order_id)
    }

    /// 标记订单支付成功
    ///
    /// 条件更新 未支付->已支付 并写入支付时间；订单已不在未支付状态时
    /// 是良性无操作而非错误，天然承受重复投递。
    #[instrument(skip(self))]
    pub async fn mark_order_pay_success(&self, order_id: i64) -> Result<()> {
        let updated = self.repo.mark_pay_success(order_id, Utc::now()).await?;
        if updated {
            info!(order_id, "订单已标记为已支付");
        } else {
            info!(order_id, "订单不在未支付状态，跳过标记（幂等无操作）");
        }
        Ok(())
    }

    /// 取消订单并恢复库存
    ///
    /// 状态迁移与库存恢复不在同一事务：迁移成功后逐行发起恢复调用，
    /// 单行失败只记日志继续下一行（按 (order, item) 幂等，可由后续补偿重发）。
    /// 只有真正发生迁移的那次调用才执行恢复，保证库存不会被重复恢复。
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: i64) -> Result<()> {
        let cancelled = self.repo.mark_cancelled(order_id).await?;
        if !cancelled {
            info!(order_id, "订单不在未支付状态，跳过取消（幂等无操作）");
            return Ok(());
        }

        info!(order_id, "订单已取消，开始恢复库存");

        let details = self.repo.list_details(order_id).await?;
        for detail in &details {
            match self
                .item_client
                .restore_stock(detail.item_id, detail.num)
                .await
            {
                Ok(()) => {
                    info!(item_id = detail.item_id, num = detail.num, "库存已恢复");
                }
                Err(e) => {
                    // 尽力而为：恢复失败的行留给人工或后续补偿
                    warn!(
                        order_id,
                        item_id = detail.item_id,
                        num = detail.num,
                        error = %e,
                        "恢复库存失败"
                    );
                }
            }
        }

        Ok(())
    }

    /// 按 id 查询订单（对账路径使用）
    pub async fn get_order(&self, order_id: i64) -> Result<Option<Order>> {
        self.repo.get_order(order_id).await
    }

    /// 查询订单明细
    pub async fn list_order_details(&self, order_id: i64) -> Result<Vec<OrderDetail>> {
        self.repo.list_details(order_id).await
    }
}

// ---------------------------------------------------------------------------
// 纯函数：价格计算与明细构建
// ---------------------------------------------------------------------------

/// 合并重复商品行，数量累加
fn merge_lines(lines: &[OrderLine]) -> BTreeMap<i64, i32> {
    let mut map = BTreeMap::new();
    for line in lines {
        *map.entry(line.item_id).or_insert(0) += line.num;
    }
    map
}

/// 校验请求的商品 id 全部出现在查询结果中
fn check_items_exist(items: &[ItemDto], requested: &[i64]) -> Result<()> {
    let missing: Vec<i64> = requested
        .iter()
        .copied()
        .filter(|id| !items.iter().any(|item| item.id == *id))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(MallError::ItemsNotFound { missing })
    }
}

/// 总价 = Σ(商品服务单价 × 购买数量)
fn compute_total(items: &[ItemDto], num_map: &BTreeMap<i64, i32>) -> i64 {
    items
        .iter()
        .map(|item| item.price * i64::from(*num_map.get(&item.id).unwrap_or(&0)))
        .sum()
}

/// 从商品快照构建订单明细（单价复制，不引用商品表）
fn build_details(items: &[ItemDto], num_map: &BTreeMap<i64, i32>) -> Vec<NewOrderDetail> {
    items
        .iter()
        .map(|item| NewOrderDetail {
            item_id: item.id,
            name: item.name.clone(),
            spec: item.spec.clone(),
            price: item.price,
            num: *num_map.get(&item.id).unwrap_or(&0),
            image: item.image.clone(),
        })
        .collect()
}
