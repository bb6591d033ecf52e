//! 协作方客户端封装
//!
//! 商品服务与支付服务的远程调用，通过 trait 抽象便于测试时注入 mock 实现。
//! 具体实现基于 reqwest HTTP 调用，错误统一映射为 `MallError::ExternalService`，
//! 业务拒绝（库存不足）单独映射以便对外返回 4xx。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use mall_shared::error::{MallError, Result};

use crate::service::OrderLine;

// ---------------------------------------------------------------------------
// DTO
// ---------------------------------------------------------------------------

/// 商品服务返回的商品信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDto {
    pub id: i64,
    pub name: String,
    /// 单价（分）
    pub price: i64,
    pub stock: i32,
    pub status: i32,
    pub spec: Option<String>,
    pub image: Option<String>,
}

/// 支付单状态数值（与支付服务存库约定一致）
pub mod pay_status {
    pub const NOT_COMMIT: i16 = 0;
    pub const WAIT_BUYER_PAY: i16 = 1;
    pub const TRADE_CLOSED: i16 = 2;
    pub const TRADE_SUCCESS: i16 = 3;
}

/// 支付服务读模型返回的支付单信息
///
/// 对账路径只关心支付是否成功，字段保持最小集。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayOrderDto {
    pub id: i64,
    pub biz_order_no: i64,
    pub status: i16,
}

impl PayOrderDto {
    /// 支付是否已成功
    pub fn is_success(&self) -> bool {
        self.status == pay_status::TRADE_SUCCESS
    }
}

// ---------------------------------------------------------------------------
// Trait 抽象
// ---------------------------------------------------------------------------

/// 商品服务客户端
///
/// 查询商品、预占库存、恢复库存。恢复库存按 (item_id, num) 幂等，
/// 取消订单的恢复循环可以安全地重复发起。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ItemClient: Send + Sync {
    /// 按 id 批量查询商品，不存在的 id 不会出现在结果中
    async fn query_items_by_ids(&self, ids: &[i64]) -> Result<Vec<ItemDto>>;

    /// 批量扣减库存，库存不足时整体拒绝
    async fn deduct_stock(&self, lines: &[OrderLine]) -> Result<()>;

    /// 恢复单个商品的库存
    async fn restore_stock(&self, item_id: i64, num: i32) -> Result<()>;
}

/// 支付服务客户端
///
/// 对账路径用业务订单号查询支付单状态。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PayClient: Send + Sync {
    /// 按业务订单号查询支付单，不存在返回 None
    async fn query_pay_order_by_biz_order_no(&self, order_id: i64) -> Result<Option<PayOrderDto>>;
}

// ---------------------------------------------------------------------------
// HTTP 实现
// ---------------------------------------------------------------------------

/// 商品服务 HTTP 客户端
pub struct HttpItemClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpItemClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn external_error(message: impl std::fmt::Display) -> MallError {
        MallError::ExternalService {
            service: "item-service".to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl ItemClient for HttpItemClient {
    async fn query_items_by_ids(&self, ids: &[i64]) -> Result<Vec<ItemDto>> {
        let ids_param = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let resp = self
            .client
            .get(format!("{}/items", self.base_url))
            .query(&[("ids", ids_param)])
            .send()
            .await
            .map_err(Self::external_error)?;

        if !resp.status().is_success() {
            return Err(Self::external_error(format!(
                "查询商品失败: HTTP {}",
                resp.status()
            )));
        }

        let items: Vec<ItemDto> = resp.json().await.map_err(Self::external_error)?;
        debug!(requested = ids.len(), returned = items.len(), "批量查询商品完成");
        Ok(items)
    }

    async fn deduct_stock(&self, lines: &[OrderLine]) -> Result<()> {
        let resp = self
            .client
            .put(format!("{}/items/stock/deduct", self.base_url))
            .json(lines)
            .send()
            .await
            .map_err(Self::external_error)?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            // 商品服务以 4xx 表达库存不足的业务拒绝
            s if s.is_client_error() => Err(MallError::InsufficientStock),
            s => Err(Self::external_error(format!("扣减库存失败: HTTP {s}"))),
        }
    }

    async fn restore_stock(&self, item_id: i64, num: i32) -> Result<()> {
        let resp = self
            .client
            .put(format!("{}/items/stock/restore", self.base_url))
            .query(&[("id", item_id.to_string()), ("num", num.to_string())])
            .send()
            .await
            .map_err(Self::external_error)?;

        if !resp.status().is_success() {
            return Err(Self::external_error(format!(
                "恢复库存失败: item_id={item_id} HTTP {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// 支付服务 HTTP 客户端
pub struct HttpPayClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PayClient for HttpPayClient {
    async fn query_pay_order_by_biz_order_no(&self, order_id: i64) -> Result<Option<PayOrderDto>> {
        let resp = self
            .client
            .get(format!("{}/pay-orders/biz/{order_id}", self.base_url))
            .send()
            .await
            .map_err(|e| MallError::ExternalService {
                service: "pay-service".to_string(),
                message: e.to_string(),
            })?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !resp.status().is_success() {
            return Err(MallError::ExternalService {
                service: "pay-service".to_string(),
                message: format!("查询支付单失败: HTTP {}", resp.status()),
            });
        }

        let dto: PayOrderDto = resp.json().await.map_err(|e| MallError::ExternalService {
            service: "pay-service".to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(dto))
    }
}
