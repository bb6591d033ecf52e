//! 协作方客户端封装
//!
//! 余额（用户）、购物车与交易服务的远程调用，
//! trait 抽象便于测试时注入 mock。扣减余额是支付链路上的关键调用，
//! 失败原样向上传播；购物车清理是尽力而为，失败由调用方记日志忽略。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mall_shared::error::{MallError, Result};

// ---------------------------------------------------------------------------
// DTO
// ---------------------------------------------------------------------------

/// 交易服务返回的订单明细行（购物车清理只需要商品 id 与数量）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetailDto {
    pub item_id: i64,
    pub num: i32,
}

// ---------------------------------------------------------------------------
// Trait 抽象
// ---------------------------------------------------------------------------

/// 用户服务客户端（余额扣减）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserClient: Send + Sync {
    /// 按支付密码扣减指定金额，余额不足或密码错误时返回错误
    async fn deduct_money(&self, pw: &str, amount: i64) -> Result<()>;
}

/// 购物车服务客户端
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CartClient: Send + Sync {
    /// 删除用户购物车中的指定商品行，按 (user_id, item_id) 幂等
    async fn remove_cart_line(&self, user_id: i64, item_id: i64) -> Result<()>;
}

/// 交易服务客户端（查询订单明细，支付成功后的购物车清理用）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeClient: Send + Sync {
    async fn query_order_details(&self, order_id: i64) -> Result<Vec<OrderDetailDto>>;
}

// ---------------------------------------------------------------------------
// HTTP 实现
// ---------------------------------------------------------------------------

fn external_error(service: &str, message: impl std::fmt::Display) -> MallError {
    MallError::ExternalService {
        service: service.to_string(),
        message: message.to_string(),
    }
}

/// 用户服务 HTTP 客户端
pub struct HttpUserClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUserClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeductMoneyBody<'a> {
    pw: &'a str,
    amount: i64,
}

#[async_trait]
impl UserClient for HttpUserClient {
    async fn deduct_money(&self, pw: &str, amount: i64) -> Result<()> {
        let resp = self
            .client
            .put(format!("{}/users/money/deduct", self.base_url))
            .json(&DeductMoneyBody { pw, amount })
            .send()
            .await
            .map_err(|e| external_error("user-service", e))?;

        if !resp.status().is_success() {
            return Err(external_error(
                "user-service",
                format!("扣减余额失败: HTTP {}", resp.status()),
            ));
        }
        Ok(())
    }
}

/// 购物车服务 HTTP 客户端
pub struct HttpCartClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCartClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CartClient for HttpCartClient {
    async fn remove_cart_line(&self, user_id: i64, item_id: i64) -> Result<()> {
        let resp = self
            .client
            .delete(format!("{}/carts/{user_id}/items/{item_id}", self.base_url))
            .send()
            .await
            .map_err(|e| external_error("cart-service", e))?;

        // 行不存在也视为清理成功
        if resp.status() == reqwest::StatusCode::NOT_FOUND || resp.status().is_success() {
            Ok(())
        } else {
            Err(external_error(
                "cart-service",
                format!("删除购物车行失败: HTTP {}", resp.status()),
            ))
        }
    }
}

/// 交易服务 HTTP 客户端
pub struct HttpTradeClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTradeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TradeClient for HttpTradeClient {
    async fn query_order_details(&self, order_id: i64) -> Result<Vec<OrderDetailDto>> {
        let resp = self
            .client
            .get(format!("{}/orders/{order_id}/details", self.base_url))
            .send()
            .await
            .map_err(|e| external_error("trade-service", e))?;

        if !resp.status().is_success() {
            return Err(external_error(
                "trade-service",
                format!("查询订单明细失败: HTTP {}", resp.status()),
            ));
        }

        let details: Vec<OrderDetailDto> = resp
            .json()
            .await
            .map_err(|e| external_error("trade-service", e))?;
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_detail_dto_deserialize_camel_case() {
        let json = r#"[{"itemId":42,"num":2},{"itemId":7,"num":1}]"#;
        let details: Vec<OrderDetailDto> = serde_json::from_str(json).unwrap();
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].item_id, 42);
        assert_eq!(details[0].num, 2);
    }
}
