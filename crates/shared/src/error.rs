//! 统一错误处理模块
//!
//! 定义交易/支付链路共享的错误类型，使用 thiserror 提供良好的错误信息。
//! 业务错误（对应 4xx）与基础设施错误（对应 5xx）在同一枚举中区分，
//! 由 `status_code` 给出对外映射，由 `is_retryable` 驱动消费侧重试策略。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum MallError {
    // ==================== 数据库错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    // ==================== 消息总线错误 ====================
    #[error("Kafka 错误: {0}")]
    Kafka(String),

    // ==================== 业务逻辑错误 ====================
    /// 下单时部分商品在商品服务中查不到，短路整个创建流程
    #[error("商品不存在: {missing:?}")]
    ItemsNotFound { missing: Vec<i64> },

    /// 商品服务扣减库存被拒绝
    #[error("库存不足")]
    InsufficientStock,

    /// 支付单已经支付成功，重复申请被拒绝
    #[error("订单已经支付")]
    AlreadyPaid,

    /// 支付单已关闭，不能再发起支付
    #[error("订单已关闭")]
    OrderClosed,

    /// 支付时支付单不处于待支付状态（已支付或已关闭）
    #[error("交易已支付或关闭")]
    AlreadyClosedOrPaid,

    // ==================== 验证错误 ====================
    #[error("参数验证失败: {0}")]
    Validation(String),

    // ==================== 外部服务错误 ====================
    #[error("外部服务错误: {service} - {message}")]
    ExternalService { service: String, message: String },

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, MallError>;

impl MallError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Kafka(_) => "KAFKA_ERROR",
            Self::ItemsNotFound { .. } => "ITEMS_NOT_FOUND",
            Self::InsufficientStock => "INSUFFICIENT_STOCK",
            Self::AlreadyPaid => "ALREADY_PAID",
            Self::OrderClosed => "ORDER_CLOSED",
            Self::AlreadyClosedOrPaid => "ALREADY_CLOSED_OR_PAID",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 只有基础设施类瞬时故障可重试；业务错误重试也不会变化，
    /// 直接向上传播由调用方处理。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Kafka(_) | Self::ExternalService { .. }
        )
    }

    /// 对外 HTTP 等价状态码
    ///
    /// 业务错误映射 4xx，基础设施故障映射 5xx。
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::ItemsNotFound { .. }
            | Self::InsufficientStock
            | Self::AlreadyPaid
            | Self::OrderClosed
            | Self::AlreadyClosedOrPaid
            | Self::Validation(_) => 400,
            Self::Database(_)
            | Self::Kafka(_)
            | Self::ExternalService { .. }
            | Self::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = MallError::ItemsNotFound {
            missing: vec![42, 43],
        };
        assert_eq!(err.code(), "ITEMS_NOT_FOUND");

        let err = MallError::AlreadyClosedOrPaid;
        assert_eq!(err.code(), "ALREADY_CLOSED_OR_PAID");
    }

    #[test]
    fn test_is_retryable() {
        let db_err = MallError::Database(sqlx::Error::PoolTimedOut);
        assert!(db_err.is_retryable());

        let external = MallError::ExternalService {
            service: "item-service".to_string(),
            message: "连接超时".to_string(),
        };
        assert!(external.is_retryable());

        // 业务错误不可重试
        assert!(!MallError::AlreadyPaid.is_retryable());
        assert!(!MallError::InsufficientStock.is_retryable());
        assert!(
            !MallError::ItemsNotFound { missing: vec![1] }.is_retryable()
        );
    }

    #[test]
    fn test_status_code_mapping() {
        // 业务错误 -> 4xx
        assert_eq!(MallError::AlreadyPaid.status_code(), 400);
        assert_eq!(MallError::OrderClosed.status_code(), 400);
        assert_eq!(MallError::InsufficientStock.status_code(), 400);
        assert_eq!(
            MallError::NotFound {
                entity: "Order".to_string(),
                id: "1".to_string(),
            }
            .status_code(),
            404
        );

        // 基础设施错误 -> 5xx
        assert_eq!(MallError::Kafka("broker 不可达".to_string()).status_code(), 500);
        assert_eq!(MallError::Internal("oops".to_string()).status_code(), 500);
    }
}
