//! 订单状态枚举
//!
//! 状态以 SMALLINT 存库，与历史数据的数值约定保持一致。

use serde::{Deserialize, Serialize};

/// 订单状态
///
/// 合法迁移仅有 未支付->已支付 和 未支付->已取消，
/// 已支付与已取消都是吸收态。已发货/已完成是预留值，当前链路不会写入。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
pub enum OrderStatus {
    /// 未支付
    Unpaid = 1,
    /// 已支付
    Paid = 2,
    /// 已发货（预留）
    Shipped = 3,
    /// 已完成（预留）
    Finished = 4,
    /// 已取消
    Cancelled = 5,
}

impl OrderStatus {
    /// 是否为终态（不允许再迁移）
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_values_match_legacy() {
        assert_eq!(OrderStatus::Unpaid as i16, 1);
        assert_eq!(OrderStatus::Paid as i16, 2);
        assert_eq!(OrderStatus::Cancelled as i16, 5);
    }

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Unpaid.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
    }
}
