//! 支付单状态枚举
//!
//! 状态以 SMALLINT 存库，数值与交易服务侧读模型的约定一致。

use serde::{Deserialize, Serialize};

/// 支付单状态
///
/// 合法迁移为 未提交->待支付->{支付成功|交易关闭}，
/// 支付成功与交易关闭都是吸收态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
pub enum PayStatus {
    /// 未提交
    NotCommit = 0,
    /// 待支付
    WaitBuyerPay = 1,
    /// 交易关闭
    TradeClosed = 2,
    /// 支付成功
    TradeSuccess = 3,
}

impl PayStatus {
    /// 支付是否已成功
    pub fn is_success(&self) -> bool {
        matches!(self, Self::TradeSuccess)
    }

    /// 是否为终态（不允许再迁移）
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TradeSuccess | Self::TradeClosed)
    }

    /// 是否仍可发起支付（申请重放/换渠道重置只允许在这些状态）
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::NotCommit | Self::WaitBuyerPay)
    }
}
