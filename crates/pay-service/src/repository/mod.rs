//! 支付单仓储层
//!
//! 以 trait 抽象数据访问，服务层持有 trait object，
//! 单元测试用 mock 仓储覆盖支付申请的全部幂等分支。
//! 状态迁移用条件更新表达，`rows_affected` 为 0 表示目标行已离开期望状态。

mod pay_order_repo;

pub use pay_order_repo::{PayOrderRepo, PgPayOrderRepository};

#[cfg(test)]
pub use pay_order_repo::MockPayOrderRepo;
