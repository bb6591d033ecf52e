//! 数据库仓储层
//!
//! 仓储只负责数据持久化，不包含业务逻辑；
//! 状态迁移一律用条件更新表达，`rows_affected` 为 0 表示目标行已不在期望状态。
//! 事务控制由调用方（服务层）决定，写入方法接受事务内连接。

mod dead_letter_repo;
mod order_repo;

pub use dead_letter_repo::DeadLetterRepository;
pub use order_repo::OrderRepository;
