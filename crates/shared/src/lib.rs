//! 共享库
//!
//! 包含交易/支付各服务共用的配置、错误处理、数据库连接、
//! 消息总线适配层等基础设施代码。

pub mod config;
pub mod database;
pub mod error;
pub mod kafka;
pub mod messages;
pub mod retry;
pub mod test_utils;
