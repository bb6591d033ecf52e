//! 支付服务
//!
//! 支付单生命周期的归属方：幂等的支付单申请、余额支付结算、
//! 购物车清理与支付成功事件发布。
//!
//! 幂等性设计：
//! - 支付单申请以"先查后建"保证每个业务订单至多一张支付单，
//!   重复申请返回同一张单，换渠道则原地重置而不新建
//! - 支付成功的状态翻转是条件更新，并发的重复支付只有一个能赢

pub mod clients;
pub mod models;
pub mod repository;
pub mod service;

pub use clients::{
    CartClient, HttpCartClient, HttpTradeClient, HttpUserClient, OrderDetailDto, TradeClient,
    UserClient,
};
pub use models::{NewPayOrder, PayOrder, PayStatus};
pub use repository::{PayOrderRepo, PgPayOrderRepository};
pub use service::{
    ApplyPayOrderRequest, KafkaPaySuccessPublisher, PayOrderService, PaySuccessPublisher,
};
