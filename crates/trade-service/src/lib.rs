//! 交易服务
//!
//! 负责订单生命周期：下单（含库存预占）、标记支付成功、取消订单（含库存恢复）。
//!
//! 订单与支付状态通过两条独立路径最终收敛：
//! - **直接路径**：支付服务发布 `pay.success` 事件，本服务消费后把订单标记为已支付
//! - **兜底路径**：下单时发送 120 秒延迟对账消息，到点后主动查询支付单状态，
//!   已支付则补标记，未支付则取消订单并恢复库存
//!
//! 两条路径的落点都是状态条件更新（乐观并发控制），任意交错、重复投递均幂等。
//! 对账消费重试耗尽的消息进入死信 topic，由死信落库消费者持久化等待人工介入。
//!
//! ## 模块结构
//!
//! - `models`: 订单领域模型
//! - `clients`: 商品/支付协作方客户端
//! - `repository`: 订单与死信记录仓储
//! - `service`: 订单业务服务
//! - `consumer`: 支付成功事件消费者
//! - `reconciliation`: 延迟对账消费者
//! - `dead_letter`: 死信落库消费者

pub mod clients;
pub mod consumer;
pub mod dead_letter;
pub mod models;
pub mod reconciliation;
pub mod repository;
pub mod service;

pub use clients::{HttpItemClient, HttpPayClient, ItemClient, ItemDto, PayClient, PayOrderDto};
pub use models::{Order, OrderDetail, OrderStatus};
pub use repository::{DeadLetterRepository, OrderRepository};
pub use service::{CreateOrderRequest, OrderLine, OrderService};
