//! 订单领域模型

pub mod enums;
pub mod order;

pub use enums::OrderStatus;
pub use order::{DeadLetterRecord, NewOrderDetail, Order, OrderDetail};
