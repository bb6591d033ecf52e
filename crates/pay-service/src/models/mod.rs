//! 支付领域模型

pub mod enums;
pub mod pay_order;

pub use enums::PayStatus;
pub use pay_order::{NewPayOrder, PayOrder};
