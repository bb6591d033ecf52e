//! 支付业务服务

mod pay_order_service;

pub use pay_order_service::{
    ApplyPayOrderRequest, KafkaPaySuccessPublisher, PayOrderService, PaySuccessPublisher,
};
