//! 订单链路集成测试
//!
//! 使用真实 PostgreSQL 覆盖下单事务、条件状态迁移与对账收敛，
//! 这些路径依赖 sqlx 条件更新的行数语义，无法用纯 mock 覆盖。
//! 商品/支付协作方用进程内测试替身，记录调用以便断言。
//!
//! ## 运行方式
//!
//! ```bash
//! TEST_DATABASE_URL=postgres://... TEST_KAFKA_BROKERS=localhost:9092 \
//!   cargo test --test order_flow_test -- --ignored
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

use mall_shared::database::Database;
use mall_shared::error::{MallError, Result};
use mall_shared::kafka::MessageProducer;
use mall_shared::test_utils::{test_database_config, test_kafka_config, test_user_id};

use trade_service::clients::{ItemClient, ItemDto, PayClient, PayOrderDto, pay_status};
use trade_service::models::OrderStatus;
use trade_service::reconciliation::ReconciliationWorker;
use trade_service::repository::{DeadLetterRepository, OrderRepository};
use trade_service::service::{CreateOrderRequest, OrderLine, OrderService};

// ==================== 测试替身 ====================

/// 进程内商品服务替身
///
/// 固定商品目录，可配置扣减失败，并记录全部恢复库存调用。
struct FakeItemClient {
    items: Vec<ItemDto>,
    fail_deduct: bool,
    restores: Mutex<Vec<(i64, i32)>>,
}

impl FakeItemClient {
    fn with_items(items: Vec<ItemDto>) -> Self {
        Self {
            items,
            fail_deduct: false,
            restores: Mutex::new(Vec::new()),
        }
    }

    fn failing_deduct(items: Vec<ItemDto>) -> Self {
        Self {
            fail_deduct: true,
            ..Self::with_items(items)
        }
    }

    fn recorded_restores(&self) -> Vec<(i64, i32)> {
        self.restores.lock().unwrap().clone()
    }
}

#[async_trait]
impl ItemClient for FakeItemClient {
    async fn query_items_by_ids(&self, ids: &[i64]) -> Result<Vec<ItemDto>> {
        Ok(self
            .items
            .iter()
            .filter(|item| ids.contains(&item.id))
            .cloned()
            .collect())
    }

    async fn deduct_stock(&self, _lines: &[OrderLine]) -> Result<()> {
        if self.fail_deduct {
            Err(MallError::InsufficientStock)
        } else {
            Ok(())
        }
    }

    async fn restore_stock(&self, item_id: i64, num: i32) -> Result<()> {
        self.restores.lock().unwrap().push((item_id, num));
        Ok(())
    }
}

/// 进程内支付服务替身，返回固定的支付单查询结果
struct FakePayClient {
    pay_order: Option<PayOrderDto>,
}

#[async_trait]
impl PayClient for FakePayClient {
    async fn query_pay_order_by_biz_order_no(&self, _order_id: i64) -> Result<Option<PayOrderDto>> {
        Ok(self.pay_order.clone())
    }
}

// ==================== 辅助函数 ====================

fn catalog() -> Vec<ItemDto> {
    vec![
        ItemDto {
            id: 42,
            name: "测试商品A".to_string(),
            price: 500,
            stock: 100,
            status: 1,
            spec: None,
            image: None,
        },
        ItemDto {
            id: 7,
            name: "测试商品B".to_string(),
            price: 1200,
            stock: 100,
            status: 1,
            spec: Some("红色".to_string()),
            image: None,
        },
    ]
}

async fn test_pool() -> PgPool {
    let db = Database::connect(&test_database_config())
        .await
        .expect("连接测试数据库失败");
    db.pool().clone()
}

fn build_order_service(pool: PgPool, item_client: Arc<FakeItemClient>) -> Arc<OrderService> {
    let producer = MessageProducer::new(&test_kafka_config()).expect("创建生产者失败");
    Arc::new(OrderService::new(
        OrderRepository::new(pool),
        item_client,
        producer,
        120,
    ))
}

fn order_request(user_id: i64, lines: Vec<OrderLine>) -> CreateOrderRequest {
    CreateOrderRequest {
        user_id,
        payment_type: 1,
        details: lines,
    }
}

async fn count_orders_for_user(pool: &PgPool, user_id: i64) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("统计订单失败")
}

// ==================== 下单 ====================

#[tokio::test]
#[ignore]
async fn test_create_order_totals_and_details() {
    let pool = test_pool().await;
    let item_client = Arc::new(FakeItemClient::with_items(catalog()));
    let service = build_order_service(pool.clone(), item_client);

    let user_id = test_user_id();
    let order_id = service
        .create_order(order_request(
            user_id,
            vec![
                OrderLine { item_id: 42, num: 2 },
                OrderLine { item_id: 7, num: 1 },
            ],
        ))
        .await
        .expect("下单失败");

    let order = service
        .get_order(order_id)
        .await
        .unwrap()
        .expect("订单应存在");
    // 500*2 + 1200*1，总价按商品目录单价计算
    assert_eq!(order.total_fee, 2200);
    assert_eq!(order.status, OrderStatus::Unpaid);
    assert!(order.pay_time.is_none());

    let details = service.list_order_details(order_id).await.unwrap();
    assert_eq!(details.len(), 2);
    let line42 = details.iter().find(|d| d.item_id == 42).unwrap();
    assert_eq!(line42.num, 2);
    assert_eq!(line42.price, 500);
}

#[tokio::test]
#[ignore]
async fn test_create_order_rolls_back_on_stock_failure() {
    let pool = test_pool().await;
    let item_client = Arc::new(FakeItemClient::failing_deduct(catalog()));
    let service = build_order_service(pool.clone(), item_client);

    let user_id = test_user_id();
    let err = service
        .create_order(order_request(user_id, vec![OrderLine { item_id: 42, num: 2 }]))
        .await
        .unwrap_err();
    assert!(matches!(err, MallError::InsufficientStock));

    // 远程扣减失败，本地订单与明细一并回滚
    assert_eq!(count_orders_for_user(&pool, user_id).await, 0);
}

#[tokio::test]
#[ignore]
async fn test_create_order_rejects_missing_items() {
    let pool = test_pool().await;
    let item_client = Arc::new(FakeItemClient::with_items(catalog()));
    let service = build_order_service(pool.clone(), item_client);

    let user_id = test_user_id();
    let err = service
        .create_order(order_request(
            user_id,
            vec![OrderLine { item_id: 999999, num: 1 }],
        ))
        .await
        .unwrap_err();

    match err {
        MallError::ItemsNotFound { missing } => assert_eq!(missing, vec![999999]),
        other => panic!("意外错误类型: {other}"),
    }
    assert_eq!(count_orders_for_user(&pool, user_id).await, 0);
}

// ==================== 条件状态迁移 ====================

#[tokio::test]
#[ignore]
async fn test_concurrent_mark_pay_success_single_winner() {
    let pool = test_pool().await;
    let item_client = Arc::new(FakeItemClient::with_items(catalog()));
    let service = build_order_service(pool.clone(), item_client);

    let user_id = test_user_id();
    let order_id = service
        .create_order(order_request(user_id, vec![OrderLine { item_id: 42, num: 1 }]))
        .await
        .unwrap();

    // N 个并发标记，条件更新保证恰好一个真正发生迁移
    let repo = Arc::new(OrderRepository::new(pool.clone()));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.mark_pay_success(order_id, Utc::now()).await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    let order = service.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.pay_time.is_some());
}

#[tokio::test]
#[ignore]
async fn test_cancel_restores_stock_exactly_once() {
    let pool = test_pool().await;
    let item_client = Arc::new(FakeItemClient::with_items(catalog()));
    let service = build_order_service(pool.clone(), item_client.clone());

    let user_id = test_user_id();
    let order_id = service
        .create_order(order_request(user_id, vec![OrderLine { item_id: 42, num: 2 }]))
        .await
        .unwrap();

    // 重复取消：只有第一次真正发生迁移，库存只恢复一次
    service.cancel_order(order_id).await.unwrap();
    service.cancel_order(order_id).await.unwrap();

    let order = service.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(item_client.recorded_restores(), vec![(42, 2)]);
}

#[tokio::test]
#[ignore]
async fn test_cancel_after_pay_is_noop() {
    let pool = test_pool().await;
    let item_client = Arc::new(FakeItemClient::with_items(catalog()));
    let service = build_order_service(pool.clone(), item_client.clone());

    let user_id = test_user_id();
    let order_id = service
        .create_order(order_request(user_id, vec![OrderLine { item_id: 42, num: 1 }]))
        .await
        .unwrap();

    service.mark_order_pay_success(order_id).await.unwrap();
    service.cancel_order(order_id).await.unwrap();

    // 已支付是吸收态，取消是良性无操作且不触碰库存
    let order = service.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(item_client.recorded_restores().is_empty());
}

// ==================== 对账收敛 ====================

#[tokio::test]
#[ignore]
async fn test_reconcile_marks_paid_when_payment_succeeded() {
    let pool = test_pool().await;
    let item_client = Arc::new(FakeItemClient::with_items(catalog()));
    let service = build_order_service(pool.clone(), item_client);

    let user_id = test_user_id();
    let order_id = service
        .create_order(order_request(user_id, vec![OrderLine { item_id: 7, num: 1 }]))
        .await
        .unwrap();

    // 支付已成功但直接通知丢失，对账补偿标记
    let worker = ReconciliationWorker::new(
        service.clone(),
        Arc::new(FakePayClient {
            pay_order: Some(PayOrderDto {
                id: 1,
                biz_order_no: order_id,
                status: pay_status::TRADE_SUCCESS,
            }),
        }),
    );
    worker.reconcile(order_id).await.unwrap();

    let order = service.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
}

#[tokio::test]
#[ignore]
async fn test_reconcile_cancels_when_no_payment() {
    let pool = test_pool().await;
    let item_client = Arc::new(FakeItemClient::with_items(catalog()));
    let service = build_order_service(pool.clone(), item_client.clone());

    let user_id = test_user_id();
    let order_id = service
        .create_order(order_request(user_id, vec![OrderLine { item_id: 42, num: 2 }]))
        .await
        .unwrap();

    let worker = ReconciliationWorker::new(
        service.clone(),
        Arc::new(FakePayClient { pay_order: None }),
    );
    worker.reconcile(order_id).await.unwrap();

    // 延迟窗口内无支付：取消并按原始数量恢复库存
    let order = service.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(item_client.recorded_restores(), vec![(42, 2)]);

    // 对账是幂等的，再跑一次不产生额外效果
    worker.reconcile(order_id).await.unwrap();
    assert_eq!(item_client.recorded_restores(), vec![(42, 2)]);
}

// ==================== 死信台账 ====================

#[tokio::test]
#[ignore]
async fn test_dead_letter_record_persisted() {
    let pool = test_pool().await;
    let repo = DeadLetterRepository::new(pool.clone());

    let order_id = test_user_id();
    let message = mall_shared::messages::DeadLetterMessage::new(
        order_id,
        "trade.delay.order",
        "数据库连接失败",
        3,
        "trade-service",
    );

    let record_id = repo.insert(&message).await.expect("死信落库失败");
    assert!(record_id > 0);

    let recent = repo.list_recent(50).await.unwrap();
    let record = recent
        .iter()
        .find(|r| r.order_id == order_id)
        .expect("台账中应能查到刚写入的死信");
    assert_eq!(record.retry_count, 3);
    assert_eq!(record.source_topic, "trade.delay.order");
}
