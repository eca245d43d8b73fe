//! End-to-end tests: the saga engine driving the real participant services,
//! with their outbox relays and saga consumers wired over an in-process bus.

use std::sync::Arc;
use std::time::Duration;

use common::topics::{SAGA_EVENTS, SAGA_RESPONSES};
use common::{CustomerId, Money, OrderId};
use domain::{
    InMemoryOrderStore, InMemorySalesStore, OrderLine, OrderSagaHandler, OrderService,
    OrderStatus, SalesSagaHandler, SalesService, SalesStatus,
};
use outbox::{InMemoryMessageBus, InMemoryOutbox, MessageBus, OutboxRelay, RelayConfig, SagaConsumer};
use saga::{
    CoordinatorConfig, LocalOrderParticipant, LocalSalesParticipant, OrchestrationRequest,
    SagaCoordinator, StepStatus, WorkflowStatus, WorkflowStore,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

type Coordinator = SagaCoordinator<
    LocalOrderParticipant<InMemoryOrderStore>,
    LocalSalesParticipant<InMemorySalesStore>,
>;

struct TestHarness {
    coordinator: Coordinator,
    orders: OrderService<InMemoryOrderStore>,
    sales: SalesService<InMemorySalesStore>,
    order_relay: OutboxRelay<InMemoryOutbox>,
    sales_relay: OutboxRelay<InMemoryOutbox>,
    consumers: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl TestHarness {
    async fn new() -> Self {
        let orders = OrderService::new(InMemoryOrderStore::with_demo_catalog());
        let sales = SalesService::new(InMemorySalesStore::with_demo_vouchers());
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryMessageBus::new());
        let (shutdown, rx) = watch::channel(false);

        let order_relay = OutboxRelay::new(
            orders.store().outbox().clone(),
            bus.clone(),
            RelayConfig::for_topic(SAGA_EVENTS),
        );
        let sales_relay = OutboxRelay::new(
            sales.store().outbox().clone(),
            bus.clone(),
            RelayConfig::for_topic(SAGA_RESPONSES),
        );

        let consumers = vec![
            SagaConsumer::new(bus.clone(), SAGA_EVENTS, SalesSagaHandler::new(sales.clone()))
                .start(rx.clone())
                .await
                .unwrap(),
            SagaConsumer::new(bus, SAGA_RESPONSES, OrderSagaHandler::new(orders.clone()))
                .start(rx)
                .await
                .unwrap(),
        ];

        let coordinator = SagaCoordinator::new(
            WorkflowStore::new(),
            LocalOrderParticipant::new(orders.clone()),
            LocalSalesParticipant::new(sales.clone()),
            CoordinatorConfig::default(),
        );

        Self {
            coordinator,
            orders,
            sales,
            order_relay,
            sales_relay,
            consumers,
            shutdown,
        }
    }

    async fn order_status(&self, id: OrderId) -> OrderStatus {
        self.orders.get_order(id).await.unwrap().status
    }

    async fn shutdown(self) {
        self.shutdown.send(true).unwrap();
        for consumer in self.consumers {
            consumer.await.unwrap();
        }
    }
}

/// Polls `check` until it holds, failing the test after about two seconds.
async fn eventually(mut check: impl AsyncFnMut() -> bool) {
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn request(voucher: Option<&str>) -> OrchestrationRequest {
    OrchestrationRequest {
        customer_id: CustomerId::new(1),
        items: vec![OrderLine::new(5, 2)],
        voucher_code: voucher.map(str::to_string),
    }
}

#[tokio::test]
async fn test_orchestrated_order_completes_and_events_settle() {
    let harness = TestHarness::new().await;

    let workflow = harness
        .coordinator
        .run_to_completion(request(Some("SAVE10")))
        .await
        .unwrap();

    assert_eq!(workflow.status, WorkflowStatus::Completed);
    assert!(workflow.steps.iter().all(|s| s.status == StepStatus::Completed));
    let order_id = workflow.response.order_id.unwrap();
    assert_eq!(workflow.response.final_amount, Some(Money::from_cents(1798)));
    assert_eq!(harness.order_status(order_id).await, OrderStatus::Completed);

    // ORDER_CREATED reaches the sales consumer after the sale already exists.
    assert_eq!(harness.order_relay.run_once().await.unwrap(), 2);
    assert_eq!(harness.sales_relay.run_once().await.unwrap(), 1);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.sales.store().transaction_count().await, 1);
    let sale = harness.sales.get_by_order(order_id).await.unwrap();
    assert_eq!(sale.status, SalesStatus::Completed);
    assert_eq!(sale.voucher_code.as_deref(), Some("SAVE10"));
    assert_eq!(harness.order_status(order_id).await, OrderStatus::Completed);
    assert_eq!(harness.orders.store().outbox().unprocessed_count().await, 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_sales_failure_compensates_order() {
    let harness = TestHarness::new().await;
    harness.sales.store().set_fail_on_write(true).await;

    let workflow = harness
        .coordinator
        .run_to_completion(request(None))
        .await
        .unwrap();

    assert_eq!(workflow.status, WorkflowStatus::Compensated);
    assert_eq!(workflow.steps.len(), 2);
    assert!(
        workflow
            .response
            .error
            .as_deref()
            .unwrap()
            .contains("sales write failed")
    );
    let order_id = workflow.response.order_id.unwrap();
    assert_eq!(harness.order_status(order_id).await, OrderStatus::Cancelled);

    // The late SALES_TRANSACTION_FAILED finds the order already cancelled.
    assert_eq!(harness.sales_relay.run_once().await.unwrap(), 1);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.order_status(order_id).await, OrderStatus::Cancelled);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_choreographed_order_is_completed_by_events() {
    let harness = TestHarness::new().await;

    let order = harness
        .orders
        .create_order(CustomerId::new(3), &[OrderLine::new(1, 1)])
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);

    harness.order_relay.run_once().await.unwrap();
    eventually(async || harness.sales.get_by_order(order.id).await.is_ok()).await;

    let pending = harness.sales.get_by_order(order.id).await.unwrap();
    assert_eq!(pending.status, SalesStatus::Pending);
    assert_eq!(pending.final_amount, Money::from_cents(4999));

    harness.sales_relay.run_once().await.unwrap();
    eventually(async || harness.order_status(order.id).await == OrderStatus::Completed).await;

    harness.shutdown().await;
}

#[tokio::test]
async fn test_redelivered_order_created_creates_one_sale() {
    let harness = TestHarness::new().await;
    let outbox = harness.orders.store().outbox().clone();

    let order = harness
        .orders
        .create_order(CustomerId::new(3), &[OrderLine::new(2, 3)])
        .await
        .unwrap();

    // Published, but the processed flag cannot be written: the row stays
    // unprocessed and is published again on the next cycle.
    outbox.set_fail_on_mark(true).await;
    assert!(harness.order_relay.run_once().await.is_err());
    outbox.set_fail_on_mark(false).await;
    assert_eq!(harness.order_relay.run_once().await.unwrap(), 1);

    eventually(async || harness.sales.get_by_order(order.id).await.is_ok()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.sales.store().transaction_count().await, 1);
    assert_eq!(harness.sales.store().outbox().len().await, 1);
    assert_eq!(outbox.unprocessed_count().await, 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_workflows_are_independent() {
    let harness = TestHarness::new().await;

    let mut ids = Vec::new();
    for customer in 1..=5 {
        let mut req = request(None);
        req.customer_id = CustomerId::new(customer);
        ids.push(harness.coordinator.start(req).await.unwrap());
    }

    for id in ids {
        eventually(async || {
            harness
                .coordinator
                .get_status(id)
                .await
                .is_ok_and(|w| w.status.is_terminal())
        })
        .await;
        let workflow = harness.coordinator.get_status(id).await.unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Completed);
        assert_eq!(workflow.steps.len(), 3);
    }

    let orders: Vec<OrderId> = (1..=5).map(OrderId::new).collect();
    for id in orders {
        assert_eq!(harness.order_status(id).await, OrderStatus::Completed);
    }

    harness.shutdown().await;
}
