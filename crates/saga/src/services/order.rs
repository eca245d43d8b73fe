//! Order participant trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use common::{CustomerId, Money, OrderId};
use domain::OrderLine;
use serde::{Deserialize, Serialize};

use super::CallLog;
use crate::error::{Result, SagaError};

/// Result of a successful order creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub order_id: OrderId,
    pub total_amount: Money,
    pub status: String,
}

/// Operations the saga needs from the order service.
#[async_trait]
pub trait OrderParticipant: Send + Sync + 'static {
    /// Creates a pending order, reserving stock.
    async fn create_order(&self, customer_id: CustomerId, items: &[OrderLine])
    -> Result<CreatedOrder>;

    /// Marks the order completed.
    async fn confirm_order(&self, order_id: OrderId) -> Result<()>;

    /// Cancels the order. Used as compensation.
    async fn cancel_order(&self, order_id: OrderId) -> Result<()>;
}

#[derive(Debug)]
struct InMemoryOrderState {
    order_id: OrderId,
    total_amount: Money,
    orders: HashMap<OrderId, &'static str>,
    fail_on_create: bool,
    fail_on_confirm: bool,
    fail_on_cancel: bool,
    create_delay: Option<Duration>,
    cancel_delay: Option<Duration>,
}

/// Scripted order service for testing.
///
/// Every created order gets the configured id and total (42 and 19.98 by
/// default).
#[derive(Debug, Clone)]
pub struct InMemoryOrderParticipant {
    state: Arc<Mutex<InMemoryOrderState>>,
    log: CallLog,
}

impl InMemoryOrderParticipant {
    /// Creates a participant recording its calls into `log`.
    pub fn new(log: CallLog) -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryOrderState {
                order_id: OrderId::new(42),
                total_amount: Money::from_cents(1998),
                orders: HashMap::new(),
                fail_on_create: false,
                fail_on_confirm: false,
                fail_on_cancel: false,
                create_delay: None,
                cancel_delay: None,
            })),
            log,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, InMemoryOrderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the id and total returned by `create_order`.
    pub fn set_created_order(&self, order_id: OrderId, total_amount: Money) {
        let mut state = self.state();
        state.order_id = order_id;
        state.total_amount = total_amount;
    }

    /// Configures `create_order` to fail.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state().fail_on_create = fail;
    }

    /// Configures `confirm_order` to fail.
    pub fn set_fail_on_confirm(&self, fail: bool) {
        self.state().fail_on_confirm = fail;
    }

    /// Configures `cancel_order` to fail.
    pub fn set_fail_on_cancel(&self, fail: bool) {
        self.state().fail_on_cancel = fail;
    }

    /// Makes `create_order` wait before answering.
    pub fn set_create_delay(&self, delay: Option<Duration>) {
        self.state().create_delay = delay;
    }

    /// Makes `cancel_order` wait before answering.
    pub fn set_cancel_delay(&self, delay: Option<Duration>) {
        self.state().cancel_delay = delay;
    }

    /// Returns the status of an order, if it was created.
    pub fn order_status(&self, order_id: OrderId) -> Option<&'static str> {
        self.state().orders.get(&order_id).copied()
    }
}

#[async_trait]
impl OrderParticipant for InMemoryOrderParticipant {
    async fn create_order(
        &self,
        _customer_id: CustomerId,
        _items: &[OrderLine],
    ) -> Result<CreatedOrder> {
        self.log.record("create_order");
        let delay = self.state().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.fail_on_create {
            return Err(SagaError::participant("order", "product 5 is out of stock"));
        }
        let order_id = state.order_id;
        state.orders.insert(order_id, "pending");

        Ok(CreatedOrder {
            order_id,
            total_amount: state.total_amount,
            status: "pending".to_string(),
        })
    }

    async fn confirm_order(&self, order_id: OrderId) -> Result<()> {
        self.log.record(format!("confirm_order({order_id})"));
        let mut state = self.state();
        if state.fail_on_confirm {
            return Err(SagaError::participant("order", "order service unavailable"));
        }
        state.orders.insert(order_id, "completed");
        Ok(())
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<()> {
        self.log.record(format!("cancel_order({order_id})"));
        let delay = self.state().cancel_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.fail_on_cancel {
            return Err(SagaError::participant("order", "order service unavailable"));
        }
        state.orders.insert(order_id, "cancelled");
        Ok(())
    }
}
