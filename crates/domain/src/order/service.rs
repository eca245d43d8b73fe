//! Order service: catalog queries and order mutations with their outbox events.

use common::{CustomerId, Money, OrderId};
use outbox::{EventPayload, NewOutboxEvent, OrderCreatedData, OrderStatusChangedData, OutboxWriter};

use super::{Order, OrderItem, OrderLine, OrderStatus, OrderStore, OrderTx, Product};
use crate::{DomainError, Result};

/// Service for the order participant.
///
/// Every mutation commits its state change and the event announcing it in
/// one local transaction.
#[derive(Clone)]
pub struct OrderService<S: OrderStore> {
    store: S,
}

impl<S: OrderStore> OrderService<S> {
    /// Creates a new order service on the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Lists the catalog.
    pub async fn list_products(&self) -> Result<Vec<Product>> {
        self.store.list_products().await
    }

    /// Creates a pending order, reserving stock and recording ORDER_CREATED.
    ///
    /// Unknown products and insufficient stock abort the whole transaction.
    #[tracing::instrument(skip(self, lines), fields(items = lines.len()))]
    pub async fn create_order(&self, customer_id: CustomerId, lines: &[OrderLine]) -> Result<Order> {
        if !customer_id.is_valid() {
            return Err(DomainError::Validation("customer_id must be positive".to_string()));
        }
        if lines.is_empty() {
            return Err(DomainError::Validation("order must contain at least one item".to_string()));
        }
        if let Some(line) = lines.iter().find(|l| l.quantity == 0) {
            return Err(DomainError::Validation(format!(
                "quantity for product {} must be positive",
                line.product_id
            )));
        }

        let mut tx = self.store.begin().await?;

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let product = tx
                .product_for_update(line.product_id)
                .await?
                .ok_or_else(|| DomainError::not_found("product", line.product_id))?;

            if product.stock_quantity < line.quantity {
                return Err(DomainError::InsufficientStock {
                    product_id: product.id.as_i64(),
                    requested: line.quantity,
                    available: product.stock_quantity,
                });
            }

            tx.decrement_stock(product.id, line.quantity).await?;
            items.push(OrderItem {
                product_id: product.id,
                quantity: line.quantity,
                price: product.price,
            });
        }

        let total_amount: Money = items.iter().map(OrderItem::line_total).sum();
        let order = tx.insert_order(customer_id, total_amount, &items).await?;

        let payload = EventPayload::OrderCreated(OrderCreatedData {
            customer_id,
            total_amount,
        });
        tx.write_event(NewOutboxEvent::new(order.id, &payload)?).await?;
        tx.commit().await?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(order_id = %order.id, total = %order.total_amount, "order created");
        Ok(order)
    }

    /// Loads an order.
    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.store
            .get_order(id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", id))
    }

    /// Moves an order to a new status and records ORDER_STATUS_CHANGED.
    ///
    /// Setting the current status again is a no-op that writes nothing.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order> {
        self.transition(id, status).await?;
        self.get_order(id).await
    }

    /// Applies a status change and reports whether anything changed.
    pub(crate) async fn transition(&self, id: OrderId, next: OrderStatus) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        let current = tx
            .status_for_update(id)
            .await?
            .ok_or_else(|| DomainError::not_found("order", id))?;

        if current == next {
            return Ok(false);
        }
        if !current.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                entity: "order",
                id: id.as_i64(),
                from: current.to_string(),
                to: next.to_string(),
            });
        }

        tx.set_status(id, next).await?;
        let payload = EventPayload::OrderStatusChanged(OrderStatusChangedData {
            status: next.as_str().to_string(),
        });
        tx.write_event(NewOutboxEvent::new(id, &payload)?).await?;
        tx.commit().await?;

        tracing::info!(order_id = %id, from = %current, to = %next, "order status changed");
        Ok(true)
    }
}
