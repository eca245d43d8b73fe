use async_trait::async_trait;
use common::OrderId;
use outbox::{Disposition, EventPayload, SagaEvent, SagaEventHandler};

use super::{OrderService, OrderStatus, OrderStore};
use crate::DomainError;

/// Reacts to sales outcomes on the response topic.
///
/// A completed sale completes the order and a failed sale cancels it. A
/// success that arrives after the order was cancelled is ignored.
pub struct OrderSagaHandler<S: OrderStore> {
    service: OrderService<S>,
}

impl<S: OrderStore> OrderSagaHandler<S> {
    pub fn new(service: OrderService<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S: OrderStore> SagaEventHandler for OrderSagaHandler<S> {
    type Error = DomainError;

    fn name(&self) -> &'static str {
        "order"
    }

    async fn handle(&self, event: &SagaEvent) -> Result<Disposition, DomainError> {
        let target = match &event.payload {
            EventPayload::SalesTransactionCompleted(_) => OrderStatus::Completed,
            EventPayload::SalesTransactionFailed(data) => {
                tracing::warn!(order_id = event.aggregate_id, error = %data.error, "sale failed, cancelling order");
                OrderStatus::Cancelled
            }
            _ => return Ok(Disposition::Ignored),
        };

        match self
            .service
            .transition(OrderId::new(event.aggregate_id), target)
            .await
        {
            Ok(true) => Ok(Disposition::Applied),
            Ok(false) => Ok(Disposition::Ignored),
            Err(DomainError::InvalidTransition { from, to, .. }) => {
                tracing::info!(order_id = event.aggregate_id, %from, %to, "stale saga event ignored");
                Ok(Disposition::Ignored)
            }
            Err(e) => Err(e),
        }
    }
}
