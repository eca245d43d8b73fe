use async_trait::async_trait;
use common::OrderId;
use outbox::{Disposition, EventPayload, SagaEvent, SagaEventHandler};

use super::{SalesService, SalesStore};
use crate::DomainError;

/// Reacts to ORDER_CREATED on the forward topic by recording a pending sale.
pub struct SalesSagaHandler<S: SalesStore> {
    service: SalesService<S>,
}

impl<S: SalesStore> SalesSagaHandler<S> {
    pub fn new(service: SalesService<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S: SalesStore> SagaEventHandler for SalesSagaHandler<S> {
    type Error = DomainError;

    fn name(&self) -> &'static str {
        "sales"
    }

    async fn handle(&self, event: &SagaEvent) -> Result<Disposition, DomainError> {
        let EventPayload::OrderCreated(data) = &event.payload else {
            return Ok(Disposition::Ignored);
        };

        let created = self
            .service
            .record_order_created(OrderId::new(event.aggregate_id), data)
            .await?;
        Ok(if created {
            Disposition::Applied
        } else {
            Disposition::Ignored
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sales::{InMemorySalesStore, SalesStatus};
    use common::{CustomerId, Money};
    use outbox::{OrderCreatedData, OrderStatusChangedData};

    fn order_created(order_id: i64) -> SagaEvent {
        SagaEvent::new(
            order_id,
            EventPayload::OrderCreated(OrderCreatedData {
                customer_id: CustomerId::new(1),
                total_amount: Money::from_cents(1998),
            }),
        )
    }

    #[tokio::test]
    async fn test_duplicate_order_created_is_applied_once() {
        let service = SalesService::new(InMemorySalesStore::with_demo_vouchers());
        let handler = SalesSagaHandler::new(service.clone());
        let event = order_created(42);

        assert_eq!(handler.handle(&event).await.unwrap(), Disposition::Applied);
        assert_eq!(handler.handle(&event).await.unwrap(), Disposition::Ignored);

        let sale = service.get_by_order(OrderId::new(42)).await.unwrap();
        assert_eq!(sale.status, SalesStatus::Pending);
        assert_eq!(sale.final_amount, Money::from_cents(1998));
        assert_eq!(service.store().outbox().len().await, 1);
    }

    #[tokio::test]
    async fn test_other_events_are_ignored() {
        let handler = SalesSagaHandler::new(SalesService::new(InMemorySalesStore::new()));
        let event = SagaEvent::new(
            42,
            EventPayload::OrderStatusChanged(OrderStatusChangedData {
                status: "completed".to_string(),
            }),
        );
        assert_eq!(handler.handle(&event).await.unwrap(), Disposition::Ignored);
    }
}
