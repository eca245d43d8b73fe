//! Participants backed by the domain services in the same process.

use async_trait::async_trait;
use common::{CustomerId, OrderId, SalesId};
use domain::{
    OrderLine, OrderService, OrderStatus, OrderStore, ProcessSale, SalesService, SalesStore,
};

use super::{CreatedOrder, OrderParticipant, ProcessedSale, SalesParticipant};
use crate::error::{Result, SagaError};

/// Order participant calling an [`OrderService`] directly.
pub struct LocalOrderParticipant<S: OrderStore> {
    service: OrderService<S>,
}

impl<S: OrderStore> LocalOrderParticipant<S> {
    pub fn new(service: OrderService<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S: OrderStore> OrderParticipant for LocalOrderParticipant<S> {
    async fn create_order(
        &self,
        customer_id: CustomerId,
        items: &[OrderLine],
    ) -> Result<CreatedOrder> {
        let order = self
            .service
            .create_order(customer_id, items)
            .await
            .map_err(|e| SagaError::participant("order", e))?;

        Ok(CreatedOrder {
            order_id: order.id,
            total_amount: order.total_amount,
            status: order.status.to_string(),
        })
    }

    async fn confirm_order(&self, order_id: OrderId) -> Result<()> {
        self.service
            .update_status(order_id, OrderStatus::Completed)
            .await
            .map_err(|e| SagaError::participant("order", e))?;
        Ok(())
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<()> {
        self.service
            .update_status(order_id, OrderStatus::Cancelled)
            .await
            .map_err(|e| SagaError::participant("order", e))?;
        Ok(())
    }
}

/// Sales participant calling a [`SalesService`] directly.
pub struct LocalSalesParticipant<S: SalesStore> {
    service: SalesService<S>,
}

impl<S: SalesStore> LocalSalesParticipant<S> {
    pub fn new(service: SalesService<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S: SalesStore> SalesParticipant for LocalSalesParticipant<S> {
    async fn process_sales(&self, request: &ProcessSale) -> Result<ProcessedSale> {
        let sale = self
            .service
            .process_sale(request)
            .await
            .map_err(|e| SagaError::participant("sales", e))?;

        Ok(ProcessedSale {
            sales_id: sale.id,
            final_amount: sale.final_amount,
            status: sale.status.to_string(),
        })
    }

    async fn reverse_sales(&self, sales_id: SalesId) -> Result<()> {
        self.service
            .reverse_sale(sales_id)
            .await
            .map_err(|e| SagaError::participant("sales", e))?;
        Ok(())
    }
}
