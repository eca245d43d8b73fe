//! Sales service: vouchers, discounting and sales transactions.

use common::{Money, OrderId, SalesId};
use outbox::{
    EventPayload, NewOutboxEvent, OrderCreatedData, OutboxWriter, SalesCompletedData,
    SalesFailedData, SalesReversedData,
};

use super::{
    NewVoucher, Pricing, ProcessSale, SalesStatus, SalesStore, SalesTransaction, SalesTx, Voucher,
};
use crate::{DomainError, Result};

/// Service for the sales participant.
#[derive(Clone)]
pub struct SalesService<S: SalesStore> {
    store: S,
}

impl<S: SalesStore> SalesService<S> {
    /// Creates a new sales service on the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Lists active vouchers.
    pub async fn list_vouchers(&self) -> Result<Vec<Voucher>> {
        self.store.list_active_vouchers().await
    }

    /// Creates a voucher.
    #[tracing::instrument(skip(self))]
    pub async fn create_voucher(&self, voucher: NewVoucher) -> Result<Voucher> {
        if voucher.code.trim().is_empty() {
            return Err(DomainError::Validation("voucher code must not be empty".to_string()));
        }
        if !(0.0..=100.0).contains(&voucher.discount_percent) {
            return Err(DomainError::Validation(
                "discount_percent must be between 0 and 100".to_string(),
            ));
        }
        if voucher.max_discount.is_some_and(|m| m.is_negative()) {
            return Err(DomainError::Validation("max_discount must not be negative".to_string()));
        }
        self.store.insert_voucher(voucher).await
    }

    /// Loads the sales transaction of an order.
    pub async fn get_by_order(&self, order_id: OrderId) -> Result<SalesTransaction> {
        self.store
            .get_by_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found("sales transaction", order_id))
    }

    /// Charges an order, applying the voucher if one is given and active.
    ///
    /// A pending transaction recorded from ORDER_CREATED is finalised in
    /// place; an already completed one is returned unchanged. If ORDER_CREATED
    /// inserts its row between the lookup and the insert, the charge is
    /// retried once against that row. On failure
    /// SALES_TRANSACTION_FAILED is recorded in a separate transaction before
    /// the error is returned.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn process_sale(&self, request: &ProcessSale) -> Result<SalesTransaction> {
        if !request.order_id.is_valid() {
            return Err(DomainError::Validation("order_id must be positive".to_string()));
        }
        if request.original_amount.is_negative() {
            return Err(DomainError::Validation(
                "original_amount must not be negative".to_string(),
            ));
        }

        let mut result = self.try_process_sale(request).await;
        if let Err(DomainError::DuplicateSale(_)) = result {
            // ORDER_CREATED committed a pending row first; finalise that one.
            tracing::debug!("sales transaction inserted concurrently, retrying");
            result = self.try_process_sale(request).await;
        }

        match result {
            Ok(transaction) => Ok(transaction),
            Err(e) => {
                metrics::counter!("sales_failed_total").increment(1);
                self.record_failure(request.order_id, &e).await;
                Err(e)
            }
        }
    }

    async fn try_process_sale(&self, request: &ProcessSale) -> Result<SalesTransaction> {
        let mut tx = self.store.begin().await?;

        let voucher = match request.voucher_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                let voucher = tx.active_voucher(code).await?;
                if voucher.is_none() {
                    tracing::info!(%code, "voucher not found or inactive, no discount applied");
                }
                voucher
            }
            _ => None,
        };
        let pricing = Pricing::new(request.original_amount, voucher);

        let transaction = match tx.by_order_for_update(request.order_id).await? {
            None => {
                tx.insert_transaction(
                    request.order_id,
                    request.customer_id,
                    &pricing,
                    SalesStatus::Completed,
                )
                .await?
            }
            Some(existing) => match existing.status {
                SalesStatus::Completed => return Ok(existing),
                SalesStatus::Reversed => {
                    return Err(DomainError::Conflict(format!(
                        "sales transaction {} for order {} was reversed",
                        existing.id, request.order_id
                    )));
                }
                SalesStatus::Pending => {
                    tx.update_transaction(existing.id, &pricing, SalesStatus::Completed)
                        .await?
                }
            },
        };

        let payload = EventPayload::SalesTransactionCompleted(SalesCompletedData {
            transaction_id: transaction.id,
            final_amount: transaction.final_amount,
            discount_amount: transaction.discount_amount,
        });
        tx.write_event(NewOutboxEvent::new(request.order_id, &payload)?)
            .await?;
        tx.commit().await?;

        metrics::counter!("sales_completed_total").increment(1);
        tracing::info!(
            sales_id = %transaction.id,
            final_amount = %transaction.final_amount,
            discount = %transaction.discount_amount,
            "sale completed"
        );
        Ok(transaction)
    }

    /// Records SALES_TRANSACTION_FAILED for an order. Failures here are only logged.
    async fn record_failure(&self, order_id: OrderId, error: &DomainError) {
        let payload = EventPayload::SalesTransactionFailed(SalesFailedData {
            error: error.to_string(),
        });
        let result: Result<()> = async {
            let mut tx = self.store.begin().await?;
            tx.write_event(NewOutboxEvent::new(order_id, &payload)?).await?;
            tx.commit().await
        }
        .await;

        match result {
            Ok(()) => tracing::warn!(%order_id, %error, "sale failed"),
            Err(e) => tracing::error!(%order_id, %error, outbox_error = %e, "sale failed and the failure event could not be recorded"),
        }
    }

    /// Reverses a sale. Reversing an already reversed sale is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn reverse_sale(&self, id: SalesId) -> Result<SalesTransaction> {
        let mut tx = self.store.begin().await?;
        let mut transaction = tx
            .by_id_for_update(id)
            .await?
            .ok_or_else(|| DomainError::not_found("sales transaction", id))?;

        if transaction.status == SalesStatus::Reversed {
            return Ok(transaction);
        }

        tx.set_status(id, SalesStatus::Reversed).await?;
        let payload = EventPayload::SalesTransactionReversed(SalesReversedData { transaction_id: id });
        tx.write_event(NewOutboxEvent::new(transaction.order_id, &payload)?)
            .await?;
        tx.commit().await?;

        metrics::counter!("sales_reversed_total").increment(1);
        tracing::info!(sales_id = %id, order_id = %transaction.order_id, "sale reversed");
        transaction.status = SalesStatus::Reversed;
        Ok(transaction)
    }

    /// Records a pending sale for a newly created order.
    ///
    /// Returns false when the order already has a sales transaction, which
    /// makes redelivered ORDER_CREATED events harmless. Losing the insert
    /// race to a concurrent charge counts the same.
    pub(crate) async fn record_order_created(
        &self,
        order_id: OrderId,
        data: &OrderCreatedData,
    ) -> Result<bool> {
        match self.try_record_order_created(order_id, data).await {
            Ok(created) => Ok(created),
            Err(DomainError::DuplicateSale(_)) => Ok(false),
            Err(e) => {
                self.record_failure(order_id, &e).await;
                Err(e)
            }
        }
    }

    async fn try_record_order_created(
        &self,
        order_id: OrderId,
        data: &OrderCreatedData,
    ) -> Result<bool> {
        let mut tx = self.store.begin().await?;
        if tx.by_order_for_update(order_id).await?.is_some() {
            return Ok(false);
        }

        let pricing = Pricing::new(data.total_amount, None);
        let transaction = tx
            .insert_transaction(order_id, data.customer_id, &pricing, SalesStatus::Pending)
            .await?;

        let payload = EventPayload::SalesTransactionCompleted(SalesCompletedData {
            transaction_id: transaction.id,
            final_amount: transaction.final_amount,
            discount_amount: Money::zero(),
        });
        tx.write_event(NewOutboxEvent::new(order_id, &payload)?).await?;
        tx.commit().await?;

        tracing::info!(%order_id, sales_id = %transaction.id, "pending sale recorded for new order");
        Ok(true)
    }
}
