//! HTTP clients for the remote participant services.

use async_trait::async_trait;
use common::{CustomerId, Money, OrderId, SalesId};
use domain::{OrderLine, ProcessSale};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{CreatedOrder, OrderParticipant, ProcessedSale, SalesParticipant};
use crate::error::{Result, SagaError};

#[derive(Debug, Deserialize)]
struct OrderBody {
    id: OrderId,
    total_amount: Money,
    status: String,
}

#[derive(Debug, Deserialize)]
struct SaleBody {
    id: SalesId,
    final_amount: Money,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Returns the response if it has the expected status, otherwise an error
/// carrying the service's `error` message when it sent one.
async fn expect_status(
    participant: &'static str,
    response: Response,
    expected: StatusCode,
) -> Result<Response> {
    let status = response.status();
    if status == expected {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    tracing::warn!(participant, status = status.as_u16(), %detail, "participant call rejected");

    Err(SagaError::participant(
        participant,
        if detail.is_empty() {
            format!("returned status {}", status.as_u16())
        } else {
            format!("returned status {}: {detail}", status.as_u16())
        },
    ))
}

/// Order service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpOrderParticipant {
    client: Client,
    base_url: String,
}

impl HttpOrderParticipant {
    /// Creates a client for the order service at `base_url`.
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn set_status(&self, order_id: OrderId, status: &str) -> Result<()> {
        let url = format!("{}/orders/{order_id}/status", self.base_url);
        let response = self
            .client
            .put(&url)
            .json(&json!({ "status": status }))
            .send()
            .await
            .map_err(|e| SagaError::participant("order", format!("request failed: {e}")))?;

        expect_status("order", response, StatusCode::OK).await?;
        Ok(())
    }
}

#[async_trait]
impl OrderParticipant for HttpOrderParticipant {
    async fn create_order(
        &self,
        customer_id: CustomerId,
        items: &[OrderLine],
    ) -> Result<CreatedOrder> {
        let url = format!("{}/orders", self.base_url);
        tracing::debug!(%url, %customer_id, "creating order");

        let response = self
            .client
            .post(&url)
            .json(&json!({ "customer_id": customer_id, "items": items }))
            .send()
            .await
            .map_err(|e| SagaError::participant("order", format!("request failed: {e}")))?;

        let body: OrderBody = expect_status("order", response, StatusCode::CREATED)
            .await?
            .json()
            .await
            .map_err(|e| SagaError::participant("order", format!("invalid response: {e}")))?;

        Ok(CreatedOrder {
            order_id: body.id,
            total_amount: body.total_amount,
            status: body.status,
        })
    }

    async fn confirm_order(&self, order_id: OrderId) -> Result<()> {
        self.set_status(order_id, "completed").await
    }

    async fn cancel_order(&self, order_id: OrderId) -> Result<()> {
        self.set_status(order_id, "cancelled").await
    }
}

/// Sales service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSalesParticipant {
    client: Client,
    base_url: String,
}

impl HttpSalesParticipant {
    /// Creates a client for the sales service at `base_url`.
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SalesParticipant for HttpSalesParticipant {
    async fn process_sales(&self, request: &ProcessSale) -> Result<ProcessedSale> {
        let url = format!("{}/sales/process", self.base_url);
        tracing::debug!(%url, order_id = %request.order_id, "processing sale");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| SagaError::participant("sales", format!("request failed: {e}")))?;

        let body: SaleBody = expect_status("sales", response, StatusCode::OK)
            .await?
            .json()
            .await
            .map_err(|e| SagaError::participant("sales", format!("invalid response: {e}")))?;

        Ok(ProcessedSale {
            sales_id: body.id,
            final_amount: body.final_amount,
            status: body.status,
        })
    }

    async fn reverse_sales(&self, sales_id: SalesId) -> Result<()> {
        let url = format!("{}/sales/{sales_id}/reverse", self.base_url);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| SagaError::participant("sales", format!("request failed: {e}")))?;

        expect_status("sales", response, StatusCode::OK).await?;
        Ok(())
    }
}
