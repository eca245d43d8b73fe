//! Sales service endpoints.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{OrderId, SalesId};
use domain::{NewVoucher, ProcessSale, SalesService, SalesStore, SalesTransaction, Voucher};

use crate::error::ApiError;

/// GET /vouchers: active vouchers.
pub async fn list_vouchers<S: SalesStore + Clone>(
    State(service): State<SalesService<S>>,
) -> Result<Json<Vec<Voucher>>, ApiError> {
    Ok(Json(service.list_vouchers().await?))
}

/// POST /vouchers: create a voucher.
#[tracing::instrument(skip(service, payload))]
pub async fn create_voucher<S: SalesStore + Clone>(
    State(service): State<SalesService<S>>,
    payload: Result<Json<NewVoucher>, JsonRejection>,
) -> Result<(StatusCode, Json<Voucher>), ApiError> {
    let Json(voucher) = payload?;
    Ok((StatusCode::CREATED, Json(service.create_voucher(voucher).await?)))
}

/// POST /sales/process: charge an order.
#[tracing::instrument(skip(service, payload))]
pub async fn process<S: SalesStore + Clone>(
    State(service): State<SalesService<S>>,
    payload: Result<Json<ProcessSale>, JsonRejection>,
) -> Result<Json<SalesTransaction>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(service.process_sale(&request).await?))
}

/// POST /sales/{id}/reverse: reverse a sale.
#[tracing::instrument(skip(service))]
pub async fn reverse<S: SalesStore + Clone>(
    State(service): State<SalesService<S>>,
    Path(id): Path<i64>,
) -> Result<Json<SalesTransaction>, ApiError> {
    Ok(Json(service.reverse_sale(SalesId::new(id)).await?))
}

/// GET /sales/{id}: the sale of an order, looked up by order id.
#[tracing::instrument(skip(service))]
pub async fn get_by_order<S: SalesStore + Clone>(
    State(service): State<SalesService<S>>,
    Path(order_id): Path<i64>,
) -> Result<Json<SalesTransaction>, ApiError> {
    Ok(Json(service.get_by_order(OrderId::new(order_id)).await?))
}
