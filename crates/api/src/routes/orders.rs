//! Order service endpoints.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CustomerId, OrderId};
use domain::{Order, OrderLine, OrderService, OrderStatus, OrderStore, Product};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: CustomerId,
    pub items: Vec<OrderLine>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// GET /products: the catalog.
pub async fn list_products<S: OrderStore + Clone>(
    State(service): State<OrderService<S>>,
) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(service.list_products().await?))
}

/// POST /orders: create a pending order, reserving stock.
#[tracing::instrument(skip(service, payload))]
pub async fn create<S: OrderStore + Clone>(
    State(service): State<OrderService<S>>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let Json(request) = payload?;
    let order = service
        .create_order(request.customer_id, &request.items)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders/{id}: an order with its items.
#[tracing::instrument(skip(service))]
pub async fn get<S: OrderStore + Clone>(
    State(service): State<OrderService<S>>,
    Path(id): Path<i64>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(service.get_order(OrderId::new(id)).await?))
}

/// PUT /orders/{id}/status: move an order to another status.
#[tracing::instrument(skip(service, payload))]
pub async fn update_status<S: OrderStore + Clone>(
    State(service): State<OrderService<S>>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let Json(request) = payload?;
    let status: OrderStatus = request.status.parse().map_err(ApiError::BadRequest)?;
    Ok(Json(service.update_status(OrderId::new(id), status).await?))
}
