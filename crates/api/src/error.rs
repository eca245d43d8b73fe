//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Resource not found.
    NotFound(String),
    /// Participant domain error.
    Domain(DomainError),
    /// Saga engine error.
    Saga(SagaError),
}

impl ApiError {
    /// Returns the status code and message this error is reported with.
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Domain(err) => (domain_status(err), err.to_string()),
            ApiError::Saga(err) => (saga_status(err), err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(error = %message, "internal server error");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::InsufficientStock { .. }
        | DomainError::InvalidTransition { .. }
        | DomainError::Conflict(_)
        | DomainError::DuplicateSale(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn saga_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::Validation(_) | SagaError::InvalidState { .. } => StatusCode::BAD_REQUEST,
        SagaError::NotFound(_) => StatusCode::NOT_FOUND,
        SagaError::CompensationInProgress(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

/// Malformed JSON, whether bad syntax or the wrong shape, is a bad request.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::WorkflowId;
    use saga::WorkflowStatus;

    #[test]
    fn test_domain_mapping() {
        let cases = [
            (DomainError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                DomainError::NotFound {
                    entity: "order",
                    id: "1".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                DomainError::InsufficientStock {
                    product_id: 1,
                    requested: 5,
                    available: 2,
                },
                StatusCode::CONFLICT,
            ),
            (DomainError::Conflict("dup".into()), StatusCode::CONFLICT),
            (
                DomainError::DuplicateSale(common::OrderId::new(42)),
                StatusCode::CONFLICT,
            ),
            (
                DomainError::Unavailable("down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_and_message().0, expected);
        }
    }

    #[test]
    fn test_saga_mapping() {
        assert_eq!(
            ApiError::from(SagaError::NotFound(WorkflowId::new()))
                .status_and_message()
                .0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(SagaError::InvalidState {
                expected: "failed".into(),
                actual: WorkflowStatus::Completed,
            })
            .status_and_message()
            .0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(SagaError::CompensationInProgress(WorkflowId::new()))
                .status_and_message()
                .0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(SagaError::Internal("boom".into()))
                .status_and_message()
                .0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
