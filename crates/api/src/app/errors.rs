use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use garments_auth::AuthzError;
use garments_core::DomainError;
use garments_infra::StoreError;

pub type ApiResult = Result<Response, ApiError>;

/// Anything a handler can fail with; rendered by [`IntoResponse`].
#[derive(Debug)]
pub enum ApiError {
    Domain(DomainError),
    Store(StoreError),
    Forbidden(String),
    Unauthorized(String),
    Internal(String),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        ApiError::Forbidden(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Domain(e) => domain_error_to_response(e),
            ApiError::Store(e) => store_error_to_response(e),
            ApiError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::Unauthorized(msg) => json_error(StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Internal(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    match err {
        DomainError::Validation(msg) => {
            let errors: Vec<&str> = msg.split("; ").collect();
            (
                StatusCode::BAD_REQUEST,
                axum::Json(json!({
                    "error": "validation_error",
                    "message": msg,
                    "errors": errors,
                })),
            )
                .into_response()
        }
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DomainError::Unauthorized => json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized"),
    }
}

pub fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        other => {
            tracing::error!(error = %other, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "An internal storage error occurred")
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_status_codes() {
        let cases = [
            (DomainError::validation("a; b"), StatusCode::BAD_REQUEST),
            (DomainError::invalid_id("x"), StatusCode::BAD_REQUEST),
            (DomainError::not_found("Account"), StatusCode::NOT_FOUND),
            (DomainError::conflict("dup"), StatusCode::CONFLICT),
            (DomainError::invariant("unbalanced"), StatusCode::UNPROCESSABLE_ENTITY),
            (DomainError::Unauthorized, StatusCode::FORBIDDEN),
        ];
        for (err, status) in cases {
            assert_eq!(domain_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn backend_failures_are_internal_errors() {
        let res = ApiError::Store(StoreError::Backend("pool closed".into())).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let res = ApiError::Store(StoreError::Conflict("duplicate key".into())).into_response();
        assert_eq!(res.status(), StatusCode::CONFLICT);
    }
}
