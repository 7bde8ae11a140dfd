use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::{ErrorKind, MarketError};

/// Error returned by HTTP handlers.
///
/// Wraps [`MarketError`] and renders it as `{error, code}` with the status
/// matching its [`ErrorKind`].
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub MarketError);

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidInput | ErrorKind::InvalidTransition => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self.0.kind() {
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::InvalidInput => "VALIDATION_ERROR",
            ErrorKind::InvalidTransition => "INVALID_TRANSITION",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match self.0.kind() {
            ErrorKind::Internal => {
                tracing::error!(error = %self.0, "Internal error");
                "An internal error occurred".to_string()
            }
            _ => self.0.to_string(),
        };

        let body = json!({
            "error": message,
            "code": self.code(),
        });

        (self.status(), axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        let cases = [
            (MarketError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (MarketError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (MarketError::not_found("Order", "o1"), StatusCode::NOT_FOUND),
            (MarketError::InvalidStatus("x".into()), StatusCode::BAD_REQUEST),
            (MarketError::InvalidTransition("x".into()), StatusCode::BAD_REQUEST),
            (MarketError::Conflict("x".into()), StatusCode::CONFLICT),
            (MarketError::Encoding("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn transition_errors_have_their_own_code() {
        let err = ApiError(MarketError::InvalidTransition("x".into()));
        assert_eq!(err.code(), "INVALID_TRANSITION");
        assert_eq!(
            ApiError(MarketError::InvalidStatus("x".into())).code(),
            "VALIDATION_ERROR"
        );
    }
}
