//! Defines the `ApiError` type returned from API handlers, which pairs an
//! HTTP status code with an `anyhow::Error`. It implements `IntoResponse`,
//! allowing handlers to return a `Result<Json<T>, ApiError>`.
//! `From` impls exist for `anyhow::Error`, `Rejection`, and `sqlx::Error`
//! with reasonable default status codes, which can be overridden using
//! `ApiErrorExt::with_status`.
use axum::http::StatusCode;

use super::Rejection;

pub trait ApiErrorExt {
    /// Sets the given http response status to use when responding with this error.
    fn with_status(self, status: StatusCode) -> ApiError;
}

impl<E: Into<ApiError> + Sized> ApiErrorExt for E {
    fn with_status(self, status: StatusCode) -> ApiError {
        let mut err: ApiError = self.into();
        err.status = status;
        err
    }
}

/// An error response
#[derive(Debug, thiserror::Error, serde::Serialize)]
#[error("status: {status}, error: {error}")]
pub struct ApiError {
    /// The HTTP status code
    #[serde(serialize_with = "serialize_status")]
    pub status: StatusCode,

    /// The error message
    #[serde(serialize_with = "serialize_error")]
    #[source]
    pub error: anyhow::Error,
}

fn serialize_status<S: serde::Serializer>(status: &StatusCode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u16(status.as_u16())
}

fn serialize_error<S: serde::Serializer>(error: &anyhow::Error, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{error:#}")) // alternate renders nested causes
}

impl ApiError {
    pub fn new(status: StatusCode, error: anyhow::Error) -> ApiError {
        ApiError { status, error }
    }

    pub fn not_found(what: &str) -> ApiError {
        ApiError::new(StatusCode::NOT_FOUND, anyhow::anyhow!("{what} not found"))
    }

    pub fn forbidden(message: &str) -> ApiError {
        ApiError::new(StatusCode::FORBIDDEN, anyhow::anyhow!("{message}"))
    }

    pub fn unauthorized(message: impl std::fmt::Display) -> ApiError {
        ApiError::new(StatusCode::UNAUTHORIZED, anyhow::anyhow!("{message}"))
    }

    fn status_for(err: &anyhow::Error) -> StatusCode {
        if err.downcast_ref::<Rejection>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        if let Some(api_error) = err.downcast_ref::<ApiError>() {
            return api_error.status;
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> ApiError {
        tracing::error!(?error, "API responding with database error");
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: anyhow::anyhow!("database error, please retry the request"),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        let status = Self::status_for(&error);
        ApiError { status, error }
    }
}

impl From<Rejection> for ApiError {
    fn from(value: Rejection) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            error: anyhow::Error::from(value).context("Input validation error"),
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        if self.status.is_server_error() {
            tracing::error!(error = ?self.error, status = %self.status, "API request failed");
        }
        let status = self.status;
        (status, axum::Json(self)).into_response()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_for_nested_errors() {
        let err = anyhow::anyhow!("connection refused").context("recording error occurrence");
        assert_eq!(ApiError::from(err).status, StatusCode::INTERNAL_SERVER_ERROR);

        let inner = anyhow::Error::from(ApiError::not_found("error group"));
        let err = ApiError::from(inner);
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err = anyhow::anyhow!("only project owners and admins may manage notifications")
            .with_status(StatusCode::FORBIDDEN);
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::json!({
                "status": 403,
                "error": "only project owners and admins may manage notifications",
            })
        );
    }
}
