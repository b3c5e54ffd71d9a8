use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use boxes_core::{FilterError, Forbidden, RuleViolation, ValidationError};
use boxes_store::StoreError;
use serde::Serialize;

/// Every failure a request can end in.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication credentials were not provided.")]
    NotAuthenticated,
    #[error("Invalid token.")]
    InvalidToken,
    #[error(transparent)]
    Forbidden(#[from] Forbidden),
    #[error("Not found.")]
    NotFound,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("malformed JSON body: {0}")]
    MalformedBody(String),
    #[error("malformed query string: {0}")]
    MalformedQuery(String),
    /// The write already committed; only the response reports failure.
    #[error(transparent)]
    Rule(#[from] RuleViolation),
    #[error("A server error occurred.")]
    Internal(#[source] StoreError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound,
            other => Self::Internal(other),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotAuthenticated | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Validation(_)
            | Self::Filter(_)
            | Self::MalformedBody(_)
            | Self::MalformedQuery(_)
            | Self::Rule(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAuthenticated | Self::InvalidToken => "not_authenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound => "not_found",
            Self::Validation(_)
            | Self::Filter(_)
            | Self::MalformedBody(_)
            | Self::MalformedQuery(_) => "validation_error",
            Self::Rule(violation) => violation.code(),
            Self::Internal(_) => "internal_error",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
    code: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(source) = &self {
            tracing::error!(error = %source, "request failed");
        }

        let status = self.status();
        let detail = self.to_string();
        let body = Json(ErrorBody {
            detail: &detail,
            code: self.code(),
        });
        match status {
            StatusCode::UNAUTHORIZED => {
                (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}
