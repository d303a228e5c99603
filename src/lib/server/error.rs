use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use tracing::*;

use crate::{metrics, store::catalog::CatalogError};

pub type Result<T> = actix_web::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    TooManyRequests,

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Service Unavailable: {0}")]
    Unavailable(String),
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            Self::TooManyRequests => json!({
                "error": self.to_string(),
                "retry_after": "60s",
            }),
            _ => json!({ "error": self.to_string() }),
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<actix_web_validator::Error> for Error {
    fn from(error: actix_web_validator::Error) -> Self {
        Self::BadRequest(error.to_string())
    }
}

impl From<CatalogError> for Error {
    fn from(error: CatalogError) -> Self {
        match error {
            CatalogError::InvalidId(_) => Self::BadRequest(error.to_string()),
            CatalogError::NotFound(_) => Self::NotFound(error.to_string()),
        }
    }
}

impl From<metrics::error::Error> for Error {
    fn from(error: metrics::error::Error) -> Self {
        use metrics::error::Error as Query;

        match error {
            Query::Timeout(_) => Self::Unavailable(error.to_string()),
            _ if error.is_client_error() => Self::BadRequest(error.to_string()),
            _ => {
                error!("Query failed: {error}");
                Self::Internal(error.to_string())
            }
        }
    }
}
